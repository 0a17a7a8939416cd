//! Testing utilities and mock implementations
//!
//! Fakes for every seam the nodes depend on, so relay and storage behaviour can
//! be exercised without a broker, an HTTP bridge or a bucket.

pub mod mocks;

pub use mocks::*;
