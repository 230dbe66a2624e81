//! Error types

mod types;

pub use types::PoolError;
