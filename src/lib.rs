//! Credential pool and failover execution engine
//!
//! Pools provider API keys per owner, picks among them least-recently-used
//! first, fails over on provider errors and records each outcome on the
//! credential that produced it.

// Public modules
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod schemas;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::App;
pub use config::Settings;
pub use error::PoolError;
