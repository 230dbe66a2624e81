//! Backend Pool Module
//!
//! Credential pool selection and failover execution against a generative-AI
//! provider.
//!
//! # Features
//! - Owned credentials before shared ones, least-recently-used first
//! - Sequential failover with per-outcome credential state transitions
//! - Live admission probe for new credentials
//! - Ephemeral fallback secret when a requester's pool is empty
//!
//! # Example
//! ```ignore
//! use keypool::services::backend_pool::{
//!     ExecutorConfig, FailoverExecutor, GenerateOptions, PoolConfig, PoolSelector,
//! };
//!
//! let selector = PoolSelector::new(store, PoolConfig::new().with_fallback_secret(env_key));
//! let executor = FailoverExecutor::new(selector, provider, ExecutorConfig::default());
//!
//! let generation = executor
//!     .execute("Summarize my week", &GenerateOptions::default(), "user-42")
//!     .await?;
//! println!("{} via {}", generation.text, generation.model);
//! ```

mod admission;
mod credential;
mod executor;
mod pool;
mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::AdmissionValidator;
pub use credential::{Candidate, FallbackSecret};
pub use executor::{ExecutorConfig, FailoverExecutor, GenerateOptions, Generation};
pub use pool::{PoolConfig, PoolSelector};
pub use strategy::{FirstRequested, ModelSelection};
