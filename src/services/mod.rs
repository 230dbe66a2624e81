//! Services module
//!
//! Provider integration, pool selection and failover, and credential
//! lifecycle administration.

pub mod backend_pool;
pub mod lifecycle;
pub mod provider;

pub use backend_pool::{
    AdmissionValidator, Candidate, ExecutorConfig, FailoverExecutor, FallbackSecret, FirstRequested,
    GenerateOptions, Generation, ModelSelection, PoolConfig, PoolSelector,
};
pub use lifecycle::{AddCredentialRequest, LifecycleApi, PoolStats, Requester};
pub use provider::{ErrorClass, GeminiProvider, GeminiProviderConfig, GenerativeProvider, ProviderError};
