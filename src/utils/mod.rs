//! Utility modules
//!
//! Timeout handling and string helpers.

pub mod string;
pub mod timeout;

pub use string::{bound_error_text, truncate_str, MAX_ERROR_CHARS};
pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
