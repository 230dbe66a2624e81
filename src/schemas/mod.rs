//! Schema module
//!
//! Wire types for the generative-AI provider APIs.

pub mod gemini;
