//! Model selection strategies
//!
//! Decides which model a generation runs against. Only one model is
//! exercised per request; multi-model fan-out would be a new strategy.

// ============================================================================
// Model Selection
// ============================================================================

pub trait ModelSelection: Send + Sync {
    fn select(&self, requested: &[String], default_model: &str) -> String;
}

/// First requested model, else the configured default
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstRequested;

impl ModelSelection for FirstRequested {
    fn select(&self, requested: &[String], default_model: &str) -> String {
        match requested.first().map(|m| m.trim()) {
            Some(model) if !model.is_empty() => model.to_string(),
            _ => default_model.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
