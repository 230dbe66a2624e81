//! Candidate credentials
//!
//! What the selector hands to the executor: either a stored credential or
//! the statically configured fallback secret.

use std::fmt;
use zeroize::Zeroizing;

use crate::db::Credential;

// ============================================================================
// Fallback Secret
// ============================================================================

/// Environment-configured secret used only when a requester's pool is empty.
///
/// Never persisted, never mutated.
#[derive(Clone)]
pub struct FallbackSecret(Zeroizing<String>);

impl FallbackSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for FallbackSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FallbackSecret(<redacted>)")
    }
}

// ============================================================================
// Candidate
// ============================================================================

#[derive(Debug, Clone)]
pub enum Candidate {
    Stored(Credential),
    /// Ephemeral; exempt from every persistence side effect
    Fallback(FallbackSecret),
}

impl Candidate {
    /// Store id, `None` for the fallback
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Stored(credential) => Some(&credential.id),
            Self::Fallback(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Stored(credential) => &credential.label,
            Self::Fallback(_) => "fallback",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_debug_is_redacted() {
        let fallback = FallbackSecret::new("AIza-env-key");
        assert_eq!(fallback.expose(), "AIza-env-key");
        assert!(!format!("{:?}", Candidate::Fallback(fallback)).contains("AIza"));
    }

    #[test]
    fn test_fallback_candidate_has_no_id() {
        let candidate = Candidate::Fallback(FallbackSecret::new("k"));
        assert!(candidate.is_fallback());
        assert_eq!(candidate.id(), None);
        assert_eq!(candidate.label(), "fallback");
    }
}
