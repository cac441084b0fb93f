use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsilienceError {
    #[error("session identity is missing or blank")]
    MissingSession,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid priority '{0}': expected P0, P1, P2 or P3")]
    InvalidPriority(String),

    #[error("session closed: {0}")]
    SessionClosed(String),

    #[error("{capability} timed out after {after:?}")]
    CollaboratorTimeout {
        capability: &'static str,
        after: Duration,
    },

    #[error("{capability} returned a malformed response: {detail}")]
    CollaboratorMalformed {
        capability: &'static str,
        detail: String,
    },

    #[error("{capability} is unavailable: {detail}")]
    CollaboratorUnavailable {
        capability: &'static str,
        detail: String,
    },

    #[error("queue write failed: {0}")]
    QueueWrite(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ConsilienceError {
    /// Timeouts, malformed replies and unreachable collaborators. Callers
    /// recover from these by taking the conservative branch.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::CollaboratorTimeout { .. }
                | Self::CollaboratorMalformed { .. }
                | Self::CollaboratorUnavailable { .. }
        )
    }

    pub fn malformed(capability: &'static str, detail: impl Into<String>) -> Self {
        Self::CollaboratorMalformed {
            capability,
            detail: detail.into(),
        }
    }

    pub fn unavailable(capability: &'static str, detail: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            capability,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsilienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_kinds_are_recoverable() {
        let timeout = ConsilienceError::CollaboratorTimeout {
            capability: "classify_trigger",
            after: Duration::from_secs(20),
        };
        assert!(timeout.is_collaborator_failure());
        assert!(ConsilienceError::malformed("compare_issues", "not json").is_collaborator_failure());
        assert!(ConsilienceError::unavailable("verify_followup", "refused").is_collaborator_failure());
        assert!(!ConsilienceError::MissingSession.is_collaborator_failure());
        assert!(!ConsilienceError::QueueWrite("disk full".into()).is_collaborator_failure());
    }

    #[test]
    fn timeout_message_names_capability() {
        let err = ConsilienceError::CollaboratorTimeout {
            capability: "detect_stuck_signal",
            after: Duration::from_millis(1500),
        };
        let msg = err.to_string();
        assert!(msg.contains("detect_stuck_signal"));
        assert!(msg.contains("1.5s"));
    }
}
