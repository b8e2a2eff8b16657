//! Replay errors.

use crate::application::ports::StoreError;
use crate::domain::session::SessionError;

/// Errors surfaced by the replay control surface.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// No session document with this id.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// Requested session.
        session_id: String,
    },

    /// The session has no participating soldiers.
    #[error("Session has no participating soldiers")]
    NoParticipants,

    /// A location sample timestamp cannot be parsed.
    #[error("Soldier {soldier_id} location #{index} has malformed timestamp {raw:?}")]
    MalformedLocationTimestamp {
        /// Soldier owning the sample.
        soldier_id: String,
        /// Sample index.
        index: usize,
        /// Raw value.
        raw: String,
    },

    /// Unknown control command.
    #[error("Invalid command: {command}")]
    InvalidCommand {
        /// Command as received.
        command: String,
    },

    /// A command is missing a required parameter.
    #[error("Command {command} requires parameter {parameter}")]
    MissingParameter {
        /// Command name.
        command: &'static str,
        /// Parameter name.
        parameter: &'static str,
    },

    /// A parameter is present but unusable.
    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        parameter: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The session is not the active replay.
    #[error("No active replay for session {session_id}")]
    NoActiveReplay {
        /// Requested session.
        session_id: String,
    },

    /// The event store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReplayError {
    /// Whether the caller is at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            Self::NoParticipants => "NO_PARTICIPANTS",
            Self::MalformedLocationTimestamp { .. } => "MALFORMED_LOCATION_TIMESTAMP",
            Self::InvalidCommand { .. } => "INVALID_COMMAND",
            Self::MissingParameter { .. } => "MISSING_PARAMETER",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::NoActiveReplay { .. } => "NO_ACTIVE_REPLAY",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}

impl From<SessionError> for ReplayError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::NoParticipants => Self::NoParticipants,
            SessionError::MalformedLocationTimestamp {
                soldier_id,
                index,
                raw,
            } => Self::MalformedLocationTimestamp {
                soldier_id,
                index,
                raw,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_server_side() {
        let error = ReplayError::from(StoreError::Unavailable {
            message: "down".to_string(),
        });
        assert!(!error.is_client_error());
        assert_eq!(error.code(), "STORE_ERROR");
    }

    #[test]
    fn validation_errors_are_client_side() {
        let errors = [
            ReplayError::SessionNotFound {
                session_id: "x".to_string(),
            },
            ReplayError::NoParticipants,
            ReplayError::InvalidCommand {
                command: "rewind".to_string(),
            },
            ReplayError::MissingParameter {
                command: "skip",
                parameter: "n_seconds",
            },
            ReplayError::NoActiveReplay {
                session_id: "x".to_string(),
            },
        ];
        assert!(errors.iter().all(ReplayError::is_client_error));
    }

    #[test]
    fn session_defects_convert() {
        let error = ReplayError::from(SessionError::MalformedLocationTimestamp {
            soldier_id: "S1".to_string(),
            index: 3,
            raw: "??".to_string(),
        });
        assert_eq!(error.code(), "MALFORMED_LOCATION_TIMESTAMP");
        assert_eq!(
            error.to_string(),
            "Soldier S1 location #3 has malformed timestamp \"??\""
        );
    }
}
