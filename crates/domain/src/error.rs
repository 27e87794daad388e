//! Common error types used across the workspace.
//!
//! Every failure that can cross the command surface carries a stable
//! [`ErrorCode`]. Layers define their own typed errors and convert into
//! [`LumenError`] via `#[from]`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// Stable, wire-level classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Admission denied by the rate limiter. Not an execution failure.
    RateLimited,
    /// An outbound call exceeded its timeout on every attempt.
    Timeout,
    /// The lighting controller could not be reached.
    ControllerUnavailable,
    /// The lighting controller refused the command.
    ControllerRejected,
    /// Scene selection attempted outside of automatic mode.
    ModeBlocked,
    /// An adjustment request carried no step.
    NoAdjustment,
    /// No enabled zone was eligible for the request.
    NoTargetZone,
    /// The alarm-anchor integration is disabled.
    SonosDisabled,
    /// A restore was requested but no backup exists.
    NoBackup,
    /// The orchestrator is globally paused.
    Paused,
    /// The referenced zone does not exist.
    UnknownZone,
    /// Input failed validation.
    Validation,
    /// The storage backend failed.
    Storage,
}

impl ErrorCode {
    /// The wire representation (e.g. `"RATE_LIMITED"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::ControllerUnavailable => "CONTROLLER_UNAVAILABLE",
            Self::ControllerRejected => "CONTROLLER_REJECTED",
            Self::ModeBlocked => "MODE_BLOCKED",
            Self::NoAdjustment => "NO_ADJUSTMENT",
            Self::NoTargetZone => "NO_TARGET_ZONE",
            Self::SonosDisabled => "SONOS_DISABLED",
            Self::NoBackup => "NO_BACKUP",
            Self::Paused => "PAUSED",
            Self::UnknownZone => "UNKNOWN_ZONE",
            Self::Validation => "VALIDATION",
            Self::Storage => "STORAGE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input that violates a domain invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("identifier must not be empty")]
    EmptyId,
    #[error("zone multiplier must be a finite value >= 0, got {0}")]
    InvalidMultiplier(f64),
    #[error("zone {0} is declared more than once")]
    DuplicateZone(String),
    #[error("zone {0} has no lights")]
    NoLights(String),
    #[error("unknown mode {0:?}")]
    UnknownMode(String),
    #[error("unknown scene {0:?}")]
    UnknownScene(String),
    #[error("boost percentage must be >= 0, got {0}")]
    NegativeBoost(i32),
    #[error("{0} events are emitted by the orchestrator and cannot be injected")]
    NotInjectable(String),
}

/// A referenced resource does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Local precondition failures of the command surface.
///
/// These are returned synchronously and never leave side effects behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("scene selection is blocked while mode is {mode}")]
    ModeBlocked { mode: Mode },
    #[error("neither a brightness nor a color temperature step was given")]
    NoAdjustment,
    #[error("no enabled zone is eligible for the request")]
    NoTargetZone,
    #[error("the alarm anchor integration is disabled")]
    SonosDisabled,
    #[error("no preferences backup is available")]
    NoBackup,
    #[error("the orchestrator is paused")]
    Paused,
}

impl CommandError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ModeBlocked { .. } => ErrorCode::ModeBlocked,
            Self::NoAdjustment => ErrorCode::NoAdjustment,
            Self::NoTargetZone => ErrorCode::NoTargetZone,
            Self::SonosDisabled => ErrorCode::SonosDisabled,
            Self::NoBackup => ErrorCode::NoBackup,
            Self::Paused => ErrorCode::Paused,
        }
    }
}

/// Umbrella error for the whole workspace.
#[derive(Debug, thiserror::Error)]
pub enum LumenError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    #[error("{0}")]
    Command(#[from] CommandError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LumenError {
    /// Classify this error for the command surface.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::NotFound(_) => ErrorCode::UnknownZone,
            Self::Command(err) => err.code(),
            Self::Storage(_) => ErrorCode::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_error_code_in_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::SonosDisabled).unwrap();
        assert_eq!(json, "\"SONOS_DISABLED\"");
        let parsed: ErrorCode = serde_json::from_str("\"RATE_LIMITED\"").unwrap();
        assert_eq!(parsed, ErrorCode::RateLimited);
    }

    #[test]
    fn should_match_display_and_serde_representation() {
        for code in [
            ErrorCode::ModeBlocked,
            ErrorCode::NoTargetZone,
            ErrorCode::ControllerUnavailable,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json.trim_matches('"'), code.to_string());
        }
    }

    #[test]
    fn should_classify_command_errors() {
        let err: LumenError = CommandError::ModeBlocked {
            mode: Mode::LateNight,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ModeBlocked);
        assert_eq!(
            err.to_string(),
            "scene selection is blocked while mode is late_night"
        );
    }

    #[test]
    fn should_classify_not_found_as_unknown_zone() {
        let err: LumenError = NotFoundError {
            entity: "Zone",
            id: "attic".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::UnknownZone);
        assert_eq!(err.to_string(), "Zone attic not found");
    }
}
