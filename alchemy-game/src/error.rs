//! Engine-facing error taxonomy.
//!
//! Each seam has its own error enum; `EngineError` is what the command
//! surface hands to the UI layer.

use thiserror::Error;

use crate::clock::ClockError;
use crate::session::SessionPhase;
use crate::source::PuzzleSourceError;
use crate::storage::StorageError;

/// Errors surfaced by the command surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed date, unknown element, empty selection slots.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Every storage tier refused the operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The combination source kept failing after all retries.
    #[error("combination source unavailable: {0}")]
    SourceTransient(String),

    /// Stored JSON failed to parse and was quarantined.
    #[error("corrupted data under {key}: {detail}")]
    DataCorruption { key: String, detail: String },

    /// The puzzle source could not produce the requested puzzle.
    #[error("puzzle unavailable: {0}")]
    PuzzleUnavailable(String),

    /// The command is not admissible in the current phase.
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: SessionPhase,
    },

    /// A combination is already in flight for this session.
    #[error("a combination is already in progress")]
    Busy,

    /// No puzzle has been opened yet.
    #[error("no puzzle is open")]
    NoSession,
}

impl From<ClockError> for EngineError {
    fn from(value: ClockError) -> Self {
        Self::InputInvalid(value.to_string())
    }
}

impl From<StorageError> for EngineError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Corrupted { key, detail } => Self::DataCorruption { key, detail },
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<PuzzleSourceError> for EngineError {
    fn from(value: PuzzleSourceError) -> Self {
        Self::PuzzleUnavailable(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_corruption_maps_to_data_corruption() {
        let err: EngineError = StorageError::Corrupted {
            key: "alchemy_stats".into(),
            detail: "eof".into(),
        }
        .into();
        assert!(matches!(err, EngineError::DataCorruption { ref key, .. } if key == "alchemy_stats"));

        let err: EngineError = StorageError::QuotaExceeded { tier: "file" }.into();
        assert!(matches!(err, EngineError::StorageUnavailable(_)));
    }

    #[test]
    fn transition_error_names_phase() {
        let err = EngineError::InvalidTransition {
            action: "combine",
            phase: SessionPhase::Complete,
        };
        assert_eq!(err.to_string(), "cannot combine while complete");
    }
}
