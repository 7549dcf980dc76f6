use crate::core::{Position, Range};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("version mismatch: document is at version {expected}, operation is based on {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    #[error("invalid position {0}")]
    InvalidPosition(Position),

    #[error("invalid range {0}")]
    InvalidRange(Range),

    #[error("unknown root `{0}`")]
    UnknownRoot(String),

    #[error("node at {0} is not an element")]
    NotAnElement(Position),

    #[error("cannot move nodes into themselves")]
    MoveIntoItself,

    #[error("element at {position} is named `{found}`, expected `{expected}`")]
    NameMismatch {
        position: Position,
        expected: String,
        found: String,
    },

    #[error("attribute `{key}` does not hold the expected old value")]
    AttributeMismatch { key: String },

    #[error("operation affects no content")]
    EmptyOperation,

    #[error("delta has no operations")]
    EmptyDelta,

    #[error("removed content must go to the graveyard root `{0}`")]
    NotGraveyard(String),

    #[error("history before version {0} is no longer available")]
    HistoryUnavailable(u64),
}
