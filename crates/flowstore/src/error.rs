use flowcore::Id;
use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Coarse classification used by callers to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InvariantViolation,
    Storage,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(Id),

    #[error("Cannot move {item} next to {target}: they belong to different parents")]
    CrossParent { item: Id, target: Id },

    #[error("Cannot move {0} relative to itself")]
    SelfMove(Id),

    #[error("List of parent {parent} is broken: {reason}")]
    BrokenList { parent: Id, reason: String },

    #[error("Order for parent {parent} is not a permutation of its items")]
    SetMismatch { parent: Id },

    #[error("Position {index} is out of range for a list of {len} items")]
    PositionOutOfRange { index: usize, len: usize },

    #[error("Write conflict during {op}")]
    WriteConflict { op: &'static str },

    #[error("Unknown item {0}")]
    UnknownItem(Id),

    #[error("No rank left between neighbours in view {view}")]
    RankExhausted { view: Id },

    #[error("Storage error during {op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) | StoreError::UnknownItem(_) => ErrorKind::NotFound,
            StoreError::CrossParent { .. }
            | StoreError::SelfMove(_)
            | StoreError::SetMismatch { .. }
            | StoreError::PositionOutOfRange { .. } => ErrorKind::Validation,
            StoreError::WriteConflict { .. } | StoreError::RankExhausted { .. } => {
                ErrorKind::Conflict
            }
            StoreError::BrokenList { .. } => ErrorKind::InvariantViolation,
            StoreError::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Another writer won; the operation may be retried as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::WriteConflict { .. })
    }

    /// Name the operation on storage-level errors raised by inner helpers.
    pub(crate) fn with_op(self, op: &'static str) -> Self {
        match self {
            StoreError::Storage { source, .. } => StoreError::Storage { op, source },
            StoreError::WriteConflict { .. } => StoreError::WriteConflict { op },
            other => other,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(source: rusqlite::Error) -> Self {
        match &source {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StoreError::WriteConflict { op: "query" }
            }
            _ => StoreError::Storage { op: "query", source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_write_conflict() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = StoreError::from(busy).with_op("move_after");
        assert!(matches!(err, StoreError::WriteConflict { op: "move_after" }));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn storage_errors_carry_op() {
        let err = StoreError::from(rusqlite::Error::QueryReturnedNoRows).with_op("reorder");
        assert!(err.to_string().contains("reorder"));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
