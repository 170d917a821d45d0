use thiserror::Error;

use crate::{AliasId, Timestamp};

#[derive(Debug, Error)]
pub enum AliasError {
    #[error("end timestamp {end} must be greater than start {start} or absent")]
    EndBeforeStart { start: Timestamp, end: Timestamp },
    #[error("alias '{alias}' overlaps an existing interval for target '{target}'")]
    OverlappingInterval { alias: String, target: String },
    #[error("alias '{alias}' is bound to another target during the requested interval of '{target}'")]
    AliasTargetConflict { alias: String, target: String },
    #[error("alias {id} is not active")]
    NotActive { id: AliasId },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl AliasError {
    pub fn end_before_start(start: Timestamp, end: Timestamp) -> Self {
        Self::EndBeforeStart { start, end }
    }

    pub fn overlapping(alias: impl Into<String>, target: impl Into<String>) -> Self {
        Self::OverlappingInterval {
            alias: alias.into(),
            target: target.into(),
        }
    }

    pub fn target_conflict(alias: impl Into<String>, target: impl Into<String>) -> Self {
        Self::AliasTargetConflict {
            alias: alias.into(),
            target: target.into(),
        }
    }

    pub fn not_active(id: AliasId) -> Self {
        Self::NotActive { id }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// True for the interval and activity rules enforced by the write path.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EndBeforeStart { .. }
                | Self::OverlappingInterval { .. }
                | Self::AliasTargetConflict { .. }
                | Self::NotActive { .. }
        )
    }
}

pub type AliasResult<T> = Result<T, AliasError>;

// Backend messages that mean the transaction lost a race and may be retried.
const CONFLICT_MARKERS: [&str; 6] = [
    "could not serialize access",
    "deadlock",
    "database is locked",
    "database table is locked",
    "lock wait timeout",
    "40001",
];

impl From<sea_orm::DbErr> for AliasError {
    fn from(value: sea_orm::DbErr) -> Self {
        if let Some(sea_orm::SqlErr::UniqueConstraintViolation(message)) = value.sql_err() {
            return AliasError::conflict(message);
        }
        let message = value.to_string();
        let lowered = message.to_lowercase();
        if CONFLICT_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            AliasError::conflict(message)
        } else {
            AliasError::storage(message)
        }
    }
}
