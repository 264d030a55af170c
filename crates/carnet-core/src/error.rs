//! Error types for carnet.

use thiserror::Error;
use uuid::Uuid;

use crate::validate::ValidationErrors;

/// Result type alias using carnet's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for carnet operations.
///
/// All failures cross component boundaries as values. A `VersionConflict`
/// or `Validation` error is terminal for the call that produced it; the
/// caller must re-fetch and retry with fresh state.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found, or a parent link did not match the claimed path.
    ///
    /// Used uniformly for cross-tenant misses so the existence of another
    /// tenant's resources is never revealed.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Principal is not a member of the project.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Update submitted without a lock_version field.
    ///
    /// Distinct from [`Error::VersionConflict`]: the request never reached
    /// storage.
    #[error("Missing lock_version for {entity} update")]
    MissingVersion {
        /// Entity kind the update targeted.
        entity: &'static str,
    },

    /// Claimed lock_version did not match the persisted row.
    #[error("Stale lock_version for {entity} {id}")]
    VersionConflict {
        /// Entity kind the update targeted.
        entity: &'static str,
        /// Row the conflict occurred on.
        id: Uuid,
    },

    /// One or more field-level constraint violations.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// Attachment payload exceeds the configured size ceiling.
    #[error("Attachment of {size_bytes} bytes exceeds the {max_bytes} byte limit")]
    AttachmentTooLarge { size_bytes: i64, max_bytes: i64 },

    /// Attachment content type is outside the allow-list.
    #[error("Unsupported attachment content type: {0}")]
    UnsupportedAttachmentType(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error carries a stale-version signal.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }

    /// True when the error is any attachment validation failure.
    pub fn is_attachment_rejection(&self) -> bool {
        matches!(
            self,
            Error::AttachmentTooLarge { .. } | Error::UnsupportedAttachmentType(_)
        )
    }
}
