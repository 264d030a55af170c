//! Shared optimistic-lock protocol for versioned entities.
//!
//! Project, Folder, Note and Task all follow the same rule: a row carries a
//! `lock_version` counter starting at 0; an update must present the version
//! it believes is current, and the write is a single compare-and-swap
//! statement:
//!
//! ```sql
//! UPDATE <table>
//! SET <fields>, lock_version = lock_version + 1, updated_at = now()
//! WHERE id = $1 AND lock_version = $2
//! ```
//!
//! The check and the increment are one atomic statement, so two concurrent
//! updates against the same row serialize in the database: exactly one
//! matches, the other sees zero rows affected. This module supplies the two
//! pieces the per-entity repositories share: the missing-version gate and
//! the zero-rows disambiguation.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use carnet_core::{Error, Result};

/// Gate run before any storage access: an update without a claimed version
/// is a client error, distinct from a stale version.
pub(crate) fn require_version(entity: &'static str, claimed: Option<i32>) -> Result<i32> {
    claimed.ok_or(Error::MissingVersion { entity })
}

/// Disambiguate a compare-and-swap that matched no row.
///
/// Probes the row inside the caller's transaction: still present means the
/// claimed version was stale (`VersionConflict`), absent means the row is
/// gone (`NotFound`). Either way the row was left untouched.
///
/// `table` must be one of the fixed entity table names; it is interpolated,
/// never caller-supplied.
pub(crate) async fn stale_or_missing(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
) -> Error {
    let probe = format!("SELECT lock_version FROM {} WHERE id = $1", table);
    match sqlx::query_scalar::<_, i32>(&probe)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    {
        Ok(Some(_)) => Error::VersionConflict { entity, id },
        Ok(None) => Error::NotFound(format!("{} {}", entity, id)),
        Err(e) => Error::Database(e),
    }
}

/// True when the error is a unique-constraint violation, used to map
/// duplicate inserts (one task per note, one membership per user+project)
/// onto validation failures.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
