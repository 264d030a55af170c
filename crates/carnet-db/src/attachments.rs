//! Attachment store: content-addressable image storage with reference
//! counting.
//!
//! Metadata lives in Postgres (`attachment` + `attachment_blob` rows); the
//! bytes live behind a pluggable [`StorageBackend`]. Blobs are deduplicated
//! by BLAKE3 content hash and refcounted, so purging one attachment never
//! destroys bytes another attachment still references. Purge is the only
//! deletion path: it removes the metadata row, and the blob row plus the
//! stored bytes once the last reference drops.
//!
//! Attaching an image to a note participates in the note's optimistic-lock
//! protocol: the note's `lock_version` is bumped by compare-and-swap in the
//! same transaction as the metadata insert.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use carnet_core::{
    Attachment, AttachmentDownload, AttachmentOwner, AttachmentStore, AttachmentUpload, Error,
    NoteImageAttachment, Result,
};

use crate::versioned::{require_version, stale_or_missing};

const ATTACHMENT_COLUMNS: &str = "id, note_id, user_id, blob_id, filename, created_at";

/// Default attachment size ceiling: 8 MiB.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: i64 = 8 * 1024 * 1024;

/// Attachment validation and URL configuration.
#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    /// Uploads larger than this are rejected.
    pub max_size_bytes: i64,
    /// Accepted MIME types; the declared type and the sniffed type must
    /// both land in this list.
    pub allowed_content_types: Vec<String>,
    /// Prefix for resolved URLs, e.g. `https://files.example.com`. Empty
    /// yields root-relative paths.
    pub public_base_url: String,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            allowed_content_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
            public_base_url: String::new(),
        }
    }
}

/// Storage backend trait for blob bytes.
///
/// Allows abstracting over filesystem, S3, or other storage providers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Idempotent.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage backend.
///
/// Blobs land under `{base}/blobs/{hh}/{hh}/{uuid}.bin`, fanned out by the
/// first hex digits of the blob id to keep directories small.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Round-trip write/read/delete under the base path, run at startup to
    /// surface permission or mount problems before the first upload does.
    pub async fn validate(&self) -> Result<()> {
        let probe = "blobs/.health-check/probe.bin";
        let payload = b"carnet-storage-health-check";
        self.write(probe, payload).await?;
        let read_back = self.read(probe).await?;
        if read_back != payload {
            return Err(Error::Config(format!(
                "storage read-back mismatch under {}",
                self.base_path.display()
            )));
        }
        self.delete(probe).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        debug!(
            subsystem = "db",
            component = "attachments",
            op = "blob_write",
            storage_path = %path,
            size = data.len(),
            "Writing blob"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Atomic write: temp file + rename.
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(
                from = %temp_path.display(),
                to = %full_path.display(),
                error = %e,
                "Blob rename failed"
            );
            Error::Io(e)
        })?;

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.full_path(path)).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.full_path(path)).await?)
    }
}

/// Compute the BLAKE3 content hash of blob data, `blake3:{hex}` format.
pub fn content_hash(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data).to_hex())
}

/// Storage path for a blob id: `blobs/{hh}/{hh}/{uuid}.bin`.
pub fn blob_storage_path(id: &Uuid) -> String {
    let hex = id.simple().to_string();
    format!("blobs/{}/{}/{}.bin", &hex[0..2], &hex[2..4], id.as_hyphenated())
}

/// PostgreSQL-backed attachment store.
pub struct PgAttachmentStore {
    pool: PgPool,
    backend: Box<dyn StorageBackend>,
    config: AttachmentConfig,
}

impl PgAttachmentStore {
    /// Create a new attachment store over the given pool and blob backend.
    pub fn new(pool: PgPool, backend: impl StorageBackend + 'static, config: AttachmentConfig) -> Self {
        Self {
            pool,
            backend: Box::new(backend),
            config,
        }
    }

    /// Reject uploads that violate the size ceiling or the content-type
    /// allow-list. The declared type must be allowed and must match what
    /// the bytes actually are (magic-byte sniff), so a renamed file cannot
    /// smuggle another format through.
    fn validate_upload(&self, upload: &AttachmentUpload) -> Result<()> {
        let size_bytes = upload.data.len() as i64;
        if size_bytes > self.config.max_size_bytes {
            return Err(Error::AttachmentTooLarge {
                size_bytes,
                max_bytes: self.config.max_size_bytes,
            });
        }

        if !self
            .config
            .allowed_content_types
            .iter()
            .any(|t| t == &upload.content_type)
        {
            return Err(Error::UnsupportedAttachmentType(upload.content_type.clone()));
        }

        let detected = infer::get(&upload.data).map(|k| k.mime_type());
        if detected != Some(upload.content_type.as_str()) {
            return Err(Error::UnsupportedAttachmentType(format!(
                "declared {}, detected {}",
                upload.content_type,
                detected.unwrap_or("unknown")
            )));
        }

        Ok(())
    }

    /// Insert the blob (deduplicated by content hash, refcount bumped) and
    /// the attachment row, inside the caller's transaction.
    async fn insert_attachment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        note_id: Option<Uuid>,
        user_id: Option<Uuid>,
        upload: &AttachmentUpload,
    ) -> Result<Attachment> {
        let hash = content_hash(&upload.data);

        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM attachment_blob WHERE content_hash = $1")
                .bind(&hash)
                .fetch_optional(&mut **tx)
                .await?;

        let blob_id = match existing {
            Some(id) => id,
            None => {
                let blob_id = Uuid::now_v7();
                let path = blob_storage_path(&blob_id);
                self.backend.write(&path, &upload.data).await?;

                sqlx::query(
                    "INSERT INTO attachment_blob
                     (id, content_hash, content_type, size_bytes, storage_path)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(blob_id)
                .bind(&hash)
                .bind(&upload.content_type)
                .bind(upload.data.len() as i64)
                .bind(&path)
                .execute(&mut **tx)
                .await?;

                blob_id
            }
        };

        sqlx::query(
            "UPDATE attachment_blob SET reference_count = reference_count + 1 WHERE id = $1",
        )
        .bind(blob_id)
        .execute(&mut **tx)
        .await?;

        let attachment: Attachment = sqlx::query_as(&format!(
            "INSERT INTO attachment (id, note_id, user_id, blob_id, filename)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ATTACHMENT_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(note_id)
        .bind(user_id)
        .bind(blob_id)
        .bind(&upload.filename)
        .fetch_one(&mut **tx)
        .await?;

        Ok(attachment)
    }

    /// Purge every attachment owned by a note. Used by the cascade-delete
    /// paths; each purge is individually atomic and idempotent.
    pub async fn purge_for_note(&self, note_id: Uuid) -> Result<usize> {
        let owned = self.list_for_owner(AttachmentOwner::Note(note_id)).await?;
        let count = owned.len();
        for attachment in owned {
            self.purge(attachment.id).await?;
        }
        Ok(count)
    }
}

#[async_trait]
impl AttachmentStore for PgAttachmentStore {
    async fn attach_to_note(
        &self,
        note_id: Uuid,
        claimed_version: Option<i32>,
        upload: AttachmentUpload,
    ) -> Result<NoteImageAttachment> {
        let claimed = require_version("note", claimed_version)?;
        self.validate_upload(&upload)?;

        let mut tx = self.pool.begin().await?;

        // The attach rides the note's optimistic lock: the version bump and
        // the metadata insert commit together or not at all.
        let bumped: Option<i32> = sqlx::query_scalar(
            "UPDATE note
             SET lock_version = lock_version + 1, updated_at = now()
             WHERE id = $1 AND lock_version = $2
             RETURNING lock_version",
        )
        .bind(note_id)
        .bind(claimed)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(note_lock_version) = bumped else {
            return Err(stale_or_missing(&mut tx, "note", "note", note_id).await);
        };

        let attachment = self
            .insert_attachment(&mut tx, Some(note_id), None, &upload)
            .await?;

        tx.commit().await?;

        debug!(
            subsystem = "db",
            component = "attachments",
            op = "attach_to_note",
            note_id = %note_id,
            attachment_id = %attachment.id,
            size = upload.data.len(),
            "Image attached to note"
        );

        Ok(NoteImageAttachment {
            attachment,
            note_lock_version,
        })
    }

    async fn attach_to_user(&self, user_id: Uuid, upload: AttachmentUpload) -> Result<Attachment> {
        self.validate_upload(&upload)?;

        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM app_user WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }

        let attachment = self
            .insert_attachment(&mut tx, None, Some(user_id), &upload)
            .await?;

        tx.commit().await?;
        Ok(attachment)
    }

    async fn list_for_owner(&self, owner: AttachmentOwner) -> Result<Vec<Attachment>> {
        let query = match owner {
            AttachmentOwner::Note(_) => format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachment
                 WHERE note_id = $1 ORDER BY created_at, id"
            ),
            AttachmentOwner::User(_) => format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachment
                 WHERE user_id = $1 ORDER BY created_at, id"
            ),
        };
        let (AttachmentOwner::Note(id) | AttachmentOwner::User(id)) = owner;

        let attachments = sqlx::query_as(&query)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(attachments)
    }

    fn resolve_url(&self, attachment: &Attachment) -> String {
        // The id alone keys the URL, so the string is stable for the life
        // of the attachment row. Reconciliation depends on this stability.
        format!("{}/attachments/{}", self.config.public_base_url, attachment.id)
    }

    async fn purge(&self, attachment_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let blob_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM attachment WHERE id = $1 RETURNING blob_id")
                .bind(attachment_id)
                .fetch_optional(&mut *tx)
                .await?;

        // Already gone: purge is idempotent.
        let Some(blob_id) = blob_id else {
            return Ok(());
        };

        let remaining: Option<(i32, String)> = sqlx::query_as(
            "UPDATE attachment_blob
             SET reference_count = reference_count - 1
             WHERE id = $1
             RETURNING reference_count, storage_path",
        )
        .bind(blob_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut orphaned_path = None;
        if let Some((reference_count, storage_path)) = remaining {
            if reference_count <= 0 {
                sqlx::query("DELETE FROM attachment_blob WHERE id = $1")
                    .bind(blob_id)
                    .execute(&mut *tx)
                    .await?;
                orphaned_path = Some(storage_path);
            }
        }

        tx.commit().await?;

        // Bytes go only after the metadata delete commits; a crash between
        // the two leaves a stray file, never a dangling row.
        if let Some(path) = orphaned_path {
            self.backend.delete(&path).await?;
            debug!(
                subsystem = "db",
                component = "attachments",
                op = "purge",
                attachment_id = %attachment_id,
                blob_id = %blob_id,
                "Attachment and backing blob purged"
            );
        } else {
            debug!(
                subsystem = "db",
                component = "attachments",
                op = "purge",
                attachment_id = %attachment_id,
                blob_id = %blob_id,
                "Attachment purged, blob retained by other references"
            );
        }

        Ok(())
    }

    async fn download(&self, attachment_id: Uuid) -> Result<AttachmentDownload> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT b.storage_path, b.content_type, a.filename
             FROM attachment a
             JOIN attachment_blob b ON a.blob_id = b.id
             WHERE a.id = $1",
        )
        .bind(attachment_id)
        .fetch_optional(&self.pool)
        .await?;

        let (storage_path, content_type, filename) =
            row.ok_or_else(|| Error::NotFound(format!("attachment {}", attachment_id)))?;

        let data = self.backend.read(&storage_path).await?;
        Ok(AttachmentDownload {
            data,
            content_type,
            filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_prefixed_and_stable() {
        let h1 = content_hash(b"same bytes");
        let h2 = content_hash(b"same bytes");
        let h3 = content_hash(b"other bytes");
        assert!(h1.starts_with("blake3:"));
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn blob_path_fans_out_by_hex_prefix() {
        let id = Uuid::now_v7();
        let path = blob_storage_path(&id);
        let hex = id.simple().to_string();
        assert!(path.starts_with(&format!("blobs/{}/{}/", &hex[0..2], &hex[2..4])));
        assert!(path.ends_with(".bin"));
    }

    #[test]
    fn default_config_matches_upload_policy() {
        let config = AttachmentConfig::default();
        assert_eq!(config.max_size_bytes, 8 * 1024 * 1024);
        assert!(config.allowed_content_types.iter().any(|t| t == "image/png"));
        assert!(config.allowed_content_types.iter().any(|t| t == "image/jpeg"));
        assert_eq!(config.allowed_content_types.len(), 2);
    }
}
