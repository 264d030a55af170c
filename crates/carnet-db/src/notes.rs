//! Note repository implementation.
//!
//! Notes carry redundant parent pointers (folder and project); the insert
//! derives both from the folder row so they can never disagree. The update
//! path reports whether the rich body changed, which is what triggers
//! attachment reconciliation one level up.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use carnet_core::{
    CreateNoteRequest, Error, Note, NoteRepository, NoteUpdateOutcome, Result, UpdateNoteRequest,
    Validator, MAX_NAME_LEN,
};

use crate::versioned::{require_version, stale_or_missing};

const NOTE_COLUMNS: &str = "id, project_id, folder_id, title, text_body, html_body, \
                            lock_version, created_at, updated_at";

/// PostgreSQL implementation of NoteRepository.
pub struct PgNoteRepository {
    pool: PgPool,
}

impl PgNoteRepository {
    /// Create a new PgNoteRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate_fields(title: Option<&str>) -> Result<()> {
        let mut v = Validator::new();
        v.max_len("title", title, MAX_NAME_LEN);
        v.finish().map_err(Error::Validation)
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create(
        &self,
        project_id: Uuid,
        folder_id: Uuid,
        req: CreateNoteRequest,
    ) -> Result<Note> {
        Self::validate_fields(req.title.as_deref())?;

        // Deriving both parent ids from the folder row enforces the
        // folder-belongs-to-project invariant at write time.
        let note: Option<Note> = sqlx::query_as(&format!(
            "INSERT INTO note (id, project_id, folder_id, title, text_body, html_body)
             SELECT $1, f.project_id, f.id, $4, $5, $6
             FROM folder f
             WHERE f.id = $3 AND f.project_id = $2
             RETURNING {NOTE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(folder_id)
        .bind(&req.title)
        .bind(&req.text_body)
        .bind(&req.html_body)
        .fetch_optional(&self.pool)
        .await?;

        note.ok_or_else(|| Error::NotFound(format!("folder {}", folder_id)))
    }

    async fn get(&self, id: Uuid) -> Result<Note> {
        sqlx::query_as(&format!("SELECT {NOTE_COLUMNS} FROM note WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("note {}", id)))
    }

    async fn list_by_folder(&self, folder_id: Uuid) -> Result<Vec<Note>> {
        let notes = sqlx::query_as(&format!(
            "SELECT {NOTE_COLUMNS} FROM note
             WHERE folder_id = $1
             ORDER BY created_at, id"
        ))
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notes)
    }

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Note>> {
        // Flattened view: newest first, matching reading order in the UI.
        let notes = sqlx::query_as(&format!(
            "SELECT {NOTE_COLUMNS} FROM note
             WHERE project_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notes)
    }

    async fn update(&self, id: Uuid, req: UpdateNoteRequest) -> Result<NoteUpdateOutcome> {
        let claimed = require_version("note", req.lock_version)?;
        Self::validate_fields(req.title.as_deref())?;

        let mut tx = self.pool.begin().await?;

        // The previous body is read in the same transaction as the swap so
        // the change signal cannot be confused by a concurrent writer.
        let previous_body: Option<Option<String>> =
            sqlx::query_scalar("SELECT html_body FROM note WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(previous_body) = previous_body else {
            return Err(Error::NotFound(format!("note {}", id)));
        };

        let updated: Option<Note> = sqlx::query_as(&format!(
            "UPDATE note
             SET title = $1, text_body = $2, html_body = $3,
                 lock_version = lock_version + 1, updated_at = now()
             WHERE id = $4 AND lock_version = $5
             RETURNING {NOTE_COLUMNS}"
        ))
        .bind(&req.title)
        .bind(&req.text_body)
        .bind(&req.html_body)
        .bind(id)
        .bind(claimed)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(note) => {
                tx.commit().await?;
                let html_body_changed = previous_body != note.html_body;
                debug!(
                    subsystem = "db",
                    op = "update_note",
                    note_id = %id,
                    lock_version = note.lock_version,
                    html_body_changed,
                    "Note updated"
                );
                Ok(NoteUpdateOutcome {
                    note,
                    html_body_changed,
                })
            }
            None => Err(stale_or_missing(&mut tx, "note", "note", id).await),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM note WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("note {}", id)));
        }
        debug!(subsystem = "db", op = "delete_note", note_id = %id, "Note deleted");
        Ok(())
    }

    async fn ids_in_folder(&self, folder_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT id FROM note WHERE folder_id = $1")
            .bind(folder_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn ids_in_project(&self, project_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT id FROM note WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
