//! Folder repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use carnet_core::{
    CreateFolderRequest, Error, Folder, FolderRepository, FolderWithOpenTasks, Result,
    UpdateFolderRequest, Validator, MAX_NAME_LEN,
};

use crate::versioned::{require_version, stale_or_missing};

const FOLDER_COLUMNS: &str =
    "id, project_id, name, description, lock_version, created_at, updated_at";

/// PostgreSQL implementation of FolderRepository.
pub struct PgFolderRepository {
    pool: PgPool,
}

impl PgFolderRepository {
    /// Create a new PgFolderRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate_fields(name: &str) -> Result<()> {
        let mut v = Validator::new();
        v.require("name", Some(name));
        v.max_len("name", Some(name), MAX_NAME_LEN);
        v.finish().map_err(Error::Validation)
    }
}

#[async_trait]
impl FolderRepository for PgFolderRepository {
    async fn create(&self, project_id: Uuid, req: CreateFolderRequest) -> Result<Folder> {
        Self::validate_fields(&req.name)?;

        // The project reference doubles as the existence check.
        let folder: Option<Folder> = sqlx::query_as(&format!(
            "INSERT INTO folder (id, project_id, name, description)
             SELECT $1, p.id, $3, $4 FROM project p WHERE p.id = $2
             RETURNING {FOLDER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(&req.name)
        .bind(&req.description)
        .fetch_optional(&self.pool)
        .await?;

        folder.ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
    }

    async fn get(&self, id: Uuid) -> Result<Folder> {
        sqlx::query_as(&format!("SELECT {FOLDER_COLUMNS} FROM folder WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("folder {}", id)))
    }

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Folder>> {
        let folders = sqlx::query_as(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folder
             WHERE project_id = $1
             ORDER BY created_at, id"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(folders)
    }

    async fn list_with_open_task_counts(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<FolderWithOpenTasks>> {
        let folders = sqlx::query_as(
            "SELECT f.id, f.project_id, f.name, f.description, f.lock_version,
                    f.created_at, f.updated_at,
                    COALESCE(c.cnt, 0) AS open_task_count
             FROM folder f
             LEFT JOIN (
                 SELECT n.folder_id, COUNT(t.id) AS cnt
                 FROM note n
                 JOIN task t ON t.note_id = n.id
                 WHERE NOT t.completed
                 GROUP BY n.folder_id
             ) c ON c.folder_id = f.id
             WHERE f.project_id = $1
             ORDER BY f.created_at, f.id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(folders)
    }

    async fn update(&self, id: Uuid, req: UpdateFolderRequest) -> Result<Folder> {
        let claimed = require_version("folder", req.lock_version)?;
        Self::validate_fields(&req.name)?;

        let mut tx = self.pool.begin().await?;

        let updated: Option<Folder> = sqlx::query_as(&format!(
            "UPDATE folder
             SET name = $1, description = $2,
                 lock_version = lock_version + 1, updated_at = now()
             WHERE id = $3 AND lock_version = $4
             RETURNING {FOLDER_COLUMNS}"
        ))
        .bind(&req.name)
        .bind(&req.description)
        .bind(id)
        .bind(claimed)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(folder) => {
                tx.commit().await?;
                Ok(folder)
            }
            None => Err(stale_or_missing(&mut tx, "folder", "folder", id).await),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM folder WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("folder {}", id)));
        }
        debug!(subsystem = "db", op = "delete_folder", folder_id = %id, "Folder deleted");
        Ok(())
    }
}
