//! Task repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use carnet_core::{
    CreateTaskRequest, Error, Result, Task, TaskRepository, UpdateTaskRequest, ValidationErrors,
};

use crate::versioned::{is_unique_violation, require_version, stale_or_missing};

const TASK_COLUMNS: &str =
    "id, project_id, note_id, due_on, completed, lock_version, created_at, updated_at";

/// PostgreSQL implementation of TaskRepository.
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    /// Create a new PgTaskRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn create(
        &self,
        project_id: Uuid,
        note_id: Uuid,
        req: CreateTaskRequest,
    ) -> Result<Task> {
        // Parent ids come from the note row; the unique index on note_id
        // turns a second task for the same note into a constraint hit.
        let task: Option<Task> = sqlx::query_as(&format!(
            "INSERT INTO task (id, project_id, note_id, due_on, completed)
             SELECT $1, n.project_id, n.id, $4, $5
             FROM note n
             WHERE n.id = $3 AND n.project_id = $2
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(note_id)
        .bind(req.due_on)
        .bind(req.completed)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Validation(ValidationErrors::of("note", "already has a task"))
            } else {
                Error::Database(e)
            }
        })?;

        task.ok_or_else(|| Error::NotFound(format!("note {}", note_id)))
    }

    async fn get(&self, id: Uuid) -> Result<Task> {
        sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM task WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))
    }

    async fn update(&self, id: Uuid, req: UpdateTaskRequest) -> Result<Task> {
        let claimed = require_version("task", req.lock_version)?;

        let mut tx = self.pool.begin().await?;

        let updated: Option<Task> = sqlx::query_as(&format!(
            "UPDATE task
             SET due_on = $1, completed = $2,
                 lock_version = lock_version + 1, updated_at = now()
             WHERE id = $3 AND lock_version = $4
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(req.due_on)
        .bind(req.completed)
        .bind(id)
        .bind(claimed)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(task) => {
                tx.commit().await?;
                Ok(task)
            }
            None => Err(stale_or_missing(&mut tx, "task", "task", id).await),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM task WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("task {}", id)));
        }
        Ok(())
    }
}
