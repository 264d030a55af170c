//! Hierarchy authorization.
//!
//! Every operation below a project first resolves the project through the
//! principal's membership, then walks the claimed parent path one link at
//! a time. The two failure modes are deliberately different: a missing
//! membership is Forbidden, while a parent-link mismatch below an
//! authorized project is NotFound, so whether a sibling tenant's resource
//! exists is never revealed.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use carnet_core::{Error, Folder, HierarchyAuthorizer, Note, Project, Result, Task};

/// PostgreSQL implementation of HierarchyAuthorizer.
pub struct PgHierarchyAuthorizer {
    pool: PgPool,
}

impl PgHierarchyAuthorizer {
    /// Create a new PgHierarchyAuthorizer with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HierarchyAuthorizer for PgHierarchyAuthorizer {
    async fn project_for(&self, principal: Uuid, project_id: Uuid) -> Result<Project> {
        // Membership gate. A project the principal is not linked to is
        // indistinguishable from one that does not exist.
        let project: Option<Project> = sqlx::query_as(
            "SELECT p.id, p.name, p.description, p.lock_version, p.created_at, p.updated_at
             FROM project p
             JOIN project_member m ON m.project_id = p.id
             WHERE p.id = $1 AND m.user_id = $2",
        )
        .bind(project_id)
        .bind(principal)
        .fetch_optional(&self.pool)
        .await?;

        project.ok_or_else(|| {
            Error::Forbidden(format!(
                "user {} has no access to project {}",
                principal, project_id
            ))
        })
    }

    async fn folder_in_project(&self, project_id: Uuid, folder_id: Uuid) -> Result<Folder> {
        let folder: Option<Folder> = sqlx::query_as(
            "SELECT id, project_id, name, description, lock_version, created_at, updated_at
             FROM folder
             WHERE id = $1 AND project_id = $2",
        )
        .bind(folder_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        folder.ok_or_else(|| Error::NotFound(format!("folder {}", folder_id)))
    }

    async fn note_in_folder(
        &self,
        project_id: Uuid,
        folder_id: Uuid,
        note_id: Uuid,
    ) -> Result<Note> {
        let note: Option<Note> = sqlx::query_as(
            "SELECT id, project_id, folder_id, title, text_body, html_body,
                    lock_version, created_at, updated_at
             FROM note
             WHERE id = $1 AND folder_id = $2 AND project_id = $3",
        )
        .bind(note_id)
        .bind(folder_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        note.ok_or_else(|| Error::NotFound(format!("note {}", note_id)))
    }

    async fn note_in_project(&self, project_id: Uuid, note_id: Uuid) -> Result<Note> {
        let note: Option<Note> = sqlx::query_as(
            "SELECT id, project_id, folder_id, title, text_body, html_body,
                    lock_version, created_at, updated_at
             FROM note
             WHERE id = $1 AND project_id = $2",
        )
        .bind(note_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        note.ok_or_else(|| Error::NotFound(format!("note {}", note_id)))
    }

    async fn task_on_note(&self, note_id: Uuid, task_id: Uuid) -> Result<Task> {
        let task: Option<Task> = sqlx::query_as(
            "SELECT id, project_id, note_id, due_on, completed, lock_version,
                    created_at, updated_at
             FROM task
             WHERE id = $1 AND note_id = $2",
        )
        .bind(task_id)
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;

        task.ok_or_else(|| Error::NotFound(format!("task {}", task_id)))
    }
}
