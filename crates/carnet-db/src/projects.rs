//! Project repository implementation.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use carnet_core::{
    CreateProjectRequest, Error, Project, ProjectMember, ProjectRepository, Result,
    UpdateProjectRequest, ValidationErrors, Validator, MAX_NAME_LEN,
};

use crate::versioned::{require_version, stale_or_missing};

const PROJECT_COLUMNS: &str = "id, name, description, lock_version, created_at, updated_at";

/// Map a membership insert failure onto the business rule it violated.
///
/// The partial unique index on `(user_id) WHERE is_owner` backs the
/// ownership ceiling, so a racing second create surfaces here rather than
/// slipping past the in-transaction probe.
fn member_insert_error(e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some("project_member_one_owner_idx") => Error::Validation(ValidationErrors::of(
                    "base",
                    "user already owns a project",
                )),
                _ => Error::Validation(ValidationErrors::of(
                    "user",
                    "is already a member of this project",
                )),
            };
        }
        if db.is_foreign_key_violation() {
            return Error::NotFound("project or user".to_string());
        }
    }
    Error::Database(e)
}

/// PostgreSQL implementation of ProjectRepository.
pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    /// Create a new PgProjectRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate_fields(name: &str) -> Result<()> {
        let mut v = Validator::new();
        v.require("name", Some(name));
        v.max_len("name", Some(name), MAX_NAME_LEN);
        v.finish().map_err(Error::Validation)
    }

    /// Whether the user already owns a project. Runs inside the caller's
    /// transaction so the ceiling probe and the insert cannot race.
    async fn owns_a_project(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<bool> {
        let owns: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM project_member WHERE user_id = $1 AND is_owner)",
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(owns)
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn create(&self, principal: Uuid, req: CreateProjectRequest) -> Result<Project> {
        Self::validate_fields(&req.name)?;

        let mut tx = self.pool.begin().await?;

        if Self::owns_a_project(&mut tx, principal).await? {
            return Err(Error::Validation(ValidationErrors::of(
                "base",
                "user already owns a project",
            )));
        }

        let project: Project = sqlx::query_as(&format!(
            "INSERT INTO project (id, name, description)
             VALUES ($1, $2, $3)
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(&req.description)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO project_member (id, user_id, project_id, is_owner)
             VALUES ($1, $2, $3, true)",
        )
        .bind(Uuid::new_v4())
        .bind(principal)
        .bind(project.id)
        .execute(&mut *tx)
        .await
        .map_err(member_insert_error)?;

        tx.commit().await?;

        info!(
            subsystem = "db",
            op = "create_project",
            project_id = %project.id,
            owner = %principal,
            "Project created"
        );
        Ok(project)
    }

    async fn get(&self, id: Uuid) -> Result<Project> {
        sqlx::query_as(&format!("SELECT {PROJECT_COLUMNS} FROM project WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", id)))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Project>> {
        let projects = sqlx::query_as(
            "SELECT p.id, p.name, p.description, p.lock_version, p.created_at, p.updated_at
             FROM project p
             JOIN project_member m ON m.project_id = p.id
             WHERE m.user_id = $1
             ORDER BY p.created_at, p.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    async fn update(&self, id: Uuid, req: UpdateProjectRequest) -> Result<Project> {
        let claimed = require_version("project", req.lock_version)?;
        Self::validate_fields(&req.name)?;

        let mut tx = self.pool.begin().await?;

        let updated: Option<Project> = sqlx::query_as(&format!(
            "UPDATE project
             SET name = $1, description = $2,
                 lock_version = lock_version + 1, updated_at = now()
             WHERE id = $3 AND lock_version = $4
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(&req.name)
        .bind(&req.description)
        .bind(id)
        .bind(claimed)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(project) => {
                tx.commit().await?;
                Ok(project)
            }
            None => Err(stale_or_missing(&mut tx, "project", "project", id).await),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM project WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("project {}", id)));
        }
        debug!(subsystem = "db", op = "delete_project", project_id = %id, "Project deleted");
        Ok(())
    }

    async fn add_member(&self, project_id: Uuid, user_id: Uuid) -> Result<ProjectMember> {
        let mut tx = self.pool.begin().await?;

        // A newly linked user becomes owner only if they own nothing yet.
        let is_owner = !Self::owns_a_project(&mut tx, user_id).await?;

        let member: ProjectMember = sqlx::query_as(
            "INSERT INTO project_member (id, user_id, project_id, is_owner)
             VALUES ($1, $2, $3, $4)
             RETURNING id, user_id, project_id, is_owner, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(project_id)
        .bind(is_owner)
        .fetch_one(&mut *tx)
        .await
        .map_err(member_insert_error)?;

        tx.commit().await?;
        Ok(member)
    }

    async fn members(&self, project_id: Uuid) -> Result<Vec<ProjectMember>> {
        let members = sqlx::query_as(
            "SELECT id, user_id, project_id, is_owner, created_at
             FROM project_member
             WHERE project_id = $1
             ORDER BY created_at, id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }
}
