//! # carnet-db
//!
//! PostgreSQL storage layer for the carnet note service.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for projects, folders, notes and tasks,
//!   all sharing one optimistic-lock update protocol
//! - A refcounted, content-addressed attachment store
//! - The note-attachment reconciler that garbage-collects images dropped
//!   from a note's rich body
//! - The hierarchy authorizer guarding the project → folder → note → task
//!   tree
//!
//! ## Example
//!
//! ```rust,ignore
//! use carnet_db::{AttachmentConfig, Database, FilesystemBackend};
//! use carnet_core::{CreateProjectRequest, ProjectRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = FilesystemBackend::new("/var/carnet/blobs");
//!     let db = Database::connect(
//!         "postgres://localhost/carnet",
//!         backend,
//!         AttachmentConfig::default(),
//!     )
//!     .await?;
//!
//!     let project = db.projects.create(principal, CreateProjectRequest {
//!         name: "field notes".into(),
//!         description: None,
//!     }).await?;
//!
//!     println!("Created project: {}", project.id);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

pub mod attachments;
pub mod authorize;
pub mod folders;
pub mod notes;
pub mod pool;
pub mod projects;
pub mod reconciler;
pub mod tasks;
mod versioned;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use carnet_core::*;

// Re-export repository implementations
pub use attachments::{
    blob_storage_path, content_hash, AttachmentConfig, FilesystemBackend, PgAttachmentStore,
    StorageBackend, DEFAULT_MAX_ATTACHMENT_BYTES,
};
pub use authorize::PgHierarchyAuthorizer;
pub use folders::PgFolderRepository;
pub use notes::PgNoteRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use projects::PgProjectRepository;
pub use reconciler::NoteAttachmentReconciler;
pub use tasks::PgTaskRepository;

/// Apply pending SQL migrations.
#[cfg(feature = "migrations")]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Config(format!("migration failed: {}", e)))
}

/// Aggregated handle over every repository, plus the composed operations
/// that span more than one of them (body-change reconciliation, cascade
/// deletes that also purge blob storage).
///
/// The individual repositories stay public for callers that need only one
/// of them; the composed methods here are the external mutation surface
/// for notes and deletes.
pub struct Database {
    pub pool: PgPool,
    pub projects: PgProjectRepository,
    pub folders: PgFolderRepository,
    pub notes: PgNoteRepository,
    pub tasks: PgTaskRepository,
    pub attachments: Arc<PgAttachmentStore>,
    pub authorizer: PgHierarchyAuthorizer,
    reconciler: NoteAttachmentReconciler,
}

impl Database {
    /// Assemble the repositories over an existing pool.
    pub fn new(
        pool: PgPool,
        backend: impl StorageBackend + 'static,
        attachment_config: AttachmentConfig,
    ) -> Self {
        let attachments = Arc::new(PgAttachmentStore::new(
            pool.clone(),
            backend,
            attachment_config,
        ));
        Self {
            projects: PgProjectRepository::new(pool.clone()),
            folders: PgFolderRepository::new(pool.clone()),
            notes: PgNoteRepository::new(pool.clone()),
            tasks: PgTaskRepository::new(pool.clone()),
            authorizer: PgHierarchyAuthorizer::new(pool.clone()),
            reconciler: NoteAttachmentReconciler::new(attachments.clone()),
            attachments,
            pool,
        }
    }

    /// Connect with default pool configuration and assemble the
    /// repositories.
    pub async fn connect(
        database_url: &str,
        backend: impl StorageBackend + 'static,
        attachment_config: AttachmentConfig,
    ) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::new(pool, backend, attachment_config))
    }

    /// The reconciler, for explicit re-runs (e.g. repairing a pass that
    /// was interrupted mid-purge; the pass is idempotent).
    pub fn reconciler(&self) -> &NoteAttachmentReconciler {
        &self.reconciler
    }

    /// Versioned note update followed, when the rich body changed, by an
    /// attachment reconciliation pass against the new body.
    pub async fn update_note(&self, note_id: Uuid, req: UpdateNoteRequest) -> Result<Note> {
        let outcome = self.notes.update(note_id, req).await?;
        if outcome.html_body_changed {
            self.reconciler
                .reconcile(note_id, outcome.note.html_body.as_deref())
                .await?;
        }
        Ok(outcome.note)
    }

    /// Delete a note: purge its images, then cascade the rows (the note's
    /// task goes with it).
    pub async fn delete_note(&self, note_id: Uuid) -> Result<()> {
        self.attachments.purge_for_note(note_id).await?;
        self.notes.delete(note_id).await
    }

    /// Delete a folder and everything under it, images included.
    pub async fn delete_folder(&self, folder_id: Uuid) -> Result<()> {
        for note_id in self.notes.ids_in_folder(folder_id).await? {
            self.attachments.purge_for_note(note_id).await?;
        }
        self.folders.delete(folder_id).await
    }

    /// Delete a project and everything under it, images included.
    pub async fn delete_project(&self, project_id: Uuid) -> Result<()> {
        for note_id in self.notes.ids_in_project(project_id).await? {
            self.attachments.purge_for_note(note_id).await?;
        }
        self.projects.delete(project_id).await
    }
}
