//! Repository traits for the carnet storage layer.
//!
//! These traits define the seams between the core and its concrete
//! PostgreSQL implementations, enabling pluggable backends and testability.
//! Every mutating call takes the acting principal or a parent reference
//! explicitly; there is no ambient request state.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Full-record project update. `lock_version` is the version the caller
/// believes is current; `None` is rejected before storage is touched.
#[derive(Debug, Clone, Default)]
pub struct UpdateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub lock_version: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateFolderRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateFolderRequest {
    pub name: String,
    pub description: Option<String>,
    pub lock_version: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateNoteRequest {
    pub title: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub lock_version: Option<i32>,
}

/// Result of a successful note update. `html_body_changed` tells the
/// caller whether attachment reconciliation must run.
#[derive(Debug, Clone)]
pub struct NoteUpdateOutcome {
    pub note: Note,
    pub html_body_changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateTaskRequest {
    pub due_on: Option<NaiveDate>,
    pub completed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskRequest {
    pub due_on: Option<NaiveDate>,
    pub completed: bool,
    pub lock_version: Option<i32>,
}

/// An image payload submitted for attachment.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Result of attaching an image to a note: the new attachment plus the
/// note's post-bump lock_version, which the caller needs for its next
/// update.
#[derive(Debug, Clone)]
pub struct NoteImageAttachment {
    pub attachment: Attachment,
    pub note_lock_version: i32,
}

/// Downloaded attachment content.
#[derive(Debug, Clone)]
pub struct AttachmentDownload {
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Repository for project CRUD and membership.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Create a project owned by `principal`.
    ///
    /// Fails with an accumulated validation error when the principal
    /// already owns a project; the ownership probe and both inserts run
    /// in one transaction.
    async fn create(&self, principal: Uuid, req: CreateProjectRequest) -> Result<Project>;

    async fn get(&self, id: Uuid) -> Result<Project>;

    /// Projects the user is a member of, in creation order.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Project>>;

    /// Versioned full-record update.
    async fn update(&self, id: Uuid, req: UpdateProjectRequest) -> Result<Project>;

    /// Unconditional delete; cascades to folders, notes, tasks, and
    /// memberships. Blob storage cleanup is composed one level up.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Link a user to the project. The new member becomes owner only if
    /// they own no project yet.
    async fn add_member(&self, project_id: Uuid, user_id: Uuid) -> Result<ProjectMember>;

    async fn members(&self, project_id: Uuid) -> Result<Vec<ProjectMember>>;
}

/// Repository for folder CRUD.
#[async_trait]
pub trait FolderRepository: Send + Sync {
    async fn create(&self, project_id: Uuid, req: CreateFolderRequest) -> Result<Folder>;

    async fn get(&self, id: Uuid) -> Result<Folder>;

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Folder>>;

    /// Folder listing with the count of incomplete tasks reachable
    /// through each folder's notes.
    async fn list_with_open_task_counts(&self, project_id: Uuid)
        -> Result<Vec<FolderWithOpenTasks>>;

    async fn update(&self, id: Uuid, req: UpdateFolderRequest) -> Result<Folder>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Repository for note CRUD.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Create a note under `folder_id`, which must belong to `project_id`.
    async fn create(&self, project_id: Uuid, folder_id: Uuid, req: CreateNoteRequest)
        -> Result<Note>;

    async fn get(&self, id: Uuid) -> Result<Note>;

    async fn list_by_folder(&self, folder_id: Uuid) -> Result<Vec<Note>>;

    /// Flattened "all notes" listing across every folder of a project.
    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Note>>;

    /// Versioned full-record update. The outcome reports whether the
    /// rich body changed so attachment reconciliation can be triggered.
    async fn update(&self, id: Uuid, req: UpdateNoteRequest) -> Result<NoteUpdateOutcome>;

    /// Unconditional delete; cascades to the note's task. Image purging
    /// is composed one level up.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Ids of all notes in a folder (cascade-delete support).
    async fn ids_in_folder(&self, folder_id: Uuid) -> Result<Vec<Uuid>>;

    /// Ids of all notes in a project (cascade-delete support).
    async fn ids_in_project(&self, project_id: Uuid) -> Result<Vec<Uuid>>;
}

/// Repository for task CRUD.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create the task for a note. A note holds at most one task; a
    /// second create fails with a validation error on the note reference.
    async fn create(&self, project_id: Uuid, note_id: Uuid, req: CreateTaskRequest)
        -> Result<Task>;

    async fn get(&self, id: Uuid) -> Result<Task>;

    async fn update(&self, id: Uuid, req: UpdateTaskRequest) -> Result<Task>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Content-addressable store for image attachments.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Attach an image to a note, bumping the note's lock_version in the
    /// same transaction as the metadata insert. Additive: existing
    /// attachments are never replaced.
    async fn attach_to_note(
        &self,
        note_id: Uuid,
        claimed_version: Option<i32>,
        upload: AttachmentUpload,
    ) -> Result<NoteImageAttachment>;

    /// Attach an image owned directly by a user (avatar). Users carry no
    /// version counter.
    async fn attach_to_user(&self, user_id: Uuid, upload: AttachmentUpload) -> Result<Attachment>;

    /// All attachments of one owner, in insertion order.
    async fn list_for_owner(&self, owner: AttachmentOwner) -> Result<Vec<Attachment>>;

    /// Durable URL for an attachment. Stable across calls for the same
    /// row; body references are matched against this string verbatim.
    fn resolve_url(&self, attachment: &Attachment) -> String;

    /// Idempotent hard delete: removes the metadata row, and the backing
    /// blob (row and bytes) once no other attachment references it.
    async fn purge(&self, attachment_id: Uuid) -> Result<()>;

    async fn download(&self, attachment_id: Uuid) -> Result<AttachmentDownload>;
}

/// Resolves and authorizes the resource tree for a request path.
///
/// Membership gates the project; below it, parent-link mismatches are
/// reported as NotFound so sibling tenants' resources stay invisible.
#[async_trait]
pub trait HierarchyAuthorizer: Send + Sync {
    /// The project, iff `principal` is a member of it. Nonexistent
    /// projects are Forbidden too: the membership gate leaks nothing.
    async fn project_for(&self, principal: Uuid, project_id: Uuid) -> Result<Project>;

    /// The folder, iff it belongs to the project.
    async fn folder_in_project(&self, project_id: Uuid, folder_id: Uuid) -> Result<Folder>;

    /// The note, iff it belongs to the folder and the folder's project.
    async fn note_in_folder(&self, project_id: Uuid, folder_id: Uuid, note_id: Uuid)
        -> Result<Note>;

    /// The note, iff it belongs to the project (flattened access).
    async fn note_in_project(&self, project_id: Uuid, note_id: Uuid) -> Result<Note>;

    /// The task, iff it belongs to the note.
    async fn task_on_note(&self, note_id: Uuid, task_id: Uuid) -> Result<Task>;
}
