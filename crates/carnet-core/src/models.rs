//! Core data models for carnet.
//!
//! The resource tree is strict: Project → Folder → Note → Task, with
//! redundant parent pointers (a note carries both its folder and project)
//! validated at write time. Every mutable entity carries a `lock_version`
//! counter for optimistic concurrency.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated account. Session issuance lives outside the core;
/// repositories only ever see the user's id as the acting principal.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Root of the resource tree. Shared between members via [`ProjectMember`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership row linking a user to a project.
///
/// `is_owner` is set once at link time and drives only the
/// one-owned-project-per-user ceiling; authorization itself is membership,
/// not ownership.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectMember {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub is_owner: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Folder {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A folder joined with the number of incomplete tasks reachable through
/// its notes. Produced by folder listings for sidebar-style views.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FolderWithOpenTasks {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub folder: Folder,
    pub open_task_count: i64,
}

/// A note. `html_body` is the rich-text body whose `<img>` references
/// drive attachment reconciliation; `text_body` is the plain-text shadow
/// kept for search by outer layers.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Note {
    pub id: Uuid,
    pub project_id: Uuid,
    pub folder_id: Uuid,
    pub title: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The optional task carried by a note (at most one per note).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub note_id: Uuid,
    pub due_on: Option<NaiveDate>,
    pub completed: bool,
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The entity an attachment belongs to. Images are never shared: exactly
/// one note (embedded images) or one user (avatar) owns each attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum AttachmentOwner {
    Note(Uuid),
    User(Uuid),
}

/// Attachment metadata row. The bytes live in a refcounted
/// [`AttachmentBlob`]; several attachments may share one blob through
/// content deduplication, but each attachment row has exactly one owner.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub note_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub blob_id: Uuid,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    /// The owning entity. Exactly one of the owner columns is set,
    /// enforced by a table CHECK constraint.
    pub fn owner(&self) -> AttachmentOwner {
        match (self.note_id, self.user_id) {
            (Some(note_id), _) => AttachmentOwner::Note(note_id),
            (None, Some(user_id)) => AttachmentOwner::User(user_id),
            (None, None) => unreachable!("attachment row without owner"),
        }
    }
}

/// Content-addressed blob backing one or more attachments.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttachmentBlob {
    pub id: Uuid,
    pub content_hash: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub reference_count: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_owner_prefers_note_column() {
        let att = Attachment {
            id: Uuid::new_v4(),
            note_id: Some(Uuid::nil()),
            user_id: None,
            blob_id: Uuid::new_v4(),
            filename: "photo.png".into(),
            created_at: Utc::now(),
        };
        assert_eq!(att.owner(), AttachmentOwner::Note(Uuid::nil()));
    }

    #[test]
    fn attachment_owner_user_column() {
        let uid = Uuid::new_v4();
        let att = Attachment {
            id: Uuid::new_v4(),
            note_id: None,
            user_id: Some(uid),
            blob_id: Uuid::new_v4(),
            filename: "avatar.jpg".into(),
            created_at: Utc::now(),
        };
        assert_eq!(att.owner(), AttachmentOwner::User(uid));
    }
}
