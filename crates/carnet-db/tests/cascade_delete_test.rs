//! Tests for cascade deletion down the resource tree.
//!
//! Deleting a project must remove every folder, note, task, membership and
//! attachment row beneath it and purge the backing blob files; deleting a
//! note takes its task and images with it. No orphan rows survive.

use carnet_db::test_fixtures::{png_bytes, TestDatabase};
use carnet_db::{AttachmentStore, AttachmentUpload, CreateTaskRequest, Error, TaskRepository};
use sqlx::PgPool;
use uuid::Uuid;

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count query")
}

async fn blob_paths(pool: &PgPool) -> Vec<String> {
    sqlx::query_scalar("SELECT storage_path FROM attachment_blob")
        .fetch_all(pool)
        .await
        .expect("blob path query")
}

fn png_upload(seed: u8) -> AttachmentUpload {
    AttachmentUpload {
        filename: format!("img{}.png", seed),
        content_type: "image/png".to_string(),
        data: png_bytes(seed),
    }
}

#[tokio::test]
async fn deleting_a_project_removes_the_whole_subtree() {
    let t = TestDatabase::new().await;
    let user = t.create_user("cascade@example.com").await;
    let project = t.create_project(user.id, "doomed").await;

    // Two folders, three notes, two tasks, two images.
    let folder_a = t.create_folder(project.id, "a").await;
    let folder_b = t.create_folder(project.id, "b").await;
    let note1 = t.create_note(project.id, folder_a.id, None).await;
    let note2 = t.create_note(project.id, folder_a.id, None).await;
    let note3 = t.create_note(project.id, folder_b.id, None).await;
    t.db.tasks
        .create(project.id, note1.id, CreateTaskRequest::default())
        .await
        .expect("task 1");
    t.db.tasks
        .create(project.id, note3.id, CreateTaskRequest::default())
        .await
        .expect("task 2");
    t.db.attachments
        .attach_to_note(note1.id, Some(0), png_upload(1))
        .await
        .expect("image 1");
    t.db.attachments
        .attach_to_note(note2.id, Some(0), png_upload(2))
        .await
        .expect("image 2");

    let paths = blob_paths(&t.pool).await;
    assert_eq!(paths.len(), 2);
    for path in &paths {
        assert!(
            t.blob_root.join(path).exists(),
            "blob file should exist before the delete"
        );
    }

    t.db.delete_project(project.id).await.expect("delete project");

    for table in ["folder", "note", "task", "attachment", "attachment_blob", "project_member"] {
        assert_eq!(count(&t.pool, table).await, 0, "orphan rows in {}", table);
    }
    assert_eq!(count(&t.pool, "project").await, 0);
    for path in &paths {
        assert!(
            !t.blob_root.join(path).exists(),
            "blob file must be purged with the project"
        );
    }

    // The user row is untouched.
    assert_eq!(count(&t.pool, "app_user").await, 1);

    t.cleanup().await;
}

#[tokio::test]
async fn deleting_a_note_takes_its_task_and_images() {
    let t = TestDatabase::new().await;
    let user = t.create_user("note-cascade@example.com").await;
    let project = t.create_project(user.id, "p").await;
    let folder = t.create_folder(project.id, "f").await;
    let doomed = t.create_note(project.id, folder.id, None).await;
    let survivor = t.create_note(project.id, folder.id, None).await;

    t.db.tasks
        .create(project.id, doomed.id, CreateTaskRequest::default())
        .await
        .expect("task");
    t.db.attachments
        .attach_to_note(doomed.id, Some(0), png_upload(1))
        .await
        .expect("doomed image");
    let kept = t
        .db
        .attachments
        .attach_to_note(survivor.id, Some(0), png_upload(2))
        .await
        .expect("surviving image");

    t.db.delete_note(doomed.id).await.expect("delete note");

    assert_eq!(count(&t.pool, "note").await, 1);
    assert_eq!(count(&t.pool, "task").await, 0);
    assert_eq!(count(&t.pool, "attachment").await, 1);
    assert_eq!(count(&t.pool, "attachment_blob").await, 1);

    // The sibling's image is still downloadable.
    let download = t
        .db
        .attachments
        .download(kept.attachment.id)
        .await
        .expect("sibling image untouched");
    assert_eq!(download.data, png_bytes(2));

    t.cleanup().await;
}

#[tokio::test]
async fn deleting_a_folder_clears_its_notes() {
    let t = TestDatabase::new().await;
    let user = t.create_user("folder-cascade@example.com").await;
    let project = t.create_project(user.id, "p").await;
    let doomed = t.create_folder(project.id, "doomed").await;
    let survivor = t.create_folder(project.id, "survivor").await;
    let note_in_doomed = t.create_note(project.id, doomed.id, None).await;
    t.create_note(project.id, survivor.id, None).await;
    t.db.attachments
        .attach_to_note(note_in_doomed.id, Some(0), png_upload(1))
        .await
        .expect("image");

    t.db.delete_folder(doomed.id).await.expect("delete folder");

    assert_eq!(count(&t.pool, "folder").await, 1);
    assert_eq!(count(&t.pool, "note").await, 1);
    assert_eq!(count(&t.pool, "attachment").await, 0);
    assert_eq!(count(&t.pool, "attachment_blob").await, 0);

    t.cleanup().await;
}

#[tokio::test]
async fn delete_of_missing_rows_reports_not_found() {
    let t = TestDatabase::new().await;

    let err = t.db.delete_project(Uuid::new_v4()).await.expect_err("no project");
    assert!(matches!(err, Error::NotFound(_)));

    let err = t.db.delete_folder(Uuid::new_v4()).await.expect_err("no folder");
    assert!(matches!(err, Error::NotFound(_)));

    let err = t.db.delete_note(Uuid::new_v4()).await.expect_err("no note");
    assert!(matches!(err, Error::NotFound(_)));

    t.cleanup().await;
}

#[tokio::test]
async fn delete_requires_no_version() {
    let t = TestDatabase::new().await;
    let user = t.create_user("unversioned-delete@example.com").await;
    let project = t.create_project(user.id, "p").await;
    let folder = t.create_folder(project.id, "f").await;
    let note = t.create_note(project.id, folder.id, None).await;
    let task = t
        .db
        .tasks
        .create(project.id, note.id, CreateTaskRequest::default())
        .await
        .expect("task");

    // No lock_version anywhere on the delete path.
    t.db.tasks.delete(task.id).await.expect("task delete");
    t.db.delete_note(note.id).await.expect("note delete");
    t.db.delete_folder(folder.id).await.expect("folder delete");
    t.db.delete_project(project.id).await.expect("project delete");

    t.cleanup().await;
}
