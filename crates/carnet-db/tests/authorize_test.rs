//! Tests for hierarchy authorization.
//!
//! Membership gates the project and fails Forbidden; below an authorized
//! project, parent-link mismatches fail NotFound so resources belonging to
//! other tenants are indistinguishable from missing ones.

use carnet_db::test_fixtures::TestDatabase;
use carnet_db::{CreateTaskRequest, Error, HierarchyAuthorizer, ProjectRepository, TaskRepository};
use uuid::Uuid;

#[tokio::test]
async fn member_resolves_project() {
    let t = TestDatabase::new().await;
    let owner = t.create_user("owner@example.com").await;
    let project = t.create_project(owner.id, "shared").await;

    let resolved = t
        .db
        .authorizer
        .project_for(owner.id, project.id)
        .await
        .expect("owner is a member");
    assert_eq!(resolved.id, project.id);

    // Plain membership is enough; ownership is not required.
    let teammate = t.create_user("teammate@example.com").await;
    t.db.projects
        .add_member(project.id, teammate.id)
        .await
        .expect("add member");
    let resolved = t
        .db
        .authorizer
        .project_for(teammate.id, project.id)
        .await
        .expect("non-owner member is authorized");
    assert_eq!(resolved.id, project.id);

    t.cleanup().await;
}

#[tokio::test]
async fn non_member_is_forbidden() {
    let t = TestDatabase::new().await;
    let owner = t.create_user("a@example.com").await;
    let outsider = t.create_user("b@example.com").await;
    let project = t.create_project(owner.id, "private").await;

    let err = t
        .db
        .authorizer
        .project_for(outsider.id, project.id)
        .await
        .expect_err("outsider must not resolve the project");
    assert!(matches!(err, Error::Forbidden(_)));

    t.cleanup().await;
}

#[tokio::test]
async fn nonexistent_project_is_forbidden_not_not_found() {
    let t = TestDatabase::new().await;
    let user = t.create_user("c@example.com").await;

    // The membership gate answers identically for "not yours" and "not
    // there".
    let err = t
        .db
        .authorizer
        .project_for(user.id, Uuid::new_v4())
        .await
        .expect_err("unknown project");
    assert!(matches!(err, Error::Forbidden(_)));

    t.cleanup().await;
}

#[tokio::test]
async fn folder_from_another_project_is_not_found() {
    let t = TestDatabase::new().await;
    let u1 = t.create_user("u1@example.com").await;
    let u2 = t.create_user("u2@example.com").await;
    let mine = t.create_project(u1.id, "mine").await;
    let theirs = t.create_project(u2.id, "theirs").await;
    let their_folder = t.create_folder(theirs.id, "secret").await;

    let err = t
        .db
        .authorizer
        .folder_in_project(mine.id, their_folder.id)
        .await
        .expect_err("cross-project folder lookup");
    assert!(
        matches!(err, Error::NotFound(_)),
        "mismatch below the project is NotFound, got {:?}",
        err
    );

    t.cleanup().await;
}

#[tokio::test]
async fn note_must_match_both_parents() {
    let t = TestDatabase::new().await;
    let user = t.create_user("parents@example.com").await;
    let project = t.create_project(user.id, "p").await;
    let folder_a = t.create_folder(project.id, "a").await;
    let folder_b = t.create_folder(project.id, "b").await;
    let note = t.create_note(project.id, folder_a.id, None).await;

    // Correct path resolves.
    t.db.authorizer
        .note_in_folder(project.id, folder_a.id, note.id)
        .await
        .expect("correct parent path");

    // Same project, wrong folder: hidden.
    let err = t
        .db
        .authorizer
        .note_in_folder(project.id, folder_b.id, note.id)
        .await
        .expect_err("wrong folder claimed");
    assert!(matches!(err, Error::NotFound(_)));

    // Flattened access by project alone also resolves.
    t.db.authorizer
        .note_in_project(project.id, note.id)
        .await
        .expect("flattened all-notes access");

    // But not under a different project.
    let err = t
        .db
        .authorizer
        .note_in_project(Uuid::new_v4(), note.id)
        .await
        .expect_err("wrong project claimed");
    assert!(matches!(err, Error::NotFound(_)));

    t.cleanup().await;
}

#[tokio::test]
async fn task_must_belong_to_the_claimed_note() {
    let t = TestDatabase::new().await;
    let user = t.create_user("tasks@example.com").await;
    let project = t.create_project(user.id, "p").await;
    let folder = t.create_folder(project.id, "f").await;
    let note_a = t.create_note(project.id, folder.id, None).await;
    let note_b = t.create_note(project.id, folder.id, None).await;
    let task = t
        .db
        .tasks
        .create(project.id, note_a.id, CreateTaskRequest::default())
        .await
        .expect("task create");

    t.db.authorizer
        .task_on_note(note_a.id, task.id)
        .await
        .expect("correct note");

    let err = t
        .db
        .authorizer
        .task_on_note(note_b.id, task.id)
        .await
        .expect_err("wrong note claimed");
    assert!(matches!(err, Error::NotFound(_)));

    t.cleanup().await;
}
