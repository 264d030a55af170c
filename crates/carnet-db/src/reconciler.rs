//! Note-attachment reconciliation.
//!
//! When a note's rich body changes, images that were deleted in the editor
//! leave stored attachments behind. The reconciler diffs the URLs the new
//! body references against the attachments the note owns and purges the
//! ones no longer referenced. It never touches an image the body still
//! points at, and references to URLs the note does not own are ignored.
//!
//! The pass is idempotent: on an unchanged body every owned attachment is
//! confirmed and nothing is purged, so a crash mid-pass is repaired by
//! simply running it again. Each purge is individually atomic; the pass as
//! a whole is deliberately not one transaction.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use carnet_core::{image_sources, AttachmentOwner, AttachmentStore, Result};

use crate::attachments::PgAttachmentStore;

/// Purges a note's attachments that its rich body no longer references.
pub struct NoteAttachmentReconciler {
    store: Arc<PgAttachmentStore>,
}

impl NoteAttachmentReconciler {
    pub fn new(store: Arc<PgAttachmentStore>) -> Self {
        Self { store }
    }

    /// Run one reconciliation pass against the note's current body.
    ///
    /// Walks the owned attachments in insertion order. An attachment whose
    /// resolved URL appears in the body's reference set is kept, and the
    /// URL is consumed so a second attachment resolving to the same URL
    /// cannot ride on it. Everything else is purged; a body referencing no
    /// images at all purges every owned attachment. Returns the number of
    /// attachments purged.
    pub async fn reconcile(&self, note_id: Uuid, html_body: Option<&str>) -> Result<usize> {
        let mut referenced = image_sources(html_body.unwrap_or(""));

        let owned = self
            .store
            .list_for_owner(AttachmentOwner::Note(note_id))
            .await?;
        let total = owned.len();

        let mut purged = 0;
        for attachment in owned {
            let url = self.store.resolve_url(&attachment);
            if referenced.remove(&url) {
                continue;
            }
            self.store.purge(attachment.id).await?;
            purged += 1;
        }

        // URLs still in `referenced` point at images this note does not
        // own (broken or foreign references); they are not an error.

        if purged > 0 {
            info!(
                subsystem = "db",
                component = "reconciler",
                op = "reconcile",
                note_id = %note_id,
                purged,
                kept = total - purged,
                "Purged unreferenced note images"
            );
        }

        Ok(purged)
    }
}
