use async_trait::async_trait;

use crate::error::SyncResult;
use crate::storage::note::{ContentUpdate, Note, NoteMeta};

/// The external note store.
///
/// Every call may suspend and may fail; nothing here touches the local cache.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Create an empty note; the store assigns uuid and timestamps
    async fn create_note(&self) -> SyncResult<Note>;

    /// Write the given fields and return the stored note with its new `last_changed`
    async fn update_note(&self, uuid: &str, update: &ContentUpdate) -> SyncResult<Note>;

    /// Returns `false` when no such note exists
    async fn delete_note(&self, uuid: &str) -> SyncResult<bool>;

    async fn list_notes(&self) -> SyncResult<Vec<Note>>;

    async fn list_notes_meta(&self) -> SyncResult<Vec<NoteMeta>>;

    async fn mark_favorite(&self, uuid: &str, favorite: bool) -> SyncResult<Note>;
}
