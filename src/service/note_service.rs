use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::service::debounce::DEFAULT_DELAY;
use crate::service::editor::{EditState, NoteEditor};
use crate::service::listing::{self, ListSort};
use crate::storage::cache::{NoteCache, Scope};
use crate::storage::note::{Note, NoteMeta, NotePatch};
use crate::storage::remote::NoteStore;

pub const DEFAULT_REFETCH: Duration = Duration::from_secs(60);

/// One user session: the note cache, the store behind it and the note
/// currently open for editing.
pub struct NoteService {
    store: Arc<dyn NoteStore>,
    cache: NoteCache,
    editor: Option<NoteEditor>,
    debounce: Duration,
    refetch_every: Duration,
    logged_in: bool,
}

impl NoteService {
    pub fn new(store: Arc<dyn NoteStore>, logged_in: bool) -> Self {
        NoteService {
            store,
            cache: NoteCache::new(),
            editor: None,
            debounce: DEFAULT_DELAY,
            refetch_every: DEFAULT_REFETCH,
            logged_in,
        }
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn with_refetch_interval(mut self, every: Duration) -> Self {
        self.refetch_every = every;
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn cache(&self) -> &NoteCache {
        &self.cache
    }

    pub fn get(&self, uuid: &str) -> Option<&Note> {
        self.cache.get(uuid)
    }

    /// Reload every note from the store
    pub async fn refresh(&mut self) -> SyncResult<()> {
        let notes = self.store.list_notes().await?;
        debug!(count = notes.len(), "notes loaded");
        self.cache.replace_all(notes, Instant::now());

        let vanished = match &self.editor {
            Some(editor) if self.cache.contains(editor.uuid()) => {
                editor.reapply(&mut self.cache);
                false
            }
            Some(editor) => {
                info!(uuid = %editor.uuid(), "open note disappeared from the store");
                true
            }
            None => false,
        };
        if vanished {
            self.close_editor();
        }
        Ok(())
    }

    /// Mark cached data stale; the next `refresh_if_stale` goes to the store
    pub fn invalidate(&mut self, scope: Scope) {
        debug!(?scope, "cache invalidated");
        self.cache.invalidate(scope);
    }

    /// Refetch when any cached scope was invalidated or the refetch interval elapsed
    pub async fn refresh_if_stale(&mut self) -> SyncResult<bool> {
        let due = match self.cache.loaded_at() {
            Some(at) => at + self.refetch_every <= Instant::now(),
            None => true,
        };
        if due || self.cache.is_stale(&Scope::All) {
            self.refresh().await?;
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn create_note(&mut self) -> SyncResult<Note> {
        let note = self.store.create_note().await?;
        info!(uuid = %note.uuid, "note created");
        self.cache.insert(note.clone());
        self.cache.invalidate(Scope::Lists);
        Ok(note)
    }

    /// Delete a note. Returns false if the store had no such note.
    ///
    /// The cache entry is only dropped once the store confirms.
    pub async fn delete_note(&mut self, uuid: &str) -> SyncResult<bool> {
        let deleted = match self.store.delete_note(uuid).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(uuid, error = %e, "delete failed");
                return Err(e);
            }
        };
        if !deleted {
            debug!(uuid, "delete of unknown note");
            return Ok(false);
        }

        info!(uuid, "note deleted");
        if self.editor.as_ref().is_some_and(|e| e.uuid() == uuid) {
            self.close_editor();
        }
        self.cache.remove(uuid);
        self.cache.invalidate(Scope::Lists);
        Ok(true)
    }

    /// Flip the favorite flag optimistically; rolled back if the store refuses
    pub async fn set_favorite(&mut self, uuid: &str, favorite: bool) -> SyncResult<()> {
        let previous = self.cache.get(uuid).map(|n| n.favorite);
        self.cache.set(uuid, &NotePatch::favorite(favorite));

        match self.store.mark_favorite(uuid, favorite).await {
            Ok(note) => {
                self.cache.set(uuid, &NotePatch::favorite(note.favorite));
                self.cache.stamp(uuid, note.last_changed);
                Ok(())
            }
            Err(e) => {
                warn!(uuid, error = %e, "marking favorite failed");
                if let Some(previous) = previous {
                    self.cache.set(uuid, &NotePatch::favorite(previous));
                }
                Err(e)
            }
        }
    }

    /// Open a note for editing, closing any other open note.
    ///
    /// Returns false if the note is not cached.
    pub fn open_editor(&mut self, uuid: &str) -> bool {
        if self.editor.as_ref().is_some_and(|e| e.uuid() == uuid) {
            return true;
        }
        self.close_editor();
        match self.cache.get(uuid) {
            Some(note) => {
                self.editor = Some(NoteEditor::open(note, Arc::clone(&self.store), self.debounce));
                true
            }
            None => false,
        }
    }

    pub fn close_editor(&mut self) {
        if let Some(editor) = self.editor.take() {
            editor.close();
        }
    }

    pub fn editor(&self) -> Option<&NoteEditor> {
        self.editor.as_ref()
    }

    pub fn update_title(&mut self, title: impl Into<String>) {
        if let Some(editor) = self.editor.as_mut() {
            editor.update_title(&mut self.cache, title);
        }
    }

    pub fn update_text(&mut self, text: impl Into<String>) {
        if let Some(editor) = self.editor.as_mut() {
            editor.update_text(&mut self.cache, text);
        }
    }

    pub fn save_now(&mut self) {
        if let Some(editor) = self.editor.as_mut() {
            editor.save_now();
        }
    }

    pub fn retry_save(&mut self) {
        if let Some(editor) = self.editor.as_mut() {
            editor.retry_save();
        }
    }

    pub fn updating(&self) -> bool {
        self.editor.as_ref().is_some_and(|e| e.updating())
    }

    /// Non-blocking editor progress, for the UI tick
    pub fn poll(&mut self) -> Option<EditState> {
        let editor = self.editor.as_mut()?;
        Some(editor.poll(&mut self.cache))
    }

    /// Await until the open editor has nothing pending or in flight
    pub async fn settle(&mut self) -> Option<EditState> {
        let editor = self.editor.as_mut()?;
        Some(editor.settle(&mut self.cache).await)
    }

    pub fn all(&self, sort: ListSort) -> Vec<NoteMeta> {
        let mut notes = self.cache.list_meta();
        sort.sort(&mut notes);
        notes
    }

    pub fn favorites(&self) -> Vec<NoteMeta> {
        listing::favorites(self.cache.list_meta())
    }

    pub fn latest(&self, limit: usize) -> Vec<NoteMeta> {
        listing::latest(self.cache.list_meta(), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn refresh_if_stale_respects_interval() {
        let store = Arc::new(MemoryStore::new());
        let mut service =
            NoteService::new(store.clone(), true).with_refetch_interval(Duration::from_secs(60));

        assert!(service.refresh_if_stale().await.unwrap());
        assert!(!service.refresh_if_stale().await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(service.refresh_if_stale().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn create_invalidates_lists() {
        let store = Arc::new(MemoryStore::new());
        let mut service = NoteService::new(store, true);
        service.refresh().await.unwrap();

        let note = service.create_note().await.unwrap();
        assert!(service.get(&note.uuid).is_some());
        assert!(service.cache().is_stale(&Scope::Lists));
        assert!(service.refresh_if_stale().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_favorite_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        let mut service = NoteService::new(store.clone(), true);
        let note = service.create_note().await.unwrap();

        store.set_offline(true);
        assert!(service.set_favorite(&note.uuid, true).await.is_err());
        assert!(!service.get(&note.uuid).unwrap().favorite);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delete_keeps_local_entry() {
        let store = Arc::new(MemoryStore::new());
        let mut service = NoteService::new(store.clone(), true);
        let note = service.create_note().await.unwrap();

        store.set_offline(true);
        assert!(service.delete_note(&note.uuid).await.is_err());
        assert!(service.get(&note.uuid).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_unsent_typing_visible() {
        let store = Arc::new(MemoryStore::new());
        let mut service = NoteService::new(store, true);
        let note = service.create_note().await.unwrap();
        assert!(service.open_editor(&note.uuid));

        service.update_text("still typing");
        service.refresh().await.unwrap();

        assert_eq!(service.get(&note.uuid).unwrap().text, "still typing");
        assert!(service.updating());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_closes_editor_of_vanished_note() {
        let store = Arc::new(MemoryStore::new());
        let mut service = NoteService::new(store.clone(), true);
        let note = service.create_note().await.unwrap();
        service.open_editor(&note.uuid);

        store.delete_note(&note.uuid).await.unwrap();
        service.refresh().await.unwrap();

        assert!(service.editor().is_none());
        assert!(service.get(&note.uuid).is_none());
    }

    #[test]
    fn open_editor_on_unknown_note_fails() {
        let mut service = NoteService::new(Arc::new(MemoryStore::new()), false);
        assert!(!service.open_editor("nope"));
        assert!(service.editor().is_none());
        assert!(!service.is_logged_in());
    }
}
