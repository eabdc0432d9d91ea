use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::service::debounce::Debounced;
use crate::storage::cache::{NoteCache, Scope};
use crate::storage::note::{ContentUpdate, Note, NotePatch};
use crate::storage::remote::NoteStore;

/// The editable part of a note
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub text: String,
}

impl From<&Note> for Draft {
    fn from(note: &Note) -> Self {
        Draft {
            title: note.title.clone(),
            text: note.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Idle,
    /// Debounce window open
    Pending,
    /// Update request in flight
    Syncing,
    Synced,
}

/// An update request that has not answered yet
struct Flight {
    update: ContentUpdate,
    /// Local edit counter when the request left
    edit_mark: u64,
}

/// Turns keystrokes on one note into optimistic cache writes and debounced
/// `update_note` calls.
///
/// Responses are reconciled per field by request id, not arrival order: a
/// field is taken from a response only if no newer response for that field
/// was already applied and the field was not edited locally after the
/// request left.
pub struct NoteEditor {
    uuid: String,
    store: Arc<dyn NoteStore>,
    draft: Debounced<Draft>,
    /// Values the store has acknowledged
    confirmed: Draft,
    /// Request ids of the newest acknowledged title and text
    title_acked: u64,
    text_acked: u64,
    state: EditState,
    edits: u64,
    title_mark: u64,
    text_mark: u64,
    requests: u64,
    /// Newest request whose `last_changed` reached the cache
    stamped: u64,
    /// Newest request that failed
    failed: u64,
    flights: BTreeMap<u64, Flight>,
    tasks: HashMap<Id, u64>,
    in_flight: JoinSet<SyncResult<Note>>,
    last_error: Option<SyncError>,
}

impl NoteEditor {
    pub fn open(note: &Note, store: Arc<dyn NoteStore>, delay: Duration) -> Self {
        let draft = Draft::from(note);
        debug!(uuid = %note.uuid, "editor opened");
        NoteEditor {
            uuid: note.uuid.clone(),
            store,
            draft: Debounced::new(draft.clone(), delay),
            confirmed: draft,
            title_acked: 0,
            text_acked: 0,
            state: EditState::Idle,
            edits: 0,
            title_mark: 0,
            text_mark: 0,
            requests: 0,
            stamped: 0,
            failed: 0,
            flights: BTreeMap::new(),
            tasks: HashMap::new(),
            in_flight: JoinSet::new(),
            last_error: None,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn title(&self) -> &str {
        &self.draft.latest().title
    }

    pub fn text(&self) -> &str {
        &self.draft.latest().text
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    /// True while a debounce window is open or a write is in flight
    pub fn updating(&self) -> bool {
        self.draft.is_pending() || !self.flights.is_empty()
    }

    /// The error of the newest failed write, kept until every edit has
    /// reached the store
    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    /// Whether the draft holds values the store has not acknowledged
    pub fn is_dirty(&self) -> bool {
        *self.draft.latest() != self.confirmed
    }

    pub fn update_title(&mut self, cache: &mut NoteCache, title: impl Into<String>) {
        let title = title.into();
        if title == self.draft.latest().title {
            return;
        }
        self.edits += 1;
        self.title_mark = self.edits;
        let patch = NotePatch::title(title.clone());
        let next = Draft {
            title,
            text: self.draft.latest().text.clone(),
        };
        self.edit(cache, next, patch);
    }

    pub fn update_text(&mut self, cache: &mut NoteCache, text: impl Into<String>) {
        let text = text.into();
        if text == self.draft.latest().text {
            return;
        }
        self.edits += 1;
        self.text_mark = self.edits;
        let patch = NotePatch::text(text.clone());
        let next = Draft {
            title: self.draft.latest().title.clone(),
            text,
        };
        self.edit(cache, next, patch);
    }

    /// Optimistic cache write, then (re)start the debounce window
    fn edit(&mut self, cache: &mut NoteCache, next: Draft, patch: NotePatch) {
        if !cache.set(&self.uuid, &patch) {
            debug!(uuid = %self.uuid, "edited note is not cached");
        }
        self.draft.set(next, Instant::now());
        self.refresh_state();
    }

    /// Non-blocking progress: fire a settled write and reconcile finished ones
    pub fn poll(&mut self, cache: &mut NoteCache) -> EditState {
        let now = Instant::now();
        if self.draft.deadline().is_some_and(|deadline| deadline <= now) {
            self.draft.poll(now);
            // a window that settles back on an old value may still owe the store a failed write
            self.send_unsent();
        }
        while let Some(joined) = self.in_flight.try_join_next_with_id() {
            self.finish(cache, joined);
        }
        self.refresh_state();
        self.state
    }

    /// Wait for the next timer expiry or response, then make progress
    pub async fn step(&mut self, cache: &mut NoteCache) -> EditState {
        let deadline = self.draft.deadline();
        tokio::select! {
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
            Some(joined) = self.in_flight.join_next_with_id(), if !self.in_flight.is_empty() => {
                self.finish(cache, joined);
            }
            else => {}
        }
        self.poll(cache)
    }

    /// Drive the editor until nothing is pending or in flight
    pub async fn settle(&mut self, cache: &mut NoteCache) -> EditState {
        while self.updating() {
            self.step(cache).await;
        }
        self.refresh_state();
        self.state
    }

    /// Close the debounce window now and send whatever the store does not
    /// have yet, including fields of earlier failed writes
    pub fn save_now(&mut self) {
        self.draft.flush();
        self.send_unsent();
        self.refresh_state();
    }

    /// Resend fields whose last write failed
    pub fn retry_save(&mut self) {
        if self.last_error.is_some() {
            debug!(uuid = %self.uuid, "retrying failed save");
        }
        self.save_now();
    }

    /// Write the unacknowledged draft back over a freshly loaded cache entry
    pub fn reapply(&self, cache: &mut NoteCache) {
        if !self.is_dirty() {
            return;
        }
        let latest = self.draft.latest();
        let patch = NotePatch {
            title: Some(latest.title.clone()),
            text: Some(latest.text.clone()),
            favorite: None,
        };
        cache.set(&self.uuid, &patch);
    }

    /// Tear down: the timer is cancelled and in-flight writes are left to
    /// finish on their own.
    pub fn close(self) {}

    /// What the store will hold once every in-flight request has landed
    fn expected(&self) -> Draft {
        let mut expected = self.confirmed.clone();
        for (&request, flight) in &self.flights {
            if let Some(title) = flight.update.title.as_ref().filter(|_| request > self.title_acked) {
                expected.title = title.clone();
            }
            if let Some(text) = flight.update.text.as_ref().filter(|_| request > self.text_acked) {
                expected.text = text.clone();
            }
        }
        expected
    }

    fn has_unsent(&self) -> bool {
        *self.draft.settled() != self.expected()
    }

    fn send_unsent(&mut self) {
        let settled = self.draft.settled();
        let expected = self.expected();
        let update = ContentUpdate {
            title: (settled.title != expected.title).then(|| settled.title.clone()),
            text: (settled.text != expected.text).then(|| settled.text.clone()),
        };
        if update.is_empty() {
            return;
        }
        self.requests += 1;

        let request = self.requests;
        let store = Arc::clone(&self.store);
        let uuid = self.uuid.clone();
        let body = update.clone();
        debug!(uuid = %uuid, request, title = update.title.is_some(), text = update.text.is_some(), "sending note update");

        let handle = self.in_flight.spawn(async move { store.update_note(&uuid, &body).await });
        self.tasks.insert(handle.id(), request);
        self.flights.insert(request, Flight { update, edit_mark: self.edits });
    }

    fn finish(&mut self, cache: &mut NoteCache, joined: Result<(Id, SyncResult<Note>), JoinError>) {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => {
                let id = e.id();
                (id, Err(SyncError::Task(e.to_string())))
            }
        };
        let Some(request) = self.tasks.remove(&id) else {
            return;
        };
        let Some(flight) = self.flights.remove(&request) else {
            return;
        };

        match result {
            Ok(note) => {
                let mut patch = NotePatch::default();
                if let Some(title) = &flight.update.title {
                    if request > self.title_acked {
                        self.title_acked = request;
                        self.confirmed.title = title.clone();
                        if self.title_mark <= flight.edit_mark {
                            patch.title = Some(note.title.clone());
                        }
                    } else {
                        debug!(uuid = %self.uuid, request, acked = self.title_acked, "stale title in update response");
                    }
                }
                if let Some(text) = &flight.update.text {
                    if request > self.text_acked {
                        self.text_acked = request;
                        self.confirmed.text = text.clone();
                        if self.text_mark <= flight.edit_mark {
                            patch.text = Some(note.text.clone());
                        }
                    } else {
                        debug!(uuid = %self.uuid, request, acked = self.text_acked, "stale text in update response");
                    }
                }
                cache.set(&self.uuid, &patch);
                if request > self.stamped {
                    self.stamped = request;
                    cache.stamp(&self.uuid, note.last_changed);
                }
            }
            Err(err) => {
                warn!(uuid = %self.uuid, request, error = %err, "note update failed");
                self.failed = self.failed.max(request);
                self.last_error = Some(err);
                cache.invalidate(Scope::Note(self.uuid.clone()));
            }
        }
    }

    fn refresh_state(&mut self) {
        let next = if self.draft.is_pending() {
            EditState::Pending
        } else if !self.flights.is_empty() {
            EditState::Syncing
        } else if self.has_unsent() {
            EditState::Idle
        } else {
            if self.last_error.take().is_some() {
                debug!(uuid = %self.uuid, failed = self.failed, "failed write superseded");
            }
            if self.title_acked.max(self.text_acked) > 0 {
                EditState::Synced
            } else {
                EditState::Idle
            }
        };
        if next != self.state {
            debug!(uuid = %self.uuid, from = ?self.state, to = ?next, "editor state");
            self.state = next;
        }
    }
}

impl Drop for NoteEditor {
    fn drop(&mut self) {
        self.draft.cancel();
        if !self.flights.is_empty() {
            debug!(uuid = %self.uuid, in_flight = self.flights.len(), "editor closed with writes in flight");
        }
        self.in_flight.detach_all();
        self.state = EditState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::debounce::DEFAULT_DELAY;
    use crate::storage::memory::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, NoteCache, NoteEditor) {
        let store = Arc::new(MemoryStore::new());
        let note = store.create_note().await.unwrap();
        let mut cache = NoteCache::new();
        cache.insert(note.clone());
        let editor = NoteEditor::open(&note, store.clone(), DEFAULT_DELAY);
        (store, cache, editor)
    }

    #[tokio::test(start_paused = true)]
    async fn keystroke_updates_cache_before_any_request() {
        let (store, mut cache, mut editor) = setup().await;

        editor.update_title(&mut cache, "foo");

        assert_eq!(cache.get(editor.uuid()).unwrap().title, "foo");
        assert_eq!(editor.state(), EditState::Pending);
        assert!(editor.updating());
        assert_eq!(store.peek(editor.uuid()).unwrap().title, "");
    }

    #[tokio::test(start_paused = true)]
    async fn settles_into_synced_with_server_stamp() {
        let (store, mut cache, mut editor) = setup().await;
        let before = cache.get(editor.uuid()).unwrap().last_changed;

        editor.update_text(&mut cache, "body");
        let state = editor.settle(&mut cache).await;

        assert_eq!(state, EditState::Synced);
        assert!(!editor.updating());
        let cached = cache.get(editor.uuid()).unwrap();
        let stored = store.peek(editor.uuid()).unwrap();
        assert_eq!(stored.text, "body");
        assert_eq!(cached.last_changed, stored.last_changed);
        assert!(cached.last_changed > before);
    }

    #[tokio::test(start_paused = true)]
    async fn only_changed_fields_are_sent() {
        let (store, mut cache, mut editor) = setup().await;
        editor.update_title(&mut cache, "T");
        editor.settle(&mut cache).await;

        // simulate a concurrent server-side title change; a text-only edit must not overwrite it
        store
            .update_note(editor.uuid(), &ContentUpdate { title: Some("server".into()), text: None })
            .await
            .unwrap();
        editor.update_text(&mut cache, "x");
        editor.settle(&mut cache).await;

        let stored = store.peek(editor.uuid()).unwrap();
        assert_eq!(stored.title, "server");
        assert_eq!(stored.text, "x");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_keeps_local_text_and_can_be_retried() {
        let (store, mut cache, mut editor) = setup().await;
        store.set_offline(true);

        editor.update_title(&mut cache, "draft");
        let state = editor.settle(&mut cache).await;

        assert_eq!(state, EditState::Idle);
        assert!(!editor.updating());
        assert!(matches!(editor.last_error(), Some(SyncError::Network(_))));
        assert_eq!(cache.get(editor.uuid()).unwrap().title, "draft");
        assert!(editor.is_dirty());

        store.set_offline(false);
        editor.retry_save();
        assert_eq!(editor.settle(&mut cache).await, EditState::Synced);
        assert!(editor.last_error().is_none());
        assert_eq!(store.peek(editor.uuid()).unwrap().title, "draft");
        assert!(!editor.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn save_now_skips_the_window() {
        let (store, mut cache, mut editor) = setup().await;
        editor.update_title(&mut cache, "now");
        editor.save_now();
        assert_eq!(editor.state(), EditState::Syncing);
        editor.settle(&mut cache).await;
        assert_eq!(store.peek(editor.uuid()).unwrap().title, "now");
    }

    #[tokio::test(start_paused = true)]
    async fn closing_cancels_the_pending_write() {
        let (store, mut cache, mut editor) = setup().await;
        let uuid = editor.uuid().to_string();
        editor.update_title(&mut cache, "never sent");
        editor.close();

        tokio::time::sleep(DEFAULT_DELAY * 4).await;
        assert_eq!(store.peek(&uuid).unwrap().title, "");
        // the optimistic write stays in the cache
        assert_eq!(cache.get(&uuid).unwrap().title, "never sent");
    }

    #[tokio::test(start_paused = true)]
    async fn reapply_restores_unsent_draft_over_refetch() {
        let (store, mut cache, mut editor) = setup().await;
        editor.update_text(&mut cache, "typing");

        let fresh = store.list_notes().await.unwrap();
        cache.replace_all(fresh, Instant::now());
        assert_eq!(cache.get(editor.uuid()).unwrap().text, "");

        editor.reapply(&mut cache);
        assert_eq!(cache.get(editor.uuid()).unwrap().text, "typing");
    }
}
