use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::storage::note::{ContentUpdate, Note, NoteMeta};
use crate::storage::remote::NoteStore;

/// In-process note store.
///
/// Backs `--offline` sessions and the tests. Behaves like the server: it
/// assigns ids, stamps `last_changed` on every write and answers unknown
/// uuids the same way.
pub struct MemoryStore {
    notes: Mutex<HashMap<String, Note>>,
    clock: Mutex<Option<DateTime<Utc>>>,
    counter: AtomicU64,
    offline: AtomicBool,
    latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            notes: Mutex::new(HashMap::new()),
            clock: Mutex::new(None),
            counter: AtomicU64::new(0),
            offline: AtomicBool::new(false),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency` (tokio time, so paused-clock tests stay deterministic)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed the store with existing notes
    pub fn with_notes(self, notes: impl IntoIterator<Item = Note>) -> Self {
        {
            let mut map = self.lock_notes();
            for note in notes {
                map.insert(note.uuid.clone(), note);
            }
        }
        self
    }

    /// While offline every call fails with a network error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock_notes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct read, bypassing latency and the offline switch
    pub fn peek(&self, uuid: &str) -> Option<Note> {
        self.lock_notes().get(uuid).cloned()
    }

    fn lock_notes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Note>> {
        // A poisoned map is still a valid map; keep serving it.
        self.notes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Strictly increasing timestamps, even when the wall clock does not move
    fn stamp(&self) -> DateTime<Utc> {
        let mut last = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + ChronoDuration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    fn next_id(&self) -> String {
        // Same scheme as local note ids: md5 over a counter and the clock
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{:x}", md5::compute(format!("{}{}", n, nanos)))
    }

    async fn round_trip(&self) -> SyncResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Network("store is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn create_note(&self) -> SyncResult<Note> {
        self.round_trip().await?;
        let note = Note::new(self.next_id(), self.stamp());
        self.lock_notes().insert(note.uuid.clone(), note.clone());
        Ok(note)
    }

    async fn update_note(&self, uuid: &str, update: &ContentUpdate) -> SyncResult<Note> {
        self.round_trip().await?;
        let stamp = self.stamp();
        let mut notes = self.lock_notes();
        let note = notes
            .get_mut(uuid)
            .ok_or_else(|| SyncError::NotFound(uuid.to_string()))?;
        if let Some(title) = &update.title {
            note.title = title.clone();
        }
        if let Some(text) = &update.text {
            note.text = text.clone();
        }
        note.last_changed = stamp;
        Ok(note.clone())
    }

    async fn delete_note(&self, uuid: &str) -> SyncResult<bool> {
        self.round_trip().await?;
        Ok(self.lock_notes().remove(uuid).is_some())
    }

    async fn list_notes(&self) -> SyncResult<Vec<Note>> {
        self.round_trip().await?;
        Ok(self.lock_notes().values().cloned().collect())
    }

    async fn list_notes_meta(&self) -> SyncResult<Vec<NoteMeta>> {
        self.round_trip().await?;
        Ok(self.lock_notes().values().map(NoteMeta::from).collect())
    }

    async fn mark_favorite(&self, uuid: &str, favorite: bool) -> SyncResult<Note> {
        self.round_trip().await?;
        let stamp = self.stamp();
        let mut notes = self.lock_notes();
        let note = notes
            .get_mut(uuid)
            .ok_or_else(|| SyncError::NotFound(uuid.to_string()))?;
        note.favorite = favorite;
        note.last_changed = stamp;
        Ok(note.clone())
    }
}
