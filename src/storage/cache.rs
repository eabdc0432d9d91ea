use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;

use crate::storage::note::{Note, NoteMeta, NotePatch};

/// Which cached queries to mark stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The note collection (all list views)
    Lists,
    /// A single note's detail entry
    Note(String),
    All,
}

/// In-memory note cache, the single source of truth for rendering.
///
/// Owned by the session and passed by reference; all access happens on one
/// logical flow, so there is no locking.
#[derive(Debug, Default)]
pub struct NoteCache {
    notes: HashMap<String, Note>,
    lists_stale: bool,
    stale_notes: HashSet<String>,
    loaded_at: Option<Instant>,
}

impl NoteCache {
    pub fn new() -> Self {
        NoteCache {
            lists_stale: true,
            ..Default::default()
        }
    }

    pub fn get(&self, uuid: &str) -> Option<&Note> {
        self.notes.get(uuid)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.notes.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Merge a patch into an existing entry.
    ///
    /// Returns false if the note is not cached; entries are only created by
    /// `insert` / `replace_all`.
    pub fn set(&mut self, uuid: &str, patch: &NotePatch) -> bool {
        match self.notes.get_mut(uuid) {
            Some(note) => {
                note.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Record the store's `last_changed` for a note
    pub fn stamp(&mut self, uuid: &str, last_changed: DateTime<Utc>) -> bool {
        match self.notes.get_mut(uuid) {
            Some(note) => {
                note.last_changed = last_changed;
                self.stale_notes.remove(uuid);
                true
            }
            None => false,
        }
    }

    /// Add a note returned by the store (create pathway)
    pub fn insert(&mut self, note: Note) {
        self.stale_notes.remove(&note.uuid);
        self.notes.insert(note.uuid.clone(), note);
    }

    pub fn remove(&mut self, uuid: &str) -> Option<Note> {
        self.stale_notes.remove(uuid);
        self.notes.remove(uuid)
    }

    /// Replace the whole collection with a fresh listing
    pub fn replace_all(&mut self, notes: Vec<Note>, now: Instant) {
        self.notes = notes.into_iter().map(|n| (n.uuid.clone(), n)).collect();
        self.lists_stale = false;
        self.stale_notes.clear();
        self.loaded_at = Some(now);
    }

    pub fn invalidate(&mut self, scope: Scope) {
        match scope {
            Scope::Lists => self.lists_stale = true,
            Scope::Note(uuid) => {
                self.stale_notes.insert(uuid);
            }
            Scope::All => {
                self.lists_stale = true;
                self.stale_notes.extend(self.notes.keys().cloned());
            }
        }
    }

    /// Whether the next read of `scope` must go to the store first
    pub fn is_stale(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Lists => self.lists_stale,
            Scope::Note(uuid) => self.lists_stale || self.stale_notes.contains(uuid),
            Scope::All => self.lists_stale || !self.stale_notes.is_empty(),
        }
    }

    pub fn loaded_at(&self) -> Option<Instant> {
        self.loaded_at
    }

    pub fn list(&self) -> Vec<&Note> {
        self.notes.values().collect()
    }

    pub fn list_meta(&self) -> Vec<NoteMeta> {
        self.notes.values().map(NoteMeta::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(uuid: &str) -> NoteCache {
        let mut cache = NoteCache::new();
        cache.replace_all(vec![Note::new(uuid, Utc::now())], Instant::now());
        cache
    }

    #[test]
    fn set_is_visible_immediately() {
        let mut cache = cache_with("a");
        assert!(cache.set("a", &NotePatch::title("foo")));
        assert_eq!(cache.get("a").unwrap().title, "foo");
    }

    #[test]
    fn set_never_creates_entries() {
        let mut cache = NoteCache::new();
        assert!(!cache.set("ghost", &NotePatch::title("boo")));
        assert!(cache.get("ghost").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn new_cache_starts_stale_until_loaded() {
        let mut cache = NoteCache::new();
        assert!(cache.is_stale(&Scope::Lists));
        cache.replace_all(Vec::new(), Instant::now());
        assert!(!cache.is_stale(&Scope::Lists));
        assert!(cache.loaded_at().is_some());
    }

    #[test]
    fn invalidation_scopes() {
        let mut cache = cache_with("a");
        cache.invalidate(Scope::Note("a".to_string()));
        assert!(cache.is_stale(&Scope::Note("a".to_string())));
        assert!(!cache.is_stale(&Scope::Lists));

        cache.stamp("a", Utc::now());
        assert!(!cache.is_stale(&Scope::Note("a".to_string())));

        cache.invalidate(Scope::All);
        assert!(cache.is_stale(&Scope::Lists));
        assert!(cache.is_stale(&Scope::Note("a".to_string())));
    }

    #[test]
    fn remove_drops_entry() {
        let mut cache = cache_with("a");
        assert!(cache.remove("a").is_some());
        assert!(cache.remove("a").is_none());
        assert!(!cache.contains("a"));
    }
}
