use async_trait::async_trait;
use hej::{SyncError, SyncResult};
use hej::storage::{ContentUpdate, MemoryStore, Note, NoteMeta, NoteStore};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// What happens to the next scripted update request
enum Step {
    Hold(oneshot::Receiver<()>),
    Fail,
}

/// Store that records update requests and can hold their responses back.
///
/// Updates are applied to the backing store right away; only the response
/// waits for its gate, the way a slow network return path would. A failing
/// step rejects the request without touching the backing store.
#[allow(dead_code)]
pub struct ScriptedStore {
    pub inner: MemoryStore,
    updates: Mutex<Vec<ContentUpdate>>,
    script: Mutex<VecDeque<Step>>,
}

#[allow(dead_code)]
impl ScriptedStore {
    pub fn new() -> Self {
        ScriptedStore {
            inner: MemoryStore::new(),
            updates: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Hold back the response of the next not-yet-scripted update request
    pub fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().push_back(Step::Hold(rx));
        tx
    }

    /// Reject the next not-yet-scripted update request
    pub fn fail_next(&self) {
        self.script.lock().unwrap().push_back(Step::Fail);
    }

    pub fn updates(&self) -> Vec<ContentUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Let spawned request tasks run until `n` updates have been received
    pub async fn wait_for_updates(&self, n: usize) {
        while self.updates.lock().unwrap().len() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl NoteStore for ScriptedStore {
    async fn create_note(&self) -> SyncResult<Note> {
        self.inner.create_note().await
    }

    async fn update_note(&self, uuid: &str, update: &ContentUpdate) -> SyncResult<Note> {
        self.updates.lock().unwrap().push(update.clone());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail) => Err(SyncError::Network("connection reset".into())),
            Some(Step::Hold(gate)) => {
                let result = self.inner.update_note(uuid, update).await;
                let _ = gate.await;
                result
            }
            None => self.inner.update_note(uuid, update).await,
        }
    }

    async fn delete_note(&self, uuid: &str) -> SyncResult<bool> {
        self.inner.delete_note(uuid).await
    }

    async fn list_notes(&self) -> SyncResult<Vec<Note>> {
        self.inner.list_notes().await
    }

    async fn list_notes_meta(&self) -> SyncResult<Vec<NoteMeta>> {
        self.inner.list_notes_meta().await
    }

    async fn mark_favorite(&self, uuid: &str, favorite: bool) -> SyncResult<Note> {
        self.inner.mark_favorite(uuid, favorite).await
    }
}
