use std::sync::{Arc, RwLock};

use notify::{RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::index::NoteIndex;
use crate::watch::{PathTracker, watch_loop};
use crate::{
    ChangeEvent, Error, EventBroadcaster, GraphSnapshot, LocalGraph, NotePath, NoteStore,
    RecentNote, Resolution, Result, SearchHit, Subscription, TaskItem, mutate,
};

/// Owns the note store, the index, the watcher and the event hub.
///
/// The index is the one piece of shared mutable state; every mutation of it
/// (rebuild, watcher-applied events, the mutation engine's post-write
/// update) runs under the write lock, so writers are serialized and readers
/// see either the pre- or post-update graph, never a torn one. An in-flight
/// rebuild holds the lock, queueing incremental applies behind it.
pub struct NotesService {
    store: NoteStore,
    index: Arc<RwLock<NoteIndex>>,
    events: Arc<EventBroadcaster>,
    shutdown_tx: watch::Sender<bool>,
    watcher: Option<notify::RecommendedWatcher>,
    watch_task: Option<tokio::task::JoinHandle<()>>,
}

impl NotesService {
    pub fn new(store: NoteStore) -> Self {
        let events = Arc::new(EventBroadcaster::new(store.config().event_capacity));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            index: Arc::new(RwLock::new(NoteIndex::default())),
            events,
            shutdown_tx,
            watcher: None,
            watch_task: None,
        }
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    /// Full rescan of the store; used at startup.
    pub async fn build_index(&self) -> Result<()> {
        let store = self.store.clone();
        let built = tokio::task::spawn_blocking(move || NoteIndex::build(&store))
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))??;

        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        *guard = built;
        info!(notes = guard.note_count(), "index built");
        Ok(())
    }

    pub fn with_index<R>(&self, f: impl FnOnce(&NoteIndex) -> R) -> R {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    /// Start converting raw filesystem notifications into normalized change
    /// events. Idempotent; the watcher survives transient errors.
    pub async fn start_watching(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let (raw_tx, raw_rx) =
            mpsc::unbounded_channel::<std::result::Result<notify::Event, notify::Error>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(self.store.root(), RecursiveMode::Recursive)?;

        let tracker = self.with_index(|idx| {
            PathTracker::seed(idx.files_table().keys().cloned())
        });

        let store = self.store.clone();
        let index = Arc::clone(&self.index);
        let events = Arc::clone(&self.events);
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.watch_task = Some(tokio::spawn(async move {
            watch_loop(store, index, events, raw_rx, shutdown_rx, tracker).await;
        }));
        self.watcher = Some(watcher);
        info!(root = %self.store.root().display(), "watching for changes");

        Ok(())
    }

    /// Register a live session. Events accepted before this call are never
    /// replayed; everything after arrives in order until the subscription
    /// is dropped.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    pub fn graph_snapshot(&self) -> GraphSnapshot {
        self.with_index(|idx| idx.snapshot())
    }

    pub fn local_graph(&self, path: &NotePath) -> Option<LocalGraph> {
        self.with_index(|idx| idx.local_graph(path))
    }

    pub fn resolve(&self, target: &str, source: &NotePath) -> Resolution {
        self.with_index(|idx| idx.resolve(target, source))
    }

    pub fn tasks_for(&self, path: &NotePath) -> Option<Vec<TaskItem>> {
        self.with_index(|idx| idx.tasks(path).map(|t| t.to_vec()))
    }

    pub fn recent_notes(&self, limit: usize) -> Vec<RecentNote> {
        self.with_index(|idx| idx.recent_notes(limit))
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let snapshot = self.with_index(|idx| idx.clone());
        let store = self.store.clone();
        let q = query.to_string();
        tokio::task::spawn_blocking(move || snapshot.search(&store, &q, limit))
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))?
    }

    pub fn read_note(&self, path: &NotePath) -> Result<String> {
        self.store.read_text(path)
    }

    /// Toggle the `ordinal`-th task checkbox of a note and persist it.
    ///
    /// Fails with a not-found error when the ordinal is out of range of the
    /// note's current content, and with a conflict when the on-disk item
    /// count shrank below an ordinal the index still had (the caller's view
    /// is stale; re-fetch and retry). On failure neither the file nor the
    /// index changes. On success only the single marker byte is rewritten,
    /// the write is atomic, and the resulting change is applied to the
    /// index and broadcast without waiting for the watcher to notice.
    pub async fn toggle_checkbox(
        &self,
        path: &NotePath,
        ordinal: usize,
        checked: bool,
    ) -> Result<()> {
        let store = self.store.clone();
        let index = Arc::clone(&self.index);
        let path = path.clone();

        let event = tokio::task::spawn_blocking(move || -> Result<ChangeEvent> {
            let mut guard = index.write().unwrap_or_else(|e| e.into_inner());

            let cached_count = guard.note(&path).map(|n| n.tasks.len());
            let text = store.read_text(&path)?;

            match mutate::set_checkbox(&text, ordinal, checked) {
                Some(new_text) => {
                    store.write_text_atomic(&path, &new_text)?;
                    let event = ChangeEvent::Modified(path);
                    guard.apply(&store, &event);
                    Ok(event)
                }
                None => {
                    let count = mutate::checkbox_count(&text);
                    if cached_count.is_some_and(|cached| ordinal < cached) {
                        Err(Error::Conflict { path })
                    } else {
                        Err(Error::CheckboxOutOfRange {
                            path,
                            index: ordinal,
                            count,
                        })
                    }
                }
            }
        })
        .await
        .map_err(|e| Error::TaskFailed(e.to_string()))??;

        self.events.publish(event);
        Ok(())
    }

    /// Replace a note's content wholesale (last-writer-wins), atomically,
    /// then update the index and broadcast the change.
    pub async fn save_note(&self, path: &NotePath, content: String) -> Result<()> {
        let store = self.store.clone();
        let index = Arc::clone(&self.index);
        let path = path.clone();

        let event = tokio::task::spawn_blocking(move || -> Result<ChangeEvent> {
            let mut guard = index.write().unwrap_or_else(|e| e.into_inner());

            if !store.to_abs(&path).is_file() {
                return Err(Error::NoteNotFound(path));
            }
            store.write_text_atomic(&path, &content)?;
            let event = ChangeEvent::Modified(path);
            guard.apply(&store, &event);
            Ok(event)
        })
        .await
        .map_err(|e| Error::TaskFailed(e.to_string()))??;

        self.events.publish(event);
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.watcher.take();
        if let Some(handle) = self.watch_task.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for NotesService {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
