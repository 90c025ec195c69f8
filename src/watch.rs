use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::EventKind;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::index::NoteIndex;
use crate::{ChangeEvent, EventBroadcaster, ExcludeFilter, NotePath, NoteStore};

/// Per-path debounce timers. Each raw notification re-arms that path's
/// deadline; a path fires once its quiet period elapses, so a burst of
/// editor write notifications collapses into one effective change.
#[derive(Debug)]
pub(crate) struct Debouncer {
    window: Duration,
    pending: HashMap<NotePath, Instant>,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, path: NotePath, now: Instant) {
        self.pending.insert(path, now + self.window);
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<NotePath> {
        let mut due: Vec<NotePath> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.pending.remove(path);
        }
        due.sort();
        due
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Decides `Created` vs `Modified` vs `Deleted` from what is actually on
/// disk when a path's debounce window closes. A disappearance followed by
/// reappearance within the window lands here with the file present and the
/// path already known, so it classifies as `Modified` rather than
/// `Deleted`+`Created`.
#[derive(Debug, Default)]
pub(crate) struct PathTracker {
    known: HashSet<NotePath>,
}

impl PathTracker {
    pub(crate) fn seed(paths: impl IntoIterator<Item = NotePath>) -> Self {
        Self {
            known: paths.into_iter().collect(),
        }
    }

    pub(crate) fn classify(&mut self, path: NotePath, exists: bool) -> Option<ChangeEvent> {
        if exists {
            if self.known.insert(path.clone()) {
                Some(ChangeEvent::Created(path))
            } else {
                Some(ChangeEvent::Modified(path))
            }
        } else if self.known.remove(&path) {
            Some(ChangeEvent::Deleted(path))
        } else {
            // Never knew it; nothing to report.
            None
        }
    }
}

/// True for raw notification kinds that represent actual content changes.
/// Access and metadata events can be generated by merely reading files
/// (including by us), which would create self-trigger loops.
fn is_content_event(kind: &EventKind) -> bool {
    !matches!(
        kind,
        EventKind::Access(_) | EventKind::Modify(notify::event::ModifyKind::Metadata(_))
    )
}

pub(crate) async fn watch_loop(
    store: NoteStore,
    index: Arc<RwLock<NoteIndex>>,
    broadcaster: Arc<EventBroadcaster>,
    mut raw_rx: mpsc::UnboundedReceiver<std::result::Result<notify::Event, notify::Error>>,
    mut shutdown_rx: watch::Receiver<bool>,
    mut tracker: PathTracker,
) {
    let mut debouncer = Debouncer::new(store.config().watch_debounce);
    // Exclusion patterns apply before events are emitted, not just at the
    // index: excluded notes are invisible to live sessions too.
    let excludes = ExcludeFilter::compile(&store.config().exclude_patterns).unwrap_or_else(|err| {
        warn!(error = %err, "ignoring bad exclude patterns in watcher");
        ExcludeFilter::default()
    });
    let far_future = Instant::now() + Duration::from_secs(60 * 60 * 24 * 365);
    let timer = tokio::time::sleep_until(far_future);
    tokio::pin!(timer);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            maybe = raw_rx.recv() => {
                let Some(res) = maybe else { break; };
                match res {
                    Ok(ev) => {
                        if !is_content_event(&ev.kind) {
                            continue;
                        }
                        let now = Instant::now();
                        for path in &ev.paths {
                            let Ok(rel) = store.to_rel(path) else {
                                continue;
                            };
                            if !store.is_indexable_rel(rel.as_path()) {
                                continue;
                            }
                            if excludes.is_excluded(&rel.as_noext_lossy(), rel.stem()) {
                                continue;
                            }
                            debouncer.record(rel, now);
                        }
                        if let Some(deadline) = debouncer.next_deadline() {
                            timer.as_mut().reset(deadline);
                        }
                    }
                    Err(err) => {
                        // The watched root may briefly disappear during
                        // atomic-rename saves; keep the loop alive.
                        warn!(error = %err, "filesystem watcher error");
                    }
                }
            }

            _ = &mut timer, if !debouncer.is_idle() => {
                let now = Instant::now();
                let due = debouncer.take_due(now);
                if let Some(deadline) = debouncer.next_deadline() {
                    timer.as_mut().reset(deadline);
                } else {
                    timer.as_mut().reset(far_future);
                }

                let mut events = Vec::with_capacity(due.len());
                for path in due {
                    let exists = store.to_abs(&path).is_file();
                    if let Some(ev) = tracker.classify(path, exists) {
                        events.push(ev);
                    }
                }
                if events.is_empty() {
                    continue;
                }

                let store2 = store.clone();
                let index2 = Arc::clone(&index);
                let batch = events.clone();
                let applied = tokio::task::spawn_blocking(move || {
                    let mut guard = index2.write().unwrap_or_else(|e| e.into_inner());
                    for ev in &batch {
                        guard.apply(&store2, ev);
                    }
                })
                .await;
                if let Err(err) = applied {
                    warn!(error = %err, "index update task failed");
                    continue;
                }

                for ev in events {
                    debug!(kind = ev.kind_str(), path = %ev.path(), "observed change");
                    broadcaster.publish(ev);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> NotePath {
        NotePath::try_from(s).unwrap()
    }

    #[tokio::test]
    async fn rapid_notifications_coalesce_into_one_event() {
        let mut d = Debouncer::new(Duration::from_millis(200));
        let t0 = Instant::now();

        d.record(path("a.md"), t0);
        d.record(path("a.md"), t0 + Duration::from_millis(50));

        // Nothing due until the window after the *last* notification.
        assert!(d.take_due(t0 + Duration::from_millis(200)).is_empty());
        let due = d.take_due(t0 + Duration::from_millis(250));
        assert_eq!(due, vec![path("a.md")]);
        assert!(d.is_idle());
    }

    #[tokio::test]
    async fn paths_debounce_independently() {
        let mut d = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();

        d.record(path("a.md"), t0);
        d.record(path("b.md"), t0 + Duration::from_millis(80));

        let due = d.take_due(t0 + Duration::from_millis(110));
        assert_eq!(due, vec![path("a.md")]);
        let due = d.take_due(t0 + Duration::from_millis(190));
        assert_eq!(due, vec![path("b.md")]);
    }

    #[test]
    fn tracker_classifies_create_modify_delete() {
        let mut t = PathTracker::seed([path("a.md")]);

        assert_eq!(
            t.classify(path("a.md"), true),
            Some(ChangeEvent::Modified(path("a.md")))
        );
        assert_eq!(
            t.classify(path("new.md"), true),
            Some(ChangeEvent::Created(path("new.md")))
        );
        assert_eq!(
            t.classify(path("new.md"), false),
            Some(ChangeEvent::Deleted(path("new.md")))
        );
        assert_eq!(t.classify(path("ghost.md"), false), None);
    }

    #[test]
    fn delete_then_recreate_within_window_reads_as_modified() {
        // The debounce window swallowed a delete+create pair; by flush time
        // the file exists again and was already known.
        let mut t = PathTracker::seed([path("a.md")]);
        assert_eq!(
            t.classify(path("a.md"), true),
            Some(ChangeEvent::Modified(path("a.md")))
        );
    }

    #[test]
    fn access_and_metadata_events_are_not_content_changes() {
        assert!(!is_content_event(&EventKind::Access(
            notify::event::AccessKind::Open(notify::event::AccessMode::Any)
        )));
        assert!(!is_content_event(&EventKind::Modify(
            notify::event::ModifyKind::Metadata(notify::event::MetadataKind::Any)
        )));
        assert!(is_content_event(&EventKind::Modify(
            notify::event::ModifyKind::Data(notify::event::DataChange::Any)
        )));
        assert!(is_content_event(&EventKind::Create(
            notify::event::CreateKind::File
        )));
    }
}
