use std::collections::BTreeMap;
use std::time::SystemTime;

use nucleo::{
    Matcher, Utf32Str,
    pattern::{CaseMatching, Normalization, Pattern},
};
use tracing::{debug, warn};

use crate::parse::parse_note;
use crate::resolve::Resolver;
use crate::{
    ExcludeFilter, GraphSnapshot, LinkRef, LocalGraph, NotePath, NoteStore, Resolution, Result,
    TaskItem,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Markdown,
    Static,
    Other,
}

#[derive(Debug, Clone)]
pub struct FileMeta {
    pub path: NotePath,
    pub kind: FileKind,
    pub mtime: SystemTime,
}

/// Cached extraction and resolution state for one note. Replaced wholesale
/// on every observed content change, never patched in place.
#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub mtime: SystemTime,
    pub links: Vec<LinkRef>,
    /// Parallel to `links`; dangling references stay as `Unresolved`.
    pub resolutions: Vec<Resolution>,
    pub tasks: Vec<TaskItem>,
}

/// A normalized change observed on disk (or produced by the core's own
/// writes). Carries only the path; consumers re-read content from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(NotePath),
    Modified(NotePath),
    Deleted(NotePath),
}

impl ChangeEvent {
    pub fn path(&self) -> &NotePath {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
        }
    }

    /// Discriminant used on the wire.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SearchHit {
    pub path: String,
    pub title: String,
    /// 1-based line of the best content match; 0 for filename-only hits.
    pub line: u32,
    pub snippet: String,
    #[serde(skip)]
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RecentNote {
    pub path: String,
    pub title: String,
    #[serde(skip)]
    pub mtime: SystemTime,
}

/// The single source of truth for the note set and its link graph.
///
/// All mutation goes through `rebuild`/`apply` under the owner's write
/// lock; `snapshot()` and the read accessors are safe to call from clones
/// or under read locks.
#[derive(Debug, Clone, Default)]
pub struct NoteIndex {
    files: BTreeMap<NotePath, FileMeta>,
    notes: BTreeMap<NotePath, NoteRecord>,
    excludes: ExcludeFilter,
}

impl NoteIndex {
    pub fn new(excludes: ExcludeFilter) -> Self {
        Self {
            excludes,
            ..Self::default()
        }
    }

    /// Full rescan of the store. Clears and repopulates everything; a read
    /// or parse failure on one note is logged and leaves that note absent,
    /// never aborts the rest.
    pub fn build(store: &NoteStore) -> Result<Self> {
        let excludes = ExcludeFilter::compile(&store.config().exclude_patterns)?;
        let mut idx = Self::new(excludes);
        idx.rebuild(store);
        Ok(idx)
    }

    pub fn rebuild(&mut self, store: &NoteStore) {
        self.files.clear();
        self.notes.clear();

        // File table first: resolution needs the complete listing.
        for rel in store.list_files() {
            self.insert_file_meta(store, rel);
        }

        let markdown: Vec<NotePath> = self
            .files
            .values()
            .filter(|f| f.kind == FileKind::Markdown)
            .map(|f| f.path.clone())
            .collect();
        for rel in markdown {
            if let Err(err) = self.refresh_note(store, &rel) {
                warn!(path = %rel, error = %err, "failed to index note; leaving it absent");
                self.notes.remove(&rel);
            }
        }
    }

    /// Incremental update from one normalized change event.
    ///
    /// `Created` additionally re-resolves previously-dangling references
    /// anywhere in the graph, so a new file retroactively materializes
    /// edges that were waiting for it. `Modified` deliberately does not
    /// trigger cross-note work.
    pub fn apply(&mut self, store: &NoteStore, event: &ChangeEvent) {
        match event {
            ChangeEvent::Created(path) => {
                self.upsert(store, path);
                self.reresolve_dangling();
            }
            ChangeEvent::Modified(path) => {
                self.upsert(store, path);
            }
            ChangeEvent::Deleted(path) => {
                self.files.remove(path);
                self.notes.remove(path);
                self.dangle_references_to(path);
            }
        }
    }

    fn upsert(&mut self, store: &NoteStore, rel: &NotePath) {
        if self.is_excluded(rel) {
            return;
        }
        let Some(kind) = self.insert_file_meta(store, rel.clone()) else {
            // Stat failed; treat as gone.
            self.files.remove(rel);
            self.notes.remove(rel);
            self.dangle_references_to(rel);
            return;
        };

        if kind == FileKind::Markdown {
            if let Err(err) = self.refresh_note(store, rel) {
                warn!(path = %rel, error = %err, "failed to reindex note; leaving it absent");
                self.notes.remove(rel);
            }
        }
    }

    fn insert_file_meta(&mut self, store: &NoteStore, rel: NotePath) -> Option<FileKind> {
        if self.is_excluded(&rel) {
            return None;
        }
        let mtime = store.mtime(&rel).ok()?;
        let kind = self.file_kind(store, &rel);
        self.files.insert(
            rel.clone(),
            FileMeta {
                path: rel,
                kind,
                mtime,
            },
        );
        Some(kind)
    }

    fn file_kind(&self, store: &NoteStore, rel: &NotePath) -> FileKind {
        match rel.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("md") => FileKind::Markdown,
            Some(ext) if store.is_static_ext(ext) => FileKind::Static,
            _ => FileKind::Other,
        }
    }

    fn refresh_note(&mut self, store: &NoteStore, rel: &NotePath) -> Result<()> {
        let text = store.read_text(rel)?;
        let mtime = store.mtime(rel).unwrap_or(SystemTime::UNIX_EPOCH);
        let parsed = parse_note(&text);

        let resolver = Resolver::new(&self.files);
        let resolutions = parsed
            .links
            .iter()
            .map(|l| resolver.resolve(&l.target, rel))
            .collect();

        self.notes.insert(
            rel.clone(),
            NoteRecord {
                mtime,
                links: parsed.links,
                resolutions,
                tasks: parsed.tasks,
            },
        );
        Ok(())
    }

    /// Retry only references that are currently dangling. Bounded: run on
    /// `Created` events, not on every modification.
    fn reresolve_dangling(&mut self) {
        let resolver = Resolver::new(&self.files);
        let mut fixed: Vec<(NotePath, usize, Resolution)> = Vec::new();

        for (source, record) in &self.notes {
            for (ix, res) in record.resolutions.iter().enumerate() {
                if !res.is_unresolved() {
                    continue;
                }
                let hit = resolver.resolve(&record.links[ix].target, source);
                if !hit.is_unresolved() {
                    fixed.push((source.clone(), ix, hit));
                }
            }
        }

        if !fixed.is_empty() {
            debug!(count = fixed.len(), "materialized previously-dangling references");
        }
        for (source, ix, hit) in fixed {
            if let Some(record) = self.notes.get_mut(&source) {
                record.resolutions[ix] = hit;
            }
        }
    }

    fn dangle_references_to(&mut self, target: &NotePath) {
        for record in self.notes.values_mut() {
            for res in &mut record.resolutions {
                let points_here = match res {
                    Resolution::Note(p) | Resolution::Static(p) => p == target,
                    Resolution::Unresolved => false,
                };
                if points_here {
                    *res = Resolution::Unresolved;
                }
            }
        }
    }

    fn is_excluded(&self, rel: &NotePath) -> bool {
        self.excludes
            .is_excluded(&rel.as_noext_lossy(), rel.stem())
    }

    pub fn note(&self, path: &NotePath) -> Option<&NoteRecord> {
        self.notes.get(path)
    }

    pub fn file(&self, path: &NotePath) -> Option<&FileMeta> {
        self.files.get(path)
    }

    pub(crate) fn files_table(&self) -> &BTreeMap<NotePath, FileMeta> {
        &self.files
    }

    pub(crate) fn notes_iter(&self) -> impl Iterator<Item = (&NotePath, &NoteRecord)> {
        self.notes.iter()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Resolve a raw link target as written in `source`. Exposed to the
    /// rendering layer to turn references into URLs or broken-link markers.
    pub fn resolve(&self, target: &str, source: &NotePath) -> Resolution {
        Resolver::new(&self.files).resolve(target, source)
    }

    pub fn tasks(&self, path: &NotePath) -> Option<&[TaskItem]> {
        self.notes.get(path).map(|n| n.tasks.as_slice())
    }

    /// Immutable projection of the current graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        crate::graph::build_snapshot(self)
    }

    pub fn local_graph(&self, path: &NotePath) -> Option<LocalGraph> {
        crate::graph::build_local(&self.snapshot(), path)
    }

    /// Most recently modified notes, newest first.
    pub fn recent_notes(&self, limit: usize) -> Vec<RecentNote> {
        let mut out: Vec<RecentNote> = self
            .notes
            .iter()
            .map(|(path, record)| RecentNote {
                path: format!("/{}", path.as_noext_lossy()),
                title: path.stem().to_string(),
                mtime: record.mtime,
            })
            .collect();
        out.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.path.cmp(&b.path)));
        out.truncate(limit);
        out
    }

    /// Fuzzy search across note paths and content lines; the best match per
    /// note wins. Reads note files from disk and can be expensive; prefer
    /// calling it from a `spawn_blocking` context.
    pub fn search(&self, store: &NoteStore, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let q = query.trim();
        if q.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let pattern = Pattern::parse(q, CaseMatching::Smart, Normalization::Smart);
        let mut matcher = Matcher::new(nucleo::Config::DEFAULT);
        let mut utf32_buf = Vec::new();
        let mut hits: Vec<SearchHit> = Vec::new();

        for path in self.notes.keys() {
            let rel = path.as_str_lossy();
            let mut best: Option<(u32, u32, String)> = pattern
                .score(Utf32Str::new(&rel, &mut utf32_buf), &mut matcher)
                .map(|score| (score, 0, String::new()));

            let text = match store.read_text(path) {
                Ok(text) => text,
                Err(err) => {
                    warn!(path = %path, error = %err, "skipping unreadable note in search");
                    continue;
                }
            };
            for (ix, line) in text.lines().enumerate() {
                let lt = line.trim();
                if lt.is_empty() {
                    continue;
                }
                if let Some(score) = pattern.score(Utf32Str::new(lt, &mut utf32_buf), &mut matcher)
                {
                    let better = best.as_ref().is_none_or(|(b, _, _)| score > *b);
                    if better {
                        best = Some((score, (ix + 1) as u32, lt.to_string()));
                    }
                }
            }

            if let Some((score, line, snippet)) = best {
                hits.push(SearchHit {
                    path: format!("/{}", path.as_noext_lossy()),
                    title: path.stem().to_string(),
                    line,
                    snippet,
                    score,
                });
            }
        }

        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits.truncate(limit);
        Ok(hits)
    }
}
