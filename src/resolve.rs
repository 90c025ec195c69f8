use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::index::{FileKind, FileMeta};
use crate::{NotePath, Resolution};

/// Resolves link reference targets against a fixed snapshot of the file
/// table. Candidate search is strict and ordered; ambiguity never surfaces
/// because the first match wins:
///
/// 1. same directory as the referring note,
/// 2. the notes root,
/// 3. recursive search of all subdirectories in lexicographic path order.
///
/// Targets naming an existing static file resolve to a static identity;
/// excluded notes are not in the table and therefore never resolve.
pub(crate) struct Resolver<'a> {
    files: &'a BTreeMap<NotePath, FileMeta>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(files: &'a BTreeMap<NotePath, FileMeta>) -> Self {
        Self { files }
    }

    pub(crate) fn resolve(&self, target: &str, source: &NotePath) -> Resolution {
        let decoded = percent_decode(target).unwrap_or_else(|| target.to_string());
        let trimmed = decoded.trim();
        if trimmed.is_empty() {
            return Resolution::Unresolved;
        }

        let candidate = if has_extension(trimmed) {
            trimmed.to_string()
        } else {
            format!("{trimmed}.md")
        };
        let Ok(candidate) = NotePath::try_from(candidate.as_str()) else {
            return Resolution::Unresolved;
        };

        // 1. Same directory as the referring note.
        let same_dir = join_rel(source.parent(), &candidate);
        if let Some(hit) = same_dir.and_then(|p| self.lookup(&p)) {
            return hit;
        }

        // 2. Notes root.
        if let Some(hit) = self.lookup(&candidate) {
            return hit;
        }

        // 3. First suffix match over the sorted file table.
        for path in self.files.keys() {
            if path.as_path().ends_with(candidate.as_path()) {
                if let Some(hit) = self.lookup(path) {
                    return hit;
                }
            }
        }

        Resolution::Unresolved
    }

    fn lookup(&self, path: &NotePath) -> Option<Resolution> {
        let meta = self.files.get(path)?;
        match meta.kind {
            FileKind::Markdown => Some(Resolution::Note(path.clone())),
            FileKind::Static => Some(Resolution::Static(path.clone())),
            FileKind::Other => None,
        }
    }
}

fn join_rel(dir: &Path, rel: &NotePath) -> Option<NotePath> {
    if dir.as_os_str().is_empty() {
        return Some(rel.clone());
    }
    let mut joined = PathBuf::from(dir);
    joined.push(rel.as_path());
    NotePath::try_from(joined.as_path()).ok()
}

fn has_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

fn percent_decode(s: &str) -> Option<String> {
    if !s.contains('%') && !s.contains('\\') {
        return None;
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let h1 = bytes[i + 1];
            let h2 = bytes[i + 2];
            if let (Some(a), Some(b)) = (from_hex(h1), from_hex(h2)) {
                out.push((a << 4) | b);
                i += 3;
                continue;
            }
        }
        if bytes[i] == b'\\' {
            out.push(b'/');
        } else {
            out.push(bytes[i]);
        }
        i += 1;
    }
    String::from_utf8(out).ok()
}

fn from_hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(10 + (b - b'a')),
        b'A'..=b'F' => Some(10 + (b - b'A')),
        _ => None,
    }
}
