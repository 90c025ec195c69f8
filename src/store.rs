use std::fmt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::{Error, NotesConfig, Result};

/// Normalized relative path of a file under the notes root.
///
/// Separators are canonicalized, `.` components dropped, and `..` traversal
/// rejected, so one on-disk file maps to exactly one `NotePath`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotePath(PathBuf);

impl NotePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn as_str_lossy(&self) -> String {
        let s = self.0.to_string_lossy();
        if std::path::MAIN_SEPARATOR == '/' {
            s.into_owned()
        } else {
            s.replace(std::path::MAIN_SEPARATOR, "/")
        }
    }

    /// Relative path with the `.md` extension stripped, e.g. `notes/a`.
    pub fn as_noext_lossy(&self) -> String {
        let s = self.as_str_lossy();
        s.strip_suffix(".md").map(str::to_string).unwrap_or(s)
    }

    pub fn stem(&self) -> &str {
        self.0
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> Option<&str> {
        self.0.extension().and_then(|s| s.to_str())
    }

    pub fn parent(&self) -> &Path {
        self.0.parent().unwrap_or(Path::new(""))
    }

    pub fn is_markdown(&self) -> bool {
        self.extension().is_some_and(|e| e.eq_ignore_ascii_case("md"))
    }
}

impl fmt::Display for NotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str_lossy())
    }
}

impl TryFrom<&Path> for NotePath {
    type Error = Error;

    fn try_from(value: &Path) -> Result<Self> {
        if value.as_os_str().is_empty() {
            return Err(Error::InvalidNotePath("empty path".into()));
        }
        if value.is_absolute() {
            return Err(Error::InvalidNotePath(
                "absolute paths are not allowed".into(),
            ));
        }

        let mut cleaned = PathBuf::new();
        for c in value.components() {
            match c {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(Error::InvalidNotePath(
                        "absolute paths are not allowed".into(),
                    ));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(Error::InvalidNotePath(
                        "path traversal is not allowed".into(),
                    ));
                }
                Component::Normal(part) => cleaned.push(part),
            }
        }

        if cleaned.as_os_str().is_empty() {
            return Err(Error::InvalidNotePath("empty path".into()));
        }

        Ok(Self(cleaned))
    }
}

impl TryFrom<&str> for NotePath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        // Accept URL-style separators regardless of platform.
        let normalized = value.replace('\\', "/");
        NotePath::try_from(Path::new(&normalized))
    }
}

/// Filesystem access for the notes root: enumeration, reads, atomic writes.
#[derive(Debug, Clone)]
pub struct NoteStore {
    root: PathBuf,
    cfg: NotesConfig,
}

impl NoteStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(root, NotesConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, cfg: NotesConfig) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(Error::RootNotFound(root));
        }
        let root = std::fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root, cfg })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &NotesConfig {
        &self.cfg
    }

    pub fn to_abs(&self, rel: &NotePath) -> PathBuf {
        self.root.join(rel.as_path())
    }

    pub fn to_rel(&self, abs: &Path) -> Result<NotePath> {
        let abs = if abs.is_absolute() {
            abs.to_path_buf()
        } else {
            self.root.join(abs)
        };

        let abs = std::fs::canonicalize(&abs).unwrap_or(abs);
        if !abs.starts_with(&self.root) {
            return Err(Error::PathOutsideRoot(abs));
        }
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| Error::PathOutsideRoot(abs.clone()))?;
        NotePath::try_from(rel)
    }

    pub fn is_ignored_rel(&self, rel: &Path) -> bool {
        rel.components().any(|c| {
            let Component::Normal(part) = c else {
                return false;
            };
            let s = part.to_string_lossy();
            self.cfg.ignore_dirs.iter().any(|d| d == &s)
        })
    }

    /// Whether a relative path participates in indexing at all
    /// (exclusion patterns are a separate, index-level concern).
    pub fn is_indexable_rel(&self, rel: &Path) -> bool {
        if self.is_ignored_rel(rel) {
            return false;
        }
        if rel.as_os_str().is_empty() {
            return false;
        }
        // Hidden files and anything under a hidden directory are skipped.
        rel.components().all(|c| match c {
            Component::Normal(part) => !part.to_string_lossy().starts_with('.'),
            _ => true,
        })
    }

    pub fn is_static_ext(&self, ext: &str) -> bool {
        self.cfg
            .static_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Enumerate indexable files under the root, in lexicographic order.
    pub fn list_files(&self) -> Vec<NotePath> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = self.to_rel(entry.path()) else {
                continue;
            };
            if self.is_indexable_rel(rel.as_path()) {
                out.push(rel);
            }
        }
        out.sort();
        out
    }

    pub fn read_text(&self, rel: &NotePath) -> Result<String> {
        let abs = self.to_abs(rel);
        std::fs::read_to_string(&abs).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NoteNotFound(rel.clone())
            } else {
                Error::io(&abs, e)
            }
        })
    }

    pub fn mtime(&self, rel: &NotePath) -> Result<SystemTime> {
        let abs = self.to_abs(rel);
        let meta = std::fs::metadata(&abs).map_err(|e| Error::io(&abs, e))?;
        Ok(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH))
    }

    /// Write-to-temp-then-rename; concurrent readers see either the old or
    /// the new content, never a partial write.
    pub fn write_text_atomic(&self, rel: &NotePath, text: &str) -> Result<()> {
        let abs = self.to_abs(rel);
        let dir = abs.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
        tmp.write_all(text.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| Error::io(&abs, e))?;
        tmp.persist(&abs)
            .map_err(|e| Error::io(&abs, e.error))?;
        Ok(())
    }
}
