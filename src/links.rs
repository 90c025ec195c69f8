use crate::NotePath;

/// How a link reference was written in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// `[[target]]` or `[[target|display]]`. The ordinal is this reference's
    /// zero-based position among all wiki references in the note, assigned
    /// by the extractor's single left-to-right pass.
    Wiki { ordinal: usize },
    /// `[text](relative/path)`.
    Path,
}

/// A link reference as extracted from note text, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkRef {
    pub target: String,
    pub kind: RefKind,
    pub display: Option<String>,
}

/// Outcome of resolving a [`LinkRef`] against the current note set.
///
/// `Unresolved` references are retained as dangling rather than discarded:
/// creating the missing target later materializes the edge without a
/// full reindex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolution {
    Note(NotePath),
    Static(NotePath),
    Unresolved,
}

impl Resolution {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }

    pub fn note(&self) -> Option<&NotePath> {
        match self {
            Self::Note(p) => Some(p),
            _ => None,
        }
    }
}

/// A task-list checkbox within a note, identified by its ordinal position
/// in the extractor's document-order scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    /// 1-based line number in the file.
    pub line: u32,
    pub checked: bool,
    /// Byte offset of the status character (the byte between `[` and `]`)
    /// in the note's raw text. The mutation engine rewrites exactly this byte.
    pub marker_offset: usize,
    pub text: String,
}
