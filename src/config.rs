use std::time::Duration;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct NotesConfig {
    /// Directory names to ignore anywhere in the path.
    pub ignore_dirs: Vec<String>,
    /// File extensions (without dot) served as static files rather than notes.
    pub static_extensions: Vec<String>,
    /// Glob-style patterns for notes hidden from the graph, search and
    /// resolution (matched against the extensionless relative path and the
    /// note stem, case-insensitively).
    pub exclude_patterns: Vec<String>,
    /// Debounce window for filesystem events.
    pub watch_debounce: Duration,
    /// Capacity of the live-event fan-out channel.
    pub event_capacity: usize,
    /// Keep-alive interval for live-update connections.
    pub keep_alive: Duration,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec![".git".into(), ".trash".into(), "node_modules".into()],
            static_extensions: vec![
                "png".into(),
                "jpg".into(),
                "jpeg".into(),
                "gif".into(),
                "svg".into(),
                "webp".into(),
                "pdf".into(),
                "doc".into(),
                "docx".into(),
                "xls".into(),
                "xlsx".into(),
                "mp3".into(),
                "mp4".into(),
                "wav".into(),
                "webm".into(),
                "zip".into(),
                "tar".into(),
                "gz".into(),
                "json".into(),
                "csv".into(),
                "txt".into(),
            ],
            exclude_patterns: Vec::new(),
            watch_debounce: Duration::from_millis(200),
            event_capacity: 512,
            keep_alive: Duration::from_secs(15),
        }
    }
}

/// Compiled form of `NotesConfig::exclude_patterns`.
///
/// Patterns support `*` and `?` wildcards. A note is excluded when any
/// pattern matches its extensionless relative path or its stem.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    patterns: Vec<regex::Regex>,
}

impl ExcludeFilter {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let raw = raw.trim().to_lowercase();
            if raw.is_empty() {
                continue;
            }
            let re = glob_to_regex(&raw)
                .map_err(|_| Error::BadExcludePattern(raw.clone()))?;
            compiled.push(re);
        }
        Ok(Self { patterns: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// `rel_noext` is the extensionless relative path, `stem` the file stem.
    pub fn is_excluded(&self, rel_noext: &str, stem: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let rel = rel_noext.to_lowercase();
        let stem = stem.to_lowercase();
        self.patterns
            .iter()
            .any(|p| p.is_match(&rel) || p.is_match(&stem))
    }
}

fn glob_to_regex(glob: &str) -> std::result::Result<regex::Regex, regex::Error> {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    regex::Regex::new(&out)
}
