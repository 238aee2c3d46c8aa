//! Per-response collection of web sources.

use llm::WebSource;
use std::collections::HashMap;
use std::fmt;

/// Longest title shown in a source link, in characters.
pub const MAX_TITLE_CHARS: usize = 70;

/// Shorten `title` to `max_chars` characters, marking the cut with `…`.
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    match title.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &title[..byte_idx]),
        None => title.to_string(),
    }
}

/// A source link attached to a model turn. Displays as `[title](url)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

impl Citation {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Citation {
            title: title.into(),
            url: url.into(),
        }
    }
}

impl From<&WebSource> for Citation {
    fn from(source: &WebSource) -> Self {
        Citation::new(truncate_title(&source.title, MAX_TITLE_CHARS), source.uri.clone())
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]({})", self.title, self.url)
    }
}

/// Sources keyed by URL, kept in order of first sighting.
///
/// A URL seen again keeps the title it was first seen with.
#[derive(Debug, Default)]
pub struct CitationSet {
    sources: Vec<WebSource>,
    index: HashMap<String, usize>,
}

impl CitationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the URL was already present.
    pub fn insert(&mut self, source: WebSource) -> bool {
        if self.index.contains_key(&source.uri) {
            return false;
        }
        self.index.insert(source.uri.clone(), self.sources.len());
        self.sources.push(source);
        true
    }

    pub fn extend(&mut self, sources: impl IntoIterator<Item = WebSource>) {
        for source in sources {
            self.insert(source);
        }
    }

    pub fn title_of(&self, uri: &str) -> Option<&str> {
        self.index.get(uri).map(|&i| self.sources[i].title.as_str())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources in first-seen order, titles shortened for display.
    pub fn into_citations(self) -> Vec<Citation> {
        self.sources.iter().map(Citation::from).collect()
    }
}
