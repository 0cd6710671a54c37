//! Archive identifiers and the ordered identifier set
//!
//! Identifiers use the archive's fixed-width numeric form `YYMM.NNNN` or
//! `YYMM.NNNNN`. A trailing revision suffix (`v3`) and an `arXiv:` prefix are
//! accepted on input and stripped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Finds an identifier embedded anywhere in a chunk of markup or text
static EMBEDDED_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4}\.\d{4,5})(?:v\d+)?\b").expect("identifier pattern compiles")
});

static EXACT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:arXiv:)?(\d{4}\.\d{4,5})(?:v\d+)?$").expect("identifier pattern compiles")
});

/// Normalizes user-supplied identifier text to its canonical unversioned form
///
/// Returns `None` if the text is not an identifier.
///
/// # Example
///
/// ```
/// use paperhound::crawler::normalize_identifier;
///
/// assert_eq!(normalize_identifier("arXiv:2101.00001v2"), Some("2101.00001".to_string()));
/// assert_eq!(normalize_identifier("hep-th/9901001"), None);
/// ```
pub fn normalize_identifier(raw: &str) -> Option<String> {
    EXACT_ID
        .captures(raw.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Returns the first identifier embedded in `text`, without any revision suffix
pub fn first_embedded_identifier(text: &str) -> Option<String> {
    EMBEDDED_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Insertion-ordered set of identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an identifier, returning false if it was already present
    pub fn insert(&mut self, identifier: String) -> bool {
        if self.seen.contains(&identifier) {
            return false;
        }
        self.seen.insert(identifier.clone());
        self.order.push(identifier);
        true
    }

    /// Merges another set, returning how many identifiers were new
    pub fn extend(&mut self, other: IdentifierSet) -> usize {
        other
            .order
            .into_iter()
            .filter(|id| self.insert(id.clone()))
            .count()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

impl FromIterator<String> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = IdentifierSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl IntoIterator for IdentifierSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}
