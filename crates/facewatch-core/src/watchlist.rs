//! Keyword watchlist for flagging enrolled identities.

use serde::{Deserialize, Serialize};

/// Immutable set of lowercase keyword fragments.
///
/// Built once at startup and shared by reference; there is no way to mutate
/// it after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Watchlist {
    keywords: Vec<String>,
}

impl Watchlist {
    /// Normalize keywords: trimmed, lowercased, empties dropped, deduplicated.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// True iff any keyword is a case-insensitive substring of the label or
    /// of its metadata.
    pub fn is_flagged(&self, label: &str, info: Option<&str>) -> bool {
        self.matching_keyword(label, info).is_some()
    }

    /// The first keyword (in sorted order) found in the label, else in the metadata.
    pub fn matching_keyword(&self, label: &str, info: Option<&str>) -> Option<&str> {
        if self.keywords.is_empty() {
            return None;
        }
        let label = label.to_lowercase();
        let info = info.map(str::to_lowercase);
        self.keywords
            .iter()
            .find(|k| label.contains(k.as_str()))
            .or_else(|| {
                let info = info.as_deref()?;
                self.keywords.iter().find(|k| info.contains(k.as_str()))
            })
            .map(String::as_str)
    }
}

impl From<Vec<String>> for Watchlist {
    fn from(keywords: Vec<String>) -> Self {
        Self::new(keywords)
    }
}

impl From<Watchlist> for Vec<String> {
    fn from(watchlist: Watchlist) -> Self {
        watchlist.keywords
    }
}
