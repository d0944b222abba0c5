//! Page file naming conventions
//!
//! A flat chapter names its pages after one of a handful of numbering
//! patterns, tried in the order of [`NamePattern::ALL`] against the
//! extensions of [`IMAGE_EXTENSIONS`].

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image extensions, in probe order
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Numeral immediately preceding the extension of a file name
static NUMERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.[A-Za-z0-9]+$").unwrap());

/// Page numbering pattern of a flat chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamePattern {
    /// `001`, `002`, ...
    #[serde(rename = "%03d")]
    Padded3,
    /// `1`, `2`, ...
    #[serde(rename = "%d")]
    Plain,
    /// `01`, `02`, ...
    #[serde(rename = "%02d")]
    Padded2,
    /// `page-1`, `page-2`, ...
    #[serde(rename = "page-%d")]
    PageDash,
    /// `p1`, `p2`, ...
    #[serde(rename = "p%d")]
    PPrefix,
}

impl NamePattern {
    /// Probe order
    pub const ALL: [NamePattern; 5] = [
        NamePattern::Padded3,
        NamePattern::Plain,
        NamePattern::Padded2,
        NamePattern::PageDash,
        NamePattern::PPrefix,
    ];

    /// File stem for page `page`
    pub fn format(&self, page: u32) -> String {
        match self {
            NamePattern::Padded3 => format!("{:03}", page),
            NamePattern::Plain => page.to_string(),
            NamePattern::Padded2 => format!("{:02}", page),
            NamePattern::PageDash => format!("page-{}", page),
            NamePattern::PPrefix => format!("p{}", page),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NamePattern::Padded3 => "%03d",
            NamePattern::Plain => "%d",
            NamePattern::Padded2 => "%02d",
            NamePattern::PageDash => "page-%d",
            NamePattern::PPrefix => "p%d",
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracts the page numeral of a URL or file name
///
/// Only the last path segment is considered, without its query string.
/// Returns `None` when no digits directly precede the extension.
pub fn extract_numeral(url: &str) -> Option<u32> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    NUMERAL
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Orders page URLs by their numeral
///
/// The sort is stable, URLs without a numeral keep their relative order after
/// the numbered ones, and duplicates (same URL or same numeral) are dropped so
/// the resulting numbering is strictly increasing.
pub fn order_pages<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let unique: IndexSet<String> = urls.into_iter().collect();
    let mut keyed: Vec<(Option<u32>, String)> = unique
        .into_iter()
        .map(|url| (extract_numeral(&url), url))
        .collect();
    keyed.sort_by_key(|(numeral, _)| (numeral.is_none(), *numeral));

    let mut seen = IndexSet::new();
    keyed
        .into_iter()
        .filter(|(numeral, _)| match numeral {
            Some(n) => seen.insert(*n),
            None => true,
        })
        .map(|(_, url)| url)
        .collect()
}

/// Orders pages group by group
///
/// Each group is ordered on its own with [`order_pages`] and groups are
/// concatenated in their given order. Across groups only identical URLs are
/// dropped: bucket directories that restart their numbering keep every page.
pub fn order_page_groups<G, I>(groups: G) -> Vec<String>
where
    G: IntoIterator<Item = I>,
    I: IntoIterator<Item = String>,
{
    let mut pages: IndexSet<String> = IndexSet::new();
    for group in groups {
        pages.extend(order_pages(group));
    }
    pages.into_iter().collect()
}
