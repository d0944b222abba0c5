//! Data structures returned by the resolvers

use crate::naming::NamePattern;
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTHOR: &str = "Unknown";
pub const DEFAULT_STATUS: &str = "ongoing";
pub const DEFAULT_RATING: f64 = 5.0;

/// A manga title and its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Directory name under the content root
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Cover image URL, absent when no cover was found
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    /// `ongoing` or `completed`
    pub status: String,
    pub chapter_count: u32,
    pub rating: f64,
    pub views: u64,
}

impl Collection {
    /// Record derived from the id alone, used when no manifest exists
    pub fn derived(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: derive_title(id),
            author: DEFAULT_AUTHOR.to_string(),
            description: None,
            thumbnail_url: None,
            genres: Vec::new(),
            status: DEFAULT_STATUS.to_string(),
            chapter_count: 0,
            rating: DEFAULT_RATING,
            views: 0,
        }
    }
}

/// Human title for a directory name: separators become spaces and each word
/// is capitalized (`dragon_ball` gives `Dragon Ball`)
pub fn derive_title(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// How a chapter is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Images,
    Pdf,
}

/// Image pages of a chapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePages {
    /// Naming pattern, known only when pages were found by pattern probing
    #[serde(default)]
    pub pattern: Option<NamePattern>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    /// Absolute page URLs, ordered by page numeral within each bucket or group
    #[serde(default)]
    pub pages: Vec<String>,
}

impl ImagePages {
    /// Pages from a list, count taken from the list
    pub fn listed(pages: Vec<String>) -> Self {
        Self {
            pattern: None,
            extension: None,
            page_count: Some(pages.len() as u32),
            pages,
        }
    }

    /// Pages found through a naming pattern
    pub fn patterned(pattern: Option<NamePattern>, extension: &str, pages: Vec<String>) -> Self {
        Self {
            pattern,
            extension: Some(extension.to_string()),
            page_count: Some(pages.len() as u32),
            pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChapterContent {
    Images(ImagePages),
    Pdf { url: String },
}

impl Default for ChapterContent {
    fn default() -> Self {
        ChapterContent::Images(ImagePages::default())
    }
}

/// One chapter of a collection
///
/// A chapter coming out of a chapter list may not be resolved yet (no pages);
/// [`crate::PageResolver`] fills its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub collection_id: String,
    pub number: u32,
    pub title: String,
    /// Directory holding the chapter's files
    pub base_path: String,
    /// Pages live in `pages_XXX_YYY` bucket directories
    #[serde(default)]
    pub bucketed: bool,
    #[serde(default)]
    pub content: ChapterContent,
}

impl Chapter {
    pub fn default_title(number: u32) -> String {
        format!("Chapter {}", number)
    }

    pub fn content_type(&self) -> ContentType {
        match self.content {
            ChapterContent::Images(_) => ContentType::Images,
            ChapterContent::Pdf { .. } => ContentType::Pdf,
        }
    }

    pub fn pattern(&self) -> Option<NamePattern> {
        match &self.content {
            ChapterContent::Images(images) => images.pattern,
            ChapterContent::Pdf { .. } => None,
        }
    }

    pub fn extension(&self) -> Option<&str> {
        match &self.content {
            ChapterContent::Images(images) => images.extension.as_deref(),
            ChapterContent::Pdf { .. } => None,
        }
    }

    pub fn page_count(&self) -> Option<u32> {
        match &self.content {
            ChapterContent::Images(images) => images.page_count,
            ChapterContent::Pdf { .. } => None,
        }
    }

    /// Page URLs; empty for PDFs and unresolved chapters
    pub fn pages(&self) -> &[String] {
        match &self.content {
            ChapterContent::Images(images) => &images.pages,
            ChapterContent::Pdf { .. } => &[],
        }
    }

    pub fn pdf_url(&self) -> Option<&str> {
        match &self.content {
            ChapterContent::Pdf { url } => Some(url),
            ChapterContent::Images(_) => None,
        }
    }

    /// True when the content can be displayed without further probing
    pub fn is_resolved(&self) -> bool {
        match &self.content {
            ChapterContent::Images(images) => !images.pages.is_empty(),
            ChapterContent::Pdf { .. } => true,
        }
    }
}

/// Neighbours of a chapter in reading order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacentChapters {
    pub previous: Option<u32>,
    pub next: Option<u32>,
}
