//! Raw JSON shapes of manifests and backend payloads
//!
//! Static trees written by different tools disagree on field names and on
//! whether numbers are quoted, so every field is optional and deserialized
//! leniently. Normalization into [`crate::models`] happens here too.

use crate::models::{
    Chapter, ChapterContent, Collection, ImagePages, DEFAULT_AUTHOR, DEFAULT_RATING,
    DEFAULT_STATUS, derive_title,
};
use crate::naming::order_pages;
use crate::paths::ContentPaths;
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// Chapter ids such as `12`, `ch12` or `chapter-12`
static CHAPTER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\d]*?(\d+)$").unwrap());

/// Flexible deserializer for ids that can be strings or integers
fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn deserialize_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn deserialize_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn deserialize_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A count given as a number, a numeric string or an array
fn deserialize_opt_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) => u32::try_from(items.len()).ok(),
        _ => None,
    })
}

/// Tags given as a list or as a comma-separated string
fn deserialize_opt_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let tags: Vec<String> = match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return Ok(None),
    };
    let tags: IndexSet<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    Ok((!tags.is_empty()).then(|| tags.into_iter().collect()))
}

/// Page references given as strings or as objects with `url`/`src`
fn deserialize_page_refs<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Object(map) => ["url", "src", "path"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        })
        .collect())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Collection manifest (`info.json` or a backend story)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionRecord {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "deserialize_opt_id")]
    object_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_tags")]
    genres: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_opt_tags")]
    genre: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_opt_tags")]
    tags: Option<Vec<String>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_count")]
    chapter_count: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_count")]
    chapters: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_u64")]
    views: Option<u64>,
}

impl CollectionRecord {
    /// Id declared by the manifest itself, if any
    pub(crate) fn declared_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.object_id.as_deref())
    }

    /// Normalizes the record, filling every missing field with its default
    ///
    /// The collection id is always the directory name the manifest was read
    /// from, whatever the manifest declares.
    pub(crate) fn into_collection(self, id: &str, paths: &ContentPaths) -> Collection {
        let dir = paths.collection_dir(id);
        let thumbnail_url = non_empty(self.thumbnail_url)
            .or(non_empty(self.thumbnail))
            .or(non_empty(self.cover))
            .map(|reference| paths.resolve_reference(&dir, &reference));

        Collection {
            id: id.to_string(),
            title: non_empty(self.title).unwrap_or_else(|| derive_title(id)),
            author: non_empty(self.author).unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            description: non_empty(self.description),
            thumbnail_url,
            genres: self.genres.or(self.genre).or(self.tags).unwrap_or_default(),
            status: non_empty(self.status).unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            chapter_count: self.chapter_count.or(self.chapters).unwrap_or(0),
            rating: self.rating.filter(|r| r.is_finite()).unwrap_or(DEFAULT_RATING),
            views: self.views.unwrap_or(0),
        }
    }
}

/// One chapter entry of `chapters.json` or of the backend
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ChapterRecord {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "deserialize_opt_id")]
    object_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_u32")]
    number: Option<u32>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_page_refs")]
    images: Vec<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "type")]
    content_type: Option<String>,
    #[serde(default)]
    bucketed: bool,
}

impl ChapterRecord {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(_) | Value::String(_) => Some(Self {
                number: deserialize_opt_u32(value).ok().flatten(),
                ..Default::default()
            }),
            Value::Object(_) => match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed chapter entry");
                    None
                }
            },
            _ => None,
        }
    }

    /// Chapter number, taken from `number` or parsed from the id
    fn number(&self) -> Option<u32> {
        self.number.or_else(|| {
            [self.id.as_deref(), self.object_id.as_deref()]
                .into_iter()
                .flatten()
                .find_map(parse_chapter_id)
        })
    }

    fn is_pdf(&self) -> bool {
        let declared = self
            .content_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("pdf"));
        let by_extension = self
            .url
            .as_deref()
            .is_some_and(|u| u.to_ascii_lowercase().ends_with(".pdf"));
        declared || by_extension
    }

    pub(crate) fn into_chapter(self, collection_id: &str, paths: &ContentPaths) -> Option<Chapter> {
        let number = self.number()?;
        let is_pdf = self.is_pdf();
        let url = non_empty(self.url.clone());

        // A non-PDF url names the chapter directory
        let base_path = match (&url, is_pdf) {
            (Some(dir), false) => {
                paths.resolve_reference(&paths.collection_dir(collection_id), dir)
            }
            _ => paths.chapter_dir(collection_id, number),
        };

        let content = match (is_pdf, url) {
            (true, Some(url)) => ChapterContent::Pdf {
                url: paths.resolve_reference(&paths.collection_dir(collection_id), &url),
            },
            _ => {
                let pages = self
                    .images
                    .iter()
                    .map(|reference| paths.resolve_reference(&base_path, reference));
                let pages = order_pages(pages);
                if pages.is_empty() {
                    ChapterContent::default()
                } else {
                    ChapterContent::Images(ImagePages::listed(pages))
                }
            }
        };

        Some(Chapter {
            collection_id: collection_id.to_string(),
            number,
            title: non_empty(self.title).unwrap_or_else(|| Chapter::default_title(number)),
            base_path,
            bucketed: self.bucketed,
            content,
        })
    }
}

pub(crate) fn parse_chapter_id(id: &str) -> Option<u32> {
    CHAPTER_ID
        .captures(id.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Normalizes a chapter listing payload
///
/// Accepts a bare array or an object wrapping it under `chapters`. Entries
/// without a usable number are dropped; the result is sorted ascending with
/// one chapter per number.
pub(crate) fn parse_chapter_list(
    payload: Value,
    collection_id: &str,
    paths: &ContentPaths,
) -> Option<Vec<Chapter>> {
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("chapters") {
            Some(Value::Array(entries)) => entries,
            _ => return None,
        },
        _ => return None,
    };

    let mut chapters: Vec<Chapter> = entries
        .into_iter()
        .filter_map(ChapterRecord::from_value)
        .filter_map(|record| record.into_chapter(collection_id, paths))
        .collect();
    chapters.sort_by_key(|c| c.number);
    chapters.dedup_by_key(|c| c.number);
    Some(chapters)
}

/// Parses one chapter payload, possibly wrapped under `chapter`
pub(crate) fn parse_chapter(
    payload: Value,
    collection_id: &str,
    paths: &ContentPaths,
) -> Option<Chapter> {
    let payload = match payload {
        Value::Object(mut map) if map.contains_key("chapter") => map.remove("chapter")?,
        other => other,
    };
    ChapterRecord::from_value(payload)?.into_chapter(collection_id, paths)
}

/// Directory listing payload: ids as strings or objects with `id`/`_id`
pub(crate) fn parse_id_list(payload: &Value) -> Option<Vec<String>> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("collections")
            .or_else(|| map.get("directories"))
            .and_then(Value::as_array)?,
        _ => return None,
    };
    let ids: IndexSet<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => map
                .get("id")
                .or_else(|| map.get("_id"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();
    Some(ids.into_iter().collect())
}

/// One group of a chapter page index
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageGroupRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_page_refs")]
    images: Vec<String>,
}

/// Chapter page index (`chapters/{n}/index.json`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChapterIndexRecord {
    #[serde(default)]
    page_groups: Vec<PageGroupRecord>,
    #[serde(default, deserialize_with = "deserialize_page_refs")]
    images: Vec<String>,
}

impl ChapterIndexRecord {
    /// Page references relative to the chapter directory, one list per group
    ///
    /// Groups keep their declared order and top-level `images` come last.
    /// Bare file names of a named group live in the group's directory.
    pub(crate) fn references(self) -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<String>> = self
            .page_groups
            .into_iter()
            .map(|group| {
                let name = group.name;
                group
                    .images
                    .into_iter()
                    .map(|image| match &name {
                        Some(name) if !image.contains('/') => format!("{}/{}", name, image),
                        _ => image,
                    })
                    .collect()
            })
            .collect();
        if !self.images.is_empty() {
            groups.push(self.images);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::order_page_groups;
    use serde_json::json;

    fn paths() -> ContentPaths {
        ContentPaths::new("http://h/data/manga")
    }

    #[test]
    fn test_collection_record_tolerates_variants() {
        let record: CollectionRecord = serde_json::from_value(json!({
            "_id": 42,
            "title": "Naruto",
            "thumbnail": "cover.jpg",
            "genre": "Action, Ninja ,",
            "tags": ["ignored"],
            "rating": "4.5",
            "views": 1200,
            "chapters": [1, 2, 3]
        }))
        .unwrap();
        assert_eq!(record.declared_id(), Some("42"));

        let collection = record.into_collection("naruto", &paths());
        assert_eq!(collection.id, "naruto");
        assert_eq!(collection.genres, vec!["Action", "Ninja"]);
        assert_eq!(collection.rating, 4.5);
        assert_eq!(collection.chapter_count, 3);
        assert_eq!(collection.author, "Unknown");
        assert_eq!(collection.status, "ongoing");
        assert_eq!(
            collection.thumbnail_url.as_deref(),
            Some("http://h/data/manga/naruto/cover.jpg")
        );
    }

    #[test]
    fn test_chapter_list_normalization() {
        let chapters = parse_chapter_list(
            json!([
                {"_id": "chapter-3", "images": ["002.jpg", "001.jpg"]},
                {"number": "1", "title": "Start"},
                {"id": "1"},
                {"title": "no number"},
                2
            ]),
            "x",
            &paths(),
        )
        .unwrap();

        let numbers: Vec<u32> = chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(chapters[0].title, "Start");
        assert_eq!(chapters[1].title, "Chapter 2");
        assert!(!chapters[1].is_resolved());
        assert_eq!(
            chapters[2].pages(),
            &[
                "http://h/data/manga/x/chapters/3/001.jpg".to_string(),
                "http://h/data/manga/x/chapters/3/002.jpg".to_string()
            ]
        );
    }

    #[test]
    fn test_pdf_chapter_entry() {
        let chapter = parse_chapter(
            json!({"chapter": {"number": 4, "type": "pdf", "url": "/data/manga/x/Vol04.pdf"}}),
            "x",
            &paths(),
        )
        .unwrap();
        assert_eq!(chapter.pdf_url(), Some("http://h/data/manga/x/Vol04.pdf"));
    }

    #[test]
    fn test_chapter_directory_url() {
        let chapter = parse_chapter(
            json!({"_id": "1", "url": "/data/manga/x/chapters/1"}),
            "x",
            &paths(),
        )
        .unwrap();
        assert_eq!(chapter.base_path, "http://h/data/manga/x/chapters/1");
        assert!(!chapter.is_resolved());
    }

    #[test]
    fn test_parse_chapter_id() {
        assert_eq!(parse_chapter_id("12"), Some(12));
        assert_eq!(parse_chapter_id("chapter-12"), Some(12));
        assert_eq!(parse_chapter_id("65a1f0c3e4b0a1b2c3d4e5f6"), None);
    }

    #[test]
    fn test_parse_id_list() {
        let ids = parse_id_list(&json!(["naruto", {"_id": "conan"}, {"id": "naruto"}, 3])).unwrap();
        assert_eq!(ids, vec!["naruto", "conan"]);
        assert!(parse_id_list(&json!("naruto")).is_none());
    }

    #[test]
    fn test_chapter_index_references() {
        let record: ChapterIndexRecord = serde_json::from_value(json!({
            "pageGroups": [
                {"name": "pages_001_100", "startPage": 1, "endPage": 100, "images": ["001.jpg", "002.jpg"]},
                {"name": "pages_101_200", "images": ["pages_101_200/101.jpg"]}
            ]
        }))
        .unwrap();
        assert_eq!(
            record.references(),
            vec![
                vec!["pages_001_100/001.jpg", "pages_001_100/002.jpg"],
                vec!["pages_101_200/101.jpg"]
            ]
        );
    }

    #[test]
    fn test_restarting_page_groups_are_all_kept() {
        let images: Vec<String> = (1..=100).map(|p| format!("{:03}.jpg", p)).collect();
        let record: ChapterIndexRecord = serde_json::from_value(json!({
            "pageGroups": [
                {"name": "pages_001_100", "images": images},
                {"name": "pages_101_200", "images": images}
            ]
        }))
        .unwrap();

        let pages = order_page_groups(record.references());
        assert_eq!(pages.len(), 200);
        assert_eq!(pages[0], "pages_001_100/001.jpg");
        assert_eq!(pages[99], "pages_001_100/100.jpg");
        assert_eq!(pages[100], "pages_101_200/001.jpg");
        assert_eq!(pages[199], "pages_101_200/100.jpg");
    }
}
