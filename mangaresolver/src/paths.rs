//! URL templates of the static content tree
//!
//! Every path the resolvers probe or fetch is built here:
//!
//! ```text
//! {base}/{sidecar}                                  directory sidecar
//! {base}/{id}/info.json                             collection manifest
//! {base}/{id}/cover.{ext}                           cover image
//! {base}/{id}/chapters.json                         chapter manifest
//! {base}/{id}/chapters/{n}/index.json               chapter page index
//! {base}/{id}/chapters/{n}/{pattern}.{ext}          flat page
//! {base}/{id}/chapters/{n}/pages_{s}_{e}/{p}.{ext}  bucketed page
//! {base}/{id}/Vol{nn}.pdf                           volume PDF
//! ```

use crate::naming::NamePattern;
use url::Url;

/// Cover image extensions, in probe order
pub const COVER_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Extension of bucketed pages
pub const BUCKET_EXTENSION: &str = "jpg";

/// How pages are numbered inside a bucket directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketNumbering {
    /// Chapter-global numbers: `pages_101_200/101.jpg` .. `200.jpg`
    Global,
    /// Numbering restarts in every bucket: `pages_101_200/001.jpg` .. `100.jpg`
    Local,
}

impl BucketNumbering {
    /// Probe order
    pub const ALL: [BucketNumbering; 2] = [BucketNumbering::Global, BucketNumbering::Local];
}

/// A page bucket directory, `pages_{start:03}_{end:03}`
///
/// `start` and `end` are chapter-global page numbers; the file names inside
/// the directory depend on its [`BucketNumbering`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: u32,
    pub end: u32,
}

impl Bucket {
    /// Zero-based bucket `index` for buckets of `size` pages
    pub fn nth(index: u32, size: u32) -> Self {
        Self {
            start: index * size + 1,
            end: (index + 1) * size,
        }
    }

    pub fn name(&self) -> String {
        format!("pages_{:03}_{:03}", self.start, self.end)
    }

    /// First and last file numeral the bucket can hold
    pub fn numerals(&self, numbering: BucketNumbering) -> (u32, u32) {
        match numbering {
            BucketNumbering::Global => (self.start, self.end),
            BucketNumbering::Local => (1, self.end - self.start + 1),
        }
    }
}

/// File naming of volume PDFs, in probe order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfName {
    /// `Vol01.pdf`
    VolPadded,
    /// `Vol1.pdf`
    Vol,
    /// `vol01.pdf`
    LowerVolPadded,
    /// `1.pdf`
    Bare,
}

impl PdfName {
    pub const ALL: [PdfName; 4] = [
        PdfName::VolPadded,
        PdfName::Vol,
        PdfName::LowerVolPadded,
        PdfName::Bare,
    ];

    pub fn file_name(&self, chapter: u32) -> String {
        match self {
            PdfName::VolPadded => format!("Vol{:02}.pdf", chapter),
            PdfName::Vol => format!("Vol{}.pdf", chapter),
            PdfName::LowerVolPadded => format!("vol{:02}.pdf", chapter),
            PdfName::Bare => format!("{}.pdf", chapter),
        }
    }
}

/// Builds content and backend URLs from the configured roots
#[derive(Debug, Clone)]
pub struct ContentPaths {
    base: String,
    api: Option<String>,
    sidecar: String,
}

impl ContentPaths {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            api: None,
            sidecar: "index.json".to_string(),
        }
    }

    /// Sets the backend root; an empty string disables the backend
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        let api = api.into();
        let api = api.trim_end_matches('/');
        self.api = (!api.is_empty()).then(|| api.to_string());
        self
    }

    pub fn with_sidecar(mut self, name: impl Into<String>) -> Self {
        self.sidecar = name.into();
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn has_api(&self) -> bool {
        self.api.is_some()
    }

    pub fn sidecar_index(&self) -> String {
        format!("{}/{}", self.base, self.sidecar)
    }

    pub fn collection_dir(&self, id: &str) -> String {
        format!("{}/{}", self.base, id)
    }

    pub fn manifest(&self, id: &str) -> String {
        format!("{}/info.json", self.collection_dir(id))
    }

    pub fn cover(&self, id: &str, ext: &str) -> String {
        format!("{}/cover.{}", self.collection_dir(id), ext)
    }

    pub fn chapter_manifest(&self, id: &str) -> String {
        format!("{}/chapters.json", self.collection_dir(id))
    }

    pub fn chapter_dir(&self, id: &str, chapter: u32) -> String {
        format!("{}/chapters/{}", self.collection_dir(id), chapter)
    }

    pub fn chapter_index(&self, id: &str, chapter: u32) -> String {
        format!("{}/index.json", self.chapter_dir(id, chapter))
    }

    pub fn page(&self, id: &str, chapter: u32, pattern: NamePattern, page: u32, ext: &str) -> String {
        format!("{}/{}.{}", self.chapter_dir(id, chapter), pattern.format(page), ext)
    }

    pub fn bucket_dir(&self, id: &str, chapter: u32, bucket: &Bucket) -> String {
        format!("{}/{}", self.chapter_dir(id, chapter), bucket.name())
    }

    pub fn bucket_page(&self, id: &str, chapter: u32, bucket: &Bucket, page: u32, ext: &str) -> String {
        format!("{}/{:03}.{}", self.bucket_dir(id, chapter, bucket), page, ext)
    }

    pub fn pdf(&self, id: &str, chapter: u32, name: PdfName) -> String {
        format!("{}/{}", self.collection_dir(id), name.file_name(chapter))
    }

    /// Resolves a page or PDF reference found in a manifest
    ///
    /// Absolute URLs are kept, root-relative paths are joined to the origin of
    /// the base URL, anything else is relative to `dir`.
    pub fn resolve_reference(&self, dir: &str, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_string();
        }
        if reference.starts_with('/') {
            return match Url::parse(&self.base).and_then(|base| base.join(reference)) {
                Ok(joined) => joined.to_string(),
                Err(_) => reference.to_string(),
            };
        }
        format!("{}/{}", dir.trim_end_matches('/'), reference)
    }

    /// `GET` endpoint listing collection ids
    pub fn api_directories(&self) -> Option<String> {
        self.api.as_ref().map(|api| format!("{}/manga-directories", api))
    }

    pub fn api_story(&self, id: &str) -> Option<String> {
        self.api.as_ref().map(|api| format!("{}/stories/{}", api, id))
    }

    pub fn api_chapters(&self, id: &str) -> Option<String> {
        self.api_story(id).map(|story| format!("{}/chapters", story))
    }

    pub fn api_chapter(&self, id: &str, chapter: u32) -> Option<String> {
        self.api_chapters(id).map(|chapters| format!("{}/{}", chapters, chapter))
    }
}
