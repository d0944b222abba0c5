//! # mangaresolver - Content resolution for static manga trees
//!
//! Turns a content root holding loosely organized manga folders into typed
//! records: collection ids, collection metadata, chapter lists and chapter
//! pages. Every lookup degrades through a chain of fallbacks and never fails
//! outright; a missing collection yields a derived record, a missing chapter
//! yields `None`.
//!
//! ## Layout of the content tree
//!
//! ```text
//! {base}/index.json                                  optional listing
//! {base}/{id}/info.json                              optional manifest
//! {base}/{id}/cover.{png,jpg,jpeg,webp}
//! {base}/{id}/chapters.json                          optional chapter list
//! {base}/{id}/chapters/{n}/index.json                optional page list
//! {base}/{id}/chapters/{n}/001.jpg ...               flat pages
//! {base}/{id}/chapters/{n}/pages_001_100/001.jpg ... bucketed pages
//! {base}/{id}/Vol01.pdf                              volume PDF
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mangaconfig::get_config;
//! use mangaresolver::MangaService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = MangaService::from_config(&get_config())?;
//!
//!     for id in service.list_collections().await {
//!         let collection = service.resolve_collection(&id).await;
//!         println!("{} ({} chapters)", collection.title, collection.chapter_count);
//!     }
//!
//!     if let Some(chapter) = service.resolve_chapter_pages("naruto", 1).await {
//!         println!("{} pages", chapter.pages().len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod chapters;
pub mod config_ext;
pub mod directory;
pub mod error;
pub mod extent;
pub mod loader;
pub mod manifest;
pub mod models;
pub mod naming;
pub mod pages;
pub mod paths;
mod records;
pub mod service;
pub mod settings;
pub mod source;

pub use chapters::ChapterListResolver;
pub use config_ext::{CacheBackendKind, MangaConfigExt};
pub use directory::DirectoryResolver;
pub use error::{ResolveError, Result};
pub use loader::{IncrementalPageLoader, LoadOutcome, LoaderSettings, Preloader, Sentinel, SourcePreloader};
pub use manifest::ManifestResolver;
pub use models::{AdjacentChapters, Chapter, ChapterContent, Collection, ContentType, ImagePages};
pub use naming::NamePattern;
pub use pages::{PageResolver, ResolvePhase, ResolveTrace};
pub use paths::ContentPaths;
pub use service::MangaService;
pub use settings::ResolverSettings;
pub use source::{ContentSource, HttpSource, StaticSource};
