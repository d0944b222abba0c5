use mangacache::{CacheStore, ManualClock};
use mangaresolver::{
    ChapterListResolver, ContentType, NamePattern, PageResolver, ResolvePhase, ResolverSettings,
    StaticSource,
};
use mangaresolver::naming::extract_numeral;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "http://localhost:3000/data/manga";

struct Fixture {
    source: Arc<StaticSource>,
    cache: Arc<CacheStore>,
    resolver: PageResolver,
}

fn fixture() -> Fixture {
    let source = Arc::new(StaticSource::new());
    let cache = Arc::new(CacheStore::in_memory().with_clock(Arc::new(ManualClock::default())));
    let settings = ResolverSettings::new(BASE);
    let chapters = Arc::new(ChapterListResolver::new(source.clone(), cache.clone(), &settings));
    let resolver = PageResolver::new(source.clone(), cache.clone(), chapters, &settings);
    Fixture {
        source,
        cache,
        resolver,
    }
}

fn chapter_dir(id: &str, n: u32) -> String {
    format!("{}/{}/chapters/{}", BASE, id, n)
}

#[tokio::test]
async fn test_flat_chapter_with_47_pages() {
    let fx = fixture();
    fx.source
        .add_files((1..=47).map(|p| format!("{}/{:03}.jpg", chapter_dir("naruto", 1), p)));

    let (chapter, trace) = fx.resolver.resolve_chapter_pages_traced("naruto", 1).await;
    let chapter = chapter.expect("chapter should resolve");

    assert_eq!(chapter.content_type(), ContentType::Images);
    assert_eq!(chapter.pattern(), Some(NamePattern::Padded3));
    assert_eq!(chapter.extension(), Some("jpg"));
    assert_eq!(chapter.page_count(), Some(47));
    assert_eq!(chapter.pages().len(), 47);
    assert_eq!(chapter.pages()[46], format!("{}/047.jpg", chapter_dir("naruto", 1)));
    assert_eq!(chapter.title, "Chapter 1");

    assert_eq!(
        trace.phases,
        vec![
            ResolvePhase::Idle,
            ResolvePhase::ResolvingManifest,
            ResolvePhase::ProbingPattern,
            ResolvePhase::DiscoveringExtent,
            ResolvePhase::Ready,
        ]
    );
    assert!(trace.is_valid());
}

#[tokio::test]
async fn test_request_count_is_logarithmic_in_page_count() {
    for pages in [12u32, 47, 150, 200] {
        let fx = fixture();
        fx.source
            .add_files((1..=pages).map(|p| format!("{}/{:03}.jpg", chapter_dir("x", 1), p)));

        let chapter = fx.resolver.resolve_chapter_pages("x", 1).await.unwrap();
        assert_eq!(chapter.pages().len() as u32, pages);

        let bound = 2 * (pages as f64).log2().ceil() as usize + 10;
        assert!(
            fx.source.request_count() <= bound,
            "{} requests for {} pages",
            fx.source.request_count(),
            pages
        );
    }
}

#[tokio::test]
async fn test_second_pattern_and_extension() {
    let fx = fixture();
    fx.source
        .add_files((1..=5).map(|p| format!("{}/page-{}.png", chapter_dir("x", 2), p)));

    let chapter = fx.resolver.resolve_chapter_pages("x", 2).await.unwrap();
    assert_eq!(chapter.pattern(), Some(NamePattern::PageDash));
    assert_eq!(chapter.extension(), Some("png"));
    assert_eq!(chapter.pages().len(), 5);
}

#[tokio::test]
async fn test_bucketed_chapter_with_200_pages() {
    let fx = fixture();
    let dir = chapter_dir("one-piece", 1);
    fx.source
        .add_files((1..=100).map(|p| format!("{}/pages_001_100/{:03}.jpg", dir, p)));
    fx.source
        .add_files((101..=200).map(|p| format!("{}/pages_101_200/{:03}.jpg", dir, p)));

    let (chapter, trace) = fx.resolver.resolve_chapter_pages_traced("one-piece", 1).await;
    let chapter = chapter.unwrap();

    assert!(chapter.bucketed);
    assert_eq!(chapter.pages().len(), 200);
    assert_eq!(chapter.pages()[0], format!("{}/pages_001_100/001.jpg", dir));
    assert_eq!(chapter.pages()[199], format!("{}/pages_101_200/200.jpg", dir));

    let numerals: Vec<u32> = chapter
        .pages()
        .iter()
        .map(|url| extract_numeral(url).unwrap())
        .collect();
    assert!(numerals.windows(2).all(|w| w[0] < w[1]));
    assert!(trace.is_valid());
}

#[tokio::test]
async fn test_partial_last_bucket() {
    let fx = fixture();
    let dir = chapter_dir("x", 1);
    fx.source
        .add_files((1..=100).map(|p| format!("{}/pages_001_100/{:03}.jpg", dir, p)));
    fx.source
        .add_files((101..=137).map(|p| format!("{}/pages_101_200/{:03}.jpg", dir, p)));

    let chapter = fx.resolver.resolve_chapter_pages("x", 1).await.unwrap();
    assert_eq!(chapter.pages().len(), 137);
}

#[tokio::test]
async fn test_bucketed_chapter_with_restarting_numbering() {
    let fx = fixture();
    let dir = chapter_dir("doraemon", 1);
    fx.source
        .add_files((1..=100).map(|p| format!("{}/pages_001_100/{:03}.jpg", dir, p)));
    fx.source
        .add_files((1..=100).map(|p| format!("{}/pages_101_200/{:03}.jpg", dir, p)));
    fx.source
        .add_files((1..=42).map(|p| format!("{}/pages_201_300/{:03}.jpg", dir, p)));

    let (chapter, trace) = fx.resolver.resolve_chapter_pages_traced("doraemon", 1).await;
    let chapter = chapter.unwrap();

    assert!(chapter.bucketed);
    assert_eq!(chapter.pages().len(), 242);
    assert_eq!(chapter.pages()[99], format!("{}/pages_001_100/100.jpg", dir));
    assert_eq!(chapter.pages()[100], format!("{}/pages_101_200/001.jpg", dir));
    assert_eq!(chapter.pages()[241], format!("{}/pages_201_300/042.jpg", dir));
    assert!(trace.is_valid());
}

#[tokio::test]
async fn test_page_index_groups_restarting_numbering() {
    let fx = fixture();
    let dir = chapter_dir("doraemon", 2);
    let images: Vec<String> = (1..=100).map(|p| format!("{:03}.jpg", p)).collect();
    fx.source.add_json(
        format!("{}/index.json", dir),
        json!({"pageGroups": [
            {"name": "pages_001_100", "startPage": 1, "endPage": 100, "images": images},
            {"name": "pages_101_200", "startPage": 101, "endPage": 200, "images": images}
        ]}),
    );
    for bucket in ["pages_001_100", "pages_101_200"] {
        fx.source
            .add_files((1..=100).map(|p| format!("{}/{}/{:03}.jpg", dir, bucket, p)));
    }

    let chapter = fx.resolver.resolve_chapter_pages("doraemon", 2).await.unwrap();
    assert_eq!(chapter.pages().len(), 200);
    assert_eq!(chapter.pages()[0], format!("{}/pages_001_100/001.jpg", dir));
    assert_eq!(chapter.pages()[100], format!("{}/pages_101_200/001.jpg", dir));
    assert_eq!(chapter.pages()[199], format!("{}/pages_101_200/100.jpg", dir));
}

#[tokio::test]
async fn test_brute_force_finds_sparse_pages() {
    let fx = fixture();
    let dir = chapter_dir("conan", 4);
    for name in ["007.jpg", "2.jpg", "03.jpg"] {
        fx.source.add_file(format!("{}/{}", dir, name));
    }

    let (chapter, trace) = fx.resolver.resolve_chapter_pages_traced("conan", 4).await;
    let chapter = chapter.unwrap();

    assert_eq!(
        chapter.pages(),
        &[
            format!("{}/2.jpg", dir),
            format!("{}/03.jpg", dir),
            format!("{}/007.jpg", dir),
        ]
    );
    assert!(trace.phases.contains(&ResolvePhase::BruteForcing));
    assert_eq!(trace.phase(), ResolvePhase::Ready);
}

#[tokio::test]
async fn test_missing_chapter_is_none_and_not_cached() {
    let fx = fixture();

    let (chapter, trace) = fx.resolver.resolve_chapter_pages_traced("ghost", 9).await;
    assert!(chapter.is_none());
    assert_eq!(trace.phase(), ResolvePhase::Error);
    assert!(trace.is_valid());
    assert_eq!(fx.cache.stats().chapter_content_count, 0);

    fx.source.add_file(format!("{}/001.jpg", chapter_dir("ghost", 9)));
    let chapter = fx.resolver.resolve_chapter_pages("ghost", 9).await.unwrap();
    assert_eq!(chapter.pages().len(), 1);
}

#[tokio::test]
async fn test_volume_pdf() {
    let fx = fixture();
    fx.source.add_file(format!("{}/doraemon/Vol03.pdf", BASE));

    let chapter = fx.resolver.resolve_chapter_pages("doraemon", 3).await.unwrap();
    assert_eq!(chapter.content_type(), ContentType::Pdf);
    assert_eq!(chapter.pdf_url(), Some(format!("{}/doraemon/Vol03.pdf", BASE).as_str()));
    assert!(chapter.pages().is_empty());
}

#[tokio::test]
async fn test_chapter_manifest_images_need_no_probing() {
    let fx = fixture();
    fx.source.add_json(
        format!("{}/cua_thu/chapters.json", BASE),
        json!([{"_id": "1", "title": "Mở đầu", "images": ["b/002.jpg", "b/001.jpg"]}]),
    );

    let (chapter, trace) = fx.resolver.resolve_chapter_pages_traced("cua_thu", 1).await;
    let chapter = chapter.unwrap();

    assert_eq!(chapter.title, "Mở đầu");
    assert_eq!(chapter.pages()[0], format!("{}/b/001.jpg", chapter_dir("cua_thu", 1)));
    assert_eq!(fx.source.probe_count(), 0);
    assert_eq!(
        trace.phases,
        vec![ResolvePhase::Idle, ResolvePhase::ResolvingManifest, ResolvePhase::Ready]
    );
}

#[tokio::test]
async fn test_page_index_is_verified() {
    let fx = fixture();
    let dir = chapter_dir("x", 1);
    fx.source.add_json(
        format!("{}/index.json", dir),
        json!({"pageGroups": [{"name": "pages_001_100", "images": ["001.jpg", "002.jpg"]}]}),
    );

    // First listed page is missing: the index is ignored
    assert!(fx.resolver.resolve_chapter_pages("x", 1).await.is_none());

    fx.source.add_file(format!("{}/pages_001_100/001.jpg", dir));
    let chapter = fx.resolver.resolve_chapter_pages("x", 1).await.unwrap();
    assert_eq!(chapter.pages().len(), 2);
    assert_eq!(chapter.pattern(), None);
}

#[tokio::test]
async fn test_cached_content_issues_no_request() {
    let fx = fixture();
    fx.source
        .add_files((1..=3).map(|p| format!("{}/{}.webp", chapter_dir("x", 5), p)));

    let first = fx.resolver.resolve_chapter_pages("x", 5).await.unwrap();
    fx.source.reset_counters();

    let (second, trace) = fx.resolver.resolve_chapter_pages_traced("x", 5).await;
    assert_eq!(second.unwrap(), first);
    assert_eq!(fx.source.request_count(), 0);
    assert_eq!(trace.phases, vec![ResolvePhase::Idle, ResolvePhase::Ready]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_resolution_writes_nothing() {
    let fx = fixture();
    let dir = chapter_dir("x", 1);
    fx.source
        .add_files((1..=20).map(|p| format!("{}/{:03}.jpg", dir, p)));
    fx.source
        .add_delay(format!("{}/004.jpg", dir), Duration::from_secs(30));

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        fx.resolver.resolve_chapter_pages("x", 1),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(fx.cache.stats().total_count(), 0);
}
