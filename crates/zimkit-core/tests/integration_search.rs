#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;
use zimkit_core::bundle::BundleManifest;
use zimkit_core::{
    ArchiveId, Config, Library, SearchRequest, SearchResult, SearchState, SearchStrategy,
    SnippetMode,
};

fn languages() -> BundleManifest {
    BundleManifest::new()
        .with_metadata("Title", "Languages")
        .with_article(
            "/A/Rust",
            "Rust",
            "<h1>Rust</h1><p>Rust is a systems programming language. Rust has no garbage collector.</p>",
        )
        .with_article("/A/Go", "Go", "<p>Go is a language with a garbage collector.</p>")
        .with_article("/A/OCaml", "OCaml", "<p>OCaml influenced the Rust compiler.</p>")
        .with_redirect("/A/Rust_(language)", "Rust (language)", "/A/Rust")
}

fn metals() -> BundleManifest {
    BundleManifest::new()
        .with_metadata("Title", "Metals")
        .with_article("/A/Rust", "Rust", "<p>Rust is iron oxide, formed by corrosion.</p>")
        .with_article("/A/Iron", "Iron", "<p>Iron exposed to water turns to rust.</p>")
        .with_article("/A/Gold", "Gold", "<p>Gold does not corrode.</p>")
}

struct Shelf {
    _dir: TempDir,
    library: Library,
    languages: ArchiveId,
    metals: ArchiveId,
}

fn write(dir: &Path, name: &str, manifest: &BundleManifest) -> std::path::PathBuf {
    let path = dir.join(name);
    manifest.write_to(&path).unwrap();
    path
}

fn shelf() -> Shelf {
    let dir = TempDir::new().unwrap();
    let library = Library::bundles(Config::default()).unwrap();
    let languages = library.open(write(dir.path(), "languages.json", &languages())).unwrap();
    let metals = library.open(write(dir.path(), "metals.json", &metals())).unwrap();
    Shelf {
        _dir: dir,
        library,
        languages,
        metals,
    }
}

async fn drain(library: &Library) -> Vec<SearchResult> {
    let mut out = Vec::new();
    while let Some(result) = library.search().next().await.unwrap() {
        out.push(result);
    }
    out
}

#[tokio::test]
async fn test_full_text_across_archives() {
    let shelf = shelf();
    let task = shelf
        .library
        .search()
        .start("rust", [shelf.languages, shelf.metals], true);
    let results = drain(&shelf.library).await;

    assert_eq!(task.finished().await, SearchState::Completed);
    assert!(!results.is_empty());
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let keys: HashSet<_> = results.iter().map(|r| (r.archive, r.path.clone())).collect();
    assert_eq!(keys.len(), results.len());
    assert!(keys.contains(&(shelf.languages, "/A/Rust".to_string())));
    assert!(keys.contains(&(shelf.metals, "/A/Rust".to_string())));
    assert!(keys.contains(&(shelf.metals, "/A/Iron".to_string())));
    assert!(!keys.iter().any(|(_, path)| path == "/A/Gold"));

    let metal_rust = results
        .iter()
        .find(|r| r.archive == shelf.metals && r.path == "/A/Rust")
        .unwrap();
    assert_eq!(
        metal_rust.snippet.as_deref(),
        Some("Rust is iron oxide, formed by corrosion.")
    );
    assert_eq!(shelf.library.metrics().snapshot().index_build_count, 2);
}

#[tokio::test]
async fn test_matches_snippet_mode() {
    let shelf = shelf();
    shelf.library.search().start_with(
        SearchRequest::new("corrosion", [shelf.metals]).with_snippet(SnippetMode::Matches),
    );
    let results = drain(&shelf.library).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].snippet.as_deref().unwrap().contains("corrosion"));
}

#[tokio::test]
async fn test_archive_without_index_uses_title_suggestions() {
    let dir = TempDir::new().unwrap();
    let library = Library::bundles(Config::default()).unwrap();
    let manifest = metals().with_full_text_index(false);
    let id = library.open(write(dir.path(), "plain.json", &manifest)).unwrap();

    library.search().start("gild", [id], false);
    let results = drain(&library).await;
    assert_eq!(results[0].path, "/A/Gold");
    assert!(results.iter().all(|r| r.score <= 1.0));
    assert!(library.metadata().metadata(id).is_some_and(|m| !m.has_full_text_index));
}

#[tokio::test]
async fn test_title_prefix_strategy_includes_redirects() {
    let shelf = shelf();
    shelf.library.search().start_with(
        SearchRequest::new("rust", [shelf.languages]).with_strategy(SearchStrategy::TitlePrefix),
    );
    let titles: Vec<_> = drain(&shelf.library)
        .await
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["Rust", "Rust (language)"]);
}

#[test]
fn test_title_search_ranks_prefix_before_suggestions() {
    let shelf = shelf();
    let results = shelf.library.search().title_search("go", None, 4);
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].title, "Go");
    assert!(results[0].score > 1.0);
    assert_eq!(results[1].title, "Gold");
    assert!(results[2..].iter().all(|r| r.score <= 1.0));

    let only_metals = shelf.library.search().title_search("go", Some(shelf.metals), 4);
    assert!(only_metals.iter().all(|r| r.archive == shelf.metals));
    assert_eq!(only_metals[0].title, "Gold");
}

#[test]
fn test_title_search_without_archives() {
    let library = Library::bundles(Config::default()).unwrap();
    assert!(library.search().title_search("rust", None, 10).is_empty());
}

#[tokio::test]
async fn test_search_skips_archives_pruned_at_start() {
    let dir = TempDir::new().unwrap();
    let library = Library::bundles(Config::default()).unwrap();
    let kept = library.open(write(dir.path(), "metals.json", &metals())).unwrap();
    let doomed_path = write(dir.path(), "languages.json", &languages());
    let doomed = library.open(&doomed_path).unwrap();

    std::fs::remove_file(&doomed_path).unwrap();
    let task = library.search().start("rust", [kept, doomed], false);
    assert_eq!(task.request().archives.len(), 1);

    let results = drain(&library).await;
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.archive == kept));
    assert!(!library.registry().contains(doomed));
}

#[tokio::test]
async fn test_misspelt_full_text_query_suggests_titles() {
    let shelf = shelf();
    let task = shelf
        .library
        .search()
        .start("rsut", [shelf.languages, shelf.metals], false);
    let results = drain(&shelf.library).await;

    assert_eq!(task.finished().await, SearchState::Completed);
    assert!(results.iter().all(|r| r.score <= 1.0));
    let archives: HashSet<_> = results
        .iter()
        .filter(|r| r.path == "/A/Rust")
        .map(|r| r.archive)
        .collect();
    assert_eq!(archives, HashSet::from([shelf.languages, shelf.metals]));
    assert_eq!(results[0].path, "/A/Rust");
}
