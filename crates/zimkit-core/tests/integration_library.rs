#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zimkit_core::bundle::{BundleBackend, BundleManifest};
use zimkit_core::{ArchiveId, Config, ContentUrl, Error, Library, ReaderRegistry, byte_ranges};

fn write(dir: &Path, name: &str, manifest: &BundleManifest) -> PathBuf {
    let path = dir.join(name);
    manifest.write_to(&path).unwrap();
    path
}

fn encyclopedia() -> BundleManifest {
    BundleManifest::new()
        .with_metadata("Title", "Tiny Encyclopedia")
        .with_metadata("Language", "eng")
        .with_metadata("Tags", "_category:wikipedia;_pictures:no;science")
        .with_metadata("Date", "2024-03-01")
        .with_favicon(&[0x89, b'P', b'N', b'G'])
        .with_main_page("/A/Main")
        .with_redirect("/A/Main", "Main", "/A/Home")
        .with_article("/A/Home", "Home", "<p>Welcome.</p>")
        .with_article("/A", "A", "<p>Entry A</p>")
        .with_redirect("/B", "B", "/A")
        .with_redirect("/C", "C", "/B")
        .with_media("/I/logo.png", "logo", "image/png", &[1, 2, 3, 4, 5])
}

fn library() -> Library {
    Library::bundles(Config::default()).unwrap()
}

#[test]
fn test_open_is_idempotent_across_locations() {
    let dir = TempDir::new().unwrap();
    let first = write(dir.path(), "a.json", &encyclopedia());
    let copy = write(dir.path(), "copy-of-a.json", &encyclopedia());

    let library = library();
    let id = library.open(&first).unwrap();
    assert_eq!(library.open(&first).unwrap(), id);
    assert_eq!(library.open(&copy).unwrap(), id);
    assert_eq!(library.registry().len(), 1);
    assert_eq!(library.registry().file_path(id).unwrap(), first);
}

#[test]
fn test_open_failures() {
    let dir = TempDir::new().unwrap();
    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, b"not json").unwrap();

    let library = library();
    for path in [garbage, dir.path().join("missing.json")] {
        let err = library.open(&path).unwrap_err();
        assert!(matches!(err, Error::Open { .. }), "{err}");
    }
    assert!(library.registry().is_empty());
}

#[test]
fn test_close_unknown_is_noop() {
    let library = library();
    library.close(ArchiveId::from_content_hash(b"never opened"));
    assert!(library.registry().is_empty());
}

#[test]
fn test_content_bytes_and_missing_paths() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "a.json", &encyclopedia());
    let library = library();
    let id = library.open(&path).unwrap();

    let logo = library.content().resolve(id, "/I/logo.png").unwrap();
    assert_eq!(logo.mime, "image/png");
    assert_eq!(logo.data, vec![1, 2, 3, 4, 5]);

    let err = library.content().resolve(id, "/nope").unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let info = library.content().content_info(id, "/I/logo.png").unwrap();
    assert_eq!(info.size, 5);
    let slice = library.content().resolve_range(id, "/I/logo.png", 1..=2).unwrap();
    assert_eq!(slice.data, vec![2, 3]);
    assert_eq!(byte_ranges(info.size, 2), vec![0..=1, 2..=3, 4..=4]);
    assert_eq!(library.content().chunks(id, "/I/logo.png").unwrap(), vec![0..=4]);
}

#[test]
fn test_redirect_chain() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "a.json", &encyclopedia());
    let library = library();
    let id = library.open(&path).unwrap();

    assert_eq!(
        library.content().resolve_redirect(id, "/C").unwrap().as_deref(),
        Some("/A")
    );
    assert_eq!(
        library.content().resolve_redirect(id, "/B").unwrap().as_deref(),
        Some("/A")
    );
    let page = library.content().resolve(id, "/C").unwrap();
    assert_eq!((page.path.as_str(), page.data.as_slice()), ("/A", b"<p>Entry A</p>".as_slice()));

    assert_eq!(library.content().main_page(id).unwrap().as_deref(), Some("/A/Home"));

    let random = library.content().random_page(id).unwrap().unwrap();
    assert!(["/A", "/A/Home"].contains(&random.as_str()));
}

#[test]
fn test_redirect_limit() {
    let dir = TempDir::new().unwrap();
    let mut manifest = BundleManifest::new().with_article("/end", "End", "<p>end</p>");
    let mut previous = "/end".to_string();
    for hop in 0..5 {
        let path = format!("/hop{hop}");
        manifest = manifest.with_redirect(&path, &path, &previous);
        previous = path;
    }
    let path = write(dir.path(), "chain.json", &manifest);

    let mut config = Config::default();
    config.content.max_redirect_depth = 3;
    let library = Library::bundles(config).unwrap();
    let id = library.open(&path).unwrap();

    assert_eq!(library.content().resolve(id, "/hop2").unwrap().path, "/end");
    let err = library.content().resolve(id, "/hop4").unwrap_err();
    assert!(matches!(err, Error::RedirectLimit { depth: 3, .. }));
}

#[test]
fn test_content_urls() {
    let dir = TempDir::new().unwrap();
    let manifest = BundleManifest::new().with_article("/A/Café au lait", "Café au lait", "<p>hot</p>");
    let path = write(dir.path(), "cafe.json", &manifest);
    let library = library();
    let id = library.open(&path).unwrap();

    let url = ContentUrl::new(id, "/A/Café au lait");
    let text = url.to_string();
    assert!(text.starts_with("kiwix://"));
    assert!(!text.contains(' '));

    let parsed: ContentUrl = text.parse().unwrap();
    assert_eq!(parsed, url);
    assert_eq!(library.content().resolve_url(&parsed).unwrap().data, b"<p>hot</p>");
}

#[test]
fn test_metadata_and_flags() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "a.json", &encyclopedia());
    let library = library();
    let id = library.open(&path).unwrap();

    let meta = library.metadata().metadata(id).unwrap();
    assert_eq!(meta.title, "Tiny Encyclopedia");
    assert_eq!(meta.language.as_deref(), Some("eng"));
    assert_eq!(meta.tags, vec!["science".to_string()]);
    assert_eq!(meta.flags.category.as_deref(), Some("wikipedia"));
    assert!(!meta.flags.pictures);
    assert_eq!(meta.article_count, 2);
    assert_eq!(meta.media_count, 1);
    assert_eq!(meta.entry_count, 6);
    assert!(meta.file_size.unwrap() > 0);
    assert_eq!(library.metadata().favicon(id).unwrap(), vec![0x89, b'P', b'N', b'G']);

    let unregistered = write(dir.path(), "other.json", &BundleManifest::new().with_metadata("Title", "Other"));
    let other = library.metadata().metadata_from_file(&unregistered).unwrap();
    assert_eq!(other.title, "Other");
    assert!(!library.registry().contains(other.id));
    assert!(library.metadata().metadata_from_file(dir.path().join("missing.json")).is_none());
}

#[test]
fn test_prune_after_file_removed() {
    let dir = TempDir::new().unwrap();
    let kept = write(dir.path(), "kept.json", &encyclopedia());
    let doomed = write(
        dir.path(),
        "doomed.json",
        &BundleManifest::new().with_article("/x", "X", "<p>x</p>"),
    );

    let registry = ReaderRegistry::new(Arc::new(BundleBackend::new()));
    let kept_id = registry.open(&kept).unwrap();
    let doomed_id = registry.open(&doomed).unwrap();
    let lease = registry.get(doomed_id).unwrap();

    std::fs::remove_file(&doomed).unwrap();
    assert_eq!(registry.prune_stale(), vec![doomed_id]);
    assert!(registry.contains(kept_id));
    assert!(!registry.contains(doomed_id));

    // Outstanding leases see the archive as gone
    assert!(matches!(lease.reader(), Err(Error::ArchiveUnavailable(id)) if id == doomed_id));
}
