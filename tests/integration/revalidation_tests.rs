//! Entity-tag revalidation and incremental re-runs

use crate::common::{entry_url, html, png, requests_for, test_config};
use asset_mirror::crawler::{Coordinator, MetadataStore};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts an entry page with one image, both carrying entity tags, plus a
/// conditional `HEAD` answering `304` for matching tags
async fn mount_tagged_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(r#"<img src="img/a.png">"#).insert_header("ETag", "\"page-v1\""))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/img/a.png"))
        .respond_with(png(b"IMAGE-V1").insert_header("ETag", "\"img-v1\""))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/game/"))
        .and(header("If-None-Match", "\"page-v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/game/img/a.png"))
        .and(header("If-None-Match", "\"img-v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_second_run_transfers_nothing() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    mount_tagged_site(&server).await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let entry = entry_url(&server);

    let first = coordinator.crawl(&entry, dest.path()).await.unwrap();
    assert_eq!(first.totals().downloaded, 2);
    let metadata_after_first = std::fs::read(dest.path().join("metadata.json")).unwrap();

    let second = coordinator.crawl(&entry, dest.path()).await.unwrap();
    let totals = second.totals();
    assert_eq!(totals.downloaded, 0);
    assert_eq!(totals.up_to_date, 2);
    assert_eq!(totals.failed, 0);

    let metadata_after_second = std::fs::read(dest.path().join("metadata.json")).unwrap();
    assert_eq!(metadata_after_first, metadata_after_second);

    // One GET per resource across both runs
    let gets = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.to_string() == "GET" && r.url.path() == "/game/img/a.png")
        .count();
    assert_eq!(gets, 1);
}

#[tokio::test]
async fn test_not_modified_leaves_file_untouched() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();
    mount_tagged_site(&server).await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let entry = entry_url(&server);
    coordinator.crawl(&entry, dest.path()).await.unwrap();

    // A local edit survives revalidation because the origin answers 304
    let image = dest.path().join("img/a.png");
    std::fs::write(&image, b"LOCAL").unwrap();

    let report = coordinator.crawl(&entry, dest.path()).await.unwrap();
    assert_eq!(report.resources.up_to_date, 1);
    assert_eq!(std::fs::read(&image).unwrap(), b"LOCAL");
}

#[tokio::test]
async fn test_matching_etag_on_head_counts_as_current() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(r#"<img src="img/a.png">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/img/a.png"))
        .respond_with(png(b"A").insert_header("ETag", "W/\"42\""))
        .expect(1)
        .mount(&server)
        .await;
    // Origin ignores If-None-Match but reports the same tag
    Mock::given(method("HEAD"))
        .and(path("/game/img/a.png"))
        .and(header_exists("If-None-Match"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "W/\"42\""))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let entry = entry_url(&server);
    coordinator.crawl(&entry, dest.path()).await.unwrap();
    let report = coordinator.crawl(&entry, dest.path()).await.unwrap();

    assert_eq!(report.resources.up_to_date, 1);
    assert_eq!(report.resources.downloaded, 0);
}

#[tokio::test]
async fn test_changed_etag_downloads_again() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(r#"<img src="img/a.png">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/img/a.png"))
        .respond_with(png(b"V1").insert_header("ETag", "\"v1\""))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/img/a.png"))
        .respond_with(png(b"V2").insert_header("ETag", "\"v2\""))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/game/img/a.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"v2\""))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let entry = entry_url(&server);
    coordinator.crawl(&entry, dest.path()).await.unwrap();
    let report = coordinator.crawl(&entry, dest.path()).await.unwrap();

    assert_eq!(report.resources.downloaded, 1);
    assert_eq!(std::fs::read(dest.path().join("img/a.png")).unwrap(), b"V2");

    let store = MetadataStore::new(dest.path().join("metadata.json"));
    let image_url = entry.join("img/a.png").unwrap();
    assert_eq!(store.etag_for(&image_url).unwrap(), Some("\"v2\"".to_string()));
}

#[tokio::test]
async fn test_resource_without_etag_is_always_fetched() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(r#"<img src="img/a.png">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/img/a.png"))
        .respond_with(png(b"A"))
        .expect(2)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let entry = entry_url(&server);
    coordinator.crawl(&entry, dest.path()).await.unwrap();
    coordinator.crawl(&entry, dest.path()).await.unwrap();

    // No tag was stored, so no conditional HEAD is ever sent
    let heads = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.to_string() == "HEAD")
        .count();
    assert_eq!(heads, 0);
    assert_eq!(requests_for(&server, "/game/img/a.png").await, 2);

    let metadata: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dest.path().join("metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        metadata[image_key(&entry)],
        serde_json::json!({ "ETag": null })
    );
}

fn image_key(entry: &url::Url) -> String {
    entry.join("img/a.png").unwrap().to_string()
}

#[tokio::test]
async fn test_rejected_head_falls_back_to_download() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(r#"<img src="img/a.png">"#).insert_header("ETag", "\"page-v1\""))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/game/"))
        .and(header("If-None-Match", "\"page-v1\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/img/a.png"))
        .respond_with(png(b"IMAGE-V1").insert_header("ETag", "\"img-v1\""))
        .expect(2)
        .mount(&server)
        .await;
    // The origin refuses HEAD for images
    Mock::given(method("HEAD"))
        .and(path("/game/img/a.png"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let entry = entry_url(&server);

    coordinator.crawl(&entry, dest.path()).await.unwrap();
    let store = MetadataStore::new(dest.path().join("metadata.json"));
    let image_url = entry.join("img/a.png").unwrap();
    assert_eq!(store.etag_for(&image_url).unwrap(), Some("\"img-v1\"".to_string()));

    let second = coordinator.crawl(&entry, dest.path()).await.unwrap();
    assert_eq!(second.resources.downloaded, 1);
    assert_eq!(second.resources.failed, 0);
    assert!(!second.entry.transferred);
    assert_eq!(
        std::fs::read(dest.path().join("img/a.png")).unwrap(),
        b"IMAGE-V1"
    );
}
