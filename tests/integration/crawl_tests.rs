//! End-to-end crawl behavior: scope, manifests, the worker pool and failures

use crate::common::{css, entry_url, html, png, requests_for, test_config};
use asset_mirror::crawler::{Coordinator, MetadataStore};
use std::time::Duration;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_cross_origin_resources_are_never_requested() {
    let server = MockServer::start().await;
    let other = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    let page = format!(
        r#"<html><head>
            <script src="{other}/lib.js"></script>
            <link rel="stylesheet" href="{other}/theme.css">
        </head><body>
            <img src="img/a.png">
            <img src="data:image/png;base64,iVBORw0KGgo=">
        </body></html>"#,
        other = other.uri()
    );

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(&page))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/img/a.png"))
        .respond_with(png(b"PNGDATA"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&other)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();

    assert_eq!(report.resources.attempted, 1);
    assert_eq!(report.resources.downloaded, 1);
    assert_eq!(
        std::fs::read(dest.path().join("img/a.png")).unwrap(),
        b"PNGDATA"
    );
    assert!(dest.path().join("index.html").exists());
}

#[tokio::test]
async fn test_manifest_resources_are_mirrored() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html("<html><body><canvas></canvas></body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/project.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_string(
                    r#"{"bg":"images/x.png","other":{"nested":"audio/y.mp3"},"ignore":"not_a_resource"}"#,
                ),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/images/x.png"))
        .respond_with(png(b"X"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/audio/y.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/not_a_resource"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();

    assert_eq!(report.manifest.map(|m| m.success), Some(true));
    assert_eq!(report.resources.attempted, 2);
    assert_eq!(report.resources.failed, 0);
    assert!(dest.path().join("project.json").exists());
    assert!(dest.path().join("images/x.png").exists());
    assert!(dest.path().join("audio/y.mp3").exists());

    // entry + manifest + two resources
    assert_eq!(report.totals().as_triple(), (4, 4, 0));
}

#[tokio::test]
async fn test_missing_manifest_is_not_an_error() {
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
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();

    assert_eq!(report.manifest.map(|m| m.success), Some(false));
    assert_eq!(report.totals().as_triple(), (2, 2, 0));
    assert!(!dest.path().join("project.json").exists());
}

#[tokio::test]
async fn test_pool_never_exceeds_concurrency() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    let images: String = (0..20)
        .map(|i| format!(r#"<img src="img/{}.png">"#, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(&images))
        .mount(&server)
        .await;
    for i in 0..20 {
        Mock::given(method("GET"))
            .and(path(format!("/game/img/{}.png", i)))
            .respond_with(png(b"P").set_delay(Duration::from_millis(50)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();

    assert_eq!(report.resources.attempted, 20);
    assert_eq!(report.resources.downloaded, 20);
    assert!(report.peak_workers <= 5, "peak was {}", report.peak_workers);
    assert!(report.peak_workers > 1, "pool never ran in parallel");
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    let images: String = (0..10)
        .map(|i| format!(r#"<img src="img/{}.png">"#, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(&images))
        .mount(&server)
        .await;
    for i in 0..10 {
        let response = if i < 3 {
            ResponseTemplate::new(500)
        } else {
            png(b"P")
        };
        Mock::given(method("GET"))
            .and(path(format!("/game/img/{}.png", i)))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .expect("resource failures never abort the crawl");

    assert_eq!(report.resources.attempted, 10);
    assert_eq!(report.resources.failed, 3);
    assert_eq!(report.resources.downloaded, 7);
    assert!(!dest.path().join("img/0.png").exists());
    assert!(dest.path().join("img/9.png").exists());
}

#[tokio::test]
async fn test_entry_failure_stops_the_crawl() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();

    assert!(report.entry_failed());
    assert_eq!(report.totals().as_triple(), (0, 0, 1));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/game/");
    assert!(!dest.path().join("index.html").exists());
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html("<html></html>"))
        .mount(&server)
        .await;

    let mut config = test_config(5);
    config.retry.max_retries = 3;
    let coordinator = Coordinator::new(config).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();

    assert!(!report.entry_failed());
    assert_eq!(requests_for(&server, "/game/").await, 3);
}

#[tokio::test]
async fn test_stylesheet_cycle_terminates() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(r#"<link rel="stylesheet" href="css/a.css">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/css/a.css"))
        .respond_with(css(r#"@import "b.css"; body { background: url(../img/bg.png); }"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/css/b.css"))
        .respond_with(css(r#"@import url("a.css"); .x { background: url('../img/bg.png'); }"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/game/img/bg.png"))
        .respond_with(png(b"BG"))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = tokio::time::timeout(
        Duration::from_secs(10),
        coordinator.crawl(&entry_url(&server), dest.path()),
    )
    .await
    .expect("crawl terminates")
    .unwrap();

    assert_eq!(report.resources.attempted, 3);
    assert_eq!(report.resources.failed, 0);
    assert!(dest.path().join("css/b.css").exists());
    assert!(dest.path().join("img/bg.png").exists());
}

#[tokio::test]
async fn test_text_is_reencoded_as_utf8() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(r#"<script src="js/strings.js"></script>"#))
        .mount(&server)
        .await;
    // "var s = 'café';" in Latin-1
    let mut latin1 = b"var s = 'caf".to_vec();
    latin1.push(0xE9);
    latin1.extend_from_slice(b"';");
    Mock::given(method("GET"))
        .and(path("/game/js/strings.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/javascript; charset=iso-8859-1")
                .set_body_bytes(latin1),
        )
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();

    let saved = std::fs::read_to_string(dest.path().join("js/strings.js")).unwrap();
    assert_eq!(saved, "var s = 'café';");
}

#[tokio::test]
async fn test_favicon_is_skipped() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(r#"<link rel="icon" href="favicon.ico">"#))
        .mount(&server)
        .await;
    Mock::given(any())
        .and(path("/game/favicon.ico"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();

    assert_eq!(report.resources.attempted, 1);
    assert_eq!(report.resources.up_to_date, 1);
    assert_eq!(report.resources.downloaded, 0);
}

#[tokio::test]
async fn test_site_root_link_does_not_overwrite_entry() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    let page = r#"<html><head><link rel="home" href="/"></head><body>GAME PAGE</body></html>"#;
    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html(page).insert_header("ETag", "\"page-v1\""))
        .mount(&server)
        .await;
    Mock::given(any())
        .and(path("/"))
        .respond_with(html("SITE ROOT"))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let entry = entry_url(&server);
    let report = coordinator.crawl(&entry, dest.path()).await.unwrap();

    assert_eq!(report.resources.attempted, 0);
    let saved = std::fs::read_to_string(dest.path().join("index.html")).unwrap();
    assert!(saved.contains("GAME PAGE"));
    assert!(!saved.contains("SITE ROOT"));

    let store = MetadataStore::new(dest.path().join("metadata.json"));
    assert_eq!(store.etag_for(&entry).unwrap(), Some("\"page-v1\"".to_string()));
}

#[tokio::test]
async fn test_entry_served_as_binary_is_reencoded() {
    let server = MockServer::start().await;
    let dest = tempfile::tempdir().unwrap();

    // French text in Latin-1 behind a generic content type
    let latin1: Vec<u8> = "<p>Le café est très bon, déjà servi à la fenêtre</p>"
        .chars()
        .map(|c| c as u32 as u8)
        .collect();
    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/octet-stream")
                .set_body_bytes(latin1),
        )
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config(5)).unwrap();
    let report = coordinator
        .crawl(&entry_url(&server), dest.path())
        .await
        .unwrap();
    assert!(report.entry.success);

    let raw = std::fs::read(dest.path().join("index.html")).unwrap();
    let saved = String::from_utf8(raw).expect("entry document is stored as UTF-8");
    assert!(saved.contains("Le café est très bon"));
}
