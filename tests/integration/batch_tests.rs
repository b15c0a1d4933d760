//! Batch mirroring into per-entry directories

use crate::common::{entry_url, html, test_config};
use asset_mirror::crawler::{mirror_all, Coordinator};
use asset_mirror::output::CATALOG_FILE;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_batch_mirrors_each_entry_into_its_own_directory() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/game/"))
        .respond_with(html("<html><body>game</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let good = entry_url(&server);
    let bad = Url::parse(&format!("{}/broken/", server.uri())).unwrap();

    let coordinator = Coordinator::new(test_config(2)).unwrap();
    let summary = mirror_all(&coordinator, &[good.clone(), bad.clone()], root.path(), false).await;

    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.mirrored(), vec![&good]);
    assert_eq!(summary.failed(), vec![&bad]);

    let host_folder = format!("127.0.0.1_{}", good.port().unwrap());
    assert!(root
        .path()
        .join(&host_folder)
        .join("game")
        .join("index.html")
        .exists());
    assert_eq!(summary.totals().failed, 1);
}

#[tokio::test]
async fn test_batch_writes_catalog_draft() {
    let server = MockServer::start().await;
    let root = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/space_race/"))
        .respond_with(html("<html></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/space_race/project.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"rows":[{"title":"Intro","titleText":"Race!","objects":[{"title":"Tips","text":"Go fast."}]}]}"#,
        ))
        .mount(&server)
        .await;

    let entry = Url::parse(&format!("{}/space_race/", server.uri())).unwrap();
    let coordinator = Coordinator::new(test_config(2)).unwrap();
    let summary = mirror_all(&coordinator, &[entry.clone()], root.path(), true).await;

    let catalog = summary.reports[0].destination.join(CATALOG_FILE);
    let markdown = std::fs::read_to_string(catalog).unwrap();
    assert!(markdown.starts_with(&format!("Game URL: {}", entry)));
    assert!(markdown.contains("Possible title: space race"));
    assert!(markdown.contains("## Intro"));
    assert!(markdown.contains("### Tips"));
}
