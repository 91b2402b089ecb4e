//! Delta synchronization and navigation refresh against the mock API

use wiremock::matchers::{bearer_token, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unidrive_core::{NodeRef, StorageError, StorageProvider};
use unidrive_dropbox::DropboxProvider;

use crate::common;

#[tokio::test]
async fn load_info_fetches_quota_root_and_runs_a_full_sync() {
    let server = MockServer::start().await;
    common::mount_account_info(&server, 5_000_000_000).await;
    common::mount_root_metadata(&server).await;
    common::mount_initial_delta(
        &server,
        serde_json::json!([
            ["/docs", {"path": "/Docs", "is_dir": true, "hash": "h1"}],
            ["/docs/report.pdf", {"path": "/Docs/Report.pdf", "is_dir": false, "bytes": 2048, "rev": "r1"}]
        ]),
        "cursor-1",
    )
    .await;

    let provider = common::provider(&server);
    provider.load_info().await.expect("load_info failed");

    assert_eq!(provider.quota(), 5_000_000_000);

    let tree = provider.tree();
    let graph = tree.read();
    assert_eq!(graph.get(graph.root()).unwrap().name, "Dropbox");
    assert_eq!(graph.get(graph.root()).unwrap().hash(), Some("root-hash-1"));

    let docs = graph.child_by_name(graph.root(), "Docs").unwrap();
    assert!(graph.get(docs).unwrap().is_directory());
    let report = graph.child_by_name(docs, "report.pdf").unwrap();
    assert_eq!(graph.get(report).unwrap().size(), 2048);
    assert_eq!(graph.get(report).unwrap().name, "Report.pdf");
}

#[tokio::test]
async fn paged_delta_applies_both_pages_and_keeps_the_last_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(query_param_is_missing("cursor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [["/a.txt", {"path": "/a.txt", "is_dir": false, "bytes": 1, "rev": "ra"}]],
            "cursor": "cursor-page-1",
            "has_more": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(query_param("cursor", "cursor-page-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [["/b.txt", {"path": "/b.txt", "is_dir": false, "bytes": 2, "rev": "rb"}]],
            "cursor": "cursor-page-2",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    provider.synchronize().await.expect("synchronize failed");

    {
        let tree = provider.tree();
        let graph = tree.read();
        assert!(graph.child_by_name(graph.root(), "a.txt").is_some());
        assert!(graph.child_by_name(graph.root(), "b.txt").is_some());
    }

    // The next cycle must resume from the second page's cursor, not replay
    // the first.
    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(query_param("cursor", "cursor-page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [],
            "cursor": "cursor-page-3",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    provider.synchronize().await.expect("second cycle failed");
}

#[tokio::test]
async fn reset_discards_cached_contents_but_keeps_the_root() {
    let server = MockServer::start().await;
    let provider = common::seeded_provider(
        &server,
        serde_json::json!([
            ["/old.txt", {"path": "/old.txt", "is_dir": false, "bytes": 9, "rev": "r-old"}]
        ]),
        "cursor-seed",
    )
    .await;

    let root_before = provider.tree().read().root();

    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(query_param("cursor", "cursor-seed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [["/new.txt", {"path": "/new.txt", "is_dir": false, "bytes": 3, "rev": "r-new"}]],
            "cursor": "cursor-after-reset",
            "has_more": false,
            "reset": true
        })))
        .mount(&server)
        .await;

    provider.synchronize().await.expect("reset cycle failed");

    let tree = provider.tree();
    let graph = tree.read();
    assert_eq!(graph.root(), root_before);
    assert!(graph.child_by_name(graph.root(), "old.txt").is_none());
    assert!(graph.child_by_name(graph.root(), "new.txt").is_some());
}

#[tokio::test]
async fn removal_entries_drop_whole_subtrees() {
    let server = MockServer::start().await;
    let provider = common::seeded_provider(
        &server,
        serde_json::json!([
            ["/docs", {"path": "/Docs", "is_dir": true, "hash": "h1"}],
            ["/docs/a.txt", {"path": "/Docs/a.txt", "is_dir": false, "bytes": 4, "rev": "r1"}]
        ]),
        "cursor-seed",
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(query_param("cursor", "cursor-seed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [["/docs", null]],
            "cursor": "cursor-2",
            "has_more": false
        })))
        .mount(&server)
        .await;

    provider.synchronize().await.expect("removal cycle failed");

    let tree = provider.tree();
    let graph = tree.read();
    assert!(graph.child_by_name(graph.root(), "docs").is_none());
    assert_eq!(graph.len(), 1);
}

#[tokio::test]
async fn navigated_to_with_current_marker_is_a_no_op() {
    let server = MockServer::start().await;
    let provider = common::seeded_provider(
        &server,
        serde_json::json!([
            ["/docs", {"path": "/Docs", "is_dir": true, "hash": "h1"}]
        ]),
        "cursor-seed",
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/metadata/dropbox/Docs"))
        .and(query_param("hash", "h1"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    // No further delta request may happen for an unchanged directory.
    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(query_param("cursor", "cursor-seed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [], "cursor": "cursor-x", "has_more": false
        })))
        .expect(0)
        .mount(&server)
        .await;

    let tree = provider.tree();
    let docs = {
        let graph = tree.read();
        graph.child_by_name(graph.root(), "docs").unwrap()
    };
    provider.navigated_to(docs).await.expect("navigated_to failed");
}

#[tokio::test]
async fn navigated_to_marker_mismatch_updates_and_resynchronizes() {
    let server = MockServer::start().await;
    let provider = common::seeded_provider(
        &server,
        serde_json::json!([
            ["/docs", {"path": "/Docs", "is_dir": true, "hash": "h1"}]
        ]),
        "cursor-seed",
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/metadata/dropbox/Docs"))
        .and(query_param("hash", "h1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "path": "/Docs", "is_dir": true, "hash": "h2"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(query_param("cursor", "cursor-seed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [["/docs/fresh.txt", {"path": "/Docs/fresh.txt", "is_dir": false, "bytes": 1, "rev": "rf"}]],
            "cursor": "cursor-2",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tree = provider.tree();
    let docs = {
        let graph = tree.read();
        graph.child_by_name(graph.root(), "docs").unwrap()
    };
    provider.navigated_to(docs).await.expect("navigated_to failed");

    let graph = tree.read();
    assert_eq!(graph.get(docs).unwrap().hash(), Some("h2"));
    assert!(graph.child_by_name(docs, "fresh.txt").is_some());
}

#[tokio::test]
async fn navigate_through_the_facade_reaches_nested_files() {
    let server = MockServer::start().await;
    let provider = std::sync::Arc::new(
        common::seeded_provider(
            &server,
            serde_json::json!([
                ["/docs", {"path": "/Docs", "is_dir": true, "hash": "h1"}],
                ["/docs/a.txt", {"path": "/Docs/a.txt", "is_dir": false, "bytes": 4, "rev": "r1"}]
            ]),
            "cursor-seed",
        )
        .await,
    );

    // Root and /Docs are probed while walking; both markers are current.
    Mock::given(method("GET"))
        .and(path("/metadata/dropbox"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/metadata/dropbox/Docs"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let root = NodeRef::root(provider);
    let file = root
        .navigate("Docs/A.TXT")
        .await
        .expect("navigate failed")
        .expect("file not found");
    assert_eq!(file.name().unwrap(), "a.txt");
    assert_eq!(file.size().unwrap(), 4);
}

#[tokio::test]
async fn server_errors_map_into_the_taxonomy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/delta"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({"error": "over capacity"})),
        )
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let err = provider.synchronize().await.unwrap_err();
    match err {
        StorageError::ProviderUnavailable { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "over capacity");
        }
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_credentials_fail_with_not_configured() {
    let server = MockServer::start().await;
    let provider = DropboxProvider::new(common::test_config(&server));
    assert!(matches!(
        provider.load_info().await,
        Err(StorageError::NotConfigured(_))
    ));
}

#[tokio::test]
async fn a_401_is_retried_once_after_refreshing_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(bearer_token("stale-token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "expired"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .and(bearer_token("fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [], "cursor": "cursor-1", "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = common::RefreshableToken::new();
    let provider = DropboxProvider::new(common::test_config(&server))
        .with_token_source(tokens.clone());

    provider.synchronize().await.expect("synchronize failed");
    assert_eq!(tokens.refresh_count(), 1);
}

#[tokio::test]
async fn a_second_401_propagates_without_further_refreshes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/delta"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "revoked"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let tokens = common::HopelessToken::new();
    let provider = DropboxProvider::new(common::test_config(&server))
        .with_token_source(tokens.clone());

    let err = provider.synchronize().await.unwrap_err();
    assert!(matches!(err, StorageError::AuthorizationFailure(_)));
    assert_eq!(tokens.refreshes.load(std::sync::atomic::Ordering::SeqCst), 1);
}
