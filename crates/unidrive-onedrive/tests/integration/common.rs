//! Shared helpers for the OneDrive integration tests

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unidrive_core::{StaticToken, StorageProvider};
use unidrive_onedrive::{OneDriveConfig, OneDriveProvider};

/// Configuration pointing at the mock server
pub fn test_config(server: &MockServer) -> OneDriveConfig {
    OneDriveConfig::default().with_base_url(server.uri())
}

/// A provider wired to the mock server with a fixed token
pub fn provider(server: &MockServer) -> OneDriveProvider {
    OneDriveProvider::new(test_config(server))
        .with_token_source(Arc::new(StaticToken::new("test-token")))
}

/// JSON for a file item
pub fn file_item(id: &str, name: &str, size: u64) -> serde_json::Value {
    serde_json::json!({ "id": id, "name": name, "type": "file", "size": size })
}

/// JSON for a folder item
pub fn folder_item(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({ "id": id, "name": name, "type": "folder" })
}

/// Mounts a children listing for `id`
pub async fn mount_listing(server: &MockServer, id: &str, items: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/items/{id}/children")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": items })),
        )
        .mount(server)
        .await;
}

/// A provider whose root listing has been fetched once
pub async fn listed_provider(
    server: &MockServer,
    items: Vec<serde_json::Value>,
) -> OneDriveProvider {
    mount_listing(server, "root", items).await;
    let provider = provider(server);
    let root = provider.tree().read().root();
    provider
        .navigated_to(root)
        .await
        .expect("seeding listing failed");
    provider
}
