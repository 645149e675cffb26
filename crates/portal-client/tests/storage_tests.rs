//! Integration tests for blob upload and package resource attachment.

use portal_client::{ClientConfig, PortalClient};
use serde_json::{json, Map, Value};
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server: &MockServer) -> PortalClient {
    let config = ClientConfig::builder(server.uri())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    PortalClient::new(config).unwrap()
}

/// Mount the storage-auth and upload-target mocks.
async fn mount_storage(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/storage/auth/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "/storage/upload",
            "fields": [
                { "name": "policy", "value": "signed-policy" },
                { "name": "signature", "value": "sig" }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/storage/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_storage_metadata_get() {
    let server = MockServer::start().await;

    // Labels are server-side paths; their separators stay verbatim.
    Mock::given(method("GET"))
        .and(path("/storage/metadata/2011/gold-prices.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_label": "2011/gold-prices.csv",
            "_content_length": 28
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let metadata = client
        .storage_metadata_get("2011/gold-prices.csv")
        .await
        .unwrap();
    assert_eq!(metadata["_label"], "2011/gold-prices.csv");
    assert_eq!(metadata["_content_length"], 28);
}

#[tokio::test]
async fn test_upload_file_returns_public_url() {
    let server = MockServer::start().await;
    mount_storage(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("gold prices.csv");
    std::fs::write(&file_path, "date,price\n2011-01-01,1400\n").unwrap();

    let client = test_client(&server);
    let url = client.upload_file(&file_path).await.unwrap();

    // Key is timestamp/normalized-filename under the storage file path.
    assert!(url.starts_with(&format!("{}/storage/f/", server.uri())), "{}", url);
    assert!(url.ends_with("/gold-prices.csv"), "{}", url);
}

#[tokio::test]
async fn test_upload_failure_surfaces_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/storage/auth/.+$"))
        .respond_with(ResponseTemplate::new(403).set_body_string("no upload for you"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("data.csv");
    std::fs::write(&file_path, "a,b\n").unwrap();

    let client = test_client(&server);
    let err = client.upload_file(&file_path).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_add_resource_from_remote_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/package/mypkg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "mypkg",
            "resources": []
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/package/mypkg"))
        .and(wiremock::matchers::body_string_contains(
            "http://files.example.org/data.csv",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "mypkg",
            "resources": [
                { "url": "http://files.example.org/data.csv",
                  "name": "http://files.example.org/data.csv",
                  "format": "CSV" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut fields = Map::new();
    fields.insert("format".to_string(), Value::from("CSV"));

    let client = test_client(&server);
    let updated = client
        .add_package_resource("mypkg", "http://files.example.org/data.csv", fields)
        .await
        .unwrap();

    let resources = updated["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 1);
    // Default name falls back to the URL when the caller supplied none.
    assert_eq!(resources[0]["name"], "http://files.example.org/data.csv");
}

#[tokio::test]
async fn test_add_resource_from_local_file_builds_descriptor() {
    let server = MockServer::start().await;
    mount_storage(&server).await;

    let content = b"date,price\n2011-01-01,1400\n";

    Mock::given(method("GET"))
        .and(path("/package/mypkg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "mypkg"
        })))
        .mount(&server)
        .await;

    // sha256 of the file content above.
    let expected_hash = "4f38c9f90dd22960930bd9fb3b072c2e5e168f62646595223c36d0672f33a632";

    Mock::given(method("PUT"))
        .and(path("/package/mypkg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "mypkg",
            "resources": [{
                "name": "prices.csv",
                "mimetype": "text/csv",
                "size": content.len(),
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("prices.csv");
    std::fs::write(&file_path, content).unwrap();

    let client = test_client(&server);
    let updated = client
        .add_package_resource("mypkg", file_path.to_str().unwrap(), Map::new())
        .await
        .unwrap();
    assert_eq!(updated["resources"][0]["mimetype"], "text/csv");

    // The PUT body carried the derived descriptor; check what we sent
    // via the recorded requests.
    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|r| r.method == wiremock::http::Method::PUT)
        .unwrap();
    let sent: Value = serde_json::from_slice(&put.body).unwrap();
    let descriptor = &sent["resources"][0];
    assert_eq!(descriptor["name"], "prices.csv");
    assert_eq!(descriptor["mimetype"], "text/csv");
    assert_eq!(descriptor["size"], content.len());
    assert_eq!(descriptor["hash"], expected_hash);
    assert!(descriptor["url"]
        .as_str()
        .unwrap()
        .contains("/storage/f/"));
}
