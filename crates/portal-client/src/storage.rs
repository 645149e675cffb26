//! Blob storage: file upload and package resource attachment.

use crate::client::{DecodeMode, PortalClient};
use crate::error::{ClientError, Result};
use crate::resource::Resource;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;

impl PortalClient {
    /// Fetch the storage metadata record for a label. Labels are
    /// server-side paths, so their `/` separators are kept verbatim.
    pub async fn storage_metadata_get(&self, label: &str) -> Result<Value> {
        self.storage_request(Resource::StorageMetadata, label).await
    }

    /// Request upload authorization for a storage key. The response is
    /// a `{action, fields}` form descriptor for the multipart POST.
    pub async fn storage_auth_get(&self, key: &str) -> Result<Value> {
        self.storage_request(Resource::StorageAuth, key).await
    }

    async fn storage_request(&self, resource: Resource, label: &str) -> Result<Value> {
        self.reset_envelope();
        let url = format!("{}{}/{}", self.base_url(), resource.path(), label);
        self.dispatch(
            &url,
            None,
            None,
            reqwest::header::HeaderMap::new(),
            DecodeMode::Strict,
        )
        .await?;
        self.classify()
    }

    /// Upload a local file to blob storage and return its public URL.
    ///
    /// The storage key is derived from the upload timestamp and the
    /// normalized filename, the upload endpoint and form fields come
    /// from the storage-auth response.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let key = storage_key(path);
        self.upload_bytes(&key, bytes, &guess_mime(path)).await
    }

    async fn upload_bytes(&self, key: &str, bytes: Vec<u8>, mime: &str) -> Result<String> {
        let auth = self.storage_auth_get(key).await?;
        let action_url = auth
            .get("action")
            .and_then(Value::as_str)
            .map(|action| absolutize_action(action, self.base_url()))
            .ok_or_else(|| ClientError::Decode {
                body: auth.to_string(),
                reason: "storage auth response has no \"action\" field".to_string(),
            })?;

        let mut form = reqwest::multipart::Form::new();
        if let Some(fields) = auth.get("fields").and_then(Value::as_array) {
            for field in fields {
                let name = field.get("name").and_then(Value::as_str).unwrap_or_default();
                let value = field.get("value").and_then(Value::as_str).unwrap_or_default();
                if !name.is_empty() {
                    form = form.text(name.to_string(), value.to_string());
                }
            }
        }
        let file_name = key.rsplit('/').next().unwrap_or(key).to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)?;
        form = form.part("file", part);

        tracing::debug!(key = %key, url = %action_url, "uploading file");
        self.reset_envelope();
        let response = match self.http().post(&action_url).multipart(form).send().await {
            Ok(response) => response,
            Err(err) => {
                self.envelope_mut().last_transport_error = Some(err.to_string());
                return Err(ClientError::Transport(err));
            }
        };
        self.capture(response, DecodeMode::Lenient).await?;
        self.classify()?;

        Ok(format!("{}/storage/f/{}", self.base_url(), key))
    }

    /// Attach a resource to a package record.
    ///
    /// A local path is uploaded first and described by URL, filename,
    /// guessed mime type, content hash and size; an `http(s)://`
    /// argument is described by its URL alone. Caller-supplied `fields`
    /// override the derived descriptor; a default `name` equal to the
    /// URL is filled in only when still absent. The package record is
    /// then read, its resource list extended, and the whole record
    /// written back.
    pub async fn add_package_resource(
        &self,
        package_name: &str,
        path_or_url: &str,
        fields: Map<String, Value>,
    ) -> Result<Value> {
        let mut descriptor = Map::new();
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            descriptor.insert("url".to_string(), Value::from(path_or_url));
        } else {
            let path = Path::new(path_or_url);
            let bytes = tokio::fs::read(path).await?;
            let hash = sha256_hex(&bytes);
            let size = bytes.len() as u64;
            let mime = guess_mime(path);
            let key = storage_key(path);
            let url = self.upload_bytes(&key, bytes, &mime).await?;

            descriptor.insert(
                "name".to_string(),
                Value::from(path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()),
            );
            descriptor.insert("mimetype".to_string(), Value::from(mime));
            descriptor.insert("hash".to_string(), Value::from(hash));
            descriptor.insert("size".to_string(), Value::from(size));
            descriptor.insert("url".to_string(), Value::from(url));
        }

        for (key, value) in fields {
            descriptor.insert(key, value);
        }
        if !descriptor.contains_key("name") {
            let url = descriptor
                .get("url")
                .cloned()
                .unwrap_or(Value::String(String::new()));
            descriptor.insert("name".to_string(), url);
        }

        let mut package = self.package_entity_get(package_name).await?;
        let record = package.as_object_mut().ok_or_else(|| ClientError::Decode {
            body: String::new(),
            reason: "package entity is not a JSON object".to_string(),
        })?;
        let resources = record
            .entry("resources".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match resources.as_array_mut() {
            Some(list) => list.push(Value::Object(descriptor)),
            None => {
                return Err(ClientError::Decode {
                    body: resources.to_string(),
                    reason: "package \"resources\" field is not a list".to_string(),
                })
            }
        }

        self.package_entity_put(&package).await
    }
}

/// Storage key for a local file: upload timestamp plus the filename
/// with whitespace collapsed to dashes.
fn storage_key(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let normalized: String = file_name
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S");
    format!("{}/{}", stamp, normalized)
}

/// Mime type guessed from the file extension.
fn guess_mime(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => "text/csv",
        "json" | "geojson" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Lowercase hex SHA-256 of the file content.
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// The auth `action` may be host-relative; resolve it against the
/// configured base address.
fn absolutize_action(action: &str, base: &str) -> String {
    if action.starts_with("http://") || action.starts_with("https://") {
        return action.to_string();
    }
    match url::Url::parse(base).and_then(|b| b.join(action)) {
        Ok(joined) => joined.to_string(),
        Err(_) => action.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_normalizes_whitespace() {
        let key = storage_key(Path::new("/tmp/my data file.csv"));
        let (stamp, name) = key.split_once('/').unwrap();
        assert_eq!(name, "my-data-file.csv");
        assert!(stamp.contains('T'));
    }

    #[test]
    fn mime_guessed_from_extension() {
        assert_eq!(guess_mime(Path::new("a.csv")), "text/csv");
        assert_eq!(guess_mime(Path::new("a.JSON")), "application/json");
        assert_eq!(guess_mime(Path::new("a.unknown")), "application/octet-stream");
        assert_eq!(guess_mime(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn sha256_hex_of_known_input() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn relative_action_resolved_against_base() {
        assert_eq!(
            absolutize_action("/storage/upload", "http://x/api/rest"),
            "http://x/storage/upload"
        );
        assert_eq!(
            absolutize_action("http://cdn/upload", "http://x/api/rest"),
            "http://cdn/upload"
        );
    }
}
