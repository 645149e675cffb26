//! HTTP client for the portal REST and action APIs.

use crate::config::ClientConfig;
use crate::envelope::ResponseEnvelope;
use crate::error::{ClientError, Result};
use crate::resource::{self, Resource};
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Secondary API-key header, sent alongside `Authorization` for
/// compatibility with older server generations.
const API_KEY_HEADER: &str = "x-api-key";

/// GET redirects are followed by hand (the underlying client has
/// redirects disabled so writes are never silently re-issued).
const MAX_REDIRECTS: u8 = 5;

/// Whether a JSON parse failure of a 2xx body is an error or the body
/// is simply kept raw. The lenient mode exists for the legacy
/// base-location probe only; every other path is strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeMode {
    Strict,
    Lenient,
}

/// Client for a single portal instance.
///
/// All operations are synchronous in the logical sense: exactly one
/// request (or, for search and upload, a bounded chain of requests) is
/// in flight per operation, and the [`ResponseEnvelope`] is reset and
/// repopulated within that operation. One client must therefore not be
/// shared by two concurrent logical operations; spin up one client per
/// worker instead, they need no coordination.
pub struct PortalClient {
    http: reqwest::Client,
    config: ClientConfig,
    envelope: Mutex<ResponseEnvelope>,
}

impl PortalClient {
    /// Create a new client builder with the given base URL.
    pub fn builder(base_url: impl Into<String>) -> crate::config::ClientConfigBuilder {
        crate::config::ClientConfigBuilder::new(base_url)
    }

    /// Create a new client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("portal-client")),
        );

        if let Some(ref api_key) = config.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|_| ClientError::Config("API key is not a valid header value".to_string()))?;
            // Both header variants carry the same opaque key; older
            // servers read Authorization, newer ones the custom header.
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value.clone());
            if config.basic_auth.is_none() {
                headers.insert(AUTHORIZATION, value);
            }
        }
        if let Some((ref user, ref password)) = config.basic_auth {
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", user, password));
            let value = HeaderValue::from_str(&format!("Basic {}", token))
                .map_err(|_| ClientError::Config("basic credentials are not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.tls_verify)
            // Redirect handling is the dispatcher's job: a redirect on a
            // write drops the body on most stacks and must surface as an
            // error instead.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            config,
            envelope: Mutex::new(ResponseEnvelope::default()),
        })
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Snapshot of the outcome of the last request issued by this
    /// client. Populated even when the operation returned an error, so
    /// raw status and body stay inspectable after the typed error has
    /// been caught.
    pub fn last_response(&self) -> ResponseEnvelope {
        self.envelope_mut().clone()
    }

    /// Status code of the last response, if one was received.
    pub fn last_status(&self) -> Option<u16> {
        self.envelope_mut().last_status
    }

    pub(crate) fn envelope_mut(&self) -> MutexGuard<'_, ResponseEnvelope> {
        // A poisoned lock only means a previous operation panicked
        // mid-populate; the envelope is still plain data.
        self.envelope.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn reset_envelope(&self) {
        self.envelope_mut().reset();
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // =========================================================================
    // Dispatcher
    // =========================================================================

    /// Issue a single request and record its outcome in the envelope.
    ///
    /// The method is inferred from body presence unless overridden; an
    /// override is constrained to POST/PUT with a body and GET/DELETE
    /// without one. HTTP-level failures (status >= 400) are *not* errors
    /// at this layer; [`classify`](Self::classify) turns them into typed
    /// errors after the envelope is populated.
    pub(crate) async fn dispatch(
        &self,
        url: &str,
        body: Option<&Value>,
        method: Option<Method>,
        extra_headers: HeaderMap,
        decode: DecodeMode,
    ) -> Result<()> {
        let method = infer_method(body.is_some(), method)?;
        let payload = match body {
            Some(value) => Some(serde_json::to_vec(value)?),
            None => None,
        };

        tracing::debug!(method = %method, url = %url, "sending request");
        let started = std::time::Instant::now();

        let mut current_url = url.to_string();
        let mut redirects = 0u8;
        let response = loop {
            let mut request = self.http.request(method.clone(), &current_url);
            if let Some(ref bytes) = payload {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(bytes.clone());
            }
            // Caller headers applied last so they are never silently
            // discarded by the defaults.
            request = request.headers(extra_headers.clone());

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    self.envelope_mut().last_transport_error = Some(err.to_string());
                    tracing::warn!(method = %method, url = %current_url, error = %err, "transport failure");
                    return Err(ClientError::Transport(err));
                }
            };

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                if method != Method::GET {
                    let mut env = self.envelope_mut();
                    env.last_status = Some(status.as_u16());
                    drop(env);
                    tracing::warn!(method = %method, url = %current_url, status = status.as_u16(), "redirect on write");
                    return Err(ClientError::RedirectOnWrite {
                        status: status.as_u16(),
                        location,
                    });
                }
                if redirects < MAX_REDIRECTS {
                    if let Some(location) = location {
                        redirects += 1;
                        current_url = absolutize(&location, &current_url);
                        continue;
                    }
                }
                // Too many hops or no Location header: capture the 3xx
                // and let classification report it.
                break response;
            }
            break response;
        };

        self.capture(response, decode).await?;

        let env = self.envelope_mut();
        tracing::debug!(
            method = %method,
            url = %url,
            status = ?env.last_status,
            duration_ms = started.elapsed().as_millis() as u64,
            "received response"
        );
        Ok(())
    }

    /// Record status, headers and body of a response in the envelope,
    /// parsing JSON bodies of successful responses.
    pub(crate) async fn capture(
        &self,
        response: reqwest::Response,
        decode: DecodeMode,
    ) -> Result<()> {
        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let declared_json = headers
            .get("content-type")
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                let mut env = self.envelope_mut();
                env.last_status = Some(status.as_u16());
                env.last_transport_error = Some(err.to_string());
                return Err(ClientError::Transport(err));
            }
        };

        let mut env = self.envelope_mut();
        env.last_status = Some(status.as_u16());
        env.last_headers = Some(headers);
        env.last_body = Some(body.clone());

        if status.is_success() && declared_json {
            match serde_json::from_str(&body) {
                Ok(message) => env.last_message = Some(message),
                Err(err) => {
                    if decode == DecodeMode::Strict {
                        drop(env);
                        return Err(ClientError::Decode {
                            body,
                            reason: err.to_string(),
                        });
                    }
                    // Lenient path: the body simply is not JSON; the
                    // raw text stays available in last_body.
                }
            }
        }
        Ok(())
    }

    /// Map the recorded status onto the uniform error table.
    ///
    /// 200/201 succeed with the parsed message (or `Null` for bodyless
    /// writes); 404, 403 and 409 map to their typed errors; everything
    /// else is a generic [`ClientError::Api`].
    pub(crate) fn classify(&self) -> Result<Value> {
        let env = self.envelope_mut();
        let status = env.last_status.unwrap_or(0);
        match status {
            200 | 201 => Ok(env.last_message.clone().unwrap_or(Value::Null)),
            _ => {
                let body = env.last_body.clone().unwrap_or_default();
                drop(env);
                Err(match status {
                    404 => ClientError::NotFound { body },
                    403 => ClientError::NotAuthorized { body },
                    409 => ClientError::Conflict { body },
                    status => ClientError::Api { status, body },
                })
            }
        }
    }

    /// Reset, resolve, dispatch, classify. Every public REST operation
    /// funnels through here so the sequence cannot drift between
    /// resource kinds.
    async fn request(
        &self,
        resource: Resource,
        entity_id: Option<&str>,
        subregister: Option<&str>,
        entity2_id: Option<&str>,
        body: Option<&Value>,
        method: Option<Method>,
    ) -> Result<Value> {
        self.reset_envelope();
        let url = resource::resolve(
            &self.config.base_url,
            resource,
            entity_id,
            subregister,
            entity2_id,
        )?;
        self.dispatch(&url, body, method, HeaderMap::new(), DecodeMode::Strict)
            .await?;
        self.classify()
    }

    /// GET a resource whose body is a document rather than JSON (the
    /// package forms). Uses the strict path: these endpoints do not
    /// declare JSON, so no decode is attempted.
    async fn request_document(&self, resource: Resource, entity_id: Option<&str>) -> Result<String> {
        self.reset_envelope();
        let url = resource::resolve(&self.config.base_url, resource, entity_id, None, None)?;
        self.dispatch(&url, None, None, HeaderMap::new(), DecodeMode::Strict)
            .await?;
        self.classify()?;
        Ok(self.envelope_mut().last_body.clone().unwrap_or_default())
    }

    // =========================================================================
    // Base
    // =========================================================================

    /// Probe the API root. Legacy path: a body that fails to parse as
    /// JSON is kept raw in the envelope instead of raising
    /// [`ClientError::Decode`].
    pub async fn open_base_location(&self) -> Result<()> {
        self.reset_envelope();
        let url = resource::resolve(&self.config.base_url, Resource::Base, None, None, None)?;
        self.dispatch(&url, None, None, HeaderMap::new(), DecodeMode::Lenient)
            .await?;
        self.classify()?;
        Ok(())
    }

    // =========================================================================
    // Packages
    // =========================================================================

    /// List all registered package names.
    pub async fn package_register_get(&self) -> Result<Value> {
        self.request(Resource::PackageRegister, None, None, None, None, None)
            .await
    }

    /// Register a new package.
    pub async fn package_register_post(&self, package: &Value) -> Result<Value> {
        self.request(
            Resource::PackageRegister,
            None,
            None,
            None,
            Some(package),
            None,
        )
        .await
    }

    /// Fetch a package record by name.
    pub async fn package_entity_get(&self, package_name: &str) -> Result<Value> {
        self.request(
            Resource::PackageEntity,
            Some(package_name),
            None,
            None,
            None,
            None,
        )
        .await
    }

    /// Update a package record in full. The entity is addressed by the
    /// record's own `name` field.
    pub async fn package_entity_put(&self, package: &Value) -> Result<Value> {
        let name = record_name(package)?;
        self.request(
            Resource::PackageEntity,
            Some(&name),
            None,
            None,
            Some(package),
            Some(Method::PUT),
        )
        .await
    }

    /// Delete a package by name.
    pub async fn package_entity_delete(&self, package_name: &str) -> Result<()> {
        self.request(
            Resource::PackageEntity,
            Some(package_name),
            None,
            None,
            None,
            Some(Method::DELETE),
        )
        .await?;
        Ok(())
    }

    /// Fetch the package creation form (an HTML document).
    pub async fn package_create_form_get(&self) -> Result<String> {
        self.request_document(Resource::PackageCreateForm, None).await
    }

    /// Fetch the edit form for an existing package (an HTML document).
    pub async fn package_edit_form_get(&self, package_name: &str) -> Result<String> {
        self.request_document(Resource::PackageEditForm, Some(package_name))
            .await
    }

    // =========================================================================
    // Package relationships
    // =========================================================================

    /// List relationships of a package. With `rel_type` the listing is
    /// narrowed to that relationship type; with `object` as well, to the
    /// relationship with that one package.
    pub async fn package_relationship_register_get(
        &self,
        subject: &str,
        rel_type: Option<&str>,
        object: Option<&str>,
    ) -> Result<Value> {
        let subregister = rel_type.unwrap_or("relationships");
        self.request(
            Resource::PackageEntity,
            Some(subject),
            Some(subregister),
            object,
            None,
            None,
        )
        .await
    }

    /// Create a relationship between two packages.
    pub async fn package_relationship_entity_post(
        &self,
        subject: &str,
        rel_type: &str,
        object: &str,
        comment: &str,
    ) -> Result<Value> {
        let body = serde_json::json!({ "comment": comment });
        self.request(
            Resource::PackageEntity,
            Some(subject),
            Some(rel_type),
            Some(object),
            Some(&body),
            None,
        )
        .await
    }

    /// Update the comment on an existing relationship.
    pub async fn package_relationship_entity_put(
        &self,
        subject: &str,
        rel_type: &str,
        object: &str,
        comment: &str,
    ) -> Result<Value> {
        let body = serde_json::json!({ "comment": comment });
        self.request(
            Resource::PackageEntity,
            Some(subject),
            Some(rel_type),
            Some(object),
            Some(&body),
            Some(Method::PUT),
        )
        .await
    }

    /// Delete a relationship.
    pub async fn package_relationship_entity_delete(
        &self,
        subject: &str,
        rel_type: &str,
        object: &str,
    ) -> Result<()> {
        self.request(
            Resource::PackageEntity,
            Some(subject),
            Some(rel_type),
            Some(object),
            None,
            Some(Method::DELETE),
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// List all tags.
    pub async fn tag_register_get(&self) -> Result<Value> {
        self.request(Resource::TagRegister, None, None, None, None, None)
            .await
    }

    /// List the packages carrying a tag.
    pub async fn tag_entity_get(&self, tag_name: &str) -> Result<Value> {
        self.request(Resource::TagEntity, Some(tag_name), None, None, None, None)
            .await
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// List all groups.
    pub async fn group_register_get(&self) -> Result<Value> {
        self.request(Resource::GroupRegister, None, None, None, None, None)
            .await
    }

    /// Register a new group.
    pub async fn group_register_post(&self, group: &Value) -> Result<Value> {
        self.request(Resource::GroupRegister, None, None, None, Some(group), None)
            .await
    }

    /// Fetch a group record by name.
    pub async fn group_entity_get(&self, group_name: &str) -> Result<Value> {
        self.request(
            Resource::GroupEntity,
            Some(group_name),
            None,
            None,
            None,
            None,
        )
        .await
    }

    /// Update a group record in full, addressed by its `name` field.
    pub async fn group_entity_put(&self, group: &Value) -> Result<Value> {
        let name = record_name(group)?;
        self.request(
            Resource::GroupEntity,
            Some(&name),
            None,
            None,
            Some(group),
            Some(Method::PUT),
        )
        .await
    }

    // =========================================================================
    // Changesets
    // =========================================================================

    /// List all changesets.
    pub async fn changeset_register_get(&self) -> Result<Value> {
        self.request(Resource::ChangesetRegister, None, None, None, None, None)
            .await
    }

    /// Fetch a changeset by id.
    pub async fn changeset_entity_get(&self, changeset_id: &str) -> Result<Value> {
        self.request(
            Resource::ChangesetEntity,
            Some(changeset_id),
            None,
            None,
            None,
            None,
        )
        .await
    }

    // =========================================================================
    // Action API
    // =========================================================================

    /// Invoke an action endpoint.
    ///
    /// The HTTP status table applies first; on HTTP success the body is
    /// a `{help, success, result|error}` envelope. `success: false`
    /// raises [`ClientError::Action`] with the service's error payload
    /// verbatim (the HTTP status for a failed action may itself be 200);
    /// `success: true` returns `result`, with `help` and `result`
    /// retained in the envelope for introspection.
    pub async fn action(&self, action_name: &str, params: &Value) -> Result<Value> {
        self.reset_envelope();
        let url = resource::resolve_action(&self.config.base_url, action_name);
        self.dispatch(&url, Some(params), None, HeaderMap::new(), DecodeMode::Strict)
            .await?;
        let message = self.classify()?;

        let success = message
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut env = self.envelope_mut();
        env.last_help = message.get("help").cloned();
        if success {
            let result = message.get("result").cloned().unwrap_or(Value::Null);
            env.last_result = Some(result.clone());
            Ok(result)
        } else {
            let error = message.get("error").cloned().unwrap_or(Value::Null);
            env.last_action_error = Some(error.clone());
            Err(ClientError::Action { error })
        }
    }
}

/// Infer the HTTP method from body presence, or validate an explicit
/// override against it.
fn infer_method(has_body: bool, explicit: Option<Method>) -> Result<Method> {
    match explicit {
        None => Ok(if has_body { Method::POST } else { Method::GET }),
        Some(method) => {
            let legal = if has_body {
                method == Method::POST || method == Method::PUT
            } else {
                method == Method::GET || method == Method::DELETE
            };
            if legal {
                Ok(method)
            } else {
                Err(ClientError::InvalidMethod { method, has_body })
            }
        }
    }
}

/// Resolve a possibly-relative Location header against the request URL.
fn absolutize(location: &str, current_url: &str) -> String {
    match url::Url::parse(location) {
        Ok(absolute) => absolute.to_string(),
        Err(_) => url::Url::parse(current_url)
            .and_then(|base| base.join(location))
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| location.to_string()),
    }
}

/// The `name` field of a record, required for entity addressing.
fn record_name(record: &Value) -> Result<String> {
    record
        .get("name")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ClientError::Config("record has no \"name\" field".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_inferred_from_body_presence() {
        assert_eq!(infer_method(true, None).unwrap(), Method::POST);
        assert_eq!(infer_method(false, None).unwrap(), Method::GET);
    }

    #[test]
    fn explicit_method_constrained_by_body() {
        assert_eq!(infer_method(true, Some(Method::PUT)).unwrap(), Method::PUT);
        assert_eq!(
            infer_method(false, Some(Method::DELETE)).unwrap(),
            Method::DELETE
        );

        let err = infer_method(false, Some(Method::PUT)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidMethod { has_body: false, .. }));

        let err = infer_method(true, Some(Method::DELETE)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidMethod { has_body: true, .. }));

        let err = infer_method(false, Some(Method::POST)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidMethod { .. }));
    }

    #[test]
    fn absolutize_relative_location() {
        assert_eq!(
            absolutize("/api/rest/package", "http://x/old"),
            "http://x/api/rest/package"
        );
        assert_eq!(
            absolutize("http://y/elsewhere", "http://x/old"),
            "http://y/elsewhere"
        );
    }

    #[test]
    fn record_name_required() {
        let pkg = serde_json::json!({ "name": "mypkg" });
        assert_eq!(record_name(&pkg).unwrap(), "mypkg");

        let pkg = serde_json::json!({ "title": "anonymous" });
        assert!(matches!(record_name(&pkg), Err(ClientError::Config(_))));
    }
}
