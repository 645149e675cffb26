//! Portal Client SDK
//!
//! A Rust HTTP client for a data portal's catalog REST API and its
//! JSON-RPC-style action API, covering package, group and tag records,
//! package relationships, changesets, paginated full-text search, blob
//! storage upload, and the portal's document index.
//!
//! Records are opaque JSON documents ([`serde_json::Value`]) defined by
//! the remote service; the client serializes and transports them but
//! neither validates nor enforces a schema.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use portal_client::{ClientConfig, PortalClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PortalClient::new(
//!         ClientConfig::builder("http://portal.example.org/api/rest")
//!             .api_key("my-key")
//!             .build()?,
//!     )?;
//!
//!     // List and fetch packages.
//!     let names = client.package_register_get().await?;
//!     println!("{} packages", names.as_array().map_or(0, |a| a.len()));
//!     let pkg = client.package_entity_get("gold-prices").await?;
//!     println!("{}", pkg["title"]);
//!
//!     // Search with transparent pagination.
//!     let mut found = client.package_search("gold", None).await?;
//!     while let Some(item) = found.results.try_next().await? {
//!         println!("{}", item);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return `Result<T, ClientError>`. HTTP failures map
//! uniformly: 404 to `NotFound`, 403 to `NotAuthorized`, 409 to
//! `Conflict`, anything else non-success to `Api`. A failed action call
//! raises `Action` with the service's own error payload even when the
//! HTTP status was 200. The envelope of the last request stays
//! available via [`PortalClient::last_response`] after any error.
//!
//! # Concurrency
//!
//! The client is a plain call-and-return library: no background work,
//! no retries, at most one request in flight per operation. The
//! last-response envelope makes a single client unsuitable for sharing
//! between concurrent operations; use one client per worker.

pub mod client;
pub mod config;
pub mod datastore;
pub mod envelope;
pub mod error;
pub mod resource;
pub mod search;
pub mod storage;

// Re-exports for convenience
pub use client::PortalClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use datastore::{DataStoreAuth, DataStoreClient};
pub use envelope::ResponseEnvelope;
pub use error::{ClientError, Result};
pub use resource::Resource;
pub use search::{SearchResponse, SearchResults, DEFAULT_PAGE_SIZE};
