//! Error types for the portal client SDK.

/// Errors that can occur when using the portal client.
///
/// HTTP-status errors (`NotFound`, `NotAuthorized`, `Conflict`, `Api`)
/// are raised only after the client's [`crate::envelope::ResponseEnvelope`]
/// has been fully populated, so callers can still inspect the raw status,
/// headers and body after catching the typed error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Bad client construction: malformed base URL, empty credentials, etc.
    /// Fails before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Illegal method/body combination. A body permits only POST or PUT;
    /// no body permits only GET or DELETE. Local precondition, no
    /// network call is made.
    #[error("invalid method {method} (body supplied: {has_body})")]
    InvalidMethod {
        /// The explicitly requested method
        method: reqwest::Method,
        /// Whether a body was supplied
        has_body: bool,
    },

    /// Transport-level failure: DNS, connection refused, timeout, TLS.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered a write (POST/PUT/DELETE) with a redirect.
    /// Following it would silently drop the request body on most stacks,
    /// so it is always surfaced as a failure.
    #[error("redirect on write ({status}) to {location:?}")]
    RedirectOnWrite {
        /// Redirect status code (3xx)
        status: u16,
        /// Target of the Location header, if present
        location: Option<String>,
    },

    /// Entity not found (404)
    #[error("not found: {body}")]
    NotFound {
        /// Raw response body
        body: String,
    },

    /// Not authorized (403)
    #[error("not authorized: {body}")]
    NotAuthorized {
        /// Raw response body
        body: String,
    },

    /// Conflict (409), e.g. registering an already-registered name
    #[error("conflict: {body}")]
    Conflict {
        /// Raw response body
        body: String,
    },

    /// Any other non-success HTTP status
    #[error("api error ({status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Response declared as JSON but not parseable. Distinct from the
    /// HTTP errors: the status may have been 200.
    #[error("decode error: {reason} (body: {body})")]
    Decode {
        /// The raw body that failed to parse
        body: String,
        /// Parser failure description
        reason: String,
    },

    /// The action endpoint reported `success: false`. Carries the
    /// service's own error payload verbatim; the HTTP status for a
    /// failed action may itself be 200.
    #[error("action error: {error}")]
    Action {
        /// Service-reported error structure, unmodified
        error: serde_json::Value,
    },

    /// Request body serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local file I/O during upload
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// The HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::NotFound { .. } => Some(404),
            ClientError::NotAuthorized { .. } => Some(403),
            ClientError::Conflict { .. } => Some(409),
            ClientError::Api { status, .. } => Some(*status),
            ClientError::RedirectOnWrite { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_extraction() {
        let err = ClientError::NotFound {
            body: "no such package".to_string(),
        };
        assert_eq!(err.status(), Some(404));

        let err = ClientError::Api {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.status(), Some(500));

        let err = ClientError::Config("bad url".to_string());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn invalid_method_message() {
        let err = ClientError::InvalidMethod {
            method: reqwest::Method::PUT,
            has_body: false,
        };
        assert!(err.to_string().contains("PUT"));
        assert!(err.to_string().contains("false"));
    }
}
