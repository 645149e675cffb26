//! Per-call response state.

use std::collections::HashMap;

/// Outcome of the most recently issued request.
///
/// Owned by a single client instance and reset at the start of every
/// public operation, then populated exactly once before the operation
/// returns or errors. Because reset, dispatch and read-back are not
/// atomic across operations, one client must not be shared by two
/// concurrent logical operations; independent client instances need no
/// coordination.
#[derive(Debug, Clone, Default)]
pub struct ResponseEnvelope {
    /// HTTP status of the last response, absent if the request never
    /// reached the HTTP layer
    pub last_status: Option<u16>,
    /// Raw response body
    pub last_body: Option<String>,
    /// Response headers
    pub last_headers: Option<HashMap<String, String>>,
    /// Parsed JSON body, when the response declared a JSON content type
    /// and parsing succeeded
    pub last_message: Option<serde_json::Value>,
    /// Description of a transport-level failure (DNS, refused
    /// connection, timeout), absent otherwise
    pub last_transport_error: Option<String>,
    /// `help` field of the last action envelope
    pub last_help: Option<serde_json::Value>,
    /// `result` field of the last successful action envelope
    pub last_result: Option<serde_json::Value>,
    /// `error` field of the last failed action envelope, verbatim
    pub last_action_error: Option<serde_json::Value>,
}

impl ResponseEnvelope {
    /// Reset all fields to absent.
    pub fn reset(&mut self) {
        *self = ResponseEnvelope::default();
    }
}
