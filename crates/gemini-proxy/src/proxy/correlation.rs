//! Per-request ids for log and span correlation.
//!
//! Ids stay inside the proxy's own telemetry; they are never added to the
//! forwarded request or the relayed response.

use uuid::Uuid;

/// Generate a new request id (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
