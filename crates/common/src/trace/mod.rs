//! Per-request trace identifiers
//!
//! A trace id is generated once at request entry and threaded unchanged
//! through every downstream call, log line and metric event.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque unique token identifying one request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Arc<str>);

impl TraceId {
    /// Generate a fresh trace id (UUID v4)
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Adopt an id supplied by the caller (e.g. an `x-request-id` header).
    ///
    /// Blank or oversized values are replaced by a generated id.
    pub fn from_external(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.len() > 128 {
            return Self::new();
        }
        Self(Arc::from(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = TraceId::new();
        let b = TraceId::new();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_external_id() {
        assert_eq!(TraceId::from_external(" req-42 ").as_str(), "req-42");
        assert!(Uuid::parse_str(TraceId::from_external("  ").as_str()).is_ok());
        assert!(Uuid::parse_str(TraceId::from_external(&"x".repeat(200)).as_str()).is_ok());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = TraceId::from_external("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: TraceId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }
}
