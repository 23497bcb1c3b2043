//! Request identifiers.
//!
//! Every request flowing through the pipeline carries a [`RequestId`]. It is
//! either taken from an inbound correlation header or freshly generated as a
//! UUID v7, and is echoed back to the client on the response.

use http::HeaderValue;
use serde::Serialize;
use uuid::Uuid;

/// Longest inbound identifier accepted from a client, in bytes.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// A request correlation identifier.
///
/// Values are always non-empty visible ASCII, so they can be written to a
/// response header without further checks.
///
/// # Example
///
/// ```
/// use atelier_core::RequestId;
///
/// let generated = RequestId::new();
/// assert!(!generated.as_str().is_empty());
///
/// let inbound = RequestId::parse("req-42").unwrap();
/// assert_eq!(inbound.as_str(), "req-42");
///
/// assert!(RequestId::parse("").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh identifier using UUID v7.
    ///
    /// UUID v7 is time-ordered, so generated ids sort by creation time.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Accepts an identifier supplied by a client or upstream service.
    ///
    /// Returns `None` when the value is empty, longer than
    /// [`MAX_REQUEST_ID_LEN`] bytes, or contains anything other than
    /// visible ASCII.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || value.len() > MAX_REQUEST_ID_LEN {
            return None;
        }
        if !value.bytes().all(|b| b.is_ascii_graphic()) {
            return None;
        }
        Some(Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts the identifier into a header value.
    #[must_use]
    pub fn to_header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.0).expect("request ids are visible ASCII")
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_parse_accepts_arbitrary_visible_ascii() {
        let id = RequestId::parse("trace-abc_123:xyz").unwrap();
        assert_eq!(id.as_str(), "trace-abc_123:xyz");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id = RequestId::parse("  req-1 ").unwrap();
        assert_eq!(id.as_str(), "req-1");
    }

    #[test]
    fn test_parse_rejects_invalid_values() {
        assert!(RequestId::parse("").is_none());
        assert!(RequestId::parse("   ").is_none());
        assert!(RequestId::parse("has space").is_none());
        assert!(RequestId::parse("naïve").is_none());
        assert!(RequestId::parse(&"a".repeat(MAX_REQUEST_ID_LEN + 1)).is_none());
    }

    #[test]
    fn test_display_and_serialization() {
        let id = RequestId::parse("req-9").unwrap();
        assert_eq!(id.to_string(), "req-9");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"req-9\"");
    }

    #[test]
    fn test_to_header_value() {
        let id = RequestId::new();
        assert_eq!(id.to_header_value().to_str().unwrap(), id.as_str());
    }

    proptest! {
        #[test]
        fn prop_parsed_ids_are_valid_header_values(raw in "\\PC{0,200}") {
            if let Some(id) = RequestId::parse(&raw) {
                prop_assert!(HeaderValue::from_str(id.as_str()).is_ok());
                prop_assert!(id.as_str().len() <= MAX_REQUEST_ID_LEN);
            }
        }
    }
}
