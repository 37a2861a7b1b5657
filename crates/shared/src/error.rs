use serde::{Deserialize, Serialize};

/// Error body produced by the backend (`{"detail": ...}`).
///
/// `detail` is a plain string for handled errors and a list of field
/// descriptors for request validation failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(serde_json::Value::String(detail.into())),
        }
    }

    /// The operator-facing message, if the backend supplied a readable one.
    pub fn message(&self) -> Option<&str> {
        match &self.detail {
            Some(serde_json::Value::String(text)) if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    /// Parses a raw response body; anything that is not an error body yields `None`.
    pub fn parse_message(raw: &[u8]) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(raw)
            .ok()
            .and_then(|body| body.message().map(str::to_string))
    }
}
