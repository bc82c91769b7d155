//! Request and response bodies of the REST API.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Placeholder for a context value that is not set.
pub const ABSENT: &str = "N/A";

/// Longest `data` accepted by [`ProcessRequest`], in characters.
pub const MAX_DATA_CHARS: usize = 1000;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Snapshot of the request context as seen by a handler.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfoResponse {
    /// Request id, or `N/A` when unset.
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub request_id: String,
    /// User id, or `N/A` when unset.
    #[schema(example = "anonymous")]
    pub user_id: String,
    /// Every context entry.
    pub full_context: BTreeMap<String, String>,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

/// Body of 5xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[schema(example = "An unexpected error occurred")]
    pub message: String,
    pub request_id: String,
    pub timestamp: u64,
    #[schema(example = 500)]
    pub status: u16,
}

/// Body of 400 responses, naming every rejected field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorResponse {
    #[schema(example = "Validation failed")]
    pub message: String,
    /// Field name to human-readable reason.
    pub errors: BTreeMap<String, String>,
    pub request_id: String,
    pub timestamp: u64,
    #[schema(example = 400)]
    pub status: u16,
}

/// Input of the validated processing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    /// Data to process; must not be blank and at most 1000 characters.
    #[schema(example = "sample data to process", max_length = 1000)]
    pub data: String,
    /// Free-form processing options.
    #[schema(example = "uppercase")]
    pub options: Option<String>,
}

impl ProcessRequest {
    /// Checks field constraints, returning each violation keyed by field name.
    ///
    /// # Errors
    ///
    /// Returns the map of violations if any constraint fails.
    pub fn validate(&self) -> Result<(), BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();
        if self.data.trim().is_empty() {
            errors.insert("data".to_string(), "Data cannot be blank".to_string());
        } else if self.data.chars().count() > MAX_DATA_CHARS {
            errors.insert(
                "data".to_string(),
                format!("Data cannot exceed {MAX_DATA_CHARS} characters"),
            );
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(data: &str) -> ProcessRequest {
        ProcessRequest {
            data: data.to_string(),
            options: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request("hello").validate().is_ok());
        assert!(request(&"x".repeat(MAX_DATA_CHARS)).validate().is_ok());
    }

    #[test]
    fn blank_data_rejected() {
        let errors = request("   ").validate().unwrap_err();
        assert_eq!(errors["data"], "Data cannot be blank");
    }

    #[test]
    fn oversized_data_rejected() {
        let errors = request(&"x".repeat(MAX_DATA_CHARS + 1)).validate().unwrap_err();
        assert_eq!(errors["data"], "Data cannot exceed 1000 characters");
    }

    #[test]
    fn context_info_serializes_camel_case() {
        let info = ContextInfoResponse {
            request_id: "r".to_string(),
            user_id: ABSENT.to_string(),
            full_context: BTreeMap::from([("k".to_string(), "v".to_string())]),
            timestamp: 42,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["requestId"], "r");
        assert_eq!(json["userId"], "N/A");
        assert_eq!(json["fullContext"]["k"], "v");
        assert_eq!(json["timestamp"], 42);
    }

    #[test]
    fn process_request_options_optional() {
        let parsed: ProcessRequest = serde_json::from_str(r#"{"data":"abc"}"#).unwrap();
        assert_eq!(parsed.data, "abc");
        assert!(parsed.options.is_none());
    }

    #[test]
    fn epoch_millis_is_recent() {
        assert!(epoch_millis() > 1_600_000_000_000);
    }
}
