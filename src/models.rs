//! Shared models and types for screenwall
//!
//! Response envelopes shared by the Control Panel and the HTTP layer.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Outcome of a Control Panel mutation; failures are values, never errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T> MutationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn failed(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
        }
    }

    pub fn is_error_code(&self, code: &str) -> bool {
        self.error_code.as_deref() == Some(code)
    }
}

impl<T> From<Result<T>> for MutationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failed(&e),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub db_connected: bool,
    pub realtime_subscribers: u64,
    pub local_displays: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_result_from_error() {
        let result: MutationResult<()> = Err(Error::EmptyQueue("screen s1".into())).into();
        assert!(!result.success);
        assert!(result.is_error_code("EMPTY_QUEUE"));
        assert_eq!(result.error.as_deref(), Some("Queue is empty: screen s1"));
    }

    #[test]
    fn test_mutation_result_serializes_without_nulls() {
        let result = MutationResult::ok(3);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 3}));
    }
}
