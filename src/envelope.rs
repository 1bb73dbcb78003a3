// Uniform result envelope returned for every operation

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

/// Key under `data` naming the file a spilled response was written to
pub const SPILLED_PATH_KEY: &str = "responsePath";

/// `{success, data, error?}` as seen by external callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Success with nothing to return
    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Failure that still hands the caller something to diagnose
    pub fn failure_with_data(error: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error.into()),
        }
    }

    /// Stand-in for an envelope too large to send; keeps success and error,
    /// points `data` at the file holding the full envelope
    pub fn spilled(&self, path: &Path, bytes: usize) -> Self {
        Self {
            success: self.success,
            data: Some(json!({ SPILLED_PATH_KEY: path.to_string_lossy(), "bytes": bytes })),
            error: self.error.clone(),
        }
    }
}
