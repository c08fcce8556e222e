//! Worker message protocol.
//!
//! Messages cross the worker boundary as JSON text:
//!
//! ```text
//! -> {"id": "…", "action": "init"}
//! -> {"id": "…", "action": "handleRoute", "path": "/blog/post"}
//! <- {"id": "…", "result": …, "html": "…", "error": "…"}
//! ```
//!
//! Absent response fields are omitted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Action {
    /// Mount the database and create the Baker.
    #[serde(rename = "init")]
    Init,
    /// Render the page behind a route.
    #[serde(rename = "handleRoute")]
    HandleRoute { path: String },
}

/// Request sent to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-generated correlation id.
    pub id: String,
    #[serde(flatten)]
    pub action: Action,
}

impl Request {
    #[must_use]
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
        }
    }

    /// Encode as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed messages or unknown actions.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Response sent back by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Successful response carrying a result value.
    #[must_use]
    pub fn result(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            html: None,
            error: None,
        }
    }

    /// Successful response carrying rendered HTML.
    #[must_use]
    pub fn html(id: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            html: Some(html.into()),
            error: None,
        }
    }

    /// Failed response.
    #[must_use]
    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            html: None,
            error: Some(error.into()),
        }
    }

    /// Encode as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed messages.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
