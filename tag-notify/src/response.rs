//! HTTP-style response envelope returned by both handlers.

use std::collections::BTreeMap;

use serde::Serialize;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_SERVER_ERROR: u16 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// JSON document, already serialized.
    pub body: String,
}

impl HandlerResponse {
    pub fn new(status_code: u16, body: &serde_json::Value) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: body.to_string(),
        }
    }

    /// Same as [`HandlerResponse::new`] with a JSON content type header.
    pub fn json(status_code: u16, body: &serde_json::Value) -> Self {
        let mut response = Self::new(status_code, body);
        response
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        response
    }

    /// The body parsed back into JSON.
    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
