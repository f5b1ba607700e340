//! Decoded `multipart/mixed` parts for asserting on encoded bodies.

/// One part of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub body: Vec<u8>,
}

impl Part {
    /// Body parsed as JSON. Panics if it is not.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("part body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn is_keepalive(&self) -> bool {
        self.content_type.as_deref() == Some("text/plain") && self.body == b"keepalive"
    }
}
