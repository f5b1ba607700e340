use bytes::{BufMut, Bytes, BytesMut};

const LB: &str = "\r\n";

/// Payload of an idle keepalive part.
pub const KEEPALIVE: &str = "keepalive";

/// A fresh boundary, unique per response.
pub fn generate_boundary() -> String {
    format!("-boundary-{}", uuid::Uuid::new_v4().simple())
}

/// `Content-Type` header value of a response using `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary=\"{}\"", boundary)
}

/// Produces the framing bytes of one multipart body.
///
/// Payload bytes are not touched; callers write them between
/// [`MultipartWriter::part`] and the next part or [`MultipartWriter::end`].
#[derive(Debug, Clone)]
pub struct MultipartWriter {
    boundary: String,
    first: bool,
}

impl MultipartWriter {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            first: true,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        content_type(&self.boundary)
    }

    /// Delimiter and headers of the next part, up to and including the blank
    /// line that precedes the payload.
    pub fn part(&mut self, content_type: &str, filename: Option<&str>) -> Bytes {
        let mut buf = BytesMut::with_capacity(128);
        if !self.first {
            buf.put_slice(LB.as_bytes());
        }
        self.first = false;

        buf.put_slice(format!("--{}{}", self.boundary, LB).as_bytes());
        if let Some(filename) = filename {
            buf.put_slice(
                format!(
                    "Content-Disposition: attachment; filename=\"{}\"{}",
                    escape_quotes(filename),
                    LB
                )
                .as_bytes(),
            );
        }
        buf.put_slice(format!("Content-Type: {}{}", content_type, LB).as_bytes());
        buf.put_slice(LB.as_bytes());
        buf.freeze()
    }

    /// A complete JSON part.
    pub fn json_part(&mut self, payload: &impl serde::Serialize) -> serde_json::Result<Bytes> {
        let body = serde_json::to_vec(payload)?;
        let mut buf = BytesMut::from(&self.part("application/json", None)[..]);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// A complete plain-text part.
    pub fn text_part(&mut self, text: &str) -> Bytes {
        let mut buf = BytesMut::from(&self.part("text/plain", None)[..]);
        buf.put_slice(text.as_bytes());
        buf.freeze()
    }

    /// Closing delimiter.
    pub fn end(&self) -> Bytes {
        Bytes::from(format!("{}--{}--{}", LB, self.boundary, LB))
    }
}

fn escape_quotes(filename: &str) -> String {
    filename.replace('\\', "\\\\").replace('"', "\\\"")
}
