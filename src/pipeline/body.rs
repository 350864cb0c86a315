//! Body and header snapshots that leave the live message untouched.
//!
//! A body is buffered only when its size hint has an upper bound within the
//! configured cap. The buffered bytes are handed back as a fresh body, so the
//! downstream handler (or the client) sees exactly what was sent.

use axum::body::{Body, Bytes, HttpBody};
use http::HeaderMap;
use std::collections::BTreeMap;

pub const REDACTED: &str = "[redacted]";

const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "proxy-authorization"];

/// Serializes the header map as a JSON object, joining repeated headers.
pub fn serialize_headers(headers: &HeaderMap) -> Option<String> {
    if headers.is_empty() {
        return None;
    }

    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let rendered = if SENSITIVE_HEADERS.contains(&name.as_str()) {
            REDACTED.to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&rendered);
            })
            .or_insert(rendered);
    }

    serde_json::to_string(&map).ok()
}

/// Text form of a captured body. Empty bodies have no text.
pub fn render_body(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_string()),
        Err(_) => Some(format!("[binary {} bytes]", bytes.len())),
    }
}

/// Buffers `body` when it is small enough and returns a replacement body
/// with identical content, plus the captured text or a placeholder.
pub async fn snapshot_body(body: Body, max_bytes: usize) -> (Body, Option<String>) {
    let upper = body.size_hint().upper();
    match upper {
        Some(0) => (body, None),
        Some(len) if len <= max_bytes as u64 => match axum::body::to_bytes(body, max_bytes).await {
            Ok(bytes) => {
                let text = render_body(&bytes);
                (Body::from(bytes), text)
            }
            Err(err) => {
                let text = Some(format!("[body unavailable: {err}]"));
                (failing_body(err), text)
            }
        },
        Some(len) => (body, Some(format!("[body of {len} bytes not captured]"))),
        None => (body, Some("[streamed body not captured]".to_string())),
    }
}

/// Body that reports the same failure the original stream produced.
fn failing_body(err: axum::Error) -> Body {
    Body::from_stream(futures::stream::once(async move { Err::<Bytes, axum::Error>(err) }))
}
