use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Per-request trace id, stored in request extensions for handlers.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// 16 hex characters from 8 random bytes.
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().fold(String::with_capacity(16), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

const MAX_BODY_LOG_BYTES: usize = 200;
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

fn body_snippet(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() > MAX_BODY_LOG_BYTES => {
            let mut end = MAX_BODY_LOG_BYTES;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &s[..end])
        }
        Ok(s) => s.to_string(),
        Err(_) => "<non-utf8 body>".to_string(),
    }
}

fn format_elapsed(elapsed_us: u128) -> String {
    match elapsed_us {
        0..=999 => format!("{elapsed_us}µs"),
        1_000..=999_999 => format!("{}ms", elapsed_us / 1000),
        _ => format!("{:.1}s", elapsed_us as f64 / 1_000_000.0),
    }
}

/// Command writes carry the operator credential in their headers and are
/// logged without bodies.
fn is_sensitive(method: &Method, path: &str) -> bool {
    *method == Method::POST && path.starts_with("/command/")
}

fn log_response(trace_id: &str, status: StatusCode, elapsed: &str, body: &str) {
    let status = status.as_u16();
    match status {
        500..=u16::MAX => tracing::error!(trace_id = %trace_id, status, elapsed = %elapsed, body = %body, "<-- response"),
        400..=499 => tracing::warn!(trace_id = %trace_id, status, elapsed = %elapsed, body = %body, "<-- response"),
        _ => tracing::info!(trace_id = %trace_id, status, elapsed = %elapsed, "<-- response"),
    }
}

/// Request/response logging middleware. Every response gets an
/// `X-Trace-Id` header matching the `trace_id` field of the log lines and of
/// error bodies.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let sensitive = is_sensitive(&method, req.uri().path());

    let req = if !sensitive && method == Method::POST {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(trace_id = %trace_id, error = %e, "Request body too large or unreadable");
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
                attach_trace_id(&mut response, &trace_id);
                return response;
            }
        };
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %url,
            body = %body_snippet(&bytes),
            ua = %user_agent,
            "--> request"
        );
        Request::from_parts(parts, Body::from(bytes))
    } else {
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %url,
            ua = %user_agent,
            "--> request"
        );
        req
    };

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();

    let mut response = if status.is_client_error() || status.is_server_error() {
        // Error bodies are small JSON envelopes; buffer them for the log line
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .unwrap_or_default();
        let snippet = if sensitive { String::new() } else { body_snippet(&bytes) };
        log_response(&trace_id, status, &elapsed, &snippet);
        Response::from_parts(parts, Body::from(bytes))
    } else {
        log_response(&trace_id, status, &elapsed, "");
        response
    };

    attach_trace_id(&mut response, &trace_id);
    response
}

fn attach_trace_id(response: &mut Response, trace_id: &str) {
    if let Ok(val) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_16_hex_chars() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_trace_id());
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let text = "é".repeat(150);
        let snippet = body_snippet(text.as_bytes());
        assert!(snippet.ends_with("..."));
        assert!(snippet.len() <= MAX_BODY_LOG_BYTES + 3);
        assert_eq!(body_snippet(b"short"), "short");
    }

    #[test]
    fn command_writes_are_sensitive() {
        assert!(is_sensitive(&Method::POST, "/command/pc-001"));
        assert!(!is_sensitive(&Method::GET, "/command/pc-001"));
        assert!(!is_sensitive(&Method::POST, "/collect"));
    }
}
