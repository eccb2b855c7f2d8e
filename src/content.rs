//! Content responses for file-like payloads
//!
//! [`serve_content`] sets the content type from the file name, answers
//! conditional requests from the supplied validators and honours a single
//! `Range: bytes=` request.

use crate::error::{json_error_response, UiErrorCode};
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, LAST_MODIFIED, RANGE,
};
use hyper::{Method, Request, Response, StatusCode};
use sha2::{Digest, Sha256};

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Validators attached to a response
#[derive(Debug, Clone, Default)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Answer `If-None-Match` / `If-Modified-Since` with 304
    pub conditional: bool,
}

impl Validators {
    /// Strong ETag from the content, conditional requests enabled
    pub fn for_content(body: &[u8]) -> Self {
        Self {
            etag: Some(content_etag(body)),
            last_modified: None,
            conditional: true,
        }
    }

    /// Stamped with the current time and never answered with 304
    pub fn fresh() -> Self {
        Self {
            etag: None,
            last_modified: Some(Utc::now()),
            conditional: false,
        }
    }
}

/// Quoted hex prefix of the SHA-256 of `body`
pub fn content_etag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("\"{}\"", hex::encode(&digest[..16]))
}

pub fn format_http_date(time: &DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// Content type for a file name, with a UTF-8 charset for text types
pub fn content_type_for(name: &str) -> String {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT && mime.get_param("charset").is_none() {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.to_string()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    /// Inclusive bounds
    Satisfiable(u64, u64),
    Unsatisfiable,
}

/// Parse a single `bytes=` range against a body of `len` bytes
///
/// Returns `None` when the header should be ignored: malformed, not in
/// bytes, or asking for more than one range.
fn parse_range(header: &str, len: u64) -> Option<ByteRange> {
    let ranges = header.trim().strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }
    let (start, end) = ranges.trim().split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let suffix: u64 = end.parse().ok()?;
        if suffix == 0 || len == 0 {
            return Some(ByteRange::Unsatisfiable);
        }
        return Some(ByteRange::Satisfiable(len.saturating_sub(suffix), len - 1));
    }

    let start: u64 = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().ok()?)
    };
    if let Some(end) = end {
        if end < start {
            return None;
        }
    }
    if start >= len {
        return Some(ByteRange::Unsatisfiable);
    }
    let end = end.map(|e| e.min(len - 1)).unwrap_or(len - 1);
    Some(ByteRange::Satisfiable(start, end))
}

fn etag_matches(header: &str, etag: &str) -> bool {
    header
        .split(',')
        .map(|t| t.trim())
        .any(|t| t == "*" || t.trim_start_matches("W/") == etag)
}

fn not_modified<B>(req: &Request<B>, validators: &Validators) -> bool {
    if !validators.conditional {
        return false;
    }
    if let (Some(header), Some(etag)) = (req.headers().get(IF_NONE_MATCH), &validators.etag) {
        return header.to_str().map(|h| etag_matches(h, etag)).unwrap_or(false);
    }
    if let (Some(header), Some(modified)) = (req.headers().get(IF_MODIFIED_SINCE), &validators.last_modified) {
        return header
            .to_str()
            .ok()
            .and_then(|h| DateTime::parse_from_rfc2822(h).ok())
            .map(|since| modified.timestamp() <= since.timestamp())
            .unwrap_or(false);
    }
    false
}

/// Build the response for `body`, served under the file name `name`
pub fn serve_content<B>(
    req: &Request<B>,
    name: &str,
    body: Bytes,
    validators: &Validators,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder();
    if let Some(etag) = &validators.etag {
        builder = builder.header(ETAG, etag.as_str());
    }
    if let Some(modified) = &validators.last_modified {
        builder = builder.header(LAST_MODIFIED, format_http_date(modified));
    }

    if not_modified(req, validators) {
        return builder
            .status(StatusCode::NOT_MODIFIED)
            .body(Full::new(Bytes::new()))
            .expect("valid not-modified response");
    }

    let len = body.len() as u64;
    let range = req
        .headers()
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| parse_range(h, len));

    let (status, payload) = match range {
        Some(ByteRange::Unsatisfiable) => {
            let mut response =
                json_error_response(UiErrorCode::RangeNotSatisfiable, "Requested range not satisfiable");
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", len)) {
                response.headers_mut().insert(CONTENT_RANGE, value);
            }
            return response;
        }
        Some(ByteRange::Satisfiable(start, end)) => {
            builder = builder.header(CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, len));
            (
                StatusCode::PARTIAL_CONTENT,
                body.slice(start as usize..=end as usize),
            )
        }
        None => (StatusCode::OK, body),
    };

    let builder = builder
        .status(status)
        .header(CONTENT_TYPE, content_type_for(name))
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_LENGTH, payload.len());

    let payload = if req.method() == Method::HEAD {
        Bytes::new()
    } else {
        payload
    };

    builder
        .body(Full::new(payload))
        .expect("valid content response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn get(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/file");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("bytes=0-4", 10), Some(ByteRange::Satisfiable(0, 4)));
        assert_eq!(parse_range("bytes=5-", 10), Some(ByteRange::Satisfiable(5, 9)));
        assert_eq!(parse_range("bytes=-3", 10), Some(ByteRange::Satisfiable(7, 9)));
        assert_eq!(parse_range("bytes=-30", 10), Some(ByteRange::Satisfiable(0, 9)));
        assert_eq!(parse_range("bytes=2-100", 10), Some(ByteRange::Satisfiable(2, 9)));
        assert_eq!(parse_range("bytes=10-", 10), Some(ByteRange::Unsatisfiable));
        assert_eq!(parse_range("bytes=5-2", 10), None);
        assert_eq!(parse_range("bytes=0-1,4-5", 10), None);
        assert_eq!(parse_range("items=0-1", 10), None);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("/index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("/css/app.css"), "text/css; charset=utf-8");
        assert_eq!(content_type_for("/img/logo.png"), "image/png");
        assert_eq!(content_type_for("/blob"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_serve_full_content() {
        let body = Bytes::from("hello world");
        let validators = Validators::for_content(&body);
        let response = serve_content(&get(&[]), "/a.txt", body.clone(), &validators);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(ACCEPT_RANGES).unwrap(), "bytes");
        assert_eq!(
            response.headers().get(ETAG).unwrap().to_str().unwrap(),
            content_etag(&body)
        );
        assert_eq!(body_of(response).await, body);
    }

    #[tokio::test]
    async fn test_serve_range() {
        let body = Bytes::from("hello world");
        let response = serve_content(
            &get(&[("range", "bytes=6-")]),
            "/a.txt",
            body.clone(),
            &Validators::for_content(&body),
        );

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers().get(CONTENT_RANGE).unwrap(), "bytes 6-10/11");
        assert_eq!(body_of(response).await, Bytes::from("world"));
    }

    #[test]
    fn test_unsatisfiable_range() {
        let body = Bytes::from("abc");
        let response = serve_content(
            &get(&[("range", "bytes=9-")]),
            "/a.txt",
            body.clone(),
            &Validators::for_content(&body),
        );
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers().get(CONTENT_RANGE).unwrap(), "bytes */3");
    }

    #[test]
    fn test_if_none_match() {
        let body = Bytes::from("cached");
        let etag = content_etag(&body);
        let response = serve_content(
            &get(&[("if-none-match", etag.as_str())]),
            "/a.js",
            body.clone(),
            &Validators::for_content(&body),
        );
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let response = serve_content(
            &get(&[("if-none-match", "\"other\"")]),
            "/a.js",
            body.clone(),
            &Validators::for_content(&body),
        );
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_fresh_content_ignores_conditionals() {
        let far_future = "Fri, 01 Jan 2100 00:00:00 GMT";
        let response = serve_content(
            &get(&[("if-modified-since", far_future), ("if-none-match", "*")]),
            "/index.html",
            Bytes::from("<p></p>"),
            &Validators::fresh(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(LAST_MODIFIED).is_some());
        assert!(response.headers().get(ETAG).is_none());
    }

    #[test]
    fn test_if_modified_since() {
        let modified = DateTime::parse_from_rfc2822("Mon, 01 Jan 2024 00:00:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let validators = Validators {
            etag: None,
            last_modified: Some(modified),
            conditional: true,
        };
        let response = serve_content(
            &get(&[("if-modified-since", "Tue, 02 Jan 2024 00:00:00 GMT")]),
            "/a.css",
            Bytes::from("x"),
            &validators,
        );
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let request = Request::builder()
            .method(Method::HEAD)
            .uri("/a.txt")
            .body(())
            .unwrap();
        let body = Bytes::from("twelve bytes");
        let response = serve_content(&request, "/a.txt", body.clone(), &Validators::for_content(&body));
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "12");
        assert!(body_of(response).await.is_empty());
    }
}
