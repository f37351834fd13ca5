//! Request parameter extraction.
//!
//! Collects `key=value` pairs from the query string and, for form-encoded POST
//! requests, from the body into one [`ParameterMap`].
//!
//! Merge policy: query pairs are inserted first, body pairs after, and a later
//! pair overwrites an earlier one with the same key (last write wins).
//!
//! The body is consumed as a stream and decoded chunk by chunk; a pair that
//! straddles two chunks is held back until its terminating `&` (or the end of
//! the stream) arrives.

use std::collections::HashMap;
use std::fmt;
use std::pin::pin;

use axum::http::{Method, header, request::Parts};
use futures_util::{Stream, StreamExt};
use thiserror::Error;

pub type ParameterMap = HashMap<String, String>;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Upper bound for a single read from the body stream.
pub const DEFAULT_READ_CHUNK_BYTES: usize = 65_000;

/// Upper bound for the whole body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed percent-escape in parameter")]
    MalformedEscape,
    #[error("parameter is not valid UTF-8")]
    InvalidUtf8,
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Read(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub read_chunk_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// The parts of a request the extractor looks at, besides the body.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    // Raw (still percent-encoded) query string, without the leading `?`.
    pub query: Option<String>,
    pub content_type: Option<String>,
}

impl RequestMeta {
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            query: parts.uri.query().map(str::to_owned),
            content_type: parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        }
    }

    /// Only form-encoded POST bodies carry parameters.
    pub fn reads_body(&self) -> bool {
        self.method == Method::POST
            && self
                .content_type
                .as_deref()
                .is_some_and(is_form_urlencoded)
    }
}

/// Case-insensitive prefix match, so `...; charset=UTF-8` suffixes are accepted.
pub fn is_form_urlencoded(content_type: &str) -> bool {
    content_type
        .get(..FORM_URLENCODED.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(FORM_URLENCODED))
}

/// Extract all parameters of a request.
///
/// Either every source is merged into the returned map, or an error is
/// returned and nothing is exposed.
pub async fn extract<S, B, E>(
    meta: &RequestMeta,
    body: S,
    limits: ExtractLimits,
) -> Result<ParameterMap, ParseError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut params = ParameterMap::new();

    if let Some(query) = meta.query.as_deref() {
        parse_pairs(query.as_bytes(), &mut params)?;
    }

    if meta.reads_body() {
        let mut parser = FormBodyParser::new(limits.max_body_bytes);
        let mut body = pin!(body);
        let chunk_size = limits.read_chunk_bytes.max(1);

        // `None` from the stream is the end-of-stream marker.
        while let Some(frame) = body.next().await {
            let frame = frame.map_err(|e| ParseError::Read(e.to_string()))?;
            for chunk in frame.as_ref().chunks(chunk_size) {
                parser.feed(chunk, &mut params)?;
            }
        }

        parser.finish(&mut params)?;
    }

    Ok(params)
}

/// Parse `&`-separated pairs, inserting into `into` (last write wins).
pub fn parse_pairs(input: &[u8], into: &mut ParameterMap) -> Result<(), ParseError> {
    for segment in input.split(|b| *b == b'&') {
        if let Some((key, value)) = parse_pair(segment)? {
            into.insert(key, value);
        }
    }
    Ok(())
}

fn parse_pair(segment: &[u8]) -> Result<Option<(String, String)>, ParseError> {
    if segment.is_empty() {
        return Ok(None);
    }

    let (raw_key, raw_value) = match segment.iter().position(|b| *b == b'=') {
        Some(eq) => (&segment[..eq], &segment[eq + 1..]),
        None => (segment, &[][..]),
    };

    if raw_key.is_empty() {
        return Ok(None);
    }

    Ok(Some((decode_component(raw_key)?, decode_component(raw_value)?)))
}

fn decode_component(raw: &[u8]) -> Result<String, ParseError> {
    let mut plus_decoded = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'%' => {
                let escape = raw.get(i + 1..i + 3).ok_or(ParseError::MalformedEscape)?;
                if !escape.iter().all(u8::is_ascii_hexdigit) {
                    return Err(ParseError::MalformedEscape);
                }
                plus_decoded.extend_from_slice(&raw[i..i + 3]);
                i += 3;
            }
            b'+' => {
                plus_decoded.push(b' ');
                i += 1;
            }
            b => {
                plus_decoded.push(b);
                i += 1;
            }
        }
    }

    let bytes: Vec<u8> = percent_encoding::percent_decode(&plus_decoded).collect();
    String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)
}

/// Incremental decoder for a form-encoded body.
struct FormBodyParser {
    // Bytes after the last `&` seen so far.
    pending: Vec<u8>,
    total: usize,
    limit: usize,
}

impl FormBodyParser {
    fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            total: 0,
            limit,
        }
    }

    fn feed(&mut self, chunk: &[u8], into: &mut ParameterMap) -> Result<(), ParseError> {
        self.total += chunk.len();
        if self.total > self.limit {
            return Err(ParseError::BodyTooLarge { limit: self.limit });
        }

        self.pending.extend_from_slice(chunk);

        if let Some(last_amp) = self.pending.iter().rposition(|b| *b == b'&') {
            let rest = self.pending.split_off(last_amp + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            parse_pairs(&complete, into)?;
        }

        Ok(())
    }

    fn finish(self, into: &mut ParameterMap) -> Result<(), ParseError> {
        parse_pairs(&self.pending, into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use futures_util::stream;

    fn meta(method: Method, query: Option<&str>, content_type: Option<&str>) -> RequestMeta {
        RequestMeta {
            method,
            query: query.map(str::to_owned),
            content_type: content_type.map(str::to_owned),
        }
    }

    fn no_body() -> impl Stream<Item = Result<&'static [u8], Infallible>> {
        stream::empty::<Result<&'static [u8], Infallible>>()
    }

    fn body(chunks: Vec<&'static str>) -> impl Stream<Item = Result<&'static [u8], Infallible>> {
        stream::iter(chunks.into_iter().map(|c| Ok::<_, Infallible>(c.as_bytes())))
    }

    fn map(pairs: &[(&str, &str)]) -> ParameterMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn query_string_only() {
        let m = meta(Method::GET, Some("user=admin&pass=12345"), None);
        let params = extract(&m, no_body(), ExtractLimits::default())
            .await
            .unwrap();
        assert_eq!(params, map(&[("user", "admin"), ("pass", "12345")]));
    }

    #[tokio::test]
    async fn nothing_at_all_is_an_empty_map() {
        let m = meta(Method::GET, None, None);
        let params = extract(&m, no_body(), ExtractLimits::default())
            .await
            .unwrap();
        assert!(params.is_empty());

        let m = meta(Method::GET, Some(""), None);
        let params = extract(&m, no_body(), ExtractLimits::default())
            .await
            .unwrap();
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn percent_and_plus_are_decoded() {
        let m = meta(Method::GET, Some("user=J%C3%BCrgen+M&pass=a%2Bb%26c"), None);
        let params = extract(&m, no_body(), ExtractLimits::default())
            .await
            .unwrap();
        assert_eq!(params["user"], "Jürgen M");
        assert_eq!(params["pass"], "a+b&c");
    }

    #[tokio::test]
    async fn key_without_value_is_empty_string() {
        let m = meta(Method::GET, Some("user&pass=&&=orphan"), None);
        let params = extract(&m, no_body(), ExtractLimits::default())
            .await
            .unwrap();
        assert_eq!(params, map(&[("user", ""), ("pass", "")]));
    }

    #[tokio::test]
    async fn truncated_escape_is_rejected() {
        for query in ["user=admin%2", "user=%", "user=%zz"] {
            let m = meta(Method::GET, Some(query), None);
            let err = extract(&m, no_body(), ExtractLimits::default())
                .await
                .unwrap_err();
            assert_eq!(err, ParseError::MalformedEscape, "{query}");
        }
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let m = meta(Method::GET, Some("user=%ff%fe"), None);
        let err = extract(&m, no_body(), ExtractLimits::default())
            .await
            .unwrap_err();
        assert_eq!(err, ParseError::InvalidUtf8);
    }

    #[tokio::test]
    async fn form_body_is_read_for_post() {
        let m = meta(
            Method::POST,
            None,
            Some("Application/X-WWW-Form-Urlencoded; charset=UTF-8"),
        );
        let params = extract(&m, body(vec!["user=admin&pass=12345"]), ExtractLimits::default())
            .await
            .unwrap();
        assert_eq!(params, map(&[("user", "admin"), ("pass", "12345")]));
    }

    #[tokio::test]
    async fn body_overrides_query_for_same_key() {
        let m = meta(Method::POST, Some("user=query&x=1"), Some(FORM_URLENCODED));
        let params = extract(&m, body(vec!["user=body"]), ExtractLimits::default())
            .await
            .unwrap();
        assert_eq!(params, map(&[("user", "body"), ("x", "1")]));
    }

    #[tokio::test]
    async fn repeated_key_keeps_last_value() {
        let m = meta(Method::GET, Some("user=a&user=b"), None);
        let params = extract(&m, no_body(), ExtractLimits::default())
            .await
            .unwrap();
        assert_eq!(params["user"], "b");
    }

    #[tokio::test]
    async fn pairs_split_across_frames_are_reassembled() {
        let m = meta(Method::POST, None, Some(FORM_URLENCODED));
        let frames = vec!["us", "er=adm", "in&pa", "ss=12%", "33", "45", ""];
        let params = extract(&m, body(frames), ExtractLimits::default())
            .await
            .unwrap();
        assert_eq!(params, map(&[("user", "admin"), ("pass", "12345")]));
    }

    #[tokio::test]
    async fn large_frame_is_processed_in_bounded_chunks() {
        let limits = ExtractLimits {
            read_chunk_bytes: 3,
            max_body_bytes: 1024,
        };
        let m = meta(Method::POST, None, Some(FORM_URLENCODED));
        let params = extract(&m, body(vec!["user=admin&pass=12345"]), limits)
            .await
            .unwrap();
        assert_eq!(params, map(&[("user", "admin"), ("pass", "12345")]));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let limits = ExtractLimits {
            read_chunk_bytes: 4,
            max_body_bytes: 10,
        };
        let m = meta(Method::POST, Some("keep=1"), Some(FORM_URLENCODED));
        let err = extract(&m, body(vec!["user=admin&", "pass=12345"]), limits)
            .await
            .unwrap_err();
        assert_eq!(err, ParseError::BodyTooLarge { limit: 10 });
    }

    #[tokio::test]
    async fn body_read_failure_is_a_parse_error() {
        let m = meta(Method::POST, None, Some(FORM_URLENCODED));
        let frames = stream::iter(vec![Ok(&b"user=admin"[..]), Err("connection reset")]);
        let err = extract(&m, frames, ExtractLimits::default())
            .await
            .unwrap_err();
        assert_eq!(err, ParseError::Read("connection reset".to_string()));
    }

    #[tokio::test]
    async fn body_is_ignored_for_other_content_types_and_methods() {
        let m = meta(Method::POST, Some("a=1"), Some("application/json"));
        let params = extract(&m, body(vec!["user=admin"]), ExtractLimits::default())
            .await
            .unwrap();
        assert_eq!(params, map(&[("a", "1")]));

        let m = meta(Method::PUT, None, Some(FORM_URLENCODED));
        let params = extract(&m, body(vec!["user=admin"]), ExtractLimits::default())
            .await
            .unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn content_type_prefix_match() {
        assert!(is_form_urlencoded("application/x-www-form-urlencoded"));
        assert!(is_form_urlencoded("Application/X-www-form-urlencoded"));
        assert!(!is_form_urlencoded("application/x-www-form"));
        assert!(!is_form_urlencoded("multipart/form-data"));
    }
}
