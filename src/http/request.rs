//! Request parsing and URL-encoded form decoding.

use super::reader::RequestReader;
use super::response::StatusCode;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};

/// Largest request body accepted.
pub const MAX_BODY_LEN: usize = 4096;

/// Most header lines accepted in one request.
pub const MAX_HEADERS: usize = 32;

/// A parsed HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Target path without the query string.
    pub path: String,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    /// Header map with lower-cased keys.
    pub headers: HashMap<String, String>,
    /// Declared `Content-Length`, if the request carried one.
    pub content_length: Option<usize>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Decode the body as `application/x-www-form-urlencoded`.
    pub fn form(&self) -> HashMap<String, String> {
        parse_form(&String::from_utf8_lossy(&self.body))
    }
}

/// Read and parse one request from `stream`.
///
/// Reads exactly the request line, the headers, and `Content-Length` bytes
/// of body; nothing more. A request without `Content-Length` has an empty
/// body; whether that is acceptable is up to the route.
pub fn read_request<R: Read>(stream: R) -> Result<HttpRequest, RequestError> {
    let mut reader = RequestReader::new(stream);

    let line = reader.read_line()?;
    let line = String::from_utf8_lossy(&line);
    let mut parts = line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_string(), target),
        _ => return Err(RequestError::Malformed("request line")),
    };

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_form(query)),
        None => (target.to_string(), HashMap::new()),
    };

    let mut headers = HashMap::new();
    let mut lines = 0;
    loop {
        let line = reader.read_line()?;
        if line.is_empty() {
            break;
        }
        lines += 1;
        if lines > MAX_HEADERS {
            return Err(RequestError::TooManyHeaders);
        }
        let line = String::from_utf8_lossy(&line);
        // Lines without a colon carry no header
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(raw) => {
            let len: usize = raw
                .parse()
                .map_err(|_| RequestError::InvalidContentLength(raw.clone()))?;
            if len > MAX_BODY_LEN {
                return Err(RequestError::PayloadTooLarge(len));
            }
            Some(len)
        }
        None => None,
    };

    let body = match content_length {
        Some(len) => reader.read_exact(len)?,
        None => Vec::new(),
    };

    Ok(HttpRequest {
        method,
        path,
        query,
        headers,
        content_length,
        body,
    })
}

/// Decode `%XX` escapes and `+` as space.
///
/// A `%` not followed by two hex digits is kept literally. Decoded bytes
/// that are not valid UTF-8 become U+FFFD.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => match (
                bytes.get(i + 1).copied().and_then(hex_value),
                bytes.get(i + 2).copied().and_then(hex_value),
            ) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Parse `k=v&k2=v2`. Pairs without `=` are skipped; later keys win.
pub fn parse_form(input: &str) -> HashMap<String, String> {
    input
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (percent_decode(key), percent_decode(value)))
        .collect()
}

/// Request parsing errors.
#[derive(Debug)]
pub enum RequestError {
    /// Peer closed before the request was complete.
    ConnectionClosed,
    Io(io::Error),
    /// Request line or header line over the length cap.
    LineTooLong,
    Malformed(&'static str),
    /// More than [`MAX_HEADERS`] header lines.
    TooManyHeaders,
    InvalidContentLength(String),
    PayloadTooLarge(usize),
}

impl RequestError {
    /// Status to answer with, or `None` to close without a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ConnectionClosed | Self::Io(_) | Self::Malformed(_) => None,
            Self::LineTooLong | Self::TooManyHeaders | Self::InvalidContentLength(_) => {
                Some(StatusCode::BadRequest)
            }
            Self::PayloadTooLarge(_) => Some(StatusCode::PayloadTooLarge),
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "connection closed mid-request"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::LineTooLong => write!(f, "line exceeds {} bytes", super::reader::MAX_LINE_LEN),
            Self::Malformed(what) => write!(f, "malformed {}", what),
            Self::TooManyHeaders => write!(f, "more than {} header lines", MAX_HEADERS),
            Self::InvalidContentLength(raw) => write!(f, "invalid Content-Length {:?}", raw),
            Self::PayloadTooLarge(len) => {
                write!(f, "body of {} bytes exceeds {}", len, MAX_BODY_LEN)
            }
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RequestError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
