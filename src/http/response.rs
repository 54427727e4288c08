//! Response building and serialization.

use serde::Serialize;
use std::io::{self, Write};

/// Status codes the portal emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
    LengthRequired,
    PayloadTooLarge,
    InternalServerError,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::LengthRequired => 411,
            Self::PayloadTooLarge => 413,
            Self::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::LengthRequired => "Length Required",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

/// An HTTP response with ordered headers.
///
/// `Content-Length` and `Connection: close` are added on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpResponse {
    /// 200 with a plain-text body.
    pub fn from_string(body: impl Into<String>) -> Self {
        Self::from_data(body.into().into_bytes())
            .with_header("Content-Type", "text/plain; charset=utf-8")
    }

    /// 200 with a raw body and no content type.
    pub fn from_data(body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::Ok,
            headers: Vec::new(),
            body,
        }
    }

    /// Empty body.
    pub fn empty(status: StatusCode) -> Self {
        Self::from_data(Vec::new()).with_status(status)
    }

    /// HTML document.
    pub fn html(status: StatusCode, body: String) -> Self {
        Self::from_data(body.into_bytes())
            .with_status(status)
            .with_header("Content-Type", "text/html; charset=utf-8")
    }

    /// 200 with a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::from_data(body).with_header("Content-Type", "application/json"))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any with the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize as HTTP/1.1.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Connection: close\r\n\r\n");

        out.write_all(head.as_bytes())?;
        out.write_all(&self.body)?;
        out.flush()
    }
}
