//! Byte-at-a-time request reader.

use super::request::RequestError;
use std::io::{ErrorKind, Read};

/// Longest request or header line accepted, CRLF included.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Reads CRLF-terminated lines and fixed-length bodies one byte at a time.
///
/// No buffering past the current byte, so nothing beyond the request is ever
/// consumed from the stream.
pub struct RequestReader<R> {
    inner: R,
}

impl<R: Read> RequestReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_byte(&mut self) -> Result<u8, RequestError> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Err(RequestError::ConnectionClosed),
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(RequestError::Io(e)),
            }
        }
    }

    /// Read one line, without its CRLF.
    ///
    /// A bare LF is kept as data; only CR LF ends a line.
    pub fn read_line(&mut self) -> Result<Vec<u8>, RequestError> {
        let mut line = Vec::new();
        loop {
            let byte = self.read_byte()?;
            line.push(byte);
            if line.ends_with(b"\r\n") {
                line.truncate(line.len() - 2);
                return Ok(line);
            }
            if line.len() >= MAX_LINE_LEN {
                return Err(RequestError::LineTooLong);
            }
        }
    }

    /// Read exactly `len` bytes.
    pub fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, RequestError> {
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            data.push(self.read_byte()?);
        }
        Ok(data)
    }
}
