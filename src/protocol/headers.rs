//! Header-block accumulation, parsing and serialization.
//!
//! The engine reads header sections one line at a time, so [`HeaderBlock`]
//! collects raw lines until the blank line that ends the block and only then
//! hands the whole section to `httparse`. Lookup and storage use
//! [`http::HeaderMap`], which compares names case-insensitively.

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use httparse::Status;
use tracing::trace;

use crate::ensure;

use super::ParseError;

/// Maximum number of headers allowed in one block.
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for one header block.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Accumulates raw header lines until the blank line that ends the block.
#[derive(Debug, Default)]
pub struct HeaderBlock {
    raw: BytesMut,
    complete: bool,
}

impl HeaderBlock {
    pub fn new() -> Self {
        Default::default()
    }

    /// Absorbs one raw header line (line terminator already stripped). An
    /// empty line marks the block as complete.
    pub fn absorb(&mut self, line: &[u8]) {
        if line.is_empty() {
            self.complete = true;
        } else {
            self.raw.extend_from_slice(line);
            self.raw.extend_from_slice(b"\r\n");
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Parses the accumulated block into a header map.
    pub fn parse(&self) -> Result<HeaderMap, ParseError> {
        ensure!(self.raw.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(self.raw.len(), MAX_HEADER_BYTES));

        // httparse wants to see the terminating blank line
        let mut block = Vec::with_capacity(self.raw.len() + 2);
        block.extend_from_slice(&self.raw);
        block.extend_from_slice(b"\r\n");

        let mut parsed = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let headers = match httparse::parse_headers(&block, &mut parsed) {
            Ok(Status::Complete((_, headers))) => headers,
            Ok(Status::Partial) => return Err(ParseError::invalid_header("truncated header block")),
            Err(httparse::Error::TooManyHeaders) => return Err(ParseError::too_many_headers(MAX_HEADER_NUM)),
            Err(e) => return Err(ParseError::invalid_header(e.to_string())),
        };

        trace!(header_count = headers.len(), "parsed header block");

        let mut map = HeaderMap::with_capacity(headers.len());
        for header in headers {
            let name =
                HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| ParseError::invalid_header(e.to_string()))?;
            let value = HeaderValue::from_bytes(header.value).map_err(|e| ParseError::invalid_header(e.to_string()))?;
            map.append(name, value);
        }

        Ok(map)
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.complete = false;
    }
}

/// Appends `value` to the header `name`, comma-joining with any value that is
/// already present. This is the `Vary` accumulation rule.
pub fn append_joined(map: &mut HeaderMap, name: HeaderName, value: &str) {
    let joined = match map.get(&name).and_then(|existing| existing.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{existing},{value}"),
        _ => value.to_owned(),
    };

    if let Ok(joined) = HeaderValue::from_str(&joined) {
        map.insert(name, joined);
    }
}

/// Serializes a header map as `name: value\r\n` lines, in insertion order.
pub fn write_header_block(map: &HeaderMap, dst: &mut BytesMut) {
    for (name, value) in map {
        dst.put_slice(name.as_str().as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
}
