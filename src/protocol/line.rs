//! Request-line and status-line grammar types.
//!
//! These are the parsed forms of the first line of an HTTP/1.x message. Both
//! carry the advertised protocol version so the flow controller can reject
//! framing it does not speak, and both assemble their outbound form stamped
//! `HTTP/1.1` regardless of what the peer advertised.

use std::fmt::{self, Display};

use http::{Method, StatusCode};

use super::ParseError;

/// HTTP protocol version as advertised on a request or status line.
///
/// [`http::Version`] only models the versions the ecosystem speaks; the
/// engine must order arbitrary `HTTP/<major>.<minor>` tokens so that
/// anything with a major version of 2 or above can be rejected, so it keeps
/// the raw numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_11: HttpVersion = HttpVersion { major: 1, minor: 1 };

    /// Versions from 2.0 upward use a different framing model entirely.
    pub fn unsupported(self) -> bool {
        self.major >= 2
    }

    pub fn parse(token: &str) -> Result<Self, ParseError> {
        let Some(rest) = token.strip_prefix("HTTP/") else {
            return Err(ParseError::invalid_version(token));
        };
        let Some((major, minor)) = rest.split_once('.') else {
            return Err(ParseError::invalid_version(token));
        };
        let major = major.parse::<u8>().map_err(|_| ParseError::invalid_version(token))?;
        let minor = minor.parse::<u8>().map_err(|_| ParseError::invalid_version(token))?;
        Ok(Self { major, minor })
    }
}

impl Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// Parsed form of an inbound request line, e.g. `GET /index HTTP/1.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: HttpVersion,
}

impl RequestLine {
    /// Parses a request line with the line terminator already stripped.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut parts = line.split(' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(target), Some(version), None) if !method.is_empty() && !target.is_empty() => {
                (method, target, version)
            }
            _ => return Err(ParseError::invalid_request_line(line)),
        };

        let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::invalid_request_line(line))?;
        let version = HttpVersion::parse(version)?;

        Ok(Self { method, target: target.to_owned(), version })
    }

    /// Serialized form for an outbound request, always stamped `HTTP/1.1`.
    pub fn assemble(method: &Method, target: &str) -> String {
        format!("{method} {target} HTTP/1.1\r\n")
    }
}

/// Parsed form of an inbound status line, e.g. `HTTP/1.1 200 OK`.
///
/// The reason phrase is advisory and not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub version: HttpVersion,
    pub code: StatusCode,
}

impl StatusLine {
    /// Parses a status line with the line terminator already stripped.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let Some((version, rest)) = line.split_once(' ') else {
            return Err(ParseError::invalid_status_line(line));
        };
        let version = HttpVersion::parse(version)?;

        let code = rest.split(' ').next().unwrap_or("");
        let code = code.parse::<u16>().map_err(|_| ParseError::invalid_status_line(line))?;
        let code = StatusCode::from_u16(code).map_err(|_| ParseError::invalid_status_line(line))?;

        Ok(Self { version, code })
    }

    /// Serialized form for an outbound reply, always stamped `HTTP/1.1`.
    pub fn assemble(code: StatusCode) -> String {
        format!("HTTP/1.1 {} {}\r\n", code.as_str(), code.canonical_reason().unwrap_or("Unknown"))
    }
}
