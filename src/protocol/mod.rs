//! HTTP/1.x grammar types used by the engine.
//!
//! This module holds the parsed forms of the wire-level units the flow
//! controller classifies: request lines, status lines and header blocks.
//! The session stores these as opaque typed values; everything else about
//! them (validity, version, stringification) is decided here.
//!
//! # Components
//!
//! - [`RequestLine`] / [`StatusLine`]: first-line parsers carrying an
//!   [`HttpVersion`]
//! - [`HeaderBlock`]: line-at-a-time header accumulation backed by
//!   `httparse`, producing an [`http::HeaderMap`]
//! - [`append_joined`] / [`write_header_block`]: `Vary`-style appends and
//!   deterministic outbound serialization
//! - [`ParseError`]: everything that can be wrong with inbound framing

mod line;
pub use line::HttpVersion;
pub use line::RequestLine;
pub use line::StatusLine;

mod headers;
pub use headers::HeaderBlock;
pub use headers::append_joined;
pub use headers::write_header_block;
pub use headers::{MAX_HEADER_BYTES, MAX_HEADER_NUM};

mod error;
pub use error::ParseError;
