use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid request line: {line:?}")]
    InvalidRequestLine { line: String },

    #[error("invalid status line: {line:?}")]
    InvalidStatusLine { line: String },

    #[error("invalid http version: {token:?}")]
    InvalidVersion { token: String },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },
}

impl ParseError {
    pub fn invalid_request_line<S: ToString>(line: S) -> Self {
        Self::InvalidRequestLine { line: line.to_string() }
    }

    pub fn invalid_status_line<S: ToString>(line: S) -> Self {
        Self::InvalidStatusLine { line: line.to_string() }
    }

    pub fn invalid_version<S: ToString>(token: S) -> Self {
        Self::InvalidVersion { token: token.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }
}
