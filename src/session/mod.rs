//! Transport-independent HTTP session state.
//!
//! A [`Session`] records everything about one logical connection that does
//! not depend on the transport: the current framing phase, the parsed
//! request or status line, the inbound, outbound and negotiated header maps,
//! the body accumulator and the queue of fully-serialized outbound messages.
//! It owns no I/O handles; the [`crate::flow`] controller feeds raw bytes
//! into its input buffer and drains its outbound queue.
//!
//! Sessions are built for reuse: [`Session::recycle`] returns one to a
//! connection-free state so a [`crate::pool::SessionPool`] can lease it out
//! again without state leaking between connections.

mod config;
pub use config::IDENTIFIER;
pub use config::Negotiate;
pub use config::SessionConfig;

use std::cmp;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, VARY};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{debug, warn};

use crate::protocol::{HeaderBlock, RequestLine, StatusLine, append_joined, write_header_block};

/// Which kind of first line a session reads: servers read request lines,
/// clients read status lines. This is the only place the two roles differ in
/// the framing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Request,
    Status,
}

/// The protocol-framing phase of a session.
///
/// Transitions are total and deterministic given the current phase, the
/// parse outcome and the role; the flow controller is the only component
/// that advances them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Awaiting the first line of the next message.
    Line(Framing),
    /// Absorbing header lines until the blank line ends the block.
    Headers,
    /// Accumulating a length-delimited body.
    Body,
    /// A complete message is buffered and being answered.
    Processing,
    /// Malformed input or a transport failure; terminal for the connection.
    Error,
    /// The connection is torn down; the session can be recycled.
    Shutdown,
}

/// The role a session plays for the lifetime of one lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn framing(self) -> Framing {
        match self {
            Role::Server => Framing::Request,
            Role::Client => Framing::Status,
        }
    }
}

/// Transport-independent record of one connection's protocol state.
#[derive(Debug)]
pub struct Session {
    pub(crate) phase: Phase,

    /// Parsed request line of the last inbound request, if any.
    pub(crate) inbound_request: Option<RequestLine>,
    /// Parsed status line of the last inbound response, if any.
    pub(crate) inbound_status: Option<StatusLine>,

    /// Headers the peer sent with the current message.
    pub(crate) inbound: HeaderMap,
    /// Headers that will automatically be sent with the next reply. Holds
    /// negotiated values under their outbound names, e.g. `Content-Type`
    /// for what the peer asked via `Accept`.
    pub(crate) outbound: HeaderMap,
    /// Negotiated values under their inbound names, e.g. `Accept`.
    pub(crate) negotiated: HeaderMap,

    /// In-progress header block of the current message.
    pub(crate) header_block: HeaderBlock,

    /// Body of the current message, accumulated to completion.
    pub(crate) body: BytesMut,
    /// Value of the length header of the current message.
    expected_body_length: usize,

    /// Fully-serialized messages awaiting their turn on the wire. Strict
    /// FIFO; only the enqueue operations and the flow's drain loop touch it.
    outbound_queue: VecDeque<Bytes>,

    /// Tear the connection down once the queue is drained.
    pub(crate) close_after_send: bool,
    /// At most one write is in flight per session at any time.
    pub(crate) write_in_flight: bool,
    /// A free session can be leased for a new connection.
    free: bool,
    /// The message being answered is a HEAD request: replies carry a correct
    /// `Content-Length` but no body.
    pub(crate) is_head: bool,

    requests_sent: u64,
    replies_sent: u64,
    transport_errors: u64,

    /// Raw bytes read off the transport and not yet consumed. Filled by the
    /// flow controller, drained by [`Session::extract_available`].
    pub(crate) input: BytesMut,

    config: Arc<SessionConfig>,
}

impl Session {
    pub fn new(role: Role, config: Arc<SessionConfig>) -> Self {
        Self {
            phase: Phase::Line(role.framing()),
            inbound_request: None,
            inbound_status: None,
            inbound: HeaderMap::new(),
            outbound: HeaderMap::new(),
            negotiated: HeaderMap::new(),
            header_block: HeaderBlock::new(),
            body: BytesMut::new(),
            expected_body_length: 0,
            outbound_queue: VecDeque::new(),
            close_after_send: false,
            write_in_flight: false,
            free: false,
            is_head: false,
            requests_sent: 0,
            replies_sent: 0,
            transport_errors: 0,
            input: BytesMut::new(),
            config,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_free(&self) -> bool {
        self.free
    }

    pub fn is_head(&self) -> bool {
        self.is_head
    }

    pub fn close_after_send(&self) -> bool {
        self.close_after_send
    }

    pub fn write_in_flight(&self) -> bool {
        self.write_in_flight
    }

    pub fn inbound_request(&self) -> Option<&RequestLine> {
        self.inbound_request.as_ref()
    }

    pub fn inbound_status(&self) -> Option<&StatusLine> {
        self.inbound_status.as_ref()
    }

    pub fn inbound(&self) -> &HeaderMap {
        &self.inbound
    }

    pub fn outbound(&self) -> &HeaderMap {
        &self.outbound
    }

    /// Outbound headers can be set directly to have them sent with every
    /// following reply, e.g. a `Server` agent string.
    pub fn outbound_mut(&mut self) -> &mut HeaderMap {
        &mut self.outbound
    }

    pub fn negotiated(&self) -> &HeaderMap {
        &self.negotiated
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn expected_body_length(&self) -> usize {
        self.expected_body_length
    }

    pub fn queued_messages(&self) -> usize {
        self.outbound_queue.len()
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn replies_sent(&self) -> u64 {
        self.replies_sent
    }

    /// Total number of messages this session has queued for sending.
    pub fn messages_sent(&self) -> u64 {
        self.requests_sent + self.replies_sent
    }

    pub fn transport_errors(&self) -> u64 {
        self.transport_errors
    }

    pub(crate) fn note_transport_error(&mut self) {
        self.transport_errors += 1;
    }

    pub(crate) fn pop_outbound(&mut self) -> Option<Bytes> {
        self.outbound_queue.pop_front()
    }

    /// Appends raw transport bytes to the input buffer.
    pub fn feed_input(&mut self, bytes: &[u8]) {
        self.input.extend_from_slice(bytes);
    }

    pub(crate) fn input_has_line(&self) -> bool {
        self.input.contains(&b'\n')
    }

    pub(crate) fn input_len(&self) -> usize {
        self.input.len()
    }

    /// How many bytes of the current body are still owed. Saturates at
    /// zero; an accumulator that exceeds the expected length is caught in
    /// [`Session::absorb_body`].
    pub fn remaining_bytes(&self) -> usize {
        self.expected_body_length.saturating_sub(self.body.len())
    }

    /// Pulls the next protocol-meaningful unit out of the input buffer.
    ///
    /// In the line-oriented phases this is exactly one newline-delimited
    /// line with the terminator consumed and a trailing CR stripped; while a
    /// body is pending it is up to `min(remaining_bytes(), available)` raw
    /// bytes. Returns `None` when the buffer cannot yet satisfy the current
    /// phase. This is the single point where raw bytes become protocol
    /// units; it never reads past a line boundary and never takes more body
    /// bytes than the message has left.
    pub fn extract_available(&mut self) -> Option<Bytes> {
        match self.phase {
            Phase::Line(_) | Phase::Headers => {
                let pos = self.input.iter().position(|&b| b == b'\n')?;
                let mut line = self.input.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                Some(line.freeze())
            }
            Phase::Body => {
                let take = cmp::min(self.remaining_bytes(), self.input.len());
                if take == 0 {
                    return None;
                }
                Some(self.input.split_to(take).freeze())
            }
            _ => None,
        }
    }

    /// Moves whatever body bytes are already buffered into the body
    /// accumulator. A body that exceeds the expected length marks the
    /// session malformed.
    pub(crate) fn absorb_body(&mut self) {
        if self.body.len() > self.expected_body_length {
            warn!(
                expected = self.expected_body_length,
                buffered = self.body.len(),
                "body larger than its declared length"
            );
            self.phase = Phase::Error;
            return;
        }
        if let Some(chunk) = self.extract_available() {
            self.body.extend_from_slice(&chunk);
        }
    }

    /// Reads the inbound `Content-Length` into the body accounting and picks
    /// the follow-on phase: [`Phase::Body`] when bytes are owed, otherwise
    /// [`Phase::Processing`]. This is the usual implementation of
    /// [`crate::processor::Processor::after_headers`] for length-delimited
    /// messages.
    pub fn expected_length_from_headers(&mut self) -> Phase {
        self.expected_body_length = 0;

        match self.inbound.get(CONTENT_LENGTH) {
            None => Phase::Processing,
            Some(value) => match value.to_str().ok().and_then(|s| s.trim().parse::<usize>().ok()) {
                Some(0) => Phase::Processing,
                Some(length) => {
                    self.expected_body_length = length;
                    Phase::Body
                }
                None => {
                    warn!(value = ?value, "unusable content-length header");
                    Phase::Error
                }
            },
        }
    }

    /// Negotiates the given `(header name, server spec)` pairs against the
    /// inbound headers.
    ///
    /// Every entry is resolved through the configured [`Negotiate`] hook
    /// with the peer's preference (empty if the header is absent), the
    /// winning value is recorded in the negotiated map, the header name is
    /// appended to the outbound `Vary` header, and names with an outbound
    /// mapping (e.g. `Accept`) also set the mapped outbound header (e.g.
    /// `Content-Type`).
    ///
    /// Negotiation is best-effort: a failed entry does not stop the
    /// remaining ones from being applied. Returns `false` if any entry
    /// resolved to an empty value, so a server processor can decide to turn
    /// the aggregate failure into a `406`.
    pub fn negotiate(&mut self, negotiations: &HeaderMap) -> bool {
        self.negotiated.clear();
        let mut failed = false;

        for (name, spec) in negotiations {
            let preference = self.inbound.get(name).and_then(|v| v.to_str().ok()).unwrap_or("");
            let spec = spec.to_str().unwrap_or("");
            let value = self.config.negotiator.negotiate(preference, spec);

            append_joined(&mut self.outbound, VARY, name.as_str());

            match HeaderValue::from_str(&value) {
                Ok(header_value) => {
                    self.negotiated.insert(name.clone(), header_value.clone());
                    if let Some((_, outbound_name)) =
                        self.config.send_negotiated_as.iter().find(|(inbound_name, _)| inbound_name == name)
                    {
                        self.outbound.insert(outbound_name.clone(), header_value);
                    }
                }
                Err(_) => failed = true,
            }

            failed = failed || value.is_empty();
        }

        !failed
    }

    /// Generates a serialized HTTP reply.
    ///
    /// Informational statuses never carry a body; HEAD replies carry a
    /// correct `Content-Length` but no body; statuses of 400 and above force
    /// `Connection: close` and mark the session to close once the queue is
    /// drained. When several sources define the same header the caller's
    /// `extra` entries override the auto-computed ones and the session's
    /// outbound (negotiated) headers override both.
    ///
    /// The status line is always stamped `HTTP/1.1` regardless of what the
    /// peer advertised.
    pub fn compose_reply(&mut self, status: StatusCode, body: &[u8], extra: &HeaderMap) -> Bytes {
        let allow_body = status.as_u16() >= 200 && !self.is_head;
        let allow_keep_alive = status.as_u16() < 400;

        let mut head = HeaderMap::new();
        if allow_body || self.is_head {
            head.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        if !allow_keep_alive {
            head.insert(CONNECTION, HeaderValue::from_static("close"));
            self.close_after_send = true;
        }

        for (name, value) in extra {
            head.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.outbound {
            head.insert(name.clone(), value.clone());
        }

        let mut message = BytesMut::with_capacity(256 + if allow_body { body.len() } else { 0 });
        message.extend_from_slice(StatusLine::assemble(status).as_bytes());
        write_header_block(&head, &mut message);
        message.extend_from_slice(b"\r\n");
        if allow_body {
            message.extend_from_slice(body);
        }

        message.freeze()
    }

    /// Builds an outbound request and queues it for sending.
    ///
    /// Configured default client headers are filled in only where the caller
    /// did not set them. A `HEAD` request flags the session so the eventual
    /// response is known to carry no body.
    pub fn enqueue_request(&mut self, method: Method, target: &str, headers: HeaderMap, body: &[u8]) {
        let mut head = headers;
        for (name, value) in &self.config.default_client_headers {
            if !head.contains_key(name) {
                head.insert(name.clone(), value.clone());
            }
        }

        let mut message = BytesMut::with_capacity(256 + body.len());
        message.extend_from_slice(RequestLine::assemble(&method, target).as_bytes());
        write_header_block(&head, &mut message);
        message.extend_from_slice(b"\r\n");
        message.extend_from_slice(body);

        self.is_head = method == Method::HEAD;
        self.outbound_queue.push_back(message.freeze());
        self.requests_sent += 1;

        debug!(%method, target, "queued request");
    }

    /// Composes a reply via [`Session::compose_reply`] and queues it.
    pub fn enqueue_reply(&mut self, status: StatusCode, body: &[u8], headers: &HeaderMap) {
        let message = self.compose_reply(status, body, headers);
        self.outbound_queue.push_back(message);
        self.replies_sent += 1;

        debug!(status = status.as_u16(), "queued reply");
    }

    /// Decides whether a `405` is more appropriate than a `404`: true iff
    /// the observed allowed methods contain at least one method outside the
    /// configured always-allowed set.
    pub fn should_return_405(&self, observed_methods: &HashSet<Method>) -> bool {
        observed_methods.iter().any(|method| !self.config.generic_methods.contains(method))
    }

    /// Returns the session to a connection-free state so it can be leased
    /// again. Idempotent: recycling a free session is a no-op.
    pub fn recycle(&mut self) {
        if self.free {
            return;
        }

        self.phase = Phase::Shutdown;
        self.inbound_request = None;
        self.inbound_status = None;
        self.inbound.clear();
        self.outbound.clear();
        self.negotiated.clear();
        self.header_block.clear();
        self.body.clear();
        self.expected_body_length = 0;
        self.outbound_queue.clear();
        self.close_after_send = false;
        self.write_in_flight = false;
        self.is_head = false;
        self.requests_sent = 0;
        self.replies_sent = 0;
        self.transport_errors = 0;
        self.input.clear();
        self.free = true;
    }

    /// Re-arms a recycled session for a new connection in the given role.
    ///
    /// Counters start from zero: they are cleared here as well as in
    /// [`Session::recycle`], because a failed stream close during teardown
    /// is recorded after the recycle and must not leak into the next lease.
    pub fn lease(&mut self, role: Role) {
        self.recycle();
        self.requests_sent = 0;
        self.replies_sent = 0;
        self.transport_errors = 0;
        self.phase = Phase::Line(role.framing());
        self.free = false;
    }
}
