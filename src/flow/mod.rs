//! HTTP I/O control flow.
//!
//! A [`Flow`] owns the read and write halves of an already-open duplex
//! stream plus a [`Session`], and drives them through the framing state
//! machine: read a line, classify it against the current phase, absorb
//! headers, buffer the body to completion, hand the message to the
//! [`Processor`], and drain the outbound queue back onto the wire.
//!
//! One flow is one task; suspension happens at each issued read or write.
//! Methods of a single flow are never invoked concurrently, which is what
//! lets the session get by without any locking. Writes are strictly
//! serialized: at most one is in flight per session, and the queue drains in
//! FIFO order.
//!
//! No failure crosses an await point as an error: transport and framing
//! problems become phase transitions ([`Phase::Error`], [`Phase::Shutdown`])
//! that the loop observes, optionally answering the peer with a synthesized
//! `400` or `505` before tearing the connection down.

use http::{HeaderMap, Method, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace, warn};

use crate::processor::Processor;
use crate::protocol::{HttpVersion, RequestLine, StatusLine};
use crate::session::{Framing, Phase, Session};

/// Drives one connection's reads, writes and phase transitions.
pub struct Flow<P, R, W> {
    processor: P,
    reader: R,
    writer: W,
    session: Session,
}

impl<P, R, W> Flow<P, R, W>
where
    P: Processor,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(processor: P, reader: R, writer: W, session: Session) -> Self {
        Self { processor, reader, writer, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Releases the session, e.g. back to a [`crate::pool::SessionPool`].
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Drives the connection until it is torn down.
    ///
    /// Invokes the processor's `start` hook, then alternates between
    /// draining the outbound queue and advancing the read side, until the
    /// session reaches a terminal phase and the stream is shut down.
    pub async fn run(&mut self) {
        self.processor.start(&mut self.session);

        loop {
            self.send().await;

            match self.session.phase {
                Phase::Line(_) | Phase::Headers => {
                    if self.fill_line().await {
                        self.advance_line();
                    }
                }
                Phase::Body => {
                    self.session.absorb_body();
                    if self.session.phase != Phase::Body {
                        // absorb flagged the body as malformed
                    } else if self.session.remaining_bytes() == 0 {
                        self.finish_message();
                    } else {
                        self.fill_body().await;
                    }
                }
                Phase::Processing => {
                    // the queue is drained and nothing further is pending;
                    // the processor left no way to make progress
                    warn!("idle in processing phase, tearing down");
                    self.teardown().await;
                    return;
                }
                Phase::Error | Phase::Shutdown => {
                    self.teardown().await;
                    return;
                }
            }
        }
    }

    /// Drains the outbound queue, one message and one write at a time.
    ///
    /// When a write finishes while the session is still in
    /// [`Phase::Processing`], the processor's `after_processing` hook
    /// decides the next phase. An empty queue with `close_after_send` set
    /// moves the session to [`Phase::Shutdown`].
    async fn send(&mut self) {
        loop {
            if self.session.phase == Phase::Shutdown || self.session.write_in_flight {
                return;
            }

            let Some(message) = self.session.pop_outbound() else {
                if self.session.close_after_send {
                    self.session.phase = Phase::Shutdown;
                }
                return;
            };

            trace!(bytes = message.len(), "writing message");
            self.session.write_in_flight = true;
            let result = match self.writer.write_all(&message).await {
                Ok(()) => self.writer.flush().await,
                Err(e) => Err(e),
            };
            self.session.write_in_flight = false;

            match result {
                Ok(()) => {
                    if self.session.phase == Phase::Processing {
                        self.session.phase = self.processor.after_processing(&mut self.session);
                    }
                }
                Err(e) => {
                    error!(cause = %e, "write failed");
                    self.session.note_transport_error();
                    self.session.phase = Phase::Error;
                    return;
                }
            }
        }
    }

    /// Reads until the input buffer holds at least one full line. Returns
    /// false when the phase moved to [`Phase::Error`] instead.
    async fn fill_line(&mut self) -> bool {
        while !self.session.input_has_line() {
            match self.reader.read_buf(&mut self.session.input).await {
                Ok(0) => {
                    debug!("peer closed while a line was expected");
                    self.session.phase = Phase::Error;
                    return false;
                }
                Ok(n) => trace!(bytes = n, "read"),
                Err(e) => {
                    error!(cause = %e, "read failed");
                    self.session.note_transport_error();
                    self.session.phase = Phase::Error;
                    return false;
                }
            }
        }
        true
    }

    /// Reads until the input buffer holds the rest of the current body.
    async fn fill_body(&mut self) {
        let needed = self.session.remaining_bytes();
        while self.session.input_len() < needed {
            match self.reader.read_buf(&mut self.session.input).await {
                Ok(0) => {
                    debug!(missing = needed - self.session.input_len(), "peer closed mid-body");
                    self.session.phase = Phase::Error;
                    return;
                }
                Ok(n) => trace!(bytes = n, "read"),
                Err(e) => {
                    error!(cause = %e, "read failed");
                    self.session.note_transport_error();
                    self.session.phase = Phase::Error;
                    return;
                }
            }
        }
    }

    /// Classifies one extracted line against the current phase. This is the
    /// central transition function of the engine; the framing variant of
    /// [`Phase::Line`] is the only point where the server and client roles
    /// differ.
    fn advance_line(&mut self) {
        let Some(line) = self.session.extract_available() else { return };

        let phase = self.session.phase;
        let was_framing = matches!(phase, Phase::Line(_));
        let was_request = phase == Phase::Line(Framing::Request);
        let mut version = None;

        match phase {
            Phase::Line(Framing::Request) => {
                // lossy so a rejected line is still readable in the log
                let text = String::from_utf8_lossy(&line);
                match RequestLine::parse(&text) {
                    Ok(parsed) => {
                        trace!(method = %parsed.method, target = %parsed.target, "parsed request line");
                        version = Some(parsed.version);
                        self.session.is_head = parsed.method == Method::HEAD;
                        self.session.inbound_request = Some(parsed);
                        self.session.phase = Phase::Headers;
                    }
                    Err(e) => {
                        debug!(cause = %e, "invalid request line");
                        self.session.phase = Phase::Error;
                    }
                }
            }
            Phase::Line(Framing::Status) => {
                let text = String::from_utf8_lossy(&line);
                match StatusLine::parse(&text) {
                    Ok(parsed) => {
                        trace!(code = parsed.code.as_u16(), "parsed status line");
                        version = Some(parsed.version);
                        self.session.inbound_status = Some(parsed);
                        self.session.phase = Phase::Headers;
                    }
                    Err(e) => {
                        debug!(cause = %e, "invalid status line");
                        self.session.phase = Phase::Error;
                    }
                }
            }
            Phase::Headers => {
                self.session.header_block.absorb(&line);
                if self.session.header_block.is_complete() {
                    match self.session.header_block.parse() {
                        Ok(map) => {
                            self.session.inbound = map;
                            self.session.phase = self.processor.after_headers(&mut self.session);
                            self.session.body.clear();
                            if self.session.phase == Phase::Processing {
                                // no body expected: the message is already
                                // complete
                                self.finish_message();
                            }
                        }
                        Err(e) => {
                            warn!(cause = %e, "invalid header block");
                            self.session.phase = Phase::Error;
                        }
                    }
                }
            }
            _ => {}
        }

        // reject any message framed with a major version this engine does
        // not speak
        if was_framing && self.session.phase != Phase::Error && version.is_some_and(HttpVersion::unsupported) {
            self.session.phase = Phase::Error;
        }

        if was_framing && self.session.phase == Phase::Headers {
            // fresh header accumulator for the new message
            self.session.inbound.clear();
            self.session.header_block.clear();
        } else if was_request && self.session.phase == Phase::Error {
            // answer a broken or unsupported request line before tearing
            // the connection down, so the peer gets a diagnosable reply
            // rather than a silent disconnect
            let status = if version.is_some_and(HttpVersion::unsupported) {
                StatusCode::HTTP_VERSION_NOT_SUPPORTED
            } else {
                StatusCode::BAD_REQUEST
            };
            self.synthesize_error_reply(status);
            self.session.phase = Phase::Processing;
        }
    }

    /// Runs the processor over a fully-buffered message.
    fn finish_message(&mut self) {
        self.session.phase = Phase::Processing;
        self.processor.handle(&mut self.session);
        self.session.phase = self.processor.after_processing(&mut self.session);
    }

    fn synthesize_error_reply(&mut self, status: StatusCode) {
        let body = format!("{} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or("Unknown"));
        self.session.enqueue_reply(status, body.as_bytes(), &HeaderMap::new());
    }

    /// Recycles the session and performs an orderly shutdown of the write
    /// half. The read half closes when the flow is dropped; when both
    /// halves wrap one socket the transport sees a single half-close, never
    /// two. A close error only bumps the transport-error counter; the
    /// connection is already being abandoned.
    async fn teardown(&mut self) {
        if !self.session.is_free() {
            self.processor.recycle(&mut self.session);
            self.session.recycle();
        }

        if let Err(e) = self.writer.shutdown().await {
            debug!(cause = %e, "shutdown failed");
            self.session.note_transport_error();
        }
    }
}
