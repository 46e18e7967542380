//! Request-processor extension points.
//!
//! A [`Processor`] is what turns the engine into an application: the flow
//! controller drives framing and I/O, and calls out to the processor at the
//! defined points below. Server processors typically answer `handle` with
//! [`Session::enqueue_reply`]; client processors queue their first request
//! in `start` and read the buffered response in `handle`.
//!
//! All hooks are synchronous. Anything long-running belongs in the
//! application's own tasks, with the result queued onto the session before
//! `handle` returns.

use crate::session::{Phase, Session};

/// Extension points the flow controller invokes while driving a connection.
pub trait Processor {
    /// Runs once when the flow starts driving the connection. A client
    /// implementation typically enqueues its first request here.
    fn start(&mut self, session: &mut Session) {
        let _ = session;
    }

    /// Runs when an inbound header block has been fully absorbed and
    /// parsed. Returns the next phase, usually [`Phase::Body`] when a body
    /// is expected or [`Phase::Processing`] otherwise. The default follows
    /// the inbound `Content-Length` header.
    fn after_headers(&mut self, session: &mut Session) -> Phase {
        session.expected_length_from_headers()
    }

    /// Runs exactly once per fully-buffered message, with the complete body
    /// available via [`Session::body`].
    fn handle(&mut self, session: &mut Session);

    /// Decides what follows a processed message: another exchange via
    /// [`Phase::Line`], or [`Phase::Shutdown`] to end the connection.
    fn after_processing(&mut self, session: &mut Session) -> Phase;

    /// Last chance to release processor-owned per-request state before the
    /// session is reset for reuse.
    fn recycle(&mut self, session: &mut Session) {
        let _ = session;
    }
}
