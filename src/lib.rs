//! An embeddable asynchronous HTTP/1.x protocol engine
//!
//! This crate drives the byte-level conversation of an HTTP/1.x connection on
//! an already-open duplex stream: it turns raw reads into parsed request or
//! status lines and header blocks, buffers bodies to completion, and
//! serializes queued outbound messages back onto the wire. It is
//! transport-agnostic and works identically over TCP sockets, UNIX sockets,
//! standard I/O pipes or any other pair of [`tokio::io::AsyncRead`] /
//! [`tokio::io::AsyncWrite`] halves.
//!
//! # Features
//!
//! - One framing state machine for both the server and the client role
//! - Keep-alive: multiple sequential exchanges on one connection
//! - Session recycling and pooling without state leaking between connections
//! - Strictly serialized writes (at most one in flight per session)
//! - Header negotiation orchestration with automatic `Vary` bookkeeping
//! - Synthesized `400` / `505` replies for malformed or unsupported framing
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::{HeaderMap, StatusCode};
//! use tokio::net::TcpListener;
//!
//! use http_flow::flow::Flow;
//! use http_flow::processor::Processor;
//! use http_flow::session::{Framing, Phase, Role, Session, SessionConfig};
//!
//! struct Hello;
//!
//! impl Processor for Hello {
//!     fn handle(&mut self, session: &mut Session) {
//!         session.enqueue_reply(StatusCode::OK, b"hello\n", &HeaderMap::new());
//!     }
//!
//!     fn after_processing(&mut self, _session: &mut Session) -> Phase {
//!         // keep the connection open for the next request
//!         Phase::Line(Framing::Request)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(SessionConfig::new(Arc::new(|_preference: &str, spec: &str| {
//!         spec.split(',').next().unwrap_or("").trim().to_string()
//!     })));
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     loop {
//!         let (stream, _remote_addr) = listener.accept().await.unwrap();
//!         let session = Session::new(Role::Server, config.clone());
//!         tokio::spawn(async move {
//!             let (reader, writer) = stream.into_split();
//!             let mut flow = Flow::new(Hello, reader, writer, session);
//!             flow.run().await;
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`session`]: the transport-independent record of one connection's
//!   protocol state, including the phase, header maps, body accumulator and
//!   the outbound message queue
//! - [`flow`]: the controller that owns the stream halves, issues reads and
//!   writes, and advances the session through its phases
//! - [`processor`]: the extension-point trait that application code
//!   implements to turn buffered messages into queued replies or requests
//! - [`protocol`]: request-line, status-line and header-block grammar types
//! - [`pool`]: ownership-tracked reuse of session allocations
//!
//! # Limitations
//!
//! - HTTP/1.x only; any line advertising a major version of 2 or above is
//!   rejected with `505 HTTP Version Not Supported`
//! - Bodies are length-delimited and fully buffered; no chunked decoding
//! - No TLS and no transport establishment; the caller opens the stream
//! - Maximum header block size: 8KB, maximum number of headers: 64

pub mod flow;
pub mod pool;
pub mod processor;
pub mod protocol;
pub mod session;

mod utils;
pub(crate) use utils::ensure;
