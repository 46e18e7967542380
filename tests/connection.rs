//! End-to-end conversations over an in-memory duplex stream.

use std::sync::{Arc, Mutex};

use http::header::{CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex, split};

use http_flow::flow::Flow;
use http_flow::pool::SessionPool;
use http_flow::processor::Processor;
use http_flow::session::{Framing, Phase, Role, Session, SessionConfig};

/// Picks the first offered token the client also listed; empty preferences
/// take the first offer outright.
fn first_match(preference: &str, spec: &str) -> String {
    let offered: Vec<&str> = spec.split(',').map(str::trim).collect();
    if preference.is_empty() {
        return offered.first().copied().unwrap_or("").to_string();
    }
    preference.split(',').map(str::trim).find(|candidate| offered.contains(candidate)).unwrap_or("").to_string()
}

fn config() -> Arc<SessionConfig> {
    Arc::new(SessionConfig::new(Arc::new(first_match)))
}

/// Serves text in a negotiated format and echoes request bodies.
struct EchoServer;

impl Processor for EchoServer {
    fn after_headers(&mut self, session: &mut Session) -> Phase {
        let mut negotiations = HeaderMap::new();
        negotiations.insert(http::header::ACCEPT, HeaderValue::from_static("text/plain,text/html"));
        session.negotiate(&negotiations);

        session.expected_length_from_headers()
    }

    fn handle(&mut self, session: &mut Session) {
        let body = session.body().to_vec();
        let body = if body.is_empty() { b"ok".to_vec() } else { body };
        session.enqueue_reply(StatusCode::OK, &body, &HeaderMap::new());
    }

    fn after_processing(&mut self, _session: &mut Session) -> Phase {
        Phase::Line(Framing::Request)
    }
}

async fn serve(wire: &[u8]) -> (String, Session) {
    let (local, mut remote) = duplex(16 * 1024);
    let (reader, writer) = split(local);
    let mut flow = Flow::new(EchoServer, reader, writer, Session::new(Role::Server, config()));

    remote.write_all(wire).await.unwrap();
    remote.shutdown().await.unwrap();

    flow.run().await;

    let mut response = Vec::new();
    remote.read_to_end(&mut response).await.unwrap();
    (String::from_utf8(response).unwrap(), flow.into_session())
}

#[tokio::test]
async fn test_get_roundtrip() {
    let (response, session) = serve(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("content-length: 2\r\n"));
    assert!(response.ends_with("\r\n\r\nok"));
    assert!(session.is_free());
}

#[tokio::test]
async fn test_negotiated_reply_carries_vary_and_content_type() {
    let (response, _session) = serve(b"GET / HTTP/1.1\r\nHost: x\r\nAccept: text/html\r\n\r\n").await;

    let lower = response.to_ascii_lowercase();
    assert!(lower.contains(&format!("{}: accept\r\n", VARY.as_str())));
    assert!(lower.contains(&format!("{}: text/html\r\n", CONTENT_TYPE.as_str())));
}

#[tokio::test]
async fn test_post_body_is_buffered_and_echoed() {
    let (response, _session) = serve(b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("content-length: 5\r\n"));
    assert!(response.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn test_pipelined_keep_alive_replies_in_order() {
    let wire = b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nr1POST /b HTTP/1.1\r\nContent-Length: 2\r\n\r\nr2";
    let (response, _session) = serve(wire).await;

    let first = response.find("r1").unwrap();
    let second = response.find("r2").unwrap();
    assert!(first < second);
    assert_eq!(response.matches("HTTP/1.1 200 OK\r\n").count(), 2);
}

#[tokio::test]
async fn test_version_two_is_rejected_with_505() {
    let (response, _session) = serve(b"GET / HTTP/2.0\r\nHost: x\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
    assert!(response.contains("connection: close\r\n"));
}

/// Sends one request on start and records the buffered response body.
struct OneShotClient {
    body: Arc<Mutex<Vec<u8>>>,
    status: Arc<Mutex<Option<StatusCode>>>,
}

impl Processor for OneShotClient {
    fn start(&mut self, session: &mut Session) {
        session.enqueue_request(Method::GET, "/greeting", HeaderMap::new(), b"");
    }

    fn handle(&mut self, session: &mut Session) {
        *self.body.lock().unwrap() = session.body().to_vec();
        *self.status.lock().unwrap() = session.inbound_status().map(|line| line.code);
    }

    fn after_processing(&mut self, _session: &mut Session) -> Phase {
        Phase::Shutdown
    }
}

#[tokio::test]
async fn test_client_role_conversation() {
    let (local, mut remote) = duplex(16 * 1024);
    let (reader, writer) = split(local);

    let body = Arc::new(Mutex::new(Vec::new()));
    let status = Arc::new(Mutex::new(None));
    let client = OneShotClient { body: body.clone(), status: status.clone() };
    let mut flow = Flow::new(client, reader, writer, Session::new(Role::Client, config()));

    let server = tokio::spawn(async move {
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n".as_slice()) {
            let n = remote.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            request.extend_from_slice(&chunk[..n]);
        }
        let request = String::from_utf8(request).unwrap();
        assert!(request.starts_with("GET /greeting HTTP/1.1\r\n"));
        assert!(request.contains("user-agent:"));

        remote.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await.unwrap();
        remote.shutdown().await.unwrap();
    });

    flow.run().await;
    server.await.unwrap();

    assert_eq!(*status.lock().unwrap(), Some(StatusCode::OK));
    assert_eq!(&body.lock().unwrap()[..], b"hello");

    let session = flow.into_session();
    assert!(session.is_free());
    assert_eq!(session.transport_errors(), 0);
}

#[tokio::test]
async fn test_pooled_session_is_reused_across_connections() {
    let mut pool = SessionPool::new(config());

    for round in 0..2 {
        let (local, mut remote) = duplex(16 * 1024);
        let (reader, writer) = split(local);
        let mut flow = Flow::new(EchoServer, reader, writer, pool.checkout(Role::Server));

        remote.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        remote.shutdown().await.unwrap();
        flow.run().await;

        let mut response = Vec::new();
        remote.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"), "round {round}");

        pool.release(flow.into_session());
        assert_eq!(pool.idle_sessions(), 1);
    }
}
