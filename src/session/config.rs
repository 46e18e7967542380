//! Immutable per-process session configuration.
//!
//! The original C++-era designs of this kind of engine keep negotiation maps
//! and default client headers in mutable process-wide statics; here they are
//! plain data, built once at startup and shared read-only between sessions.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// The agent string sent with outbound requests unless overridden.
pub const IDENTIFIER: &str = concat!("http-flow/", env!("CARGO_PKG_VERSION"));

/// Resolves a client preference header value against a server-offered spec.
///
/// Returns the winning value, or an empty string when no common ground
/// exists. The matching algorithm itself (q-values, wildcards, tie-breaking)
/// lives outside the engine; the session only orchestrates when negotiation
/// runs and where the result ends up.
pub trait Negotiate: Send + Sync {
    fn negotiate(&self, client_preference: &str, server_spec: &str) -> String;
}

impl<F> Negotiate for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn negotiate(&self, client_preference: &str, server_spec: &str) -> String {
        self(client_preference, server_spec)
    }
}

/// Shared, read-only configuration for all sessions of a process.
pub struct SessionConfig {
    /// Maps an inbound negotiation header to the outbound header that
    /// carries the negotiated value, e.g. `Accept` to `Content-Type`.
    pub send_negotiated_as: Vec<(HeaderName, HeaderName)>,

    /// Headers added to every outbound request unless the caller set them.
    pub default_client_headers: HeaderMap,

    /// Methods that never justify a `405` on their own. Everyone ignores
    /// OPTIONS and hardly anyone allows TRACE, so a resource that permits
    /// only these is still reported as `404` rather than `405`.
    pub generic_methods: HashSet<Method>,

    /// The pluggable negotiation algorithm.
    pub negotiator: Arc<dyn Negotiate>,
}

impl SessionConfig {
    pub fn new(negotiator: Arc<dyn Negotiate>) -> Self {
        let mut default_client_headers = HeaderMap::new();
        default_client_headers.insert(USER_AGENT, HeaderValue::from_static(IDENTIFIER));

        Self {
            send_negotiated_as: vec![(ACCEPT, CONTENT_TYPE)],
            default_client_headers,
            generic_methods: [Method::OPTIONS, Method::TRACE].into_iter().collect(),
            negotiator,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("send_negotiated_as", &self.send_negotiated_as)
            .field("default_client_headers", &self.default_client_headers)
            .field("generic_methods", &self.generic_methods)
            .finish_non_exhaustive()
    }
}
