//! Connection and timeout policy for the S3 HTTP client
//!
//! hyper never negotiates or decodes `Content-Encoding`, so object bodies
//! always arrive exactly as stored. `Expect: 100-continue` is never sent, so
//! there is no continue wait to bound either.

use hyper::Uri;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Timeouts and pool limits installed on every client
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP connect timeout
    pub dial_timeout: Duration,
    /// TCP keep-alive interval
    pub keep_alive: Duration,
    /// Delay before racing the other address family (None disables dual-stack)
    pub happy_eyeballs_timeout: Option<Duration>,
    /// Maximum idle pooled connections (per host)
    pub max_idle_conns: usize,
    /// How long an idle pooled connection is kept
    pub idle_conn_timeout: Duration,
    /// TLS handshake timeout, on top of the dial timeout
    pub tls_handshake_timeout: Duration,
    /// Time allowed for the response headers of a control request.
    ///
    /// Covers the case where the TCP connection works but the server never
    /// answers.
    pub response_header_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(30),
            happy_eyeballs_timeout: Some(Duration::from_millis(300)),
            max_idle_conns: 100,
            idle_conn_timeout: Duration::from_secs(90),
            tls_handshake_timeout: Duration::from_secs(10),
            response_header_timeout: Duration::from_secs(15),
        }
    }
}

impl TransportConfig {
    /// Upper bound for establishing a connection (dial + TLS handshake)
    pub fn connect_budget(&self) -> Duration {
        self.dial_timeout + self.tls_handshake_timeout
    }
}

/// Connection establishment exceeded its budget
#[derive(Debug, thiserror::Error)]
#[error("connection not established within {0:?}")]
pub struct ConnectTimeout(pub Duration);

/// Connector wrapper bounding the whole connect (TCP + TLS) with one timeout.
#[derive(Clone)]
pub struct TimeoutConnector<C> {
    inner: C,
    timeout: Duration,
}

impl<C> TimeoutConnector<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<C> Service<Uri> for TimeoutConnector<C>
where
    C: Service<Uri>,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
    C::Response: Send + 'static,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let connecting = self.inner.call(dst);
        let timeout = self.timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, connecting).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(Box::new(ConnectTimeout(timeout)) as BoxError),
            }
        })
    }
}
