//! HTTP gateway edge.
//!
//! Applies the rate-limit decision to each inbound request and reverse
//! proxies allowed traffic to the backend origin. The client IP is taken
//! from the first `X-Forwarded-For` element, falling back to the peer
//! address; the route key comes from the `X-Rate-Limit-Rule` header.

use crate::error::{LimitError, LimitResult};
use crate::limiter::RateLimitInfo;
use crate::service::LimiterService;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RULE_HEADER: &str = "x-rate-limit-rule";
const FORWARDED_FOR: &str = "x-forwarded-for";
const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// The gateway's request path: decide, then reject or forward.
pub struct Gateway {
    limiter: Arc<LimiterService>,
    backend: Uri,
    client: Client<HttpConnector, Incoming>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("backend", &self.backend)
            .finish()
    }
}

impl Gateway {
    /// Create a gateway forwarding allowed requests to `backend_addr`.
    pub fn new(limiter: Arc<LimiterService>, backend_addr: &str) -> LimitResult<Self> {
        let backend: Uri = backend_addr
            .parse()
            .map_err(|e| LimitError::InvalidConfig(format!("invalid backend addr: {e}")))?;
        if backend.scheme().is_none() || backend.authority().is_none() {
            return Err(LimitError::InvalidConfig(format!(
                "backend addr '{backend_addr}' must include scheme and host"
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            limiter,
            backend,
            client,
        })
    }

    /// Accept loop. Exits when `shutdown` fires, then drains in-flight
    /// connections for at most `drain_timeout`.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
        drain_timeout: Duration,
    ) -> std::io::Result<()> {
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        },
                    };

                    let io = TokioIo::new(stream);
                    let gateway = Arc::clone(&self);
                    let service = service_fn(move |req| {
                        let gateway = Arc::clone(&gateway);
                        async move { gateway.handle(req, peer).await }
                    });

                    let conn = http1::Builder::new().serve_connection(io, service);
                    let conn = graceful.watch(conn);
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(error = %e, "connection closed with error");
                        }
                    });
                },
            }
        }

        info!("listener stopped, draining in-flight requests");
        tokio::select! {
            () = graceful.shutdown() => info!("in-flight requests drained"),
            () = tokio::time::sleep(drain_timeout) => warn!("shutdown drain timed out"),
        }
        Ok(())
    }

    /// Handle one request.
    async fn handle(
        &self,
        req: Request<Incoming>,
        peer: SocketAddr,
    ) -> Result<Response<ProxyBody>, Infallible> {
        let client_ip = client_ip(req.headers(), peer);
        let route = req
            .headers()
            .get(RULE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let info = match self.limiter.decide(&client_ip, &route).await {
            Ok(info) => info,
            Err(e) => {
                error!(code = e.code(), error = %e, ip = %client_ip, route, "decision failed");
                return Ok(plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error",
                ));
            },
        };

        if !info.allowed {
            info!(ip = %client_ip, route, "rate limit exceeded");
            let mut response = plain_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
            set_rate_limit_headers(response.headers_mut(), &info);
            return Ok(response);
        }

        debug!(ip = %client_ip, route, "forwarding request");
        Ok(self.forward(req, &client_ip, &info).await)
    }

    /// Forward an allowed request to the backend origin.
    async fn forward(
        &self,
        mut req: Request<Incoming>,
        client_ip: &str,
        info: &RateLimitInfo,
    ) -> Response<ProxyBody> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());

        let mut parts = self.backend.clone().into_parts();
        parts.path_and_query = Some(match path_and_query.parse() {
            Ok(pq) => pq,
            Err(e) => {
                error!(error = %e, "invalid request path");
                return plain_response(StatusCode::BAD_GATEWAY, "bad gateway");
            },
        });
        let uri = match Uri::from_parts(parts) {
            Ok(uri) => uri,
            Err(e) => {
                error!(error = %e, "failed to build backend uri");
                return plain_response(StatusCode::BAD_GATEWAY, "bad gateway");
            },
        };
        *req.uri_mut() = uri;

        // Preserve the client's IP chain when the edge in front of us did not.
        if !req.headers().contains_key(FORWARDED_FOR) {
            if let Ok(value) = HeaderValue::from_str(client_ip) {
                req.headers_mut().insert(FORWARDED_FOR, value);
            }
        }

        match self.client.request(req).await {
            Ok(response) => {
                let mut response = response.map(BodyExt::boxed);
                set_rate_limit_headers(response.headers_mut(), info);
                response
            },
            Err(e) => {
                error!(error = %e, backend = %self.backend, "backend request failed");
                plain_response(StatusCode::BAD_GATEWAY, "bad gateway")
            },
        }
    }
}

/// Client IP: first `X-Forwarded-For` element, else the peer address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.ip().to_string()
}

/// Emit rate-limit headers; the bypass sentinel emits nothing.
fn set_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    if info.limit > 0 {
        headers.insert(LIMIT_HEADER, HeaderValue::from(info.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(info.remaining));
    }
    if info.reset_time > 0 {
        headers.insert(RESET_HEADER, HeaderValue::from(info.reset_time));
    }
}

fn plain_response(status: StatusCode, text: &'static str) -> Response<ProxyBody> {
    let body = Full::new(Bytes::from_static(text.as_bytes()))
        .map_err(|never| match never {})
        .boxed();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}
