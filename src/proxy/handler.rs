use crate::metrics::Metrics;
use crate::router::Router;
use crate::vars::RequestContext;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_TYPE, HOST, TRANSFER_ENCODING, UPGRADE};
use hyper::{body::Incoming, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Body of the response sent when no route matches.
pub const ROUTE_NOT_FOUND: &str = "404 Route Not Found";

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

static HOP_BY_HOP: &[HeaderName] = &[CONNECTION, TRANSFER_ENCODING, UPGRADE];
const HOP_BY_HOP_EXTRA: &[&str] = &[
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

pub struct ProxyHandler {
    client: Client<HttpConnector, ProxyBody>,
}

impl ProxyHandler {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(false);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(256)
            .set_host(true)
            .build(connector);

        Self { client }
    }

    pub async fn handle(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        entrypoint: &str,
        router: &Router,
        is_tls: bool,
    ) -> Result<Response<ProxyBody>, hyper::Error> {
        let start = Instant::now();
        let method = req.method().clone();

        let (route, host) = {
            let ctx = RequestContext::from_request(&req)
                .with_remote_addr(remote_addr)
                .with_tls(is_tls);
            (router.select_route(&ctx), ctx.host().map(str::to_string))
        };

        let Some(route) = route else {
            debug!(
                "No route matched for {} {} {}",
                method,
                host.as_deref().unwrap_or("-"),
                req.uri().path()
            );
            Metrics::record_not_found(entrypoint, method.as_str());
            return Ok(Self::not_found());
        };

        debug!("Matched route '{}' -> upstream '{}'", route.name, route.upstream);

        let Some(server) = route.balancer.next_server() else {
            error!("Upstream '{}' has no servers", route.upstream);
            return Ok(Self::error_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"));
        };

        let backend_uri = match Self::build_backend_uri(server, req.uri()) {
            Ok(uri) => uri,
            Err(e) => {
                error!("Failed to build backend URI for '{}': {}", server, e);
                return Ok(Self::error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                ));
            }
        };
        let proxied_req =
            Self::build_proxied_request(req, backend_uri, remote_addr, host.as_deref(), is_tls);

        let request_timeout = route.balancer.timeout();
        let response = match timeout(request_timeout, self.client.request(proxied_req)).await {
            Ok(Ok(response)) => {
                let (parts, body) = response.into_parts();
                let mut response = Response::from_parts(parts, body.boxed());
                for header in HOP_BY_HOP {
                    response.headers_mut().remove(header);
                }
                response
            }
            Ok(Err(e)) => {
                error!("Backend request failed after {:?}: {} -> {}", start.elapsed(), server, e);
                Self::error_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
            Err(_) => {
                warn!(
                    "Request timeout after {:?} (limit: {:?}): {}",
                    start.elapsed(),
                    request_timeout,
                    server
                );
                Self::error_response(StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout")
            }
        };

        Metrics::record_request(
            entrypoint,
            &route.name,
            &route.upstream,
            method.as_str(),
            response.status().as_u16(),
            start.elapsed(),
        );

        Ok(response)
    }

    fn build_backend_uri(backend_url: &str, original_uri: &Uri) -> Result<Uri, String> {
        let backend_base: Uri = backend_url
            .parse()
            .map_err(|e| format!("Invalid backend URL: {}", e))?;

        let path_and_query = original_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        format!(
            "{}://{}{}",
            backend_base.scheme_str().unwrap_or("http"),
            backend_base.authority().map(|a| a.as_str()).unwrap_or(""),
            path_and_query,
        )
        .parse()
        .map_err(|e| format!("Failed to build URI: {}", e))
    }

    fn build_proxied_request(
        req: Request<Incoming>,
        backend_uri: Uri,
        remote_addr: SocketAddr,
        original_host: Option<&str>,
        is_tls: bool,
    ) -> Request<ProxyBody> {
        let (mut parts, body) = req.into_parts();
        parts.uri = backend_uri;

        for header in HOP_BY_HOP {
            parts.headers.remove(header);
        }
        for header in HOP_BY_HOP_EXTRA {
            parts.headers.remove(*header);
        }

        let xff = match parts.headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, remote_addr.ip()),
            None => remote_addr.ip().to_string(),
        };
        if let Ok(val) = HeaderValue::from_str(&xff) {
            parts
                .headers
                .insert(HeaderName::from_static("x-forwarded-for"), val);
        }

        if let Some(val) = original_host.and_then(|h| HeaderValue::from_str(h).ok()) {
            parts
                .headers
                .insert(HeaderName::from_static("x-forwarded-host"), val);
        }

        parts.headers.insert(
            HeaderName::from_static("x-forwarded-proto"),
            HeaderValue::from_static(if is_tls { "https" } else { "http" }),
        );

        if let Some(host_value) = parts
            .uri
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        {
            parts.headers.insert(HOST, host_value);
        }

        Request::from_parts(parts, body.boxed())
    }

    /// `{"error_msg":"404 Route Not Found"}`
    pub fn not_found() -> Response<ProxyBody> {
        let body = serde_json::json!({ "error_msg": ROUTE_NOT_FOUND }).to_string();
        Self::response(StatusCode::NOT_FOUND, "application/json", body)
    }

    fn error_response(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
        Self::response(status, "text/plain; charset=utf-8", message)
    }

    fn response<T: Into<Bytes>>(
        status: StatusCode,
        content_type: &'static str,
        content: T,
    ) -> Response<ProxyBody> {
        let mut response = Response::new(
            Full::new(content.into())
                .map_err(|never| match never {})
                .boxed(),
        );
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}

impl Default for ProxyHandler {
    fn default() -> Self {
        Self::new()
    }
}
