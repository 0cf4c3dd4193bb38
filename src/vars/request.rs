use super::subject::Builtin;
use hyper::header::{COOKIE, HOST};
use hyper::{HeaderMap, Method, Uri};
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Read-only view of a request, as seen by route conditions.
///
/// Every lookup returns `None` when the attribute is missing; none of
/// them can fail.
pub trait RequestView {
    /// First value of the header. Bytes that are not UTF-8 are replaced,
    /// so a header that was sent is always present.
    fn header(&self, name: &hyper::header::HeaderName) -> Option<Cow<'_, str>>;

    /// First query argument whose name matches case-insensitively, decoded.
    fn query_arg(&self, name: &str) -> Option<Cow<'_, str>>;

    fn cookie(&self, name: &str) -> Option<Cow<'_, str>>;

    fn builtin(&self, var: Builtin) -> Option<Cow<'_, str>>;

    /// Derived attributes the gateway chose to expose.
    fn variable(&self, name: &str) -> Option<&str>;
}

/// Request attributes borrowed from an incoming hyper request.
#[derive(Debug)]
pub struct RequestContext<'a> {
    method: &'a Method,
    uri: &'a Uri,
    headers: &'a HeaderMap,
    remote_addr: Option<SocketAddr>,
    is_tls: bool,
    variables: HashMap<String, String>,
}

impl<'a> RequestContext<'a> {
    pub fn new(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
            remote_addr: None,
            is_tls: false,
            variables: HashMap::new(),
        }
    }

    pub fn from_request<B>(req: &'a hyper::Request<B>) -> Self {
        Self::new(req.method(), req.uri(), req.headers())
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_tls(mut self, is_tls: bool) -> Self {
        self.is_tls = is_tls;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn method(&self) -> &Method {
        self.method
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Host without port, from the Host header or the URI authority (HTTP/2).
    pub fn host(&self) -> Option<&str> {
        let raw = self
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))?;
        Some(strip_port(raw))
    }
}

fn cookie_value<'s>(header: &'s str, name: &str) -> Option<&'s str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal, keep the brackets
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}

impl RequestView for RequestContext<'_> {
    fn header(&self, name: &hyper::header::HeaderName) -> Option<Cow<'_, str>> {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }

    fn query_arg(&self, name: &str) -> Option<Cow<'_, str>> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    fn cookie(&self, name: &str) -> Option<Cow<'_, str>> {
        self.headers.get_all(COOKIE).iter().find_map(|v| {
            match String::from_utf8_lossy(v.as_bytes()) {
                Cow::Borrowed(raw) => cookie_value(raw, name).map(Cow::Borrowed),
                Cow::Owned(raw) => cookie_value(&raw, name).map(|c| Cow::Owned(c.to_string())),
            }
        })
    }

    fn builtin(&self, var: Builtin) -> Option<Cow<'_, str>> {
        match var {
            Builtin::Uri => Some(Cow::Borrowed(self.uri.path())),
            Builtin::RequestUri => Some(
                self.uri
                    .path_and_query()
                    .map(|pq| Cow::Borrowed(pq.as_str()))
                    .unwrap_or(Cow::Borrowed("/")),
            ),
            Builtin::Args => self.uri.query().map(Cow::Borrowed),
            Builtin::Host => self.host().map(|h| {
                if h.bytes().any(|b| b.is_ascii_uppercase()) {
                    Cow::Owned(h.to_ascii_lowercase())
                } else {
                    Cow::Borrowed(h)
                }
            }),
            Builtin::RequestMethod => Some(Cow::Borrowed(self.method.as_str())),
            Builtin::Scheme => Some(Cow::Borrowed(if self.is_tls { "https" } else { "http" })),
            Builtin::RemoteAddr => self.remote_addr.map(|a| Cow::Owned(a.ip().to_string())),
        }
    }

    fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(|v| v.as_str())
    }
}
