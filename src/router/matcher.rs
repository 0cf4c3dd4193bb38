use crate::config;
use crate::vars::{ConditionError, ConditionSet, RequestContext};
use hyper::Method;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error("Invalid nginx vars: {0}")]
    Conditions(#[from] ConditionError),

    #[error("Unknown upstream: {0}")]
    UnknownUpstream(String),
}

#[derive(Debug, Clone)]
enum HostMatcher {
    Exact(String),
    /// `*.example.com`, stored as `.example.com`
    Wildcard(String),
}

impl HostMatcher {
    fn new(pattern: &str) -> Self {
        match pattern.strip_prefix('*') {
            Some(suffix) if suffix.starts_with('.') => Self::Wildcard(suffix.to_string()),
            _ => Self::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(expected) => host.eq_ignore_ascii_case(expected),
            Self::Wildcard(suffix) => {
                // At least one label before the suffix
                host.len() > suffix.len()
                    && host.as_bytes()[host.len() - suffix.len()..]
                        .eq_ignore_ascii_case(suffix.as_bytes())
            }
        }
    }
}

#[derive(Debug, Clone)]
enum PathMatcher {
    Exact(String),
    Prefix(String),
}

impl PathMatcher {
    fn new(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => path == expected,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Host, path and method checks plus the route's nginx vars.
#[derive(Debug)]
pub struct RouteMatcher {
    hosts: Vec<HostMatcher>,
    paths: Vec<PathMatcher>,
    methods: Vec<Method>,
    vars: ConditionSet,
}

impl RouteMatcher {
    pub fn from_route(route: &config::Route) -> Result<Self, RouteError> {
        let methods = route
            .methods
            .iter()
            .map(|m| {
                m.to_ascii_uppercase()
                    .parse::<Method>()
                    .map_err(|_| RouteError::InvalidMethod(m.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            hosts: route.hosts.iter().map(|h| HostMatcher::new(h)).collect(),
            paths: route.paths.iter().map(|p| PathMatcher::new(p)).collect(),
            methods,
            vars: ConditionSet::compile(&route.vars)?,
        })
    }

    /// Conditions are only evaluated once host, path and method agree.
    pub fn matches(&self, ctx: &RequestContext<'_>) -> bool {
        self.matches_location(ctx) && self.vars.evaluate(ctx)
    }

    fn matches_location(&self, ctx: &RequestContext<'_>) -> bool {
        if !self.methods.is_empty() && !self.methods.contains(ctx.method()) {
            return false;
        }

        if !self.hosts.is_empty() {
            let Some(host) = ctx.host() else {
                return false;
            };
            if !self.hosts.iter().any(|m| m.matches(host)) {
                return false;
            }
        }

        self.paths.is_empty() || self.paths.iter().any(|m| m.matches(ctx.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{HeaderMap, Uri};

    fn route(hosts: &[&str], paths: &[&str], methods: &[&str]) -> config::Route {
        config::Route {
            name: "test".into(),
            hosts: hosts.iter().map(|s| s.to_string()).collect(),
            paths: paths.iter().map(|s| s.to_string()).collect(),
            methods: methods.iter().map(|s| s.to_string()).collect(),
            vars: Vec::new(),
            upstream: "httpbin".into(),
            priority: 0,
        }
    }

    fn check(matcher: &RouteMatcher, method: Method, host: &str, path: &str) -> bool {
        let uri: Uri = path.parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("host", host.parse().unwrap());
        let ctx = RequestContext::new(&method, &uri, &headers);
        matcher.matches(&ctx)
    }

    #[test]
    fn test_exact_host_and_path() {
        let m = RouteMatcher::from_route(&route(&["httpbin.org"], &["/ip"], &[])).unwrap();

        assert!(check(&m, Method::GET, "httpbin.org", "/ip"));
        assert!(check(&m, Method::GET, "HTTPBIN.org:9080", "/ip"));
        assert!(!check(&m, Method::GET, "example.org", "/ip"));
        assert!(!check(&m, Method::GET, "httpbin.org", "/ip/extra"));
    }

    #[test]
    fn test_wildcard_host() {
        let m = RouteMatcher::from_route(&route(&["*.example.com"], &[], &[])).unwrap();

        assert!(check(&m, Method::GET, "api.example.com", "/"));
        assert!(check(&m, Method::GET, "a.b.Example.com", "/"));
        assert!(!check(&m, Method::GET, "example.com", "/"));
        assert!(!check(&m, Method::GET, ".example.com", "/"));
    }

    #[test]
    fn test_prefix_path() {
        let m = RouteMatcher::from_route(&route(&[], &["/ip*"], &[])).unwrap();

        assert!(check(&m, Method::GET, "any", "/ip"));
        assert!(check(&m, Method::GET, "any", "/ip/098/v4"));
        assert!(!check(&m, Method::GET, "any", "/headers"));
    }

    #[test]
    fn test_methods() {
        let m = RouteMatcher::from_route(&route(&[], &[], &["get", "POST"])).unwrap();

        assert!(check(&m, Method::GET, "any", "/"));
        assert!(check(&m, Method::POST, "any", "/"));
        assert!(!check(&m, Method::DELETE, "any", "/"));
    }

    #[test]
    fn test_host_required_when_configured() {
        let m = RouteMatcher::from_route(&route(&["httpbin.org"], &[], &[])).unwrap();
        let method = Method::GET;
        let uri: Uri = "/ip".parse().unwrap();
        let headers = HeaderMap::new();
        assert!(!m.matches(&RequestContext::new(&method, &uri, &headers)));
    }

    #[test]
    fn test_invalid_method_rejected() {
        let err = RouteMatcher::from_route(&route(&[], &[], &["GE T"])).unwrap_err();
        assert!(matches!(err, RouteError::InvalidMethod(m) if m == "GE T"));
    }
}
