use super::request::RequestView;
use hyper::header::HeaderName;
use std::borrow::Cow;
use std::fmt;

/// Variables computed from the request line and connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Request path without the query string.
    Uri,
    /// Path and query as sent by the client.
    RequestUri,
    /// Raw query string.
    Args,
    /// Lower-cased host without port.
    Host,
    RequestMethod,
    Scheme,
    RemoteAddr,
}

impl Builtin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Builtin::Uri => "uri",
            Builtin::RequestUri => "request_uri",
            Builtin::Args => "args",
            Builtin::Host => "host",
            Builtin::RequestMethod => "request_method",
            Builtin::Scheme => "scheme",
            Builtin::RemoteAddr => "remote_addr",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let var = match name {
            "uri" => Builtin::Uri,
            "request_uri" => Builtin::RequestUri,
            "args" | "query_string" => Builtin::Args,
            "host" => Builtin::Host,
            "request_method" => Builtin::RequestMethod,
            "scheme" => Builtin::Scheme,
            "remote_addr" => Builtin::RemoteAddr,
            _ => return None,
        };
        Some(var)
    }
}

/// Where a condition reads its value from.
///
/// Parsed once from names such as `http_x_foo`, `arg_id` or `uri`.
/// Names are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Header(HeaderName),
    Arg(String),
    Cookie(String),
    Builtin(Builtin),
    /// Any other name, looked up among the request's derived variables.
    Variable(String),
}

impl Subject {
    /// Returns `None` only for an empty name.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }

        if let Some(header) = name.strip_prefix("http_") {
            // http_content_type -> content-type
            let header = header.replace('_', "-");
            if let Ok(header) = HeaderName::from_bytes(header.as_bytes()) {
                return Some(Subject::Header(header));
            }
        } else if let Some(arg) = name.strip_prefix("arg_").filter(|a| !a.is_empty()) {
            return Some(Subject::Arg(arg.to_string()));
        } else if let Some(cookie) = name.strip_prefix("cookie_").filter(|c| !c.is_empty()) {
            return Some(Subject::Cookie(cookie.to_string()));
        } else if let Some(builtin) = Builtin::from_name(&name) {
            return Some(Subject::Builtin(builtin));
        }

        Some(Subject::Variable(name))
    }

    /// Look the subject up on a request. `None` means absent.
    #[inline]
    pub fn resolve<'r, R: RequestView + ?Sized>(&self, request: &'r R) -> Option<Cow<'r, str>> {
        match self {
            Subject::Header(name) => request.header(name),
            Subject::Arg(name) => request.query_arg(name),
            Subject::Cookie(name) => request.cookie(name),
            Subject::Builtin(var) => request.builtin(*var),
            Subject::Variable(name) => request.variable(name).map(Cow::Borrowed),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Header(name) => write!(f, "http_{}", name.as_str().replace('-', "_")),
            Subject::Arg(name) => write!(f, "arg_{}", name),
            Subject::Cookie(name) => write!(f, "cookie_{}", name),
            Subject::Builtin(var) => f.write_str(var.as_str()),
            Subject::Variable(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::RequestContext;
    use hyper::{HeaderMap, Method, Uri};

    #[test]
    fn test_parse_header_subjects() {
        assert_eq!(
            Subject::parse("http_x_foo"),
            Some(Subject::Header(HeaderName::from_static("x-foo")))
        );
        assert_eq!(
            Subject::parse("HTTP_Content_Type"),
            Some(Subject::Header(HeaderName::from_static("content-type")))
        );
    }

    #[test]
    fn test_parse_other_subjects() {
        assert_eq!(Subject::parse("arg_id"), Some(Subject::Arg("id".into())));
        assert_eq!(Subject::parse("Cookie_Session"), Some(Subject::Cookie("session".into())));
        assert_eq!(Subject::parse("uri"), Some(Subject::Builtin(Builtin::Uri)));
        assert_eq!(Subject::parse("query_string"), Some(Subject::Builtin(Builtin::Args)));
        assert_eq!(Subject::parse("real_uri"), Some(Subject::Variable("real_uri".into())));
        assert_eq!(Subject::parse("arg_"), Some(Subject::Variable("arg_".into())));
        assert_eq!(Subject::parse("http_"), Some(Subject::Variable("http_".into())));
        assert_eq!(Subject::parse("http_x y"), Some(Subject::Variable("http_x y".into())));
        assert_eq!(Subject::parse("  "), None);
    }

    #[test]
    fn test_resolve_against_request() {
        let method = Method::GET;
        let uri: Uri = "/ip?id=100".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-foo", "bar".parse().unwrap());
        headers.insert("content-type", "text/html".parse().unwrap());
        let ctx = RequestContext::new(&method, &uri, &headers).with_variable("real_uri", "/ip/098/v4");

        let resolve = |name: &str| {
            Subject::parse(name)
                .unwrap()
                .resolve(&ctx)
                .map(|v| v.into_owned())
        };

        assert_eq!(resolve("http_x_foo").as_deref(), Some("bar"));
        assert_eq!(resolve("http_content_type").as_deref(), Some("text/html"));
        assert_eq!(resolve("http_x_missing"), None);
        assert_eq!(resolve("arg_id").as_deref(), Some("100"));
        assert_eq!(resolve("arg_other"), None);
        assert_eq!(resolve("uri").as_deref(), Some("/ip"));
        assert_eq!(resolve("real_uri").as_deref(), Some("/ip/098/v4"));
        assert_eq!(resolve("no_such_variable"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Subject::parse("http_x_foo").unwrap().to_string(), "http_x_foo");
        assert_eq!(Subject::parse("arg_id").unwrap().to_string(), "arg_id");
    }
}
