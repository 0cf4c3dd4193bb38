use super::condition::{CompiledCondition, Condition};
use super::request::RequestView;
use super::ConditionError;
use tracing::trace;

/// All conditions attached to one route; a request matches when every
/// condition holds. An empty set matches everything.
#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    conditions: Vec<CompiledCondition>,
}

impl ConditionSet {
    /// Compile every condition, failing on the first invalid one so that a
    /// route is never loaded with only part of its conditions.
    pub fn compile(raw: &[Condition]) -> Result<Self, ConditionError> {
        let conditions = raw
            .iter()
            .map(CompiledCondition::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { conditions })
    }

    /// Subjects are resolved one condition at a time, so nothing past the
    /// first failing condition is looked up.
    pub fn evaluate<R: RequestView + ?Sized>(&self, request: &R) -> bool {
        self.conditions.iter().all(|condition| {
            let matched = condition.evaluate(request);
            if !matched {
                trace!(
                    "Condition failed: {} {}",
                    condition.subject(),
                    condition.op()
                );
            }
            matched
        })
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::{Builtin, Operator};
    use hyper::header::HeaderName;
    use std::borrow::Cow;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Request stub that records which headers were looked up.
    #[derive(Default)]
    struct StubRequest {
        headers: HashMap<String, String>,
        lookups: RefCell<Vec<String>>,
    }

    impl StubRequest {
        fn with_header(mut self, name: &str, value: &str) -> Self {
            self.headers.insert(name.to_string(), value.to_string());
            self
        }
    }

    impl RequestView for StubRequest {
        fn header(&self, name: &HeaderName) -> Option<Cow<'_, str>> {
            self.lookups.borrow_mut().push(name.as_str().to_string());
            self.headers.get(name.as_str()).map(|v| Cow::Borrowed(v.as_str()))
        }

        fn query_arg(&self, _name: &str) -> Option<Cow<'_, str>> {
            None
        }

        fn cookie(&self, _name: &str) -> Option<Cow<'_, str>> {
            None
        }

        fn builtin(&self, _var: Builtin) -> Option<Cow<'_, str>> {
            None
        }

        fn variable(&self, _name: &str) -> Option<&str> {
            None
        }
    }

    #[test]
    fn test_empty_set_matches() {
        let set = ConditionSet::compile(&[]).unwrap();
        assert!(set.is_empty());
        assert!(set.evaluate(&StubRequest::default()));
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let set = ConditionSet::compile(&[
            Condition::value("http_x_foo", Operator::Equal, "bar"),
            Condition::set("http_x_env", Operator::In, ["prod", "staging"]),
        ])
        .unwrap();
        assert_eq!(set.len(), 2);

        let both = StubRequest::default()
            .with_header("x-foo", "bar")
            .with_header("x-env", "prod");
        assert!(set.evaluate(&both));

        let one = StubRequest::default()
            .with_header("x-foo", "bar")
            .with_header("x-env", "dev");
        assert!(!set.evaluate(&one));
    }

    #[test]
    fn test_short_circuit_skips_later_lookups() {
        let set = ConditionSet::compile(&[
            Condition::value("http_x_first", Operator::Equal, "yes"),
            Condition::value("http_x_second", Operator::Equal, "yes"),
        ])
        .unwrap();

        let request = StubRequest::default().with_header("x-first", "no");
        assert!(!set.evaluate(&request));
        assert_eq!(*request.lookups.borrow(), vec!["x-first".to_string()]);
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let set = ConditionSet::compile(&[Condition::value(
            "http_x_real_uri",
            Operator::RegexMatch,
            r"^/ip/0\d{2}/.*$",
        )])
        .unwrap();
        let request = StubRequest::default().with_header("x-real-uri", "/ip/098/v4");

        let first = set.evaluate(&request);
        for _ in 0..100 {
            assert_eq!(set.evaluate(&request), first);
        }
        assert!(first);
    }

    #[test]
    fn test_compile_is_all_or_nothing() {
        let result = ConditionSet::compile(&[
            Condition::value("http_x_foo", Operator::Equal, "bar"),
            Condition::value("http_x_foo", Operator::RegexMatch, "("),
        ]);
        assert!(matches!(result, Err(ConditionError::InvalidPattern { .. })));
    }

    #[test]
    fn test_non_ascii_header_fails_negated_conditions() {
        use crate::vars::RequestContext;
        use hyper::header::HeaderValue;
        use hyper::{HeaderMap, Method, Uri};

        let method = Method::GET;
        let uri: Uri = "/ip".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-foo", HeaderValue::from_bytes("café".as_bytes()).unwrap());
        headers.insert("user-agent", HeaderValue::from_bytes(b"evilbot\xe9").unwrap());
        let ctx = RequestContext::new(&method, &uri, &headers);

        let compile = |raw: Condition| ConditionSet::compile(&[raw]).unwrap();

        assert!(compile(Condition::value("http_x_foo", Operator::Equal, "café")).evaluate(&ctx));
        assert!(!compile(Condition::value("http_x_foo", Operator::NotEqual, "café")).evaluate(&ctx));
        assert!(!compile(Condition::set("http_x_foo", Operator::NotIn, ["café"])).evaluate(&ctx));
        assert!(
            !compile(Condition::value("http_user_agent", Operator::RegexNotMatch, "bot"))
                .evaluate(&ctx)
        );
        assert!(
            compile(Condition::value("http_x_foo", Operator::RegexMatchCaseInsensitive, "^CAFÉ$"))
                .evaluate(&ctx)
        );
    }

    #[test]
    fn test_compiled_set_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConditionSet>();
    }
}
