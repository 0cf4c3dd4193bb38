use super::operator::{parse_number, OperandKind, Operator, Predicate};
use super::request::RequestView;
use super::subject::Subject;
use super::ConditionError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound on the compiled size of a condition pattern.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// A condition as written in route configuration.
///
/// `value` carries the scalar or the regex pattern; `set` carries the
/// members for `In` and `NotIn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub subject: String,

    pub op: Operator,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<Vec<String>>,
}

impl Condition {
    pub fn value(subject: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            op,
            value: Some(value.into()),
            set: None,
        }
    }

    pub fn set<I, S>(subject: impl Into<String>, op: Operator, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: subject.into(),
            op,
            value: None,
            set: Some(members.into_iter().map(Into::into).collect()),
        }
    }
}

/// A condition ready for evaluation; immutable once compiled.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    subject: Subject,
    op: Operator,
    predicate: Predicate,
}

impl CompiledCondition {
    pub fn compile(raw: &Condition) -> Result<Self, ConditionError> {
        let subject = Subject::parse(&raw.subject)
            .ok_or_else(|| ConditionError::InvalidSubject(raw.subject.clone()))?;

        let invalid = |reason: &str| ConditionError::InvalidOperand {
            subject: raw.subject.clone(),
            op: raw.op,
            reason: reason.to_string(),
        };

        let predicate = match raw.op.operand_kind() {
            OperandKind::Scalar => {
                if raw.set.is_some() {
                    return Err(invalid("expects a single value, not a set"));
                }
                let value = raw.value.as_ref().ok_or_else(|| invalid("missing value"))?;
                Self::scalar_predicate(raw, value)
            }
            OperandKind::Set => {
                if raw.value.is_some() {
                    return Err(invalid("expects a set, not a single value"));
                }
                let set = raw
                    .set
                    .as_ref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| invalid("set must contain at least one element"))?;
                match raw.op {
                    Operator::In => Predicate::In(set.clone()),
                    _ => Predicate::NotIn(set.clone()),
                }
            }
            OperandKind::Pattern => {
                if raw.set.is_some() {
                    return Err(invalid("expects a pattern, not a set"));
                }
                let pattern = raw.value.as_ref().ok_or_else(|| invalid("missing pattern"))?;
                let re = Self::compile_pattern(raw, pattern)?;
                match raw.op {
                    Operator::RegexMatch | Operator::RegexMatchCaseInsensitive => {
                        Predicate::Matches(re)
                    }
                    _ => Predicate::NotMatches(re),
                }
            }
        };

        Ok(Self {
            subject,
            op: raw.op,
            predicate,
        })
    }

    fn scalar_predicate(raw: &Condition, value: &str) -> Predicate {
        match raw.op {
            Operator::Equal => Predicate::Equal(value.to_string()),
            Operator::NotEqual => Predicate::NotEqual(value.to_string()),
            _ => {
                let bound = parse_number(value);
                if bound.is_none() {
                    warn!(
                        "Condition '{} {} {}' compares against a non-numeric value and will never match",
                        raw.subject, raw.op, value
                    );
                }
                if raw.op == Operator::GreaterThan {
                    Predicate::GreaterThan(bound)
                } else {
                    Predicate::LessThan(bound)
                }
            }
        }
    }

    fn compile_pattern(raw: &Condition, pattern: &str) -> Result<Regex, ConditionError> {
        RegexBuilder::new(pattern)
            .case_insensitive(raw.op.is_case_insensitive())
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|source| ConditionError::InvalidPattern {
                subject: raw.subject.clone(),
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    #[inline]
    pub fn evaluate<R: RequestView + ?Sized>(&self, request: &R) -> bool {
        let value = self.subject.resolve(request);
        self.predicate.test(value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::RequestContext;
    use hyper::{HeaderMap, Method, Uri};

    fn compile(raw: Condition) -> CompiledCondition {
        CompiledCondition::compile(&raw).unwrap()
    }

    #[test]
    fn test_compile_scalar() {
        let c = compile(Condition::value("http_x_foo", Operator::Equal, "bar"));
        assert_eq!(c.op(), Operator::Equal);
        assert!(matches!(c.predicate(), Predicate::Equal(v) if v == "bar"));
        assert!(matches!(c.subject(), Subject::Header(h) if h == "x-foo"));
    }

    #[test]
    fn test_compile_numeric_keeps_unparsable_literal_lazy() {
        let c = compile(Condition::value("arg_id", Operator::GreaterThan, "thirteen"));
        assert!(matches!(c.predicate(), Predicate::GreaterThan(None)));

        let c = compile(Condition::value("arg_id", Operator::LessThan, "13"));
        assert!(matches!(c.predicate(), Predicate::LessThan(Some(b)) if *b == 13.0));
    }

    #[test]
    fn test_compile_rejects_empty_set() {
        let err = CompiledCondition::compile(&Condition::set(
            "http_content_type",
            Operator::In,
            Vec::<String>::new(),
        ))
        .unwrap_err();
        assert!(matches!(err, ConditionError::InvalidOperand { op: Operator::In, .. }));

        let raw = Condition {
            subject: "http_content_type".into(),
            op: Operator::NotIn,
            value: None,
            set: None,
        };
        assert!(matches!(
            CompiledCondition::compile(&raw),
            Err(ConditionError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_compile_rejects_shape_mismatch() {
        let scalar_with_set = Condition::set("http_x_foo", Operator::Equal, ["bar"]);
        assert!(matches!(
            CompiledCondition::compile(&scalar_with_set),
            Err(ConditionError::InvalidOperand { .. })
        ));

        let set_with_value = Condition::value("http_x_foo", Operator::In, "bar");
        assert!(matches!(
            CompiledCondition::compile(&set_with_value),
            Err(ConditionError::InvalidOperand { .. })
        ));

        let missing_value = Condition {
            subject: "arg_id".into(),
            op: Operator::LessThan,
            value: None,
            set: None,
        };
        assert!(matches!(
            CompiledCondition::compile(&missing_value),
            Err(ConditionError::InvalidOperand { .. })
        ));

        let pattern_with_set = Condition::set("uri", Operator::RegexMatch, ["^/"]);
        assert!(matches!(
            CompiledCondition::compile(&pattern_with_set),
            Err(ConditionError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_compile_rejects_invalid_pattern() {
        let err = CompiledCondition::compile(&Condition::value(
            "http_x_real_uri",
            Operator::RegexMatchCaseInsensitive,
            "^/ip/(0\\d{2}",
        ))
        .unwrap_err();
        assert!(matches!(err, ConditionError::InvalidPattern { ref pattern, .. } if pattern == "^/ip/(0\\d{2}"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_compile_rejects_empty_subject() {
        let err = CompiledCondition::compile(&Condition::value("", Operator::Equal, "x")).unwrap_err();
        assert!(matches!(err, ConditionError::InvalidSubject(_)));
    }

    #[test]
    fn test_evaluate_against_request() {
        let method = Method::GET;
        let uri: Uri = "/ip".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-real-uri", "/IP/098/v4".parse().unwrap());
        let ctx = RequestContext::new(&method, &uri, &headers);

        let pattern = r"^/ip/0\d{2}/.*$";
        let ci = compile(Condition::value("http_x_real_uri", Operator::RegexMatchCaseInsensitive, pattern));
        let cs = compile(Condition::value("http_x_real_uri", Operator::RegexMatch, pattern));
        let not_cs = compile(Condition::value("http_x_real_uri", Operator::RegexNotMatch, pattern));

        assert!(ci.evaluate(&ctx));
        assert!(!cs.evaluate(&ctx));
        assert!(not_cs.evaluate(&ctx));
    }

    #[test]
    fn test_condition_yaml_shape() {
        let raw: Condition = serde_yml::from_str(
            "subject: http_content_type\nop: In\nset:\n  - text/plain\n  - text/html\n",
        )
        .unwrap();
        assert_eq!(
            raw,
            Condition::set("http_content_type", Operator::In, ["text/plain", "text/html"])
        );
    }
}
