use super::ConditionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison applied to a resolved request variable.
///
/// The serialized names are the tokens accepted in route configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    In,
    NotIn,
    RegexMatch,
    RegexNotMatch,
    RegexMatchCaseInsensitive,
    RegexNotMatchCaseInsensitive,
}

/// Shape of the operand an operator expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Scalar,
    Set,
    Pattern,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::In,
        Operator::NotIn,
        Operator::RegexMatch,
        Operator::RegexNotMatch,
        Operator::RegexMatchCaseInsensitive,
        Operator::RegexNotMatchCaseInsensitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "Equal",
            Operator::NotEqual => "NotEqual",
            Operator::GreaterThan => "GreaterThan",
            Operator::LessThan => "LessThan",
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::RegexMatch => "RegexMatch",
            Operator::RegexNotMatch => "RegexNotMatch",
            Operator::RegexMatchCaseInsensitive => "RegexMatchCaseInsensitive",
            Operator::RegexNotMatchCaseInsensitive => "RegexNotMatchCaseInsensitive",
        }
    }

    pub fn operand_kind(&self) -> OperandKind {
        match self {
            Operator::Equal | Operator::NotEqual | Operator::GreaterThan | Operator::LessThan => {
                OperandKind::Scalar
            }
            Operator::In | Operator::NotIn => OperandKind::Set,
            Operator::RegexMatch
            | Operator::RegexNotMatch
            | Operator::RegexMatchCaseInsensitive
            | Operator::RegexNotMatchCaseInsensitive => OperandKind::Pattern,
        }
    }

    /// Negated operators are satisfied when the variable is absent.
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            Operator::NotEqual
                | Operator::NotIn
                | Operator::RegexNotMatch
                | Operator::RegexNotMatchCaseInsensitive
        )
    }

    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            Operator::RegexMatchCaseInsensitive | Operator::RegexNotMatchCaseInsensitive
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| ConditionError::UnknownOperator(s.to_string()))
    }
}

/// An operator bound to its compiled operand.
///
/// The case-insensitive regex operators compile into `Matches` and
/// `NotMatches` with case folding baked into the regex.
#[derive(Debug, Clone)]
pub enum Predicate {
    Equal(String),
    NotEqual(String),
    /// `None` when the configured literal is not a number; never matches.
    GreaterThan(Option<f64>),
    LessThan(Option<f64>),
    In(Vec<String>),
    NotIn(Vec<String>),
    Matches(Regex),
    NotMatches(Regex),
}

impl Predicate {
    /// Apply the predicate to a resolved value, `None` meaning the
    /// variable is absent from the request.
    #[inline]
    pub fn test(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return self.is_negated();
        };

        match self {
            Predicate::Equal(expected) => value == expected,
            Predicate::NotEqual(expected) => value != expected,
            Predicate::GreaterThan(bound) => compare(value, *bound, |v, b| v > b),
            Predicate::LessThan(bound) => compare(value, *bound, |v, b| v < b),
            Predicate::In(set) => set.iter().any(|member| member == value),
            Predicate::NotIn(set) => !set.iter().any(|member| member == value),
            Predicate::Matches(re) => re.is_match(value),
            Predicate::NotMatches(re) => !re.is_match(value),
        }
    }

    fn is_negated(&self) -> bool {
        matches!(
            self,
            Predicate::NotEqual(_) | Predicate::NotIn(_) | Predicate::NotMatches(_)
        )
    }
}

#[inline]
fn compare(value: &str, bound: Option<f64>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (parse_number(value), bound) {
        (Some(v), Some(b)) => cmp(v, b),
        _ => false,
    }
}

/// Parse a decimal number, rejecting NaN and infinities.
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}
