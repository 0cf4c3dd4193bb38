//! Route conditions over nginx-style request variables.
//!
//! A route carries a list of [`Condition`]s such as
//! `http_x_foo Equal bar` or `arg_id GreaterThan 13`. They are compiled
//! once when the configuration is loaded into a [`ConditionSet`], which
//! is then evaluated against every request that reaches the route.
//! Evaluation never fails: a missing or malformed request value simply
//! makes the condition true or false according to its operator.

mod condition;
mod operator;
mod request;
mod set;
mod subject;

pub use condition::{CompiledCondition, Condition};
pub use operator::{OperandKind, Operator, Predicate};
pub use request::{RequestContext, RequestView};
pub use set::ConditionSet;
pub use subject::{Builtin, Subject};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("Invalid operand for '{subject}' ({op}): {reason}")]
    InvalidOperand {
        subject: String,
        op: Operator,
        reason: String,
    },

    #[error("Invalid regex pattern for '{subject}': {pattern}")]
    InvalidPattern {
        subject: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid subject '{0}'")]
    InvalidSubject(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
}
