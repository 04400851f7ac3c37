mod compile;
mod error;
mod evaluate;
pub mod parse;
#[cfg(feature = "binary-cache")]
pub mod serial;
mod types;

pub use error::RulexprError;
pub use parse::{parse_expression, parse_rules, ExpressionParser, ParseError};
#[cfg(feature = "binary-cache")]
pub use serial::{DeserializeError, SerializeError};
pub use types::{
    as_bool, bool_str, failure_mode, field, report_failure, set_failure_mode, values_equal,
    Branch, Clause, CompareOp, Comparison, CompileError, Context, DebugRules, Expr, FailureMode,
    FieldExpr, FieldRegistry, FieldType, Fields, ForEach, ForEachMap, HashString, LogLevel,
    LogValue, NamedFields, Resolvable, Rule, RuleBuilder, RuleConfig, RuleConfigBuilder,
    RuleError, RuleSet, RuleSetBuilder, UnknownFailureMode, Value, ValueKind, Vocabulary,
};
