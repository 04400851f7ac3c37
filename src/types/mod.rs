mod config;
mod context;
mod error;
mod expr;
pub(crate) mod failure;
mod field_registry;
mod hash_string;
mod log_value;
mod resolvable;
mod rule;
mod ruleset;
mod value;

pub use config::{DebugRules, RuleConfig, RuleConfigBuilder};
pub use context::Context;
pub use error::{CompileError, RuleError};
pub use expr::{field, CompareOp, Comparison, Expr, FieldExpr, ForEachMap};
pub use failure::{failure_mode, report_failure, set_failure_mode, FailureMode, UnknownFailureMode};
pub use field_registry::{FieldRegistry, Fields, NamedFields, Vocabulary};
pub use hash_string::HashString;
pub use log_value::{LogLevel, LogValue};
pub use resolvable::{as_bool, bool_str, values_equal, Resolvable};
pub(crate) use rule::{ClauseRole, DEFAULT_EACH_NAME, DEFAULT_SEPARATOR};
pub use rule::{Branch, Clause, ForEach, Rule};
pub use ruleset::{RuleBuilder, RuleSet, RuleSetBuilder};
pub use value::{FieldType, Value, ValueKind};
