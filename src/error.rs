use thiserror::Error;

use crate::parse::ParseError;
use crate::{CompileError, RuleError};

/// Unified error type covering parsing, compilation and rule application.
///
/// Returned by convenience methods like
/// [`RuleConfig::from_dsl()`](crate::RuleConfig::from_dsl).
#[derive(Debug, Error)]
pub enum RulexprError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}
