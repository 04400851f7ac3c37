use thiserror::Error;

/// Structural problems found while building rules from source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("rule '{rule}' has both {branch} text and {branch}If rules")]
    ConflictingBranch { rule: String, branch: &'static str },

    #[error("duplicate temp '{name}'")]
    DuplicateTemp { name: String },

    #[error("temp name '{name}' must not contain '.'")]
    InvalidTemp { name: String },

    #[error("invalid debugRules value '{value}', expected true, false or parent")]
    InvalidDebugRules { value: String },

    #[error("rule '{rule}' has an empty forEach separator")]
    EmptySeparator { rule: String },
}

/// Errors raised while applying rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("fatal rule failure: {message}")]
    Fatal { message: String },

    #[error("duplicate temp '{name}'")]
    DuplicateTemp { name: String },

    #[error("temp name '{name}' must not contain '.'")]
    InvalidTemp { name: String },
}
