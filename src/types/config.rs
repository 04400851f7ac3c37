use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::error;

use crate::parse::{ExpressionParser, ParsedConfig};

use super::error::{CompileError, RuleError};
use super::expr::ForEachMap;
use super::failure::guarded;
use super::log_value::LogValue;
use super::resolvable::{bool_str, Resolvable};
use super::ruleset::{RuleBuilder, RuleSet, RuleSetBuilder};

/// Whether a configuration traces rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugRules {
    #[default]
    Off,
    On,
    /// Use the enclosing configuration's setting; `Off` at the top level.
    Parent,
}

impl DebugRules {
    fn resolve(self, parent: bool) -> bool {
        match self {
            DebugRules::Off => false,
            DebugRules::On => true,
            DebugRules::Parent => parent,
        }
    }
}

impl fmt::Display for DebugRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DebugRules::Off => bool_str(false),
            DebugRules::On => bool_str(true),
            DebugRules::Parent => "parent",
        })
    }
}

impl FromStr for DebugRules {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "false" => Ok(DebugRules::Off),
            "true" => Ok(DebugRules::On),
            "parent" => Ok(DebugRules::Parent),
            other => Err(CompileError::InvalidDebugRules {
                value: other.to_owned(),
            }),
        }
    }
}

/// A rule set with its tracing switch, temp declarations and nested
/// configurations.
///
/// Applying a configuration wraps the value in a [`LogValue`], declares the
/// temps, applies the rules and then every nested configuration in order.
/// Nested configurations share the wrapper and add their own temps to it.
#[derive(Debug, Clone, Default)]
pub struct RuleConfig {
    pub(crate) debug_rules: DebugRules,
    pub(crate) temps: Vec<String>,
    pub(crate) rules: RuleSet,
    pub(crate) configs: Vec<RuleConfig>,
}

impl RuleConfig {
    #[must_use]
    pub fn builder() -> RuleConfigBuilder {
        RuleConfigBuilder::new()
    }

    /// Parse rule source text and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RulexprError`](crate::RulexprError) on parse or compile
    /// failure.
    pub fn from_dsl(input: &str) -> Result<Self, crate::RulexprError> {
        Self::from_dsl_with_parser(input, &ExpressionParser::shared())
    }

    /// Like [`from_dsl()`](Self::from_dsl) with a custom expression parser.
    ///
    /// # Errors
    ///
    /// Returns [`RulexprError`](crate::RulexprError) on parse or compile
    /// failure.
    pub fn from_dsl_with_parser(
        input: &str,
        parser: &ExpressionParser,
    ) -> Result<Self, crate::RulexprError> {
        let parsed = crate::parse::parse_rules(input)?;
        Ok(crate::compile::compile_config(parser, &parsed)?)
    }

    #[must_use]
    pub fn debug_rules(&self) -> DebugRules {
        self.debug_rules
    }

    #[must_use]
    pub fn temps(&self) -> &[String] {
        &self.temps
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    #[must_use]
    pub fn configs(&self) -> &[RuleConfig] {
        &self.configs
    }

    /// Apply the configuration to `value`. Returns `true` only if every rule
    /// at every level returned `true`.
    pub fn apply(&self, value: &mut dyn Resolvable) -> bool {
        match self.apply_checked(value) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "rule config not applied");
                false
            }
        }
    }

    /// Like [`apply()`](Self::apply), but reports temp declaration problems
    /// and fatal failures as errors.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] if a temp cannot be declared or a fatal condition
    /// was raised while the rules ran.
    pub fn try_apply(&self, value: &mut dyn Resolvable) -> Result<bool, RuleError> {
        guarded(|| self.apply_checked(value))?
    }

    fn apply_checked(&self, value: &mut dyn Resolvable) -> Result<bool, RuleError> {
        let debug = self.debug_rules.resolve(false);
        let mut log = LogValue::new(value);
        log.set_debug_rules(debug);
        log.initialize_temps(&self.temps)?;
        self.apply_with_log(&mut log, &ForEachMap::new(), debug)
    }

    fn apply_with_log(
        &self,
        log: &mut LogValue<'_>,
        each: &ForEachMap,
        debug: bool,
    ) -> Result<bool, RuleError> {
        let mut result = self.rules.apply_with_log(log, each);
        for nested in &self.configs {
            let nested_debug = nested.debug_rules.resolve(debug);
            log.set_debug_rules(nested_debug);
            log.add_temps(&nested.temps)?;
            result &= nested.apply_with_log(log, each, nested_debug)?;
        }
        Ok(result)
    }

    /// The source tree this configuration was built from.
    #[must_use]
    pub fn to_source(&self) -> ParsedConfig {
        ParsedConfig {
            debug_rules: Some(self.debug_rules.to_string()),
            temps: (!self.temps.is_empty()).then(|| self.temps.join(" ")),
            rules: self.rules.to_source(),
            configs: self.configs.iter().map(RuleConfig::to_source).collect(),
        }
    }
}

#[cfg(feature = "binary-cache")]
impl RuleConfig {
    /// Serialize this configuration to a byte vector.
    ///
    /// The optional `source_text` is hashed (BLAKE3) and embedded in the
    /// payload metadata so callers can tell when the cache is stale.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) if encoding fails.
    pub fn to_binary(
        &self,
        source_text: Option<&str>,
    ) -> Result<Vec<u8>, crate::serial::SerializeError> {
        crate::serial::encode(self, source_text)
    }

    /// Deserialize and rebuild a configuration produced by
    /// [`to_binary()`](Self::to_binary).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) if the
    /// bytes are corrupt, from another format version, or fail validation.
    pub fn from_binary(bytes: &[u8]) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// Like [`from_binary()`](Self::from_binary) with a custom expression
    /// parser, for configurations that use registered operators.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) if the
    /// bytes are corrupt, from another format version, or fail validation.
    pub fn from_binary_with_parser(
        bytes: &[u8],
        parser: &ExpressionParser,
    ) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode_with(bytes, parser)
    }

    /// The BLAKE3 digest of the source text recorded by
    /// [`to_binary()`](Self::to_binary), if any.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) if the
    /// bytes cannot be decoded.
    pub fn binary_source_digest(
        bytes: &[u8],
    ) -> Result<Option<[u8; 32]>, crate::serial::DeserializeError> {
        crate::serial::source_digest(bytes)
    }
}

/// Builder for a [`RuleConfig`].
#[derive(Debug, Default)]
pub struct RuleConfigBuilder {
    parser: Option<Arc<ExpressionParser>>,
    config: ParsedConfig,
}

impl RuleConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<ExpressionParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    #[must_use]
    pub fn debug_rules(mut self, debug: DebugRules) -> Self {
        self.config.debug_rules = Some(debug.to_string());
        self
    }

    /// Declare temps, separated by spaces.
    #[must_use]
    pub fn temps(mut self, names: &str) -> Self {
        self.config.temps = Some(names.to_owned());
        self
    }

    #[must_use]
    pub fn rule(mut self, f: impl FnOnce(RuleBuilder) -> RuleBuilder) -> Self {
        let rules = RuleSetBuilder::new().rule(f).into_parsed();
        self.config.rules.extend(rules);
        self
    }

    /// Add a nested configuration, applied after this level's rules.
    #[must_use]
    pub fn config(mut self, f: impl FnOnce(RuleConfigBuilder) -> RuleConfigBuilder) -> Self {
        self.config.configs.push(f(RuleConfigBuilder::new()).config);
        self
    }

    /// # Errors
    ///
    /// Returns [`CompileError`] if a rule is structurally invalid, a temp is
    /// declared twice or contains `.`.
    pub fn build(self) -> Result<RuleConfig, CompileError> {
        let parser = self.parser.unwrap_or_else(ExpressionParser::shared);
        crate::compile::compile_config(&parser, &self.config)
    }
}
