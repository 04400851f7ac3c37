use std::sync::Arc;

use crate::parse::{ExpressionParser, ParsedRule, ParsedText};

use super::error::{CompileError, RuleError};
use super::expr::ForEachMap;
use super::failure::guarded;
use super::log_value::LogValue;
use super::resolvable::Resolvable;
use super::rule::{ForEach, Rule};

/// Builder for constructing a [`RuleSet`].
///
/// Rules are defined via closures. Expression text is parsed once, in
/// [`build()`](Self::build).
///
/// # Example
///
/// ```
/// use rulexpr::{Context, RuleSetBuilder};
///
/// let rules = RuleSetBuilder::new()
///     .rule(|r| r.when("x==1").then("y=2").otherwise("y=3"))
///     .build()
///     .unwrap();
///
/// let mut ctx = Context::new().set("x", "1");
/// assert!(rules.apply(&mut ctx));
/// assert_eq!(ctx.get("y").unwrap().to_string(), "2");
/// ```
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    parser: Option<Arc<ExpressionParser>>,
    rules: Vec<ParsedRule>,
}

/// Intermediate builder passed to the rule definition closure.
#[derive(Debug, Default)]
pub struct RuleBuilder {
    rule: ParsedRule,
}

impl RuleSetBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse expressions with `parser` instead of the shared default one.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<ExpressionParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Define a rule.
    #[must_use]
    pub fn rule(mut self, f: impl FnOnce(RuleBuilder) -> RuleBuilder) -> Self {
        self.rules.push(f(RuleBuilder::default()).rule);
        self
    }

    /// Parse every expression and build the immutable `RuleSet`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if a rule is structurally invalid. Expression
    /// text that fails to parse is not an error here: it is logged and the
    /// affected clause fails whenever it runs.
    pub fn build(self) -> Result<RuleSet, CompileError> {
        let parser = self.parser.unwrap_or_else(ExpressionParser::shared);
        crate::compile::compile_rules(&parser, &self.rules)
    }

    pub(crate) fn into_parsed(self) -> Vec<ParsedRule> {
        self.rules
    }
}

impl RuleBuilder {
    #[must_use]
    pub fn description(mut self, text: &str) -> Self {
        self.rule.description = Some(text.to_owned());
        self
    }

    /// Apply the rule once per element of `for_each`.
    #[must_use]
    pub fn for_each(mut self, for_each: ForEach) -> Self {
        self.rule.for_each = Some(for_each.to_source());
        self
    }

    /// Set the condition expression for this rule.
    #[must_use]
    pub fn when(self, condition: &str) -> Self {
        self.when_spaced(condition, None)
    }

    /// Set the condition, with `space` standing for a literal space in operands.
    #[must_use]
    pub fn when_spaced(mut self, condition: &str, space: Option<&str>) -> Self {
        self.rule.condition = Some(text(condition, space));
        self
    }

    /// Assignments to perform when the condition holds.
    #[must_use]
    pub fn then(self, assignments: &str) -> Self {
        self.then_spaced(assignments, None)
    }

    #[must_use]
    pub fn then_spaced(mut self, assignments: &str, space: Option<&str>) -> Self {
        self.rule.then_text = Some(text(assignments, space));
        self
    }

    /// Nested rules to apply when the condition holds.
    #[must_use]
    pub fn then_if(mut self, f: impl FnOnce(RuleSetBuilder) -> RuleSetBuilder) -> Self {
        self.rule.then_rules = Some(f(RuleSetBuilder::new()).into_parsed());
        self
    }

    /// Assignments to perform when the condition does not hold.
    #[must_use]
    pub fn otherwise(self, assignments: &str) -> Self {
        self.otherwise_spaced(assignments, None)
    }

    #[must_use]
    pub fn otherwise_spaced(mut self, assignments: &str, space: Option<&str>) -> Self {
        self.rule.else_text = Some(text(assignments, space));
        self
    }

    /// Nested rules to apply when the condition does not hold.
    #[must_use]
    pub fn otherwise_if(mut self, f: impl FnOnce(RuleSetBuilder) -> RuleSetBuilder) -> Self {
        self.rule.else_rules = Some(f(RuleSetBuilder::new()).into_parsed());
        self
    }
}

fn text(text: &str, space: Option<&str>) -> ParsedText {
    ParsedText {
        text: text.to_owned(),
        space: space.map(str::to_owned),
    }
}

/// An ordered, immutable list of rules. Thread-safe and designed to live
/// behind `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub(crate) rules: Vec<Rule>,
}

impl RuleSet {
    /// Apply every rule in order. All rules run; the result is `true` only if
    /// each of them returned `true`.
    pub fn apply(&self, value: &mut dyn Resolvable) -> bool {
        let mut log = LogValue::new(value);
        self.apply_with_log(&mut log, &ForEachMap::new())
    }

    /// Like [`apply()`](Self::apply), but surfaces a fatal failure as an error.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Fatal`] if a fatal condition was raised while the
    /// rules ran. Every rule has still been applied.
    pub fn try_apply(&self, value: &mut dyn Resolvable) -> Result<bool, RuleError> {
        guarded(|| self.apply(value))
    }

    pub fn apply_with_log(&self, log: &mut LogValue<'_>, each: &ForEachMap) -> bool {
        let mut result = true;
        for rule in &self.rules {
            if !rule.apply_with_log(log, each) {
                result = false;
            }
        }
        result
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// The source tree of every rule, in order.
    #[must_use]
    pub fn to_source(&self) -> Vec<ParsedRule> {
        self.rules.iter().map(Rule::to_source).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompareOp, Context, Expr, Value};

    #[test]
    fn then_and_else() {
        let rules = RuleSetBuilder::new()
            .rule(|r| r.when("x==1").then("y=2").otherwise("y=3"))
            .build()
            .unwrap();
        let mut ctx = Context::new().set("x", 1_i64).set("y", 0_i64);
        assert!(rules.apply(&mut ctx));
        assert_eq!(ctx.get("y"), Some(&Value::Int(2)));

        let mut ctx = Context::new().set("x", 0_i64).set("y", 0_i64);
        assert!(rules.apply(&mut ctx));
        assert_eq!(ctx.get("y"), Some(&Value::Int(3)));
    }

    #[test]
    fn all_rules_run_even_after_failure() {
        let rules = RuleSetBuilder::new()
            .rule(|r| r.when("(x==1").then("a=1"))
            .rule(|r| r.then("b=1"))
            .build()
            .unwrap();
        let mut ctx = Context::new();
        assert!(!rules.apply(&mut ctx));
        assert_eq!(ctx.get("b"), Some(&Value::String("1".into())));
        assert_eq!(ctx.get("a"), None);
    }

    #[test]
    fn conflicting_branch_is_rejected() {
        let err = RuleSetBuilder::new()
            .rule(|r| r.description("both").then("a=1").then_if(|n| n.rule(|r| r.then("b=1"))))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::ConflictingBranch {
                rule: "both".into(),
                branch: "then"
            }
        );
    }

    #[test]
    fn custom_parser_is_used() {
        let mut parser = ExpressionParser::new();
        parser.register_operator("<>", |lhs, rhs| Expr::compare(CompareOp::Neq, lhs, rhs));
        let rules = RuleSetBuilder::new()
            .with_parser(Arc::new(parser))
            .rule(|r| r.when("x<>1").then("y=2"))
            .build()
            .unwrap();
        let mut ctx = Context::new().set("x", "5");
        assert!(rules.apply(&mut ctx));
        assert_eq!(ctx.get("y"), Some(&Value::String("2".into())));
    }

    #[test]
    fn builder_for_each_omits_defaults() {
        let built = RuleSetBuilder::new()
            .rule(|r| r.for_each(ForEach::new("A,B")).then("each.x=1"))
            .rule(|r| {
                r.for_each(ForEach::new("A;B").with_separator(";").with_name("LEG"))
                    .then("LEG.x=1")
            })
            .into_parsed();
        let parsed = crate::parse_rules(
            r#"
rule {
    forEach = "A,B"
    then = "each.x=1"
}
rule {
    forEach(sep = ";", name = "LEG") = "A;B"
    then = "LEG.x=1"
}
"#,
        )
        .unwrap();
        assert_eq!(built, parsed.rules);
        assert_eq!(built[0].for_each.as_ref().unwrap().separator, None);
        assert_eq!(built[0].for_each.as_ref().unwrap().name, None);
    }

    #[test]
    fn len_and_iter() {
        let rules = RuleSetBuilder::new()
            .rule(|r| r.then("a=1"))
            .rule(|r| r.then("b=1"))
            .build()
            .unwrap();
        assert_eq!(rules.len(), 2);
        assert!(!rules.is_empty());
        assert_eq!(rules.iter().count(), 2);
        assert!(RuleSet::default().is_empty());
    }
}
