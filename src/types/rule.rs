use tracing::{error, info, warn};

use crate::evaluate::substitute_placeholders;
use crate::parse::{ExpressionParser, ParseError, ParsedForEach, ParsedRule, ParsedText};

use super::error::RuleError;
use super::expr::{Expr, ForEachMap};
use super::failure::guarded;
use super::log_value::LogValue;
use super::resolvable::Resolvable;
use super::ruleset::RuleSet;

pub(crate) const DEFAULT_SEPARATOR: &str = ",";
pub(crate) const DEFAULT_EACH_NAME: &str = "each";

/// What a clause's expression must be able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClauseRole {
    Condition,
    Assignment,
}

impl ClauseRole {
    fn accepts(self, expr: &Expr) -> bool {
        match self {
            ClauseRole::Condition => expr.is_evaluable(),
            ClauseRole::Assignment => expr.is_assignment(),
        }
    }
}

/// Expression text together with its parse result.
///
/// Parsing happens once, when the rule is built. A clause that does not parse,
/// or parses to the wrong kind of expression, is reported then and fails every
/// time it runs.
#[derive(Debug, Clone)]
pub struct Clause {
    text: String,
    space: Option<String>,
    role: ClauseRole,
    parsed: Result<Expr, ParseError>,
}

impl Clause {
    pub(crate) fn parse(parser: &ExpressionParser, source: &ParsedText, role: ClauseRole, label: &str) -> Clause {
        let parsed = parser.parse_with_space(&source.text, source.space.as_deref());
        match &parsed {
            Err(e) => error!(
                clause = label,
                error = %ExpressionParser::format_error(&source.text, e),
                "rule clause does not parse"
            ),
            Ok(expr) if !role.accepts(expr) => {
                error!(clause = label, text = %source.text, "rule clause invalid");
            }
            Ok(_) => {}
        }
        Clause {
            text: source.text.clone(),
            space: source.space.clone(),
            role,
            parsed,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn space(&self) -> Option<&str> {
        self.space.as_deref()
    }

    /// The parsed expression if it parsed and suits its role.
    #[must_use]
    pub fn expr(&self) -> Option<&Expr> {
        self.parsed.as_ref().ok().filter(|e| self.role.accepts(e))
    }

    #[must_use]
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parsed.as_ref().err()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.expr().is_some()
    }

    fn to_source(&self) -> ParsedText {
        ParsedText {
            text: self.text.clone(),
            space: self.space.clone(),
        }
    }
}

/// Iterate a rule once per list element with `name` bound to the element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForEach {
    source: String,
    separator: String,
    name: String,
}

impl ForEach {
    /// A comma separated list bound to `each`.
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_owned(),
            separator: DEFAULT_SEPARATOR.to_owned(),
            name: DEFAULT_EACH_NAME.to_owned(),
        }
    }

    #[must_use]
    pub fn with_separator(mut self, separator: &str) -> Self {
        separator.clone_into(&mut self.separator);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        name.clone_into(&mut self.name);
        self
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The trimmed, non-empty elements of the source list.
    #[must_use]
    pub fn items(&self) -> Vec<String> {
        self.source
            .split(self.separator.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub(crate) fn to_source(&self) -> ParsedForEach {
        ParsedForEach {
            source: self.source.clone(),
            separator: (self.separator != DEFAULT_SEPARATOR).then(|| self.separator.clone()),
            name: (self.name != DEFAULT_EACH_NAME).then(|| self.name.clone()),
        }
    }
}

/// The then or else side of a rule: nothing, an assignment expression, or a
/// nested rule set.
#[derive(Debug, Clone, Default)]
pub enum Branch {
    #[default]
    None,
    Assign(Clause),
    Rules(RuleSet),
}

/// A rule: optional for-each, optional condition, then and else branches.
///
/// Rules are built with [`RuleSetBuilder`](super::RuleSetBuilder) or parsed
/// from source with [`RuleConfig::from_dsl()`](super::RuleConfig::from_dsl).
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) description: Option<String>,
    pub(crate) for_each: Option<ForEach>,
    pub(crate) condition: Option<Clause>,
    pub(crate) then_branch: Branch,
    pub(crate) else_branch: Branch,
}

impl Rule {
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn for_each(&self) -> Option<&ForEach> {
        self.for_each.as_ref()
    }

    #[must_use]
    pub fn condition(&self) -> Option<&Clause> {
        self.condition.as_ref()
    }

    #[must_use]
    pub fn then_branch(&self) -> &Branch {
        &self.then_branch
    }

    #[must_use]
    pub fn else_branch(&self) -> &Branch {
        &self.else_branch
    }

    #[must_use]
    pub fn is_if_valid(&self) -> bool {
        self.condition.as_ref().map_or(true, Clause::is_valid)
    }

    #[must_use]
    pub fn is_then_valid(&self) -> bool {
        branch_valid(&self.then_branch)
    }

    #[must_use]
    pub fn is_else_valid(&self) -> bool {
        branch_valid(&self.else_branch)
    }

    /// Apply the rule to `value`.
    ///
    /// Returns `true` when the condition was valid and every assignment and
    /// nested rule that ran succeeded.
    pub fn apply(&self, value: &mut dyn Resolvable) -> bool {
        let mut log = LogValue::new(value);
        self.apply_with_log(&mut log, &ForEachMap::new())
    }

    /// Like [`apply()`](Self::apply), but surfaces a fatal failure as an error.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Fatal`] if a `logfatal` message was written or a
    /// failure was reported while the failure mode is `fatal`.
    pub fn try_apply(&self, value: &mut dyn Resolvable) -> Result<bool, RuleError> {
        guarded(|| self.apply(value))
    }

    /// Apply through an existing [`LogValue`] with placeholders already bound.
    pub fn apply_with_log(&self, log: &mut LogValue<'_>, each: &ForEachMap) -> bool {
        let Some(for_each) = &self.for_each else {
            return self.apply_bound(log, each);
        };
        if each.contains_key(for_each.name()) {
            error!(
                name = for_each.name(),
                "cannot process nested forEach lists with the same name"
            );
            return false;
        }
        self.apply_items(&for_each.items(), log, each, &mut Vec::new())
    }

    /// `expanding` holds the `@` list references currently being expanded.
    fn apply_items(
        &self,
        items: &[String],
        log: &mut LogValue<'_>,
        each: &ForEachMap,
        expanding: &mut Vec<String>,
    ) -> bool {
        let mut result = true;
        for item in items {
            if !self.apply_item(item, log, each, expanding) {
                result = false;
            }
        }
        result
    }

    fn apply_item(
        &self,
        item: &str,
        log: &mut LogValue<'_>,
        each: &ForEachMap,
        expanding: &mut Vec<String>,
    ) -> bool {
        if let Some(reference) = item.strip_prefix('@') {
            if expanding.iter().any(|active| active == reference) {
                error!(list = reference, "forEach list refers back to itself");
                return false;
            }
            let list = log.list_value_of_lhs(reference);
            expanding.push(reference.to_owned());
            let result = self.apply_items(&list, log, each, expanding);
            expanding.pop();
            return result;
        }
        let mut bound = each.clone();
        if let Some(for_each) = &self.for_each {
            bound.insert(for_each.name().to_owned(), item.to_owned());
        }
        self.apply_bound(log, &bound)
    }

    fn apply_bound(&self, log: &mut LogValue<'_>, each: &ForEachMap) -> bool {
        let Some(condition) = &self.condition else {
            return run_branch("then", &self.then_branch, log, each);
        };
        let Some(expr) = condition.expr() else {
            if log.debug_rules() {
                error!(expr = %substitute_placeholders(condition.text(), each), "rule invalid if");
            }
            return false;
        };
        if log.debug_rules() {
            info!(expr = %substitute_placeholders(condition.text(), each), "rule if");
        }
        if expr.evaluate_with(&*log, each) {
            run_branch("then", &self.then_branch, log, each)
        } else {
            run_branch("else", &self.else_branch, log, each)
        }
    }

    /// The source tree this rule was built from.
    #[must_use]
    pub fn to_source(&self) -> ParsedRule {
        let (then_text, then_rules) = branch_source(&self.then_branch);
        let (else_text, else_rules) = branch_source(&self.else_branch);
        ParsedRule {
            description: self.description.clone(),
            for_each: self.for_each.as_ref().map(ForEach::to_source),
            condition: self.condition.as_ref().map(Clause::to_source),
            then_text,
            then_rules,
            else_text,
            else_rules,
        }
    }
}

fn branch_valid(branch: &Branch) -> bool {
    match branch {
        Branch::Assign(clause) => clause.is_valid(),
        Branch::None | Branch::Rules(_) => true,
    }
}

fn branch_source(branch: &Branch) -> (Option<ParsedText>, Option<Vec<ParsedRule>>) {
    match branch {
        Branch::None => (None, None),
        Branch::Assign(clause) => (Some(clause.to_source()), None),
        Branch::Rules(rules) => (None, Some(rules.to_source())),
    }
}

fn run_branch(label: &'static str, branch: &Branch, log: &mut LogValue<'_>, each: &ForEachMap) -> bool {
    match branch {
        Branch::None => true,
        Branch::Rules(rules) => rules.apply_with_log(log, each),
        Branch::Assign(clause) => {
            let Some(expr) = clause.expr() else {
                if log.debug_rules() {
                    error!(branch = label, expr = %substitute_placeholders(clause.text(), each), "rule invalid branch");
                }
                return false;
            };
            if log.debug_rules() {
                info!(branch = label, expr = %substitute_placeholders(clause.text(), each), "rule branch");
            }
            log.clear_log_message();
            let result = expr.perform_assignments_with(log, each);
            if log.debug_rules() && !result {
                warn!(branch = label, "performAssignments failed");
            }
            log.write_log_message();
            result
        }
    }
}
