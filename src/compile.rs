use std::collections::HashSet;

use crate::parse::{ExpressionParser, ParsedConfig, ParsedRule, ParsedText};
use crate::types::{
    Branch, Clause, ClauseRole, CompileError, DebugRules, ForEach, Rule, RuleConfig, RuleSet,
    DEFAULT_EACH_NAME, DEFAULT_SEPARATOR,
};

pub(crate) fn compile_rules(
    parser: &ExpressionParser,
    rules: &[ParsedRule],
) -> Result<RuleSet, CompileError> {
    let rules = rules
        .iter()
        .enumerate()
        .map(|(i, rule)| compile_rule(parser, rule, &rule_label(rule, i)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RuleSet { rules })
}

pub(crate) fn compile_config(
    parser: &ExpressionParser,
    config: &ParsedConfig,
) -> Result<RuleConfig, CompileError> {
    let mut declared = HashSet::new();
    compile_config_level(parser, config, &mut declared)
}

/// Temps accumulate across nested levels in application order, so
/// `declared` carries every name seen so far.
fn compile_config_level(
    parser: &ExpressionParser,
    config: &ParsedConfig,
    declared: &mut HashSet<String>,
) -> Result<RuleConfig, CompileError> {
    let debug_rules = match &config.debug_rules {
        Some(text) => text.parse::<DebugRules>()?,
        None => DebugRules::default(),
    };
    let temps = check_temps(config.temps.as_deref().unwrap_or_default(), declared)?;
    let rules = compile_rules(parser, &config.rules)?;
    let configs = config
        .configs
        .iter()
        .map(|nested| compile_config_level(parser, nested, declared))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RuleConfig {
        debug_rules,
        temps,
        rules,
        configs,
    })
}

fn check_temps(names: &str, declared: &mut HashSet<String>) -> Result<Vec<String>, CompileError> {
    let mut temps = Vec::new();
    for name in names.split_whitespace() {
        if name.contains('.') {
            return Err(CompileError::InvalidTemp {
                name: name.to_owned(),
            });
        }
        if !declared.insert(name.to_owned()) {
            return Err(CompileError::DuplicateTemp {
                name: name.to_owned(),
            });
        }
        temps.push(name.to_owned());
    }
    Ok(temps)
}

fn rule_label(rule: &ParsedRule, index: usize) -> String {
    match &rule.description {
        Some(description) => description.clone(),
        None => format!("#{index}"),
    }
}

fn compile_rule(
    parser: &ExpressionParser,
    rule: &ParsedRule,
    label: &str,
) -> Result<Rule, CompileError> {
    let for_each = match &rule.for_each {
        Some(each) => {
            let separator = each.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR);
            if separator.is_empty() {
                return Err(CompileError::EmptySeparator {
                    rule: label.to_owned(),
                });
            }
            Some(
                ForEach::new(&each.source)
                    .with_separator(separator)
                    .with_name(each.name.as_deref().unwrap_or(DEFAULT_EACH_NAME)),
            )
        }
        None => None,
    };
    let condition = present(rule.condition.as_ref())
        .map(|text| Clause::parse(parser, text, ClauseRole::Condition, &format!("{label} if")));
    let then_branch = compile_branch(
        parser,
        label,
        "then",
        rule.then_text.as_ref(),
        rule.then_rules.as_deref(),
    )?;
    let else_branch = compile_branch(
        parser,
        label,
        "else",
        rule.else_text.as_ref(),
        rule.else_rules.as_deref(),
    )?;
    Ok(Rule {
        description: rule.description.clone(),
        for_each,
        condition,
        then_branch,
        else_branch,
    })
}

/// Empty text counts as absent.
fn present(text: Option<&ParsedText>) -> Option<&ParsedText> {
    text.filter(|t| !t.text.is_empty())
}

fn compile_branch(
    parser: &ExpressionParser,
    label: &str,
    branch: &'static str,
    text: Option<&ParsedText>,
    rules: Option<&[ParsedRule]>,
) -> Result<Branch, CompileError> {
    match (present(text), rules) {
        (Some(_), Some(_)) => Err(CompileError::ConflictingBranch {
            rule: label.to_owned(),
            branch,
        }),
        (Some(text), None) => Ok(Branch::Assign(Clause::parse(
            parser,
            text,
            ClauseRole::Assignment,
            &format!("{label} {branch}"),
        ))),
        (None, Some(rules)) => Ok(Branch::Rules(compile_rules(parser, rules)?)),
        (None, None) => Ok(Branch::None),
    }
}
