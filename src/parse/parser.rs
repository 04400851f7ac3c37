use std::fmt::Write;

/// Expression text plus the optional token that stands for a literal space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "binary-cache",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ParsedText {
    pub text: String,
    pub space: Option<String>,
}

impl ParsedText {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            space: None,
        }
    }
}

/// A `forEach(sep = ..., name = ...) = "..."` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "binary-cache",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ParsedForEach {
    pub source: String,
    pub separator: Option<String>,
    pub name: Option<String>,
}

/// One `rule { ... }` block, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "binary-cache",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ParsedRule {
    pub description: Option<String>,
    pub for_each: Option<ParsedForEach>,
    pub condition: Option<ParsedText>,
    pub then_text: Option<ParsedText>,
    pub then_rules: Option<Vec<ParsedRule>>,
    pub else_text: Option<ParsedText>,
    pub else_rules: Option<Vec<ParsedRule>>,
}

/// The result of parsing rule source text: one configuration level with its
/// rules and nested `config { ... }` blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "binary-cache",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ParsedConfig {
    pub debug_rules: Option<String>,
    pub temps: Option<String>,
    pub rules: Vec<ParsedRule>,
    pub configs: Vec<ParsedConfig>,
}

impl ParsedConfig {
    /// Render back to source text accepted by [`parse_rules`](super::parse_rules).
    #[must_use]
    pub fn to_dsl(&self) -> String {
        let mut out = String::new();
        write_config(&mut out, self, 0);
        out
    }
}

// -- Printer ----------------------------------------------------------------

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

fn quoted(text: &str) -> String {
    let mut s = String::with_capacity(text.len() + 2);
    s.push('"');
    for c in text.chars() {
        match c {
            '"' => s.push_str("\\\""),
            '\\' => s.push_str("\\\\"),
            '\n' => s.push_str("\\n"),
            '\t' => s.push_str("\\t"),
            c => s.push(c),
        }
    }
    s.push('"');
    s
}

fn write_config(out: &mut String, config: &ParsedConfig, depth: usize) {
    if let Some(debug) = &config.debug_rules {
        indent(out, depth);
        let _ = writeln!(out, "debugRules = {}", quoted(debug));
    }
    if let Some(temps) = &config.temps {
        indent(out, depth);
        let _ = writeln!(out, "temps = {}", quoted(temps));
    }
    for rule in &config.rules {
        write_rule(out, rule, depth);
    }
    for nested in &config.configs {
        indent(out, depth);
        out.push_str("config {\n");
        write_config(out, nested, depth + 1);
        indent(out, depth);
        out.push_str("}\n");
    }
}

fn write_rule(out: &mut String, rule: &ParsedRule, depth: usize) {
    indent(out, depth);
    out.push_str("rule {\n");
    let inner = depth + 1;
    if let Some(description) = &rule.description {
        indent(out, inner);
        let _ = writeln!(out, "description = {}", quoted(description));
    }
    if let Some(each) = &rule.for_each {
        indent(out, inner);
        out.push_str("forEach");
        let attrs: Vec<String> = [("sep", &each.separator), ("name", &each.name)]
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| format!("{key} = {}", quoted(v))))
            .collect();
        if !attrs.is_empty() {
            let _ = write!(out, "({})", attrs.join(", "));
        }
        let _ = writeln!(out, " = {}", quoted(&each.source));
    }
    write_text(out, "if", rule.condition.as_ref(), inner);
    write_text(out, "then", rule.then_text.as_ref(), inner);
    write_nested(out, "thenIf", rule.then_rules.as_deref(), inner);
    write_text(out, "else", rule.else_text.as_ref(), inner);
    write_nested(out, "elseIf", rule.else_rules.as_deref(), inner);
    indent(out, depth);
    out.push_str("}\n");
}

fn write_text(out: &mut String, key: &str, text: Option<&ParsedText>, depth: usize) {
    let Some(text) = text else { return };
    indent(out, depth);
    out.push_str(key);
    if let Some(space) = &text.space {
        let _ = write!(out, "(space = {})", quoted(space));
    }
    let _ = writeln!(out, " = {}", quoted(&text.text));
}

fn write_nested(out: &mut String, key: &str, rules: Option<&[ParsedRule]>, depth: usize) {
    let Some(rules) = rules else { return };
    indent(out, depth);
    let _ = writeln!(out, "{key} {{");
    for rule in rules {
        write_rule(out, rule, depth + 1);
    }
    indent(out, depth);
    out.push_str("}\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_nested_structure() {
        let config = ParsedConfig {
            debug_rules: Some("false".into()),
            temps: None,
            rules: vec![ParsedRule {
                condition: Some(ParsedText::new("x==1")),
                then_rules: Some(vec![ParsedRule {
                    then_text: Some(ParsedText::new("y=2")),
                    ..ParsedRule::default()
                }]),
                ..ParsedRule::default()
            }],
            configs: Vec::new(),
        };
        let expected = "debugRules = \"false\"\n\
                        rule {\n    if = \"x==1\"\n    thenIf {\n        rule {\n            then = \"y=2\"\n        }\n    }\n}\n";
        assert_eq!(config.to_dsl(), expected);
    }

    #[test]
    fn quotes_escape_specials() {
        assert_eq!(quoted("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }
}
