use winnow::ascii::till_line_ending;
use winnow::combinator::{alt, cut_err, fail, opt, repeat, separated};
use winnow::error::{ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use super::parser::{ParsedConfig, ParsedForEach, ParsedRule, ParsedText};

// -- Whitespace & comments --------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

// -- Keys & values ----------------------------------------------------------

fn key<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| c.is_ascii_alphabetic()).parse_next(input)
}

fn word<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

fn string_literal(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = any.parse_next(input)?;
        match ch {
            '"' => return Ok(s),
            '\\' => {
                let esc = any.parse_next(input)?;
                match esc {
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn expected(description: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(description))
}

/// `= "text"`
fn assigned_string(input: &mut &str) -> ModalResult<String> {
    ws.parse_next(input)?;
    cut_err('=').context(expected("=")).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(string_literal)
        .context(expected("string"))
        .parse_next(input)
}

/// `= word` or `= "text"`
fn assigned_word(input: &mut &str) -> ModalResult<String> {
    ws.parse_next(input)?;
    cut_err('=').context(expected("=")).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(alt((string_literal, word.map(str::to_owned))))
        .context(expected("value"))
        .parse_next(input)
}

fn attribute(input: &mut &str) -> ModalResult<(String, String)> {
    ws.parse_next(input)?;
    let name = key.parse_next(input)?;
    let value = assigned_string.parse_next(input)?;
    Ok((name.to_owned(), value))
}

/// `(name = "value", ...)`, each name drawn from `allowed`.
fn attributes(input: &mut &str, allowed: &[&str]) -> ModalResult<Vec<(String, String)>> {
    ws.parse_next(input)?;
    if opt('(').parse_next(input)?.is_none() {
        return Ok(Vec::new());
    }
    let start = input.checkpoint();
    let attrs: Vec<(String, String)> =
        cut_err(separated(0.., attribute, (ws, ','))).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(')').context(expected(")")).parse_next(input)?;
    let mut seen: Vec<&str> = Vec::new();
    for (name, _) in &attrs {
        if !allowed.contains(&name.as_str()) || seen.contains(&name.as_str()) {
            input.reset(&start);
            return reject(input, "attribute");
        }
        seen.push(name);
    }
    Ok(attrs)
}

fn attribute_value(attrs: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let pos = attrs.iter().position(|(n, _)| n == name)?;
    Some(attrs.remove(pos).1)
}

fn text_entry(input: &mut &str) -> ModalResult<ParsedText> {
    let mut attrs = attributes(input, &["space"])?;
    let text = assigned_string.parse_next(input)?;
    Ok(ParsedText {
        text,
        space: attribute_value(&mut attrs, "space"),
    })
}

fn for_each_entry(input: &mut &str) -> ModalResult<ParsedForEach> {
    let mut attrs = attributes(input, &["sep", "name"])?;
    let source = assigned_string.parse_next(input)?;
    Ok(ParsedForEach {
        source,
        separator: attribute_value(&mut attrs, "sep"),
        name: attribute_value(&mut attrs, "name"),
    })
}

fn nested_rules(input: &mut &str) -> ModalResult<Vec<ParsedRule>> {
    ws.parse_next(input)?;
    cut_err('{').context(expected("{")).parse_next(input)?;
    let mut rules = Vec::new();
    loop {
        ws.parse_next(input)?;
        if opt('}').parse_next(input)?.is_some() {
            return Ok(rules);
        }
        cut_err("rule")
            .context(expected("rule"))
            .parse_next(input)?;
        rules.push(rule_body.parse_next(input)?);
    }
}

/// Fail without backtracking, labelled with what was rejected.
fn reject<O>(input: &mut &str, label: &'static str) -> ModalResult<O> {
    cut_err(fail.context(StrContext::Label(label))).parse_next(input)
}

// -- Rules ------------------------------------------------------------------

/// Everything after the `rule` keyword: `{ entries }`.
fn rule_body(input: &mut &str) -> ModalResult<ParsedRule> {
    ws.parse_next(input)?;
    cut_err('{').context(expected("{")).parse_next(input)?;
    let mut rule = ParsedRule::default();
    loop {
        ws.parse_next(input)?;
        if opt('}').parse_next(input)?.is_some() {
            return Ok(rule);
        }
        let checkpoint = input.checkpoint();
        let name = cut_err(key)
            .context(StrContext::Label("rule entry"))
            .parse_next(input)?;
        let fresh = match name {
            "description" => {
                let value = assigned_string.parse_next(input)?;
                rule.description.replace(value).is_none()
            }
            "forEach" => {
                let value = for_each_entry(input)?;
                rule.for_each.replace(value).is_none()
            }
            "if" => {
                let value = text_entry(input)?;
                rule.condition.replace(value).is_none()
            }
            "then" => {
                let value = text_entry(input)?;
                rule.then_text.replace(value).is_none()
            }
            "else" => {
                let value = text_entry(input)?;
                rule.else_text.replace(value).is_none()
            }
            "thenIf" => {
                let value = nested_rules(input)?;
                rule.then_rules.replace(value).is_none()
            }
            "elseIf" => {
                let value = nested_rules(input)?;
                rule.else_rules.replace(value).is_none()
            }
            _ => {
                input.reset(&checkpoint);
                return reject(input, "rule entry");
            }
        };
        if !fresh {
            input.reset(&checkpoint);
            return reject(input, "duplicate key");
        }
    }
}

// -- Configurations ---------------------------------------------------------

fn config_entries(input: &mut &str, nested: bool) -> ModalResult<ParsedConfig> {
    let mut config = ParsedConfig::default();
    loop {
        ws.parse_next(input)?;
        if nested {
            if opt('}').parse_next(input)?.is_some() {
                return Ok(config);
            }
        } else if input.is_empty() {
            return Ok(config);
        }
        let checkpoint = input.checkpoint();
        let name = cut_err(key)
            .context(StrContext::Label("config entry"))
            .parse_next(input)?;
        let fresh = match name {
            "debugRules" => {
                let value = assigned_word.parse_next(input)?;
                config.debug_rules.replace(value).is_none()
            }
            "temps" => {
                let value = assigned_string.parse_next(input)?;
                config.temps.replace(value).is_none()
            }
            "rule" => {
                config.rules.push(rule_body.parse_next(input)?);
                true
            }
            "config" => {
                ws.parse_next(input)?;
                cut_err('{').context(expected("{")).parse_next(input)?;
                config.configs.push(config_entries(input, true)?);
                true
            }
            _ => {
                input.reset(&checkpoint);
                return reject(input, "config entry");
            }
        };
        if !fresh {
            input.reset(&checkpoint);
            return reject(input, "duplicate key");
        }
    }
}

// -- Top-level parser -------------------------------------------------------

pub fn parse_config(input: &mut &str) -> ModalResult<ParsedConfig> {
    config_entries(input, false)
}
