use std::borrow::Cow;

use regex::Regex;
use tracing::{debug, error};

use crate::types::failure::{failure_mode, report_failure};
use crate::types::{values_equal, CompareOp, Comparison, Expr, ForEachMap, HashString, Resolvable};

impl Expr {
    /// Evaluate the tree as a condition.
    ///
    /// Assignment leaves cannot be evaluated; they log an error and count as
    /// `false`.
    #[must_use]
    pub fn evaluate(&self, value: &dyn Resolvable) -> bool {
        self.evaluate_with(value, &ForEachMap::new())
    }

    /// Evaluate with for-each placeholders substituted into every operand.
    #[must_use]
    pub fn evaluate_with(&self, value: &dyn Resolvable, each: &ForEachMap) -> bool {
        match self {
            Expr::And(a, b) => a.evaluate_with(value, each) && b.evaluate_with(value, each),
            Expr::Or(a, b) => a.evaluate_with(value, each) || b.evaluate_with(value, each),
            Expr::Compare(c) => c.evaluate(value, each),
        }
    }

    /// Perform every assignment in the tree. Both sides of an `And` always
    /// run; the result is `true` only if all of them succeeded.
    pub fn perform_assignments(&self, value: &mut dyn Resolvable) -> bool {
        self.perform_assignments_with(value, &ForEachMap::new())
    }

    pub fn perform_assignments_with(&self, value: &mut dyn Resolvable, each: &ForEachMap) -> bool {
        match self {
            Expr::And(a, b) => {
                let first = a.perform_assignments_with(value, each);
                let second = b.perform_assignments_with(value, each);
                first && second
            }
            Expr::Or(_, _) => {
                error!(expr = %self, "performAssignments invalid expression");
                false
            }
            Expr::Compare(c) => c.perform(value, each),
        }
    }
}

impl Comparison {
    fn operands(&self, each: &ForEachMap) -> (Cow<'_, HashString>, Cow<'_, HashString>) {
        if each.is_empty() {
            return (Cow::Borrowed(&self.lhs), Cow::Borrowed(&self.rhs));
        }
        (substituted(&self.lhs, each), substituted(&self.rhs, each))
    }

    fn evaluate(&self, value: &dyn Resolvable, each: &ForEachMap) -> bool {
        if self.op.is_assignment() {
            error!(expr = %self, "evaluateExpression invalid expression");
            return false;
        }
        let (lhs, rhs) = self.operands(each);
        if self.op == CompareOp::Eq {
            if let Some(result) = value.handle_evaluate_equals(&lhs, &rhs) {
                return result;
            }
        }
        let lhs_value = value.value_of_lhs(&lhs);
        let rhs_value = value.value_of_rhs(&rhs);

        match self.op {
            CompareOp::Eq | CompareOp::Neq => {
                self.report_null(&lhs, &rhs, lhs_value.as_deref(), rhs_value.as_deref());
                let equal = values_equal(lhs_value.as_deref(), rhs_value.as_deref());
                (self.op == CompareOp::Eq) == equal
            }
            CompareOp::Matches | CompareOp::NotMatches => {
                self.report_null(&lhs, &rhs, lhs_value.as_deref(), rhs_value.as_deref());
                let matched = self.pattern_matches(
                    lhs_value.as_deref().unwrap_or_default(),
                    rhs_value.as_deref().unwrap_or_default(),
                );
                (self.op == CompareOp::Matches) == matched
            }
            op => compare_numeric(
                op,
                &lhs,
                &rhs,
                lhs_value.as_deref().unwrap_or_default(),
                rhs_value.as_deref().unwrap_or_default(),
            ),
        }
    }

    fn perform(&self, value: &mut dyn Resolvable, each: &ForEachMap) -> bool {
        let (lhs, rhs) = self.operands(each);
        match self.op {
            CompareOp::Assign => value.perform_assignment(&lhs, &rhs),
            CompareOp::Append => value.perform_append_assignment(&lhs, &rhs),
            _ => {
                error!(expr = %self, "performAssignments invalid expression");
                false
            }
        }
    }

    fn report_null(&self, lhs: &HashString, rhs: &HashString, l: Option<&str>, r: Option<&str>) {
        if failure_mode().is_ignore() || (l.is_some() && r.is_some()) {
            return;
        }
        report_failure(&format!(
            "evaluateExpression {lhs}{}{rhs} failed with lhs \"{}\" rhs \"{}\"",
            self.op,
            l.unwrap_or_default(),
            r.unwrap_or_default()
        ));
    }

    fn pattern_matches(&self, candidate: &str, pattern: &str) -> bool {
        if let Some(re) = &self.pattern {
            if pattern == self.rhs.as_str() {
                return re.is_match(candidate);
            }
        }
        anchored_regex(pattern).is_some_and(|re| re.is_match(candidate))
    }
}

fn substituted<'a>(text: &'a HashString, each: &ForEachMap) -> Cow<'a, HashString> {
    if each.keys().any(|name| text.contains(name)) {
        Cow::Owned(HashString::new(substitute_placeholders(text.as_str(), each)))
    } else {
        Cow::Borrowed(text)
    }
}

/// Replace every placeholder name with its value, in key order.
pub(crate) fn substitute_placeholders(text: &str, each: &ForEachMap) -> String {
    each.iter()
        .fold(text.to_owned(), |acc, (name, value)| acc.replace(name.as_str(), value))
}

/// Compile `pattern` so that it must match the whole candidate.
pub(crate) fn anchored_regex(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => Some(re),
        Err(e) => {
            debug!(pattern, error = %e, "invalid match pattern");
            None
        }
    }
}

fn compare_numeric(op: CompareOp, lhs: &HashString, rhs: &HashString, l: &str, r: &str) -> bool {
    if l.contains(' ') {
        error!(lhs = %lhs, value = l, "evaluateExpression LHS contains whitespace");
        return false;
    }
    if r.contains(' ') {
        error!(rhs = %rhs, value = r, "evaluateExpression RHS contains whitespace");
        return false;
    }
    let Some(left) = parse_fixed(l) else {
        error!(lhs = %lhs, value = l, "evaluateExpression LHS toInt failed");
        return false;
    };
    let Some(right) = parse_fixed(r) else {
        error!(rhs = %rhs, value = r, "evaluateExpression RHS toInt failed");
        return false;
    };
    let Some((a, b)) = align_scale(left, right) else {
        error!(lhs = %lhs, rhs = %rhs, "evaluateExpression scaling overflow");
        return false;
    };
    match op {
        CompareOp::Lt => a < b,
        CompareOp::Lte => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Gte => a >= b,
        _ => false,
    }
}

/// Parse an integer, or a decimal as `(digits, count of digits after the
/// point)`.
pub(crate) fn parse_fixed(text: &str) -> Option<(i64, u32)> {
    if let Ok(v) = text.parse::<i64>() {
        return Some((v, 0));
    }
    let pos = text.find('.')?;
    let (int_part, frac_part) = (&text[..pos], &text[pos + 1..]);
    let exponent = u32::try_from(frac_part.chars().count()).ok()?;
    let digits = format!("{int_part}{frac_part}");
    digits.parse::<i64>().ok().map(|v| (v, exponent))
}

/// Bring both operands to the larger implied decimal scale.
fn align_scale((a, a_exp): (i64, u32), (b, b_exp): (i64, u32)) -> Option<(i64, i64)> {
    if a_exp > b_exp {
        Some((a, scale(b, a_exp - b_exp)?))
    } else if b_exp > a_exp {
        Some((scale(a, b_exp - a_exp)?, b))
    } else {
        Some((a, b))
    }
}

fn scale(value: i64, by: u32) -> Option<i64> {
    10_i64.checked_pow(by).and_then(|factor| value.checked_mul(factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fixed_integers_and_decimals() {
        assert_eq!(parse_fixed("10"), Some((10, 0)));
        assert_eq!(parse_fixed("-3"), Some((-3, 0)));
        assert_eq!(parse_fixed("1.20"), Some((120, 2)));
        assert_eq!(parse_fixed("1.5"), Some((15, 1)));
        assert_eq!(parse_fixed(".5"), Some((5, 1)));
        assert_eq!(parse_fixed("1."), Some((1, 0)));
        assert_eq!(parse_fixed("-0.25"), Some((-25, 2)));
    }

    #[test]
    fn parse_fixed_rejects_garbage() {
        assert_eq!(parse_fixed(""), None);
        assert_eq!(parse_fixed("abc"), None);
        assert_eq!(parse_fixed("1.2.3"), None);
        assert_eq!(parse_fixed("."), None);
    }

    #[test]
    fn scales_to_common_exponent() {
        assert_eq!(align_scale((120, 2), (15, 1)), Some((120, 150)));
        assert_eq!(align_scale((1, 0), (15, 1)), Some((10, 15)));
        assert_eq!(align_scale((7, 3), (7, 3)), Some((7, 7)));
    }

    #[test]
    fn scaling_overflow_is_detected() {
        assert_eq!(align_scale((i64::MAX, 0), (1, 1)), None);
        assert_eq!(scale(1, 40), None);
    }

    #[test]
    fn placeholder_substitution_replaces_all_occurrences() {
        let mut each = ForEachMap::new();
        each.insert("each".to_owned(), "A".to_owned());
        assert_eq!(substitute_placeholders("each.x==each", &each), "A.x==A");
        assert_eq!(substitute_placeholders("none", &each), "none");
    }

    #[test]
    fn anchored_regex_matches_whole_string() {
        let re = anchored_regex("AUA").unwrap();
        assert!(re.is_match("AUA"));
        assert!(!re.is_match("AUA123"));
        assert!(anchored_regex("a|b").unwrap().is_match("b"));
        assert!(anchored_regex("(").is_none());
    }
}
