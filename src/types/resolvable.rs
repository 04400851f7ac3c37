use super::failure::{escalate, failure_mode, report_failure};
use super::hash_string::HashString;

const TRUE_STR: &str = "true";
const FALSE_STR: &str = "false";

/// A host object that expressions read from and write to by name.
///
/// This is the only abstraction the engine depends on. Implementors answer
/// [`value_of_lhs()`](Self::value_of_lhs) and [`assign_value()`](Self::assign_value);
/// everything else has a default built on those two.
///
/// `None` means "no value" and is distinct from the empty string: two `None`
/// results compare equal to each other but not to `Some("")`.
pub trait Resolvable {
    /// Resolve a left-hand-side name.
    fn value_of_lhs(&self, lhs: &HashString) -> Option<String>;

    /// Store `value` under `lhs`. Returns `false` when the name is unknown or
    /// the value is rejected.
    fn assign_value(&mut self, lhs: &HashString, value: &str) -> bool;

    /// Resolve a name to a list, used by `@name` for-each sources.
    fn list_value_of_lhs(&self, lhs: &str) -> Vec<String> {
        let _ = lhs;
        Vec::new()
    }

    /// Resolve a right-hand-side operand. A leading `@` looks the remainder
    /// up as a left-hand-side name; anything else is a literal.
    fn value_of_rhs(&self, rhs: &HashString) -> Option<String> {
        if rhs.starts_with("@") {
            return self.value_of_lhs(&rhs.mid(1));
        }
        Some(rhs.as_str().to_owned())
    }

    /// Answer `Some(result)` to decide an `==` comparison before the generic
    /// lookup runs.
    fn handle_evaluate_equals(&self, lhs: &HashString, rhs: &HashString) -> Option<bool> {
        let _ = (lhs, rhs);
        None
    }

    /// `lhs = rhs`.
    fn perform_assignment(&mut self, lhs: &HashString, rhs: &HashString) -> bool {
        let mode = failure_mode();
        let Some(value) = self.value_of_rhs(rhs) else {
            if !mode.is_ignore() {
                report_failure(&format!("performAssignment {lhs}={rhs} rhs is null"));
            }
            return false;
        };
        let ok = self.assign_value(lhs, &value);
        if !ok && !mode.is_ignore() {
            report_failure(&format!(
                "assignValue {lhs}={rhs} failed with rhs \"{value}\""
            ));
        }
        ok
    }

    /// `lhs += rhs`. A missing side contributes the empty string.
    fn perform_append_assignment(&mut self, lhs: &HashString, rhs: &HashString) -> bool {
        let mode = failure_mode();
        let current = self.value_of_lhs(lhs);
        if current.is_none() && !mode.is_ignore() {
            report_failure(&format!("performAppendAssignment {lhs}+={rhs} lhs is null"));
        }
        let suffix = self.value_of_rhs(rhs);
        if suffix.is_none() && !mode.is_ignore() {
            report_failure(&format!("performAppendAssignment {lhs}+={rhs} rhs is null"));
        }
        let mut value = current.unwrap_or_default();
        value.push_str(suffix.as_deref().unwrap_or_default());
        let ok = self.assign_value(lhs, &value);
        if !ok && !mode.is_ignore() {
            report_failure(&format!(
                "assignValue {lhs}+={rhs} failed with rhs \"{value}\""
            ));
        }
        ok
    }
}

/// The canonical text for a boolean.
#[must_use]
pub fn bool_str(value: bool) -> &'static str {
    if value {
        TRUE_STR
    } else {
        FALSE_STR
    }
}

/// Parse `"true"` or `"false"`. Anything else is escalated as fatal and read
/// as `false`.
#[must_use]
pub fn as_bool(text: &str) -> bool {
    match text {
        TRUE_STR => true,
        FALSE_STR => false,
        other => {
            tracing::error!(text = other, "asBool invalid string");
            escalate(&format!("asBool invalid string {other}"));
            false
        }
    }
}

/// Null-aware equality: two missing values are equal, a missing value never
/// equals a present one.
#[must_use]
pub fn values_equal(lhs: Option<&str>, rhs: Option<&str>) -> bool {
    lhs == rhs
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct Vars(HashMap<String, String>);

    impl Resolvable for Vars {
        fn value_of_lhs(&self, lhs: &HashString) -> Option<String> {
            self.0.get(lhs.as_str()).cloned()
        }

        fn assign_value(&mut self, lhs: &HashString, value: &str) -> bool {
            if lhs == "readonly" {
                return false;
            }
            self.0.insert(lhs.as_str().to_owned(), value.to_owned());
            true
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> Vars {
        Vars(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        )
    }

    #[test]
    fn rhs_literal_is_verbatim() {
        let v = vars(&[("x", "1")]);
        assert_eq!(v.value_of_rhs(&"x".into()), Some("x".to_owned()));
    }

    #[test]
    fn rhs_sigil_resolves_lhs() {
        let v = vars(&[("x", "1")]);
        assert_eq!(v.value_of_rhs(&"@x".into()), Some("1".to_owned()));
        assert_eq!(v.value_of_rhs(&"@missing".into()), None);
    }

    #[test]
    fn assignment_copies_resolved_rhs() {
        let mut v = vars(&[("src", "red")]);
        assert!(v.perform_assignment(&"dst".into(), &"@src".into()));
        assert_eq!(v.0["dst"], "red");
    }

    #[test]
    fn assignment_of_missing_rhs_fails() {
        let mut v = vars(&[]);
        assert!(!v.perform_assignment(&"dst".into(), &"@nothing".into()));
        assert!(!v.0.contains_key("dst"));
    }

    #[test]
    fn rejected_assignment_fails() {
        let mut v = vars(&[]);
        assert!(!v.perform_assignment(&"readonly".into(), &"1".into()));
    }

    #[test]
    fn append_concatenates() {
        let mut v = vars(&[("s", "ab")]);
        assert!(v.perform_append_assignment(&"s".into(), &"cd".into()));
        assert_eq!(v.0["s"], "abcd");
    }

    #[test]
    fn append_to_missing_starts_empty() {
        let mut v = vars(&[]);
        assert!(v.perform_append_assignment(&"s".into(), &"cd".into()));
        assert_eq!(v.0["s"], "cd");
    }

    #[test]
    fn default_list_is_empty() {
        assert!(vars(&[]).list_value_of_lhs("anything").is_empty());
    }

    #[test]
    fn bool_text() {
        assert_eq!(bool_str(true), "true");
        assert_eq!(bool_str(false), "false");
        assert!(as_bool("true"));
        assert!(!as_bool("false"));
    }

    #[test]
    fn null_aware_equality() {
        assert!(values_equal(None, None));
        assert!(!values_equal(None, Some("")));
        assert!(!values_equal(Some(""), None));
        assert!(values_equal(Some("a"), Some("a")));
    }
}
