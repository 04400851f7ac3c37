use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, info, warn};

use super::error::RuleError;
use super::failure::escalate;
use super::hash_string::HashString;
use super::resolvable::{as_bool, bool_str, Resolvable};

const ALWAYS_TRUE: &str = "alwaysTrue";
const DEBUG_RULES: &str = "debugRules";
const ARG: &str = "arg";

/// Severity of a message queued by a `log*` assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    fn from_target(name: &str) -> Option<LogLevel> {
        match name {
            "logfatal" => Some(LogLevel::Fatal),
            "logerror" => Some(LogLevel::Error),
            "logwarning" => Some(LogLevel::Warning),
            "loginfo" => Some(LogLevel::Info),
            "logdebug" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        })
    }
}

/// Wraps a [`Resolvable`] for the duration of one rule application.
///
/// Adds a handful of pseudo-names on top of the wrapped value:
///
/// - `alwaysTrue` reads as `"true"`.
/// - `debugRules` toggles rule tracing; listing it yields `["true"]` or `["false"]`.
/// - `logfatal`, `logerror`, `logwarning`, `loginfo` and `logdebug` queue a
///   message at that severity; `arg` fills the lowest `%N` placeholder in it.
/// - temps are scratch variables local to this wrapper. `TEMP.rest` reads and
///   writes `<value of TEMP>.rest` on the wrapped value.
///
/// Every other name goes to the wrapped value unchanged.
pub struct LogValue<'a> {
    inner: &'a mut dyn Resolvable,
    debug_rules: bool,
    level: Option<LogLevel>,
    message: String,
    temps: HashMap<String, String>,
}

impl<'a> LogValue<'a> {
    pub fn new(inner: &'a mut dyn Resolvable) -> Self {
        Self {
            inner,
            debug_rules: false,
            level: None,
            message: String::new(),
            temps: HashMap::new(),
        }
    }

    #[must_use]
    pub fn debug_rules(&self) -> bool {
        self.debug_rules
    }

    pub fn set_debug_rules(&mut self, on: bool) {
        self.debug_rules = on;
    }

    /// The queued message and its severity, if any.
    #[must_use]
    pub fn pending_message(&self) -> Option<(LogLevel, &str)> {
        self.level.map(|level| (level, self.message.as_str()))
    }

    pub fn clear_log_message(&mut self) {
        self.level = None;
        self.message.clear();
    }

    /// Emit the queued message at its severity. A fatal message is also
    /// escalated to the caller of the `try_*` apply operation.
    pub fn write_log_message(&self) {
        let Some(level) = self.level else { return };
        let message = self.message.as_str();
        match level {
            LogLevel::Fatal => {
                error!(text = message, "rule logfatal");
                escalate(message);
            }
            LogLevel::Error => error!(text = message, "rule logerror"),
            LogLevel::Warning => warn!(text = message, "rule logwarning"),
            LogLevel::Info => info!(text = message, "rule loginfo"),
            LogLevel::Debug => debug!(text = message, "rule logdebug"),
        }
    }

    /// Drop all temps and declare `names`, each starting as the empty string.
    ///
    /// # Errors
    ///
    /// See [`add_temps`](Self::add_temps).
    pub fn initialize_temps<I, S>(&mut self, names: I) -> Result<(), RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.temps.clear();
        self.add_temps(names)
    }

    /// Declare more temps.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidTemp`] for a name containing `.` and
    /// [`RuleError::DuplicateTemp`] for a name already declared.
    pub fn add_temps<I, S>(&mut self, names: I) -> Result<(), RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            if name.contains('.') {
                error!(temp = name, "temp name contains '.'");
                return Err(RuleError::InvalidTemp {
                    name: name.to_owned(),
                });
            }
            if self.temps.contains_key(name) {
                error!(temp = name, "duplicate temp");
                return Err(RuleError::DuplicateTemp {
                    name: name.to_owned(),
                });
            }
            self.temps.insert(name.to_owned(), String::new());
        }
        Ok(())
    }

    #[must_use]
    pub fn temp(&self, name: &str) -> Option<&str> {
        self.temps.get(name).map(String::as_str)
    }

    /// `TEMP.rest` becomes `<value of TEMP>.rest` when `TEMP` is a temp.
    fn redirected(&self, lhs: &HashString) -> Option<HashString> {
        let pos = lhs.find('.')?;
        let target = self.temps.get(lhs.left(pos).as_str())?;
        Some(HashString::new(format!("{target}{}", lhs.mid(pos))))
    }
}

impl fmt::Debug for LogValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogValue")
            .field("debug_rules", &self.debug_rules)
            .field("level", &self.level)
            .field("message", &self.message)
            .field("temps", &self.temps)
            .finish_non_exhaustive()
    }
}

impl Resolvable for LogValue<'_> {
    fn value_of_lhs(&self, lhs: &HashString) -> Option<String> {
        if *lhs == ALWAYS_TRUE {
            return Some(bool_str(true).to_owned());
        }
        if lhs.find('.').is_some() {
            if let Some(target) = self.redirected(lhs) {
                return self.inner.value_of_lhs(&target);
            }
        } else if let Some(value) = self.temps.get(lhs.as_str()) {
            return Some(value.clone());
        }
        self.inner.value_of_lhs(lhs)
    }

    fn list_value_of_lhs(&self, lhs: &str) -> Vec<String> {
        if lhs == DEBUG_RULES {
            return vec![bool_str(self.debug_rules).to_owned()];
        }
        self.inner.list_value_of_lhs(lhs)
    }

    fn value_of_rhs(&self, rhs: &HashString) -> Option<String> {
        if rhs.starts_with("@") {
            return self.value_of_lhs(&rhs.mid(1));
        }
        self.inner.value_of_rhs(rhs)
    }

    fn assign_value(&mut self, lhs: &HashString, value: &str) -> bool {
        if *lhs == DEBUG_RULES {
            self.debug_rules = as_bool(value);
            return true;
        }
        if let Some(level) = LogLevel::from_target(lhs.as_str()) {
            self.level = Some(level);
            value.clone_into(&mut self.message);
            return true;
        }
        if *lhs == ARG {
            self.message = substitute_arg(&self.message, value);
            return true;
        }
        if lhs.find('.').is_some() {
            if let Some(target) = self.redirected(lhs) {
                return self.inner.assign_value(&target, value);
            }
        } else if let Some(slot) = self.temps.get_mut(lhs.as_str()) {
            value.clone_into(slot);
            return true;
        }
        self.inner.assign_value(lhs, value)
    }

    fn handle_evaluate_equals(&self, lhs: &HashString, rhs: &HashString) -> Option<bool> {
        self.inner.handle_evaluate_equals(lhs, rhs)
    }
}

// -- %N substitution --------------------------------------------------------

/// `(byte start, byte end, N)` for every `%N` escape, N in 1..=99.
fn arg_escapes(message: &str) -> Vec<(usize, usize, u32)> {
    let mut escapes = Vec::new();
    let mut chars = message.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '%' {
            continue;
        }
        let Some(first) = chars.peek().and_then(|&(_, d)| d.to_digit(10)) else {
            continue;
        };
        chars.next();
        let mut number = first;
        if let Some(second) = chars.peek().and_then(|&(_, d)| d.to_digit(10)) {
            chars.next();
            number = number * 10 + second;
        }
        let end = chars.peek().map_or(message.len(), |&(i, _)| i);
        if number > 0 {
            escapes.push((start, end, number));
        }
    }
    escapes
}

/// Replace every occurrence of the lowest-numbered `%N` with `value`.
fn substitute_arg(message: &str, value: &str) -> String {
    let escapes = arg_escapes(message);
    let Some(lowest) = escapes.iter().map(|&(_, _, n)| n).min() else {
        warn!(text = message, arg = value, "arg: no %N placeholder left");
        return message.to_owned();
    };
    let mut out = String::with_capacity(message.len() + value.len());
    let mut copied = 0;
    for (start, end, _) in escapes.into_iter().filter(|&(_, _, n)| n == lowest) {
        out.push_str(&message[copied..start]);
        out.push_str(value);
        copied = end;
    }
    out.push_str(&message[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;

    fn key(s: &str) -> HashString {
        HashString::new(s)
    }

    #[test]
    fn always_true_reads_true() {
        let mut ctx = Context::new();
        let lv = LogValue::new(&mut ctx);
        assert_eq!(lv.value_of_lhs(&key("alwaysTrue")).as_deref(), Some("true"));
    }

    #[test]
    fn unknown_names_delegate() {
        let mut ctx = Context::new().set("cs", "AUA123");
        let mut lv = LogValue::new(&mut ctx);
        assert_eq!(lv.value_of_lhs(&key("cs")).as_deref(), Some("AUA123"));
        assert!(lv.assign_value(&key("cs"), "DLH1"));
        assert_eq!(lv.value_of_lhs(&key("cs")).as_deref(), Some("DLH1"));
    }

    #[test]
    fn temps_are_local() {
        let mut ctx = Context::new();
        let mut lv = LogValue::new(&mut ctx);
        lv.initialize_temps(["t"]).unwrap();
        assert_eq!(lv.value_of_lhs(&key("t")).as_deref(), Some(""));
        assert!(lv.assign_value(&key("t"), "x"));
        assert_eq!(lv.temp("t"), Some("x"));
        drop(lv);
        assert_eq!(ctx.get("t"), None);
    }

    #[test]
    fn temp_prefix_redirects() {
        let mut ctx = Context::new().set("flight.colour", "blue");
        let mut lv = LogValue::new(&mut ctx);
        lv.initialize_temps(["t"]).unwrap();
        lv.assign_value(&key("t"), "flight");
        assert_eq!(lv.value_of_lhs(&key("t.colour")).as_deref(), Some("blue"));
        assert!(lv.assign_value(&key("t.colour"), "red"));
        drop(lv);
        assert_eq!(ctx.get("flight.colour").map(ToString::to_string).as_deref(), Some("red"));
    }

    #[test]
    fn temp_errors() {
        let mut ctx = Context::new();
        let mut lv = LogValue::new(&mut ctx);
        assert_eq!(
            lv.initialize_temps(["a", "a"]),
            Err(RuleError::DuplicateTemp { name: "a".into() })
        );
        assert_eq!(
            lv.initialize_temps(["a.b"]),
            Err(RuleError::InvalidTemp { name: "a.b".into() })
        );
        lv.initialize_temps(["a"]).unwrap();
        assert!(lv.add_temps(["a"]).is_err());
        assert!(lv.add_temps(["b"]).is_ok());
    }

    #[test]
    fn debug_rules_flag() {
        let mut ctx = Context::new();
        let mut lv = LogValue::new(&mut ctx);
        assert_eq!(lv.list_value_of_lhs("debugRules"), ["false"]);
        assert!(lv.assign_value(&key("debugRules"), "true"));
        assert!(lv.debug_rules());
        assert_eq!(lv.list_value_of_lhs("debugRules"), ["true"]);
    }

    #[test]
    fn log_targets_queue_message() {
        let mut ctx = Context::new();
        let mut lv = LogValue::new(&mut ctx);
        assert!(lv.pending_message().is_none());
        assert!(lv.assign_value(&key("logwarning"), "track %1 at %2"));
        assert!(lv.assign_value(&key("arg"), "AUA1"));
        assert!(lv.assign_value(&key("arg"), "FL100"));
        assert_eq!(
            lv.pending_message(),
            Some((LogLevel::Warning, "track AUA1 at FL100"))
        );
        lv.clear_log_message();
        assert!(lv.pending_message().is_none());
    }

    #[test]
    fn rhs_reference_sees_temps() {
        let mut ctx = Context::new();
        let mut lv = LogValue::new(&mut ctx);
        lv.initialize_temps(["t"]).unwrap();
        lv.assign_value(&key("t"), "v");
        assert_eq!(lv.value_of_rhs(&key("@t")).as_deref(), Some("v"));
        assert_eq!(lv.value_of_rhs(&key("lit")).as_deref(), Some("lit"));
    }

    #[test]
    fn arg_replaces_lowest_escape_everywhere() {
        assert_eq!(substitute_arg("%2 %1 %1", "x"), "%2 x x");
        assert_eq!(substitute_arg("%2 x x", "y"), "y x x");
        assert_eq!(substitute_arg("%10 and %9", "z"), "%10 and z");
        assert_eq!(substitute_arg("100%", "z"), "100%");
        assert_eq!(substitute_arg("%0 stays", "z"), "%0 stays");
    }

    #[test]
    fn arg_escape_positions() {
        assert_eq!(arg_escapes("a%1b%12"), vec![(1, 3, 1), (4, 7, 12)]);
    }
}
