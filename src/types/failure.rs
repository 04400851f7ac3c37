use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, error, warn};

use super::error::RuleError;

/// How missing or null operands are reported during evaluation.
///
/// The mode is process-wide. It is read on every evaluation and is meant to be
/// set once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Null operands are silently accepted.
    #[default]
    Ignore,
    /// Null operands are logged as warnings.
    Warning,
    /// Null operands are logged as errors and escalated to the caller of the
    /// `try_*` apply operations.
    Fatal,
}

static FAILURE_MODE: AtomicU8 = AtomicU8::new(0);

thread_local! {
    static PENDING_FATAL: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Set the process-wide failure mode.
pub fn set_failure_mode(mode: FailureMode) {
    let raw = match mode {
        FailureMode::Ignore => 0,
        FailureMode::Warning => 1,
        FailureMode::Fatal => 2,
    };
    FAILURE_MODE.store(raw, Ordering::Relaxed);
}

/// The current process-wide failure mode.
#[must_use]
pub fn failure_mode() -> FailureMode {
    match FAILURE_MODE.load(Ordering::Relaxed) {
        1 => FailureMode::Warning,
        2 => FailureMode::Fatal,
        _ => FailureMode::Ignore,
    }
}

impl FailureMode {
    #[must_use]
    pub fn is_ignore(self) -> bool {
        self == FailureMode::Ignore
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureMode::Ignore => write!(f, "ignore"),
            FailureMode::Warning => write!(f, "warning"),
            FailureMode::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error returned when parsing an unknown failure mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown failure mode '{0}', expected ignore, warning or fatal")]
pub struct UnknownFailureMode(pub String);

impl FromStr for FailureMode {
    type Err = UnknownFailureMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(FailureMode::Ignore),
            "warning" | "warn" => Ok(FailureMode::Warning),
            "fatal" => Ok(FailureMode::Fatal),
            other => Err(UnknownFailureMode(other.to_owned())),
        }
    }
}

/// Report an evaluation failure according to the current failure mode.
///
/// Callers check [`FailureMode::is_ignore`] first when building the message is
/// not free.
pub fn report_failure(message: &str) {
    match failure_mode() {
        FailureMode::Ignore => debug!(failure = %message, "evaluation failure"),
        FailureMode::Warning => warn!(failure = %message, "evaluation failure"),
        FailureMode::Fatal => {
            error!(failure = %message, "evaluation failure");
            escalate(message);
        }
    }
}

/// Record a fatal condition for the current thread. The first one wins until it
/// is taken.
pub(crate) fn escalate(message: &str) {
    PENDING_FATAL.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(message.to_owned());
        }
    });
}

pub(crate) fn take_fatal() -> Option<String> {
    PENDING_FATAL.with(|slot| slot.borrow_mut().take())
}

/// Run `apply` and turn a fatal condition raised during it into an error.
pub(crate) fn guarded<T>(apply: impl FnOnce() -> T) -> Result<T, RuleError> {
    let _ = take_fatal();
    let result = apply();
    match take_fatal() {
        Some(message) => Err(RuleError::Fatal { message }),
        None => Ok(result),
    }
}
