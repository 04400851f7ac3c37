//! The failure mode is process-wide, so everything that changes it lives in
//! one test.

use rulexpr::{
    failure_mode, report_failure, set_failure_mode, Context, FailureMode, RuleError,
    RuleSetBuilder, UnknownFailureMode, Value,
};

#[test]
fn failure_mode_controls_escalation() {
    assert_eq!(failure_mode(), FailureMode::Ignore);
    assert_eq!(
        "loud".parse::<FailureMode>(),
        Err(UnknownFailureMode("loud".into()))
    );

    let rules = RuleSetBuilder::new()
        .rule(|r| r.when("missing==x").then("a=1").otherwise("a=2"))
        .rule(|r| r.then("b=@absent"))
        .build()
        .unwrap();

    // Ignore: null operands are just false comparisons and failed assignments.
    let mut ctx = Context::new();
    assert_eq!(rules.try_apply(&mut ctx), Ok(false));
    assert_eq!(ctx.get("a"), Some(&Value::String("2".into())));

    // Warning: same outcome, logged louder.
    set_failure_mode("warning".parse().unwrap());
    assert_eq!(failure_mode(), FailureMode::Warning);
    let mut ctx = Context::new();
    assert_eq!(rules.try_apply(&mut ctx), Ok(false));
    assert_eq!(ctx.get("a"), Some(&Value::String("2".into())));

    // Fatal: the first failure is surfaced, every rule still ran.
    set_failure_mode(FailureMode::Fatal);
    let mut ctx = Context::new();
    let err = rules.try_apply(&mut ctx).unwrap_err();
    assert_eq!(
        err,
        RuleError::Fatal {
            message: "evaluateExpression missing==x failed with lhs \"\" rhs \"x\"".into()
        }
    );
    assert_eq!(ctx.get("a"), Some(&Value::String("2".into())));

    // Plain apply does not surface it, and a stale failure never leaks into
    // the next guarded call.
    let mut ctx = Context::new().set("missing", "x");
    assert!(!rules.apply(&mut ctx));
    let mut ctx = Context::new().set("missing", "x").set("absent", "y");
    assert_eq!(rules.try_apply(&mut ctx), Ok(true));
    assert_eq!(ctx.get("b"), Some(&Value::String("y".into())));

    // Host code can report through the same channel.
    report_failure("host check failed");
    set_failure_mode(FailureMode::Ignore);
    let mut ctx = Context::new().set("missing", "x").set("absent", "y");
    assert_eq!(rules.try_apply(&mut ctx), Ok(true));
}
