use rulexpr::{field, parse_expression, Context, HashString, Resolvable, RuleSetBuilder, Value};

/// Every name resolves to itself, so operands compare as literals.
struct Echo;

impl Resolvable for Echo {
    fn value_of_lhs(&self, lhs: &HashString) -> Option<String> {
        Some(lhs.as_str().to_owned())
    }

    fn assign_value(&mut self, _lhs: &HashString, _value: &str) -> bool {
        false
    }
}

fn echo(input: &str) -> bool {
    parse_expression(input).unwrap().evaluate(&Echo)
}

// ---------------------------------------------------------------------------
// Numeric comparisons
// ---------------------------------------------------------------------------

#[test]
fn integer_comparisons() {
    assert!(echo("10<=10"));
    assert!(echo("9<10"));
    assert!(!echo("10<10"));
    assert!(echo("-5<3"));
    assert!(echo("11>=10"));
    assert!(!echo("10>11"));
}

#[test]
fn decimal_comparisons_use_common_scale() {
    assert!(echo("1.20<1.5"));
    assert!(echo("2>1.99"));
    assert!(echo("0.5>=.5"));
    assert!(!echo("1.05>1.5"));
}

#[test]
fn non_numeric_operands_are_false() {
    assert!(!echo("abc<1"));
    assert!(!echo("1<abc"));
    assert!(!echo("abc>=1"));
    assert!(!echo("1.2.3<5"));
}

#[test]
fn whitespace_in_numeric_operand_is_false() {
    assert!(!echo("1 2<5"));
}

#[test]
fn numeric_comparison_on_context_fields() {
    let ctx = Context::new()
        .set("flight.level", 310_i64)
        .set("flight.speed", 0.82_f64);
    assert!(field("flight.level").gte("300").evaluate(&ctx));
    assert!(!field("flight.level").lt("300").evaluate(&ctx));
    assert!(field("flight.speed").lt("0.9").evaluate(&ctx));
    assert!(!field("flight.missing").lt("1").evaluate(&ctx));
}

// ---------------------------------------------------------------------------
// Pattern matching
// ---------------------------------------------------------------------------

#[test]
fn patterns_match_the_whole_value() {
    let ctx = Context::new().set("cs", "AUA123");
    assert!(parse_expression("cs=~AUA.*").unwrap().evaluate(&ctx));
    assert!(!parse_expression("cs=~AUA").unwrap().evaluate(&ctx));
    assert!(!parse_expression("cs!~AUA.*").unwrap().evaluate(&ctx));
    assert!(parse_expression("cs!~DLH.*").unwrap().evaluate(&ctx));
}

#[test]
fn pattern_from_rhs_reference() {
    let ctx = Context::new().set("cs", "AUA123").set("airline", "AUA[0-9]+");
    assert!(parse_expression("cs=~@airline").unwrap().evaluate(&ctx));
}

#[test]
fn invalid_pattern_never_matches() {
    let ctx = Context::new().set("cs", "(");
    assert!(!parse_expression("cs=~(").unwrap().evaluate(&ctx));
    assert!(parse_expression("cs!~(").unwrap().evaluate(&ctx));
}

// ---------------------------------------------------------------------------
// Missing values
// ---------------------------------------------------------------------------

#[test]
fn missing_value_differs_from_empty() {
    let ctx = Context::new().set("empty", "");
    assert!(parse_expression("empty==").unwrap().evaluate(&ctx));
    assert!(!parse_expression("missing==").unwrap().evaluate(&ctx));
    assert!(parse_expression("missing!=").unwrap().evaluate(&ctx));
}

#[test]
fn two_missing_values_are_equal() {
    let ctx = Context::new();
    assert!(parse_expression("a==@b").unwrap().evaluate(&ctx));
    assert!(!parse_expression("a!=@b").unwrap().evaluate(&ctx));
}

#[test]
fn assigning_missing_reference_fails() {
    let mut ctx = Context::new();
    let expr = parse_expression("a=@nothing").unwrap();
    assert!(!expr.perform_assignments(&mut ctx));
    assert_eq!(ctx.get("a"), None);
}

#[test]
fn append_to_missing_value_starts_empty() {
    let mut ctx = Context::new();
    assert!(parse_expression("route+=LOWW").unwrap().perform_assignments(&mut ctx));
    assert_eq!(ctx.get("route"), Some(&Value::String("LOWW".into())));
    assert!(parse_expression("route+=-EDDF").unwrap().perform_assignments(&mut ctx));
    assert_eq!(ctx.get("route"), Some(&Value::String("LOWW-EDDF".into())));
}

// ---------------------------------------------------------------------------
// Assignments and evaluation misuse
// ---------------------------------------------------------------------------

#[test]
fn typed_field_rejects_unparsable_value() {
    let mut ctx = Context::new().set("level", 300_i64);
    assert!(!parse_expression("level=high").unwrap().perform_assignments(&mut ctx));
    assert_eq!(ctx.get("level"), Some(&Value::Int(300)));
    assert!(parse_expression("level=310").unwrap().perform_assignments(&mut ctx));
    assert_eq!(ctx.get("level"), Some(&Value::Int(310)));
}

#[test]
fn every_assignment_in_a_chain_runs() {
    let mut ctx = Context::new().set("level", 300_i64);
    let expr = parse_expression("level=high and note=set").unwrap();
    assert!(!expr.perform_assignments(&mut ctx));
    assert_eq!(ctx.get("note"), Some(&Value::String("set".into())));
}

#[test]
fn assignment_cannot_be_evaluated() {
    let ctx = Context::new();
    assert!(!parse_expression("a=1").unwrap().evaluate(&ctx));
}

#[test]
fn comparison_cannot_be_performed() {
    let mut ctx = Context::new();
    assert!(!parse_expression("a==1").unwrap().perform_assignments(&mut ctx));
    assert!(!parse_expression("a=1 or b=2").unwrap().perform_assignments(&mut ctx));
    assert_eq!(ctx.get("a"), None);
}

#[test]
fn rule_with_invalid_then_text_fails_but_others_run() {
    let rules = RuleSetBuilder::new()
        .rule(|r| r.when("x==1").then("a==2"))
        .rule(|r| r.when("x==1").then("b=2"))
        .build()
        .unwrap();
    let mut ctx = Context::new().set("x", "1");
    assert!(!rules.apply(&mut ctx));
    assert_eq!(ctx.get("b"), Some(&Value::String("2".into())));
    let first = rules.iter().next().unwrap();
    assert!(first.is_if_valid());
    assert!(!first.is_then_valid());
}
