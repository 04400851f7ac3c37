use rulexpr::{
    parse_rules, Branch, CompileError, Context, DebugRules, RuleConfig, RuleSetBuilder,
    RulexprError, Value,
};

#[test]
fn dsl_parse_and_apply() {
    let dsl = r#"
rule {
    description = "upper airspace"
    if = "level>=245"
    then = "sector=upper"
    else = "sector=lower"
}
"#;

    let config = RuleConfig::from_dsl(dsl).unwrap();

    let mut ctx = Context::new().set("level", 300_i64);
    assert!(config.apply(&mut ctx));
    assert_eq!(ctx.get("sector"), Some(&Value::String("upper".into())));

    let mut ctx = Context::new().set("level", 120_i64);
    assert!(config.apply(&mut ctx));
    assert_eq!(ctx.get("sector"), Some(&Value::String("lower".into())));
}

#[test]
fn dsl_comments_are_ignored() {
    let dsl = r#"
# header comment
rule {
    # the condition
    if = "x==1"   # trailing
    then = "y=1"
}
"#;

    let config = RuleConfig::from_dsl(dsl).unwrap();
    let mut ctx = Context::new().set("x", "1");
    assert!(config.apply(&mut ctx));
    assert_eq!(ctx.get("y"), Some(&Value::String("1".into())));
}

#[test]
fn dsl_for_each_attributes() {
    let dsl = r#"
rule {
    forEach(sep = "|", name = "RWY") = "16|34"
    if(space = "_") = "RWY.state==in_use"
    then = "active+=RWY"
}
"#;

    let config = RuleConfig::from_dsl(dsl).unwrap();
    let rule = config.rules().iter().next().unwrap();
    let each = rule.for_each().unwrap();
    assert_eq!(each.separator(), "|");
    assert_eq!(each.name(), "RWY");
    assert_eq!(rule.condition().unwrap().space(), Some("_"));

    let mut ctx = Context::new()
        .set("16.state", "in use")
        .set("34.state", "closed");
    assert!(config.apply(&mut ctx));
    assert_eq!(ctx.get("active"), Some(&Value::String("16".into())));
}

#[test]
fn dsl_nested_rules_and_configs() {
    let dsl = r#"
debugRules = false
temps = "kind"
rule {
    if = "type==A320 or type==A321"
    thenIf {
        rule { then = "kind=narrow" }
    }
    elseIf {
        rule { then = "kind=other" }
    }
}
config {
    debugRules = parent
    temps = "out"
    rule { then = "out=@kind and category=@out" }
}
"#;

    let config = RuleConfig::from_dsl(dsl).unwrap();
    assert_eq!(config.configs()[0].debug_rules(), DebugRules::Parent);
    assert!(matches!(
        config.rules().iter().next().unwrap().then_branch(),
        Branch::Rules(rules) if rules.len() == 1
    ));

    let mut ctx = Context::new().set("type", "A321");
    assert!(config.apply(&mut ctx));
    assert_eq!(ctx.get("category"), Some(&Value::String("narrow".into())));

    let mut ctx = Context::new().set("type", "B744");
    assert!(config.apply(&mut ctx));
    assert_eq!(ctx.get("category"), Some(&Value::String("other".into())));
}

#[test]
fn dsl_parse_error_has_offset() {
    let err = RuleConfig::from_dsl("rule {\n    iff = \"x==1\"\n}").unwrap_err();
    let RulexprError::Parse(parse) = err else {
        panic!("expected parse error, got {err:?}");
    };
    assert!(parse.offset() >= 7, "offset {} should point into the rule", parse.offset());
    assert!(parse.to_string().starts_with("parse error at offset"));
}

#[test]
fn dsl_compile_error_propagates() {
    let dsl = r#"
rule {
    description = "both"
    then = "a=1"
    thenIf { rule { then = "b=1" } }
}
"#;

    let err = RuleConfig::from_dsl(dsl).unwrap_err();
    assert!(matches!(
        err,
        RulexprError::Compile(CompileError::ConflictingBranch { .. })
    ));
    assert_eq!(
        err.to_string(),
        "rule 'both' has both then text and thenIf rules"
    );
}

#[test]
fn dsl_invalid_debug_rules() {
    let err = RuleConfig::from_dsl("debugRules = sometimes").unwrap_err();
    assert!(matches!(
        err,
        RulexprError::Compile(CompileError::InvalidDebugRules { .. })
    ));
}

#[test]
fn dsl_duplicate_temp_across_levels() {
    let dsl = r#"
temps = "a"
config { temps = "a" }
"#;
    let err = RuleConfig::from_dsl(dsl).unwrap_err();
    assert!(matches!(
        err,
        RulexprError::Compile(CompileError::DuplicateTemp { .. })
    ));
}

#[test]
fn dsl_matches_builder_api() {
    let dsl = r#"
rule {
    forEach = "A,B"
    if = "each.ok==yes"
    then = "each.seen=1"
    else = "each.seen=0"
}
"#;

    let from_dsl = RuleConfig::from_dsl(dsl).unwrap();
    let from_builder = RuleSetBuilder::new()
        .rule(|r| {
            r.for_each(rulexpr::ForEach::new("A,B"))
                .when("each.ok==yes")
                .then("each.seen=1")
                .otherwise("each.seen=0")
        })
        .build()
        .unwrap();

    let mut a = Context::new().set("A.ok", "yes").set("B.ok", "no");
    let mut b = a.clone();
    assert!(from_dsl.apply(&mut a));
    assert!(from_builder.apply(&mut b));
    for path in ["A.seen", "B.seen"] {
        assert_eq!(a.get(path), b.get(path), "{path}");
    }
    assert_eq!(from_dsl.rules().to_source(), from_builder.to_source());
}

#[test]
fn dsl_source_round_trip() {
    let dsl = r#"
debugRules = true
temps = "t u"
rule {
    description = "quote \" inside"
    forEach(name = "X") = "1,2"
    if = "X==1"
    then = "t=X"
}
config {
    rule { elseIf { rule { then = "u=1" } } }
}
"#;

    let parsed = parse_rules(dsl).unwrap();
    let printed = parsed.to_dsl();
    assert_eq!(parse_rules(&printed).unwrap(), parsed);

    let config = RuleConfig::from_dsl(dsl).unwrap();
    let rebuilt = RuleConfig::from_dsl(&config.to_source().to_dsl()).unwrap();
    assert_eq!(rebuilt.to_source(), config.to_source());
}
