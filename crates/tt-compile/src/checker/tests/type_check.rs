use super::*;

// =========================================================================
// Resolution & schema attachment
// =========================================================================

#[test]
fn every_invocation_carries_a_schema() {
    let program = check_ok(
        "@com.xkcd.get_comic(number=42) => @com.twitter.post(status=title);",
        &[XKCD, TWITTER],
    );
    for rule in program.rules() {
        for table in &rule.tables {
            let mut invs = Vec::new();
            table.invocations(&mut invs);
            assert!(invs.iter().all(|i| i.schema.is_resolved()));
            assert!(table.schema().is_some());
        }
        for action in &rule.actions {
            if let Action::Invocation(inv) = action {
                assert!(inv.schema.is_resolved());
            }
        }
    }
}

#[test]
fn unknown_kind_aborts() {
    check_err("@com.nope.q();", &[], "UnknownKind");
}

#[test]
fn unknown_function_is_undeclared() {
    check_err("@com.twitter.tweet(status=\"x\");", &[TWITTER], "UndeclaredName");
}

// =========================================================================
// Parameter typing
// =========================================================================

#[test]
fn status_must_be_a_string() {
    // The classic: a number where a string is declared.
    check_err(
        "now => @com.twitter.post(status=42);",
        &[TWITTER],
        "TypeMismatch",
    );
}

#[test]
fn mismatch_carries_both_types() {
    let err = futures_block(check(
        "now => @com.twitter.post(status=42);",
        &[TWITTER],
    ))
    .unwrap_err();
    let debug = format!("{err:?}");
    assert!(debug.contains("String"), "missing expected type: {debug}");
    assert!(debug.contains("Number"), "missing found type: {debug}");
}

#[test]
fn out_params_cannot_be_passed_in() {
    check_err(
        "@com.xkcd.get_comic(title=\"x\");",
        &[XKCD],
        "DirectionViolation",
    );
}

#[test]
fn unknown_parameter_is_undeclared() {
    check_err(
        "@com.xkcd.get_comic(issue=42);",
        &[XKCD],
        "UndeclaredName",
    );
}

#[test]
fn scope_flows_from_query_to_action() {
    check_ok(
        "@com.xkcd.get_comic(number=42) => @com.twitter.post(status=title);",
        &[XKCD, TWITTER],
    );
    // `link` is an Entity, not a String.
    check_err(
        "@com.xkcd.get_comic(number=42) => @com.twitter.post(status=link);",
        &[XKCD, TWITTER],
        "TypeMismatch",
    );
    // `ghost` is not bound by anything upstream.
    check_err(
        "@com.xkcd.get_comic(number=42) => @com.twitter.post(status=ghost);",
        &[XKCD, TWITTER],
        "UndeclaredName",
    );
}

#[test]
fn numeric_literals_unify_with_currency() {
    let class = r#"class @com.payments {
  action send(in req amount : Currency);
}"#;
    check_ok("now => @com.payments.send(amount=10);", &[class]);
    check_err(
        "now => @com.payments.send(amount=\"ten\");",
        &[class],
        "TypeMismatch",
    );
}

#[test]
fn measures_unify_by_base_unit() {
    let class = r#"class @com.thermostat {
  action set_target(in req value : Measure(C));
}"#;
    check_ok("now => @com.thermostat.set_target(value=70F);", &[class]);
    check_err(
        "now => @com.thermostat.set_target(value=70kg);",
        &[class],
        "TypeMismatch",
    );
    check_err(
        "now => @com.thermostat.set_target(value=70);",
        &[class],
        "TypeMismatch",
    );
}

// =========================================================================
// Filters
// =========================================================================

#[test]
fn filters_resolve_against_outputs() {
    check_ok(
        "@com.twitter.home_timeline(), text =~ \"cats\";",
        &[TWITTER],
    );
    check_err(
        "@com.twitter.home_timeline(), ghost == 1;",
        &[TWITTER],
        "UndeclaredName",
    );
}

#[test]
fn operator_admissibility_is_typed() {
    check_err(
        "monitor @security-camera.current_event(), has_person =~ \"yes\" => notify;",
        &[CAMERA],
        "TypeMismatch",
    );
    check_ok(
        "@com.twitter.home_timeline(), hashtags contains \"rust\";",
        &[TWITTER],
    );
    check_err(
        "@com.twitter.home_timeline(), hashtags contains 7;",
        &[TWITTER],
        "TypeMismatch",
    );
}

#[test]
fn equality_filters_on_inputs_become_parameters() {
    let program = check_ok("@com.xkcd.get_comic(), number == 42;", &[XKCD]);
    let rule = program.rules().next().unwrap();
    match &rule.tables[0] {
        Table::Filter { table, filter } => {
            assert!(filter.is_true(), "filter should be absorbed: {filter:?}");
            match &**table {
                Table::Invocation(inv) => {
                    assert_eq!(inv.in_param("number"), Some(&Value::Number(42.0)));
                }
                other => panic!("expected invocation, got {other:?}"),
            }
        }
        other => panic!("expected filter node, got {other:?}"),
    }
}

#[test]
fn non_equality_input_filters_are_rejected() {
    check_err(
        "@com.xkcd.get_comic(), number >= 42;",
        &[XKCD],
        "DirectionViolation",
    );
}

#[test]
fn get_predicates_check_recursively() {
    check_ok(
        "@com.twitter.home_timeline(), @org.weather.current(location=new Location(1, 3)) { temperature >= 20C };",
        &[TWITTER, WEATHER],
    );
    check_err(
        "@com.twitter.home_timeline(), @org.weather.current(location=new Location(1, 3)) { ghost == 1 };",
        &[TWITTER, WEATHER],
        "UndeclaredName",
    );
}

#[test]
fn computed_filters_type_check() {
    check_ok(
        "@com.twitter.home_timeline(), count(hashtags) >= 3;",
        &[TWITTER],
    );
    check_err(
        "@com.twitter.home_timeline(), count(text) >= 3;",
        &[TWITTER],
        "TypeMismatch",
    );
}

// =========================================================================
// Streams & combinators
// =========================================================================

#[test]
fn monitor_requires_monitorable() {
    check_ok(
        "monitor @org.weather.current(location=new Location(1, 3)) => notify;",
        &[WEATHER],
    );
    check_err(
        "monitor @com.xkcd.get_comic() => notify;",
        &[XKCD],
        "TypeMismatch",
    );
}

#[test]
fn timer_argument_types() {
    check_ok("timer(base=$now, interval=1h) => notify;", &[]);
    check_err("timer(base=$now, interval=2) => notify;", &[], "TypeMismatch");
    check_err(
        "attimer(time=[new Time(10, 30)], expiration_date=5) => notify;",
        &[],
        "TypeMismatch",
    );
}

#[test]
fn projection_fields_must_be_outputs() {
    check_ok("[title] of @com.xkcd.get_comic();", &[XKCD]);
    check_err(
        "[ghost] of @com.xkcd.get_comic();",
        &[XKCD],
        "UndeclaredName",
    );
}

#[test]
fn projection_narrows_downstream_schema() {
    let program = check_ok("[title] of @com.xkcd.get_comic();", &[XKCD]);
    let rule = program.rules().next().unwrap();
    let schema = rule.tables[0].schema().unwrap();
    assert_eq!(schema.out_names(), vec!["title"]);
}

#[test]
fn sort_key_must_be_comparable_output() {
    check_ok("sort title asc of @com.xkcd.get_comic();", &[XKCD]);
    check_err(
        "sort ghost asc of @com.xkcd.get_comic();",
        &[XKCD],
        "UndeclaredName",
    );
    check_err(
        "sort has_person asc of @security-camera.current_event();",
        &[CAMERA],
        "TypeMismatch",
    );
}

#[test]
fn joins_merge_output_schemas() {
    let program = check_ok(
        "now => @com.xkcd.get_comic() join @com.twitter.home_timeline() => notify;",
        &[XKCD, TWITTER],
    );
    let rule = program.rules().next().unwrap();
    let schema = rule.tables[0].schema().unwrap();
    let outs = schema.out_names();
    assert!(outs.contains(&"title".to_string()));
    assert!(outs.contains(&"text".to_string()));
}

#[test]
fn join_on_binds_left_output_to_right_input() {
    let class = r#"class @com.lookup {
  query by_name(in req name : String, out rank : Number);
}"#;
    check_ok(
        "now => @com.xkcd.get_comic() join @com.lookup.by_name() on (name=title) => notify;",
        &[XKCD, class],
    );
    check_err(
        "now => @com.xkcd.get_comic() join @com.lookup.by_name() on (rank=title) => notify;",
        &[XKCD, class],
        "DirectionViolation",
    );
}

#[test]
fn aggregation_schemas() {
    let program = check_ok(
        "aggregate count of @com.twitter.home_timeline();",
        &[TWITTER],
    );
    let schema = program.rules().next().unwrap().tables[0].schema().unwrap();
    assert_eq!(schema.out_names(), vec!["count"]);

    check_err(
        "aggregate avg text of @com.twitter.home_timeline();",
        &[TWITTER],
        "TypeMismatch",
    );
}

// =========================================================================
// Statement disambiguation & declarations
// =========================================================================

#[test]
fn bare_action_statement_moves_to_action_position() {
    let program = check_ok("@com.twitter.post(status=\"hi\");", &[TWITTER]);
    let rule = program.rules().next().unwrap();
    assert!(rule.tables.is_empty());
    assert!(matches!(rule.actions[0], Action::Invocation(_)));
}

#[test]
fn query_in_action_position_moves_back() {
    let program = check_ok("now => @com.xkcd.get_comic(number=42);", &[XKCD]);
    let rule = program.rules().next().unwrap();
    assert_eq!(rule.tables.len(), 1);
    assert_eq!(rule.actions, vec![Action::Notify]);
}

#[test]
fn declarations_type_check_and_resolve() {
    check_ok(
        "let query comics := @com.xkcd.get_comic(number=42);\nnow => comics() => notify;",
        &[XKCD],
    );
    check_err("now => ghosts() => notify;", &[], "UndeclaredName");
}

#[test]
fn declaration_params_flow_into_the_body() {
    check_ok(
        "let query comic(n : Number) := @com.xkcd.get_comic(number=n);\nnow => comic(n=7) => notify;",
        &[XKCD],
    );
    check_err(
        "let query comic(n : String) := @com.xkcd.get_comic(number=n);",
        &[XKCD],
        "TypeMismatch",
    );
}

#[test]
fn executor_must_be_a_contact() {
    check_ok(
        "executor = \"1234\"^^tt:contact : now => @com.twitter.post(status=\"x\");",
        &[TWITTER],
    );
    check_err(
        "executor = 42 : now => @com.twitter.post(status=\"x\");",
        &[TWITTER],
        "TypeMismatch",
    );
}

#[test]
fn program_classes_are_visible_to_their_own_rules() {
    check_ok(
        "class @org.local {\n  query q(out x : Number);\n}\n@org.local.q();",
        &[],
    );
}
