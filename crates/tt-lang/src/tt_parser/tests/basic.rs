use super::*;

#[test]
fn bare_query_statement() {
    let program = parse_ok("@com.xkcd.get_comic(number=1234);");
    let rule = single_rule(&program);
    assert!(rule.stream.is_none());
    assert_eq!(rule.actions, vec![Action::Notify]);
    match &rule.tables[0] {
        Table::Invocation(inv) => {
            assert_eq!(inv.selector.kind, "com.xkcd");
            assert_eq!(inv.channel, "get_comic");
            assert_eq!(inv.in_param("number"), Some(&Value::Number(1234.0)));
        }
        other => panic!("expected invocation, got {other:?}"),
    }
}

#[test]
fn now_rule_with_action() {
    let program = parse_ok(r#"now => @com.twitter.post(status="hi");"#);
    let rule = single_rule(&program);
    assert!(rule.stream.is_none());
    assert!(rule.tables.is_empty());
    match &rule.actions[0] {
        Action::Invocation(inv) => assert_eq!(inv.qualified_name(), "com.twitter.post"),
        other => panic!("expected action invocation, got {other:?}"),
    }
}

#[test]
fn query_then_action() {
    let program =
        parse_ok(r#"now => @com.xkcd.get_comic(number=42) => @com.twitter.post(status=$event);"#);
    let rule = single_rule(&program);
    assert_eq!(rule.tables.len(), 1);
    assert_eq!(rule.actions.len(), 1);
}

#[test]
fn monitor_rule() {
    let program = parse_ok(
        r#"monitor @org.weather.current(location=new Location(1, 3, "Somewhere")) => notify;"#,
    );
    let rule = single_rule(&program);
    match rule.stream.as_ref().unwrap() {
        Stream::Monitor { table, on_new } => {
            assert!(on_new.is_none());
            assert!(matches!(**table, Table::Invocation(_)));
        }
        other => panic!("expected monitor, got {other:?}"),
    }
    assert_eq!(rule.actions, vec![Action::Notify]);
}

#[test]
fn monitor_on_new_fields() {
    let program = parse_ok(
        "monitor @org.weather.current(location=$?) on new [temperature] => notify;",
    );
    match single_rule(&program).stream.as_ref().unwrap() {
        Stream::Monitor { on_new, .. } => {
            assert_eq!(on_new.as_deref(), Some(&["temperature".to_string()][..]));
        }
        other => panic!("expected monitor, got {other:?}"),
    }
}

#[test]
fn timer_rule() {
    let program = parse_ok(r#"timer(base=$now, interval=1h) => @com.twitter.post(status="tick");"#);
    match single_rule(&program).stream.as_ref().unwrap() {
        Stream::Timer {
            base,
            interval,
            frequency,
        } => {
            assert_eq!(base, &Value::Date(DateValue::Now));
            assert_eq!(interval, &Value::Measure(1.0, "h".to_string()));
            assert!(frequency.is_none());
        }
        other => panic!("expected timer, got {other:?}"),
    }
}

#[test]
fn attimer_rule() {
    let program = parse_ok("attimer(time=[new Time(10, 30)]) => notify;");
    match single_rule(&program).stream.as_ref().unwrap() {
        Stream::AtTimer { times, expiration } => {
            assert_eq!(times.len(), 1);
            assert!(expiration.is_none());
        }
        other => panic!("expected attimer, got {other:?}"),
    }
}

#[test]
fn filtered_table() {
    let program = parse_ok("@org.weather.current(location=$?), temperature >= 20C;");
    match &single_rule(&program).tables[0] {
        Table::Filter { filter, .. } => {
            assert_eq!(
                filter,
                &BooleanExpr::atom(
                    "temperature",
                    FilterOp::Ge,
                    Value::Measure(20.0, "C".to_string())
                )
            );
        }
        other => panic!("expected filter, got {other:?}"),
    }
}

#[test]
fn compound_filter_keeps_structure() {
    let program = parse_ok("@com.foo.q(), (a > 42) && ((a <= 42.5) || (b > 7));");
    match &single_rule(&program).tables[0] {
        Table::Filter { filter, .. } => match filter {
            BooleanExpr::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], BooleanExpr::Or(_)));
            }
            other => panic!("expected conjunction, got {other:?}"),
        },
        other => panic!("expected filter, got {other:?}"),
    }
}

#[test]
fn external_get_predicate() {
    let program = parse_ok("@com.foo.q(), @com.bar.check(x=1) { y == 2 };");
    match &single_rule(&program).tables[0] {
        Table::Filter { filter, .. } => match filter {
            BooleanExpr::External { invocation, filter } => {
                assert_eq!(invocation.qualified_name(), "com.bar.check");
                assert!(matches!(**filter, BooleanExpr::Atom { .. }));
            }
            other => panic!("expected get-predicate, got {other:?}"),
        },
        other => panic!("expected filter, got {other:?}"),
    }
}

#[test]
fn projection_sort_index_slice() {
    let program = parse_ok("[title] of (sort score desc of @com.foo.q());");
    match &single_rule(&program).tables[0] {
        Table::Projection { table, fields, .. } => {
            assert_eq!(fields, &vec!["title".to_string()]);
            assert!(matches!(**table, Table::Sort { .. }));
        }
        other => panic!("expected projection, got {other:?}"),
    }

    let program = parse_ok("@com.foo.q()[1];");
    assert!(matches!(
        single_rule(&program).tables[0],
        Table::Index { .. }
    ));

    let program = parse_ok("@com.foo.q()[1 : 3];");
    assert!(matches!(
        single_rule(&program).tables[0],
        Table::Slice { .. }
    ));

    let program = parse_ok("@com.foo.q()[-1];");
    match &single_rule(&program).tables[0] {
        Table::Index { indices, .. } => assert_eq!(indices, &vec![Value::Number(-1.0)]),
        other => panic!("expected index, got {other:?}"),
    }
}

#[test]
fn aggregation_and_argmax() {
    let program = parse_ok("aggregate count of @com.foo.q();");
    match &single_rule(&program).tables[0] {
        Table::Aggregation { op, field, .. } => {
            assert_eq!(*op, AggregationOp::Count);
            assert!(field.is_none());
        }
        other => panic!("expected aggregation, got {other:?}"),
    }

    let program = parse_ok("aggregate avg temperature of @org.weather.current(location=$?);");
    match &single_rule(&program).tables[0] {
        Table::Aggregation { op, field, .. } => {
            assert_eq!(*op, AggregationOp::Avg);
            assert_eq!(field.as_deref(), Some("temperature"));
        }
        other => panic!("expected aggregation, got {other:?}"),
    }

    let program = parse_ok("argmax 1, 5 score of @com.foo.q();");
    match &single_rule(&program).tables[0] {
        Table::ArgMinMax {
            op, field, base, limit, ..
        } => {
            assert_eq!(*op, MinMax::Max);
            assert_eq!(field, "score");
            assert_eq!(base, &Value::Number(1.0));
            assert_eq!(limit, &Value::Number(5.0));
        }
        other => panic!("expected argmax, got {other:?}"),
    }
}

#[test]
fn join_with_on_clause() {
    let program = parse_ok("now => @a.q() join @b.q() on (x=y) => notify;");
    match &single_rule(&program).tables[0] {
        Table::Join { on, .. } => {
            assert_eq!(on.len(), 1);
            assert_eq!(on[0].name, "x");
            assert_eq!(on[0].value, Value::VarRef("y".to_string()));
        }
        other => panic!("expected join, got {other:?}"),
    }
}

#[test]
fn stream_join() {
    let program = parse_ok("monitor @a.q() join @b.q() => notify;");
    match single_rule(&program).stream.as_ref().unwrap() {
        Stream::Join { stream, table, .. } => {
            assert!(matches!(**stream, Stream::Monitor { .. }));
            assert!(matches!(**table, Table::Invocation(_)));
        }
        other => panic!("expected stream join, got {other:?}"),
    }
}

#[test]
fn executor_prefix() {
    let program = parse_ok(
        r#"executor = "1234"^^tt:contact : now => @security-camera.current_event() => return;"#,
    );
    assert_eq!(
        program.principal,
        Some(Value::Entity {
            value: "1234".to_string(),
            display: None,
            ty: "tt:contact".to_string(),
        })
    );
    let rule = single_rule(&program);
    assert_eq!(rule.actions, vec![Action::Return]);
    assert_eq!(rule.tables.len(), 1);
}

#[test]
fn declarations_and_varref_calls() {
    let program = parse_ok(
        "let query comics := @com.xkcd.get_comic(number=42);\nnow => comics() => notify;",
    );
    let decl = program.declarations().next().unwrap();
    assert_eq!(decl.kind, DeclarationKind::Query);
    assert_eq!(decl.name, "comics");
    let rule = program.rules().next().unwrap();
    assert!(matches!(rule.tables[0], Table::VarRef { .. }));
}

#[test]
fn procedure_declaration_and_result() {
    let program = parse_ok(
        "let procedure announce := @com.twitter.post(status=\"x\");\nnow => result(@announce) => notify;",
    );
    let decl = program.declarations().next().unwrap();
    assert_eq!(decl.kind, DeclarationKind::Procedure);
    let rule = program.rules().next().unwrap();
    match &rule.tables[0] {
        Table::Result { name, .. } => assert_eq!(name, "announce"),
        other => panic!("expected result table, got {other:?}"),
    }
}

#[test]
fn device_attributes_on_selector() {
    let program = parse_ok(r#"@com.hue(id="hue-1"^^tt:device_id).set_power(power=enum(on));"#);
    match &single_rule(&program).tables[0] {
        Table::Invocation(inv) => {
            assert_eq!(inv.selector.kind, "com.hue");
            assert_eq!(inv.channel, "set_power");
            assert_eq!(
                inv.selector.attribute("id"),
                Some(&Value::Entity {
                    value: "hue-1".to_string(),
                    display: None,
                    ty: "tt:device_id".to_string(),
                })
            );
        }
        other => panic!("expected invocation, got {other:?}"),
    }
}
