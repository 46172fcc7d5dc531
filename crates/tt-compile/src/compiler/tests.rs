use tt_lang::ast::*;

use crate::plan::{HeadPlan, ProgramPlan, RulePlan, Step, plan_equivalent};
use crate::test_util::*;

use super::check_and_compile;

fn compile(source: &str, classes: &[&str]) -> ProgramPlan {
    let resolver = test_resolver(classes);
    block_on(check_and_compile(&resolver, &parse(source)))
        .unwrap_or_else(|e| panic!("compile failed for `{source}`: {e:?}"))
}

fn single(plan: &ProgramPlan) -> &RulePlan {
    assert_eq!(plan.rules.len(), 1);
    &plan.rules[0]
}

// =========================================================================
// 1. Monitor lowering
// =========================================================================

#[test]
fn monitor_rule_owns_a_state_slot_and_change_keys() {
    let plan = compile(
        r#"monitor @org.weather.current(location=new Location(1, 3, "Somewhere")) => notify;"#,
        &[WEATHER],
    );
    let rule = single(&plan);
    let HeadPlan::Monitor(monitor) = &rule.head else {
        panic!("expected monitor head, got {:?}", rule.head);
    };
    assert_eq!(monitor.invocation.function, "org.weather.current");
    assert_eq!(monitor.state_slot, 0);
    // Minimal projection plus the input binding.
    assert_eq!(monitor.key_fields, vec!["temperature", "location"]);

    assert_eq!(rule.steps, vec![Step::Emit]);
    assert_eq!(rule.state_slot_count, 1);
    assert_eq!(plan.state_slot_count, 1);
    assert_eq!(rule.input_channels, vec!["org.weather.current"]);
    assert!(rule.output_channels.is_empty());
}

#[test]
fn on_new_overrides_change_keys() {
    let plan = compile(
        "monitor @com.twitter.home_timeline() on new [author] => notify;",
        &[TWITTER],
    );
    let HeadPlan::Monitor(monitor) = &single(&plan).head else {
        panic!("expected monitor head");
    };
    assert_eq!(monitor.key_fields, vec!["author"]);
}

#[test]
fn monitor_filters_become_pipeline_steps() {
    let plan = compile(
        "monitor @org.weather.current(location=new Location(1, 3)), temperature >= 20C => notify;",
        &[WEATHER],
    );
    let rule = single(&plan);
    assert!(matches!(rule.head, HeadPlan::Monitor(_)));
    assert!(matches!(rule.steps[0], Step::Filter(_)));
    assert_eq!(rule.steps[1], Step::Emit);
}

// =========================================================================
// 2. Now pipelines
// =========================================================================

#[test]
fn query_then_action_pipeline() {
    let plan = compile(
        "@com.xkcd.get_comic(number=42) => @com.twitter.post(status=title);",
        &[XKCD, TWITTER],
    );
    let rule = single(&plan);
    assert_eq!(rule.head, HeadPlan::Now);
    match &rule.steps[..] {
        [Step::Query(q), Step::Action(a)] => {
            assert_eq!(q.function, "com.xkcd.get_comic");
            assert_eq!(a.function, "com.twitter.post");
        }
        other => panic!("unexpected steps: {other:?}"),
    }
    assert_eq!(rule.input_channels, vec!["com.xkcd.get_comic"]);
    assert_eq!(rule.output_channels, vec!["com.twitter.post"]);
    assert_eq!(rule.state_slot_count, 0);
}

#[test]
fn timer_heads_capture_their_schedule() {
    let plan = compile(
        "timer(base=$now, interval=1h, frequency=2) => @com.twitter.post(status=\"tick\");",
        &[TWITTER],
    );
    match &single(&plan).head {
        HeadPlan::Timer {
            base,
            interval,
            frequency,
        } => {
            assert_eq!(base, &Value::Date(DateValue::Now));
            assert_eq!(interval, &Value::Measure(1.0, "h".to_string()));
            assert_eq!(frequency, &Some(Value::Number(2.0)));
        }
        other => panic!("expected timer head, got {other:?}"),
    }
}

// =========================================================================
// 3. Combinators
// =========================================================================

#[test]
fn sort_index_slice_aggregate_steps_in_order() {
    let plan = compile(
        "(sort likes desc of @com.twitter.home_timeline())[1];",
        &[TWITTER],
    );
    let rule = single(&plan);
    match &rule.steps[..] {
        [Step::Query(_), Step::Sort { field, .. }, Step::Index(indices), Step::Emit] => {
            assert_eq!(field, "likes");
            assert_eq!(indices, &vec![Value::Number(1.0)]);
        }
        other => panic!("unexpected steps: {other:?}"),
    }

    let plan = compile(
        "aggregate count of @com.twitter.home_timeline();",
        &[TWITTER],
    );
    assert!(matches!(
        single(&plan).steps[1],
        Step::Aggregate {
            op: AggregationOp::Count,
            field: None
        }
    ));
}

#[test]
fn argminmax_owns_an_accumulator_slot() {
    let plan = compile(
        "argmax 1, 3 likes of @com.twitter.home_timeline();",
        &[TWITTER],
    );
    let rule = single(&plan);
    match &rule.steps[1] {
        Step::ArgMinMax {
            op,
            field,
            state_slot,
            ..
        } => {
            assert_eq!(*op, MinMax::Max);
            assert_eq!(field, "likes");
            assert_eq!(*state_slot, 0);
        }
        other => panic!("expected argminmax, got {other:?}"),
    }
    assert_eq!(rule.state_slot_count, 1);
}

#[test]
fn scalar_joins_nest_the_right_pipeline() {
    let lookup = r#"class @com.lookup {
  query by_name(in req name : String, out rank : Number);
}"#;
    let plan = compile(
        "now => @com.xkcd.get_comic() join @com.lookup.by_name() on (name=title) => notify;",
        &[XKCD, lookup],
    );
    let rule = single(&plan);
    match &rule.steps[..] {
        [Step::Query(_), Step::Join { steps, dedup_slot }, Step::Emit] => {
            assert!(dedup_slot.is_none());
            match &steps[..] {
                [Step::Query(q)] => {
                    assert_eq!(q.function, "com.lookup.by_name");
                    // The `on` binding feeds the right-hand invocation.
                    assert!(q.params.iter().any(|(name, value)| {
                        name == "name" && value == &Value::VarRef("title".to_string())
                    }));
                }
                other => panic!("unexpected join pipeline: {other:?}"),
            }
        }
        other => panic!("unexpected steps: {other:?}"),
    }
    assert_eq!(
        rule.input_channels,
        vec!["com.xkcd.get_comic", "com.lookup.by_name"]
    );
}

#[test]
fn stream_joins_carry_shared_dedup_state() {
    let plan = compile(
        "monitor @org.weather.current(location=new Location(1, 3)) join @com.twitter.home_timeline() => notify;",
        &[WEATHER, TWITTER],
    );
    let rule = single(&plan);
    assert!(matches!(rule.head, HeadPlan::Monitor(_)));
    match &rule.steps[0] {
        Step::Join { dedup_slot, .. } => assert!(dedup_slot.is_some()),
        other => panic!("expected stream join step, got {other:?}"),
    }
    // Monitor slot + dedup slot.
    assert_eq!(rule.state_slot_count, 2);
}

#[test]
fn get_predicates_become_their_own_steps() {
    let plan = compile(
        "@com.twitter.home_timeline(), (likes >= 10) && @org.weather.current(location=new Location(1, 3)) { temperature >= 20C };",
        &[TWITTER, WEATHER],
    );
    let rule = single(&plan);
    match &rule.steps[..] {
        [Step::Query(_), Step::Filter(_), Step::GetPredicate { invocation, negated, .. }, Step::Emit] => {
            assert_eq!(invocation.function, "org.weather.current");
            assert!(!negated);
        }
        other => panic!("unexpected steps: {other:?}"),
    }
    assert!(
        rule.input_channels
            .contains(&"org.weather.current".to_string())
    );
}

// =========================================================================
// 4. Procedure results
// =========================================================================

#[test]
fn results_are_memoized_through_shared_slots() {
    let plan = compile(
        "let procedure announce := @com.twitter.post(status=\"hi\");\n\
         now => announce();\n\
         now => result(@announce) => notify;",
        &[TWITTER],
    );
    assert_eq!(plan.rules.len(), 2);

    let producer = &plan.rules[0];
    match &producer.steps[..] {
        [Step::Action(a), Step::SaveResult { state_slot }] => {
            assert_eq!(a.function, "com.twitter.post");
            assert_eq!(*state_slot, 0);
        }
        other => panic!("unexpected producer steps: {other:?}"),
    }

    let consumer = &plan.rules[1];
    match &consumer.steps[..] {
        [Step::ReadResult { state_slot }, Step::Emit] => assert_eq!(*state_slot, 0),
        other => panic!("unexpected consumer steps: {other:?}"),
    }
}

// =========================================================================
// 5. Structural rule equality
// =========================================================================

#[test]
fn bad_surface_text_is_a_syntax_error() {
    let resolver = test_resolver(&[]);
    let err = block_on(super::compile_source(&resolver, "now => ;")).unwrap_err();
    assert!(format!("{err:?}").contains("SyntaxError"));
}

#[test]
fn identical_rules_compare_equal_modulo_slots() {
    let source = "monitor @org.weather.current(location=new Location(1, 3)) => notify;";
    let plan = compile(&format!("{source}\n{source}"), &[WEATHER]);
    assert_eq!(plan.rules.len(), 2);
    let (a, b) = (&plan.rules[0], &plan.rules[1]);
    // Different slot numbers, same dataflow.
    assert_ne!(a.head, b.head);
    assert!(plan_equivalent(a, b));

    let other = compile(
        "monitor @com.twitter.home_timeline() => notify;",
        &[TWITTER],
    );
    assert!(!plan_equivalent(a, &other.rules[0]));
}
