use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as Json;

use tt_compile::plan::ProgramPlan;
use tt_compile::{ErrorScope, check_and_compile};
use tt_lang::ast::{LocationValue, Value};
use tt_schema::SchemaResolver;
use tt_schema::provider::EntityTypeRecord;

use super::*;
use crate::env::{ExecEnvironment, Tuple, TupleStream};
use crate::error::{ExecError, ExecReason, ExecResult};

// ---------------------------------------------------------------------------
// Mock environment
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockEnv {
    /// Scripted rows per function; monitors and queries share the table.
    rows: HashMap<String, Vec<Tuple>>,
    /// Functions whose actions fail when invoked.
    failing_actions: Vec<String>,
    timer_ticks: usize,
    state: HashMap<usize, Json>,
    outputs: Vec<Tuple>,
    actions: Vec<(String, Tuple)>,
    errors: Vec<ErrorScope>,
    ends_of_flow: Vec<(Value, Value)>,
}

impl MockEnv {
    fn with_rows(function: &str, rows: Vec<Tuple>) -> Self {
        let mut env = MockEnv::default();
        env.rows.insert(function.to_string(), rows);
        env
    }
}

struct VecStream(std::vec::IntoIter<Tuple>);

#[async_trait]
impl TupleStream for VecStream {
    async fn next(&mut self) -> ExecResult<Option<Tuple>> {
        Ok(self.0.next())
    }
}

#[async_trait]
impl ExecEnvironment for MockEnv {
    async fn invoke_monitor(
        &mut self,
        function: &str,
        _params: &Tuple,
    ) -> ExecResult<Box<dyn TupleStream>> {
        let rows = self.rows.get(function).cloned().unwrap_or_default();
        Ok(Box::new(VecStream(rows.into_iter())))
    }

    async fn invoke_timer(
        &mut self,
        _base: &Value,
        _interval: &Value,
        _frequency: Option<&Value>,
    ) -> ExecResult<Box<dyn TupleStream>> {
        let ticks: Vec<Tuple> = (0..self.timer_ticks).map(|_| Tuple::new()).collect();
        Ok(Box::new(VecStream(ticks.into_iter())))
    }

    async fn invoke_at_timer(
        &mut self,
        times: &[Value],
        _expiration: Option<&Value>,
    ) -> ExecResult<Box<dyn TupleStream>> {
        let ticks: Vec<Tuple> = times.iter().map(|_| Tuple::new()).collect();
        Ok(Box::new(VecStream(ticks.into_iter())))
    }

    async fn invoke_query(&mut self, function: &str, _params: &Tuple) -> ExecResult<Vec<Tuple>> {
        self.rows.get(function).cloned().ok_or_else(|| {
            orion_error::StructError::from(ExecReason::Invoke)
                .with_detail(format!("no such function `{function}`"))
        })
    }

    async fn invoke_action(&mut self, function: &str, params: &Tuple) -> ExecResult<()> {
        if self.failing_actions.iter().any(|f| f == function) {
            return Err(orion_error::StructError::from(ExecReason::Invoke)
                .with_detail(format!("`{function}` is down")));
        }
        self.actions.push((function.to_string(), params.clone()));
        Ok(())
    }

    fn read_state(&mut self, slot: usize) -> Json {
        self.state.get(&slot).cloned().unwrap_or(Json::Null)
    }

    fn write_state(&mut self, slot: usize, value: Json) {
        self.state.insert(slot, value);
    }

    async fn output(&mut self, tuple: &Tuple) -> ExecResult<()> {
        self.outputs.push(tuple.clone());
        Ok(())
    }

    fn report_error(&mut self, scope: ErrorScope, _error: &ExecError) {
        self.errors.push(scope);
    }

    async fn send_end_of_flow(&mut self, principal: &Value, flow: &Value) -> ExecResult<()> {
        self.ends_of_flow.push((principal.clone(), flow.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct NullProvider;

#[async_trait]
impl tt_schema::SchemaProvider for NullProvider {
    async fn get_schemas(&self, kinds: &[String], _use_meta: bool) -> anyhow::Result<String> {
        anyhow::bail!("no such kind: {}", kinds.join(","))
    }
    async fn get_device_code(&self, kind: &str) -> anyhow::Result<String> {
        anyhow::bail!("no such kind: {kind}")
    }
    async fn get_examples_by_kind(&self, kind: &str) -> anyhow::Result<String> {
        anyhow::bail!("no such kind: {kind}")
    }
    async fn get_all_entity_types(&self) -> anyhow::Result<Vec<EntityTypeRecord>> {
        Ok(vec![])
    }
}

const WEATHER: &str = r#"class @org.weather {
  monitorable list query current(in req location : Location, out temperature : Measure(C), out summary : String) #[minimal_projection=["temperature"]];
}"#;

const TWITTER: &str = r#"class @com.twitter {
  monitorable list query home_timeline(out text : String, out likes : Number);
  action post(in req status : String);
}"#;

async fn compile(source: &str, classes: &[&str]) -> ProgramPlan {
    let resolver = SchemaResolver::new(Box::new(NullProvider), None);
    for class in classes {
        resolver.inject_class(tt_lang::parse_class(class).unwrap());
    }
    let program = tt_lang::parse_program(source).unwrap();
    check_and_compile(&resolver, &program)
        .await
        .unwrap_or_else(|e| panic!("compile failed: {e:?}"))
}

fn weather_tuple(temp: f64, summary: &str) -> Tuple {
    Tuple::from([
        (
            "temperature".to_string(),
            Value::Measure(temp, "C".to_string()),
        ),
        ("summary".to_string(), Value::String(summary.to_string())),
    ])
}

fn timeline_tuple(text: &str, likes: f64) -> Tuple {
    Tuple::from([
        ("text".to_string(), Value::String(text.to_string())),
        ("likes".to_string(), Value::Number(likes)),
    ])
}

// ---------------------------------------------------------------------------
// Monitor semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitor_emits_on_change_and_never_twice() {
    let plan = compile(
        r#"monitor @org.weather.current(location=new Location(1, 3, "Somewhere")) => notify;"#,
        &[WEATHER],
    )
    .await;
    let rule = &plan.rules[0];

    let mut env = MockEnv::with_rows(
        "org.weather.current",
        vec![weather_tuple(21.0, "sunny")],
    );
    run_rule(rule, &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);
    assert_eq!(
        env.outputs[0].get("temperature"),
        Some(&Value::Measure(21.0, "C".to_string()))
    );
    // The emitted tuple carries the input binding as well.
    assert_eq!(
        env.outputs[0].get("location"),
        Some(&Value::Location(LocationValue {
            latitude: 1.0,
            longitude: 3.0,
            display: Some("Somewhere".to_string()),
        }))
    );

    // Identical input: zero emissions.
    env.outputs.clear();
    run_rule(rule, &mut env).await.unwrap();
    assert!(env.outputs.is_empty());

    // A changed reading fires again.
    env.rows.insert(
        "org.weather.current".to_string(),
        vec![weather_tuple(25.0, "hot")],
    );
    run_rule(rule, &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);
}

#[tokio::test]
async fn monitor_change_detection_uses_minimal_projection() {
    let plan = compile(
        "monitor @org.weather.current(location=new Location(1, 3)) => notify;",
        &[WEATHER],
    )
    .await;
    let rule = &plan.rules[0];

    let mut env = MockEnv::with_rows(
        "org.weather.current",
        vec![weather_tuple(21.0, "sunny")],
    );
    run_rule(rule, &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);

    // Same temperature, different summary: not a new tuple, because the
    // minimal projection is `temperature` only.
    env.outputs.clear();
    env.rows.insert(
        "org.weather.current".to_string(),
        vec![weather_tuple(21.0, "partly cloudy")],
    );
    run_rule(rule, &mut env).await.unwrap();
    assert!(env.outputs.is_empty());
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn query_feeds_action_parameters() {
    let plan = compile(
        "@com.twitter.home_timeline() => @com.twitter.post(status=text);",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("first", 3.0), timeline_tuple("second", 5.0)],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.actions.len(), 2);
    assert_eq!(env.actions[0].0, "com.twitter.post");
    assert_eq!(
        env.actions[0].1.get("status"),
        Some(&Value::String("first".to_string()))
    );
}

#[tokio::test]
async fn filters_drop_rows() {
    let plan = compile(
        "@com.twitter.home_timeline(), likes >= 4;",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("low", 1.0), timeline_tuple("high", 9.0)],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);
    assert_eq!(
        env.outputs[0].get("text"),
        Some(&Value::String("high".to_string()))
    );
}

#[tokio::test]
async fn sort_and_index_pick_the_top_row() {
    let plan = compile(
        "(sort likes desc of @com.twitter.home_timeline())[1];",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![
            timeline_tuple("a", 1.0),
            timeline_tuple("b", 7.0),
            timeline_tuple("c", 4.0),
        ],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);
    assert_eq!(
        env.outputs[0].get("text"),
        Some(&Value::String("b".to_string()))
    );
}

#[tokio::test]
async fn negative_and_out_of_range_indices() {
    let plan = compile("@com.twitter.home_timeline()[-1];", &[TWITTER]).await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("a", 1.0), timeline_tuple("b", 2.0)],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);
    assert_eq!(
        env.outputs[0].get("text"),
        Some(&Value::String("b".to_string()))
    );

    let plan = compile("@com.twitter.home_timeline()[10];", &[TWITTER]).await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("a", 1.0)],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert!(env.outputs.is_empty());
}

#[tokio::test]
async fn aggregation_scans_the_buffer() {
    let plan = compile(
        "aggregate count of @com.twitter.home_timeline();",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("a", 1.0), timeline_tuple("b", 2.0)],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);
    assert_eq!(env.outputs[0].get("count"), Some(&Value::Number(2.0)));

    let plan = compile(
        "aggregate avg likes of @com.twitter.home_timeline();",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("a", 1.0), timeline_tuple("b", 5.0)],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.outputs[0].get("likes"), Some(&Value::Number(3.0)));
}

#[tokio::test]
async fn argmax_keeps_first_seen_on_ties() {
    let plan = compile(
        "argmax 1, 2 likes of @com.twitter.home_timeline();",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![
            timeline_tuple("early", 5.0),
            timeline_tuple("late", 5.0),
            timeline_tuple("small", 1.0),
        ],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 2);
    assert_eq!(
        env.outputs[0].get("text"),
        Some(&Value::String("early".to_string()))
    );
    assert_eq!(
        env.outputs[1].get("text"),
        Some(&Value::String("late".to_string()))
    );
}

#[tokio::test]
async fn timer_ticks_drive_the_pipeline() {
    let plan = compile(
        "timer(base=$now, interval=1h) => @com.twitter.post(status=\"tick\");",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::default();
    env.timer_ticks = 3;
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.actions.len(), 3);
}

#[tokio::test]
async fn get_predicate_gates_tuples() {
    let plan = compile(
        "@com.twitter.home_timeline(), @org.weather.current(location=new Location(1, 3)) { temperature >= 20C };",
        &[TWITTER, WEATHER],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("a", 1.0)],
    );
    env.rows.insert(
        "org.weather.current".to_string(),
        vec![weather_tuple(25.0, "hot")],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);

    // Cold weather: the predicate fails and nothing flows.
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("a", 1.0)],
    );
    env.rows.insert(
        "org.weather.current".to_string(),
        vec![weather_tuple(5.0, "cold")],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert!(env.outputs.is_empty());
}

#[tokio::test]
async fn scalar_join_concatenates_tuples() {
    let lookup = r#"class @com.lookup {
  query by_name(in req name : String, out rank : Number);
}"#;
    let plan = compile(
        "now => @com.twitter.home_timeline() join @com.lookup.by_name() on (name=text) => notify;",
        &[TWITTER, lookup],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("a", 1.0)],
    );
    env.rows.insert(
        "com.lookup.by_name".to_string(),
        vec![Tuple::from([("rank".to_string(), Value::Number(3.0))])],
    );
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.outputs.len(), 1);
    let out = &env.outputs[0];
    assert_eq!(out.get("text"), Some(&Value::String("a".to_string())));
    assert_eq!(out.get("rank"), Some(&Value::Number(3.0)));
}

// ---------------------------------------------------------------------------
// Error boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn action_failures_are_confined_per_tuple() {
    let plan = compile(
        "@com.twitter.home_timeline() => @com.twitter.post(status=text);",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::with_rows(
        "com.twitter.home_timeline",
        vec![timeline_tuple("a", 1.0), timeline_tuple("b", 2.0)],
    );
    env.failing_actions.push("com.twitter.post".to_string());
    // The rule itself completes; both failures are reported.
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.errors, vec![ErrorScope::Action, ErrorScope::Action]);
}

#[tokio::test]
async fn query_failures_report_and_continue() {
    let plan = compile(
        "@com.twitter.home_timeline() => @com.twitter.post(status=text);",
        &[TWITTER],
    )
    .await;
    // No scripted rows: the query itself errors.
    let mut env = MockEnv::default();
    run_rule(&plan.rules[0], &mut env).await.unwrap();
    assert_eq!(env.errors, vec![ErrorScope::Query]);
    assert!(env.actions.is_empty());
}

// ---------------------------------------------------------------------------
// Procedure results & end of flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn results_flow_across_rules_through_state() {
    let plan = compile(
        "let procedure announce := @com.twitter.post(status=\"hi\");\n\
         now => announce();\n\
         now => result(@announce) => notify;",
        &[TWITTER],
    )
    .await;
    let mut env = MockEnv::default();
    run_program(&plan, &mut env).await.unwrap();
    assert_eq!(env.actions.len(), 1);
    assert_eq!(env.outputs.len(), 1);
}

#[tokio::test]
async fn remote_send_closes_the_flow() {
    let camera = r#"class @security-camera {
  monitorable query current_event(out has_person : Boolean);
}"#;
    let resolver = SchemaResolver::new(Box::new(NullProvider), None);
    resolver.inject_class(tt_lang::parse_class(camera).unwrap());

    let program = tt_lang::parse_program(
        r#"executor = "1234"^^tt:contact : now => @security-camera.current_event() => return;"#,
    )
    .unwrap();
    let checked = tt_compile::TypeChecker::new(&resolver)
        .check_program(&program)
        .await
        .unwrap();
    let self_contact = Value::Entity {
        value: "self".to_string(),
        display: None,
        ty: "tt:contact".to_string(),
    };
    let lowered = tt_compile::lower_program(&resolver, &checked, &self_contact, "prog-1")
        .await
        .unwrap();

    // Execute the shipped half as the remote principal would.
    let remote_plan = tt_compile::compile_program(&lowered.sends[0].1).unwrap();
    let mut env = MockEnv::with_rows(
        "security-camera.current_event",
        vec![Tuple::from([(
            "has_person".to_string(),
            Value::Boolean(true),
        )])],
    );
    run_program(&remote_plan, &mut env).await.unwrap();
    assert_eq!(env.actions.len(), 1);
    assert_eq!(env.actions[0].0, "org.thingtalk.remote.send");
    assert_eq!(env.ends_of_flow.len(), 1);
    assert_eq!(env.ends_of_flow[0].1, Value::Number(0.0));
}
