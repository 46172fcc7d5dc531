//! Reference interpreter for compiled rule plans. Executes the step
//! pipeline against an [`ExecEnvironment`], honoring error-recovery
//! boundaries: a failure inside an invocation boundary is reported and
//! confined to the tuple that triggered it, while head setup failures
//! abort the rule.

mod state;

#[cfg(test)]
mod tests;

use orion_error::StructError;
use serde_json::Value as Json;
use tracing::{debug, warn};

use tt_compile::plan::{HeadPlan, InvokePlan, MonitorPlan, ProgramPlan, RulePlan, Step};
use tt_compile::ErrorScope;
use tt_lang::ast::{SortDirection, Value};
use tt_lang::eval::{eval_filter, eval_value};

use crate::env::{ExecEnvironment, Tuple};
use crate::error::{ExecReason, ExecResult};

use state::{tuple_from_state, tuple_to_state};

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run every rule of a program, in statement order.
pub async fn run_program(plan: &ProgramPlan, env: &mut dyn ExecEnvironment) -> ExecResult<()> {
    for rule in &plan.rules {
        run_rule(rule, env).await?;
    }
    Ok(())
}

/// Run one rule to completion: drain the head, push every tuple through the
/// pipeline, then run the finalizers.
pub async fn run_rule(rule: &RulePlan, env: &mut dyn ExecEnvironment) -> ExecResult<()> {
    debug!(rule = %rule.name, "rule start");
    match &rule.head {
        HeadPlan::Now => {
            run_steps(&rule.steps, vec![Tuple::new()], env).await?;
        }
        HeadPlan::Timer {
            base,
            interval,
            frequency,
        } => {
            // Setup failures abort the rule; per-tick failures are confined.
            let mut stream = env.invoke_timer(base, interval, frequency.as_ref()).await?;
            loop {
                match stream.next().await {
                    Ok(Some(tick)) => {
                        run_steps(&rule.steps, vec![tick], env).await?;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        env.report_error(ErrorScope::Timer, &e);
                        break;
                    }
                }
            }
        }
        HeadPlan::AtTimer { times, expiration } => {
            let mut stream = env.invoke_at_timer(times, expiration.as_ref()).await?;
            loop {
                match stream.next().await {
                    Ok(Some(tick)) => {
                        run_steps(&rule.steps, vec![tick], env).await?;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        env.report_error(ErrorScope::AtTimer, &e);
                        break;
                    }
                }
            }
        }
        HeadPlan::Monitor(monitor) => {
            run_monitor(rule, monitor, env).await?;
        }
    }
    for step in &rule.finalizers {
        if let Step::SendEndOfFlow { principal, flow } = step {
            env.send_end_of_flow(principal, flow).await?;
        }
    }
    debug!(rule = %rule.name, "rule end");
    Ok(())
}

// ---------------------------------------------------------------------------
// Monitor head
// ---------------------------------------------------------------------------

/// Poll the monitored query and pass only tuples whose key projection was
/// not in the last-observed result set. The slot always ends up holding the
/// current set, so an unchanged source produces zero emissions on re-run.
async fn run_monitor(
    rule: &RulePlan,
    monitor: &MonitorPlan,
    env: &mut dyn ExecEnvironment,
) -> ExecResult<()> {
    let params = resolve_params(&monitor.invocation, &Tuple::new())?;
    let mut stream = env
        .invoke_monitor(&monitor.invocation.function, &params)
        .await?;

    let prior: Vec<Json> = match env.read_state(monitor.state_slot) {
        Json::Array(entries) => entries,
        _ => Vec::new(),
    };
    let mut current: Vec<Json> = Vec::new();

    loop {
        match stream.next().await {
            Ok(Some(tuple)) => {
                // Inputs participate in identity: a monitor re-pointed at a
                // different target starts fresh.
                let mut keyed = tuple.clone();
                for (name, value) in &params {
                    keyed.entry(name.clone()).or_insert_with(|| value.clone());
                }
                let key = projection_key(&keyed, &monitor.key_fields);
                let is_new = !prior.contains(&key);
                if !current.contains(&key) {
                    current.push(key);
                }
                if is_new {
                    run_steps(&rule.steps, vec![keyed], env).await?;
                }
            }
            Ok(None) => break,
            Err(e) => {
                env.report_error(ErrorScope::Trigger, &e);
                break;
            }
        }
    }
    env.write_state(monitor.state_slot, Json::Array(current));
    Ok(())
}

fn projection_key(tuple: &Tuple, fields: &[String]) -> Json {
    let mut projected = Tuple::new();
    for field in fields {
        if let Some(value) = tuple.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }
    tuple_to_state(&projected)
}

// ---------------------------------------------------------------------------
// Step pipeline
// ---------------------------------------------------------------------------

async fn run_steps(
    steps: &[Step],
    mut tuples: Vec<Tuple>,
    env: &mut dyn ExecEnvironment,
) -> ExecResult<Vec<Tuple>> {
    for step in steps {
        tuples = run_step(step, tuples, env).await?;
    }
    Ok(tuples)
}

async fn run_step(
    step: &Step,
    tuples: Vec<Tuple>,
    env: &mut dyn ExecEnvironment,
) -> ExecResult<Vec<Tuple>> {
    match step {
        Step::Query(invoke) => {
            let mut out = Vec::new();
            for tuple in tuples {
                let params = match resolve_params(invoke, &tuple) {
                    Ok(params) => params,
                    Err(e) => {
                        env.report_error(ErrorScope::Query, &e);
                        continue;
                    }
                };
                match env.invoke_query(&invoke.function, &params).await {
                    Ok(rows) => {
                        for row in rows {
                            let mut merged = tuple.clone();
                            merged.extend(row);
                            out.push(merged);
                        }
                    }
                    Err(e) => {
                        warn!(function = %invoke.function, "query failed: {e}");
                        env.report_error(ErrorScope::Query, &e);
                    }
                }
            }
            Ok(out)
        }
        Step::GetPredicate {
            invocation,
            filter,
            negated,
        } => {
            let mut out = Vec::new();
            for tuple in tuples {
                let params = match resolve_params(invocation, &tuple) {
                    Ok(params) => params,
                    Err(e) => {
                        env.report_error(ErrorScope::GetPredicate, &e);
                        continue;
                    }
                };
                match env.invoke_query(&invocation.function, &params).await {
                    Ok(rows) => {
                        let satisfied = rows.iter().any(|row| {
                            let mut merged = tuple.clone();
                            merged.extend(row.clone());
                            eval_filter(filter, &merged) == Some(true)
                        });
                        if satisfied != *negated {
                            out.push(tuple);
                        }
                    }
                    Err(e) => {
                        env.report_error(ErrorScope::GetPredicate, &e);
                    }
                }
            }
            Ok(out)
        }
        Step::Filter(filter) => Ok(tuples
            .into_iter()
            .filter(|tuple| eval_filter(filter, tuple) == Some(true))
            .collect()),
        Step::Project(fields) => Ok(tuples
            .into_iter()
            .map(|mut tuple| {
                tuple.retain(|name, _| fields.contains(name));
                tuple
            })
            .collect()),
        Step::Sort { field, direction } => {
            let mut buffer = tuples;
            sort_tuples(&mut buffer, field, *direction);
            Ok(buffer)
        }
        Step::Index(indices) => {
            let mut out = Vec::new();
            for index in indices {
                let index = eval_number(index)?;
                if let Some(tuple) = pick(&tuples, index) {
                    out.push(tuple.clone());
                }
            }
            Ok(out)
        }
        Step::Slice { base, limit } => {
            let base = eval_number(base)?;
            let limit = eval_number(limit)? as usize;
            let start = match pick_position(tuples.len(), base) {
                Some(start) => start,
                None => return Ok(Vec::new()),
            };
            Ok(tuples.into_iter().skip(start).take(limit).collect())
        }
        Step::Aggregate { op, field } => Ok(aggregate(tuples, *op, field.as_deref())),
        Step::ArgMinMax {
            op,
            field,
            base,
            limit,
            ..
        } => {
            let mut buffer = tuples;
            // Stable sort keeps first-seen order among ties.
            let direction = match op {
                tt_lang::ast::MinMax::Min => SortDirection::Asc,
                tt_lang::ast::MinMax::Max => SortDirection::Desc,
            };
            sort_tuples(&mut buffer, field, direction);
            let base = eval_number(base)?;
            let limit = eval_number(limit)? as usize;
            let start = match pick_position(buffer.len(), base) {
                Some(start) => start,
                None => return Ok(Vec::new()),
            };
            Ok(buffer.into_iter().skip(start).take(limit).collect())
        }
        Step::Join { steps, dedup_slot } => {
            let mut out = Vec::new();
            for tuple in tuples {
                let joined = Box::pin(run_steps(steps, vec![tuple], env)).await?;
                out.extend(joined);
            }
            if let Some(slot) = dedup_slot {
                out = dedup_against_slot(out, *slot, env);
            }
            Ok(out)
        }
        Step::Action(invoke) => {
            for tuple in &tuples {
                let params = match resolve_params(invoke, tuple) {
                    Ok(params) => params,
                    Err(e) => {
                        env.report_error(ErrorScope::Action, &e);
                        continue;
                    }
                };
                if let Err(e) = env.invoke_action(&invoke.function, &params).await {
                    warn!(function = %invoke.function, "action failed: {e}");
                    env.report_error(ErrorScope::Action, &e);
                }
            }
            Ok(tuples)
        }
        Step::Emit => {
            for tuple in &tuples {
                if let Err(e) = env.output(tuple).await {
                    env.report_error(ErrorScope::Action, &e);
                }
            }
            Ok(tuples)
        }
        Step::SaveResult { state_slot } => {
            if let Some(last) = tuples.last() {
                env.write_state(*state_slot, tuple_to_state(last));
            }
            Ok(tuples)
        }
        Step::ReadResult { state_slot } => {
            let saved = env.read_state(*state_slot);
            Ok(tuple_from_state(&saved).into_iter().collect())
        }
        Step::SendEndOfFlow { principal, flow } => {
            env.send_end_of_flow(principal, flow).await?;
            Ok(tuples)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_params(invoke: &InvokePlan, tuple: &Tuple) -> ExecResult<Tuple> {
    let mut params = Tuple::new();
    for (name, value) in &invoke.params {
        let resolved = eval_value(value, tuple).ok_or_else(|| {
            StructError::from(ExecReason::Eval)
                .with_detail(format!("cannot resolve `{name}` for {}", invoke.function))
        })?;
        params.insert(name.clone(), resolved);
    }
    Ok(params)
}

fn eval_number(value: &Value) -> ExecResult<i64> {
    match eval_value(value, &Tuple::new()) {
        Some(Value::Number(n)) => Ok(n as i64),
        other => Err(StructError::from(ExecReason::Eval)
            .with_detail(format!("expected a number, found {other:?}"))),
    }
}

/// 1-based selection; negative counts from the end; out of range is `None`.
fn pick_position(len: usize, index: i64) -> Option<usize> {
    if index > 0 {
        let i = (index - 1) as usize;
        (i < len).then_some(i)
    } else if index < 0 {
        let back = (-index) as usize;
        (back <= len).then(|| len - back)
    } else {
        None
    }
}

fn pick(tuples: &[Tuple], index: i64) -> Option<&Tuple> {
    pick_position(tuples.len(), index).map(|i| &tuples[i])
}

fn sort_tuples(tuples: &mut [Tuple], field: &str, direction: SortDirection) {
    tuples.sort_by(|a, b| {
        let ord = compare_values(a.get(field), b.get(field));
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let (Some(a), Some(b)) = (a, b) else {
        return Ordering::Equal;
    };
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => text(a).cmp(&text(b)),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Measure(v, unit) => Some(v * tt_lang::ast::unit_factor(unit)),
        Value::Currency(v, _) => Some(*v),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) | Value::Enum(s) => s.clone(),
        Value::Entity { value, .. } => value.clone(),
        other => other.to_string(),
    }
}

fn aggregate(tuples: Vec<Tuple>, op: tt_lang::ast::AggregationOp, field: Option<&str>) -> Vec<Tuple> {
    use tt_lang::ast::AggregationOp;
    match op {
        AggregationOp::Count => {
            let mut out = Tuple::new();
            out.insert("count".to_string(), Value::Number(tuples.len() as f64));
            vec![out]
        }
        _ => {
            let Some(field) = field else {
                return Vec::new();
            };
            let values: Vec<f64> = tuples
                .iter()
                .filter_map(|t| t.get(field).and_then(numeric))
                .collect();
            if values.is_empty() {
                return Vec::new();
            }
            let result = match op {
                AggregationOp::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
                AggregationOp::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                AggregationOp::Sum => values.iter().sum(),
                AggregationOp::Avg => values.iter().sum::<f64>() / values.len() as f64,
                AggregationOp::Count => unreachable!(),
            };
            let mut out = Tuple::new();
            out.insert(field.to_string(), Value::Number(result));
            vec![out]
        }
    }
}

/// Keep only tuples not yet recorded in the slot; record the survivors.
fn dedup_against_slot(
    tuples: Vec<Tuple>,
    slot: usize,
    env: &mut dyn ExecEnvironment,
) -> Vec<Tuple> {
    let mut seen: Vec<Json> = match env.read_state(slot) {
        Json::Array(entries) => entries,
        _ => Vec::new(),
    };
    let mut out = Vec::new();
    for tuple in tuples {
        let key = tuple_to_state(&tuple);
        if !seen.contains(&key) {
            seen.push(key);
            out.push(tuple);
        }
    }
    env.write_state(slot, Json::Array(seen));
    out
}
