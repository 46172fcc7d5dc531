//! Lowers a type-checked, optimized program into [`RulePlan`] descriptors:
//! a head per rule, a linear step pipeline with explicit dataflow, numbered
//! state slots, and finalizers for end-of-flow signalling.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use tt_lang::ast::*;
use tt_schema::SchemaResolver;

use crate::checker::TypeChecker;
use crate::error::{CompileReason, CompileResult, err_detail};
use crate::plan::{HeadPlan, InvokePlan, MonitorPlan, ProgramPlan, RulePlan, Step};
use crate::transform::{REMOTE_KIND, inline_declarations};

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse surface text, then run the full pipeline. Parse failures surface
/// as `SyntaxError`.
pub async fn compile_source(
    resolver: &SchemaResolver,
    source: &str,
) -> CompileResult<ProgramPlan> {
    let program = tt_lang::parse_program(source)
        .map_err(|e| err_detail(CompileReason::SyntaxError, e.to_string()))?;
    check_and_compile(resolver, &program).await
}

/// Type-check, optimize, then compile. The one-stop pipeline.
pub async fn check_and_compile(
    resolver: &SchemaResolver,
    program: &Program,
) -> CompileResult<ProgramPlan> {
    let mut checker = TypeChecker::new(resolver);
    let checked = checker.check_program(program).await?;
    let optimized = tt_lang::optimize_program(&checked);
    compile_program(&optimized)
}

/// Compile an already type-checked program. Every invocation must carry a
/// schema; an unresolved one is a bug in the caller's pipeline.
pub fn compile_program(program: &Program) -> CompileResult<ProgramPlan> {
    // Slots read through `result(...)` are shared across rules, so they are
    // allocated before any rule compiles. Producing rules are identified
    // before inlining erases the declared names from call sites.
    let mut slots = SlotAlloc::default();
    let mut result_slots: HashMap<String, usize> = HashMap::new();
    for name in collect_result_names(program) {
        result_slots.insert(name, slots.fresh());
    }
    let producers = find_producers(program, &result_slots);

    let program = inline_declarations(program);
    let mut rules = Vec::new();
    for (index, statement) in program.statements.iter().enumerate() {
        let Statement::Rule(rule) = statement else {
            continue;
        };
        let save_slot = producers.get(&index).copied();
        let plan = compile_rule(rule, index, save_slot, &mut slots, &result_slots)?;
        debug!(rule = %plan.name, steps = plan.steps.len(), "compiled rule");
        rules.push(plan);
    }
    Ok(ProgramPlan {
        rules,
        state_slot_count: slots.next,
    })
}

/// Map statement index → slot for rules that call a declaration whose
/// result is read elsewhere.
fn find_producers(
    program: &Program,
    result_slots: &HashMap<String, usize>,
) -> HashMap<usize, usize> {
    let mut producers = HashMap::new();
    for (index, statement) in program.statements.iter().enumerate() {
        let Statement::Rule(rule) = statement else {
            continue;
        };
        let mut produced: Option<usize> = None;
        for action in &rule.actions {
            if let Action::VarRef { name, .. } = action {
                if let Some(slot) = result_slots.get(name) {
                    produced = Some(*slot);
                }
            }
        }
        for table in &rule.tables {
            if let Table::VarRef { name, .. } = table {
                if let Some(slot) = result_slots.get(name) {
                    produced = Some(*slot);
                }
            }
        }
        if let Some(slot) = produced {
            producers.insert(index, slot);
        }
    }
    producers
}

// ---------------------------------------------------------------------------
// Slot allocation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SlotAlloc {
    next: usize,
}

impl SlotAlloc {
    fn fresh(&mut self) -> usize {
        let slot = self.next;
        self.next += 1;
        slot
    }
}

fn collect_result_names(program: &Program) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for statement in &program.statements {
        let Statement::Rule(rule) = statement else {
            continue;
        };
        for table in &rule.tables {
            collect_results_in_table(table, &mut names, &mut seen);
        }
    }
    names
}

fn collect_results_in_table(table: &Table, names: &mut Vec<String>, seen: &mut HashSet<String>) {
    match table {
        Table::Result { name, .. } => {
            if seen.insert(name.clone()) {
                names.push(name.clone());
            }
        }
        Table::Invocation(_) | Table::VarRef { .. } => {}
        Table::Filter { table, .. }
        | Table::Projection { table, .. }
        | Table::Sort { table, .. }
        | Table::Index { table, .. }
        | Table::Slice { table, .. }
        | Table::Aggregation { table, .. }
        | Table::ArgMinMax { table, .. } => collect_results_in_table(table, names, seen),
        Table::Join { lhs, rhs, .. } => {
            collect_results_in_table(lhs, names, seen);
            collect_results_in_table(rhs, names, seen);
        }
    }
}

// ---------------------------------------------------------------------------
// Rule compilation
// ---------------------------------------------------------------------------

fn compile_rule(
    rule: &Rule,
    index: usize,
    save_slot: Option<usize>,
    slots: &mut SlotAlloc,
    result_slots: &HashMap<String, usize>,
) -> CompileResult<RulePlan> {
    let mut steps = Vec::new();
    let mut finalizers = Vec::new();

    let head = match &rule.stream {
        None => HeadPlan::Now,
        Some(stream) => compile_stream(stream, slots, result_slots, &mut steps)?,
    };

    for table in &rule.tables {
        compile_table(table, slots, result_slots, &mut steps)?;
    }

    for action in &rule.actions {
        match action {
            Action::Notify | Action::Return => steps.push(Step::Emit),
            Action::Invocation(inv) => {
                let plan = invoke_plan(inv);
                if inv.selector.kind == REMOTE_KIND && inv.channel == "send" {
                    finalizers.push(Step::SendEndOfFlow {
                        principal: inv
                            .in_param("__principal")
                            .cloned()
                            .unwrap_or(Value::Undefined(false)),
                        flow: inv
                            .in_param("__flow")
                            .cloned()
                            .unwrap_or(Value::Number(0.0)),
                    });
                }
                steps.push(Step::Action(plan));
            }
            Action::VarRef { name, .. } => {
                // Declarations are inlined before compilation; a leftover
                // reference means the program never type-checked.
                return Err(err_detail(
                    CompileReason::UndeclaredName,
                    format!("unresolved action `{name}`"),
                ));
            }
        }
    }
    if let Some(slot) = save_slot {
        steps.push(Step::SaveResult { state_slot: slot });
    }

    let mut plan = RulePlan {
        name: format!("rule_{index}"),
        head,
        steps,
        finalizers,
        state_slot_count: 0,
        input_channels: Vec::new(),
        output_channels: Vec::new(),
    };
    plan.state_slot_count = count_slots(&plan);
    collect_channels(&mut plan);
    Ok(plan)
}

fn compile_stream(
    stream: &Stream,
    slots: &mut SlotAlloc,
    result_slots: &HashMap<String, usize>,
    steps: &mut Vec<Step>,
) -> CompileResult<HeadPlan> {
    match stream {
        Stream::Monitor { table, on_new } => {
            let schema = table.schema().cloned();
            let mut inner = Vec::new();
            compile_table(table, slots, result_slots, &mut inner)?;
            if inner.is_empty() {
                return Err(err_detail(
                    CompileReason::TypeMismatch,
                    "monitor over an empty pipeline",
                ));
            }
            let Step::Query(invocation) = inner.remove(0) else {
                return Err(err_detail(
                    CompileReason::TypeMismatch,
                    "monitor must wrap a query invocation",
                ));
            };
            let mut key_fields = match (on_new, &schema) {
                (Some(fields), _) => fields.clone(),
                (None, Some(schema)) => schema.change_keys(),
                (None, None) => Vec::new(),
            };
            for (name, _) in &invocation.params {
                if !key_fields.contains(name) {
                    key_fields.push(name.clone());
                }
            }
            steps.extend(inner);
            Ok(HeadPlan::Monitor(MonitorPlan {
                invocation,
                state_slot: slots.fresh(),
                key_fields,
            }))
        }
        Stream::Timer {
            base,
            interval,
            frequency,
        } => Ok(HeadPlan::Timer {
            base: base.clone(),
            interval: interval.clone(),
            frequency: frequency.clone(),
        }),
        Stream::AtTimer { times, expiration } => Ok(HeadPlan::AtTimer {
            times: times.clone(),
            expiration: expiration.clone(),
        }),
        Stream::Filter { stream, filter } => {
            let head = compile_stream(stream, slots, result_slots, steps)?;
            steps.extend(compile_filter(filter));
            Ok(head)
        }
        Stream::Join {
            stream, table, on, ..
        } => {
            let head = compile_stream(stream, slots, result_slots, steps)?;
            let mut rhs = Vec::new();
            compile_table(table, slots, result_slots, &mut rhs)?;
            bind_on_params(&mut rhs, on);
            steps.push(Step::Join {
                steps: rhs,
                dedup_slot: Some(slots.fresh()),
            });
            Ok(head)
        }
    }
}

fn compile_table(
    table: &Table,
    slots: &mut SlotAlloc,
    result_slots: &HashMap<String, usize>,
    steps: &mut Vec<Step>,
) -> CompileResult<()> {
    match table {
        Table::Invocation(inv) => {
            steps.push(Step::Query(invoke_plan(inv)));
            Ok(())
        }
        Table::VarRef { name, .. } => Err(err_detail(
            CompileReason::UndeclaredName,
            format!("unresolved query `{name}`"),
        )),
        Table::Result { name, .. } => {
            let slot = result_slots.get(name).ok_or_else(|| {
                err_detail(
                    CompileReason::UndeclaredName,
                    format!("`result(@{name})` has no producing statement"),
                )
            })?;
            steps.push(Step::ReadResult { state_slot: *slot });
            Ok(())
        }
        Table::Filter { table, filter } => {
            compile_table(table, slots, result_slots, steps)?;
            steps.extend(compile_filter(filter));
            Ok(())
        }
        Table::Projection { table, fields, .. } => {
            compile_table(table, slots, result_slots, steps)?;
            steps.push(Step::Project(fields.clone()));
            Ok(())
        }
        Table::Sort {
            table,
            field,
            direction,
        } => {
            compile_table(table, slots, result_slots, steps)?;
            steps.push(Step::Sort {
                field: field.clone(),
                direction: *direction,
            });
            Ok(())
        }
        Table::Index { table, indices } => {
            compile_table(table, slots, result_slots, steps)?;
            steps.push(Step::Index(indices.clone()));
            Ok(())
        }
        Table::Slice { table, base, limit } => {
            compile_table(table, slots, result_slots, steps)?;
            steps.push(Step::Slice {
                base: base.clone(),
                limit: limit.clone(),
            });
            Ok(())
        }
        Table::Join { lhs, rhs, on, .. } => {
            compile_table(lhs, slots, result_slots, steps)?;
            let mut rhs_steps = Vec::new();
            compile_table(rhs, slots, result_slots, &mut rhs_steps)?;
            bind_on_params(&mut rhs_steps, on);
            steps.push(Step::Join {
                steps: rhs_steps,
                dedup_slot: None,
            });
            Ok(())
        }
        Table::Aggregation {
            table, op, field, ..
        } => {
            compile_table(table, slots, result_slots, steps)?;
            steps.push(Step::Aggregate {
                op: *op,
                field: field.clone(),
            });
            Ok(())
        }
        Table::ArgMinMax {
            table,
            op,
            field,
            base,
            limit,
        } => {
            compile_table(table, slots, result_slots, steps)?;
            steps.push(Step::ArgMinMax {
                op: *op,
                field: field.clone(),
                base: base.clone(),
                limit: limit.clone(),
                state_slot: slots.fresh(),
            });
            Ok(())
        }
    }
}

/// Split a conjunction into cheap row filters and get-predicate steps.
fn compile_filter(filter: &BooleanExpr) -> Vec<Step> {
    let filter = tt_lang::optimize_filter(filter);
    let children = match filter {
        BooleanExpr::And(children) => children,
        BooleanExpr::True => return Vec::new(),
        other => vec![other],
    };

    let mut pure = Vec::new();
    let mut predicates = Vec::new();
    for child in children {
        match child {
            BooleanExpr::External { invocation, filter } => {
                predicates.push(Step::GetPredicate {
                    invocation: invoke_plan(&invocation),
                    filter: *filter,
                    negated: false,
                });
            }
            BooleanExpr::Not(inner) => match *inner {
                BooleanExpr::External { invocation, filter } => {
                    predicates.push(Step::GetPredicate {
                        invocation: invoke_plan(&invocation),
                        filter: *filter,
                        negated: true,
                    });
                }
                inner => pure.push(BooleanExpr::Not(Box::new(inner))),
            },
            other => pure.push(other),
        }
    }

    let mut steps = Vec::new();
    if !pure.is_empty() {
        steps.push(Step::Filter(tt_lang::optimize_filter(&BooleanExpr::And(
            pure,
        ))));
    }
    steps.extend(predicates);
    steps
}

fn invoke_plan(inv: &Invocation) -> InvokePlan {
    let mut params: Vec<(String, Value)> = inv
        .selector
        .attributes
        .iter()
        .map(|p| (format!("__attr_{}", p.name), p.value.clone()))
        .collect();
    params.extend(inv.in_params.iter().map(|p| (p.name.clone(), p.value.clone())));
    InvokePlan {
        function: inv.qualified_name(),
        params,
    }
}

/// Merge a join's `on` bindings into the first query invocation of the
/// right-hand pipeline.
fn bind_on_params(steps: &mut [Step], on: &[InputParam]) {
    if on.is_empty() {
        return;
    }
    for step in steps.iter_mut() {
        if let Step::Query(invoke) = step {
            for param in on {
                invoke.params.push((param.name.clone(), param.value.clone()));
            }
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Plan summaries
// ---------------------------------------------------------------------------

fn count_slots(plan: &RulePlan) -> usize {
    let mut seen = HashSet::new();
    if let HeadPlan::Monitor(m) = &plan.head {
        seen.insert(m.state_slot);
    }
    fn walk(step: &Step, seen: &mut HashSet<usize>) {
        match step {
            Step::ArgMinMax { state_slot, .. }
            | Step::SaveResult { state_slot }
            | Step::ReadResult { state_slot } => {
                seen.insert(*state_slot);
            }
            Step::Join { steps, dedup_slot } => {
                if let Some(slot) = dedup_slot {
                    seen.insert(*slot);
                }
                for step in steps {
                    walk(step, seen);
                }
            }
            _ => {}
        }
    }
    for step in plan.steps.iter().chain(&plan.finalizers) {
        walk(step, &mut seen);
    }
    seen.len()
}

fn collect_channels(plan: &mut RulePlan) {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    if let HeadPlan::Monitor(m) = &plan.head {
        inputs.push(m.invocation.function.clone());
    }
    fn walk(step: &Step, inputs: &mut Vec<String>, outputs: &mut Vec<String>) {
        match step {
            Step::Query(invoke) | Step::GetPredicate { invocation: invoke, .. } => {
                if !inputs.contains(&invoke.function) {
                    inputs.push(invoke.function.clone());
                }
            }
            Step::Action(invoke) => {
                if !outputs.contains(&invoke.function) {
                    outputs.push(invoke.function.clone());
                }
            }
            Step::Join { steps, .. } => {
                for step in steps {
                    walk(step, inputs, outputs);
                }
            }
            _ => {}
        }
    }
    for step in plan.steps.iter().chain(&plan.finalizers) {
        walk(step, &mut inputs, &mut outputs);
    }
    plan.input_channels = inputs;
    plan.output_channels = outputs;
}
