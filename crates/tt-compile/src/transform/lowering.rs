use tt_lang::ast::*;
use tt_schema::SchemaResolver;

use crate::checker::TypeChecker;
use crate::error::{CompileReason, CompileResult, err_detail};

/// Kind of the synthesized class carrying cross-principal traffic.
pub const REMOTE_KIND: &str = "org.thingtalk.remote";

/// Result of `executor=` lowering: the program that stays on this device,
/// and one program per remote principal to ship out.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredProgram {
    pub local: Program,
    pub sends: Vec<(Value, Program)>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Lower remote execution. A program with no executor keeps its shape
/// (modulo `return` becoming `notify`); a program with `executor = p` is
/// rewritten into (a) the shipped program, whose `return` actions send
/// through a synthesized remote class, and (b) a local receive-side program
/// monitoring the matching `receive` query. Both results are re-checked.
pub async fn lower_program(
    resolver: &SchemaResolver,
    program: &Program,
    self_principal: &Value,
    program_id: &str,
) -> CompileResult<LoweredProgram> {
    let Some(principal) = program.principal.clone() else {
        let mut local = program.clone();
        for statement in &mut local.statements {
            if let Statement::Rule(rule) = statement {
                for action in &mut rule.actions {
                    if *action == Action::Return {
                        *action = Action::Notify;
                    }
                }
            }
        }
        return Ok(LoweredProgram {
            local,
            sends: Vec::new(),
        });
    };

    let program_id_value = Value::Entity {
        value: program_id.to_string(),
        display: None,
        ty: "tt:program_id".to_string(),
    };

    // Rewrite every `return` into a send through the remote class; collect
    // the per-flow output signatures for the synthesized class.
    let mut flows: Vec<Vec<ArgDef>> = Vec::new();
    let mut remote = program.clone();
    for statement in &mut remote.statements {
        let Statement::Rule(rule) = statement else {
            continue;
        };
        let outs = rule_outputs(rule);
        for action in &mut rule.actions {
            if *action != Action::Return {
                continue;
            }
            if outs.is_empty() {
                return Err(err_detail(
                    CompileReason::RemoteLoweringError,
                    "`return` in a rule with no outputs to send",
                ));
            }
            let flow = flows.len();
            let mut inv = Invocation::new(REMOTE_KIND, "send");
            inv.in_params.push(InputParam::new(
                "__principal",
                self_principal.clone(),
            ));
            inv.in_params
                .push(InputParam::new("__program_id", program_id_value.clone()));
            inv.in_params
                .push(InputParam::new("__flow", Value::Number(flow as f64)));
            for arg in &outs {
                inv.in_params.push(InputParam::new(
                    arg.name.clone(),
                    Value::VarRef(arg.name.clone()),
                ));
            }
            *action = Action::Invocation(inv);
            flows.push(outs.clone());
        }
    }
    if flows.is_empty() {
        return Err(err_detail(
            CompileReason::RemoteLoweringError,
            "executor program has no `return` to lower",
        ));
    }

    let remote_class = synthesize_remote_class(&flows);
    remote
        .statements
        .insert(0, Statement::ClassDef(remote_class.clone()));

    // Receive side: monitor each flow and notify.
    let mut local_statements = vec![Statement::ClassDef(remote_class)];
    for flow in 0..flows.len() {
        let mut inv = Invocation::new(REMOTE_KIND, "receive");
        inv.in_params
            .push(InputParam::new("__principal", principal.clone()));
        inv.in_params
            .push(InputParam::new("__program_id", program_id_value.clone()));
        inv.in_params
            .push(InputParam::new("__flow", Value::Number(flow as f64)));
        local_statements.push(Statement::Rule(Rule {
            stream: Some(Stream::Monitor {
                table: Box::new(Table::Invocation(inv)),
                on_new: None,
            }),
            tables: Vec::new(),
            actions: vec![Action::Notify],
        }));
    }
    let local = Program {
        principal: None,
        statements: local_statements,
    };

    // Both halves must stand on their own.
    let remote = recheck(resolver, &remote, "remote").await?;
    let local = recheck(resolver, &local, "local").await?;

    Ok(LoweredProgram {
        local,
        sends: vec![(principal, remote)],
    })
}

async fn recheck(
    resolver: &SchemaResolver,
    program: &Program,
    side: &str,
) -> CompileResult<Program> {
    let mut checker = TypeChecker::new(resolver);
    checker.check_program(program).await.map_err(|e| {
        err_detail(
            CompileReason::RemoteLoweringError,
            format!("{side} program failed to type-check: {e}"),
        )
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The output signature visible at the end of a rule's query chain.
fn rule_outputs(rule: &Rule) -> Vec<ArgDef> {
    let schema = rule
        .tables
        .last()
        .and_then(|t| t.schema())
        .or_else(|| rule.stream.as_ref().and_then(|s| s.schema()));
    schema
        .map(|s| s.out_args().cloned().collect())
        .unwrap_or_default()
}

fn synthesize_remote_class(flows: &[Vec<ArgDef>]) -> ClassDef {
    let mut class = ClassDef::new(REMOTE_KIND);

    // One send/receive pair covers every flow; flow payloads are unioned.
    let mut payload: Vec<ArgDef> = Vec::new();
    for flow in flows {
        for arg in flow {
            if payload.iter().all(|a| a.name != arg.name) {
                payload.push(arg.clone());
            }
        }
    }

    let header = |dir| {
        vec![
            ArgDef::new(dir, "__principal", Type::Entity("tt:contact".to_string())),
            ArgDef::new(
                dir,
                "__program_id",
                Type::Entity("tt:program_id".to_string()),
            ),
            ArgDef::new(dir, "__flow", Type::Number),
        ]
    };

    let mut send_args = header(ArgDirection::InReq);
    for arg in &payload {
        send_args.push(ArgDef::new(
            ArgDirection::InReq,
            arg.name.clone(),
            arg.ty.clone(),
        ));
    }
    let send = FunctionDef::new(REMOTE_KIND, "send", FunctionKind::Action, send_args);

    let mut receive_args = header(ArgDirection::InReq);
    for arg in &payload {
        receive_args.push(ArgDef::new(
            ArgDirection::Out,
            arg.name.clone(),
            arg.ty.clone(),
        ));
    }
    let mut receive = FunctionDef::new(REMOTE_KIND, "receive", FunctionKind::Query, receive_args);
    receive.is_list = true;
    receive.is_monitorable = true;

    class.actions.push(send);
    class.queries.push(receive);
    class
}
