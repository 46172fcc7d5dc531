use tt_lang::ast::*;

use crate::error::{CompileReason, CompileResult, err_detail};

// ---------------------------------------------------------------------------
// Executability
// ---------------------------------------------------------------------------

/// A program is executable iff every required input is concretely bound: no
/// `$?` slot anywhere, every `in req` argument present, every
/// `require_either` group has a bound member, and every active
/// `required_if` condition is satisfied. Runs over a type-checked program.
pub fn is_executable(program: &Program) -> bool {
    if iter_slots(program).any(|slot| matches!(slot.value, Value::Undefined(true))) {
        return false;
    }
    for statement in &program.statements {
        let Statement::Rule(rule) = statement else {
            continue;
        };
        if let Some(stream) = &rule.stream {
            if !stream_ok(stream) {
                return false;
            }
        }
        for table in &rule.tables {
            if !table_ok(table, &[]) {
                return false;
            }
        }
        for action in &rule.actions {
            let ok = match action {
                Action::Invocation(inv) => {
                    invocation_ok(&inv.in_params, inv.schema.get(), &[])
                }
                Action::VarRef {
                    in_params, schema, ..
                } => invocation_ok(in_params, schema.get(), &[]),
                Action::Notify | Action::Return => true,
            };
            if !ok {
                return false;
            }
        }
    }
    true
}

/// Like [`is_executable`], but as a result for callers that want to abort.
pub fn require_executable(program: &Program) -> CompileResult<()> {
    if is_executable(program) {
        Ok(())
    } else {
        Err(err_detail(
            CompileReason::NonExecutable,
            "program has unbound required inputs",
        ))
    }
}

// ---------------------------------------------------------------------------
// Per-invocation requirements
// ---------------------------------------------------------------------------

fn bound(params: &[InputParam], extra: &[InputParam], name: &str) -> bool {
    params
        .iter()
        .chain(extra)
        .any(|p| p.name == name && !p.value.is_undefined())
}

/// `extra` carries bindings established outside the invocation itself, such
/// as a join's `on` clause.
fn invocation_ok(
    params: &[InputParam],
    schema: Option<&FunctionSchema>,
    extra: &[InputParam],
) -> bool {
    let Some(schema) = schema else {
        return true;
    };
    for arg in schema.in_args() {
        if arg.is_required() && !bound(params, extra, &arg.name) {
            return false;
        }
        if let Some(cond) = &arg.annotations.required_if {
            if required_if_active(cond, params) && !bound(params, extra, &arg.name) {
                return false;
            }
        }
    }
    for group in &schema.require_either {
        if !group.iter().any(|name| bound(params, extra, name)) {
            return false;
        }
    }
    true
}

/// `"param=value"`: active when the referenced parameter is bound to the
/// stated enum literal.
fn required_if_active(cond: &str, params: &[InputParam]) -> bool {
    let Some((param, literal)) = cond.split_once('=') else {
        return false;
    };
    params.iter().any(|p| {
        p.name == param
            && match &p.value {
                Value::Enum(label) => label == literal,
                Value::String(s) => s == literal,
                Value::Boolean(b) => literal == if *b { "true" } else { "false" },
                _ => false,
            }
    })
}

// ---------------------------------------------------------------------------
// Walkers
// ---------------------------------------------------------------------------

fn table_ok(table: &Table, extra: &[InputParam]) -> bool {
    match table {
        Table::Invocation(inv) => invocation_ok(&inv.in_params, inv.schema.get(), extra),
        Table::VarRef {
            in_params, schema, ..
        } => invocation_ok(in_params, schema.get(), extra),
        Table::Result { .. } => true,
        Table::Filter { table, filter } => {
            if !table_ok(table, extra) {
                return false;
            }
            let mut ok = true;
            filter.for_each_atom(&mut |atom| {
                if let BooleanExpr::External { invocation, .. } = atom {
                    ok = ok
                        && invocation_ok(&invocation.in_params, invocation.schema.get(), &[]);
                }
            });
            ok
        }
        Table::Projection { table, .. }
        | Table::Sort { table, .. }
        | Table::Index { table, .. }
        | Table::Slice { table, .. }
        | Table::Aggregation { table, .. }
        | Table::ArgMinMax { table, .. } => table_ok(table, extra),
        Table::Join { lhs, rhs, on, .. } => table_ok(lhs, extra) && table_ok(rhs, on),
    }
}

fn stream_ok(stream: &Stream) -> bool {
    match stream {
        Stream::Monitor { table, .. } => table_ok(table, &[]),
        Stream::Timer { .. } | Stream::AtTimer { .. } => true,
        Stream::Filter { stream, .. } => stream_ok(stream),
        Stream::Join { stream, table, on, .. } => stream_ok(stream) && table_ok(table, on),
    }
}
