use super::expression::{InputParam, Invocation, Stream, Table};
use super::filters::BooleanExpr;
use super::program::{
    Action, Declaration, DeclarationBody, Program, Rule, Statement,
};
use super::types::Type;
use super::values::Value;

// ---------------------------------------------------------------------------
// Rewriter — pre-order rewrite with identity defaults
// ---------------------------------------------------------------------------

/// Pre-order AST rewriting. Each callback may return a replacement node;
/// returning `None` keeps the original. The walk descends into whichever
/// node survives the callback, so replacements are themselves rewritten.
pub trait Rewriter {
    fn rewrite_value(&mut self, _value: &Value) -> Option<Value> {
        None
    }
    fn rewrite_filter(&mut self, _filter: &BooleanExpr) -> Option<BooleanExpr> {
        None
    }
    fn rewrite_invocation(&mut self, _invocation: &Invocation) -> Option<Invocation> {
        None
    }
    fn rewrite_table(&mut self, _table: &Table) -> Option<Table> {
        None
    }
    fn rewrite_stream(&mut self, _stream: &Stream) -> Option<Stream> {
        None
    }
}

pub fn rewrite_program(program: &Program, r: &mut dyn Rewriter) -> Program {
    Program {
        principal: program.principal.as_ref().map(|p| rewrite_value(p, r)),
        statements: program
            .statements
            .iter()
            .map(|s| rewrite_statement(s, r))
            .collect(),
    }
}

pub fn rewrite_statement(statement: &Statement, r: &mut dyn Rewriter) -> Statement {
    match statement {
        Statement::ClassDef(c) => Statement::ClassDef(c.clone()),
        Statement::Dataset(d) => Statement::Dataset(d.clone()),
        Statement::Declaration(d) => Statement::Declaration(Declaration {
            kind: d.kind,
            name: d.name.clone(),
            params: d.params.clone(),
            body: match &d.body {
                DeclarationBody::Table(t) => DeclarationBody::Table(rewrite_table(t, r)),
                DeclarationBody::Stream(s) => DeclarationBody::Stream(rewrite_stream(s, r)),
                DeclarationBody::Action(a) => DeclarationBody::Action(rewrite_action(a, r)),
            },
        }),
        Statement::Rule(rule) => Statement::Rule(rewrite_rule(rule, r)),
    }
}

pub fn rewrite_rule(rule: &Rule, r: &mut dyn Rewriter) -> Rule {
    Rule {
        stream: rule.stream.as_ref().map(|s| rewrite_stream(s, r)),
        tables: rule.tables.iter().map(|t| rewrite_table(t, r)).collect(),
        actions: rule.actions.iter().map(|a| rewrite_action(a, r)).collect(),
    }
}

pub fn rewrite_action(action: &Action, r: &mut dyn Rewriter) -> Action {
    match action {
        Action::Notify => Action::Notify,
        Action::Return => Action::Return,
        Action::Invocation(inv) => Action::Invocation(rewrite_invocation(inv, r)),
        Action::VarRef {
            name,
            in_params,
            schema,
        } => Action::VarRef {
            name: name.clone(),
            in_params: in_params
                .iter()
                .map(|p| super::expression::InputParam::new(p.name.clone(), rewrite_value(&p.value, r)))
                .collect(),
            schema: schema.clone(),
        },
    }
}

pub fn rewrite_stream(stream: &Stream, r: &mut dyn Rewriter) -> Stream {
    let stream = r.rewrite_stream(stream).unwrap_or_else(|| stream.clone());
    match &stream {
        Stream::Monitor { table, on_new } => Stream::Monitor {
            table: Box::new(rewrite_table(table, r)),
            on_new: on_new.clone(),
        },
        Stream::Timer {
            base,
            interval,
            frequency,
        } => Stream::Timer {
            base: rewrite_value(base, r),
            interval: rewrite_value(interval, r),
            frequency: frequency.as_ref().map(|v| rewrite_value(v, r)),
        },
        Stream::AtTimer { times, expiration } => Stream::AtTimer {
            times: times.iter().map(|v| rewrite_value(v, r)).collect(),
            expiration: expiration.as_ref().map(|v| rewrite_value(v, r)),
        },
        Stream::Filter { stream, filter } => Stream::Filter {
            stream: Box::new(rewrite_stream(stream, r)),
            filter: rewrite_filter(filter, r),
        },
        Stream::Join {
            stream,
            table,
            on,
            schema,
        } => Stream::Join {
            stream: Box::new(rewrite_stream(stream, r)),
            table: Box::new(rewrite_table(table, r)),
            on: on
                .iter()
                .map(|p| super::expression::InputParam::new(p.name.clone(), rewrite_value(&p.value, r)))
                .collect(),
            schema: schema.clone(),
        },
    }
}

pub fn rewrite_table(table: &Table, r: &mut dyn Rewriter) -> Table {
    let table = r.rewrite_table(table).unwrap_or_else(|| table.clone());
    match &table {
        Table::Invocation(inv) => Table::Invocation(rewrite_invocation(inv, r)),
        Table::VarRef {
            name,
            in_params,
            schema,
        } => Table::VarRef {
            name: name.clone(),
            in_params: in_params
                .iter()
                .map(|p| super::expression::InputParam::new(p.name.clone(), rewrite_value(&p.value, r)))
                .collect(),
            schema: schema.clone(),
        },
        Table::Result { .. } => table.clone(),
        Table::Filter { table, filter } => Table::Filter {
            table: Box::new(rewrite_table(table, r)),
            filter: rewrite_filter(filter, r),
        },
        Table::Projection {
            table,
            fields,
            schema,
        } => Table::Projection {
            table: Box::new(rewrite_table(table, r)),
            fields: fields.clone(),
            schema: schema.clone(),
        },
        Table::Sort {
            table,
            field,
            direction,
        } => Table::Sort {
            table: Box::new(rewrite_table(table, r)),
            field: field.clone(),
            direction: *direction,
        },
        Table::Index { table, indices } => Table::Index {
            table: Box::new(rewrite_table(table, r)),
            indices: indices.iter().map(|v| rewrite_value(v, r)).collect(),
        },
        Table::Slice { table, base, limit } => Table::Slice {
            table: Box::new(rewrite_table(table, r)),
            base: rewrite_value(base, r),
            limit: rewrite_value(limit, r),
        },
        Table::Join {
            lhs,
            rhs,
            on,
            schema,
        } => Table::Join {
            lhs: Box::new(rewrite_table(lhs, r)),
            rhs: Box::new(rewrite_table(rhs, r)),
            on: on
                .iter()
                .map(|p| super::expression::InputParam::new(p.name.clone(), rewrite_value(&p.value, r)))
                .collect(),
            schema: schema.clone(),
        },
        Table::Aggregation {
            table,
            op,
            field,
            schema,
        } => Table::Aggregation {
            table: Box::new(rewrite_table(table, r)),
            op: *op,
            field: field.clone(),
            schema: schema.clone(),
        },
        Table::ArgMinMax {
            table,
            op,
            field,
            base,
            limit,
        } => Table::ArgMinMax {
            table: Box::new(rewrite_table(table, r)),
            op: *op,
            field: field.clone(),
            base: rewrite_value(base, r),
            limit: rewrite_value(limit, r),
        },
    }
}

pub fn rewrite_invocation(invocation: &Invocation, r: &mut dyn Rewriter) -> Invocation {
    let inv = r
        .rewrite_invocation(invocation)
        .unwrap_or_else(|| invocation.clone());
    Invocation {
        selector: super::expression::Selector {
            kind: inv.selector.kind.clone(),
            attributes: inv
                .selector
                .attributes
                .iter()
                .map(|p| super::expression::InputParam::new(p.name.clone(), rewrite_value(&p.value, r)))
                .collect(),
        },
        channel: inv.channel.clone(),
        in_params: inv
            .in_params
            .iter()
            .map(|p| super::expression::InputParam::new(p.name.clone(), rewrite_value(&p.value, r)))
            .collect(),
        schema: inv.schema.clone(),
    }
}

pub fn rewrite_filter(filter: &BooleanExpr, r: &mut dyn Rewriter) -> BooleanExpr {
    let filter = r.rewrite_filter(filter).unwrap_or_else(|| filter.clone());
    match &filter {
        BooleanExpr::True | BooleanExpr::False => filter.clone(),
        BooleanExpr::And(children) => {
            BooleanExpr::And(children.iter().map(|c| rewrite_filter(c, r)).collect())
        }
        BooleanExpr::Or(children) => {
            BooleanExpr::Or(children.iter().map(|c| rewrite_filter(c, r)).collect())
        }
        BooleanExpr::Not(inner) => BooleanExpr::Not(Box::new(rewrite_filter(inner, r))),
        BooleanExpr::Atom { name, op, value } => BooleanExpr::Atom {
            name: name.clone(),
            op: *op,
            value: rewrite_value(value, r),
        },
        BooleanExpr::External { invocation, filter } => BooleanExpr::External {
            invocation: rewrite_invocation(invocation, r),
            filter: Box::new(rewrite_filter(filter, r)),
        },
        BooleanExpr::Compute { lhs, op, rhs } => BooleanExpr::Compute {
            lhs: rewrite_value(lhs, r),
            op: *op,
            rhs: rewrite_value(rhs, r),
        },
    }
}

pub fn rewrite_value(value: &Value, r: &mut dyn Rewriter) -> Value {
    let value = r.rewrite_value(value).unwrap_or_else(|| value.clone());
    match &value {
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite_value(v, r)).collect()),
        Value::Computation { op, args, ty } => Value::Computation {
            op: op.clone(),
            args: args.iter().map(|v| rewrite_value(v, r)).collect(),
            ty: ty.clone(),
        },
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Slot iteration
// ---------------------------------------------------------------------------

/// One settable position in a program: an invocation input or a filter
/// right-hand side, together with the output names in scope at that point.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRef {
    /// Qualified function name of the holder, or `<filter>` for atoms whose
    /// enclosing table has no schema yet.
    pub owner: String,
    pub name: String,
    pub expected_type: Option<Type>,
    pub scope: Vec<String>,
    pub value: Value,
}

/// Collect every slot of the program, in statement order. Scope accumulates
/// the outputs of upstream tables within each rule.
pub fn iter_slots(program: &Program) -> impl Iterator<Item = SlotRef> {
    let mut slots = Vec::new();
    for statement in &program.statements {
        match statement {
            Statement::Rule(rule) => {
                let mut scope: Vec<String> = Vec::new();
                if let Some(stream) = &rule.stream {
                    stream_slots(stream, &mut scope, &mut slots);
                }
                for table in &rule.tables {
                    table_slots(table, &scope, &mut slots);
                    extend_scope(&mut scope, table.schema());
                }
                for action in &rule.actions {
                    match action {
                        Action::Invocation(inv) => invocation_slots(inv, &scope, &mut slots),
                        Action::VarRef { name, in_params, schema } => {
                            params_slots(name, in_params, schema.get(), &scope, &mut slots)
                        }
                        Action::Notify | Action::Return => {}
                    }
                }
            }
            Statement::Declaration(decl) => match &decl.body {
                DeclarationBody::Table(t) => table_slots(t, &[], &mut slots),
                DeclarationBody::Stream(s) => {
                    let mut scope = Vec::new();
                    stream_slots(s, &mut scope, &mut slots);
                }
                DeclarationBody::Action(Action::Invocation(inv)) => {
                    invocation_slots(inv, &[], &mut slots)
                }
                DeclarationBody::Action(_) => {}
            },
            Statement::ClassDef(_) | Statement::Dataset(_) => {}
        }
    }
    slots.into_iter()
}

fn extend_scope(scope: &mut Vec<String>, schema: Option<&super::function_def::FunctionSchema>) {
    if let Some(schema) = schema {
        for name in schema.out_names() {
            if !scope.contains(&name) {
                scope.push(name);
            }
        }
    }
}

fn stream_slots(stream: &Stream, scope: &mut Vec<String>, slots: &mut Vec<SlotRef>) {
    match stream {
        Stream::Monitor { table, .. } => {
            table_slots(table, scope, slots);
            extend_scope(scope, table.schema());
        }
        Stream::Timer {
            base,
            interval,
            frequency,
        } => {
            slots.push(SlotRef {
                owner: "timer".into(),
                name: "base".into(),
                expected_type: Some(Type::Date),
                scope: scope.clone(),
                value: base.clone(),
            });
            slots.push(SlotRef {
                owner: "timer".into(),
                name: "interval".into(),
                expected_type: Some(Type::Measure("ms".into())),
                scope: scope.clone(),
                value: interval.clone(),
            });
            if let Some(f) = frequency {
                slots.push(SlotRef {
                    owner: "timer".into(),
                    name: "frequency".into(),
                    expected_type: Some(Type::Number),
                    scope: scope.clone(),
                    value: f.clone(),
                });
            }
        }
        Stream::AtTimer { times, expiration } => {
            for t in times {
                slots.push(SlotRef {
                    owner: "attimer".into(),
                    name: "time".into(),
                    expected_type: Some(Type::Time),
                    scope: scope.clone(),
                    value: t.clone(),
                });
            }
            if let Some(e) = expiration {
                slots.push(SlotRef {
                    owner: "attimer".into(),
                    name: "expiration_date".into(),
                    expected_type: Some(Type::Date),
                    scope: scope.clone(),
                    value: e.clone(),
                });
            }
        }
        Stream::Filter { stream, filter } => {
            stream_slots(stream, scope, slots);
            filter_slots(filter, stream.schema(), scope, slots);
        }
        Stream::Join { stream, table, .. } => {
            stream_slots(stream, scope, slots);
            table_slots(table, scope, slots);
            extend_scope(scope, table.schema());
        }
    }
}

fn table_slots(table: &Table, scope: &[String], slots: &mut Vec<SlotRef>) {
    match table {
        Table::Invocation(inv) => invocation_slots(inv, scope, slots),
        Table::VarRef {
            name,
            in_params,
            schema,
        } => params_slots(name, in_params, schema.get(), scope, slots),
        Table::Result { .. } => {}
        Table::Filter { table, filter } => {
            table_slots(table, scope, slots);
            filter_slots(filter, table.schema(), scope, slots);
        }
        Table::Projection { table, .. }
        | Table::Sort { table, .. }
        | Table::Index { table, .. }
        | Table::Slice { table, .. }
        | Table::Aggregation { table, .. }
        | Table::ArgMinMax { table, .. } => table_slots(table, scope, slots),
        Table::Join { lhs, rhs, .. } => {
            table_slots(lhs, scope, slots);
            let mut joined = scope.to_vec();
            extend_scope(&mut joined, lhs.schema());
            table_slots(rhs, &joined, slots);
        }
    }
}

fn invocation_slots(inv: &Invocation, scope: &[String], slots: &mut Vec<SlotRef>) {
    let owner = inv.qualified_name();
    for param in &inv.in_params {
        let expected = inv
            .schema
            .get()
            .and_then(|s| s.arg(&param.name))
            .map(|a| a.ty.clone());
        slots.push(SlotRef {
            owner: owner.clone(),
            name: param.name.clone(),
            expected_type: expected,
            scope: scope.to_vec(),
            value: param.value.clone(),
        });
    }
}

fn params_slots(
    name: &str,
    in_params: &[InputParam],
    schema: Option<&super::function_def::FunctionSchema>,
    scope: &[String],
    slots: &mut Vec<SlotRef>,
) {
    for param in in_params {
        let expected = schema.and_then(|s| s.arg(&param.name)).map(|a| a.ty.clone());
        slots.push(SlotRef {
            owner: name.to_string(),
            name: param.name.clone(),
            expected_type: expected,
            scope: scope.to_vec(),
            value: param.value.clone(),
        });
    }
}

fn filter_slots(
    filter: &BooleanExpr,
    schema: Option<&super::function_def::FunctionSchema>,
    scope: &[String],
    slots: &mut Vec<SlotRef>,
) {
    match filter {
        BooleanExpr::True | BooleanExpr::False => {}
        BooleanExpr::And(children) | BooleanExpr::Or(children) => {
            for child in children {
                filter_slots(child, schema, scope, slots);
            }
        }
        BooleanExpr::Not(inner) => filter_slots(inner, schema, scope, slots),
        BooleanExpr::Atom { name, value, .. } => {
            let expected = schema.and_then(|s| s.arg(name)).map(|a| a.ty.clone());
            slots.push(SlotRef {
                owner: schema
                    .map(|s| s.qualified_name())
                    .unwrap_or_else(|| "<filter>".to_string()),
                name: name.clone(),
                expected_type: expected,
                scope: scope.to_vec(),
                value: value.clone(),
            });
        }
        BooleanExpr::External { invocation, filter } => {
            invocation_slots(invocation, scope, slots);
            let mut inner_scope = scope.to_vec();
            extend_scope(&mut inner_scope, invocation.schema.get());
            filter_slots(filter, invocation.schema.get(), &inner_scope, slots);
        }
        BooleanExpr::Compute { rhs, .. } => {
            slots.push(SlotRef {
                owner: schema
                    .map(|s| s.qualified_name())
                    .unwrap_or_else(|| "<filter>".to_string()),
                name: "<compute>".to_string(),
                expected_type: None,
                scope: scope.to_vec(),
                value: rhs.clone(),
            });
        }
    }
}
