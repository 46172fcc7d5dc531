//! Normalization of boolean filters and the query algebra. Pure AST→AST,
//! idempotent, and semantics-preserving.

use crate::ast::*;

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Canonicalize a filter: flatten nested `And`/`Or`, fold constants, drop
/// arity-0/1 connectives, remove double negation.
pub fn optimize_filter(filter: &BooleanExpr) -> BooleanExpr {
    match filter {
        BooleanExpr::True | BooleanExpr::False => filter.clone(),
        BooleanExpr::And(children) => {
            let mut flat = Vec::new();
            for child in children {
                match optimize_filter(child) {
                    BooleanExpr::True => {}
                    BooleanExpr::False => return BooleanExpr::False,
                    BooleanExpr::And(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            match flat.len() {
                0 => BooleanExpr::True,
                1 => flat.pop().unwrap(),
                _ => BooleanExpr::And(flat),
            }
        }
        BooleanExpr::Or(children) => {
            let mut flat = Vec::new();
            for child in children {
                match optimize_filter(child) {
                    BooleanExpr::False => {}
                    BooleanExpr::True => return BooleanExpr::True,
                    BooleanExpr::Or(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            match flat.len() {
                0 => BooleanExpr::False,
                1 => flat.pop().unwrap(),
                _ => BooleanExpr::Or(flat),
            }
        }
        BooleanExpr::Not(inner) => match optimize_filter(inner) {
            BooleanExpr::Not(x) => *x,
            BooleanExpr::True => BooleanExpr::False,
            BooleanExpr::False => BooleanExpr::True,
            other => BooleanExpr::Not(Box::new(other)),
        },
        BooleanExpr::Atom { .. } | BooleanExpr::Compute { .. } => filter.clone(),
        BooleanExpr::External { invocation, filter } => BooleanExpr::External {
            invocation: invocation.clone(),
            filter: Box::new(optimize_filter(filter)),
        },
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

pub fn optimize_table(table: &Table) -> Table {
    // Children first, then local rewrites until none apply.
    let mut current = rebuild_table(table);
    loop {
        match table_rewrite(&current) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

fn rebuild_table(table: &Table) -> Table {
    match table {
        Table::Invocation(_) | Table::VarRef { .. } | Table::Result { .. } => table.clone(),
        Table::Filter { table, filter } => Table::Filter {
            table: Box::new(optimize_table(table)),
            filter: optimize_filter(filter),
        },
        Table::Projection {
            table,
            fields,
            schema,
        } => Table::Projection {
            table: Box::new(optimize_table(table)),
            fields: fields.clone(),
            schema: schema.clone(),
        },
        Table::Sort {
            table,
            field,
            direction,
        } => Table::Sort {
            table: Box::new(optimize_table(table)),
            field: field.clone(),
            direction: *direction,
        },
        Table::Index { table, indices } => Table::Index {
            table: Box::new(optimize_table(table)),
            indices: indices.clone(),
        },
        Table::Slice { table, base, limit } => Table::Slice {
            table: Box::new(optimize_table(table)),
            base: base.clone(),
            limit: limit.clone(),
        },
        Table::Join {
            lhs,
            rhs,
            on,
            schema,
        } => Table::Join {
            lhs: Box::new(optimize_table(lhs)),
            rhs: Box::new(optimize_table(rhs)),
            on: on.clone(),
            schema: schema.clone(),
        },
        Table::Aggregation {
            table,
            op,
            field,
            schema,
        } => Table::Aggregation {
            table: Box::new(optimize_table(table)),
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
            table: Box::new(optimize_table(table)),
            op: *op,
            field: field.clone(),
            base: base.clone(),
            limit: limit.clone(),
        },
    }
}

/// One local rewrite step; children are assumed already optimized.
fn table_rewrite(table: &Table) -> Option<Table> {
    match table {
        // True filters disappear.
        Table::Filter { table, filter } if filter.is_true() => Some((**table).clone()),
        // Stacked filters fuse into one conjunction.
        Table::Filter { table: outer, filter: g } => match &**outer {
            Table::Filter { table: inner, filter: f } => Some(Table::Filter {
                table: inner.clone(),
                filter: optimize_filter(&BooleanExpr::And(vec![f.clone(), g.clone()])),
            }),
            _ => None,
        },
        // Projections push through sort (when the key survives), index and
        // slice, so they sit directly on the producing table.
        Table::Projection {
            table: inner,
            fields,
            schema,
        } => match &**inner {
            Table::Sort {
                table,
                field,
                direction,
            } if fields.contains(field) => Some(Table::Sort {
                table: Box::new(optimize_table(&Table::Projection {
                    table: table.clone(),
                    fields: fields.clone(),
                    schema: schema.clone(),
                })),
                field: field.clone(),
                direction: *direction,
            }),
            Table::Index { table, indices } => Some(Table::Index {
                table: Box::new(optimize_table(&Table::Projection {
                    table: table.clone(),
                    fields: fields.clone(),
                    schema: schema.clone(),
                })),
                indices: indices.clone(),
            }),
            Table::Slice { table, base, limit } => Some(Table::Slice {
                table: Box::new(optimize_table(&Table::Projection {
                    table: table.clone(),
                    fields: fields.clone(),
                    schema: schema.clone(),
                })),
                base: base.clone(),
                limit: limit.clone(),
            }),
            _ => None,
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Streams, rules & programs
// ---------------------------------------------------------------------------

pub fn optimize_stream(stream: &Stream) -> Stream {
    match stream {
        Stream::Monitor { table, on_new } => Stream::Monitor {
            table: Box::new(optimize_table(table)),
            on_new: on_new.clone(),
        },
        Stream::Timer { .. } | Stream::AtTimer { .. } => stream.clone(),
        Stream::Filter { stream, filter } => {
            let inner = optimize_stream(stream);
            match optimize_filter(filter) {
                BooleanExpr::True => inner,
                filter => Stream::Filter {
                    stream: Box::new(inner),
                    filter,
                },
            }
        }
        Stream::Join {
            stream,
            table,
            on,
            schema,
        } => Stream::Join {
            stream: Box::new(optimize_stream(stream)),
            table: Box::new(optimize_table(table)),
            on: on.clone(),
            schema: schema.clone(),
        },
    }
}

pub fn optimize_rule(rule: &Rule) -> Rule {
    Rule {
        stream: rule.stream.as_ref().map(optimize_stream),
        tables: rule.tables.iter().map(optimize_table).collect(),
        actions: rule.actions.clone(),
    }
}

pub fn optimize_program(program: &Program) -> Program {
    Program {
        principal: program.principal.clone(),
        statements: program
            .statements
            .iter()
            .map(|s| match s {
                Statement::Rule(r) => Statement::Rule(optimize_rule(r)),
                Statement::Declaration(d) => Statement::Declaration(Declaration {
                    kind: d.kind,
                    name: d.name.clone(),
                    params: d.params.clone(),
                    body: match &d.body {
                        DeclarationBody::Table(t) => DeclarationBody::Table(optimize_table(t)),
                        DeclarationBody::Stream(st) => {
                            DeclarationBody::Stream(optimize_stream(st))
                        }
                        DeclarationBody::Action(a) => DeclarationBody::Action(a.clone()),
                    },
                }),
                other => other.clone(),
            })
            .collect(),
    }
}
