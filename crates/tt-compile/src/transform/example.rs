use std::collections::HashMap;

use tt_lang::ast::visit::{self, Rewriter};
use tt_lang::ast::*;

// ---------------------------------------------------------------------------
// Example / declaration materialization
// ---------------------------------------------------------------------------

/// Ground a dataset example into a runnable program: parameters take their
/// bound values, unbound ones become `$?` slots.
pub fn example_to_program(example: &Example, bindings: &HashMap<String, Value>) -> Program {
    let subst: HashMap<String, Value> = example
        .params
        .iter()
        .map(|p| {
            let value = bindings
                .get(&p.name)
                .cloned()
                .unwrap_or(Value::Undefined(true));
            (p.name.clone(), value)
        })
        .collect();
    Program::new(vec![Statement::Rule(body_to_rule(&example.body, &subst))])
}

/// Materialize a named declaration as a standalone statement. Parameters
/// stay unbound (`$?`), making the program a template.
pub fn declaration_to_program(decl: &Declaration) -> Program {
    let subst: HashMap<String, Value> = decl
        .params
        .iter()
        .map(|p| (p.name.clone(), Value::Undefined(true)))
        .collect();
    Program::new(vec![Statement::Rule(body_to_rule(&decl.body, &subst))])
}

fn body_to_rule(body: &DeclarationBody, subst: &HashMap<String, Value>) -> Rule {
    let mut substituter = Substituter { subst };
    match body {
        DeclarationBody::Table(table) => Rule {
            stream: None,
            tables: vec![visit::rewrite_table(table, &mut substituter)],
            actions: vec![Action::Notify],
        },
        DeclarationBody::Stream(stream) => Rule {
            stream: Some(visit::rewrite_stream(stream, &mut substituter)),
            tables: Vec::new(),
            actions: vec![Action::Notify],
        },
        DeclarationBody::Action(action) => Rule {
            stream: None,
            tables: Vec::new(),
            actions: vec![visit::rewrite_action(action, &mut substituter)],
        },
    }
}

struct Substituter<'a> {
    subst: &'a HashMap<String, Value>,
}

impl Rewriter for Substituter<'_> {
    fn rewrite_value(&mut self, value: &Value) -> Option<Value> {
        match value {
            Value::VarRef(name) => self.subst.get(name).cloned(),
            _ => None,
        }
    }
}
