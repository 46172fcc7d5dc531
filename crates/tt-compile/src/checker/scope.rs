use std::collections::HashMap;

use tt_lang::ast::{FunctionSchema, Type};

/// Names visible at a point in a rule: outputs of upstream tables plus any
/// declaration parameters. Later bindings shadow earlier ones.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Type>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, ty: Type) {
        self.vars.insert(name.into(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Bring a table's outputs into scope.
    pub fn add_outputs(&mut self, schema: &FunctionSchema) {
        for arg in schema.out_args() {
            self.vars.insert(arg.name.clone(), arg.ty.clone());
        }
    }
}
