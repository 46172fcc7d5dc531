//! Single-pass type checker. Works over a cloned AST: schemas are attached
//! to every invocation, expression types are inferred and validated, scope
//! is propagated left to right, and the first failure aborts the pass.

mod executable;
mod filters;
mod scope;
mod values;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use tt_lang::ast::*;
use tt_schema::SchemaResolver;

use crate::error::{CompileReason, CompileResult, err_detail};

pub use executable::{is_executable, require_executable};
pub use filters::{expected_rhs, op_admissible};
pub use scope::Scope;
pub use values::{check_assignable, infer_value, unifies};

// ---------------------------------------------------------------------------
// TypeChecker
// ---------------------------------------------------------------------------

pub struct TypeChecker<'a> {
    resolver: &'a SchemaResolver,
    declarations: HashMap<String, Arc<FunctionDef>>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(resolver: &'a SchemaResolver) -> Self {
        TypeChecker {
            resolver,
            declarations: HashMap::new(),
        }
    }

    /// Type-check a program, returning the annotated clone. The input is
    /// left untouched; the result carries a schema on every invocation.
    pub async fn check_program(&mut self, program: &Program) -> CompileResult<Program> {
        let mut program = program.clone();
        if let Some(principal) = &mut program.principal {
            let ty = infer_value(principal, &Scope::new())?;
            check_assignable(&ty, &Type::Entity("tt:contact".to_string()), "executor")?;
        }
        for statement in &mut program.statements {
            match statement {
                Statement::ClassDef(class) => self.resolver.inject_class(class.clone()),
                Statement::Dataset(_) => {}
                Statement::Declaration(decl) => self.check_declaration(decl).await?,
                Statement::Rule(rule) => self.check_rule(rule).await?,
            }
        }
        Ok(program)
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    async fn check_declaration(&mut self, decl: &mut Declaration) -> CompileResult<()> {
        let mut scope = Scope::new();
        for param in &decl.params {
            scope.bind(param.name.clone(), param.ty.clone());
        }

        let mut args: Vec<ArgDef> = decl.params.clone();
        let kind = match (&decl.kind, &mut decl.body) {
            (DeclarationKind::Query, DeclarationBody::Table(table)) => {
                let schema = self.check_table(table, &scope).await?;
                args.extend(schema.out_args().cloned());
                FunctionKind::Query
            }
            (DeclarationKind::Stream, DeclarationBody::Stream(stream)) => {
                let mut inner = scope.clone();
                let schema = self.check_stream(stream, &mut inner).await?;
                if let Some(schema) = schema {
                    args.extend(schema.out_args().cloned());
                }
                FunctionKind::Stream
            }
            (DeclarationKind::Action | DeclarationKind::Procedure, DeclarationBody::Action(action)) => {
                self.check_action(action, &scope).await?;
                FunctionKind::Action
            }
            _ => {
                return Err(err_detail(
                    CompileReason::TypeMismatch,
                    format!("declaration `{}` body does not match its kind", decl.name),
                ));
            }
        };

        let mut f = FunctionDef::new("local", decl.name.clone(), kind, args);
        f.is_list = true;
        f.is_monitorable = matches!(decl.kind, DeclarationKind::Stream);
        self.declarations.insert(decl.name.clone(), Arc::new(f));
        Ok(())
    }

    fn declared(&self, name: &str) -> CompileResult<Arc<FunctionDef>> {
        self.declarations.get(name).cloned().ok_or_else(|| {
            err_detail(
                CompileReason::UndeclaredName,
                format!("`{name}` is not a declared name"),
            )
        })
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    async fn check_rule(&mut self, rule: &mut Rule) -> CompileResult<()> {
        self.disambiguate_last_position(rule).await?;

        let mut scope = Scope::new();
        if let Some(stream) = &mut rule.stream {
            self.check_stream(stream, &mut scope).await?;
        }
        for table in &mut rule.tables {
            let schema = self.check_table(table, &scope).await?;
            scope.add_outputs(&schema);
        }
        for action in &mut rule.actions {
            self.check_action(action, &scope).await?;
        }
        Ok(())
    }

    /// The grammar cannot tell a final query from a final action. Resolve a
    /// trailing bare invocation against the registry and move it to the
    /// side it belongs to.
    async fn disambiguate_last_position(&mut self, rule: &mut Rule) -> CompileResult<()> {
        // Bare invocation in table position that is really an action.
        if rule.actions == [Action::Notify] {
            let target = match rule.tables.last() {
                Some(Table::Invocation(inv)) => {
                    Some((inv.selector.kind.clone(), inv.channel.clone()))
                }
                _ => None,
            };
            if let Some((kind, channel)) = target {
                let class = self.full_class(&kind).await?;
                if class.function(FunctionKind::Query, &channel).is_none()
                    && class.function(FunctionKind::Action, &channel).is_some()
                {
                    if let Some(Table::Invocation(inv)) = rule.tables.pop() {
                        rule.actions = vec![Action::Invocation(inv)];
                    }
                }
            }
        }
        // Invocation in action position that is really a query.
        let target = match rule.actions.as_slice() {
            [Action::Invocation(inv)] => {
                Some((inv.selector.kind.clone(), inv.channel.clone()))
            }
            _ => None,
        };
        if let Some((kind, channel)) = target {
            let class = self.full_class(&kind).await?;
            if class.function(FunctionKind::Action, &channel).is_none()
                && class.function(FunctionKind::Query, &channel).is_some()
            {
                if let Some(Action::Invocation(inv)) = rule.actions.pop() {
                    rule.tables.push(Table::Invocation(inv));
                }
                rule.actions = vec![Action::Notify];
            }
        }
        Ok(())
    }

    async fn full_class(&self, kind: &str) -> CompileResult<Arc<ClassDef>> {
        self.resolver.get_full_class(kind).await.map_err(|e| {
            err_detail(CompileReason::UnknownKind, format!("{kind}: {e}"))
        })
    }

    // -----------------------------------------------------------------------
    // Invocations
    // -----------------------------------------------------------------------

    async fn check_invocation(
        &self,
        invocation: &mut Invocation,
        kind_of: FunctionKind,
        scope: &Scope,
    ) -> CompileResult<FunctionSchema> {
        let class = self.full_class(&invocation.selector.kind).await?;
        let schema = class
            .function(kind_of, &invocation.channel)
            .map(|f| Arc::new(f.clone()))
            .ok_or_else(|| {
                err_detail(
                    CompileReason::UndeclaredName,
                    format!(
                        "@{} has no {} `{}`",
                        invocation.selector.kind,
                        kind_of.as_str(),
                        invocation.channel
                    ),
                )
            })?;

        for attr in &mut invocation.selector.attributes {
            infer_value(&mut attr.value, scope)?;
            if !attr.value.is_constant() {
                return Err(err_detail(
                    CompileReason::TypeMismatch,
                    format!("device attribute `{}` must be a constant", attr.name),
                ));
            }
        }

        self.check_in_params(&schema, &mut invocation.in_params, scope)?;
        invocation.schema = Resolved::new(schema.clone());
        Ok(schema)
    }

    fn check_in_params(
        &self,
        schema: &FunctionSchema,
        in_params: &mut [InputParam],
        scope: &Scope,
    ) -> CompileResult<()> {
        for param in in_params.iter_mut() {
            let arg = schema.arg(&param.name).ok_or_else(|| {
                err_detail(
                    CompileReason::UndeclaredName,
                    format!("{} has no parameter `{}`", schema.qualified_name(), param.name),
                )
            })?;
            if !arg.is_input() {
                return Err(err_detail(
                    CompileReason::DirectionViolation,
                    format!(
                        "`{}` is an output of {} and cannot be passed in",
                        param.name,
                        schema.qualified_name()
                    ),
                ));
            }
            let mut value = std::mem::replace(&mut param.value, Value::Undefined(false));
            let found = infer_value(&mut value, scope)?;
            param.value = value;
            check_assignable(
                &found,
                &arg.ty,
                &format!("{}.{}", schema.qualified_name(), param.name),
            )?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    async fn check_table(&self, table: &mut Table, scope: &Scope) -> CompileResult<FunctionSchema> {
        match table {
            Table::Invocation(inv) => {
                self.check_invocation(inv, FunctionKind::Query, scope).await
            }
            Table::VarRef {
                name,
                in_params,
                schema,
            } => {
                let decl = self.declared(name)?;
                if decl.kind != FunctionKind::Query {
                    return Err(err_detail(
                        CompileReason::TypeMismatch,
                        format!("`{name}` is not a query"),
                    ));
                }
                self.check_in_params(&decl, in_params, scope)?;
                *schema = Resolved::new(decl.clone());
                Ok(decl)
            }
            Table::Result { name, schema } => {
                let decl = self.declared(name)?;
                *schema = Resolved::new(decl.clone());
                Ok(decl)
            }
            Table::Filter { table, filter } => {
                let schema = Box::pin(self.check_table(table, scope)).await?;
                if let Table::Invocation(inv) = &mut **table {
                    *filter =
                        attach_input_filters(inv, std::mem::replace(filter, BooleanExpr::True));
                    // Params moved out of the filter have not been checked yet.
                    self.check_in_params(&schema, &mut inv.in_params, scope)?;
                }
                self.check_filter(filter, Some(&schema), scope).await?;
                Ok(schema)
            }
            Table::Projection {
                table,
                fields,
                schema,
            } => {
                let inner = Box::pin(self.check_table(table, scope)).await?;
                for field in fields.iter() {
                    if inner.out_args().all(|a| &a.name != field) {
                        return Err(err_detail(
                            CompileReason::UndeclaredName,
                            format!("`{field}` is not an output of {}", inner.qualified_name()),
                        ));
                    }
                }
                let projected = Arc::new(inner.project(fields));
                *schema = Resolved::new(projected.clone());
                Ok(projected)
            }
            Table::Sort { table, field, .. } => {
                let schema = Box::pin(self.check_table(table, scope)).await?;
                let arg = schema
                    .out_args()
                    .find(|a| &a.name == field)
                    .ok_or_else(|| {
                        err_detail(
                            CompileReason::UndeclaredName,
                            format!("sort key `{field}` is not an output"),
                        )
                    })?;
                if !op_admissible(FilterOp::Ge, &arg.ty) {
                    return Err(err_detail(
                        CompileReason::TypeMismatch,
                        format!("cannot sort by `{field}` of type {}", arg.ty),
                    ));
                }
                Ok(schema)
            }
            Table::Index { table, indices } => {
                let schema = Box::pin(self.check_table(table, scope)).await?;
                for index in indices.iter_mut() {
                    let ty = infer_value(index, scope)?;
                    check_assignable(&ty, &Type::Number, "index")?;
                }
                Ok(schema)
            }
            Table::Slice { table, base, limit } => {
                let schema = Box::pin(self.check_table(table, scope)).await?;
                for value in [&mut *base, &mut *limit] {
                    let ty = infer_value(value, scope)?;
                    check_assignable(&ty, &Type::Number, "slice bound")?;
                }
                Ok(schema)
            }
            Table::Join {
                lhs,
                rhs,
                on,
                schema,
            } => {
                let left = Box::pin(self.check_table(lhs, scope)).await?;
                let mut rhs_scope = scope.clone();
                rhs_scope.add_outputs(&left);
                let right = Box::pin(self.check_table(rhs, &rhs_scope)).await?;

                for param in on.iter_mut() {
                    let arg = right.arg(&param.name).ok_or_else(|| {
                        err_detail(
                            CompileReason::UndeclaredName,
                            format!("join binds unknown parameter `{}`", param.name),
                        )
                    })?;
                    if !arg.is_input() {
                        return Err(err_detail(
                            CompileReason::DirectionViolation,
                            format!("join target `{}` is not an input", param.name),
                        ));
                    }
                    let mut value = std::mem::replace(&mut param.value, Value::Undefined(false));
                    let found = infer_value(&mut value, &rhs_scope)?;
                    param.value = value;
                    check_assignable(&found, &arg.ty, &param.name)?;
                }

                let merged = left.join(&right).map_err(|field| {
                    err_detail(
                        CompileReason::TypeMismatch,
                        format!("join output `{field}` has conflicting types"),
                    )
                })?;
                let merged = Arc::new(merged);
                *schema = Resolved::new(merged.clone());
                Ok(merged)
            }
            Table::Aggregation {
                table,
                op,
                field,
                schema,
            } => {
                let inner = Box::pin(self.check_table(table, scope)).await?;
                let computed = aggregation_schema(&inner, *op, field.as_deref())?;
                let computed = Arc::new(computed);
                *schema = Resolved::new(computed.clone());
                Ok(computed)
            }
            Table::ArgMinMax {
                table,
                field,
                base,
                limit,
                ..
            } => {
                let schema = Box::pin(self.check_table(table, scope)).await?;
                let arg = schema
                    .out_args()
                    .find(|a| &a.name == field)
                    .ok_or_else(|| {
                        err_detail(
                            CompileReason::UndeclaredName,
                            format!("`{field}` is not an output"),
                        )
                    })?;
                if !op_admissible(FilterOp::Ge, &arg.ty) {
                    return Err(err_detail(
                        CompileReason::TypeMismatch,
                        format!("cannot rank by `{field}` of type {}", arg.ty),
                    ));
                }
                for value in [&mut *base, &mut *limit] {
                    let ty = infer_value(value, scope)?;
                    check_assignable(&ty, &Type::Number, "argmin/argmax bound")?;
                }
                Ok(schema)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Streams
    // -----------------------------------------------------------------------

    async fn check_stream(
        &self,
        stream: &mut Stream,
        scope: &mut Scope,
    ) -> CompileResult<Option<FunctionSchema>> {
        match stream {
            Stream::Monitor { table, on_new } => {
                let schema = self.check_table(table, scope).await?;
                if !schema.is_monitorable {
                    return Err(err_detail(
                        CompileReason::TypeMismatch,
                        format!("{} is not monitorable", schema.qualified_name()),
                    ));
                }
                if let Some(fields) = on_new {
                    for field in fields.iter() {
                        if schema.out_args().all(|a| &a.name != field) {
                            return Err(err_detail(
                                CompileReason::UndeclaredName,
                                format!("`{field}` is not an output of the monitored table"),
                            ));
                        }
                    }
                }
                scope.add_outputs(&schema);
                Ok(Some(schema))
            }
            Stream::Timer {
                base,
                interval,
                frequency,
            } => {
                let ty = infer_value(base, scope)?;
                check_assignable(&ty, &Type::Date, "timer base")?;
                let ty = infer_value(interval, scope)?;
                check_assignable(&ty, &Type::Measure("ms".to_string()), "timer interval")?;
                if let Some(freq) = frequency {
                    let ty = infer_value(freq, scope)?;
                    check_assignable(&ty, &Type::Number, "timer frequency")?;
                }
                Ok(None)
            }
            Stream::AtTimer { times, expiration } => {
                for time in times.iter_mut() {
                    let ty = infer_value(time, scope)?;
                    check_assignable(&ty, &Type::Time, "attimer time")?;
                }
                if let Some(exp) = expiration {
                    let ty = infer_value(exp, scope)?;
                    check_assignable(&ty, &Type::Date, "attimer expiration")?;
                }
                Ok(None)
            }
            Stream::Filter { stream, filter } => {
                let schema = Box::pin(self.check_stream(stream, scope)).await?;
                self.check_filter(filter, schema.as_ref(), scope).await?;
                Ok(schema)
            }
            Stream::Join {
                stream,
                table,
                on,
                schema,
            } => {
                let left = Box::pin(self.check_stream(stream, scope)).await?;
                let right = self.check_table(table, scope).await?;
                for param in on.iter_mut() {
                    let arg = right.arg(&param.name).ok_or_else(|| {
                        err_detail(
                            CompileReason::UndeclaredName,
                            format!("join binds unknown parameter `{}`", param.name),
                        )
                    })?;
                    let mut value = std::mem::replace(&mut param.value, Value::Undefined(false));
                    let found = infer_value(&mut value, scope)?;
                    param.value = value;
                    check_assignable(&found, &arg.ty, &param.name)?;
                }
                scope.add_outputs(&right);
                let merged = match left {
                    Some(left) => Arc::new(left.join(&right).map_err(|field| {
                        err_detail(
                            CompileReason::TypeMismatch,
                            format!("join output `{field}` has conflicting types"),
                        )
                    })?),
                    None => right,
                };
                *schema = Resolved::new(merged.clone());
                Ok(Some(merged))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    async fn check_action(&self, action: &mut Action, scope: &Scope) -> CompileResult<()> {
        match action {
            Action::Notify | Action::Return => Ok(()),
            Action::Invocation(inv) => {
                self.check_invocation(inv, FunctionKind::Action, scope)
                    .await?;
                Ok(())
            }
            Action::VarRef {
                name,
                in_params,
                schema,
            } => {
                let decl = self.declared(name)?;
                if decl.kind != FunctionKind::Action {
                    return Err(err_detail(
                        CompileReason::TypeMismatch,
                        format!("`{name}` is not an action"),
                    ));
                }
                self.check_in_params(&decl, in_params, scope)?;
                *schema = Resolved::new(decl);
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    async fn check_filter(
        &self,
        filter: &mut BooleanExpr,
        schema: Option<&FunctionSchema>,
        scope: &Scope,
    ) -> CompileResult<()> {
        match filter {
            BooleanExpr::True | BooleanExpr::False => Ok(()),
            BooleanExpr::And(children) | BooleanExpr::Or(children) => {
                for child in children {
                    Box::pin(self.check_filter(child, schema, scope)).await?;
                }
                Ok(())
            }
            BooleanExpr::Not(inner) => Box::pin(self.check_filter(inner, schema, scope)).await,
            BooleanExpr::Atom { name, op, value } => {
                let lhs_ty = self.filter_lhs_type(name, schema, scope)?;
                if !op_admissible(*op, &lhs_ty) {
                    return Err(err_detail(
                        CompileReason::TypeMismatch,
                        format!("operator `{}` is not admissible for {lhs_ty}", op.as_str()),
                    ));
                }
                let mut scope_with_outs = scope.clone();
                if let Some(schema) = schema {
                    scope_with_outs.add_outputs(schema);
                }
                let mut v = std::mem::replace(value, Value::Undefined(false));
                let found = infer_value(&mut v, &scope_with_outs)?;
                *value = v;
                check_assignable(&found, &expected_rhs(*op, &lhs_ty), name)?;
                Ok(())
            }
            BooleanExpr::External { invocation, filter } => {
                let sub = self
                    .check_invocation(invocation, FunctionKind::Query, scope)
                    .await?;
                let mut sub_scope = scope.clone();
                sub_scope.add_outputs(&sub);
                Box::pin(self.check_filter(filter, Some(&sub), &sub_scope)).await
            }
            BooleanExpr::Compute { lhs, op, rhs } => {
                let mut scope_with_outs = scope.clone();
                if let Some(schema) = schema {
                    scope_with_outs.add_outputs(schema);
                }
                let lhs_ty = infer_value(lhs, &scope_with_outs)?;
                if !op_admissible(*op, &lhs_ty) {
                    return Err(err_detail(
                        CompileReason::TypeMismatch,
                        format!("operator `{}` is not admissible for {lhs_ty}", op.as_str()),
                    ));
                }
                let rhs_ty = infer_value(rhs, &scope_with_outs)?;
                check_assignable(&rhs_ty, &expected_rhs(*op, &lhs_ty), "computed filter")?;
                Ok(())
            }
        }
    }

    /// An atom's left side resolves to an output of the enclosing table, or
    /// to a scope variable. Input arguments must be bound as named
    /// parameters, not filtered post-hoc.
    fn filter_lhs_type(
        &self,
        name: &str,
        schema: Option<&FunctionSchema>,
        scope: &Scope,
    ) -> CompileResult<Type> {
        if let Some(schema) = schema {
            if let Some(arg) = schema.arg(name) {
                if arg.is_input() {
                    return Err(err_detail(
                        CompileReason::DirectionViolation,
                        format!(
                            "`{name}` is an input of {}; bind it as a parameter instead",
                            schema.qualified_name()
                        ),
                    ));
                }
                if !arg.annotations.filterable {
                    return Err(err_detail(
                        CompileReason::DirectionViolation,
                        format!("`{name}` is not filterable"),
                    ));
                }
                return Ok(arg.ty.clone());
            }
        }
        scope.lookup(name).cloned().ok_or_else(|| {
            err_detail(
                CompileReason::UndeclaredName,
                format!("`{name}` is neither an output nor in scope"),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Move equality atoms over declared inputs into the invocation's named
/// parameters. Runs before the filter is type-checked, so a leftover input
/// atom (non-equality, or a duplicate binding) still fails with a
/// direction violation.
fn attach_input_filters(invocation: &mut Invocation, filter: BooleanExpr) -> BooleanExpr {
    let Some(schema) = invocation.schema.get().cloned() else {
        return filter;
    };
    let mut children = match filter {
        BooleanExpr::And(children) => children,
        other => vec![other],
    };
    for child in children.iter_mut() {
        let BooleanExpr::Atom { name, op, value } = child else {
            continue;
        };
        let movable = *op == FilterOp::Eq
            && schema.arg(name).is_some_and(|a| a.is_input())
            && invocation.in_param(name).is_none();
        if movable {
            invocation
                .in_params
                .push(InputParam::new(name.clone(), value.clone()));
            *child = BooleanExpr::True;
        }
    }
    tt_lang::optimize_filter(&BooleanExpr::And(children))
}

fn aggregation_schema(
    inner: &FunctionDef,
    op: AggregationOp,
    field: Option<&str>,
) -> CompileResult<FunctionDef> {
    let mut out = inner.clone();
    out.is_list = false;
    out.minimal_projection = None;
    match op {
        AggregationOp::Count => {
            out.args.retain(|a| a.is_input());
            out.args
                .push(ArgDef::new(ArgDirection::Out, "count", Type::Number));
            Ok(out)
        }
        _ => {
            let field = field.ok_or_else(|| {
                err_detail(
                    CompileReason::TypeMismatch,
                    format!("aggregation `{}` needs a field", op.as_str()),
                )
            })?;
            let arg = inner
                .out_args()
                .find(|a| a.name == field)
                .ok_or_else(|| {
                    err_detail(
                        CompileReason::UndeclaredName,
                        format!("`{field}` is not an output"),
                    )
                })?;
            if !arg.ty.is_numeric() {
                return Err(err_detail(
                    CompileReason::TypeMismatch,
                    format!("cannot aggregate over `{field}` of type {}", arg.ty),
                ));
            }
            let result_ty = match op {
                AggregationOp::Avg => Type::Number,
                _ => arg.ty.clone(),
            };
            let field = field.to_string();
            out.args.retain(|a| a.is_input());
            out.args.push(ArgDef::new(ArgDirection::Out, field, result_ty));
            Ok(out)
        }
    }
}
