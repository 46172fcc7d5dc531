use winnow::combinator::{alt, cut_err, opt};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::*;
use crate::parse_utils::{expected, ident, kw, token, ws_skip};

mod class_p;
mod filter_p;
mod table_p;
mod value_p;

pub use class_p::parse_type;
pub use table_p::{parse_invocation, parse_stream, parse_table};
pub use value_p::parse_value;

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Parse a complete program in canonical surface syntax.
pub fn parse_program(input: &str) -> anyhow::Result<Program> {
    program
        .parse(input)
        .map_err(|e| anyhow::anyhow!("syntax error: {e}"))
}

/// Parse a single class definition, as returned by a schema provider.
pub fn parse_class(input: &str) -> anyhow::Result<ClassDef> {
    terminated_class
        .parse(input)
        .map_err(|e| anyhow::anyhow!("syntax error: {e}"))
}

/// Parse a dataset file, as returned by a schema provider.
pub fn parse_dataset(input: &str) -> anyhow::Result<Dataset> {
    terminated_dataset
        .parse(input)
        .map_err(|e| anyhow::anyhow!("syntax error: {e}"))
}

fn terminated_class(input: &mut &str) -> ModalResult<ClassDef> {
    let class = class_p::class_def.parse_next(input)?;
    ws_skip.parse_next(input)?;
    Ok(class)
}

fn terminated_dataset(input: &mut &str) -> ModalResult<Dataset> {
    let dataset = class_p::dataset.parse_next(input)?;
    ws_skip.parse_next(input)?;
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

fn program(input: &mut &str) -> ModalResult<Program> {
    ws_skip.parse_next(input)?;
    let principal = opt(executor_decl).parse_next(input)?;
    let mut statements = Vec::new();
    loop {
        ws_skip.parse_next(input)?;
        if input.is_empty() {
            break;
        }
        statements.push(statement.parse_next(input)?);
    }
    Ok(Program {
        principal,
        statements,
    })
}

fn executor_decl(input: &mut &str) -> ModalResult<Value> {
    kw("executor").parse_next(input)?;
    cut_err(token("=")).parse_next(input)?;
    let principal = cut_err(parse_value)
        .context(expected("executor contact value"))
        .parse_next(input)?;
    cut_err(token(":")).parse_next(input)?;
    Ok(principal)
}

fn statement(input: &mut &str) -> ModalResult<Statement> {
    ws_skip.parse_next(input)?;
    alt((
        class_p::class_def.map(Statement::ClassDef),
        class_p::dataset.map(Statement::Dataset),
        declaration.map(Statement::Declaration),
        rule_statement.map(Statement::Rule),
    ))
    .parse_next(input)
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

fn declaration(input: &mut &str) -> ModalResult<Declaration> {
    kw("let").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let kind = cut_err(alt((
        kw("query").map(|_| DeclarationKind::Query),
        kw("stream").map(|_| DeclarationKind::Stream),
        kw("action").map(|_| DeclarationKind::Action),
        kw("procedure").map(|_| DeclarationKind::Procedure),
    )))
    .context(expected("declaration kind after 'let'"))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let name = cut_err(ident)
        .context(expected("declaration name"))
        .parse_next(input)?
        .to_string();
    ws_skip.parse_next(input)?;
    let params = opt(decl_params).parse_next(input)?.unwrap_or_default();
    cut_err(token(":=")).parse_next(input)?;
    let body = match kind {
        DeclarationKind::Query => {
            DeclarationBody::Table(cut_err(table_p::parse_table).parse_next(input)?)
        }
        DeclarationKind::Stream => {
            DeclarationBody::Stream(cut_err(table_p::parse_stream).parse_next(input)?)
        }
        DeclarationKind::Action | DeclarationKind::Procedure => {
            DeclarationBody::Action(cut_err(action_part).parse_next(input)?)
        }
    };
    cut_err(token(";")).parse_next(input)?;
    Ok(Declaration {
        kind,
        name,
        params,
        body,
    })
}

fn decl_params(input: &mut &str) -> ModalResult<Vec<ArgDef>> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let params: Vec<ArgDef> = winnow::combinator::separated(
        1..,
        |input: &mut &str| {
            ws_skip.parse_next(input)?;
            let name = ident.parse_next(input)?.to_string();
            token(":").parse_next(input)?;
            let ty = cut_err(class_p::parse_type).parse_next(input)?;
            Ok(ArgDef::new(ArgDirection::InReq, name, ty))
        },
        token(","),
    )
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")")).parse_next(input)?;
    Ok(params)
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn action_part(input: &mut &str) -> ModalResult<Action> {
    ws_skip.parse_next(input)?;
    alt((
        kw("notify").map(|_| Action::Notify),
        kw("return").map(|_| Action::Return),
        table_p::parse_invocation.map(Action::Invocation),
        action_varref,
    ))
    .parse_next(input)
}

fn action_varref(input: &mut &str) -> ModalResult<Action> {
    let name = ident.parse_next(input)?.to_string();
    if !input.starts_with('(') {
        return Err(winnow::error::ErrMode::Backtrack(
            winnow::error::ContextError::new(),
        ));
    }
    let in_params = table_p::named_params.parse_next(input)?;
    Ok(Action::VarRef {
        name,
        in_params,
        schema: Resolved::none(),
    })
}

enum RulePart {
    Table(Table),
    Action(Action),
}

/// One `=>`-separated segment: `notify`/`return` terminate the pipeline,
/// anything else is parsed as a table (invocations are reinterpreted as
/// actions once the rule shape is known).
fn rule_part(input: &mut &str) -> ModalResult<RulePart> {
    ws_skip.parse_next(input)?;
    if opt(kw("notify")).parse_next(input)?.is_some() {
        return Ok(RulePart::Action(Action::Notify));
    }
    if opt(kw("return")).parse_next(input)?.is_some() {
        return Ok(RulePart::Action(Action::Return));
    }
    table_p::parse_table.map(RulePart::Table).parse_next(input)
}

fn table_to_action(table: Table) -> Result<Action, Table> {
    match table {
        Table::Invocation(inv) => Ok(Action::Invocation(inv)),
        Table::VarRef {
            name,
            in_params,
            schema,
        } => Ok(Action::VarRef {
            name,
            in_params,
            schema,
        }),
        other => Err(other),
    }
}

fn rule_statement(input: &mut &str) -> ModalResult<Rule> {
    ws_skip.parse_next(input)?;

    // Head: `now`, a stream, or a bare table chain.
    let (stream, explicit_head) = if opt(kw("now")).parse_next(input)?.is_some() {
        (None, true)
    } else if let Some(s) = opt(table_p::parse_stream).parse_next(input)? {
        (Some(s), true)
    } else {
        (None, false)
    };

    let mut parts = Vec::new();
    if !explicit_head {
        parts.push(rule_part.parse_next(input)?);
    }
    loop {
        ws_skip.parse_next(input)?;
        if opt(literal("=>")).parse_next(input)?.is_some() {
            parts.push(cut_err(rule_part).parse_next(input)?);
        } else {
            break;
        }
    }
    cut_err(token(";"))
        .context(expected("';' terminating the statement"))
        .parse_next(input)?;

    // The last segment is the action when it is one syntactically; an
    // explicit head also forces a final bare invocation into action
    // position. A trailing compound table keeps an implicit `notify`.
    let mut tables = Vec::new();
    let mut actions = Vec::new();
    let count = parts.len();
    for (i, part) in parts.into_iter().enumerate() {
        let last = i + 1 == count;
        match part {
            RulePart::Action(a) => actions.push(a),
            RulePart::Table(t) if last && explicit_head => match table_to_action(t) {
                Ok(a) => actions.push(a),
                Err(t) => tables.push(t),
            },
            RulePart::Table(t) => tables.push(t),
        }
    }
    if actions.is_empty() {
        actions.push(Action::Notify);
    }
    Ok(Rule {
        stream,
        tables,
        actions,
    })
}
