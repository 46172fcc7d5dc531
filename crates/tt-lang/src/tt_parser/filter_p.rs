use winnow::combinator::{alt, cut_err, opt};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::{BooleanExpr, FilterOp, Value};
use crate::parse_utils::{expected, kw, token, ws_skip};

use super::table_p::parse_invocation;
use super::value_p::parse_value;

// ---------------------------------------------------------------------------
// Public entry
// ---------------------------------------------------------------------------

pub fn parse_filter(input: &mut &str) -> ModalResult<BooleanExpr> {
    or_filter.parse_next(input)
}

// ---------------------------------------------------------------------------
// Connectives
// ---------------------------------------------------------------------------

fn or_filter(input: &mut &str) -> ModalResult<BooleanExpr> {
    let first = and_filter.parse_next(input)?;
    let mut children = vec![first];
    loop {
        ws_skip.parse_next(input)?;
        if opt(literal("||")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            children.push(cut_err(and_filter).parse_next(input)?);
        } else {
            break;
        }
    }
    if children.len() == 1 {
        Ok(children.pop().unwrap())
    } else {
        Ok(BooleanExpr::Or(children))
    }
}

fn and_filter(input: &mut &str) -> ModalResult<BooleanExpr> {
    let first = unary_filter.parse_next(input)?;
    let mut children = vec![first];
    loop {
        ws_skip.parse_next(input)?;
        if opt(literal("&&")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            children.push(cut_err(unary_filter).parse_next(input)?);
        } else {
            break;
        }
    }
    if children.len() == 1 {
        Ok(children.pop().unwrap())
    } else {
        Ok(BooleanExpr::And(children))
    }
}

fn unary_filter(input: &mut &str) -> ModalResult<BooleanExpr> {
    ws_skip.parse_next(input)?;
    alt((
        not_filter,
        paren_filter,
        kw("true").map(|_| BooleanExpr::True),
        kw("false").map(|_| BooleanExpr::False),
        external_filter,
        atom_or_compute,
    ))
    .parse_next(input)
}

fn not_filter(input: &mut &str) -> ModalResult<BooleanExpr> {
    literal("!").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let inner = cut_err(unary_filter)
        .context(expected("filter after '!'"))
        .parse_next(input)?;
    Ok(BooleanExpr::Not(Box::new(inner)))
}

fn paren_filter(input: &mut &str) -> ModalResult<BooleanExpr> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let inner = parse_filter.parse_next(input)?;
    ws_skip.parse_next(input)?;
    literal(")").parse_next(input)?;
    Ok(inner)
}

// ---------------------------------------------------------------------------
// Atoms
// ---------------------------------------------------------------------------

fn filter_op(input: &mut &str) -> ModalResult<FilterOp> {
    alt((
        literal("==").map(|_| FilterOp::Eq),
        literal("=~").map(|_| FilterOp::Like),
        literal("~=").map(|_| FilterOp::SubstringOf),
        literal(">=").map(|_| FilterOp::Ge),
        literal("<=").map(|_| FilterOp::Le),
        literal(">").map(|_| FilterOp::Gt),
        literal("<").map(|_| FilterOp::Lt),
        kw("contains").map(|_| FilterOp::Contains),
        kw("in_array").map(|_| FilterOp::InArray),
        kw("starts_with").map(|_| FilterOp::StartsWith),
        kw("ends_with").map(|_| FilterOp::EndsWith),
        kw("prefix_of").map(|_| FilterOp::PrefixOf),
        kw("suffix_of").map(|_| FilterOp::SuffixOf),
    ))
    .parse_next(input)
}

/// `@kind.fn(args) { filter }` — a get-predicate over a subquery.
fn external_filter(input: &mut &str) -> ModalResult<BooleanExpr> {
    let invocation = parse_invocation.parse_next(input)?;
    ws_skip.parse_next(input)?;
    literal("{").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let filter = cut_err(parse_filter)
        .context(expected("filter inside get-predicate"))
        .parse_next(input)?;
    cut_err(token("}")).parse_next(input)?;
    Ok(BooleanExpr::External {
        invocation,
        filter: Box::new(filter),
    })
}

/// `name op value` (plain atom) or `computed op value` (compute atom).
fn atom_or_compute(input: &mut &str) -> ModalResult<BooleanExpr> {
    let lhs = parse_value.parse_next(input)?;
    ws_skip.parse_next(input)?;
    let op = filter_op.parse_next(input)?;
    ws_skip.parse_next(input)?;
    let rhs = cut_err(parse_value)
        .context(expected("value on the right of a filter operator"))
        .parse_next(input)?;
    match lhs {
        Value::VarRef(name) => Ok(BooleanExpr::Atom {
            name,
            op,
            value: rhs,
        }),
        other => Ok(BooleanExpr::Compute {
            lhs: other,
            op,
            rhs,
        }),
    }
}
