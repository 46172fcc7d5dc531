use chrono::{DateTime, Utc};
use winnow::combinator::{alt, cut_err, opt, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::{DateValue, LocationValue, Resolved, TimeValue, Value};
use crate::parse_utils::{
    entity_type, expected, ident, kw, number_literal, quoted_string, token, ws_skip,
};

// ---------------------------------------------------------------------------
// Public entry
// ---------------------------------------------------------------------------

pub fn parse_value(input: &mut &str) -> ModalResult<Value> {
    alt((
        dollar_value,
        kw("true").map(|_| Value::Boolean(true)),
        kw("false").map(|_| Value::Boolean(false)),
        enum_value,
        new_value,
        array_value,
        string_or_entity,
        number_or_measure,
        infix_computation,
        call_or_varref,
    ))
    .parse_next(input)
}

// ---------------------------------------------------------------------------
// `$`-prefixed forms
// ---------------------------------------------------------------------------

fn dollar_value(input: &mut &str) -> ModalResult<Value> {
    literal("$").parse_next(input)?;
    alt((
        literal("?").map(|_| Value::Undefined(true)),
        (kw("undefined")).map(|_| Value::Undefined(false)),
        (kw("now")).map(|_| Value::Date(DateValue::Now)),
        (kw("start_of"), token("("), ident, token(")"))
            .map(|(_, _, unit, _)| Value::Date(DateValue::StartOf(unit.to_string()))),
        (kw("end_of"), token("("), ident, token(")"))
            .map(|(_, _, unit, _)| Value::Date(DateValue::EndOf(unit.to_string()))),
        event_value,
    ))
    .parse_next(input)
}

fn event_value(input: &mut &str) -> ModalResult<Value> {
    kw("event").parse_next(input)?;
    let field = if opt(literal(".")).parse_next(input)?.is_some() {
        Some(cut_err(ident).parse_next(input)?.to_string())
    } else {
        None
    };
    Ok(Value::Event(field))
}

// ---------------------------------------------------------------------------
// enum / new / array
// ---------------------------------------------------------------------------

fn enum_value(input: &mut &str) -> ModalResult<Value> {
    kw("enum").parse_next(input)?;
    token("(").parse_next(input)?;
    let label = cut_err(ident)
        .context(expected("enum label"))
        .parse_next(input)?
        .to_string();
    cut_err(token(")")).parse_next(input)?;
    Ok(Value::Enum(label))
}

fn new_value(input: &mut &str) -> ModalResult<Value> {
    kw("new").parse_next(input)?;
    ws_skip.parse_next(input)?;
    alt((location_value, time_value, currency_value, date_value)).parse_next(input)
}

fn location_value(input: &mut &str) -> ModalResult<Value> {
    kw("Location").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let latitude = cut_err(number_literal).parse_next(input)?;
    cut_err(token(",")).parse_next(input)?;
    let longitude = cut_err(number_literal).parse_next(input)?;
    let display = if opt(token(",")).parse_next(input)?.is_some() {
        Some(cut_err(quoted_string).parse_next(input)?)
    } else {
        None
    };
    cut_err(token(")")).parse_next(input)?;
    Ok(Value::Location(LocationValue {
        latitude,
        longitude,
        display,
    }))
}

fn time_value(input: &mut &str) -> ModalResult<Value> {
    kw("Time").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let hour = cut_err(number_literal).parse_next(input)? as u8;
    cut_err(token(",")).parse_next(input)?;
    let minute = cut_err(number_literal).parse_next(input)? as u8;
    let second = if opt(token(",")).parse_next(input)?.is_some() {
        cut_err(number_literal).parse_next(input)? as u8
    } else {
        0
    };
    cut_err(token(")")).parse_next(input)?;
    Ok(Value::Time(TimeValue {
        hour,
        minute,
        second,
    }))
}

fn currency_value(input: &mut &str) -> ModalResult<Value> {
    kw("Currency").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let value = cut_err(number_literal).parse_next(input)?;
    cut_err(token(",")).parse_next(input)?;
    let code = cut_err(ident).parse_next(input)?.to_string();
    cut_err(token(")")).parse_next(input)?;
    Ok(Value::Currency(value, code))
}

fn date_value(input: &mut &str) -> ModalResult<Value> {
    kw("Date").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let text = cut_err(quoted_string)
        .context(expected("ISO date string"))
        .parse_next(input)?;
    cut_err(token(")")).parse_next(input)?;
    let parsed = DateTime::parse_from_rfc3339(&text)
        .map_err(|_| ErrMode::Cut(ContextError::new()))?;
    Ok(Value::Date(DateValue::Absolute(
        parsed.with_timezone(&Utc),
    )))
}

fn array_value(input: &mut &str) -> ModalResult<Value> {
    literal("[").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let items: Vec<Value> =
        separated(0.., parse_value, token(",")).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal("]"))
        .context(expected("closing ']'"))
        .parse_next(input)?;
    Ok(Value::Array(items))
}

// ---------------------------------------------------------------------------
// Strings, entities, numbers, measures
// ---------------------------------------------------------------------------

fn string_or_entity(input: &mut &str) -> ModalResult<Value> {
    let text = quoted_string.parse_next(input)?;
    if opt(literal("^^")).parse_next(input)?.is_some() {
        let ty = cut_err(entity_type)
            .context(expected("entity type after '^^'"))
            .parse_next(input)?;
        let display = if input.starts_with('(') {
            literal("(").parse_next(input)?;
            let d = cut_err(quoted_string).parse_next(input)?;
            cut_err(literal(")")).parse_next(input)?;
            Some(d)
        } else {
            None
        };
        Ok(Value::Entity {
            value: text,
            display,
            ty,
        })
    } else {
        Ok(Value::String(text))
    }
}

fn number_or_measure(input: &mut &str) -> ModalResult<Value> {
    let n = number_literal.parse_next(input)?;
    // A unit must be adjacent: `21C`, `1h`. A following identifier after
    // whitespace is something else entirely.
    if input.starts_with(|c: char| c.is_ascii_alphabetic()) {
        let unit = ident.parse_next(input)?.to_string();
        Ok(Value::Measure(n, unit))
    } else {
        Ok(Value::Number(n))
    }
}

// ---------------------------------------------------------------------------
// Computations & variable references
// ---------------------------------------------------------------------------

/// `(a + b)` — infix arithmetic, always parenthesized in canonical form.
fn infix_computation(input: &mut &str) -> ModalResult<Value> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let lhs = parse_value.parse_next(input)?;
    ws_skip.parse_next(input)?;
    let op = alt((
        literal("+").map(|_| "+"),
        literal("-").map(|_| "-"),
        literal("*").map(|_| "*"),
        literal("/").map(|_| "/"),
    ))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let rhs = cut_err(parse_value).parse_next(input)?;
    cut_err(token(")")).parse_next(input)?;
    Ok(Value::Computation {
        op: op.to_string(),
        args: vec![lhs, rhs],
        ty: Resolved::none(),
    })
}

/// `count(x)`-style computation call, or a plain variable reference.
fn call_or_varref(input: &mut &str) -> ModalResult<Value> {
    let name = ident.parse_next(input)?.to_string();
    if input.starts_with('(') {
        literal("(").parse_next(input)?;
        ws_skip.parse_next(input)?;
        let args: Vec<Value> =
            separated(1.., parse_value, token(",")).parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal(")")).parse_next(input)?;
        Ok(Value::Computation {
            op: name,
            args,
            ty: Resolved::none(),
        })
    } else {
        Ok(Value::VarRef(name))
    }
}
