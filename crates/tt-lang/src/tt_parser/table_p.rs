use winnow::combinator::{alt, cut_err, opt, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::{
    AggregationOp, InputParam, Invocation, MinMax, Resolved, Selector, SortDirection, Stream,
    Table, Value,
};
use crate::parse_utils::{dotted_kind, expected, ident, kw, token, ws_skip};

use super::filter_p::parse_filter;
use super::value_p::parse_value;

// ---------------------------------------------------------------------------
// Invocations
// ---------------------------------------------------------------------------

fn named_param(input: &mut &str) -> ModalResult<InputParam> {
    let name = ident.parse_next(input)?.to_string();
    token("=").parse_next(input)?;
    let value = cut_err(parse_value)
        .context(expected("value after '='"))
        .parse_next(input)?;
    Ok(InputParam { name, value })
}

pub(super) fn named_params(input: &mut &str) -> ModalResult<Vec<InputParam>> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let params: Vec<InputParam> =
        separated(0.., named_param, token(",")).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")"))
        .context(expected("closing ')'"))
        .parse_next(input)?;
    Ok(params)
}

/// `@kind.channel(args)` or `@kind(attrs).channel(args)`.
pub fn parse_invocation(input: &mut &str) -> ModalResult<Invocation> {
    literal("@").parse_next(input)?;
    let dotted = cut_err(dotted_kind)
        .context(expected("class kind after '@'"))
        .parse_next(input)?;

    if input.starts_with('(') {
        let first_params = named_params.parse_next(input)?;
        if opt(literal(".")).parse_next(input)?.is_some() {
            // Attribute form: the parens belonged to the selector.
            let channel = cut_err(ident).parse_next(input)?.to_string();
            let in_params = cut_err(named_params).parse_next(input)?;
            return Ok(Invocation {
                selector: Selector {
                    kind: dotted,
                    attributes: first_params,
                },
                channel,
                in_params,
                schema: Resolved::none(),
            });
        }
        // Plain form: last dotted segment is the channel.
        let (kind, channel) = split_channel(&dotted)?;
        return Ok(Invocation {
            selector: Selector::new(kind),
            channel,
            in_params: first_params,
            schema: Resolved::none(),
        });
    }
    Err(ErrMode::Backtrack(ContextError::new()))
}

fn split_channel(dotted: &str) -> Result<(String, String), ErrMode<ContextError>> {
    match dotted.rsplit_once('.') {
        Some((kind, channel)) => Ok((kind.to_string(), channel.to_string())),
        None => Err(ErrMode::Backtrack(ContextError::new())),
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A table operand: a primitive, a prefix combinator, or a parenthesized
/// compound table.
fn table_primary(input: &mut &str) -> ModalResult<Table> {
    ws_skip.parse_next(input)?;
    alt((
        paren_table,
        projection_table,
        sort_table,
        aggregation_table,
        argminmax_table,
        result_table,
        parse_invocation.map(Table::Invocation),
        varref_table,
    ))
    .parse_next(input)
}

fn paren_table(input: &mut &str) -> ModalResult<Table> {
    literal("(").parse_next(input)?;
    let inner = parse_table.parse_next(input)?;
    ws_skip.parse_next(input)?;
    literal(")").parse_next(input)?;
    Ok(inner)
}

fn projection_table(input: &mut &str) -> ModalResult<Table> {
    literal("[").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let fields: Vec<String> = separated(
        1..,
        ident.map(|s: &str| s.to_string()),
        token(","),
    )
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    literal("]").parse_next(input)?;
    ws_skip.parse_next(input)?;
    kw("of").parse_next(input)?;
    let table = cut_err(table_primary)
        .context(expected("table after 'of'"))
        .parse_next(input)?;
    Ok(Table::Projection {
        table: Box::new(table),
        fields,
        schema: Resolved::none(),
    })
}

fn sort_table(input: &mut &str) -> ModalResult<Table> {
    kw("sort").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let field = cut_err(ident).parse_next(input)?.to_string();
    ws_skip.parse_next(input)?;
    let direction = cut_err(alt((
        kw("asc").map(|_| SortDirection::Asc),
        kw("desc").map(|_| SortDirection::Desc),
    )))
    .context(expected("'asc' or 'desc'"))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(kw("of")).parse_next(input)?;
    let table = cut_err(table_primary).parse_next(input)?;
    Ok(Table::Sort {
        table: Box::new(table),
        field,
        direction,
    })
}

fn aggregation_table(input: &mut &str) -> ModalResult<Table> {
    kw("aggregate").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let op = cut_err(alt((
        kw("count").map(|_| AggregationOp::Count),
        kw("min").map(|_| AggregationOp::Min),
        kw("max").map(|_| AggregationOp::Max),
        kw("sum").map(|_| AggregationOp::Sum),
        kw("avg").map(|_| AggregationOp::Avg),
    )))
    .context(expected("aggregation operator"))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let field = if op == AggregationOp::Count {
        None
    } else {
        Some(cut_err(ident).parse_next(input)?.to_string())
    };
    ws_skip.parse_next(input)?;
    cut_err(kw("of")).parse_next(input)?;
    let table = cut_err(table_primary).parse_next(input)?;
    Ok(Table::Aggregation {
        table: Box::new(table),
        op,
        field,
        schema: Resolved::none(),
    })
}

fn argminmax_table(input: &mut &str) -> ModalResult<Table> {
    let op = alt((
        kw("argmin").map(|_| MinMax::Min),
        kw("argmax").map(|_| MinMax::Max),
    ))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let base = cut_err(parse_value).parse_next(input)?;
    cut_err(token(",")).parse_next(input)?;
    let limit = cut_err(parse_value).parse_next(input)?;
    ws_skip.parse_next(input)?;
    let field = cut_err(ident).parse_next(input)?.to_string();
    ws_skip.parse_next(input)?;
    cut_err(kw("of")).parse_next(input)?;
    let table = cut_err(table_primary).parse_next(input)?;
    Ok(Table::ArgMinMax {
        table: Box::new(table),
        op,
        field,
        base,
        limit,
    })
}

fn result_table(input: &mut &str) -> ModalResult<Table> {
    kw("result").parse_next(input)?;
    token("(").parse_next(input)?;
    literal("@").parse_next(input)?;
    let name = cut_err(dotted_kind).parse_next(input)?;
    cut_err(token(")")).parse_next(input)?;
    Ok(Table::Result {
        name,
        schema: Resolved::none(),
    })
}

fn varref_table(input: &mut &str) -> ModalResult<Table> {
    let name = ident.parse_next(input)?.to_string();
    if !input.starts_with('(') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let in_params = named_params.parse_next(input)?;
    Ok(Table::VarRef {
        name,
        in_params,
        schema: Resolved::none(),
    })
}

/// Parse a full table expression: a primary followed by postfix filters,
/// index/slice brackets and joins.
pub fn parse_table(input: &mut &str) -> ModalResult<Table> {
    let mut table = table_primary.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        // Index / slice
        if input.starts_with('[') {
            literal("[").parse_next(input)?;
            ws_skip.parse_next(input)?;
            let first = cut_err(parse_value).parse_next(input)?;
            ws_skip.parse_next(input)?;
            if opt(literal(":")).parse_next(input)?.is_some() {
                ws_skip.parse_next(input)?;
                let limit = cut_err(parse_value).parse_next(input)?;
                cut_err(token("]")).parse_next(input)?;
                table = Table::Slice {
                    table: Box::new(table),
                    base: first,
                    limit,
                };
            } else {
                let mut indices = vec![first];
                while opt(token(",")).parse_next(input)?.is_some() {
                    indices.push(cut_err(parse_value).parse_next(input)?);
                }
                cut_err(token("]")).parse_next(input)?;
                table = Table::Index {
                    table: Box::new(table),
                    indices,
                };
            }
            continue;
        }
        // Postfix filter: `, filter` — backtrack the comma if no filter
        // follows (it may belong to an enclosing list).
        let saved = *input;
        if opt(literal(",")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            match opt(parse_filter).parse_next(input)? {
                Some(filter) => {
                    table = Table::Filter {
                        table: Box::new(table),
                        filter,
                    };
                    continue;
                }
                None => {
                    *input = saved;
                    break;
                }
            }
        }
        // Join
        if opt(kw("join")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            let rhs = cut_err(table_primary)
                .context(expected("right-hand table of join"))
                .parse_next(input)?;
            let on = opt(on_clause).parse_next(input)?.unwrap_or_default();
            table = Table::Join {
                lhs: Box::new(table),
                rhs: Box::new(rhs),
                on,
                schema: Resolved::none(),
            };
            continue;
        }
        break;
    }
    Ok(table)
}

pub(super) fn on_clause(input: &mut &str) -> ModalResult<Vec<InputParam>> {
    ws_skip.parse_next(input)?;
    kw("on").parse_next(input)?;
    cut_err(token("(")).parse_next(input)?;
    let params: Vec<InputParam> =
        separated(1.., named_param, token(",")).parse_next(input)?;
    cut_err(token(")")).parse_next(input)?;
    Ok(params)
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

fn stream_primary(input: &mut &str) -> ModalResult<Stream> {
    ws_skip.parse_next(input)?;
    alt((monitor_stream, timer_stream, attimer_stream, paren_stream)).parse_next(input)
}

fn paren_stream(input: &mut &str) -> ModalResult<Stream> {
    literal("(").parse_next(input)?;
    let inner = parse_stream.parse_next(input)?;
    ws_skip.parse_next(input)?;
    literal(")").parse_next(input)?;
    Ok(inner)
}

fn monitor_stream(input: &mut &str) -> ModalResult<Stream> {
    kw("monitor").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let table = cut_err(table_primary)
        .context(expected("table after 'monitor'"))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let on_new = if opt((kw("on"), ws_skip, kw("new"))).parse_next(input)?.is_some() {
        cut_err(token("[")).parse_next(input)?;
        let fields: Vec<String> = separated(
            1..,
            ident.map(|s: &str| s.to_string()),
            token(","),
        )
        .parse_next(input)?;
        cut_err(token("]")).parse_next(input)?;
        Some(fields)
    } else {
        None
    };
    Ok(Stream::Monitor {
        table: Box::new(table),
        on_new,
    })
}

fn timer_stream(input: &mut &str) -> ModalResult<Stream> {
    kw("timer").parse_next(input)?;
    if !input.starts_with('(') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(kw("base")).parse_next(input)?;
    cut_err(token("=")).parse_next(input)?;
    let base = cut_err(parse_value).parse_next(input)?;
    cut_err(token(",")).parse_next(input)?;
    cut_err(kw("interval")).parse_next(input)?;
    cut_err(token("=")).parse_next(input)?;
    let interval = cut_err(parse_value).parse_next(input)?;
    let frequency = if opt(token(",")).parse_next(input)?.is_some() {
        cut_err(kw("frequency")).parse_next(input)?;
        cut_err(token("=")).parse_next(input)?;
        Some(cut_err(parse_value).parse_next(input)?)
    } else {
        None
    };
    cut_err(token(")")).parse_next(input)?;
    Ok(Stream::Timer {
        base,
        interval,
        frequency,
    })
}

fn attimer_stream(input: &mut &str) -> ModalResult<Stream> {
    kw("attimer").parse_next(input)?;
    if !input.starts_with('(') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(kw("time")).parse_next(input)?;
    cut_err(token("=")).parse_next(input)?;
    cut_err(token("[")).parse_next(input)?;
    let times: Vec<Value> =
        separated(1.., parse_value, token(",")).parse_next(input)?;
    cut_err(token("]")).parse_next(input)?;
    let expiration = if opt(token(",")).parse_next(input)?.is_some() {
        cut_err(kw("expiration_date")).parse_next(input)?;
        cut_err(token("=")).parse_next(input)?;
        Some(cut_err(parse_value).parse_next(input)?)
    } else {
        None
    };
    cut_err(token(")")).parse_next(input)?;
    Ok(Stream::AtTimer { times, expiration })
}

/// Parse a full stream expression: a primary followed by postfix filters
/// and stream-table joins.
pub fn parse_stream(input: &mut &str) -> ModalResult<Stream> {
    let mut stream = stream_primary.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        let saved = *input;
        if opt(literal(",")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            match opt(parse_filter).parse_next(input)? {
                Some(filter) => {
                    stream = Stream::Filter {
                        stream: Box::new(stream),
                        filter,
                    };
                    continue;
                }
                None => {
                    *input = saved;
                    break;
                }
            }
        }
        if opt(kw("join")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            let table = cut_err(table_primary).parse_next(input)?;
            let on = opt(on_clause).parse_next(input)?.unwrap_or_default();
            stream = Stream::Join {
                stream: Box::new(stream),
                table: Box::new(table),
                on,
                schema: Resolved::none(),
            };
            continue;
        }
        break;
    }
    Ok(stream)
}
