use winnow::ascii::multispace0;
use winnow::combinator::opt;
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

pub fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    // First character must be alphabetic or underscore (not digit).
    if !input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

/// Class-kind segment: like `ident` but dashes are allowed after the first
/// character (`security-camera`).
pub fn kind_ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    if !input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        .parse_next(input)
}

/// Dotted class kind, e.g. `com.twitter` or `org.thingpedia.weather`.
pub fn dotted_kind(input: &mut &str) -> ModalResult<String> {
    let first = kind_ident.parse_next(input)?;
    let mut out = first.to_string();
    loop {
        let saved = *input;
        if opt(literal(".")).parse_next(input)?.is_some() {
            match opt(kind_ident).parse_next(input)? {
                Some(part) => {
                    out.push('.');
                    out.push_str(part);
                }
                None => {
                    *input = saved;
                    break;
                }
            }
        } else {
            break;
        }
    }
    Ok(out)
}

/// Dotted identifier, e.g. `com.twitter` or `org.thingpedia.weather`.
pub fn dotted_ident(input: &mut &str) -> ModalResult<String> {
    let first = ident.parse_next(input)?;
    let mut out = first.to_string();
    loop {
        let saved = *input;
        if opt(literal(".")).parse_next(input)?.is_some() {
            match opt(ident).parse_next(input)? {
                Some(part) => {
                    out.push('.');
                    out.push_str(part);
                }
                None => {
                    // The dot belonged to something else (e.g. `@kind.channel`).
                    *input = saved;
                    break;
                }
            }
        } else {
            break;
        }
    }
    Ok(out)
}

/// Entity type token: `tt:contact`, `com.foo:thing`. Falls back to a plain
/// dotted identifier when no colon is present.
pub fn entity_type(input: &mut &str) -> ModalResult<String> {
    let prefix = dotted_kind.parse_next(input)?;
    if opt(literal(":")).parse_next(input)?.is_some() {
        let name = winnow::combinator::cut_err(ident)
            .context(StrContext::Expected(StrContextValue::Description(
                "entity type name after ':'",
            )))
            .parse_next(input)?;
        Ok(format!("{prefix}:{name}"))
    } else {
        Ok(prefix)
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

pub fn quoted_string(input: &mut &str) -> ModalResult<String> {
    literal("\"").parse_next(input)?;
    let mut out = String::new();
    loop {
        let chunk = take_while(0.., |c: char| c != '"' && c != '\\').parse_next(input)?;
        out.push_str(chunk);
        if opt(literal("\\")).parse_next(input)?.is_some() {
            let esc = winnow::token::any.parse_next(input)?;
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                other => out.push(other),
            }
        } else {
            break;
        }
    }
    winnow::combinator::cut_err(literal("\""))
        .context(StrContext::Expected(StrContextValue::Description(
            "closing quote",
        )))
        .parse_next(input)?;
    Ok(out)
}

/// Escape a string for the canonical printed form.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Parse a number literal: integer or float, with optional leading `-`.
pub fn number_literal(input: &mut &str) -> ModalResult<f64> {
    let neg = opt(literal("-")).parse_next(input)?.is_some();
    let integer_part = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let saved = *input;
    let mut text = integer_part.to_string();
    if opt(literal(".")).parse_next(input)?.is_some() {
        match opt(take_while(1.., |c: char| c.is_ascii_digit())).parse_next(input)? {
            Some(frac) => {
                text.push('.');
                text.push_str(frac);
            }
            None => *input = saved,
        }
    }
    let v: f64 = text.parse().map_err(|_| ErrMode::Cut(ContextError::new()))?;
    Ok(if neg { -v } else { v })
}

// ---------------------------------------------------------------------------
// Whitespace & comments
// ---------------------------------------------------------------------------

/// Skip whitespace and `//` line comments.
pub fn ws_skip(input: &mut &str) -> ModalResult<()> {
    loop {
        let _ = multispace0.parse_next(input)?;
        if opt(literal("//")).parse_next(input)?.is_some() {
            let _ = take_while(0.., |c: char| c != '\n').parse_next(input)?;
        } else {
            break;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Keyword matching with word boundary
// ---------------------------------------------------------------------------

/// Match an exact keyword string, ensuring it's not a prefix of a longer
/// identifier (i.e. the next character is not alphanumeric or `_`).
pub fn kw<'a>(keyword: &'static str) -> impl FnMut(&mut &'a str) -> ModalResult<()> {
    move |input: &mut &'a str| {
        let saved = *input;
        literal(keyword).parse_next(input)?;
        if input.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            *input = saved;
            return Err(ErrMode::Backtrack(ContextError::new()));
        }
        Ok(())
    }
}

/// Punctuation surrounded by optional whitespace.
pub fn token<'a>(tok: &'static str) -> impl FnMut(&mut &'a str) -> ModalResult<()> {
    move |input: &mut &'a str| {
        ws_skip.parse_next(input)?;
        literal(tok).parse_next(input)?;
        ws_skip.parse_next(input)?;
        Ok(())
    }
}

/// Parse a non-negative integer literal (digits only, no decimal point).
pub fn nonneg_integer(input: &mut &str) -> ModalResult<usize> {
    let saved = *input;
    let digits = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    if input.starts_with('.') {
        *input = saved;
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    digits.parse::<usize>().map_err(|_| {
        *input = saved;
        ErrMode::Backtrack(ContextError::new())
    })
}

/// Parse a signed integer literal.
pub fn signed_integer(input: &mut &str) -> ModalResult<i64> {
    let neg = opt(literal("-")).parse_next(input)?.is_some();
    let saved = *input;
    let digits = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    if input.starts_with('.') {
        *input = saved;
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let v: i64 = digits.parse().map_err(|_| ErrMode::Cut(ContextError::new()))?;
    Ok(if neg { -v } else { v })
}

pub fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}
