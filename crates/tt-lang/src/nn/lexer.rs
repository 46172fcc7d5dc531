use std::collections::HashMap;

use crate::ast::{TimeValue, Value};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("cannot resolve entity placeholder `{token}`")]
    UnresolvedPlaceholder { token: String },
    #[error("malformed token `{token}`: {reason}")]
    MalformedToken { token: String, reason: String },
}

// ---------------------------------------------------------------------------
// Tokens & resolvers
// ---------------------------------------------------------------------------

/// A classified NN token: the terminal name drives the parser tables, the
/// value carries the resolved semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct NnToken {
    pub terminal: String,
    pub value: Value,
}

impl NnToken {
    fn plain(terminal: impl Into<String>) -> Self {
        let terminal = terminal.into();
        NnToken {
            value: Value::String(terminal.clone()),
            terminal,
        }
    }

    fn new(terminal: impl Into<String>, value: Value) -> Self {
        NnToken {
            terminal: terminal.into(),
            value,
        }
    }
}

/// How entity placeholders are resolved: a finite mapping, or a callback
/// parameterized by the placeholder and the lexer's running context
/// (last parameter name, last function, pending unit).
pub enum EntityResolver<'a> {
    Map(&'a HashMap<String, Value>),
    Callback(
        Box<dyn FnMut(&str, Option<&str>, Option<&str>, Option<&str>) -> Option<Value> + 'a>,
    ),
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

/// Per-parse lexer state. Never share an instance across concurrent parses:
/// `last_param` / `last_function` are mutated as tokens stream through.
pub struct NnLexer<'a> {
    resolver: EntityResolver<'a>,
    last_param: Option<String>,
    last_function: Option<String>,
    in_string: bool,
}

impl<'a> NnLexer<'a> {
    pub fn new(resolver: EntityResolver<'a>) -> Self {
        NnLexer {
            resolver,
            last_param: None,
            last_function: None,
            in_string: false,
        }
    }

    /// Classify a finite token list into terminals with resolved values.
    pub fn tokenize<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<Vec<NnToken>, LexError> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let tok = tokens[i].as_ref();
            i += 1;

            if tok == "\"" {
                self.in_string = !self.in_string;
                out.push(NnToken::plain("\""));
                continue;
            }
            if self.in_string {
                out.push(NnToken::new("WORD", Value::String(tok.to_string())));
                continue;
            }

            if let Some(rest) = tok.strip_prefix('@') {
                if let Some(kind) = rest.strip_suffix(".*") {
                    out.push(NnToken::new("CLASS_STAR", Value::String(kind.to_string())));
                } else {
                    self.last_function = Some(rest.to_string());
                    out.push(NnToken::new("FUNCTION", Value::String(rest.to_string())));
                }
                continue;
            }
            if let Some(label) = tok.strip_prefix("enum:") {
                out.push(NnToken::new("ENUM", Value::Enum(label.to_string())));
                continue;
            }
            if let Some(rest) = tok.strip_prefix("param:") {
                // `param:name` or `param:name:Type`; only the name matters
                // for entity resolution context.
                let name = rest.split(':').next().unwrap_or(rest);
                self.last_param = Some(name.to_string());
                out.push(NnToken::new("PARAM", Value::VarRef(name.to_string())));
                continue;
            }
            if let Some(unit) = tok.strip_prefix("unit:") {
                out.push(NnToken::new("UNIT", Value::String(unit.to_string())));
                continue;
            }
            if let Some(device) = tok.strip_prefix("device:") {
                out.push(NnToken::new("DEVICE", Value::String(device.to_string())));
                continue;
            }
            if let Some(special) = tok.strip_prefix("special:") {
                out.push(NnToken::new("SPECIAL", Value::String(special.to_string())));
                continue;
            }
            if let Some(ty) = tok.strip_prefix("^^") {
                out.push(NnToken::new("ENTITY_TYPE", Value::String(ty.to_string())));
                continue;
            }
            if let Some(time) = tok.strip_prefix("TIME:") {
                out.push(NnToken::new("LITERAL_TIME", parse_literal_time(tok, time)?));
                continue;
            }
            if is_integer_literal(tok) {
                if tok == "0" || tok == "1" {
                    out.push(NnToken::plain(tok));
                } else {
                    let n: f64 = tok.parse().map_err(|_| LexError::MalformedToken {
                        token: tok.to_string(),
                        reason: "integer out of range".into(),
                    })?;
                    out.push(NnToken::new("LITERAL_INTEGER", Value::Number(n)));
                }
                continue;
            }
            if let Some(entity_type) = placeholder_type(tok) {
                // MEASURE placeholders consume the following `unit:` token.
                let unit = if entity_type.starts_with("MEASURE") || entity_type == "DURATION" {
                    match tokens.get(i).map(|t| t.as_ref()) {
                        Some(next) if next.starts_with("unit:") => {
                            i += 1;
                            Some(next["unit:".len()..].to_string())
                        }
                        _ => None,
                    }
                } else {
                    None
                };
                let token = self.resolve_placeholder(tok, &entity_type, unit.as_deref())?;
                out.push(token);
                continue;
            }

            out.push(NnToken::plain(tok));
        }
        Ok(out)
    }

    fn resolve_placeholder(
        &mut self,
        tok: &str,
        entity_type: &str,
        unit: Option<&str>,
    ) -> Result<NnToken, LexError> {
        let resolved = match &mut self.resolver {
            EntityResolver::Map(map) => map.get(tok).cloned(),
            EntityResolver::Callback(f) => f(
                tok,
                self.last_param.as_deref(),
                self.last_function.as_deref(),
                unit,
            ),
        };
        let Some(value) = resolved else {
            if tok.starts_with("SLOT_") {
                return Ok(NnToken::new("SLOT", Value::Undefined(true)));
            }
            return Err(LexError::UnresolvedPlaceholder {
                token: tok.to_string(),
            });
        };

        if let Some(kind) = entity_type.strip_prefix("GENERIC_ENTITY_") {
            let value = match value {
                entity @ Value::Entity { .. } => entity,
                Value::String(s) => Value::Entity {
                    value: s,
                    display: None,
                    ty: kind.to_string(),
                },
                other => other,
            };
            return Ok(NnToken::new("GENERIC_ENTITY", value));
        }
        if let Some(unit) = unit {
            let value = match value {
                Value::Number(n) => Value::Measure(n, unit.to_string()),
                other => other,
            };
            return Ok(NnToken::new(entity_type.to_string(), value));
        }
        Ok(NnToken::new(entity_type.to_string(), value))
    }
}

// ---------------------------------------------------------------------------
// Classification helpers
// ---------------------------------------------------------------------------

fn is_integer_literal(tok: &str) -> bool {
    let digits = tok.strip_prefix('-').unwrap_or(tok);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Capital-prefix placeholders (`NUMBER_0`, `QUOTED_STRING_2`,
/// `GENERIC_ENTITY_com.foo:bar_1`): the suffix after the last `_` is the
/// index, the rest is the entity type.
fn placeholder_type(tok: &str) -> Option<String> {
    if !tok.starts_with(|c: char| c.is_ascii_uppercase()) {
        return None;
    }
    let (ty, index) = tok.rsplit_once('_')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(ty.to_string())
}

fn parse_literal_time(tok: &str, body: &str) -> Result<Value, LexError> {
    let malformed = |reason: &str| LexError::MalformedToken {
        token: tok.to_string(),
        reason: reason.to_string(),
    };
    let mut parts = body.split(':');
    let hour = parts
        .next()
        .and_then(|p| p.parse::<u8>().ok())
        .ok_or_else(|| malformed("bad hour"))?;
    let minute = parts
        .next()
        .and_then(|p| p.parse::<u8>().ok())
        .ok_or_else(|| malformed("bad minute"))?;
    let second = parts
        .next()
        .and_then(|p| p.parse::<u8>().ok())
        .ok_or_else(|| malformed("bad second"))?;
    if parts.next().is_some() || hour > 23 || minute > 59 || second > 59 {
        return Err(malformed("out of range"));
    }
    Ok(Value::Time(TimeValue {
        hour,
        minute,
        second,
    }))
}
