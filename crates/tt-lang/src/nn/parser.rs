use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NnParseError {
    #[error("syntax error at token {position} (`{terminal}`): expected one of {expected:?}")]
    UnexpectedToken {
        position: usize,
        terminal: String,
        expected: Vec<String>,
    },
    #[error("semantic error at token {position}: {message}")]
    Semantic { position: usize, message: String },
    #[error("parser tables are inconsistent: {0}")]
    BadTables(String),
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAction {
    Shift(usize),
    Reduce(usize),
    Accept,
}

/// Distinguished end-of-input terminal.
pub const EOF_TERMINAL: &str = "$EOF";

/// Precomputed LR tables: `actions[state][terminal]`, `gotos[state][nonterminal]`,
/// and per-rule arity / produced nonterminal.
#[derive(Debug, Clone)]
pub struct ParserTables {
    pub actions: Vec<HashMap<String, ParseAction>>,
    pub gotos: Vec<HashMap<String, usize>>,
    pub rule_arity: Vec<usize>,
    pub rule_nonterminal: Vec<String>,
}

// ---------------------------------------------------------------------------
// Semantic actions
// ---------------------------------------------------------------------------

/// Context available to a semantic action: the index of the lookahead token
/// when the reduction fired, and an `error` constructor bound to it.
pub struct ReduceContext {
    pub position: usize,
}

impl ReduceContext {
    pub fn error(&self, message: impl Into<String>) -> NnParseError {
        NnParseError::Semantic {
            position: self.position,
            message: message.into(),
        }
    }
}

/// One semantic action per grammar rule: consumes the rule's right-hand-side
/// values (left to right) and produces the nonterminal's value.
pub type SemanticAction<V> = Box<dyn Fn(Vec<V>, &ReduceContext) -> Result<V, NnParseError>>;

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Deterministic shift-reduce parser over precomputed tables. Linear in the
/// token count; no backtracking.
pub struct ShiftReduceParser<V> {
    tables: ParserTables,
    semantics: Vec<SemanticAction<V>>,
}

impl<V> ShiftReduceParser<V> {
    pub fn new(tables: ParserTables, semantics: Vec<SemanticAction<V>>) -> Self {
        ShiftReduceParser { tables, semantics }
    }

    /// Run the parser over `(terminal, value)` pairs, applying semantic
    /// actions on every reduction; returns the start symbol's value.
    pub fn parse<I>(&self, tokens: I) -> Result<V, NnParseError>
    where
        I: IntoIterator<Item = (String, V)>,
    {
        self.drive(tokens, |rule, values, ctx| {
            let action = self.semantics.get(rule).ok_or_else(|| {
                NnParseError::BadTables(format!("no semantic action for rule {rule}"))
            })?;
            action(values, ctx)
        })
    }

    /// Run the parser recording only the reduction sequence — the form used
    /// to emit NN training output.
    pub fn parse_to_sequence<I>(&self, terminals: I) -> Result<Vec<usize>, NnParseError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut sequence = Vec::new();
        self.drive(
            terminals.into_iter().map(|t| (t, ())),
            |rule, _values, _ctx| {
                sequence.push(rule);
                Ok(())
            },
        )?;
        Ok(sequence)
    }

    /// Core LR loop shared by both entry points. `()`-valued parsing reuses
    /// the same stacks with zero-sized values.
    fn drive<T, I>(
        &self,
        tokens: I,
        mut reduce: impl FnMut(usize, Vec<T>, &ReduceContext) -> Result<T, NnParseError>,
    ) -> Result<T, NnParseError>
    where
        I: IntoIterator<Item = (String, T)>,
    {
        let mut states: Vec<usize> = vec![0];
        let mut values: Vec<T> = Vec::new();

        let mut stream = tokens.into_iter();
        let mut lookahead = stream.next();
        let mut position = 0usize;

        loop {
            let state = *states.last().expect("state stack is never empty");
            let terminal = lookahead
                .as_ref()
                .map(|(t, _)| t.as_str())
                .unwrap_or(EOF_TERMINAL);

            let row = self
                .tables
                .actions
                .get(state)
                .ok_or_else(|| NnParseError::BadTables(format!("missing state {state}")))?;
            let Some(action) = row.get(terminal) else {
                let mut expected: Vec<String> = row.keys().cloned().collect();
                expected.sort();
                return Err(NnParseError::UnexpectedToken {
                    position,
                    terminal: terminal.to_string(),
                    expected,
                });
            };

            match *action {
                ParseAction::Shift(next) => {
                    let (_, value) = lookahead
                        .take()
                        .ok_or_else(|| NnParseError::BadTables("shift on end of input".into()))?;
                    states.push(next);
                    values.push(value);
                    lookahead = stream.next();
                    position += 1;
                }
                ParseAction::Reduce(rule) => {
                    let arity = *self
                        .tables
                        .rule_arity
                        .get(rule)
                        .ok_or_else(|| NnParseError::BadTables(format!("unknown rule {rule}")))?;
                    if values.len() < arity || states.len() <= arity {
                        return Err(NnParseError::BadTables(format!(
                            "stack underflow reducing rule {rule}"
                        )));
                    }
                    let rhs = values.split_off(values.len() - arity);
                    states.truncate(states.len() - arity);
                    let ctx = ReduceContext { position };
                    let value = reduce(rule, rhs, &ctx)?;

                    let state = *states.last().expect("state stack is never empty");
                    let nonterminal = &self.tables.rule_nonterminal[rule];
                    let next = self
                        .tables
                        .gotos
                        .get(state)
                        .and_then(|g| g.get(nonterminal))
                        .ok_or_else(|| {
                            NnParseError::BadTables(format!(
                                "no goto for `{nonterminal}` in state {state}"
                            ))
                        })?;
                    states.push(*next);
                    values.push(value);
                }
                ParseAction::Accept => {
                    return values
                        .pop()
                        .ok_or_else(|| NnParseError::BadTables("accept with empty stack".into()));
                }
            }
        }
    }
}
