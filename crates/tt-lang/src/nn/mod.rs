//! The neural-network token interface: a whitespace-token lexer that
//! resolves entity placeholders, and a table-driven shift-reduce parser
//! runtime. The concrete grammar tables for the full language are generated
//! offline; the runtime here is grammar-agnostic.

mod lexer;
mod parser;

pub use lexer::{EntityResolver, LexError, NnLexer, NnToken};
pub use parser::{
    EOF_TERMINAL, NnParseError, ParseAction, ParserTables, ReduceContext, SemanticAction,
    ShiftReduceParser,
};
