pub mod ast;
pub mod eval;
pub mod nn;
pub mod optimize;
mod parse_utils;
pub mod print;
pub mod tt_parser;

pub use optimize::{optimize_filter, optimize_program};
pub use print::pretty_print;
pub use tt_parser::{parse_class, parse_dataset, parse_program};
