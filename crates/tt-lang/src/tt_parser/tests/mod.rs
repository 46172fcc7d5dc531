use crate::ast::*;
use crate::print::pretty_print;
use crate::tt_parser::{parse_class, parse_dataset, parse_program};

mod basic;
mod class;
mod errors;
mod roundtrip;

/// Parse, or panic with the parser's message.
fn parse_ok(input: &str) -> Program {
    parse_program(input).unwrap_or_else(|e| panic!("parse failed for `{input}`: {e}"))
}

/// Parse, print, reparse: the reparse must be structurally equal.
fn roundtrip(input: &str) -> Program {
    let program = parse_ok(input);
    let printed = pretty_print(&program);
    let again = parse_program(&printed)
        .unwrap_or_else(|e| panic!("reparse failed for `{printed}`: {e}"));
    assert_eq!(again, program, "round-trip changed structure: `{printed}`");
    program
}

fn single_rule(program: &Program) -> &Rule {
    let mut rules = program.rules();
    let rule = rules.next().expect("program has no rule");
    assert!(rules.next().is_none(), "program has more than one rule");
    rule
}
