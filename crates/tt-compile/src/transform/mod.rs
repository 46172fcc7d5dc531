//! Program rewrites that sit between type checking and rule compilation:
//! declaration inlining, `executor=` lowering to remote send/receive,
//! policy extraction, and example grounding.

mod example;
mod inline;
mod lowering;
mod policy;


pub use example::{declaration_to_program, example_to_program};
pub use inline::inline_declarations;
pub use lowering::{LoweredProgram, REMOTE_KIND, lower_program};
pub use policy::program_to_policy;
