pub mod env;
pub mod error;
pub mod interp;

pub use env::{ExecEnvironment, Tuple, TupleStream};
pub use error::{ExecError, ExecReason, ExecResult};
pub use interp::{run_program, run_rule};
