mod expression;
mod filters;
mod function_def;
mod program;
mod resolved;
mod types;
mod values;
pub mod visit;

pub use expression::*;
pub use filters::*;
pub use function_def::*;
pub use program::*;
pub use resolved::Resolved;
pub use types::*;
pub use values::*;
pub use visit::{Rewriter, SlotRef, iter_slots, rewrite_program};
