//! Internal representation for the cleave compiler.
//!
//! The IR models a module ([Context]) of functions, each with a single
//! entry [Block] of [Operation]s ending in a `return` terminator.
//! Operations reference [Value]s through explicit use lists, so passes can
//! query and rewrite dataflow without re-scanning the program. Handles are
//! shared ([RRC]) with weak back pointers ([WRC]); blocks own their
//! operations and are the only place the op order is mutated.

// Modules defining internal structures.
mod attribute;
mod block;
mod builder;
mod common;
mod context;
mod function;
mod operation;
mod printer;
mod rewriter;
mod types;
mod value;

/// Helpers for examining operations.
pub mod utils;

// Re-export types at the module level.
pub use attribute::{AttrValue, Attributes};
pub use block::{Block, Region};
pub use builder::Builder;
pub use cleave_utils::Id;
pub use common::{rrc, RRC, WRC};
pub use context::Context;
pub use function::{Function, Signature};
pub use operation::{
    OpId, Operation, CALL, CALLEE_ATTR, CONSTANT, RETURN, VALUE_ATTR,
};
pub use printer::Printer;
pub use rewriter::{
    clone_function, clone_operation, replicate_defining_op, Rewriter,
};
pub use types::Type;
pub use value::{
    replace_all_uses_except, replace_all_uses_with, Use, Value, ValueId,
    ValueKind,
};
