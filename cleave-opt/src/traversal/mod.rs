//! Helpers for traversing the functions of a [cleave_ir::Context].
mod action;
mod construct;
mod diagnostics;
mod post_order;
mod visitor;

pub use action::{Action, VisResult};
pub use construct::{ConstructVisitor, Named, ParseVal, PassOpt};
pub use diagnostics::{DiagnosticContext, DiagnosticPass};
pub use post_order::{FuncTraversal, Order};
pub use visitor::Visitor;
