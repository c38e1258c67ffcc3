//! Helpers for examining operations.
use crate::{AttrValue, Operation, RRC};
use crate::{CALLEE_ATTR, CONSTANT, VALUE_ATTR};
use cleave_utils::Id;

/// True iff `op` materializes a literal: a `constant` carrying a `value`
/// attribute.
pub fn is_constant_like(op: &RRC<Operation>) -> bool {
    let op = op.borrow();
    op.is(CONSTANT) && op.attributes.has(VALUE_ATTR)
}

/// True iff `op` is a constant whose literal is a single broadcast scalar
/// rather than a dense list.
pub fn is_splat_constant_like(op: &RRC<Operation>) -> bool {
    let op = op.borrow();
    op.is(CONSTANT)
        && matches!(op.attributes.get(VALUE_ATTR), Some(AttrValue::Num(_)))
}

/// The callee symbol of a `call` operation, if `op` is one.
pub fn callee(op: &RRC<Operation>) -> Option<Id> {
    op.borrow().attributes.get_str(CALLEE_ATTR)
}
