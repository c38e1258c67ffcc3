use crate::{rrc, Operation, Type, RRC, WRC};
use smallvec::SmallVec;
use std::cell::Cell;

use crate::operation::OpId;

// Thread-local counter for value identities. Monotonic ids sidestep the
// ABA problem that raw-pointer keys have once operations are erased and
// their allocations reused.
thread_local! {
    static VALUE_ID: Cell<u64> = const { Cell::new(0) };
}

fn next_value_id() -> ValueId {
    VALUE_ID.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        ValueId(id)
    })
}

/// A stable identity for a [Value], usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u64);

/// A single use of a value: the consuming operation and the operand slot.
#[derive(Debug, Clone)]
pub struct Use {
    /// The operation that consumes the value.
    pub user: WRC<Operation>,
    /// Identity of the user, kept alongside the weak handle so use-list
    /// surgery does not need to upgrade.
    pub user_id: OpId,
    /// The operand index in the user.
    pub index: usize,
}

/// What defines a value.
#[derive(Debug, Clone)]
pub enum ValueKind {
    /// Result `index` of an operation.
    Result { op: WRC<Operation>, index: usize },
    /// Parameter `index` of a block.
    Param { index: usize },
}

/// An SSA value: defined exactly once, consumed by an explicit use list.
#[derive(Debug)]
pub struct Value {
    id: ValueId,
    ty: Type,
    kind: ValueKind,
    uses: SmallVec<[Use; 2]>,
}

impl Value {
    /// Create the `index`-th result value of `op`.
    pub(crate) fn new_result(
        ty: Type,
        op: &RRC<Operation>,
        index: usize,
    ) -> RRC<Self> {
        rrc(Value {
            id: next_value_id(),
            ty,
            kind: ValueKind::Result {
                op: WRC::new(op),
                index,
            },
            uses: SmallVec::new(),
        })
    }

    /// Create the `index`-th parameter value of a block.
    pub(crate) fn new_param(ty: Type, index: usize) -> RRC<Self> {
        rrc(Value {
            id: next_value_id(),
            ty,
            kind: ValueKind::Param { index },
            uses: SmallVec::new(),
        })
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// The operation defining this value, or `None` for block parameters.
    pub fn defining_op(&self) -> Option<RRC<Operation>> {
        match &self.kind {
            ValueKind::Result { op, .. } => op.try_upgrade(),
            ValueKind::Param { .. } => None,
        }
    }

    /// The result index of this value in its defining operation, or the
    /// parameter index for block parameters.
    pub fn index(&self) -> usize {
        match &self.kind {
            ValueKind::Result { index, .. } => *index,
            ValueKind::Param { index } => *index,
        }
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, ValueKind::Param { .. })
    }

    /// The current uses of this value.
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn has_one_use(&self) -> bool {
        self.uses.len() == 1
    }

    pub fn is_unused(&self) -> bool {
        self.uses.is_empty()
    }

    pub(crate) fn add_use(&mut self, u: Use) {
        self.uses.push(u);
    }

    pub(crate) fn remove_use(&mut self, user_id: OpId, index: usize) {
        let pos = self
            .uses
            .iter()
            .position(|u| u.user_id == user_id && u.index == index)
            .expect("removing a use that was never registered");
        self.uses.swap_remove(pos);
    }
}

/// Replace every use of `old` with `new`. The use list of `old` is left
/// empty; every former user now points at `new`.
pub fn replace_all_uses_with(old: &RRC<Value>, new: &RRC<Value>) {
    replace_uses_where(old, new, |_| true)
}

/// Replace every use of `old` with `new` except for uses held by `exempt`.
pub fn replace_all_uses_except(
    old: &RRC<Value>,
    new: &RRC<Value>,
    exempt: &RRC<Operation>,
) {
    let exempt_id = exempt.borrow().id();
    replace_uses_where(old, new, |u| u.user_id != exempt_id)
}

fn replace_uses_where(
    old: &RRC<Value>,
    new: &RRC<Value>,
    pred: impl Fn(&Use) -> bool,
) {
    if old.borrow().id == new.borrow().id {
        return;
    }
    let uses: Vec<Use> = old.borrow().uses.iter().cloned().collect();
    for u in uses.into_iter().filter(pred) {
        let user = u.user.upgrade();
        Operation::set_operand(&user, u.index, new.clone());
    }
}
