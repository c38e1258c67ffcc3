use crate::{rrc, Attributes, Region, Type, Value, RRC, WRC};
use cleave_utils::Id;
use smallvec::SmallVec;
use std::cell::Cell;

/// Opcode of the block terminator. Its operands are the values returned by
/// the enclosing function.
pub const RETURN: &str = "return";
/// Opcode of a function call. The callee symbol is carried by the
/// [CALLEE_ATTR] attribute.
pub const CALL: &str = "call";
/// Opcode of a constant. The literal is carried by the [VALUE_ATTR]
/// attribute: a `Num` for splats, a `NumList` for dense literals.
pub const CONSTANT: &str = "constant";

/// Attribute key naming the callee of a [CALL] operation.
pub const CALLEE_ATTR: &str = "callee";
/// Attribute key carrying the literal of a [CONSTANT] operation.
pub const VALUE_ATTR: &str = "value";

// Monotonic operation identities, mirroring the value counter.
thread_local! {
    static OP_ID: Cell<u64> = const { Cell::new(0) };
}

fn next_op_id() -> OpId {
    OP_ID.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        OpId(id)
    })
}

/// A stable identity for an [Operation], usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

/// A generic operation: an opcode, operand values, result values, optional
/// nested regions, and attributes.
///
/// Operations are owned by the block containing them; everything else holds
/// [RRC] handles. The `pos` cell caches the operation's index within its
/// block and is maintained by [crate::Block] whenever the block is
/// restructured.
#[derive(Debug)]
pub struct Operation {
    id: OpId,
    name: Id,
    operands: SmallVec<[RRC<Value>; 4]>,
    results: SmallVec<[RRC<Value>; 2]>,
    /// Nested regions, e.g. the body of a control-flow operation.
    pub regions: Vec<Region>,
    /// Attributes attached to this operation.
    pub attributes: Attributes,
    pos: Cell<u32>,
}

impl Operation {
    /// Construct a detached operation. Result values are created from
    /// `result_types`; uses are registered on the operands. The operation
    /// belongs to no block until inserted by a [crate::Block] or
    /// [crate::Builder].
    pub fn build<N: Into<Id>>(
        name: N,
        operands: Vec<RRC<Value>>,
        result_types: Vec<Type>,
        attributes: Attributes,
    ) -> RRC<Self> {
        let op = rrc(Operation {
            id: next_op_id(),
            name: name.into(),
            operands: SmallVec::new(),
            results: SmallVec::new(),
            regions: Vec::new(),
            attributes,
            pos: Cell::new(u32::MAX),
        });
        for (index, ty) in result_types.into_iter().enumerate() {
            let result = Value::new_result(ty, &op, index);
            op.borrow_mut().results.push(result);
        }
        let op_id = op.borrow().id;
        for (index, operand) in operands.into_iter().enumerate() {
            operand.borrow_mut().add_use(crate::Use {
                user: WRC::new(&op),
                user_id: op_id,
                index,
            });
            op.borrow_mut().operands.push(operand);
        }
        op
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn opcode(&self) -> Id {
        self.name
    }

    pub fn is(&self, opcode: &str) -> bool {
        self.name == opcode
    }

    pub fn is_terminator(&self) -> bool {
        self.is(RETURN)
    }

    pub fn operands(&self) -> &[RRC<Value>] {
        &self.operands
    }

    pub fn results(&self) -> &[RRC<Value>] {
        &self.results
    }

    pub fn operand(&self, index: usize) -> RRC<Value> {
        self.operands[index].clone()
    }

    pub fn result(&self, index: usize) -> RRC<Value> {
        self.results[index].clone()
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn num_results(&self) -> usize {
        self.results.len()
    }

    /// The cached position of this operation within its block.
    pub fn pos(&self) -> usize {
        debug_assert!(self.pos.get() != u32::MAX, "operation is detached");
        self.pos.get() as usize
    }

    pub(crate) fn set_pos(&self, pos: usize) {
        self.pos.set(pos as u32);
    }

    pub(crate) fn raw_pos(&self) -> u32 {
        self.pos.get()
    }

    /// Rewire operand `index` of `op` to `value`, keeping use lists
    /// consistent.
    pub fn set_operand(op: &RRC<Operation>, index: usize, value: RRC<Value>) {
        let (op_id, old) = {
            let op = op.borrow();
            (op.id, op.operands[index].clone())
        };
        if old.borrow().id() == value.borrow().id() {
            return;
        }
        old.borrow_mut().remove_use(op_id, index);
        value.borrow_mut().add_use(crate::Use {
            user: WRC::new(op),
            user_id: op_id,
            index,
        });
        op.borrow_mut().operands[index] = value;
    }

    /// Drop all operand uses held by `op`. Called when the operation is
    /// erased from its block.
    pub(crate) fn drop_operand_uses(op: &RRC<Operation>) {
        let (op_id, operands) = {
            let op = op.borrow();
            (op.id, op.operands.clone())
        };
        for (index, operand) in operands.iter().enumerate() {
            operand.borrow_mut().remove_use(op_id, index);
        }
    }

    /// True iff `op` is `other` or `other` is nested within one of `op`'s
    /// regions.
    pub fn is_ancestor(op: &RRC<Operation>, other: &RRC<Operation>) -> bool {
        let other_id = other.borrow().id;
        if op.borrow().id == other_id {
            return true;
        }
        fn contains(op: &RRC<Operation>, target: OpId) -> bool {
            op.borrow().regions.iter().any(|region| {
                region.blocks.iter().any(|block| {
                    block.ops().iter().any(|inner| {
                        inner.borrow().id == target || contains(inner, target)
                    })
                })
            })
        }
        contains(op, other_id)
    }
}
