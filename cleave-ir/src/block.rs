use crate::{Operation, Type, Value, RRC};

/// A region nested inside an operation: an ordered list of blocks.
#[derive(Debug, Default)]
pub struct Region {
    pub blocks: Vec<Block>,
}

impl Region {
    pub fn new(blocks: Vec<Block>) -> Self {
        Region { blocks }
    }
}

/// An ordered sequence of operations, ending in a terminator once fully
/// constructed. The block owns its operations and its parameter values.
///
/// The block is the only place operations are added, erased, or moved;
/// every mutation renumbers the cached positions so that
/// [Block::is_before] and range queries stay consistent.
#[derive(Debug, Default)]
pub struct Block {
    params: Vec<RRC<Value>>,
    ops: Vec<RRC<Operation>>,
}

impl Block {
    pub fn new(param_types: Vec<Type>) -> Self {
        let params = param_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| Value::new_param(ty, index))
            .collect();
        Block {
            params,
            ops: Vec::new(),
        }
    }

    pub fn params(&self) -> &[RRC<Value>] {
        &self.params
    }

    pub fn param(&self, index: usize) -> RRC<Value> {
        self.params[index].clone()
    }

    pub fn ops(&self) -> &[RRC<Operation>] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The terminator, if the block has one.
    pub fn terminator(&self) -> Option<RRC<Operation>> {
        self.ops
            .last()
            .filter(|op| op.borrow().is_terminator())
            .cloned()
    }

    /// All operations except the trailing terminator.
    pub fn without_terminator(&self) -> &[RRC<Operation>] {
        match self.ops.last() {
            Some(op) if op.borrow().is_terminator() => {
                &self.ops[..self.ops.len() - 1]
            }
            _ => &self.ops,
        }
    }

    /// True iff `op` is a member of this block.
    pub fn contains(&self, op: &RRC<Operation>) -> bool {
        let pos = op.borrow().raw_pos() as usize;
        pos < self.ops.len()
            && self.ops[pos].borrow().id() == op.borrow().id()
    }

    /// True iff `a` precedes `b` in this block.
    pub fn is_before(&self, a: &RRC<Operation>, b: &RRC<Operation>) -> bool {
        debug_assert!(self.contains(a) && self.contains(b));
        a.borrow().pos() < b.borrow().pos()
    }

    /// Operations strictly between `a` and `b` in block order.
    pub fn range_between(
        &self,
        a: &RRC<Operation>,
        b: &RRC<Operation>,
    ) -> &[RRC<Operation>] {
        let lo = a.borrow().pos() + 1;
        let hi = b.borrow().pos();
        &self.ops[lo..hi]
    }

    /// Append an operation at the end of the block.
    pub fn push(&mut self, op: RRC<Operation>) {
        op.borrow().set_pos(self.ops.len());
        self.ops.push(op);
    }

    /// Insert `op` immediately before `anchor`.
    pub fn insert_before(&mut self, op: RRC<Operation>, anchor: &RRC<Operation>) {
        let at = anchor.borrow().pos();
        self.ops.insert(at, op);
        self.renumber(at);
    }

    /// Relocate `op` to immediately before `anchor`.
    pub fn move_before(&mut self, op: &RRC<Operation>, anchor: &RRC<Operation>) {
        let from = op.borrow().pos();
        let to = anchor.borrow().pos();
        debug_assert!(from != to, "moving an operation before itself");
        let moved = self.ops.remove(from);
        let to = if to > from { to - 1 } else { to };
        self.ops.insert(to, moved);
        self.renumber(from.min(to));
    }

    /// Relocate `op` to immediately after `anchor`.
    pub fn move_after(&mut self, op: &RRC<Operation>, anchor: &RRC<Operation>) {
        let from = op.borrow().pos();
        let to = anchor.borrow().pos();
        debug_assert!(from != to, "moving an operation after itself");
        let moved = self.ops.remove(from);
        let to = if to > from { to } else { to + 1 };
        self.ops.insert(to, moved);
        self.renumber(from.min(to));
    }

    /// Remove `op` from the block and drop the uses its operands held.
    /// The operation's results must be unused.
    pub fn erase(&mut self, op: &RRC<Operation>) {
        debug_assert!(
            op.borrow().results().iter().all(|r| r.borrow().is_unused()),
            "erasing `{}' whose results still have uses",
            op.borrow().opcode()
        );
        let pos = op.borrow().pos();
        debug_assert!(self.contains(op));
        Operation::drop_operand_uses(op);
        self.ops.remove(pos);
        self.renumber(pos);
    }

    fn renumber(&self, from: usize) {
        for (i, op) in self.ops.iter().enumerate().skip(from) {
            op.borrow().set_pos(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        AttrValue, Attributes, Builder, Function, Operation, Signature, Type,
    };

    fn sample() -> Function {
        let mut func = Function::new(
            "f",
            Signature::new(vec![Type::F32], vec![Type::F32]),
        );
        let mut builder = Builder::new(&mut func);
        let arg = builder.param(0);
        let c = builder.add_constant(AttrValue::Num(1), Type::F32);
        let exp = builder.add_op(
            "exp",
            vec![arg],
            vec![Type::F32],
            Attributes::default(),
        );
        let add = builder.add_op(
            "add",
            vec![exp.borrow().result(0), c.borrow().result(0)],
            vec![Type::F32],
            Attributes::default(),
        );
        builder.add_return(vec![add.borrow().result(0)]);
        func
    }

    #[test]
    fn positions_track_block_order() {
        let func = sample();
        let ops = func.body.ops().to_vec();
        assert_eq!(ops.len(), 4);
        for (i, op) in ops.iter().enumerate() {
            assert_eq!(op.borrow().pos(), i);
        }
        assert!(func.body.is_before(&ops[0], &ops[2]));
        assert_eq!(func.body.range_between(&ops[0], &ops[2]).len(), 1);
    }

    #[test]
    fn moves_renumber() {
        let mut func = sample();
        let ops = func.body.ops().to_vec();
        let (c, exp) = (&ops[0], &ops[1]);
        func.body.move_after(c, exp);
        let order: Vec<_> = func
            .body
            .ops()
            .iter()
            .map(|o| o.borrow().opcode().to_string())
            .collect();
        assert_eq!(order, ["exp", "constant", "add", "return"]);
        for (i, op) in func.body.ops().iter().enumerate() {
            assert_eq!(op.borrow().pos(), i);
        }
        func.body.move_before(c, exp);
        let order: Vec<_> = func
            .body
            .ops()
            .iter()
            .map(|o| o.borrow().opcode().to_string())
            .collect();
        assert_eq!(order, ["constant", "exp", "add", "return"]);
    }

    #[test]
    fn erase_drops_operand_uses() {
        let mut func = sample();
        let ops = func.body.ops().to_vec();
        let (exp, add, ret) = (&ops[1], &ops[2], &ops[3]);
        // Unwire add's users bottom-up, then erase.
        func.body.erase(ret);
        func.body.erase(add);
        let exp_result = exp.borrow().result(0);
        assert!(exp_result.borrow().is_unused());
        assert_eq!(func.body.len(), 2);
    }

    #[test]
    fn set_operand_rewires_uses() {
        let func = sample();
        let ops = func.body.ops().to_vec();
        let (c, exp, add) = (&ops[0], &ops[1], &ops[2]);
        let c_result = c.borrow().result(0);
        let exp_result = exp.borrow().result(0);
        assert!(c_result.borrow().has_one_use());
        Operation::set_operand(add, 1, exp_result.clone());
        assert!(c_result.borrow().is_unused());
        assert_eq!(exp_result.borrow().uses().len(), 2);
    }
}
