//! Rewrite maps for cloning IR while redirecting value references.
use crate::{Block, Operation, Region, Value, ValueId, RRC};
use std::collections::HashMap;

/// A mapping from original values to their replacements, applied while
/// cloning operations. Values without an entry map to themselves.
#[derive(Default)]
pub struct Rewriter {
    value_map: HashMap<ValueId, RRC<Value>>,
}

impl Rewriter {
    /// Record that `old` should be rewritten to `new`.
    pub fn map(&mut self, old: &RRC<Value>, new: RRC<Value>) {
        self.value_map.insert(old.borrow().id(), new);
    }

    /// The replacement for `value`, if one was recorded.
    pub fn get(&self, value: &RRC<Value>) -> Option<RRC<Value>> {
        self.value_map.get(&value.borrow().id()).cloned()
    }

    /// The replacement for `value`, or `value` itself when no replacement
    /// was recorded.
    pub fn lookup_or_default(&self, value: &RRC<Value>) -> RRC<Value> {
        self.get(value).unwrap_or_else(|| value.clone())
    }
}

/// Clone `op` (regions included), rewriting operands through `rewriter`.
/// The clone's results are recorded in `rewriter` so later clones see
/// them. The returned operation is detached; the caller inserts it.
pub fn clone_operation(
    op: &RRC<Operation>,
    rewriter: &mut Rewriter,
) -> RRC<Operation> {
    let (opcode, attributes, operands, result_types) = {
        let op = op.borrow();
        (
            op.opcode(),
            op.attributes.clone(),
            op.operands()
                .iter()
                .map(|v| rewriter.lookup_or_default(v))
                .collect::<Vec<_>>(),
            op.results()
                .iter()
                .map(|r| r.borrow().ty().clone())
                .collect::<Vec<_>>(),
        )
    };
    let new_op = Operation::build(opcode, operands, result_types, attributes);
    {
        let old = op.borrow();
        let new = new_op.borrow();
        for (old_res, new_res) in old.results().iter().zip(new.results()) {
            rewriter.map(old_res, new_res.clone());
        }
    }

    let num_regions = op.borrow().regions.len();
    for region_idx in 0..num_regions {
        let mut blocks = Vec::new();
        {
            let old = op.borrow();
            let region = &old.regions[region_idx];
            for block in &region.blocks {
                let param_types = block
                    .params()
                    .iter()
                    .map(|p| p.borrow().ty().clone())
                    .collect::<Vec<_>>();
                let mut new_block = Block::new(param_types);
                for (old_param, new_param) in
                    block.params().iter().zip(new_block.params().to_vec())
                {
                    rewriter.map(old_param, new_param);
                }
                for inner in block.ops().to_vec() {
                    let cloned = clone_operation(&inner, rewriter);
                    new_block.push(cloned);
                }
                blocks.push(new_block);
            }
        }
        new_op.borrow_mut().regions.push(Region::new(blocks));
    }
    new_op
}

/// Deep-clone a function under `name`: fresh parameter values, fresh
/// operations, identical structure.
pub fn clone_function(
    func: &crate::Function,
    name: cleave_utils::Id,
) -> crate::Function {
    let mut clone = crate::Function::new(name, func.signature.clone());
    clone.attributes = func.attributes.clone();
    clone.public = func.public;
    let mut rewriter = Rewriter::default();
    for (old_param, new_param) in
        func.body.params().iter().zip(clone.body.params().to_vec())
    {
        rewriter.map(old_param, new_param);
    }
    for op in func.body.ops().to_vec() {
        let cloned = clone_operation(&op, &mut rewriter);
        clone.body.push(cloned);
    }
    clone
}

/// Duplicate selected defining operations so that every user of a result
/// holds a private copy: for each use of a matching defining op beyond the
/// last one, a clone of the definition is inserted just before the user
/// and the operand rewired to it.
///
/// Running the pass twice adds nothing: after one application each
/// matching definition has at most one remaining use.
pub fn replicate_defining_op<F>(block: &mut Block, pred: F)
where
    F: Fn(&RRC<Operation>) -> bool,
{
    let ops: Vec<_> = block.ops().to_vec();
    for op in ops {
        let num_operands = op.borrow().num_operands();
        for index in 0..num_operands {
            let operand = op.borrow().operand(index);
            let Some(def) = operand.borrow().defining_op() else {
                continue;
            };
            if !block.contains(&def) || !pred(&def) {
                continue;
            }
            if operand.borrow().has_one_use() {
                continue;
            }
            let mut rewriter = Rewriter::default();
            let clone = clone_operation(&def, &mut rewriter);
            block.insert_before(clone.clone(), &op);
            let result_index = operand.borrow().index();
            let replacement = clone.borrow().result(result_index);
            Operation::set_operand(&op, index, replacement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::is_constant_like;
    use crate::{
        AttrValue, Attributes, Builder, Function, Signature, Type,
    };

    /// `f(a) = (a + 1) * (a - 1)` with a shared `1` constant.
    fn shared_constant_func() -> Function {
        let mut func = Function::new(
            "f",
            Signature::new(vec![Type::F32], vec![Type::F32]),
        );
        let mut builder = Builder::new(&mut func);
        let arg = builder.param(0);
        let one = builder.add_constant(AttrValue::Num(1), Type::F32);
        let add = builder.add_op(
            "add",
            vec![arg.clone(), one.borrow().result(0)],
            vec![Type::F32],
            Attributes::default(),
        );
        let sub = builder.add_op(
            "sub",
            vec![arg, one.borrow().result(0)],
            vec![Type::F32],
            Attributes::default(),
        );
        let mul = builder.add_op(
            "mul",
            vec![add.borrow().result(0), sub.borrow().result(0)],
            vec![Type::F32],
            Attributes::default(),
        );
        builder.add_return(vec![mul.borrow().result(0)]);
        func
    }

    #[test]
    fn replication_privatizes_constants() {
        let mut func = shared_constant_func();
        assert_eq!(func.body.len(), 5);
        replicate_defining_op(&mut func.body, is_constant_like);
        // One extra constant: `add` and `sub` each own a copy now.
        assert_eq!(func.body.len(), 6);
        for op in func.body.without_terminator() {
            if is_constant_like(op) {
                assert!(op.borrow().result(0).borrow().has_one_use());
            }
        }
    }

    #[test]
    fn replication_is_idempotent() {
        let mut func = shared_constant_func();
        replicate_defining_op(&mut func.body, is_constant_like);
        let after_first = func.body.len();
        replicate_defining_op(&mut func.body, is_constant_like);
        assert_eq!(func.body.len(), after_first);
    }

    #[test]
    fn cloned_functions_are_independent() {
        let func = shared_constant_func();
        let mut clone = clone_function(&func, "f_clone".into());
        assert_eq!(clone.body.len(), func.body.len());
        // Restructuring the clone leaves the original untouched.
        let ops = clone.body.ops().to_vec();
        clone.body.move_after(&ops[0], &ops[1]);
        assert_eq!(
            func.body.ops()[0].borrow().opcode().to_string(),
            "constant"
        );
        // The clone's ops reference the clone's values, not the original's.
        let orig_arg = func.body.param(0);
        let clone_first_operand =
            clone.body.ops()[0].borrow().operand(0);
        assert_ne!(
            orig_arg.borrow().id(),
            clone_first_operand.borrow().id()
        );
    }
}
