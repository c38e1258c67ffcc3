//! Identification of host-bound operations.
//!
//! An operation is *host* if it carries the configured device attribute
//! with the value `"host"`, if any operation nested in its regions does,
//! or if a host operation (transitively) consumes one of its results
//! through an operand chain. The closure deliberately walks operands
//! only: a host operation's consumers are not dragged onto the host.
use cleave_ir::{utils, Function, OpId, Operation, RRC};
use cleave_utils::Id;
use std::collections::HashSet;

/// The device-attribute value that marks an operation as host-bound.
pub const DEVICE_ATTR_HOST: &str = "host";

/// True iff `op` is directly host: it carries `attr_name = "host"`, or an
/// operation nested in one of its regions (transitively) does.
pub fn is_host_op(op: &RRC<Operation>, attr_name: Id) -> bool {
    {
        let op = op.borrow();
        for region in &op.regions {
            for block in &region.blocks {
                for inner in block.ops() {
                    if is_host_op(inner, attr_name) {
                        return true;
                    }
                }
            }
        }
    }
    op.borrow()
        .attributes
        .get_str(attr_name)
        .is_some_and(|v| v == DEVICE_ATTR_HOST)
}

/// Insert `op` and, transitively, the defining operations of its operands.
fn insert_ops_recursively(op: &RRC<Operation>, set: &mut HashSet<OpId>) {
    if !set.insert(op.borrow().id()) {
        return;
    }
    let operands = op.borrow().operands().to_vec();
    for operand in operands {
        if let Some(def) = operand.borrow().defining_op() {
            insert_ops_recursively(&def, set);
        }
    }
}

/// The set of host operations of `func`: every directly host operation in
/// the entry block, closed over operand chains.
pub fn host_closure(func: &Function, attr_name: Id) -> HashSet<OpId> {
    let mut host = HashSet::new();
    for op in func.body.without_terminator() {
        if is_host_op(op, attr_name) {
            insert_ops_recursively(op, &mut host);
        }
    }
    host
}

/// True iff `op` is a constant whose only user is a host operation. Such
/// constants are kept out of device clusters, but are *not* part of the
/// host set: the closure in [host_closure] does not know about them.
pub fn is_host_bound_constant(op: &RRC<Operation>, attr_name: Id) -> bool {
    if !utils::is_constant_like(op) || op.borrow().num_results() == 0 {
        return false;
    }
    let result = op.borrow().result(0);
    let user = {
        let result = result.borrow();
        if !result.has_one_use() {
            return false;
        }
        result.uses()[0].user.upgrade()
    };
    is_host_op(&user, attr_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleave_ir::{
        AttrValue, Attributes, Builder, Function, Signature, Type,
    };

    const ATTR: &str = "device";

    fn host_attrs() -> Attributes {
        std::iter::once((ATTR, AttrValue::Str(DEVICE_ATTR_HOST.into())))
            .collect()
    }

    /// `a -> b(host) -> c`: the closure contains `a` and `b` but not the
    /// consumer `c`.
    #[test]
    fn closure_walks_operands_not_uses() {
        let mut func = Function::new(
            "f",
            Signature::new(vec![Type::F32], vec![Type::F32]),
        );
        let mut builder = Builder::new(&mut func);
        let arg = builder.param(0);
        let a = builder.add_op(
            "exp",
            vec![arg],
            vec![Type::F32],
            Attributes::default(),
        );
        let b = builder.add_op(
            "round",
            vec![a.borrow().result(0)],
            vec![Type::F32],
            host_attrs(),
        );
        let c = builder.add_op(
            "neg",
            vec![b.borrow().result(0)],
            vec![Type::F32],
            Attributes::default(),
        );
        builder.add_return(vec![c.borrow().result(0)]);

        let host = host_closure(&func, ATTR.into());
        assert!(host.contains(&a.borrow().id()));
        assert!(host.contains(&b.borrow().id()));
        assert!(!host.contains(&c.borrow().id()));
    }

    /// An op is host if a nested op is host, and its operand chain is
    /// pulled in transitively.
    #[test]
    fn nested_regions_mark_the_parent() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let c = builder.add_constant(AttrValue::Num(3), Type::I64);
        let outer = builder.add_op(
            "loop",
            vec![c.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        {
            let mut inner_block = cleave_ir::Block::new(vec![]);
            inner_block.push(cleave_ir::Operation::build(
                "tick",
                vec![],
                vec![],
                host_attrs(),
            ));
            outer
                .borrow_mut()
                .regions
                .push(cleave_ir::Region::new(vec![inner_block]));
        }
        builder.add_return(vec![outer.borrow().result(0)]);

        assert!(is_host_op(&outer, ATTR.into()));
        let host = host_closure(&func, ATTR.into());
        assert!(host.contains(&outer.borrow().id()));
        assert!(host.contains(&c.borrow().id()));
    }

    #[test]
    fn constants_follow_their_sole_host_user() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let c = builder.add_constant(AttrValue::Num(1), Type::I64);
        let host_user = builder.add_op(
            "add",
            vec![c.borrow().result(0)],
            vec![Type::I64],
            host_attrs(),
        );
        builder.add_return(vec![host_user.borrow().result(0)]);

        assert!(is_host_bound_constant(&c, ATTR.into()));
        // The closure reaches `c` anyway through the host user's operand
        // chain.
        let host = host_closure(&func, ATTR.into());
        assert!(host.contains(&c.borrow().id()));
    }

    #[test]
    fn multi_use_constants_stay_on_device() {
        let mut func = Function::new(
            "f",
            Signature::new(vec![], vec![Type::I64, Type::I64]),
        );
        let mut builder = Builder::new(&mut func);
        let c = builder.add_constant(AttrValue::Num(1), Type::I64);
        let host_user = builder.add_op(
            "add",
            vec![c.borrow().result(0)],
            vec![Type::I64],
            host_attrs(),
        );
        let dev_user = builder.add_op(
            "mul",
            vec![c.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![
            host_user.borrow().result(0),
            dev_user.borrow().result(0),
        ]);
        assert!(!is_host_bound_constant(&c, ATTR.into()));
    }
}
