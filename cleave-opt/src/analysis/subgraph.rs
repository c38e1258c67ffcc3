//! Computation of a cluster's external SSA boundary: the values flowing in
//! from outside and the results consumed outside.
use cleave_ir::{OpId, Operation, ValueId, RRC, Value};
use std::collections::{HashMap, HashSet};

/// Multiplicities of the terminator's operands: how many times each value
/// is returned by the enclosing function.
pub type ReturnStats = HashMap<ValueId, i64>;

/// Every operation belonging to the cluster, including ops nested inside
/// members' regions.
fn member_set(ops: &[RRC<Operation>]) -> HashSet<OpId> {
    fn insert(op: &RRC<Operation>, set: &mut HashSet<OpId>) {
        set.insert(op.borrow().id());
        for region in &op.borrow().regions {
            for block in &region.blocks {
                for inner in block.ops() {
                    insert(inner, set);
                }
            }
        }
    }
    let mut set = HashSet::new();
    for op in ops {
        insert(op, &mut set);
    }
    set
}

/// The externally defined values consumed by the cluster, deduplicated, in
/// first-encounter order over the cluster's operations.
pub fn inputs_of_cluster(ops: &[RRC<Operation>]) -> Vec<RRC<Value>> {
    let members = member_set(ops);
    let mut seen: HashSet<ValueId> = HashSet::new();
    let mut inputs = Vec::new();

    fn visit(
        op: &RRC<Operation>,
        members: &HashSet<OpId>,
        seen: &mut HashSet<ValueId>,
        inputs: &mut Vec<RRC<Value>>,
    ) {
        let operands = op.borrow().operands().to_vec();
        for operand in operands {
            let defined_inside = operand
                .borrow()
                .defining_op()
                .is_some_and(|def| members.contains(&def.borrow().id()));
            if !defined_inside && seen.insert(operand.borrow().id()) {
                inputs.push(operand.clone());
            }
        }
        for region in &op.borrow().regions {
            for block in &region.blocks {
                for inner in block.ops() {
                    visit(inner, members, seen, inputs);
                }
            }
        }
    }

    for op in ops {
        visit(op, &members, &mut seen, &mut inputs);
    }
    inputs
}

/// The values produced by the cluster and consumed outside it, in block
/// order of their defining operations.
///
/// When `ret_stats` is provided, a value returned `k` times by the
/// function's terminator appears `k` times in the result list, so the
/// extracted function surfaces one result per terminator occurrence.
pub fn outputs_of_cluster(
    ops: &[RRC<Operation>],
    ret_stats: Option<&ReturnStats>,
) -> Vec<RRC<Value>> {
    let members = member_set(ops);
    let mut outputs = Vec::new();
    for op in ops {
        let results = op.borrow().results().to_vec();
        for result in results {
            let used_outside = result
                .borrow()
                .uses()
                .iter()
                .any(|u| !members.contains(&u.user_id));
            if !used_outside {
                continue;
            }
            let times = match ret_stats {
                Some(stats) => {
                    stats.get(&result.borrow().id()).copied().unwrap_or(1)
                }
                None => 1,
            };
            for _ in 0..times.max(1) {
                outputs.push(result.clone());
            }
        }
    }
    outputs
}
