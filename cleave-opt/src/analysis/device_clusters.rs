//! Clustering of device operations.
//!
//! Every non-host operation starts in a singleton cluster. Clusters are
//! grown by merging: two clusters can fuse when every operation caught in
//! the block-order gap between them can be legally relocated above the
//! upper cluster or below the lower one. Merged clusters form a
//! disjoint-set forest; the surviving root holds the combined op list and
//! the block is restructured so cluster members are contiguous.
use super::host_ops::{is_host_bound_constant, is_host_op};
use cleave_ir::{Block, Function, OpId, Operation, Value, RRC};
use cleave_utils::Id;
use linked_hash_map::LinkedHashMap;
use std::collections::HashMap;

/// An ordered, deduplicated set of operations. Iteration follows insertion
/// order, which the clusterer keeps aligned with block order.
#[derive(Clone, Default)]
pub struct OpList {
    ops: LinkedHashMap<OpId, RRC<Operation>>,
}

impl OpList {
    /// Insert at the back. Returns false if the op was already present.
    pub fn insert(&mut self, op: RRC<Operation>) -> bool {
        let id = op.borrow().id();
        if self.ops.contains_key(&id) {
            return false;
        }
        self.ops.insert(id, op);
        true
    }

    pub fn contains(&self, op: &RRC<Operation>) -> bool {
        self.ops.contains_key(&op.borrow().id())
    }

    pub fn remove(&mut self, op: &RRC<Operation>) -> bool {
        self.ops.remove(&op.borrow().id()).is_some()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn first(&self) -> Option<RRC<Operation>> {
        self.ops.front().map(|(_, op)| op.clone())
    }

    pub fn last(&self) -> Option<RRC<Operation>> {
        self.ops.back().map(|(_, op)| op.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RRC<Operation>> {
        self.ops.values()
    }

    /// Drain the set, returning the elements in order.
    pub fn take_vec(&mut self) -> Vec<RRC<Operation>> {
        std::mem::take(&mut self.ops).into_iter().map(|(_, op)| op).collect()
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = RRC<Operation>>) {
        for op in ops {
            self.insert(op);
        }
    }
}

impl FromIterator<RRC<Operation>> for OpList {
    fn from_iter<T: IntoIterator<Item = RRC<Operation>>>(iter: T) -> Self {
        let mut list = OpList::default();
        list.extend(iter);
        list
    }
}

impl std::fmt::Debug for OpList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|op| op.borrow().opcode()))
            .finish()
    }
}

/// Index of a cluster record in the clusterer's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterIdx(u32);

impl ClusterIdx {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A cluster record. `merged_into` is present exactly when the record has
/// been absorbed by another cluster; the op list of a non-root is empty.
#[derive(Debug, Default)]
struct Cluster {
    ops: OpList,
    merged_into: Option<ClusterIdx>,
}

/// Grows device clusters inside a single function body.
pub struct DeviceClusterer<'a> {
    block: &'a mut Block,
    clusters: Vec<Cluster>,
    op_to_cluster: HashMap<OpId, ClusterIdx>,
    candidates: Vec<ClusterIdx>,
}

impl<'a> DeviceClusterer<'a> {
    /// Seed one singleton cluster per device operation of `func`'s body.
    /// Host operations stay out, as do constants whose only user is host.
    pub fn new(func: &'a mut Function, attr_name: Id) -> Self {
        let mut clusters = Vec::new();
        let mut op_to_cluster = HashMap::new();
        for op in func.body.without_terminator() {
            if is_host_op(op, attr_name) {
                continue;
            }
            if is_host_bound_constant(op, attr_name) {
                continue;
            }
            let idx = ClusterIdx(clusters.len() as u32);
            let mut ops = OpList::default();
            ops.insert(op.clone());
            clusters.push(Cluster {
                ops,
                merged_into: None,
            });
            op_to_cluster.insert(op.borrow().id(), idx);
        }
        DeviceClusterer {
            block: &mut func.body,
            clusters,
            op_to_cluster,
            candidates: Vec::new(),
        }
    }

    /// Traverse the block forward, merging each operand's producer cluster
    /// into the consumer's cluster.
    pub fn merge_top_down(&mut self) {
        let ops: Vec<_> = self.block.without_terminator().to_vec();
        for op in ops {
            let mut cur = self.cluster_of(&op);
            let operands = op.borrow().operands().to_vec();
            for operand in operands {
                let pre = self.cluster_of_value(&operand);
                if let Some(merged) = self.try_merge(pre, cur) {
                    cur = Some(merged);
                }
            }
        }
    }

    /// Traverse the block backward, merging each user's cluster into the
    /// producer's cluster.
    pub fn merge_bottom_up(&mut self) {
        let ops: Vec<_> =
            self.block.without_terminator().iter().rev().cloned().collect();
        for op in ops {
            let mut cur = self.cluster_of(&op);
            let uses: Vec<_> = op
                .borrow()
                .results()
                .iter()
                .flat_map(|r| r.borrow().uses().to_vec())
                .collect();
            for u in uses {
                let pre = self.cluster_of(&u.user.upgrade());
                if let Some(merged) = self.try_merge(pre, cur) {
                    cur = Some(merged);
                }
            }
        }
    }

    /// Collect the surviving root clusters: sort by size descending, make
    /// one more coalescing sweep that greedily merges smaller clusters
    /// into each candidate, and resort.
    pub fn populate_candidates(&mut self) {
        let mut worklist: Vec<ClusterIdx> = (0..self.clusters.len())
            .map(|i| ClusterIdx(i as u32))
            .filter(|idx| self.clusters[idx.index()].merged_into.is_none())
            .collect();
        worklist.sort_by_key(|idx| {
            std::cmp::Reverse(self.clusters[idx.index()].ops.len())
        });

        self.candidates.clear();
        let mut worklist = std::collections::VecDeque::from(worklist);
        while let Some(mut cluster) = worklist.pop_front() {
            let mut i = 0;
            while i < worklist.len() {
                if let Some(merged) =
                    self.try_merge(Some(worklist[i]), Some(cluster))
                {
                    cluster = merged;
                    worklist.remove(i);
                } else {
                    i += 1;
                }
            }
            self.candidates.push(cluster);
        }
        self.candidates.sort_by_key(|idx| {
            std::cmp::Reverse(self.clusters[idx.index()].ops.len())
        });
    }

    /// The candidate clusters' operations, largest first. Consumes the
    /// clusterer; the block keeps the layout produced by the merges.
    pub fn into_candidates(mut self) -> Vec<Vec<RRC<Operation>>> {
        if self.candidates.is_empty() {
            self.populate_candidates();
        }
        self.candidates
            .iter()
            .map(|idx| {
                self.clusters[idx.index()]
                    .ops
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|ops| !ops.is_empty())
            .collect()
    }

    /// The operations of cluster `idx`, in order.
    pub fn ops_of(&self, idx: ClusterIdx) -> Vec<RRC<Operation>> {
        self.clusters[idx.index()].ops.iter().cloned().collect()
    }

    /// The root cluster containing `op`, if it is clustered at all.
    pub fn cluster_of(&mut self, op: &RRC<Operation>) -> Option<ClusterIdx> {
        let idx = *self.op_to_cluster.get(&op.borrow().id())?;
        Some(self.root(idx))
    }

    fn cluster_of_value(&mut self, value: &RRC<Value>) -> Option<ClusterIdx> {
        let def = value.borrow().defining_op()?;
        self.cluster_of(&def)
    }

    /// Disjoint-set find with path compression.
    fn root(&mut self, idx: ClusterIdx) -> ClusterIdx {
        let root = self.find_root(idx);
        let mut cur = idx;
        while cur != root {
            let next = self.clusters[cur.index()].merged_into.unwrap();
            self.clusters[cur.index()].merged_into = Some(root);
            cur = next;
        }
        root
    }

    fn find_root(&self, mut idx: ClusterIdx) -> ClusterIdx {
        while let Some(parent) = self.clusters[idx.index()].merged_into {
            idx = parent;
        }
        idx
    }

    /// Attempt to combine two root clusters. Order sensitive: merging
    /// `lhs` into `rhs` is attempted first. Returns the surviving root, or
    /// None if the clusters cannot be combined.
    pub fn try_merge(
        &mut self,
        lhs: Option<ClusterIdx>,
        rhs: Option<ClusterIdx>,
    ) -> Option<ClusterIdx> {
        let (lhs, rhs) = (lhs?, rhs?);
        if lhs == rhs {
            return None;
        }
        if self.clusters[lhs.index()].merged_into.is_some()
            || self.clusters[rhs.index()].merged_into.is_some()
        {
            return None;
        }

        if self.try_merge_into(lhs, rhs) {
            return Some(rhs);
        }
        if self.try_merge_into(rhs, lhs) {
            return Some(lhs);
        }
        None
    }

    /// Merge `from` into `to`, restructuring the block so the combined
    /// cluster is contiguous. A failed merge leaves the block and both
    /// clusters untouched.
    fn try_merge_into(&mut self, from: ClusterIdx, to: ClusterIdx) -> bool {
        let from_first = self.clusters[from.index()].ops.first().unwrap();
        let from_last = self.clusters[from.index()].ops.last().unwrap();
        let to_first = self.clusters[to.index()].ops.first().unwrap();
        let to_last = self.clusters[to.index()].ops.last().unwrap();

        if self.block.is_before(&from_last, &to_first) {
            let mut to_move: OpList = self
                .block
                .range_between(&from_last, &to_first)
                .iter()
                .cloned()
                .collect();
            let mut move_up = OpList::default();
            let mut move_down = OpList::default();

            let from_ops = self.clusters[from.index()].ops.clone();
            let to_ops = self.clusters[to.index()].ops.clone();
            self.compute_move_up_set(&from_ops, &mut to_move, &mut move_up);
            self.compute_move_down_set(&to_ops, &mut to_move, &mut move_down);

            if !to_move.is_empty() {
                return false;
            }

            for op in move_up.iter() {
                self.block.move_before(op, &from_first);
            }
            for op in move_down.iter() {
                self.block.move_after(op, &to_last);
            }

            let to_ops = self.clusters[to.index()].ops.take_vec();
            let mut combined =
                std::mem::take(&mut self.clusters[from.index()].ops);
            combined.extend(to_ops);
            self.clusters[to.index()].ops = combined;
        } else {
            debug_assert!(
                self.block.is_before(&to_last, &from_first),
                "clusters must not interleave"
            );
            let mut to_move: OpList = self
                .block
                .range_between(&to_last, &from_first)
                .iter()
                .cloned()
                .collect();
            let mut move_up = OpList::default();
            let mut move_down = OpList::default();

            let from_ops = self.clusters[from.index()].ops.clone();
            let to_ops = self.clusters[to.index()].ops.clone();
            self.compute_move_down_set(&from_ops, &mut to_move, &mut move_down);
            self.compute_move_up_set(&to_ops, &mut to_move, &mut move_up);

            if !to_move.is_empty() {
                return false;
            }

            for op in move_up.iter() {
                self.block.move_before(op, &to_first);
            }
            for op in move_down.iter() {
                self.block.move_after(op, &from_last);
            }

            let from_ops = self.clusters[from.index()].ops.take_vec();
            self.clusters[to.index()].ops.extend(from_ops);
        }

        self.clusters[from.index()].merged_into = Some(to);
        true
    }

    /// Operations in `src` that can be relocated above `target` move to
    /// `move_up` (in block order); the rest stay in `src`. When an op with
    /// a dependency belongs to a cluster, its whole cluster is rejected,
    /// including members already accepted into `move_up`.
    fn compute_move_up_set(
        &self,
        target: &OpList,
        src: &mut OpList,
        move_up: &mut OpList,
    ) {
        let vec = src.take_vec();
        let remain = src;
        for op in &vec {
            if remain.contains(op) {
                continue;
            }
            if any_def_in(op, target) || any_def_in(op, remain) {
                let Some(&idx) = self.op_to_cluster.get(&op.borrow().id())
                else {
                    remain.insert(op.clone());
                    continue;
                };
                let root = self.find_root(idx);
                let cluster_ops: Vec<_> = self.clusters[root.index()]
                    .ops
                    .iter()
                    .cloned()
                    .collect();
                for cluster_op in cluster_ops {
                    debug_assert!(vec
                        .iter()
                        .any(|o| o.borrow().id() == cluster_op.borrow().id()));
                    remain.insert(cluster_op.clone());
                    if move_up.contains(&cluster_op) {
                        move_up.remove(&cluster_op);
                    }
                }
            } else {
                move_up.insert(op.clone());
            }
        }
    }

    /// Mirror image of [Self::compute_move_up_set]: operations in `src`
    /// that can be relocated below `target` move to `move_down` (in
    /// reverse block order); the rest stay in `src`, restored to block
    /// order.
    fn compute_move_down_set(
        &self,
        target: &OpList,
        src: &mut OpList,
        move_down: &mut OpList,
    ) {
        let vec = src.take_vec();
        let remain = src;
        for op in vec.iter().rev() {
            if remain.contains(op) {
                continue;
            }
            if any_use_in(op, target) || any_use_in(op, remain) {
                let Some(&idx) = self.op_to_cluster.get(&op.borrow().id())
                else {
                    remain.insert(op.clone());
                    continue;
                };
                let root = self.find_root(idx);
                let cluster_ops: Vec<_> = self.clusters[root.index()]
                    .ops
                    .iter()
                    .cloned()
                    .collect();
                for cluster_op in cluster_ops.into_iter().rev() {
                    debug_assert!(vec
                        .iter()
                        .any(|o| o.borrow().id() == cluster_op.borrow().id()));
                    remain.insert(cluster_op.clone());
                    if move_down.contains(&cluster_op) {
                        move_down.remove(&cluster_op);
                    }
                }
            } else {
                move_down.insert(op.clone());
            }
        }
        let rev = remain.take_vec();
        remain.extend(rev.into_iter().rev());
    }

    #[cfg(test)]
    fn assert_forest_consistent(&mut self) {
        let entries: Vec<(OpId, ClusterIdx)> =
            self.op_to_cluster.iter().map(|(k, v)| (*k, *v)).collect();
        for (op_id, idx) in entries {
            let root = self.root(idx);
            assert!(self.clusters[root.index()].merged_into.is_none());
            assert!(self.clusters[root.index()]
                .ops
                .iter()
                .any(|op| op.borrow().id() == op_id));
        }
    }
}

/// True iff `op` (or an op nested in its regions) has an operand defined
/// by a member of `ops`.
fn any_def_in(op: &RRC<Operation>, ops: &OpList) -> bool {
    {
        let op = op.borrow();
        for region in &op.regions {
            for block in &region.blocks {
                for inner in block.ops() {
                    if any_def_in(inner, ops) {
                        return true;
                    }
                }
            }
        }
    }
    op.borrow().operands().iter().any(|operand| {
        operand
            .borrow()
            .defining_op()
            .is_some_and(|def| ops.contains(&def))
    })
}

/// True iff a result of `op` is consumed by a member of `ops`, directly or
/// by an op nested inside a member.
fn any_use_in(op: &RRC<Operation>, ops: &OpList) -> bool {
    let results = op.borrow().results().to_vec();
    for result in results {
        for u in result.borrow().uses() {
            let owner = u.user.upgrade();
            if ops.iter().any(|member| Operation::is_ancestor(member, &owner))
            {
                return true;
            }
            if ops.contains(&owner) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleave_ir::{Attributes, Builder, Function, Signature, Type};

    const ATTR: &str = "device";

    fn opcodes(block: &Block) -> Vec<String> {
        block
            .ops()
            .iter()
            .map(|op| op.borrow().opcode().to_string())
            .collect()
    }

    /// `[a, x, b(a)]` with `x` independent: merging `{a}` into `{b}`
    /// relocates `x` above `a`.
    #[test]
    fn merge_across_independent_gap() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        let _x = builder.add_op("x", vec![], vec![Type::I64], Attributes::default());
        let b = builder.add_op(
            "b",
            vec![a.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![b.borrow().result(0)]);

        let mut clusterer = DeviceClusterer::new(&mut func, ATTR.into());
        let ca = clusterer.cluster_of(&a);
        let cb = clusterer.cluster_of(&b);
        let merged = clusterer.try_merge(ca, cb).expect("merge must succeed");
        let merged_ops: Vec<_> = clusterer
            .ops_of(merged)
            .iter()
            .map(|op| op.borrow().opcode().to_string())
            .collect();
        assert_eq!(merged_ops, ["a", "b"]);
        clusterer.assert_forest_consistent();
        drop(clusterer);
        assert_eq!(opcodes(&func.body), ["x", "a", "b", "return"]);
    }

    /// A whole cluster caught in the gap moves as a unit when it has no
    /// conflicting dependencies.
    #[test]
    fn gap_cluster_moves_atomically() {
        let mut func = Function::new(
            "f",
            Signature::new(vec![], vec![Type::I64, Type::I64]),
        );
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        let x = builder.add_op("x", vec![], vec![Type::I64], Attributes::default());
        let y = builder.add_op(
            "y",
            vec![x.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        let b = builder.add_op(
            "b",
            vec![a.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![y.borrow().result(0), b.borrow().result(0)]);

        let mut clusterer = DeviceClusterer::new(&mut func, ATTR.into());
        // Fuse the gap ops first; they are adjacent, so this is trivial.
        let cx = clusterer.cluster_of(&x);
        let cy = clusterer.cluster_of(&y);
        clusterer.try_merge(cx, cy).expect("adjacent merge");

        let ca = clusterer.cluster_of(&a);
        let cb = clusterer.cluster_of(&b);
        let merged = clusterer.try_merge(ca, cb).expect("merge must succeed");
        assert_eq!(clusterer.ops_of(merged).len(), 2);
        clusterer.assert_forest_consistent();
        drop(clusterer);
        assert_eq!(opcodes(&func.body), ["x", "y", "a", "b", "return"]);
    }

    /// Rejecting one member of a gap cluster evicts the members already
    /// accepted into the move set; with both directions blocked the merge
    /// fails and nothing changes.
    #[test]
    fn rejection_cascades_to_cluster_mates() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        let x = builder.add_op("x", vec![], vec![Type::I64], Attributes::default());
        // `y` depends on `a` (cannot move up) and feeds `b` (cannot move
        // down), so the `{x, y}` cluster pins the gap.
        let y = builder.add_op(
            "y",
            vec![a.borrow().result(0), x.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        let b = builder.add_op(
            "b",
            vec![y.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![b.borrow().result(0)]);

        let mut clusterer = DeviceClusterer::new(&mut func, ATTR.into());
        let cx = clusterer.cluster_of(&x);
        let cy = clusterer.cluster_of(&y);
        clusterer.try_merge(cx, cy).expect("adjacent merge");

        let ca = clusterer.cluster_of(&a);
        let cb = clusterer.cluster_of(&b);
        assert!(clusterer.try_merge(ca, cb).is_none());
        // Failed merges are strict no-ops.
        let ca = clusterer.cluster_of(&a).unwrap();
        let cb = clusterer.cluster_of(&b).unwrap();
        assert_eq!(clusterer.ops_of(ca).len(), 1);
        assert_eq!(clusterer.ops_of(cb).len(), 1);
        clusterer.assert_forest_consistent();
        drop(clusterer);
        assert_eq!(opcodes(&func.body), ["a", "x", "y", "b", "return"]);
    }

    /// Top-down merging over a chain produces a single cluster covering
    /// the whole block.
    #[test]
    fn top_down_chains_into_one_cluster() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        let b = builder.add_op(
            "b",
            vec![a.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        let c = builder.add_op(
            "c",
            vec![b.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![c.borrow().result(0)]);

        let mut clusterer = DeviceClusterer::new(&mut func, ATTR.into());
        clusterer.merge_top_down();
        clusterer.assert_forest_consistent();
        let candidates = clusterer.into_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].len(), 3);
    }

    /// Bottom-up merging is the mirror image and covers the same chain.
    #[test]
    fn bottom_up_chains_into_one_cluster() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        let b = builder.add_op(
            "b",
            vec![a.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![b.borrow().result(0)]);

        let mut clusterer = DeviceClusterer::new(&mut func, ATTR.into());
        clusterer.merge_bottom_up();
        clusterer.assert_forest_consistent();
        let candidates = clusterer.into_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].len(), 2);
    }
}
