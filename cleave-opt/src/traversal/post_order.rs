use cleave_ir::{self as ir, utils, Block};
use cleave_utils::CleaveResult;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// The order in which the functions are traversed.
#[derive(Default, PartialEq, Eq)]
pub enum Order {
    /// Use an arbitrary order.
    #[default]
    No,
    /// Traverse functions in pre-order over the call graph.
    Pre,
    /// Traverse functions in post-order over the call graph.
    Post,
}

/// Define traversal order of functions: pre-order, post-order, or none.
///
/// ## Post-order
/// If function `B` contains a call to function `A` then `A` is guaranteed
/// to be visited before `B`. This is done by finding a topological order
/// over a graph where `A` has a directed edge to `B`.
///
/// Instead of constructing a new vector of functions in a topological
/// order, the implementation builds an `order` vector which contains
/// indices into the original function vector, so the functions can be
/// returned in the input order once the traversal is done.
///
/// ## Pre-order
/// Reverse of post-order.
pub struct FuncTraversal {
    /// A topological ordering of the functions.
    order: Vec<NodeIndex>,
    /// Vector of functions in the original ordering.
    funcs: Vec<ir::Function>,
}

impl FuncTraversal {
    /// Returns a new traversal over the given functions.
    ///
    /// # Panics
    /// Panics if the call graph is cyclic and an order was requested.
    pub fn new(funcs: Vec<ir::Function>, order: Order) -> Self {
        // If the order is not specified, return the functions in the
        // original order.
        if order == Order::No {
            return Self {
                order: (0..funcs.len()).map(NodeIndex::new).collect(),
                funcs,
            };
        }
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        // Reverse mapping from name to node.
        let rev_map: HashMap<ir::Id, NodeIndex> = funcs
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.name, graph.add_node(idx)))
            .collect::<HashMap<_, _>>();

        // Construct the call graph.
        for func in &funcs {
            Self::for_each_callee(&func.body, &mut |callee| {
                if let Some(callee_idx) = rev_map.get(&callee) {
                    graph.add_edge(*callee_idx, rev_map[&func.name], ());
                }
            });
        }

        // Build a topologically sorted ordering of the graph.
        let mut topo = algo::toposort(&graph, None)
            .expect("there is a cycle in the call graph");

        // Reverse the order if a pre-order traversal is requested.
        if order == Order::Pre {
            topo.reverse();
        }
        Self { order: topo, funcs }
    }

    fn for_each_callee(block: &Block, f: &mut impl FnMut(ir::Id)) {
        for op in block.ops() {
            if let Some(callee) = utils::callee(op) {
                f(callee);
            }
            for region in &op.borrow().regions {
                for inner in &region.blocks {
                    Self::for_each_callee(inner, f);
                }
            }
        }
    }

    /// Traverses functions in the chosen order and applies `upd`.
    pub fn apply_update<F>(&mut self, mut upd: F) -> CleaveResult<()>
    where
        F: FnMut(&mut ir::Function, &Vec<ir::Function>) -> CleaveResult<()>,
    {
        for idx in self.order.iter() {
            let mut func = self.funcs.remove(idx.index());
            upd(&mut func, &self.funcs)?;
            self.funcs.insert(idx.index(), func)
        }

        Ok(())
    }

    /// Returns the underlying function vector in original order.
    pub fn take(self) -> Vec<ir::Function> {
        self.funcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleave_ir::{Builder, Function, Signature, Type};

    /// `main` calls `helper`; a post-order traversal visits `helper`
    /// first and hands back the functions in their original order.
    #[test]
    fn post_order_visits_callees_first() {
        let mut main =
            Function::new("main", Signature::new(vec![], vec![Type::I64]));
        {
            let mut builder = Builder::new(&mut main);
            let call =
                builder.add_call("helper", vec![], vec![Type::I64]);
            builder.add_return(vec![call.borrow().result(0)]);
        }
        let mut helper =
            Function::new("helper", Signature::new(vec![], vec![Type::I64]));
        {
            let mut builder = Builder::new(&mut helper);
            let c = builder.add_op(
                "iota",
                vec![],
                vec![Type::I64],
                cleave_ir::Attributes::default(),
            );
            builder.add_return(vec![c.borrow().result(0)]);
        }

        let mut traversal =
            FuncTraversal::new(vec![main, helper], Order::Post);
        let mut visited = Vec::new();
        traversal
            .apply_update(|func, _| {
                visited.push(func.name.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, ["helper", "main"]);
        let funcs = traversal.take();
        assert_eq!(funcs[0].name, "main");
        assert_eq!(funcs[1].name, "helper");
    }
}
