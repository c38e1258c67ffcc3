use crate::analysis::{
    host_closure, inputs_of_cluster, outputs_of_cluster, DeviceClusterer,
    ReturnStats, DEVICE_ATTR_HOST,
};
use crate::traversal::{
    Action, ConstructVisitor, Named, ParseVal, PassOpt, VisResult, Visitor,
};
use cleave_ir::{self as ir, utils, AttrValue, Function, Operation, RRC, Value};
use cleave_utils::{CleaveResult, Error, Id, NameGenerator};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::str::FromStr;

/// The anchor attribute stamped onto extracted host functions.
pub fn host_anchor_name() -> Id {
    "host_partition".into()
}

/// The clustering strategy to run on each function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterAlgo {
    /// No dependency analysis: split the block into a host part and a
    /// device part in place.
    Fallback,
    /// Grow clusters forward along producer-to-consumer edges.
    TopDown,
    /// Grow clusters backward along consumer-to-producer edges.
    BottomUp,
    /// Run both directed strategies on clones of the function and keep
    /// whichever covers more operations; ties prefer bottom-up.
    #[default]
    Greedy,
}

impl FromStr for ClusterAlgo {
    type Err = Error;

    fn from_str(s: &str) -> CleaveResult<Self> {
        match s {
            "fallback" => Ok(Self::Fallback),
            "top-down" => Ok(Self::TopDown),
            "bottom-up" => Ok(Self::BottomUp),
            "greedy" => Ok(Self::Greedy),
            _ => Err(Error::misc(format!("unknown clustering algorithm: {s}"))),
        }
    }
}

impl std::fmt::Display for ClusterAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fallback => "fallback",
            Self::TopDown => "top-down",
            Self::BottomUp => "bottom-up",
            Self::Greedy => "greedy",
        };
        write!(f, "{name}")
    }
}

/// Caller-supplied predicate that can reject a candidate cluster before it
/// is extracted.
pub type ValidateSubgraphFn = Rc<dyn Fn(&[RRC<Operation>]) -> bool>;

/// Options accepted by [cluster_by_device] and the `device-clustering`
/// pass.
#[derive(Clone)]
pub struct ClusterOptions {
    /// Attribute key carrying the device tag on operations.
    pub attr_name: Id,
    /// Device tag stamped onto extracted device functions.
    pub device: Id,
    /// Attribute key marking extracted device functions.
    pub device_anchor_name: Id,
    /// Replicate all constant-like defining ops; otherwise only splat
    /// constants.
    pub dup_non_splat: bool,
    /// Surface a value once per terminator occurrence instead of once.
    pub dup_outputs: bool,
    /// The clustering strategy.
    pub cluster_algo: ClusterAlgo,
    /// Emit all surviving clusters rather than only the largest.
    pub enable_multi_graph: bool,
    /// Optional predicate rejecting candidate clusters. Not reachable from
    /// the command line.
    pub validate_subgraph: Option<ValidateSubgraphFn>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        ClusterOptions {
            attr_name: "device".into(),
            device: "gpu".into(),
            device_anchor_name: "device_partition".into(),
            dup_non_splat: false,
            dup_outputs: false,
            cluster_algo: ClusterAlgo::default(),
            enable_multi_graph: false,
            validate_subgraph: None,
        }
    }
}

/// Everything needed to extract one cluster into a function: the cluster's
/// operations, its SSA boundary, and the naming/placement of the function
/// it becomes.
struct FunctionMetadata {
    /// Anchor attribute key stamped onto the extracted function.
    anchor_name: Id,
    /// The device the extracted function will run on.
    device_attr: Id,
    /// The source function's name.
    original_name: Id,
    /// The extracted function's name; assigned at materialization, after
    /// collision renaming.
    partition_name: Id,
    /// The input values of the function.
    inputs: Vec<RRC<Value>>,
    /// The result values of the function.
    results: Vec<RRC<Value>>,
    /// The operations to be included in the body of the function.
    ops: Vec<RRC<Operation>>,
}

/// Partitions each function's dataflow graph along device-placement
/// boundaries and outlines every partition into its own function, invoked
/// from the original location.
pub struct DeviceClustering {
    opts: ClusterOptions,
    /// Module-level namespace, used to rename partition functions on
    /// collision.
    namegen: NameGenerator,
    /// Partition functions produced while visiting, keyed by the source
    /// function. Spliced into the module once traversal finishes.
    partitions: Vec<(Id, Vec<Function>)>,
}

impl Named for DeviceClustering {
    fn name() -> &'static str {
        "device-clustering"
    }

    fn description() -> &'static str {
        "partition functions along device-placement boundaries into callable subgraphs"
    }

    fn opts() -> Vec<PassOpt> {
        vec![
            PassOpt::new(
                "attr-name",
                "Attribute key carrying the device tag",
                ParseVal::Str("device".to_string()),
                PassOpt::parse_string,
            ),
            PassOpt::new(
                "device",
                "Device tag stamped on extracted device functions",
                ParseVal::Str("gpu".to_string()),
                PassOpt::parse_string,
            ),
            PassOpt::new(
                "device-anchor",
                "Attribute key marking extracted device functions",
                ParseVal::Str("device_partition".to_string()),
                PassOpt::parse_string,
            ),
            PassOpt::new(
                "dup-non-splat",
                "Replicate all constant-like ops, not just splat constants",
                ParseVal::Bool(false),
                PassOpt::parse_bool,
            ),
            PassOpt::new(
                "dup-outputs",
                "Duplicate returned values per terminator multiplicity",
                ParseVal::Bool(false),
                PassOpt::parse_bool,
            ),
            PassOpt::new(
                "algorithm",
                "Clustering strategy: fallback, top-down, bottom-up, greedy",
                ParseVal::Str("greedy".to_string()),
                PassOpt::parse_string,
            ),
            PassOpt::new(
                "multi-graph",
                "Emit all surviving clusters rather than only the largest",
                ParseVal::Bool(false),
                PassOpt::parse_bool,
            ),
        ]
    }
}

impl ConstructVisitor for DeviceClustering {
    fn from(ctx: &ir::Context) -> CleaveResult<Self> {
        let parsed = Self::get_opts(ctx);
        let algo = parsed[&"algorithm"].string();
        let cluster_algo = ClusterAlgo::from_str(&algo).unwrap_or_else(|_| {
            log::warn!(
                "Ignoring unknown clustering algorithm `{algo}'; using greedy"
            );
            ClusterAlgo::Greedy
        });
        let opts = ClusterOptions {
            attr_name: parsed[&"attr-name"].string().into(),
            device: parsed[&"device"].string().into(),
            device_anchor_name: parsed[&"device-anchor"].string().into(),
            dup_non_splat: parsed[&"dup-non-splat"].bool(),
            dup_outputs: parsed[&"dup-outputs"].bool(),
            cluster_algo,
            enable_multi_graph: parsed[&"multi-graph"].bool(),
            validate_subgraph: None,
        };
        Ok(Self::with_options(ctx, opts))
    }

    fn clear_data(&mut self) {
        self.partitions = Vec::new();
    }
}

/// Run the device-clustering transformation over `ctx` with programmatic
/// options, including a `validate_subgraph` predicate if one is needed.
pub fn cluster_by_device(
    ctx: &mut ir::Context,
    options: ClusterOptions,
) -> crate::pass_manager::PassResult<()> {
    let mut pass = DeviceClustering::with_options(ctx, options);
    pass.do_pass(ctx)?;
    Ok(())
}

impl DeviceClustering {
    /// Construct the pass with explicit options, seeding the collision
    /// namespace from the module.
    pub fn with_options(ctx: &ir::Context, opts: ClusterOptions) -> Self {
        DeviceClustering {
            opts,
            namegen: NameGenerator::with_prev_defined_names(
                ctx.defined_names(),
            ),
            partitions: Vec::new(),
        }
    }

    /// Multiplicities of the terminator's operands.
    fn return_stats(func: &Function) -> ReturnStats {
        let mut stats = ReturnStats::new();
        let ret_op = func.terminator();
        for operand in ret_op.borrow().operands() {
            *stats.entry(operand.borrow().id()).or_insert(0) += 1;
        }
        stats
    }

    /// Give every cluster-absorbable constant a private copy per user, so
    /// clusters never share constant producers. Constants feeding the
    /// terminator directly are left alone.
    fn replicate_constants(&self, func: &mut Function) {
        let ret_values: HashSet<_> = func
            .terminator()
            .borrow()
            .operands()
            .iter()
            .map(|v| v.borrow().id())
            .collect();
        let dup_non_splat = self.opts.dup_non_splat;
        let pred = move |op: &RRC<Operation>| {
            let feeds_return = op
                .borrow()
                .results()
                .iter()
                .any(|r| ret_values.contains(&r.borrow().id()));
            if feeds_return {
                return false;
            }
            if dup_non_splat {
                utils::is_constant_like(op)
            } else {
                utils::is_splat_constant_like(op)
            }
        };
        ir::replicate_defining_op(&mut func.body, pred);
    }

    /// Build metadata for `func` according to the configured strategy.
    /// None means the function could not be partitioned.
    fn metadata_for_function(
        &mut self,
        func: &mut Function,
    ) -> Option<Vec<FunctionMetadata>> {
        match self.opts.cluster_algo {
            ClusterAlgo::Fallback => self.fallback_metadata(func),
            ClusterAlgo::TopDown => {
                self.directed_metadata(func, ClusterAlgo::TopDown)
            }
            ClusterAlgo::BottomUp => {
                self.directed_metadata(func, ClusterAlgo::BottomUp)
            }
            ClusterAlgo::Greedy => self.greedy_metadata(func),
        }
    }

    /// Dependency-oblivious split: one host entry holding the host
    /// closure, one device entry holding everything else. Operations keep
    /// their block order.
    fn fallback_metadata(
        &mut self,
        func: &Function,
    ) -> Option<Vec<FunctionMetadata>> {
        let host = host_closure(func, self.opts.attr_name);
        let ret_stats = Self::return_stats(func);
        let dup = self.opts.dup_outputs;
        let mut metadatas = Vec::new();

        let host_ops: Vec<_> = func
            .body
            .without_terminator()
            .iter()
            .filter(|op| host.contains(&op.borrow().id()))
            .cloned()
            .collect();
        if !host_ops.is_empty() {
            metadatas.push(FunctionMetadata {
                anchor_name: host_anchor_name(),
                device_attr: DEVICE_ATTR_HOST.into(),
                original_name: func.name,
                partition_name: Id::default(),
                inputs: inputs_of_cluster(&host_ops),
                results: outputs_of_cluster(
                    &host_ops,
                    dup.then_some(&ret_stats),
                ),
                ops: host_ops,
            });
        }

        let device_ops: Vec<_> = func
            .body
            .without_terminator()
            .iter()
            .filter(|op| !host.contains(&op.borrow().id()))
            .cloned()
            .collect();
        if !device_ops.is_empty() {
            if let Some(validate) = &self.opts.validate_subgraph {
                if !validate(&device_ops) {
                    return None;
                }
            }
            metadatas.push(FunctionMetadata {
                anchor_name: self.opts.device_anchor_name,
                device_attr: self.opts.device,
                original_name: func.name,
                partition_name: Id::default(),
                inputs: inputs_of_cluster(&device_ops),
                results: outputs_of_cluster(
                    &device_ops,
                    dup.then_some(&ret_stats),
                ),
                ops: device_ops,
            });
        }

        Some(metadatas)
    }

    /// Run one directed merge strategy and turn the surviving candidates
    /// into metadata.
    fn directed_metadata(
        &mut self,
        func: &mut Function,
        direction: ClusterAlgo,
    ) -> Option<Vec<FunctionMetadata>> {
        let ret_stats = Self::return_stats(func);
        let mut clusterer =
            DeviceClusterer::new(func, self.opts.attr_name);
        match direction {
            ClusterAlgo::TopDown => clusterer.merge_top_down(),
            ClusterAlgo::BottomUp => clusterer.merge_bottom_up(),
            _ => unreachable!("directed strategies only"),
        }
        clusterer.populate_candidates();
        let candidates = clusterer.into_candidates();
        self.metadata_from_candidates(func, candidates, ret_stats)
    }

    /// Run both directed strategies on clones, keep the one covering more
    /// operations, and re-run it on the original. Ties prefer bottom-up;
    /// if only one strategy succeeds, it wins.
    fn greedy_metadata(
        &mut self,
        func: &mut Function,
    ) -> Option<Vec<FunctionMetadata>> {
        let mut top_down_func = ir::clone_function(func, func.name);
        let mut bottom_up_func = ir::clone_function(func, func.name);
        let top_down =
            self.directed_metadata(&mut top_down_func, ClusterAlgo::TopDown);
        let bottom_up = self
            .directed_metadata(&mut bottom_up_func, ClusterAlgo::BottomUp);

        match (top_down, bottom_up) {
            (Some(top_down), Some(bottom_up)) => {
                let covered =
                    |ms: &[FunctionMetadata]| -> usize {
                        ms.iter().map(|m| m.ops.len()).sum()
                    };
                if covered(&top_down) > covered(&bottom_up) {
                    self.directed_metadata(func, ClusterAlgo::TopDown)
                } else {
                    self.directed_metadata(func, ClusterAlgo::BottomUp)
                }
            }
            (Some(_), None) => {
                self.directed_metadata(func, ClusterAlgo::TopDown)
            }
            (None, Some(_)) => {
                self.directed_metadata(func, ClusterAlgo::BottomUp)
            }
            (None, None) => None,
        }
    }

    /// Package candidate clusters as metadata, largest first. Clusters the
    /// validation predicate rejects are skipped; without multi-graph only
    /// the first surviving cluster is emitted. None when nothing survives.
    fn metadata_from_candidates(
        &mut self,
        func: &Function,
        candidates: Vec<Vec<RRC<Operation>>>,
        ret_stats: ReturnStats,
    ) -> Option<Vec<FunctionMetadata>> {
        if candidates.is_empty() {
            return None;
        }
        let dup = self.opts.dup_outputs;
        let mut metadatas = Vec::new();
        for ops in candidates {
            if ops.is_empty() {
                continue;
            }
            if let Some(validate) = &self.opts.validate_subgraph {
                if !validate(&ops) {
                    continue;
                }
            }
            metadatas.push(FunctionMetadata {
                anchor_name: self.opts.device_anchor_name,
                device_attr: self.opts.device,
                original_name: func.name,
                partition_name: Id::default(),
                inputs: inputs_of_cluster(&ops),
                results: outputs_of_cluster(&ops, dup.then_some(&ret_stats)),
                ops,
            });
            if !self.opts.enable_multi_graph {
                break;
            }
        }
        if metadatas.is_empty() {
            return None;
        }
        Some(metadatas)
    }

    /// Materialize one public function per metadata entry: parameters from
    /// the cluster inputs, cloned operations, a return of the mapped
    /// results, plus the device and anchor attributes. The final (possibly
    /// renamed) symbol is recorded back into the metadata.
    fn create_functions(
        &mut self,
        metadatas: &mut [FunctionMetadata],
    ) -> Vec<Function> {
        let mut partitions = Vec::new();
        for metadata in metadatas.iter_mut() {
            let param_types = metadata
                .inputs
                .iter()
                .map(|v| v.borrow().ty().clone())
                .collect();
            let result_types = metadata
                .results
                .iter()
                .map(|v| v.borrow().ty().clone())
                .collect();
            let name = self.namegen.gen_name(format!(
                "{}_{}",
                metadata.original_name, metadata.device_attr
            ));
            let mut partition = Function::new(
                name,
                ir::Signature::new(param_types, result_types),
            );
            partition.public = true;
            partition
                .attributes
                .insert(self.opts.attr_name, AttrValue::Str(metadata.device_attr));
            partition
                .attributes
                .insert(metadata.anchor_name, AttrValue::Unit);

            let mut rewriter = ir::Rewriter::default();
            let mut builder = ir::Builder::new(&mut partition);
            for (i, input) in metadata.inputs.iter().enumerate() {
                rewriter.map(input, builder.param(i));
            }
            for op in &metadata.ops {
                builder.clone_op(op, &mut rewriter);
            }
            let mapped_results = metadata
                .results
                .iter()
                .map(|r| rewriter.lookup_or_default(r))
                .collect();
            builder.add_return(mapped_results);

            metadata.partition_name = partition.name;
            log::debug!(
                "extracted `{}' ({} ops) from `{}'",
                partition.name,
                metadata.ops.len(),
                metadata.original_name
            );
            partitions.push(partition);
        }
        partitions
    }

    /// Wire a call to each partition function into the source function, in
    /// metadata order. The cross-metadata mapping rewrites call operands
    /// that earlier calls already replaced; building the call, cloning it
    /// through the mapping, and erasing the prototype applies the mapping
    /// before the call's operands go live.
    fn create_calls(
        &self,
        metadatas: &[FunctionMetadata],
        func: &mut Function,
    ) {
        let dup_outputs = self.opts.dup_outputs;
        let ret_op = func.terminator();
        let mut mapping = ir::Rewriter::default();
        for metadata in metadatas {
            let anchor = metadata.ops.last().unwrap().clone();
            let result_types: Vec<_> = metadata
                .results
                .iter()
                .map(|v| v.borrow().ty().clone())
                .collect();
            let mapped_inputs: Vec<_> = metadata
                .inputs
                .iter()
                .map(|v| mapping.lookup_or_default(v))
                .collect();

            let mut builder = ir::Builder::new(func);
            let call = builder.add_call_before(
                &anchor,
                metadata.partition_name,
                mapped_inputs,
                result_types,
            );
            let cloned_call =
                builder.clone_op_before(&anchor, &call, &mut mapping);
            func.body.erase(&call);

            // Remaining terminator slots per value, lowest index last so
            // replacements consume the earliest occurrence first.
            let mut ret_slots: HashMap<ir::ValueId, Vec<usize>> =
                HashMap::new();
            let num_ret_operands = ret_op.borrow().num_operands();
            for i in (0..num_ret_operands).rev() {
                let value = ret_op.borrow().operand(i);
                let id = value.borrow().id();
                ret_slots.entry(id).or_default().push(i);
            }

            for (i, original) in metadata.results.iter().enumerate() {
                let new_value = cloned_call.borrow().result(i);
                if dup_outputs {
                    ir::replace_all_uses_except(original, &new_value, &ret_op);
                    let original_id = original.borrow().id();
                    if let Some(slots) = ret_slots.get_mut(&original_id) {
                        if let Some(slot) = slots.pop() {
                            Operation::set_operand(
                                &ret_op,
                                slot,
                                new_value.clone(),
                            );
                        }
                    }
                } else {
                    ir::replace_all_uses_with(original, &new_value);
                }
                mapping.map(original, new_value);
            }
        }
    }
}

impl Visitor for DeviceClustering {
    fn start(&mut self, func: &mut Function, _funcs: &[Function]) -> VisResult {
        self.replicate_constants(func);

        let Some(mut metadatas) = self.metadata_for_function(func) else {
            return Err(Error::pass_assumption(
                Self::name(),
                format!("unable to partition function `{}'", func.name),
            ));
        };

        let partitions = self.create_functions(&mut metadatas);
        self.create_calls(&metadatas, func);

        // Erase the original operations that were cloned into the
        // partitions, users before definitions.
        for metadata in &metadatas {
            for op in metadata.ops.iter().rev() {
                func.body.erase(op);
            }
        }

        self.partitions.push((func.name, partitions));
        Ok(Action::Continue)
    }

    fn finish_context(&mut self, ctx: &mut ir::Context) -> CleaveResult<()> {
        for (original, partitions) in self.partitions.drain(..) {
            let at = ctx.position(original).ok_or_else(|| {
                Error::malformed_structure(format!(
                    "source function `{original}' vanished before insertion"
                ))
            })?;
            for (offset, partition) in partitions.into_iter().enumerate() {
                ctx.insert(at + 1 + offset, partition);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleave_ir::{Attributes, Builder, Context, Signature, Type};

    const ATTR: &str = "device";

    fn host_attrs() -> Attributes {
        std::iter::once((ATTR, AttrValue::Str(DEVICE_ATTR_HOST.into())))
            .collect()
    }

    fn options(algo: ClusterAlgo) -> ClusterOptions {
        ClusterOptions {
            cluster_algo: algo,
            ..Default::default()
        }
    }

    fn opcodes(func: &Function) -> Vec<String> {
        func.body
            .ops()
            .iter()
            .map(|op| op.borrow().opcode().to_string())
            .collect()
    }

    fn find<'a>(ctx: &'a Context, name: &str) -> &'a Function {
        ctx.find_function(name)
            .unwrap_or_else(|| panic!("no function named `{name}'"))
    }

    /// `[a, b(a), c(b)]`, no host ops: the whole chain lands in a single
    /// device function, and the original body becomes a call feeding the
    /// terminator.
    #[test]
    fn single_device_chain() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::F32]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("iota", vec![], vec![Type::F32], Attributes::default());
        let b = builder.add_op(
            "exp",
            vec![a.borrow().result(0)],
            vec![Type::F32],
            Attributes::default(),
        );
        let c = builder.add_op(
            "neg",
            vec![b.borrow().result(0)],
            vec![Type::F32],
            Attributes::default(),
        );
        builder.add_return(vec![c.borrow().result(0)]);
        let mut ctx = Context::new(vec![func]);

        cluster_by_device(&mut ctx, options(ClusterAlgo::TopDown)).unwrap();

        assert_eq!(ctx.functions.len(), 2);
        let partition = find(&ctx, "f_gpu");
        assert_eq!(opcodes(partition), ["iota", "exp", "neg", "return"]);
        assert!(partition.public);
        assert_eq!(partition.attributes.get_str(ATTR), Some("gpu".into()));
        assert!(partition.attributes.has("device_partition"));

        let original = find(&ctx, "f");
        assert_eq!(opcodes(original), ["call", "return"]);
        let call = original.body.ops()[0].clone();
        assert_eq!(utils::callee(&call), Some("f_gpu".into()));
        let returned = original.terminator().borrow().operand(0);
        assert_eq!(
            returned.borrow().id(),
            call.borrow().result(0).borrow().id()
        );
    }

    /// `[a, b(a){host}, c(b)]` under the fallback split: `a` is pulled
    /// into the host closure, `c` stays on the device, and the host
    /// function returns `b`'s value for the device function to consume.
    #[test]
    fn fallback_splits_host_and_device() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::F32]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("iota", vec![], vec![Type::F32], Attributes::default());
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
        let mut ctx = Context::new(vec![func]);

        cluster_by_device(&mut ctx, options(ClusterAlgo::Fallback)).unwrap();

        assert_eq!(ctx.functions.len(), 3);
        assert_eq!(
            ctx.functions.iter().map(|f| f.name.to_string()).collect::<Vec<_>>(),
            ["f", "f_host", "f_gpu"]
        );

        let host_fn = find(&ctx, "f_host");
        assert_eq!(opcodes(host_fn), ["iota", "round", "return"]);
        assert_eq!(
            host_fn.attributes.get_str(ATTR),
            Some(DEVICE_ATTR_HOST.into())
        );
        assert!(host_fn.attributes.has(host_anchor_name()));
        assert!(host_fn.signature.params.is_empty());
        assert_eq!(host_fn.signature.results.len(), 1);

        let device_fn = find(&ctx, "f_gpu");
        assert_eq!(opcodes(device_fn), ["neg", "return"]);
        assert_eq!(device_fn.signature.params.len(), 1);

        // The original chains the two calls: the device call consumes the
        // host call's result.
        let original = find(&ctx, "f");
        assert_eq!(opcodes(original), ["call", "call", "return"]);
        let host_call = original.body.ops()[0].clone();
        let device_call = original.body.ops()[1].clone();
        assert_eq!(utils::callee(&host_call), Some("f_host".into()));
        assert_eq!(utils::callee(&device_call), Some("f_gpu".into()));
        assert_eq!(
            device_call.borrow().operand(0).borrow().id(),
            host_call.borrow().result(0).borrow().id()
        );
        assert_eq!(
            original.terminator().borrow().operand(0).borrow().id(),
            device_call.borrow().result(0).borrow().id()
        );
    }

    /// `[a, x{host}, b(a)]` with `x` independent: the merge relocates `x`
    /// and the partition covers `[a, b]` while `x` stays behind.
    #[test]
    fn merge_relocates_unclustered_gap_op() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        let x = builder.add_op("x", vec![], vec![], host_attrs());
        let b = builder.add_op(
            "b",
            vec![a.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![b.borrow().result(0)]);
        let _ = x;
        let mut ctx = Context::new(vec![func]);

        cluster_by_device(&mut ctx, options(ClusterAlgo::TopDown)).unwrap();

        let partition = find(&ctx, "f_gpu");
        assert_eq!(opcodes(partition), ["a", "b", "return"]);
        let original = find(&ctx, "f");
        assert_eq!(opcodes(original), ["x", "call", "return"]);
    }

    /// `[a, x(a){host}, b(a)]` where `x`'s value is only returned: `x`
    /// can sink below `b`, so the merge succeeds and `a`'s value is also
    /// surfaced for `x` to consume.
    #[test]
    fn blocked_up_but_free_down_succeeds() {
        let mut func = Function::new(
            "f",
            Signature::new(vec![], vec![Type::I64, Type::I64]),
        );
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        let x = builder.add_op(
            "x",
            vec![a.borrow().result(0)],
            vec![Type::I64],
            host_attrs(),
        );
        let b = builder.add_op(
            "b",
            vec![a.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![
            x.borrow().result(0),
            b.borrow().result(0),
        ]);
        let mut ctx = Context::new(vec![func]);

        cluster_by_device(&mut ctx, options(ClusterAlgo::TopDown)).unwrap();

        let partition = find(&ctx, "f_gpu");
        assert_eq!(opcodes(partition), ["a", "b", "return"]);
        // `a` is consumed by the host op outside the cluster, so the
        // partition surfaces it alongside `b`.
        assert_eq!(partition.signature.results.len(), 2);
        let original = find(&ctx, "f");
        assert_eq!(opcodes(original), ["call", "x", "return"]);
        let call = original.body.ops()[0].clone();
        let x_after = original.body.ops()[1].clone();
        assert_eq!(
            x_after.borrow().operand(0).borrow().id(),
            call.borrow().result(0).borrow().id()
        );
    }

    /// `[a, x(a){host}, b(x)]`: `x` can move neither up (depends on `a`)
    /// nor down (feeds `b`), so the two device ops stay in separate
    /// clusters and only the first is extracted.
    #[test]
    fn pinned_gap_blocks_the_merge() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        let x = builder.add_op(
            "x",
            vec![a.borrow().result(0)],
            vec![Type::I64],
            host_attrs(),
        );
        let b = builder.add_op(
            "b",
            vec![x.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![b.borrow().result(0)]);
        let mut ctx = Context::new(vec![func]);

        cluster_by_device(&mut ctx, options(ClusterAlgo::TopDown)).unwrap();

        let partition = find(&ctx, "f_gpu");
        assert_eq!(opcodes(partition), ["a", "return"]);
        let original = find(&ctx, "f");
        assert_eq!(opcodes(original), ["call", "x", "b", "return"]);
    }

    /// Builds the asymmetric graph `[u, h(u){host}, v(u), w(h), z(v, w)]`
    /// where top-down covers at most 2 ops per cluster but bottom-up
    /// forms a 3-op cluster.
    fn asymmetric_ctx() -> Context {
        let mut func = Function::new(
            "f",
            Signature::new(vec![], vec![Type::I64]),
        );
        let mut builder = Builder::new(&mut func);
        let u = builder.add_op("u", vec![], vec![Type::I64], Attributes::default());
        let h = builder.add_op(
            "h",
            vec![u.borrow().result(0)],
            vec![Type::I64],
            host_attrs(),
        );
        let v = builder.add_op(
            "v",
            vec![u.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        let w = builder.add_op(
            "w",
            vec![h.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        let z = builder.add_op(
            "z",
            vec![v.borrow().result(0), w.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![z.borrow().result(0)]);
        Context::new(vec![func])
    }

    /// The greedy strategy measures both directed strategies and keeps
    /// the one covering more operations; here bottom-up's 3-op cluster
    /// beats top-down's 2-op clusters.
    #[test]
    fn greedy_prefers_larger_coverage() {
        let mut ctx = asymmetric_ctx();
        cluster_by_device(&mut ctx, options(ClusterAlgo::Greedy)).unwrap();

        let partition = find(&ctx, "f_gpu");
        assert_eq!(opcodes(partition), ["v", "w", "z", "return"]);
        let original = find(&ctx, "f");
        assert_eq!(opcodes(original), ["u", "h", "call", "return"]);
    }

    /// If validation starves one directed strategy, greedy proceeds with
    /// the other instead of failing.
    #[test]
    fn greedy_survives_one_sided_validation() {
        let mut ctx = asymmetric_ctx();
        let mut opts = options(ClusterAlgo::Greedy);
        opts.validate_subgraph = Some(Rc::new(|ops| ops.len() >= 3));
        cluster_by_device(&mut ctx, opts).unwrap();

        let partition = find(&ctx, "f_gpu");
        assert_eq!(opcodes(partition), ["v", "w", "z", "return"]);
    }

    /// Multi-graph emission surfaces every surviving cluster, renaming
    /// the second partition to avoid the symbol collision.
    #[test]
    fn multi_graph_emits_all_clusters() {
        let mut ctx = asymmetric_ctx();
        let mut opts = options(ClusterAlgo::TopDown);
        opts.enable_multi_graph = true;
        cluster_by_device(&mut ctx, opts).unwrap();

        assert_eq!(ctx.functions.len(), 3);
        assert_eq!(
            ctx.functions.iter().map(|f| f.name.to_string()).collect::<Vec<_>>(),
            ["f", "f_gpu", "f_gpu0"]
        );
        let total: usize = ["f_gpu", "f_gpu0"]
            .iter()
            .map(|name| find(&ctx, name).body.without_terminator().len())
            .sum();
        // Every device op is covered across the two partitions.
        assert_eq!(total, 4);
    }

    /// Terminator `[v, v, w]` with dup-outputs: the partition returns `v`
    /// twice and each call result replaces one terminator occurrence.
    #[test]
    fn dup_outputs_preserves_return_multiplicity() {
        let mut func = Function::new(
            "f",
            Signature::new(
                vec![Type::I64],
                vec![Type::I64, Type::I64, Type::I64],
            ),
        );
        let mut builder = Builder::new(&mut func);
        let arg = builder.param(0);
        let v = builder.add_op(
            "inc",
            vec![arg.clone()],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![
            v.borrow().result(0),
            v.borrow().result(0),
            arg,
        ]);
        let mut ctx = Context::new(vec![func]);

        let mut opts = options(ClusterAlgo::TopDown);
        opts.dup_outputs = true;
        cluster_by_device(&mut ctx, opts).unwrap();

        let partition = find(&ctx, "f_gpu");
        assert_eq!(partition.signature.results.len(), 2);

        let original = find(&ctx, "f");
        let call = original.body.ops()[0].clone();
        let ret = original.terminator();
        assert_eq!(
            ret.borrow().operand(0).borrow().id(),
            call.borrow().result(0).borrow().id()
        );
        assert_eq!(
            ret.borrow().operand(1).borrow().id(),
            call.borrow().result(1).borrow().id()
        );
        assert!(ret.borrow().operand(2).borrow().is_param());
    }

    /// Without dup-outputs a doubly returned value is surfaced once and
    /// replaces both terminator slots.
    #[test]
    fn single_output_replaces_every_slot() {
        let mut func = Function::new(
            "f",
            Signature::new(vec![Type::I64], vec![Type::I64, Type::I64]),
        );
        let mut builder = Builder::new(&mut func);
        let arg = builder.param(0);
        let v = builder.add_op(
            "inc",
            vec![arg],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![
            v.borrow().result(0),
            v.borrow().result(0),
        ]);
        let mut ctx = Context::new(vec![func]);

        cluster_by_device(&mut ctx, options(ClusterAlgo::TopDown)).unwrap();

        let original = find(&ctx, "f");
        let call = original.body.ops()[0].clone();
        let ret = original.terminator();
        let partition = find(&ctx, "f_gpu");
        assert_eq!(partition.signature.results.len(), 1);
        for i in 0..2 {
            assert_eq!(
                ret.borrow().operand(i).borrow().id(),
                call.borrow().result(0).borrow().id()
            );
        }
    }

    /// The replication pre-pass gives each cluster-absorbable constant a
    /// private copy, so a constant shared by host and device work follows
    /// its device user into the partition.
    #[test]
    fn splat_constants_are_replicated_into_the_cluster() {
        let mut func = Function::new(
            "f",
            Signature::new(vec![], vec![Type::I64, Type::I64]),
        );
        let mut builder = Builder::new(&mut func);
        let c = builder.add_constant(AttrValue::Num(7), Type::I64);
        let on_host = builder.add_op(
            "stamp",
            vec![c.borrow().result(0)],
            vec![Type::I64],
            host_attrs(),
        );
        let on_device = builder.add_op(
            "scale",
            vec![c.borrow().result(0)],
            vec![Type::I64],
            Attributes::default(),
        );
        builder.add_return(vec![
            on_host.borrow().result(0),
            on_device.borrow().result(0),
        ]);
        let mut ctx = Context::new(vec![func]);

        cluster_by_device(&mut ctx, options(ClusterAlgo::TopDown)).unwrap();

        // After replication each user owns a constant; the device copy and
        // `scale` form the cluster.
        let partition = find(&ctx, "f_gpu");
        assert_eq!(opcodes(partition), ["constant", "scale", "return"]);
        assert!(partition.signature.params.is_empty());
    }

    /// A function with no device operation cannot be partitioned by the
    /// directed strategies.
    #[test]
    fn all_host_function_is_an_error() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], host_attrs());
        builder.add_return(vec![a.borrow().result(0)]);
        let mut ctx = Context::new(vec![func]);

        let result =
            cluster_by_device(&mut ctx, options(ClusterAlgo::TopDown));
        assert!(result.is_err());
    }

    /// Rejecting the sole candidate without multi-graph enabled is a pass
    /// failure.
    #[test]
    fn rejected_sole_candidate_is_an_error() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        builder.add_return(vec![a.borrow().result(0)]);
        let mut ctx = Context::new(vec![func]);

        let mut opts = options(ClusterAlgo::TopDown);
        opts.validate_subgraph = Some(Rc::new(|_| false));
        assert!(cluster_by_device(&mut ctx, opts).is_err());
    }

    /// Options flow in from the command line through the pass registry.
    #[test]
    fn extra_opts_configure_the_pass() {
        let mut func =
            Function::new("f", Signature::new(vec![], vec![Type::I64]));
        let mut builder = Builder::new(&mut func);
        let a = builder.add_op("a", vec![], vec![Type::I64], Attributes::default());
        builder.add_return(vec![a.borrow().result(0)]);
        let mut ctx = Context::new(vec![func]);
        ctx.extra_opts = vec![
            "device-clustering:algorithm=top-down".to_string(),
            "device-clustering:device=npu".to_string(),
        ];

        DeviceClustering::do_pass_default(&mut ctx).unwrap();
        let partition = find(&ctx, "f_npu");
        assert_eq!(partition.attributes.get_str(ATTR), Some("npu".into()));
    }

    /// Coverage bookkeeping: the ops cloned into partitions plus the ops
    /// left behind account exactly for the original body.
    #[test]
    fn coverage_is_exact() {
        let mut ctx = asymmetric_ctx();
        let before: usize =
            ctx.functions[0].body.without_terminator().len();
        cluster_by_device(&mut ctx, options(ClusterAlgo::BottomUp)).unwrap();

        let original = find(&ctx, "f");
        let leftover = original
            .body
            .without_terminator()
            .iter()
            .filter(|op| !op.borrow().is(ir::CALL))
            .count();
        let cloned: usize = ctx
            .functions
            .iter()
            .filter(|f| f.attributes.has("device_partition"))
            .map(|f| f.body.without_terminator().len())
            .sum();
        assert_eq!(before, leftover + cloned);
    }
}
