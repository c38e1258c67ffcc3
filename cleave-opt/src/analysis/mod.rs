//! Analysis for IR programs.
//! The analyses construct data structures that the passes use to partition
//! and rewrite functions.
mod device_clusters;
mod host_ops;
mod subgraph;

pub use device_clusters::{ClusterIdx, DeviceClusterer, OpList};
pub use host_ops::{
    host_closure, is_host_bound_constant, is_host_op, DEVICE_ATTR_HOST,
};
pub use subgraph::{inputs_of_cluster, outputs_of_cluster, ReturnStats};
