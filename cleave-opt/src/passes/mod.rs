//! Passes implemented in the compiler.
mod cluster_by_device;
mod well_formed;

pub use cluster_by_device::{
    cluster_by_device, host_anchor_name, ClusterAlgo, ClusterOptions,
    DeviceClustering, ValidateSubgraphFn,
};
pub use well_formed::WellFormed;
