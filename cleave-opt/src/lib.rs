//! Passes for the cleave compiler.
//!
//! The central pass is `device-clustering`: it partitions each function's
//! dataflow graph along device-placement boundaries and outlines every
//! partition into its own callable function. The supporting modules define
//! the analyses the pass is built from and the machinery for running
//! passes over a program.
pub mod analysis;
pub mod default_passes;
pub mod pass_manager;
pub mod passes;
pub mod traversal;
