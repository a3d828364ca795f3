//! Shared types and marker decoding for Kernelscope
//!
//! This crate contains the data model used across the trace correlator and
//! the operator cost model: element types, tensor descriptors, the decoded
//! profiler-marker structures, and the per-kernel record.

pub mod literal;
pub mod types;

// Re-export commonly used types
pub use types::{dtype::*, kernel::*, marker::*, tensor::*};
