//! Per-operator cost models
//!
//! Maps a correlated operation (module, operator) onto a calculator that
//! estimates the kernel's theoretical FLOPs and global-memory traffic from
//! the tensor-shaped arguments recorded in its markers. Every calculator is
//! one variant of the `OperatorLayer` capability; dispatch happens through
//! the typed registry in [`registry`], which falls back to a pass-through
//! calculator when no specific one claims the operation.

pub mod activation;
pub mod args;
pub mod convert;
pub mod dropout;
pub mod embedding;
pub mod index_slice_join_mutate;
pub mod loss;
pub mod memory;
pub mod misc;
pub mod normalization;
pub mod pointwise;
pub mod recurrent;
pub mod reduction;
pub mod registry;
pub mod softmax;
pub mod tc;

use kernelscope_shared::{Direction, KernelRecord, OpMarker, ReprMarker};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a calculator refused an operation
#[derive(Debug, Clone, thiserror::Error)]
pub enum CostError {
    /// No calculator claims this (module, operator) pair
    #[error("unsupported operator: {module}/{op}")]
    Unsupported { module: String, op: String },

    /// The marker does not satisfy the claiming calculator's assumptions
    /// (wrong argument count, missing tensor, non-broadcastable shapes, ...)
    #[error("calculator invariant violated: {0}")]
    Invariant(String),
}

impl CostError {
    pub fn unsupported(module: &str, op: &str) -> Self {
        CostError::Unsupported {
            module: module.to_string(),
            op: op.to_string(),
        }
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        CostError::Invariant(detail.into())
    }
}

/// Tensor-core usage by one kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcUsage {
    /// Tensor cores were used
    Used,
    /// The kernel could use tensor cores but did not
    NotUsed,
    /// Not applicable (elementwise, reshape, ...)
    NotApplicable,
}

impl fmt::Display for TcUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TcUsage::Used => "1",
            TcUsage::NotUsed => "0",
            TcUsage::NotApplicable => "-",
        })
    }
}

/// Reported operator parameters: either a preformatted string or an ordered
/// key/value list
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Text(String),
    Pairs(Vec<(String, String)>),
}

impl Params {
    pub fn text(t: impl Into<String>) -> Self {
        Params::Text(t.into())
    }
}

impl fmt::Display for Params {
    /// Keys containing `type` render as their bare value (the canonical
    /// dtype name); everything else as `key=value`. No whitespace.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Params::Text(t) => f.write_str(&t.replace(' ', "")),
            Params::Pairs(pairs) => {
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if k.contains("type") {
                        f.write_str(&v.replace(' ', ""))?;
                    } else {
                        write!(f, "{}={}", k, v.replace(' ', ""))?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Render a shape the way reports expect: `(2,3)`
pub(crate) fn fmt_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("({})", dims.join(","))
}

/// Capability interface implemented by every calculator
pub trait OperatorLayer {
    /// Tensor-core usage by the kernel
    fn tc(&self) -> TcUsage;

    /// Kernel parameters for reporting; not used in cost computation
    fn params(&self) -> Params;

    /// FLOP estimate; one fused multiply-add counts as 2
    fn flops(&self) -> u64;

    /// Global-memory traffic estimate in bytes
    fn bytes(&self) -> u64;

    /// Module/class the operation belongs to, e.g. `torch.nn.functional`
    fn module(&self) -> &str;

    /// Operator name, e.g. `sigmoid`
    fn operator(&self) -> &str;
}

/// Everything a calculator may consult for one kernel
#[derive(Debug, Clone, Copy)]
pub struct OpContext<'a> {
    /// The first operation marker of the kernel
    pub marker: &'a OpMarker,
    /// Module-repr marker, when the layer emitted one
    pub repr: Option<&'a ReprMarker>,
    pub direction: Direction,
    /// Disambiguates repeated kernels under one sequence id; calculators
    /// zero duplicate launches of the same logical op with this
    pub sub_seq_id: i64,
    /// Short kernel name, for calculators that inspect raw kernel names
    pub kernel_name: &'a str,
    pub grid: (u64, u64, u64),
}

impl<'a> OpContext<'a> {
    /// Build the context from a correlated kernel record, when it carries an
    /// operation marker.
    pub fn from_record(record: &'a KernelRecord) -> Option<Self> {
        let marker = record.markers.op_markers.first()?;
        Some(Self {
            marker,
            repr: record.markers.repr_markers.first(),
            direction: record.direction(),
            sub_seq_id: record.sub_seq_id,
            kernel_name: &record.short_name,
            grid: record.grid,
        })
    }
}

/// Normalized result of one calculator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpCost {
    pub module: String,
    pub operator: String,
    pub params: String,
    pub tc: String,
    pub flops: u64,
    pub bytes: u64,
    /// False when the pass-through fallback produced this record; lets
    /// reports separate coverage gaps from correctly-computed zero cost
    pub supported: bool,
}

impl OpCost {
    pub fn from_layer(layer: &dyn OperatorLayer, supported: bool) -> Self {
        Self {
            module: layer.module().to_string(),
            operator: layer.operator().to_string(),
            params: layer.params().to_string(),
            tc: layer.tc().to_string(),
            flops: layer.flops(),
            bytes: layer.bytes(),
            supported,
        }
    }

    /// Record for a kernel with no operation marker at all
    pub fn unstructured(module: &str, operator: &str) -> Self {
        Self {
            module: module.to_string(),
            operator: operator.to_string(),
            params: "na".to_string(),
            tc: TcUsage::NotApplicable.to_string(),
            flops: 0,
            bytes: 0,
            supported: false,
        }
    }
}

/// The per-kernel record handed to reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub short_name: String,
    pub duration: u64,
    pub direction: String,
    pub module: String,
    pub operator: String,
    pub params: String,
    pub tc: String,
    pub flops: u64,
    pub bytes: u64,
    pub device: u32,
    pub stream: u32,
    pub grid: String,
    pub block: String,
    pub call_ids: Vec<String>,
    pub input_call_ids: Vec<String>,
    pub supported: bool,
}

impl Record {
    pub fn new(kernel: &KernelRecord, cost: &OpCost) -> Self {
        Self {
            short_name: kernel.short_name.replace(' ', "_"),
            duration: kernel.duration,
            direction: kernel.direction().to_string(),
            module: cost.module.clone(),
            operator: cost.operator.clone(),
            params: cost.params.clone(),
            tc: cost.tc.clone(),
            flops: cost.flops,
            bytes: cost.bytes,
            device: kernel.device,
            stream: kernel.stream,
            grid: kernel.grid_string(),
            block: kernel.block_string(),
            call_ids: kernel.call_ids.clone(),
            input_call_ids: kernel.input_call_ids.clone(),
            supported: cost.supported,
        }
    }
}
