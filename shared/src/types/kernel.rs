//! Per-kernel records
//!
//! One `KernelRecord` is created per kernel row during a single parse pass.
//! It is mutated only by the correlator's setters, in a fixed order (kernel
//! info, runtime info, marker info, direction, operator), and is read-only
//! afterwards.

use crate::types::marker::{OpMarker, ReprMarker};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution direction of the operation a kernel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Fprop,
    Bprop,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Fprop => "fprop",
            Direction::Bprop => "bprop",
        })
    }
}

/// The markers temporally enclosing one kernel's host launch, grouped by
/// kind, plus the sequence ids and layer names extracted from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerBundle {
    /// Raw `layer:<name>` marker texts
    pub layer_markers: Vec<String>,
    /// Call-trace frames (`file:line`), framework-internal files filtered
    pub trace_frames: Vec<String>,
    /// `/`-delimited function-stack paths from the trace markers
    pub func_stacks: Vec<String>,
    /// Decoded module-repr markers
    pub repr_markers: Vec<ReprMarker>,
    /// Decoded operation markers
    pub op_markers: Vec<OpMarker>,
    /// Raw autograd sequence marker texts (deduplicated, sorted, pruned)
    pub seq_markers: Vec<String>,
    /// Unclassified marker texts (deduplicated)
    pub other_markers: Vec<String>,
    /// Sequence markers observed between kernel launches
    pub alt_markers: Vec<String>,
    /// Sequence ids extracted from `seq_markers`; after correlation the
    /// resolved current id only
    pub seq_ids: Vec<i64>,
    /// Every other raw sequence id, moved here by the correlator
    pub alt_seq_ids: Vec<i64>,
    /// Layer names from `layer_markers`
    pub layers: Vec<String>,
}

/// One GPU kernel execution with its correlation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelRecord {
    /// Demangled kernel name
    pub long_name: String,
    /// Namespace/template-stripped kernel name
    pub short_name: String,
    /// Correlation id linking the kernel to its host-side launch
    pub corr_id: u64,
    /// Device-side start/end timestamps (ns) and duration
    pub start: u64,
    pub end: u64,
    pub duration: u64,
    pub device: u32,
    pub stream: u32,
    pub grid: (u64, u64, u64),
    pub block: (u64, u64, u64),
    /// Host-side (runtime) launch window
    pub r_start: u64,
    pub r_end: u64,
    pub r_duration: u64,
    pub pid: u32,
    pub tid: u32,
    /// Per-event global thread/process identifier used for marker lookup
    pub obj_id: String,
    /// Profile start time subtracted from reported timestamps
    pub time_offset: u64,

    pub markers: MarkerBundle,

    /// Disambiguates repeated kernels under the same sequence id
    pub sub_seq_id: i64,
    pub direction: Option<Direction>,
    /// Module name per operation marker; `na` when unstructured
    pub modules: Vec<String>,
    /// Operator name per operation marker (or heuristic fallback)
    pub ops: Vec<String>,
    /// Data-dependency edges (optional; `na` placeholders when absent)
    pub call_ids: Vec<String>,
    pub input_call_ids: Vec<String>,
    /// Function-stack names mapped to the call id, when one exists
    pub unique_name: Vec<String>,
}

impl KernelRecord {
    /// First resolved module name, `na` when none
    pub fn module(&self) -> &str {
        self.modules.first().map(String::as_str).unwrap_or("na")
    }

    /// First resolved operator name, `na` when none
    pub fn op(&self) -> &str {
        self.ops.first().map(String::as_str).unwrap_or("na")
    }

    /// The resolved primary sequence id, when any
    pub fn seq_id(&self) -> Option<i64> {
        self.markers.seq_ids.first().copied()
    }

    pub fn direction(&self) -> Direction {
        self.direction.unwrap_or(Direction::Fprop)
    }

    /// `x,y,z` rendering used in reports
    pub fn grid_string(&self) -> String {
        format!("{},{},{}", self.grid.0, self.grid.1, self.grid.2)
    }

    pub fn block_string(&self) -> String {
        format!("{},{},{}", self.block.0, self.block.1, self.block.2)
    }
}
