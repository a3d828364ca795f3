//! Marker-to-operation correlation
//!
//! For every kernel the correlator decides three things from the enclosing
//! markers alone: execution direction (fprop/bprop), which operator/module
//! the kernel belongs to, and a stable sequence-id assignment when several
//! candidate operation instances overlap. No true call graph is available;
//! all three are heuristics over the marker vocabulary.
//!
//! The correlation state (`prev_seq_id`, `prev_sub_seq_id`, `prev_ops`) is
//! carried across the kernel stream in emission order. Reordering kernels
//! changes the result; the pass is inherently sequential.

use crate::demangle;
use crate::markers;
use crate::store::{KernelRow, TraceError, TraceStore};
use kernelscope_shared::{Direction, KernelRecord, MarkerBundle};
use tracing::{debug, info, warn};

/// Sequence-marker spellings that indicate a backward-pass kernel.
///
/// This list is a heuristic: backward markers using an unrecognized token
/// spelling will classify as fprop. Known limitation, kept deliberately
/// narrow.
const BACKWARD_TOKENS: [&str; 3] = ["Backward, seq = ", "backward, seq = ", "Backward0, seq = "];

/// Spellings that trigger operator-name sanitization in the seq-marker tier
const SANITIZE_TOKENS: [&str; 2] = ["backward, seq = ", "Backward, seq = "];

/// Recurrent cells that may not dispatch to separate kernels per step
const RECURRENT_CELLS: [&str; 3] = ["LSTMCell", "GRUCell", "RNNCell"];

/// Stateful correlator, one instance per trace-processing pass
#[derive(Debug)]
pub struct Correlator {
    prev_seq_id: i64,
    prev_sub_seq_id: i64,
    prev_ops: Option<Vec<String>>,
    profile_start: u64,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            prev_seq_id: -1,
            prev_sub_seq_id: -1,
            prev_ops: None,
            profile_start: 0,
        }
    }

    /// Run the full correlation pass over a trace store.
    ///
    /// Kernels are processed in the store's emission order. A single kernel
    /// with inconsistent timestamps aborts the pass (the trace is corrupt);
    /// everything else recovers locally.
    pub fn correlate<S: TraceStore>(&mut self, store: &S) -> Result<Vec<KernelRecord>, TraceError> {
        let rows = store.kernel_rows()?;
        if rows.is_empty() {
            info!("found 0 kernels");
            return Ok(Vec::new());
        }
        info!("found {} kernels, correlating markers", rows.len());
        self.profile_start = store.profile_start()?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let texts = store.enclosing_markers(&row.obj_id, row.r_start, row.r_end)?;
            let record = self.correlate_kernel(row, markers::collect(&texts))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Correlate one kernel given its already-collected marker bundle.
    pub fn correlate_kernel(
        &mut self,
        row: &KernelRow,
        bundle: MarkerBundle,
    ) -> Result<KernelRecord, TraceError> {
        let mut record = self.build_record(row)?;
        record.markers = bundle;
        record.sub_seq_id = 0;

        drop_zero_sentinel(&mut record.markers.seq_ids);
        record.direction = Some(resolve_direction(&record.markers));
        resolve_op(&mut record);
        set_unique_name(&mut record);
        self.assign_seq_ids(&mut record);

        Ok(record)
    }

    /// Populate the timing/identity fields and validate event ordering.
    fn build_record(&self, row: &KernelRow) -> Result<KernelRecord, TraceError> {
        let long_name = demangle::demangle(&row.name);
        let short_name = demangle::short_name(&long_name);

        let corrupt = |detail: String| TraceError::CorruptTrace {
            kernel: short_name.clone(),
            corr_id: row.correlation_id,
            detail,
        };

        // Ordering violations make the data unrecoverable; fail the pass.
        if row.end <= row.start {
            return Err(corrupt(format!(
                "kernel end {} not after start {}",
                row.end, row.start
            )));
        }
        if row.r_start >= row.r_end {
            return Err(corrupt(format!(
                "runtime start {} not before end {}",
                row.r_start, row.r_end
            )));
        }
        if row.r_start >= row.start {
            return Err(corrupt(format!(
                "runtime start {} not before kernel start {}",
                row.r_start, row.start
            )));
        }
        if row.start <= self.profile_start {
            return Err(corrupt(format!(
                "kernel start {} not after profile start {}",
                row.start, self.profile_start
            )));
        }

        Ok(KernelRecord {
            long_name,
            short_name,
            corr_id: row.correlation_id,
            start: row.start,
            end: row.end,
            duration: row.end - row.start,
            device: row.device_id,
            stream: row.stream_id,
            grid: row.grid,
            block: row.block,
            r_start: row.r_start,
            r_end: row.r_end,
            r_duration: row.r_end - row.r_start,
            pid: row.pid,
            tid: row.tid,
            obj_id: row.obj_id.clone(),
            time_offset: self.profile_start,
            markers: MarkerBundle::default(),
            sub_seq_id: 0,
            direction: None,
            modules: Vec::new(),
            ops: Vec::new(),
            call_ids: Vec::new(),
            input_call_ids: Vec::new(),
            unique_name: Vec::new(),
        })
    }

    /// Sequence-id bookkeeping across the ordered kernel stream.
    ///
    /// A kernel can carry multiple raw ids both in fprop and bprop; in bprop
    /// the ids do not always decrease monotonically. The rules below are
    /// tuned against observed autograd behavior; see DESIGN.md before
    /// generalizing them.
    fn assign_seq_ids(&mut self, record: &mut KernelRecord) {
        let seq_ids = &record.markers.seq_ids;
        if seq_ids.is_empty() {
            return;
        }

        let curr = match record.direction() {
            Direction::Fprop => {
                // ids are sorted ascending, so the last is the maximum
                if *seq_ids.last().unwrap() > self.prev_seq_id {
                    *seq_ids
                        .iter()
                        .find(|&&s| s > self.prev_seq_id)
                        .unwrap()
                } else {
                    self.prev_seq_id
                }
            }
            Direction::Bprop => seq_ids[0],
        };

        let same_op = self.prev_ops.as_deref() == Some(record.ops.as_slice());
        let repeated = curr == self.prev_seq_id && same_op;
        // Recurrent cells may not use cuDNN; their per-step `forward` markers
        // then repeat without the sequence id moving.
        let cell_repeat = record.ops.first().map(String::as_str) == Some("forward")
            && same_op
            && record
                .modules
                .first()
                .map(|m| RECURRENT_CELLS.contains(&m.as_str()))
                .unwrap_or(false);

        if repeated || cell_repeat {
            record.sub_seq_id = self.prev_sub_seq_id + 1;
        }

        self.prev_seq_id = curr;
        self.prev_sub_seq_id = record.sub_seq_id;
        self.prev_ops = Some(record.ops.clone());

        // The resolved id stays primary; every other raw id becomes an
        // alternate (deduplicated, ascending). A kernel that only repeats
        // the previous id without carrying it ends up with no primary id.
        let had_curr = record.markers.seq_ids.contains(&curr);
        let mut alts: Vec<i64> = record
            .markers
            .seq_ids
            .iter()
            .chain(record.markers.alt_seq_ids.iter())
            .copied()
            .filter(|&s| s != curr)
            .collect();
        alts.sort_unstable();
        alts.dedup();

        record.markers.seq_ids = if had_curr { vec![curr] } else { Vec::new() };
        record.markers.alt_seq_ids = alts;
    }
}

/// Drop the 0 sentinel when real ids are present alongside it.
fn drop_zero_sentinel(seq_ids: &mut Vec<i64>) {
    if seq_ids.iter().any(|&s| s != 0) && seq_ids.contains(&0) {
        seq_ids.retain(|&s| s != 0);
    }
}

/// Direction from the autograd sequence markers. Heuristic, not foolproof.
pub fn resolve_direction(markers: &MarkerBundle) -> Direction {
    let backward = markers
        .seq_markers
        .iter()
        .any(|m| BACKWARD_TOKENS.iter().any(|tok| m.contains(tok)));
    if backward {
        Direction::Bprop
    } else {
        Direction::Fprop
    }
}

/// Resolve module/operator identity in strict priority order: operation
/// markers from the instrumentation layer, else autograd sequence markers,
/// else the first unclassified marker. The first tier that yields at least
/// one operator wins; tiers are never merged.
fn resolve_op(record: &mut KernelRecord) {
    // Tier 1: operation markers
    for m in &record.markers.op_markers {
        record.ops.push(m.op.clone());
        record.modules.push(m.module.clone());
        if let Some(call_id) = &m.call_id {
            if !record.call_ids.contains(call_id) {
                record.call_ids.push(call_id.clone());
            }
        }
        for id in &m.input_call_ids {
            if !record.input_call_ids.contains(id) {
                record.input_call_ids.push(id.clone());
            }
        }
    }
    if !record.ops.is_empty() {
        return;
    }

    // Tier 2: autograd sequence markers
    for m in &record.markers.seq_markers {
        if !m.contains(", seq = ") {
            continue;
        }
        let mut op = m.split(',').next().unwrap_or(m).to_string();
        if SANITIZE_TOKENS.iter().any(|tok| m.contains(tok)) {
            op = sanitize(&op);
        }
        record.ops.push(op);
        record.modules.push("na".to_string());
        if !record.call_ids.iter().any(|c| c == "na") {
            record.call_ids.push("na".to_string());
        }
        record.input_call_ids.push("na".to_string());
    }
    if !record.ops.is_empty() {
        return;
    }

    // Tier 3: whatever is left
    if let Some(first) = record.markers.other_markers.first() {
        record.ops.push(first.clone());
    }
    record.modules.push("na".to_string());
    if !record.call_ids.iter().any(|c| c == "na") {
        record.call_ids.push("na".to_string());
    }
    record.input_call_ids.push("na".to_string());
}

/// Strip framework-internal noise from a backward operator name and keep
/// the prefix before `Backward`.
fn sanitize(name: &str) -> String {
    let name = name
        .replace("torch", "")
        .replace("autograd", "")
        .replace("_backward", "")
        .replace("::", "")
        .replace("jit", "")
        .replace("(anonymous namespace)", "");
    match name.split_once("Backward") {
        Some((head, _)) => head.to_string(),
        None => name,
    }
}

/// Map the function-stack names onto the kernel's call id, when it has
/// exactly one structured call id.
fn set_unique_name(record: &mut KernelRecord) {
    match record.call_ids.as_slice() {
        [] => {}
        [id] => {
            if id != "na" {
                if record.markers.func_stacks.is_empty() {
                    warn!(
                        "call id {} on kernel `{}` has no function-stack marker",
                        id, record.short_name
                    );
                } else {
                    record.unique_name = record.markers.func_stacks.clone();
                }
            }
        }
        ids => debug!(
            "kernel `{}` carries {} call ids, expected one",
            record.short_name,
            ids.len()
        ),
    }
}
