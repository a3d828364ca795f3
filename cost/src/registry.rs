//! Typed calculator registry
//!
//! Maps a correlated operation onto exactly one calculator. Dispatch is by
//! construction-time validation: the table routes on the operator name, and
//! every constructor checks its own module/argument preconditions,
//! returning a recognizable error instead of claiming the operation. The
//! registry catches those errors per kernel, logs the kernel identity, and
//! substitutes the pass-through fallback; one malformed kernel never aborts
//! the trace.

use crate::misc::Fallback;
use crate::{
    activation, convert, dropout, embedding, index_slice_join_mutate as isjm, loss, memory, misc,
    normalization, pointwise, recurrent, reduction, softmax,
};
use crate::{CostError, OpContext, OpCost, OperatorLayer};
use kernelscope_shared::KernelRecord;
use tracing::{debug, warn};

/// Estimate the cost of one correlated kernel.
///
/// Kernels without an operation marker (correlated through the sequence or
/// fallback tiers) get an unsupported record carrying the heuristic
/// operator name.
pub fn dispatch(record: &KernelRecord) -> OpCost {
    let Some(ctx) = OpContext::from_record(record) else {
        return OpCost::unstructured(record.module(), record.op());
    };

    match build(&ctx) {
        Ok(layer) => OpCost::from_layer(layer.as_ref(), true),
        Err(err) => {
            match &err {
                CostError::Unsupported { module, op } => debug!(
                    "no calculator claims {}/{} (kernel `{}`)",
                    module, op, record.short_name
                ),
                CostError::Invariant(detail) => warn!(
                    "kernel `{}` (corrId {}, trace {:?}): {}",
                    record.short_name, record.corr_id, record.markers.trace_frames, detail
                ),
            }
            OpCost::from_layer(&Fallback::new(&ctx), false)
        }
    }
}

/// The (module, operator) table. Order resolves the overlapping names:
/// activations win over the pointwise family for `sigmoid`/`tanh`.
pub fn build(ctx: &OpContext) -> Result<Box<dyn OperatorLayer>, CostError> {
    let module = ctx.marker.module.as_str();
    let op = ctx.marker.op.as_str();

    fn boxed<T: OperatorLayer + 'static>(layer: T) -> Box<dyn OperatorLayer> {
        Box::new(layer)
    }

    if op == "forward" && matches!(module, "LSTM" | "GRU") {
        return recurrent::RnnBase::new(ctx).map(boxed);
    }
    if convert::claims(op) {
        return convert::Convert::new(ctx).map(boxed);
    }
    if activation::claims(op) {
        return activation::Activation::new(ctx).map(boxed);
    }
    if pointwise::claims(op) {
        return pointwise::Pointwise::new(ctx).map(boxed);
    }
    if memory::claims_one_zero(op) {
        return memory::OneZero::new(ctx).map(boxed);
    }

    match op {
        "mean" => reduction::Mean::new(ctx).map(boxed),
        "sum" => reduction::Sum::new(ctx).map(boxed),
        "norm" => reduction::Norm::new(ctx).map(boxed),
        "batch_norm" => normalization::BatchNorm::new(ctx).map(boxed),
        "softmax" => softmax::Softmax::new(ctx).map(boxed),
        "log_softmax" => softmax::LogSoftmax::new(ctx).map(boxed),
        "embedding" => embedding::Embedding::new(ctx).map(boxed),
        "mse_loss" => loss::MseLoss::new(ctx).map(boxed),
        "dropout" => dropout::Dropout::new(ctx).map(boxed),
        "cat" | "stack" => isjm::Cat::new(ctx).map(boxed),
        "reshape" => isjm::Reshape::new(ctx).map(boxed),
        "gather" => isjm::Gather::new(ctx).map(boxed),
        "masked_scatter_" => isjm::MaskedScatter::new(ctx).map(boxed),
        "masked_select" => isjm::MaskedSelect::new(ctx).map(boxed),
        "nonzero" => isjm::Nonzero::new(ctx).map(boxed),
        "index_select" => isjm::IndexSelect::new(ctx).map(boxed),
        "fill_" => memory::Fill::new(ctx).map(boxed),
        "full" => memory::Full::new(ctx).map(boxed),
        "copy_" => misc::Copy::new(ctx).map(boxed),
        "clone" => misc::CloneOp::new(ctx).map(boxed),
        "contiguous" => misc::Contiguous::new(ctx).map(boxed),
        "any" => misc::Any::new(ctx).map(boxed),
        _ => Err(CostError::unsupported(module, op)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelscope_shared::{Arg, Direction, Dtype, KernelRecord, MarkerBundle, OpMarker, TensorDesc};

    fn record_with_marker(marker: Option<OpMarker>) -> KernelRecord {
        let mut markers = MarkerBundle::default();
        if let Some(m) = marker {
            markers.op_markers.push(m);
        }
        KernelRecord {
            long_name: "void kernel".to_string(),
            short_name: "kernel".to_string(),
            corr_id: 1,
            start: 100,
            end: 200,
            duration: 100,
            device: 0,
            stream: 0,
            grid: (1, 1, 1),
            block: (32, 1, 1),
            r_start: 10,
            r_end: 20,
            r_duration: 10,
            pid: 1,
            tid: 1,
            obj_id: "1".to_string(),
            time_offset: 0,
            markers,
            sub_seq_id: 0,
            direction: Some(Direction::Fprop),
            modules: vec!["torch".to_string()],
            ops: vec!["add".to_string()],
            call_ids: Vec::new(),
            input_call_ids: Vec::new(),
            unique_name: Vec::new(),
        }
    }

    fn op_marker(module: &str, op: &str, shapes: &[&[usize]]) -> OpMarker {
        OpMarker {
            module: module.to_string(),
            op: op.to_string(),
            call_id: None,
            input_call_ids: Vec::new(),
            args: shapes
                .iter()
                .map(|s| Arg::Tensor {
                    name: String::new(),
                    desc: TensorDesc::new(s.to_vec(), Dtype::Float32),
                })
                .collect(),
        }
    }

    #[test]
    fn test_dispatch_supported_op() {
        let record = record_with_marker(Some(op_marker("torch", "add", &[&[4, 4], &[4, 4]])));
        let cost = dispatch(&record);
        assert!(cost.supported);
        assert_eq!(cost.operator, "add");
        assert_eq!(cost.bytes, 192);
        assert_eq!(cost.flops, 16);
    }

    #[test]
    fn test_dispatch_unsupported_falls_back() {
        let record = record_with_marker(Some(op_marker("torch", "einsum", &[&[2, 3]])));
        let cost = dispatch(&record);
        assert!(!cost.supported);
        assert_eq!(cost.operator, "einsum");
        assert_eq!(cost.flops, 0);
        assert_eq!(cost.bytes, 0);
    }

    #[test]
    fn test_dispatch_invariant_violation_falls_back() {
        // mse_loss with a missing reduction argument violates the
        // calculator's preconditions but must not panic the pass
        let record = record_with_marker(Some(op_marker(
            "torch.nn.functional",
            "mse_loss",
            &[&[8], &[8]],
        )));
        let cost = dispatch(&record);
        assert!(!cost.supported);
        assert_eq!(cost.operator, "mse_loss");
    }

    #[test]
    fn test_dispatch_without_op_marker() {
        let record = record_with_marker(None);
        let cost = dispatch(&record);
        assert!(!cost.supported);
        // falls back to the correlator's heuristic operator name
        assert_eq!(cost.operator, "add");
        assert_eq!(cost.module, "torch");
        assert_eq!(cost.params, "na");
    }

    #[test]
    fn test_reshape_zero_cost_is_supported() {
        // legitimately zero-cost ops stay distinguishable from fallbacks
        let record = record_with_marker(Some(op_marker("Tensor", "reshape", &[&[1024]])));
        let cost = dispatch(&record);
        assert!(cost.supported);
        assert_eq!(cost.bytes, 0);
    }

    #[test]
    fn test_sigmoid_routes_to_activation() {
        let record = record_with_marker(Some(op_marker("torch", "sigmoid", &[&[16]])));
        let cost = dispatch(&record);
        assert!(cost.supported);
        // activation fprop: 1 read + 1 write
        assert_eq!(cost.bytes, 2 * 16 * 4);
        assert_eq!(cost.flops, 16);
    }

    #[test]
    fn test_registry_covers_every_family() {
        let cases: Vec<OpMarker> = vec![
            op_marker("torch", "mul", &[&[4], &[4]]),
            op_marker("torch", "relu", &[&[4]]),
            op_marker("torch", "sum", &[&[4]]),
            op_marker("torch.nn.functional", "batch_norm", &[&[4, 4]]),
            op_marker("torch.nn.functional", "softmax", &[&[4]]),
            op_marker("Tensor", "half", &[&[4]]),
            op_marker("torch.nn.functional", "dropout", &[&[4]]),
            op_marker("Tensor", "reshape", &[&[4]]),
            op_marker("torch", "zeros", &[&[4]]),
            op_marker("Tensor", "contiguous", &[&[4]]),
        ];
        for marker in cases {
            let op = marker.op.clone();
            let record = record_with_marker(Some(marker));
            let cost = dispatch(&record);
            assert!(cost.supported, "expected a calculator for `{}`", op);
        }
    }
}
