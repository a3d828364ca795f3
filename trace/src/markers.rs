//! Marker collection
//!
//! Bins the raw marker texts enclosing one kernel launch into the grouped
//! per-kernel bundle, prunes redundant autograd sequence markers, extracts
//! sequence ids and layer names, and filters framework-internal files out of
//! the call trace. Shared by every trace-store backend.

use kernelscope_shared::{Marker, MarkerBundle, TraceMarker};
use tracing::debug;

/// Call-trace entries from these files add no user-level information
const TRACE_FILE_FILTER: [&str; 9] = [
    "/torch/nn/modules/",
    "/torch/nn/functional.py",
    "/torch/tensor.py",
    "/torch/autograd/__init__.py",
    "/torch/_jit_internal.py",
    "/nvtx/nvmarker.py",
    "/apex/optimizers/",
    "/torch/_utils.py",
    "/torch/optim/",
];

/// Group one kernel's enclosing marker texts by kind.
pub fn collect(texts: &[String]) -> MarkerBundle {
    let mut bundle = MarkerBundle::default();
    let mut trace_markers: Vec<TraceMarker> = Vec::new();

    for text in texts {
        // Known gradient-checkpointing marker; carries no correlation signal.
        if text.contains("CheckpointFunctionBackward") {
            continue;
        }

        match Marker::classify(text) {
            Marker::Op(m) => bundle.op_markers.push(m),
            Marker::Layer(name) => {
                bundle.layer_markers.push(text.clone());
                bundle.layers.push(name);
            }
            Marker::Trace(t) => trace_markers.push(t),
            Marker::Repr(r) => bundle.repr_markers.push(r),
            Marker::Seq(s) => bundle.seq_markers.push(s),
            Marker::Other(o) => bundle.other_markers.push(o),
        }
    }

    if !bundle.seq_markers.is_empty() {
        dedup_keep_order(&mut bundle.seq_markers);
        bundle.seq_markers.sort_by_key(|m| seq_sort_key(m));
        bundle.seq_markers = prune_seq_markers(&bundle.seq_markers);
    }

    dedup_keep_order(&mut bundle.other_markers);

    bundle.seq_ids = extract_seq_ids(&bundle.seq_markers);
    bundle.alt_seq_ids = extract_seq_ids(&bundle.alt_markers);

    // The last stack trace is a superset of the earlier ones.
    if let Some(last) = trace_markers.last() {
        bundle.trace_frames = last
            .frames
            .iter()
            .filter(|f| !TRACE_FILE_FILTER.iter().any(|skip| f.contains(skip)))
            .cloned()
            .collect();
    }
    bundle.func_stacks = trace_markers.into_iter().map(|t| t.func_stack).collect();

    bundle
}

fn dedup_keep_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|m| seen.insert(m.clone()));
}

/// Sort by sequence id, then by the marker name
fn seq_sort_key(marker: &str) -> String {
    match marker.split_once(" = ") {
        Some((name, id)) => format!("{}{}", id, name),
        None => marker.to_string(),
    }
}

/// Collapse adjacent markers that share a sequence id and have similar
/// names (one name containing the other). Works on a sorted list.
fn prune_seq_markers(markers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = markers[0..1].to_vec();
    for pair in markers.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let (pname, pseq) = split_name_seq(prev);
        let (name, seq) = split_name_seq(cur);
        let similar = name.contains(pname) || pname.contains(name);
        if !(seq == pseq && similar) {
            out.push(cur.clone());
        }
    }
    out
}

fn split_name_seq(marker: &str) -> (&str, &str) {
    marker.split_once(',').unwrap_or((marker, ""))
}

/// Extract the integer ids from sequence marker texts; deduplicated and
/// sorted ascending.
fn extract_seq_ids(markers: &[String]) -> Vec<i64> {
    let mut ids: Vec<i64> = Vec::new();
    for m in markers {
        match parse_seq_id(m) {
            Some(id) => ids.push(id),
            None => debug!("sequence marker without a parsable id: {}", m),
        }
    }
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn parse_seq_id(marker: &str) -> Option<i64> {
    let (_, rest) = marker.split_once(", seq = ")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_binning_by_kind() {
        let bundle = collect(&texts(&[
            "layer:encoder.0",
            "{'traceMarker': ['train.py:10'], 'funcStack': '/Net::forward'}",
            "{'mod': 'LSTM', 'strRepr': '10, 20'}",
            "{'mod': 'torch', 'op': 'add', 'args': [{'name': '', 'type': 'tensor', 'shape': (2, 2), 'dtype': 'float32'}]}",
            "MulBackward0, seq = 12",
            "cuLaunchKernel",
        ]));

        assert_eq!(bundle.layers, vec!["encoder.0"]);
        assert_eq!(bundle.trace_frames, vec!["train.py:10"]);
        assert_eq!(bundle.func_stacks, vec!["/Net::forward"]);
        assert_eq!(bundle.repr_markers.len(), 1);
        assert_eq!(bundle.op_markers.len(), 1);
        assert_eq!(bundle.seq_markers.len(), 1);
        assert_eq!(bundle.other_markers, vec!["cuLaunchKernel"]);
        assert_eq!(bundle.seq_ids, vec![12]);
    }

    #[test]
    fn test_checkpoint_markers_skipped() {
        let bundle = collect(&texts(&["CheckpointFunctionBackward, seq = 3"]));
        assert!(bundle.seq_markers.is_empty());
        assert!(bundle.seq_ids.is_empty());
    }

    #[test]
    fn test_seq_ids_dedup_sorted() {
        let bundle = collect(&texts(&[
            "add, seq = 7",
            "mul, seq = 3",
            "add, seq = 7",
        ]));
        assert_eq!(bundle.seq_ids, vec![3, 7]);
    }

    #[test]
    fn test_prune_similar_same_id() {
        // same id, one name contains the other: the second is pruned
        let bundle = collect(&texts(&["add, seq = 5", "add_, seq = 5"]));
        assert_eq!(bundle.seq_markers.len(), 1);

        // same id, unrelated names: both kept
        let bundle = collect(&texts(&["add, seq = 5", "mul, seq = 5"]));
        assert_eq!(bundle.seq_markers.len(), 2);
    }

    #[test]
    fn test_trace_frames_filtered() {
        let bundle = collect(&texts(&[
            "{'traceMarker': ['train.py:10', '/lib/torch/nn/functional.py:99'], 'funcStack': '/f'}",
        ]));
        assert_eq!(bundle.trace_frames, vec!["train.py:10"]);
    }

    #[test]
    fn test_last_trace_marker_wins() {
        let bundle = collect(&texts(&[
            "{'traceMarker': ['a.py:1'], 'funcStack': '/a'}",
            "{'traceMarker': ['a.py:1', 'b.py:2'], 'funcStack': '/a/b'}",
        ]));
        assert_eq!(bundle.trace_frames, vec!["a.py:1", "b.py:2"]);
        assert_eq!(bundle.func_stacks, vec!["/a", "/a/b"]);
    }

    #[test]
    fn test_malformed_op_marker_is_other() {
        let bundle = collect(&texts(&[
            "{'mod': 'torch', 'op': 'add', 'args': [{'type': 'tensor'",
        ]));
        assert!(bundle.op_markers.is_empty());
        assert_eq!(bundle.other_markers.len(), 1);
    }
}
