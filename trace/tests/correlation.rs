//! End-to-end correlation over an in-memory trace

use kernelscope_shared::Direction;
use kernelscope_trace::{Correlator, KernelRow, MarkerRow, MemoryStore};

fn kernel(corr: u64, base: u64, obj: &str) -> KernelRow {
    KernelRow {
        name: format!("kernel_{}", corr),
        correlation_id: corr,
        start: base + 20,
        end: base + 30,
        device_id: 0,
        stream_id: 1,
        grid: (4, 1, 1),
        block: (256, 1, 1),
        r_start: base,
        r_end: base + 10,
        pid: 42,
        tid: 42,
        obj_id: obj.to_string(),
    }
}

fn marker(obj: &str, start: u64, end: u64, text: &str) -> MarkerRow {
    MarkerRow {
        obj_id: obj.to_string(),
        start,
        end,
        text: text.to_string(),
    }
}

#[test]
fn forward_and_backward_kernels_resolve_consistently() {
    let mut store = MemoryStore::new();

    // forward: an instrumented add at seq 5, launched twice (two kernels
    // cooperating on one logical op), then a relu at seq 6
    let add_marker = "{'mod': 'torch', 'op': 'add', 'args': [{'name': '', 'type': 'tensor', 'shape': (4, 4), 'dtype': 'float32'}, {'name': '', 'type': 'tensor', 'shape': (4, 4), 'dtype': 'float32'}]}";
    let relu_marker = "{'mod': 'torch.nn.functional', 'op': 'relu', 'args': [{'name': '', 'type': 'tensor', 'shape': (4, 4), 'dtype': 'float32'}]}";

    store.push_marker(marker("t0", 90, 1000, add_marker));
    store.push_marker(marker("t0", 95, 1000, "add, seq = 5"));
    store.push_kernel(kernel(1, 100, "t0"));

    store.push_marker(marker("t0", 1090, 2000, add_marker));
    store.push_marker(marker("t0", 1095, 2000, "add, seq = 5"));
    store.push_kernel(kernel(2, 1100, "t0"));

    store.push_marker(marker("t0", 2090, 3000, relu_marker));
    store.push_marker(marker("t0", 2095, 3000, "relu, seq = 6"));
    store.push_kernel(kernel(3, 2100, "t0"));

    // backward of the relu
    store.push_marker(marker("t0", 3090, 4000, "ReluBackward0, seq = 6"));
    store.push_kernel(kernel(4, 3100, "t0"));

    let mut correlator = Correlator::new();
    let records = correlator.correlate(&store).unwrap();
    assert_eq!(records.len(), 4);

    assert_eq!(records[0].direction(), Direction::Fprop);
    assert_eq!(records[0].op(), "add");
    assert_eq!(records[0].module(), "torch");
    assert_eq!(records[0].seq_id(), Some(5));
    assert_eq!(records[0].sub_seq_id, 0);

    // the repeat launch of the same logical op increments the sub-seq id
    assert_eq!(records[1].seq_id(), Some(5));
    assert_eq!(records[1].sub_seq_id, 1);

    // advancing to a larger sequence id resets the sub-seq id
    assert_eq!(records[2].op(), "relu");
    assert_eq!(records[2].seq_id(), Some(6));
    assert_eq!(records[2].sub_seq_id, 0);

    // backward kernel without an op marker resolves through the seq tier;
    // the Backward0 spelling flips the direction but is not sanitized
    assert_eq!(records[3].direction(), Direction::Bprop);
    assert_eq!(records[3].op(), "ReluBackward0");
    assert_eq!(records[3].module(), "na");
    assert_eq!(records[3].seq_id(), Some(6));
}

#[test]
fn markers_on_other_threads_are_ignored() {
    let mut store = MemoryStore::new();
    store.push_marker(marker("t1", 90, 1000, "add, seq = 5"));
    store.push_kernel(kernel(1, 100, "t0"));

    let mut correlator = Correlator::new();
    let records = correlator.correlate(&store).unwrap();
    assert!(records[0].markers.seq_markers.is_empty());
    assert_eq!(records[0].op(), "na");
}

#[test]
fn corrupt_timestamps_abort_the_pass() {
    let mut store = MemoryStore::new();
    let mut bad = kernel(1, 100, "t0");
    bad.end = bad.start; // zero-duration kernel: corrupt
    store.push_kernel(bad);

    let mut correlator = Correlator::new();
    assert!(correlator.correlate(&store).is_err());
}
