//! Full pipeline over a JSON trace dump: correlate, cost, report fields

use kernelscope_cost::{registry, Record};
use kernelscope_trace::{Correlator, JsonStore, KernelRow, MarkerRow, MemoryStore, TraceStore};

fn kernel(corr: u64, base: u64) -> KernelRow {
    KernelRow {
        name: format!("kernel_{}", corr),
        correlation_id: corr,
        start: base + 20,
        end: base + 32,
        device_id: 0,
        stream_id: 7,
        grid: (84, 1, 1),
        block: (128, 1, 1),
        r_start: base,
        r_end: base + 10,
        pid: 42,
        tid: 42,
        obj_id: "t0".to_string(),
    }
}

fn marker(start: u64, end: u64, text: &str) -> MarkerRow {
    MarkerRow {
        obj_id: "t0".to_string(),
        start,
        end,
        text: text.to_string(),
    }
}

fn write_dump(store: &MemoryStore) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");
    std::fs::write(&path, serde_json::to_string(store).unwrap()).unwrap();
    dir
}

#[test]
fn add_kernel_end_to_end() {
    let mut store = MemoryStore::new();
    store.push_marker(marker(
        90,
        1000,
        "{'mod': 'torch', 'op': 'add', 'args': [{'name': '', 'type': 'tensor', 'shape': (4, 4), 'dtype': 'float32'}, {'name': '', 'type': 'tensor', 'shape': (4, 4), 'dtype': 'float32'}]}",
    ));
    store.push_kernel(kernel(1, 100));

    let dir = write_dump(&store);
    let loaded = JsonStore::open(&dir.path().join("trace.json")).unwrap();
    assert_eq!(loaded.kernel_rows().unwrap().len(), 1);

    let mut correlator = Correlator::new();
    let kernels = correlator.correlate(&loaded).unwrap();
    let cost = registry::dispatch(&kernels[0]);

    // fprop binary op: both input byte sizes plus the output byte size
    assert!(cost.supported);
    assert_eq!(cost.bytes, 2 * (4 * 4 * 4) + 4 * 4 * 4);
    assert_eq!(cost.flops, 16);

    let record = Record::new(&kernels[0], &cost);
    assert_eq!(record.direction, "fprop");
    assert_eq!(record.module, "torch");
    assert_eq!(record.operator, "add");
    assert_eq!(record.duration, 12);
    assert_eq!(record.grid, "84,1,1");
    assert_eq!(record.block, "128,1,1");
    assert_eq!(record.params, "[4,4]fp32;[4,4]fp32");
    assert_eq!(record.tc, "-");
}

#[test]
fn malformed_marker_survives_and_tags_unsupported() {
    let mut store = MemoryStore::new();
    // truncated dictionary literal: decodes as an unstructured marker
    store.push_marker(marker(90, 1000, "{'mod': 'torch', 'op': 'add', 'args': [{'type'"));
    store.push_kernel(kernel(1, 100));

    let dir = write_dump(&store);
    let loaded = JsonStore::open(&dir.path().join("trace.json")).unwrap();

    let mut correlator = Correlator::new();
    let kernels = correlator.correlate(&loaded).unwrap();
    assert_eq!(kernels.len(), 1);
    assert_eq!(kernels[0].module(), "na");

    let cost = registry::dispatch(&kernels[0]);
    assert!(!cost.supported);
    assert_eq!(cost.flops, 0);
    assert_eq!(cost.bytes, 0);
}

#[test]
fn unsupported_operator_is_tagged_but_carries_shapes() {
    let mut store = MemoryStore::new();
    store.push_marker(marker(
        90,
        1000,
        "{'mod': 'torch', 'op': 'bmm', 'args': [{'name': '', 'type': 'tensor', 'shape': (8, 4, 4), 'dtype': 'float16'}, {'name': '', 'type': 'tensor', 'shape': (8, 4, 4), 'dtype': 'float16'}]}",
    ));
    store.push_kernel(kernel(1, 100));

    let dir = write_dump(&store);
    let loaded = JsonStore::open(&dir.path().join("trace.json")).unwrap();

    let mut correlator = Correlator::new();
    let kernels = correlator.correlate(&loaded).unwrap();
    let cost = registry::dispatch(&kernels[0]);

    assert!(!cost.supported);
    assert_eq!(cost.operator, "bmm");
    assert_eq!(cost.flops, 0);
    assert!(cost.params.contains("(8,4,4)"));
}

#[test]
fn backward_kernel_direction_flows_into_cost() {
    let mut store = MemoryStore::new();
    store.push_marker(marker(
        90,
        1000,
        "{'mod': 'torch', 'op': 'add', 'args': [{'name': '', 'type': 'tensor', 'shape': (4, 4), 'dtype': 'float32'}, {'name': '', 'type': 'tensor', 'shape': (4, 4), 'dtype': 'float32'}]}",
    ));
    store.push_marker(marker(95, 1000, "AddBackward0, seq = 12"));
    store.push_kernel(kernel(1, 100));

    let dir = write_dump(&store);
    let loaded = JsonStore::open(&dir.path().join("trace.json")).unwrap();

    let mut correlator = Correlator::new();
    let kernels = correlator.correlate(&loaded).unwrap();
    assert_eq!(kernels[0].direction().to_string(), "bprop");

    // bprop add: gradients pass through, two output-sized writes, no flops
    let cost = registry::dispatch(&kernels[0]);
    assert_eq!(cost.bytes, 2 * 4 * 4 * 4);
    assert_eq!(cost.flops, 0);
}
