//! Trace-store contract and backends
//!
//! A trace store exposes the captured profiler data: the ordered kernel
//! launches and the markers that were active around each launch. The SQL
//! databases written by nvprof and Nsight are external collaborators that
//! implement this same contract; this crate ships an in-memory store and a
//! JSON-dump store built on it.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors surfaced by trace access and correlation
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The trace data is internally inconsistent and cannot be processed
    #[error("corrupt trace: kernel `{kernel}` (corrId {corr_id}): {detail}")]
    CorruptTrace {
        kernel: String,
        corr_id: u64,
        detail: String,
    },

    #[error("empty trace: no kernel, runtime or marker rows")]
    EmptyTrace,

    #[error("failed to read trace dump {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode trace dump {path}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One raw kernel launch row, schema-neutral across profiler backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelRow {
    /// Mangled kernel name
    pub name: String,
    /// Correlation id linking the kernel to its host-side launch
    pub correlation_id: u64,
    /// Device-side start/end timestamps (ns)
    pub start: u64,
    pub end: u64,
    pub device_id: u32,
    pub stream_id: u32,
    pub grid: (u64, u64, u64),
    pub block: (u64, u64, u64),
    /// Host-side (runtime) launch window (ns)
    pub r_start: u64,
    pub r_end: u64,
    pub pid: u32,
    pub tid: u32,
    /// Per-event global thread/process identifier used for marker lookup
    pub obj_id: String,
}

/// One marker row: a text range pushed on some thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerRow {
    pub obj_id: String,
    pub start: u64,
    pub end: u64,
    pub text: String,
}

/// Abstract contract over a captured trace
pub trait TraceStore {
    /// Earliest timestamp across kernel, runtime and marker rows
    fn profile_start(&self) -> Result<u64, TraceError>;

    /// Kernel rows in profiler emission order.
    ///
    /// The correlator's sequence-id state machine depends on this order;
    /// stores must not reorder rows.
    fn kernel_rows(&self) -> Result<Vec<KernelRow>, TraceError>;

    /// Texts of markers on `obj_id` whose range strictly encloses
    /// `[start, end]`, ordered by marker start ascending
    fn enclosing_markers(
        &self,
        obj_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<String>, TraceError>;
}

/// In-memory store, used by tests and library embedders
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    pub kernels: Vec<KernelRow>,
    pub markers: Vec<MarkerRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_kernel(&mut self, row: KernelRow) {
        self.kernels.push(row);
    }

    pub fn push_marker(&mut self, row: MarkerRow) {
        self.markers.push(row);
    }
}

impl TraceStore for MemoryStore {
    fn profile_start(&self) -> Result<u64, TraceError> {
        let kernel_times = self
            .kernels
            .iter()
            .flat_map(|k| [k.start, k.r_start]);
        let marker_times = self.markers.iter().map(|m| m.start);
        kernel_times
            .chain(marker_times)
            .min()
            .ok_or(TraceError::EmptyTrace)
    }

    fn kernel_rows(&self) -> Result<Vec<KernelRow>, TraceError> {
        Ok(self.kernels.clone())
    }

    fn enclosing_markers(
        &self,
        obj_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<String>, TraceError> {
        let mut rows: Vec<&MarkerRow> = self
            .markers
            .iter()
            .filter(|m| m.obj_id == obj_id && m.start < start && m.end > end)
            .collect();
        rows.sort_by_key(|m| m.start);
        Ok(rows.into_iter().map(|m| m.text.clone()).collect())
    }
}

/// Store backed by a JSON trace dump on disk.
///
/// The dump is the serialized `MemoryStore` layout: a `kernels` array and a
/// `markers` array.
#[derive(Debug)]
pub struct JsonStore {
    inner: MemoryStore,
}

impl JsonStore {
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path).map_err(|source| TraceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let inner = serde_json::from_str(&text).map_err(|source| TraceError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { inner })
    }

    pub fn kernel_count(&self) -> usize {
        self.inner.kernels.len()
    }
}

impl TraceStore for JsonStore {
    fn profile_start(&self) -> Result<u64, TraceError> {
        self.inner.profile_start()
    }

    fn kernel_rows(&self) -> Result<Vec<KernelRow>, TraceError> {
        self.inner.kernel_rows()
    }

    fn enclosing_markers(
        &self,
        obj_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<String>, TraceError> {
        self.inner.enclosing_markers(obj_id, start, end)
    }
}
