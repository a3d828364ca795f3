//! Trace access and kernel-to-operation correlation
//!
//! This crate turns a captured profiler trace into correlated kernel
//! records: it defines the abstract trace-store contract (kernel rows plus
//! temporally-enclosing markers), groups each kernel's markers by kind, and
//! runs the stateful correlation pass that assigns direction, operator and
//! sequence ids to every kernel.

pub mod correlate;
pub mod demangle;
pub mod markers;
pub mod store;

pub use correlate::Correlator;
pub use store::{JsonStore, KernelRow, MarkerRow, MemoryStore, TraceError, TraceStore};
