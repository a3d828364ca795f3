//! Kernel-name demangling
//!
//! Kernel names arrive as mangled C++ symbols. The long name is the full
//! demangled form; the short name strips template arguments and the usual
//! CUDA namespaces down to the bare kernel identifier used in reports.

use symbolic_common::Name;
use symbolic_demangle::{Demangle, DemangleOptions};

/// Demangle a C++ symbol; returns the input unchanged when it does not
/// demangle.
pub fn demangle(name: &str) -> String {
    Name::from(name)
        .try_demangle(DemangleOptions::complete())
        .into_owned()
}

/// Strip a demangled kernel name down to its short form.
pub fn short_name(long_name: &str) -> String {
    let head = long_name.split('<').next().unwrap_or(long_name);
    let head = head
        .replace("void ", "")
        .replace("at::", "")
        .replace("cuda::", "")
        .replace("native::", "")
        .replace("(anonymous namespace)::", "");
    head.split('(').next().unwrap_or(&head).to_string()
}
