//! Metrics/export plumbing: the output format of the core's own metrics
//! snapshot. The richer benchmarking harness and janadot plugin that
//! consume these files are out of scope per spec.md §1; the core ships
//! only the writers.

pub mod dot;
pub mod text;
