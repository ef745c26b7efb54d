//! Graphviz `.dot` call-graph writer. No crate in the teacher or pack
//! renders `.dot` directly; this follows the same hand-built plain-text
//! exporter idiom as `text.rs` rather than pulling in a graph-rendering
//! crate for a format this simple.

use crate::arrow::ArrowKind;
use crate::metrics::TopologySnapshot;
use crate::topology::Topology;
use std::fmt::Write;

fn shape_for(kind: ArrowKind) -> &'static str {
    match kind {
        ArrowKind::Sink => "ellipse",
        ArrowKind::Stage => "box",
        ArrowKind::Source => "trapezium",
        ArrowKind::Unfolder | ArrowKind::Folder => "hexagon",
    }
}

/// Renders the topology's call graph: one node per arrow shaped by
/// category, one edge per downstream link labeled with call count,
/// cumulative time, and percentage of total CPU time.
pub fn render(topology: &Topology, snapshot: &TopologySnapshot) -> String {
    let mut out = String::new();
    writeln!(out, "digraph arrow_engine {{").unwrap();
    writeln!(out, "    rankdir=LR;").unwrap();

    for (name, kind, _parallel) in topology.arrow_names_and_kinds() {
        writeln!(
            out,
            "    \"{name}\" [shape={}];",
            shape_for(kind)
        )
        .unwrap();
    }

    let total_time: f64 = snapshot
        .arrows
        .iter()
        .map(|a| a.total_cpu_time.as_secs_f64())
        .sum();

    for (from, to) in topology.edges() {
        let from_name = &snapshot.arrows[from].name;
        let to_name = &snapshot.arrows[to].name;
        let calls = snapshot.arrows[from].shot_count;
        let time = snapshot.arrows[from].total_cpu_time.as_secs_f64();
        let pct = if total_time > 0.0 { 100.0 * time / total_time } else { 0.0 };
        writeln!(
            out,
            "    \"{from_name}\" -> \"{to_name}\" [label=\"calls={calls} time={time:.3}s ({pct:.1}%)\"];"
        )
        .unwrap();
    }

    writeln!(out, "}}").unwrap();
    out
}
