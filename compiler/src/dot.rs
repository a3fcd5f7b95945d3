// dot.rs — Graphviz DOT output for Beacon node graphs
//
// Renders the analyzed node graph with edges from each argument to its
// consumer. Fill color encodes axis dependency; buffered nodes get a double
// border. Nodes are split into a startup cluster and a per-frame cluster.
//
// Preconditions: `program` has been posted (deps and buffering are final).
// Postconditions: returns a DOT string; node order follows emission order.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::graph::{AxisDep, Node};
use crate::program::Program;

/// Emit the program graph as a Graphviz DOT string.
pub fn emit_dot(program: &Program) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "digraph beacon {{");
    let _ = writeln!(buf, "    rankdir=LR;");
    let _ = writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];");
    let _ = writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];");

    for (cluster, label, per_frame) in [("startup", "startup", false), ("frame", "beforeRender", true)] {
        let _ = writeln!(buf);
        let _ = writeln!(buf, "    subgraph cluster_{cluster} {{");
        let _ = writeln!(buf, "        label=\"{label}\";");
        let _ = writeln!(buf, "        style=rounded;");
        let _ = writeln!(buf, "        color=gray50;");
        for &id in program.order() {
            let node = program.node(id);
            if node.dep.has_time() == per_frame {
                let _ = writeln!(buf, "        n{} [{}];", id.0, node_attrs(node));
            }
        }
        let _ = writeln!(buf, "    }}");
    }

    let _ = writeln!(buf);
    for &id in program.order() {
        for (slot, child) in program.node(id).kind.children() {
            let _ = writeln!(buf, "    n{} -> n{} [label=\"{slot}\"];", child.0, id.0);
        }
    }

    let defs = program.definitions();
    if !defs.is_empty() {
        let _ = writeln!(buf);
        let _ = writeln!(buf, "    // definitions");
        for (i, def) in defs.iter().enumerate() {
            if !program.order().contains(&def.node) {
                continue;
            }
            let name = sanitize(&def.name);
            let _ = writeln!(
                buf,
                "    def{i}_{name} [shape=plaintext, label=\"{}\"];",
                def.name
            );
            let _ = writeln!(buf, "    def{i}_{name} -> n{} [style=dashed];", def.node.0);
        }
    }

    let _ = writeln!(buf, "}}");
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn dep_color(dep: AxisDep) -> &'static str {
    match (dep.has_time(), dep.has_space()) {
        (false, false) => "white",
        (true, false) => "lightblue",
        (false, true) => "lightyellow",
        (true, true) => "lightgreen",
    }
}

fn node_attrs(node: &Node) -> String {
    let shape = if node.kind.is_stateful() { "box3d" } else { "box" };
    let peripheries = if node.buffered { 2 } else { 1 };
    let mut label = format!("{}\\n{} {}", node.name, node.dim(), node.dep);
    for (k, v) in node.kind.literals() {
        let _ = write!(label, "\\n{k}={}", v.replace('"', "'"));
    }
    format!(
        "shape={shape}, style=filled, fillcolor={}, peripheries={peripheries}, label=\"{label}\"",
        dep_color(node.dep)
    )
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn build_and_emit(source: &str) -> String {
        let parsed = crate::parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let mut program = match crate::bind::bind(&parsed.forest) {
            Ok(p) => p,
            Err(e) => panic!("bind failed: {e}"),
        };
        if let Err(e) = program.post() {
            panic!("analysis failed: {e}");
        }
        emit_dot(&program)
    }

    #[test]
    fn valid_dot_structure() {
        let dot = build_and_emit("wave: sine");
        assert!(dot.starts_with("digraph beacon {"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains("subgraph cluster_startup {"));
        assert!(dot.contains("subgraph cluster_frame {"));
    }

    #[test]
    fn edges_point_from_argument_to_consumer() {
        let dot = build_and_emit("wave: sine");
        assert!(dot.contains("n0 -> n3 [label=\"min\"];"));
        assert!(dot.contains("n2 -> n3 [label=\"period\"];"));
    }

    #[test]
    fn buffered_and_dependency_styling() {
        let dot = build_and_emit("sum:\n  space: wave: triangle\n  time: wave: sqrdecay\n");
        assert!(dot.contains("fillcolor=lightgreen, peripheries=2"));
        assert!(dot.contains("fillcolor=lightyellow, peripheries=2"));
        assert!(dot.contains("fillcolor=lightblue, peripheries=2"));
        assert!(dot.contains("fillcolor=white, peripheries=1"));
    }

    #[test]
    fn stateful_nodes_use_box3d() {
        let dot = build_and_emit("pulser: 2");
        assert!(dot.contains("shape=box3d"));
    }

    #[test]
    fn reachable_definitions_are_labelled() {
        let dot = build_and_emit("glow = time: wave: sine\nunused = 0.5\nsum: glow, 0.1\n");
        assert!(dot.contains("def0_glow [shape=plaintext, label=\"glow\"];"));
        assert!(!dot.contains("unused"));
    }

    #[test]
    fn deterministic_output() {
        let source = "g = time: wave: sine\nsum: g, space: wave: triangle\n";
        assert_eq!(build_and_emit(source), build_and_emit(source));
    }
}
