// program.rs — Bound program: root, definitions, analysis results, output
//
// The binder hands over the node arena, the render root and the definition
// table. `post` runs analysis and builds the stanzas; `write` assembles the
// Pixelblaze text from them.
//
// Preconditions: constructed by `bind` with every `NodeId` valid in the arena.
// Postconditions: after a successful `post`, `order` lists every reachable
//                 node children-first and `stanzas` holds one entry per
//                 buffered node in that order.
// Failure modes: `post` returns the first analysis diagnostic.
// Side effects: none.

use std::collections::HashSet;
use std::fmt::{self, Write};

use serde::Serialize;

use crate::analyze::analyze;
use crate::ast::Span;
use crate::codegen::{self, CodegenOptions, Generator};
use crate::diag::Diagnostic;
use crate::graph::{AxisDep, Dim, Implicit, Node, NodeArena};
use crate::id::NodeId;
use crate::stanza::Stanza;

/// A named top-level pattern.
#[derive(Debug, Clone)]
pub struct Definition {
    /// Name as written.
    pub name: String,
    /// Lowercased lookup key.
    pub key: String,
    pub node: NodeId,
    pub span: Span,
}

#[derive(Debug)]
pub struct Program {
    arena: NodeArena,
    root: NodeId,
    defs: Vec<Definition>,
    order: Vec<NodeId>,
    stanzas: Vec<Stanza>,
    posted: bool,
}

impl Program {
    pub fn new(arena: NodeArena, root: NodeId, defs: Vec<Definition>) -> Self {
        Program {
            arena,
            root,
            defs,
            order: Vec::new(),
            stanzas: Vec::new(),
            posted: false,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.arena[id]
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.defs
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Reachable nodes, children before parents. Empty before `post`.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn stanzas(&self) -> &[Stanza] {
        &self.stanzas
    }

    pub fn is_posted(&self) -> bool {
        self.posted
    }

    /// Buffered reachable nodes in emission order.
    pub fn buffered(&self) -> impl Iterator<Item = &Node> {
        self.order
            .iter()
            .map(|&id| &self.arena[id])
            .filter(|n| n.buffered)
    }

    /// Analyze the graph and build the stanzas. Idempotent.
    pub fn post(&mut self) -> Result<(), Diagnostic> {
        if self.posted {
            return Ok(());
        }
        self.order = analyze(&mut self.arena, self.root, &self.defs)?;
        self.stanzas = Generator::new(&self.arena).stanzas(&self.order);
        self.posted = true;
        Ok(())
    }

    pub fn write(&self, opts: &CodegenOptions, out: &mut impl Write) -> fmt::Result {
        codegen::write(self, opts, out)
    }

    /// Generated program as a string.
    pub fn render(&self, opts: &CodegenOptions) -> String {
        let mut out = String::new();
        // fmt::Write for String never fails
        let _ = self.write(opts, &mut out);
        out
    }

    /// Indented debug tree: one line per node with its context, dimension,
    /// dependency and buffering. Shared nodes are expanded once.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut seen = HashSet::new();
        for def in &self.defs {
            let _ = writeln!(out, "{} =", def.name);
            self.dump_node(def.node, "def", 1, &mut seen, &mut out);
        }
        let _ = writeln!(out, "start =");
        self.dump_node(self.root, "root", 1, &mut seen, &mut out);
        out
    }

    fn dump_node(
        &self,
        id: NodeId,
        slot: &str,
        depth: usize,
        seen: &mut HashSet<NodeId>,
        out: &mut String,
    ) {
        let pad = "  ".repeat(depth);
        let node = &self.arena[id];
        if !seen.insert(id) {
            let _ = writeln!(out, "{pad}{slot}: -> {}", node.name);
            return;
        }
        let dim = node.dim.map(|d| d.to_string()).unwrap_or_else(|| "?".into());
        let buf = if node.buffered { " (BUF)" } else { "" };
        let _ = writeln!(
            out,
            "{pad}{slot}: {} {} [{} {dim} {}]{buf}",
            node.name,
            node.keyword,
            node.ctx.letter(),
            node.dep
        );
        for (k, v) in node.kind.literals() {
            let _ = writeln!(out, "{pad}  {k} = {v}");
        }
        for (child_slot, child) in node.kind.children() {
            self.dump_node(child, child_slot, depth + 1, seen, out);
        }
    }

    /// Serializable node table for `--emit json`.
    pub fn report(&self) -> ProgramReport {
        let ids: Vec<NodeId> = if self.posted {
            self.order.clone()
        } else {
            self.arena.iter().map(|n| n.id).collect()
        };
        let nodes = ids
            .iter()
            .map(|&id| {
                let node = &self.arena[id];
                NodeReport {
                    id: id.0,
                    name: node.name.clone(),
                    keyword: node.keyword.name(),
                    ctx: node.ctx,
                    dim: node.dim,
                    dep: node.dep,
                    buffered: node.buffered,
                    args: node
                        .kind
                        .children()
                        .into_iter()
                        .map(|(slot, child)| ArgReport {
                            slot,
                            node: self.arena[child].name.clone(),
                        })
                        .collect(),
                    literals: node
                        .kind
                        .literals()
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                }
            })
            .collect();
        ProgramReport {
            root: self.arena[self.root].name.clone(),
            definitions: self
                .defs
                .iter()
                .map(|d| DefinitionReport {
                    name: d.name.clone(),
                    node: self.arena[d.node].name.clone(),
                })
                .collect(),
            nodes,
        }
    }
}

// ── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ProgramReport {
    pub root: String,
    pub definitions: Vec<DefinitionReport>,
    pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Serialize)]
pub struct DefinitionReport {
    pub name: String,
    pub node: String,
}

#[derive(Debug, Serialize)]
pub struct NodeReport {
    pub id: u32,
    pub name: String,
    pub keyword: &'static str,
    pub ctx: Implicit,
    pub dim: Option<Dim>,
    pub dep: AxisDep,
    pub buffered: bool,
    pub args: Vec<ArgReport>,
    pub literals: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
pub struct ArgReport {
    pub slot: &'static str,
    pub node: String,
}

// ── Tests ───────────────────────────────────────────────────────────────────
