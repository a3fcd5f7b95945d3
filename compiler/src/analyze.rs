// analyze.rs — Dependency, dimension, and buffering analysis
//
// One post-order walk from the root over the bound node DAG. Each distinct
// node is visited once; shared nodes (named definitions) are analyzed at
// their first use and reused afterwards.
//
// Preconditions: `arena` came from `bind`; every child id precedes its parent.
// Postconditions: every reachable node has `dep` and `dim` set and `buffered`
//                 decided; the returned order lists children before parents.
// Failure modes: dimension mismatches (E0300) and space-dependent instance
//                parameters (E0402) abort with a `Diagnostic`.
// Side effects: mutates `dim`, `dep`, `buffered`, and the root's `name`.

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::diag::{codes, Diagnostic};
use crate::graph::{AxisDep, Dim, NodeArena, NodeKind};
use crate::id::NodeId;
use crate::program::Definition;

/// Run the analysis pass. Returns the emission order of reachable nodes.
pub fn analyze(
    arena: &mut NodeArena,
    root: NodeId,
    defs: &[Definition],
) -> Result<Vec<NodeId>, Diagnostic> {
    let mut walk = Walk {
        arena,
        visited: HashSet::new(),
        order: Vec::new(),
    };
    walk.visit(root)?;
    let Walk {
        arena,
        visited,
        order,
    } = walk;

    let root_node = &mut arena[root];
    root_node.buffered = true;
    root_node.name = "root".to_string();

    for def in defs {
        if !visited.contains(&def.node) {
            warn!(name = %def.name, "definition is never used");
            continue;
        }
        let node = &mut arena[def.node];
        if !node.kind.is_constant() {
            node.buffered = true;
        }
    }

    debug!(
        reachable = order.len(),
        buffered = order.iter().filter(|&&id| arena[id].buffered).count(),
        "analysis complete"
    );
    Ok(order)
}

struct Walk<'a> {
    arena: &'a mut NodeArena,
    visited: HashSet<NodeId>,
    order: Vec<NodeId>,
}

impl Walk<'_> {
    fn visit(&mut self, id: NodeId) -> Result<(), Diagnostic> {
        if !self.visited.insert(id) {
            return Ok(());
        }
        let children = self.arena[id].kind.children();

        let mut subdeps = AxisDep::NONE;
        for &(_, child) in &children {
            self.visit(child)?;
            subdeps |= self.arena[child].dep;
        }

        let node = &self.arena[id];
        let dep = match &node.kind {
            NodeKind::Pulser(_) | NodeKind::Shift { .. } | NodeKind::ShiftDecay { .. } => {
                AxisDep::SPACETIME
            }
            NodeKind::Decay { .. } => AxisDep::TIME | subdeps,
            kind if kind.uses_implicit() => node.ctx.axis() | subdeps,
            _ => subdeps,
        };
        let stateful = node.kind.is_stateful();
        let instance_scoped = matches!(
            node.kind,
            NodeKind::Pulser(_) | NodeKind::Shift { .. } | NodeKind::ShiftDecay { .. }
        );
        let is_pulser = matches!(node.kind, NodeKind::Pulser(_));

        if instance_scoped {
            for &(slot, child) in &children {
                if self.arena[child].dep.has_space() {
                    let node = &self.arena[id];
                    return Err(Diagnostic::error(
                        codes::E0402,
                        self.arena[child].span,
                        format!("{} arg cannot be SPACE: {slot}", node.keyword),
                    )
                    .with_related(node.span, "in this node")
                    .with_hint("wrap the argument in `time:` or use a time-only expression"));
                }
            }
        }

        // Caching boundary: a child whose dependency differs from its
        // parent's is materialized once at its own granularity.
        if !is_pulser {
            for &(_, child) in &children {
                let c = &mut self.arena[child];
                if c.dep != dep && !c.kind.is_constant() && !c.buffered {
                    trace!(node = %c.name, dep = %c.dep, parent_dep = %dep, "buffering child");
                    c.buffered = true;
                }
            }
        }

        let dim = self.find_dim(id)?;
        let node = &mut self.arena[id];
        node.dep = dep;
        node.dim = Some(dim);
        if stateful {
            node.buffered = true;
        }
        trace!(node = %node.name, dep = %dep, dim = %dim, "analyzed node");
        self.order.push(id);
        Ok(())
    }

    fn dim_of(&self, id: NodeId) -> Dim {
        self.arena[id].dim()
    }

    /// Require a scalar in `slot`.
    fn expect_one(&self, owner: NodeId, slot: &str, child: NodeId) -> Result<(), Diagnostic> {
        if self.dim_of(child) == Dim::One {
            return Ok(());
        }
        let node = &self.arena[owner];
        Err(Diagnostic::error(
            codes::E0300,
            self.arena[child].span,
            format!(
                "{}: {slot} must be ONE, found {}",
                node.keyword,
                self.dim_of(child)
            ),
        )
        .with_related(node.span, "in this node")
        .with_hint("use `brightness:` or `red:`/`green:`/`blue:` to reduce a color"))
    }

    /// Require `child` to be scalar or to match `target`.
    fn expect_one_or(
        &self,
        owner: NodeId,
        slot: &str,
        child: NodeId,
        target: Dim,
    ) -> Result<(), Diagnostic> {
        let found = self.dim_of(child);
        if found == Dim::One || found == target {
            return Ok(());
        }
        let node = &self.arena[owner];
        Err(Diagnostic::error(
            codes::E0300,
            self.arena[child].span,
            format!("{}: {slot} must be ONE or {target}, found {found}", node.keyword),
        ))
    }

    fn expect_three(&self, owner: NodeId, child: NodeId) -> Result<(), Diagnostic> {
        if self.dim_of(child) == Dim::Three {
            return Ok(());
        }
        let node = &self.arena[owner];
        Err(Diagnostic::error(
            codes::E0300,
            self.arena[child].span,
            format!("{}: arg must be THREE, found ONE", node.keyword),
        ))
    }

    fn find_dim(&self, id: NodeId) -> Result<Dim, Diagnostic> {
        let kind = &self.arena[id].kind;
        let dim = match kind {
            NodeKind::Constant(_) => Dim::One,
            NodeKind::Color(_) => Dim::Three,
            NodeKind::Quote(a) | NodeKind::Time(a) | NodeKind::Space(a) | NodeKind::Diff(a) => {
                self.dim_of(*a)
            }
            NodeKind::Linear { .. }
            | NodeKind::Changing { .. }
            | NodeKind::RandFlat { .. }
            | NodeKind::RandNorm { .. }
            | NodeKind::Noise { .. }
            | NodeKind::Wave { .. }
            | NodeKind::Rgb { .. }
            | NodeKind::Pulser(_) => {
                for (slot, child) in kind.children() {
                    self.expect_one(id, slot, child)?;
                }
                if matches!(kind, NodeKind::Rgb { .. }) {
                    Dim::Three
                } else {
                    Dim::One
                }
            }
            NodeKind::Clamp { arg, min, max } => {
                let target = self.dim_of(*arg);
                self.expect_one_or(id, "min", *min, target)?;
                self.expect_one_or(id, "max", *max, target)?;
                target
            }
            NodeKind::Lerp { weight, start, end } => {
                self.expect_one(id, "weight", *weight)?;
                let target = self.dim_of(*start);
                if self.dim_of(*end) != target {
                    return Err(Diagnostic::error(
                        codes::E0300,
                        self.arena[*end].span,
                        format!(
                            "lerp: start and end must match, found {target} and {}",
                            self.dim_of(*end)
                        ),
                    ));
                }
                target
            }
            NodeKind::Sum(args)
            | NodeKind::Mean(args)
            | NodeKind::Mul(args)
            | NodeKind::Max(args)
            | NodeKind::Min(args) => args
                .iter()
                .map(|a| self.dim_of(*a))
                .max()
                .unwrap_or(Dim::One),
            NodeKind::Mod { arg, divisor } => {
                let target = self.dim_of(*arg);
                self.expect_one_or(id, "divisor", *divisor, target)?;
                target
            }
            NodeKind::Brightness(arg) | NodeKind::Channel { arg, .. } => {
                self.expect_three(id, *arg)?;
                Dim::One
            }
            NodeKind::Gradient { arg, .. } => {
                self.expect_one(id, "arg", *arg)?;
                Dim::Three
            }
            NodeKind::NGradient { arg, .. } => {
                self.expect_one(id, "arg", *arg)?;
                Dim::One
            }
            NodeKind::Decay { arg, halflife } => {
                self.expect_one(id, "halflife", *halflife)?;
                self.dim_of(*arg)
            }
            NodeKind::Shift { arg, velocity } => {
                self.expect_one(id, "velocity", *velocity)?;
                self.dim_of(*arg)
            }
            NodeKind::ShiftDecay {
                arg,
                velocity,
                halflife,
            } => {
                self.expect_one(id, "velocity", *velocity)?;
                self.expect_one(id, "halflife", *halflife)?;
                self.dim_of(*arg)
            }
        };
        Ok(dim)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
