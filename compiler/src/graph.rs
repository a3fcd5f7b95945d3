// graph.rs — Node graph for Beacon programs
//
// The binder produces an arena of typed nodes; edges are the `NodeId`s held
// inside each `NodeKind`. A named definition is one node shared by every use
// site, so the graph is a DAG rather than a tree.
//
// Preconditions: nodes are pushed children-first; every `NodeId` stored in a
//                `NodeKind` refers to an earlier arena slot.
// Postconditions: `children()` enumerates sub-nodes in slot order.
// Failure modes: none (data-only module; analysis fills `dim`/`dep`/`buffered`).
// Side effects: none.

use std::fmt;
use std::ops::{BitOr, BitOrAssign, Index, IndexMut};

use serde::Serialize;

use crate::ast::{Component, Rgb, Span};
use crate::id::{IdAllocator, NodeId};
use crate::registry::{Keyword, WaveShape};

// ── Analysis lattices ───────────────────────────────────────────────────────

/// Evaluation context a node was bound under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Implicit {
    Time,
    Space,
}

impl Implicit {
    /// The axis this context contributes when its implicit slot is consumed.
    pub fn axis(self) -> AxisDep {
        match self {
            Implicit::Time => AxisDep::TIME,
            Implicit::Space => AxisDep::SPACE,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Implicit::Time => 'T',
            Implicit::Space => 'S',
        }
    }
}

/// Value shape: scalar or three-channel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Dim {
    #[serde(rename = "ONE")]
    One,
    #[serde(rename = "THREE")]
    Three,
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::One => f.write_str("ONE"),
            Dim::Three => f.write_str("THREE"),
        }
    }
}

/// Axis dependency bit set: which of TIME and SPACE a value varies with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AxisDep(u8);

impl AxisDep {
    pub const NONE: AxisDep = AxisDep(0);
    pub const TIME: AxisDep = AxisDep(1);
    pub const SPACE: AxisDep = AxisDep(2);
    pub const SPACETIME: AxisDep = AxisDep(3);

    pub fn contains(self, other: AxisDep) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn has_time(self) -> bool {
        self.contains(AxisDep::TIME)
    }

    pub fn has_space(self) -> bool {
        self.contains(AxisDep::SPACE)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "NONE",
            1 => "TIME",
            2 => "SPACE",
            _ => "SPACETIME",
        }
    }
}

impl BitOr for AxisDep {
    type Output = AxisDep;
    fn bitor(self, rhs: AxisDep) -> AxisDep {
        AxisDep(self.0 | rhs.0)
    }
}

impl BitOrAssign for AxisDep {
    fn bitor_assign(&mut self, rhs: AxisDep) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for AxisDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for AxisDep {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ── Node kinds ──────────────────────────────────────────────────────────────

/// One gradient stop: a color at a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub pos: f64,
    pub color: Rgb,
}

/// One ngradient stop: a value at a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueStop {
    pub pos: f64,
    pub value: f64,
}

/// How a pulser parameter is evaluated for each instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    /// The whole argument expression is sampled once at spawn and stored
    /// per slot.
    Stored,
    /// Re-evaluated every frame against the instance's age.
    Quoted { inner: NodeId },
    /// A constant: inlined, never stored.
    Constant,
}

/// A per-instance pulser parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceArg {
    /// The bound argument (a `quote` node when quoted).
    pub node: NodeId,
    pub deferral: Deferral,
}

impl InstanceArg {
    pub fn is_stored(&self) -> bool {
        self.deferral == Deferral::Stored
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pulser {
    pub maxcount: u32,
    pub spaceshape: WaveShape,
    pub timeshape: WaveShape,
    pub interval: NodeId,
    pub pos: InstanceArg,
    pub duration: InstanceArg,
    pub width: InstanceArg,
}

/// Closed set of node variants.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Constant(f64),
    Color(Rgb),
    Quote(NodeId),
    Time(NodeId),
    Space(NodeId),
    Linear { start: NodeId, velocity: NodeId },
    Changing { start: NodeId, velocity: NodeId },
    RandFlat { min: NodeId, max: NodeId },
    RandNorm { mean: NodeId, stdev: NodeId },
    Noise { min: NodeId, max: NodeId, period: NodeId },
    Clamp { arg: NodeId, min: NodeId, max: NodeId },
    Lerp { weight: NodeId, start: NodeId, end: NodeId },
    Sum(Vec<NodeId>),
    Mean(Vec<NodeId>),
    Mul(Vec<NodeId>),
    Max(Vec<NodeId>),
    Min(Vec<NodeId>),
    Mod { arg: NodeId, divisor: NodeId },
    Wave { shape: WaveShape, min: NodeId, max: NodeId, period: NodeId },
    Rgb { r: NodeId, g: NodeId, b: NodeId },
    Brightness(NodeId),
    Channel { channel: Component, arg: NodeId },
    Gradient { arg: NodeId, stops: Vec<ColorStop> },
    NGradient { arg: NodeId, stops: Vec<ValueStop> },
    Decay { arg: NodeId, halflife: NodeId },
    Diff(NodeId),
    Shift { arg: NodeId, velocity: NodeId },
    ShiftDecay { arg: NodeId, velocity: NodeId, halflife: NodeId },
    Pulser(Box<Pulser>),
}

impl NodeKind {
    /// Sub-nodes with the slot name they occupy, in slot order.
    pub fn children(&self) -> Vec<(&'static str, NodeId)> {
        match self {
            NodeKind::Constant(_) | NodeKind::Color(_) => vec![],
            NodeKind::Quote(a)
            | NodeKind::Time(a)
            | NodeKind::Space(a)
            | NodeKind::Brightness(a)
            | NodeKind::Diff(a) => vec![("arg", *a)],
            NodeKind::Linear { start, velocity } | NodeKind::Changing { start, velocity } => {
                vec![("start", *start), ("velocity", *velocity)]
            }
            NodeKind::RandFlat { min, max } => vec![("min", *min), ("max", *max)],
            NodeKind::RandNorm { mean, stdev } => vec![("mean", *mean), ("stdev", *stdev)],
            NodeKind::Noise { min, max, period } | NodeKind::Wave { min, max, period, .. } => {
                vec![("min", *min), ("max", *max), ("period", *period)]
            }
            NodeKind::Clamp { arg, min, max } => vec![("arg", *arg), ("min", *min), ("max", *max)],
            NodeKind::Lerp { weight, start, end } => {
                vec![("weight", *weight), ("start", *start), ("end", *end)]
            }
            NodeKind::Sum(args)
            | NodeKind::Mean(args)
            | NodeKind::Mul(args)
            | NodeKind::Max(args)
            | NodeKind::Min(args) => args.iter().map(|a| ("arg", *a)).collect(),
            NodeKind::Mod { arg, divisor } => vec![("arg", *arg), ("divisor", *divisor)],
            NodeKind::Rgb { r, g, b } => vec![("r", *r), ("g", *g), ("b", *b)],
            NodeKind::Channel { arg, .. }
            | NodeKind::Gradient { arg, .. }
            | NodeKind::NGradient { arg, .. } => vec![("arg", *arg)],
            NodeKind::Decay { arg, halflife } => vec![("arg", *arg), ("halflife", *halflife)],
            NodeKind::Shift { arg, velocity } => vec![("arg", *arg), ("velocity", *velocity)],
            NodeKind::ShiftDecay {
                arg,
                velocity,
                halflife,
            } => vec![
                ("arg", *arg),
                ("velocity", *velocity),
                ("halflife", *halflife),
            ],
            NodeKind::Pulser(p) => vec![
                ("interval", p.interval),
                ("pos", p.pos.node),
                ("duration", p.duration.node),
                ("width", p.width.node),
            ],
        }
    }

    /// Whether the node reads its context's implicit parameter (the clock in
    /// TIME, the strip position in SPACE).
    pub fn uses_implicit(&self) -> bool {
        matches!(
            self,
            NodeKind::Linear { .. }
                | NodeKind::Changing { .. }
                | NodeKind::RandFlat { .. }
                | NodeKind::RandNorm { .. }
                | NodeKind::Noise { .. }
                | NodeKind::Wave { .. }
                | NodeKind::Diff(_)
        )
    }

    /// Whether the node carries state from one evaluation to the next.
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            NodeKind::Changing { .. }
                | NodeKind::Decay { .. }
                | NodeKind::Diff(_)
                | NodeKind::Shift { .. }
                | NodeKind::ShiftDecay { .. }
                | NodeKind::Pulser(_)
        )
    }

    pub fn constant_value(&self) -> Option<f64> {
        match self {
            NodeKind::Constant(v) => Some(*v),
            _ => None,
        }
    }

    /// Literal values (numbers and colors) are inlined, never buffered.
    pub fn is_constant(&self) -> bool {
        matches!(self, NodeKind::Constant(_) | NodeKind::Color(_))
    }

    /// Literal (non-node) parameters, for dumps.
    pub fn literals(&self) -> Vec<(&'static str, String)> {
        match self {
            NodeKind::Constant(v) => vec![("value", format!("{v:?}"))],
            NodeKind::Color(c) => vec![("value", format!("({:?}, {:?}, {:?})", c.r, c.g, c.b))],
            NodeKind::Wave { shape, .. } => vec![("shape", shape.to_string())],
            NodeKind::Channel { channel, .. } => vec![("channel", channel.suffix().to_string())],
            NodeKind::Gradient { stops, .. } => stops
                .iter()
                .map(|s| ("stop", format!("{:?}: ({:?}, {:?}, {:?})", s.pos, s.color.r, s.color.g, s.color.b)))
                .collect(),
            NodeKind::NGradient { stops, .. } => stops
                .iter()
                .map(|s| ("nstop", format!("{:?}: {:?}", s.pos, s.value)))
                .collect(),
            NodeKind::Pulser(p) => vec![
                ("maxcount", p.maxcount.to_string()),
                ("spaceshape", p.spaceshape.to_string()),
                ("timeshape", p.timeshape.to_string()),
            ],
            _ => vec![],
        }
    }
}

// ── Nodes ───────────────────────────────────────────────────────────────────

/// A bound node.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub keyword: Keyword,
    pub kind: NodeKind,
    /// Context the node was bound under.
    pub ctx: Implicit,
    pub span: Span,
    /// Variable prefix in generated code: `<keyword>_<n>`, or `root`.
    pub name: String,
    // Filled by analysis.
    pub dim: Option<Dim>,
    pub dep: AxisDep,
    pub buffered: bool,
}

impl Node {
    /// Dimension after analysis; ONE before it.
    pub fn dim(&self) -> Dim {
        self.dim.unwrap_or(Dim::One)
    }
}

/// Arena of bound nodes, indexed by `NodeId`.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    ids: IdAllocator,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; its id is its construction-order index.
    pub fn push(&mut self, keyword: Keyword, kind: NodeKind, ctx: Implicit, span: Span) -> NodeId {
        let id = self.ids.alloc();
        self.nodes.push(Node {
            id,
            keyword,
            kind,
            ctx,
            span,
            name: format!("{}_{}", keyword.name(), id.0),
            dim: None,
            dep: AxisDep::NONE,
            buffered: false,
        });
        id
    }

    /// Take the next id for a node whose arguments are not bound yet, so a
    /// parent is numbered before its children. The node reads as a zero
    /// constant until [`NodeArena::complete`] supplies its kind.
    pub fn reserve(&mut self, keyword: Keyword, ctx: Implicit, span: Span) -> NodeId {
        self.push(keyword, NodeKind::Constant(0.0), ctx, span)
    }

    pub fn complete(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }
}

impl Index<NodeId> for NodeArena {
    type Output = Node;
    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
