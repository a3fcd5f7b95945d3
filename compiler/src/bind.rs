// bind.rs — Term forest → typed node graph
//
// Resolves every term against the definition table and the node-kind
// registry, fills each kind's formal parameters from the term's children,
// and pushes the resulting nodes into a `NodeArena`.
//
// Preconditions: `forest` came from a parse with no errors.
// Postconditions: returns a `Program` with exactly one root; definitions are
//                 bound before any later term can reference them, so the
//                 graph is acyclic.
// Failure modes: the first binding fault is returned as a `Diagnostic`
//                (codes E0200–E0209, E0400, E0401).
// Side effects: none.

use tracing::{debug, trace};

use crate::ast::{Atom, Rgb, Span, Term};
use crate::diag::{codes, Diagnostic};
use crate::graph::{
    ColorStop, Deferral, Implicit, InstanceArg, NodeArena, NodeKind, Pulser, ValueStop,
};
use crate::id::NodeId;
use crate::program::{Definition, Program};
use crate::registry::{ArgDefault, ArgFormat, ArgType, Keyword, Registry, WaveShape};

/// Bind a parsed forest into a program.
///
/// Every top-level term is bound in the SPACE context. Named terms become
/// definitions; the single un-named term is the render root.
pub fn bind(forest: &[Term]) -> Result<Program, Diagnostic> {
    let mut binder = Binder::new();
    let mut root: Option<(NodeId, Span)> = None;

    for term in forest {
        match &term.name {
            Some(name) => {
                let key = name.name.to_ascii_lowercase();
                if let Some(prev) = binder.defs.iter().find(|d| d.key == key) {
                    return Err(Diagnostic::error(
                        codes::E0201,
                        name.span,
                        format!("duplicate def: {}", name.name),
                    )
                    .with_related(prev.span, "first defined here")
                    .with_hint("definition names are case-insensitive"));
                }
                let node = binder.bind_term(term, Implicit::Space)?;
                debug!(name = %name.name, node = %binder.arena[node].name, "bound definition");
                binder.defs.push(Definition {
                    name: name.name.clone(),
                    key,
                    node,
                    span: name.span,
                });
            }
            None => {
                if let Some((_, first)) = root {
                    return Err(Diagnostic::error(
                        codes::E0401,
                        term.span,
                        "more than one start",
                    )
                    .with_related(first, "first un-named term here")
                    .with_hint("give all but one top-level term a name (`name = ...`)"));
                }
                let node = binder.bind_term(term, Implicit::Space)?;
                root = Some((node, term.span));
            }
        }
    }

    let Some((root, _)) = root else {
        let end = forest.last().map(|t| t.span.end).unwrap_or(0);
        return Err(Diagnostic::error(codes::E0400, (end..end).into(), "no root")
            .with_hint("add one un-named top-level term to render"));
    };

    debug!(nodes = binder.arena.len(), defs = binder.defs.len(), "binding complete");
    Ok(Program::new(binder.arena, root, binder.defs))
}

// ── Binder state ────────────────────────────────────────────────────────────

/// Largest integer argument (pulser slot count). Every slot costs a few
/// arrays of this length on the controller.
const MAX_INTEGER_ARG: f64 = 1024.0;

struct Binder {
    registry: Registry,
    arena: NodeArena,
    defs: Vec<Definition>,
}

/// A filled parameter value.
#[derive(Debug, Clone, Copy)]
enum Bound {
    Number(f64),
    Integer(u32),
    Color(Rgb),
    Shape(WaveShape),
    Node(NodeId),
}

/// Parameter values of one term, in format order.
struct Slots {
    keyword: Keyword,
    span: Span,
    formats: &'static [ArgFormat],
    values: Vec<Vec<Bound>>,
}

impl Binder {
    fn new() -> Self {
        Binder {
            registry: Registry::new(),
            arena: NodeArena::new(),
            defs: Vec::new(),
        }
    }

    fn lookup_def(&self, key: &str) -> Option<NodeId> {
        self.defs.iter().find(|d| d.key == key).map(|d| d.node)
    }

    /// Bind one term under context `ctx`.
    fn bind_term(&mut self, term: &Term, ctx: Implicit) -> Result<NodeId, Diagnostic> {
        let symbol = match &term.atom {
            Atom::Number(v) => {
                reject_args(term)?;
                return Ok(self.push(Keyword::Constant, NodeKind::Constant(*v), ctx, term.span));
            }
            Atom::Color(c) => {
                reject_args(term)?;
                return Ok(self.push(Keyword::Color, NodeKind::Color(*c), ctx, term.span));
            }
            Atom::Symbol(s) => s,
        };

        let key = symbol.to_ascii_lowercase();
        if let Some(node) = self.lookup_def(&key) {
            if !term.args.is_empty() {
                return Err(Diagnostic::error(
                    codes::E0203,
                    term.span,
                    format!("variable name cannot have args: {key}"),
                ));
            }
            return Ok(node);
        }

        let keyword = self.registry.lookup(&key).ok_or_else(|| {
            Diagnostic::error(codes::E0200, term.span, format!("unknown term: {key}"))
        })?;

        match keyword {
            Keyword::Gradient | Keyword::NGradient => self.bind_gradient(keyword, term, ctx),
            Keyword::Stop | Keyword::NStop => Err(Diagnostic::error(
                codes::E0207,
                term.span,
                format!("{keyword} is only valid inside {}", stop_parent(keyword)),
            )),
            Keyword::Quote => Err(Diagnostic::error(
                codes::E0207,
                term.span,
                "quote is only valid as a pulser pos, width, or duration",
            )),
            _ => {
                let id = self.arena.reserve(keyword, ctx, term.span);
                let slots = self.fill(keyword, term, ctx)?;
                let kind = self.build(&slots)?;
                Ok(self.complete(id, kind))
            }
        }
    }

    fn push(&mut self, keyword: Keyword, kind: NodeKind, ctx: Implicit, span: Span) -> NodeId {
        let id = self.arena.push(keyword, kind, ctx, span);
        trace!(node = %self.arena[id].name, ctx = ?ctx, "bound node");
        id
    }

    fn complete(&mut self, id: NodeId, kind: NodeKind) -> NodeId {
        self.arena.complete(id, kind);
        trace!(node = %self.arena[id].name, ctx = ?self.arena[id].ctx, "bound node");
        id
    }

    // ── Argument filling ────────────────────────────────────────────────────

    /// Fill `keyword`'s formal parameters from `term.args`.
    ///
    /// Named arguments bind their slot directly. A positional argument takes
    /// the first unfilled slot, or the last variadic slot once every slot
    /// has a value. Missing optional slots receive their defaults.
    fn fill(&mut self, keyword: Keyword, term: &Term, ctx: Implicit) -> Result<Slots, Diagnostic> {
        let formats = keyword.formats();
        let mut values: Vec<Vec<Bound>> = vec![Vec::new(); formats.len()];

        for arg in &term.args {
            let slot = match &arg.name {
                Some(name) => {
                    let wanted = name.name.to_ascii_lowercase();
                    formats.iter().position(|f| f.name == wanted).ok_or_else(|| {
                        Diagnostic::error(
                            codes::E0206,
                            name.span,
                            format!("{keyword}: unknown arg: {}", name.name),
                        )
                        .with_hint(format!(
                            "expected one of: {}",
                            formats.iter().map(|f| f.name).collect::<Vec<_>>().join(", ")
                        ))
                    })?
                }
                None => {
                    let mut pos = 0;
                    let mut last_multiple = None;
                    while pos < formats.len() {
                        if values[pos].is_empty() {
                            break;
                        }
                        if formats[pos].multiple {
                            last_multiple = Some(pos);
                        }
                        pos += 1;
                    }
                    if pos < formats.len() {
                        pos
                    } else {
                        last_multiple.ok_or_else(|| {
                            Diagnostic::error(
                                codes::E0204,
                                arg.span,
                                format!("{keyword}: too many arguments"),
                            )
                        })?
                    }
                }
            };

            let format = &formats[slot];
            if !format.multiple && !values[slot].is_empty() {
                return Err(Diagnostic::error(
                    codes::E0205,
                    arg.span,
                    format!("{keyword}: duplicate arg: {}", format.name),
                ));
            }
            let value = self.bind_slot(keyword, format, arg, ctx)?;
            values[slot].push(value);
        }

        for (format, slot) in formats.iter().zip(values.iter_mut()) {
            if !slot.is_empty() {
                continue;
            }
            match format.default {
                Some(ArgDefault::Number(v)) => {
                    // Defaults are time-independent constants.
                    let node = self.push(
                        Keyword::Constant,
                        NodeKind::Constant(v),
                        Implicit::Time,
                        term.span,
                    );
                    slot.push(Bound::Node(node));
                }
                Some(ArgDefault::Shape(shape)) => slot.push(Bound::Shape(shape)),
                None if format.multiple => {
                    return Err(Diagnostic::error(
                        codes::E0208,
                        term.span,
                        format!("{keyword}: needs at least one {}", format.name),
                    ));
                }
                None => {
                    return Err(Diagnostic::error(
                        codes::E0208,
                        term.span,
                        format!("{keyword}: missing arg: {}", format.name),
                    ));
                }
            }
        }

        Ok(Slots {
            keyword,
            span: term.span,
            formats,
            values,
        })
    }

    /// Check one argument against its slot type and bind it.
    fn bind_slot(
        &mut self,
        keyword: Keyword,
        format: &ArgFormat,
        arg: &Term,
        ctx: Implicit,
    ) -> Result<Bound, Diagnostic> {
        let wrong = |what: &str| {
            Diagnostic::error(
                codes::E0202,
                arg.span,
                format!("{keyword}: {} must be {what}", format.name),
            )
        };
        match format.ty {
            ArgType::Number => match arg.atom {
                Atom::Number(v) => Ok(Bound::Number(v)),
                _ => Err(wrong("numeric")),
            },
            ArgType::Integer => match arg.atom {
                Atom::Number(v) if (1.0..=MAX_INTEGER_ARG).contains(&v) => {
                    Ok(Bound::Integer(v.trunc() as u32))
                }
                Atom::Number(v) if v > MAX_INTEGER_ARG => Err(wrong("a positive integer")
                    .with_hint(format!("at most {MAX_INTEGER_ARG} is supported, got {v}"))),
                _ => Err(wrong("a positive integer")),
            },
            ArgType::Color => match arg.atom {
                Atom::Color(c) => Ok(Bound::Color(c)),
                _ => Err(wrong("a color")),
            },
            ArgType::Shape => match &arg.atom {
                Atom::Symbol(s) => WaveShape::from_name(s)
                    .map(Bound::Shape)
                    .ok_or_else(|| {
                        wrong("a wave shape").with_hint(format!(
                            "known shapes: {}",
                            WaveShape::ALL.map(|s| s.name()).join(", ")
                        ))
                    }),
                _ => Err(wrong("a wave shape")),
            },
            ArgType::Node | ArgType::Time | ArgType::Space => {
                let child_ctx = format.ty.forced_context().unwrap_or(ctx);
                if format.deferrable && self.is_quote(arg) {
                    return self.bind_quote(arg, child_ctx).map(Bound::Node);
                }
                self.bind_term(arg, child_ctx).map(Bound::Node)
            }
        }
    }

    fn is_quote(&self, term: &Term) -> bool {
        match term.keyword() {
            Some(key) => {
                self.lookup_def(&key).is_none() && self.registry.lookup(&key) == Some(Keyword::Quote)
            }
            None => false,
        }
    }

    fn bind_quote(&mut self, term: &Term, ctx: Implicit) -> Result<NodeId, Diagnostic> {
        let id = self.arena.reserve(Keyword::Quote, ctx, term.span);
        let slots = self.fill(Keyword::Quote, term, ctx)?;
        let inner = slots.node("arg")?;
        Ok(self.complete(id, NodeKind::Quote(inner)))
    }

    // ── Kind construction ───────────────────────────────────────────────────

    fn build(&self, s: &Slots) -> Result<NodeKind, Diagnostic> {
        let kind = match s.keyword {
            Keyword::Constant => NodeKind::Constant(s.number("value")?),
            Keyword::Color => NodeKind::Color(s.color("value")?),
            Keyword::Time => NodeKind::Time(s.node("arg")?),
            Keyword::Space => NodeKind::Space(s.node("arg")?),
            Keyword::Linear => NodeKind::Linear {
                start: s.node("start")?,
                velocity: s.node("velocity")?,
            },
            Keyword::Changing => NodeKind::Changing {
                start: s.node("start")?,
                velocity: s.node("velocity")?,
            },
            Keyword::RandFlat => NodeKind::RandFlat {
                min: s.node("min")?,
                max: s.node("max")?,
            },
            Keyword::RandNorm => NodeKind::RandNorm {
                mean: s.node("mean")?,
                stdev: s.node("stdev")?,
            },
            Keyword::Noise => NodeKind::Noise {
                min: s.node("min")?,
                max: s.node("max")?,
                period: s.node("period")?,
            },
            Keyword::Clamp => NodeKind::Clamp {
                arg: s.node("arg")?,
                min: s.node("min")?,
                max: s.node("max")?,
            },
            Keyword::Lerp => NodeKind::Lerp {
                weight: s.node("weight")?,
                start: s.node("start")?,
                end: s.node("end")?,
            },
            Keyword::Sum => NodeKind::Sum(s.nodes("arg")?),
            Keyword::Mean => NodeKind::Mean(s.nodes("arg")?),
            Keyword::Mul => NodeKind::Mul(s.nodes("arg")?),
            Keyword::Max => NodeKind::Max(s.nodes("arg")?),
            Keyword::Min => NodeKind::Min(s.nodes("arg")?),
            Keyword::Mod => NodeKind::Mod {
                arg: s.node("arg")?,
                divisor: s.node("divisor")?,
            },
            Keyword::Wave => NodeKind::Wave {
                shape: s.shape("shape")?,
                min: s.node("min")?,
                max: s.node("max")?,
                period: s.node("period")?,
            },
            Keyword::Rgb => NodeKind::Rgb {
                r: s.node("r")?,
                g: s.node("g")?,
                b: s.node("b")?,
            },
            Keyword::Brightness => NodeKind::Brightness(s.node("arg")?),
            Keyword::Red => NodeKind::Channel {
                channel: crate::ast::Component::R,
                arg: s.node("arg")?,
            },
            Keyword::Green => NodeKind::Channel {
                channel: crate::ast::Component::G,
                arg: s.node("arg")?,
            },
            Keyword::Blue => NodeKind::Channel {
                channel: crate::ast::Component::B,
                arg: s.node("arg")?,
            },
            Keyword::Decay => NodeKind::Decay {
                arg: s.node("arg")?,
                halflife: s.node("halflife")?,
            },
            Keyword::Diff => NodeKind::Diff(s.node("arg")?),
            Keyword::Shift => NodeKind::Shift {
                arg: s.node("arg")?,
                velocity: s.node("velocity")?,
            },
            Keyword::ShiftDecay => NodeKind::ShiftDecay {
                arg: s.node("arg")?,
                velocity: s.node("velocity")?,
                halflife: s.node("halflife")?,
            },
            Keyword::Pulser => NodeKind::Pulser(Box::new(Pulser {
                maxcount: s.integer("maxcount")?,
                spaceshape: s.shape("spaceshape")?,
                timeshape: s.shape("timeshape")?,
                interval: s.node("interval")?,
                pos: self.instance_arg(s.node("pos")?),
                duration: self.instance_arg(s.node("duration")?),
                width: self.instance_arg(s.node("width")?),
            })),
            Keyword::Quote
            | Keyword::Gradient
            | Keyword::NGradient
            | Keyword::Stop
            | Keyword::NStop => {
                return Err(Diagnostic::error(
                    codes::E0207,
                    s.span,
                    format!("{} cannot be bound here", s.keyword),
                ))
            }
        };
        Ok(kind)
    }

    /// Classify a pulser parameter: quoted and constant arguments are
    /// evaluated in place; anything else is sampled at spawn.
    fn instance_arg(&self, node: NodeId) -> InstanceArg {
        let deferral = match &self.arena[node].kind {
            NodeKind::Quote(inner) => Deferral::Quoted { inner: *inner },
            NodeKind::Constant(_) => Deferral::Constant,
            _ => Deferral::Stored,
        };
        InstanceArg { node, deferral }
    }

    // ── Gradients ───────────────────────────────────────────────────────────

    /// `gradient`/`ngradient`: children are stop leaves plus exactly one
    /// input expression. Stops are kept sorted by position.
    fn bind_gradient(
        &mut self,
        keyword: Keyword,
        term: &Term,
        ctx: Implicit,
    ) -> Result<NodeId, Diagnostic> {
        let own_stop = if keyword == Keyword::Gradient {
            Keyword::Stop
        } else {
            Keyword::NStop
        };
        let id = self.arena.reserve(keyword, ctx, term.span);
        let mut color_stops = Vec::new();
        let mut value_stops = Vec::new();
        let mut inputs = Vec::new();

        for arg in &term.args {
            if let Some(name) = &arg.name {
                return Err(Diagnostic::error(
                    codes::E0206,
                    name.span,
                    format!("{keyword}: unknown arg: {}", name.name),
                ));
            }
            let leaf = arg
                .keyword()
                .filter(|key| self.lookup_def(key).is_none())
                .and_then(|key| self.registry.lookup(&key))
                .filter(|k| k.is_gradient_leaf());
            match leaf {
                Some(k) if k == own_stop => {
                    let slots = self.fill(k, arg, ctx)?;
                    let pos = slots.number("pos")?;
                    if k == Keyword::Stop {
                        color_stops.push(ColorStop {
                            pos,
                            color: slots.color("color")?,
                        });
                    } else {
                        value_stops.push(ValueStop {
                            pos,
                            value: slots.number("value")?,
                        });
                    }
                }
                Some(k) => {
                    return Err(Diagnostic::error(
                        codes::E0207,
                        arg.span,
                        format!("{k} is only valid inside {}", stop_parent(k)),
                    ))
                }
                None => inputs.push(self.bind_term(arg, ctx)?),
            }
        }

        let stop_count = color_stops.len() + value_stops.len();
        if stop_count == 0 {
            return Err(Diagnostic::error(
                codes::E0209,
                term.span,
                format!("{keyword}: needs at least one {own_stop}"),
            ));
        }
        let [arg] = inputs[..] else {
            return Err(Diagnostic::error(
                codes::E0209,
                term.span,
                format!(
                    "{keyword}: takes exactly one input expression, found {}",
                    inputs.len()
                ),
            ));
        };

        color_stops.sort_by(|a, b| a.pos.total_cmp(&b.pos));
        value_stops.sort_by(|a, b| a.pos.total_cmp(&b.pos));
        let kind = if keyword == Keyword::Gradient {
            NodeKind::Gradient {
                arg,
                stops: color_stops,
            }
        } else {
            NodeKind::NGradient {
                arg,
                stops: value_stops,
            }
        };
        Ok(self.complete(id, kind))
    }
}

// ── Slot accessors ──────────────────────────────────────────────────────────

impl Slots {
    fn values(&self, name: &str) -> Result<&[Bound], Diagnostic> {
        self.formats
            .iter()
            .position(|f| f.name == name)
            .map(|i| self.values[i].as_slice())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Diagnostic::error(
                    codes::E0208,
                    self.span,
                    format!("{}: missing arg: {name}", self.keyword),
                )
            })
    }

    fn single(&self, name: &str) -> Result<Bound, Diagnostic> {
        self.values(name).map(|v| v[0])
    }

    fn mismatch(&self, name: &str, what: &str) -> Diagnostic {
        Diagnostic::error(
            codes::E0202,
            self.span,
            format!("{}: {name} must be {what}", self.keyword),
        )
    }

    fn node(&self, name: &str) -> Result<NodeId, Diagnostic> {
        match self.single(name)? {
            Bound::Node(id) => Ok(id),
            _ => Err(self.mismatch(name, "an expression")),
        }
    }

    fn nodes(&self, name: &str) -> Result<Vec<NodeId>, Diagnostic> {
        self.values(name)?
            .iter()
            .map(|b| match b {
                Bound::Node(id) => Ok(*id),
                _ => Err(self.mismatch(name, "an expression")),
            })
            .collect()
    }

    fn number(&self, name: &str) -> Result<f64, Diagnostic> {
        match self.single(name)? {
            Bound::Number(v) => Ok(v),
            _ => Err(self.mismatch(name, "numeric")),
        }
    }

    fn integer(&self, name: &str) -> Result<u32, Diagnostic> {
        match self.single(name)? {
            Bound::Integer(v) => Ok(v),
            _ => Err(self.mismatch(name, "a positive integer")),
        }
    }

    fn color(&self, name: &str) -> Result<Rgb, Diagnostic> {
        match self.single(name)? {
            Bound::Color(c) => Ok(c),
            _ => Err(self.mismatch(name, "a color")),
        }
    }

    fn shape(&self, name: &str) -> Result<WaveShape, Diagnostic> {
        match self.single(name)? {
            Bound::Shape(s) => Ok(s),
            _ => Err(self.mismatch(name, "a wave shape")),
        }
    }
}

fn reject_args(term: &Term) -> Result<(), Diagnostic> {
    if term.args.is_empty() {
        Ok(())
    } else {
        Err(Diagnostic::error(
            codes::E0102,
            term.span,
            format!("{} cannot have args", term.atom),
        ))
    }
}

fn stop_parent(leaf: Keyword) -> &'static str {
    if leaf == Keyword::Stop {
        "gradient"
    } else {
        "ngradient"
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn bind_src(src: &str) -> Result<Program, Diagnostic> {
        let parsed = parse(src);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        bind(&parsed.forest)
    }

    fn bind_ok(src: &str) -> Program {
        match bind_src(src) {
            Ok(p) => p,
            Err(e) => panic!("bind failed: {e}"),
        }
    }

    fn bind_err(src: &str) -> &'static str {
        match bind_src(src) {
            Ok(_) => panic!("expected bind error for {src:?}"),
            Err(e) => e.code.map(|c| c.0).unwrap_or("none"),
        }
    }

    #[test]
    fn number_root_is_constant() {
        let p = bind_ok("0.5");
        assert_eq!(p.node(p.root()).kind, NodeKind::Constant(0.5));
        assert_eq!(p.node(p.root()).ctx, Implicit::Space);
    }

    #[test]
    fn wave_defaults_fill_constants() {
        let p = bind_ok("wave: sine");
        let NodeKind::Wave {
            shape, min, max, period,
        } = &p.node(p.root()).kind
        else {
            panic!("expected wave");
        };
        assert_eq!(*shape, WaveShape::Sine);
        assert_eq!(p.node(*min).kind, NodeKind::Constant(0.0));
        assert_eq!(p.node(*max).kind, NodeKind::Constant(1.0));
        assert_eq!(p.node(*period).kind, NodeKind::Constant(1.0));
    }

    #[test]
    fn parents_are_numbered_before_children() {
        let p = bind_ok("time: wave: sine");
        assert_eq!(p.root(), NodeId(0));
        let NodeKind::Time(inner) = p.node(p.root()).kind else {
            panic!("expected time");
        };
        assert_eq!(inner, NodeId(1));
        assert_eq!(p.node(inner).name, "wave_1");
        let NodeKind::Wave { min, max, period, .. } = &p.node(inner).kind else {
            panic!("expected wave");
        };
        assert_eq!([*min, *max, *period], [NodeId(2), NodeId(3), NodeId(4)]);
    }

    #[test]
    fn explicit_arguments_are_numbered_before_defaults() {
        let p = bind_ok("pulser: 3\n  pos=quote: randflat: 0.2, 0.8\n");
        let NodeKind::Pulser(pulser) = &p.node(p.root()).kind else {
            panic!("expected pulser");
        };
        assert_eq!(p.node(pulser.pos.node).name, "quote_1");
        let Deferral::Quoted { inner } = pulser.pos.deferral else {
            panic!("pos should be quoted");
        };
        assert_eq!(p.node(inner).name, "randflat_2");
        assert_eq!(p.node(pulser.interval).name, "constant_5");
        assert_eq!(p.node(pulser.width.node).name, "constant_7");
    }

    #[test]
    fn named_and_positional_mix() {
        let p = bind_ok("wave: triangle, period=4, 0.2");
        let NodeKind::Wave { min, period, .. } = &p.node(p.root()).kind else {
            panic!("expected wave");
        };
        // positional 0.2 takes the first unfilled slot (min)
        assert_eq!(p.node(*min).kind, NodeKind::Constant(0.2));
        assert_eq!(p.node(*period).kind, NodeKind::Constant(4.0));
    }

    #[test]
    fn forced_time_context() {
        let p = bind_ok("time: wave: sine");
        let NodeKind::Time(inner) = p.node(p.root()).kind else {
            panic!("expected time");
        };
        assert_eq!(p.node(inner).ctx, Implicit::Time);
    }

    #[test]
    fn node_slots_inherit_context() {
        let p = bind_ok("time: sum: wave: sine, 1");
        let NodeKind::Time(sum) = p.node(p.root()).kind else {
            panic!("expected time");
        };
        let NodeKind::Sum(args) = &p.node(sum).kind else {
            panic!("expected sum");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(p.node(args[0]).ctx, Implicit::Time);
    }

    #[test]
    fn variadic_slot_collects_overflow() {
        let p = bind_ok("sum: 1, 2, 3");
        let NodeKind::Sum(args) = &p.node(p.root()).kind else {
            panic!("expected sum");
        };
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn definitions_are_shared_and_case_insensitive() {
        let p = bind_ok("Glow = wave: sine\nsum: glow, GLOW\n");
        let NodeKind::Sum(args) = &p.node(p.root()).kind else {
            panic!("expected sum");
        };
        assert_eq!(args[0], args[1]);
        assert_eq!(p.definitions()[0].name, "Glow");
    }

    #[test]
    fn red_green_blue_extract_channels() {
        let p = bind_ok("green: $0f0");
        assert!(matches!(
            p.node(p.root()).kind,
            NodeKind::Channel {
                channel: crate::ast::Component::G,
                ..
            }
        ));
    }

    #[test]
    fn gradient_stops_sorted() {
        let p = bind_ok("gradient:\n  stop: 1, $00f\n  stop: 0, $f00\n  stop: 0.5, $0f0\n  space: linear: 0, 1\n");
        let NodeKind::Gradient { stops, .. } = &p.node(p.root()).kind else {
            panic!("expected gradient");
        };
        let positions: Vec<f64> = stops.iter().map(|s| s.pos).collect();
        assert_eq!(positions, vec![0.0, 0.5, 1.0]);
        assert_eq!(stops[0].color.r, 1.0);
    }

    #[test]
    fn ngradient_value_stops() {
        let p = bind_ok("ngradient:\n  nstop: 0.8, 1\n  nstop: 0.2, 0\n  linear: 0, 1\n");
        let NodeKind::NGradient { stops, .. } = &p.node(p.root()).kind else {
            panic!("expected ngradient");
        };
        assert_eq!(stops[0].pos, 0.2);
        assert_eq!(stops[1].value, 1.0);
    }

    #[test]
    fn pulser_defaults_and_deferral() {
        let p = bind_ok("pulser: 3\n  pos=quote: randflat: 0.2, 0.8\n  width=randflat: 0.1, 0.3\n");
        let NodeKind::Pulser(pulser) = &p.node(p.root()).kind else {
            panic!("expected pulser");
        };
        assert_eq!(pulser.maxcount, 3);
        assert_eq!(pulser.spaceshape, WaveShape::Triangle);
        assert_eq!(pulser.timeshape, WaveShape::SqrDecay);
        assert!(matches!(pulser.pos.deferral, Deferral::Quoted { .. }));
        assert_eq!(pulser.duration.deferral, Deferral::Constant);
        assert_eq!(pulser.width.deferral, Deferral::Stored);
        assert_eq!(p.node(pulser.width.node).keyword, Keyword::RandFlat);
    }

    #[test]
    fn unknown_keyword() {
        assert_eq!(bind_err("wavy: sine"), "E0200");
    }

    #[test]
    fn duplicate_definition_ignores_case() {
        assert_eq!(bind_err("a = 1\nA = 2\n0.5\n"), "E0201");
    }

    #[test]
    fn wrong_token_types() {
        assert_eq!(bind_err("constant: sine"), "E0202");
        assert_eq!(bind_err("color: 1"), "E0202");
        assert_eq!(bind_err("wave: 3"), "E0202");
        assert_eq!(bind_err("wave: zigzag"), "E0202");
        assert_eq!(bind_err("pulser: 0"), "E0202");
    }

    #[test]
    fn pulser_count_is_bounded() {
        let p = bind_ok("pulser: 1024");
        let NodeKind::Pulser(pulser) = &p.node(p.root()).kind else {
            panic!("expected pulser");
        };
        assert_eq!(pulser.maxcount, 1024);
        assert_eq!(bind_err("pulser: 1025"), "E0202");
        assert_eq!(bind_err("pulser: 99999999999999"), "E0202");
    }

    #[test]
    fn named_reference_with_args() {
        assert_eq!(bind_err("g = wave: sine\ng: 1\n"), "E0203");
    }

    #[test]
    fn too_many_arguments() {
        assert_eq!(bind_err("randflat: 0, 1, 2"), "E0204");
    }

    #[test]
    fn duplicate_argument() {
        assert_eq!(bind_err("wave: sine, min=0, min=1"), "E0205");
    }

    #[test]
    fn unknown_argument_name() {
        assert_eq!(bind_err("wave: sine, speed=2"), "E0206");
    }

    #[test]
    fn structural_misuse() {
        assert_eq!(bind_err("stop: 0, $fff"), "E0207");
        assert_eq!(bind_err("quote: 1"), "E0207");
        assert_eq!(bind_err("clamp: quote: 1"), "E0207");
        assert_eq!(
            bind_err("gradient:\n  nstop: 0, 1\n  linear: 0, 1\n"),
            "E0207"
        );
    }

    #[test]
    fn missing_required_argument() {
        assert_eq!(bind_err("linear: 0"), "E0208");
        assert_eq!(bind_err("sum"), "E0208");
    }

    #[test]
    fn gradient_shape_errors() {
        assert_eq!(bind_err("gradient: linear: 0, 1"), "E0209");
        assert_eq!(
            bind_err("gradient:\n  stop: 0, $000\n  linear: 0, 1\n  linear: 1, 0\n"),
            "E0209"
        );
    }

    #[test]
    fn root_count() {
        assert_eq!(bind_err("a = 1\n"), "E0400");
        assert_eq!(bind_err("1\n2\n"), "E0401");
    }
}
