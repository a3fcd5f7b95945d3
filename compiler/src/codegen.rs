// codegen.rs — Pixelblaze code generation for Beacon programs
//
// Turns the analyzed node graph into one stanza per buffered node, then
// assembles declarations, helpers, the startup block, `beforeRender` and
// `render` into the final program text.
//
// Preconditions: `Program::post` succeeded (dims, deps, buffering and the
//                emission order are final).
// Postconditions: output is a pure function of the program; two runs over
//                 the same source produce identical text.
// Failure modes: none beyond `fmt::Error` from the sink.
// Side effects: none.

use std::fmt::{self, Write};

use tracing::trace;

use crate::ast::Component;
use crate::graph::{Dim, Implicit, Node, NodeArena, NodeKind};
use crate::id::NodeId;
use crate::program::Program;
use crate::pulser;
use crate::registry::WaveShape;
use crate::stanza::{Bottom, Stanza, Timebase};

// ── Public types ────────────────────────────────────────────────────────────

/// Optional decorations around the generated program.
#[derive(Debug, Clone, Default)]
pub struct CodegenOptions {
    /// Banner line, usually the source file name.
    pub header: Option<String>,
    /// Source text echoed as comments under the banner.
    pub source_lines: Option<Vec<String>>,
}

// ── Expression generation ───────────────────────────────────────────────────

pub struct Generator<'a> {
    arena: &'a NodeArena,
}

impl<'a> Generator<'a> {
    pub fn new(arena: &'a NodeArena) -> Self {
        Generator { arena }
    }

    pub fn node(&self, id: NodeId) -> &'a Node {
        &self.arena[id]
    }

    /// One stanza per buffered node, in emission order.
    pub fn stanzas(&self, order: &[NodeId]) -> Vec<Stanza> {
        order
            .iter()
            .filter(|&&id| self.arena[id].buffered)
            .map(|&id| {
                let st = self.stanza(id);
                trace!(node = %st.name, dep = %st.dep, dim = %st.dim, "stanza");
                st
            })
            .collect()
    }

    pub fn stanza(&self, id: NodeId) -> Stanza {
        let node = &self.arena[id];
        let mut st = Stanza::new(node);
        match &node.kind {
            NodeKind::Pulser(p) => {
                pulser::generate(self, &mut st, node, p);
                st.bottom = Bottom::Assign(vec!["0".to_string()]);
            }
            NodeKind::Shift { arg, velocity } => {
                self.shift(&mut st, node, *arg, *velocity, None);
            }
            NodeKind::ShiftDecay {
                arg,
                velocity,
                halflife,
            } => {
                self.shift(&mut st, node, *arg, *velocity, Some(*halflife));
            }
            _ => {
                let mut exprs = Vec::new();
                for comp in components(node.dim()) {
                    exprs.push(self.expr(&mut st, id, Timebase::Clock, comp));
                }
                st.bottom = Bottom::Assign(exprs);
            }
        }
        st
    }

    /// Value of `id` as seen from inside `st`: a buffer reference when the
    /// node is materialized elsewhere, otherwise its inline expression.
    pub fn data(
        &self,
        st: &mut Stanza,
        id: NodeId,
        tb: Timebase,
        comp: Option<Component>,
    ) -> String {
        let node = &self.arena[id];
        let comp = match node.dim() {
            Dim::One => None,
            Dim::Three => Some(comp.unwrap_or(Component::R)),
        };
        if node.buffered && id != st.node {
            return buffer_ref(node, comp);
        }
        self.expr(st, id, tb, comp)
    }

    fn expr(&self, st: &mut Stanza, id: NodeId, tb: Timebase, comp: Option<Component>) -> String {
        let node = &self.arena[id];
        let n = node.name.as_str();
        match &node.kind {
            NodeKind::Constant(v) => fmt_num(*v),
            NodeKind::Color(c) => fmt_num(c.channel(comp.unwrap_or(Component::R))),
            NodeKind::Quote(a) | NodeKind::Time(a) | NodeKind::Space(a) => {
                self.data(st, *a, tb, comp)
            }
            NodeKind::Linear { start, velocity } => {
                let p = implicit(node.ctx, tb);
                let s = self.data(st, *start, tb, None);
                let v = self.data(st, *velocity, tb, None);
                format!("({s} + {p} * {v})")
            }
            NodeKind::Changing { start, velocity } => self.changing(st, node, *start, *velocity, tb),
            NodeKind::RandFlat { min, max } => {
                let lo = self.data(st, *min, tb, None);
                let minv = st.store_val(n, "min", lo);
                let hi = self.data(st, *max, tb, None);
                let diff = st.store_val(n, "diff", format!("({hi}-{minv})"));
                st.store_val(n, "rand", format!("(random({diff})+{minv})"))
            }
            NodeKind::RandNorm { mean, stdev } => {
                let m = self.data(st, *mean, tb, None);
                let sd = self.data(st, *stdev, tb, None);
                st.store_val(
                    n,
                    "rand",
                    format!("(((random(1)+random(1)+random(1)-1.5)*{sd}/0.522)+{m})"),
                )
            }
            NodeKind::Noise { min, max, period } => {
                let p = implicit(node.ctx, tb);
                let lo = self.data(st, *min, tb, None);
                let minv = st.store_val(n, "min", lo);
                let hi = self.data(st, *max, tb, None);
                let diff = st.store_val(n, "diff", format!("({hi}-{minv})"));
                let per = self.data(st, *period, tb, None);
                format!("({minv}+{diff}*noise_lookup({n}_lattice, {p}/{per}))")
            }
            NodeKind::Clamp { arg, min, max } => {
                let a = self.data(st, *arg, tb, comp);
                let lo = self.data(st, *min, tb, comp);
                let hi = self.data(st, *max, tb, comp);
                format!("clamp({a}, {lo}, {hi})")
            }
            NodeKind::Lerp { weight, start, end } => {
                let w = self.data(st, *weight, tb, None);
                let s = self.data(st, *start, tb, comp);
                let e = self.data(st, *end, tb, comp);
                format!("mix({s}, {e}, {w})")
            }
            NodeKind::Sum(args) => {
                let parts = self.each(st, args, tb, comp);
                joined(parts, " + ")
            }
            NodeKind::Mul(args) => {
                let parts = self.each(st, args, tb, comp);
                joined(parts, " * ")
            }
            NodeKind::Mean(args) => {
                let count = args.len();
                let parts = self.each(st, args, tb, comp);
                if count == 1 {
                    joined(parts, " + ")
                } else {
                    format!("(({}) / {count})", parts.join(" + "))
                }
            }
            NodeKind::Max(args) => {
                let parts = self.each(st, args, tb, comp);
                nested("max", parts)
            }
            NodeKind::Min(args) => {
                let parts = self.each(st, args, tb, comp);
                nested("min", parts)
            }
            NodeKind::Mod { arg, divisor } => {
                let a = self.data(st, *arg, tb, comp);
                let d = self.data(st, *divisor, tb, comp);
                format!("mod({a}, {d})")
            }
            NodeKind::Wave {
                shape,
                min,
                max,
                period,
            } => self.wave(st, node, *shape, *min, *max, *period, tb),
            NodeKind::Rgb { r, g, b } => {
                let chan = match comp.unwrap_or(Component::R) {
                    Component::R => *r,
                    Component::G => *g,
                    Component::B => *b,
                };
                self.data(st, chan, tb, None)
            }
            NodeKind::Brightness(arg) => {
                let r = self.data(st, *arg, tb, Some(Component::R));
                let g = self.data(st, *arg, tb, Some(Component::G));
                let b = self.data(st, *arg, tb, Some(Component::B));
                format!("(0.299*{r} + 0.587*{g} + 0.114*{b})")
            }
            NodeKind::Channel { channel, arg } => self.data(st, *arg, tb, Some(*channel)),
            NodeKind::Gradient { arg, stops } => {
                let input = self.gradient_input(st, n, *arg, tb);
                let c = comp.unwrap_or(Component::R).suffix();
                format!("gradient_mix({n}_pos, {n}_{c}, {}, {input})", stops.len())
            }
            NodeKind::NGradient { arg, stops } => {
                let input = self.gradient_input(st, n, *arg, tb);
                format!("gradient_mix({n}_pos, {n}_val, {}, {input})", stops.len())
            }
            NodeKind::Decay { arg, halflife } => {
                let factor = match st.find_val(n, "factor") {
                    Some(f) => f,
                    None => {
                        let h = self.data(st, *halflife, tb, None);
                        st.store_val(n, "factor", format!("pow(0.5, dt/{h})"))
                    }
                };
                let a = self.data(st, *arg, tb, comp);
                let me = buffer_ref(node, comp);
                format!("max({a}, {me}*{factor})")
            }
            NodeKind::Diff(arg) => self.diff(st, node, *arg, tb, comp),
            // Instance-scoped kinds are always buffered and write their own
            // buffer from `stanza()`; seen from elsewhere they are a reference.
            NodeKind::Shift { .. } | NodeKind::ShiftDecay { .. } | NodeKind::Pulser(_) => {
                buffer_ref(node, comp)
            }
        }
    }

    fn each(
        &self,
        st: &mut Stanza,
        args: &[NodeId],
        tb: Timebase,
        comp: Option<Component>,
    ) -> Vec<String> {
        args.iter().map(|&a| self.data(st, a, tb, comp)).collect()
    }

    fn gradient_input(&self, st: &mut Stanza, n: &str, arg: NodeId, tb: Timebase) -> String {
        match st.find_val(n, "in") {
            Some(v) => v,
            None => {
                let a = self.data(st, arg, tb, None);
                st.store_val(n, "in", a)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn wave(
        &self,
        st: &mut Stanza,
        node: &Node,
        shape: WaveShape,
        min: NodeId,
        max: NodeId,
        period: NodeId,
        tb: Timebase,
    ) -> String {
        if matches!(shape, WaveShape::Flat | WaveShape::Square) {
            return self.data(st, max, tb, None);
        }
        let n = node.name.as_str();
        let p = implicit(node.ctx, tb);
        let per = self.data(st, period, tb, None);
        let theta = match node.ctx {
            Implicit::Time => format!("({p}/{per})"),
            Implicit::Space => format!("(({p}-0.5)/{per}+0.5)"),
        };
        let lo = self.data(st, min, tb, None);
        let minv = st.store_val(n, "min", lo);
        let hi = self.data(st, max, tb, None);
        let diff = st.store_val(n, "diff", format!("({hi}-{minv})"));
        let unit = match shape {
            WaveShape::Sawtooth => format!("mod({theta}, 1)"),
            WaveShape::SawDecay => format!("(1-mod({theta}, 1))"),
            WaveShape::SqrTooth => format!("pow(mod({theta}, 1), 2)"),
            WaveShape::SqrDecay => format!("pow(1-mod({theta}, 1), 2)"),
            WaveShape::Triangle => format!("triangle({theta})"),
            WaveShape::HalfSquare => format!("square({theta}, 0.5)"),
            WaveShape::Trapezoid => format!("clamp(2*triangle({theta}), 0, 1)"),
            WaveShape::Sine => format!("((1-cos(PI2*{theta}))*0.5)"),
            WaveShape::Flat | WaveShape::Square => "1".to_string(),
        };
        format!("({minv}+{diff}*{unit})")
    }

    fn changing(
        &self,
        st: &mut Stanza,
        node: &Node,
        start: NodeId,
        velocity: NodeId,
        tb: Timebase,
    ) -> String {
        let n = node.name.as_str();
        let s = self.data(st, start, tb, None);
        let v = self.data(st, velocity, tb, None);
        match node.ctx {
            Implicit::Time => {
                let idx = if node.dep.has_space() { "[ix]" } else { "" };
                st.trailing(format!("{n}_accum{idx} += {v} * dt"));
                format!("({s} + {n}_accum{idx})")
            }
            Implicit::Space => {
                st.before(format!("var {n}_run = 0"));
                st.trailing(format!("{n}_run += {v} / pixelCount"));
                format!("({s} + {n}_run)")
            }
        }
    }

    fn diff(
        &self,
        st: &mut Stanza,
        node: &Node,
        arg: NodeId,
        tb: Timebase,
        comp: Option<Component>,
    ) -> String {
        let n = node.name.as_str();
        let sfx = suffix(comp);
        let a = self.data(st, arg, tb, comp);
        let cur = st.store_val(n, &format!("cur{sfx}"), a);
        match node.ctx {
            Implicit::Time => {
                let idx = if node.dep.has_space() { "[ix]" } else { "" };
                let prev = format!("{n}_prev{sfx}{idx}");
                st.trailing(format!("{prev} = {cur}"));
                format!("(dt > 0 ? ({cur} - {prev}) / dt : 0)")
            }
            Implicit::Space => {
                let prev = format!("{n}_prev{sfx}");
                st.before(format!("var {prev} = 0"));
                st.trailing(format!("{prev} = {cur}"));
                format!("(ix > 0 ? ({cur} - {prev}) * pixelCount : 0)")
            }
        }
    }

    /// Conveyor update for `shift`/`shiftdecay`. Whole-pixel steps accumulate
    /// from a fractional offset; the input enters at the trailing edge.
    fn shift(
        &self,
        st: &mut Stanza,
        node: &Node,
        arg: NodeId,
        velocity: NodeId,
        halflife: Option<NodeId>,
    ) {
        let n = node.name.as_str();
        let comps = components(node.dim());
        let mut sub = Stanza::new(node);
        let vel = self.data(&mut sub, velocity, Timebase::Clock, None);
        let mut inputs = Vec::new();
        for &comp in &comps {
            let e = self.data(&mut sub, arg, Timebase::Clock, comp);
            inputs.push(sub.store_val(n, &format!("in{}", suffix(comp)), e));
        }
        let factor = halflife.map(|h| {
            let h = self.data(&mut sub, h, Timebase::Clock, None);
            sub.store_val(n, "factor", format!("pow(0.5, dt/{h})"))
        });
        sub.transfer(st, 0);

        let bufs: Vec<String> = comps
            .iter()
            .map(|&c| Stanza::buffer_var(n, node.dep, node.dim(), c))
            .collect();
        let moved = |buf: &str| match &factor {
            Some(f) => format!("{buf}[{n}_src]*{f}"),
            None => format!("{buf}[{n}_src]"),
        };

        st.after(format!("{n}_offset += {vel} * dt * pixelCount"));
        st.after(format!("var {n}_steps = trunc({n}_offset)"));
        st.after(format!("{n}_offset -= {n}_steps"));
        st.after(format!("if ({n}_steps >= 0) {{"));
        st.after("  for (var ix=pixelCount-1; ix>=0; ix--) {");
        st.after(format!("    var {n}_src = ix - {n}_steps"));
        for (buf, input) in bufs.iter().zip(&inputs) {
            st.after(format!(
                "    {buf}[ix] = ({n}_src >= 0 ? {} : {input})",
                moved(buf)
            ));
        }
        st.after("  }");
        st.after("} else {");
        st.after("  for (var ix=0; ix<pixelCount; ix++) {");
        st.after(format!("    var {n}_src = ix - {n}_steps"));
        for (buf, input) in bufs.iter().zip(&inputs) {
            st.after(format!(
                "    {buf}[ix] = ({n}_src < pixelCount ? {} : {input})",
                moved(buf)
            ));
        }
        st.after("  }");
        st.after("}");
        if factor.is_some() {
            st.after(format!(
                "var {n}_entry = ({n}_steps >= 0 ? 0 : pixelCount-1)"
            ));
            for (buf, input) in bufs.iter().zip(&inputs) {
                st.after(format!(
                    "{buf}[{n}_entry] = max({input}, {buf}[{n}_entry])"
                ));
            }
        }
        st.bottom = Bottom::Instead;
    }

    /// Kind-specific static state declared next to the stanza buffers.
    fn statics(&self, id: NodeId, out: &mut Vec<String>) {
        let node = &self.arena[id];
        let n = node.name.as_str();
        match &node.kind {
            NodeKind::Pulser(p) => pulser::statics(node, p, out),
            NodeKind::Gradient { stops, .. } => {
                let k = stops.len();
                out.push(format!("var {n}_pos = array({k})"));
                for c in Component::ALL {
                    out.push(format!("var {n}_{} = array({k})", c.suffix()));
                }
                for (i, stop) in stops.iter().enumerate() {
                    out.push(format!("{n}_pos[{i}] = {}", fmt_num(stop.pos)));
                    for c in Component::ALL {
                        out.push(format!(
                            "{n}_{}[{i}] = {}",
                            c.suffix(),
                            fmt_num(stop.color.channel(c))
                        ));
                    }
                }
            }
            NodeKind::NGradient { stops, .. } => {
                let k = stops.len();
                out.push(format!("var {n}_pos = array({k})"));
                out.push(format!("var {n}_val = array({k})"));
                for (i, stop) in stops.iter().enumerate() {
                    out.push(format!("{n}_pos[{i}] = {}", fmt_num(stop.pos)));
                    out.push(format!("{n}_val[{i}] = {}", fmt_num(stop.value)));
                }
            }
            NodeKind::Noise { .. } => {
                out.push(format!("var {n}_lattice = array({NOISE_LATTICE})"));
                out.push(format!(
                    "for (var i=0; i<{NOISE_LATTICE}; i++) {{ {n}_lattice[i] = random(1) }}"
                ));
            }
            NodeKind::Changing { .. } if node.ctx == Implicit::Time => {
                let init = if node.dep.has_space() {
                    "array(pixelCount)"
                } else {
                    "0"
                };
                out.push(format!("var {n}_accum = {init}"));
            }
            NodeKind::Diff(_) if node.ctx == Implicit::Time => {
                let init = if node.dep.has_space() {
                    "array(pixelCount)"
                } else {
                    "0"
                };
                for comp in components(node.dim()) {
                    out.push(format!("var {n}_prev{} = {init}", suffix(comp)));
                }
            }
            NodeKind::Shift { .. } | NodeKind::ShiftDecay { .. } => {
                out.push(format!("var {n}_offset = 0"));
            }
            _ => {}
        }
    }
}

// ── Helpers emitted into the output ─────────────────────────────────────────

const NOISE_LATTICE: usize = 16;

const GRADIENT_MIX: &str = "\
function gradient_mix(pos, vals, n, v) {
  if (v <= pos[0]) return vals[0]
  for (var i=1; i<n; i++) {
    if (v < pos[i]) {
      var t = (v - pos[i-1]) / (pos[i] - pos[i-1])
      return vals[i-1] + (vals[i] - vals[i-1]) * t
    }
  }
  return vals[n-1]
}
";

const NOISE_LOOKUP: &str = "\
function noise_lookup(lattice, x) {
  var i = floor(x)
  var f = x - i
  var a = lattice[mod(i, 16)]
  var b = lattice[mod(i + 1, 16)]
  return a + (b - a) * f * f * (3 - 2 * f)
}
";

/// Helper functions needed by the reachable nodes, each at most once.
fn helpers(arena: &NodeArena, order: &[NodeId]) -> Vec<&'static str> {
    let mut gradient = false;
    let mut noise = false;
    for &id in order {
        match arena[id].kind {
            NodeKind::Gradient { .. } | NodeKind::NGradient { .. } => gradient = true,
            NodeKind::Noise { .. } => noise = true,
            _ => {}
        }
    }
    let mut out = Vec::new();
    if gradient {
        out.push(GRADIENT_MIX);
    }
    if noise {
        out.push(NOISE_LOOKUP);
    }
    out
}

// ── Program assembly ────────────────────────────────────────────────────────

/// Write the complete Pixelblaze program.
pub fn write(program: &Program, opts: &CodegenOptions, out: &mut impl Write) -> fmt::Result {
    let arena = program.arena();
    let gen = Generator::new(arena);

    if let Some(header) = &opts.header {
        writeln!(out, "// {header}")?;
        if let Some(lines) = &opts.source_lines {
            for line in lines {
                writeln!(out, "// {line}")?;
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "var clock = 0   // seconds")?;
    writeln!(out, "var dt = 0   // seconds since last frame")?;
    writeln!(out)?;

    writeln!(out, "// stanza buffers:")?;
    for &id in program.order() {
        let node = &arena[id];
        if node.buffered {
            for comp in components(node.dim()) {
                let var = Stanza::buffer_var(&node.name, node.dep, node.dim(), comp);
                if node.dep.has_space() {
                    writeln!(out, "var {var} = array(pixelCount)")?;
                } else {
                    writeln!(out, "var {var}")?;
                }
            }
        }
        let mut statics = Vec::new();
        gen.statics(id, &mut statics);
        for line in statics {
            writeln!(out, "{line}")?;
        }
    }
    writeln!(out)?;

    let helpers = helpers(arena, program.order());
    if !helpers.is_empty() {
        writeln!(out, "// helpers:")?;
        for helper in helpers {
            writeln!(out, "{helper}")?;
        }
    }

    writeln!(out, "// startup calculations:")?;
    for st in program.stanzas().iter().filter(|s| !s.dep.has_time()) {
        st.print(out, 0)?;
    }
    writeln!(out)?;

    writeln!(out, "export function beforeRender(delta) {{")?;
    writeln!(out, "  dt = delta / 1000")?;
    writeln!(out, "  clock += dt")?;
    for st in program.stanzas().iter().filter(|s| s.dep.has_time()) {
        st.print(out, 1)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    let root = &arena[program.root()];
    let index = if root.dep.has_space() { "[index]" } else { "" };
    writeln!(out, "export function render(index) {{")?;
    match root.dim() {
        Dim::One => {
            let var = Stanza::buffer_var(&root.name, root.dep, Dim::One, None);
            writeln!(out, "  var val = {var}{index}")?;
            writeln!(out, "  rgb(val*val, val*val, val*val)")?;
        }
        Dim::Three => {
            for c in Component::ALL {
                let var = Stanza::buffer_var(&root.name, root.dep, Dim::Three, Some(c));
                writeln!(out, "  var val{} = {var}{index}", c.suffix())?;
            }
            writeln!(out, "  rgb(valr*valr, valg*valg, valb*valb)")?;
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}

// ── Formatting utilities ────────────────────────────────────────────────────

/// Numeric literal in target syntax; negatives are parenthesized so they
/// can be spliced after any operator.
pub fn fmt_num(v: f64) -> String {
    if v < 0.0 {
        format!("({v})")
    } else {
        format!("{v}")
    }
}

/// A unit-range sample of `shape` at `v` (in [0, 1]), for pulser envelopes.
pub fn wave_sample(shape: WaveShape, v: &str) -> String {
    match shape {
        WaveShape::Flat | WaveShape::Square => "1".to_string(),
        WaveShape::HalfSquare => format!("({v} < 0.5 ? 1 : 0)"),
        WaveShape::Sawtooth => v.to_string(),
        WaveShape::SawDecay => format!("(1-{v})"),
        WaveShape::SqrTooth => format!("{v}*{v}"),
        WaveShape::SqrDecay => format!("(1-{v})*(1-{v})"),
        WaveShape::Triangle => format!("triangle({v})"),
        WaveShape::Trapezoid => format!("clamp(2*triangle({v}), 0, 1)"),
        WaveShape::Sine => format!("sin({v}*PI)"),
    }
}

/// The implicit parameter of a context under a timebase.
pub(crate) fn implicit(ctx: Implicit, tb: Timebase) -> &'static str {
    match ctx {
        Implicit::Time => tb.var(),
        Implicit::Space => "(ix/pixelCount)",
    }
}

pub(crate) fn components(dim: Dim) -> Vec<Option<Component>> {
    match dim {
        Dim::One => vec![None],
        Dim::Three => Component::ALL.iter().map(|&c| Some(c)).collect(),
    }
}

fn suffix(comp: Option<Component>) -> String {
    comp.map(|c| format!("_{}", c.suffix())).unwrap_or_default()
}

fn buffer_ref(node: &Node, comp: Option<Component>) -> String {
    let var = Stanza::buffer_var(&node.name, node.dep, node.dim(), comp);
    if node.dep.has_space() {
        format!("{var}[ix]")
    } else {
        var
    }
}

fn joined(mut parts: Vec<String>, sep: &str) -> String {
    if parts.len() == 1 {
        return parts.remove(0);
    }
    format!("({})", parts.join(sep))
}

fn nested(func: &str, parts: Vec<String>) -> String {
    let mut rev = parts.into_iter().rev();
    let last = rev.next().unwrap_or_else(|| "0".to_string());
    rev.fold(last, |acc, p| format!("{func}({p}, {acc})"))
}

// ── Tests ───────────────────────────────────────────────────────────────────
