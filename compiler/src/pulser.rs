// pulser.rs — Slot scheduler code generation for `pulser`
//
// A pulser owns a fixed table of instance slots. Each frame it may spawn one
// instance into a free slot, then walks the live slots: retire the expired
// ones, and splat the rest into the shared output vector as a time envelope
// times a space envelope.
//
// Preconditions: analysis rejected SPACE-dependent arguments; the node is
//                buffered with TIME+SPACE dependency.
// Postconditions: the stanza clears the output vector (its bottom) and the
//                 `after` lines accumulate every live instance into it.
// Failure modes: none.
// Side effects: none.

use crate::codegen::{fmt_num, wave_sample, Generator};
use crate::graph::{Deferral, InstanceArg, Node, NodeKind, Pulser};
use crate::id::NodeId;
use crate::registry::WaveShape;
use crate::stanza::{Stanza, Timebase};

/// Static slot tables declared alongside the stanza buffers.
pub(crate) fn statics(node: &Node, p: &Pulser, out: &mut Vec<String>) {
    let n = node.name.as_str();
    let max = p.maxcount;
    out.push(format!("var {n}_live = array({max})"));
    out.push(format!("var {n}_birth = array({max})"));
    out.push(format!("var {n}_livecount = 0"));
    out.push(format!("var {n}_nextstart = 0"));
    for (slot, arg) in instance_args(p) {
        if arg.is_stored() {
            out.push(format!("var {n}_arg_{slot} = array({max})"));
        }
    }
}

pub(crate) fn generate(gen: &Generator<'_>, st: &mut Stanza, node: &Node, p: &Pulser) {
    spawn(gen, st, node, p);
    update(gen, st, node, p);
}

fn instance_args(p: &Pulser) -> [(&'static str, &InstanceArg); 3] {
    [("pos", &p.pos), ("duration", &p.duration), ("width", &p.width)]
}

// ── Spawning ────────────────────────────────────────────────────────────────

fn spawn(gen: &Generator<'_>, st: &mut Stanza, node: &Node, p: &Pulser) {
    let n = node.name.as_str();
    let max = p.maxcount;
    st.after(format!(
        "if (clock >= {n}_nextstart && {n}_livecount < {max}) {{"
    ));
    st.after("  var slot = -1");
    st.after(format!("  for (var px=0; px<{max}; px++) {{"));
    st.after(format!("    if (!{n}_live[px]) {{ slot = px; break }}"));
    st.after("  }");
    st.after("  if (slot >= 0) {");
    st.after(format!("    {n}_live[slot] = 1"));
    st.after(format!("    {n}_livecount += 1"));
    for (slot, arg) in instance_args(p) {
        if arg.is_stored() {
            let value = sample(gen, st, node, arg.node, 2);
            st.after(format!("    {n}_arg_{slot}[slot] = {value}"));
        }
    }
    let interval = sample(gen, st, node, p.interval, 2);
    st.after(format!("    {n}_nextstart = clock + {interval}"));
    st.after(format!("    {n}_birth[slot] = clock"));
    st.after("  }");
    st.after("}");
}

/// Evaluate `arg` once against the global clock, hoisting its locals into
/// `st` at `indent`.
fn sample(gen: &Generator<'_>, st: &mut Stanza, node: &Node, arg: NodeId, indent: usize) -> String {
    let mut sub = Stanza::new(node);
    let value = gen.data(&mut sub, arg, Timebase::Clock, None);
    sub.transfer(st, indent);
    value
}

// ── Per-frame update ────────────────────────────────────────────────────────

fn update(gen: &Generator<'_>, st: &mut Stanza, node: &Node, p: &Pulser) {
    let n = node.name.as_str();
    let vec = Stanza::buffer_var(n, node.dep, node.dim(), None);
    st.after(format!("for (var px=0; px<{}; px++) {{", p.maxcount));
    st.after(format!("  if (!{n}_live[px]) {{ continue }}"));
    st.after(format!("  var age = clock - {n}_birth[px]"));
    let dur = instance_value(gen, st, node, "duration", &p.duration);
    st.after(format!("  var relage = age / {dur}"));
    retire(st, n, "relage > 1");
    st.after(format!(
        "  var timeval = {}",
        wave_sample(p.timeshape, "relage")
    ));
    let pos = instance_value(gen, st, node, "pos", &p.pos);
    st.after(format!("  var ppos = {pos}"));
    let width = instance_value(gen, st, node, "width", &p.width);
    st.after(format!("  var pwidth = {width}"));

    match monotonic_direction(gen, p) {
        Some(Direction::Rising) => retire(st, n, "ppos - pwidth/2 >= 1"),
        Some(Direction::Falling) => retire(st, n, "ppos + pwidth/2 <= 0"),
        None => {}
    }

    if p.spaceshape == WaveShape::Flat {
        st.after("  var minpos = 0");
        st.after("  var maxpos = pixelCount");
    } else {
        st.after("  var minpos = max(0, ceil(pixelCount*(ppos-pwidth/2)))");
        st.after("  var maxpos = min(pixelCount, pixelCount*(ppos+pwidth/2))");
    }
    st.after("  if (minpos >= maxpos) { continue }");
    st.after("  for (var ix=minpos; ix<maxpos; ix++) {");
    if p.spaceshape == WaveShape::Flat {
        st.after("    var spaceval = 1");
    } else {
        st.after("    var relpos = ((ix/pixelCount)-(ppos-pwidth/2)) / pwidth");
        st.after(format!(
            "    var spaceval = {}",
            wave_sample(p.spaceshape, "relpos")
        ));
    }
    st.after(format!("    {vec}[ix] += timeval * spaceval"));
    st.after("  }");
    st.after("}");
}

fn retire(st: &mut Stanza, n: &str, cond: &str) {
    st.after(format!("  if ({cond}) {{"));
    st.after(format!("    {n}_live[px] = 0"));
    st.after(format!("    {n}_livecount -= 1"));
    st.after("    continue");
    st.after("  }");
}

/// Value of an instance parameter inside the slot loop: the stored sample,
/// an inlined constant, or the quoted expression re-evaluated on `age`.
fn instance_value(
    gen: &Generator<'_>,
    st: &mut Stanza,
    node: &Node,
    slot: &str,
    arg: &InstanceArg,
) -> String {
    match &arg.deferral {
        Deferral::Stored => format!("{}_arg_{slot}[px]", node.name),
        Deferral::Constant => match gen.node(arg.node).kind.constant_value() {
            Some(v) => fmt_num(v),
            None => sample(gen, st, node, arg.node, 1),
        },
        Deferral::Quoted { inner } => {
            let mut sub = Stanza::new(node);
            let value = gen.data(&mut sub, *inner, Timebase::Age, None);
            sub.transfer(st, 1);
            value
        }
    }
}

// ── Early retirement ────────────────────────────────────────────────────────

enum Direction {
    Rising,
    Falling,
}

/// A quoted `linear` position with a constant non-zero velocity moves one
/// way forever; once it leaves the strip it never comes back. Only holds
/// when the width cannot change over the instance's life.
fn monotonic_direction(gen: &Generator<'_>, p: &Pulser) -> Option<Direction> {
    let Deferral::Quoted { inner } = &p.pos.deferral else {
        return None;
    };
    if matches!(p.width.deferral, Deferral::Quoted { .. }) {
        return None;
    }
    let mut id = *inner;
    while let NodeKind::Time(a) = &gen.node(id).kind {
        id = *a;
    }
    let NodeKind::Linear { velocity, .. } = &gen.node(id).kind else {
        return None;
    };
    let v = gen.node(*velocity).kind.constant_value()?;
    if v > 0.0 {
        Some(Direction::Rising)
    } else if v < 0.0 {
        Some(Direction::Falling)
    } else {
        None
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::codegen::CodegenOptions;

    fn generate(src: &str) -> String {
        match crate::compile(src, &CodegenOptions::default()) {
            Ok(code) => code,
            Err(e) => panic!("compile failed: {e}"),
        }
    }

    #[test]
    fn slot_tables_declared() {
        let code = generate("pulser: 4");
        for line in [
            "var root_live = array(4)",
            "var root_birth = array(4)",
            "var root_livecount = 0",
            "var root_nextstart = 0",
        ] {
            assert!(code.contains(line), "missing {line:?} in\n{code}");
        }
        // all defaults are constants: nothing stored per slot
        assert!(!code.contains("root_arg_"));
    }

    #[test]
    fn output_cleared_then_accumulated() {
        let code = generate("pulser: 4");
        assert!(code.contains("    root_vector[ix] = (0)\n"));
        assert!(code.contains("root_vector[ix] += timeval * spaceval"));
        let clear = code.find("root_vector[ix] = (0)");
        let add = code.find("root_vector[ix] += timeval");
        assert!(matches!((clear, add), (Some(a), Some(b)) if a < b));
    }

    #[test]
    fn default_shapes_and_constants_inline() {
        let code = generate("pulser: 4");
        assert!(code.contains("  var relage = age / 1\n"));
        assert!(code.contains("  var timeval = (1-relage)*(1-relage)\n"));
        assert!(code.contains("  var ppos = 0.5\n"));
        assert!(code.contains("  var pwidth = 0.5\n"));
        assert!(code.contains("var spaceval = triangle(relpos)"));
        assert!(code.contains("root_nextstart = clock + 1\n"));
    }

    #[test]
    fn sampled_argument_is_stored_per_slot() {
        let code = generate("pulser: 3, pos=randflat: 0.2, 0.8");
        assert!(code.contains("var root_arg_pos = array(3)"));
        assert!(code.contains("root_arg_pos[slot] = randflat_"));
        assert!(code.contains("  var ppos = root_arg_pos[px]\n"));
    }

    #[test]
    fn quoted_argument_is_not_stored() {
        let code = generate("pulser: 3, pos=quote: randflat: 0.2, 0.8");
        assert!(!code.contains("root_arg_pos"));
        assert!(code.contains("var ppos = randflat_"));
        assert!(code.contains("random(randflat_"));
    }

    #[test]
    fn quoted_linear_uses_instance_age() {
        let code = generate("pulser: 3, pos=quote: linear: 0, 0.5");
        assert!(code.contains("var ppos = (0 + age * 0.5)"));
        assert!(code.contains("if (ppos - pwidth/2 >= 1) {"));
    }

    #[test]
    fn falling_linear_retires_at_the_near_end() {
        let code = generate("pulser: 3, pos=quote: linear: 1, -0.5");
        assert!(code.contains("if (ppos + pwidth/2 <= 0) {"));
    }

    #[test]
    fn quoted_width_disables_early_retirement() {
        let code = generate(
            "pulser: 3\n  pos=quote: linear: 0, 0.5\n  width=quote: linear: 0.1, 0.1\n",
        );
        assert!(!code.contains("ppos - pwidth/2 >= 1"));
    }

    #[test]
    fn flat_space_shape_covers_the_strip() {
        let code = generate("pulser: 2, spaceshape=flat");
        assert!(code.contains("  var minpos = 0\n  var maxpos = pixelCount\n"));
        assert!(code.contains("    var spaceval = 1\n"));
        assert!(!code.contains("relpos"));
    }

    #[test]
    fn random_interval_sampled_at_spawn() {
        let code = generate("pulser: 2, interval=randflat: 0.5, 1.5");
        assert!(code.contains("      var randflat_"));
        assert!(code.contains("root_nextstart = clock + randflat_"));
    }
}
