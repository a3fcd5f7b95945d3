// registry.rs — Node-kind registry
//
// Maps each (case-insensitive) keyword of the pattern language to its node
// kind and formal parameter table. The table is static; `Registry::new`
// only builds the keyword index.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::graph::Implicit;

// ── Data types ──────────────────────────────────────────────────────────────

/// Expected type of one formal parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Numeric literal.
    Number,
    /// Numeric literal, truncated to an integer.
    Integer,
    /// Color literal.
    Color,
    /// Waveform shape name.
    Shape,
    /// Sub-expression bound in the parent's own context.
    Node,
    /// Sub-expression forced into the TIME context.
    Time,
    /// Sub-expression forced into the SPACE context.
    Space,
}

impl ArgType {
    /// Whether this slot binds a sub-expression.
    pub fn is_node(self) -> bool {
        matches!(self, ArgType::Node | ArgType::Time | ArgType::Space)
    }

    pub fn name(self) -> &'static str {
        match self {
            ArgType::Number => "number",
            ArgType::Integer => "integer",
            ArgType::Color => "color",
            ArgType::Shape => "shape",
            ArgType::Node => "node",
            ArgType::Time => "time",
            ArgType::Space => "space",
        }
    }

    /// Context a sub-expression slot forces, if any.
    pub fn forced_context(self) -> Option<Implicit> {
        match self {
            ArgType::Time => Some(Implicit::Time),
            ArgType::Space => Some(Implicit::Space),
            _ => None,
        }
    }
}

/// Default for an optional parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgDefault {
    /// Wrapped as a constant sub-node.
    Number(f64),
    Shape(WaveShape),
}

/// One formal parameter of a node kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgFormat {
    pub name: &'static str,
    pub ty: ArgType,
    /// Variadic: positional overflow appends here.
    pub multiple: bool,
    pub default: Option<ArgDefault>,
    /// May be wrapped in `quote` (pulser per-instance parameters).
    pub deferrable: bool,
}

impl ArgFormat {
    const fn new(name: &'static str, ty: ArgType) -> Self {
        ArgFormat {
            name,
            ty,
            multiple: false,
            default: None,
            deferrable: false,
        }
    }

    const fn or(mut self, value: f64) -> Self {
        self.default = Some(ArgDefault::Number(value));
        self
    }

    const fn or_shape(mut self, shape: WaveShape) -> Self {
        self.default = Some(ArgDefault::Shape(shape));
        self
    }

    const fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    const fn deferrable(mut self) -> Self {
        self.deferrable = true;
        self
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some() || self.multiple
    }
}

/// Waveform shapes accepted by `wave` and `pulser`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveShape {
    Flat,
    Square,
    HalfSquare,
    Triangle,
    Trapezoid,
    Sawtooth,
    SqrTooth,
    SawDecay,
    SqrDecay,
    Sine,
}

impl WaveShape {
    pub const ALL: [WaveShape; 10] = [
        WaveShape::Flat,
        WaveShape::Square,
        WaveShape::HalfSquare,
        WaveShape::Triangle,
        WaveShape::Trapezoid,
        WaveShape::Sawtooth,
        WaveShape::SqrTooth,
        WaveShape::SawDecay,
        WaveShape::SqrDecay,
        WaveShape::Sine,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WaveShape::Flat => "flat",
            WaveShape::Square => "square",
            WaveShape::HalfSquare => "halfsquare",
            WaveShape::Triangle => "triangle",
            WaveShape::Trapezoid => "trapezoid",
            WaveShape::Sawtooth => "sawtooth",
            WaveShape::SqrTooth => "sqrtooth",
            WaveShape::SawDecay => "sawdecay",
            WaveShape::SqrDecay => "sqrdecay",
            WaveShape::Sine => "sine",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<WaveShape> {
        let lower = name.to_ascii_lowercase();
        WaveShape::ALL.into_iter().find(|s| s.name() == lower)
    }
}

impl fmt::Display for WaveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Keywords ────────────────────────────────────────────────────────────────

/// Every keyword the binder recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Constant,
    Color,
    Quote,
    Time,
    Space,
    Linear,
    Changing,
    RandFlat,
    RandNorm,
    Noise,
    Clamp,
    Lerp,
    Sum,
    Mean,
    Mul,
    Max,
    Min,
    Mod,
    Wave,
    Rgb,
    Brightness,
    Red,
    Green,
    Blue,
    Gradient,
    NGradient,
    Stop,
    NStop,
    Decay,
    Diff,
    Shift,
    ShiftDecay,
    Pulser,
}

use ArgType::{Color as C, Integer as I, Node as N, Number as F, Shape as W, Space as S, Time as T};

const ONE_ARG: &[ArgFormat] = &[ArgFormat::new("arg", N)];
const VARIADIC: &[ArgFormat] = &[ArgFormat::new("arg", N).multiple()];

const CONSTANT: &[ArgFormat] = &[ArgFormat::new("value", F)];
const COLOR: &[ArgFormat] = &[ArgFormat::new("value", C)];
const TIME: &[ArgFormat] = &[ArgFormat::new("arg", T)];
const SPACE: &[ArgFormat] = &[ArgFormat::new("arg", S)];
const LINEAR: &[ArgFormat] = &[ArgFormat::new("start", T), ArgFormat::new("velocity", T)];
const CHANGING: &[ArgFormat] = &[
    ArgFormat::new("start", T).or(0.0),
    ArgFormat::new("velocity", T),
];
const RANDFLAT: &[ArgFormat] = &[
    ArgFormat::new("min", T).or(0.0),
    ArgFormat::new("max", T).or(1.0),
];
const RANDNORM: &[ArgFormat] = &[
    ArgFormat::new("mean", T).or(0.5),
    ArgFormat::new("stdev", T).or(0.25),
];
const NOISE: &[ArgFormat] = &[
    ArgFormat::new("min", T).or(0.0),
    ArgFormat::new("max", T).or(1.0),
    ArgFormat::new("period", T).or(1.0),
];
const CLAMP: &[ArgFormat] = &[
    ArgFormat::new("arg", N),
    ArgFormat::new("min", T).or(0.0),
    ArgFormat::new("max", T).or(1.0),
];
const LERP: &[ArgFormat] = &[
    ArgFormat::new("weight", N),
    ArgFormat::new("start", N),
    ArgFormat::new("end", N),
];
const MOD: &[ArgFormat] = &[ArgFormat::new("arg", N), ArgFormat::new("divisor", T).or(1.0)];
const WAVE: &[ArgFormat] = &[
    ArgFormat::new("shape", W),
    ArgFormat::new("min", T).or(0.0),
    ArgFormat::new("max", T).or(1.0),
    ArgFormat::new("period", T).or(1.0),
];
const RGB: &[ArgFormat] = &[
    ArgFormat::new("r", N),
    ArgFormat::new("g", N),
    ArgFormat::new("b", N),
];
const STOP: &[ArgFormat] = &[ArgFormat::new("pos", F), ArgFormat::new("color", C)];
const NSTOP: &[ArgFormat] = &[ArgFormat::new("pos", F), ArgFormat::new("value", F)];
const DECAY: &[ArgFormat] = &[ArgFormat::new("arg", N), ArgFormat::new("halflife", T).or(0.5)];
const SHIFT: &[ArgFormat] = &[ArgFormat::new("arg", N), ArgFormat::new("velocity", T).or(1.0)];
const SHIFTDECAY: &[ArgFormat] = &[
    ArgFormat::new("arg", N),
    ArgFormat::new("velocity", T).or(1.0),
    ArgFormat::new("halflife", T).or(0.5),
];
const PULSER: &[ArgFormat] = &[
    ArgFormat::new("maxcount", I),
    ArgFormat::new("spaceshape", W).or_shape(WaveShape::Triangle),
    ArgFormat::new("timeshape", W).or_shape(WaveShape::SqrDecay),
    ArgFormat::new("interval", T).or(1.0),
    ArgFormat::new("pos", T).or(0.5).deferrable(),
    ArgFormat::new("duration", T).or(1.0).deferrable(),
    ArgFormat::new("width", T).or(0.5).deferrable(),
];

impl Keyword {
    pub const ALL: [Keyword; 33] = [
        Keyword::Constant,
        Keyword::Color,
        Keyword::Quote,
        Keyword::Time,
        Keyword::Space,
        Keyword::Linear,
        Keyword::Changing,
        Keyword::RandFlat,
        Keyword::RandNorm,
        Keyword::Noise,
        Keyword::Clamp,
        Keyword::Lerp,
        Keyword::Sum,
        Keyword::Mean,
        Keyword::Mul,
        Keyword::Max,
        Keyword::Min,
        Keyword::Mod,
        Keyword::Wave,
        Keyword::Rgb,
        Keyword::Brightness,
        Keyword::Red,
        Keyword::Green,
        Keyword::Blue,
        Keyword::Gradient,
        Keyword::NGradient,
        Keyword::Stop,
        Keyword::NStop,
        Keyword::Decay,
        Keyword::Diff,
        Keyword::Shift,
        Keyword::ShiftDecay,
        Keyword::Pulser,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Keyword::Constant => "constant",
            Keyword::Color => "color",
            Keyword::Quote => "quote",
            Keyword::Time => "time",
            Keyword::Space => "space",
            Keyword::Linear => "linear",
            Keyword::Changing => "changing",
            Keyword::RandFlat => "randflat",
            Keyword::RandNorm => "randnorm",
            Keyword::Noise => "noise",
            Keyword::Clamp => "clamp",
            Keyword::Lerp => "lerp",
            Keyword::Sum => "sum",
            Keyword::Mean => "mean",
            Keyword::Mul => "mul",
            Keyword::Max => "max",
            Keyword::Min => "min",
            Keyword::Mod => "mod",
            Keyword::Wave => "wave",
            Keyword::Rgb => "rgb",
            Keyword::Brightness => "brightness",
            Keyword::Red => "red",
            Keyword::Green => "green",
            Keyword::Blue => "blue",
            Keyword::Gradient => "gradient",
            Keyword::NGradient => "ngradient",
            Keyword::Stop => "stop",
            Keyword::NStop => "nstop",
            Keyword::Decay => "decay",
            Keyword::Diff => "diff",
            Keyword::Shift => "shift",
            Keyword::ShiftDecay => "shiftdecay",
            Keyword::Pulser => "pulser",
        }
    }

    /// Formal parameter table, in positional order.
    pub fn formats(self) -> &'static [ArgFormat] {
        match self {
            Keyword::Constant => CONSTANT,
            Keyword::Color => COLOR,
            Keyword::Quote => ONE_ARG,
            Keyword::Time => TIME,
            Keyword::Space => SPACE,
            Keyword::Linear => LINEAR,
            Keyword::Changing => CHANGING,
            Keyword::RandFlat => RANDFLAT,
            Keyword::RandNorm => RANDNORM,
            Keyword::Noise => NOISE,
            Keyword::Clamp => CLAMP,
            Keyword::Lerp => LERP,
            Keyword::Sum | Keyword::Mean | Keyword::Mul | Keyword::Max | Keyword::Min => VARIADIC,
            Keyword::Mod => MOD,
            Keyword::Wave => WAVE,
            Keyword::Rgb => RGB,
            Keyword::Brightness | Keyword::Red | Keyword::Green | Keyword::Blue => ONE_ARG,
            // Children are partitioned by the gradient binder, not slot-filled.
            Keyword::Gradient | Keyword::NGradient => ONE_ARG,
            Keyword::Stop => STOP,
            Keyword::NStop => NSTOP,
            Keyword::Decay => DECAY,
            Keyword::Diff => ONE_ARG,
            Keyword::Shift => SHIFT,
            Keyword::ShiftDecay => SHIFTDECAY,
            Keyword::Pulser => PULSER,
        }
    }

    /// Leaf kinds that only make sense inside a specific parent.
    pub fn is_gradient_leaf(self) -> bool {
        matches!(self, Keyword::Stop | Keyword::NStop)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Keyword index over the static node-kind table.
#[derive(Debug)]
pub struct Registry {
    keywords: HashMap<&'static str, Keyword>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let keywords = Keyword::ALL.iter().map(|&k| (k.name(), k)).collect();
        Registry { keywords }
    }

    /// Case-insensitive keyword lookup.
    pub fn lookup(&self, name: &str) -> Option<Keyword> {
        self.keywords.get(name.to_ascii_lowercase().as_str()).copied()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Compact JSON of the whole keyword table in declaration order, for
    /// build fingerprints.
    pub fn canonical_json(&self) -> String {
        let table: Vec<serde_json::Value> = Keyword::ALL
            .iter()
            .map(|k| {
                let args: Vec<serde_json::Value> = k
                    .formats()
                    .iter()
                    .map(|f| {
                        let default = match f.default {
                            Some(ArgDefault::Number(v)) => serde_json::json!(v),
                            Some(ArgDefault::Shape(s)) => serde_json::json!(s.name()),
                            None => serde_json::Value::Null,
                        };
                        serde_json::json!({
                            "name": f.name,
                            "type": f.ty.name(),
                            "multiple": f.multiple,
                            "deferrable": f.deferrable,
                            "default": default,
                        })
                    })
                    .collect();
                serde_json::json!({ "keyword": k.name(), "args": args })
            })
            .collect();
        serde_json::Value::Array(table).to_string()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_is_stable() {
        let reg = Registry::new();
        let a = reg.canonical_json();
        assert_eq!(a, Registry::new().canonical_json());
        assert!(!a.contains(' '));
        assert!(a.contains(r#"{"args":[{"default":null,"deferrable":false,"multiple":false,"name":"value","type":"number"}],"keyword":"constant"}"#));
    }

    #[test]
    fn every_keyword_is_indexed() {
        let reg = Registry::new();
        assert_eq!(reg.len(), Keyword::ALL.len());
        for k in Keyword::ALL {
            assert_eq!(reg.lookup(k.name()), Some(k));
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = Registry::new();
        assert_eq!(reg.lookup("Wave"), Some(Keyword::Wave));
        assert_eq!(reg.lookup("PULSER"), Some(Keyword::Pulser));
        assert_eq!(reg.lookup("wavy"), None);
    }

    #[test]
    fn shape_names_round_trip() {
        for shape in WaveShape::ALL {
            assert_eq!(WaveShape::from_name(shape.name()), Some(shape));
        }
        assert_eq!(WaveShape::from_name("SINE"), Some(WaveShape::Sine));
        assert_eq!(WaveShape::from_name("zigzag"), None);
    }

    #[test]
    fn format_names_are_unique_per_kind() {
        for k in Keyword::ALL {
            let formats = k.formats();
            for (i, a) in formats.iter().enumerate() {
                for b in &formats[i + 1..] {
                    assert_ne!(a.name, b.name, "{k}: duplicate slot {}", a.name);
                }
            }
        }
    }

    #[test]
    fn pulser_defers_only_instance_parameters() {
        let deferrable: Vec<_> = Keyword::Pulser
            .formats()
            .iter()
            .filter(|f| f.deferrable)
            .map(|f| f.name)
            .collect();
        assert_eq!(deferrable, vec!["pos", "duration", "width"]);
    }

    #[test]
    fn optional_slots() {
        let wave = Keyword::Wave.formats();
        assert!(!wave[0].is_optional());
        assert_eq!(wave[3].default, Some(ArgDefault::Number(1.0)));
        assert!(Keyword::Sum.formats()[0].is_optional());
    }
}
