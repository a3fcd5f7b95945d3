// Syntax tree types for Beacon .pbb pattern sources.
//
// A source file is a forest of untyped `Term`s: one tree per top-level line
// group. Children are collected either inline (after `:`) or from deeper
// indented lines; both land in the same ordered `args` list.
//
// Preconditions: produced by the parser from a token stream.
// Postconditions: each term's span covers its head token (and name, if any).
// Failure modes: none (data-only module).
// Side effects: none.

use std::fmt;

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// A color literal normalized to three channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub fn channel(&self, component: Component) -> f64 {
        match component {
            Component::R => self.r,
            Component::G => self.g,
            Component::B => self.b,
        }
    }
}

/// One channel of a three-dimensional value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    R,
    G,
    B,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::R, Component::G, Component::B];

    pub fn suffix(self) -> &'static str {
        match self {
            Component::R => "r",
            Component::G => "g",
            Component::B => "b",
        }
    }
}

/// The head token of a term.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Symbol(String),
    Number(f64),
    Color(Rgb),
}

impl Atom {
    pub fn is_symbol(&self) -> bool {
        matches!(self, Atom::Symbol(_))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Symbol(s) => write!(f, "{s}"),
            Atom::Number(n) => write!(f, "{n:?}"),
            Atom::Color(c) => write!(f, "rgb({:?}, {:?}, {:?})", c.r, c.g, c.b),
        }
    }
}

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// An untyped syntax tree node: `[name =] atom [: args...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub atom: Atom,
    pub name: Option<Ident>,
    pub args: Vec<Term>,
    pub span: Span,
}

impl Term {
    pub fn new(atom: Atom, name: Option<Ident>, span: Span) -> Self {
        Term {
            atom,
            name,
            args: Vec::new(),
            span,
        }
    }

    /// Lower-cased symbol text, if this term is symbol-headed.
    pub fn keyword(&self) -> Option<String> {
        match &self.atom {
            Atom::Symbol(s) => Some(s.to_ascii_lowercase()),
            _ => None,
        }
    }

    /// Render this term and its children as an indented tree.
    pub fn dump(&self, indent: usize, out: &mut String) {
        use std::fmt::Write as _;
        let pad = "  ".repeat(indent);
        let name = self
            .name
            .as_ref()
            .map(|n| format!("{}=", n.name))
            .unwrap_or_default();
        let colon = if self.args.is_empty() { "" } else { ":" };
        let _ = writeln!(out, "{pad}{name}{}{colon}", self.atom);
        for arg in &self.args {
            arg.dump(indent + 1, out);
        }
    }
}
