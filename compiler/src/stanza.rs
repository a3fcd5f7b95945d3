// stanza.rs — Per-buffered-node code emission scratchpad
//
// A stanza collects everything one buffered node needs to materialize its
// value: hoisted locals, the final per-component expression(s), and any
// imperative lines a stateful kind emits around them. Printing wraps the
// assignment in a per-pixel loop when the node varies in SPACE.
//
// Preconditions: owned by exactly one buffered node (or used as a scratch
//                sub-stanza and transferred into its parent).
// Postconditions: `print` emits the lines in a fixed order: before,
//                 hoisted, assignment, trailing, after.
// Failure modes: none.
// Side effects: none.

use std::fmt::{self, Write};

use crate::ast::Component;
use crate::graph::{AxisDep, Dim, Node};
use crate::id::NodeId;

/// Timebase for the TIME implicit parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timebase {
    /// Global wall clock.
    Clock,
    /// Age of the current pulser instance.
    Age,
}

impl Timebase {
    pub fn var(self) -> &'static str {
        match self {
            Timebase::Clock => "clock",
            Timebase::Age => "age",
        }
    }
}

/// What a stanza leaves in its node's buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Bottom {
    /// One expression per component, assigned to the buffer.
    Assign(Vec<String>),
    /// The `after` lines write the buffer themselves.
    Instead,
}

#[derive(Debug, Clone)]
pub struct Stanza {
    pub node: NodeId,
    pub name: String,
    pub dep: AxisDep,
    pub dim: Dim,
    before: Vec<String>,
    hoisted: Vec<(String, String)>,
    pub bottom: Bottom,
    trailing: Vec<String>,
    after: Vec<String>,
}

impl Stanza {
    pub fn new(node: &Node) -> Self {
        Stanza {
            node: node.id,
            name: node.name.clone(),
            dep: node.dep,
            dim: node.dim(),
            before: Vec::new(),
            hoisted: Vec::new(),
            bottom: Bottom::Instead,
            trailing: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Hoist `expr` into the local `<owner>_val_<key>`. Hoisting the same
    /// key twice keeps the first expression.
    pub fn store_val(&mut self, owner: &str, key: &str, expr: String) -> String {
        let var = format!("{owner}_val_{key}");
        if !self.hoisted.iter().any(|(v, _)| *v == var) {
            self.hoisted.push((var.clone(), expr));
        }
        var
    }

    /// A previously hoisted local, if any.
    pub fn find_val(&self, owner: &str, key: &str) -> Option<String> {
        let var = format!("{owner}_val_{key}");
        self.hoisted
            .iter()
            .any(|(v, _)| *v == var)
            .then_some(var)
    }

    /// Line emitted ahead of the assignment (and ahead of the pixel loop).
    pub fn before(&mut self, line: impl Into<String>) {
        self.before.push(line.into());
    }

    /// Line emitted right after the assignment, inside the pixel loop.
    pub fn trailing(&mut self, line: impl Into<String>) {
        self.trailing.push(line.into());
    }

    /// Line emitted after everything else.
    pub fn after(&mut self, line: impl Into<String>) {
        self.after.push(line.into());
    }

    /// Move this stanza's hoisted locals into `other`'s `after` lines.
    pub fn transfer(self, other: &mut Stanza, indent: usize) {
        let pad = "  ".repeat(indent);
        for (var, expr) in self.hoisted {
            other.after(format!("{pad}var {var} = {expr}"));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hoisted.is_empty() && self.after.is_empty()
    }

    /// Buffer variable for one component: `<id>_scalar[_c]` or
    /// `<id>_vector[_c]`, without index.
    pub fn buffer_var(name: &str, dep: AxisDep, dim: Dim, comp: Option<Component>) -> String {
        let base = if dep.has_space() { "vector" } else { "scalar" };
        match (dim, comp) {
            (Dim::Three, Some(c)) => format!("{name}_{base}_{}", c.suffix()),
            _ => format!("{name}_{base}"),
        }
    }

    fn targets(&self) -> Vec<String> {
        match self.dim {
            Dim::One => vec![Self::buffer_var(&self.name, self.dep, self.dim, None)],
            Dim::Three => Component::ALL
                .iter()
                .map(|&c| Self::buffer_var(&self.name, self.dep, self.dim, Some(c)))
                .collect(),
        }
    }

    pub fn print(&self, out: &mut impl Write, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        for line in &self.before {
            writeln!(out, "{pad}{line}")?;
        }
        if let Bottom::Assign(exprs) = &self.bottom {
            let targets = self.targets();
            if !self.dep.has_space() {
                for (var, expr) in &self.hoisted {
                    writeln!(out, "{pad}var {var} = {expr}  // for {}", self.name)?;
                }
                for (target, expr) in targets.iter().zip(exprs) {
                    writeln!(out, "{pad}{target} = ({expr})")?;
                }
                for line in &self.trailing {
                    writeln!(out, "{pad}{line}")?;
                }
            } else {
                writeln!(out, "{pad}for (var ix=0; ix<pixelCount; ix++) {{")?;
                for (var, expr) in &self.hoisted {
                    writeln!(out, "{pad}  var {var} = {expr}  // for {}", self.name)?;
                }
                for (target, expr) in targets.iter().zip(exprs) {
                    writeln!(out, "{pad}  {target}[ix] = ({expr})")?;
                }
                for line in &self.trailing {
                    writeln!(out, "{pad}  {line}")?;
                }
                writeln!(out, "{pad}}}")?;
            }
        }
        for line in &self.after {
            writeln!(out, "{pad}{line}")?;
        }
        Ok(())
    }
}
