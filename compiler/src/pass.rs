// pass.rs — Beacon pass table and minimal pass selection
//
// Lists the passes that run after parsing, what each consumes and produces,
// and resolves the smallest ordered pass list for an `--emit` target.

// ── Identifiers ─────────────────────────────────────────────────────────────

/// A compiler pass. Parsing happens before the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Bind,
    Analyze,
    Codegen,
}

/// What a pass leaves in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    /// Bound node graph and definition table.
    Program,
    /// Dims, deps, buffering and stanzas on the program.
    Stanzas,
    /// Pixelblaze source text.
    Generated,
}

// ── Descriptors ─────────────────────────────────────────────────────────────

pub struct PassDescriptor {
    pub id: PassId,
    pub name: &'static str,
    /// Passes that must have run first.
    pub inputs: &'static [PassId],
    pub outputs: &'static [ArtifactId],
    /// What holds once the pass succeeds.
    pub guarantees: &'static str,
}

/// Every pass, in execution order.
pub static PASSES: [PassDescriptor; 3] = [
    PassDescriptor {
        id: PassId::Bind,
        name: "bind",
        inputs: &[],
        outputs: &[ArtifactId::Program],
        guarantees: "one root, unique definitions, every slot filled",
    },
    PassDescriptor {
        id: PassId::Analyze,
        name: "analyze",
        inputs: &[PassId::Bind],
        outputs: &[ArtifactId::Stanzas],
        guarantees: "dims agree, deps are unions, buffering decided",
    },
    PassDescriptor {
        id: PassId::Codegen,
        name: "codegen",
        inputs: &[PassId::Analyze],
        outputs: &[ArtifactId::Generated],
        guarantees: "render reads only materialized buffers",
    },
];

pub fn descriptor(id: PassId) -> &'static PassDescriptor {
    match id {
        PassId::Bind => &PASSES[0],
        PassId::Analyze => &PASSES[1],
        PassId::Codegen => &PASSES[2],
    }
}

// ── Selection ───────────────────────────────────────────────────────────────

/// Passes needed for `terminal`, dependencies first.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut needed = vec![terminal];
    let mut pending = vec![terminal];
    while let Some(id) = pending.pop() {
        for &input in descriptor(id).inputs {
            if !needed.contains(&input) {
                needed.push(input);
                pending.push(input);
            }
        }
    }
    PASSES
        .iter()
        .map(|p| p.id)
        .filter(|id| needed.contains(id))
        .collect()
}
