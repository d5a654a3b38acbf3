//! Debug-info scopes and register-to-source-variable mappings.
//!
//! The reflector records these during its linear pass over the module's debug
//! instructions. During stepping they are read-only; the debugger replays
//! them per instruction to reconstruct source variables.

use crate::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    CompilationUnit,
    Function,
    Block,
}

/// One node of the scope tree. Scopes cover a contiguous instruction range;
/// a child's range is always enclosed by its parent's.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeData {
    pub kind: ScopeKind,
    /// Index of the parent scope within [`crate::Module::scopes`].
    pub parent: Option<usize>,
    pub name: String,
    /// First instruction index covered, inclusive.
    pub begin: usize,
    /// Last instruction index covered, inclusive.
    pub end: usize,
}

impl ScopeData {
    pub fn contains(&self, instruction: usize) -> bool {
        instruction >= self.begin && instruction <= self.end
    }
}

/// A declared source-level variable.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceVariableDebugInfo {
    /// The debug-info id of the source variable.
    pub id: Id,
    pub name: String,
    /// Declared type of the variable.
    pub type_id: Id,
    /// Owning scope index.
    pub scope: usize,
}

/// One "at this instruction, source variable X's bits live in register Y"
/// fact, recorded in program order.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMapping {
    /// Instruction index at which this fact becomes true.
    pub instruction: usize,
    /// Scope the fact was recorded in.
    pub scope: usize,
    /// The source variable (keys [`SourceVariableDebugInfo::id`]).
    pub source_var: Id,
    /// The register holding the bits, when this is a value mapping.
    pub register: Option<Id>,
    /// Access-chain index path restricting the fact to a sub-object of the
    /// source variable. Empty means the whole variable.
    pub index_path: Vec<u32>,
    /// Pure declaration: the variable exists here but has no value yet.
    pub is_declare: bool,
}
