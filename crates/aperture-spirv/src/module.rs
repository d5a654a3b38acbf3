//! The fully-reflected module handed to the debugger.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::decorations::DecorationTable;
use crate::ops::Instruction;
use crate::scopes::{LocalMapping, ScopeData, SourceVariableDebugInfo};
use crate::types::{ArrayLength, TypeTable};
use crate::{Id, StorageClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// The entry point selected for debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
    pub function: Id,
    /// Interface (input/output) variable ids.
    pub interface: Vec<Id>,
}

/// One function's slice of the flat instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub id: Id,
    pub name: String,
    /// Parameter register ids, bound by the caller in order.
    pub params: Vec<Id>,
    /// First instruction index, inclusive.
    pub begin: usize,
    /// One past the last instruction index.
    pub end: usize,
}

/// A module-scope variable (interface, uniform, buffer, private, shared).
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub id: Id,
    /// The variable's pointer type id.
    pub type_id: Id,
    pub storage: StorageClass,
    pub name: String,
}

/// An evaluated constant: per-scalar 64-bit words in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderConstant {
    pub type_id: Id,
    pub words: Vec<u64>,
}

impl ShaderConstant {
    pub fn scalar_u32(type_id: Id, value: u32) -> Self {
        ShaderConstant {
            type_id,
            words: vec![value as u64],
        }
    }

    pub fn scalar_f32(type_id: Id, value: f32) -> Self {
        ShaderConstant {
            type_id,
            words: vec![value.to_bits() as u64],
        }
    }

    /// The constant as a u32, for array lengths and access-chain indices.
    pub fn as_u32(&self) -> Option<u32> {
        self.words.first().map(|w| *w as u32)
    }
}

/// Source file/line/column for one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Everything the reflection stage produced. Read-only during debugging.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: TypeTable,
    pub decorations: DecorationTable,
    pub constants: HashMap<Id, ShaderConstant>,
    /// Flat decoded instruction stream; functions index into it.
    pub instructions: Vec<Instruction>,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVariable>,
    pub entry: Option<EntryPoint>,
    /// Block label id -> instruction index of the `Label`.
    pub labels: HashMap<Id, usize>,
    pub scopes: Vec<ScopeData>,
    pub source_vars: Vec<SourceVariableDebugInfo>,
    /// Ordered by instruction index.
    pub local_mappings: Vec<LocalMapping>,
    /// Registers whose live range ends after the given instruction executes.
    pub register_deaths: HashMap<usize, Vec<Id>>,
    pub locations: HashMap<usize, InstructionLocation>,
}

impl Module {
    pub fn function(&self, id: Id) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn global(&self, id: Id) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.id == id)
    }

    /// Rebuilds the label index from the instruction stream.
    pub fn resolve_labels(&mut self) {
        self.labels.clear();
        for (idx, inst) in self.instructions.iter().enumerate() {
            if let Instruction::Label { block } = inst {
                self.labels.insert(*block, idx);
            }
        }
    }

    /// Evaluates an array length against the constant table. Unresolvable
    /// lengths count as zero; the walker diagnoses that case separately.
    pub fn array_length(&self, length: ArrayLength) -> u32 {
        match length {
            ArrayLength::Fixed(n) => n,
            ArrayLength::Constant(id) => self
                .constants
                .get(&id)
                .and_then(|c| c.as_u32())
                .unwrap_or(0),
        }
    }

    /// Name of the scope chain at an instruction, innermost last, for
    /// callstack display.
    pub fn scope_name(&self, instruction: usize) -> Option<String> {
        let mut innermost: Option<usize> = None;
        for (idx, scope) in self.scopes.iter().enumerate() {
            if !scope.contains(instruction) {
                continue;
            }
            // Prefer the narrowest enclosing scope.
            let better = match innermost {
                None => true,
                Some(prev) => {
                    let p = &self.scopes[prev];
                    scope.end - scope.begin <= p.end - p.begin
                }
            };
            if better {
                innermost = Some(idx);
            }
        }
        innermost.map(|idx| self.scopes[idx].name.clone())
    }
}
