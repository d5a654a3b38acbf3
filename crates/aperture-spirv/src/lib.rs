//! Read-only module tables for the shader debugger.
//!
//! This crate holds the data model that the reflection stage produces from a
//! parsed SPIR-V module and that `aperture-shader-debug` consumes while
//! stepping: the type tree, layout decorations, the decoded instruction
//! stream, constants, entry points and the debug-info scope tree.
//!
//! Nothing in here parses bytecode. The tables are fully built before a debug
//! session starts and are never mutated during stepping.

use serde::{Deserialize, Serialize};

pub mod decorations;
pub mod module;
pub mod ops;
pub mod scopes;
pub mod types;

/// Builder helpers for constructing synthetic modules in tests.
///
/// Only available when compiling this crate's own tests or with the
/// `test-utils` feature enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::decorations::{BuiltinKind, DecorationFlags, DecorationTable, Decorations};
pub use crate::module::{
    EntryPoint, Function, GlobalVariable, InstructionLocation, Module, ShaderConstant, ShaderStage,
};
pub use crate::ops::{BinaryOp, CompareOp, DerivAxis, DerivPrecision, Instruction};
pub use crate::scopes::{LocalMapping, ScopeData, ScopeKind, SourceVariableDebugInfo};
pub use crate::types::{ArrayLength, DataType, ScalarKind, ScalarType, StructMember, TypeTable};

/// A SPIR-V result id.
///
/// Ids are only meaningful within the module that defined them; they key the
/// type table, the constant table and each lane's register file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Id(pub u32);

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The storage class of a pointer or variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    Input,
    Output,
    Uniform,
    StorageBuffer,
    PushConstant,
    UniformConstant,
    Private,
    Function,
    Workgroup,
    PhysicalStorageBuffer,
}

impl StorageClass {
    /// Storage classes whose contents live in bound buffer memory and are
    /// addressed by (binding, byte offset) rather than by value aliasing.
    pub fn is_buffer_backed(self) -> bool {
        matches!(
            self,
            StorageClass::Uniform
                | StorageClass::StorageBuffer
                | StorageClass::PushConstant
                | StorageClass::PhysicalStorageBuffer
        )
    }

    /// Storage classes holding opaque binding objects (images, samplers).
    pub fn is_opaque(self) -> bool {
        matches!(self, StorageClass::UniformConstant)
    }
}
