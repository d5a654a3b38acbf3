//! Per-id layout and interface decorations.

use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::Id;

bitflags! {
    /// Boolean decorations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DecorationFlags: u8 {
        /// Matrix stored row-major in buffer memory. Column-major is the
        /// default and has no flag.
        const ROW_MAJOR = 1 << 0;
    }
}

/// Shader built-in inputs/outputs the debugger cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinKind {
    Position,
    FragCoord,
    FragDepth,
    VertexIndex,
    InstanceIndex,
    GlobalInvocationId,
    LocalInvocationId,
    HelperInvocation,
}

/// Layout/interface metadata attached to one id or struct member.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decorations {
    pub flags: DecorationFlags,
    /// Explicit byte offset within the enclosing aggregate.
    pub byte_offset: Option<u32>,
    /// Element stride for arrays of this type.
    pub array_stride: Option<u32>,
    /// Row-to-row (or column-to-column) stride for matrices.
    pub matrix_stride: Option<u32>,
    /// Interface location; only the first one encountered on a logical base
    /// seeds the location counter during a walk.
    pub location: Option<u32>,
    pub component: Option<u32>,
    pub binding: Option<u32>,
    pub descriptor_set: Option<u32>,
    pub builtin: Option<BuiltinKind>,
}

impl Decorations {
    pub fn row_major(&self) -> bool {
        self.flags.contains(DecorationFlags::ROW_MAJOR)
    }

    /// Merge member decorations over variable-level ones: explicit member
    /// layout wins, missing fields fall through.
    pub fn overlaid_on(&self, base: &Decorations) -> Decorations {
        Decorations {
            flags: self.flags | base.flags,
            byte_offset: self.byte_offset.or(base.byte_offset),
            array_stride: self.array_stride.or(base.array_stride),
            matrix_stride: self.matrix_stride.or(base.matrix_stride),
            location: self.location.or(base.location),
            component: self.component.or(base.component),
            binding: self.binding.or(base.binding),
            descriptor_set: self.descriptor_set.or(base.descriptor_set),
            builtin: self.builtin.or(base.builtin),
        }
    }
}

/// All id-level decorations declared by the module.
///
/// Member decorations live on [`crate::types::StructMember`] directly.
#[derive(Debug, Clone, Default)]
pub struct DecorationTable {
    entries: HashMap<Id, Decorations>,
}

impl DecorationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Id, decorations: Decorations) {
        self.entries.insert(id, decorations);
    }

    pub fn get(&self, id: Id) -> Decorations {
        self.entries.get(&id).cloned().unwrap_or_default()
    }
}
