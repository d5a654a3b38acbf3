//! The immutable type tree, keyed by result id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::decorations::Decorations;
use crate::{Id, StorageClass};

/// The numeric interpretation of a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Float,
    SInt,
    UInt,
    Bool,
}

/// A scalar shape: interpretation plus byte width (2, 4 or 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarType {
    pub kind: ScalarKind,
    pub byte_size: u8,
}

impl ScalarType {
    pub const F32: ScalarType = ScalarType {
        kind: ScalarKind::Float,
        byte_size: 4,
    };
    pub const U32: ScalarType = ScalarType {
        kind: ScalarKind::UInt,
        byte_size: 4,
    };
    pub const I32: ScalarType = ScalarType {
        kind: ScalarKind::SInt,
        byte_size: 4,
    };
    pub const BOOL: ScalarType = ScalarType {
        kind: ScalarKind::Bool,
        byte_size: 4,
    };
}

/// One declared member of a struct type, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub type_id: Id,
    /// Member decorations: byte offset, matrix stride/majorness, location.
    pub decorations: Decorations,
}

/// The length of an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLength {
    /// Length given by a constant id, resolved through the constant table.
    Constant(Id),
    /// Length known directly to the reflector.
    Fixed(u32),
}

/// One node of the type tree.
///
/// Matrices are stored logically (rows x cols); byte layout (majorness and
/// stride) comes from decorations on the enclosing struct member, not from
/// the type itself.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Scalar(ScalarType),
    Vector {
        scalar: ScalarType,
        count: u8,
    },
    Matrix {
        scalar: ScalarType,
        rows: u8,
        cols: u8,
    },
    Struct {
        members: Vec<StructMember>,
    },
    Array {
        element: Id,
        length: ArrayLength,
        /// Element stride in bytes, when the array is byte-addressable.
        stride: Option<u32>,
    },
    Pointer {
        pointee: Id,
        storage: StorageClass,
    },
}

impl DataType {
    /// The scalar type of a scalar/vector/matrix node.
    pub fn scalar(&self) -> Option<ScalarType> {
        match *self {
            DataType::Scalar(s) => Some(s),
            DataType::Vector { scalar, .. } => Some(scalar),
            DataType::Matrix { scalar, .. } => Some(scalar),
            _ => None,
        }
    }

    /// Row/column shape of a leaf node (scalars are 1x1, vectors 1xN).
    pub fn shape(&self) -> Option<(u8, u8)> {
        match *self {
            DataType::Scalar(_) => Some((1, 1)),
            DataType::Vector { count, .. } => Some((1, count)),
            DataType::Matrix { rows, cols, .. } => Some((rows, cols)),
            _ => None,
        }
    }
}

/// All types declared by the module, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    entries: HashMap<Id, DataType>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Id, ty: DataType) {
        self.entries.insert(id, ty);
    }

    pub fn get(&self, id: Id) -> Option<&DataType> {
        self.entries.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes() {
        let mut types = TypeTable::new();
        types.insert(Id(1), DataType::Scalar(ScalarType::F32));
        types.insert(
            Id(2),
            DataType::Vector {
                scalar: ScalarType::F32,
                count: 4,
            },
        );
        types.insert(
            Id(3),
            DataType::Matrix {
                scalar: ScalarType::F32,
                rows: 4,
                cols: 4,
            },
        );

        assert_eq!(types.get(Id(1)).unwrap().shape(), Some((1, 1)));
        assert_eq!(types.get(Id(2)).unwrap().shape(), Some((1, 4)));
        assert_eq!(types.get(Id(3)).unwrap().shape(), Some((4, 4)));
    }
}
