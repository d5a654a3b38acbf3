//! The tagged value container used for every piece of shader storage.
//!
//! A [`ShaderValue`] is either a numeric leaf (scalar, vector or matrix, up
//! to 4x4, stored row-major), a typed pointer, or an aggregate with members.
//! Exactly one interpretation is meaningful at a time; the enum makes that
//! structural rather than a tag over shared raw slots.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use aperture_spirv::{Id, ScalarKind, ScalarType};

/// Word pattern used to fill freshly allocated locals. Shows up as a huge
/// float or `0xcccccccc` in a UI, either way clearly garbage.
pub const POISON_WORD: u64 = 0xcccc_cccc;

/// Numeric interpretation tag for the raw 64-bit lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarType {
    Float,
    Double,
    Half,
    SInt,
    UInt,
    Bool,
}

impl VarType {
    pub fn from_scalar(scalar: ScalarType) -> VarType {
        match (scalar.kind, scalar.byte_size) {
            (ScalarKind::Float, 8) => VarType::Double,
            (ScalarKind::Float, 2) => VarType::Half,
            (ScalarKind::Float, _) => VarType::Float,
            (ScalarKind::SInt, _) => VarType::SInt,
            (ScalarKind::UInt, _) => VarType::UInt,
            (ScalarKind::Bool, _) => VarType::Bool,
        }
    }
}

/// A scalar/vector/matrix payload. Lanes are bit patterns of the scalar type,
/// stored row-major: lane index is `row * cols + col`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericValue {
    pub ty: VarType,
    /// Byte width of one scalar (2, 4 or 8).
    pub byte_size: u8,
    pub rows: u8,
    pub cols: u8,
    pub words: [u64; 16],
}

impl NumericValue {
    pub fn with_shape(ty: VarType, byte_size: u8, rows: u8, cols: u8) -> NumericValue {
        NumericValue {
            ty,
            byte_size,
            rows,
            cols,
            words: [0; 16],
        }
    }

    pub fn from_scalar_type(scalar: ScalarType, rows: u8, cols: u8) -> NumericValue {
        NumericValue::with_shape(VarType::from_scalar(scalar), scalar.byte_size, rows, cols)
    }

    pub fn scalar_f32(value: f32) -> NumericValue {
        let mut v = NumericValue::with_shape(VarType::Float, 4, 1, 1);
        v.words[0] = value.to_bits() as u64;
        v
    }

    pub fn scalar_u32(value: u32) -> NumericValue {
        let mut v = NumericValue::with_shape(VarType::UInt, 4, 1, 1);
        v.words[0] = value as u64;
        v
    }

    pub fn scalar_bool(value: bool) -> NumericValue {
        let mut v = NumericValue::with_shape(VarType::Bool, 4, 1, 1);
        v.words[0] = value as u64;
        v
    }

    pub fn vec_f32(values: &[f32]) -> NumericValue {
        let mut v = NumericValue::with_shape(VarType::Float, 4, 1, values.len() as u8);
        for (i, x) in values.iter().enumerate() {
            v.words[i] = x.to_bits() as u64;
        }
        v
    }

    pub fn lane_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn lane(&self, row: u8, col: u8) -> u64 {
        self.words[row as usize * self.cols as usize + col as usize]
    }

    pub fn set_lane(&mut self, row: u8, col: u8, word: u64) {
        self.words[row as usize * self.cols as usize + col as usize] = word;
    }

    pub fn as_f32(&self, row: u8, col: u8) -> f32 {
        f32::from_bits(self.lane(row, col) as u32)
    }

    pub fn as_f64(&self, row: u8, col: u8) -> f64 {
        match self.ty {
            VarType::Double => f64::from_bits(self.lane(row, col)),
            _ => self.as_f32(row, col) as f64,
        }
    }

    pub fn as_u64(&self, row: u8, col: u8) -> u64 {
        self.lane(row, col)
    }

    pub fn is_truthy(&self) -> bool {
        self.words[0] != 0
    }

    pub fn fill_poison(&mut self) {
        for lane in 0..self.lane_count() {
            self.words[lane] = POISON_WORD;
        }
    }

    /// Serializes the lanes to tightly packed little-endian bytes, row-major.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.lane_count() * self.byte_size as usize);
        for lane in 0..self.lane_count() {
            let word = self.words[lane];
            out.extend_from_slice(&word.to_le_bytes()[..self.byte_size as usize]);
        }
        out
    }

    /// Fills the lanes from tightly packed little-endian bytes, row-major.
    pub fn from_bytes(&mut self, bytes: &[u8]) {
        let size = self.byte_size as usize;
        for lane in 0..self.lane_count() {
            let mut word = [0u8; 8];
            let src = &bytes[lane * size..lane * size + size];
            word[..size].copy_from_slice(src);
            self.words[lane] = u64::from_le_bytes(word);
        }
    }
}

/// What a pointer refers to. Never a raw machine address into our own heap;
/// storage is always resolved through an explicit lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerTarget {
    /// A module-scope variable's storage, owned by the global state.
    Global(Id),
    /// A function-local variable's storage, owned by the current lane.
    Local(Id),
    /// A physical (raw address) pointer with no backing value of ours.
    Physical,
}

/// Kind tag for opaque image/sampler bindings, stored where buffer-backed
/// pointers would store a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureKind {
    Image1D,
    Image2D,
    Image3D,
    Cube,
    Buffer,
    Sampler,
    CombinedSampler,
}

/// Address portion of a pointer. Buffer-backed pointers carry a byte offset;
/// opaque binding pointers carry a texture kind and never need one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerAddr {
    /// In-memory pointer: the target value is aliased directly.
    None,
    /// Relative byte offset for SSBO/UBO-backed pointers, or the raw address
    /// for physical pointers.
    Bytes(u64),
    /// Opaque image/sampler binding.
    Texture(TextureKind),
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct PointerFlags: u8 {
        /// Pointee matrix data is stored row-major.
        const ROW_MAJOR = 1 << 0;
        /// Backed by a bound buffer rather than in-memory storage.
        const SSBO = 1 << 1;
        /// The base is an array of bindings; the first access-chain index
        /// selects the bind-array element.
        const BIND_ARRAY = 1 << 2;
        /// A physical pointer that has already been dereferenced once.
        const DEREFERENCED = 1 << 3;
    }
}

/// A buffer binding handed to the API wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BindIndex {
    pub descriptor_set: u32,
    pub binding: u32,
    /// Bind-array element, for arrayed descriptor bindings.
    pub array_index: u32,
}

/// A typed pointer. All fields are explicit; nothing shares storage with
/// numeric lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerValue {
    pub target: PointerTarget,
    /// The id this pointer chain originated from; mutations through any
    /// derived pointer group under this id for change tracking.
    pub base_id: Id,
    /// Pointed-to type, or `None` for opaque bindings.
    pub pointee_type: Option<Id>,
    /// Layout-source type once a buffer pointer has stepped inside its block;
    /// unset until the first dereference from a global binding.
    pub buffer_type_id: Option<Id>,
    /// Aggregate descent path for in-memory pointers (struct member and
    /// array element indices, applied in order against the target value).
    pub member_path: Vec<u32>,
    /// Pending scalar sub-selectors applied after dereference.
    pub row: Option<u8>,
    pub col: Option<u8>,
    pub flags: PointerFlags,
    /// Matrix (or strided column) stride in bytes.
    pub stride: u32,
    pub addr: PointerAddr,
    /// Buffer binding for SSBO/UBO-backed pointers.
    pub binding: Option<BindIndex>,
}

impl PointerValue {
    /// A fresh pointer at a target value, no narrowing applied.
    pub fn to_target(base_id: Id, target: PointerTarget, pointee_type: Option<Id>) -> PointerValue {
        PointerValue {
            target,
            base_id,
            pointee_type,
            buffer_type_id: None,
            member_path: Vec::new(),
            row: None,
            col: None,
            flags: PointerFlags::empty(),
            stride: 0,
            addr: PointerAddr::None,
            binding: None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.addr, PointerAddr::Texture(_))
    }

    pub fn is_buffer_backed(&self) -> bool {
        self.flags.contains(PointerFlags::SSBO) || self.target == PointerTarget::Physical
    }

    pub fn byte_offset(&self) -> u64 {
        match self.addr {
            PointerAddr::Bytes(offset) => offset,
            _ => 0,
        }
    }
}

/// The universal value container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShaderValue {
    Numeric(NumericValue),
    Pointer(Box<PointerValue>),
    /// Struct or array contents, one member per declared child.
    Aggregate(Vec<ShaderValue>),
}

impl ShaderValue {
    pub fn scalar_f32(value: f32) -> ShaderValue {
        ShaderValue::Numeric(NumericValue::scalar_f32(value))
    }

    pub fn scalar_u32(value: u32) -> ShaderValue {
        ShaderValue::Numeric(NumericValue::scalar_u32(value))
    }

    pub fn as_numeric(&self) -> Option<&NumericValue> {
        match self {
            ShaderValue::Numeric(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_numeric_mut(&mut self) -> Option<&mut NumericValue> {
        match self {
            ShaderValue::Numeric(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&PointerValue> {
        match self {
            ShaderValue::Pointer(p) => Some(p),
            _ => None,
        }
    }

    pub fn members(&self) -> &[ShaderValue] {
        match self {
            ShaderValue::Aggregate(members) => members,
            _ => &[],
        }
    }
}

/// One lane's (or the global table's) id -> value store.
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    entries: std::collections::HashMap<Id, ShaderValue>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Id) -> Option<&ShaderValue> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut ShaderValue> {
        self.entries.get_mut(&id)
    }

    pub fn set(&mut self, id: Id, value: ShaderValue) -> Option<ShaderValue> {
        self.entries.insert(id, value)
    }

    pub fn remove(&mut self, id: Id) -> Option<ShaderValue> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
