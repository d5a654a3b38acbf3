//! Type-driven traversal of variable layouts.
//!
//! One recursive walk serves three jobs, selected by the visitor supplied:
//! allocating a fresh poison-filled variable, reading a variable out of
//! backing storage, and writing one back. The walk itself only understands
//! shape and layout; all I/O happens in the visitor's leaf callback.

use tracing::warn;

use aperture_spirv::{DataType, Decorations, Id, Module};

use crate::api::DebugApi;
use crate::value::{
    BindIndex, NumericValue, PointerAddr, PointerTarget, PointerValue, ShaderValue,
};

/// Walk position: byte offset for byte-addressable aggregates, location
/// counter for pure interface variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAddr {
    Bytes(u64),
    Locations(u32),
}

impl WalkAddr {
    pub fn byte_offset(self) -> u64 {
        match self {
            WalkAddr::Bytes(offset) => offset,
            WalkAddr::Locations(_) => 0,
        }
    }

    pub fn location(self) -> u32 {
        match self {
            WalkAddr::Locations(loc) => loc,
            WalkAddr::Bytes(_) => 0,
        }
    }
}

/// Per-leaf callback for [`walk_variable`].
pub trait LeafVisitor {
    /// Called for every scalar/vector/matrix/pointer leaf. `value` is already
    /// shaped to match `type_id`; `decor` carries the effective layout
    /// decorations (matrix stride and majorness included).
    fn on_leaf(
        &mut self,
        path: &str,
        type_id: Id,
        decor: &Decorations,
        addr: WalkAddr,
        value: &mut ShaderValue,
    );
}

/// Recursively visits `value` according to `type_id`, reshaping it along the
/// way, and returns the number of interface locations consumed.
pub fn walk_variable<V: LeafVisitor>(
    module: &Module,
    decor: &Decorations,
    type_id: Id,
    addr: WalkAddr,
    value: &mut ShaderValue,
    path: &str,
    visitor: &mut V,
) -> u32 {
    let mut seeded = !matches!(addr, WalkAddr::Locations(_));
    walk_inner(module, decor, type_id, addr, value, path, visitor, &mut seeded)
}

#[allow(clippy::too_many_arguments)]
fn walk_inner<V: LeafVisitor>(
    module: &Module,
    decor: &Decorations,
    type_id: Id,
    addr: WalkAddr,
    value: &mut ShaderValue,
    path: &str,
    visitor: &mut V,
    location_seeded: &mut bool,
) -> u32 {
    // The first explicit Location on the logical base seeds the counter;
    // later ones are already accounted for by the walk itself.
    let addr = match (addr, decor.location) {
        (WalkAddr::Locations(_), Some(loc)) if !*location_seeded => {
            *location_seeded = true;
            WalkAddr::Locations(loc)
        }
        (a, _) => a,
    };

    let Some(ty) = module.types.get(type_id) else {
        warn!(type_id = type_id.0, "walk over unknown type id");
        return 0;
    };

    match ty {
        DataType::Scalar(scalar) => {
            ensure_numeric(value, NumericValue::from_scalar_type(*scalar, 1, 1));
            visitor.on_leaf(path, type_id, decor, addr, value);
            1
        }
        DataType::Vector { scalar, count } => {
            ensure_numeric(value, NumericValue::from_scalar_type(*scalar, 1, *count));
            visitor.on_leaf(path, type_id, decor, addr, value);
            1
        }
        DataType::Matrix { scalar, rows, cols } => {
            // Matrices are leaves; the visitor handles majorness-aware I/O
            // from the decorations.
            ensure_numeric(value, NumericValue::from_scalar_type(*scalar, *rows, *cols));
            visitor.on_leaf(path, type_id, decor, addr, value);
            *cols as u32
        }
        DataType::Pointer { pointee, .. } => {
            // Physical pointer leaf: the pointee is walked lazily on
            // dereference, never here.
            if !matches!(value, ShaderValue::Pointer(_)) {
                let mut ptr = PointerValue::to_target(type_id, PointerTarget::Physical, None);
                ptr.pointee_type = Some(*pointee);
                ptr.addr = PointerAddr::Bytes(0);
                *value = ShaderValue::Pointer(Box::new(ptr));
            }
            visitor.on_leaf(path, type_id, decor, addr, value);
            1
        }
        DataType::Struct { members } => {
            ensure_aggregate(value, members.len());
            let ShaderValue::Aggregate(children) = value else {
                unreachable!();
            };

            let mut consumed = 0u32;
            let mut cursor = addr.location();
            for (index, member) in members.iter().enumerate() {
                let child_decor = member.decorations.overlaid_on(decor);
                // A member's own Location may seed the counter, once per
                // logical base; after that locations are assigned
                // sequentially, never re-derived mid-walk.
                if let (WalkAddr::Locations(_), Some(loc)) = (addr, member.decorations.location) {
                    if !*location_seeded {
                        cursor = loc;
                        *location_seeded = true;
                    }
                }
                let child_addr = match addr {
                    WalkAddr::Bytes(base) => {
                        // Byte-addressable aggregates must decorate every
                        // member with an explicit offset.
                        debug_assert!(
                            member.decorations.byte_offset.is_some(),
                            "struct member without byte offset in byte-addressed walk"
                        );
                        WalkAddr::Bytes(base + member.decorations.byte_offset.unwrap_or(0) as u64)
                    }
                    WalkAddr::Locations(_) => WalkAddr::Locations(cursor),
                };
                let child_path = if member.name.is_empty() {
                    format!("{path}._child{index}")
                } else {
                    format!("{path}.{}", member.name)
                };
                let child_consumed = walk_inner(
                    module,
                    &child_decor,
                    member.type_id,
                    child_addr,
                    &mut children[index],
                    &child_path,
                    visitor,
                    location_seeded,
                );
                consumed += child_consumed;
                cursor += child_consumed;
            }
            consumed
        }
        DataType::Array {
            element,
            length,
            stride,
        } => {
            let len = module.array_length(*length);
            let stride = decor
                .array_stride
                .or(*stride)
                .map(|s| s as u64)
                .unwrap_or_else(|| decorated_byte_size(module, *element, decor));

            ensure_aggregate(value, len as usize);
            let ShaderValue::Aggregate(children) = value else {
                unreachable!();
            };

            let mut consumed = 0u32;
            for index in 0..len as usize {
                let child_addr = match addr {
                    WalkAddr::Bytes(base) => WalkAddr::Bytes(base + index as u64 * stride),
                    WalkAddr::Locations(loc) => WalkAddr::Locations(loc + consumed),
                };
                let child_path = format!("{path}[{index}]");
                consumed += walk_inner(
                    module,
                    decor,
                    *element,
                    child_addr,
                    &mut children[index],
                    &child_path,
                    visitor,
                    location_seeded,
                );
            }
            consumed
        }
    }
}

fn ensure_numeric(value: &mut ShaderValue, template: NumericValue) {
    match value {
        ShaderValue::Numeric(existing)
            if existing.rows == template.rows
                && existing.cols == template.cols
                && existing.byte_size == template.byte_size => {}
        _ => *value = ShaderValue::Numeric(template),
    }
}

fn ensure_aggregate(value: &mut ShaderValue, len: usize) {
    match value {
        ShaderValue::Aggregate(members) if members.len() == len => {}
        _ => {
            *value = ShaderValue::Aggregate(vec![
                ShaderValue::Numeric(NumericValue::with_shape(
                    crate::value::VarType::UInt,
                    4,
                    1,
                    1
                ));
                len
            ]);
        }
    }
}

/// Decorated byte size of a type: explicit strides/offsets when present,
/// tight packing otherwise. Used for ground-truth offset computation and
/// stride fallbacks.
pub fn decorated_byte_size(module: &Module, type_id: Id, decor: &Decorations) -> u64 {
    match module.types.get(type_id) {
        Some(DataType::Scalar(s)) => s.byte_size as u64,
        Some(DataType::Vector { scalar, count }) => scalar.byte_size as u64 * *count as u64,
        Some(DataType::Matrix { scalar, rows, cols }) => {
            let (major, minor) = if decor.row_major() {
                (*rows as u64, *cols as u64)
            } else {
                (*cols as u64, *rows as u64)
            };
            match decor.matrix_stride {
                Some(stride) => stride as u64 * (major - 1) + minor * scalar.byte_size as u64,
                None => scalar.byte_size as u64 * *rows as u64 * *cols as u64,
            }
        }
        Some(DataType::Struct { members }) => members
            .iter()
            .map(|m| {
                let d = m.decorations.overlaid_on(decor);
                m.decorations.byte_offset.unwrap_or(0) as u64
                    + decorated_byte_size(module, m.type_id, &d)
            })
            .max()
            .unwrap_or(0),
        Some(DataType::Array {
            element,
            length,
            stride,
        }) => {
            let len = module.array_length(*length) as u64;
            let stride = decor
                .array_stride
                .or(*stride)
                .map(|s| s as u64)
                .unwrap_or_else(|| decorated_byte_size(module, *element, decor));
            len * stride
        }
        Some(DataType::Pointer { .. }) => 8,
        None => 0,
    }
}

/// Fills every numeric leaf with the poison pattern.
pub struct PoisonInit;

impl LeafVisitor for PoisonInit {
    fn on_leaf(
        &mut self,
        _path: &str,
        _type_id: Id,
        _decor: &Decorations,
        _addr: WalkAddr,
        value: &mut ShaderValue,
    ) {
        if let ShaderValue::Numeric(n) = value {
            n.fill_poison();
        }
    }
}

/// Builds a fresh, uninitialized variable of the given type.
pub fn build_variable(module: &Module, decor: &Decorations, type_id: Id) -> ShaderValue {
    let mut value = ShaderValue::Numeric(NumericValue::with_shape(
        crate::value::VarType::UInt,
        4,
        1,
        1,
    ));
    walk_variable(
        module,
        decor,
        type_id,
        WalkAddr::Bytes(0),
        &mut value,
        "",
        &mut PoisonInit,
    );
    value
}

/// Where buffer-backed bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStorage {
    /// A bound SSBO/UBO resource.
    Bound(BindIndex),
    /// Physical storage buffer; the walk offset is relative to this address.
    Raw(u64),
}

impl BufferStorage {
    fn read(self, api: &mut dyn DebugApi, offset: u64, out: &mut [u8]) {
        match self {
            BufferStorage::Bound(bind) => api.read_buffer_value(bind, offset, out),
            BufferStorage::Raw(base) => api.read_address(base + offset, out),
        }
    }

    fn write(self, api: &mut dyn DebugApi, offset: u64, data: &[u8]) {
        match self {
            BufferStorage::Bound(bind) => api.write_buffer_value(bind, offset, data),
            BufferStorage::Raw(base) => api.write_address(base + offset, data),
        }
    }
}

/// Reads leaves out of buffer storage, honoring matrix majorness.
pub struct BufferReader<'a> {
    pub api: &'a mut dyn DebugApi,
    pub storage: BufferStorage,
}

impl LeafVisitor for BufferReader<'_> {
    fn on_leaf(
        &mut self,
        _path: &str,
        _type_id: Id,
        decor: &Decorations,
        addr: WalkAddr,
        value: &mut ShaderValue,
    ) {
        let offset = addr.byte_offset();
        match value {
            ShaderValue::Numeric(n) if n.rows > 1 => {
                read_matrix(self.api, self.storage, decor, offset, n);
            }
            ShaderValue::Numeric(n) => {
                let mut bytes = vec![0u8; n.lane_count() * n.byte_size as usize];
                self.storage.read(self.api, offset, &mut bytes);
                n.from_bytes(&bytes);
            }
            ShaderValue::Pointer(ptr) => {
                // A physical pointer stored in buffer memory is its 8-byte
                // address.
                let mut bytes = [0u8; 8];
                self.storage.read(self.api, offset, &mut bytes);
                ptr.addr = PointerAddr::Bytes(u64::from_le_bytes(bytes));
                ptr.target = PointerTarget::Physical;
            }
            ShaderValue::Aggregate(_) => {}
        }
    }
}

/// Writes leaves back into buffer storage, honoring matrix majorness.
pub struct BufferWriter<'a> {
    pub api: &'a mut dyn DebugApi,
    pub storage: BufferStorage,
}

impl LeafVisitor for BufferWriter<'_> {
    fn on_leaf(
        &mut self,
        _path: &str,
        _type_id: Id,
        decor: &Decorations,
        addr: WalkAddr,
        value: &mut ShaderValue,
    ) {
        let offset = addr.byte_offset();
        match value {
            ShaderValue::Numeric(n) if n.rows > 1 => {
                write_matrix(self.api, self.storage, decor, offset, n);
            }
            ShaderValue::Numeric(n) => {
                let bytes = n.to_bytes();
                self.storage.write(self.api, offset, &bytes);
            }
            ShaderValue::Pointer(ptr) => {
                let bytes = ptr.byte_offset().to_le_bytes();
                self.storage.write(self.api, offset, &bytes);
            }
            ShaderValue::Aggregate(_) => {}
        }
    }
}

fn matrix_stride(decor: &Decorations, n: &NumericValue) -> u64 {
    let minor = if decor.row_major() { n.cols } else { n.rows };
    decor
        .matrix_stride
        .map(|s| s as u64)
        .unwrap_or(minor as u64 * n.byte_size as u64)
}

fn read_matrix(
    api: &mut dyn DebugApi,
    storage: BufferStorage,
    decor: &Decorations,
    offset: u64,
    n: &mut NumericValue,
) {
    let stride = matrix_stride(decor, n);
    let elem = n.byte_size as usize;
    if decor.row_major() {
        // One contiguous row per stride step.
        for r in 0..n.rows {
            let mut bytes = vec![0u8; n.cols as usize * elem];
            storage.read(api, offset + r as u64 * stride, &mut bytes);
            for c in 0..n.cols {
                n.set_lane(r, c, read_word(&bytes[c as usize * elem..], elem));
            }
        }
    } else {
        // One contiguous column per stride step; transpose into row-major
        // lanes as we go.
        for c in 0..n.cols {
            let mut bytes = vec![0u8; n.rows as usize * elem];
            storage.read(api, offset + c as u64 * stride, &mut bytes);
            for r in 0..n.rows {
                n.set_lane(r, c, read_word(&bytes[r as usize * elem..], elem));
            }
        }
    }
}

fn write_matrix(
    api: &mut dyn DebugApi,
    storage: BufferStorage,
    decor: &Decorations,
    offset: u64,
    n: &NumericValue,
) {
    let stride = matrix_stride(decor, n);
    let elem = n.byte_size as usize;
    if decor.row_major() {
        for r in 0..n.rows {
            let mut bytes = vec![0u8; n.cols as usize * elem];
            for c in 0..n.cols {
                write_word(&mut bytes[c as usize * elem..], elem, n.lane(r, c));
            }
            storage.write(api, offset + r as u64 * stride, &bytes);
        }
    } else {
        for c in 0..n.cols {
            let mut bytes = vec![0u8; n.rows as usize * elem];
            for r in 0..n.rows {
                write_word(&mut bytes[r as usize * elem..], elem, n.lane(r, c));
            }
            storage.write(api, offset + c as u64 * stride, &bytes);
        }
    }
}

fn read_word(bytes: &[u8], size: usize) -> u64 {
    let mut word = [0u8; 8];
    word[..size].copy_from_slice(&bytes[..size]);
    u64::from_le_bytes(word)
}

fn write_word(bytes: &mut [u8], size: usize, word: u64) {
    bytes[..size].copy_from_slice(&word.to_le_bytes()[..size]);
}
