//! The pointer engine: composite-pointer construction, dereference and
//! write-through.
//!
//! Two regimes exist. Buffer-backed pointers (SSBO/UBO/physical) accumulate a
//! byte offset as the access chain descends and route leaf I/O through the
//! layout walker against the API wrapper. In-memory pointers alias another
//! value directly and carry the descent as a member path plus at most two
//! pending scalar selectors.

use tracing::warn;

use aperture_spirv::{DataType, Decorations, DecorationFlags, Id, Module};

use crate::api::{DebugApi, DebugMessage};
use crate::value::{
    NumericValue, PointerAddr, PointerFlags, PointerTarget, PointerValue, RegisterFile,
    ShaderValue,
};
use crate::walker::{self, BufferReader, BufferStorage, BufferWriter, WalkAddr};

/// Read-only views of the two storage owners a pointer may reference.
pub struct StorageRefs<'a> {
    pub globals: &'a RegisterFile,
    pub locals: &'a RegisterFile,
}

/// Mutable views, for write-through.
pub struct StorageRefsMut<'a> {
    pub globals: &'a mut RegisterFile,
    pub locals: &'a mut RegisterFile,
}

impl<'a> StorageRefsMut<'a> {
    pub fn reborrow(&self) -> StorageRefs<'_> {
        StorageRefs {
            globals: self.globals,
            locals: self.locals,
        }
    }
}

/// Produces a pointer value referencing `target`, tagged with `base_id` for
/// change-grouping, with optional pre-applied scalar selectors.
pub fn make_pointer_variable(
    base_id: Id,
    target: PointerTarget,
    pointee_type: Option<Id>,
    row: Option<u8>,
    col: Option<u8>,
) -> PointerValue {
    let mut ptr = PointerValue::to_target(base_id, target, pointee_type);
    ptr.row = row;
    ptr.col = col;
    ptr
}

/// Clamps an access-chain index into `[0, max]`, diagnosing once per engine
/// call so a wide access does not spam identical messages.
struct IndexClamp<'a> {
    api: &'a mut dyn DebugApi,
    base_id: Id,
    warned: bool,
}

impl<'a> IndexClamp<'a> {
    fn new(api: &'a mut dyn DebugApi, base_id: Id) -> Self {
        IndexClamp {
            api,
            base_id,
            warned: false,
        }
    }

    fn clamp(&mut self, index: u32, count: u32, what: &str) -> u32 {
        if count == 0 || index < count {
            return index;
        }
        self.diagnose(index, count, what);
        count - 1
    }

    /// Struct descent. Zero members means there is nothing to step into; the
    /// caller skips the descent instead of indexing out of bounds.
    fn member(&mut self, index: u32, count: u32) -> Option<usize> {
        if count == 0 {
            self.diagnose(index, count, "struct member");
            return None;
        }
        Some(self.clamp(index, count, "struct member") as usize)
    }

    fn diagnose(&mut self, index: u32, count: u32, what: &str) {
        if self.warned {
            return;
        }
        self.warned = true;
        warn!(base = self.base_id.0, index, count, what, "access-chain index out of bounds");
        let target = self
            .api
            .resolve_binding_name(self.base_id)
            .unwrap_or_else(|| format!("pointer from id {}", self.base_id));
        self.api.add_debug_message(DebugMessage::execution_high(format!(
            "Out of bounds {what} index {index} (of {count}) accessing {target}; clamping"
        )));
    }

    fn too_many_selectors(&mut self) {
        self.api.add_debug_message(DebugMessage::unsupported(format!(
            "More than two trailing scalar selectors on pointer from id {}; \
             ignoring the rest",
            self.base_id
        )));
    }
}

/// Walks an access chain from `base`, producing a pointer one or more levels
/// deeper.
pub fn make_composite_pointer(
    module: &Module,
    api: &mut dyn DebugApi,
    base: &PointerValue,
    indices: &[u32],
) -> PointerValue {
    let mut ptr = if base.is_buffer_backed() {
        composite_buffer(module, api, base, indices)
    } else {
        composite_in_memory(module, api, base, indices)
    };
    // Stepping into a physical pointer dereferences it; from here on it
    // reads like any other buffer pointer instead of displaying as a raw
    // address.
    if ptr.target == PointerTarget::Physical {
        ptr.flags |= PointerFlags::DEREFERENCED;
    }
    ptr
}

fn composite_buffer(
    module: &Module,
    api: &mut dyn DebugApi,
    base: &PointerValue,
    indices: &[u32],
) -> PointerValue {
    let mut ptr = base.clone();
    let mut clamp = IndexClamp::new(api, base.base_id);
    let mut offset = base.byte_offset();
    let mut cur_type = base.pointee_type;
    let mut remaining = indices;

    // The very first dereference from an arrayed global binding consumes a
    // leading index as the bind-array selector; subsequent composites (which
    // have a buffer type recorded) never do.
    if ptr.flags.contains(PointerFlags::BIND_ARRAY) && ptr.buffer_type_id.is_none() {
        if let Some((&first, rest)) = remaining.split_first() {
            if let Some(bind) = ptr.binding.as_mut() {
                bind.array_index = first;
            }
            remaining = rest;
        }
    }
    ptr.buffer_type_id = cur_type;

    for (position, &index) in remaining.iter().enumerate() {
        let Some(type_id) = cur_type else { break };
        let Some(ty) = module.types.get(type_id) else {
            warn!(type_id = type_id.0, "composite pointer into unknown type");
            break;
        };

        match ty {
            DataType::Struct { members } => {
                let Some(index) = clamp.member(index, members.len() as u32) else {
                    break;
                };
                let member = &members[index];
                offset += member.decorations.byte_offset.unwrap_or(0) as u64;
                if let Some(stride) = member.decorations.matrix_stride {
                    ptr.stride = stride;
                }
                ptr.flags.set(
                    PointerFlags::ROW_MAJOR,
                    member.decorations.flags.contains(DecorationFlags::ROW_MAJOR),
                );
                cur_type = Some(member.type_id);
            }
            DataType::Array {
                element,
                length,
                stride,
            } => {
                let len = module.array_length(*length);
                // Runtime-sized arrays report zero; don't clamp those.
                let index = if len > 0 {
                    clamp.clamp(index, len, "array element")
                } else {
                    index
                };
                let stride = stride.map(|s| s as u64).unwrap_or_else(|| {
                    walker::decorated_byte_size(module, *element, &Decorations::default())
                });
                offset += index as u64 * stride;
                cur_type = Some(*element);
            }
            DataType::Matrix { scalar, rows, cols } => {
                let elem = scalar.byte_size as u64;
                let stride = if ptr.stride != 0 {
                    ptr.stride as u64
                } else if ptr.flags.contains(PointerFlags::ROW_MAJOR) {
                    *cols as u64 * elem
                } else {
                    *rows as u64 * elem
                };
                let col = clamp.clamp(index, *cols as u32, "matrix column") as u64;
                let trailing = &remaining[position + 1..];
                match trailing.first() {
                    Some(&row_index) => {
                        // Two indices select one scalar.
                        let row = clamp.clamp(row_index, *rows as u32, "matrix row") as u64;
                        if ptr.flags.contains(PointerFlags::ROW_MAJOR) {
                            offset += stride * row + elem * col;
                        } else {
                            offset += stride * col + elem * row;
                        }
                        ptr.row = Some(row as u8);
                        ptr.col = Some(col as u8);
                        if trailing.len() > 1 {
                            clamp.too_many_selectors();
                        }
                    }
                    None => {
                        // One index selects a column vector. Row-major
                        // storage makes it strided; the pointer keeps the
                        // stride so the read can gather.
                        if ptr.flags.contains(PointerFlags::ROW_MAJOR) {
                            offset += elem * col;
                        } else {
                            offset += stride * col;
                        }
                        ptr.col = Some(col as u8);
                    }
                }
                ptr.stride = stride as u32;
                ptr.pointee_type = cur_type;
                ptr.addr = PointerAddr::Bytes(offset);
                return ptr;
            }
            DataType::Vector { scalar, count } => {
                let index = clamp.clamp(index, *count as u32, "vector component");
                offset += index as u64 * scalar.byte_size as u64;
                ptr.col = Some(index as u8);
                if position + 1 < remaining.len() {
                    clamp.too_many_selectors();
                }
                ptr.pointee_type = cur_type;
                ptr.addr = PointerAddr::Bytes(offset);
                return ptr;
            }
            DataType::Scalar(_) | DataType::Pointer { .. } => {
                warn!(base = ptr.base_id.0, "access chain descends into a leaf");
                break;
            }
        }
    }

    ptr.pointee_type = cur_type;
    ptr.row = None;
    ptr.col = None;
    ptr.addr = PointerAddr::Bytes(offset);
    ptr
}

fn composite_in_memory(
    module: &Module,
    api: &mut dyn DebugApi,
    base: &PointerValue,
    indices: &[u32],
) -> PointerValue {
    let mut ptr = base.clone();
    let mut clamp = IndexClamp::new(api, base.base_id);
    let mut cur_type = base.pointee_type;

    // Bind arrays of opaque handles consume the leading index too.
    let mut remaining = indices;
    if ptr.flags.contains(PointerFlags::BIND_ARRAY) && ptr.buffer_type_id.is_none() {
        if let Some((&first, rest)) = remaining.split_first() {
            if let Some(bind) = ptr.binding.as_mut() {
                bind.array_index = first;
            }
            remaining = rest;
        }
        ptr.buffer_type_id = cur_type;
    }

    for &index in remaining {
        let ty = cur_type.and_then(|id| module.types.get(id));
        match ty {
            Some(DataType::Struct { members }) => {
                let Some(index) = clamp.member(index, members.len() as u32) else {
                    break;
                };
                ptr.member_path.push(index as u32);
                cur_type = Some(members[index].type_id);
            }
            Some(DataType::Array {
                element, length, ..
            }) => {
                let len = module.array_length(*length);
                let index = if len > 0 {
                    clamp.clamp(index, len, "array element")
                } else {
                    index
                };
                ptr.member_path.push(index);
                cur_type = Some(*element);
            }
            Some(DataType::Matrix { rows, cols, .. }) => {
                if ptr.col.is_none() {
                    ptr.col = Some(clamp.clamp(index, *cols as u32, "matrix column") as u8);
                } else if ptr.row.is_none() {
                    ptr.row = Some(clamp.clamp(index, *rows as u32, "matrix row") as u8);
                } else {
                    // At most two trailing selectors are ever carried.
                    clamp.too_many_selectors();
                }
            }
            Some(DataType::Vector { count, .. }) => {
                if ptr.col.is_none() {
                    ptr.col = Some(clamp.clamp(index, *count as u32, "vector component") as u8);
                } else {
                    clamp.too_many_selectors();
                }
            }
            _ => break,
        }
    }

    ptr.pointee_type = cur_type;
    ptr
}

/// Resolves the value a pointer's target handle refers to.
pub fn resolve_target<'v>(refs: &StorageRefs<'v>, ptr: &PointerValue) -> Option<&'v ShaderValue> {
    match ptr.target {
        PointerTarget::Global(id) => refs.globals.get(id),
        PointerTarget::Local(id) => refs.locals.get(id),
        PointerTarget::Physical => None,
    }
}

fn navigate<'v>(value: &'v ShaderValue, path: &[u32]) -> &'v ShaderValue {
    let mut cur = value;
    for &index in path {
        match cur {
            ShaderValue::Aggregate(members) if !members.is_empty() => {
                let index = (index as usize).min(members.len() - 1);
                cur = &members[index];
            }
            _ => break,
        }
    }
    cur
}

fn navigate_mut<'v>(value: &'v mut ShaderValue, path: &[u32]) -> &'v mut ShaderValue {
    let mut cur = value;
    for &index in path {
        if !matches!(&*cur, ShaderValue::Aggregate(members) if !members.is_empty()) {
            break;
        }
        let step = cur;
        cur = match step {
            ShaderValue::Aggregate(members) => {
                let index = (index as usize).min(members.len() - 1);
                &mut members[index]
            }
            other => other,
        };
    }
    cur
}

/// Narrows a numeric leaf by pending scalar selectors. Both set collapses to
/// a 1x1 scalar.
fn apply_selectors(n: &NumericValue, row: Option<u8>, col: Option<u8>) -> NumericValue {
    let clamp_row = |r: u8| r.min(n.rows.saturating_sub(1));
    let clamp_col = |c: u8| c.min(n.cols.saturating_sub(1));
    match (row, col) {
        (Some(r), Some(c)) => {
            let mut out = NumericValue::with_shape(n.ty, n.byte_size, 1, 1);
            out.words[0] = n.lane(clamp_row(r), clamp_col(c));
            out
        }
        (None, Some(c)) if n.rows > 1 => {
            // Column of a matrix, presented as a vector.
            let c = clamp_col(c);
            let mut out = NumericValue::with_shape(n.ty, n.byte_size, 1, n.rows);
            for r in 0..n.rows {
                out.words[r as usize] = n.lane(r, c);
            }
            out
        }
        (None, Some(c)) => {
            let mut out = NumericValue::with_shape(n.ty, n.byte_size, 1, 1);
            out.words[0] = n.lane(0, clamp_col(c));
            out
        }
        (Some(r), None) => {
            let r = clamp_row(r);
            let mut out = NumericValue::with_shape(n.ty, n.byte_size, 1, n.cols);
            for c in 0..n.cols {
                out.words[c as usize] = n.lane(r, c);
            }
            out
        }
        (None, None) => n.clone(),
    }
}

fn pointer_layout_decor(ptr: &PointerValue) -> Decorations {
    let mut decor = Decorations::default();
    if ptr.flags.contains(PointerFlags::ROW_MAJOR) {
        decor.flags |= DecorationFlags::ROW_MAJOR;
    }
    if ptr.stride != 0 {
        decor.matrix_stride = Some(ptr.stride);
    }
    decor
}

fn buffer_storage(ptr: &PointerValue) -> BufferStorage {
    match (ptr.target, ptr.binding) {
        (PointerTarget::Physical, _) => BufferStorage::Raw(0),
        (_, Some(bind)) => BufferStorage::Bound(bind),
        (_, None) => BufferStorage::Raw(0),
    }
}

/// Dereferences a pointer to its current value.
pub fn read_from_pointer(
    module: &Module,
    api: &mut dyn DebugApi,
    refs: &StorageRefs<'_>,
    ptr: &PointerValue,
) -> ShaderValue {
    if ptr.is_opaque() {
        // Opaque binding: hand back the descriptor value as-is.
        return resolve_target(refs, ptr)
            .cloned()
            .unwrap_or(ShaderValue::scalar_u32(0));
    }

    if ptr.is_buffer_backed() {
        return read_buffer_pointer(module, api, ptr);
    }

    let Some(target) = resolve_target(refs, ptr) else {
        warn!(base = ptr.base_id.0, "dangling in-memory pointer");
        return ShaderValue::scalar_u32(0);
    };
    let leaf = navigate(target, &ptr.member_path);
    match leaf {
        ShaderValue::Numeric(n) if ptr.row.is_some() || ptr.col.is_some() => {
            ShaderValue::Numeric(apply_selectors(n, ptr.row, ptr.col))
        }
        other => other.clone(),
    }
}

fn read_buffer_pointer(module: &Module, api: &mut dyn DebugApi, ptr: &PointerValue) -> ShaderValue {
    let Some(type_id) = ptr.pointee_type else {
        return ShaderValue::scalar_u32(0);
    };
    let storage = buffer_storage(ptr);
    let offset = ptr.byte_offset();
    let decor = pointer_layout_decor(ptr);

    match (module.types.get(type_id), ptr.row, ptr.col) {
        // Scalar selected out of a matrix or vector: single element read at
        // the already-moved offset.
        (Some(ty), row, col) if (row.is_some() || col.is_some()) => {
            let Some(scalar) = ty.scalar() else {
                return ShaderValue::scalar_u32(0);
            };
            let (rows, _cols) = ty.shape().unwrap_or((1, 1));
            match (ty, row, col) {
                // Column of a matrix: contiguous when column-major, strided
                // gather when row-major.
                (DataType::Matrix { .. }, None, Some(_)) => {
                    let mut n = NumericValue::from_scalar_type(scalar, 1, rows);
                    let step = if ptr.flags.contains(PointerFlags::ROW_MAJOR) {
                        ptr.stride as u64
                    } else {
                        scalar.byte_size as u64
                    };
                    for r in 0..rows {
                        let mut bytes = vec![0u8; scalar.byte_size as usize];
                        read_storage(api, storage, offset + r as u64 * step, &mut bytes);
                        n.words[r as usize] = read_word(&bytes);
                    }
                    ShaderValue::Numeric(n)
                }
                _ => {
                    let mut bytes = vec![0u8; scalar.byte_size as usize];
                    read_storage(api, storage, offset, &mut bytes);
                    let mut n = NumericValue::from_scalar_type(scalar, 1, 1);
                    n.words[0] = read_word(&bytes);
                    ShaderValue::Numeric(n)
                }
            }
        }
        _ => {
            let mut value = ShaderValue::scalar_u32(0);
            let mut reader = BufferReader { api, storage };
            walker::walk_variable(
                module,
                &decor,
                type_id,
                WalkAddr::Bytes(offset),
                &mut value,
                "",
                &mut reader,
            );
            value
        }
    }
}

/// Writes a value back through a pointer into its storage.
pub fn write_through_pointer(
    module: &Module,
    api: &mut dyn DebugApi,
    refs: &mut StorageRefsMut<'_>,
    ptr: &PointerValue,
    value: &ShaderValue,
) {
    if ptr.is_buffer_backed() {
        write_buffer_pointer(module, api, ptr, value);
        return;
    }

    let target = match ptr.target {
        PointerTarget::Global(id) => refs.globals.get_mut(id),
        PointerTarget::Local(id) => refs.locals.get_mut(id),
        PointerTarget::Physical => None,
    };
    let Some(target) = target else {
        warn!(base = ptr.base_id.0, "write through dangling pointer");
        return;
    };

    let leaf = navigate_mut(target, &ptr.member_path);
    match (leaf, ptr.row, ptr.col) {
        (ShaderValue::Numeric(n), row, col) if row.is_some() || col.is_some() => {
            write_selected_lanes(n, row, col, value);
        }
        (leaf, _, _) => *leaf = value.clone(),
    }
}

fn write_selected_lanes(n: &mut NumericValue, row: Option<u8>, col: Option<u8>, value: &ShaderValue) {
    let Some(src) = value.as_numeric() else { return };
    let rows = n.rows;
    let cols = n.cols;
    match (row, col) {
        (Some(r), Some(c)) => {
            n.set_lane(r.min(rows - 1), c.min(cols - 1), src.words[0]);
        }
        (None, Some(c)) if rows > 1 => {
            let c = c.min(cols - 1);
            for r in 0..rows {
                n.set_lane(r, c, src.words[(r as usize).min(src.lane_count() - 1)]);
            }
        }
        (None, Some(c)) => {
            n.set_lane(0, c.min(cols - 1), src.words[0]);
        }
        (Some(r), None) => {
            let r = r.min(rows - 1);
            for c in 0..cols {
                n.set_lane(r, c, src.words[(c as usize).min(src.lane_count() - 1)]);
            }
        }
        (None, None) => {}
    }
}

fn write_buffer_pointer(
    module: &Module,
    api: &mut dyn DebugApi,
    ptr: &PointerValue,
    value: &ShaderValue,
) {
    let Some(type_id) = ptr.pointee_type else { return };
    let storage = buffer_storage(ptr);
    let offset = ptr.byte_offset();
    let decor = pointer_layout_decor(ptr);

    match (module.types.get(type_id), ptr.row, ptr.col, value.as_numeric()) {
        (Some(DataType::Matrix { scalar, rows, .. }), None, Some(_), Some(src)) => {
            let step = if ptr.flags.contains(PointerFlags::ROW_MAJOR) {
                ptr.stride as u64
            } else {
                scalar.byte_size as u64
            };
            for r in 0..*rows {
                let word = src.words[(r as usize).min(src.lane_count() - 1)];
                write_storage(
                    api,
                    storage,
                    offset + r as u64 * step,
                    &word.to_le_bytes()[..scalar.byte_size as usize],
                );
            }
        }
        (Some(ty), row, col, Some(src)) if row.is_some() || col.is_some() => {
            let Some(scalar) = ty.scalar() else { return };
            write_storage(
                api,
                storage,
                offset,
                &src.words[0].to_le_bytes()[..scalar.byte_size as usize],
            );
        }
        _ => {
            let mut scratch = value.clone();
            let mut writer = BufferWriter { api, storage };
            walker::walk_variable(
                module,
                &decor,
                type_id,
                WalkAddr::Bytes(offset),
                &mut scratch,
                "",
                &mut writer,
            );
        }
    }
}

/// Pointer value for display or pass-through: opaque pointers yield their
/// binding value, un-dereferenced physical pointers yield themselves (so a
/// raw address can be shown), everything else dereferences.
pub fn get_pointer_value(
    module: &Module,
    api: &mut dyn DebugApi,
    refs: &StorageRefs<'_>,
    ptr: &PointerValue,
) -> ShaderValue {
    if ptr.is_opaque() {
        return resolve_target(refs, ptr)
            .cloned()
            .unwrap_or(ShaderValue::scalar_u32(0));
    }
    if ptr.target == PointerTarget::Physical && !ptr.flags.contains(PointerFlags::DEREFERENCED) {
        return ShaderValue::Pointer(Box::new(ptr.clone()));
    }
    read_from_pointer(module, api, refs, ptr)
}

fn read_storage(api: &mut dyn DebugApi, storage: BufferStorage, offset: u64, out: &mut [u8]) {
    match storage {
        BufferStorage::Bound(bind) => api.read_buffer_value(bind, offset, out),
        BufferStorage::Raw(base) => api.read_address(base + offset, out),
    }
}

fn write_storage(api: &mut dyn DebugApi, storage: BufferStorage, offset: u64, data: &[u8]) {
    match storage {
        BufferStorage::Bound(bind) => api.write_buffer_value(bind, offset, data),
        BufferStorage::Raw(base) => api.write_address(base + offset, data),
    }
}

fn read_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(word)
}

/// Convenience for stepping code: the pointer inside a register value.
pub fn expect_pointer<'v>(value: Option<&'v ShaderValue>) -> Option<&'v PointerValue> {
    value.and_then(ShaderValue::as_pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;
    use crate::value::{BindIndex, VarType};
    use aperture_spirv::test_utils::ModuleBuilder;
    use aperture_spirv::{ArrayLength, ScalarType, StructMember};

    fn mat4_struct() -> (Module, Id, Id) {
        // struct { mat4 m; } with explicit layout, matrix at offset 16.
        let mut b = ModuleBuilder::new();
        let mat4 = b.ty(DataType::Matrix {
            scalar: ScalarType::F32,
            rows: 4,
            cols: 4,
        });
        let st = b.ty(DataType::Struct {
            members: vec![StructMember {
                name: "m".into(),
                type_id: mat4,
                decorations: Decorations {
                    byte_offset: Some(16),
                    matrix_stride: Some(16),
                    ..Default::default()
                },
            }],
        });
        (b.build(), st, mat4)
    }

    fn ssbo_pointer(block: Id) -> PointerValue {
        let mut ptr = PointerValue::to_target(Id(100), PointerTarget::Global(Id(100)), Some(block));
        ptr.flags |= PointerFlags::SSBO;
        ptr.binding = Some(BindIndex::default());
        ptr.addr = PointerAddr::Bytes(0);
        ptr
    }

    #[test]
    fn buffer_matrix_scalar_offsets_column_major() {
        let (module, st, _) = mat4_struct();
        let mut api = MockApi::new();

        // m[2][3]: column 2, row 3. Column-major: 16 + stride*col + elem*row.
        let ptr = make_composite_pointer(&module, &mut api, &ssbo_pointer(st), &[0, 2, 3]);
        assert_eq!(ptr.byte_offset(), 16 + 16 * 2 + 4 * 3);
        assert_eq!((ptr.row, ptr.col), (Some(3), Some(2)));
        assert!(api.messages.is_empty());
    }

    #[test]
    fn buffer_matrix_scalar_offsets_row_major() {
        let (mut module, _, mat4) = mat4_struct();
        // Rebuild the struct with a row-major member.
        let st = Id(50);
        module.types.insert(
            st,
            DataType::Struct {
                members: vec![StructMember {
                    name: "m".into(),
                    type_id: mat4,
                    decorations: Decorations {
                        byte_offset: Some(16),
                        matrix_stride: Some(16),
                        flags: DecorationFlags::ROW_MAJOR,
                        ..Default::default()
                    },
                }],
            },
        );
        let mut api = MockApi::new();

        // Row-major: 16 + stride*row + elem*col.
        let ptr = make_composite_pointer(&module, &mut api, &ssbo_pointer(st), &[0, 2, 3]);
        assert_eq!(ptr.byte_offset(), 16 + 16 * 3 + 4 * 2);
    }

    #[test]
    fn out_of_range_component_clamps_with_one_message() {
        let mut b = ModuleBuilder::new();
        let vec4 = b.ty(DataType::Vector {
            scalar: ScalarType::F32,
            count: 4,
        });
        let st = b.ty(DataType::Struct {
            members: vec![StructMember {
                name: "v".into(),
                type_id: vec4,
                decorations: Decorations {
                    byte_offset: Some(0),
                    ..Default::default()
                },
            }],
        });
        let module = b.build();
        let mut api = MockApi::new();

        // Component 7 of a 4-vector clamps to 3.
        let ptr = make_composite_pointer(&module, &mut api, &ssbo_pointer(st), &[0, 7]);
        assert_eq!(ptr.byte_offset(), 4 * 3);
        assert_eq!(ptr.col, Some(3));
        assert_eq!(api.messages.len(), 1);
    }

    #[test]
    fn clamp_diagnostic_names_the_binding() {
        let mut b = ModuleBuilder::new();
        let vec4 = b.ty(DataType::Vector {
            scalar: ScalarType::F32,
            count: 4,
        });
        let st = b.ty(DataType::Struct {
            members: vec![StructMember {
                name: "v".into(),
                type_id: vec4,
                decorations: Decorations {
                    byte_offset: Some(0),
                    ..Default::default()
                },
            }],
        });
        let module = b.build();
        let mut api = MockApi::new();
        api.binding_names.insert(Id(100), "lights".into());

        make_composite_pointer(&module, &mut api, &ssbo_pointer(st), &[0, 7]);
        assert_eq!(api.messages.len(), 1);
        assert!(api.messages[0].text.contains("lights"));
    }

    #[test]
    fn in_memory_selectors_collapse_to_scalar() {
        let mut b = ModuleBuilder::new();
        let mat2 = b.ty(DataType::Matrix {
            scalar: ScalarType::F32,
            rows: 2,
            cols: 2,
        });
        let module = b.build();
        let mut api = MockApi::new();

        let mut storage = RegisterFile::new();
        let mut m = NumericValue::with_shape(VarType::Float, 4, 2, 2);
        m.set_lane(1, 0, 7.5f32.to_bits() as u64);
        storage.set(Id(5), ShaderValue::Numeric(m));

        let base = make_pointer_variable(Id(5), PointerTarget::Local(Id(5)), Some(mat2), None, None);
        // m[0][1]: column 0, row 1.
        let ptr = make_composite_pointer(&module, &mut api, &base, &[0, 1]);

        let globals = RegisterFile::new();
        let refs = StorageRefs {
            globals: &globals,
            locals: &storage,
        };
        let value = read_from_pointer(&module, &mut api, &refs, &ptr);
        let n = value.as_numeric().unwrap();
        assert_eq!((n.rows, n.cols), (1, 1));
        assert_eq!(n.as_f32(0, 0), 7.5);
    }

    #[test]
    fn in_memory_array_descends_members() {
        let mut b = ModuleBuilder::new();
        let f32_ty = b.ty(DataType::Scalar(ScalarType::F32));
        let arr = b.ty(DataType::Array {
            element: f32_ty,
            length: ArrayLength::Fixed(3),
            stride: None,
        });
        let module = b.build();
        let mut api = MockApi::new();

        let mut storage = RegisterFile::new();
        storage.set(
            Id(9),
            ShaderValue::Aggregate(vec![
                ShaderValue::scalar_f32(1.0),
                ShaderValue::scalar_f32(2.0),
                ShaderValue::scalar_f32(3.0),
            ]),
        );

        let base = make_pointer_variable(Id(9), PointerTarget::Local(Id(9)), Some(arr), None, None);
        let ptr = make_composite_pointer(&module, &mut api, &base, &[2]);
        assert_eq!(ptr.member_path, vec![2]);

        let globals = RegisterFile::new();
        let refs = StorageRefs {
            globals: &globals,
            locals: &storage,
        };
        let value = read_from_pointer(&module, &mut api, &refs, &ptr);
        assert_eq!(value.as_numeric().unwrap().as_f32(0, 0), 3.0);
    }

    #[test]
    fn write_then_read_through_selector_pointer() {
        let mut b = ModuleBuilder::new();
        let vec4 = b.ty(DataType::Vector {
            scalar: ScalarType::F32,
            count: 4,
        });
        let module = b.build();
        let mut api = MockApi::new();

        let mut storage = RegisterFile::new();
        storage.set(
            Id(3),
            ShaderValue::Numeric(NumericValue::vec_f32(&[0.0, 0.0, 0.0, 0.0])),
        );

        let base = make_pointer_variable(Id(3), PointerTarget::Local(Id(3)), Some(vec4), None, None);
        let ptr = make_composite_pointer(&module, &mut api, &base, &[1]);

        let mut globals = RegisterFile::new();
        {
            let mut refs = StorageRefsMut {
                globals: &mut globals,
                locals: &mut storage,
            };
            write_through_pointer(
                &module,
                &mut api,
                &mut refs,
                &ptr,
                &ShaderValue::scalar_f32(9.25),
            );
        }

        let refs = StorageRefs {
            globals: &globals,
            locals: &storage,
        };
        let value = read_from_pointer(&module, &mut api, &refs, &ptr);
        assert_eq!(value.as_numeric().unwrap().as_f32(0, 0), 9.25);

        // The sibling lanes are untouched.
        let whole = storage.get(Id(3)).unwrap().as_numeric().unwrap();
        assert_eq!(whole.as_f32(0, 0), 0.0);
        assert_eq!(whole.as_f32(0, 1), 9.25);
    }

    #[test]
    fn empty_struct_index_diagnoses_instead_of_descending() {
        let mut b = ModuleBuilder::new();
        let st = b.ty(DataType::Struct { members: vec![] });
        let module = b.build();
        let mut api = MockApi::new();

        let ptr = make_composite_pointer(&module, &mut api, &ssbo_pointer(st), &[0]);
        assert_eq!(ptr.pointee_type, Some(st));
        assert_eq!(ptr.byte_offset(), 0);
        assert_eq!(api.messages.len(), 1);
        assert!(api.messages[0].text.contains("Out of bounds"));

        let base =
            make_pointer_variable(Id(8), PointerTarget::Local(Id(8)), Some(st), None, None);
        let ptr = make_composite_pointer(&module, &mut api, &base, &[3]);
        assert!(ptr.member_path.is_empty());
        assert_eq!(api.messages.len(), 2);
    }

    #[test]
    fn physical_pointer_reads_after_first_dereference() {
        let mut b = ModuleBuilder::new();
        let f32_ty = b.ty(DataType::Scalar(ScalarType::F32));
        let st = b.ty(DataType::Struct {
            members: vec![StructMember {
                name: "value".into(),
                type_id: f32_ty,
                decorations: Decorations {
                    byte_offset: Some(0),
                    ..Default::default()
                },
            }],
        });
        let module = b.build();
        let mut api = MockApi::new();
        api.write_address(16, &7.5f32.to_le_bytes());

        let mut base = PointerValue::to_target(Id(7), PointerTarget::Physical, Some(st));
        base.addr = PointerAddr::Bytes(16);

        let globals = RegisterFile::new();
        let locals = RegisterFile::new();
        let refs = StorageRefs {
            globals: &globals,
            locals: &locals,
        };

        // Untouched, the raw address displays as a pointer.
        let raw = get_pointer_value(&module, &mut api, &refs, &base);
        assert!(matches!(raw, ShaderValue::Pointer(_)));

        // One access-chain step marks it dereferenced and it reads as data.
        let deeper = make_composite_pointer(&module, &mut api, &base, &[0]);
        assert!(deeper.flags.contains(PointerFlags::DEREFERENCED));
        let value = get_pointer_value(&module, &mut api, &refs, &deeper);
        assert_eq!(value.as_numeric().unwrap().as_f32(0, 0), 7.5);
    }
}
