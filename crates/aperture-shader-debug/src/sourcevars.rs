//! Source-level variable reconstruction.
//!
//! Debug info records, per instruction, which registers hold which pieces of
//! which source variables. This module replays those facts at the debugged
//! lane's current instruction and flattens them into display mappings: one
//! row per visible (sub-)variable, each referencing the registers that back
//! its components.
//!
//! Compilers routinely scalarize a vector into per-component registers; when
//! every component of a vector was remapped by the same instruction the
//! components are collapsed back into a single vector row, which is how the
//! variable reads in the source. Components updated at different times stay
//! separate so stale and fresh parts are distinguishable.

use std::collections::BTreeMap;

use serde::Serialize;

use aperture_spirv::{DataType, Id, LocalMapping, Module, SourceVariableDebugInfo};

use crate::debugger::GlobalState;
use crate::thread::ThreadState;
use crate::walker;

/// One backing register component of a source variable component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugVariableReference {
    pub register: Id,
    /// Flattened component index within the register's value.
    pub component: u8,
}

/// One display row: a visible source (sub-)variable and its backing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceVariableMapping {
    /// Source-level path, e.g. `light.dir.x` or `weights[2]`.
    pub name: String,
    pub rows: u8,
    pub columns: u8,
    /// Offset of this piece within the flattened source variable, tightly
    /// packed.
    pub byte_offset: u64,
    /// One reference per component, row-major. Empty when the variable is
    /// declared but nothing holds its value yet.
    pub variables: Vec<DebugVariableReference>,
}

/// Where a descent through a source variable's type landed.
enum Cursor {
    /// The path ends on a full type.
    Whole(Id),
    /// One index into a matrix: a column vector.
    Column { rows: u8 },
    /// A single scalar component.
    Component,
}

/// Reconstructs the source-variable view for one lane at one instruction.
pub fn fill_debug_source_vars(
    module: &Module,
    global: &GlobalState,
    thread: &ThreadState,
    instruction: usize,
) -> Vec<SourceVariableMapping> {
    let mut out = Vec::new();
    for sv in &module.source_vars {
        let Some(scope) = module.scopes.get(sv.scope) else {
            continue;
        };
        if !scope.contains(instruction) {
            continue;
        }
        let latest = latest_mappings(module, global, thread, sv.id, instruction);
        emit_variable(module, sv, &latest, &mut out);
    }
    out
}

/// The most recent still-live mapping per sub-object path, in path order.
/// `local_mappings` is sorted by instruction, so a plain insert keeps the
/// newest fact per path.
fn latest_mappings<'m>(
    module: &'m Module,
    global: &GlobalState,
    thread: &ThreadState,
    source_var: Id,
    instruction: usize,
) -> BTreeMap<Vec<u32>, &'m LocalMapping> {
    let mut latest = BTreeMap::new();
    for mapping in &module.local_mappings {
        if mapping.instruction > instruction {
            break;
        }
        if mapping.source_var != source_var {
            continue;
        }
        if let Some(register) = mapping.register {
            let live = thread.registers.contains(register)
                || global.pointers.contains(register)
                || module.constants.contains_key(&register);
            if !live {
                continue;
            }
        }
        latest.insert(mapping.index_path.clone(), mapping);
    }
    latest
}

fn emit_variable(
    module: &Module,
    sv: &SourceVariableDebugInfo,
    latest: &BTreeMap<Vec<u32>, &LocalMapping>,
    out: &mut Vec<SourceVariableMapping>,
) {
    let mut collapsed: Vec<Vec<u32>> = Vec::new();

    for (path, mapping) in latest {
        if collapsed.iter().any(|p| p == path) {
            continue;
        }
        if mapping.is_declare {
            match mapping.register {
                Some(register) => {
                    emit_declare_leaves(module, sv, path, register, latest, out);
                }
                None => {
                    // Declared, no storage yet.
                    let (rows, columns) = cursor_shape(module, descend(module, sv.type_id, path));
                    out.push(SourceVariableMapping {
                        name: render_name(module, sv, path),
                        rows,
                        columns,
                        byte_offset: path_offset(module, sv.type_id, path),
                        variables: Vec::new(),
                    });
                }
            }
            continue;
        }
        let Some(register) = mapping.register else {
            continue;
        };

        // A scalar component of a vector (or matrix column) may be one of
        // several siblings scalarized by the same instruction; those fold
        // back into one row.
        if let Some(Cursor::Component) = descend(module, sv.type_id, path) {
            if let Some(group) = sibling_group(module, sv, latest, path, mapping.instruction) {
                let parent = &path[..path.len() - 1];
                let (rows, columns) = cursor_shape(module, descend(module, sv.type_id, parent));
                out.push(SourceVariableMapping {
                    name: render_name(module, sv, parent),
                    rows,
                    columns,
                    byte_offset: path_offset(module, sv.type_id, parent),
                    variables: group
                        .iter()
                        .map(|&reg| DebugVariableReference {
                            register: reg,
                            component: 0,
                        })
                        .collect(),
                });
                for c in 0..group.len() as u32 {
                    let mut sibling = parent.to_vec();
                    sibling.push(c);
                    collapsed.push(sibling);
                }
                continue;
            }
        }

        let cursor = descend(module, sv.type_id, path);
        let (rows, columns) = cursor_shape(module, cursor);
        let components = rows as usize * columns as usize;
        out.push(SourceVariableMapping {
            name: render_name(module, sv, path),
            rows,
            columns,
            byte_offset: path_offset(module, sv.type_id, path),
            variables: (0..components)
                .map(|c| DebugVariableReference {
                    register,
                    component: c as u8,
                })
                .collect(),
        });
    }
}

/// When every sibling component of `path`'s parent has a live scalar mapping
/// recorded by the same instruction, returns their registers in component
/// order.
fn sibling_group(
    module: &Module,
    sv: &SourceVariableDebugInfo,
    latest: &BTreeMap<Vec<u32>, &LocalMapping>,
    path: &[u32],
    instruction: usize,
) -> Option<Vec<Id>> {
    if path.is_empty() {
        return None;
    }
    let parent = &path[..path.len() - 1];
    let count = match descend(module, sv.type_id, parent)? {
        Cursor::Whole(id) => match module.types.get(id)? {
            DataType::Vector { count, .. } => *count,
            _ => return None,
        },
        Cursor::Column { rows } => rows,
        Cursor::Component => return None,
    };

    let mut group = Vec::with_capacity(count as usize);
    for c in 0..count as u32 {
        let mut sibling = parent.to_vec();
        sibling.push(c);
        let mapping = latest.get(&sibling)?;
        if mapping.is_declare || mapping.instruction != instruction {
            return None;
        }
        group.push(mapping.register?);
    }
    Some(group)
}

/// Expands a declare's storage pointer into one row per leaf, referencing the
/// pointer register with flattened component indices. Leaves that a newer
/// value mapping covers are skipped.
fn emit_declare_leaves(
    module: &Module,
    sv: &SourceVariableDebugInfo,
    base_path: &[u32],
    register: Id,
    latest: &BTreeMap<Vec<u32>, &LocalMapping>,
    out: &mut Vec<SourceVariableMapping>,
) {
    let Some(Cursor::Whole(base_type)) = descend(module, sv.type_id, base_path) else {
        return;
    };
    let mut component = 0u8;
    expand_leaves(
        module,
        sv,
        base_path.to_vec(),
        base_type,
        register,
        latest,
        &mut component,
        out,
    );
}

#[allow(clippy::too_many_arguments)]
fn expand_leaves(
    module: &Module,
    sv: &SourceVariableDebugInfo,
    path: Vec<u32>,
    type_id: Id,
    register: Id,
    latest: &BTreeMap<Vec<u32>, &LocalMapping>,
    component: &mut u8,
    out: &mut Vec<SourceVariableMapping>,
) {
    let Some(ty) = module.types.get(type_id) else {
        return;
    };
    match ty {
        DataType::Struct { members } => {
            for (index, member) in members.iter().enumerate() {
                let mut child = path.clone();
                child.push(index as u32);
                expand_leaves(module, sv, child, member.type_id, register, latest, component, out);
            }
        }
        DataType::Array { element, length, .. } => {
            for index in 0..module.array_length(*length) {
                let mut child = path.clone();
                child.push(index);
                expand_leaves(module, sv, child, *element, register, latest, component, out);
            }
        }
        DataType::Scalar(_) | DataType::Vector { .. } | DataType::Matrix { .. } => {
            let (rows, columns) = cursor_shape(module, Some(Cursor::Whole(type_id)));
            let components = rows as usize * columns as usize;
            let first = *component;
            *component += components as u8;
            // A newer value mapping for this exact leaf supersedes the
            // declare's storage view.
            if latest
                .get(&path)
                .map(|m| !m.is_declare)
                .unwrap_or(false)
            {
                return;
            }
            out.push(SourceVariableMapping {
                name: render_name(module, sv, &path),
                rows,
                columns,
                byte_offset: path_offset(module, sv.type_id, &path),
                variables: (0..components)
                    .map(|c| DebugVariableReference {
                        register,
                        component: first + c as u8,
                    })
                    .collect(),
            });
        }
        DataType::Pointer { .. } => {
            out.push(SourceVariableMapping {
                name: render_name(module, sv, &path),
                rows: 1,
                columns: 1,
                byte_offset: path_offset(module, sv.type_id, &path),
                variables: vec![DebugVariableReference {
                    register,
                    component: *component,
                }],
            });
            *component += 1;
        }
    }
}

/// Follows an index path through a declared type.
fn descend(module: &Module, mut type_id: Id, path: &[u32]) -> Option<Cursor> {
    let mut indices = path.iter();
    while let Some(&index) = indices.next() {
        match module.types.get(type_id)? {
            DataType::Struct { members } => {
                type_id = members.get(index as usize)?.type_id;
            }
            DataType::Array { element, .. } => {
                type_id = *element;
            }
            DataType::Vector { .. } => {
                return Some(Cursor::Component);
            }
            DataType::Matrix { rows, .. } => {
                return match indices.next() {
                    Some(_) => Some(Cursor::Component),
                    None => Some(Cursor::Column { rows: *rows }),
                };
            }
            DataType::Scalar(_) | DataType::Pointer { .. } => return None,
        }
    }
    Some(Cursor::Whole(type_id))
}

fn cursor_shape(module: &Module, cursor: Option<Cursor>) -> (u8, u8) {
    match cursor {
        Some(Cursor::Whole(id)) => match module.types.get(id) {
            Some(DataType::Scalar(_)) => (1, 1),
            Some(DataType::Vector { count, .. }) => (1, *count),
            Some(DataType::Matrix { rows, cols, .. }) => (*rows, *cols),
            _ => (1, 1),
        },
        Some(Cursor::Column { rows }) => (1, rows),
        Some(Cursor::Component) | None => (1, 1),
    }
}

/// Tightly-packed byte offset of a sub-object within its source variable.
fn path_offset(module: &Module, mut type_id: Id, path: &[u32]) -> u64 {
    let decor = aperture_spirv::Decorations::default();
    let mut offset = 0u64;
    let mut indices = path.iter();
    while let Some(&index) = indices.next() {
        match module.types.get(type_id) {
            Some(DataType::Struct { members }) => {
                for member in members.iter().take(index as usize) {
                    offset += walker::decorated_byte_size(module, member.type_id, &decor);
                }
                let Some(member) = members.get(index as usize) else {
                    break;
                };
                type_id = member.type_id;
            }
            Some(DataType::Array { element, .. }) => {
                offset += index as u64 * walker::decorated_byte_size(module, *element, &decor);
                type_id = *element;
            }
            Some(DataType::Vector { scalar, .. }) => {
                offset += index as u64 * scalar.byte_size as u64;
                break;
            }
            Some(DataType::Matrix { scalar, rows, .. }) => {
                offset += index as u64 * *rows as u64 * scalar.byte_size as u64;
                if let Some(&row) = indices.next() {
                    offset += row as u64 * scalar.byte_size as u64;
                }
                break;
            }
            _ => break,
        }
    }
    offset
}

const SWIZZLE: [char; 4] = ['x', 'y', 'z', 'w'];

/// Renders a source-level path: member names for structs, `[i]` for arrays
/// and matrix columns, swizzle letters for vector components.
fn render_name(module: &Module, sv: &SourceVariableDebugInfo, path: &[u32]) -> String {
    let mut name = sv.name.clone();
    let mut type_id = sv.type_id;
    let mut indices = path.iter();
    while let Some(&index) = indices.next() {
        match module.types.get(type_id) {
            Some(DataType::Struct { members }) => {
                match members.get(index as usize) {
                    Some(member) if !member.name.is_empty() => {
                        name.push('.');
                        name.push_str(&member.name);
                        type_id = member.type_id;
                    }
                    Some(member) => {
                        name.push_str(&format!("._{index}"));
                        type_id = member.type_id;
                    }
                    None => break,
                }
            }
            Some(DataType::Array { element, .. }) => {
                name.push_str(&format!("[{index}]"));
                type_id = *element;
            }
            Some(DataType::Vector { .. }) => {
                name.push('.');
                name.push(SWIZZLE[(index as usize).min(3)]);
                break;
            }
            Some(DataType::Matrix { .. }) => {
                name.push_str(&format!("[{index}]"));
                if let Some(&row) = indices.next() {
                    name.push('.');
                    name.push(SWIZZLE[(row as usize).min(3)]);
                }
                break;
            }
            _ => break,
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use aperture_spirv::test_utils::ModuleBuilder;
    use aperture_spirv::{ScopeKind, StructMember};
    use pretty_assertions::assert_eq;

    use crate::value::ShaderValue;

    fn thread_with(registers: &[(Id, f32)]) -> ThreadState {
        let mut thread = ThreadState::new(0, false);
        for &(id, v) in registers {
            thread.registers.set(id, ShaderValue::scalar_f32(v));
        }
        thread
    }

    #[test]
    fn scope_gates_visibility() {
        let mut b = ModuleBuilder::new();
        let f32_ty = b.ty(DataType::Scalar(aperture_spirv::ScalarType::F32));
        let scope = b.scope(ScopeKind::Block, None, "main", 2, 5);
        let sv = b.source_var("local_temp", f32_ty, scope);
        let reg = b.fresh_id();
        b.map_local(LocalMapping {
            instruction: 2,
            scope,
            source_var: sv,
            register: Some(reg),
            index_path: vec![],
            is_declare: false,
        });
        let module = b.build();

        let global = GlobalState::default();
        let thread = thread_with(&[(reg, 1.0)]);

        assert!(fill_debug_source_vars(&module, &global, &thread, 1).is_empty());
        let vars = fill_debug_source_vars(&module, &global, &thread, 3);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "local_temp");
        assert_eq!(vars[0].variables, vec![DebugVariableReference { register: reg, component: 0 }]);
    }

    #[test]
    fn scalarized_vector_recollapses_when_updated_together() {
        let mut b = ModuleBuilder::new();
        let vec2_ty = b.ty(DataType::Vector {
            scalar: aperture_spirv::ScalarType::F32,
            count: 2,
        });
        let scope = b.scope(ScopeKind::Function, None, "main", 0, 10);
        let sv = b.source_var("uv", vec2_ty, scope);
        let rx = b.fresh_id();
        let ry = b.fresh_id();
        for (component, reg) in [(0u32, rx), (1u32, ry)] {
            b.map_local(LocalMapping {
                instruction: 4,
                scope,
                source_var: sv,
                register: Some(reg),
                index_path: vec![component],
                is_declare: false,
            });
        }
        let module = b.build();

        let global = GlobalState::default();
        let thread = thread_with(&[(rx, 1.0), (ry, 2.0)]);

        let vars = fill_debug_source_vars(&module, &global, &thread, 5);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "uv");
        assert_eq!((vars[0].rows, vars[0].columns), (1, 2));
        assert_eq!(
            vars[0].variables,
            vec![
                DebugVariableReference { register: rx, component: 0 },
                DebugVariableReference { register: ry, component: 0 },
            ]
        );
    }

    #[test]
    fn staggered_component_updates_stay_separate() {
        let mut b = ModuleBuilder::new();
        let vec2_ty = b.ty(DataType::Vector {
            scalar: aperture_spirv::ScalarType::F32,
            count: 2,
        });
        let scope = b.scope(ScopeKind::Function, None, "main", 0, 10);
        let sv = b.source_var("uv", vec2_ty, scope);
        let rx = b.fresh_id();
        let ry = b.fresh_id();
        b.map_local(LocalMapping {
            instruction: 2,
            scope,
            source_var: sv,
            register: Some(rx),
            index_path: vec![0],
            is_declare: false,
        });
        b.map_local(LocalMapping {
            instruction: 6,
            scope,
            source_var: sv,
            register: Some(ry),
            index_path: vec![1],
            is_declare: false,
        });
        let module = b.build();

        let global = GlobalState::default();
        let thread = thread_with(&[(rx, 1.0), (ry, 2.0)]);

        let vars = fill_debug_source_vars(&module, &global, &thread, 7);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "uv.x");
        assert_eq!(vars[1].name, "uv.y");
        assert_eq!(vars[1].byte_offset, 4);
    }

    #[test]
    fn repeated_fills_produce_identical_rows() {
        let mut b = ModuleBuilder::new();
        let f32_ty = b.ty(DataType::Scalar(aperture_spirv::ScalarType::F32));
        let vec2_ty = b.ty(DataType::Vector {
            scalar: aperture_spirv::ScalarType::F32,
            count: 2,
        });
        let scope = b.scope(ScopeKind::Function, None, "main", 0, 10);
        let sv_uv = b.source_var("uv", vec2_ty, scope);
        let sv_temp = b.source_var("temp", f32_ty, scope);
        let rx = b.fresh_id();
        let ry = b.fresh_id();
        let rt = b.fresh_id();
        b.map_local(LocalMapping {
            instruction: 2,
            scope,
            source_var: sv_uv,
            register: Some(rx),
            index_path: vec![0],
            is_declare: false,
        });
        b.map_local(LocalMapping {
            instruction: 3,
            scope,
            source_var: sv_temp,
            register: Some(rt),
            index_path: vec![],
            is_declare: false,
        });
        b.map_local(LocalMapping {
            instruction: 6,
            scope,
            source_var: sv_uv,
            register: Some(ry),
            index_path: vec![1],
            is_declare: false,
        });
        let module = b.build();

        let global = GlobalState::default();
        let thread = thread_with(&[(rx, 1.0), (ry, 2.0), (rt, 3.0)]);

        // The view is a pure function of the replay state; asking twice for
        // the same instruction yields the same rows in the same order.
        let first = fill_debug_source_vars(&module, &global, &thread, 7);
        let second = fill_debug_source_vars(&module, &global, &thread, 7);
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            vec!["uv.x", "uv.y", "temp"]
        );
    }

    #[test]
    fn dead_register_drops_the_mapping() {
        let mut b = ModuleBuilder::new();
        let f32_ty = b.ty(DataType::Scalar(aperture_spirv::ScalarType::F32));
        let scope = b.scope(ScopeKind::Function, None, "main", 0, 10);
        let sv = b.source_var("temp", f32_ty, scope);
        let reg = b.fresh_id();
        b.map_local(LocalMapping {
            instruction: 1,
            scope,
            source_var: sv,
            register: Some(reg),
            index_path: vec![],
            is_declare: false,
        });
        let module = b.build();

        let global = GlobalState::default();
        // The register was retired; the stale fact must not surface.
        let thread = ThreadState::new(0, false);
        assert!(fill_debug_source_vars(&module, &global, &thread, 5).is_empty());
    }

    #[test]
    fn declare_expands_struct_leaves() {
        let mut b = ModuleBuilder::new();
        let f32_ty = b.ty(DataType::Scalar(aperture_spirv::ScalarType::F32));
        let vec2_ty = b.ty(DataType::Vector {
            scalar: aperture_spirv::ScalarType::F32,
            count: 2,
        });
        let st = b.ty(DataType::Struct {
            members: vec![
                StructMember {
                    name: "intensity".into(),
                    type_id: f32_ty,
                    decorations: Default::default(),
                },
                StructMember {
                    name: "dir".into(),
                    type_id: vec2_ty,
                    decorations: Default::default(),
                },
            ],
        });
        let scope = b.scope(ScopeKind::Function, None, "main", 0, 10);
        let sv = b.source_var("light", st, scope);
        let storage_reg = b.fresh_id();
        b.map_local(LocalMapping {
            instruction: 0,
            scope,
            source_var: sv,
            register: Some(storage_reg),
            index_path: vec![],
            is_declare: true,
        });
        let module = b.build();

        let global = GlobalState::default();
        let thread = thread_with(&[(storage_reg, 0.0)]);

        let vars = fill_debug_source_vars(&module, &global, &thread, 3);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "light.intensity");
        assert_eq!(vars[0].byte_offset, 0);
        assert_eq!(vars[0].variables[0].component, 0);
        assert_eq!(vars[1].name, "light.dir");
        assert_eq!(vars[1].byte_offset, 4);
        assert_eq!(
            vars[1].variables,
            vec![
                DebugVariableReference { register: storage_reg, component: 1 },
                DebugVariableReference { register: storage_reg, component: 2 },
            ]
        );
    }
}
