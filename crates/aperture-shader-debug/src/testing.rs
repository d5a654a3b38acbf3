//! In-crate mock backend for unit tests.

use std::collections::HashMap;

use aperture_spirv::{BuiltinKind, Id};

use crate::api::{DebugApi, DebugMessage, DerivativeDeltas};
use crate::value::{BindIndex, NumericValue, VarType};

/// A byte-array-backed [`DebugApi`] with recorded diagnostics.
#[derive(Debug, Default)]
pub struct MockApi {
    pub buffers: HashMap<BindIndex, Vec<u8>>,
    pub raw_memory: HashMap<u64, u8>,
    pub messages: Vec<DebugMessage>,
    /// Input leaf values keyed by (location, component).
    pub inputs: HashMap<(u32, u32), Vec<f32>>,
    pub deltas: DerivativeDeltas,
    /// Shader-source names for binding ids, used in diagnostics.
    pub binding_names: HashMap<Id, String>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(mut self, bind: BindIndex, bytes: Vec<u8>) -> Self {
        self.buffers.insert(bind, bytes);
        self
    }

    pub fn buffer_f32(&self, bind: BindIndex, byte_offset: usize) -> f32 {
        let bytes = &self.buffers[&bind];
        f32::from_le_bytes(bytes[byte_offset..byte_offset + 4].try_into().unwrap())
    }
}

impl DebugApi for MockApi {
    fn read_buffer_value(&mut self, bind: BindIndex, byte_offset: u64, out: &mut [u8]) {
        out.fill(0);
        if let Some(bytes) = self.buffers.get(&bind) {
            let start = byte_offset as usize;
            if start < bytes.len() {
                let n = out.len().min(bytes.len() - start);
                out[..n].copy_from_slice(&bytes[start..start + n]);
            }
        }
    }

    fn write_buffer_value(&mut self, bind: BindIndex, byte_offset: u64, data: &[u8]) {
        let bytes = self.buffers.entry(bind).or_default();
        let end = byte_offset as usize + data.len();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[byte_offset as usize..end].copy_from_slice(data);
    }

    fn read_address(&mut self, address: u64, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self
                .raw_memory
                .get(&(address + i as u64))
                .copied()
                .unwrap_or(0);
        }
    }

    fn write_address(&mut self, address: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.raw_memory.insert(address + i as u64, *byte);
        }
    }

    fn fill_input_value(
        &mut self,
        _builtin: Option<BuiltinKind>,
        location: u32,
        component: u32,
        value: &mut NumericValue,
    ) {
        if let Some(values) = self.inputs.get(&(location, component)) {
            for (i, v) in values.iter().enumerate().take(value.lane_count()) {
                value.words[i] = v.to_bits() as u64;
            }
        }
    }

    fn get_derivative(
        &mut self,
        _builtin: Option<BuiltinKind>,
        _location: u32,
        _component: u32,
        _ty: VarType,
    ) -> DerivativeDeltas {
        self.deltas
    }

    fn resolve_binding_name(&mut self, id: Id) -> Option<String> {
        self.binding_names.get(&id).cloned()
    }

    fn add_debug_message(&mut self, message: DebugMessage) {
        self.messages.push(message);
    }
}
