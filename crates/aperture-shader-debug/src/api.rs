//! The seam between the engine and the graphics-API backend.
//!
//! The backend owns real GPU memory and resource bindings; the engine only
//! ever talks to it through [`DebugApi`]. Reads and writes are synchronous
//! and assumed to succeed; a backend that cannot service a read should
//! zero-fill the output rather than fail.

use serde::{Deserialize, Serialize};

use aperture_spirv::{BuiltinKind, Id};

use crate::value::{BindIndex, NumericValue, VarType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageCategory {
    Execution,
    Initialization,
    Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSeverity {
    High,
    Medium,
    Low,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSource {
    RuntimeUsage,
    UnsupportedFeature,
    DebuggerInternal,
}

/// A non-fatal diagnostic surfaced to the host UI. Stepping never halts on
/// these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugMessage {
    pub category: MessageCategory,
    pub severity: MessageSeverity,
    pub source: MessageSource,
    pub text: String,
}

impl DebugMessage {
    pub fn execution_high(text: String) -> DebugMessage {
        DebugMessage {
            category: MessageCategory::Execution,
            severity: MessageSeverity::High,
            source: MessageSource::RuntimeUsage,
            text,
        }
    }

    pub fn unsupported(text: String) -> DebugMessage {
        DebugMessage {
            category: MessageCategory::Execution,
            severity: MessageSeverity::High,
            source: MessageSource::UnsupportedFeature,
            text,
        }
    }
}

/// The four cardinal derivative deltas for one input component group, as
/// captured by the backend at the debugged pixel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivativeDeltas {
    pub ddx_coarse: [f32; 4],
    pub ddy_coarse: [f32; 4],
    pub ddx_fine: [f32; 4],
    pub ddy_fine: [f32; 4],
}

/// Backend interface for resource access and diagnostics.
///
/// Mirrors the role a bus trait plays for a CPU interpreter: the engine is
/// generic over it, tests supply a mock, the real host supplies the capture
/// replay backend.
pub trait DebugApi {
    /// Reads `out.len()` bytes from a bound buffer at a byte offset.
    fn read_buffer_value(&mut self, bind: BindIndex, byte_offset: u64, out: &mut [u8]);

    /// Writes bytes into a bound buffer at a byte offset.
    fn write_buffer_value(&mut self, bind: BindIndex, byte_offset: u64, data: &[u8]);

    /// Reads from a raw physical-storage-buffer address.
    fn read_address(&mut self, address: u64, out: &mut [u8]);

    /// Writes to a raw physical-storage-buffer address.
    fn write_address(&mut self, address: u64, data: &[u8]);

    /// Seeds one leaf of a shader input for the debugged lane.
    fn fill_input_value(
        &mut self,
        builtin: Option<BuiltinKind>,
        location: u32,
        component: u32,
        value: &mut NumericValue,
    );

    /// Derivative deltas for one fragment input leaf, used to reconstruct
    /// neighboring quad lanes.
    fn get_derivative(
        &mut self,
        builtin: Option<BuiltinKind>,
        location: u32,
        component: u32,
        ty: VarType,
    ) -> DerivativeDeltas;

    /// Non-fatal diagnostic sink.
    fn add_debug_message(&mut self, message: DebugMessage);

    /// The id of an opaque binding's descriptor value, for display. Backends
    /// without one can return `None`.
    fn resolve_binding_name(&mut self, _id: Id) -> Option<String> {
        None
    }
}
