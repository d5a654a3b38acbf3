//! Interactive instruction-level debugger for reflected shader modules.
//!
//! The engine interprets a reflected instruction stream one step at a time
//! against a pluggable [`api::DebugApi`] backend that owns the real GPU
//! resources. Fragment invocations run as a 2x2 quad in lock-step so
//! derivative instructions behave; all other stages run a single lane.
//!
//! The main entry point is [`Debugger::new`], then [`Debugger::continue_debug`]
//! in a loop until it returns an empty batch.

pub mod api;
pub mod debugger;
pub mod deriv;
pub mod pointer;
pub mod sourcevars;
pub mod thread;
pub mod value;
pub mod walker;

/// Byte-array-backed mock backend, shared by unit and integration tests.
pub mod testing;

pub use crate::api::{
    DebugApi, DebugMessage, DerivativeDeltas, MessageCategory, MessageSeverity, MessageSource,
};
pub use crate::debugger::{Debugger, DebuggerError, GlobalState, ShaderDebugState, STEP_BATCH};
pub use crate::sourcevars::{DebugVariableReference, SourceVariableMapping};
pub use crate::thread::{StackFrame, ThreadState, VariableChange};
pub use crate::value::{
    BindIndex, NumericValue, PointerAddr, PointerFlags, PointerTarget, PointerValue, RegisterFile,
    ShaderValue, TextureKind, VarType, POISON_WORD,
};
