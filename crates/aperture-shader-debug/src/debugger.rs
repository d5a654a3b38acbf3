//! Workgroup orchestration: lane setup, lock-step scheduling, divergence and
//! the batched continue loop.
//!
//! Fragment debugging runs a full 2x2 quad so derivatives work; every other
//! stage runs a single lane. Lanes execute in lock-step: after a divergent
//! branch, every lane that has not yet reached its recorded merge point keeps
//! running, while lanes already parked at the merge label wait for the rest
//! of the quad to arrive.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use aperture_spirv::{
    Decorations, Id, Instruction, InstructionLocation, Module, ShaderStage, StorageClass,
};

use crate::api::DebugApi;
use crate::deriv::{self, QUAD_LANES};
use crate::pointer::{self, expect_pointer, StorageRefs};
use crate::sourcevars::{self, SourceVariableMapping};
use crate::thread::{self, EvalContext, ThreadState, VariableChange};
use crate::value::{
    BindIndex, NumericValue, PointerAddr, PointerFlags, PointerTarget, PointerValue, RegisterFile,
    ShaderValue, TextureKind,
};
use crate::walker::{self, LeafVisitor, WalkAddr};

/// Number of debugged-lane steps gathered per [`Debugger::continue_debug`]
/// batch, so the host UI can interleave stepping with event processing.
pub const STEP_BATCH: usize = 100;

#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error("module has no entry point")]
    MissingEntryPoint,
    #[error("entry function id {0} not found in module")]
    UnknownEntryFunction(Id),
    #[error("lane {lane} out of range for a workgroup of {lanes}")]
    LaneOutOfRange { lane: usize, lanes: usize },
}

/// Workgroup-wide storage shared by all lanes.
#[derive(Debug, Default)]
pub struct GlobalState {
    /// Pointer registers for module-scope variables.
    pub pointers: RegisterFile,
    /// Backing values for pointer targets that are not lane-local and not
    /// buffer-backed (workgroup storage, opaque descriptor values).
    pub values: RegisterFile,
}

/// One debugged-lane step's observable outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ShaderDebugState {
    /// Monotone step counter for the debugged lane.
    pub step_index: usize,
    /// Instruction the debugged lane will execute next.
    pub next_instruction: usize,
    pub changes: Vec<VariableChange>,
    /// Function names, outermost first.
    pub callstack: Vec<String>,
    pub source_location: Option<InstructionLocation>,
}

/// The interactive debug session over one shader invocation.
#[derive(Debug)]
pub struct Debugger<A> {
    module: Module,
    api: A,
    global: GlobalState,
    threads: Vec<ThreadState>,
    debugged_lane: usize,
    steps_taken: usize,
}

impl<A: DebugApi> Debugger<A> {
    /// Builds a session: reflects globals into pointer registers, allocates
    /// per-lane interface storage and positions every lane at the entry
    /// function.
    pub fn new(module: Module, api: A, lane: usize) -> Result<Self, DebuggerError> {
        let entry = module.entry.clone().ok_or(DebuggerError::MissingEntryPoint)?;
        if module.function(entry.function).is_none() {
            return Err(DebuggerError::UnknownEntryFunction(entry.function));
        }

        let lanes = match entry.stage {
            ShaderStage::Fragment => QUAD_LANES,
            ShaderStage::Vertex | ShaderStage::Compute => 1,
        };
        if lane >= lanes {
            return Err(DebuggerError::LaneOutOfRange { lane, lanes });
        }

        let mut debugger = Debugger {
            module,
            api,
            global: GlobalState::default(),
            threads: Vec::new(),
            debugged_lane: lane,
            steps_taken: 0,
        };

        for i in 0..lanes {
            let helper = entry.stage == ShaderStage::Fragment && i != lane;
            let mut thread = ThreadState::new(i, helper);
            thread.enter_entry_point(&debugger.module, entry.function);
            debugger.threads.push(thread);
        }

        debugger.setup_globals(entry.stage);
        debug!(lanes, lane, stage = ?entry.stage, "debug session ready");
        Ok(debugger)
    }

    fn setup_globals(&mut self, stage: ShaderStage) {
        let globals = self.module.globals.clone();
        for global in &globals {
            let pointee = match self.module.types.get(global.type_id) {
                Some(aperture_spirv::DataType::Pointer { pointee, .. }) => Some(*pointee),
                _ => {
                    warn!(id = global.id.0, "global variable with non-pointer type");
                    None
                }
            };
            let decor = self.module.decorations.get(global.id);

            if global.storage.is_buffer_backed() {
                self.global
                    .pointers
                    .set(global.id, buffer_binding_pointer(&self.module, global.id, pointee, &decor));
            } else if global.storage.is_opaque() {
                // Opaque image/sampler binding: the pointer carries a texture
                // tag, the descriptor value is the binding slot (or a name
                // the backend resolves).
                let mut ptr = PointerValue::to_target(
                    global.id,
                    PointerTarget::Global(global.id),
                    pointee,
                );
                ptr.addr = PointerAddr::Texture(TextureKind::CombinedSampler);
                ptr.binding = Some(bind_index(&decor));
                if is_bind_array(&self.module, pointee) {
                    ptr.flags |= PointerFlags::BIND_ARRAY;
                }
                self.global.pointers.set(global.id, ShaderValue::Pointer(Box::new(ptr)));
                self.global
                    .values
                    .set(global.id, ShaderValue::scalar_u32(decor.binding.unwrap_or(0)));
            } else if global.storage == StorageClass::Workgroup {
                let Some(pointee) = pointee else { continue };
                self.global
                    .values
                    .set(global.id, walker::build_variable(&self.module, &decor, pointee));
                let ptr =
                    pointer::make_pointer_variable(global.id, PointerTarget::Global(global.id), Some(pointee), None, None);
                self.global.pointers.set(global.id, ShaderValue::Pointer(Box::new(ptr)));
            } else {
                // Input, Output and Private storage is lane-local.
                let Some(pointee) = pointee else { continue };
                self.setup_lane_local(stage, global.id, pointee, global.storage, &decor);
            }
        }
    }

    fn setup_lane_local(
        &mut self,
        stage: ShaderStage,
        id: Id,
        pointee: Id,
        storage: StorageClass,
        decor: &Decorations,
    ) {
        let quad = stage == ShaderStage::Fragment && self.threads.len() == QUAD_LANES;
        for lane in 0..self.threads.len() {
            let mut value = walker::build_variable(&self.module, decor, pointee);
            if storage == StorageClass::Input {
                let mut seeder = InputSeeder {
                    api: &mut self.api,
                    lane,
                    anchor_lane: self.debugged_lane,
                    quad,
                };
                walker::walk_variable(
                    &self.module,
                    decor,
                    pointee,
                    WalkAddr::Locations(0),
                    &mut value,
                    "",
                    &mut seeder,
                );
            }
            let thread = &mut self.threads[lane];
            thread.locals.set(id, value);
            let ptr = pointer::make_pointer_variable(id, PointerTarget::Local(id), Some(pointee), None, None);
            thread.registers.set(id, ShaderValue::Pointer(Box::new(ptr)));
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn debugged_thread(&self) -> &ThreadState {
        &self.threads[self.debugged_lane]
    }

    pub fn thread(&self, lane: usize) -> Option<&ThreadState> {
        self.threads.get(lane)
    }

    pub fn finished(&self) -> bool {
        self.threads[self.debugged_lane].done
    }

    /// Lanes that will execute on the next scheduling tick. In uniform
    /// control flow every live lane runs. After a divergent branch both arms
    /// keep running together; a lane that reaches the merge label recorded by
    /// its innermost structured construct parks there until the other lanes
    /// arrive, at which point the quad locksteps again.
    pub fn active_mask(&self) -> Vec<bool> {
        let mut fronts = self
            .threads
            .iter()
            .filter(|t| !t.done)
            .map(|t| t.next_instruction);
        let uniform = match fronts.next() {
            Some(first) => fronts.all(|n| n == first),
            None => true,
        };
        let mut mask: Vec<bool> = self
            .threads
            .iter()
            .map(|t| {
                if t.done {
                    return false;
                }
                uniform || t.pending_merge() != Some(t.next_instruction)
            })
            .collect();
        // Nested divergence can park every lane at a different merge label.
        // Release the innermost ones so they can run out to the outer merge.
        if !mask.iter().any(|&a| a) {
            if let Some(deepest) = self
                .threads
                .iter()
                .filter(|t| !t.done)
                .map(|t| t.merge_depth())
                .max()
            {
                for (slot, t) in mask.iter_mut().zip(&self.threads) {
                    *slot = !t.done && t.merge_depth() == deepest;
                }
            }
        }
        mask
    }

    /// Value of an operand in a given lane, without stepping. Used for quad
    /// snapshots and inspection.
    fn peek_numeric(&self, lane: usize, id: Id) -> Option<NumericValue> {
        let thread = &self.threads[lane];
        if let Some(ShaderValue::Numeric(n)) = thread.registers.get(id) {
            return Some(n.clone());
        }
        match thread::constant_value(&self.module, id) {
            Some(ShaderValue::Numeric(n)) => Some(n),
            _ => None,
        }
    }

    /// Snapshot of a derivative operand across the quad, taken before any
    /// lane steps so one lane's write cannot skew a neighbor's read.
    fn quad_snapshot(&self, front: usize) -> Option<[NumericValue; QUAD_LANES]> {
        if self.threads.len() != QUAD_LANES {
            return None;
        }
        let value = match self.module.instructions.get(front)? {
            Instruction::Derivative { value, .. } => *value,
            _ => return None,
        };
        let anchor = self.peek_numeric(self.debugged_lane, value)?;
        let mut out = [anchor.clone(), anchor.clone(), anchor.clone(), anchor];
        for (lane, slot) in out.iter_mut().enumerate() {
            if let Some(n) = self.peek_numeric(lane, value) {
                *slot = n;
            }
        }
        Some(out)
    }

    /// One scheduling tick: every active lane executes one instruction.
    /// Returns whether the debugged lane was among them.
    fn step_once(&mut self) -> bool {
        let mask = self.active_mask();
        let front = self
            .threads
            .iter()
            .filter(|t| !t.done)
            .map(|t| t.next_instruction)
            .min();
        let Some(front) = front else { return false };
        let snapshot = self.quad_snapshot(front);

        for lane in 0..self.threads.len() {
            if !mask[lane] {
                continue;
            }
            let thread = &mut self.threads[lane];
            let mut ctx = EvalContext {
                module: &self.module,
                api: &mut self.api,
                global_pointers: &self.global.pointers,
                global_values: &mut self.global.values,
            };
            thread.step_next(&mut ctx, snapshot.as_ref());
        }
        mask[self.debugged_lane]
    }

    /// Advances until the debugged lane has executed one more instruction
    /// (helper lanes may run several ticks to catch up first).
    pub fn step_debugged_lane(&mut self) -> Option<ShaderDebugState> {
        if self.finished() {
            return None;
        }
        // Catch-up ticks are bounded so a helper lane stuck in a runaway
        // loop cannot hang the session.
        let mut ticks = 0usize;
        loop {
            let advanced = self.step_once();
            if advanced {
                break;
            }
            if self.threads.iter().all(|t| t.done) {
                return None;
            }
            ticks += 1;
            if ticks > 1_000_000 {
                warn!("helper lanes failed to reconverge; abandoning them");
                for thread in &mut self.threads {
                    if thread.lane != self.debugged_lane {
                        thread.done = true;
                    }
                }
            }
        }
        self.steps_taken += 1;
        let thread = &self.threads[self.debugged_lane];
        Some(ShaderDebugState {
            step_index: self.steps_taken,
            next_instruction: thread.next_instruction,
            changes: thread.changes.clone(),
            callstack: thread.callstack_names(&self.module),
            source_location: self.module.locations.get(&thread.next_instruction).cloned(),
        })
    }

    /// Runs up to [`STEP_BATCH`] debugged-lane steps and returns their
    /// states. An empty result means the invocation finished.
    #[instrument(skip(self), fields(lane = self.debugged_lane, from = self.steps_taken))]
    pub fn continue_debug(&mut self) -> Vec<ShaderDebugState> {
        let mut states = Vec::new();
        while states.len() < STEP_BATCH {
            match self.step_debugged_lane() {
                Some(state) => states.push(state),
                None => break,
            }
        }
        states
    }

    /// Source-level view of the debugged lane's live variables at its current
    /// instruction.
    pub fn source_variables(&self) -> Vec<SourceVariableMapping> {
        let thread = &self.threads[self.debugged_lane];
        sourcevars::fill_debug_source_vars(&self.module, &self.global, thread, thread.next_instruction)
    }

    /// Dereferenced view of a register for UI inspection.
    pub fn inspect(&mut self, id: Id) -> Option<ShaderValue> {
        let thread = &self.threads[self.debugged_lane];
        let value = thread
            .registers
            .get(id)
            .or_else(|| self.global.pointers.get(id))?;
        if let Some(ptr) = expect_pointer(Some(value)) {
            let refs = StorageRefs {
                globals: &self.global.values,
                locals: &thread.locals,
            };
            return Some(pointer::get_pointer_value(
                &self.module,
                &mut self.api,
                &refs,
                ptr,
            ));
        }
        Some(value.clone())
    }
}

fn bind_index(decor: &Decorations) -> BindIndex {
    BindIndex {
        descriptor_set: decor.descriptor_set.unwrap_or(0),
        binding: decor.binding.unwrap_or(0),
        array_index: 0,
    }
}

/// Whether a binding's pointee is an array of resources rather than one
/// resource, making the first access-chain index a bind-array selector.
fn is_bind_array(module: &Module, pointee: Option<Id>) -> bool {
    matches!(
        pointee.and_then(|id| module.types.get(id)),
        Some(aperture_spirv::DataType::Array { .. })
    )
}

fn buffer_binding_pointer(
    module: &Module,
    id: Id,
    pointee: Option<Id>,
    decor: &Decorations,
) -> ShaderValue {
    let mut ptr = PointerValue::to_target(id, PointerTarget::Global(id), pointee);
    ptr.flags |= PointerFlags::SSBO;
    ptr.binding = Some(bind_index(decor));
    ptr.addr = PointerAddr::Bytes(0);
    if is_bind_array(module, pointee) {
        ptr.flags |= PointerFlags::BIND_ARRAY;
    }
    ShaderValue::Pointer(Box::new(ptr))
}

/// Seeds interface input leaves. The debugged lane takes the backend's
/// interpolated value directly; quad neighbors are rebuilt from it and the
/// captured derivative deltas.
struct InputSeeder<'a> {
    api: &'a mut dyn DebugApi,
    lane: usize,
    anchor_lane: usize,
    quad: bool,
}

impl LeafVisitor for InputSeeder<'_> {
    fn on_leaf(
        &mut self,
        _path: &str,
        _type_id: Id,
        decor: &Decorations,
        addr: WalkAddr,
        value: &mut ShaderValue,
    ) {
        let ShaderValue::Numeric(n) = value else { return };
        let location = addr.location();
        let component = decor.component.unwrap_or(0);
        self.api
            .fill_input_value(decor.builtin, location, component, n);
        if self.quad && self.lane != self.anchor_lane {
            let deltas = self
                .api
                .get_derivative(decor.builtin, location, component, n.ty);
            let lanes = deriv::reconstruct_quad(self.anchor_lane, n, &deltas);
            *n = lanes[self.lane].clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;
    use aperture_spirv::test_utils::ModuleBuilder;
    use aperture_spirv::{BinaryOp, DataType, ScalarType};
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_entry_point_is_an_error() {
        let b = ModuleBuilder::new();
        let module = b.build();
        let err = Debugger::new(module, MockApi::new(), 0).unwrap_err();
        assert!(matches!(err, DebuggerError::MissingEntryPoint));
    }

    #[test]
    fn lane_out_of_range_for_compute() {
        let mut b = ModuleBuilder::new();
        let main = b.function("main", vec![], vec![Instruction::Return]);
        b.entry_point(main, ShaderStage::Compute, vec![]);
        let module = b.build();
        let err = Debugger::new(module, MockApi::new(), 2).unwrap_err();
        assert!(matches!(
            err,
            DebuggerError::LaneOutOfRange { lane: 2, lanes: 1 }
        ));
    }

    #[test]
    fn compute_session_runs_to_completion() {
        let mut b = ModuleBuilder::new();
        let f32_ty = b.ty(DataType::Scalar(ScalarType::F32));
        let c1 = b.constant_f32(f32_ty, 2.0);
        let sum = b.fresh_id();
        let main = b.function(
            "main",
            vec![],
            vec![
                Instruction::Binary {
                    result: sum,
                    result_type: f32_ty,
                    op: BinaryOp::FAdd,
                    a: c1,
                    b: c1,
                },
                Instruction::Return,
            ],
        );
        b.entry_point(main, ShaderStage::Compute, vec![]);
        let module = b.build();

        let mut debugger = Debugger::new(module, MockApi::new(), 0).unwrap();
        let states = debugger.continue_debug();
        // The Binary step and the Return step.
        assert_eq!(states.len(), 2);
        assert!(debugger.finished());
        assert_eq!(states[0].changes.len(), 1);
        assert_eq!(
            states[0].changes[0]
                .after
                .as_ref()
                .unwrap()
                .as_numeric()
                .unwrap()
                .as_f32(0, 0),
            4.0
        );
        // Nothing more to run.
        assert!(debugger.continue_debug().is_empty());
    }

    #[test]
    fn fragment_session_spawns_a_quad_of_helpers() {
        let mut b = ModuleBuilder::new();
        let main = b.function("main", vec![], vec![Instruction::Return]);
        b.entry_point(main, ShaderStage::Fragment, vec![]);
        let module = b.build();

        let debugger = Debugger::new(module, MockApi::new(), 2).unwrap();
        assert_eq!(debugger.active_mask(), vec![true; 4]);
        for lane in 0..4 {
            let thread = debugger.thread(lane).unwrap();
            assert_eq!(thread.helper, lane != 2);
        }
    }

    #[test]
    fn quad_inputs_reconstruct_neighbors() {
        use crate::api::DerivativeDeltas;

        let mut b = ModuleBuilder::new();
        let f32_ty = b.ty(DataType::Scalar(ScalarType::F32));
        let in_ptr_ty = b.ty(DataType::Pointer {
            pointee: f32_ty,
            storage: StorageClass::Input,
        });
        let input = b.global("uv", in_ptr_ty, StorageClass::Input);
        b.decorate(
            input,
            Decorations {
                location: Some(0),
                ..Default::default()
            },
        );
        let main = b.function("main", vec![], vec![Instruction::Return]);
        b.entry_point(main, ShaderStage::Fragment, vec![input]);
        let module = b.build();

        let mut api = MockApi::new();
        api.inputs.insert((0, 0), vec![1.0]);
        api.deltas = DerivativeDeltas {
            ddx_coarse: [0.5, 0.0, 0.0, 0.0],
            ddy_coarse: [2.0, 0.0, 0.0, 0.0],
            ddx_fine: [0.5, 0.0, 0.0, 0.0],
            ddy_fine: [2.0, 0.0, 0.0, 0.0],
        };

        let debugger = Debugger::new(module, api, 0).unwrap();
        let lane_value = |lane: usize| {
            debugger
                .thread(lane)
                .unwrap()
                .locals
                .get(input)
                .unwrap()
                .as_numeric()
                .unwrap()
                .as_f32(0, 0)
        };
        assert_eq!(lane_value(0), 1.0);
        assert_eq!(lane_value(1), 1.5);
        assert_eq!(lane_value(2), 3.0);
        assert_eq!(lane_value(3), 3.5);
    }
}
