//! Per-lane execution state and the single-instruction step function.
//!
//! A [`ThreadState`] owns one lane's register file, local variable storage
//! and callstack. Stepping is one big match over the decoded instruction
//! enum. Anything that goes wrong mid-step is diagnosed and papered over
//! with a poison result; execution itself never fails.

use serde::Serialize;
use tracing::{debug, warn};

use aperture_spirv::{BinaryOp, CompareOp, DataType, Id, Instruction, Module, StorageClass};

use crate::api::{DebugApi, DebugMessage};
use crate::deriv::{self, QUAD_LANES};
use crate::pointer::{self, StorageRefs, StorageRefsMut};
use crate::value::{NumericValue, PointerTarget, RegisterFile, ShaderValue, VarType};
use crate::walker;

/// Shared lookups a lane needs while stepping: the module tables, the
/// backend, and the workgroup-wide storage owned by the debugger.
pub struct EvalContext<'a> {
    pub module: &'a Module,
    pub api: &'a mut dyn DebugApi,
    /// Pointer registers for module-scope variables, shared by all lanes.
    pub global_pointers: &'a RegisterFile,
    /// Backing storage for module-scope variables (outputs, privates).
    pub global_values: &'a mut RegisterFile,
}

/// One observable mutation made by a step, for UI change lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableChange {
    pub name: String,
    pub before: Option<ShaderValue>,
    pub after: Option<ShaderValue>,
}

/// One entry of a lane's function callstack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub function: Id,
    /// Instruction index to resume at after the callee returns.
    pub return_to: usize,
    /// Register receiving the callee's return value.
    pub result: Option<Id>,
    /// Merge points of the structured constructs this frame is inside,
    /// innermost last. Entries retire once the lane steps past them.
    pub merge_stack: Vec<usize>,
}

/// One SIMT lane's complete execution state.
#[derive(Debug, Clone)]
pub struct ThreadState {
    /// Lane index within the workgroup (quad position for fragments).
    pub lane: usize,
    /// Helper invocation: executes for derivative purposes only, and its
    /// buffer/output writes are suppressed.
    pub helper: bool,
    pub done: bool,
    /// Index into the module's flat instruction stream.
    pub next_instruction: usize,
    /// SSA result registers.
    pub registers: RegisterFile,
    /// Backing storage for function-local variables.
    pub locals: RegisterFile,
    pub callstack: Vec<StackFrame>,
    /// Mutations from the most recent step; drained by the orchestrator.
    pub changes: Vec<VariableChange>,
}

impl ThreadState {
    pub fn new(lane: usize, helper: bool) -> ThreadState {
        ThreadState {
            lane,
            helper,
            done: false,
            next_instruction: 0,
            registers: RegisterFile::new(),
            locals: RegisterFile::new(),
            callstack: Vec::new(),
            changes: Vec::new(),
        }
    }

    /// Positions the lane at the entry function's first instruction.
    pub fn enter_entry_point(&mut self, module: &Module, function: Id) {
        if let Some(func) = module.function(function) {
            self.next_instruction = func.begin;
            self.callstack.push(StackFrame {
                function,
                return_to: func.end,
                result: None,
                merge_stack: Vec::new(),
            });
        } else {
            warn!(function = function.0, "entry function missing from module");
            self.done = true;
        }
    }

    /// Names of the frames, outermost first, for callstack display. A frame
    /// positioned inside a named debug-info scope shows that scope's name;
    /// otherwise the function name.
    pub fn callstack_names(&self, module: &Module) -> Vec<String> {
        self.callstack
            .iter()
            .enumerate()
            .map(|(depth, frame)| {
                // A caller frame is parked at its call site, one before the
                // callee's return target.
                let at = match self.callstack.get(depth + 1) {
                    Some(inner) => inner.return_to.saturating_sub(1),
                    None => self.next_instruction,
                };
                module.scope_name(at).unwrap_or_else(|| {
                    module
                        .function(frame.function)
                        .map(|f| f.name.clone())
                        .unwrap_or_else(|| format!("fn{}", frame.function))
                })
            })
            .collect()
    }

    /// Resolves an operand id: lane register, shared global pointer register,
    /// or materialized constant, in that order.
    pub fn value_of(&self, ctx: &EvalContext<'_>, id: Id) -> Option<ShaderValue> {
        if let Some(v) = self.registers.get(id) {
            return Some(v.clone());
        }
        if let Some(v) = ctx.global_pointers.get(id) {
            return Some(v.clone());
        }
        constant_value(ctx.module, id)
    }

    fn numeric_of(&self, ctx: &mut EvalContext<'_>, id: Id) -> NumericValue {
        match self.value_of(ctx, id) {
            Some(ShaderValue::Numeric(n)) => n,
            other => {
                warn!(id = id.0, "operand is not numeric");
                ctx.api.add_debug_message(DebugMessage::execution_high(format!(
                    "Operand id {id} is not a numeric value; substituting poison"
                )));
                let mut n = NumericValue::with_shape(VarType::UInt, 4, 1, 1);
                if other.is_none() {
                    debug!(id = id.0, "operand id has no value at all");
                }
                n.fill_poison();
                n
            }
        }
    }

    fn index_of(&self, ctx: &EvalContext<'_>, id: Id) -> u32 {
        match self.value_of(ctx, id) {
            Some(ShaderValue::Numeric(n)) => n.words[0] as u32,
            _ => 0,
        }
    }

    fn set_register(&mut self, id: Id, value: ShaderValue) {
        let before = self.registers.set(id, value.clone());
        self.changes.push(VariableChange {
            name: register_name(id),
            before,
            after: Some(value),
        });
    }

    fn poison_result(&mut self, ctx: &EvalContext<'_>, result: Id, result_type: Id) {
        let mut value = walker::build_variable(
            ctx.module,
            &ctx.module.decorations.get(result),
            result_type,
        );
        if let ShaderValue::Numeric(n) = &mut value {
            n.fill_poison();
        }
        self.set_register(result, value);
    }

    /// Executes exactly one instruction.
    ///
    /// `quad_values` carries the derivative operand's value in every quad
    /// lane when the upcoming instruction is a derivative; the orchestrator
    /// snapshots it before any lane steps.
    pub fn step_next(
        &mut self,
        ctx: &mut EvalContext<'_>,
        quad_values: Option<&[NumericValue; QUAD_LANES]>,
    ) {
        self.changes.clear();
        let index = self.next_instruction;
        let Some(inst) = ctx.module.instructions.get(index) else {
            self.done = true;
            return;
        };
        let inst = inst.clone();
        let mut next = index + 1;

        match inst {
            Instruction::Nop | Instruction::Label { .. } => {}

            // Structured-control-flow hints: record where the construct
            // reconverges so the scheduler can pause early arrivers there.
            Instruction::SelectionMerge { merge_block }
            | Instruction::LoopMerge { merge_block, .. } => {
                match ctx.module.labels.get(&merge_block) {
                    Some(&target) => {
                        if let Some(frame) = self.callstack.last_mut() {
                            frame.merge_stack.push(target);
                        }
                    }
                    None => warn!(merge = merge_block.0, "merge hint names an unknown label"),
                }
            }

            Instruction::Undef {
                result,
                result_type,
            } => {
                self.poison_result(ctx, result, result_type);
            }

            Instruction::Variable {
                result,
                result_type,
                storage,
            } => {
                self.declare_local(ctx, result, result_type, storage);
            }

            Instruction::Load {
                result, pointer, ..
            } => {
                let value = match self.value_of(ctx, pointer) {
                    Some(ShaderValue::Pointer(ptr)) => {
                        let refs = StorageRefs {
                            globals: ctx.global_values,
                            locals: &self.locals,
                        };
                        pointer::read_from_pointer(ctx.module, ctx.api, &refs, &ptr)
                    }
                    _ => {
                        ctx.api.add_debug_message(DebugMessage::execution_high(format!(
                            "Load from id {pointer} which is not a pointer"
                        )));
                        ShaderValue::scalar_u32(0)
                    }
                };
                self.set_register(result, value);
            }

            Instruction::Store { pointer, object } => {
                self.execute_store(ctx, pointer, object);
            }

            Instruction::AccessChain {
                result,
                base,
                indices,
                ..
            } => {
                let resolved: Vec<u32> = indices.iter().map(|&id| self.index_of(ctx, id)).collect();
                match self.value_of(ctx, base) {
                    Some(ShaderValue::Pointer(ptr)) => {
                        let deeper =
                            pointer::make_composite_pointer(ctx.module, ctx.api, &ptr, &resolved);
                        self.set_register(result, ShaderValue::Pointer(Box::new(deeper)));
                    }
                    _ => {
                        ctx.api.add_debug_message(DebugMessage::execution_high(format!(
                            "Access chain base id {base} is not a pointer"
                        )));
                        self.set_register(result, ShaderValue::scalar_u32(0));
                    }
                }
            }

            Instruction::CompositeExtract {
                result,
                composite,
                indices,
                ..
            } => {
                let value = self
                    .value_of(ctx, composite)
                    .map(|v| extract_composite(&v, &indices))
                    .unwrap_or(ShaderValue::scalar_u32(0));
                self.set_register(result, value);
            }

            Instruction::CompositeConstruct {
                result,
                result_type,
                constituents,
            } => {
                let parts: Vec<ShaderValue> = constituents
                    .iter()
                    .filter_map(|&id| self.value_of(ctx, id))
                    .collect();
                let value = construct_composite(ctx.module, result_type, &parts);
                self.set_register(result, value);
            }

            Instruction::Select {
                result,
                condition,
                if_true,
                if_false,
                ..
            } => {
                let cond = self.numeric_of(ctx, condition);
                let t = self.value_of(ctx, if_true);
                let f = self.value_of(ctx, if_false);
                let value = select_value(&cond, t, f);
                self.set_register(result, value);
            }

            Instruction::Binary { result, op, a, b, .. } => {
                let a = self.numeric_of(ctx, a);
                let b = self.numeric_of(ctx, b);
                self.set_register(result, ShaderValue::Numeric(eval_binary(op, &a, &b)));
            }

            Instruction::Compare { result, op, a, b, .. } => {
                let a = self.numeric_of(ctx, a);
                let b = self.numeric_of(ctx, b);
                self.set_register(result, ShaderValue::Numeric(eval_compare(op, &a, &b)));
            }

            Instruction::Derivative {
                result,
                result_type,
                axis,
                precision,
                value,
            } => {
                match quad_values {
                    Some(values) => {
                        let d = deriv::quad_derivative(values, self.lane, axis, precision);
                        self.set_register(result, ShaderValue::Numeric(d));
                    }
                    None => {
                        ctx.api.add_debug_message(DebugMessage::unsupported(format!(
                            "Derivative of id {value} outside a fragment quad"
                        )));
                        self.poison_result(ctx, result, result_type);
                    }
                }
            }

            Instruction::FunctionCall {
                result,
                result_type,
                function,
                arguments,
            } => {
                match ctx.module.function(function) {
                    Some(func) => {
                        let func_begin = func.begin;
                        let params = func.params.clone();
                        for (&param, &arg) in params.iter().zip(arguments.iter()) {
                            let value = self
                                .value_of(ctx, arg)
                                .unwrap_or(ShaderValue::scalar_u32(0));
                            self.set_register(param, value);
                        }
                        self.callstack.push(StackFrame {
                            function,
                            return_to: next,
                            result: Some(result),
                            merge_stack: Vec::new(),
                        });
                        next = func_begin;
                    }
                    None => {
                        ctx.api.add_debug_message(DebugMessage::execution_high(format!(
                            "Call to unknown function id {function}"
                        )));
                        self.poison_result(ctx, result, result_type);
                    }
                }
            }

            Instruction::Return => match self.callstack.pop() {
                Some(frame) if !self.callstack.is_empty() => next = frame.return_to,
                _ => {
                    self.done = true;
                    return;
                }
            },

            Instruction::ReturnValue { value } => {
                let returned = self.value_of(ctx, value);
                match self.callstack.pop() {
                    Some(frame) if !self.callstack.is_empty() => {
                        if let (Some(result), Some(returned)) = (frame.result, returned) {
                            self.set_register(result, returned);
                        }
                        next = frame.return_to;
                    }
                    _ => {
                        self.done = true;
                        return;
                    }
                }
            }

            Instruction::Branch { target } => {
                next = self.branch_target(ctx, target, index);
            }

            Instruction::BranchConditional {
                condition,
                true_target,
                false_target,
            } => {
                let cond = self.numeric_of(ctx, condition);
                let target = if cond.is_truthy() {
                    true_target
                } else {
                    false_target
                };
                next = self.branch_target(ctx, target, index);
            }

            Instruction::ExtInst {
                result,
                result_type,
                set,
                ext_opcode,
                ..
            } => {
                ctx.api.add_debug_message(DebugMessage::unsupported(format!(
                    "Extended instruction {ext_opcode} from set id {set} is not interpreted"
                )));
                self.poison_result(ctx, result, result_type);
            }
        }

        // Registers whose live range ends here are retired so long-running
        // sessions do not accumulate every SSA value ever produced.
        if let Some(dead) = ctx.module.register_deaths.get(&index) {
            for &id in dead {
                if let Some(before) = self.registers.remove(id) {
                    self.changes.push(VariableChange {
                        name: register_name(id),
                        before: Some(before),
                        after: None,
                    });
                }
            }
        }

        // Merge points the lane has stepped past are no longer pending.
        if let Some(frame) = self.callstack.last_mut() {
            while frame.merge_stack.last().is_some_and(|&m| m < next) {
                frame.merge_stack.pop();
            }
        }

        self.next_instruction = next;
    }

    /// The innermost merge point this lane has recorded but not yet stepped
    /// past, if any. A lane sitting exactly at it has arrived early.
    pub fn pending_merge(&self) -> Option<usize> {
        self.callstack
            .last()
            .and_then(|frame| frame.merge_stack.last().copied())
    }

    /// How many structured constructs the lane is currently inside.
    pub fn merge_depth(&self) -> usize {
        self.callstack
            .last()
            .map_or(0, |frame| frame.merge_stack.len())
    }

    fn branch_target(&mut self, ctx: &mut EvalContext<'_>, target: Id, from: usize) -> usize {
        match ctx.module.labels.get(&target) {
            Some(&index) => index,
            None => {
                warn!(target = target.0, from, "branch to unknown label");
                ctx.api.add_debug_message(DebugMessage::execution_high(format!(
                    "Branch to unknown label id {target}; terminating lane"
                )));
                self.done = true;
                from
            }
        }
    }

    fn declare_local(
        &mut self,
        ctx: &mut EvalContext<'_>,
        result: Id,
        result_type: Id,
        storage: StorageClass,
    ) {
        let pointee = match ctx.module.types.get(result_type) {
            Some(DataType::Pointer { pointee, .. }) => *pointee,
            _ => {
                ctx.api.add_debug_message(DebugMessage::execution_high(format!(
                    "Variable id {result} has a non-pointer result type"
                )));
                return;
            }
        };
        if storage != StorageClass::Function {
            debug!(id = result.0, ?storage, "function-level variable with odd storage class");
        }
        let decor = ctx.module.decorations.get(result);
        // Fresh storage is poison-filled so reads of never-written locals are
        // visibly garbage instead of silently zero.
        let storage_value = walker::build_variable(ctx.module, &decor, pointee);
        self.locals.set(result, storage_value);
        let ptr =
            pointer::make_pointer_variable(result, PointerTarget::Local(result), Some(pointee), None, None);
        self.set_register(result, ShaderValue::Pointer(Box::new(ptr)));
    }

    fn execute_store(&mut self, ctx: &mut EvalContext<'_>, pointer: Id, object: Id) {
        let Some(ShaderValue::Pointer(ptr)) = self.value_of(ctx, pointer) else {
            ctx.api.add_debug_message(DebugMessage::execution_high(format!(
                "Store through id {pointer} which is not a pointer"
            )));
            return;
        };
        let Some(value) = self.value_of(ctx, object) else {
            ctx.api.add_debug_message(DebugMessage::execution_high(format!(
                "Store of id {object} which has no value"
            )));
            return;
        };
        // Helper lanes exist for derivatives only; their side effects outside
        // lane-local storage must not land.
        if self.helper && (ptr.is_buffer_backed() || matches!(ptr.target, PointerTarget::Global(_)))
        {
            return;
        }
        let mut refs = StorageRefsMut {
            globals: ctx.global_values,
            locals: &mut self.locals,
        };
        pointer::write_through_pointer(ctx.module, ctx.api, &mut refs, &ptr, &value);
        self.changes.push(VariableChange {
            name: base_name(ctx.module, ptr.base_id),
            before: None,
            after: Some(value),
        });
    }
}

fn register_name(id: Id) -> String {
    format!("r{id}")
}

/// Display name for a store's destination: the declared global name when the
/// pointer chain started at one, the register name otherwise.
fn base_name(module: &Module, base_id: Id) -> String {
    match module.global(base_id) {
        Some(global) if !global.name.is_empty() => global.name.clone(),
        _ => register_name(base_id),
    }
}

/// Materializes a constant as a value, shaped from its type.
pub fn constant_value(module: &Module, id: Id) -> Option<ShaderValue> {
    let constant = module.constants.get(&id)?;
    let (scalar, rows, cols) = match module.types.get(constant.type_id)? {
        DataType::Scalar(s) => (*s, 1, 1),
        DataType::Vector { scalar, count } => (*scalar, 1, *count),
        DataType::Matrix { scalar, rows, cols } => (*scalar, *rows, *cols),
        _ => return None,
    };
    let mut n = NumericValue::from_scalar_type(scalar, rows, cols);
    for (lane, &word) in constant.words.iter().take(n.lane_count()).enumerate() {
        n.words[lane] = word;
    }
    Some(ShaderValue::Numeric(n))
}

/// Extracts by literal index path, by value. On a matrix the first index
/// selects a column, the second a row; on a vector one index selects a
/// component. Indices out of range clamp.
fn extract_composite(value: &ShaderValue, indices: &[u32]) -> ShaderValue {
    let mut cur = value;
    let mut indices = indices;
    while let Some((&index, rest)) = indices.split_first() {
        match cur {
            ShaderValue::Aggregate(members) if !members.is_empty() => {
                cur = &members[(index as usize).min(members.len() - 1)];
                indices = rest;
            }
            ShaderValue::Numeric(n) => {
                return ShaderValue::Numeric(extract_numeric(n, index, rest.first().copied()));
            }
            _ => break,
        }
    }
    cur.clone()
}

fn extract_numeric(n: &NumericValue, first: u32, second: Option<u32>) -> NumericValue {
    if n.rows > 1 {
        let col = (first as u8).min(n.cols - 1);
        match second {
            Some(row) => {
                let row = (row as u8).min(n.rows - 1);
                let mut out = NumericValue::with_shape(n.ty, n.byte_size, 1, 1);
                out.words[0] = n.lane(row, col);
                out
            }
            None => {
                let mut out = NumericValue::with_shape(n.ty, n.byte_size, 1, n.rows);
                for r in 0..n.rows {
                    out.words[r as usize] = n.lane(r, col);
                }
                out
            }
        }
    } else {
        let col = (first as u8).min(n.cols.saturating_sub(1));
        let mut out = NumericValue::with_shape(n.ty, n.byte_size, 1, 1);
        out.words[0] = n.lane(0, col);
        out
    }
}

/// Assembles a composite shaped by `result_type` from already-evaluated
/// constituents. Vectors flatten constituent lanes; matrices take one column
/// vector per constituent; structs and arrays aggregate.
fn construct_composite(module: &Module, result_type: Id, parts: &[ShaderValue]) -> ShaderValue {
    match module.types.get(result_type) {
        Some(DataType::Vector { scalar, count }) => {
            let mut n = NumericValue::from_scalar_type(*scalar, 1, *count);
            let mut lane = 0usize;
            for part in parts {
                if let ShaderValue::Numeric(src) = part {
                    for i in 0..src.lane_count() {
                        if lane >= n.lane_count() {
                            break;
                        }
                        n.words[lane] = src.words[i];
                        lane += 1;
                    }
                }
            }
            ShaderValue::Numeric(n)
        }
        Some(DataType::Matrix { scalar, rows, cols }) => {
            let mut n = NumericValue::from_scalar_type(*scalar, *rows, *cols);
            for (c, part) in parts.iter().take(*cols as usize).enumerate() {
                if let ShaderValue::Numeric(column) = part {
                    for r in 0..*rows {
                        n.set_lane(r, c as u8, column.words[(r as usize).min(15)]);
                    }
                }
            }
            ShaderValue::Numeric(n)
        }
        Some(DataType::Struct { .. }) | Some(DataType::Array { .. }) => {
            ShaderValue::Aggregate(parts.to_vec())
        }
        _ => parts
            .first()
            .cloned()
            .unwrap_or(ShaderValue::scalar_u32(0)),
    }
}

/// Component-wise select when the condition is a bool vector matching the
/// operand shape, whole-value select otherwise.
fn select_value(
    cond: &NumericValue,
    if_true: Option<ShaderValue>,
    if_false: Option<ShaderValue>,
) -> ShaderValue {
    let t = if_true.unwrap_or(ShaderValue::scalar_u32(0));
    let f = if_false.unwrap_or(ShaderValue::scalar_u32(0));
    if cond.lane_count() > 1 {
        if let (ShaderValue::Numeric(tn), ShaderValue::Numeric(fn_)) = (&t, &f) {
            if tn.lane_count() == cond.lane_count() && fn_.lane_count() == cond.lane_count() {
                let mut out = tn.clone();
                for i in 0..out.lane_count() {
                    if cond.words[i] == 0 {
                        out.words[i] = fn_.words[i];
                    }
                }
                return ShaderValue::Numeric(out);
            }
        }
    }
    if cond.is_truthy() {
        t
    } else {
        f
    }
}

fn is_float(ty: VarType) -> bool {
    matches!(ty, VarType::Float | VarType::Double | VarType::Half)
}

fn lane_float(n: &NumericValue, index: usize) -> f64 {
    match n.ty {
        VarType::Double => f64::from_bits(n.words[index]),
        _ => f32::from_bits(n.words[index] as u32) as f64,
    }
}

fn float_bits(ty: VarType, v: f64) -> u64 {
    match ty {
        VarType::Double => v.to_bits(),
        _ => (v as f32).to_bits() as u64,
    }
}

fn sign_extend(word: u64, byte_size: u8) -> i64 {
    let shift = 64 - byte_size as u32 * 8;
    ((word << shift) as i64) >> shift
}

fn truncate(word: u64, byte_size: u8) -> u64 {
    if byte_size >= 8 {
        word
    } else {
        word & ((1u64 << (byte_size as u32 * 8)) - 1)
    }
}

/// Elementwise arithmetic. The result takes the left operand's shape; a
/// scalar right operand broadcasts.
pub fn eval_binary(op: BinaryOp, a: &NumericValue, b: &NumericValue) -> NumericValue {
    let mut out = a.clone();
    let b_last = b.lane_count().saturating_sub(1);
    for i in 0..out.lane_count() {
        let bw = b.words[i.min(b_last)];
        out.words[i] = match op {
            BinaryOp::FAdd => float_bits(a.ty, lane_float(a, i) + lane_float_word(a.ty, bw)),
            BinaryOp::FSub => float_bits(a.ty, lane_float(a, i) - lane_float_word(a.ty, bw)),
            BinaryOp::FMul => float_bits(a.ty, lane_float(a, i) * lane_float_word(a.ty, bw)),
            BinaryOp::FDiv => float_bits(a.ty, lane_float(a, i) / lane_float_word(a.ty, bw)),
            BinaryOp::IAdd => truncate(a.words[i].wrapping_add(bw), a.byte_size),
            BinaryOp::ISub => truncate(a.words[i].wrapping_sub(bw), a.byte_size),
            BinaryOp::IMul => truncate(a.words[i].wrapping_mul(bw), a.byte_size),
        };
    }
    if !is_float(out.ty)
        && matches!(op, BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv)
    {
        warn!("float arithmetic on non-float lanes");
    }
    out
}

fn lane_float_word(ty: VarType, word: u64) -> f64 {
    match ty {
        VarType::Double => f64::from_bits(word),
        _ => f32::from_bits(word as u32) as f64,
    }
}

/// Elementwise comparison producing bools in the left operand's shape.
pub fn eval_compare(op: CompareOp, a: &NumericValue, b: &NumericValue) -> NumericValue {
    let mut out = NumericValue::with_shape(VarType::Bool, 4, a.rows, a.cols);
    let b_last = b.lane_count().saturating_sub(1);
    for i in 0..out.lane_count() {
        let bw = b.words[i.min(b_last)];
        let truth = match op {
            // Ordered float compares: NaN operands fail.
            CompareOp::FOrdLess => {
                let (x, y) = (lane_float(a, i), lane_float_word(a.ty, bw));
                !x.is_nan() && !y.is_nan() && x < y
            }
            CompareOp::FOrdGreater => {
                let (x, y) = (lane_float(a, i), lane_float_word(a.ty, bw));
                !x.is_nan() && !y.is_nan() && x > y
            }
            CompareOp::IEqual => truncate(a.words[i], a.byte_size) == truncate(bw, a.byte_size),
            CompareOp::SLess => {
                sign_extend(a.words[i], a.byte_size) < sign_extend(bw, a.byte_size)
            }
        };
        out.words[i] = truth as u64;
    }
    out
}
