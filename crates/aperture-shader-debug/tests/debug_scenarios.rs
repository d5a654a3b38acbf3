//! End-to-end stepping scenarios: buffer loads into locals, quad divergence
//! and reconvergence, and derivative emulation over reconstructed neighbors.

mod common;

use aperture_spirv::test_utils::ModuleBuilder;
use aperture_spirv::{
    CompareOp, Decorations, DerivAxis, DerivPrecision, Instruction, ShaderStage, StorageClass,
};
use aperture_spirv::{BinaryOp, StructMember};

use aperture_shader_debug::testing::MockApi;
use aperture_shader_debug::{BindIndex, Debugger, DerivativeDeltas};

use common::{f32_bytes, f32_type, pointer_to, u32_type, vec4_type};
use pretty_assertions::assert_eq;

#[test]
fn fragment_extracts_uniform_component_to_output() {
    let mut b = ModuleBuilder::new();
    let f32t = f32_type(&mut b);
    let u32t = u32_type(&mut b);
    let vec4 = vec4_type(&mut b);

    // layout(set 0, binding 0) uniform Scene { vec4 tint; } at offset 16.
    let block = b.ty(aperture_spirv::DataType::Struct {
        members: vec![StructMember {
            name: "tint".into(),
            type_id: vec4,
            decorations: Decorations {
                byte_offset: Some(16),
                ..Default::default()
            },
        }],
    });
    let ubo_ptr = pointer_to(&mut b, block, StorageClass::Uniform);
    let ubo = b.global("scene", ubo_ptr, StorageClass::Uniform);
    b.decorate(
        ubo,
        Decorations {
            descriptor_set: Some(0),
            binding: Some(0),
            ..Default::default()
        },
    );

    let out_ptr = pointer_to(&mut b, f32t, StorageClass::Output);
    let out_var = b.global("brightness", out_ptr, StorageClass::Output);

    let local_ptr = pointer_to(&mut b, vec4, StorageClass::Function);
    let member_ptr = pointer_to(&mut b, vec4, StorageClass::Uniform);
    let comp_ptr = pointer_to(&mut b, f32t, StorageClass::Function);

    let c0 = b.constant_u32(u32t, 0);
    let c1 = b.constant_u32(u32t, 1);

    let lvar = b.fresh_id();
    let chain = b.fresh_id();
    let loaded = b.fresh_id();
    let lchain = b.fresh_id();
    let col_y = b.fresh_id();
    let main = b.function(
        "main",
        vec![],
        vec![
            Instruction::Variable {
                result: lvar,
                result_type: local_ptr,
                storage: StorageClass::Function,
            },
            Instruction::AccessChain {
                result: chain,
                result_type: member_ptr,
                base: ubo,
                indices: vec![c0],
            },
            Instruction::Load {
                result: loaded,
                result_type: vec4,
                pointer: chain,
            },
            Instruction::Store {
                pointer: lvar,
                object: loaded,
            },
            Instruction::AccessChain {
                result: lchain,
                result_type: comp_ptr,
                base: lvar,
                indices: vec![c1],
            },
            Instruction::Load {
                result: col_y,
                result_type: f32t,
                pointer: lchain,
            },
            Instruction::Store {
                pointer: out_var,
                object: col_y,
            },
            Instruction::Return,
        ],
    );
    b.entry_point(main, ShaderStage::Fragment, vec![out_var]);
    let module = b.build();

    let mut bytes = vec![0u8; 16];
    bytes.extend(f32_bytes(&[1.0, 2.0, 3.0, 4.0]));
    let api = MockApi::new().with_buffer(BindIndex::default(), bytes);

    let mut debugger = Debugger::new(module, api, 0).unwrap();
    let states = debugger.continue_debug();
    assert_eq!(states.len(), 8);
    assert!(debugger.finished());
    assert!(debugger.api().messages.is_empty());

    let thread = debugger.debugged_thread();
    let extracted = thread.registers.get(col_y).unwrap().as_numeric().unwrap();
    assert_eq!(extracted.as_f32(0, 0), 2.0);
    let out = thread.locals.get(out_var).unwrap().as_numeric().unwrap();
    assert_eq!(out.as_f32(0, 0), 2.0);
    // The uniform block itself stays untouched.
    assert_eq!(debugger.api().buffer_f32(BindIndex::default(), 20), 2.0);
}

fn divergent_quad_module() -> (
    aperture_spirv::Module,
    aperture_spirv::Id,
    aperture_spirv::Id,
    aperture_spirv::Id,
) {
    let mut b = ModuleBuilder::new();
    let f32t = f32_type(&mut b);
    let in_ptr = pointer_to(&mut b, f32t, StorageClass::Input);
    let input = b.global("depth", in_ptr, StorageClass::Input);
    b.decorate(
        input,
        Decorations {
            location: Some(0),
            ..Default::default()
        },
    );

    let c_threshold = b.constant_f32(f32t, 1.5);
    let c_ten = b.constant_f32(f32t, 10.0);
    let c_two = b.constant_f32(f32t, 2.0);

    let li = b.fresh_id();
    let cond = b.fresh_id();
    let merge = b.fresh_id();
    let t_block = b.fresh_id();
    let f_block = b.fresh_id();
    let tv = b.fresh_id();
    let fv = b.fresh_id();
    let main = b.function(
        "main",
        vec![],
        vec![
            Instruction::Load {
                result: li,
                result_type: f32t,
                pointer: input,
            },
            Instruction::Compare {
                result: cond,
                result_type: f32t,
                op: CompareOp::FOrdLess,
                a: li,
                b: c_threshold,
            },
            Instruction::SelectionMerge { merge_block: merge },
            Instruction::BranchConditional {
                condition: cond,
                true_target: t_block,
                false_target: f_block,
            },
            Instruction::Label { block: t_block },
            Instruction::Binary {
                result: tv,
                result_type: f32t,
                op: BinaryOp::FAdd,
                a: li,
                b: c_ten,
            },
            Instruction::Branch { target: merge },
            Instruction::Label { block: f_block },
            Instruction::Binary {
                result: fv,
                result_type: f32t,
                op: BinaryOp::FMul,
                a: li,
                b: c_two,
            },
            Instruction::Branch { target: merge },
            Instruction::Label { block: merge },
            Instruction::Return,
        ],
    );
    b.entry_point(main, ShaderStage::Fragment, vec![input]);
    (b.build(), input, tv, fv)
}

#[test]
fn quad_diverges_and_reconverges_at_merge() {
    let (module, _input, tv, fv) = divergent_quad_module();

    // Lane values 0, 2, 3, 0: the diagonal (< 1.5) takes the true arm, so
    // neither arm is a contiguous half of the quad.
    let mut api = MockApi::new();
    api.inputs.insert((0, 0), vec![0.0]);
    api.deltas = DerivativeDeltas {
        ddx_coarse: [2.0, 0.0, 0.0, 0.0],
        ddy_coarse: [3.0, 0.0, 0.0, 0.0],
        ddx_fine: [2.0, 0.0, 0.0, 0.0],
        ddy_fine: [-2.0, 0.0, 0.0, 0.0],
    };

    let mut debugger = Debugger::new(module, api, 0).unwrap();
    assert_eq!(debugger.active_mask(), vec![true; 4]);

    // Load, Compare, SelectionMerge, BranchConditional.
    for _ in 0..4 {
        debugger.step_debugged_lane().unwrap();
    }
    // Both arms run at the same time; no lane has reached the merge yet.
    assert_eq!(debugger.active_mask(), vec![true; 4]);

    // Label, Binary, Branch of each arm. The arms are the same length, so
    // the whole quad arrives at the merge label on the same tick.
    for _ in 0..3 {
        debugger.step_debugged_lane().unwrap();
        assert_eq!(debugger.active_mask(), vec![true; 4]);
    }
    let state = debugger.step_debugged_lane().unwrap();
    assert_eq!(state.callstack, vec!["main"]);

    for lane in [0, 3] {
        let thread = debugger.thread(lane).unwrap();
        assert_eq!(
            thread.registers.get(tv).unwrap().as_numeric().unwrap().as_f32(0, 0),
            10.0
        );
        assert!(!thread.registers.contains(fv));
    }
    let lane1 = debugger.thread(1).unwrap();
    assert_eq!(
        lane1.registers.get(fv).unwrap().as_numeric().unwrap().as_f32(0, 0),
        4.0
    );
    assert!(!lane1.registers.contains(tv));
    let lane2 = debugger.thread(2).unwrap();
    assert_eq!(
        lane2.registers.get(fv).unwrap().as_numeric().unwrap().as_f32(0, 0),
        6.0
    );
}

#[test]
fn early_arrivers_wait_at_the_merge_label() {
    let mut b = ModuleBuilder::new();
    let f32t = f32_type(&mut b);
    let in_ptr = pointer_to(&mut b, f32t, StorageClass::Input);
    let input = b.global("depth", in_ptr, StorageClass::Input);
    b.decorate(
        input,
        Decorations {
            location: Some(0),
            ..Default::default()
        },
    );

    let c_threshold = b.constant_f32(f32t, 1.5);
    let c_ten = b.constant_f32(f32t, 10.0);
    let c_two = b.constant_f32(f32t, 2.0);

    let li = b.fresh_id();
    let cond = b.fresh_id();
    let merge = b.fresh_id();
    let t_block = b.fresh_id();
    let f_block = b.fresh_id();
    let tv1 = b.fresh_id();
    let tv2 = b.fresh_id();
    let fv = b.fresh_id();
    // The true arm is one instruction longer than the false arm.
    let main = b.function(
        "main",
        vec![],
        vec![
            Instruction::Load {
                result: li,
                result_type: f32t,
                pointer: input,
            },
            Instruction::Compare {
                result: cond,
                result_type: f32t,
                op: CompareOp::FOrdLess,
                a: li,
                b: c_threshold,
            },
            Instruction::SelectionMerge { merge_block: merge },
            Instruction::BranchConditional {
                condition: cond,
                true_target: t_block,
                false_target: f_block,
            },
            Instruction::Label { block: t_block },
            Instruction::Binary {
                result: tv1,
                result_type: f32t,
                op: BinaryOp::FAdd,
                a: li,
                b: c_ten,
            },
            Instruction::Binary {
                result: tv2,
                result_type: f32t,
                op: BinaryOp::FAdd,
                a: tv1,
                b: c_ten,
            },
            Instruction::Branch { target: merge },
            Instruction::Label { block: f_block },
            Instruction::Binary {
                result: fv,
                result_type: f32t,
                op: BinaryOp::FMul,
                a: li,
                b: c_two,
            },
            Instruction::Branch { target: merge },
            Instruction::Label { block: merge },
            Instruction::Return,
        ],
    );
    b.entry_point(main, ShaderStage::Fragment, vec![input]);
    let module = b.build();

    // Lane values 0, 1, 5, 6: the top row takes the longer true arm.
    let mut api = MockApi::new();
    api.inputs.insert((0, 0), vec![0.0]);
    api.deltas = DerivativeDeltas {
        ddx_coarse: [1.0, 0.0, 0.0, 0.0],
        ddy_coarse: [5.0, 0.0, 0.0, 0.0],
        ddx_fine: [1.0, 0.0, 0.0, 0.0],
        ddy_fine: [5.0, 0.0, 0.0, 0.0],
    };

    let mut debugger = Debugger::new(module, api, 0).unwrap();

    // Load, Compare, SelectionMerge, BranchConditional, then two more ticks
    // with both arms running.
    for _ in 0..6 {
        debugger.step_debugged_lane().unwrap();
        assert_eq!(debugger.active_mask(), vec![true; 4]);
    }

    // The short false arm reaches the merge label first and waits there
    // while the true arm finishes.
    debugger.step_debugged_lane().unwrap();
    assert_eq!(debugger.active_mask(), vec![true, true, false, false]);

    // The true arm's branch lands on the merge label too; the quad is
    // uniform again.
    debugger.step_debugged_lane().unwrap();
    assert_eq!(debugger.active_mask(), vec![true; 4]);

    let states = debugger.continue_debug();
    assert_eq!(states.len(), 2);
    assert!(debugger.finished());

    let lane0 = debugger.thread(0).unwrap();
    assert_eq!(
        lane0.registers.get(tv2).unwrap().as_numeric().unwrap().as_f32(0, 0),
        20.0
    );
    let lane2 = debugger.thread(2).unwrap();
    assert_eq!(
        lane2.registers.get(fv).unwrap().as_numeric().unwrap().as_f32(0, 0),
        10.0
    );
    assert!(!lane2.registers.contains(tv1));
}

#[test]
fn derivatives_over_reconstructed_neighbors() {
    let mut b = ModuleBuilder::new();
    let f32t = f32_type(&mut b);
    let in_ptr = pointer_to(&mut b, f32t, StorageClass::Input);
    let input = b.global("uv_x", in_ptr, StorageClass::Input);
    b.decorate(
        input,
        Decorations {
            location: Some(0),
            ..Default::default()
        },
    );

    let li = b.fresh_id();
    let dx = b.fresh_id();
    let dy_fine = b.fresh_id();
    let main = b.function(
        "main",
        vec![],
        vec![
            Instruction::Load {
                result: li,
                result_type: f32t,
                pointer: input,
            },
            Instruction::Derivative {
                result: dx,
                result_type: f32t,
                axis: DerivAxis::X,
                precision: DerivPrecision::Plain,
                value: li,
            },
            Instruction::Derivative {
                result: dy_fine,
                result_type: f32t,
                axis: DerivAxis::Y,
                precision: DerivPrecision::Fine,
                value: li,
            },
            Instruction::Return,
        ],
    );
    b.entry_point(main, ShaderStage::Fragment, vec![input]);
    let module = b.build();

    let mut api = MockApi::new();
    api.inputs.insert((0, 0), vec![5.0]);
    api.deltas = DerivativeDeltas {
        ddx_coarse: [0.5, 0.0, 0.0, 0.0],
        ddy_coarse: [0.25, 0.0, 0.0, 0.0],
        ddx_fine: [0.5, 0.0, 0.0, 0.0],
        ddy_fine: [0.25, 0.0, 0.0, 0.0],
    };

    let mut debugger = Debugger::new(module, api, 0).unwrap();
    let states = debugger.continue_debug();
    assert_eq!(states.len(), 4);

    // The right-hand neighbor was rebuilt one coarse x delta away.
    let lane1 = debugger.thread(1).unwrap();
    assert_eq!(
        lane1.registers.get(li).unwrap().as_numeric().unwrap().as_f32(0, 0),
        5.5
    );

    let lane0 = debugger.thread(0).unwrap();
    assert_eq!(
        lane0.registers.get(dx).unwrap().as_numeric().unwrap().as_f32(0, 0),
        0.5
    );
    assert_eq!(
        lane0
            .registers
            .get(dy_fine)
            .unwrap()
            .as_numeric()
            .unwrap()
            .as_f32(0, 0),
        0.25
    );
}

#[test]
fn debug_states_serialize_for_the_host() {
    let mut b = ModuleBuilder::new();
    let f32t = f32_type(&mut b);
    let c1 = b.constant_f32(f32t, 1.0);
    let sum = b.fresh_id();
    let first = b.instruction_count();
    let main = b.function(
        "main",
        vec![],
        vec![
            Instruction::Binary {
                result: sum,
                result_type: f32t,
                op: BinaryOp::FAdd,
                a: c1,
                b: c1,
            },
            Instruction::Return,
        ],
    );
    // States report the location of the instruction about to execute.
    b.location(first + 1, "shader.frag", 12, 4);
    b.entry_point(main, ShaderStage::Compute, vec![]);
    let module = b.build();

    let mut debugger = Debugger::new(module, MockApi::new(), 0).unwrap();
    let states = debugger.continue_debug();

    let json = serde_json::to_value(&states).unwrap();
    let first_state = &json[0];
    assert_eq!(first_state["step_index"], 1);
    assert_eq!(first_state["changes"][0]["name"], format!("r{sum}"));
    assert_eq!(first_state["callstack"][0], "main");
    assert_eq!(first_state["source_location"]["line"], 12);
}
