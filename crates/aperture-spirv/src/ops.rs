//! The decoded instruction stream.
//!
//! The reflector decodes raw SPIR-V words into this closed enum once, before
//! debugging starts. The debugger's step function is a match over these
//! variants; it never re-inspects raw words.

use crate::{Id, StorageClass};

/// Elementwise binary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
    IAdd,
    ISub,
    IMul,
}

/// Elementwise comparison, producing bools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    FOrdLess,
    FOrdGreater,
    IEqual,
    SLess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivAxis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivPrecision {
    /// Implementation's choice; treated as coarse.
    Plain,
    Coarse,
    Fine,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    Undef {
        result: Id,
        result_type: Id,
    },
    /// Start of a basic block; branch targets resolve to these.
    Label {
        block: Id,
    },
    /// Declares the merge block of the structured selection that follows.
    SelectionMerge {
        merge_block: Id,
    },
    /// Declares the merge block and continue target of the loop that follows.
    LoopMerge {
        merge_block: Id,
        continue_target: Id,
    },
    Branch {
        target: Id,
    },
    BranchConditional {
        condition: Id,
        true_target: Id,
        false_target: Id,
    },
    FunctionCall {
        result: Id,
        result_type: Id,
        function: Id,
        arguments: Vec<Id>,
    },
    Return,
    ReturnValue {
        value: Id,
    },
    /// A function-local (or interface) variable declaration. The result id is
    /// a pointer to freshly allocated storage.
    Variable {
        result: Id,
        result_type: Id,
        storage: StorageClass,
    },
    Load {
        result: Id,
        result_type: Id,
        pointer: Id,
    },
    Store {
        pointer: Id,
        object: Id,
    },
    /// Builds a pointer deeper into an aggregate. Indices are constant or
    /// register ids holding integers.
    AccessChain {
        result: Id,
        result_type: Id,
        base: Id,
        indices: Vec<Id>,
    },
    /// Extracts a component by literal index path, by value.
    CompositeExtract {
        result: Id,
        result_type: Id,
        composite: Id,
        indices: Vec<u32>,
    },
    CompositeConstruct {
        result: Id,
        result_type: Id,
        constituents: Vec<Id>,
    },
    Select {
        result: Id,
        result_type: Id,
        condition: Id,
        if_true: Id,
        if_false: Id,
    },
    Binary {
        result: Id,
        result_type: Id,
        op: BinaryOp,
        a: Id,
        b: Id,
    },
    Compare {
        result: Id,
        result_type: Id,
        op: CompareOp,
        a: Id,
        b: Id,
    },
    /// ddx/ddy over the 2x2 quad.
    Derivative {
        result: Id,
        result_type: Id,
        axis: DerivAxis,
        precision: DerivPrecision,
        value: Id,
    },
    /// An extended-instruction-set call the debugger does not interpret.
    ExtInst {
        result: Id,
        result_type: Id,
        set: Id,
        ext_opcode: u32,
        operands: Vec<Id>,
    },
}
