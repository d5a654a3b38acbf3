//! Builder for synthetic modules used by the debugger's tests.

use crate::decorations::Decorations;
use crate::module::{
    EntryPoint, Function, GlobalVariable, InstructionLocation, Module, ShaderConstant, ShaderStage,
};
use crate::ops::Instruction;
use crate::scopes::{LocalMapping, ScopeData, ScopeKind, SourceVariableDebugInfo};
use crate::types::DataType;
use crate::{Id, StorageClass};

/// Incrementally assembles a [`Module`] with fresh ids.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
    next_id: u32,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        ModuleBuilder {
            module: Module::default(),
            next_id: 1,
        }
    }

    pub fn fresh_id(&mut self) -> Id {
        let id = Id(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn ty(&mut self, ty: DataType) -> Id {
        let id = self.fresh_id();
        self.module.types.insert(id, ty);
        id
    }

    pub fn decorate(&mut self, id: Id, decorations: Decorations) -> &mut Self {
        self.module.decorations.insert(id, decorations);
        self
    }

    pub fn constant_u32(&mut self, type_id: Id, value: u32) -> Id {
        let id = self.fresh_id();
        self.module
            .constants
            .insert(id, ShaderConstant::scalar_u32(type_id, value));
        id
    }

    pub fn constant_f32(&mut self, type_id: Id, value: f32) -> Id {
        let id = self.fresh_id();
        self.module
            .constants
            .insert(id, ShaderConstant::scalar_f32(type_id, value));
        id
    }

    pub fn global(&mut self, name: &str, type_id: Id, storage: StorageClass) -> Id {
        let id = self.fresh_id();
        self.module.globals.push(GlobalVariable {
            id,
            type_id,
            storage,
            name: name.to_string(),
        });
        id
    }

    /// Appends a function whose body is `instructions`; returns its id.
    pub fn function(&mut self, name: &str, params: Vec<Id>, instructions: Vec<Instruction>) -> Id {
        let id = self.fresh_id();
        let begin = self.module.instructions.len();
        self.module.instructions.extend(instructions);
        let end = self.module.instructions.len();
        self.module.functions.push(Function {
            id,
            name: name.to_string(),
            params,
            begin,
            end,
        });
        id
    }

    pub fn entry_point(&mut self, function: Id, stage: ShaderStage, interface: Vec<Id>) {
        self.module.entry = Some(EntryPoint {
            name: "main".to_string(),
            stage,
            function,
            interface,
        });
    }

    pub fn scope(
        &mut self,
        kind: ScopeKind,
        parent: Option<usize>,
        name: &str,
        begin: usize,
        end: usize,
    ) -> usize {
        self.module.scopes.push(ScopeData {
            kind,
            parent,
            name: name.to_string(),
            begin,
            end,
        });
        self.module.scopes.len() - 1
    }

    pub fn source_var(&mut self, name: &str, type_id: Id, scope: usize) -> Id {
        let id = self.fresh_id();
        self.module.source_vars.push(SourceVariableDebugInfo {
            id,
            name: name.to_string(),
            type_id,
            scope,
        });
        id
    }

    pub fn map_local(&mut self, mapping: LocalMapping) -> &mut Self {
        self.module.local_mappings.push(mapping);
        self
    }

    pub fn kill_register(&mut self, instruction: usize, register: Id) -> &mut Self {
        self.module
            .register_deaths
            .entry(instruction)
            .or_default()
            .push(register);
        self
    }

    pub fn location(&mut self, instruction: usize, file: &str, line: u32, column: u32) -> &mut Self {
        self.module.locations.insert(
            instruction,
            InstructionLocation {
                file: file.to_string(),
                line,
                column,
            },
        );
        self
    }

    pub fn instruction_count(&self) -> usize {
        self.module.instructions.len()
    }

    pub fn build(mut self) -> Module {
        self.module.resolve_labels();
        self.module
            .local_mappings
            .sort_by_key(|mapping| mapping.instruction);
        self.module
    }
}
