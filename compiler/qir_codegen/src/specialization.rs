//! Specialization Code Generator.
//!
//! One LLVM function per specialization. A provided specialization walks
//! `Declared → HeaderEmitted → BodyEmitted → Closed`; external and
//! intrinsic ones stop at a declaration. User-defined types get a
//! constructor function alongside.

use qir_syntax::{
    ArgumentTuple, Callable, CallableKind, CustomType, QualifiedName, ResolvedType, Specialization,
    SpecializationImplementation, SpecializationKind, Statement,
};
use tracing::{debug, trace};

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::naming::{constructor_name, qis_name, specialization_name};
use crate::value_id::{BlockId, FunctionId};
use crate::values::IValue;

/// Progress of the specialization being generated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpecializationState {
    Declared,
    HeaderEmitted,
    BodyEmitted,
    Closed,
}

impl SpecializationState {
    fn advance(self, to: Self) -> CodegenResult<Self> {
        let legal = matches!(
            (self, to),
            (Self::Declared, Self::HeaderEmitted)
                | (Self::HeaderEmitted, Self::BodyEmitted)
                | (Self::BodyEmitted, Self::Closed)
        );
        if legal {
            Ok(to)
        } else {
            Err(CodegenError::invalid_state(format!(
                "specialization cannot move from {self:?} to {to:?}"
            )))
        }
    }
}

/// The specialization whose body is being emitted.
#[derive(Clone, Debug)]
pub struct CurrentSpecialization {
    pub name: QualifiedName,
    pub kind: SpecializationKind,
    pub function: FunctionId,
    pub entry: BlockId,
    pub output: ResolvedType,
    pub state: SpecializationState,
}

/// Symbol of a specialization: the instruction name for intrinsics,
/// otherwise the generated name.
pub fn function_name(callable: &Callable, kind: SpecializationKind) -> String {
    match callable.intrinsic_code() {
        Some(code) => qis_name(code, kind),
        None => specialization_name(&callable.name, kind),
    }
}

impl GenerationContext<'_, '_> {
    /// Generate every specialization of `callable`.
    ///
    /// Type constructors are skipped; their code comes from the type
    /// declaration.
    pub fn generate_callable(&mut self, callable: &Callable) -> CodegenResult<()> {
        if callable.kind == CallableKind::TypeConstructor {
            trace!(name = %callable.name, "skipping type constructor callable");
            return Ok(());
        }
        for specialization in &callable.specializations {
            self.generate_specialization(callable, specialization)?;
        }
        Ok(())
    }

    /// Generate one specialization and return its function.
    pub fn generate_specialization(
        &mut self,
        callable: &Callable,
        specialization: &Specialization,
    ) -> CodegenResult<FunctionId> {
        let kind = specialization.kind;
        match &specialization.implementation {
            SpecializationImplementation::External | SpecializationImplementation::Intrinsic => {
                let function = self.declare_specialization(callable, kind)?;
                debug!(name = %callable.name, kind = kind.suffix(), "declared specialization");
                Ok(function)
            }
            SpecializationImplementation::Generated(directive) => {
                Err(CodegenError::invalid_state(format!(
                    "{} specialization of '{}' is still marked {directive:?}",
                    kind.suffix(),
                    callable.name
                )))
            }
            SpecializationImplementation::Provided { arguments, body } => {
                let function = self.begin_specialization(callable, kind, arguments)?;
                self.emit_body(body)?;
                self.end_specialization()?;
                Ok(function)
            }
        }
    }

    /// The LLVM function of a specialization, declaring it on first use.
    ///
    /// Parameters are the top-level argument entries, preceded by the
    /// control qubits for controlled kinds. A `Unit` output has no return
    /// slot.
    pub fn declare_specialization(
        &mut self,
        callable: &Callable,
        kind: SpecializationKind,
    ) -> CodegenResult<FunctionId> {
        let name = function_name(callable, kind);
        let controls = kind.is_controlled().then_some(ResolvedType::array(ResolvedType::Qubit));
        let entries = callable.arguments.entries();
        let mut params = Vec::with_capacity(entries.len() + 1);
        for ty in controls.iter().cloned().chain(entries.iter().map(ArgumentTuple::ty)) {
            params.push(self.representation(&ty)?);
        }
        let output = &callable.signature.output;
        let ret = if output.is_unit() {
            None
        } else {
            Some(self.representation(output)?)
        };
        let existed = self.builder.function_by_name(&name).is_some();
        let function = self.builder.get_or_declare_function(&name, &params, ret)?;
        if !existed {
            let offset = usize::from(kind.is_controlled());
            if kind.is_controlled() {
                self.builder.set_param_name(function, 0, "ctls");
            }
            for (index, entry) in entries.iter().enumerate() {
                if let ArgumentTuple::Item {
                    name: Some(param), ..
                } = entry
                {
                    self.builder.set_param_name(function, index + offset, param);
                }
            }
        }
        Ok(function)
    }

    /// `Declared → HeaderEmitted`: create the entry block, open the
    /// function scope, and bind the parameters.
    pub(crate) fn begin_specialization(
        &mut self,
        callable: &Callable,
        kind: SpecializationKind,
        arguments: &ArgumentTuple,
    ) -> CodegenResult<FunctionId> {
        if let Some(current) = &self.current {
            return Err(CodegenError::invalid_state(format!(
                "'{}' {} is still open",
                current.name,
                current.kind.suffix()
            )));
        }
        let function = self.declare_specialization(callable, kind)?;
        if !self.builder.is_declaration(function) {
            return Err(CodegenError::invalid_state(format!(
                "{} specialization of '{}' generated twice",
                kind.suffix(),
                callable.name
            )));
        }
        debug!(name = %callable.name, kind = kind.suffix(), "generating specialization");
        let state = SpecializationState::Declared.advance(SpecializationState::HeaderEmitted)?;

        let entry = self.builder.append_block(function, "entry");
        self.builder.position_at_end(entry);
        self.scopes.reset();
        self.reset_names();
        self.open_scope();
        let params = self.builder.function_params(function);
        self.bind_parameters(arguments, kind, &params)?;

        self.current = Some(CurrentSpecialization {
            name: callable.name.clone(),
            kind,
            function,
            entry,
            output: callable.signature.output.clone(),
            state,
        });
        Ok(function)
    }

    /// `HeaderEmitted → BodyEmitted`.
    pub(crate) fn emit_body(&mut self, body: &[Statement]) -> CodegenResult<()> {
        self.lower_block(body)?;
        self.transition(SpecializationState::BodyEmitted)
    }

    /// `BodyEmitted → Closed`: release the function scope and make sure
    /// the last block ends.
    ///
    /// A trailing block nothing branches to is dropped instead. A block
    /// that falls off the end returns `void` for `Unit` outputs and is
    /// `unreachable` otherwise.
    pub(crate) fn end_specialization(&mut self) -> CodegenResult<()> {
        self.transition(SpecializationState::Closed)?;
        let Some(current) = self.current.take() else {
            return Err(CodegenError::invalid_state("no specialization to close"));
        };
        let dead_block = self.builder.current_block().filter(|&block| {
            block != current.entry
                && self.builder.block_is_empty(block)
                && self.builder.predecessors(block).is_empty()
        });
        if let Some(block) = dead_block {
            trace!("removing unreachable trailing block");
            self.scopes.close()?;
            self.builder.remove_block(block)?;
        } else {
            self.close_scope()?;
            if !self.builder.is_terminated() {
                if current.output.is_unit() {
                    self.builder.ret_void()?;
                } else {
                    self.builder.unreachable()?;
                }
            }
        }
        if self.scopes.depth() != 0 {
            return Err(CodegenError::invalid_state(format!(
                "{} scopes left open in '{}'",
                self.scopes.depth(),
                current.name
            )));
        }
        self.builder.clear_position();
        self.pop_names();
        self.scopes.reset();
        debug!(name = %current.name, kind = current.kind.suffix(), "specialization closed");
        Ok(())
    }

    fn transition(&mut self, to: SpecializationState) -> CodegenResult<()> {
        let Some(current) = self.current.as_mut() else {
            return Err(CodegenError::invalid_state(format!(
                "no specialization to move to {to:?}"
            )));
        };
        current.state = current.state.advance(to)?;
        Ok(())
    }

    /// Output type of the specialization being generated.
    pub(crate) fn current_output(&self) -> CodegenResult<ResolvedType> {
        self.current
            .as_ref()
            .map(|current| current.output.clone())
            .ok_or_else(|| CodegenError::invalid_state("return outside a specialization"))
    }

    // ── Constructors ────────────────────────────────────────────────

    /// Declare the constructor of a user-defined type.
    pub fn declare_constructor(&mut self, custom: &CustomType) -> CodegenResult<FunctionId> {
        let items = custom.items();
        let mut params = Vec::with_capacity(items.len());
        for item in &items {
            params.push(self.representation(item)?);
        }
        let ret = self.representation(&ResolvedType::UserDefined(custom.name.clone()))?;
        self.builder
            .get_or_declare_function(&constructor_name(&custom.name), &params, Some(ret))
    }

    /// Generate the constructor of a user-defined type.
    ///
    /// Builds a tuple of the items from the parameters and returns it; a
    /// type wrapping `Unit` returns the shared unit handle.
    pub fn generate_constructor(&mut self, custom: &CustomType) -> CodegenResult<FunctionId> {
        let function = self.declare_constructor(custom)?;
        if !self.builder.is_declaration(function) {
            return Err(CodegenError::invalid_state(format!(
                "constructor of '{}' generated twice",
                custom.name
            )));
        }
        debug!(name = %custom.name, "generating constructor");
        let entry = self.builder.append_block(function, "entry");
        self.builder.position_at_end(entry);
        self.scopes.reset();
        self.open_scope();

        let ty = ResolvedType::UserDefined(custom.name.clone());
        let params = self.builder.function_params(function);
        let items = custom.items();
        let mut values: Vec<IValue> = Vec::with_capacity(items.len());
        for (param, item) in params.iter().zip(&items) {
            values.push(self.value_from(*param, item)?);
        }
        let constructed = self.create_tuple(&ty, &values)?;
        self.release_for_return(Some(&constructed))?;
        let handle = self.representation_value(&constructed)?;
        self.builder.ret(handle)?;

        self.close_scope()?;
        self.builder.clear_position();
        self.scopes.reset();
        Ok(function)
    }
}

#[cfg(test)]
mod tests;
