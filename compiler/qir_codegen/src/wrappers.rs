//! Callable Wrapper & Dispatch Table Generator.
//!
//! A callable used as a value is represented by a 4-slot table of wrapper
//! functions, one per specialization kind, each with the fixed signature
//! `void(ptr capture, ptr args, ptr result)`. Tables are created on first
//! reference; wrapper bodies are generated afterwards, once every
//! specialization exists, by draining a queue. The queue also holds the
//! lifted wrappers and capture count functions of partial applications
//! (see `partial.rs`).

use std::collections::VecDeque;

use inkwell::module::Linkage;
use qir_syntax::{Callable, QualifiedName, ResolvedType, SpecializationKind};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::expressions::ArgumentSource;
use crate::naming::{numbered_name, table_name, wrapper_name};
use crate::partial::{CountFunction, LiftedWrapper};
use crate::specialization::function_name;
use crate::value_id::{FunctionId, GlobalId, ValueId};
use crate::values::{IValue, TupleValue};

/// Dispatch tables created so far and the functions whose bodies are
/// still to be generated.
#[derive(Default, Debug)]
pub struct WrapperRegistry {
    tables: FxHashMap<QualifiedName, GlobalId>,
    pending: VecDeque<QualifiedName>,
    pub(crate) memory_tables: FxHashMap<ResolvedType, GlobalId>,
    pub(crate) lifted: VecDeque<LiftedWrapper>,
    pub(crate) counts: VecDeque<CountFunction>,
    numbering: FxHashMap<&'static str, usize>,
}

impl WrapperRegistry {
    /// The table of `name`, if one was created.
    pub fn table(&self, name: &QualifiedName) -> Option<GlobalId> {
        self.tables.get(name).copied()
    }

    /// Number of tables created for global callables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Functions queued but not generated.
    pub fn pending(&self) -> usize {
        self.pending.len() + self.lifted.len() + self.counts.len()
    }

    /// A fresh module-unique name `base__N`.
    pub(crate) fn unique_name(&mut self, base: &'static str) -> String {
        let index = self.numbering.entry(base).or_default();
        *index += 1;
        numbered_name(base, *index)
    }
}

impl GenerationContext<'_, '_> {
    /// Declare a function with the wrapper signature.
    pub(crate) fn declare_wrapper(&mut self, name: &str) -> CodegenResult<FunctionId> {
        let ptr = self.builtins().ptr;
        self.builder.get_or_declare_function(name, &[ptr, ptr, ptr], None)
    }

    /// A constant `[4 x ptr]` table of `slots`, null where a kind is
    /// missing.
    pub(crate) fn add_table(
        &mut self,
        name: &str,
        slots: &[Option<FunctionId>],
    ) -> CodegenResult<GlobalId> {
        let mut values = Vec::with_capacity(slots.len());
        for slot in slots {
            values.push(match slot {
                Some(function) => self.builder.function_value(*function),
                None => self.builder.const_null_ptr(),
            });
        }
        let init = self.builder.const_ptr_array(&values)?;
        let table_ty = self.builtins().table;
        Ok(self
            .builder
            .add_global(name, table_ty, Some(init), true, Linkage::Internal))
    }

    /// The dispatch table of `callable`, created and queued on first use.
    ///
    /// Slots of kinds the callable does not provide are null.
    pub fn ensure_wrapper_for(&mut self, callable: &Callable) -> CodegenResult<GlobalId> {
        if let Some(table) = self.wrappers.table(&callable.name) {
            return Ok(table);
        }
        let mut slots = Vec::with_capacity(SpecializationKind::ALL.len());
        for kind in SpecializationKind::ALL {
            slots.push(if callable.specialization(kind).is_some() {
                Some(self.declare_wrapper(&wrapper_name(&callable.name, kind))?)
            } else {
                None
            });
        }
        let table = self.add_table(&table_name(&callable.name), &slots)?;
        self.wrappers.tables.insert(callable.name.clone(), table);
        self.wrappers.pending.push_back(callable.name.clone());
        debug!(name = %callable.name, "queued wrappers");
        Ok(table)
    }

    /// Generate every queued function; returns how many were generated.
    pub fn generate_pending_wrappers(&mut self) -> CodegenResult<usize> {
        let mut generated = 0;
        loop {
            if let Some(name) = self.wrappers.pending.pop_front() {
                let callable = self.lookup_callable(&name)?;
                for kind in SpecializationKind::ALL {
                    if callable.specialization(kind).is_some() {
                        self.generate_wrapper(callable, kind)?;
                        generated += 1;
                    }
                }
            } else if let Some(lifted) = self.wrappers.lifted.pop_front() {
                self.generate_lifted_wrapper(&lifted)?;
                generated += 1;
            } else if let Some(count) = self.wrappers.counts.pop_front() {
                self.generate_count_function(&count)?;
                generated += 1;
            } else {
                return Ok(generated);
            }
        }
    }

    /// Position the builder in a fresh entry block of `wrapper` with one
    /// scope open, and return its three parameters.
    pub(crate) fn enter_wrapper(
        &mut self,
        wrapper: FunctionId,
    ) -> CodegenResult<(ValueId, ValueId, ValueId)> {
        if !self.builder.is_declaration(wrapper) {
            return Err(CodegenError::invalid_state(format!(
                "wrapper '{}' generated twice",
                self.builder.function_name(wrapper)
            )));
        }
        for (index, name) in ["capture-tuple", "arg-tuple", "result-tuple"].iter().enumerate() {
            self.builder.set_param_name(wrapper, index, name);
        }
        let entry = self.builder.append_block(wrapper, "entry");
        self.builder.position_at_end(entry);
        self.scopes.reset();
        self.open_scope();
        let params = self.builder.function_params(wrapper);
        let [capture, args, result] = params[..] else {
            return Err(CodegenError::invalid_state(format!(
                "wrapper with {} parameters",
                params.len()
            )));
        };
        Ok((capture, args, result))
    }

    /// Release the wrapper scope and return.
    pub(crate) fn leave_wrapper(&mut self) -> CodegenResult<()> {
        self.close_scope()?;
        self.builder.ret_void()?;
        self.builder.clear_position();
        self.scopes.reset();
        Ok(())
    }

    /// Unpack the argument tuple, call the specialization, and store its
    /// output into the result tuple.
    fn generate_wrapper(&mut self, callable: &Callable, kind: SpecializationKind) -> CodegenResult<()> {
        let wrapper = self.declare_wrapper(&wrapper_name(&callable.name, kind))?;
        let target = self.declare_specialization(callable, kind)?;
        debug!(
            name = %callable.name,
            target = %function_name(callable, kind),
            "generating wrapper"
        );
        let (_, arg_tuple, result_tuple) = self.enter_wrapper(wrapper)?;

        let entries = callable.arguments.entries().len();
        let argument = &callable.signature.argument;
        let mut args = Vec::with_capacity(entries + 1);
        if kind.is_controlled() {
            let layout = ResolvedType::Tuple(vec![
                ResolvedType::array(ResolvedType::Qubit),
                argument.clone(),
            ]);
            let packed = self.argument_record(arg_tuple, &layout)?;
            let controls = self.tuple_item(&packed, 0)?;
            let inner = self.tuple_item(&packed, 1)?;
            args.push(self.representation_value(&controls)?);
            args.extend(self.lower_arguments(entries, ArgumentSource::Value(inner))?);
        } else {
            match argument {
                ResolvedType::Unit => {}
                ResolvedType::Tuple(_) => {
                    let packed = self.argument_record(arg_tuple, argument)?;
                    args.extend(
                        self.lower_arguments(entries, ArgumentSource::Value(IValue::Tuple(packed)))?,
                    );
                }
                other => {
                    let layout = ResolvedType::Tuple(vec![other.clone()]);
                    let packed = self.argument_record(arg_tuple, &layout)?;
                    let item = self.tuple_item(&packed, 0)?;
                    args.push(self.representation_value(&item)?);
                }
            }
        }

        let result = self.builder.call(target, &args, "")?;
        let output = &callable.signature.output;
        if !output.is_unit() {
            let value = self.call_result(result, output)?;
            match &value {
                IValue::Tuple(source) if !value.is_unit() => {
                    let destination = self.argument_record(result_tuple, output)?;
                    self.populate_tuple(&destination, source)?;
                }
                IValue::Tuple(_) => {}
                _ => {
                    let layout = ResolvedType::Tuple(vec![output.clone()]);
                    let destination = self.argument_record(result_tuple, &layout)?;
                    let slot = self.tuple_item_pointer(&destination, 0)?;
                    let stored = self.representation_value(&value)?;
                    self.builder.store(stored, slot)?;
                    self.increase_reference_count(&value)?;
                }
            }
        }
        self.leave_wrapper()
    }

    /// View a tuple handle parameter as a tuple of type `ty`; borrowed,
    /// so never registered.
    pub(crate) fn argument_record(
        &mut self,
        handle: ValueId,
        ty: &ResolvedType,
    ) -> CodegenResult<TupleValue> {
        let value = self.value_from(handle, ty)?;
        match value {
            IValue::Tuple(tuple) => Ok(tuple),
            other => Err(CodegenError::invalid_state(format!(
                "'{}' is not a tuple layout",
                other.source_type()
            ))),
        }
    }

    /// Copy `source` into the caller's result tuple, field by field.
    ///
    /// A nested tuple gets a fresh tuple in the destination, filled the
    /// same way one level down; every stored value gains a reference the
    /// destination owns.
    fn populate_tuple(&mut self, destination: &TupleValue, source: &TupleValue) -> CodegenResult<()> {
        for index in 0..destination.items().len() {
            let slot = self.tuple_item_pointer(destination, index)?;
            let item = self.tuple_item(source, index)?;
            match &item {
                IValue::Tuple(nested) if !item.is_unit() => {
                    let fresh = self.unallocated_tuple(item.source_type())?;
                    let handle = self.representation_value(&fresh)?;
                    self.builder.store(handle, slot)?;
                    if let Some(fresh_tuple) = fresh.as_tuple() {
                        self.populate_tuple(fresh_tuple, nested)?;
                    }
                    self.increase_reference_count(&fresh)?;
                }
                _ => {
                    let stored = self.representation_value(&item)?;
                    self.builder.store(stored, slot)?;
                    self.increase_reference_count(&item)?;
                }
            }
        }
        Ok(())
    }
}
