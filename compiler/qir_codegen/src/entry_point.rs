//! Entry points callable from outside the module.
//!
//! A body whose parameters already have a plain calling convention is
//! exported as an alias. Otherwise an adapter takes each array as
//! `(i64 count, ptr data)`, builds runtime arrays, calls the body, and
//! releases the arrays before returning.

use inkwell::IntPredicate;
use qir_syntax::{ArgumentTuple, Callable, ResolvedType, SpecializationKind};
use tracing::debug;

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::naming::entry_point_name;
use crate::runtime::RuntimeFunction;
use crate::types::is_reference_counted;
use crate::value_id::{FunctionId, LLVMTypeId, ValueId};
use crate::values::{ArrayValue, IValue};

/// Attribute marking functions the host may call.
pub const ENTRY_POINT_ATTRIBUTE: &str = "EntryPoint";

impl GenerationContext<'_, '_> {
    /// Generate an entry point for every `EntryPoint` callable.
    pub fn generate_entry_points(&mut self) -> CodegenResult<()> {
        let compilation = self.compilation;
        for name in compilation.entry_points() {
            let callable = self.lookup_callable(name)?;
            self.generate_entry_point(callable)?;
        }
        Ok(())
    }

    /// The function the host calls for `callable`.
    pub fn generate_entry_point(&mut self, callable: &Callable) -> CodegenResult<FunctionId> {
        let body = self.declare_specialization(callable, SpecializationKind::Body)?;
        let name = entry_point_name(&callable.name);
        let entries = callable.arguments.entries();
        let has_arrays = entries
            .iter()
            .any(|entry| matches!(entry.ty(), ResolvedType::Array(_)));

        if !has_arrays {
            self.builder.add_function_attribute(body, ENTRY_POINT_ATTRIBUTE);
            self.builder.add_alias(&name, body)?;
            debug!(%name, "entry point aliased");
            return Ok(body);
        }
        let ret = self.builder.return_type(body);
        self.generate_adapter(&name, body, entries, ret)
    }

    fn generate_adapter(
        &mut self,
        name: &str,
        body: FunctionId,
        entries: &[ArgumentTuple],
        ret: Option<LLVMTypeId>,
    ) -> CodegenResult<FunctionId> {
        let b = self.builtins();
        let mut params = Vec::with_capacity(entries.len() * 2);
        for entry in entries {
            match entry.ty() {
                ResolvedType::Array(element) => {
                    if is_reference_counted(&element) {
                        return Err(CodegenError::unsupported(format!(
                            "entry point '{name}' takes an array of '{element}'"
                        )));
                    }
                    params.push(b.i64);
                    params.push(b.ptr);
                }
                other => params.push(self.representation(&other)?),
            }
        }
        let adapter = self.builder.get_or_declare_function(name, &params, ret)?;
        self.builder.add_function_attribute(adapter, ENTRY_POINT_ATTRIBUTE);

        let entry = self.builder.append_block(adapter, "entry");
        self.builder.position_at_end(entry);
        self.scopes.reset();
        self.open_scope();

        let values = self.builder.function_params(adapter);
        let mut values = values.into_iter();
        let mut args = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(first) = values.next() else {
                return Err(CodegenError::invalid_state(format!(
                    "adapter '{name}' is missing parameters"
                )));
            };
            if let ResolvedType::Array(element) = entry.ty() {
                let Some(data) = values.next() else {
                    return Err(CodegenError::invalid_state(format!(
                        "adapter '{name}' is missing an array data pointer"
                    )));
                };
                let array = self.entry_array(&element, first, data)?;
                args.push(array.handle());
            } else {
                args.push(first);
            }
        }

        let result = self.builder.call(body, &args, "")?;
        self.close_scope()?;
        match result {
            Some(result) => self.builder.ret(result)?,
            None => self.builder.ret_void()?,
        }
        self.builder.clear_position();
        self.scopes.reset();
        debug!(name, "entry point adapter generated");
        Ok(adapter)
    }

    /// A runtime array holding a copy of `count` elements at `data`.
    fn entry_array(
        &mut self,
        element: &ResolvedType,
        count: ValueId,
        data: ValueId,
    ) -> CodegenResult<ArrayValue> {
        let element_ty = self.representation(element)?;
        let i32_ty = self.builtins().i32;
        let element_size = self.size_as(element_ty, i32_ty)?;
        let handle =
            self.runtime_value(RuntimeFunction::ArrayCreate1d, &[element_size, count], "")?;
        let array = ArrayValue::with_length(handle, element.clone(), count);
        self.register_value(&IValue::Array(array.clone()))?;

        let function = self.current_function()?;
        let copy = self.builder.append_block(function, "copy");
        let copied = self.builder.append_block(function, "copied");
        let zero = self.builder.const_i64(0);
        let nonempty = self.builder.icmp(IntPredicate::SGT, count, zero, "")?;
        self.builder.cond_br(nonempty, copy, copied)?;

        self.builder.position_at_end(copy);
        let destination =
            self.runtime_value(RuntimeFunction::ArrayGetElementPtr1d, &[handle, zero], "")?;
        let element_bytes = self.size_of(element_ty)?;
        let bytes = self.builder.mul(count, element_bytes, "")?;
        self.builder.memcpy(destination, data, bytes)?;
        self.builder.br(copied)?;

        self.builder.position_at_end(copied);
        Ok(array)
    }
}
