//! Function declarations, calls, attributes, and aliases for `IrBuilder`.

use std::ffi::CString;

use inkwell::attributes::AttributeLoc;
use inkwell::types::{AnyType, BasicMetadataTypeEnum, BasicType, FunctionType};
use inkwell::values::BasicMetadataValueEnum;

use super::IrBuilder;
use crate::error::{CodegenError, CodegenResult};
use crate::value_id::{FunctionId, LLVMTypeId, ValueId};

impl<'ctx> IrBuilder<'ctx> {
    // -- Direct calls --

    /// Build a direct function call.
    ///
    /// Returns `None` for void-returning functions.
    pub fn call(
        &mut self,
        callee: FunctionId,
        args: &[ValueId],
        name: &str,
    ) -> CodegenResult<Option<ValueId>> {
        let block = self.insertion_block()?;
        let func = self.arena.get_function(callee);
        if func.count_params() as usize != args.len() {
            return Err(CodegenError::invalid_state(format!(
                "{} arguments passed to '{}' which takes {}",
                args.len(),
                func.get_name().to_string_lossy(),
                func.count_params()
            )));
        }
        let arg_vals: Vec<BasicMetadataValueEnum<'ctx>> = args
            .iter()
            .map(|&id| self.arena.get_value(id).into())
            .collect();
        let call_val = self.builder.build_call(func, &arg_vals, name)?;
        Ok(call_val
            .try_as_basic_value()
            .basic()
            .map(|v| self.arena.push_value(v, Some(block))))
    }

    // -- Function declaration --

    /// The function type `ret(params...)`; `None` is `void`.
    pub fn function_type(
        &self,
        params: &[LLVMTypeId],
        ret: Option<LLVMTypeId>,
    ) -> FunctionType<'ctx> {
        let param_tys: Vec<BasicMetadataTypeEnum<'ctx>> = params
            .iter()
            .map(|&id| self.arena.get_type(id).into())
            .collect();
        match ret {
            Some(ret) => self.arena.get_type(ret).fn_type(&param_tys, false),
            None => self.context.void_type().fn_type(&param_tys, false),
        }
    }

    /// Declare a function in the module.
    pub fn declare_function(
        &mut self,
        name: &str,
        params: &[LLVMTypeId],
        ret: Option<LLVMTypeId>,
    ) -> FunctionId {
        let fn_type = self.function_type(params, ret);
        self.declare_with_type(name, fn_type)
    }

    /// Declare a function with an already built type.
    pub fn declare_with_type(&mut self, name: &str, fn_type: FunctionType<'ctx>) -> FunctionId {
        let func = self.module.add_function(name, fn_type, None);
        let id = self.arena.push_function(func);
        self.functions.insert(name.to_owned(), id);
        id
    }

    /// The function called `name`, declaring it on first use.
    ///
    /// Fails when `name` was declared before with another signature.
    pub fn get_or_declare_function(
        &mut self,
        name: &str,
        params: &[LLVMTypeId],
        ret: Option<LLVMTypeId>,
    ) -> CodegenResult<FunctionId> {
        let fn_type = self.function_type(params, ret);
        if let Some(&existing) = self.functions.get(name) {
            let declared = self.arena.get_function(existing).get_type();
            if declared != fn_type {
                return Err(CodegenError::invalid_state(format!(
                    "'{name}' redeclared as {} (was {})",
                    fn_type.print_to_string().to_string_lossy(),
                    declared.print_to_string().to_string_lossy()
                )));
            }
            return Ok(existing);
        }
        Ok(self.declare_with_type(name, fn_type))
    }

    /// The function declared as `name`, if any.
    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions.get(name).copied()
    }

    /// A function's address as a pointer value.
    pub fn function_value(&mut self, func: FunctionId) -> ValueId {
        let ptr = self
            .arena
            .get_function(func)
            .as_global_value()
            .as_pointer_value();
        self.arena.push_value(ptr.into(), None)
    }

    /// Parameter values of `func`, in order.
    pub fn function_params(&mut self, func: FunctionId) -> Vec<ValueId> {
        if let Some(params) = self.params.get(&func) {
            return params.clone();
        }
        let params: Vec<ValueId> = self
            .arena
            .get_function(func)
            .get_param_iter()
            .map(|param| self.arena.push_value(param, None))
            .collect();
        self.params.insert(func, params.clone());
        params
    }

    /// True while `func` has no body.
    pub fn is_declaration(&self, func: FunctionId) -> bool {
        self.arena.get_function(func).count_basic_blocks() == 0
    }

    /// Name parameter `index` of `func`.
    pub fn set_param_name(&mut self, func: FunctionId, index: usize, name: &str) {
        let Ok(index) = u32::try_from(index) else {
            return;
        };
        if let Some(param) = self.arena.get_function(func).get_nth_param(index) {
            param.set_name(name);
        }
    }

    /// Return type of `func`; `None` for `void`.
    pub fn return_type(&mut self, func: FunctionId) -> Option<LLVMTypeId> {
        let ret = self.arena.get_function(func).get_type().get_return_type()?;
        Some(self.arena.push_type(ret))
    }

    /// Symbol name of `func`.
    pub fn function_name(&self, func: FunctionId) -> String {
        self.arena
            .get_function(func)
            .get_name()
            .to_string_lossy()
            .into_owned()
    }

    // -- Function attributes --

    /// Add the string attribute `name` (with an empty value) to `func`.
    pub fn add_function_attribute(&mut self, func: FunctionId, name: &str) {
        let attr = self.context.create_string_attribute(name, "");
        self.arena
            .get_function(func)
            .add_attribute(AttributeLoc::Function, attr);
    }

    pub fn has_function_attribute(&self, func: FunctionId, name: &str) -> bool {
        self.arena
            .get_function(func)
            .get_string_attribute(AttributeLoc::Function, name)
            .is_some()
    }

    // -- Aliases --

    /// Export `func` under a second, externally visible name.
    #[allow(unsafe_code)]
    pub fn add_alias(&mut self, name: &str, func: FunctionId) -> CodegenResult<()> {
        use inkwell::types::AsTypeRef;
        use inkwell::values::AsValueRef;
        use llvm_sys::core::LLVMAddAlias2;

        let cname = CString::new(name)
            .map_err(|_| CodegenError::invalid_state(format!("alias name '{name}' contains NUL")))?;
        let function = self.arena.get_function(func);
        // SAFETY: the module, the function, and its type all belong to the
        // context this builder was created with, and `cname` outlives the
        // call. The alias is owned by the module.
        unsafe {
            LLVMAddAlias2(
                self.module.as_mut_ptr(),
                function.get_type().as_type_ref(),
                0,
                function.as_value_ref(),
                cname.as_ptr(),
            );
        }
        Ok(())
    }
}
