//! The generation context threaded through every lowering step.
//!
//! One [`GenerationContext`] owns one LLVM module and all per-module
//! state: the type cache, declared runtime functions, the reference scope
//! stack, the naming scopes, and the wrapper queue. Nothing is global, so
//! independent contexts never interact.
//!
//! # Method Organization
//!
//! The context's methods are split by concern:
//!
//! | File | Concern |
//! |------|---------|
//! | `context.rs` | construction, runtime calls, module access, the driver |
//! | `values.rs` | value construction and lazy views |
//! | `scope.rs` | registration and reference-count emission |
//! | `bindings.rs` | naming scopes and argument binding |
//! | `specialization.rs` | specialization functions and UDT constructors |
//! | `statements.rs`, `expressions.rs` | body lowering |
//! | `wrappers.rs` | wrapper functions and dispatch tables |
//! | `entry_point.rs`, `interop.rs`, `emit.rs` | module boundary |

use inkwell::context::Context;
use inkwell::module::Module;
use qir_syntax::{Callable, Compilation, QualifiedName, ResolvedType};
use tracing::debug;

use crate::bindings::NameScope;
use crate::config::CodegenConfig;
use crate::error::{CodegenError, CodegenResult};
use crate::ir_builder::IrBuilder;
use crate::runtime::{ModuleGlobals, RuntimeFunction, RuntimeLibrary};
use crate::scope::ScopeManager;
use crate::specialization::CurrentSpecialization;
use crate::types::{BuiltinTypes, TypeMapper};
use crate::value_id::{FunctionId, LLVMTypeId, ValueId};
use crate::wrappers::WrapperRegistry;

/// Mutable state of one module generation.
///
/// `'c` borrows the compilation; `'ctx` is the LLVM context the module
/// lives in.
pub struct GenerationContext<'c, 'ctx> {
    pub(crate) compilation: &'c Compilation,
    pub(crate) config: CodegenConfig,
    pub(crate) builder: IrBuilder<'ctx>,
    pub(crate) types: TypeMapper,
    pub(crate) runtime: RuntimeLibrary,
    pub(crate) globals: ModuleGlobals,
    pub(crate) scopes: ScopeManager,
    pub(crate) names: Vec<NameScope>,
    pub(crate) wrappers: WrapperRegistry,
    pub(crate) current: Option<CurrentSpecialization>,
    finished: bool,
}

impl<'c, 'ctx> GenerationContext<'c, 'ctx> {
    /// Start a module for `compilation` in `context`.
    pub fn new(
        context: &'ctx Context,
        compilation: &'c Compilation,
        config: CodegenConfig,
    ) -> CodegenResult<Self> {
        let mut builder = IrBuilder::new(context, &config.module_name());
        let types = TypeMapper::new(&mut builder);
        let globals = ModuleGlobals::create(&mut builder, types.builtins())?;
        Ok(Self {
            compilation,
            config,
            builder,
            types,
            runtime: RuntimeLibrary::new(),
            globals,
            scopes: ScopeManager::new(),
            names: Vec::new(),
            wrappers: WrapperRegistry::default(),
            current: None,
            finished: false,
        })
    }

    pub fn config(&self) -> &CodegenConfig {
        &self.config
    }

    pub fn compilation(&self) -> &'c Compilation {
        self.compilation
    }

    pub fn module(&self) -> &Module<'ctx> {
        self.builder.module()
    }

    pub fn builtins(&self) -> BuiltinTypes {
        *self.types.builtins()
    }

    /// The representation type of `ty` in this module.
    pub fn representation(&mut self, ty: &ResolvedType) -> CodegenResult<LLVMTypeId> {
        self.types
            .representation(ty, &mut self.builder, self.compilation)
    }

    /// The shared unit handle: the null tuple pointer.
    pub fn unit_handle(&mut self) -> ValueId {
        self.builder.const_null_ptr()
    }

    pub(crate) fn lookup_callable(&self, name: &QualifiedName) -> CodegenResult<&'c Callable> {
        self.compilation
            .callable(name)
            .ok_or_else(|| CodegenError::unresolved("callable", name))
    }

    pub(crate) fn current_function(&self) -> CodegenResult<FunctionId> {
        self.builder
            .current_function()
            .ok_or_else(|| CodegenError::invalid_state("no function is being generated"))
    }

    // ── Runtime calls ───────────────────────────────────────────────

    pub(crate) fn runtime_function(
        &mut self,
        function: RuntimeFunction,
    ) -> CodegenResult<FunctionId> {
        let builtins = self.builtins();
        self.runtime.get(function, &mut self.builder, &builtins)
    }

    /// Call a runtime function for its effect.
    pub(crate) fn call_runtime(
        &mut self,
        function: RuntimeFunction,
        args: &[ValueId],
    ) -> CodegenResult<Option<ValueId>> {
        let callee = self.runtime_function(function)?;
        self.builder.call(callee, args, "")
    }

    /// Call a runtime function that returns a value.
    pub(crate) fn runtime_value(
        &mut self,
        function: RuntimeFunction,
        args: &[ValueId],
        name: &str,
    ) -> CodegenResult<ValueId> {
        let callee = self.runtime_function(function)?;
        self.builder.call(callee, args, name)?.ok_or_else(|| {
            CodegenError::invalid_state(format!("{} returns no value", function.base_name()))
        })
    }

    // ── Driver ──────────────────────────────────────────────────────

    /// Phase 1: every UDT constructor and every callable's
    /// specializations, in compilation order.
    pub fn generate_all(&mut self) -> CodegenResult<()> {
        let compilation = self.compilation;
        for custom in compilation.types() {
            self.generate_constructor(custom)?;
        }
        for callable in compilation.callables() {
            self.generate_callable(callable)?;
        }
        Ok(())
    }

    /// Phase 2: drain the wrapper queue, then add entry points.
    ///
    /// Runs once; later calls do nothing.
    pub fn finish(&mut self) -> CodegenResult<()> {
        if self.finished {
            return Ok(());
        }
        let wrappers = self.generate_pending_wrappers()?;
        if self.config.entry_points {
            self.generate_entry_points()?;
        }
        self.finished = true;
        debug!(wrappers, "module finished");
        Ok(())
    }

    /// Finish the module and hand it over.
    pub fn into_module(mut self) -> CodegenResult<Module<'ctx>> {
        self.finish()?;
        Ok(self.builder.into_module())
    }
}

#[cfg(test)]
mod tests;
