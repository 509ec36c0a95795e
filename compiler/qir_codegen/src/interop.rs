//! Interop with a native runtime library.
//!
//! The native library implements every runtime and instruction-set
//! function under its QIR name without the leading `__`. The bridge module
//! gives each such function the main module declares a stub under its QIR
//! name that forwards every argument to the native implementation. With
//! opaque pointers the runtime's handle types need no casts on the way.

use inkwell::context::Context;
use inkwell::module::Module;
use tracing::debug;

use crate::error::{CodegenError, CodegenResult};
use crate::ir_builder::IrBuilder;
use crate::naming::{QIS_PREFIX, RUNTIME_PREFIX};

/// Name of the bridge module.
pub const BRIDGE_MODULE_NAME: &str = "bridge";

/// True for functions the bridge forwards.
fn is_bridged(name: &str) -> bool {
    name.starts_with(RUNTIME_PREFIX) || name.starts_with(QIS_PREFIX)
}

/// Build the bridge module for the runtime functions `module` declares.
pub fn build_bridge<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
) -> CodegenResult<Module<'ctx>> {
    let mut builder = IrBuilder::new(context, BRIDGE_MODULE_NAME);
    let mut stubs = 0usize;
    for function in module.get_functions() {
        let name = function.get_name().to_string_lossy().into_owned();
        if function.count_basic_blocks() != 0 || !is_bridged(&name) {
            continue;
        }
        let Some(native_name) = name.strip_prefix("__") else {
            return Err(CodegenError::invalid_state(format!(
                "'{name}' has no native counterpart"
            )));
        };
        let fn_type = function.get_type();
        let native = builder.declare_with_type(native_name, fn_type);
        let stub = builder.declare_with_type(&name, fn_type);

        let entry = builder.append_block(stub, "entry");
        builder.position_at_end(entry);
        let args = builder.function_params(stub);
        match builder.call(native, &args, "")? {
            Some(result) => builder.ret(result)?,
            None => builder.ret_void()?,
        }
        builder.clear_position();
        stubs += 1;
    }
    debug!(stubs, "bridge module built");
    Ok(builder.into_module())
}

/// Text of the bridge module, or its verifier diagnostics.
pub(crate) fn bridge_text<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
) -> CodegenResult<String> {
    let bridge = build_bridge(context, module)?;
    Ok(match bridge.verify() {
        Ok(()) => bridge.print_to_string().to_string(),
        Err(errors) => format!("IR errors:\n{}\n", errors.to_string_lossy()),
    })
}
