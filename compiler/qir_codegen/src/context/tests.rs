use inkwell::context::Context;
use pretty_assertions::assert_eq;

use super::*;
use crate::tests::helper::{context, name};

#[test]
fn module_is_named_after_the_output_stem() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let Ok(context) =
        GenerationContext::new(&llvm, &compilation, CodegenConfig::new("out/teleport.v2"))
    else {
        panic!("setup failed");
    };
    assert_eq!(context.module().get_name().to_str(), Ok("teleport"));
}

#[test]
fn fresh_modules_hold_the_shared_globals() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let context = context(&llvm, &compilation);
    let module = context.module();
    for global in ["ResultZero", "ResultOne", "PauliI", "PauliX", "PauliY", "PauliZ", "EmptyRange"] {
        assert!(module.get_global(global).is_some(), "{global}");
    }
    assert_eq!(module.get_globals().count(), 7);
    assert_eq!(module.get_functions().count(), 0);
}

#[test]
fn unit_maps_to_the_tuple_handle() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let ptr = context.builtins().ptr;
    assert_eq!(context.representation(&ResolvedType::Unit).ok(), Some(ptr));
    let null = context.unit_handle();
    assert!(context.builder.raw_value(null).into_pointer_value().is_null());
}

#[test]
fn unknown_callables_are_unresolved() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let context = context(&llvm, &compilation);
    assert!(matches!(
        context.lookup_callable(&name("Nowhere")),
        Err(CodegenError::UnresolvedReference { kind: "callable", .. })
    ));
    assert!(context.current_function().is_err());
}

#[test]
fn finish_runs_once() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    assert!(context.generate_all().is_ok());
    assert!(context.finish().is_ok());
    assert!(context.finish().is_ok());
    let Ok(module) = context.into_module() else {
        panic!("finish failed");
    };
    assert_eq!(module.get_functions().count(), 0);
    assert!(module.verify().is_ok());
}

#[test]
fn runtime_calls_declare_on_demand() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let Ok(first) = context.runtime_function(RuntimeFunction::Message) else {
        panic!("declaration failed");
    };
    assert_eq!(context.runtime_function(RuntimeFunction::Message).ok(), Some(first));
    assert_eq!(context.runtime.declared_count(), 1);
    assert_eq!(context.builder.function_name(first), "__quantum__rt__message");
    // Calling needs an insertion point.
    let message = context.unit_handle();
    assert!(context
        .call_runtime(RuntimeFunction::Message, &[message])
        .is_err());
}
