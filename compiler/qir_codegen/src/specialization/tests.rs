use inkwell::context::Context;
use inkwell::types::AnyType;
use pretty_assertions::assert_eq;
use qir_syntax::{Compilation, GeneratorDirective};

use super::*;
use crate::tests::helper::{
    callable, context, definition, function, intrinsic, name, operation, params, provided,
};

fn identity() -> Callable {
    function(
        "Id",
        params(&[("x", ResolvedType::Int)]),
        ResolvedType::Int,
        vec![Statement::Return(qir_syntax::TypedExpression::local(
            "x",
            ResolvedType::Int,
        ))],
    )
}

#[test]
fn states_only_move_forward_one_step() {
    use SpecializationState as S;
    assert_eq!(S::Declared.advance(S::HeaderEmitted).ok(), Some(S::HeaderEmitted));
    assert_eq!(S::BodyEmitted.advance(S::Closed).ok(), Some(S::Closed));
    assert!(S::Declared.advance(S::Closed).is_err());
    assert!(S::HeaderEmitted.advance(S::HeaderEmitted).is_err());
    assert!(S::Closed.advance(S::Declared).is_err());
}

#[test]
fn intrinsics_use_instruction_names() {
    let h = intrinsic(
        "H",
        "h",
        params(&[("q", ResolvedType::Qubit)]),
        ResolvedType::Unit,
        &[SpecializationKind::Body, SpecializationKind::Adjoint],
    );
    assert_eq!(function_name(&h, SpecializationKind::Adjoint), "__quantum__qis__h__adj");
    assert_eq!(
        function_name(&identity(), SpecializationKind::Controlled),
        "Test__Id__ctl"
    );
}

#[test]
fn controlled_declarations_take_controls_first() {
    let op = operation(
        "Flip",
        params(&[("q", ResolvedType::Qubit)]),
        ResolvedType::Unit,
        Vec::new(),
    );
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let Ok(function) = context.declare_specialization(&op, SpecializationKind::Controlled) else {
        panic!("declaration failed");
    };
    assert_eq!(context.builder.function_name(function), "Test__Flip__ctl");
    let Some(declared) = context.module().get_function("Test__Flip__ctl") else {
        panic!("not in the module");
    };
    assert_eq!(declared.get_type().print_to_string().to_string(), "void (ptr, ptr)");
    let names: Vec<String> = context
        .builder
        .function_params(function)
        .into_iter()
        .map(|p| {
            let value = context.builder.raw_value(p).into_pointer_value();
            value.get_name().to_string_lossy().into_owned()
        })
        .collect();
    assert_eq!(names, vec!["ctls".to_owned(), "q".to_owned()]);

    // A second declaration finds the first.
    assert_eq!(
        context
            .declare_specialization(&op, SpecializationKind::Controlled)
            .ok(),
        Some(function)
    );
}

#[test]
fn one_specialization_at_a_time() {
    let id = identity();
    let llvm = Context::create();
    let compilation = Compilation::new().with_callable(id.clone());
    let mut context = context(&llvm, &compilation);
    assert!(context
        .begin_specialization(&id, SpecializationKind::Body, &id.arguments)
        .is_ok());
    let second = context.begin_specialization(&id, SpecializationKind::Adjoint, &id.arguments);
    assert!(matches!(second, Err(CodegenError::InvalidState(_))));
}

#[test]
fn steps_out_of_order_are_rejected() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    assert!(context.end_specialization().is_err());
    assert!(context.emit_body(&[]).is_err());
    assert!(context.current_output().is_err());
}

#[test]
fn generating_twice_is_rejected() {
    let id = identity();
    let llvm = Context::create();
    let compilation = Compilation::new().with_callable(id.clone());
    let mut context = context(&llvm, &compilation);
    let Some(body) = id.specialization(SpecializationKind::Body) else {
        panic!("no body");
    };
    assert!(context.generate_specialization(&id, body).is_ok());
    let again = context.generate_specialization(&id, body);
    assert!(matches!(again, Err(CodegenError::InvalidState(_))));
}

#[test]
fn generated_directives_must_be_resolved_first() {
    let parent = name("Inv");
    let mut op = operation(
        "Inv",
        params(&[("q", ResolvedType::Qubit)]),
        ResolvedType::Unit,
        Vec::new(),
    );
    op.specializations.push(Specialization {
        kind: SpecializationKind::Adjoint,
        parent,
        implementation: SpecializationImplementation::Generated(GeneratorDirective::Invert),
    });
    let llvm = Context::create();
    let compilation = Compilation::new().with_callable(op.clone());
    let mut context = context(&llvm, &compilation);
    assert!(context.generate_callable(&op).is_err());
}

#[test]
fn type_constructor_callables_are_skipped() {
    let arguments = params(&[("a", ResolvedType::Int)]);
    let body = provided(&name("Wrapped"), SpecializationKind::Body, arguments.clone(), Vec::new());
    let ctor = callable(
        CallableKind::TypeConstructor,
        "Wrapped",
        arguments,
        ResolvedType::UserDefined(name("Wrapped")),
        vec![body],
    );
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    assert!(context.generate_callable(&ctor).is_ok());
    assert!(context.module().get_function("Test__Wrapped__body").is_none());
}

#[test]
fn unit_wrapping_type_constructs_the_unit_handle() {
    let token = CustomType {
        name: name("Token"),
        underlying: ResolvedType::Unit,
    };
    let llvm = Context::create();
    let compilation = Compilation::new().with_type(token.clone());
    let mut context = context(&llvm, &compilation);
    assert!(context.generate_constructor(&token).is_ok());
    assert!(context.generate_constructor(&token).is_err());
    let Ok(module) = context.into_module() else {
        panic!("finish failed");
    };
    assert_eq!(
        definition(&module, "Test__Token__ctor"),
        "define ptr @Test__Token__ctor() {\nentry:\n  ret ptr null\n}\n"
    );
}

#[test]
fn trailing_unreachable_block_is_dropped() {
    let id = identity();
    let compilation = Compilation::new().with_callable(id.clone());
    let llvm = Context::create();
    let mut context = context(&llvm, &compilation);
    let Some(body) = id.specialization(SpecializationKind::Body) else {
        panic!("no body");
    };
    assert!(context.generate_specialization(&id, body).is_ok());
    let Ok(module) = context.into_module() else {
        panic!("finish failed");
    };
    assert!(module.verify().is_ok());
    assert_eq!(
        definition(&module, "Test__Id__body"),
        "define i64 @Test__Id__body(i64 %x) {\nentry:\n  ret i64 %x\n}\n"
    );
}
