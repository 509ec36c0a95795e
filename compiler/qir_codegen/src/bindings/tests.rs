use inkwell::context::Context;
use inkwell::IntPredicate;
use pretty_assertions::assert_eq;
use qir_syntax::{Compilation, ResolvedType};

use super::*;
use crate::tests::helper::{context, enter_function, module_text, param};

fn int_pair() -> ResolvedType {
    ResolvedType::Tuple(vec![ResolvedType::Int, ResolvedType::Int])
}

fn loads(text: &str) -> usize {
    text.matches(" = load ").count()
}

#[test]
fn child_scopes_inherit_but_do_not_leak() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let unit = context.unit();

    let mut parent = NameScope::new();
    parent.bind("outer", Binding::Value(unit.clone()));
    let mut child = parent.child();
    child.bind("inner", Binding::Value(unit));

    assert!(child.contains("outer"));
    assert!(child.contains("inner"));
    assert!(!parent.contains("inner"));
    assert!(parent.lookup("outer").is_some());
}

#[test]
fn popped_names_are_gone() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    context.reset_names();
    context.push_names();
    let unit = context.unit();
    context.bind("x", unit);
    assert!(context.resolve("x").is_ok());
    context.pop_names();
    let Err(error) = context.resolve("x") else {
        panic!("'x' outlived its scope");
    };
    assert!(matches!(
        error,
        CodegenError::UnresolvedReference { kind: "variable", .. }
    ));
}

#[test]
fn tuple_patterns_destructure() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let Ok(handle_ty) = context.representation(&int_pair()) else {
        panic!("no representation");
    };
    let function = enter_function(&mut context, &[handle_ty]);
    context.reset_names();
    let handle = param(&mut context, function, 0);
    let Ok(value) = context.value_from(handle, &int_pair()) else {
        panic!("wrap failed");
    };
    let pattern = SymbolTuple::Tuple(vec![SymbolTuple::variable("a"), SymbolTuple::Discarded]);
    assert!(context.bind_pattern(&pattern, value).is_ok());

    let Ok(a) = context.resolve("a") else {
        panic!("'a' is unbound");
    };
    assert_eq!(a.source_type(), &ResolvedType::Int);
    assert!(context.resolve("b").is_err());
}

#[test]
fn destructuring_a_scalar_is_unsupported() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    enter_function(&mut context, &[]);
    context.reset_names();
    let one = context.builder.const_i64(1);
    let Ok(value) = context.value_from(one, &ResolvedType::Int) else {
        panic!("wrap failed");
    };
    let pattern = SymbolTuple::Tuple(vec![SymbolTuple::variable("a")]);
    let result = context.bind_pattern(&pattern, value);
    assert!(matches!(result, Err(CodegenError::UnsupportedConstruct(_))));
}

#[test]
fn nested_parameter_items_load_once() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let Ok(handle_ty) = context.representation(&int_pair()) else {
        panic!("no representation");
    };
    let function = enter_function(&mut context, &[handle_ty]);
    context.reset_names();
    let arguments = ArgumentTuple::Tuple(vec![ArgumentTuple::Tuple(vec![
        ArgumentTuple::item("x", ResolvedType::Int),
        ArgumentTuple::item("y", ResolvedType::Int),
    ])]);
    let params = [param(&mut context, function, 0)];
    assert!(context
        .bind_parameters(&arguments, SpecializationKind::Body, &params)
        .is_ok());
    assert_eq!(loads(&module_text(&context)), 0);

    assert!(context.resolve("x").is_ok());
    assert!(context.resolve("x").is_ok());
    assert_eq!(loads(&module_text(&context)), 1);
    assert!(context.resolve("y").is_ok());
    assert_eq!(loads(&module_text(&context)), 2);
}

#[test]
fn controlled_parameters_bind_controls_first() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let builtins = context.builtins();
    let function = enter_function(&mut context, &[builtins.ptr, builtins.ptr]);
    context.reset_names();
    let arguments = ArgumentTuple::Tuple(vec![
        ArgumentTuple::item("ctls", ResolvedType::array(ResolvedType::Qubit)),
        ArgumentTuple::Tuple(vec![ArgumentTuple::item("q", ResolvedType::Qubit)]),
    ]);
    let params = [
        param(&mut context, function, 0),
        param(&mut context, function, 1),
    ];
    assert!(context
        .bind_parameters(&arguments, SpecializationKind::Controlled, &params)
        .is_ok());

    let controls = context.resolve("ctls").ok().and_then(|v| v.handle_key());
    let qubit = context.resolve("q").ok().and_then(|v| v.handle_key());
    assert_eq!(controls, Some(params[0]));
    assert_eq!(qubit, Some(params[1]));
}

#[test]
fn parameter_count_mismatch_is_rejected() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let i64_ty = context.builtins().i64;
    let function = enter_function(&mut context, &[i64_ty]);
    context.reset_names();
    let arguments = ArgumentTuple::Tuple(vec![
        ArgumentTuple::item("a", ResolvedType::Int),
        ArgumentTuple::item("b", ResolvedType::Int),
    ]);
    let params = [param(&mut context, function, 0)];
    let body = context.bind_parameters(&arguments, SpecializationKind::Body, &params);
    assert!(matches!(body, Err(CodegenError::InvalidState(_))));
    // The controls take the only parameter, leaving none for `b`.
    let controlled = context.bind_parameters(&arguments, SpecializationKind::Controlled, &params);
    assert!(matches!(controlled, Err(CodegenError::InvalidState(_))));
}

#[test]
fn nested_items_loaded_in_a_branch_are_loaded_again_after_it() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let ptr = context.builtins().ptr;
    let function = enter_function(&mut context, &[ptr]);
    context.reset_names();
    let arguments = ArgumentTuple::Tuple(vec![ArgumentTuple::Tuple(vec![
        ArgumentTuple::item("x", ResolvedType::Int),
        ArgumentTuple::item("y", ResolvedType::Int),
    ])]);
    let params = [param(&mut context, function, 0)];
    assert!(context
        .bind_parameters(&arguments, SpecializationKind::Body, &params)
        .is_ok());

    let then_bb = context.builder.append_block(function, "then");
    let join = context.builder.append_block(function, "join");
    let one = context.builder.const_i64(1);
    let Ok(flag) = context.builder.icmp(IntPredicate::EQ, one, one, "flag") else {
        panic!("compare failed");
    };
    assert!(context.builder.cond_br(flag, then_bb, join).is_ok());
    context.builder.position_at_end(then_bb);
    let in_branch = context.resolve("x").ok().and_then(|v| v.handle_key());
    assert!(context.builder.br(join).is_ok());
    context.builder.position_at_end(join);
    let after = context.resolve("x").ok().and_then(|v| v.handle_key());

    assert!(in_branch.is_some() && after.is_some());
    assert_ne!(in_branch, after);
    assert_eq!(loads(&module_text(&context)), 2);
}

#[test]
fn mutable_variables_load_their_slot_on_every_use() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    let i64_ty = context.builtins().i64;
    let function = enter_function(&mut context, &[]);
    context.reset_names();
    let Ok(slot) = context.builder.create_entry_alloca(function, "count", i64_ty) else {
        panic!("alloca failed");
    };
    context.bind_mutable("count", slot, &ResolvedType::Int, i64_ty);

    assert!(context.resolve("count").is_ok());
    assert!(context.resolve("count").is_ok());
    assert_eq!(loads(&module_text(&context)), 2);
    let Ok((found, ty, _)) = context.mutable_slot("count") else {
        panic!("'count' is not mutable");
    };
    assert_eq!(found, slot);
    assert_eq!(ty, ResolvedType::Int);
}

#[test]
fn immutable_names_have_no_slot() {
    let llvm = Context::create();
    let compilation = Compilation::new();
    let mut context = context(&llvm, &compilation);
    context.reset_names();
    let unit = context.unit();
    context.bind("x", unit);
    assert!(matches!(
        context.mutable_slot("x"),
        Err(CodegenError::InvalidState(_))
    ));
}
