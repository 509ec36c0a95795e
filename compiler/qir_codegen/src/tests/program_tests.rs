use inkwell::context::Context;
use pretty_assertions::assert_eq;
use qir_syntax::{
    ArgumentTuple, BinaryOperator, Characteristics, Compilation, CustomType, ExprKind, QubitInitializer,
    ResolvedType, SpecializationKind, Statement, SymbolTuple, TypedExpression,
};

use super::helper::*;

#[test]
fn int_identity_is_a_single_ret() {
    let f = function(
        "f",
        params(&[("x", ResolvedType::Int)]),
        ResolvedType::Int,
        vec![Statement::Return(TypedExpression::local("x", ResolvedType::Int))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    assert_eq!(
        definition(&module, "Test__f__body"),
        "define i64 @Test__f__body(i64 %x) {\nentry:\n  ret i64 %x\n}\n"
    );
}

#[test]
fn unit_output_returns_void() {
    let op = operation("Noop", ArgumentTuple::Tuple(Vec::new()), ResolvedType::Unit, Vec::new());
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(op));
    assert_verifies(&module);
    assert_eq!(
        definition(&module, "Test__Noop__body"),
        "define void @Test__Noop__body() {\nentry:\n  ret void\n}\n"
    );
}

#[test]
fn falling_off_a_valued_body_is_unreachable() {
    let f = function("g", ArgumentTuple::Tuple(Vec::new()), ResolvedType::Int, Vec::new());
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    assert!(definition(&module, "Test__g__body").contains("  unreachable\n"));
}

#[test]
fn arithmetic_and_comparison_on_ints() {
    let x = || TypedExpression::local("x", ResolvedType::Int);
    let sum = TypedExpression::binary(BinaryOperator::Add, x(), TypedExpression::int(1));
    let f = function(
        "inc",
        params(&[("x", ResolvedType::Int)]),
        ResolvedType::Bool,
        vec![Statement::Return(TypedExpression::binary(
            BinaryOperator::Less,
            x(),
            sum,
        ))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__inc__body");
    assert!(text.contains("%0 = add i64 %x, 1\n"));
    assert!(text.contains("%1 = icmp slt i64 %x, %0\n"));
    assert!(text.contains("ret i1 %1\n"));
}

#[test]
fn conditional_branches_join() {
    let flag = TypedExpression::local("flag", ResolvedType::Bool);
    let f = function(
        "choose",
        params(&[("flag", ResolvedType::Bool)]),
        ResolvedType::Int,
        vec![
            Statement::Conditional {
                condition: flag,
                then_block: vec![Statement::Return(TypedExpression::int(1))],
                else_block: None,
            },
            Statement::Return(TypedExpression::int(0)),
        ],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__choose__body");
    assert!(text.contains("br i1 %flag, label %then, label %continue\n"));
    assert_eq!(block(&text, "then"), "ret i64 1\n");
    assert_eq!(block(&text, "continue"), "ret i64 0\n");
}

#[test]
fn both_branches_returning_leaves_no_join_block() {
    let f = function(
        "pick",
        params(&[("flag", ResolvedType::Bool)]),
        ResolvedType::Int,
        vec![Statement::Conditional {
            condition: TypedExpression::local("flag", ResolvedType::Bool),
            then_block: vec![Statement::Return(TypedExpression::int(1))],
            else_block: Some(vec![Statement::Return(TypedExpression::int(2))]),
        }],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__pick__body");
    assert!(!text.contains("\ncontinue:"));
    assert!(!text.contains("unreachable"));
}

#[test]
fn statements_after_return_are_dropped() {
    let f = function(
        "early",
        ArgumentTuple::Tuple(Vec::new()),
        ResolvedType::Int,
        vec![
            Statement::Return(TypedExpression::int(3)),
            Statement::Expression(string("never")),
        ],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    assert_eq!(runtime_calls(&text(&module), "string_create"), 0);
}

#[test]
fn intrinsic_calls_use_instruction_names() {
    let h = intrinsic(
        "H",
        "h",
        params(&[("q", ResolvedType::Qubit)]),
        ResolvedType::Unit,
        &[SpecializationKind::Body, SpecializationKind::Adjoint],
    );
    let qubit = || TypedExpression::local("q", ResolvedType::Qubit);
    let user = operation(
        "Flip",
        params(&[("q", ResolvedType::Qubit)]),
        ResolvedType::Unit,
        vec![
            Statement::Expression(call(&h, qubit())),
            Statement::Expression(TypedExpression::call(adjoint(global(&h)), qubit())),
        ],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(h).with_callable(user));
    assert_verifies(&module);
    let text = definition(&module, "Test__Flip__body");
    assert!(text.contains("call void @__quantum__qis__h__body(ptr %q)\n"));
    assert!(text.contains("call void @__quantum__qis__h__adj(ptr %q)\n"));
    assert!(text(&module).contains("declare void @__quantum__qis__h__body(ptr)\n"));
}

#[test]
fn controlled_call_passes_controls_first() {
    let x = intrinsic(
        "X",
        "x",
        params(&[("q", ResolvedType::Qubit)]),
        ResolvedType::Unit,
        &[SpecializationKind::Body, SpecializationKind::Controlled],
    );
    let controls = TypedExpression::local("cs", ResolvedType::array(ResolvedType::Qubit));
    let target = TypedExpression::local("q", ResolvedType::Qubit);
    let user = operation(
        "Cnot",
        params(&[
            ("cs", ResolvedType::array(ResolvedType::Qubit)),
            ("q", ResolvedType::Qubit),
        ]),
        ResolvedType::Unit,
        vec![Statement::Expression(TypedExpression::call(
            controlled(global(&x)),
            TypedExpression::tuple(vec![controls, target]),
        ))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(x).with_callable(user));
    assert_verifies(&module);
    let text = definition(&module, "Test__Cnot__body");
    assert!(text.contains("call void @__quantum__qis__x__ctl(ptr %cs, ptr %q)\n"));
    // The argument tuple literal is taken apart, never allocated.
    assert_eq!(runtime_calls(&text, "tuple_create"), 0);
}

#[test]
fn controlled_specialization_binds_inner_arguments() {
    let arguments = params(&[("q", ResolvedType::Qubit)]);
    let parent = name("Op");
    let body = provided(&parent, SpecializationKind::Body, arguments.clone(), Vec::new());
    let ctl = provided(
        &parent,
        SpecializationKind::Controlled,
        controlled_params(&arguments),
        vec![Statement::Return(TypedExpression::unit())],
    );
    let op = callable(
        qir_syntax::CallableKind::Operation,
        "Op",
        arguments,
        ResolvedType::Unit,
        vec![body, ctl],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(op));
    assert_verifies(&module);
    assert_eq!(
        definition(&module, "Test__Op__ctl"),
        "define void @Test__Op__ctl(ptr %ctls, ptr %q) {\nentry:\n  ret void\n}\n"
    );
}

#[test]
fn generated_specializations_are_rejected() {
    let mut op = operation("Gen", ArgumentTuple::Tuple(Vec::new()), ResolvedType::Unit, Vec::new());
    op.specializations.push(qir_syntax::Specialization {
        kind: SpecializationKind::Adjoint,
        parent: op.name.clone(),
        implementation: qir_syntax::SpecializationImplementation::Generated(
            qir_syntax::GeneratorDirective::Invert,
        ),
    });
    let compilation = Compilation::new().with_callable(op);
    let llvm = Context::create();
    let mut context = context(&llvm, &compilation);
    let Err(error) = context.generate_all() else {
        panic!("generated specialization was accepted");
    };
    assert!(matches!(error, crate::CodegenError::InvalidState(_)));
}

#[test]
fn udt_construction_calls_the_constructor() {
    let pair = CustomType {
        name: name("Pair"),
        underlying: ResolvedType::Tuple(vec![ResolvedType::Int, ResolvedType::Int]),
    };
    let udt = ResolvedType::UserDefined(pair.name.clone());
    let constructor_ty = ResolvedType::function(
        ResolvedType::Tuple(vec![ResolvedType::Int, ResolvedType::Int]),
        udt.clone(),
    );
    let make = function(
        "Make",
        ArgumentTuple::Tuple(Vec::new()),
        udt.clone(),
        vec![Statement::Return(TypedExpression::call(
            TypedExpression::global(pair.name.clone(), constructor_ty),
            TypedExpression::tuple(vec![TypedExpression::int(1), TypedExpression::int(2)]),
        ))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_type(pair).with_callable(make));
    assert_verifies(&module);

    let ctor = definition(&module, "Test__Pair__ctor");
    assert!(ctor.starts_with("define ptr @Test__Pair__ctor(i64 %0, i64 %1) {\n"));
    assert_eq!(runtime_calls(&ctor, "tuple_create"), 1);
    assert_eq!(runtime_calls(&ctor, "tuple_unreference"), 0);

    let text = definition(&module, "Test__Make__body");
    assert!(text.contains("call ptr @Test__Pair__ctor(i64 1, i64 2)\n"));
    // The constructed value moves out to the caller.
    assert_eq!(runtime_calls(&text, "tuple_unreference"), 0);
    assert_eq!(runtime_calls(&text, "tuple_reference"), 0);
}

#[test]
fn item_access_loads_through_the_record() {
    let pair = ResolvedType::Tuple(vec![ResolvedType::Int, ResolvedType::Double]);
    let f = function(
        "First",
        params(&[("p", pair.clone())]),
        ResolvedType::Int,
        vec![Statement::Return(TypedExpression::item(
            TypedExpression::local("p", pair),
            0,
            ResolvedType::Int,
        ))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__First__body");
    assert!(text.starts_with("define i64 @Test__First__body(ptr %p) {\n"));
    assert!(text.contains("getelementptr inbounds { i64, double }, ptr %p, i32 0, i32 0"));
}

#[test]
fn nested_parameter_names_load_on_first_use() {
    let arguments = ArgumentTuple::Tuple(vec![
        ArgumentTuple::item("n", ResolvedType::Int),
        ArgumentTuple::Tuple(vec![
            ArgumentTuple::item("a", ResolvedType::Int),
            ArgumentTuple::item("b", ResolvedType::Int),
        ]),
    ]);
    let a = || TypedExpression::local("a", ResolvedType::Int);
    let f = function(
        "Twice",
        arguments,
        ResolvedType::Int,
        vec![Statement::Return(TypedExpression::binary(
            BinaryOperator::Add,
            a(),
            a(),
        ))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__Twice__body");
    // `a` is loaded once and cached; `b` is never touched.
    assert_eq!(text.matches(" = load i64").count(), 1);
}

#[test]
fn qubit_scope_releases_its_qubits() {
    let h = intrinsic(
        "H",
        "h",
        params(&[("q", ResolvedType::Qubit)]),
        ResolvedType::Unit,
        &[SpecializationKind::Body],
    );
    let user = operation(
        "Use",
        ArgumentTuple::Tuple(Vec::new()),
        ResolvedType::Unit,
        vec![Statement::QubitScope {
            pattern: SymbolTuple::Tuple(vec![
                SymbolTuple::variable("q"),
                SymbolTuple::variable("register"),
            ]),
            initializer: QubitInitializer::Tuple(vec![
                QubitInitializer::Single,
                QubitInitializer::Register(TypedExpression::int(3)),
            ]),
            body: vec![Statement::Expression(call(
                &h,
                TypedExpression::local("q", ResolvedType::Qubit),
            ))],
        }],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(h).with_callable(user));
    assert_verifies(&module);
    let text = definition(&module, "Test__Use__body");
    assert_eq!(runtime_calls(&text, "qubit_allocate"), 1);
    assert_eq!(runtime_calls(&text, "qubit_allocate_array"), 1);
    assert_eq!(runtime_calls(&text, "qubit_release"), 1);
    assert_eq!(runtime_calls(&text, "qubit_release_array"), 1);
    // One reference for the register itself, one the pattern tuple holds.
    assert_eq!(runtime_calls(&text, "array_reference"), 1);
    assert_eq!(runtime_calls(&text, "array_unreference"), 2);
    let release = text.find("qubit_release(").unwrap_or_default();
    let call = text.find("qis__h__body").unwrap_or_default();
    assert!(call < release);
}

#[test]
fn fail_ends_the_block() {
    let f = function(
        "Boom",
        ArgumentTuple::Tuple(Vec::new()),
        ResolvedType::Int,
        vec![Statement::Fail(string("boom"))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__Boom__body");
    assert_eq!(runtime_calls(&text, "fail"), 1);
    assert!(text.ends_with("  unreachable\n}\n"));
    assert!(text(&module).contains("@str.7 = private constant [5 x i8] c\"boom\\00\""));
}

#[test]
fn result_and_pauli_literals_load_globals() {
    let f = function(
        "IsOne",
        params(&[("r", ResolvedType::Result)]),
        ResolvedType::Bool,
        vec![Statement::Return(TypedExpression::binary(
            BinaryOperator::NotEquals,
            TypedExpression::local("r", ResolvedType::Result),
            TypedExpression::new(ExprKind::ResultLiteral(true), ResolvedType::Result),
        ))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__IsOne__body");
    assert!(text.contains("%0 = load ptr, ptr @ResultOne\n"));
    assert_eq!(runtime_calls(&text, "result_equal"), 1);
    assert!(text.contains("%2 = icmp eq i1 %1, false\n"));
}

#[test]
fn mutable_totals_accumulate_over_a_range() {
    let int = |name: &str| TypedExpression::local(name, ResolvedType::Int);
    let f = function(
        "Total",
        params(&[("n", ResolvedType::Int)]),
        ResolvedType::Int,
        vec![
            Statement::Mutable {
                pattern: SymbolTuple::variable("total"),
                value: TypedExpression::int(0),
            },
            Statement::For {
                pattern: SymbolTuple::variable("i"),
                iterable: TypedExpression::range(TypedExpression::int(1), None, int("n")),
                body: vec![Statement::Set {
                    pattern: SymbolTuple::variable("total"),
                    value: TypedExpression::binary(BinaryOperator::Add, int("total"), int("i")),
                }],
            },
            Statement::Return(int("total")),
        ],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__Total__body");
    assert!(text.contains("%total = alloca i64"));
    assert!(block(&text, "header").contains("%index = phi i64 [ %start, %entry ]"));
    let body = block(&text, "body");
    assert!(body.contains("load i64, ptr %total\n"));
    assert!(body.contains(", ptr %total\n"));
    assert!(body.ends_with("br label %header\n"));
    assert!(block(&text, "exit").contains("ret i64 %"));
}

#[test]
fn conditional_values_keep_the_chosen_string() {
    let s = |name: &str| TypedExpression::local(name, ResolvedType::String);
    let f = function(
        "Pick",
        params(&[
            ("flag", ResolvedType::Bool),
            ("a", ResolvedType::String),
            ("b", ResolvedType::String),
        ]),
        ResolvedType::String,
        vec![Statement::Return(TypedExpression::conditional(
            TypedExpression::local("flag", ResolvedType::Bool),
            s("a"),
            s("b"),
        ))],
    );
    let llvm = Context::create();
    let module = generate(&llvm, &Compilation::new().with_callable(f));
    assert_verifies(&module);
    let text = definition(&module, "Test__Pick__body");
    assert!(text.contains("%0 = select i1 %flag, ptr %a, ptr %b\n"));
    assert!(text.contains("call void @__quantum__rt__string_reference(ptr %0)\n"));
    assert!(text.contains("ret ptr %0\n"));
}

#[test]
fn partial_applications_can_be_invoked_in_loops() {
    let rotate = operation(
        "Rotate",
        params(&[("angle", ResolvedType::Double), ("q", ResolvedType::Qubit)]),
        ResolvedType::Unit,
        Vec::new(),
    );
    let op_ty = ResolvedType::operation(
        ResolvedType::Qubit,
        ResolvedType::Unit,
        Characteristics::empty(),
    );
    let qubits = ResolvedType::array(ResolvedType::Qubit);
    let fixed = TypedExpression::partial(
        global(&rotate),
        TypedExpression::tuple(vec![
            TypedExpression::new(ExprKind::DoubleLiteral(0.5), ResolvedType::Double),
            TypedExpression::missing(ResolvedType::Qubit),
        ]),
        op_ty.clone(),
    );
    let apply_all = operation(
        "ApplyAll",
        params(&[("qs", qubits.clone())]),
        ResolvedType::Unit,
        vec![
            Statement::Let {
                pattern: SymbolTuple::variable("r"),
                value: fixed,
            },
            Statement::For {
                pattern: SymbolTuple::variable("q"),
                iterable: TypedExpression::local("qs", qubits),
                body: vec![Statement::Expression(TypedExpression::call(
                    TypedExpression::local("r", op_ty),
                    TypedExpression::local("q", ResolvedType::Qubit),
                ))],
            },
        ],
    );
    let llvm = Context::create();
    let compilation = Compilation::new()
        .with_callable(rotate)
        .with_callable(apply_all);
    let module = generate(&llvm, &compilation);
    assert_verifies(&module);

    let text = definition(&module, "Test__ApplyAll__body");
    // The callee value and the partial application.
    assert_eq!(runtime_calls(&text, "callable_create"), 2);
    assert_eq!(runtime_calls(&text, "callable_unreference"), 2);
    let body = block(&text, "body");
    assert_eq!(runtime_calls(&body, "callable_invoke"), 1);
    assert_eq!(runtime_calls(&body, "tuple_create"), 1);
    assert_eq!(runtime_calls(&body, "tuple_unreference"), 1);

    let wrapper = definition(&module, "Lifted__PartialApplication__1__body__wrapper");
    assert!(wrapper.contains("call void @__quantum__rt__callable_invoke(ptr "));
    let count = definition(&module, "MemoryManagement__1__RefCount");
    assert!(count.starts_with(
        "define void @MemoryManagement__1__RefCount(ptr %capture-tuple, i32 %count-change)"
    ));
}
