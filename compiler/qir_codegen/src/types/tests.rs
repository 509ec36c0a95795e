use inkwell::context::Context;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use qir_syntax::{Characteristics, CustomType, QualifiedName};

use super::*;

fn leaf() -> impl Strategy<Value = ResolvedType> {
    prop_oneof![
        Just(ResolvedType::Unit),
        Just(ResolvedType::Int),
        Just(ResolvedType::Double),
        Just(ResolvedType::Bool),
        Just(ResolvedType::String),
        Just(ResolvedType::Qubit),
        Just(ResolvedType::Result),
        Just(ResolvedType::Pauli),
        Just(ResolvedType::Range),
    ]
}

fn resolved_type() -> impl Strategy<Value = ResolvedType> {
    leaf().prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(ResolvedType::array),
            prop::collection::vec(inner.clone(), 1..4).prop_map(ResolvedType::Tuple),
            (inner.clone(), inner).prop_map(|(a, o)| ResolvedType::function(a, o)),
        ]
    })
}

fn map(
    mapper: &mut TypeMapper,
    builder: &mut IrBuilder<'_>,
    compilation: &Compilation,
    ty: &ResolvedType,
) -> LLVMTypeId {
    let Ok(id) = mapper.representation(ty, builder, compilation) else {
        panic!("no representation for '{ty}'");
    };
    id
}

fn display(builder: &IrBuilder<'_>, ty: LLVMTypeId) -> String {
    builder.llvm_type(ty).print_to_string().to_string()
}

#[test]
fn scalars_map_to_fixed_widths() {
    let ctx = Context::create();
    let mut builder = IrBuilder::new(&ctx, "test");
    let mut mapper = TypeMapper::new(&mut builder);
    let compilation = Compilation::new();
    let cases = [
        (ResolvedType::Int, "i64"),
        (ResolvedType::Double, "double"),
        (ResolvedType::Bool, "i1"),
        (ResolvedType::Pauli, "i2"),
        (ResolvedType::Range, "%Range = type { i64, i64, i64 }"),
        (ResolvedType::String, "ptr"),
        (ResolvedType::Unit, "ptr"),
        (ResolvedType::array(ResolvedType::Int), "ptr"),
        (
            ResolvedType::operation(ResolvedType::Qubit, ResolvedType::Unit, Characteristics::empty()),
            "ptr",
        ),
    ];
    for (ty, expected) in cases {
        let id = map(&mut mapper, &mut builder, &compilation, &ty);
        assert_eq!(display(&builder, id), expected, "{ty}");
    }
}

#[test]
fn tuples_are_handles_to_literal_records() {
    let ctx = Context::create();
    let mut builder = IrBuilder::new(&ctx, "test");
    let mut mapper = TypeMapper::new(&mut builder);
    let compilation = Compilation::new();
    let items = vec![
        ResolvedType::Int,
        ResolvedType::Tuple(vec![ResolvedType::Bool, ResolvedType::Qubit]),
    ];
    let handle = map(
        &mut mapper,
        &mut builder,
        &compilation,
        &ResolvedType::Tuple(items.clone()),
    );
    assert_eq!(display(&builder, handle), "ptr");
    let Ok(record) = mapper.record_type(&items, &mut builder, &compilation) else {
        panic!("no record");
    };
    assert_eq!(display(&builder, record), "{ i64, ptr }");
}

#[test]
fn user_defined_types_unwrap_one_level() {
    let ctx = Context::create();
    let mut builder = IrBuilder::new(&ctx, "test");
    let mut mapper = TypeMapper::new(&mut builder);
    let inner = CustomType {
        name: QualifiedName::new("Test", "Inner"),
        underlying: ResolvedType::Tuple(vec![ResolvedType::Int, ResolvedType::Int]),
    };
    let outer = CustomType {
        name: QualifiedName::new("Test", "Outer"),
        underlying: ResolvedType::UserDefined(inner.name.clone()),
    };
    let outer_ty = ResolvedType::UserDefined(outer.name.clone());
    let compilation = Compilation::new().with_type(inner).with_type(outer);
    let Ok(items) = mapper.items_of(&outer_ty, &compilation) else {
        panic!("Outer has no items");
    };
    // `Outer` has the single item `Inner`.
    assert_eq!(items.len(), 1);
    let Ok(record) = mapper.record_type(&items, &mut builder, &compilation) else {
        panic!("no record");
    };
    assert_eq!(display(&builder, record), "{ ptr }");
}

#[test]
fn unknown_user_defined_type_is_unresolved() {
    let ctx = Context::create();
    let mut builder = IrBuilder::new(&ctx, "test");
    let mut mapper = TypeMapper::new(&mut builder);
    let ty = ResolvedType::UserDefined(QualifiedName::new("Test", "Missing"));
    let Err(error) = mapper.representation(&ty, &mut builder, &Compilation::new()) else {
        panic!("missing type was mapped");
    };
    assert!(matches!(
        error,
        CodegenError::UnresolvedReference { kind: "type", .. }
    ));
}

#[test]
fn closed_form_sizes() {
    let ctx = Context::create();
    let mut builder = IrBuilder::new(&ctx, "test");
    let mapper = TypeMapper::new(&mut builder);
    let b = *mapper.builtins();
    let size = |builder: &IrBuilder<'_>, ty| closed_form_size(builder.llvm_type(ty));

    assert_eq!(size(&builder, b.i64), Some(8));
    assert_eq!(size(&builder, b.bool), Some(1));
    assert_eq!(size(&builder, b.range), Some(24));
    let padded = builder.struct_type(&[b.bool, b.i64]);
    assert_eq!(size(&builder, padded), None);
    let packed = builder.struct_type(&[b.ptr, b.double]);
    assert_eq!(size(&builder, packed), Some(16));
    assert_eq!(size(&builder, b.table), None);
}

#[test]
fn reference_counted_kinds() {
    assert!(is_reference_counted(&ResolvedType::String));
    assert!(is_reference_counted(&ResolvedType::array(ResolvedType::Int)));
    assert!(is_reference_counted(&ResolvedType::Tuple(vec![ResolvedType::Int])));
    assert!(!is_reference_counted(&ResolvedType::Qubit));
    assert!(!is_reference_counted(&ResolvedType::Unit));
    assert!(!is_reference_counted(&ResolvedType::Range));
}

proptest! {
    #[test]
    fn equal_types_share_one_representation(ty in resolved_type()) {
        let ctx = Context::create();
        let mut builder = IrBuilder::new(&ctx, "test");
        let mut first = TypeMapper::new(&mut builder);
        let mut second = TypeMapper::new(&mut builder);
        let compilation = Compilation::new();
        let a = map(&mut first, &mut builder, &compilation, &ty);
        let b = map(&mut second, &mut builder, &compilation, &ty.clone());
        prop_assert_eq!(builder.llvm_type(a), builder.llvm_type(b));
        prop_assert_eq!(map(&mut first, &mut builder, &compilation, &ty), a);
    }
}
