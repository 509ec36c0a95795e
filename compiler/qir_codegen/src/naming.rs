//! Deterministic symbol names.
//!
//! | Item | Name |
//! |------|------|
//! | specialization | `Ns__Name__body`, `__adj`, `__ctl`, `__ctladj` |
//! | wrapper | specialization name + `__wrapper` |
//! | dispatch table | `Ns__Name__FunctionTable` |
//! | UDT constructor | `Ns__Name__ctor` |
//! | entry point | `Ns__Name` |
//! | quantum instruction | `__quantum__qis__code__body` (etc.) |
//! | partial application | `PartialApplication__N`, wrappers `Lifted__PartialApplication__N__body__wrapper` |
//! | capture count function | `MemoryManagement__N__RefCount` |
//!
//! Namespace dots become `__`.

use qir_syntax::{QualifiedName, SpecializationKind};

/// Prefix of classical runtime functions.
pub const RUNTIME_PREFIX: &str = "__quantum__rt__";

/// Prefix of quantum instruction set functions.
pub const QIS_PREFIX: &str = "__quantum__qis__";

const WRAPPER_SUFFIX: &str = "__wrapper";
const TABLE_SUFFIX: &str = "__FunctionTable";
const CONSTRUCTOR_SUFFIX: &str = "__ctor";
const REF_COUNT_SUFFIX: &str = "__RefCount";

/// Namespace of wrappers for generated callables.
pub const LIFTED_NAMESPACE: &str = "Lifted";

fn flat(name: &QualifiedName) -> String {
    format!("{}__{}", name.namespace.replace('.', "__"), name.name)
}

pub fn specialization_name(name: &QualifiedName, kind: SpecializationKind) -> String {
    format!("{}__{}", flat(name), kind.suffix())
}

pub fn wrapper_name(name: &QualifiedName, kind: SpecializationKind) -> String {
    specialization_name(name, kind) + WRAPPER_SUFFIX
}

pub fn table_name(name: &QualifiedName) -> String {
    flat(name) + TABLE_SUFFIX
}

pub fn constructor_name(name: &QualifiedName) -> String {
    flat(name) + CONSTRUCTOR_SUFFIX
}

pub fn entry_point_name(name: &QualifiedName) -> String {
    flat(name)
}

/// The `index`-th generated global named after `base`, counting from 1.
pub fn numbered_name(base: &str, index: usize) -> String {
    format!("{base}__{index}")
}

pub fn lifted_wrapper_name(name: &str, kind: SpecializationKind) -> String {
    wrapper_name(&QualifiedName::new(LIFTED_NAMESPACE, name), kind)
}

pub fn lifted_table_name(name: &str) -> String {
    format!("{name}{TABLE_SUFFIX}")
}

pub fn ref_count_name(name: &str) -> String {
    format!("{name}{REF_COUNT_SUFFIX}")
}

pub fn runtime_name(base: &str) -> String {
    format!("{RUNTIME_PREFIX}{base}")
}

pub fn qis_name(code: &str, kind: SpecializationKind) -> String {
    format!("{QIS_PREFIX}{code}__{}", kind.suffix())
}
