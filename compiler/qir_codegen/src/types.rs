//! Type Mapper: source types to LLVM representation types.
//!
//! Every source type has exactly one representation, and structurally
//! identical source types map to the same LLVM type. Pointers are opaque,
//! so every runtime handle is a `ptr`; a tuple's typed record is only
//! needed as the element type of field GEPs and loads.
//!
//! | Source type | Representation |
//! |-------------|----------------|
//! | `Unit` | `ptr` (the shared null handle) |
//! | `Int` / `Double` / `Bool` / `Pauli` | `i64` / `double` / `i1` / `i2` |
//! | `Range` | `%Range = type { i64, i64, i64 }` |
//! | `BigInt`, `String`, `Qubit`, `Result`, `T[]`, callables | `ptr` |
//! | `(T1, .., Tn)`, user-defined type | `ptr` to the literal record `{ T1, .., Tn }` |

use inkwell::types::{AnyType, BasicTypeEnum};
use qir_syntax::{Compilation, ResolvedType};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{CodegenError, CodegenResult};
use crate::ir_builder::IrBuilder;
use crate::value_id::LLVMTypeId;

/// LLVM types the runtime ABI is written in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BuiltinTypes {
    /// Every heap handle and the tuple handle.
    pub ptr: LLVMTypeId,
    pub bool: LLVMTypeId,
    pub i2: LLVMTypeId,
    pub i8: LLVMTypeId,
    pub i32: LLVMTypeId,
    pub i64: LLVMTypeId,
    pub double: LLVMTypeId,
    pub range: LLVMTypeId,
    /// `[4 x ptr]`, one wrapper per specialization kind.
    pub table: LLVMTypeId,
}

impl BuiltinTypes {
    fn register(builder: &mut IrBuilder<'_>) -> Self {
        let i64 = builder.i64_type();
        Self {
            ptr: builder.ptr_type(),
            bool: builder.bool_type(),
            i2: builder.i2_type(),
            i8: builder.i8_type(),
            i32: builder.i32_type(),
            i64,
            double: builder.f64_type(),
            range: builder.named_struct("Range", &[i64, i64, i64]),
            table: builder.ptr_array_type(4),
        }
    }
}

/// Memoized source-to-LLVM type mapping for one module.
pub struct TypeMapper {
    builtins: BuiltinTypes,
    cache: FxHashMap<ResolvedType, LLVMTypeId>,
    records: FxHashMap<Vec<ResolvedType>, LLVMTypeId>,
}

impl TypeMapper {
    /// Register the runtime types in `builder` and start an empty cache.
    pub fn new(builder: &mut IrBuilder<'_>) -> Self {
        Self {
            builtins: BuiltinTypes::register(builder),
            cache: FxHashMap::default(),
            records: FxHashMap::default(),
        }
    }

    pub fn builtins(&self) -> &BuiltinTypes {
        &self.builtins
    }

    /// The representation of `ty`.
    ///
    /// Fails with `UnresolvedReference` when a user-defined type is not
    /// declared in `compilation`.
    pub fn representation(
        &mut self,
        ty: &ResolvedType,
        builder: &mut IrBuilder<'_>,
        compilation: &Compilation,
    ) -> CodegenResult<LLVMTypeId> {
        if let Some(&cached) = self.cache.get(ty) {
            return Ok(cached);
        }
        let b = self.builtins;
        let mapped = match ty {
            ResolvedType::Int => b.i64,
            ResolvedType::Double => b.double,
            ResolvedType::Bool => b.bool,
            ResolvedType::Pauli => b.i2,
            ResolvedType::Range => b.range,
            ResolvedType::Unit
            | ResolvedType::BigInt
            | ResolvedType::String
            | ResolvedType::Qubit
            | ResolvedType::Result
            | ResolvedType::Array(_)
            | ResolvedType::Operation { .. }
            | ResolvedType::Function { .. } => b.ptr,
            ResolvedType::Tuple(_) | ResolvedType::UserDefined(_) => {
                // The record must exist for the type to be usable.
                let items = self.items_of(ty, compilation)?;
                if !items.is_empty() {
                    self.record_type(&items, builder, compilation)?;
                }
                b.ptr
            }
        };
        trace!(
            source = %ty,
            target = %builder.llvm_type(mapped).print_to_string(),
            "mapped type"
        );
        self.cache.insert(ty.clone(), mapped);
        Ok(mapped)
    }

    /// The literal record `{ T1, .., Tn }` holding `items`.
    pub fn record_type(
        &mut self,
        items: &[ResolvedType],
        builder: &mut IrBuilder<'_>,
        compilation: &Compilation,
    ) -> CodegenResult<LLVMTypeId> {
        if let Some(&cached) = self.records.get(items) {
            return Ok(cached);
        }
        let fields = items
            .iter()
            .map(|item| self.representation(item, builder, compilation))
            .collect::<CodegenResult<Vec<_>>>()?;
        let record = builder.struct_type(&fields);
        self.records.insert(items.to_vec(), record);
        Ok(record)
    }

    /// Item types of a tuple or user-defined type; `Unit` has none.
    ///
    /// A user-defined type is unwrapped exactly one level.
    pub fn items_of(
        &self,
        ty: &ResolvedType,
        compilation: &Compilation,
    ) -> CodegenResult<Vec<ResolvedType>> {
        match ty {
            ResolvedType::Unit => Ok(Vec::new()),
            ResolvedType::Tuple(items) => Ok(items.clone()),
            ResolvedType::UserDefined(name) => compilation
                .custom_type(name)
                .map(qir_syntax::CustomType::items)
                .ok_or_else(|| CodegenError::unresolved("type", name)),
            other => Err(CodegenError::unsupported(format!(
                "'{other}' has no items"
            ))),
        }
    }
}

/// Heap values whose lifetime the runtime tracks by reference count.
pub(crate) fn is_reference_counted(ty: &ResolvedType) -> bool {
    matches!(
        ty,
        ResolvedType::BigInt
            | ResolvedType::String
            | ResolvedType::Result
            | ResolvedType::Array(_)
            | ResolvedType::Tuple(_)
            | ResolvedType::UserDefined(_)
            | ResolvedType::Operation { .. }
            | ResolvedType::Function { .. }
    )
}

/// Size in bytes when it follows from the type alone.
///
/// Records qualify only when every field is 8 bytes wide, so no padding
/// can occur; everything else is measured with the null-GEP idiom.
pub fn closed_form_size(ty: BasicTypeEnum<'_>) -> Option<u64> {
    match ty {
        BasicTypeEnum::IntType(int) => Some(u64::from(int.get_bit_width().div_ceil(8))),
        BasicTypeEnum::FloatType(_) | BasicTypeEnum::PointerType(_) => Some(8),
        BasicTypeEnum::StructType(record) => {
            let mut total = 0;
            for field in record.get_field_types() {
                if closed_form_size(field)? != 8 {
                    return None;
                }
                total += 8;
            }
            Some(total)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests;
