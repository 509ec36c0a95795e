//! Aggregate operations (struct construction, extract) for `IrBuilder`.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{AggregateValueEnum, BasicValueEnum};

use super::IrBuilder;
use crate::error::{CodegenError, CodegenResult};
use crate::value_id::{LLVMTypeId, ValueId};

impl IrBuilder<'_> {
    /// Extract field `index` from a struct value.
    pub fn extract_value(&mut self, agg: ValueId, index: u32, name: &str) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let BasicValueEnum::StructValue(v) = self.arena.get_value(agg) else {
            return Err(CodegenError::invalid_state("extract_value on a non-struct value"));
        };
        let result = self.builder.build_extract_value(v, index, name)?;
        Ok(self.arena.push_value(result, Some(block)))
    }

    /// Build a struct value of `ty` by successive `insertvalue`s into a
    /// zero value.
    ///
    /// Constant fields fold, so an all-constant struct is a constant.
    pub fn build_struct(&mut self, ty: LLVMTypeId, values: &[ValueId], name: &str) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let BasicTypeEnum::StructType(struct_ty) = self.arena.get_type(ty) else {
            return Err(CodegenError::invalid_state("build_struct on a non-struct type"));
        };
        if values.len() != struct_ty.count_fields() as usize {
            return Err(CodegenError::invalid_state(format!(
                "{} values for a struct of {} fields",
                values.len(),
                struct_ty.count_fields()
            )));
        }
        let mut result = struct_ty.const_zero();
        for (index, &id) in (0u32..).zip(values) {
            let v = self.arena.get_value(id);
            match self.builder.build_insert_value(result, v, index, name)? {
                AggregateValueEnum::StructValue(sv) => result = sv,
                AggregateValueEnum::ArrayValue(_) => {
                    return Err(CodegenError::invalid_state("insertvalue produced an array"));
                }
            }
        }
        let origin = if result.is_const() { None } else { Some(block) };
        Ok(self.arena.push_value(result.into(), origin))
    }
}
