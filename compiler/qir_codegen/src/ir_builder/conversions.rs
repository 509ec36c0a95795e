//! Type conversions for `IrBuilder`.
//!
//! Pointers are opaque, so pointer-to-pointer casts never occur.

use inkwell::types::BasicTypeEnum;

use super::IrBuilder;
use crate::error::{CodegenError, CodegenResult};
use crate::value_id::{LLVMTypeId, ValueId};

impl IrBuilder<'_> {
    /// Build a pointer-to-integer conversion.
    pub fn ptr_to_int(
        &mut self,
        ptr: ValueId,
        int_ty: LLVMTypeId,
        name: &str,
    ) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let BasicTypeEnum::IntType(target) = self.arena.get_type(int_ty) else {
            return Err(CodegenError::invalid_state("ptrtoint to a non-integer type"));
        };
        let ptr = self.pointer_operand(ptr, "ptrtoint")?;
        let v = self.builder.build_ptr_to_int(ptr, target, name)?;
        Ok(self.arena.push_value(v.into(), Some(block)))
    }

    /// Build an integer truncation.
    pub fn trunc(&mut self, val: ValueId, int_ty: LLVMTypeId, name: &str) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let BasicTypeEnum::IntType(target) = self.arena.get_type(int_ty) else {
            return Err(CodegenError::invalid_state("trunc to a non-integer type"));
        };
        let v = self.int_operand(val, "trunc operand")?;
        let v = self.builder.build_int_truncate(v, target, name)?;
        Ok(self.arena.push_value(v.into(), Some(block)))
    }
}
