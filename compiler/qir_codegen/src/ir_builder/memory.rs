//! Memory operations (alloca, load, store, GEP, memcpy) for `IrBuilder`.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{IntValue, PointerValue};

use super::IrBuilder;
use crate::error::{CodegenError, CodegenResult};
use crate::value_id::{FunctionId, LLVMTypeId, ValueId};

impl<'ctx> IrBuilder<'ctx> {
    fn pointer_operand(&self, ptr: ValueId, what: &str) -> CodegenResult<PointerValue<'ctx>> {
        let raw = self.arena.get_value(ptr);
        if !raw.is_pointer_value() {
            return Err(CodegenError::invalid_state(format!(
                "{what} through a non-pointer value"
            )));
        }
        Ok(raw.into_pointer_value())
    }

    fn int_operand(&self, value: ValueId, what: &str) -> CodegenResult<IntValue<'ctx>> {
        let raw = self.arena.get_value(value);
        if !raw.is_int_value() {
            return Err(CodegenError::invalid_state(format!("{what} is not an integer")));
        }
        Ok(raw.into_int_value())
    }

    /// Build an alloca at the start of `function`'s entry block.
    ///
    /// Saves the current position, inserts before the first instruction of
    /// the entry block, then restores.
    pub fn create_entry_alloca(
        &mut self,
        function: FunctionId,
        name: &str,
        ty: LLVMTypeId,
    ) -> CodegenResult<ValueId> {
        let Some(&entry) = self.entries.get(&function) else {
            return Err(CodegenError::invalid_state("alloca in a function without blocks"));
        };
        let llvm_ty = self.arena.get_type(ty);
        let entry_bb = self.arena.get_block(entry);
        match entry_bb.get_first_instruction() {
            Some(first) => self.builder.position_before(&first),
            None => self.builder.position_at_end(entry_bb),
        }
        let ptr = self.builder.build_alloca(llvm_ty, name);
        if let Some(block) = self.current_block {
            self.builder.position_at_end(self.arena.get_block(block));
        }
        Ok(self.arena.push_value(ptr?.into(), Some(entry)))
    }

    /// Build a load of a `ty` from `ptr`.
    pub fn load(&mut self, ty: LLVMTypeId, ptr: ValueId, name: &str) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let llvm_ty = self.arena.get_type(ty);
        let ptr = self.pointer_operand(ptr, "load")?;
        let v = self.builder.build_load(llvm_ty, ptr, name)?;
        Ok(self.arena.push_value(v, Some(block)))
    }

    /// Build a store of `val` to `ptr`.
    pub fn store(&mut self, val: ValueId, ptr: ValueId) -> CodegenResult<()> {
        self.insertion_block()?;
        let v = self.arena.get_value(val);
        let ptr = self.pointer_operand(ptr, "store")?;
        self.builder.build_store(ptr, v)?;
        Ok(())
    }

    /// Build a struct GEP (field access by index) into a `struct_ty`.
    pub fn struct_gep(
        &mut self,
        struct_ty: LLVMTypeId,
        ptr: ValueId,
        index: u32,
        name: &str,
    ) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let BasicTypeEnum::StructType(struct_t) = self.arena.get_type(struct_ty) else {
            return Err(CodegenError::invalid_state("struct_gep on a non-struct type"));
        };
        let ptr = self.pointer_operand(ptr, "struct_gep")?;
        let v = self.builder.build_struct_gep(struct_t, ptr, index, name)?;
        Ok(self.arena.push_value(v.into(), Some(block)))
    }

    /// Build a GEP with arbitrary indices.
    ///
    /// # Safety
    /// Caller must ensure indices are valid for the pointee type.
    #[allow(unsafe_code)]
    pub fn gep(
        &mut self,
        pointee_ty: LLVMTypeId,
        ptr: ValueId,
        indices: &[ValueId],
        name: &str,
    ) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let llvm_ty = self.arena.get_type(pointee_ty);
        let ptr = self.pointer_operand(ptr, "gep")?;
        let idx_vals = indices
            .iter()
            .map(|&id| self.int_operand(id, "gep index"))
            .collect::<CodegenResult<Vec<_>>>()?;
        // SAFETY: Caller ensures indices are valid for the pointee type.
        let v = unsafe { self.builder.build_gep(llvm_ty, ptr, &idx_vals, name)? };
        Ok(self.arena.push_value(v.into(), Some(block)))
    }

    /// Copy `size` bytes from `src` to `dest` with `llvm.memcpy`.
    pub fn memcpy(&mut self, dest: ValueId, src: ValueId, size: ValueId) -> CodegenResult<()> {
        self.insertion_block()?;
        let dest = self.pointer_operand(dest, "memcpy")?;
        let src = self.pointer_operand(src, "memcpy")?;
        let size = self.int_operand(size, "memcpy size")?;
        self.builder
            .build_memcpy(dest, 1, src, 1, size)
            .map_err(CodegenError::invalid_state)?;
        Ok(())
    }
}
