//! Constant values for `IrBuilder`.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, PointerValue};
use inkwell::AddressSpace;

use super::IrBuilder;
use crate::error::{CodegenError, CodegenResult};
use crate::value_id::{LLVMTypeId, ValueId};

impl<'ctx> IrBuilder<'ctx> {
    /// Create an i64 constant.
    #[inline]
    pub fn const_i64(&mut self, val: i64) -> ValueId {
        let v = self.context.i64_type().const_int(val as u64, val < 0);
        self.arena.push_value(v.into(), None)
    }

    /// Create an i32 constant.
    #[inline]
    pub fn const_i32(&mut self, val: i32) -> ValueId {
        let v = self.context.i32_type().const_int(val as u64, val < 0);
        self.arena.push_value(v.into(), None)
    }

    /// Create an i1 (boolean) constant.
    #[inline]
    pub fn const_bool(&mut self, val: bool) -> ValueId {
        let v = self.context.bool_type().const_int(u64::from(val), false);
        self.arena.push_value(v.into(), None)
    }

    /// Create an f64 constant.
    #[inline]
    pub fn const_f64(&mut self, val: f64) -> ValueId {
        let v = self.context.f64_type().const_float(val);
        self.arena.push_value(v.into(), None)
    }

    /// Create a constant of the integer type `ty`.
    pub fn const_int(&mut self, ty: LLVMTypeId, val: i64) -> CodegenResult<ValueId> {
        let BasicTypeEnum::IntType(int_ty) = self.arena.get_type(ty) else {
            return Err(CodegenError::invalid_state(
                "integer constant of a non-integer type",
            ));
        };
        let v = int_ty.const_int(val as u64, val < 0);
        Ok(self.arena.push_value(v.into(), None))
    }

    /// Create a null pointer constant.
    #[inline]
    pub fn const_null_ptr(&mut self) -> ValueId {
        let v = self.context.ptr_type(AddressSpace::default()).const_null();
        self.arena.push_value(v.into(), None)
    }

    /// Create a constant of the named struct `ty` from constant fields.
    pub fn const_struct(&mut self, ty: LLVMTypeId, fields: &[ValueId]) -> CodegenResult<ValueId> {
        let BasicTypeEnum::StructType(struct_ty) = self.arena.get_type(ty) else {
            return Err(CodegenError::invalid_state("struct constant of a non-struct type"));
        };
        let values: Vec<BasicValueEnum<'ctx>> =
            fields.iter().map(|&id| self.arena.get_value(id)).collect();
        let v = struct_ty.const_named_struct(&values);
        Ok(self.arena.push_value(v.into(), None))
    }

    /// Create a constant array of pointers.
    pub fn const_ptr_array(&mut self, items: &[ValueId]) -> CodegenResult<ValueId> {
        let mut pointers: Vec<PointerValue<'ctx>> = Vec::with_capacity(items.len());
        for &id in items {
            let raw = self.arena.get_value(id);
            if !raw.is_pointer_value() {
                return Err(CodegenError::invalid_state("pointer array item is not a pointer"));
            }
            pointers.push(raw.into_pointer_value());
        }
        let v = self
            .context
            .ptr_type(AddressSpace::default())
            .const_array(&pointers);
        Ok(self.arena.push_value(v.into(), None))
    }

    /// Create a null-terminated byte array holding `text`.
    pub fn const_c_string(&mut self, text: &str) -> ValueId {
        let bytes: Vec<u8> = text.bytes().chain(std::iter::once(0)).collect();
        let v = self.context.const_string(&bytes, false);
        self.arena.push_value(v.into(), None)
    }
}
