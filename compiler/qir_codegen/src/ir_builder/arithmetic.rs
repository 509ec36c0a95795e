//! Integer arithmetic and comparisons for `IrBuilder`.

use inkwell::IntPredicate;

use super::IrBuilder;
use crate::error::CodegenResult;
use crate::value_id::ValueId;

impl IrBuilder<'_> {
    /// Build integer addition.
    pub fn add(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let l = self.int_operand(lhs, "add operand")?;
        let r = self.int_operand(rhs, "add operand")?;
        let v = self.builder.build_int_add(l, r, name)?;
        Ok(self.arena.push_value(v.into(), Some(block)))
    }

    /// Build integer subtraction.
    pub fn sub(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let l = self.int_operand(lhs, "sub operand")?;
        let r = self.int_operand(rhs, "sub operand")?;
        let v = self.builder.build_int_sub(l, r, name)?;
        Ok(self.arena.push_value(v.into(), Some(block)))
    }

    /// Build integer multiplication.
    pub fn mul(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let l = self.int_operand(lhs, "mul operand")?;
        let r = self.int_operand(rhs, "mul operand")?;
        let v = self.builder.build_int_mul(l, r, name)?;
        Ok(self.arena.push_value(v.into(), Some(block)))
    }

    /// Build an integer comparison.
    pub fn icmp(
        &mut self,
        predicate: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let l = self.int_operand(lhs, "icmp operand")?;
        let r = self.int_operand(rhs, "icmp operand")?;
        let v = self.builder.build_int_compare(predicate, l, r, name)?;
        Ok(self.arena.push_value(v.into(), Some(block)))
    }
}
