//! Control flow operations (branch, select, return, phi) for `IrBuilder`.

use inkwell::basic_block::BasicBlock;
use inkwell::values::{AsValueRef, BasicValue, BasicValueEnum, PhiValue};
use smallvec::smallvec;

use super::IrBuilder;
use crate::error::CodegenResult;
use crate::value_id::{BlockId, LLVMTypeId, ValueId};

impl<'ctx> IrBuilder<'ctx> {
    /// Build an unconditional branch.
    pub fn br(&mut self, dest: BlockId) -> CodegenResult<()> {
        let from = self.insertion_block()?;
        self.builder
            .build_unconditional_branch(self.arena.get_block(dest))?;
        self.successors.insert(from, smallvec![dest]);
        Ok(())
    }

    /// Build a conditional branch on an `i1`.
    pub fn cond_br(
        &mut self,
        cond: ValueId,
        then_bb: BlockId,
        else_bb: BlockId,
    ) -> CodegenResult<()> {
        let from = self.insertion_block()?;
        let cond = self.int_operand(cond, "branch condition")?;
        self.builder.build_conditional_branch(
            cond,
            self.arena.get_block(then_bb),
            self.arena.get_block(else_bb),
        )?;
        self.successors.insert(from, smallvec![then_bb, else_bb]);
        Ok(())
    }

    /// Build a select instruction.
    pub fn select(
        &mut self,
        cond: ValueId,
        then_val: ValueId,
        else_val: ValueId,
        name: &str,
    ) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let cond = self.int_operand(cond, "select condition")?;
        let t = self.arena.get_value(then_val);
        let e = self.arena.get_value(else_val);
        let v = self.builder.build_select(cond, t, e, name)?;
        Ok(self.arena.push_value(v, Some(block)))
    }

    /// Build a return with a value.
    pub fn ret(&mut self, val: ValueId) -> CodegenResult<()> {
        self.insertion_block()?;
        let v = self.arena.get_value(val);
        self.builder.build_return(Some(&v))?;
        Ok(())
    }

    /// Build a void return.
    pub fn ret_void(&mut self) -> CodegenResult<()> {
        self.insertion_block()?;
        self.builder.build_return(None)?;
        Ok(())
    }

    /// Build an unreachable terminator.
    pub fn unreachable(&mut self) -> CodegenResult<()> {
        self.insertion_block()?;
        self.builder.build_unreachable()?;
        Ok(())
    }

    // -- Phi nodes --

    /// Build an empty phi node.
    ///
    /// Incoming values are added afterwards with `add_phi_incoming`.
    pub fn phi(&mut self, ty: LLVMTypeId, name: &str) -> CodegenResult<ValueId> {
        let block = self.insertion_block()?;
        let llvm_ty = self.arena.get_type(ty);
        let phi = self.builder.build_phi(llvm_ty, name)?;
        Ok(self.arena.push_value(phi.as_basic_value(), Some(block)))
    }

    /// Add incoming values to a phi created by `phi`.
    #[allow(unsafe_code)]
    pub fn add_phi_incoming(&mut self, phi: ValueId, incoming: &[(ValueId, BlockId)]) {
        let phi_val = self.arena.get_value(phi);

        // SAFETY: `phi_val` was created by `build_phi` and stored via
        // `as_basic_value()`. The underlying LLVMValueRef is still a phi.
        let raw_phi = unsafe { PhiValue::new(phi_val.as_value_ref()) };

        let vals: Vec<BasicValueEnum<'ctx>> = incoming
            .iter()
            .map(|&(v, _)| self.arena.get_value(v))
            .collect();
        let blocks: Vec<BasicBlock<'ctx>> = incoming
            .iter()
            .map(|&(_, b)| self.arena.get_block(b))
            .collect();
        let refs: Vec<(&dyn BasicValue<'ctx>, BasicBlock<'ctx>)> = vals
            .iter()
            .zip(blocks.iter())
            .map(|(v, &b)| (v as &dyn BasicValue<'ctx>, b))
            .collect();
        raw_phi.add_incoming(&refs);
    }
}
