//! Type registration, block management, and dominance for `IrBuilder`.

use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::AddressSpace;
use rustc_hash::FxHashSet;

use super::IrBuilder;
use crate::error::{CodegenError, CodegenResult};
use crate::value_id::{BlockId, FunctionId, LLVMTypeId, ValueId};

impl<'ctx> IrBuilder<'ctx> {
    // -- Type registration --

    /// Register an LLVM type in the arena.
    pub fn register_type(&mut self, ty: BasicTypeEnum<'ctx>) -> LLVMTypeId {
        self.arena.push_type(ty)
    }

    /// The LLVM type behind `ty`.
    #[inline]
    pub fn llvm_type(&self, ty: LLVMTypeId) -> BasicTypeEnum<'ctx> {
        self.arena.get_type(ty)
    }

    /// The type of `value`.
    pub fn type_of(&mut self, value: ValueId) -> LLVMTypeId {
        let ty = self.arena.get_value(value).get_type();
        self.arena.push_type(ty)
    }

    #[inline]
    pub fn bool_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.context.bool_type().into())
    }

    /// The 2-bit integer Pauli values use.
    #[inline]
    pub fn i2_type(&mut self) -> LLVMTypeId {
        self.arena
            .push_type(self.context.custom_width_int_type(2).into())
    }

    #[inline]
    pub fn i8_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.context.i8_type().into())
    }

    #[inline]
    pub fn i32_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.context.i32_type().into())
    }

    #[inline]
    pub fn i64_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.context.i64_type().into())
    }

    #[inline]
    pub fn f64_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.context.f64_type().into())
    }

    /// The opaque pointer type.
    #[inline]
    pub fn ptr_type(&mut self) -> LLVMTypeId {
        self.arena
            .push_type(self.context.ptr_type(AddressSpace::default()).into())
    }

    /// The literal struct `{ fields... }`.
    pub fn struct_type(&mut self, fields: &[LLVMTypeId]) -> LLVMTypeId {
        let fields: Vec<BasicTypeEnum<'ctx>> =
            fields.iter().map(|&id| self.arena.get_type(id)).collect();
        let ty = self.context.struct_type(&fields, false);
        self.arena.push_type(ty.into())
    }

    /// The named struct `%name = type { fields... }`.
    pub fn named_struct(&mut self, name: &str, fields: &[LLVMTypeId]) -> LLVMTypeId {
        let fields: Vec<BasicTypeEnum<'ctx>> =
            fields.iter().map(|&id| self.arena.get_type(id)).collect();
        let ty = self.context.opaque_struct_type(name);
        ty.set_body(&fields, false);
        self.arena.push_type(ty.into())
    }

    /// `[len x ptr]`.
    pub fn ptr_array_type(&mut self, len: u32) -> LLVMTypeId {
        let ty = self
            .context
            .ptr_type(AddressSpace::default())
            .array_type(len);
        self.arena.push_type(ty.as_basic_type_enum())
    }

    // -- Block management --

    /// Append a new basic block to a function.
    ///
    /// The first block appended is the function's entry.
    pub fn append_block(&mut self, function: FunctionId, name: &str) -> BlockId {
        let func = self.arena.get_function(function);
        let bb = self.context.append_basic_block(func, name);
        let id = self.arena.push_block(bb);
        self.entries.entry(function).or_insert(id);
        self.block_functions.insert(id, function);
        id
    }

    /// Position the builder at the end of `block`.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.builder.position_at_end(self.arena.get_block(block));
        self.current_block = Some(block);
        self.current_function = self.block_functions.get(&block).copied();
    }

    /// The insertion block, if positioned.
    #[inline]
    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    /// The function owning the insertion block.
    #[inline]
    pub fn current_function(&self) -> Option<FunctionId> {
        self.current_function
    }

    /// Leave the builder unpositioned.
    pub fn clear_position(&mut self) {
        self.builder.clear_insertion_position();
        self.current_block = None;
        self.current_function = None;
    }

    /// True when nothing can be appended at the current position.
    pub fn is_terminated(&self) -> bool {
        self.current_block
            .is_none_or(|id| self.arena.get_block(id).get_terminator().is_some())
    }

    pub fn block_is_empty(&self, block: BlockId) -> bool {
        self.arena.get_block(block).get_first_instruction().is_none()
    }

    /// Blocks whose terminator branches to `block`.
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        let mut preds: Vec<BlockId> = self
            .successors
            .iter()
            .filter(|(_, succs)| succs.contains(&block))
            .map(|(&from, _)| from)
            .collect();
        preds.sort_by_key(|b| b.raw());
        preds
    }

    /// Detach an unused block from its function.
    pub fn remove_block(&mut self, block: BlockId) -> CodegenResult<()> {
        if !self.predecessors(block).is_empty() {
            return Err(CodegenError::invalid_state("removing a block with predecessors"));
        }
        if self.current_block == Some(block) {
            self.clear_position();
        }
        self.arena
            .get_block(block)
            .remove_from_function()
            .map_err(|()| CodegenError::invalid_state("block has no parent function"))?;
        self.successors.remove(&block);
        self.block_functions.remove(&block);
        Ok(())
    }

    // -- Dominance --

    /// True if every path from the function entry to `to` passes `from`.
    ///
    /// Answers from the branches emitted so far, so a block may only be
    /// asked about once its predecessors are final. Blocks of different
    /// functions never dominate each other.
    pub fn dominates(&self, from: BlockId, to: BlockId) -> bool {
        if from == to {
            return true;
        }
        let (Some(f), Some(g)) = (self.block_functions.get(&from), self.block_functions.get(&to))
        else {
            return false;
        };
        if f != g {
            return false;
        }
        let Some(&entry) = self.entries.get(f) else {
            return false;
        };
        if entry == from {
            return true;
        }
        // `to` is dominated unless it is reachable with `from` removed.
        let mut seen = FxHashSet::default();
        let mut stack = vec![entry];
        while let Some(block) = stack.pop() {
            if block == to {
                return false;
            }
            if block == from || !seen.insert(block) {
                continue;
            }
            if let Some(succs) = self.successors.get(&block) {
                stack.extend(succs.iter().copied());
            }
        }
        true
    }

    /// True if `value` may be used at the current position.
    pub fn is_available(&self, value: ValueId) -> bool {
        match self.arena.get_origin(value) {
            None => true,
            Some(origin) => self
                .current_block
                .is_some_and(|current| self.dominates(origin, current)),
        }
    }
}
