//! ID-based LLVM instruction builder.
//!
//! `IrBuilder` owns one inkwell `Module` and `Builder`, stores every LLVM
//! value in a `ValueArena`, and exposes only opaque ID types to callers.
//! This keeps the `'ctx` lifetime out of the lowering code's signatures.
//!
//! # Design
//!
//! - Callers see `ValueId`, `LLVMTypeId`, `BlockId`, `FunctionId`, `GlobalId`; all `Copy`.
//! - Every instruction method fails instead of appending to a block that
//!   already ends in a terminator.
//! - Branches are recorded as CFG edges so lowering can ask whether a
//!   cached value's block dominates the insertion point.
//!
//! # Method Organization
//!
//! | Category | Methods |
//! |----------|---------|
//! | Constants | `const_i64`, `const_i32`, `const_bool`, `const_f64`, `const_int`, `const_null_ptr`, ... |
//! | Globals | `add_global`, `global_value`, `global_count` |
//! | Memory | `create_entry_alloca`, `load`, `store`, `struct_gep`, `gep`, `memcpy` |
//! | Aggregates | `build_struct`, `extract_value` |
//! | Arithmetic | `add`, `sub`, `mul`, `icmp` |
//! | Conversions | `ptr_to_int`, `trunc` |
//! | Control flow | `br`, `cond_br`, `select`, `ret`, `ret_void`, `unreachable`, `phi` |
//! | Calls | `call`, `declare_function`, `get_or_declare_function`, `add_alias` |
//! | Types | `register_type`, `i64_type`, `ptr_type`, `struct_type`, ... |
//! | Blocks | `append_block`, `position_at_end`, `dominates`, `is_available`, ... |

use inkwell::builder::Builder as InkwellBuilder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::BasicValueEnum;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{CodegenError, CodegenResult};
use crate::value_id::{BlockId, FunctionId, ValueArena, ValueId};

mod aggregates;
mod arithmetic;
mod calls;
mod constants;
mod control_flow;
mod conversions;
mod globals;
mod memory;
mod types_blocks;

// ---------------------------------------------------------------------------
// IrBuilder
// ---------------------------------------------------------------------------

/// ID-based LLVM IR builder over one module.
pub struct IrBuilder<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    /// The underlying inkwell builder.
    builder: InkwellBuilder<'ctx>,
    /// Arena storing all LLVM values behind IDs.
    arena: ValueArena<'ctx>,
    /// Declared functions by symbol.
    functions: FxHashMap<String, FunctionId>,
    /// Parameter values of each function, pushed once.
    params: FxHashMap<FunctionId, Vec<ValueId>>,
    current_function: Option<FunctionId>,
    current_block: Option<BlockId>,
    /// Successors of every block whose terminator was emitted here.
    successors: FxHashMap<BlockId, SmallVec<[BlockId; 2]>>,
    /// First block appended to each function.
    entries: FxHashMap<FunctionId, BlockId>,
    block_functions: FxHashMap<BlockId, FunctionId>,
}

impl<'ctx> IrBuilder<'ctx> {
    /// Create a builder over a fresh module called `module_name`.
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            arena: ValueArena::new(),
            functions: FxHashMap::default(),
            params: FxHashMap::default(),
            current_function: None,
            current_block: None,
            successors: FxHashMap::default(),
            entries: FxHashMap::default(),
            block_functions: FxHashMap::default(),
        }
    }

    /// The LLVM context the module lives in.
    #[inline]
    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    /// The module under construction.
    #[inline]
    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    /// Hand over the finished module.
    pub fn into_module(self) -> Module<'ctx> {
        self.module
    }

    /// The LLVM value behind `id`.
    #[inline]
    pub fn raw_value(&self, id: ValueId) -> BasicValueEnum<'ctx> {
        self.arena.get_value(id)
    }

    /// Block new instructions go into.
    ///
    /// Fails when the builder is unpositioned or the block already ends.
    fn insertion_block(&self) -> CodegenResult<BlockId> {
        let Some(block) = self.current_block else {
            return Err(CodegenError::invalid_state("no insertion block"));
        };
        let bb = self.arena.get_block(block);
        if bb.get_terminator().is_some() {
            return Err(CodegenError::invalid_state(format!(
                "block '{}' already has a terminator",
                bb.get_name().to_string_lossy()
            )));
        }
        Ok(block)
    }
}
