//! Global variables for `IrBuilder`.

use inkwell::module::Linkage;

use super::IrBuilder;
use crate::value_id::{GlobalId, LLVMTypeId, ValueId};

impl IrBuilder<'_> {
    /// Add a global of type `ty`.
    ///
    /// Without an initializer the global is an external declaration.
    pub fn add_global(
        &mut self,
        name: &str,
        ty: LLVMTypeId,
        initializer: Option<ValueId>,
        constant: bool,
        linkage: Linkage,
    ) -> GlobalId {
        let llvm_ty = self.arena.get_type(ty);
        let global = self.module.add_global(llvm_ty, None, name);
        if let Some(init) = initializer {
            global.set_initializer(&self.arena.get_value(init));
        }
        global.set_constant(constant);
        global.set_linkage(linkage);
        self.arena.push_global(global)
    }

    /// The address of a global as a value.
    pub fn global_value(&mut self, global: GlobalId) -> ValueId {
        let ptr = self.arena.get_global(global).as_pointer_value();
        self.arena.push_value(ptr.into(), None)
    }

    /// Number of globals in the module.
    pub fn global_count(&self) -> usize {
        self.module.get_globals().count()
    }
}
