//! Copy-and-update expressions.
//!
//! The original value is never modified: the runtime copies it with the
//! force flag set, the copy takes a reference to every item it shares
//! with the original, and only then is the updated item swapped in. Along
//! a path into nested records every level on the path is copied the same
//! way, so nothing the original reaches is written.

use qir_syntax::{ResolvedType, TypedExpression, UpdateItem};
use tracing::trace;

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::runtime::RuntimeFunction;
use crate::types::is_reference_counted;
use crate::value_id::ValueId;
use crate::values::{IValue, SimpleValue, TupleValue};

impl GenerationContext<'_, '_> {
    pub(crate) fn lower_copy_and_update(
        &mut self,
        base: &TypedExpression,
        item: &UpdateItem,
        value: &TypedExpression,
    ) -> CodegenResult<IValue> {
        let original = self.lower_expression(base)?;
        match item {
            UpdateItem::Index(index) => self.update_array_item(&original, index, value),
            UpdateItem::Field(path) => self.update_field(&original, path, value),
        }
    }

    /// `array w/ index <- value`.
    fn update_array_item(
        &mut self,
        original: &IValue,
        index: &TypedExpression,
        value: &TypedExpression,
    ) -> CodegenResult<IValue> {
        let Some(array) = original.as_array() else {
            return Err(CodegenError::unsupported(format!(
                "indexed update of '{}'",
                original.source_type()
            )));
        };
        let index = self.lower_expression(index)?;
        let IValue::Simple(SimpleValue {
            value: index,
            ty: ResolvedType::Int,
        }) = index
        else {
            return Err(CodegenError::unsupported(format!(
                "array update at a '{}' index",
                index.source_type()
            )));
        };
        let replacement = self.lower_expression(value)?;

        let force = self.builder.const_bool(true);
        let handle = self.runtime_value(RuntimeFunction::ArrayCopy, &[array.handle(), force], "")?;
        let copy = self.value_from(handle, original.source_type())?;
        self.register_value(&copy)?;
        let Some(copied) = copy.as_array() else {
            return Err(CodegenError::invalid_state("array copy is not an array"));
        };
        self.retain_array_items(copied)?;
        trace!("updating array copy");

        let slot = self.array_element_pointer(copied, index)?;
        let element = copied.element().clone();
        self.replace_in_slot(slot, &element, &replacement)?;
        Ok(copy)
    }

    /// `record w/ path <- value`, where `path` indexes nested records.
    fn update_field(
        &mut self,
        original: &IValue,
        path: &[usize],
        value: &TypedExpression,
    ) -> CodegenResult<IValue> {
        let Some(record) = original.as_tuple() else {
            return Err(CodegenError::unsupported(format!(
                "item update of '{}'",
                original.source_type()
            )));
        };
        let Some((&leaf, levels)) = path.split_last() else {
            return Err(CodegenError::invalid_state("item update without an item"));
        };
        let replacement = self.lower_expression(value)?;

        let copy = self.copy_record(record)?;
        self.register_value(&copy)?;
        let Some(mut parent) = copy.as_tuple().cloned() else {
            return Err(CodegenError::invalid_state("record copy is not a tuple"));
        };
        for &index in levels {
            let inner = self.tuple_item(&parent, index)?;
            let Some(inner_record) = inner.as_tuple() else {
                return Err(CodegenError::unsupported(format!(
                    "item path through a '{}'",
                    inner.source_type()
                )));
            };
            let fresh = self.copy_record(inner_record)?;
            let slot = self.tuple_item_pointer(&parent, index)?;
            let stored = self.representation_value(&fresh)?;
            self.builder.store(stored, slot)?;
            self.decrease_reference_count(&inner)?;
            let Some(fresh) = fresh.as_tuple().cloned() else {
                return Err(CodegenError::invalid_state("record copy is not a tuple"));
            };
            parent = fresh;
        }

        let Some(item_ty) = parent.items().get(leaf).cloned() else {
            return Err(CodegenError::invalid_state(format!(
                "item {leaf} of a {}-tuple",
                parent.items().len()
            )));
        };
        let slot = self.tuple_item_pointer(&parent, leaf)?;
        self.replace_in_slot(slot, &item_ty, &replacement)?;
        Ok(copy)
    }

    /// A forced runtime copy of `record` that holds its own reference to
    /// every item; not registered.
    fn copy_record(&mut self, record: &TupleValue) -> CodegenResult<IValue> {
        let source = self.opaque_pointer(record)?;
        let force = self.builder.const_bool(true);
        let handle = self.runtime_value(RuntimeFunction::TupleCopy, &[source, force], "")?;
        let copy = self.value_from(handle, record.source_type())?;
        let Some(copied) = copy.as_tuple() else {
            return Err(CodegenError::invalid_state("record copy is not a tuple"));
        };
        for (index, item) in record.items().iter().enumerate() {
            if is_reference_counted(item) {
                let item = self.tuple_item(copied, index)?;
                self.increase_reference_count(&item)?;
            }
        }
        Ok(copy)
    }

    /// Store `replacement` into `slot`, moving the slot's reference from
    /// the old item to the new one.
    fn replace_in_slot(
        &mut self,
        slot: ValueId,
        ty: &ResolvedType,
        replacement: &IValue,
    ) -> CodegenResult<()> {
        let llvm = self.representation(ty)?;
        let previous = self.builder.load(llvm, slot, "")?;
        let previous = self.value_from(previous, ty)?;
        self.increase_reference_count(replacement)?;
        let stored = self.representation_value(replacement)?;
        self.builder.store(stored, slot)?;
        self.decrease_reference_count(&previous)
    }
}
