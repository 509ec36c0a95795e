//! Value Abstraction Layer.
//!
//! An [`IValue`] pairs an LLVM value with its source type. Tuples keep
//! two views of one allocation, the opaque handle passed to runtime calls
//! and the typed view used for field access. Pointers are opaque, so both
//! views are the same `ptr`; the typed view adds the record type that
//! field GEPs are computed against. Each view is materialized on first
//! request and deriving one from the other emits no instruction. Clones
//! share view state, so a view materialized through one clone is visible
//! through all of them.
//!
//! # Method Organization
//!
//! | Section | Methods |
//! |---------|---------|
//! | Construction | `value_from`, `unit`, `unallocated_tuple` |
//! | Tuple views | `opaque_pointer`, `typed_pointer`, `tuple_item` |
//! | Arrays | `array_length`, `array_element_pointer`, `array_item` |
//! | Composites | `create_tuple`, `create_array` |

use std::cell::Cell;
use std::rc::Rc;

use qir_syntax::ResolvedType;
use tracing::trace;

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::runtime::RuntimeFunction;
use crate::types::closed_form_size;
use crate::value_id::{LLVMTypeId, ValueId};

/// Materialization state of one pointer view.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum View {
    Unmaterialized,
    Materialized(ValueId),
}

impl View {
    pub fn get(self) -> Option<ValueId> {
        match self {
            Self::Unmaterialized => None,
            Self::Materialized(value) => Some(value),
        }
    }
}

#[derive(Debug)]
struct TupleViews {
    opaque: Cell<View>,
    typed: Cell<View>,
    /// The view that existed first; identifies the allocation.
    origin: Cell<Option<ValueId>>,
}

/// A tuple or user-defined type value.
#[derive(Clone, Debug)]
pub struct TupleValue {
    ty: ResolvedType,
    items: Vec<ResolvedType>,
    /// `None` for tuples without items, which are the shared unit handle.
    record: Option<LLVMTypeId>,
    views: Rc<TupleViews>,
}

impl TupleValue {
    fn with_views(
        ty: ResolvedType,
        items: Vec<ResolvedType>,
        record: Option<LLVMTypeId>,
        opaque: View,
        typed: View,
    ) -> Self {
        let origin = opaque.get().or(typed.get());
        Self {
            ty,
            items,
            record,
            views: Rc::new(TupleViews {
                opaque: Cell::new(opaque),
                typed: Cell::new(typed),
                origin: Cell::new(origin),
            }),
        }
    }

    pub fn source_type(&self) -> &ResolvedType {
        &self.ty
    }

    pub fn items(&self) -> &[ResolvedType] {
        &self.items
    }

    pub fn record(&self) -> Option<LLVMTypeId> {
        self.record
    }

    pub fn opaque_view(&self) -> View {
        self.views.opaque.get()
    }

    pub fn typed_view(&self) -> View {
        self.views.typed.get()
    }

    /// True once either view exists.
    pub fn is_allocated(&self) -> bool {
        self.views.origin.get().is_some()
    }

    fn set_opaque(&self, value: ValueId) {
        self.views.opaque.set(View::Materialized(value));
        if self.views.origin.get().is_none() {
            self.views.origin.set(Some(value));
        }
    }

    fn set_typed(&self, value: ValueId) {
        self.views.typed.set(View::Materialized(value));
        if self.views.origin.get().is_none() {
            self.views.origin.set(Some(value));
        }
    }
}

/// An array value with its lazily fetched length.
#[derive(Clone, Debug)]
pub struct ArrayValue {
    handle: ValueId,
    ty: ResolvedType,
    element: ResolvedType,
    length: Rc<Cell<Option<ValueId>>>,
}

impl ArrayValue {
    /// A runtime-allocated array whose length is already known.
    pub fn with_length(handle: ValueId, element: ResolvedType, length: ValueId) -> Self {
        Self {
            handle,
            ty: ResolvedType::array(element.clone()),
            element,
            length: Rc::new(Cell::new(Some(length))),
        }
    }

    pub fn handle(&self) -> ValueId {
        self.handle
    }

    pub fn element(&self) -> &ResolvedType {
        &self.element
    }

    /// The length, if known without a runtime call.
    pub fn cached_length(&self) -> Option<ValueId> {
        self.length.get()
    }
}

/// A scalar or opaque-handle value.
#[derive(Clone, Debug)]
pub struct SimpleValue {
    pub value: ValueId,
    pub ty: ResolvedType,
}

/// A value of operation or function type.
#[derive(Clone, Debug)]
pub struct CallableValue {
    pub value: ValueId,
    pub ty: ResolvedType,
}

/// A generated value and its source type.
#[derive(Clone, Debug)]
pub enum IValue {
    Simple(SimpleValue),
    Tuple(TupleValue),
    Array(ArrayValue),
    Callable(CallableValue),
}

impl IValue {
    pub fn source_type(&self) -> &ResolvedType {
        match self {
            Self::Simple(v) => &v.ty,
            Self::Tuple(t) => &t.ty,
            Self::Array(a) => &a.ty,
            Self::Callable(c) => &c.ty,
        }
    }

    /// The value identifying the underlying allocation, if any.
    pub fn handle_key(&self) -> Option<ValueId> {
        match self {
            Self::Simple(v) => Some(v.value),
            Self::Tuple(t) => t.views.origin.get(),
            Self::Array(a) => Some(a.handle),
            Self::Callable(c) => Some(c.value),
        }
    }

    pub fn as_tuple(&self) -> Option<&TupleValue> {
        match self {
            Self::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// True for the unit value and for tuples without items.
    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Tuple(t) if t.items.is_empty())
    }
}

// ── Construction ────────────────────────────────────────────────────

impl GenerationContext<'_, '_> {
    /// Wrap `value` according to the outermost constructor of `ty`.
    ///
    /// A tuple handle starts as the opaque view; the typed view is derived
    /// on first field access. A user-defined type becomes a tuple of its
    /// items.
    pub fn value_from(&mut self, value: ValueId, ty: &ResolvedType) -> CodegenResult<IValue> {
        Ok(match ty {
            ResolvedType::Array(element) => IValue::Array(ArrayValue {
                handle: value,
                ty: ty.clone(),
                element: (**element).clone(),
                length: Rc::new(Cell::new(None)),
            }),
            ResolvedType::Tuple(_) | ResolvedType::UserDefined(_) | ResolvedType::Unit => {
                let items = self.types.items_of(ty, self.compilation)?;
                if items.is_empty() {
                    return Ok(self.unit_of(ty.clone()));
                }
                let record = self
                    .types
                    .record_type(&items, &mut self.builder, self.compilation)?;
                IValue::Tuple(TupleValue::with_views(
                    ty.clone(),
                    items,
                    Some(record),
                    View::Materialized(value),
                    View::Unmaterialized,
                ))
            }
            ResolvedType::Operation { .. } | ResolvedType::Function { .. } => {
                IValue::Callable(CallableValue {
                    value,
                    ty: ty.clone(),
                })
            }
            _ => IValue::Simple(SimpleValue {
                value,
                ty: ty.clone(),
            }),
        })
    }

    /// The shared unit value.
    pub fn unit(&mut self) -> IValue {
        self.unit_of(ResolvedType::Unit)
    }

    fn unit_of(&mut self, ty: ResolvedType) -> IValue {
        let null = self.unit_handle();
        IValue::Tuple(TupleValue::with_views(
            ty,
            Vec::new(),
            None,
            View::Materialized(null),
            View::Materialized(null),
        ))
    }

    /// A tuple of type `ty` whose allocation is deferred to the first
    /// view request.
    pub fn unallocated_tuple(&mut self, ty: &ResolvedType) -> CodegenResult<IValue> {
        let items = self.types.items_of(ty, self.compilation)?;
        if items.is_empty() {
            return Ok(self.unit_of(ty.clone()));
        }
        let record = self
            .types
            .record_type(&items, &mut self.builder, self.compilation)?;
        Ok(IValue::Tuple(TupleValue::with_views(
            ty.clone(),
            items,
            Some(record),
            View::Unmaterialized,
            View::Unmaterialized,
        )))
    }

    /// The LLVM value standing for `value` in calls, stores and returns.
    ///
    /// Tuples pass their typed view.
    pub fn representation_value(&mut self, value: &IValue) -> CodegenResult<ValueId> {
        match value {
            IValue::Simple(v) => Ok(v.value),
            IValue::Callable(c) => Ok(c.value),
            IValue::Array(a) => Ok(a.handle),
            IValue::Tuple(t) => self.typed_pointer(t),
        }
    }
}

// ── Tuple views ─────────────────────────────────────────────────────

impl GenerationContext<'_, '_> {
    /// The opaque handle, allocating the tuple if neither view exists.
    ///
    /// A fresh allocation is registered with the current scope.
    pub fn opaque_pointer(&mut self, tuple: &TupleValue) -> CodegenResult<ValueId> {
        if let Some(opaque) = tuple.opaque_view().get() {
            return Ok(opaque);
        }
        if let Some(typed) = tuple.typed_view().get() {
            tuple.set_opaque(typed);
            return Ok(typed);
        }
        let record = tuple
            .record
            .ok_or_else(|| CodegenError::invalid_state("unit tuple without a handle"))?;
        let size = self.size_of(record)?;
        let opaque = self.runtime_value(RuntimeFunction::TupleCreate, &[size], "")?;
        trace!(items = tuple.items.len(), "allocated tuple");
        tuple.set_opaque(opaque);
        self.register_value(&IValue::Tuple(tuple.clone()))?;
        Ok(opaque)
    }

    /// The typed view, addressed against the tuple's record type.
    pub fn typed_pointer(&mut self, tuple: &TupleValue) -> CodegenResult<ValueId> {
        if let Some(typed) = tuple.typed_view().get() {
            return Ok(typed);
        }
        let opaque = self.opaque_pointer(tuple)?;
        tuple.set_typed(opaque);
        Ok(opaque)
    }

    /// Address of item `index`.
    pub fn tuple_item_pointer(&mut self, tuple: &TupleValue, index: usize) -> CodegenResult<ValueId> {
        if index >= tuple.items.len() {
            return Err(CodegenError::invalid_state(format!(
                "item {index} of a {}-tuple",
                tuple.items.len()
            )));
        }
        let record = tuple
            .record
            .ok_or_else(|| CodegenError::invalid_state("item of a unit tuple"))?;
        let typed = self.typed_pointer(tuple)?;
        let field = u32::try_from(index)
            .map_err(|_| CodegenError::unsupported("tuple with more than u32::MAX items"))?;
        self.builder.struct_gep(record, typed, field, "")
    }

    /// Load item `index`; always goes through the typed view.
    pub fn tuple_item(&mut self, tuple: &TupleValue, index: usize) -> CodegenResult<IValue> {
        let ptr = self.tuple_item_pointer(tuple, index)?;
        let ty = tuple.items[index].clone();
        let item_ty = self.representation(&ty)?;
        let loaded = self.builder.load(item_ty, ptr, "")?;
        self.value_from(loaded, &ty)
    }

    /// Size of `ty` in bytes as an `i64` value.
    ///
    /// Uses the closed form when it exists, otherwise
    /// `ptrtoint (getelementptr T, ptr null, i64 1)`.
    pub(crate) fn size_of(&mut self, ty: LLVMTypeId) -> CodegenResult<ValueId> {
        let i64_ty = self.builtins().i64;
        self.size_as(ty, i64_ty)
    }

    pub(crate) fn size_as(&mut self, ty: LLVMTypeId, int_ty: LLVMTypeId) -> CodegenResult<ValueId> {
        if let Some(bytes) = closed_form_size(self.builder.llvm_type(ty)) {
            let bytes = i64::try_from(bytes)
                .map_err(|_| CodegenError::unsupported("type larger than i64::MAX bytes"))?;
            return self.builder.const_int(int_ty, bytes);
        }
        let null = self.builder.const_null_ptr();
        let one = self.builder.const_i64(1);
        let end = self.builder.gep(ty, null, &[one], "")?;
        self.builder.ptr_to_int(end, int_ty, "")
    }
}

// ── Arrays ──────────────────────────────────────────────────────────

impl GenerationContext<'_, '_> {
    /// Element count, fetched from the runtime and cached.
    ///
    /// A cached length is reused only where its defining block dominates
    /// the insertion point; elsewhere it is fetched again.
    pub fn array_length(&mut self, array: &ArrayValue) -> CodegenResult<ValueId> {
        if let Some(length) = array.cached_length() {
            if self.builder.is_available(length) {
                return Ok(length);
            }
        }
        let length = self.runtime_value(RuntimeFunction::ArrayGetSize1d, &[array.handle], "")?;
        array.length.set(Some(length));
        Ok(length)
    }

    /// Address of element `index`.
    pub fn array_element_pointer(
        &mut self,
        array: &ArrayValue,
        index: ValueId,
    ) -> CodegenResult<ValueId> {
        self.runtime_value(
            RuntimeFunction::ArrayGetElementPtr1d,
            &[array.handle, index],
            "",
        )
    }

    pub fn array_item(&mut self, array: &ArrayValue, index: ValueId) -> CodegenResult<IValue> {
        let ptr = self.array_element_pointer(array, index)?;
        let element = array.element.clone();
        let element_ty = self.representation(&element)?;
        let loaded = self.builder.load(element_ty, ptr, "")?;
        self.value_from(loaded, &element)
    }
}

// ── Composites ──────────────────────────────────────────────────────

impl GenerationContext<'_, '_> {
    /// Build a tuple of type `ty` from `values`.
    ///
    /// Allocates, stores every item, then increases every item's count;
    /// the tuple now holds one reference to each.
    pub fn create_tuple(&mut self, ty: &ResolvedType, values: &[IValue]) -> CodegenResult<IValue> {
        let tuple = self.unallocated_tuple(ty)?;
        let IValue::Tuple(inner) = &tuple else {
            return Err(CodegenError::invalid_state("tuple type without a tuple value"));
        };
        if inner.items.len() != values.len() {
            return Err(CodegenError::invalid_state(format!(
                "{} values for a {}-tuple",
                values.len(),
                inner.items.len()
            )));
        }
        for (index, value) in values.iter().enumerate() {
            let slot = self.tuple_item_pointer(inner, index)?;
            let stored = self.representation_value(value)?;
            self.builder.store(stored, slot)?;
        }
        for value in values {
            self.increase_reference_count(value)?;
        }
        Ok(tuple)
    }

    /// Build an array of `element` values, in the same order as
    /// [`Self::create_tuple`].
    pub fn create_array(
        &mut self,
        element: &ResolvedType,
        values: &[IValue],
    ) -> CodegenResult<IValue> {
        let element_ty = self.representation(element)?;
        let i32_ty = self.builtins().i32;
        let element_size = self.size_as(element_ty, i32_ty)?;
        let count = i64::try_from(values.len())
            .map_err(|_| CodegenError::unsupported("array literal too long"))?;
        let length = self.builder.const_i64(count);
        let handle = self.runtime_value(
            RuntimeFunction::ArrayCreate1d,
            &[element_size, length],
            "",
        )?;
        let array = ArrayValue::with_length(handle, element.clone(), length);
        self.register_value(&IValue::Array(array.clone()))?;
        for (index, value) in values.iter().enumerate() {
            let index = i64::try_from(index)
                .map_err(|_| CodegenError::unsupported("array literal too long"))?;
            let index = self.builder.const_i64(index);
            let slot = self.array_element_pointer(&array, index)?;
            let stored = self.representation_value(value)?;
            self.builder.store(stored, slot)?;
        }
        for value in values {
            self.increase_reference_count(value)?;
        }
        Ok(IValue::Array(array))
    }
}
