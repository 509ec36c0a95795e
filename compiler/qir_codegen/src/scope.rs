//! Reference-Counting Scope Manager.
//!
//! [`ScopeManager`] is pure bookkeeping: a stack of scopes, each holding
//! the heap values (and qubits) it owns in registration order. The
//! emitting half lives on [`GenerationContext`] below and is the only code
//! that issues reference/unreference calls.
//!
//! Counts are deep: changing the count of a tuple or array changes the
//! counts of its reference-counted items by the same amount, so a
//! container holding a reference stays balanced with the scope that
//! releases it.

use inkwell::IntPredicate;
use qir_syntax::ResolvedType;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::runtime::RuntimeFunction;
use crate::types::is_reference_counted;
use crate::value_id::{LLVMTypeId, ValueId};
use crate::values::{ArrayValue, IValue};

/// Something a scope must release when it closes.
#[derive(Clone, Debug)]
pub enum Release {
    /// Drop one reference.
    Value(IValue),
    /// Return a single qubit to the runtime.
    Qubit(ValueId),
    /// Return a qubit register, then drop the array.
    QubitArray(ArrayValue),
    /// Drop the reference held by a mutable variable's stack slot,
    /// whatever value it holds when the scope closes.
    Slot {
        slot: ValueId,
        ty: ResolvedType,
        llvm: LLVMTypeId,
    },
}

impl Release {
    fn key(&self) -> Option<ValueId> {
        match self {
            Self::Value(value) => value.handle_key(),
            Self::Qubit(qubit) => Some(*qubit),
            Self::QubitArray(array) => Some(array.handle()),
            Self::Slot { slot, .. } => Some(*slot),
        }
    }
}

/// Per-specialization ownership bookkeeping.
#[derive(Default, Debug)]
pub struct ScopeManager {
    scopes: Vec<Vec<Release>>,
    registered: FxHashSet<ValueId>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn open(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Record `release` in the innermost scope.
    ///
    /// Registering the same handle twice would release it twice and is
    /// rejected.
    pub fn register(&mut self, release: Release) -> CodegenResult<()> {
        let Some(scope) = self.scopes.last_mut() else {
            return Err(CodegenError::invalid_state(
                "value registered with no open scope",
            ));
        };
        if let Some(key) = release.key() {
            if !self.registered.insert(key) {
                return Err(CodegenError::invalid_state(format!(
                    "value {} registered twice",
                    key.raw()
                )));
            }
        }
        scope.push(release);
        Ok(())
    }

    /// Pop the innermost scope, returning its releases newest first.
    pub fn close(&mut self) -> CodegenResult<Vec<Release>> {
        let Some(mut scope) = self.scopes.pop() else {
            return Err(CodegenError::invalid_state("closing a scope that was never opened"));
        };
        for release in &scope {
            if let Some(key) = release.key() {
                self.registered.remove(&key);
            }
        }
        scope.reverse();
        Ok(scope)
    }

    /// Releases of the innermost scope, newest first, leaving it open.
    pub fn innermost(&self) -> CodegenResult<Vec<Release>> {
        let Some(scope) = self.scopes.last() else {
            return Err(CodegenError::invalid_state("no open scope"));
        };
        Ok(scope.iter().rev().cloned().collect())
    }

    /// Drop the release of `key` from whichever scope holds it; its
    /// ownership moves elsewhere. False if nothing owned it.
    pub fn forget(&mut self, key: ValueId) -> bool {
        if !self.registered.remove(&key) {
            return false;
        }
        for scope in &mut self.scopes {
            scope.retain(|release| release.key() != Some(key));
        }
        true
    }

    /// Every pending release across all scopes, newest first, leaving the
    /// bookkeeping untouched.
    ///
    /// A release of `keep` is left out; the second result reports whether
    /// one was found.
    pub fn pending_for_return(&self, keep: Option<ValueId>) -> (Vec<Release>, bool) {
        let mut kept = false;
        let mut releases = Vec::new();
        for release in self.scopes.iter().rev().flat_map(|s| s.iter().rev()) {
            if !kept && keep.is_some() && release.key() == keep {
                kept = true;
                continue;
            }
            releases.push(release.clone());
        }
        (releases, kept)
    }

    /// True if `key` is owned by some open scope.
    pub fn is_registered(&self, key: ValueId) -> bool {
        self.registered.contains(&key)
    }

    /// Forget everything; used between specializations.
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.registered.clear();
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Direction {
    Increase,
    Decrease,
}

// ── Emission ────────────────────────────────────────────────────────

impl GenerationContext<'_, '_> {
    /// Make the current scope the owner of a freshly created value.
    ///
    /// Values without a reference count are ignored.
    pub fn register_value(&mut self, value: &IValue) -> CodegenResult<()> {
        if value.is_unit() || !is_reference_counted(value.source_type()) {
            return Ok(());
        }
        self.scopes.register(Release::Value(value.clone()))
    }

    /// Make the current scope release `qubit` when it closes.
    pub(crate) fn register_qubit(&mut self, qubit: ValueId) -> CodegenResult<()> {
        self.scopes.register(Release::Qubit(qubit))
    }

    /// Make the current scope release a qubit register when it closes.
    pub(crate) fn register_qubit_array(&mut self, array: &ArrayValue) -> CodegenResult<()> {
        self.scopes.register(Release::QubitArray(array.clone()))
    }

    /// Make the current scope drop the reference held in a mutable slot.
    pub(crate) fn register_slot(
        &mut self,
        slot: ValueId,
        ty: &ResolvedType,
        llvm: LLVMTypeId,
    ) -> CodegenResult<()> {
        if !is_reference_counted(ty) {
            return Ok(());
        }
        self.scopes.register(Release::Slot {
            slot,
            ty: ty.clone(),
            llvm,
        })
    }

    pub fn increase_reference_count(&mut self, value: &IValue) -> CodegenResult<()> {
        self.update_reference_count(value, Direction::Increase)
    }

    pub fn decrease_reference_count(&mut self, value: &IValue) -> CodegenResult<()> {
        self.update_reference_count(value, Direction::Decrease)
    }

    /// Give every element of `array` one more reference.
    ///
    /// For arrays the runtime assembled by copying element handles.
    pub(crate) fn retain_array_items(&mut self, array: &ArrayValue) -> CodegenResult<()> {
        if is_reference_counted(array.element()) {
            self.update_array_items(array, Direction::Increase)?;
        }
        Ok(())
    }

    pub fn open_scope(&mut self) {
        self.scopes.open();
    }

    /// Close the innermost scope, releasing what it owns newest first.
    ///
    /// Nothing is emitted when the current block already ended; that path
    /// released everything on its way out.
    pub fn close_scope(&mut self) -> CodegenResult<()> {
        let releases = self.scopes.close()?;
        if self.builder.is_terminated() {
            return Ok(());
        }
        trace!(count = releases.len(), "closing scope");
        for release in &releases {
            self.emit_release(release)?;
        }
        Ok(())
    }

    /// Emit the releases of the innermost scope without closing it.
    ///
    /// For a path that leaves a scope while another path still continues
    /// inside it.
    pub(crate) fn release_innermost_scope(&mut self) -> CodegenResult<()> {
        let releases = self.scopes.innermost()?;
        for release in &releases {
            self.emit_release(release)?;
        }
        Ok(())
    }

    /// Release everything every open scope owns before a `ret`.
    ///
    /// The returned value survives: if a scope owns it, ownership moves to
    /// the caller; otherwise its count is increased for the caller.
    pub fn release_for_return(&mut self, returned: Option<&IValue>) -> CodegenResult<()> {
        let keep = returned.and_then(IValue::handle_key);
        let (releases, kept) = self.scopes.pending_for_return(keep);
        if let Some(value) = returned {
            if !kept {
                self.increase_reference_count(value)?;
            }
        }
        for release in &releases {
            self.emit_release(release)?;
        }
        Ok(())
    }

    fn emit_release(&mut self, release: &Release) -> CodegenResult<()> {
        match release {
            Release::Value(value) => self.decrease_reference_count(value),
            Release::Qubit(qubit) => {
                self.call_runtime(RuntimeFunction::QubitRelease, &[*qubit])?;
                Ok(())
            }
            Release::QubitArray(array) => {
                self.call_runtime(RuntimeFunction::QubitReleaseArray, &[array.handle()])?;
                self.call_runtime(RuntimeFunction::ArrayUnreference, &[array.handle()])?;
                Ok(())
            }
            Release::Slot { slot, ty, llvm } => {
                let current = self.builder.load(*llvm, *slot, "")?;
                let value = self.value_from(current, ty)?;
                self.decrease_reference_count(&value)
            }
        }
    }

    fn update_reference_count(&mut self, value: &IValue, direction: Direction) -> CodegenResult<()> {
        use RuntimeFunction as R;
        let increase = direction == Direction::Increase;
        match value {
            IValue::Simple(simple) => {
                let function = match (&simple.ty, increase) {
                    (ResolvedType::String, true) => R::StringReference,
                    (ResolvedType::String, false) => R::StringUnreference,
                    (ResolvedType::BigInt, true) => R::BigIntReference,
                    (ResolvedType::BigInt, false) => R::BigIntUnreference,
                    (ResolvedType::Result, true) => R::ResultReference,
                    (ResolvedType::Result, false) => R::ResultUnreference,
                    _ => return Ok(()),
                };
                self.call_runtime(function, &[simple.value])?;
            }
            IValue::Callable(callable) => {
                let function = if increase {
                    R::CallableReference
                } else {
                    R::CallableUnreference
                };
                self.call_runtime(function, &[callable.value])?;
            }
            IValue::Tuple(tuple) => {
                if tuple.items().is_empty() {
                    return Ok(());
                }
                // Items are read through the tuple, so they go before it is
                // released and after it is retained.
                if increase {
                    let handle = self.opaque_pointer(tuple)?;
                    self.call_runtime(R::TupleReference, &[handle])?;
                }
                let items = tuple.items().to_vec();
                for (index, item) in items.iter().enumerate() {
                    if is_reference_counted(item) {
                        let item = self.tuple_item(tuple, index)?;
                        self.update_reference_count(&item, direction)?;
                    }
                }
                if !increase {
                    let handle = self.opaque_pointer(tuple)?;
                    self.call_runtime(R::TupleUnreference, &[handle])?;
                }
            }
            IValue::Array(array) => {
                if increase {
                    self.call_runtime(R::ArrayReference, &[array.handle()])?;
                }
                if is_reference_counted(array.element()) {
                    self.update_array_items(array, direction)?;
                }
                if !increase {
                    self.call_runtime(R::ArrayUnreference, &[array.handle()])?;
                }
            }
        }
        Ok(())
    }

    /// Apply `direction` to every element with a counted loop.
    fn update_array_items(&mut self, array: &ArrayValue, direction: Direction) -> CodegenResult<()> {
        let function = self.current_function()?;
        let length = self.array_length(array)?;
        let Some(before) = self.builder.current_block() else {
            return Err(CodegenError::invalid_state("no insertion block"));
        };
        let header = self.builder.append_block(function, "items.header");
        let body = self.builder.append_block(function, "items.body");
        let exit = self.builder.append_block(function, "items.exit");
        self.builder.br(header)?;

        self.builder.position_at_end(header);
        let i64_ty = self.builtins().i64;
        let index = self.builder.phi(i64_ty, "index")?;
        let zero = self.builder.const_i64(0);
        self.builder.add_phi_incoming(index, &[(zero, before)]);
        let more = self.builder.icmp(IntPredicate::SLT, index, length, "")?;
        self.builder.cond_br(more, body, exit)?;

        self.builder.position_at_end(body);
        let item = self.array_item(array, index)?;
        self.update_reference_count(&item, direction)?;
        let one = self.builder.const_i64(1);
        let next = self.builder.add(index, one, "")?;
        let Some(latch) = self.builder.current_block() else {
            return Err(CodegenError::invalid_state("no insertion block"));
        };
        self.builder.add_phi_incoming(index, &[(next, latch)]);
        self.builder.br(header)?;

        self.builder.position_at_end(exit);
        Ok(())
    }
}
