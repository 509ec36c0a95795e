//! Naming scopes for local bindings.
//!
//! `NameScope` uses `im::HashMap` for O(1) structural-sharing clone, so
//! every nested block gets a child scope that inherits its parent's
//! bindings while its own additions stay local.
//!
//! Names nested inside a tuple-typed parameter are bound lazily: the
//! binding records the path into the parameter tuple, and the item is
//! loaded on first reference, then cached in the innermost scope. A cached
//! item is reused only where the block that loaded it dominates the
//! insertion point.
//!
//! Mutable variables bind to a stack slot and load it on every reference.

use im::HashMap;
use qir_syntax::{ArgumentTuple, ResolvedType, SpecializationKind, SymbolTuple};
use smallvec::SmallVec;
use tracing::trace;

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::value_id::{LLVMTypeId, ValueId};
use crate::values::{IValue, TupleValue};

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub enum Binding {
    Value(IValue),
    /// Item reached from `root` by following `path`; `loaded` holds the
    /// last load, if any.
    Nested {
        root: TupleValue,
        path: SmallVec<[usize; 4]>,
        loaded: Option<IValue>,
    },
    /// A `mutable` variable living in the stack slot `slot`.
    Mutable {
        slot: ValueId,
        ty: ResolvedType,
        llvm: LLVMTypeId,
    },
}

// ---------------------------------------------------------------------------
// NameScope
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct NameScope {
    bindings: HashMap<String, Binding>,
}

impl NameScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child scope that sees every binding of `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        self.clone()
    }

    pub fn bind(&mut self, name: &str, binding: Binding) {
        self.bindings.insert(name.to_owned(), binding);
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Context operations
// ---------------------------------------------------------------------------

impl GenerationContext<'_, '_> {
    pub(crate) fn reset_names(&mut self) {
        self.names.clear();
        self.names.push(NameScope::new());
    }

    pub(crate) fn push_names(&mut self) {
        let child = self.names.last().map(NameScope::child).unwrap_or_default();
        self.names.push(child);
    }

    pub(crate) fn pop_names(&mut self) {
        self.names.pop();
    }

    pub(crate) fn bind(&mut self, name: &str, value: IValue) {
        if let Some(scope) = self.names.last_mut() {
            scope.bind(name, Binding::Value(value));
        }
    }

    pub(crate) fn bind_mutable(
        &mut self,
        name: &str,
        slot: ValueId,
        ty: &ResolvedType,
        llvm: LLVMTypeId,
    ) {
        if let Some(scope) = self.names.last_mut() {
            scope.bind(
                name,
                Binding::Mutable {
                    slot,
                    ty: ty.clone(),
                    llvm,
                },
            );
        }
    }

    fn lookup_binding(&self, name: &str) -> CodegenResult<Binding> {
        self.names
            .last()
            .and_then(|scope| scope.lookup(name))
            .cloned()
            .ok_or_else(|| CodegenError::unresolved("variable", name))
    }

    /// The value bound to `name`.
    ///
    /// Nested parameter items are loaded on first use; mutable variables
    /// are loaded from their slot every time.
    pub fn resolve(&mut self, name: &str) -> CodegenResult<IValue> {
        match self.lookup_binding(name)? {
            Binding::Value(value) => Ok(value),
            Binding::Nested { root, path, loaded } => {
                if let Some(loaded) = loaded {
                    if loaded
                        .handle_key()
                        .is_none_or(|key| self.builder.is_available(key))
                    {
                        return Ok(loaded);
                    }
                }
                trace!(name, depth = path.len(), "loading nested parameter");
                let mut current = IValue::Tuple(root.clone());
                for &index in &path {
                    let Some(tuple) = current.as_tuple().cloned() else {
                        return Err(CodegenError::invalid_state(format!(
                            "path of '{name}' leaves the parameter tuple"
                        )));
                    };
                    current = self.tuple_item(&tuple, index)?;
                }
                if let Some(scope) = self.names.last_mut() {
                    scope.bind(
                        name,
                        Binding::Nested {
                            root,
                            path,
                            loaded: Some(current.clone()),
                        },
                    );
                }
                Ok(current)
            }
            Binding::Mutable { slot, ty, llvm } => {
                let current = self.builder.load(llvm, slot, name)?;
                self.value_from(current, &ty)
            }
        }
    }

    /// Slot, source type, and slot type of the mutable variable `name`.
    pub(crate) fn mutable_slot(
        &self,
        name: &str,
    ) -> CodegenResult<(ValueId, ResolvedType, LLVMTypeId)> {
        match self.lookup_binding(name)? {
            Binding::Mutable { slot, ty, llvm } => Ok((slot, ty, llvm)),
            _ => Err(CodegenError::invalid_state(format!(
                "'{name}' is not mutable"
            ))),
        }
    }

    /// Bind a `let` or qubit-allocation pattern, destructuring tuples.
    pub(crate) fn bind_pattern(&mut self, pattern: &SymbolTuple, value: IValue) -> CodegenResult<()> {
        match pattern {
            SymbolTuple::Variable(name) => self.bind(name, value),
            SymbolTuple::Discarded => {}
            SymbolTuple::Tuple(patterns) => {
                let Some(tuple) = value.as_tuple().cloned() else {
                    return Err(CodegenError::unsupported(format!(
                        "destructuring a value of type '{}'",
                        value.source_type()
                    )));
                };
                for (index, pattern) in patterns.iter().enumerate() {
                    let item = self.tuple_item(&tuple, index)?;
                    self.bind_pattern(pattern, item)?;
                }
            }
        }
        Ok(())
    }

    /// Bind a specialization's argument tree to its function parameters.
    ///
    /// Controlled kinds take the control qubits as the first parameter;
    /// their argument tree is `(controls, inner)` and the entries of
    /// `inner` bind to the remaining parameters.
    pub(crate) fn bind_parameters(
        &mut self,
        arguments: &ArgumentTuple,
        kind: SpecializationKind,
        params: &[ValueId],
    ) -> CodegenResult<()> {
        let (entries, params) = if kind.is_controlled() {
            let [controls, inner] = arguments.entries() else {
                return Err(CodegenError::invalid_state(format!(
                    "{} specialization without a control argument",
                    kind.suffix()
                )));
            };
            let Some((&first, rest)) = params.split_first() else {
                return Err(CodegenError::invalid_state("missing control parameter"));
            };
            self.bind_entry(controls, first)?;
            (inner.entries(), rest)
        } else {
            (arguments.entries(), params)
        };
        if entries.len() != params.len() {
            return Err(CodegenError::invalid_state(format!(
                "{} argument entries for {} parameters",
                entries.len(),
                params.len()
            )));
        }
        for (entry, &param) in entries.iter().zip(params) {
            self.bind_entry(entry, param)?;
        }
        Ok(())
    }

    fn bind_entry(&mut self, entry: &ArgumentTuple, param: ValueId) -> CodegenResult<()> {
        match entry {
            ArgumentTuple::Item { name: None, .. } => {}
            ArgumentTuple::Item {
                name: Some(name),
                ty,
            } => {
                let value = self.value_from(param, ty)?;
                self.bind(name, value);
            }
            ArgumentTuple::Tuple(_) => {
                // Every name inside a tuple-typed parameter binds lazily.
                let root = self.value_from(param, &entry.ty())?;
                if let Some(root) = root.as_tuple() {
                    self.bind_nested_items(entry, root, &mut SmallVec::new());
                }
            }
        }
        Ok(())
    }

    fn bind_nested_items(
        &mut self,
        entry: &ArgumentTuple,
        root: &TupleValue,
        path: &mut SmallVec<[usize; 4]>,
    ) {
        let ArgumentTuple::Tuple(items) = entry else {
            return;
        };
        for (index, item) in items.iter().enumerate() {
            path.push(index);
            match item {
                ArgumentTuple::Item {
                    name: Some(name), ..
                } => {
                    if let Some(scope) = self.names.last_mut() {
                        scope.bind(
                            name,
                            Binding::Nested {
                                root: root.clone(),
                                path: path.clone(),
                                loaded: None,
                            },
                        );
                    }
                }
                ArgumentTuple::Item { name: None, .. } => {}
                ArgumentTuple::Tuple(_) => self.bind_nested_items(item, root, path),
            }
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests;
