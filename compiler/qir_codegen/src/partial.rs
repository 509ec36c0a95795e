//! Partial application.
//!
//! `f(a, _, (b, _))` becomes a new callable value over the missing items.
//! Its capture tuple holds `f` followed by every captured item in argument
//! order, and a [`PartialArgument`] template records where each item of
//! `f`'s argument comes from. Every specialization kind the result
//! supports gets a lifted wrapper that rebuilds the full argument from the
//! capture and the remaining arguments, applies the kind's functors to a
//! copy of `f`, and calls it through `callable_invoke`.
//!
//! The capture belongs to the new callable. Its type gets a
//! memory-management table `[RefCount, null]`; the runtime calls
//! `RefCount(capture, change)` whenever the callable's count changes, and
//! the function applies one reference step in the direction of `change`.

use inkwell::module::Linkage;
use inkwell::IntPredicate;
use qir_syntax::{Characteristics, ExprKind, ResolvedType, SpecializationKind, TypedExpression};
use tracing::{debug, trace};

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::naming::{lifted_table_name, lifted_wrapper_name, ref_count_name};
use crate::runtime::RuntimeFunction;
use crate::value_id::{FunctionId, GlobalId, ValueId};
use crate::values::{CallableValue, IValue, TupleValue};

/// Where one item of the inner callable's argument comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum PartialArgument {
    /// Item `n` of the remaining arguments.
    Missing(usize),
    /// Item `n` of the capture tuple.
    Captured(usize),
    /// A tuple of type `ty` assembled from `items`.
    Tuple(ResolvedType, Vec<PartialArgument>),
}

impl PartialArgument {
    /// Template for `argument` at type `ty`, collecting the types of the
    /// missing items and the captured expressions in argument order.
    ///
    /// Captured indices start at 1; item 0 of the capture is the callee.
    pub fn build<'e>(
        ty: &ResolvedType,
        argument: &'e TypedExpression,
        remaining: &mut Vec<ResolvedType>,
        captured: &mut Vec<&'e TypedExpression>,
    ) -> Self {
        match (&argument.kind, ty) {
            (ExprKind::MissingArgument, _) => {
                remaining.push(ty.clone());
                Self::Missing(remaining.len() - 1)
            }
            (ExprKind::ValueTuple(items), ResolvedType::Tuple(types))
                if items.len() == types.len() && argument.has_missing_items() =>
            {
                let items = types
                    .iter()
                    .zip(items)
                    .map(|(ty, item)| Self::build(ty, item, remaining, captured))
                    .collect();
                Self::Tuple(ty.clone(), items)
            }
            _ => {
                captured.push(argument);
                Self::Captured(captured.len())
            }
        }
    }
}

/// A queued lifted wrapper.
#[derive(Clone, Debug)]
pub struct LiftedWrapper {
    pub function: FunctionId,
    pub kind: SpecializationKind,
    /// `(callee type, captured item types..)`.
    pub capture: ResolvedType,
    /// Argument type of the partial application's result.
    pub argument: ResolvedType,
    /// Number of missing items.
    pub remaining: usize,
    /// Argument type of the callee.
    pub inner: ResolvedType,
    pub template: PartialArgument,
}

/// A queued capture count function.
#[derive(Clone, Debug)]
pub struct CountFunction {
    pub function: FunctionId,
    pub capture: ResolvedType,
}

/// Kinds a callable value of type `ty` can be invoked as.
fn supported_kinds(ty: &ResolvedType) -> Vec<SpecializationKind> {
    let characteristics = match ty {
        ResolvedType::Operation {
            characteristics, ..
        } => *characteristics,
        _ => Characteristics::empty(),
    };
    SpecializationKind::ALL
        .into_iter()
        .filter(|kind| match kind {
            SpecializationKind::Body => true,
            SpecializationKind::Adjoint => characteristics.contains(Characteristics::ADJOINTABLE),
            SpecializationKind::Controlled => {
                characteristics.contains(Characteristics::CONTROLLABLE)
            }
            SpecializationKind::ControlledAdjoint => characteristics.contains(
                Characteristics::ADJOINTABLE | Characteristics::CONTROLLABLE,
            ),
        })
        .collect()
}

impl GenerationContext<'_, '_> {
    /// A new callable over the missing items of `argument`.
    pub(crate) fn lower_partial_application(
        &mut self,
        callee: &TypedExpression,
        argument: &TypedExpression,
        ty: &ResolvedType,
    ) -> CodegenResult<IValue> {
        let (Some((inner, _)), Some((partial, _))) = (callee.ty.callable_parts(), ty.callable_parts())
        else {
            return Err(CodegenError::unsupported(format!(
                "partial application of a '{}'",
                callee.ty
            )));
        };
        let mut remaining = Vec::new();
        let mut captured = Vec::new();
        let template = PartialArgument::build(inner, argument, &mut remaining, &mut captured);

        let mut types = Vec::with_capacity(captured.len() + 1);
        let mut values = Vec::with_capacity(captured.len() + 1);
        types.push(callee.ty.clone());
        values.push(self.lower_expression(callee)?);
        for expr in &captured {
            types.push(expr.ty.clone());
            values.push(self.lower_expression(expr)?);
        }
        let capture_ty = ResolvedType::Tuple(types);
        let capture = self.create_tuple(&capture_ty, &values)?;
        let Some(capture_tuple) = capture.as_tuple() else {
            return Err(CodegenError::invalid_state("capture is not a tuple"));
        };
        let capture_handle = self.opaque_pointer(capture_tuple)?;
        // The callable releases the capture through its memory table.
        self.scopes.forget(capture_handle);

        let name = self.wrappers.unique_name("PartialApplication");
        trace!(%name, captured = captured.len(), missing = remaining.len(), "partial application");
        let mut slots = Vec::with_capacity(SpecializationKind::ALL.len());
        let kinds = supported_kinds(&callee.ty);
        for kind in SpecializationKind::ALL {
            if !kinds.contains(&kind) {
                slots.push(None);
                continue;
            }
            let function = self.declare_wrapper(&lifted_wrapper_name(&name, kind))?;
            self.wrappers.lifted.push_back(LiftedWrapper {
                function,
                kind,
                capture: capture_ty.clone(),
                argument: partial.clone(),
                remaining: remaining.len(),
                inner: inner.clone(),
                template: template.clone(),
            });
            slots.push(Some(function));
        }
        let table = self.add_table(&lifted_table_name(&name), &slots)?;
        let memory = self.memory_table(&capture_ty)?;

        let table = self.builder.global_value(table);
        let memory = self.builder.global_value(memory);
        let handle = self.runtime_value(
            RuntimeFunction::CallableCreate,
            &[table, memory, capture_handle],
            "",
        )?;
        let value = IValue::Callable(CallableValue {
            value: handle,
            ty: ty.clone(),
        });
        self.register_value(&value)?;
        Ok(value)
    }

    /// The memory-management table of captures of type `capture`,
    /// created and queued on first use.
    fn memory_table(&mut self, capture: &ResolvedType) -> CodegenResult<GlobalId> {
        if let Some(&table) = self.wrappers.memory_tables.get(capture) {
            return Ok(table);
        }
        let name = self.wrappers.unique_name("MemoryManagement");
        let b = self.builtins();
        let function =
            self.builder
                .get_or_declare_function(&ref_count_name(&name), &[b.ptr, b.i32], None)?;
        let slots = [
            self.builder.function_value(function),
            self.builder.const_null_ptr(),
        ];
        let init = self.builder.const_ptr_array(&slots)?;
        let table_ty = self.builder.ptr_array_type(2);
        let table = self.builder.add_global(
            &lifted_table_name(&name),
            table_ty,
            Some(init),
            true,
            Linkage::Internal,
        );
        self.wrappers.memory_tables.insert(capture.clone(), table);
        self.wrappers.counts.push_back(CountFunction {
            function,
            capture: capture.clone(),
        });
        Ok(table)
    }

    /// Body of a lifted wrapper: rebuild the inner argument and invoke the
    /// captured callee.
    pub(crate) fn generate_lifted_wrapper(&mut self, lifted: &LiftedWrapper) -> CodegenResult<()> {
        debug!(
            wrapper = %self.builder.function_name(lifted.function),
            "generating lifted wrapper"
        );
        let (capture, args, result) = self.enter_wrapper(lifted.function)?;
        let capture = self.argument_record(capture, &lifted.capture)?;
        let callee = self.tuple_item(&capture, 0)?;
        let IValue::Callable(callee) = callee else {
            return Err(CodegenError::invalid_state("capture does not start with a callable"));
        };
        let target = self.functored(&callee, lifted.kind)?;

        let argument = if lifted.kind.is_controlled() {
            let layout = ResolvedType::Tuple(vec![
                ResolvedType::array(ResolvedType::Qubit),
                lifted.argument.clone(),
            ]);
            let packed = self.argument_record(args, &layout)?;
            let controls = self.tuple_item(&packed, 0)?;
            let rest = self.tuple_item(&packed, 1)?;
            let missing = self.remaining_items(rest, lifted.remaining)?;
            let inner = self.rebuild_argument(&lifted.template, &capture, &missing)?;
            let layout = ResolvedType::Tuple(vec![
                ResolvedType::array(ResolvedType::Qubit),
                lifted.inner.clone(),
            ]);
            let full = self.create_tuple(&layout, &[controls, inner])?;
            let Some(full) = full.as_tuple() else {
                return Err(CodegenError::invalid_state("controlled argument is not a tuple"));
            };
            self.opaque_pointer(full)?
        } else {
            let given = match &lifted.argument {
                ResolvedType::Unit => self.unit(),
                ResolvedType::Tuple(_) => IValue::Tuple(self.argument_record(args, &lifted.argument)?),
                other => {
                    let layout = ResolvedType::Tuple(vec![other.clone()]);
                    let packed = self.argument_record(args, &layout)?;
                    self.tuple_item(&packed, 0)?
                }
            };
            let missing = self.remaining_items(given, lifted.remaining)?;
            let inner = self.rebuild_argument(&lifted.template, &capture, &missing)?;
            self.argument_tuple(&inner, &lifted.inner)?
        };

        self.call_runtime(RuntimeFunction::CallableInvoke, &[target, argument, result])?;
        self.leave_wrapper()
    }

    /// The callee, or a registered copy of it with the functors of `kind`
    /// applied.
    fn functored(
        &mut self,
        callee: &CallableValue,
        kind: SpecializationKind,
    ) -> CodegenResult<ValueId> {
        if kind == SpecializationKind::Body {
            return Ok(callee.value);
        }
        let force = self.builder.const_bool(true);
        let copy = self.runtime_value(RuntimeFunction::CallableCopy, &[callee.value, force], "")?;
        if matches!(
            kind,
            SpecializationKind::Adjoint | SpecializationKind::ControlledAdjoint
        ) {
            self.call_runtime(RuntimeFunction::CallableMakeAdjoint, &[copy])?;
        }
        if kind.is_controlled() {
            self.call_runtime(RuntimeFunction::CallableMakeControlled, &[copy])?;
        }
        self.register_value(&IValue::Callable(CallableValue {
            value: copy,
            ty: callee.ty.clone(),
        }))?;
        Ok(copy)
    }

    /// The missing items a partial application was called with.
    ///
    /// A single missing item is the whole argument; several are its items.
    fn remaining_items(&mut self, given: IValue, count: usize) -> CodegenResult<Vec<IValue>> {
        match count {
            0 => Ok(Vec::new()),
            1 => Ok(vec![given]),
            _ => {
                let Some(tuple) = given.as_tuple() else {
                    return Err(CodegenError::invalid_state(format!(
                        "{count} missing items in a '{}'",
                        given.source_type()
                    )));
                };
                (0..count).map(|index| self.tuple_item(tuple, index)).collect()
            }
        }
    }

    fn rebuild_argument(
        &mut self,
        template: &PartialArgument,
        capture: &TupleValue,
        missing: &[IValue],
    ) -> CodegenResult<IValue> {
        match template {
            PartialArgument::Missing(index) => missing.get(*index).cloned().ok_or_else(|| {
                CodegenError::invalid_state(format!("missing item {index} not supplied"))
            }),
            PartialArgument::Captured(index) => self.tuple_item(capture, *index),
            PartialArgument::Tuple(ty, items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.rebuild_argument(item, capture, missing)?);
                }
                self.create_tuple(ty, &values)
            }
        }
    }

    /// Body of a capture count function: one deep reference step up when
    /// `change` is positive, otherwise one step down.
    pub(crate) fn generate_count_function(&mut self, count: &CountFunction) -> CodegenResult<()> {
        let function = count.function;
        if !self.builder.is_declaration(function) {
            return Err(CodegenError::invalid_state(format!(
                "'{}' generated twice",
                self.builder.function_name(function)
            )));
        }
        debug!(function = %self.builder.function_name(function), "generating count function");
        self.builder.set_param_name(function, 0, "capture-tuple");
        self.builder.set_param_name(function, 1, "count-change");
        let entry = self.builder.append_block(function, "entry");
        let grow = self.builder.append_block(function, "increase");
        let shrink = self.builder.append_block(function, "decrease");
        let done = self.builder.append_block(function, "done");
        self.builder.position_at_end(entry);
        self.scopes.reset();

        let params = self.builder.function_params(function);
        let [capture, change] = params[..] else {
            return Err(CodegenError::invalid_state(format!(
                "count function with {} parameters",
                params.len()
            )));
        };
        let capture = self.value_from(capture, &count.capture)?;
        let zero = self.builder.const_i32(0);
        let grows = self.builder.icmp(IntPredicate::SGT, change, zero, "")?;
        self.builder.cond_br(grows, grow, shrink)?;

        self.builder.position_at_end(grow);
        self.increase_reference_count(&capture)?;
        self.builder.br(done)?;
        self.builder.position_at_end(shrink);
        self.decrease_reference_count(&capture)?;
        self.builder.br(done)?;

        self.builder.position_at_end(done);
        self.builder.ret_void()?;
        self.builder.clear_position();
        Ok(())
    }
}
