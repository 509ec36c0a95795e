//! Expression lowering.
//!
//! Every expression lowers to an [`IValue`]. Values created here that own
//! a heap reference (string literals, call results, new callables,
//! composites) are registered with the current scope; identifiers and
//! items loaded from containers are borrowed.
//!
//! # Calls
//!
//! | Callee | Lowering |
//! |--------|----------|
//! | global callable, possibly under `Adjoint`/`Controlled` | direct call of the specialization |
//! | user-defined type name | call of its constructor |
//! | any other callable value | `callable_invoke` with argument and result tuples |
//!
//! # Conditional Expressions
//!
//! When both arms are literals or identifiers, both are evaluated and a
//! `select` picks one. Otherwise each arm gets its own block and scope,
//! retains its value before the scope closes, and a `phi` in the join
//! block yields a value the enclosing scope owns.

use inkwell::module::Linkage;
use inkwell::IntPredicate;
use qir_syntax::{
    BinaryOperator, CustomType, ExprKind, Pauli, QualifiedName, ResolvedType, SpecializationKind,
    TypedExpression,
};
use tracing::trace;

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::runtime::RuntimeFunction;
use crate::value_id::{BlockId, ValueId};
use crate::values::{CallableValue, IValue, SimpleValue};

mod update;

/// Where call arguments come from.
pub(crate) enum ArgumentSource<'e> {
    /// Not lowered yet; a tuple literal is lowered item by item.
    Expression(&'e TypedExpression),
    Value(IValue),
}

fn simple(value: ValueId, ty: ResolvedType) -> IValue {
    IValue::Simple(SimpleValue { value, ty })
}

/// The global callable and specialization a callee expression names
/// statically.
fn static_target(callee: &TypedExpression) -> Option<(&QualifiedName, SpecializationKind)> {
    match &callee.kind {
        ExprKind::GlobalCallable(name) => Some((name, SpecializationKind::Body)),
        ExprKind::Adjoint(inner) => static_target(inner).map(|(name, kind)| (name, kind.adjoint())),
        ExprKind::Controlled(inner) => static_target(inner)
            .filter(|(_, kind)| !kind.is_controlled())
            .map(|(name, kind)| (name, kind.controlled())),
        _ => None,
    }
}

/// Literals and identifiers: evaluating them emits no side effect the
/// other arm of a conditional could observe.
fn is_self_evaluating(expr: &TypedExpression) -> bool {
    matches!(
        expr.kind,
        ExprKind::Identifier(_)
            | ExprKind::UnitValue
            | ExprKind::IntLiteral(_)
            | ExprKind::DoubleLiteral(_)
            | ExprKind::BoolLiteral(_)
            | ExprKind::PauliLiteral(_)
            | ExprKind::ResultLiteral(_)
            | ExprKind::RangeLiteral { .. }
    )
}

/// `(x)` is `x`.
fn strip_singleton(mut expr: &TypedExpression) -> &TypedExpression {
    while let ExprKind::ValueTuple(items) = &expr.kind {
        match items.as_slice() {
            [only] => expr = only,
            _ => break,
        }
    }
    expr
}

impl GenerationContext<'_, '_> {
    pub fn lower_expression(&mut self, expr: &TypedExpression) -> CodegenResult<IValue> {
        match &expr.kind {
            ExprKind::UnitValue => Ok(self.unit()),
            ExprKind::IntLiteral(value) => {
                Ok(simple(self.builder.const_i64(*value), ResolvedType::Int))
            }
            ExprKind::DoubleLiteral(value) => {
                Ok(simple(self.builder.const_f64(*value), ResolvedType::Double))
            }
            ExprKind::BoolLiteral(value) => {
                Ok(simple(self.builder.const_bool(*value), ResolvedType::Bool))
            }
            ExprKind::StringLiteral(text) => self.string_literal(text),
            ExprKind::PauliLiteral(pauli) => self.pauli_literal(*pauli),
            ExprKind::ResultLiteral(one) => {
                let global = if *one {
                    self.globals.result_one
                } else {
                    self.globals.result_zero
                };
                let ptr = self.builder.global_value(global);
                let ptr_ty = self.builtins().ptr;
                let loaded = self.builder.load(ptr_ty, ptr, "")?;
                Ok(simple(loaded, ResolvedType::Result))
            }
            ExprKind::Identifier(name) => self.resolve(name),
            ExprKind::GlobalCallable(name) => self.callable_value(name, &expr.ty),
            ExprKind::ValueTuple(items) => {
                let values = self.lower_all(items)?;
                self.create_tuple(&expr.ty, &values)
            }
            ExprKind::ValueArray(items) => {
                let ResolvedType::Array(element) = &expr.ty else {
                    return Err(CodegenError::unsupported(format!(
                        "array literal of type '{}'",
                        expr.ty
                    )));
                };
                let values = self.lower_all(items)?;
                self.create_array(element, &values)
            }
            ExprKind::ItemAccess { base, index } => {
                let base = self.lower_expression(base)?;
                let Some(tuple) = base.as_tuple() else {
                    return Err(CodegenError::unsupported(format!(
                        "item access on '{}'",
                        base.source_type()
                    )));
                };
                self.tuple_item(tuple, *index)
            }
            ExprKind::ArrayItem { array, index } => {
                let array = self.lower_expression(array)?;
                let index = self.lower_expression(index)?;
                let (Some(array), IValue::Simple(index)) = (array.as_array(), &index) else {
                    return Err(CodegenError::unsupported(format!(
                        "indexing '{}' with '{}'",
                        array.source_type(),
                        index.source_type()
                    )));
                };
                self.array_item(array, index.value)
            }
            ExprKind::Length(array) => {
                let array = self.lower_expression(array)?;
                let Some(array) = array.as_array() else {
                    return Err(CodegenError::unsupported(format!(
                        "length of '{}'",
                        array.source_type()
                    )));
                };
                let length = self.array_length(array)?;
                Ok(simple(length, ResolvedType::Int))
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            ExprKind::Call { callee, argument } => self.lower_call(callee, argument, &expr.ty),
            ExprKind::Adjoint(inner) => {
                self.apply_functor(inner, RuntimeFunction::CallableMakeAdjoint, &expr.ty)
            }
            ExprKind::Controlled(inner) => {
                self.apply_functor(inner, RuntimeFunction::CallableMakeControlled, &expr.ty)
            }
            ExprKind::RangeLiteral { start, step, end } => {
                self.range_literal(start, step.as_deref(), end)
            }
            ExprKind::Conditional {
                condition,
                if_true,
                if_false,
            } => self.lower_conditional_expression(condition, if_true, if_false, &expr.ty),
            ExprKind::CopyAndUpdate { base, item, value } => {
                self.lower_copy_and_update(base, item, value)
            }
            ExprKind::PartialApplication { callee, argument } => {
                self.lower_partial_application(callee, argument, &expr.ty)
            }
            ExprKind::MissingArgument => Err(CodegenError::unsupported(
                "missing argument outside a partial application",
            )),
        }
    }

    fn lower_all(&mut self, items: &[TypedExpression]) -> CodegenResult<Vec<IValue>> {
        items.iter().map(|item| self.lower_expression(item)).collect()
    }

    // ── Literals ────────────────────────────────────────────────────

    fn string_literal(&mut self, text: &str) -> CodegenResult<IValue> {
        let data = self.builder.const_c_string(text);
        let data_ty = self.builder.type_of(data);
        let name = format!("str.{}", self.builder.global_count());
        let global = self
            .builder
            .add_global(&name, data_ty, Some(data), true, Linkage::Private);
        let bytes = self.builder.global_value(global);
        let handle = self.runtime_value(RuntimeFunction::StringCreate, &[bytes], "")?;
        let value = simple(handle, ResolvedType::String);
        self.register_value(&value)?;
        Ok(value)
    }

    fn pauli_literal(&mut self, pauli: Pauli) -> CodegenResult<IValue> {
        let slot = usize::try_from(pauli.encoding())
            .map_err(|_| CodegenError::invalid_state("negative Pauli encoding"))?;
        let ptr = self.builder.global_value(self.globals.paulis[slot]);
        let i2 = self.builtins().i2;
        let loaded = self.builder.load(i2, ptr, "")?;
        Ok(simple(loaded, ResolvedType::Pauli))
    }

    /// `start..step..end` as a `%Range` value; the step defaults to 1.
    fn range_literal(
        &mut self,
        start: &TypedExpression,
        step: Option<&TypedExpression>,
        end: &TypedExpression,
    ) -> CodegenResult<IValue> {
        let start = self.int_operand(start)?;
        let step = match step {
            Some(step) => self.int_operand(step)?,
            None => self.builder.const_i64(1),
        };
        let end = self.int_operand(end)?;
        let range_ty = self.builtins().range;
        let range = self.builder.build_struct(range_ty, &[start, step, end], "range")?;
        Ok(simple(range, ResolvedType::Range))
    }

    fn int_operand(&mut self, expr: &TypedExpression) -> CodegenResult<ValueId> {
        match self.lower_expression(expr)? {
            IValue::Simple(SimpleValue {
                value,
                ty: ResolvedType::Int,
            }) => Ok(value),
            other => Err(CodegenError::unsupported(format!(
                "'{}' where an Int is expected",
                other.source_type()
            ))),
        }
    }

    // ── Conditional expressions ─────────────────────────────────────

    fn lower_conditional_expression(
        &mut self,
        condition: &TypedExpression,
        if_true: &TypedExpression,
        if_false: &TypedExpression,
        ty: &ResolvedType,
    ) -> CodegenResult<IValue> {
        let flag = self.lower_condition(condition)?;
        if is_self_evaluating(if_true) && is_self_evaluating(if_false) {
            let on_true = self.lower_expression(if_true)?;
            let on_false = self.lower_expression(if_false)?;
            if ty.is_unit() {
                return Ok(self.unit());
            }
            let on_true = self.representation_value(&on_true)?;
            let on_false = self.representation_value(&on_false)?;
            let chosen = self.builder.select(flag, on_true, on_false, "")?;
            return self.value_from(chosen, ty);
        }

        let function = self.current_function()?;
        let true_bb = self.builder.append_block(function, "condTrue");
        let false_bb = self.builder.append_block(function, "condFalse");
        let join = self.builder.append_block(function, "condContinue");
        self.builder.cond_br(flag, true_bb, false_bb)?;

        self.builder.position_at_end(true_bb);
        let on_true = self.conditional_arm(if_true, join)?;
        self.builder.position_at_end(false_bb);
        let on_false = self.conditional_arm(if_false, join)?;

        self.builder.position_at_end(join);
        let (Some(on_true), Some(on_false)) = (on_true, on_false) else {
            return Ok(self.unit());
        };
        let llvm = self.representation(ty)?;
        let joined = self.builder.phi(llvm, "")?;
        self.builder.add_phi_incoming(joined, &[on_true, on_false]);
        let value = self.value_from(joined, ty)?;
        self.register_value(&value)?;
        Ok(value)
    }

    /// Lower one arm in its own scope and branch to `join`.
    ///
    /// Returns the arm's representation value and the block it leaves
    /// from; `None` for `Unit` arms.
    fn conditional_arm(
        &mut self,
        arm: &TypedExpression,
        join: BlockId,
    ) -> CodegenResult<Option<(ValueId, BlockId)>> {
        self.open_scope();
        let value = self.lower_expression(arm)?;
        let incoming = if value.is_unit() {
            None
        } else {
            let representation = self.representation_value(&value)?;
            self.increase_reference_count(&value)?;
            Some(representation)
        };
        self.close_scope()?;
        let from = self.insertion_block()?;
        self.builder.br(join)?;
        Ok(incoming.map(|representation| (representation, from)))
    }

    // ── Operators ───────────────────────────────────────────────────

    fn lower_binary(
        &mut self,
        op: BinaryOperator,
        lhs: &TypedExpression,
        rhs: &TypedExpression,
    ) -> CodegenResult<IValue> {
        use BinaryOperator as B;
        use RuntimeFunction as R;

        let left = self.lower_expression(lhs)?;
        let right = self.lower_expression(rhs)?;
        let l = self.representation_value(&left)?;
        let r = self.representation_value(&right)?;
        let unsupported =
            || CodegenError::unsupported(format!("operator {op:?} on '{}'", lhs.ty));

        match (&lhs.ty, op) {
            (ResolvedType::Int, B::Add | B::Sub | B::Mul) => {
                let value = match op {
                    B::Add => self.builder.add(l, r, "")?,
                    B::Sub => self.builder.sub(l, r, "")?,
                    _ => self.builder.mul(l, r, "")?,
                };
                Ok(simple(value, ResolvedType::Int))
            }
            (ResolvedType::Int, _) => {
                let predicate = match op {
                    B::Equals => IntPredicate::EQ,
                    B::NotEquals => IntPredicate::NE,
                    B::Less => IntPredicate::SLT,
                    B::LessOrEqual => IntPredicate::SLE,
                    B::Greater => IntPredicate::SGT,
                    B::GreaterOrEqual => IntPredicate::SGE,
                    B::Add | B::Sub | B::Mul => return Err(unsupported()),
                };
                self.compare(predicate, l, r)
            }
            (ResolvedType::Bool | ResolvedType::Pauli, B::Equals) => {
                self.compare(IntPredicate::EQ, l, r)
            }
            (ResolvedType::Bool | ResolvedType::Pauli, B::NotEquals) => {
                self.compare(IntPredicate::NE, l, r)
            }
            (ResolvedType::Result, B::Equals | B::NotEquals) => {
                self.runtime_predicate(R::ResultEqual, l, r, op == B::NotEquals)
            }
            (ResolvedType::String, B::Equals | B::NotEquals) => {
                self.runtime_predicate(R::StringEqual, l, r, op == B::NotEquals)
            }
            (ResolvedType::String, B::Add) => {
                self.owned_result(R::StringConcatenate, &[l, r], ResolvedType::String)
            }
            (ResolvedType::BigInt, B::Add | B::Sub | B::Mul) => {
                let function = match op {
                    B::Add => R::BigIntAdd,
                    B::Sub => R::BigIntSubtract,
                    _ => R::BigIntMultiply,
                };
                self.owned_result(function, &[l, r], ResolvedType::BigInt)
            }
            (ResolvedType::BigInt, _) => match op {
                B::Equals | B::NotEquals => {
                    self.runtime_predicate(R::BigIntEqual, l, r, op == B::NotEquals)
                }
                B::Greater => self.runtime_predicate(R::BigIntGreater, l, r, false),
                B::GreaterOrEqual => self.runtime_predicate(R::BigIntGreaterEq, l, r, false),
                B::Less => self.runtime_predicate(R::BigIntGreater, r, l, false),
                B::LessOrEqual => self.runtime_predicate(R::BigIntGreaterEq, r, l, false),
                B::Add | B::Sub | B::Mul => Err(unsupported()),
            },
            (ResolvedType::Array(_), B::Add) => {
                let handle = self.runtime_value(R::ArrayConcatenate, &[l, r], "")?;
                let value = self.value_from(handle, &lhs.ty)?;
                self.register_value(&value)?;
                if let Some(array) = value.as_array() {
                    self.retain_array_items(array)?;
                }
                Ok(value)
            }
            _ => Err(unsupported()),
        }
    }

    fn compare(&mut self, predicate: IntPredicate, l: ValueId, r: ValueId) -> CodegenResult<IValue> {
        let flag = self.builder.icmp(predicate, l, r, "")?;
        Ok(simple(flag, ResolvedType::Bool))
    }

    /// A runtime predicate call, negated with `icmp eq %r, false` when
    /// `negate` is set.
    fn runtime_predicate(
        &mut self,
        function: RuntimeFunction,
        l: ValueId,
        r: ValueId,
        negate: bool,
    ) -> CodegenResult<IValue> {
        let flag = self.runtime_value(function, &[l, r], "")?;
        if !negate {
            return Ok(simple(flag, ResolvedType::Bool));
        }
        let no = self.builder.const_bool(false);
        self.compare(IntPredicate::EQ, flag, no)
    }

    /// A runtime call returning a fresh heap value the current scope owns.
    fn owned_result(
        &mut self,
        function: RuntimeFunction,
        args: &[ValueId],
        ty: ResolvedType,
    ) -> CodegenResult<IValue> {
        let handle = self.runtime_value(function, args, "")?;
        let value = simple(handle, ty);
        self.register_value(&value)?;
        Ok(value)
    }

    // ── Callable values ─────────────────────────────────────────────

    /// A new callable for a global, backed by its dispatch table.
    fn callable_value(&mut self, name: &QualifiedName, ty: &ResolvedType) -> CodegenResult<IValue> {
        if self.compilation.custom_type(name).is_some() {
            return Err(CodegenError::unsupported(format!(
                "constructor of '{name}' used as a value"
            )));
        }
        let callable = self.lookup_callable(name)?;
        let table = self.ensure_wrapper_for(callable)?;
        let table = self.builder.global_value(table);
        let memory = self.builder.const_null_ptr();
        let capture = self.unit_handle();
        let handle = self.runtime_value(
            RuntimeFunction::CallableCreate,
            &[table, memory, capture],
            "",
        )?;
        let value = IValue::Callable(CallableValue {
            value: handle,
            ty: ty.clone(),
        });
        self.register_value(&value)?;
        Ok(value)
    }

    /// Copy a callable value and apply a functor to the copy.
    fn apply_functor(
        &mut self,
        inner: &TypedExpression,
        functor: RuntimeFunction,
        ty: &ResolvedType,
    ) -> CodegenResult<IValue> {
        let inner = self.lower_expression(inner)?;
        let IValue::Callable(callable) = &inner else {
            return Err(CodegenError::unsupported(format!(
                "functor applied to '{}'",
                inner.source_type()
            )));
        };
        let force = self.builder.const_bool(true);
        let copy = self.runtime_value(RuntimeFunction::CallableCopy, &[callable.value, force], "")?;
        self.call_runtime(functor, &[copy])?;
        let value = IValue::Callable(CallableValue {
            value: copy,
            ty: ty.clone(),
        });
        self.register_value(&value)?;
        Ok(value)
    }

    // ── Calls ───────────────────────────────────────────────────────

    fn lower_call(
        &mut self,
        callee: &TypedExpression,
        argument: &TypedExpression,
        output: &ResolvedType,
    ) -> CodegenResult<IValue> {
        if let Some((name, kind)) = static_target(callee) {
            let compilation = self.compilation;
            if let Some(custom) = compilation.custom_type(name) {
                if kind == SpecializationKind::Body {
                    return self.call_constructor(custom, argument);
                }
            }
            let callable = self.lookup_callable(name)?;
            if callable.specialization(kind).is_none() {
                return Err(CodegenError::unresolved(
                    "specialization",
                    format!("{name} ({})", kind.suffix()),
                ));
            }
            trace!(%name, kind = kind.suffix(), "direct call");
            let function = self.declare_specialization(callable, kind)?;
            let entries = callable.arguments.entries().len();
            let mut args = Vec::with_capacity(entries + 1);
            let source = if kind.is_controlled() {
                let (controls, inner) = self.split_controlled(argument)?;
                args.push(self.representation_value(&controls)?);
                inner
            } else {
                ArgumentSource::Expression(argument)
            };
            args.extend(self.lower_arguments(entries, source)?);
            let result = self.builder.call(function, &args, "")?;
            return self.call_result(result, &callable.signature.output);
        }
        self.invoke_callable_value(callee, argument, output)
    }

    fn call_constructor(
        &mut self,
        custom: &CustomType,
        argument: &TypedExpression,
    ) -> CodegenResult<IValue> {
        let function = self.declare_constructor(custom)?;
        let args = self.lower_arguments(custom.items().len(), ArgumentSource::Expression(argument))?;
        let result = self.builder.call(function, &args, "")?;
        self.call_result(result, &ResolvedType::UserDefined(custom.name.clone()))
    }

    /// Control qubits and the remaining argument of a controlled call.
    fn split_controlled<'e>(
        &mut self,
        argument: &'e TypedExpression,
    ) -> CodegenResult<(IValue, ArgumentSource<'e>)> {
        if let ExprKind::ValueTuple(items) = &argument.kind {
            if let [controls, inner] = items.as_slice() {
                let controls = self.lower_expression(controls)?;
                return Ok((controls, ArgumentSource::Expression(inner)));
            }
        }
        let value = self.lower_expression(argument)?;
        let Some(tuple) = value.as_tuple() else {
            return Err(CodegenError::unsupported(format!(
                "controlled call with a '{}' argument",
                value.source_type()
            )));
        };
        let controls = self.tuple_item(tuple, 0)?;
        let inner = self.tuple_item(tuple, 1)?;
        Ok((controls, ArgumentSource::Value(inner)))
    }

    /// Target values for a callee with `entries` top-level parameters.
    ///
    /// A single parameter takes the argument whole; several take the
    /// items of the argument tuple.
    pub(crate) fn lower_arguments(
        &mut self,
        entries: usize,
        source: ArgumentSource<'_>,
    ) -> CodegenResult<Vec<ValueId>> {
        match (entries, source) {
            (0, ArgumentSource::Expression(expr)) => {
                self.lower_expression(expr)?;
                Ok(Vec::new())
            }
            (0, ArgumentSource::Value(_)) => Ok(Vec::new()),
            (1, ArgumentSource::Expression(expr)) => {
                let value = self.lower_expression(strip_singleton(expr))?;
                Ok(vec![self.representation_value(&value)?])
            }
            (1, ArgumentSource::Value(value)) => Ok(vec![self.representation_value(&value)?]),
            (count, ArgumentSource::Expression(expr)) => match &expr.kind {
                ExprKind::ValueTuple(items) if items.len() == count => {
                    let mut args = Vec::with_capacity(count);
                    for item in items {
                        let value = self.lower_expression(item)?;
                        args.push(self.representation_value(&value)?);
                    }
                    Ok(args)
                }
                _ => {
                    let value = self.lower_expression(expr)?;
                    self.tuple_arguments(count, &value)
                }
            },
            (count, ArgumentSource::Value(value)) => self.tuple_arguments(count, &value),
        }
    }

    fn tuple_arguments(&mut self, count: usize, value: &IValue) -> CodegenResult<Vec<ValueId>> {
        let Some(tuple) = value.as_tuple() else {
            return Err(CodegenError::unsupported(format!(
                "'{}' passed to {count} parameters",
                value.source_type()
            )));
        };
        if tuple.items().len() != count {
            return Err(CodegenError::invalid_state(format!(
                "{}-tuple passed to {count} parameters",
                tuple.items().len()
            )));
        }
        let mut args = Vec::with_capacity(count);
        for index in 0..count {
            let item = self.tuple_item(tuple, index)?;
            args.push(self.representation_value(&item)?);
        }
        Ok(args)
    }

    /// Wrap a call's result; heap results are owned by the current scope.
    pub(crate) fn call_result(
        &mut self,
        result: Option<ValueId>,
        output: &ResolvedType,
    ) -> CodegenResult<IValue> {
        if output.is_unit() {
            return Ok(self.unit());
        }
        let Some(result) = result else {
            return Err(CodegenError::invalid_state(format!(
                "call returning '{output}' produced no value"
            )));
        };
        let value = self.value_from(result, output)?;
        self.register_value(&value)?;
        Ok(value)
    }

    /// Call through a callable value with `callable_invoke`.
    ///
    /// The argument tuple holds the items of the argument type (a
    /// non-tuple argument is wrapped in a 1-tuple). The result tuple is
    /// allocated here, holds the items of the output type, and is owned
    /// by the current scope.
    fn invoke_callable_value(
        &mut self,
        callee: &TypedExpression,
        argument: &TypedExpression,
        output: &ResolvedType,
    ) -> CodegenResult<IValue> {
        let Some((argument_ty, _)) = callee.ty.callable_parts() else {
            return Err(CodegenError::unsupported(format!("calling a '{}'", callee.ty)));
        };
        let target = self.lower_expression(callee)?;
        let IValue::Callable(CallableValue { value: handle, .. }) = &target else {
            return Err(CodegenError::unsupported(format!(
                "calling a '{}' value",
                target.source_type()
            )));
        };
        let handle = *handle;
        let argument = self.lower_expression(argument)?;
        let argument_tuple = self.argument_tuple(&argument, argument_ty)?;

        let layout = match output {
            ResolvedType::Tuple(_) | ResolvedType::UserDefined(_) | ResolvedType::Unit => {
                output.clone()
            }
            other => ResolvedType::Tuple(vec![other.clone()]),
        };
        let holder = self.unallocated_tuple(&layout)?;
        let result_tuple = match holder.as_tuple() {
            Some(tuple) if !holder.is_unit() => self.opaque_pointer(tuple)?,
            _ => self.unit_handle(),
        };
        self.call_runtime(
            RuntimeFunction::CallableInvoke,
            &[handle, argument_tuple, result_tuple],
        )?;

        if layout == *output {
            return Ok(holder);
        }
        let Some(tuple) = holder.as_tuple() else {
            return Err(CodegenError::invalid_state("result holder is not a tuple"));
        };
        self.tuple_item(tuple, 0)
    }

    /// The tuple handle passed as the argument of `callable_invoke`.
    pub(crate) fn argument_tuple(&mut self, value: &IValue, ty: &ResolvedType) -> CodegenResult<ValueId> {
        match ty {
            ResolvedType::Unit => Ok(self.unit_handle()),
            ResolvedType::Tuple(_) => {
                let Some(tuple) = value.as_tuple() else {
                    return Err(CodegenError::invalid_state(format!(
                        "'{}' value for a tuple argument",
                        value.source_type()
                    )));
                };
                self.opaque_pointer(tuple)
            }
            other => {
                let wrapped =
                    self.create_tuple(&ResolvedType::Tuple(vec![other.clone()]), &[value.clone()])?;
                let Some(tuple) = wrapped.as_tuple() else {
                    return Err(CodegenError::invalid_state("argument wrapper is not a tuple"));
                };
                self.opaque_pointer(tuple)
            }
        }
    }
}
