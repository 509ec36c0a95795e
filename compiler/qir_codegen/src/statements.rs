//! Statement lowering.
//!
//! Each nested block gets a child naming scope and its own reference
//! scope. Lowering of a block stops at the first statement after the
//! current block has been terminated.
//!
//! # Loops
//!
//! | Statement | Blocks |
//! |-----------|--------|
//! | `for` | `header` (index phi and test), `body`, `exit` |
//! | `while` | `while` (condition), `do`, `wend` |
//! | `repeat` | `repeat`, `until`, `fixup`, `rend` |
//!
//! Every iteration releases what it created before branching back.

use inkwell::IntPredicate;
use qir_syntax::{QubitInitializer, ResolvedType, Statement, SymbolTuple, TypedExpression};
use tracing::trace;

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::runtime::RuntimeFunction;
use crate::value_id::{BlockId, FunctionId, ValueId};
use crate::values::{ArrayValue, IValue, SimpleValue, TupleValue};

impl GenerationContext<'_, '_> {
    /// Lower `statements` into the current block, in order.
    pub(crate) fn lower_block(&mut self, statements: &[Statement]) -> CodegenResult<()> {
        for (index, statement) in statements.iter().enumerate() {
            if self.builder.is_terminated() {
                trace!(skipped = statements.len() - index, "dropping unreachable statements");
                break;
            }
            self.lower_statement(statement)?;
        }
        Ok(())
    }

    fn lower_statement(&mut self, statement: &Statement) -> CodegenResult<()> {
        match statement {
            Statement::Let { pattern, value } => {
                let value = self.lower_expression(value)?;
                self.bind_pattern(pattern, value)
            }
            Statement::Mutable { pattern, value } => {
                let value = self.lower_expression(value)?;
                self.declare_mutable(pattern, &value)
            }
            Statement::Set { pattern, value } => {
                let value = self.lower_expression(value)?;
                self.assign(pattern, &value)
            }
            Statement::Expression(expression) => {
                self.lower_expression(expression)?;
                Ok(())
            }
            Statement::Return(value) => self.lower_return(value),
            Statement::Fail(message) => self.lower_fail(message),
            Statement::Conditional {
                condition,
                then_block,
                else_block,
            } => self.lower_conditional(condition, then_block, else_block.as_deref()),
            Statement::For {
                pattern,
                iterable,
                body,
            } => self.lower_for(pattern, iterable, body),
            Statement::While { condition, body } => self.lower_while(condition, body),
            Statement::Repeat { body, until, fixup } => self.lower_repeat(body, until, fixup),
            Statement::QubitScope {
                pattern,
                initializer,
                body,
            } => {
                self.push_names();
                self.open_scope();
                let qubits = self.allocate_qubits(initializer)?;
                self.bind_pattern(pattern, qubits)?;
                self.lower_block(body)?;
                self.close_scope()?;
                self.pop_names();
                Ok(())
            }
        }
    }

    // ── Mutable variables ───────────────────────────────────────────

    /// Give every name in `pattern` a stack slot holding its part of
    /// `value`.
    ///
    /// The slot holds its own reference; the current scope drops whatever
    /// the slot holds when it closes.
    fn declare_mutable(&mut self, pattern: &SymbolTuple, value: &IValue) -> CodegenResult<()> {
        match pattern {
            SymbolTuple::Discarded => Ok(()),
            SymbolTuple::Variable(name) => {
                let function = self.current_function()?;
                let ty = value.source_type().clone();
                let llvm = self.representation(&ty)?;
                let slot = self.builder.create_entry_alloca(function, name, llvm)?;
                let stored = self.representation_value(value)?;
                self.builder.store(stored, slot)?;
                self.increase_reference_count(value)?;
                self.register_slot(slot, &ty, llvm)?;
                self.bind_mutable(name, slot, &ty, llvm);
                Ok(())
            }
            SymbolTuple::Tuple(patterns) => {
                let tuple = self.destructured(value, patterns.len())?;
                for (index, pattern) in patterns.iter().enumerate() {
                    let item = self.tuple_item(&tuple, index)?;
                    self.declare_mutable(pattern, &item)?;
                }
                Ok(())
            }
        }
    }

    /// `set pattern = value`: the new value gains a reference before the
    /// old one loses its own, so assigning a variable to itself is safe.
    fn assign(&mut self, pattern: &SymbolTuple, value: &IValue) -> CodegenResult<()> {
        match pattern {
            SymbolTuple::Discarded => Ok(()),
            SymbolTuple::Variable(name) => {
                let (slot, ty, llvm) = self.mutable_slot(name)?;
                let previous = self.builder.load(llvm, slot, "")?;
                let previous = self.value_from(previous, &ty)?;
                self.increase_reference_count(value)?;
                let stored = self.representation_value(value)?;
                self.builder.store(stored, slot)?;
                self.decrease_reference_count(&previous)
            }
            SymbolTuple::Tuple(patterns) => {
                let tuple = self.destructured(value, patterns.len())?;
                let mut items = Vec::with_capacity(patterns.len());
                for index in 0..patterns.len() {
                    items.push(self.tuple_item(&tuple, index)?);
                }
                for (pattern, item) in patterns.iter().zip(&items) {
                    self.assign(pattern, item)?;
                }
                Ok(())
            }
        }
    }

    fn destructured(&self, value: &IValue, arity: usize) -> CodegenResult<TupleValue> {
        match value.as_tuple() {
            Some(tuple) if tuple.items().len() == arity => Ok(tuple.clone()),
            _ => Err(CodegenError::unsupported(format!(
                "destructuring a '{}' into {arity} names",
                value.source_type()
            ))),
        }
    }

    // ── Exits ───────────────────────────────────────────────────────

    /// Release everything the function owns, keeping the returned value
    /// alive for the caller, then `ret`.
    fn lower_return(&mut self, value: &TypedExpression) -> CodegenResult<()> {
        let output = self.current_output()?;
        let returned = self.lower_expression(value)?;
        if output.is_unit() {
            self.release_for_return(None)?;
            self.builder.ret_void()?;
            return Ok(());
        }
        let handle = self.representation_value(&returned)?;
        self.release_for_return(Some(&returned))?;
        self.builder.ret(handle)?;
        Ok(())
    }

    fn lower_fail(&mut self, message: &TypedExpression) -> CodegenResult<()> {
        let message = self.lower_expression(message)?;
        let IValue::Simple(SimpleValue {
            value,
            ty: ResolvedType::String,
        }) = &message
        else {
            return Err(CodegenError::unsupported(format!(
                "fail with a '{}' message",
                message.source_type()
            )));
        };
        self.call_runtime(RuntimeFunction::Fail, &[*value])?;
        self.builder.unreachable()?;
        Ok(())
    }

    // ── Branches ────────────────────────────────────────────────────

    /// Lower `condition` to an `i1`.
    pub(crate) fn lower_condition(&mut self, condition: &TypedExpression) -> CodegenResult<ValueId> {
        let value = self.lower_expression(condition)?;
        match value {
            IValue::Simple(SimpleValue {
                value,
                ty: ResolvedType::Bool,
            }) => Ok(value),
            other => Err(CodegenError::unsupported(format!(
                "condition of type '{}'",
                other.source_type()
            ))),
        }
    }

    fn lower_conditional(
        &mut self,
        condition: &TypedExpression,
        then_block: &[Statement],
        else_block: Option<&[Statement]>,
    ) -> CodegenResult<()> {
        let flag = self.lower_condition(condition)?;
        let function = self.current_function()?;
        let then_bb = self.builder.append_block(function, "then");
        let else_bb = else_block.map(|_| self.builder.append_block(function, "else"));
        let mut join: Option<BlockId> = None;
        let false_target = match else_bb {
            Some(block) => block,
            None => *join.insert(self.builder.append_block(function, "continue")),
        };
        self.builder.cond_br(flag, then_bb, false_target)?;

        self.builder.position_at_end(then_bb);
        if self.lower_nested_block(then_block)? {
            let target = self.join_block(&mut join, function);
            self.builder.br(target)?;
        }
        if let (Some(block), Some(statements)) = (else_bb, else_block) {
            self.builder.position_at_end(block);
            if self.lower_nested_block(statements)? {
                let target = self.join_block(&mut join, function);
                self.builder.br(target)?;
            }
        }

        match join {
            Some(block) => self.builder.position_at_end(block),
            None => trace!("both branches leave the function"),
        }
        Ok(())
    }

    fn join_block(&mut self, join: &mut Option<BlockId>, function: FunctionId) -> BlockId {
        *join.get_or_insert_with(|| self.builder.append_block(function, "continue"))
    }

    /// Lower a block in its own scopes; true if control falls out of it.
    fn lower_nested_block(&mut self, statements: &[Statement]) -> CodegenResult<bool> {
        self.push_names();
        self.open_scope();
        self.lower_block(statements)?;
        self.close_scope()?;
        self.pop_names();
        Ok(!self.builder.is_terminated())
    }

    pub(crate) fn insertion_block(&self) -> CodegenResult<BlockId> {
        self.builder
            .current_block()
            .ok_or_else(|| CodegenError::invalid_state("no insertion block"))
    }

    // ── Loops ───────────────────────────────────────────────────────

    /// `for pattern in iterable { body }` over a `Range` or an array.
    ///
    /// The iterable is evaluated once, before the loop. Array items are
    /// borrowed from the array for the iteration.
    fn lower_for(
        &mut self,
        pattern: &SymbolTuple,
        iterable: &TypedExpression,
        body: &[Statement],
    ) -> CodegenResult<()> {
        let iterable = self.lower_expression(iterable)?;
        match &iterable {
            IValue::Simple(SimpleValue {
                value: range,
                ty: ResolvedType::Range,
            }) => {
                let SymbolTuple::Variable(_) | SymbolTuple::Discarded = pattern else {
                    return Err(CodegenError::unsupported("destructuring a range item"));
                };
                let start = self.builder.extract_value(*range, 0, "start")?;
                let step = self.builder.extract_value(*range, 1, "step")?;
                let end = self.builder.extract_value(*range, 2, "end")?;
                let zero = self.builder.const_i64(0);
                let ascending = self.builder.icmp(IntPredicate::SGT, step, zero, "")?;
                self.counted_loop(
                    start,
                    step,
                    |context, index| {
                        let below = context.builder.icmp(IntPredicate::SLE, index, end, "")?;
                        let above = context.builder.icmp(IntPredicate::SGE, index, end, "")?;
                        context.builder.select(ascending, below, above, "")
                    },
                    |context, index| {
                        let item = context.value_from(index, &ResolvedType::Int)?;
                        context.bind_pattern(pattern, item)?;
                        context.lower_block(body)
                    },
                )
            }
            IValue::Array(array) => {
                let length = self.array_length(array)?;
                let start = self.builder.const_i64(0);
                let step = self.builder.const_i64(1);
                self.counted_loop(
                    start,
                    step,
                    |context, index| context.builder.icmp(IntPredicate::SLT, index, length, ""),
                    |context, index| {
                        let item = context.array_item(array, index)?;
                        context.bind_pattern(pattern, item)?;
                        context.lower_block(body)
                    },
                )
            }
            other => Err(CodegenError::unsupported(format!(
                "iterating over '{}'",
                other.source_type()
            ))),
        }
    }

    /// An `i64` induction loop from `start` by `step` while `test` holds.
    ///
    /// `body` runs in fresh scopes with the builder in the loop body.
    fn counted_loop(
        &mut self,
        start: ValueId,
        step: ValueId,
        test: impl FnOnce(&mut Self, ValueId) -> CodegenResult<ValueId>,
        body: impl FnOnce(&mut Self, ValueId) -> CodegenResult<()>,
    ) -> CodegenResult<()> {
        let function = self.current_function()?;
        let preheader = self.insertion_block()?;
        let header = self.builder.append_block(function, "header");
        let body_bb = self.builder.append_block(function, "body");
        let exit = self.builder.append_block(function, "exit");
        self.builder.br(header)?;

        self.builder.position_at_end(header);
        let i64_ty = self.builtins().i64;
        let index = self.builder.phi(i64_ty, "index")?;
        self.builder.add_phi_incoming(index, &[(start, preheader)]);
        let more = test(self, index)?;
        self.builder.cond_br(more, body_bb, exit)?;

        self.builder.position_at_end(body_bb);
        self.push_names();
        self.open_scope();
        body(self, index)?;
        self.close_scope()?;
        self.pop_names();
        if !self.builder.is_terminated() {
            let next = self.builder.add(index, step, "next")?;
            let latch = self.insertion_block()?;
            self.builder.add_phi_incoming(index, &[(next, latch)]);
            self.builder.br(header)?;
        }

        self.builder.position_at_end(exit);
        Ok(())
    }

    /// `while condition { body }`; the condition's temporaries are
    /// released before the branch.
    fn lower_while(&mut self, condition: &TypedExpression, body: &[Statement]) -> CodegenResult<()> {
        let function = self.current_function()?;
        let test = self.builder.append_block(function, "while");
        let body_bb = self.builder.append_block(function, "do");
        let exit = self.builder.append_block(function, "wend");
        self.builder.br(test)?;

        self.builder.position_at_end(test);
        self.open_scope();
        let flag = self.lower_condition(condition)?;
        self.close_scope()?;
        self.builder.cond_br(flag, body_bb, exit)?;

        self.builder.position_at_end(body_bb);
        if self.lower_nested_block(body)? {
            self.builder.br(test)?;
        }

        self.builder.position_at_end(exit);
        Ok(())
    }

    /// `repeat { body } until (condition) fixup { fixup }`.
    ///
    /// The body and the condition share one scope. Leaving the loop
    /// releases it without closing it, so the fixup can still release it
    /// on the way back to the top.
    fn lower_repeat(
        &mut self,
        body: &[Statement],
        until: &TypedExpression,
        fixup: &[Statement],
    ) -> CodegenResult<()> {
        let function = self.current_function()?;
        let repeat = self.builder.append_block(function, "repeat");
        let test = self.builder.append_block(function, "until");
        let fixup_bb = self.builder.append_block(function, "fixup");
        let exit = self.builder.append_block(function, "rend");
        self.builder.br(repeat)?;

        self.builder.position_at_end(repeat);
        self.push_names();
        self.open_scope();
        self.lower_block(body)?;
        if !self.builder.is_terminated() {
            self.builder.br(test)?;
        }

        self.builder.position_at_end(test);
        let flag = self.lower_condition(until)?;
        self.builder.cond_br(flag, exit, fixup_bb)?;

        self.builder.position_at_end(exit);
        self.release_innermost_scope()?;
        let after = self.insertion_block()?;

        self.builder.position_at_end(fixup_bb);
        let falls_through = self.lower_nested_block(fixup)?;
        self.close_scope()?;
        self.pop_names();
        if falls_through {
            self.builder.br(repeat)?;
        }

        self.builder.position_at_end(after);
        Ok(())
    }

    // ── Qubits ──────────────────────────────────────────────────────

    /// Allocate the qubits of a qubit scope, registering their release.
    fn allocate_qubits(&mut self, initializer: &QubitInitializer) -> CodegenResult<IValue> {
        match initializer {
            QubitInitializer::Single => {
                let qubit = self.runtime_value(RuntimeFunction::QubitAllocate, &[], "qubit")?;
                self.register_qubit(qubit)?;
                Ok(IValue::Simple(SimpleValue {
                    value: qubit,
                    ty: ResolvedType::Qubit,
                }))
            }
            QubitInitializer::Register(count) => {
                let size = self.lower_expression(count)?;
                let IValue::Simple(SimpleValue {
                    value: count,
                    ty: ResolvedType::Int,
                }) = &size
                else {
                    return Err(CodegenError::unsupported(format!(
                        "qubit register sized by '{}'",
                        size.source_type()
                    )));
                };
                let count = *count;
                let handle =
                    self.runtime_value(RuntimeFunction::QubitAllocateArray, &[count], "qubits")?;
                let array = ArrayValue::with_length(handle, ResolvedType::Qubit, count);
                self.register_qubit_array(&array)?;
                Ok(IValue::Array(array))
            }
            QubitInitializer::Tuple(initializers) => {
                let mut values = Vec::with_capacity(initializers.len());
                for initializer in initializers {
                    values.push(self.allocate_qubits(initializer)?);
                }
                let ty = ResolvedType::Tuple(
                    values.iter().map(|v| v.source_type().clone()).collect(),
                );
                self.create_tuple(&ty, &values)
            }
        }
    }
}
