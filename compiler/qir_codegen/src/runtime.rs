//! The runtime library vocabulary.
//!
//! Every function the generated code may call in the classical runtime is
//! listed in [`RuntimeFunction`] with its base name and fixed signature.
//! Declarations are added to the module on first use and cached, so an
//! emitted module only declares what it calls.

use inkwell::module::Linkage;
use qir_syntax::Pauli;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::CodegenResult;
use crate::ir_builder::IrBuilder;
use crate::naming::runtime_name;
use crate::types::BuiltinTypes;
use crate::value_id::{FunctionId, GlobalId, LLVMTypeId};

/// A classical runtime function.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum RuntimeFunction {
    // Tuples
    TupleCreate,
    TupleReference,
    TupleUnreference,
    TupleCopy,
    // Arrays
    ArrayCreate1d,
    ArrayGetElementPtr1d,
    ArrayGetSize1d,
    ArrayCopy,
    ArrayConcatenate,
    ArrayReference,
    ArrayUnreference,
    // Callables
    CallableCreate,
    CallableInvoke,
    CallableCopy,
    CallableMakeAdjoint,
    CallableMakeControlled,
    CallableReference,
    CallableUnreference,
    // Qubits
    QubitAllocate,
    QubitAllocateArray,
    QubitRelease,
    QubitReleaseArray,
    // Results
    ResultEqual,
    ResultReference,
    ResultUnreference,
    // Strings
    StringCreate,
    StringConcatenate,
    StringEqual,
    StringReference,
    StringUnreference,
    IntToString,
    DoubleToString,
    BoolToString,
    ResultToString,
    PauliToString,
    QubitToString,
    RangeToString,
    BigIntToString,
    // Big integers
    BigIntCreateI64,
    BigIntCreateArray,
    BigIntNegate,
    BigIntAdd,
    BigIntSubtract,
    BigIntMultiply,
    BigIntDivide,
    BigIntModulus,
    BigIntPower,
    BigIntBitand,
    BigIntBitor,
    BigIntBitxor,
    BigIntBitnot,
    BigIntShiftLeft,
    BigIntShiftRight,
    BigIntEqual,
    BigIntGreater,
    BigIntGreaterEq,
    BigIntReference,
    BigIntUnreference,
    // Diagnostics
    Fail,
    Message,
}

impl RuntimeFunction {
    /// Every runtime function, in catalog order.
    pub const ALL: [Self; 60] = [
        Self::TupleCreate,
        Self::TupleReference,
        Self::TupleUnreference,
        Self::TupleCopy,
        Self::ArrayCreate1d,
        Self::ArrayGetElementPtr1d,
        Self::ArrayGetSize1d,
        Self::ArrayCopy,
        Self::ArrayConcatenate,
        Self::ArrayReference,
        Self::ArrayUnreference,
        Self::CallableCreate,
        Self::CallableInvoke,
        Self::CallableCopy,
        Self::CallableMakeAdjoint,
        Self::CallableMakeControlled,
        Self::CallableReference,
        Self::CallableUnreference,
        Self::QubitAllocate,
        Self::QubitAllocateArray,
        Self::QubitRelease,
        Self::QubitReleaseArray,
        Self::ResultEqual,
        Self::ResultReference,
        Self::ResultUnreference,
        Self::StringCreate,
        Self::StringConcatenate,
        Self::StringEqual,
        Self::StringReference,
        Self::StringUnreference,
        Self::IntToString,
        Self::DoubleToString,
        Self::BoolToString,
        Self::ResultToString,
        Self::PauliToString,
        Self::QubitToString,
        Self::RangeToString,
        Self::BigIntToString,
        Self::BigIntCreateI64,
        Self::BigIntCreateArray,
        Self::BigIntNegate,
        Self::BigIntAdd,
        Self::BigIntSubtract,
        Self::BigIntMultiply,
        Self::BigIntDivide,
        Self::BigIntModulus,
        Self::BigIntPower,
        Self::BigIntBitand,
        Self::BigIntBitor,
        Self::BigIntBitxor,
        Self::BigIntBitnot,
        Self::BigIntShiftLeft,
        Self::BigIntShiftRight,
        Self::BigIntEqual,
        Self::BigIntGreater,
        Self::BigIntGreaterEq,
        Self::BigIntReference,
        Self::BigIntUnreference,
        Self::Fail,
        Self::Message,
    ];

    /// Name without the runtime prefix.
    pub fn base_name(self) -> &'static str {
        match self {
            Self::TupleCreate => "tuple_create",
            Self::TupleReference => "tuple_reference",
            Self::TupleUnreference => "tuple_unreference",
            Self::TupleCopy => "tuple_copy",
            Self::ArrayCreate1d => "array_create_1d",
            Self::ArrayGetElementPtr1d => "array_get_element_ptr_1d",
            Self::ArrayGetSize1d => "array_get_size_1d",
            Self::ArrayCopy => "array_copy",
            Self::ArrayConcatenate => "array_concatenate",
            Self::ArrayReference => "array_reference",
            Self::ArrayUnreference => "array_unreference",
            Self::CallableCreate => "callable_create",
            Self::CallableInvoke => "callable_invoke",
            Self::CallableCopy => "callable_copy",
            Self::CallableMakeAdjoint => "callable_make_adjoint",
            Self::CallableMakeControlled => "callable_make_controlled",
            Self::CallableReference => "callable_reference",
            Self::CallableUnreference => "callable_unreference",
            Self::QubitAllocate => "qubit_allocate",
            Self::QubitAllocateArray => "qubit_allocate_array",
            Self::QubitRelease => "qubit_release",
            Self::QubitReleaseArray => "qubit_release_array",
            Self::ResultEqual => "result_equal",
            Self::ResultReference => "result_reference",
            Self::ResultUnreference => "result_unreference",
            Self::StringCreate => "string_create",
            Self::StringConcatenate => "string_concatenate",
            Self::StringEqual => "string_equal",
            Self::StringReference => "string_reference",
            Self::StringUnreference => "string_unreference",
            Self::IntToString => "int_to_string",
            Self::DoubleToString => "double_to_string",
            Self::BoolToString => "bool_to_string",
            Self::ResultToString => "result_to_string",
            Self::PauliToString => "pauli_to_string",
            Self::QubitToString => "qubit_to_string",
            Self::RangeToString => "range_to_string",
            Self::BigIntToString => "bigint_to_string",
            Self::BigIntCreateI64 => "bigint_create_i64",
            Self::BigIntCreateArray => "bigint_create_array",
            Self::BigIntNegate => "bigint_negate",
            Self::BigIntAdd => "bigint_add",
            Self::BigIntSubtract => "bigint_subtract",
            Self::BigIntMultiply => "bigint_multiply",
            Self::BigIntDivide => "bigint_divide",
            Self::BigIntModulus => "bigint_modulus",
            Self::BigIntPower => "bigint_power",
            Self::BigIntBitand => "bigint_bitand",
            Self::BigIntBitor => "bigint_bitor",
            Self::BigIntBitxor => "bigint_bitxor",
            Self::BigIntBitnot => "bigint_bitnot",
            Self::BigIntShiftLeft => "bigint_shiftleft",
            Self::BigIntShiftRight => "bigint_shiftright",
            Self::BigIntEqual => "bigint_equal",
            Self::BigIntGreater => "bigint_greater",
            Self::BigIntGreaterEq => "bigint_greater_eq",
            Self::BigIntReference => "bigint_reference",
            Self::BigIntUnreference => "bigint_unreference",
            Self::Fail => "fail",
            Self::Message => "message",
        }
    }

    /// Return type (`None` for `void`) and parameter types.
    pub fn signature(self, b: &BuiltinTypes) -> (Option<LLVMTypeId>, Vec<LLVMTypeId>) {
        let ptr = b.ptr;
        match self {
            Self::TupleCreate => (Some(ptr), vec![b.i64]),
            Self::TupleCopy | Self::ArrayCopy | Self::CallableCopy => (Some(ptr), vec![ptr, b.bool]),
            Self::ArrayCreate1d => (Some(ptr), vec![b.i32, b.i64]),
            Self::ArrayGetElementPtr1d => (Some(ptr), vec![ptr, b.i64]),
            Self::ArrayGetSize1d => (Some(b.i64), vec![ptr]),
            Self::ArrayConcatenate
            | Self::StringConcatenate
            | Self::BigIntAdd
            | Self::BigIntSubtract
            | Self::BigIntMultiply
            | Self::BigIntDivide
            | Self::BigIntModulus
            | Self::BigIntBitand
            | Self::BigIntBitor
            | Self::BigIntBitxor => (Some(ptr), vec![ptr, ptr]),
            Self::TupleReference
            | Self::TupleUnreference
            | Self::ArrayReference
            | Self::ArrayUnreference
            | Self::QubitReleaseArray
            | Self::CallableMakeAdjoint
            | Self::CallableMakeControlled
            | Self::CallableReference
            | Self::CallableUnreference
            | Self::QubitRelease
            | Self::ResultReference
            | Self::ResultUnreference
            | Self::StringReference
            | Self::StringUnreference
            | Self::BigIntReference
            | Self::BigIntUnreference
            | Self::Fail
            | Self::Message => (None, vec![ptr]),
            // (table, memory-management table, capture)
            Self::CallableCreate => (Some(ptr), vec![ptr, ptr, ptr]),
            Self::CallableInvoke => (None, vec![ptr, ptr, ptr]),
            Self::QubitAllocate => (Some(ptr), Vec::new()),
            Self::QubitAllocateArray | Self::IntToString | Self::BigIntCreateI64 => {
                (Some(ptr), vec![b.i64])
            }
            Self::ResultEqual
            | Self::StringEqual
            | Self::BigIntEqual
            | Self::BigIntGreater
            | Self::BigIntGreaterEq => (Some(b.bool), vec![ptr, ptr]),
            Self::StringCreate
            | Self::ResultToString
            | Self::QubitToString
            | Self::BigIntToString
            | Self::BigIntNegate
            | Self::BigIntBitnot => (Some(ptr), vec![ptr]),
            Self::DoubleToString => (Some(ptr), vec![b.double]),
            Self::BoolToString => (Some(ptr), vec![b.bool]),
            Self::PauliToString => (Some(ptr), vec![b.i2]),
            Self::RangeToString => (Some(ptr), vec![b.range]),
            Self::BigIntCreateArray => (Some(ptr), vec![b.i32, ptr]),
            Self::BigIntPower => (Some(ptr), vec![ptr, b.i32]),
            Self::BigIntShiftLeft | Self::BigIntShiftRight => (Some(ptr), vec![ptr, b.i64]),
        }
    }
}

/// Lazily declared runtime functions of one module.
#[derive(Default)]
pub struct RuntimeLibrary {
    declared: FxHashMap<RuntimeFunction, FunctionId>,
}

impl RuntimeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// The declaration of `function`, adding it on first use.
    pub fn get(
        &mut self,
        function: RuntimeFunction,
        builder: &mut IrBuilder<'_>,
        builtins: &BuiltinTypes,
    ) -> CodegenResult<FunctionId> {
        if let Some(&id) = self.declared.get(&function) {
            return Ok(id);
        }
        let (ret, params) = function.signature(builtins);
        let name = runtime_name(function.base_name());
        trace!(%name, "declaring runtime function");
        let id = builder.get_or_declare_function(&name, &params, ret)?;
        self.declared.insert(function, id);
        Ok(id)
    }

    /// Number of runtime functions declared so far.
    pub fn declared_count(&self) -> usize {
        self.declared.len()
    }
}

// ── Module globals ──────────────────────────────────────────────────

/// Globals every generated module defines or imports.
#[derive(Copy, Clone, Debug)]
pub struct ModuleGlobals {
    pub result_zero: GlobalId,
    pub result_one: GlobalId,
    pub empty_range: GlobalId,
    /// Indexed by [`Pauli::encoding`].
    pub paulis: [GlobalId; 4],
}

impl ModuleGlobals {
    pub(crate) fn create(
        builder: &mut IrBuilder<'_>,
        builtins: &BuiltinTypes,
    ) -> CodegenResult<Self> {
        let result_zero =
            builder.add_global("ResultZero", builtins.ptr, None, false, Linkage::External);
        let result_one =
            builder.add_global("ResultOne", builtins.ptr, None, false, Linkage::External);

        let mut paulis = [GlobalId::NONE; 4];
        for pauli in [Pauli::I, Pauli::X, Pauli::Z, Pauli::Y] {
            let code = pauli.encoding();
            let value = builder.const_int(builtins.i2, code)?;
            let slot = usize::try_from(code).unwrap_or_default();
            paulis[slot] =
                builder.add_global(pauli.name(), builtins.i2, Some(value), true, Linkage::Internal);
        }

        let fields = [
            builder.const_i64(0),
            builder.const_i64(1),
            builder.const_i64(-1),
        ];
        let empty = builder.const_struct(builtins.range, &fields)?;
        let empty_range = builder.add_global(
            "EmptyRange",
            builtins.range,
            Some(empty),
            true,
            Linkage::Internal,
        );
        Ok(Self {
            result_zero,
            result_one,
            empty_range,
            paulis,
        })
    }
}
