//! QIR code generation backend.
//!
//! Lowers a typed [`Compilation`] into a target module that
//! calls the quantum runtime through `__quantum__rt__*` and
//! `__quantum__qis__*` functions, then verifies and writes it.
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=qir_codegen=debug`: one event per generated function,
//!   wrapper, and entry point.
//! - `RUST_LOG=qir_codegen=trace`: every registration and reference-count
//!   update.
//!
//! # Architecture
//!
//! Generation runs in two phases on one [`GenerationContext`]:
//!
//! 1. [`GenerationContext::generate_all`] emits UDT constructors and every
//!    callable specialization. Callables used as values get a dispatch
//!    table at once and are queued for wrapper generation.
//! 2. [`GenerationContext::finish`] drains the wrapper queue and adds
//!    entry points. [`GenerationContext::emit`] finishes, verifies, and
//!    writes the `.ll` and `.log` files.
//!
//! | Module | Provides |
//! |--------|----------|
//! | `types` | representation types of resolved types |
//! | `runtime` | runtime function catalog and module globals |
//! | `values` | value wrappers with lazily loaded items |
//! | `scope` | ownership tracking and reference-count emission |
//! | `bindings` | local names and argument binding |
//! | `specialization` | specialization lifecycle, UDT constructors |
//! | `statements`, `expressions` | body lowering |
//! | `wrappers` | wrapper functions and dispatch tables |
//! | `partial` | partial application, lifted wrappers, capture memory tables |
//! | `ir_builder`, `value_id` | ID-based instruction builder over inkwell |
//! | `entry_point`, `interop`, `emit` | module boundary |
//!
//! # Example
//!
//! ```ignore
//! use qir_codegen::{compile, CodegenConfig};
//!
//! let files = compile(&compilation, CodegenConfig::new("out/program"))?;
//! println!("{}", files.ir.display());
//! ```

#![allow(
    // IR indices are u32 and counts are i64; conversions are range-checked upstream
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    // Lowering threads the context, value, and type through most helpers
    clippy::too_many_lines,
)]

use std::sync::Once;

use inkwell::context::Context;
use qir_syntax::Compilation;

pub mod bindings;
pub mod config;
pub mod context;
pub mod emit;
pub mod entry_point;
pub mod error;
pub mod expressions;
pub mod interop;
pub mod ir_builder;
pub mod naming;
pub mod partial;
pub mod runtime;
pub mod scope;
pub mod specialization;
pub mod statements;
pub mod types;
pub mod value_id;
pub mod values;
pub mod wrappers;

pub use config::CodegenConfig;
pub use context::GenerationContext;
pub use emit::EmittedFiles;
pub use error::{CodegenError, CodegenResult};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing from `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset. Safe to call repeatedly.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Generate, verify, and write the module for `compilation`.
pub fn compile(compilation: &Compilation, config: CodegenConfig) -> CodegenResult<EmittedFiles> {
    init_tracing();
    let llvm = Context::create();
    let mut context = GenerationContext::new(&llvm, compilation, config)?;
    context.generate_all()?;
    context.emit()
}

#[cfg(test)]
mod tests;
