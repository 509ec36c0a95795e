//! Errors raised while generating a module.

use std::path::PathBuf;

use inkwell::builder::BuilderError;
use thiserror::Error;

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Everything that can stop code generation.
///
/// None of these are retried: generation is deterministic, so a failure
/// points at a defect in the input tree or in the backend itself.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// A user-defined type, callable, or local referenced by name is not
    /// in the compilation.
    #[error("unresolved {kind} '{name}'")]
    UnresolvedReference { kind: &'static str, name: String },

    /// A construct reached the backend without a lowering rule.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// The finished module failed structural verification.
    #[error("module verification failed:\n{0}")]
    VerificationFailure(String),

    #[error("cannot write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal bookkeeping was misused (unbalanced scopes, double
    /// registration, out-of-order specialization steps).
    #[error("invalid generator state: {0}")]
    InvalidState(String),

    /// inkwell refused to build an instruction.
    #[error("instruction builder: {0}")]
    Builder(#[from] BuilderError),
}

impl CodegenError {
    pub(crate) fn unresolved(kind: &'static str, name: impl ToString) -> Self {
        Self::UnresolvedReference {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedConstruct(what.into())
    }

    pub(crate) fn invalid_state(what: impl Into<String>) -> Self {
        Self::InvalidState(what.into())
    }
}
