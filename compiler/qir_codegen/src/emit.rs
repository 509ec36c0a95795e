//! Writing the finished module.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::context::GenerationContext;
use crate::error::{CodegenError, CodegenResult};
use crate::interop::bridge_text;

/// Paths written by [`GenerationContext::emit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedFiles {
    pub ir: PathBuf,
    pub log: PathBuf,
    /// Present in interop mode.
    pub bridge: Option<PathBuf>,
}

/// `base` with `extension` appended, keeping any dots already in it.
fn with_suffix(base: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn write_file(path: &Path, contents: &str) -> CodegenResult<()> {
    std::fs::write(path, contents).map_err(|source| CodegenError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl GenerationContext<'_, '_> {
    /// Emit to the configured output base.
    pub fn emit(&mut self) -> CodegenResult<EmittedFiles> {
        let base = self.config.output_file_name.clone();
        self.emit_to(&base)
    }

    /// Finish, verify, and write `<base>.log` then `<base>.ll`.
    ///
    /// The log is written even when verification fails; the error is
    /// returned after it. In interop mode `bridge.ll` is written beside
    /// the module.
    pub fn emit_to(&mut self, base: &Path) -> CodegenResult<EmittedFiles> {
        self.finish()?;
        let ir = with_suffix(base, "ll");
        let log = with_suffix(base, "log");

        let verification = self
            .module()
            .verify()
            .map_err(|errors| errors.to_string_lossy().into_owned());
        let report = match &verification {
            Ok(()) => "No errors\n".to_owned(),
            Err(errors) => format!("IR errors:\n{errors}\n"),
        };
        write_file(&log, &report)?;
        if let Err(errors) = verification {
            warn!(log = %log.display(), "module failed verification");
            return Err(CodegenError::VerificationFailure(errors));
        }
        write_file(&ir, &self.module().print_to_string().to_string())?;

        let bridge = if self.config.generate_interop_wrappers {
            let path = base.with_file_name("bridge.ll");
            let text = bridge_text(self.builder.context(), self.module())?;
            write_file(&path, &text)?;
            Some(path)
        } else {
            None
        };
        debug!(ir = %ir.display(), "module emitted");
        Ok(EmittedFiles { ir, log, bridge })
    }
}
