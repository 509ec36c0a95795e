//! Generation options.

use std::path::PathBuf;

/// Options for one generation run.
///
/// ```text
/// let config = CodegenConfig::new("out/program")
///     .with_interop_wrappers(true)
///     .with_entry_points(false);
/// ```
#[derive(Clone, Debug)]
pub struct CodegenConfig {
    /// Base path of the artifacts; `.ll` and `.log` are appended.
    pub output_file_name: PathBuf,
    /// Also produce the bridge module for the native runtime.
    pub generate_interop_wrappers: bool,
    /// Generate entry-point functions for `EntryPoint` callables.
    pub entry_points: bool,
}

impl CodegenConfig {
    #[must_use]
    pub fn new(output_file_name: impl Into<PathBuf>) -> Self {
        Self {
            output_file_name: output_file_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_interop_wrappers(mut self, enabled: bool) -> Self {
        self.generate_interop_wrappers = enabled;
        self
    }

    #[must_use]
    pub fn with_entry_points(mut self, enabled: bool) -> Self {
        self.entry_points = enabled;
        self
    }

    /// Name of the module: the file stem of the output base.
    pub fn module_name(&self) -> String {
        self.output_file_name
            .file_stem()
            .map_or_else(|| "qir".to_owned(), |s| s.to_string_lossy().into_owned())
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            output_file_name: PathBuf::from("qir"),
            generate_interop_wrappers: false,
            entry_points: true,
        }
    }
}
