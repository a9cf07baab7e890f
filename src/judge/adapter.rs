use std::path::Path;

/// Toolchain contract for language-specific compile/run stages.
pub trait ToolchainAdapter: Send + Sync {
    fn language(&self) -> &'static str;

    /// File extension for the source written into the build directory.
    fn source_extension(&self) -> &'static str;

    /// Fixed optimization flags applied to every build.
    fn base_flags(&self) -> &[String];

    fn compile_command(&self, source: &Path, output: &Path, extra_flags: &[String]) -> Vec<String>;

    fn run_command(&self, binary: &Path) -> Vec<String>;
}

/// Append `extra` to `base`, skipping flags already present.
pub fn merge_flags(base: &[String], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(base.len() + extra.len());
    for flag in base.iter().chain(extra.iter()) {
        if !merged.contains(flag) {
            merged.push(flag.clone());
        }
    }
    merged
}
