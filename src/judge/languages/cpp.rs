use crate::config::settings::ToolchainSettings;
use crate::judge::adapter::{merge_flags, ToolchainAdapter};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CppAdapter {
    compiler: String,
    flags: Vec<String>,
}

impl CppAdapter {
    pub fn new(compiler: impl Into<String>, flags: Vec<String>) -> Self {
        Self {
            compiler: compiler.into(),
            flags,
        }
    }

    pub fn from_settings(toolchain: &ToolchainSettings) -> Self {
        Self::new(toolchain.compiler.clone(), toolchain.optimization_flags.clone())
    }

    pub fn compiler(&self) -> &str {
        &self.compiler
    }
}

impl Default for CppAdapter {
    fn default() -> Self {
        Self::from_settings(&ToolchainSettings::default())
    }
}

impl ToolchainAdapter for CppAdapter {
    fn language(&self) -> &'static str {
        "cpp"
    }

    fn source_extension(&self) -> &'static str {
        "cpp"
    }

    fn base_flags(&self) -> &[String] {
        &self.flags
    }

    fn compile_command(&self, source: &Path, output: &Path, extra_flags: &[String]) -> Vec<String> {
        let mut argv = vec![self.compiler.clone()];
        argv.extend(merge_flags(&self.flags, extra_flags));
        argv.push("-o".to_string());
        argv.push(output.to_string_lossy().to_string());
        argv.push(source.to_string_lossy().to_string());
        argv
    }

    fn run_command(&self, binary: &Path) -> Vec<String> {
        vec![binary.to_string_lossy().to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_compile_command_layout() {
        let adapter = CppAdapter::default();
        let argv = adapter.compile_command(
            &PathBuf::from("/w/source.cpp"),
            &PathBuf::from("/w/solution"),
            &["-O3".to_string(), "-pg".to_string()],
        );
        assert_eq!(argv[0], "g++");
        assert_eq!(
            &argv[1..6],
            &["-O3", "-std=c++17", "-march=native", "-ffast-math", "-pg"]
        );
        assert_eq!(&argv[6..], &["-o", "/w/solution", "/w/source.cpp"]);
    }

    #[test]
    fn test_run_command_is_binary() {
        let adapter = CppAdapter::new("clang++", Vec::new());
        assert_eq!(adapter.compiler(), "clang++");
        assert_eq!(
            adapter.run_command(&PathBuf::from("/w/solution")),
            vec!["/w/solution".to_string()]
        );
    }
}
