use crate::config::settings::ToolchainSettings;
use crate::config::types::{JudgeError, Result};
use crate::judge::adapter::ToolchainAdapter;
use crate::judge::languages::cpp::CppAdapter;

pub fn adapter_for(toolchain: &ToolchainSettings) -> Result<Box<dyn ToolchainAdapter>> {
    match toolchain.language.as_str() {
        "cpp" | "c++" | "cxx" | "cc" => Ok(Box::new(CppAdapter::from_settings(toolchain))),
        other => Err(JudgeError::Config(format!(
            "unsupported language adapter: {other}"
        ))),
    }
}
