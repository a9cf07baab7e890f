//! Shared fixtures: a scratch directory and a stand-in compiler that "builds"
//! shell-script sources by copying them to the output path.

#![allow(dead_code)]

use perfbox::config::settings::Settings;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct Scratch {
    pub root: PathBuf,
}

impl Scratch {
    pub fn new(label: &str) -> Self {
        let root = std::env::temp_dir().join(format!("perfbox-it-{}-{}", label, Uuid::new_v4()));
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Settings pointing scratch space, the binary store and the compiler at this directory.
    pub fn settings(&self, compiler: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.sandbox.scratch_root = self.root.join("scratch");
        settings.sandbox.binary_store = self.root.join("bin");
        settings.sandbox.timeout_ms = 2000;
        settings.sandbox.input_sizes = vec![1, 10, 100, 1000];
        settings.toolchain.compiler = compiler.display().to_string();
        settings
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

/// Copies the last positional argument to the `-o` target.
pub const COPY_COMPILER: &str = r#"#!/bin/sh
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) src="$1"; shift ;;
  esac
done
cp "$src" "$out" && chmod +x "$out"
"#;

/// Reads `n` and echoes it back.
pub const ECHO_PROGRAM: &str = "#!/bin/sh\nread n\necho \"got $n\"\n";

/// Reads `n` and a line of `n` integers; exits non-zero when the line is missing or short.
pub const ARRAY_PROGRAM: &str =
    "#!/bin/sh\nread n\nread line || exit 3\nset -- $line\n[ \"$#\" -eq \"$n\" ] || exit 4\necho \"$#\"\n";

pub fn copy_compiler(scratch: &Scratch) -> PathBuf {
    scratch.script("fake-cxx", COPY_COMPILER)
}
