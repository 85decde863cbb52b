//! Shared fixtures for integration tests

// Not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use fnpack::toolchain::{ToolError, ToolInvocation, ToolOutput, ToolRunner};
use std::path::Path;
use std::sync::Mutex;

/// Writes a file, creating parent directories.
pub fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Writes raw bytes, creating parent directories.
pub fn write_bytes(path: &Path, content: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A linux/amd64 ELF image carrying the Go build-id section name.
pub fn go_binary_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    bytes[..4].copy_from_slice(b"\x7fELF");
    bytes[4] = 2; // ELFCLASS64
    bytes[5] = 1; // little-endian
    bytes[6] = 1; // EV_CURRENT
    bytes[18] = 62; // EM_X86_64
    bytes.extend_from_slice(b".note.go.buildid");
    bytes.extend_from_slice(b"fake go machine code");
    bytes
}

/// The same image built for linux/arm64.
pub fn go_arm64_binary_bytes() -> Vec<u8> {
    let mut bytes = go_binary_bytes();
    bytes[18] = 183; // EM_AARCH64
    bytes
}

/// Stands in for the Go and Cargo toolchains: records invocations and
/// fabricates the output binary where the real compiler would put it.
pub struct FakeCompilerRunner {
    pub calls: Mutex<Vec<ToolInvocation>>,
}

impl FakeCompilerRunner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ToolRunner for FakeCompilerRunner {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        match invocation.tool.as_str() {
            "go" => {
                // go build -o <out> .
                let out = invocation
                    .args
                    .iter()
                    .position(|arg| arg == "-o")
                    .and_then(|i| invocation.args.get(i + 1))
                    .expect("go build is invoked with -o");
                write_bytes(Path::new(out), &go_binary_bytes());
            }
            "cargo" => {
                // cargo build --release --target <target>, with
                // CARGO_TARGET_DIR in the environment
                let target = invocation
                    .args
                    .iter()
                    .position(|arg| arg == "--target")
                    .and_then(|i| invocation.args.get(i + 1))
                    .expect("cargo build is invoked with --target")
                    .clone();
                let target_dir = invocation
                    .env
                    .iter()
                    .find(|(key, _)| key == "CARGO_TARGET_DIR")
                    .map(|(_, value)| value.clone())
                    .expect("CARGO_TARGET_DIR is set");
                let out = Path::new(&target_dir)
                    .join(target)
                    .join("release")
                    .join("handler");
                write_bytes(&out, b"fake rust machine code");
            }
            "rustup" => {}
            other => panic!("unexpected tool invocation: {}", other),
        }
        self.calls.lock().unwrap().push(invocation);
        Ok(ToolOutput {
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn is_available(&self, _tool: &str) -> bool {
        true
    }
}
