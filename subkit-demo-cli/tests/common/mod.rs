//! Common test utilities for subkit-demo-cli integration tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Temporary storage directory shared by every invocation in a test
#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub storage_dir: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let storage_dir = temp_dir.path().join("store");

        Self {
            temp_dir,
            storage_dir,
        }
    }

    /// Run the binary against this context's store
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_subkit-demo"))
            .arg("--storage-dir")
            .arg(&self.storage_dir)
            .args(args)
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to execute subkit-demo")
    }

    /// Run and assert success, returning stdout
    pub fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            eprintln!("stdout: {}", stdout);
            eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
            panic!("subkit-demo {:?} failed", args);
        }
        stdout
    }

    /// Write a billing config file and return its path
    pub fn write_config(&self, json: &str) -> PathBuf {
        let path = self.temp_dir.path().join("billing.json");
        std::fs::write(&path, json).unwrap();
        path
    }
}

/// Pull the first `{prefix}...` identifier out of command output
#[allow(dead_code)]
pub fn find_id(output: &str, prefix: &str) -> Option<String> {
    output
        .split(|c: char| c.is_whitespace())
        .find(|word| word.starts_with(prefix))
        .map(|word| word.trim_end_matches(|c: char| !c.is_ascii_alphanumeric()).to_string())
}

#[allow(dead_code)]
pub fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}
