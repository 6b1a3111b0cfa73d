//! Common test utilities for procwrap tests

#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;

/// Creates a temporary directory holding an argument file
pub fn create_arg_file(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write argument file");
    (dir, path)
}

/// Creates a temporary directory with an executable shell script
pub fn create_script(script_name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let script_path = dir.path().join(script_name);
    std::fs::write(&script_path, content).expect("Failed to write script");

    // Make script executable on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&script_path)
            .expect("Failed to get metadata")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).expect("Failed to set permissions");
    }

    (dir, script_path)
}

/// `@path` argument for a file
pub fn at_arg(path: &std::path::Path) -> String {
    format!("@{}", path.display())
}

/// Script writing to both streams, then exiting with its first argument
pub const MIXED_OUTPUT_SCRIPT: &str = r#"#!/bin/sh
echo "out one"
echo "err one" >&2
echo "out two"
exit "${1:-0}"
"#;

/// Argument file with comments, quoting and blank lines
pub const SAMPLE_ARG_FILE: &str = r#"
# solver options
--input "my box.txt"   # spaces survive quoting

--verbose 'a # b'
"#;
