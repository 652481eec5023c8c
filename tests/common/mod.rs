// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

const BIN: &str = env!("CARGO_BIN_EXE_tally");

/// Build a pipe-separated contribution record with the name in field 7 and
/// the date in field 13, the default layout
pub fn record(name: &str, date: &str) -> String {
    let mut fields = vec!["x"; 21];
    fields[7] = name;
    fields[13] = date;
    fields.join("|")
}

pub fn records(rows: &[(&str, &str)]) -> String {
    rows.iter()
        .map(|(name, date)| record(name, date) + "\n")
        .collect()
}

pub fn temp_source(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");
    file.flush().expect("Failed to flush temp file");
    file
}

fn collect(output: Output) -> (String, String, i32) {
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

/// Run tally with rc files ignored, feeding `input` on stdin
pub fn run_tally_with_input(args: &[&str], input: &str) -> (String, String, i32) {
    let mut child = Command::new(BIN)
        .arg("--ignore-config")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start tally");

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .expect("Failed to write to stdin");
    }

    collect(child.wait_with_output().expect("Failed to read output"))
}

/// Run tally with rc files ignored on a temporary file holding `content`
pub fn run_tally_with_file(args: &[&str], content: &str) -> (String, String, i32) {
    let file = temp_source(content);
    let mut full_args = args.to_vec();
    full_args.push(file.path().to_str().unwrap());
    run_tally(&full_args)
}

pub fn run_tally(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(BIN)
        .arg("--ignore-config")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute tally");
    collect(output)
}

/// Run tally with rc-file processing enabled, isolated from the real home
pub fn run_tally_in(dir: &std::path::Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(BIN)
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute tally");
    collect(output)
}
