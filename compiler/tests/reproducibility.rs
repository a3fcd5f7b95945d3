// Reproducibility tests for the beacon binary.
//
// These tests verify that the compiler produces byte-identical outputs for
// identical inputs, that build fingerprints track only the source, and that
// the exit status distinguishes compile errors from I/O errors.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

fn beacon_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_beacon"))
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn patterns_dir() -> PathBuf {
    project_root().join("patterns")
}

fn all_patterns() -> Vec<PathBuf> {
    let mut paths: Vec<_> = std::fs::read_dir(patterns_dir())
        .expect("patterns directory")
        .map(|entry| entry.expect("directory entry").path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "pbb"))
        .collect();
    paths.sort();
    assert!(!paths.is_empty(), "no patterns found");
    paths
}

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_source(contents: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "beacon_repro_{}_{}.pbb",
        std::process::id(),
        n
    ));
    std::fs::write(&path, contents).expect("failed to write temporary source");
    path
}

fn run_beacon(args: &[&str]) -> Output {
    Command::new(beacon_binary())
        .args(args)
        .output()
        .expect("failed to run beacon")
}

fn run_ok(args: &[&str]) -> String {
    let output = run_beacon(args);
    assert!(
        output.status.success(),
        "beacon failed with args {:?}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("non-UTF8 output")
}

/// Every bundled pattern compiles, and to the same bytes every time.
#[test]
fn bundled_patterns_compile_identically_across_runs() {
    for pattern in all_patterns() {
        let path = pattern.to_str().unwrap();
        let first = run_ok(&[path]);
        let second = run_ok(&[path]);
        assert!(first.contains("export function render(index)"), "{path}");
        assert_eq!(first, second, "{path}: output should be byte-identical across runs");
    }
}

/// Intermediate dumps are deterministic too.
#[test]
fn dumps_are_identical_across_runs() {
    let pattern = patterns_dir().join("sunset.pbb");
    let path = pattern.to_str().unwrap();
    for emit in ["terms", "nodes", "json", "dot"] {
        let first = run_ok(&["--emit", emit, path]);
        let second = run_ok(&["--emit", emit, path]);
        assert!(!first.is_empty(), "--emit {emit} produced nothing");
        assert_eq!(first, second, "--emit {emit} should be byte-identical");
    }
}

/// The registry fingerprint is a property of the compiler, not the source.
#[test]
fn registry_fingerprint_is_source_independent() {
    let a = patterns_dir().join("glow.pbb");
    let b = patterns_dir().join("comets.pbb");
    let info_a: serde_json::Value =
        serde_json::from_str(&run_ok(&["--emit", "build-info", a.to_str().unwrap()]))
            .expect("build-info is JSON");
    let info_b: serde_json::Value =
        serde_json::from_str(&run_ok(&["--emit", "build-info", b.to_str().unwrap()]))
            .expect("build-info is JSON");

    assert_eq!(info_a["registry_fingerprint"], info_b["registry_fingerprint"]);
    assert_ne!(info_a["source_hash"], info_b["source_hash"]);
    assert_eq!(info_a["compiler_version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(info_a["source_hash"].as_str().map(str::len), Some(64));
}

/// Identical text in different files hashes identically.
#[test]
fn source_hash_depends_only_on_content() {
    let a = temp_source("time: wave: sine\n");
    let b = temp_source("time: wave: sine\n");
    let first = run_ok(&["--emit", "build-info", a.to_str().unwrap()]);
    let second = run_ok(&["--emit", "build-info", b.to_str().unwrap()]);
    assert_eq!(first, second);
}

#[test]
fn output_file_matches_stdout() {
    let source = patterns_dir().join("breathe.pbb");
    let source = source.to_str().unwrap();
    let out = std::env::temp_dir().join(format!("beacon_repro_{}_out.js", std::process::id()));
    let out_str = out.to_str().unwrap();

    let stdout = run_ok(&[source]);
    let written = run_ok(&[source, "-o", out_str]);
    assert!(written.is_empty());
    let contents = std::fs::read_to_string(&out).expect("output file");
    assert_eq!(contents, stdout);
}

#[test]
fn source_flag_echoes_the_pattern() {
    let path = temp_source("# soft glow\ntime: wave: sine\n");
    let code = run_ok(&["--source", path.to_str().unwrap()]);
    let name = path.file_name().unwrap().to_string_lossy();
    assert!(code.starts_with(&format!("// {name}\n// # soft glow\n// time: wave: sine\n\n")));
}

#[test]
fn compile_errors_exit_with_status_one() {
    let path = temp_source("0.5\n0.6\n");
    let output = run_beacon(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E0401"), "stderr: {stderr}");
}

#[test]
fn unknown_keyword_is_reported_on_stderr() {
    let path = temp_source("sparkle\n");
    let output = run_beacon(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E0200"), "stderr: {stderr}");
}

#[test]
fn missing_source_exits_with_status_two() {
    let missing = std::env::temp_dir().join("beacon_repro_does_not_exist.pbb");
    let output = run_beacon(&[missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}
