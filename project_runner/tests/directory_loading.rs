//! Integration tests for directory batches: run_directory and compile_directory.

use std::path::Path;
use std::sync::Arc;

use scripting::{CapturePolicy, ScriptConfig, ScriptHost, ScriptValue};
use tempfile::TempDir;

fn new_host() -> (ScriptHost, Arc<CapturePolicy>) {
    let policy = Arc::new(CapturePolicy::new());
    let host = ScriptHost::new(ScriptConfig::default(), policy.clone()).unwrap();
    (host, policy)
}

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

fn mixed_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "01_good.lua", "function good() return 'ok' end");
    write(dir.path(), "02_bad.lua", "function broken( return end");
    write(dir.path(), "03_also_good.luau", "also_good = true");
    write(dir.path(), "readme.txt", "not a script");
    std::fs::create_dir(dir.path().join("nested.lua")).unwrap();
    write(&dir.path().join("nested.lua"), "inner.lua", "inner = true");
    dir
}

#[test]
fn run_directory_isolates_bad_file() {
    let dir = mixed_dir();
    let (mut host, policy) = new_host();

    let result = host.run_directory(dir.path());
    assert!(result.is_err(), "first failure is returned");

    assert_eq!(host.invoke_with_result("good", ()).unwrap(), ScriptValue::from("ok"));
    assert!(host.get_bool("also_good", false));
    assert!(!host.get_bool("inner", false), "sub-directories are not entered");
    assert_eq!(host.script_count(), 2);

    let reports = policy.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("02_bad.lua"));
}

#[test]
fn run_directory_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "b.lua", "order = order .. 'b'");
    write(dir.path(), "a.lua", "order = 'a'");
    write(dir.path(), "c.lua", "order = order .. 'c'");

    let (mut host, policy) = new_host();
    host.run_directory(dir.path()).unwrap();
    assert_eq!(host.get_string("order", ""), "abc");
    assert!(policy.is_empty());
}

#[test]
fn run_directory_missing_dir_is_reported() {
    let (mut host, policy) = new_host();
    assert!(host.run_directory("/tmp/nonexistent_script_host_dir").is_err());
    assert_eq!(policy.len(), 1);
}

#[test]
fn compile_directory_skips_bad_file() {
    let dir = mixed_dir();
    let (host, policy) = new_host();

    let compiled = host.compile_directory(dir.path());
    assert_eq!(compiled.len(), 2);
    assert!(compiled[0].name.ends_with("01_good.lua"));
    assert!(compiled[1].name.ends_with("03_also_good.luau"));
    assert_eq!(policy.len(), 1);

    // Nothing ran yet
    assert!(!host.exists_callable("good"));
    for script in &compiled {
        host.run_compiled(script).unwrap();
    }
    assert!(host.exists_callable("good"));
    assert!(host.get_bool("also_good", false));
}

#[test]
fn compile_directory_missing_dir_is_empty() {
    let (host, policy) = new_host();
    assert!(host.compile_directory("/tmp/nonexistent_script_host_dir").is_empty());
    assert_eq!(policy.len(), 1);
}

#[test]
fn extension_filter_follows_config() {
    let dir = mixed_dir();
    let policy = Arc::new(CapturePolicy::new());
    let config = ScriptConfig {
        extensions: vec!["luau".to_string()],
        ..ScriptConfig::default()
    };
    let mut host = ScriptHost::new(config, policy.clone()).unwrap();

    host.run_directory(dir.path()).unwrap();
    assert!(host.get_bool("also_good", false));
    assert!(!host.exists_callable("good"));
    assert!(policy.is_empty());
}

#[test]
fn compile_file_then_run() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "value.lua", "return 6 * 7");

    let (host, _policy) = new_host();
    let script = host.compile_file(dir.path().join("value.lua")).unwrap();
    assert_eq!(host.run_compiled(&script).unwrap(), vec![ScriptValue::Number(42.0)]);
    // Compiled chunks can run more than once
    assert_eq!(host.run_compiled(&script).unwrap(), vec![ScriptValue::Number(42.0)]);
}
