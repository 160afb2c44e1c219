mod common;

use common::TestConfigContext;
use std::fs;
use treelock::config::{
    get_config_path, init_config, load_config, load_config_from, load_config_with_overlay,
    save_config, Workload,
};
use treelock::TreeLockError;

#[test]
fn test_missing_config_uses_defaults() {
    let ctx = TestConfigContext::new();

    let config = load_config().expect("Failed to load config");
    assert_eq!(config.log.get_filter(), "info");
    assert_eq!(config.stress.get_threads(), 8);
    assert!(!ctx.config_path().exists(), "load must not write a file");
}

#[test]
fn test_config_path_follows_env() {
    let ctx = TestConfigContext::new();
    assert_eq!(get_config_path().unwrap(), ctx.config_path());
}

#[test]
fn test_init_writes_defaults_once() {
    let ctx = TestConfigContext::new();

    let path = init_config(false).expect("Failed to init config");
    assert_eq!(path, ctx.config_path());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("workload = \"mixed\""), "{}", written);

    let err = init_config(false).unwrap_err();
    assert!(matches!(err, TreeLockError::AlreadyExists(_)));
    init_config(true).expect("force should overwrite");
}

#[test]
fn test_save_then_load_round_trips() {
    let _ctx = TestConfigContext::new();

    let mut config = load_config().unwrap();
    config.log.filter = Some("treelock=debug".to_string());
    config.stress.threads = Some(3);
    config.stress.seed = Some(42);
    config.stress.workload = Workload::WriteHeavy;
    save_config(&config).expect("Failed to save config");

    let reloaded = load_config().unwrap();
    assert_eq!(reloaded.log.get_filter(), "treelock=debug");
    assert_eq!(reloaded.stress.get_threads(), 3);
    assert_eq!(reloaded.stress.seed, Some(42));
    assert_eq!(reloaded.stress.workload, Workload::WriteHeavy);
    assert_eq!(reloaded.stress.get_iterations(), 10_000);
}

#[test]
fn test_overlay_wins_over_user_config() {
    let ctx = TestConfigContext::new();
    fs::create_dir_all(&ctx.config_dir).unwrap();
    fs::write(
        ctx.config_path(),
        "[stress]\nthreads = 2\niterations = 100\n",
    )
    .unwrap();
    let overlay = ctx.temp_dir.path().join("overlay.toml");
    fs::write(&overlay, "[stress]\nthreads = 6\n").unwrap();

    let config = load_config_with_overlay(Some(&overlay)).unwrap();
    assert_eq!(config.stress.get_threads(), 6);
    assert_eq!(config.stress.get_iterations(), 100);

    let config = load_config_with_overlay(None).unwrap();
    assert_eq!(config.stress.get_threads(), 2);
}

#[test]
fn test_load_from_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[stress]\nthreads = 0\n").unwrap();

    let err = load_config_from(&path).unwrap_err();
    assert!(matches!(err, TreeLockError::Config(_)));
    assert!(err.to_string().contains("stress.threads"));
}

#[test]
fn test_load_from_rejects_malformed_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[stress\nthreads = ").unwrap();

    let err = load_config_from(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_load_from_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config_from(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
