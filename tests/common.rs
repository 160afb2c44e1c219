use parking_lot::{const_mutex, Mutex, MutexGuard};
use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use treelock::TreeLocker;

/// Get the path to the treelock binary for testing.
#[allow(dead_code)]
pub fn get_treelock_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("treelock").to_path_buf()
}

static CONFIG_ENV_LOCK: Mutex<()> = const_mutex(());

/// Isolated config directory exported through `TREELOCK_CONFIG_DIR`.
///
/// Tests in one binary share the process environment, so each context
/// holds a global lock until it is dropped.
#[allow(dead_code)]
pub struct TestConfigContext {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    _env_guard: MutexGuard<'static, ()>,
}

impl Default for TestConfigContext {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl TestConfigContext {
    pub fn new() -> Self {
        let env_guard = CONFIG_ENV_LOCK.lock();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("config");

        env::set_var(
            "TREELOCK_CONFIG_DIR",
            config_dir.to_string_lossy().to_string(),
        );

        Self {
            temp_dir,
            config_dir,
            _env_guard: env_guard,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

impl Drop for TestConfigContext {
    fn drop(&mut self) {
        env::remove_var("TREELOCK_CONFIG_DIR");
    }
}

/// Assert that every node except root has been reclaimed.
#[allow(dead_code)]
pub fn assert_idle(locker: &TreeLocker) {
    let stats = locker.stats();
    assert!(stats.is_idle(), "tree still holds nodes: {:?}", stats);
    assert_eq!(stats.root_children, 0);
}

/// Poll until `cond` holds, panicking after a generous timeout.
#[allow(dead_code)]
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(1));
    }
}
