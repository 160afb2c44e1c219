//! Multi-threaded workload that hammers one namespace and checks that the
//! tree drains back to a bare root afterwards.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

use crate::config::{StressConfig, Workload};
use crate::error::{Result, TreeLockError};
use crate::namespace::{NameSet, Namespace, OpenIntent};
use crate::path::{clean_slash_path, split_parent};
use crate::treelock::{join, split, TreeStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressOptions {
    pub threads: usize,
    /// Operations per worker thread.
    pub iterations: u64,
    pub paths: usize,
    pub seed: Option<u64>,
    pub workload: Workload,
}

impl StressOptions {
    pub fn from_config(config: &StressConfig) -> Self {
        StressOptions {
            threads: config.get_threads(),
            iterations: config.get_iterations(),
            paths: config.get_paths(),
            seed: config.seed,
            workload: config.workload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    ReadPath,
    WritePath,
    ReadNode,
    Query,
    Create,
    Rename,
    Delete,
    SplitJoin,
    Upgrade,
}

impl Operation {
    /// Weights out of 100 for each workload.
    fn weights(workload: Workload) -> [(Operation, u32); 9] {
        use Operation::*;
        match workload {
            Workload::Mixed => [
                (ReadPath, 20),
                (WritePath, 10),
                (ReadNode, 10),
                (Query, 5),
                (Create, 15),
                (Rename, 10),
                (Delete, 10),
                (SplitJoin, 10),
                (Upgrade, 10),
            ],
            Workload::ReadHeavy => [
                (ReadPath, 40),
                (WritePath, 5),
                (ReadNode, 20),
                (Query, 10),
                (Create, 8),
                (Rename, 5),
                (Delete, 4),
                (SplitJoin, 4),
                (Upgrade, 4),
            ],
            Workload::WriteHeavy => [
                (ReadPath, 10),
                (WritePath, 20),
                (ReadNode, 5),
                (Query, 5),
                (Create, 20),
                (Rename, 15),
                (Delete, 15),
                (SplitJoin, 5),
                (Upgrade, 5),
            ],
        }
    }
}

#[derive(Debug, Default, Serialize, Clone, PartialEq, Eq)]
pub struct OperationStats {
    pub read_path: u64,
    pub write_path: u64,
    pub read_node: u64,
    pub query: u64,
    pub create: u64,
    pub rename: u64,
    pub delete: u64,
    pub split_join: u64,
    pub upgrade: u64,
}

impl OperationStats {
    fn increment(&mut self, op: Operation) {
        match op {
            Operation::ReadPath => self.read_path += 1,
            Operation::WritePath => self.write_path += 1,
            Operation::ReadNode => self.read_node += 1,
            Operation::Query => self.query += 1,
            Operation::Create => self.create += 1,
            Operation::Rename => self.rename += 1,
            Operation::Delete => self.delete += 1,
            Operation::SplitJoin => self.split_join += 1,
            Operation::Upgrade => self.upgrade += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.read_path
            + self.write_path
            + self.read_node
            + self.query
            + self.create
            + self.rename
            + self.delete
            + self.split_join
            + self.upgrade
    }
}

impl std::ops::AddAssign<&OperationStats> for OperationStats {
    fn add_assign(&mut self, other: &OperationStats) {
        self.read_path += other.read_path;
        self.write_path += other.write_path;
        self.read_node += other.read_node;
        self.query += other.query;
        self.create += other.create;
        self.rename += other.rename;
        self.delete += other.delete;
        self.split_join += other.split_join;
        self.upgrade += other.upgrade;
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct RunReport {
    pub threads: usize,
    pub iterations: u64,
    pub paths: usize,
    pub seed: u64,
    pub workload: String,
    pub start_time: String,
    pub end_time: String,
    pub operations: OperationStats,
    pub total_ops: u64,
    pub benign_errors: BTreeMap<String, u64>,
    pub fatal_errors: BTreeMap<String, u64>,
    pub final_tree: TreeStats,
    pub surviving_names: usize,
    pub status: String,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.fatal_errors.is_empty()
    }
}

/// The names workers fight over: every fourth one is a directory holding
/// the next three.
fn name_pool(paths: usize) -> Vec<String> {
    (0..paths)
        .map(|i| {
            let dir = i - i % 4;
            if i == dir {
                format!("/d{}", dir)
            } else {
                format!("/d{}/f{}", dir, i)
            }
        })
        .collect()
}

pub fn run_stress(options: &StressOptions) -> Result<RunReport> {
    if options.threads == 0 || options.paths == 0 {
        return Err(TreeLockError::Config(
            "stress needs at least one thread and one path".to_string(),
        ));
    }
    let seed = options.seed.unwrap_or_else(|| {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64
    });
    let pool = Arc::new(name_pool(options.paths));
    let namespace = Arc::new(Namespace::new(NameSet::new()));

    info!(
        "stress workload: threads={}, iterations={}, paths={}, seed={}, workload={}",
        options.threads, options.iterations, options.paths, seed, options.workload
    );

    let start_time = chrono::Utc::now();
    let mut handles = Vec::with_capacity(options.threads);
    for worker_id in 0..options.threads {
        let worker = Worker {
            id: worker_id,
            namespace: namespace.clone(),
            pool: pool.clone(),
            iterations: options.iterations,
            workload: options.workload,
            rng_seed: seed ^ (worker_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        };
        handles.push(thread::spawn(move || worker.run()));
    }

    let mut aggregate_stats = OperationStats::default();
    let mut benign_errors: BTreeMap<String, u64> = BTreeMap::new();
    let mut fatal_errors: BTreeMap<String, u64> = BTreeMap::new();

    for handle in handles {
        match handle.join() {
            Ok(result) => {
                aggregate_stats += &result.stats;
                merge_counts(&mut benign_errors, &result.benign_errors);
                merge_counts(&mut fatal_errors, &result.fatal_errors);
            }
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                *fatal_errors.entry("thread_panic".to_string()).or_insert(0) += 1;
                warn!("worker thread panicked: {}", msg);
            }
        }
    }

    let final_tree = namespace.locker().stats();
    if !final_tree.is_idle() {
        warn!("tree did not drain: {:?}", final_tree);
        fatal_errors.insert("tree_not_idle".to_string(), 1);
    }
    let names = namespace.backend().names();
    let orphans = names
        .iter()
        .filter(|name| match split_parent(name) {
            Some(("/", _)) | None => false,
            Some((dir, _)) => names.binary_search_by(|n| n.as_str().cmp(dir)).is_err(),
        })
        .count();
    if orphans > 0 {
        warn!("{} names survived without their parent", orphans);
        fatal_errors.insert("orphan_name".to_string(), orphans as u64);
    }

    let end_time = chrono::Utc::now();
    let status = if fatal_errors.is_empty() {
        "passed".to_string()
    } else {
        "failed".to_string()
    };

    Ok(RunReport {
        threads: options.threads,
        iterations: options.iterations,
        paths: options.paths,
        seed,
        workload: options.workload.to_string(),
        start_time: start_time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        end_time: end_time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        total_ops: aggregate_stats.total(),
        operations: aggregate_stats,
        benign_errors,
        fatal_errors,
        final_tree,
        surviving_names: names.len(),
        status,
    })
}

pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

fn merge_counts(target: &mut BTreeMap<String, u64>, source: &BTreeMap<String, u64>) {
    for (key, value) in source {
        *target.entry(key.clone()).or_insert(0) += value;
    }
}

struct Worker {
    id: usize,
    namespace: Arc<Namespace<NameSet>>,
    pool: Arc<Vec<String>>,
    iterations: u64,
    workload: Workload,
    rng_seed: u64,
}

struct WorkerResult {
    stats: OperationStats,
    benign_errors: BTreeMap<String, u64>,
    fatal_errors: BTreeMap<String, u64>,
}

enum OperationResult {
    Completed,
    Benign { label: String },
    Fatal { label: String, detail: String },
}

impl OperationResult {
    fn fatal(label: &str, detail: String) -> Self {
        OperationResult::Fatal {
            label: label.to_string(),
            detail,
        }
    }
}

impl From<TreeLockError> for OperationResult {
    fn from(err: TreeLockError) -> Self {
        let label = match err {
            TreeLockError::NotFound(_) => "not_found",
            TreeLockError::SharingViolation(_) => "sharing_violation",
            TreeLockError::AccessDenied(_) => "access_denied",
            TreeLockError::AlreadyExists(_) => "already_exists",
            TreeLockError::DirectoryNotEmpty(_) => "directory_not_empty",
            TreeLockError::Backend(_) => "backend",
            other => return OperationResult::fatal("unexpected_error", other.to_string()),
        };
        OperationResult::Benign {
            label: label.to_string(),
        }
    }
}

fn outcome(result: Result<OperationResult>) -> OperationResult {
    result.unwrap_or_else(OperationResult::from)
}

impl Worker {
    fn run(self) -> WorkerResult {
        let mut rng = SmallRng::seed_from_u64(self.rng_seed);
        let mut stats = OperationStats::default();
        let mut benign_errors: BTreeMap<String, u64> = BTreeMap::new();
        let mut fatal_errors: BTreeMap<String, u64> = BTreeMap::new();

        for _ in 0..self.iterations {
            let op = self.pick_operation(&mut rng);
            let result = match op {
                Operation::ReadPath => self.read_path(&mut rng),
                Operation::WritePath => self.write_path(&mut rng),
                Operation::ReadNode => self.read_node(&mut rng),
                Operation::Query => outcome(self.query(&mut rng)),
                Operation::Create => outcome(self.create(&mut rng)),
                Operation::Rename => outcome(self.rename(&mut rng)),
                Operation::Delete => outcome(self.delete(&mut rng)),
                Operation::SplitJoin => self.split_join(&mut rng),
                Operation::Upgrade => self.upgrade(&mut rng),
            };

            match result {
                OperationResult::Completed => stats.increment(op),
                OperationResult::Benign { label } => {
                    *benign_errors.entry(label).or_insert(0) += 1;
                }
                OperationResult::Fatal { label, detail } => {
                    *fatal_errors.entry(label.clone()).or_insert(0) += 1;
                    debug!("worker {} fatal {}: {}", self.id, label, detail);
                }
            }
        }

        WorkerResult {
            stats,
            benign_errors,
            fatal_errors,
        }
    }

    fn pick_operation(&self, rng: &mut SmallRng) -> Operation {
        let mut bucket = rng.gen_range(0..100);
        for (op, weight) in Operation::weights(self.workload) {
            if bucket < weight {
                return op;
            }
            bucket -= weight;
        }
        Operation::ReadPath
    }

    fn pick<'a>(&'a self, rng: &mut SmallRng) -> &'a str {
        &self.pool[rng.gen_range(0..self.pool.len())]
    }

    fn read_path(&self, rng: &mut SmallRng) -> OperationResult {
        let path = self.pick(rng);
        let lock = self.namespace.locker().rlock_slash(path);
        let held = lock.slash_path();
        if held.as_deref() != Some(path) {
            return OperationResult::fatal(
                "path_moved_under_lock",
                format!("locked {} but node reports {:?}", path, held),
            );
        }
        OperationResult::Completed
    }

    fn write_path(&self, rng: &mut SmallRng) -> OperationResult {
        let path = self.pick(rng);
        let Some(lock) = self.namespace.locker().try_wlock_slash(path) else {
            return OperationResult::Benign {
                label: "write_contended".to_string(),
            };
        };
        if lock.reader_count() != -1 {
            return OperationResult::fatal(
                "writer_not_exclusive",
                format!("{} has reader count {}", path, lock.reader_count()),
            );
        }
        OperationResult::Completed
    }

    fn read_node(&self, rng: &mut SmallRng) -> OperationResult {
        let node = self.namespace.locker().resolve(self.pick(rng));
        let lock = node.rlock_node();
        if lock.reader_count() < 1 {
            return OperationResult::fatal(
                "reader_not_counted",
                format!("node {} has reader count {}", lock.id(), lock.reader_count()),
            );
        }
        OperationResult::Completed
    }

    fn query(&self, rng: &mut SmallRng) -> Result<OperationResult> {
        let handle = self.namespace.open(self.pick(rng))?;
        let path = self.namespace.path(&handle)?;
        if clean_slash_path(&path) != path {
            return Ok(OperationResult::fatal(
                "unclean_path",
                format!("node path {:?} is not canonical", path),
            ));
        }
        Ok(OperationResult::Completed)
    }

    fn create(&self, rng: &mut SmallRng) -> Result<OperationResult> {
        self.namespace.create(self.pick(rng))?;
        Ok(OperationResult::Completed)
    }

    fn rename(&self, rng: &mut SmallRng) -> Result<OperationResult> {
        let handle = self.namespace.open(self.pick(rng))?;
        let target = self.pick(rng);
        self.namespace.rename(&handle, target, rng.gen_bool(0.5))?;
        Ok(OperationResult::Completed)
    }

    fn delete(&self, rng: &mut SmallRng) -> Result<OperationResult> {
        let handle = self
            .namespace
            .open_with(self.pick(rng), OpenIntent::Delete)?;
        if rng.gen_bool(0.5) {
            self.namespace.can_delete(&handle)?;
        }
        self.namespace.delete(&handle)?;
        match self.namespace.path(&handle) {
            Err(TreeLockError::NotFound(_)) => Ok(OperationResult::Completed),
            other => Ok(OperationResult::fatal(
                "deleted_name_visible",
                format!("path of deleted handle: {:?}", other),
            )),
        }
    }

    fn split_join(&self, rng: &mut SmallRng) -> OperationResult {
        let path = self.pick(rng);
        let locker = self.namespace.locker();
        let lock = if rng.gen_bool(0.5) {
            locker.try_wlock_slash(path)
        } else {
            Some(locker.rlock_slash(path))
        };
        let Some(lock) = lock else {
            return OperationResult::Benign {
                label: "write_contended".to_string(),
            };
        };
        let id = lock.id();
        let write = lock.is_write();

        let (parent, node) = split(lock);
        let joined = join(parent, node);
        if joined.id() != id || joined.is_write() != write {
            return OperationResult::fatal(
                "split_join_mismatch",
                format!("node {} write={} came back as {}", id, write, joined.id()),
            );
        }
        OperationResult::Completed
    }

    fn upgrade(&self, rng: &mut SmallRng) -> OperationResult {
        let node = self.namespace.locker().resolve(self.pick(rng));
        let Some(mut lock) = node.try_rlock_node() else {
            return OperationResult::Benign {
                label: "read_contended".to_string(),
            };
        };
        if !lock.try_upgrade() {
            return OperationResult::Benign {
                label: "upgrade_contended".to_string(),
            };
        }
        if lock.reader_count() != -1 {
            return OperationResult::fatal(
                "upgrade_not_exclusive",
                format!("node {} has reader count {}", lock.id(), lock.reader_count()),
            );
        }
        lock.downgrade();
        OperationResult::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_pool_nests_files_under_directories() {
        assert_eq!(
            name_pool(6),
            vec!["/d0", "/d0/f1", "/d0/f2", "/d0/f3", "/d4", "/d4/f5"]
        );
    }

    #[test]
    fn test_weights_sum_to_hundred() {
        for workload in [Workload::Mixed, Workload::ReadHeavy, Workload::WriteHeavy] {
            let total: u32 = Operation::weights(workload).iter().map(|(_, w)| w).sum();
            assert_eq!(total, 100, "{}", workload);
        }
    }

    #[test]
    fn test_single_thread_run_passes() {
        let options = StressOptions {
            threads: 1,
            iterations: 500,
            paths: 8,
            seed: Some(7),
            workload: Workload::Mixed,
        };
        let report = run_stress(&options).unwrap();
        assert!(report.passed(), "{:?}", report.fatal_errors);
        assert_eq!(report.seed, 7);
        assert_eq!(report.status, "passed");
        assert!(report.final_tree.is_idle());
        assert_eq!(
            report.total_ops + report.benign_errors.values().sum::<u64>(),
            500
        );
    }
}
