//! Hierarchical path locking over a reference-counted node tree.
//!
//! A [`TreeLocker`] maps normalized paths onto nodes. Callers hold nodes
//! through retained [`Node`] handles and lock them either alone
//! ([`NodeLock`]) or together with every ancestor ([`PathLock`]). All
//! structural state lives behind one mutex which is never held while a
//! thread sleeps waiting for a node.

mod arena;
mod locks;
mod ops;


pub use locks::{Node, NodeLock, NodeRef, PathLock};
pub use ops::{exchange, join, split};

use arena::{NodeId, Tree, WaitSignal};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::sync::Arc;

use crate::path::{clean_file_path, clean_slash_path};

/// Point-in-time counters describing the whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    /// Allocated nodes, root and exile nodes included.
    pub live_nodes: usize,
    pub root_refs: u64,
    pub root_readers: i64,
    pub root_children: usize,
}

impl TreeStats {
    /// True when nothing but the bare root is left.
    pub fn is_idle(&self) -> bool {
        self.live_nodes == 1 && self.root_refs == 0 && self.root_readers == 0
    }
}

#[derive(Debug)]
struct Shared {
    tree: Mutex<Tree>,
}

/// The registry owning the root node and the structural mutex.
///
/// Cloning is cheap and yields a handle to the same tree; every guard
/// remembers the locker it came from.
#[derive(Debug, Clone)]
pub struct TreeLocker {
    shared: Arc<Shared>,
}

impl TreeLocker {
    pub fn new() -> Self {
        TreeLocker {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree::new()),
            }),
        }
    }

    pub(crate) fn lock_tree(&self) -> MutexGuard<'_, Tree> {
        self.shared.tree.lock()
    }

    pub(crate) fn same_locker(&self, other: &TreeLocker) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn node_ref(&self, node: Option<NodeId>) -> NodeRef {
        NodeRef::new(self.clone(), node)
    }

    /// Run `attempt` under the mutex until it succeeds, sleeping on the
    /// blocking node's signal between attempts with the mutex released.
    pub(crate) fn block_on<T>(
        &self,
        mut attempt: impl FnMut(&mut Tree) -> std::result::Result<T, Arc<WaitSignal>>,
    ) -> T {
        loop {
            let signal = {
                let mut tree = self.lock_tree();
                match attempt(&mut tree) {
                    Ok(value) => return value,
                    Err(signal) => signal,
                }
            };
            tracing::trace!("blocked on busy node, waiting for writer release");
            signal.wait();
        }
    }

    fn alloc_clean_path(&self, p: &str) -> Node {
        let mut tree = self.lock_tree();
        let id = tree.alloc_retain_clean(p);
        Node::from_retained(self.node_ref(Some(id)))
    }

    /// Resolve a slash path to a retained node, creating it on demand.
    ///
    /// Root is counted like any other node: each root handle adds to its
    /// reference count until dropped, but root itself is never reclaimed.
    pub fn resolve(&self, p: &str) -> Node {
        self.alloc_clean_path(&clean_slash_path(p))
    }

    /// Resolve a Windows-style file path to a retained node.
    pub fn resolve_file(&self, p: &str) -> Node {
        self.alloc_clean_path(&clean_file_path(p))
    }

    /// Allocate a retained node under the exile pseudo root.
    pub fn alloc_exile(&self) -> Node {
        let mut tree = self.lock_tree();
        let id = tree.alloc_retain_exile();
        tracing::debug!("allocated exile node");
        Node::from_retained(self.node_ref(Some(id)))
    }

    fn try_rlock_clean(&self, p: &str) -> Option<PathLock> {
        let mut tree = self.lock_tree();
        let id = tree.alloc_retain_clean(p);
        if tree.try_rlock_path(Some(id), false).is_err() {
            tree.free(id);
            tracing::trace!("read path lock contended on {}", p);
            return None;
        }
        Some(PathLock::from_retained(self.node_ref(Some(id)), false))
    }

    pub fn try_rlock_slash(&self, p: &str) -> Option<PathLock> {
        self.try_rlock_clean(&clean_slash_path(p))
    }

    pub fn try_rlock_file(&self, p: &str) -> Option<PathLock> {
        self.try_rlock_clean(&clean_file_path(p))
    }

    fn rlock_clean(&self, p: &str) -> PathLock {
        self.block_on(|tree| {
            let id = tree.alloc_retain_clean(p);
            match tree.try_rlock_path(Some(id), true) {
                Ok(()) => Ok(PathLock::from_retained(self.node_ref(Some(id)), false)),
                Err(blocker) => {
                    let signal = tree.wait_signal(blocker);
                    tree.free(id);
                    Err(blocked_signal(signal))
                }
            }
        })
    }

    /// Blocking read path lock. Waits out writers anywhere on the path.
    pub fn rlock_slash(&self, p: &str) -> PathLock {
        self.rlock_clean(&clean_slash_path(p))
    }

    pub fn rlock_file(&self, p: &str) -> PathLock {
        self.rlock_clean(&clean_file_path(p))
    }

    fn try_wlock_clean(&self, p: &str) -> Option<PathLock> {
        let mut tree = self.lock_tree();
        let id = tree.alloc_retain_clean(p);
        if !tree.try_wlock_path(Some(id)) {
            tree.free(id);
            tracing::trace!("write path lock contended on {}", p);
            return None;
        }
        Some(PathLock::from_retained(self.node_ref(Some(id)), true))
    }

    /// Try to write-lock a slash path. There is no blocking variant.
    pub fn try_wlock_slash(&self, p: &str) -> Option<PathLock> {
        self.try_wlock_clean(&clean_slash_path(p))
    }

    pub fn try_wlock_file(&self, p: &str) -> Option<PathLock> {
        self.try_wlock_clean(&clean_file_path(p))
    }

    /// Write path lock on a fresh exile node.
    pub fn wlock_exile(&self) -> PathLock {
        let mut tree = self.lock_tree();
        let id = tree.alloc_retain_exile();
        if !tree.try_wlock_path(Some(id)) {
            panic!("write lock exile failed");
        }
        PathLock::from_retained(self.node_ref(Some(id)), true)
    }

    pub fn stats(&self) -> TreeStats {
        let tree = self.lock_tree();
        let root = tree.node(tree.root());
        TreeStats {
            live_nodes: tree.live_nodes(),
            root_refs: root.rc,
            root_readers: root.readers,
            root_children: root.children.len(),
        }
    }
}

impl Default for TreeLocker {
    fn default() -> Self {
        Self::new()
    }
}

/// A blocked acquire always installs a signal on the blocker before it
/// reports failure, so a missing one means the arena is corrupt.
pub(crate) fn blocked_signal(signal: Option<Arc<WaitSignal>>) -> Arc<WaitSignal> {
    match signal {
        Some(signal) => signal,
        None => panic!("blocked node has no wait signal"),
    }
}
