use std::ops::Deref;

use super::arena::{NodeId, Tree};
use super::{blocked_signal, TreeLocker};
use crate::path::from_slash;

/// A node of a particular locker, possibly the null node above root.
///
/// This is the shared part of [`Node`], [`NodeLock`] and [`PathLock`]; it
/// carries no reference of its own and is only reachable through one of
/// those owners.
#[derive(Debug)]
pub struct NodeRef {
    pub(crate) locker: TreeLocker,
    pub(crate) node: Option<NodeId>,
}

impl NodeRef {
    pub(crate) fn new(locker: TreeLocker, node: Option<NodeId>) -> Self {
        NodeRef { locker, node }
    }

    fn duplicate(&self) -> NodeRef {
        NodeRef::new(self.locker.clone(), self.node)
    }

    pub fn locker(&self) -> &TreeLocker {
        &self.locker
    }

    /// Whether this is the null node above root.
    pub fn is_null(&self) -> bool {
        self.node.is_none()
    }

    /// A unique identifier for the underlying node, `0` for the null node.
    ///
    /// Stable for as long as any reference to the node is held.
    pub fn id(&self) -> u64 {
        match self.node {
            Some(id) => self.locker.lock_tree().node(id).serial,
            None => 0,
        }
    }

    /// Whether the node has been moved under the exile pseudo root.
    pub fn is_exile(&self) -> bool {
        self.locker.lock_tree().is_exile(self.node)
    }

    /// The current slash path, `None` once exiled.
    ///
    /// Holding a read or write path lock of this node keeps the answer
    /// valid; otherwise it may change right after returning.
    pub fn slash_path(&self) -> Option<String> {
        self.locker.lock_tree().slash_path(self.node)
    }

    /// The current path rendered with the platform separator.
    pub fn file_path(&self) -> Option<String> {
        self.slash_path().map(|p| from_slash(&p))
    }

    /// The current reference count. Another thread may change it right
    /// after this returns unless the callers agree on a protocol.
    pub fn current_refs(&self) -> u64 {
        match self.node {
            Some(id) => self.locker.lock_tree().node(id).rc,
            None => 0,
        }
    }

    /// The node's reader counter: readers, `0` when free, `-1` when
    /// write locked.
    pub fn reader_count(&self) -> i64 {
        match self.node {
            Some(id) => self.locker.lock_tree().node(id).readers,
            None => 0,
        }
    }

    /// Whether any child node is currently allocated under this node.
    pub fn has_child(&self) -> bool {
        match self.node {
            Some(id) => !self.locker.lock_tree().node(id).children.is_empty(),
            // The null node always has root below it.
            None => true,
        }
    }

    /// Retain another handle to the same node.
    pub fn retain_node(&self) -> Node {
        let mut tree = self.locker.lock_tree();
        if let Some(id) = self.node {
            tree.retain(id);
        }
        Node::from_retained(self.duplicate())
    }

    fn parent(&self, tree: &Tree) -> Option<NodeId> {
        self.node.and_then(|id| tree.node(id).parent)
    }

    /// Try to read-lock the path of this node's parent.
    pub fn try_rlock_parent(&self) -> Option<PathLock> {
        let mut tree = self.locker.lock_tree();
        let parent = self.parent(&tree);
        tree.try_rlock_path(parent, false).ok()?;
        if let Some(id) = parent {
            tree.retain(id);
        }
        Some(PathLock::from_retained(
            NodeRef::new(self.locker.clone(), parent),
            false,
        ))
    }

    /// Blocking version of [`NodeRef::try_rlock_parent`].
    pub fn rlock_parent(&self) -> PathLock {
        self.locker.block_on(|tree| {
            let parent = self.parent(tree);
            match tree.try_rlock_path(parent, true) {
                Ok(()) => {
                    if let Some(id) = parent {
                        tree.retain(id);
                    }
                    Ok(PathLock::from_retained(
                        NodeRef::new(self.locker.clone(), parent),
                        false,
                    ))
                }
                Err(blocker) => Err(blocked_signal(tree.wait_signal(blocker))),
            }
        })
    }
}

/// A retained handle on a node.
///
/// Keeps the node allocated (and its identity stable) until dropped or
/// explicitly freed. Cloning retains the node again.
#[derive(Debug)]
pub struct Node {
    inner: NodeRef,
}

impl Node {
    /// Wrap a node whose reference has already been taken for us.
    pub(crate) fn from_retained(inner: NodeRef) -> Self {
        Node { inner }
    }

    /// Release this handle.
    pub fn free(self) {}

    /// Obtain a second independent handle to the same node.
    pub fn retain(&self) -> Node {
        self.inner.retain_node()
    }

    pub fn try_rlock_node(&self) -> Option<NodeLock> {
        let mut tree = self.locker.lock_tree();
        if !tree.try_rlock_node(self.node, false) {
            return None;
        }
        Some(NodeLock::grant(&mut tree, self.inner.duplicate(), false))
    }

    /// Blocking read lock of this node alone.
    pub fn rlock_node(&self) -> NodeLock {
        self.locker.block_on(|tree| {
            if tree.try_rlock_node(self.node, true) {
                return Ok(NodeLock::grant(tree, self.inner.duplicate(), false));
            }
            let blocker = self.node.and_then(|id| tree.wait_signal(id));
            Err(blocked_signal(blocker))
        })
    }

    pub fn try_wlock_node(&self) -> Option<NodeLock> {
        let mut tree = self.locker.lock_tree();
        if !tree.try_wlock_node(self.node) {
            return None;
        }
        Some(NodeLock::grant(&mut tree, self.inner.duplicate(), true))
    }

    pub fn try_rlock_path(&self) -> Option<PathLock> {
        let mut tree = self.locker.lock_tree();
        tree.try_rlock_path(self.node, false).ok()?;
        Some(PathLock::grant(&mut tree, self.inner.duplicate(), false))
    }

    /// Blocking read path lock from this node's current position.
    pub fn rlock_path(&self) -> PathLock {
        self.locker.block_on(|tree| match tree.try_rlock_path(self.node, true) {
            Ok(()) => Ok(PathLock::grant(tree, self.inner.duplicate(), false)),
            Err(blocker) => Err(blocked_signal(tree.wait_signal(blocker))),
        })
    }

    pub fn try_wlock_path(&self) -> Option<PathLock> {
        let mut tree = self.locker.lock_tree();
        if !tree.try_wlock_path(self.node) {
            return None;
        }
        Some(PathLock::grant(&mut tree, self.inner.duplicate(), true))
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl Deref for Node {
    type Target = NodeRef;

    fn deref(&self) -> &NodeRef {
        &self.inner
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(id) = self.inner.node {
            self.inner.locker.lock_tree().free(id);
        }
    }
}

/// A read or write lock on a single node, without any ancestor.
///
/// Does not stop the node from being moved, but lets other operations see
/// that someone is attending to it. Released on drop.
#[derive(Debug)]
pub struct NodeLock {
    inner: NodeRef,
    write: bool,
    armed: bool,
}

impl NodeLock {
    /// Wrap a node whose lock and reference are already held for us.
    pub(crate) fn from_retained(inner: NodeRef, write: bool) -> Self {
        NodeLock {
            inner,
            write,
            armed: true,
        }
    }

    /// Retain the node for a lock that was just acquired under `tree`.
    fn grant(tree: &mut Tree, inner: NodeRef, write: bool) -> Self {
        if let Some(id) = inner.node {
            tree.retain(id);
        }
        NodeLock::from_retained(inner, write)
    }

    /// Disarm the guard and hand its lock and reference to the caller.
    pub(crate) fn into_parts(mut self) -> (NodeRef, bool) {
        self.armed = false;
        (self.inner.duplicate(), self.write)
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    /// Turn this read lock into a write lock if it is the only reader.
    ///
    /// Returns `false` and stays a read lock otherwise.
    pub fn try_upgrade(&mut self) -> bool {
        if self.write {
            panic!("must only upgrade a read lock");
        }
        let Some(id) = self.inner.node else {
            panic!("null node can never be write locked");
        };
        if !self.inner.locker.lock_tree().try_upgrade_node(id) {
            return false;
        }
        self.write = true;
        true
    }

    /// Turn this write lock into a read lock, waking blocked readers.
    pub fn downgrade(&mut self) {
        if !self.write {
            panic!("must only downgrade a write lock");
        }
        let Some(id) = self.inner.node else {
            panic!("null node can never be write locked");
        };
        self.inner.locker.lock_tree().downgrade_node(id);
        self.write = false;
    }

    pub fn unlock(self) {}
}

impl Deref for NodeLock {
    type Target = NodeRef;

    fn deref(&self) -> &NodeRef {
        &self.inner
    }
}

impl Drop for NodeLock {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let mut tree = self.inner.locker.lock_tree();
        tree.unlock_node(self.inner.node, self.write);
        if let Some(id) = self.inner.node {
            tree.free(id);
        }
    }
}

/// A lock from root down to a node.
///
/// Every ancestor is read locked and the node itself is read or write
/// locked, so nobody can move any node on the path while this is held and
/// the node's path is safe to read. Released on drop.
#[derive(Debug)]
pub struct PathLock {
    inner: NodeRef,
    write: bool,
    armed: bool,
}

impl PathLock {
    /// Wrap a node whose path lock and reference are already held for us.
    pub(crate) fn from_retained(inner: NodeRef, write: bool) -> Self {
        PathLock {
            inner,
            write,
            armed: true,
        }
    }

    fn grant(tree: &mut Tree, inner: NodeRef, write: bool) -> Self {
        if let Some(id) = inner.node {
            tree.retain(id);
        }
        PathLock::from_retained(inner, write)
    }

    pub(crate) fn into_parts(mut self) -> (NodeRef, bool) {
        self.armed = false;
        (self.inner.duplicate(), self.write)
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    pub fn unlock(self) {}
}

impl Deref for PathLock {
    type Target = NodeRef;

    fn deref(&self) -> &NodeRef {
        &self.inner
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let mut tree = self.inner.locker.lock_tree();
        tree.unlock_path(self.inner.node, self.write);
        if let Some(id) = self.inner.node {
            tree.free(id);
        }
    }
}
