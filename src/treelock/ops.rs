use super::locks::{NodeLock, NodeRef, PathLock};

/// Exchange the positions of the nodes held by two write path locks.
///
/// Names, parents and exile state are swapped and both former parents'
/// child maps are repointed. The locks keep referring to the same node
/// objects, so afterwards `a` holds whatever now sits where `b` was, and
/// vice versa. The read locks on the two ancestor chains travel with the
/// positions.
///
/// # Panics
///
/// If the locks come from different lockers, either one is a read lock,
/// either one is on root, a parent's child map no longer points back at
/// its node, or the swap would move an exiled node that still has children
/// back into the live tree.
pub fn exchange(a: &PathLock, b: &PathLock) {
    if !a.locker.same_locker(&b.locker) {
        panic!("must be created from the same TreeLocker");
    }
    // Write locks can never be held on the null node.
    if !a.is_write() || !b.is_write() {
        panic!("must be write locks");
    }
    let (Some(na), Some(nb)) = (a.node, b.node) else {
        panic!("must be write locks");
    };
    let mut tree = a.locker.lock_tree();
    if na == tree.root() || nb == tree.root() {
        panic!("cannot exchange the root node");
    }

    let (name_a, parent_a) = {
        let slot = tree.node(na);
        (slot.name.clone(), slot.parent)
    };
    let (name_b, parent_b) = {
        let slot = tree.node(nb);
        (slot.name.clone(), slot.parent)
    };
    let mismatch = |parent: Option<usize>, name: &str, node: usize| {
        parent.is_some_and(|p| tree.node(p).children.get(name) != Some(&node))
    };
    if mismatch(parent_a, &name_a, na) || mismatch(parent_b, &name_b, nb) {
        panic!("children mismatch");
    }

    let exile_a = tree.is_exile(Some(na));
    let exile_b = tree.is_exile(Some(nb));
    if (exile_a && !exile_b && !tree.node(na).children.is_empty())
        || (exile_b && !exile_a && !tree.node(nb).children.is_empty())
    {
        panic!("cannot resurrect exiled tree");
    }

    if let Some(p) = parent_a {
        tree.node_mut(p).children.insert(name_a.clone(), nb);
    }
    if let Some(p) = parent_b {
        tree.node_mut(p).children.insert(name_b.clone(), na);
    }
    {
        let slot = tree.node_mut(nb);
        slot.name = name_a;
        slot.parent = parent_a;
        slot.exile = exile_a;
    }
    {
        let slot = tree.node_mut(na);
        slot.name = name_b;
        slot.parent = parent_b;
        slot.exile = exile_b;
    }
    tracing::debug!("exchanged nodes (exile {} <-> {})", exile_a, exile_b);
}

/// Split a path lock into a read path lock on the parent plus a node lock
/// of the original mode on the node itself.
///
/// The parent lock is the null lock when the node is root or exiled.
/// The input is consumed unconditionally.
pub fn split(lock: PathLock) -> (PathLock, NodeLock) {
    let parent = {
        let mut tree = lock.locker.lock_tree();
        let parent = lock.node.and_then(|id| tree.node(id).parent);
        if let Some(id) = parent {
            tree.retain(id);
        }
        parent
    };
    let (inner, write) = lock.into_parts();
    let parent_lock =
        PathLock::from_retained(NodeRef::new(inner.locker.clone(), parent), false);
    (parent_lock, NodeLock::from_retained(inner, write))
}

/// Join a read path lock on a node's parent with a node lock on the node
/// into a single path lock in the node lock's mode.
///
/// Both inputs are consumed unconditionally: if a precondition fails they
/// are released while the panic unwinds.
///
/// # Panics
///
/// If the locks come from different lockers, the parent lock is a write
/// lock, or the parent lock's node is not the node lock's current parent.
pub fn join(parent: PathLock, node: NodeLock) -> PathLock {
    if !parent.locker.same_locker(&node.locker) {
        panic!("must be created from the same TreeLocker");
    }
    if parent.is_write() {
        panic!("parent must only be read lock");
    }
    {
        let mut tree = parent.locker.lock_tree();
        let actual = node.node.and_then(|id| tree.node(id).parent);
        if actual != parent.node {
            panic!("parent pathlock is not parent of the nodelock");
        }
        // The node's child map entry keeps the parent alive.
        if let Some(id) = parent.node {
            tree.free(id);
        }
    }
    let _ = parent.into_parts();
    let (inner, write) = node.into_parts();
    PathLock::from_retained(inner, write)
}
