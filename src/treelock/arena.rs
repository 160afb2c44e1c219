use fxhash::FxHashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Index of a node slot inside the arena.
pub(crate) type NodeId = usize;

/// A broadcast-once wakeup shared by every thread blocked on one node.
///
/// Created lazily by the first blocked acquirer, fired (and detached from
/// the node) when a writer releases or downgrades. Waiters then retry from
/// scratch; there is no queue and no fairness.
#[derive(Debug, Default)]
pub(crate) struct WaitSignal {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl WaitSignal {
    pub fn wait(&self) {
        let mut fired = self.fired.lock();
        while !*fired {
            self.cond.wait(&mut fired);
        }
    }

    fn fire(&self) {
        *self.fired.lock() = true;
        self.cond.notify_all();
    }
}

#[derive(Debug)]
pub(crate) struct NodeSlot {
    pub serial: u64,
    /// Child map entries plus retained handles and locks.
    pub rc: u64,
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: FxHashMap<String, NodeId>,
    pub exile: bool,
    /// `> 0` readers, `0` free, `-1` one writer.
    pub readers: i64,
    pub wait: Option<Arc<WaitSignal>>,
}

impl NodeSlot {
    fn new(serial: u64, name: String, parent: Option<NodeId>, exile: bool) -> Self {
        NodeSlot {
            serial,
            rc: 0,
            name,
            parent,
            children: FxHashMap::default(),
            exile,
            readers: 0,
            wait: None,
        }
    }
}

/// The node arena. Every method assumes the caller holds the locker mutex.
///
/// Methods taking `Option<NodeId>` treat `None` as the null node sitting
/// above root (and above every exile node): it is always read-lockable,
/// never write-lockable, and carries no state.
#[derive(Debug)]
pub(crate) struct Tree {
    slots: Vec<Option<NodeSlot>>,
    vacant: Vec<NodeId>,
    next_serial: u64,
    root: NodeId,
}

impl Tree {
    pub fn new() -> Self {
        let root = NodeSlot::new(1, String::new(), None, false);
        Tree {
            slots: vec![Some(root)],
            vacant: Vec::new(),
            next_serial: 2,
            root: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &NodeSlot {
        match self.slots.get(id) {
            Some(Some(slot)) => slot,
            _ => panic!("dangling node reference {}", id),
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeSlot {
        match self.slots.get_mut(id) {
            Some(Some(slot)) => slot,
            _ => panic!("dangling node reference {}", id),
        }
    }

    pub fn live_nodes(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }

    fn insert(&mut self, name: String, parent: Option<NodeId>, exile: bool) -> NodeId {
        let serial = self.next_serial;
        self.next_serial += 1;
        let slot = NodeSlot::new(serial, name, parent, exile);
        match self.vacant.pop() {
            Some(id) => {
                self.slots[id] = Some(slot);
                id
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    /// Look up or create the node for an already cleaned slash path.
    ///
    /// Freshly created nodes start with a zero count of their own; each one
    /// adds a reference to its parent through the child map entry. The
    /// caller must retain the returned node before releasing the mutex.
    fn alloc_clean(&mut self, p: &str) -> NodeId {
        let mut current = self.root;
        for base in p.split('/').filter(|c| !c.is_empty()) {
            if let Some(&child) = self.node(current).children.get(base) {
                current = child;
                continue;
            }
            let child = self.insert(base.to_string(), Some(current), false);
            let parent = self.node_mut(current);
            parent.rc += 1;
            parent.children.insert(base.to_string(), child);
            tracing::trace!("allocated node {:?} under {}", base, current);
            current = child;
        }
        current
    }

    /// Resolve a cleaned slash path and retain the node it lands on.
    pub fn alloc_retain_clean(&mut self, p: &str) -> NodeId {
        let id = self.alloc_clean(p);
        self.retain(id);
        id
    }

    /// Allocate a retained node under the exile pseudo root.
    pub fn alloc_retain_exile(&mut self) -> NodeId {
        let id = self.insert(String::new(), None, true);
        self.node_mut(id).rc = 1;
        id
    }

    pub fn retain(&mut self, id: NodeId) {
        let slot = self.node_mut(id);
        if slot.rc == u64::MAX {
            panic!("too many references");
        }
        slot.rc += 1;
    }

    /// Drop one reference, reclaiming the node and cascading to its
    /// ancestors once counts reach zero. Root is never reclaimed.
    pub fn free(&mut self, id: NodeId) {
        let root = self.root;
        let mut current = id;
        loop {
            let slot = self.node_mut(current);
            if slot.rc == 0 {
                panic!("invalid node state to free");
            }
            slot.rc -= 1;
            if slot.rc > 0 || current == root {
                return;
            }
            let parent = slot.parent;
            let Some(vacated) = self.slots[current].take() else {
                return;
            };
            self.vacant.push(current);
            match parent {
                Some(parent) => {
                    self.node_mut(parent).children.remove(&vacated.name);
                    tracing::trace!("reclaimed node {:?}", vacated.name);
                    current = parent;
                }
                None => {
                    tracing::trace!("reclaimed exile node {}", vacated.serial);
                    return;
                }
            }
        }
    }

    /// Whether the node lives under the exile pseudo root.
    ///
    /// Inherited exile flags are written back along the walked chain so the
    /// next query stops early.
    pub fn is_exile(&mut self, id: Option<NodeId>) -> bool {
        let mut chain = Vec::new();
        let mut current = id;
        while let Some(n) = current {
            let (exile, parent) = {
                let slot = self.node(n);
                (slot.exile, slot.parent)
            };
            if exile {
                for visited in chain {
                    self.node_mut(visited).exile = true;
                }
                return true;
            }
            chain.push(n);
            current = parent;
        }
        false
    }

    /// The current slash path of a node, or `None` once it is exiled.
    pub fn slash_path(&mut self, id: Option<NodeId>) -> Option<String> {
        if self.is_exile(id) {
            return None;
        }
        let mut names = Vec::new();
        let mut current = id;
        while let Some(n) = current {
            let slot = self.node(n);
            if !slot.name.is_empty() {
                names.push(slot.name.as_str());
            }
            current = slot.parent;
        }
        if names.is_empty() {
            return Some("/".to_string());
        }
        let mut out = String::new();
        for name in names.iter().rev() {
            out.push('/');
            out.push_str(name);
        }
        Some(out)
    }

    /// Ancestors of a node from root downwards, excluding the node itself.
    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(n) = current {
            chain.push(n);
            current = self.node(n).parent;
        }
        chain.reverse();
        chain
    }

    fn wake_waiters(&mut self, id: NodeId) {
        if let Some(signal) = self.node_mut(id).wait.take() {
            signal.fire();
        }
    }

    /// The signal a blocked acquirer should sleep on.
    pub fn wait_signal(&self, id: NodeId) -> Option<Arc<WaitSignal>> {
        self.node(id).wait.clone()
    }

    pub fn try_rlock_node(&mut self, id: Option<NodeId>, wait: bool) -> bool {
        let Some(id) = id else {
            return true;
        };
        let slot = self.node_mut(id);
        if slot.readers < 0 {
            if wait && slot.wait.is_none() {
                slot.wait = Some(Arc::new(WaitSignal::default()));
            }
            return false;
        }
        if slot.readers == i64::MAX {
            return false;
        }
        slot.readers += 1;
        true
    }

    pub fn runlock_node(&mut self, id: Option<NodeId>) {
        let Some(id) = id else {
            return;
        };
        let slot = self.node_mut(id);
        if slot.readers <= 0 {
            panic!("invalid node state to read unlock");
        }
        slot.readers -= 1;
    }

    pub fn try_wlock_node(&mut self, id: Option<NodeId>) -> bool {
        let Some(id) = id else {
            return false;
        };
        let slot = self.node_mut(id);
        if slot.readers != 0 {
            return false;
        }
        slot.readers = -1;
        true
    }

    pub fn wunlock_node(&mut self, id: Option<NodeId>) {
        let Some(id) = id else {
            panic!("null node can never be write locked");
        };
        let slot = self.node_mut(id);
        if slot.readers != -1 {
            panic!("invalid node state to write unlock");
        }
        slot.readers = 0;
        self.wake_waiters(id);
    }

    pub fn unlock_node(&mut self, id: Option<NodeId>, write: bool) {
        if write {
            self.wunlock_node(id);
        } else {
            self.runlock_node(id);
        }
    }

    /// Swap the single reader for the writer slot.
    pub fn try_upgrade_node(&mut self, id: NodeId) -> bool {
        let slot = self.node_mut(id);
        if slot.readers != 1 {
            return false;
        }
        slot.readers = -1;
        true
    }

    pub fn downgrade_node(&mut self, id: NodeId) {
        let slot = self.node_mut(id);
        if slot.readers != -1 {
            panic!("invalid node state to downgrade");
        }
        slot.readers = 1;
        self.wake_waiters(id);
    }

    /// Read-lock every node from root down to `id` inclusive.
    ///
    /// On failure every lock taken during this attempt is released and the
    /// node that refused is returned.
    pub fn try_rlock_path(&mut self, id: Option<NodeId>, wait: bool) -> Result<(), NodeId> {
        let Some(id) = id else {
            return Ok(());
        };
        let mut chain = self.ancestors(id);
        chain.push(id);
        for (depth, &n) in chain.iter().enumerate() {
            if !self.try_rlock_node(Some(n), wait) {
                for &held in chain[..depth].iter().rev() {
                    self.runlock_node(Some(held));
                }
                return Err(n);
            }
        }
        Ok(())
    }

    /// Release the read locks of `id` and all its current ancestors,
    /// innermost first.
    pub fn runlock_path(&mut self, id: Option<NodeId>) {
        let mut current = id;
        while let Some(n) = current {
            self.runlock_node(Some(n));
            current = self.node(n).parent;
        }
    }

    pub fn try_wlock_path(&mut self, id: Option<NodeId>) -> bool {
        let Some(id) = id else {
            return false;
        };
        if self.node(id).readers != 0 {
            return false;
        }
        let parent = self.node(id).parent;
        if self.try_rlock_path(parent, false).is_err() {
            return false;
        }
        if self.try_wlock_node(Some(id)) {
            return true;
        }
        self.runlock_path(parent);
        false
    }

    pub fn unlock_path(&mut self, id: Option<NodeId>, write: bool) {
        let Some(n) = id else {
            return;
        };
        self.unlock_node(Some(n), write);
        let parent = self.node(n).parent;
        self.runlock_path(parent);
    }
}
