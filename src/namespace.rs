//! Lock protocols a filesystem adapter runs around its storage calls.
//!
//! The [`Namespace`] pairs a [`TreeLocker`] with a [`Backend`] that owns the
//! actual names. Every operation takes the path lock it needs first, checks
//! that the node was not exiled underneath the caller, talks to the backend
//! and only then rearranges the tree, so a failed backend call leaves the
//! tree untouched.

use parking_lot::Mutex;
use std::collections::BTreeSet;

use crate::error::{Result, TreeLockError};
use crate::path::{clean_slash_path, split_parent};
use crate::treelock::{exchange, Node, PathLock, TreeLocker};

/// Storage seam of a namespace. Paths are always cleaned slash paths.
pub trait Backend: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool>;

    fn create(&self, path: &str) -> Result<()>;

    fn remove(&self, path: &str) -> Result<()>;

    /// Whether nothing is stored below `path`. Always true for a leaf.
    fn is_empty_dir(&self, path: &str) -> Result<bool>;

    /// Move `from` and everything below it to `to`, replacing a leaf at `to`.
    fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// A backend that only records which names exist.
///
/// Entries are flat slash paths. A name counts as a directory as soon as
/// another entry lives below it.
#[derive(Debug, Default)]
pub struct NameSet {
    names: Mutex<BTreeSet<String>>,
}

impl NameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the set with names, creating missing parents along the way.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = NameSet::new();
        {
            let mut guard = set.names.lock();
            for name in names {
                let mut current = clean_slash_path(name.as_ref());
                while let Some((dir, _)) = split_parent(&current) {
                    guard.insert(current.clone());
                    current = dir.to_string();
                }
            }
        }
        set
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        return path.to_string();
    }
    format!("{}/", path)
}

fn has_descendants(names: &BTreeSet<String>, path: &str) -> bool {
    let prefix = child_prefix(path);
    names
        .range(prefix.clone()..)
        .next()
        .is_some_and(|name| name.starts_with(&prefix))
}

fn parent_exists(names: &BTreeSet<String>, path: &str) -> bool {
    match split_parent(path) {
        Some(("/", _)) | None => true,
        Some((dir, _)) => names.contains(dir),
    }
}

impl Backend for NameSet {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(path == "/" || self.names.lock().contains(path))
    }

    fn create(&self, path: &str) -> Result<()> {
        let mut names = self.names.lock();
        if path == "/" || names.contains(path) {
            return Err(TreeLockError::AlreadyExists(path.to_string()));
        }
        if !parent_exists(&names, path) {
            return Err(TreeLockError::NotFound(format!("parent of {}", path)));
        }
        names.insert(path.to_string());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let mut names = self.names.lock();
        if !names.contains(path) {
            return Err(TreeLockError::NotFound(path.to_string()));
        }
        if has_descendants(&names, path) {
            return Err(TreeLockError::DirectoryNotEmpty(path.to_string()));
        }
        names.remove(path);
        Ok(())
    }

    fn is_empty_dir(&self, path: &str) -> Result<bool> {
        Ok(!has_descendants(&self.names.lock(), path))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut names = self.names.lock();
        if !names.contains(from) {
            return Err(TreeLockError::NotFound(from.to_string()));
        }
        if !parent_exists(&names, to) {
            return Err(TreeLockError::NotFound(format!("parent of {}", to)));
        }
        if to.starts_with(&child_prefix(from)) {
            return Err(TreeLockError::Backend(format!(
                "cannot move {} below itself",
                from
            )));
        }
        if has_descendants(&names, to) {
            return Err(TreeLockError::DirectoryNotEmpty(to.to_string()));
        }

        let prefix = child_prefix(from);
        // "/a-b" sorts between "/a" and "/a/", so the subtree is not one range.
        let moved: Vec<String> = names
            .iter()
            .filter(|name| name.as_str() == from || name.starts_with(&prefix))
            .cloned()
            .collect();
        names.remove(to);
        for name in moved {
            names.remove(&name);
            names.insert(format!("{}{}", to, &name[from.len()..]));
        }
        Ok(())
    }
}

/// What an opener is about to do with the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenIntent {
    /// Plain access. Waits out writers on the path.
    #[default]
    Read,
    /// Delete access or delete-on-close. Fails instead of waiting.
    Delete,
    /// Replace the name, creating it when missing. Refused while the name
    /// is open elsewhere.
    Supersede,
}

/// An open name: keeps its node alive so the namespace can follow it
/// through renames and notice when it gets deleted.
#[derive(Debug)]
pub struct Handle {
    node: Node,
}

impl Handle {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn id(&self) -> u64 {
        self.node.id()
    }
}

/// A tree locker bound to the backend whose names it guards.
#[derive(Debug)]
pub struct Namespace<B: Backend> {
    locker: TreeLocker,
    backend: B,
}

impl<B: Backend> Namespace<B> {
    pub fn new(backend: B) -> Self {
        Namespace {
            locker: TreeLocker::new(),
            backend,
        }
    }

    pub fn locker(&self) -> &TreeLocker {
        &self.locker
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open an existing name, waiting out any writer on its path.
    pub fn open(&self, path: &str) -> Result<Handle> {
        self.open_with(path, OpenIntent::Read)
    }

    /// Open a name for the given intent.
    ///
    /// Only [`OpenIntent::Read`] blocks; the other intents write-lock the
    /// path and report a sharing violation when someone holds it.
    pub fn open_with(&self, path: &str, intent: OpenIntent) -> Result<Handle> {
        let lock = match intent {
            OpenIntent::Read => self.locker.rlock_slash(path),
            OpenIntent::Delete | OpenIntent::Supersede => self
                .locker
                .try_wlock_slash(path)
                .ok_or_else(|| TreeLockError::SharingViolation(clean_slash_path(path)))?,
        };
        let current = live_path(&lock)?;

        if intent == OpenIntent::Supersede {
            if current == "/" {
                return Err(TreeLockError::AccessDenied(current));
            }
            // Nobody can open the name while we hold the write lock, so
            // any reference besides the lock's own is another open handle.
            if lock.current_refs() > 1 {
                tracing::debug!("open: {} is still in use, refusing supersede", current);
                return Err(TreeLockError::AccessDenied(current));
            }
            if !self.backend.exists(&current)? {
                self.backend.create(&current)?;
                tracing::debug!("open: created {} for supersede", current);
            }
        } else if !self.backend.exists(&current)? {
            tracing::debug!("open: {} not found", current);
            return Err(TreeLockError::NotFound(current));
        }

        Ok(Handle {
            node: lock.retain_node(),
        })
    }

    /// Create a name that must not exist yet and open it.
    pub fn create(&self, path: &str) -> Result<Handle> {
        let lock = self
            .locker
            .try_wlock_slash(path)
            .ok_or_else(|| TreeLockError::SharingViolation(clean_slash_path(path)))?;
        let current = live_path(&lock)?;
        if current == "/" || self.backend.exists(&current)? {
            return Err(TreeLockError::AlreadyExists(current));
        }
        self.backend.create(&current)?;
        tracing::debug!("create: {}", current);
        Ok(Handle {
            node: lock.retain_node(),
        })
    }

    /// The current path of an open name.
    pub fn path(&self, handle: &Handle) -> Result<String> {
        let lock = handle.node.rlock_path();
        live_path(&lock)
    }

    /// Check whether the name could be deleted right now.
    ///
    /// Denied while anyone else holds the path or any name below it; a
    /// directory must also be empty in the backend.
    pub fn can_delete(&self, handle: &Handle) -> Result<()> {
        let lock = handle.node.try_wlock_path().ok_or_else(|| {
            TreeLockError::AccessDenied(handle.node.slash_path().unwrap_or_default())
        })?;
        let current = live_path(&lock)?;
        if current == "/" {
            return Err(TreeLockError::AccessDenied(current));
        }
        if lock.has_child() {
            tracing::debug!("can_delete: {} has nodes below it", current);
            return Err(TreeLockError::AccessDenied(current));
        }
        if !self.backend.is_empty_dir(&current)? {
            tracing::debug!("can_delete: {} is not empty", current);
            return Err(TreeLockError::DirectoryNotEmpty(current));
        }
        Ok(())
    }

    /// Remove the name from the backend and exile its node.
    ///
    /// The handle stays valid but reports not-found from then on.
    pub fn delete(&self, handle: &Handle) -> Result<()> {
        let lock = self.wlock_handle(handle)?;
        let current = live_path(&lock)?;
        if current == "/" {
            return Err(TreeLockError::AccessDenied(current));
        }
        let exile = self.locker.wlock_exile();
        self.backend.remove(&current)?;
        exchange(&lock, &exile);
        tracing::debug!("delete: exiled {}", current);
        Ok(())
    }

    /// Move the name to `target`.
    ///
    /// Whatever node sat at `target` trades places with the handle's node,
    /// so handles open on a replaced name end up at the old source path.
    pub fn rename(&self, handle: &Handle, target: &str, replace_if_exists: bool) -> Result<()> {
        let source_lock = self.wlock_handle(handle)?;
        let source = live_path(&source_lock)?;
        if source == "/" {
            return Err(TreeLockError::AccessDenied(source));
        }

        let target_lock = self
            .locker
            .try_wlock_slash(target)
            .ok_or_else(|| TreeLockError::SharingViolation(clean_slash_path(target)))?;
        let target = live_path(&target_lock)?;
        if target == "/" {
            return Err(TreeLockError::AccessDenied(target));
        }
        if !replace_if_exists && self.backend.exists(&target)? {
            return Err(TreeLockError::AlreadyExists(target));
        }

        self.backend.rename(&source, &target)?;
        exchange(&source_lock, &target_lock);
        tracing::debug!("rename: {} -> {}", source, target);
        Ok(())
    }

    fn wlock_handle(&self, handle: &Handle) -> Result<PathLock> {
        handle.node.try_wlock_path().ok_or_else(|| {
            let path = handle.node.slash_path().unwrap_or_default();
            tracing::trace!("write lock on {:?} contended", path);
            TreeLockError::SharingViolation(path)
        })
    }
}

fn live_path(lock: &PathLock) -> Result<String> {
    lock.slash_path()
        .ok_or_else(|| TreeLockError::NotFound(format!("node {} was deleted", lock.id())))
}
