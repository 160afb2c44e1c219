mod common;

use common::assert_idle;
use rstest::rstest;
use std::sync::Arc;
use std::thread;
use treelock::{Backend, NameSet, Namespace, OpenIntent, TreeLockError};

fn namespace_with(names: &[&str]) -> Namespace<NameSet> {
    Namespace::new(NameSet::with_names(names.iter().copied()))
}

#[test]
fn test_open_existing_and_missing() {
    let ns = namespace_with(&["/docs/readme"]);

    let handle = ns.open("docs/./readme").unwrap();
    assert_eq!(ns.path(&handle).unwrap(), "/docs/readme");

    let err = ns.open("/docs/missing").unwrap_err();
    assert!(matches!(err, TreeLockError::NotFound(_)));

    drop(handle);
    assert_idle(ns.locker());
}

#[test]
fn test_open_root_is_allowed() {
    let ns = namespace_with(&[]);
    let root = ns.open("/").unwrap();
    assert_eq!(ns.path(&root).unwrap(), "/");
    assert!(matches!(
        ns.can_delete(&root),
        Err(TreeLockError::AccessDenied(_))
    ));
    assert!(matches!(
        ns.delete(&root),
        Err(TreeLockError::AccessDenied(_))
    ));
}

#[test]
fn test_create_then_open() {
    let ns = namespace_with(&["/dir"]);

    let created = ns.create("/dir/new").unwrap();
    assert!(ns.backend().exists("/dir/new").unwrap());
    let opened = ns.open("/dir/new").unwrap();
    assert_eq!(created.id(), opened.id());

    assert!(matches!(
        ns.create("/dir/new"),
        Err(TreeLockError::SharingViolation(_)) | Err(TreeLockError::AlreadyExists(_))
    ));
    drop((created, opened));
    assert!(matches!(
        ns.create("/dir/new"),
        Err(TreeLockError::AlreadyExists(_))
    ));
    assert!(matches!(
        ns.create("/"),
        Err(TreeLockError::AlreadyExists(_))
    ));
    assert!(matches!(
        ns.create("/nowhere/file"),
        Err(TreeLockError::NotFound(_))
    ));
    assert_idle(ns.locker());
}

#[test]
fn test_create_contends_with_open_handle_path() {
    let ns = namespace_with(&["/dir"]);
    let _guard = ns.locker().try_wlock_slash("/dir").unwrap();
    assert!(matches!(
        ns.create("/dir/file"),
        Err(TreeLockError::SharingViolation(_))
    ));
}

#[test]
fn test_delete_exiles_handle() {
    let ns = namespace_with(&["/a/file"]);
    let handle = ns.open("/a/file").unwrap();

    ns.can_delete(&handle).unwrap();
    ns.delete(&handle).unwrap();

    assert!(!ns.backend().exists("/a/file").unwrap());
    assert!(handle.node().is_exile());
    assert!(matches!(ns.path(&handle), Err(TreeLockError::NotFound(_))));
    assert!(matches!(ns.delete(&handle), Err(TreeLockError::NotFound(_))));
    assert!(matches!(
        ns.can_delete(&handle),
        Err(TreeLockError::NotFound(_))
    ));
    assert!(matches!(
        ns.rename(&handle, "/b", false),
        Err(TreeLockError::NotFound(_))
    ));

    // A fresh name at the same path is a different node.
    let recreated = ns.create("/a/file").unwrap();
    assert_ne!(recreated.id(), handle.id());

    drop(recreated);
    drop(handle);
    assert_idle(ns.locker());
}

#[test]
fn test_delete_refused_while_read_locked() {
    let ns = namespace_with(&["/f"]);
    let handle = ns.open("/f").unwrap();
    let reader = ns.locker().try_rlock_slash("/f").unwrap();

    assert!(matches!(
        ns.delete(&handle),
        Err(TreeLockError::SharingViolation(_))
    ));
    assert!(matches!(
        ns.can_delete(&handle),
        Err(TreeLockError::AccessDenied(_))
    ));
    drop(reader);
    ns.delete(&handle).unwrap();
}

#[test]
fn test_can_delete_refuses_open_descendant() {
    let ns = namespace_with(&["/dir/child"]);
    let dir = ns.open("/dir").unwrap();
    let child = ns.open("/dir/child").unwrap();

    assert!(matches!(
        ns.can_delete(&dir),
        Err(TreeLockError::AccessDenied(_))
    ));
    drop(child);
    // No open descendant any more, but the backend still holds the entry.
    assert!(matches!(
        ns.can_delete(&dir),
        Err(TreeLockError::DirectoryNotEmpty(_))
    ));
}

#[test]
fn test_can_delete_refuses_non_empty_directory() {
    let ns = namespace_with(&["/d/f"]);
    let dir = ns.open("/d").unwrap();

    assert!(matches!(
        ns.can_delete(&dir),
        Err(TreeLockError::DirectoryNotEmpty(_))
    ));

    let file = ns.open_with("/d/f", OpenIntent::Delete).unwrap();
    ns.can_delete(&file).unwrap();
    ns.delete(&file).unwrap();
    drop(file);

    ns.can_delete(&dir).unwrap();
    ns.delete(&dir).unwrap();
    assert!(ns.backend().is_empty());
    drop(dir);
    assert_idle(ns.locker());
}

#[rstest]
#[case::delete("/d", None)]
#[case::rename_onto("/a", Some("/d"))]
fn test_non_empty_directory_leaves_tree_alone(
    #[case] victim: &str,
    #[case] target: Option<&str>,
) {
    let ns = namespace_with(&["/d/f", "/a"]);
    let handle = ns.open(victim).unwrap();

    let result = match target {
        None => ns.delete(&handle),
        Some(target) => ns.rename(&handle, target, true),
    };

    assert!(matches!(result, Err(TreeLockError::DirectoryNotEmpty(_))));
    assert!(!handle.node().is_exile());
    assert_eq!(ns.path(&handle).unwrap(), victim);
    assert_eq!(ns.backend().names(), vec!["/a", "/d", "/d/f"]);
    drop(handle);
    assert_idle(ns.locker());
}

#[test]
fn test_open_for_delete_does_not_wait() {
    let ns = namespace_with(&["/f"]);
    let reader = ns.locker().try_rlock_slash("/f").unwrap();

    assert!(matches!(
        ns.open_with("/f", OpenIntent::Delete),
        Err(TreeLockError::SharingViolation(_))
    ));
    drop(reader);

    let handle = ns.open_with("/f", OpenIntent::Delete).unwrap();
    assert_eq!(ns.path(&handle).unwrap(), "/f");
    assert!(matches!(
        ns.open_with("/missing", OpenIntent::Delete),
        Err(TreeLockError::NotFound(_))
    ));
    drop(handle);
    assert_idle(ns.locker());
}

#[test]
fn test_supersede_refused_while_open_elsewhere() {
    let ns = namespace_with(&["/f"]);
    let other = ns.open("/f").unwrap();

    assert!(matches!(
        ns.open_with("/f", OpenIntent::Supersede),
        Err(TreeLockError::AccessDenied(_))
    ));
    drop(other);

    let handle = ns.open_with("/f", OpenIntent::Supersede).unwrap();
    assert_eq!(ns.path(&handle).unwrap(), "/f");
    drop(handle);
    assert_idle(ns.locker());
}

#[rstest]
#[case::missing_name("/dir/new", true)]
#[case::missing_parent("/nowhere/new", false)]
fn test_supersede_creates_missing_name(#[case] path: &str, #[case] created: bool) {
    let ns = namespace_with(&["/dir"]);

    let result = ns.open_with(path, OpenIntent::Supersede);
    if created {
        let handle = result.unwrap();
        assert!(ns.backend().exists(path).unwrap());
        assert_eq!(ns.path(&handle).unwrap(), path);
    } else {
        assert!(matches!(result, Err(TreeLockError::NotFound(_))));
        assert!(!ns.backend().exists(path).unwrap());
    }
    assert!(matches!(
        ns.open_with("/", OpenIntent::Supersede),
        Err(TreeLockError::AccessDenied(_))
    ));
    assert_idle(ns.locker());
}

#[test]
fn test_rename_moves_handle() {
    let ns = namespace_with(&["/src/file", "/dst"]);
    let handle = ns.open("/src/file").unwrap();

    ns.rename(&handle, "/dst/renamed", false).unwrap();

    assert_eq!(ns.path(&handle).unwrap(), "/dst/renamed");
    assert!(ns.backend().exists("/dst/renamed").unwrap());
    assert!(!ns.backend().exists("/src/file").unwrap());
    assert_eq!(ns.open("/dst/renamed").unwrap().id(), handle.id());
    assert!(matches!(
        ns.open("/src/file"),
        Err(TreeLockError::NotFound(_))
    ));

    drop(handle);
    assert_idle(ns.locker());
}

#[test]
fn test_rename_directory_carries_open_children() {
    let ns = namespace_with(&["/old/inner/leaf", "/parent"]);
    let dir = ns.open("/old").unwrap();
    let leaf = ns.open("/old/inner/leaf").unwrap();

    ns.rename(&dir, "/parent/new", false).unwrap();

    assert_eq!(ns.path(&leaf).unwrap(), "/parent/new/inner/leaf");
    assert!(ns.backend().exists("/parent/new/inner/leaf").unwrap());
}

#[rstest]
#[case(false)]
#[case(true)]
fn test_rename_onto_existing(#[case] replace: bool) {
    let ns = namespace_with(&["/a", "/b"]);
    let a = ns.open("/a").unwrap();
    let b = ns.open("/b").unwrap();

    let result = ns.rename(&a, "/b", replace);
    if replace {
        result.unwrap();
        assert_eq!(ns.path(&a).unwrap(), "/b");
        // The replaced node trades places with the source.
        assert_eq!(ns.path(&b).unwrap(), "/a");
        assert_eq!(ns.backend().names(), vec!["/b"]);
    } else {
        assert!(matches!(result, Err(TreeLockError::AlreadyExists(_))));
        assert_eq!(ns.path(&a).unwrap(), "/a");
        assert_eq!(ns.path(&b).unwrap(), "/b");
    }
}

#[test]
fn test_rename_into_own_subtree_is_a_sharing_violation() {
    let ns = namespace_with(&["/a"]);
    let a = ns.open("/a").unwrap();
    assert!(matches!(
        ns.rename(&a, "/a/b", false),
        Err(TreeLockError::SharingViolation(_))
    ));
    assert!(matches!(
        ns.rename(&a, "/a", true),
        Err(TreeLockError::SharingViolation(_))
    ));
}

#[test]
fn test_rename_target_locked_by_reader() {
    let ns = namespace_with(&["/a", "/b"]);
    let a = ns.open("/a").unwrap();
    let _reader = ns.locker().try_rlock_slash("/b").unwrap();
    assert!(matches!(
        ns.rename(&a, "/b", true),
        Err(TreeLockError::SharingViolation(_))
    ));
    assert_eq!(ns.path(&a).unwrap(), "/a");
}

#[test]
fn test_open_waits_for_writer() {
    let ns = Arc::new(namespace_with(&["/slow"]));
    // Pin the node so its identity survives the writer going away.
    let pinned = ns.locker().resolve("/slow");
    let writer = pinned.try_wlock_path().unwrap();

    let opener = {
        let ns = ns.clone();
        thread::spawn(move || ns.open("/slow").map(|h| h.id()))
    };

    thread::sleep(std::time::Duration::from_millis(20));
    drop(writer);
    assert_eq!(opener.join().unwrap().unwrap(), pinned.id());
}
