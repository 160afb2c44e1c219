pub mod config;
pub mod error;
pub mod namespace;
pub mod path;
pub mod stress;
pub mod treelock;

pub use config::load_config;
pub use config::Config;

pub use error::{Result, TreeLockError};

pub use namespace::{Backend, Handle, NameSet, Namespace, OpenIntent};

pub use path::{clean_file_path, clean_slash_path, unify_file_path};

pub use treelock::{
    exchange, join, split, Node, NodeLock, NodeRef, PathLock, TreeLocker, TreeStats,
};
