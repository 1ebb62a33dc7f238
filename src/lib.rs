// async-btree/src/lib.rs

//! Async B-Tree and B+Tree engines over a pluggable storage port.
//!
//! Both engines talk to storage only through [`NodeStore`], so the same
//! tree code runs against [`InMemoryStore`], the paged [`FileStore`], or
//! any other backend implementing the trait.

pub mod common;
pub mod error;
pub mod platform;
pub mod node;
pub mod store;
pub mod tree;

pub use common::{natural_order, Comparator, FileStoreConfig, TreeConfig};
pub use error::{Result, TreeError};
pub use node::{LocateResult, Node};
pub use store::{FileStore, InMemoryStore, NodeStore};
pub use tree::{BPlusTree, BTree, Direction, Tree, TreeCursor};
