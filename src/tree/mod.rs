// async-btree/src/tree/mod.rs

pub mod types;
pub mod projection;
pub mod cursor;
pub mod leaf_cursor;
pub mod btree;
pub mod bplus_tree;
mod io;
mod verify;

// Re-export key items for easier access from `crate::tree::`
pub use types::{Direction, StoreId, Tree, TreeCursor};
pub use projection::{Keys, Values};
pub use cursor::{PreorderCursor, StackCursor};
pub use leaf_cursor::{LeafCursor, LeafNodeCursor};
pub use btree::BTree;
pub use bplus_tree::BPlusTree;
