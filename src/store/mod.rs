// async-btree/src/store/mod.rs

pub mod node_store;
pub mod mem_store;
pub mod format;
pub mod file_store;

// Re-export key items for easier access from `crate::store::`
pub use node_store::NodeStore;
pub use mem_store::InMemoryStore;
pub use file_store::FileStore;
