// async-btree/src/store/node_store.rs

use async_trait::async_trait;

use crate::error::Result;
use crate::node::Node;
use crate::platform::{NodeId, TreeKey, TreeValue};

/// The storage port consumed by both tree engines.
///
/// Two record families live behind it: nodes and values. Each has
/// allocate/read/write/remove, and the store keeps one root pointer.
/// Handles are opaque to the engines. Every call may suspend and fail;
/// engines never retry.
#[async_trait]
pub trait NodeStore<K: TreeKey, V: TreeValue>: std::fmt::Debug + Send + Sync + 'static {
    type Id: NodeId;

    /// Handle of the root node, `None` for an empty tree.
    async fn get_root(&self) -> Result<Option<Self::Id>>;

    async fn write_root(&self, id: Self::Id) -> Result<Self::Id>;

    /// Forgets the root pointer once the tree has shrunk to nothing.
    async fn clear_root(&self) -> Result<()>;

    // Node records

    async fn read(&self, id: &Self::Id) -> Result<Node<Self::Id, K>>;

    /// Persists `node` under `id`. Node handles are stable: engines keep
    /// using `id` after the write.
    async fn write(&self, id: &Self::Id, node: &Node<Self::Id, K>) -> Result<Self::Id>;

    async fn remove(&self, id: &Self::Id) -> Result<()>;

    /// Reserves a handle for `node`. The node is not readable until written.
    async fn allocate(&self, node: &Node<Self::Id, K>) -> Result<Self::Id>;

    // Value records

    async fn read_data(&self, id: &Self::Id) -> Result<V>;

    /// Stores `value` under `id` and returns the handle the engines should
    /// record from now on.
    async fn write_data(&self, id: &Self::Id, value: &V) -> Result<Self::Id>;

    async fn remove_data(&self, id: &Self::Id) -> Result<()>;

    async fn allocate_data(&self, value: &V) -> Result<Self::Id>;
}
