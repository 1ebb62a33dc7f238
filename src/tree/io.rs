// async-btree/src/tree/io.rs

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::try_join_all;
use log::{debug, trace};

use crate::error::Result;
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};
use crate::store::NodeStore;

use super::types::{Direction, StoreId};

type NodeOf<S, K, V> = Node<StoreId<S, K, V>, K>;

/// What a batched step does to the root slot.
pub(crate) enum RootUpdate<I> {
    Keep,
    Set(I),
    Clear,
}

/// Port calls shared by both engines.
pub(crate) struct NodeIo<S, K, V> {
    store: Arc<S>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<S, K, V> Clone for NodeIo<S, K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<K, V, S> NodeIo<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    pub(crate) fn new(store: Arc<S>) -> Self {
        Self { store, _marker: PhantomData }
    }

    pub(crate) fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The root node, or `None` for an empty tree.
    pub(crate) async fn root(&self) -> Result<Option<NodeOf<S, K, V>>> {
        match self.store.get_root().await? {
            Some(id) => Ok(Some(self.load(&id).await?)),
            None => Ok(None),
        }
    }

    /// Reads a node and stamps it with the handle it was read from.
    pub(crate) async fn load(&self, id: &S::Id) -> Result<NodeOf<S, K, V>> {
        let mut node = self.store.read(id).await?;
        node.id = Some(id.clone());
        Ok(node)
    }

    async fn load_opt(&self, id: Option<&S::Id>) -> Result<Option<NodeOf<S, K, V>>> {
        match id {
            Some(id) => Ok(Some(self.load(id).await?)),
            None => Ok(None),
        }
    }

    /// Reads the siblings on either side of `parent.children[pos]` together.
    pub(crate) async fn load_siblings(
        &self,
        parent: &NodeOf<S, K, V>,
        pos: usize,
    ) -> Result<(Option<NodeOf<S, K, V>>, Option<NodeOf<S, K, V>>)> {
        let left_id = match pos {
            0 => None,
            _ => parent.children.get(pos - 1),
        };
        let right_id = parent.children.get(pos + 1);
        futures::try_join!(self.load_opt(left_id), self.load_opt(right_id))
    }

    /// Reserves a handle for `node` and records it on the node.
    pub(crate) async fn allocate(&self, node: &mut NodeOf<S, K, V>) -> Result<S::Id> {
        let id = self.store.allocate(node).await?;
        node.id = Some(id.clone());
        Ok(id)
    }

    /// Allocates and writes a value record, returning the handle to keep.
    pub(crate) async fn store_value(&self, value: &V) -> Result<S::Id> {
        let id = self.store.allocate_data(value).await?;
        self.store.write_data(&id, value).await
    }

    /// Replaces the value behind `node.data[pos]`, returning the old one.
    /// The node is rewritten only if the store moved the record.
    pub(crate) async fn overwrite_value(
        &self,
        node: &mut NodeOf<S, K, V>,
        pos: usize,
        value: V,
    ) -> Result<V> {
        let old_id = node.value_handle(pos)?.clone();
        let previous = self.store.read_data(&old_id).await?;
        let new_id = self.store.write_data(&old_id, &value).await?;
        if new_id != old_id {
            node.data[pos] = new_id;
            self.write(node).await?;
        }
        Ok(previous)
    }

    pub(crate) async fn write(&self, node: &NodeOf<S, K, V>) -> Result<()> {
        self.store.write(node.handle()?, node).await?;
        Ok(())
    }

    /// Writes every node concurrently and waits for the whole batch.
    pub(crate) async fn write_batch(&self, nodes: &[&NodeOf<S, K, V>]) -> Result<()> {
        try_join_all(nodes.iter().map(|node| self.write(node))).await?;
        Ok(())
    }

    /// One compound step: node writes, node removals and a root update,
    /// all issued together.
    pub(crate) async fn commit(
        &self,
        writes: &[&NodeOf<S, K, V>],
        removes: &[&S::Id],
        root: RootUpdate<S::Id>,
    ) -> Result<()> {
        let root_update = async {
            match root {
                RootUpdate::Keep => Ok(()),
                RootUpdate::Set(id) => self.store.write_root(id).await.map(|_| ()),
                RootUpdate::Clear => self.store.clear_root().await,
            }
        };
        let removals = try_join_all(removes.iter().map(|id| self.store.remove(id)));
        futures::try_join!(self.write_batch(writes), removals, root_update)?;
        Ok(())
    }

    /// Splices `keys[pos]` out of a leaf and frees its value record,
    /// dropping the leaf and the root pointer if the root leaf empties.
    pub(crate) async fn remove_leaf_entry(
        &self,
        mut leaf: NodeOf<S, K, V>,
        pos: usize,
        is_root: bool,
    ) -> Result<V> {
        let (_, data_id) = leaf.take_entry(pos)?;
        let leaf_id = leaf.handle()?.clone();
        let write = async {
            if is_root && leaf.is_empty() {
                debug!("last key removed, tree is now empty");
                self.commit(&[], &[&leaf_id], RootUpdate::Clear).await
            } else {
                self.write(&leaf).await
            }
        };
        let (value, ()) = futures::try_join!(self.store.read_data(&data_id), write)?;
        self.store.remove_data(&data_id).await?;
        Ok(value)
    }

    /// Follows first (forward) or last (backward) children down to a leaf.
    pub(crate) async fn edge_leaf(
        &self,
        mut node: NodeOf<S, K, V>,
        direction: Direction,
    ) -> Result<NodeOf<S, K, V>> {
        while !node.leaf {
            let pos = match direction {
                Direction::Forward => 0,
                Direction::Backward => node.children.len().saturating_sub(1),
            };
            let next = node.child(pos)?.clone();
            trace!("edge descent {:?} into {:?}", direction, next);
            node = self.load(&next).await?;
        }
        Ok(node)
    }
}
