// async-btree/src/tree/leaf_cursor.rs

use async_trait::async_trait;
use log::trace;

use crate::error::Result;
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};
use crate::store::NodeStore;

use super::io::NodeIo;
use super::types::{Direction, StoreId, TreeCursor};

enum NextLeaf<I, K> {
    Loaded(Node<I, K>),
    Handle(I),
    Done,
}

/// Walks the B+Tree leaf chain one leaf at a time.
pub struct LeafNodeCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    io: NodeIo<S, K, V>,
    direction: Direction,
    next: NextLeaf<S::Id, K>,
}

impl<K, V, S> LeafNodeCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    /// Yields `first` and then every leaf reachable through the chain.
    pub(crate) fn new(io: NodeIo<S, K, V>, first: Option<Node<S::Id, K>>, direction: Direction) -> Self {
        let next = match first {
            Some(leaf) => NextLeaf::Loaded(leaf),
            None => NextLeaf::Done,
        };
        Self { io, direction, next }
    }
}

#[async_trait]
impl<K, V, S> TreeCursor for LeafNodeCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    type Item = Node<StoreId<S, K, V>, K>;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        let leaf = match std::mem::replace(&mut self.next, NextLeaf::Done) {
            NextLeaf::Loaded(leaf) => leaf,
            NextLeaf::Handle(id) => {
                trace!("leaf hop to {:?}", id);
                self.io.load(&id).await?
            }
            NextLeaf::Done => return Ok(None),
        };
        let neighbour = match self.direction {
            Direction::Forward => leaf.right.clone(),
            Direction::Backward => leaf.left.clone(),
        };
        if let Some(id) = neighbour {
            self.next = NextLeaf::Handle(id);
        }
        Ok(Some(leaf))
    }
}

/// Ordered cursor over the `(key, value handle)` entries of a B+Tree.
pub struct LeafCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    leaves: LeafNodeCursor<S, K, V>,
    direction: Direction,
    current: Option<Node<S::Id, K>>,
    /// Forward: next index to emit. Backward: entries still to emit.
    index: usize,
    /// Overrides `index` for the first leaf of a keyed walk.
    start: Option<usize>,
}

impl<K, V, S> LeafCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    pub(crate) fn new(leaves: LeafNodeCursor<S, K, V>, start: Option<usize>) -> Self {
        let direction = leaves.direction;
        Self {
            leaves,
            direction,
            current: None,
            index: 0,
            start,
        }
    }

    fn take_current(&mut self) -> Result<Option<(K, S::Id)>> {
        let Some(leaf) = self.current.as_ref() else {
            return Ok(None);
        };
        let at = match self.direction {
            Direction::Forward if self.index < leaf.len() => {
                self.index += 1;
                self.index - 1
            }
            Direction::Backward if self.index > 0 => {
                self.index -= 1;
                self.index
            }
            _ => return Ok(None),
        };
        Ok(Some((leaf.keys[at].clone(), leaf.value_handle(at)?.clone())))
    }
}

#[async_trait]
impl<K, V, S> TreeCursor for LeafCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    type Item = (K, StoreId<S, K, V>);

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        loop {
            if let Some(entry) = self.take_current()? {
                return Ok(Some(entry));
            }
            let Some(leaf) = self.leaves.next().await? else {
                self.current = None;
                return Ok(None);
            };
            let full = match self.direction {
                Direction::Forward => 0,
                Direction::Backward => leaf.len(),
            };
            self.index = self.start.take().map_or(full, |start| start.min(leaf.len()));
            self.current = Some(leaf);
        }
    }
}
