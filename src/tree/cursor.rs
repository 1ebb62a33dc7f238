// async-btree/src/tree/cursor.rs

//! Stack-based cursors over the B-Tree.
//!
//! A [`StackCursor`] replays an in-order (or reverse in-order) walk with an
//! explicit stack of `(node, cursor)` frames instead of recursion, so every
//! call to `next` performs at most one node read. Descending into the last
//! branch of a node replaces that node's frame, keeping the stack no deeper
//! than the tree.

use async_trait::async_trait;
use log::trace;

use crate::common::Comparator;
use crate::error::Result;
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};
use crate::store::NodeStore;

use super::io::NodeIo;
use super::types::{Direction, StoreId, TreeCursor};

struct Frame<I, K> {
    node: Node<I, K>,
    /// Forward: the next step emits `keys[cursor - 1]` (if any) and then
    /// descends into `children[cursor]`. Backward: the next step emits
    /// `keys[cursor]` (if any) and then descends into `children[cursor]`.
    cursor: usize,
}

/// Ordered cursor over the `(key, value handle)` entries of a B-Tree.
pub struct StackCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    io: NodeIo<S, K, V>,
    direction: Direction,
    stack: Vec<Frame<S::Id, K>>,
    /// Child to enter on the next pull, and whether it replaces the top frame.
    pending: Option<(S::Id, bool)>,
}

impl<K, V, S> StackCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    pub(crate) fn empty(io: NodeIo<S, K, V>, direction: Direction) -> Self {
        Self {
            io,
            direction,
            stack: Vec::new(),
            pending: None,
        }
    }

    /// Starts at the first (or last) entry of the tree rooted at `root`.
    pub(crate) fn from_root(io: NodeIo<S, K, V>, root: Node<S::Id, K>, direction: Direction) -> Self {
        let mut cursor = Self::empty(io, direction);
        cursor.stack.push(Self::fresh_frame(root, direction));
        cursor
    }

    /// Starts at the first key `>= key` (forward) or the last key `<= key`
    /// (backward), rebuilding the frames an unkeyed walk would hold there.
    pub(crate) async fn seek(
        io: NodeIo<S, K, V>,
        root: Node<S::Id, K>,
        key: &K,
        comparator: &Comparator<K>,
        direction: Direction,
    ) -> Result<Self> {
        let mut cursor = Self::empty(io, direction);
        let mut node = root;
        loop {
            let found = node.locate(key, comparator);
            let (pos, exact) = (found.position, found.exact);
            if node.leaf || exact {
                let resume = match direction {
                    Direction::Forward if exact || pos < node.len() => Some(pos + 1),
                    Direction::Forward => None,
                    Direction::Backward if exact => Some(pos),
                    Direction::Backward if pos != 0 => Some(pos - 1),
                    Direction::Backward => None,
                };
                if let Some(resume) = resume {
                    cursor.stack.push(Frame { node, cursor: resume });
                }
                return Ok(cursor);
            }

            let next = node.child(pos)?.clone();
            let resume = match direction {
                Direction::Forward if pos < node.len() => Some(pos + 1),
                Direction::Backward if pos != 0 => Some(pos - 1),
                _ => None,
            };
            if let Some(resume) = resume {
                cursor.stack.push(Frame { node, cursor: resume });
            }
            trace!("cursor seek into {:?}", next);
            node = cursor.io.load(&next).await?;
        }
    }

    fn fresh_frame(node: Node<S::Id, K>, direction: Direction) -> Frame<S::Id, K> {
        let cursor = match direction {
            Direction::Forward => 0,
            Direction::Backward => node.len(),
        };
        Frame { node, cursor }
    }

    async fn enter_pending(&mut self) -> Result<()> {
        if let Some((id, replace)) = self.pending.take() {
            let child = self.io.load(&id).await?;
            let frame = Self::fresh_frame(child, self.direction);
            if replace {
                self.stack.pop();
            }
            self.stack.push(frame);
        }
        Ok(())
    }

    /// Advances the top frame by one position, returning the entry it
    /// passed over, if any.
    fn step(&mut self) -> Result<Option<(K, S::Id)>> {
        let direction = self.direction;
        let Some(top) = self.stack.last_mut() else {
            return Ok(None);
        };
        let len = top.node.len();
        let pos = top.cursor;

        let (emit_at, exhausted) = match direction {
            Direction::Forward => {
                top.cursor += 1;
                (pos.checked_sub(1), pos >= len)
            }
            Direction::Backward => {
                if pos > 0 {
                    top.cursor = pos - 1;
                }
                ((pos < len).then_some(pos), pos == 0)
            }
        };

        let emitted = match emit_at {
            Some(at) => Some((top.node.keys[at].clone(), top.node.value_handle(at)?.clone())),
            None => None,
        };

        if top.node.leaf {
            if exhausted {
                self.stack.pop();
            }
        } else {
            let child = top.node.child(pos)?.clone();
            self.pending = Some((child, exhausted));
        }
        Ok(emitted)
    }
}

#[async_trait]
impl<K, V, S> TreeCursor for StackCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    type Item = (K, StoreId<S, K, V>);

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        loop {
            self.enter_pending().await?;
            if self.stack.is_empty() {
                return Ok(None);
            }
            if let Some(entry) = self.step()? {
                return Ok(Some(entry));
            }
        }
    }
}

/// Pre-order walk over every node of a tree.
pub struct PreorderCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    io: NodeIo<S, K, V>,
    stack: Vec<S::Id>,
}

impl<K, V, S> PreorderCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    pub(crate) fn new(io: NodeIo<S, K, V>, root: Option<S::Id>) -> Self {
        Self {
            io,
            stack: root.into_iter().collect(),
        }
    }
}

#[async_trait]
impl<K, V, S> TreeCursor for PreorderCursor<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    type Item = Node<StoreId<S, K, V>, K>;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        let Some(id) = self.stack.pop() else {
            return Ok(None);
        };
        let node = self.io.load(&id).await?;
        self.stack.extend(node.children.iter().rev().cloned());
        Ok(Some(node))
    }
}
