// async-btree/src/tree/verify.rs

use std::cmp::Ordering;
use std::fmt::Write as _;

use async_recursion::async_recursion;

use crate::common::{Comparator, TreeConfig};
use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};
use crate::store::NodeStore;

use super::io::NodeIo;

/// Which engine's node layout to check against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    /// Keys separate children strictly and every node carries values.
    BTree,
    /// Separators are copies of leaf keys; values and chain links live in leaves.
    BPlusTree,
}

struct LeafLink<I> {
    id: I,
    left: Option<I>,
    right: Option<I>,
}

struct Checker<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    io: NodeIo<S, K, V>,
    config: TreeConfig,
    comparator: Comparator<K>,
    layout: Layout,
    leaves: Vec<LeafLink<S::Id>>,
}

fn violation(id: &Option<impl std::fmt::Debug>, what: impl std::fmt::Display) -> TreeError {
    TreeError::Structure(format!("node {:?}: {}", id, what))
}

impl<K, V, S> Checker<S, K, V>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    fn check_keys(&self, node: &Node<S::Id, K>, lower: Option<&K>, upper: Option<&K>) -> Result<()> {
        let cmp = &self.comparator;
        if node.keys.windows(2).any(|pair| cmp(&pair[0], &pair[1]) != Ordering::Less) {
            return Err(violation(&node.id, "keys are not strictly increasing"));
        }
        for key in &node.keys {
            if let Some(lower) = lower {
                let ok = match self.layout {
                    Layout::BTree => cmp(lower, key) == Ordering::Less,
                    Layout::BPlusTree => cmp(lower, key) != Ordering::Greater,
                };
                if !ok {
                    return Err(violation(&node.id, format!("key {:?} below separator {:?}", key, lower)));
                }
            }
            if let Some(upper) = upper {
                if cmp(key, upper) != Ordering::Less {
                    return Err(violation(&node.id, format!("key {:?} not below separator {:?}", key, upper)));
                }
            }
        }
        Ok(())
    }

    fn check_shape(&self, node: &Node<S::Id, K>, is_root: bool) -> Result<()> {
        let len = node.len();
        if len > self.config.max_keys() {
            return Err(violation(&node.id, format!("{} keys exceed the maximum", len)));
        }
        if is_root && len == 0 {
            return Err(violation(&node.id, "root holds no keys"));
        }
        if !is_root && len < self.config.min_keys() {
            return Err(violation(&node.id, format!("{} keys are below the minimum", len)));
        }
        if node.leaf != node.children.is_empty() {
            return Err(violation(&node.id, "leaf flag disagrees with children"));
        }
        if !node.leaf && node.children.len() != len + 1 {
            return Err(violation(
                &node.id,
                format!("{} keys but {} children", len, node.children.len()),
            ));
        }
        let expected_data = match (self.layout, node.leaf) {
            (Layout::BPlusTree, false) => 0,
            _ => len,
        };
        if node.data.len() != expected_data {
            return Err(violation(
                &node.id,
                format!("{} value handles, expected {}", node.data.len(), expected_data),
            ));
        }
        Ok(())
    }

    /// Checks the subtree under `node` and returns its height.
    #[async_recursion]
    async fn check(
        &mut self,
        node: Node<S::Id, K>,
        lower: Option<K>,
        upper: Option<K>,
        is_root: bool,
    ) -> Result<usize> {
        self.check_keys(&node, lower.as_ref(), upper.as_ref())?;
        self.check_shape(&node, is_root)?;

        if node.leaf {
            if self.layout == Layout::BPlusTree {
                self.leaves.push(LeafLink {
                    id: node.handle()?.clone(),
                    left: node.left.clone(),
                    right: node.right.clone(),
                });
            }
            return Ok(1);
        }

        let mut height = None;
        for (i, child_id) in node.children.iter().enumerate() {
            let child = self.io.load(child_id).await?;
            let child_lower = if i == 0 { lower.clone() } else { node.keys.get(i - 1).cloned() };
            let child_upper = if i == node.len() { upper.clone() } else { node.keys.get(i).cloned() };
            let child_height = self.check(child, child_lower, child_upper, false).await?;
            match height {
                None => height = Some(child_height),
                Some(h) if h != child_height => {
                    return Err(violation(&node.id, "leaves sit at different depths"));
                }
                Some(_) => {}
            }
        }
        Ok(height.unwrap_or(0) + 1)
    }

    fn check_leaf_chain(&self) -> Result<()> {
        for (i, leaf) in self.leaves.iter().enumerate() {
            let expected_left = i.checked_sub(1).map(|j| &self.leaves[j].id);
            let expected_right = self.leaves.get(i + 1).map(|next| &next.id);
            if leaf.left.as_ref() != expected_left {
                return Err(TreeError::Structure(format!(
                    "leaf {:?} links left to {:?}, expected {:?}",
                    leaf.id, leaf.left, expected_left
                )));
            }
            if leaf.right.as_ref() != expected_right {
                return Err(TreeError::Structure(format!(
                    "leaf {:?} links right to {:?}, expected {:?}",
                    leaf.id, leaf.right, expected_right
                )));
            }
        }
        Ok(())
    }
}

/// Recursively checks ordering, separation, occupancy, child counts and
/// uniform leaf depth, plus the leaf chain for B+Trees.
pub(crate) async fn verify<K, V, S>(
    io: &NodeIo<S, K, V>,
    config: &TreeConfig,
    comparator: &Comparator<K>,
    layout: Layout,
) -> Result<()>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    let Some(root) = io.root().await? else {
        return Ok(());
    };
    let mut checker = Checker {
        io: io.clone(),
        config: config.clone(),
        comparator: comparator.clone(),
        layout,
        leaves: Vec::new(),
    };
    checker.check(root, None, None, true).await?;
    if layout == Layout::BPlusTree {
        checker.check_leaf_chain()?;
    }
    Ok(())
}

/// Renders the tree with one line per node, children indented below
/// their parent.
pub(crate) async fn dump<K, V, S>(io: &NodeIo<S, K, V>) -> Result<String>
where
    K: TreeKey,
    V: TreeValue,
    S: NodeStore<K, V>,
{
    let mut out = String::new();
    let mut stack = match io.store().get_root().await? {
        Some(root) => vec![(root, 0usize)],
        None => return Ok("(empty)\n".to_string()),
    };
    while let Some((id, depth)) = stack.pop() {
        let node = io.load(&id).await?;
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{:indent$}{:?}", "", node.keys, indent = depth * 2);
        stack.extend(node.children.iter().rev().map(|child| (child.clone(), depth + 1)));
    }
    Ok(out)
}
