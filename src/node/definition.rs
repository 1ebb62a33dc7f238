// async-btree/src/node/definition.rs

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::common::Comparator;
use crate::error::{Result, TreeError};

/// Outcome of binary-searching a node's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocateResult {
    /// Index of the first key that is not less than the target.
    pub position: usize,
    /// `true` when `keys[position]` equals the target.
    pub exact: bool,
}

/// Binary search over a sorted key slice.
///
/// Returns the smallest index `i` with `keys[i] >= key` (or `keys.len()`),
/// flagging whether that key compares equal.
pub fn locate<K>(keys: &[K], key: &K, comparator: &Comparator<K>) -> LocateResult {
    let mut low = 0;
    let mut high = keys.len();
    while low < high {
        let mid = low + (high - low) / 2;
        match comparator(&keys[mid], key) {
            Ordering::Equal => return LocateResult { position: mid, exact: true },
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
        }
    }
    LocateResult { position: low, exact: false }
}

/// One page of the tree.
///
/// `data` holds value handles aligned with `keys`. B+Tree internal nodes
/// keep it empty since separators carry no values. `left` and `right`
/// link B+Tree leaves in key order and stay `None` everywhere else.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Node<I, K> {
    /// Storage handle, assigned on allocation.
    pub id: Option<I>,
    pub keys: Vec<K>,
    pub data: Vec<I>,
    pub children: Vec<I>,
    pub leaf: bool,
    pub left: Option<I>,
    pub right: Option<I>,
}

impl<I, K> Node<I, K> {
    /// Creates a leaf from aligned keys and value handles.
    pub fn new_leaf(keys: Vec<K>, data: Vec<I>) -> Self {
        Node {
            id: None,
            keys,
            data,
            children: Vec::new(),
            leaf: true,
            left: None,
            right: None,
        }
    }

    /// Creates an internal node. Callers fill `keys` (and `data` for the
    /// B-Tree) so that `children.len() == keys.len() + 1` before persisting,
    /// except for a fresh root that is about to be split.
    pub fn new_internal(keys: Vec<K>, data: Vec<I>, children: Vec<I>) -> Self {
        Node {
            id: None,
            keys,
            data,
            children,
            leaf: false,
            left: None,
            right: None,
        }
    }

    pub fn locate(&self, key: &K, comparator: &Comparator<K>) -> LocateResult {
        locate(&self.keys, key, comparator)
    }

    /// The node's storage handle; a node that was never persisted is a bug.
    pub fn handle(&self) -> Result<&I> {
        self.id
            .as_ref()
            .ok_or_else(|| TreeError::structure("node has no storage handle"))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Handle of the child at `pos`, or a structure error if it is missing.
    pub fn child(&self, pos: usize) -> Result<&I> {
        self.children.get(pos).ok_or_else(|| {
            TreeError::Structure(format!(
                "child {} missing (node has {} children)",
                pos,
                self.children.len()
            ))
        })
    }

    /// Value handle aligned with `keys[pos]`.
    pub fn value_handle(&self, pos: usize) -> Result<&I> {
        self.data.get(pos).ok_or_else(|| {
            TreeError::Structure(format!(
                "value handle {} missing (node has {} keys, {} handles)",
                pos,
                self.keys.len(),
                self.data.len()
            ))
        })
    }

    /// Inserts a key and its value handle at `pos`, shifting the rest right.
    pub fn insert_entry(&mut self, pos: usize, key: K, data: I) -> Result<()> {
        if pos > self.keys.len() || self.keys.len() != self.data.len() {
            return Err(TreeError::Structure(format!(
                "cannot insert entry at {} (node has {} keys, {} handles)",
                pos,
                self.keys.len(),
                self.data.len()
            )));
        }
        self.keys.insert(pos, key);
        self.data.insert(pos, data);
        Ok(())
    }

    /// Removes the key and value handle at `pos`.
    pub fn take_entry(&mut self, pos: usize) -> Result<(K, I)> {
        if pos >= self.keys.len() || pos >= self.data.len() {
            return Err(TreeError::Structure(format!(
                "no entry {} to take (node has {} keys, {} handles)",
                pos,
                self.keys.len(),
                self.data.len()
            )));
        }
        Ok((self.keys.remove(pos), self.data.remove(pos)))
    }

    /// Removes the last key and value handle.
    pub fn pop_entry(&mut self) -> Result<(K, I)> {
        match (self.keys.pop(), self.data.pop()) {
            (Some(key), Some(data)) => Ok((key, data)),
            _ => Err(TreeError::structure("node is unexpectedly empty")),
        }
    }

    /// Swaps in a new key and value handle at `pos`, returning the old pair.
    pub fn replace_entry(&mut self, pos: usize, key: K, data: I) -> Result<(K, I)> {
        if pos >= self.keys.len() || pos >= self.data.len() {
            return Err(TreeError::Structure(format!(
                "no entry {} to replace (node has {} keys, {} handles)",
                pos,
                self.keys.len(),
                self.data.len()
            )));
        }
        let old_key = std::mem::replace(&mut self.keys[pos], key);
        let old_data = std::mem::replace(&mut self.data[pos], data);
        Ok((old_key, old_data))
    }

    /// Swaps in a new separator at `pos` without touching value handles.
    pub fn replace_key(&mut self, pos: usize, key: K) -> Result<K> {
        match self.keys.get_mut(pos) {
            Some(slot) => Ok(std::mem::replace(slot, key)),
            None => Err(TreeError::Structure(format!(
                "no separator {} to replace (node has {} keys)",
                pos,
                self.keys.len()
            ))),
        }
    }

    /// Removes the child handle at `pos`.
    pub fn take_child(&mut self, pos: usize) -> Result<I> {
        if pos >= self.children.len() {
            return Err(TreeError::Structure(format!(
                "no child {} to take (node has {} children)",
                pos,
                self.children.len()
            )));
        }
        Ok(self.children.remove(pos))
    }
}

/// Builds a single unpersisted leaf for tests, using each key as its own
/// value handle.
#[cfg(test)]
pub(crate) fn leaf_of<K: Clone>(keys: &[K]) -> Node<K, K> {
    Node::new_leaf(keys.to_vec(), keys.to_vec())
}
