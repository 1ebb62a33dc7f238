// async-btree/src/common.rs

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};

/// Total order over keys, supplied by the caller.
pub type Comparator<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

/// Comparator for keys that already have a total order.
pub fn natural_order<K: Ord>() -> Comparator<K> {
    Arc::new(|a: &K, b: &K| a.cmp(b))
}

/// Configuration for a tree engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Minimum branching parameter `t`. Non-root nodes hold between
    /// `t - 1` and `2t - 1` keys.
    pub node_size: usize,
}

impl TreeConfig {
    pub fn new(node_size: usize) -> Self {
        TreeConfig { node_size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_size < 2 {
            return Err(TreeError::ConfigError(format!(
                "node_size must be at least 2, got {}",
                self.node_size
            )));
        }
        Ok(())
    }

    /// Largest number of keys a node may hold.
    pub fn max_keys(&self) -> usize {
        self.node_size * 2 - 1
    }

    /// Smallest number of keys a non-root node may hold.
    pub fn min_keys(&self) -> usize {
        self.node_size - 1
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig { node_size: 16 }
    }
}

/// Configuration for the file-backed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Size of every page in the file, superblock included.
    pub page_size: usize,
}

impl FileStoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size < crate::store::format::MIN_PAGE_SIZE {
            return Err(TreeError::ConfigError(format!(
                "page_size must be at least {} bytes, got {}",
                crate::store::format::MIN_PAGE_SIZE,
                self.page_size
            )));
        }
        if u32::try_from(self.page_size).is_err() {
            return Err(TreeError::ConfigError(format!(
                "page_size {} does not fit in 32 bits",
                self.page_size
            )));
        }
        Ok(())
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        FileStoreConfig {
            page_size: 16 * 1024,
        }
    }
}
