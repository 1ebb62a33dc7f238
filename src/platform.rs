use std::fmt::Debug;

// Bounds shared by every engine and store. Futures returned by the
// storage port must be `Send`, so everything they capture must be too.

/// Opaque storage handle for nodes and value records.
pub trait NodeId: Clone + Debug + PartialEq + Send + Sync + 'static {}
impl<T: Clone + Debug + PartialEq + Send + Sync + 'static> NodeId for T {}

pub trait TreeKey: Clone + Debug + Send + Sync + 'static {}
impl<T: Clone + Debug + Send + Sync + 'static> TreeKey for T {}

pub trait TreeValue: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> TreeValue for T {}
