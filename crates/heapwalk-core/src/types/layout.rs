//! Flat index space shared by the crawler and every consumer of its output.
//!
//! Every node of the heap graph (GC handles, native objects, static field
//! roots and managed objects) gets one index in a single contiguous space so
//! that edges can be stored as plain index pairs. The segments are always
//! concatenated in this order:
//!
//! | segment          | first index                                   |
//! |------------------|-----------------------------------------------|
//! | GC handles       | `0`                                           |
//! | native objects   | `gc_handles`                                  |
//! | static roots     | `gc_handles + native_objects`                 |
//! | managed objects  | `gc_handles + native_objects + static_roots`  |
//!
//! [`IndexLayout`] is the only place that does this arithmetic.

use std::fmt;

/// Index of a node in the flat index space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct NodeIndex(pub usize);

impl NodeIndex
{
    /// Get the raw position in the flat index space
    pub const fn value(self) -> usize
    {
        self.0
    }
}

impl From<usize> for NodeIndex
{
    fn from(value: usize) -> Self
    {
        NodeIndex(value)
    }
}

impl fmt::Display for NodeIndex
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

/// One reference edge between two nodes of the flat index space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Connection
{
    /// Referencing node
    pub from: NodeIndex,
    /// Referenced node
    pub to: NodeIndex,
}

impl Connection
{
    /// Create an edge from `from` to `to`
    pub fn new(from: impl Into<NodeIndex>, to: impl Into<NodeIndex>) -> Self
    {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Segment a flat index belongs to, with the position inside that segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSlot
{
    /// Position in the snapshot's GC handle table
    GcHandle(usize),
    /// Position in the snapshot's native object table
    NativeObject(usize),
    /// Position in the list of static field roots
    StaticFields(usize),
    /// Position in the list of discovered managed objects
    ManagedObject(usize),
}

/// Sizes of the four segments of the flat index space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexLayout
{
    gc_handles: usize,
    native_objects: usize,
    static_roots: usize,
    managed_objects: usize,
}

impl IndexLayout
{
    /// Layout of the root segments, before any managed object is discovered
    pub const fn new(gc_handles: usize, native_objects: usize, static_roots: usize) -> Self
    {
        Self {
            gc_handles,
            native_objects,
            static_roots,
            managed_objects: 0,
        }
    }

    /// Same layout with the managed object segment sized to `count`
    #[must_use]
    pub const fn with_managed_objects(self, count: usize) -> Self
    {
        Self {
            managed_objects: count,
            ..self
        }
    }

    /// Number of GC handles
    pub const fn gc_handle_count(&self) -> usize
    {
        self.gc_handles
    }

    /// Number of native objects
    pub const fn native_object_count(&self) -> usize
    {
        self.native_objects
    }

    /// Number of static field roots
    pub const fn static_root_count(&self) -> usize
    {
        self.static_roots
    }

    /// Number of managed objects
    pub const fn managed_object_count(&self) -> usize
    {
        self.managed_objects
    }

    pub const fn first_gc_handle(&self) -> usize
    {
        0
    }

    pub const fn first_native_object(&self) -> usize
    {
        self.gc_handles
    }

    pub const fn first_static_fields(&self) -> usize
    {
        self.first_native_object() + self.native_objects
    }

    pub const fn first_managed_object(&self) -> usize
    {
        self.first_static_fields() + self.static_roots
    }

    /// Total number of nodes in the index space
    pub const fn len(&self) -> usize
    {
        self.first_managed_object() + self.managed_objects
    }

    pub const fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Whether `index` addresses a node of this layout
    pub const fn contains(&self, index: NodeIndex) -> bool
    {
        index.0 < self.len()
    }

    pub const fn gc_handle(&self, position: usize) -> NodeIndex
    {
        NodeIndex(self.first_gc_handle() + position)
    }

    pub const fn native_object(&self, position: usize) -> NodeIndex
    {
        NodeIndex(self.first_native_object() + position)
    }

    pub const fn static_fields(&self, position: usize) -> NodeIndex
    {
        NodeIndex(self.first_static_fields() + position)
    }

    /// Index of the managed object with the given discovery position
    ///
    /// This does not check `position` against the managed object count, since
    /// the crawler hands out indices while that count is still growing.
    pub const fn managed_object(&self, position: usize) -> NodeIndex
    {
        NodeIndex(self.first_managed_object() + position)
    }

    /// Decode a flat index back into its segment and position
    ///
    /// Returns `None` for indices past the end of the layout.
    ///
    /// ```rust
    /// use heapwalk_core::types::{IndexLayout, NodeIndex, NodeSlot};
    ///
    /// let layout = IndexLayout::new(2, 3, 1).with_managed_objects(4);
    /// assert_eq!(layout.classify(NodeIndex(1)), Some(NodeSlot::GcHandle(1)));
    /// assert_eq!(layout.classify(NodeIndex(2)), Some(NodeSlot::NativeObject(0)));
    /// assert_eq!(layout.classify(NodeIndex(5)), Some(NodeSlot::StaticFields(0)));
    /// assert_eq!(layout.classify(NodeIndex(9)), Some(NodeSlot::ManagedObject(3)));
    /// assert_eq!(layout.classify(NodeIndex(10)), None);
    /// ```
    pub const fn classify(&self, index: NodeIndex) -> Option<NodeSlot>
    {
        let i = index.0;
        if i < self.first_native_object() {
            Some(NodeSlot::GcHandle(i))
        } else if i < self.first_static_fields() {
            Some(NodeSlot::NativeObject(i - self.first_native_object()))
        } else if i < self.first_managed_object() {
            Some(NodeSlot::StaticFields(i - self.first_static_fields()))
        } else if i < self.len() {
            Some(NodeSlot::ManagedObject(i - self.first_managed_object()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_segment_order()
    {
        let layout = IndexLayout::new(4, 2, 3).with_managed_objects(5);
        assert_eq!(layout.first_gc_handle(), 0);
        assert_eq!(layout.first_native_object(), 4);
        assert_eq!(layout.first_static_fields(), 6);
        assert_eq!(layout.first_managed_object(), 9);
        assert_eq!(layout.len(), 14);
    }

    #[test]
    fn test_round_trip_through_classify()
    {
        let layout = IndexLayout::new(1, 1, 1).with_managed_objects(1);
        assert_eq!(layout.classify(layout.gc_handle(0)), Some(NodeSlot::GcHandle(0)));
        assert_eq!(layout.classify(layout.native_object(0)), Some(NodeSlot::NativeObject(0)));
        assert_eq!(layout.classify(layout.static_fields(0)), Some(NodeSlot::StaticFields(0)));
        assert_eq!(layout.classify(layout.managed_object(0)), Some(NodeSlot::ManagedObject(0)));
    }

    #[test]
    fn test_empty_segments_are_skipped()
    {
        let layout = IndexLayout::new(0, 0, 2).with_managed_objects(1);
        assert_eq!(layout.classify(NodeIndex(0)), Some(NodeSlot::StaticFields(0)));
        assert_eq!(layout.classify(NodeIndex(2)), Some(NodeSlot::ManagedObject(0)));
        assert!(!layout.contains(NodeIndex(3)));
    }

    #[test]
    fn test_empty_layout()
    {
        let layout = IndexLayout::default();
        assert!(layout.is_empty());
        assert_eq!(layout.classify(NodeIndex(0)), None);
    }
}
