//! # Graph Materialization
//!
//! Turns the crawler's flat output (records plus an edge list) into a graph of
//! typed nodes with resolved `references` / `referenced_by` adjacency.
//!
//! Materialization is two linear passes: one over the edges to fill the
//! adjacency lists, one over the index space to decode each index into its
//! node variant. The resulting [`HeapGraph`] is immutable.
//!
//! ## Example
//!
//! ```rust
//! use heapwalk_core::crawler::crawl;
//! use heapwalk_core::graph::HeapGraph;
//! use heapwalk_core::heap::VirtualMachineInformation;
//! use heapwalk_core::snapshot::Snapshot;
//!
//! let mut snapshot = Snapshot::builder(VirtualMachineInformation::x64()).gc_handle(0x10).build()?;
//! let crawled = crawl(&mut snapshot)?;
//! let graph = HeapGraph::materialize(&snapshot, &crawled)?;
//! assert_eq!(graph.len(), 1);
//! assert_eq!(graph.gc_handles().count(), 1);
//! # Ok::<(), heapwalk_core::error::HeapwalkError>(())
//! ```

pub mod node;

use std::collections::HashMap;

pub use node::{GcHandleNode, ManagedObjectNode, NativeObjectNode, Node, NodeKind, StaticFieldsNode};
use smallvec::SmallVec;
use tracing::debug;

use crate::crawler::CrawledSnapshot;
use crate::error::{HeapwalkError, HeapwalkResult};
use crate::snapshot::Snapshot;
use crate::types::{Address, IndexLayout, NodeIndex, NodeSlot};

type Adjacency = Vec<SmallVec<[NodeIndex; 4]>>;

/// Node count and byte total for one node variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KindTotal
{
    pub count: usize,
    pub bytes: u64,
}

impl KindTotal
{
    fn add(&mut self, bytes: u64)
    {
        self.count += 1;
        self.bytes += bytes;
    }
}

/// Per-variant totals of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SizeByKind
{
    pub native_objects: KindTotal,
    pub managed_objects: KindTotal,
    pub gc_handles: KindTotal,
    pub static_fields: KindTotal,
}

/// Immutable heap graph
#[derive(Debug, Clone)]
pub struct HeapGraph
{
    layout: IndexLayout,
    nodes: Vec<Node>,
    managed_by_address: HashMap<Address, NodeIndex>,
    edge_count: usize,
}

impl HeapGraph
{
    /// Build the graph for `crawled`, the output of crawling `snapshot`
    ///
    /// ## Errors
    ///
    /// - `EdgeOutOfRange`: an edge endpoint lies outside the index space
    /// - `InvalidArgument`: `crawled` does not describe `snapshot`'s roots
    /// - `UnknownTypeIndex`: a record names a type missing from the snapshot
    pub fn materialize(snapshot: &Snapshot, crawled: &CrawledSnapshot) -> HeapwalkResult<Self>
    {
        let layout = crawled.layout;
        let roots = snapshot.root_layout();
        if roots != IndexLayout::new(layout.gc_handle_count(), layout.native_object_count(), layout.static_root_count())
            || layout.static_root_count() != crawled.static_roots.len()
            || layout.managed_object_count() != crawled.managed_objects.len()
        {
            return Err(HeapwalkError::InvalidArgument(
                "crawl output does not match the snapshot's roots".to_string(),
            ));
        }

        let node_count = layout.len();
        let mut references: Adjacency = vec![SmallVec::new(); node_count];
        let mut referenced_by: Adjacency = vec![SmallVec::new(); node_count];
        for connection in &crawled.connections {
            if !layout.contains(connection.from) || !layout.contains(connection.to) {
                return Err(HeapwalkError::EdgeOutOfRange {
                    from: connection.from,
                    to: connection.to,
                    len: node_count,
                });
            }
            references[connection.from.value()].push(connection.to);
            referenced_by[connection.to.value()].push(connection.from);
        }

        let catalog = snapshot.catalog()?;
        let pointer_bytes = snapshot.pointer_size().bytes() as u64;
        let mut managed_by_address = HashMap::with_capacity(crawled.managed_objects.len());
        let mut nodes = Vec::with_capacity(node_count);

        let adjacency = references.into_iter().zip(referenced_by);
        for (position, (outgoing, incoming)) in adjacency.enumerate() {
            let index = NodeIndex(position);
            let kind = match layout.classify(index) {
                Some(NodeSlot::GcHandle(slot)) => NodeKind::GcHandle(GcHandleNode {
                    target: snapshot.gc_handles()[slot].target,
                    size: pointer_bytes,
                }),
                Some(NodeSlot::NativeObject(slot)) => {
                    let native = &snapshot.native_objects()[slot];
                    NodeKind::NativeObject(NativeObjectNode {
                        instance_id: native.instance_id,
                        class_id: native.class_id,
                        class_name: snapshot.class_name(native.class_id).unwrap_or_default().to_string(),
                        name: native.name.clone(),
                        native_object_address: native.native_object_address,
                        size: native.size,
                        hide_flags: native.hide_flags,
                        is_persistent: native.is_persistent,
                        is_dont_destroy_on_load: native.is_dont_destroy_on_load,
                        is_manager: native.is_manager,
                    })
                }
                Some(NodeSlot::StaticFields(slot)) => {
                    let td = catalog.get(crawled.static_roots[slot].type_index)?;
                    NodeKind::StaticFields(StaticFieldsNode {
                        type_index: td.type_index,
                        type_name: td.name.clone(),
                        size: td.static_field_bytes.len() as u64,
                    })
                }
                Some(NodeSlot::ManagedObject(slot)) => {
                    let record = &crawled.managed_objects[slot];
                    let td = catalog.get(record.type_index)?;
                    managed_by_address.insert(record.address, index);
                    NodeKind::ManagedObject(ManagedObjectNode {
                        address: record.address,
                        type_index: td.type_index,
                        type_name: td.name.clone(),
                        size: u64::from(record.size),
                    })
                }
                None => {
                    return Err(HeapwalkError::InvalidArgument(format!(
                        "index {index} is outside the layout"
                    )))
                }
            };
            nodes.push(Node {
                index,
                kind,
                references: outgoing.into_vec().into_boxed_slice(),
                referenced_by: incoming.into_vec().into_boxed_slice(),
            });
        }

        debug!(
            "Materialized {} nodes and {} edges",
            nodes.len(),
            crawled.connections.len()
        );
        Ok(Self {
            layout,
            nodes,
            managed_by_address,
            edge_count: crawled.connections.len(),
        })
    }

    pub fn layout(&self) -> IndexLayout
    {
        self.layout
    }

    pub fn len(&self) -> usize
    {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize
    {
        self.edge_count
    }

    /// All nodes in index order
    pub fn nodes(&self) -> &[Node]
    {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node>
    {
        self.nodes.get(index.value())
    }

    /// Targets of `index`'s outgoing edges; empty for unknown indices
    pub fn references(&self, index: NodeIndex) -> &[NodeIndex]
    {
        self.node(index).map_or(&[][..], Node::references)
    }

    /// Sources of `index`'s incoming edges; empty for unknown indices
    pub fn referenced_by(&self, index: NodeIndex) -> &[NodeIndex]
    {
        self.node(index).map_or(&[][..], Node::referenced_by)
    }

    pub fn gc_handles(&self) -> impl Iterator<Item = &Node>
    {
        self.segment(self.layout.first_gc_handle(), self.layout.gc_handle_count())
    }

    pub fn native_objects(&self) -> impl Iterator<Item = &Node>
    {
        self.segment(self.layout.first_native_object(), self.layout.native_object_count())
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &Node>
    {
        self.segment(self.layout.first_static_fields(), self.layout.static_root_count())
    }

    pub fn managed_objects(&self) -> impl Iterator<Item = &Node>
    {
        self.segment(self.layout.first_managed_object(), self.layout.managed_object_count())
    }

    /// Managed object node located at `address`
    pub fn find_managed(&self, address: Address) -> Option<&Node>
    {
        self.managed_by_address
            .get(&address)
            .and_then(|&index| self.node(index))
    }

    /// Node counts and byte totals per variant
    pub fn total_size_by_kind(&self) -> SizeByKind
    {
        let mut totals = SizeByKind::default();
        for node in &self.nodes {
            let total = match node.kind() {
                NodeKind::NativeObject(_) => &mut totals.native_objects,
                NodeKind::ManagedObject(_) => &mut totals.managed_objects,
                NodeKind::GcHandle(_) => &mut totals.gc_handles,
                NodeKind::StaticFields(_) => &mut totals.static_fields,
            };
            total.add(node.size());
        }
        totals
    }

    fn segment(&self, start: usize, count: usize) -> impl Iterator<Item = &Node>
    {
        self.nodes.iter().skip(start).take(count)
    }
}
