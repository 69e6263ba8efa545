//! Common module for library exports

pub use crate::crawler::{
    crawl, CrawlConfig, CrawledSnapshot, Crawler, ManagedObjectRecord, StaticRoot, VisitStrategy,
};
pub use crate::error::{HeapwalkError, HeapwalkResult};
pub use crate::graph::{HeapGraph, Node, NodeKind, SizeByKind};
pub use crate::heap::{ByteView, HeapIndex, PointerSize, Segment, VirtualMachineInformation};
pub use crate::inspect::{FieldEntry, FieldValue, ObjectInspector};
pub use crate::metadata::{FieldDescription, TypeCatalog, TypeDescription};
pub use crate::snapshot::{GcHandle, NativeObject, Snapshot, SnapshotBuilder};
pub use crate::types::{Address, Connection, IndexLayout, NodeIndex, NodeSlot};
