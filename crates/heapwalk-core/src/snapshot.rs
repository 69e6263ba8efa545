//! # Snapshot Model
//!
//! The point-in-time image of a runtime that the crawler consumes: heap
//! segments, GC handles, native objects, type metadata (with static field
//! blocks) and the virtual machine layout constants.
//!
//! Snapshots are assembled with [`SnapshotBuilder`], which validates the parts
//! that every later stage relies on (pointer width, non-overlapping segments).
//!
//! ```rust
//! use heapwalk_core::heap::VirtualMachineInformation;
//! use heapwalk_core::snapshot::Snapshot;
//!
//! let snapshot = Snapshot::builder(VirtualMachineInformation::x64())
//!     .segment(0x1000, vec![0; 64])
//!     .gc_handle(0x1000)
//!     .build()?;
//! assert_eq!(snapshot.gc_handles().len(), 1);
//! # Ok::<(), heapwalk_core::error::HeapwalkError>(())
//! ```

use crate::error::HeapwalkResult;
use crate::heap::{HeapIndex, PointerSize, Segment, VirtualMachineInformation};
use crate::metadata::{TypeCatalog, TypeDescription};
use crate::types::{Address, Connection, IndexLayout};

/// Root reference held by the runtime outside the managed heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GcHandle
{
    /// Object kept alive by this handle
    pub target: Address,
}

/// Engine-side object that may be mirrored by a managed wrapper
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct NativeObject
{
    /// Identifier shared with the managed wrapper's instance id field
    pub instance_id: i32,
    /// Index into the snapshot's class name table
    pub class_id: i32,
    pub name: String,
    pub native_object_address: u64,
    pub size: u64,
    pub hide_flags: u32,
    pub is_persistent: bool,
    pub is_dont_destroy_on_load: bool,
    pub is_manager: bool,
}

/// Captured runtime state, ready to be crawled
#[derive(Debug, Clone)]
pub struct Snapshot
{
    heap: HeapIndex,
    types: Vec<TypeDescription>,
    gc_handles: Vec<GcHandle>,
    native_objects: Vec<NativeObject>,
    class_id_names: Vec<String>,
    connections: Vec<Connection>,
}

impl Snapshot
{
    /// Start assembling a snapshot for a runtime with layout `vm`
    pub fn builder(vm: VirtualMachineInformation) -> SnapshotBuilder
    {
        SnapshotBuilder::new(vm)
    }

    /// Assemble a snapshot from all of its parts at once
    ///
    /// ## Errors
    ///
    /// Same as [`SnapshotBuilder::build`].
    pub fn new(
        vm: VirtualMachineInformation,
        segments: Vec<Segment>,
        types: Vec<TypeDescription>,
        gc_handles: Vec<GcHandle>,
        native_objects: Vec<NativeObject>,
        class_id_names: Vec<String>,
        connections: Vec<Connection>,
    ) -> HeapwalkResult<Self>
    {
        SnapshotBuilder {
            vm,
            segments,
            types,
            gc_handles,
            native_objects,
            class_id_names,
            connections,
        }
        .build()
    }

    pub fn heap(&self) -> &HeapIndex
    {
        &self.heap
    }

    pub fn vm(&self) -> &VirtualMachineInformation
    {
        self.heap.vm()
    }

    pub fn pointer_size(&self) -> PointerSize
    {
        self.heap.pointer_size()
    }

    pub fn types(&self) -> &[TypeDescription]
    {
        &self.types
    }

    /// Validated lookup structure over [`Snapshot::types`]
    pub fn catalog(&self) -> HeapwalkResult<TypeCatalog<'_>>
    {
        TypeCatalog::new(&self.types)
    }

    pub fn gc_handles(&self) -> &[GcHandle]
    {
        &self.gc_handles
    }

    pub fn native_objects(&self) -> &[NativeObject]
    {
        &self.native_objects
    }

    /// Class name for a native object's `class_id`
    pub fn class_name(&self, class_id: i32) -> Option<&str>
    {
        usize::try_from(class_id)
            .ok()
            .and_then(|index| self.class_id_names.get(index))
            .map(String::as_str)
    }

    /// Edges between native objects and GC handles recorded by the runtime
    pub fn connections(&self) -> &[Connection]
    {
        &self.connections
    }

    /// Index layout of the root segments (managed objects not yet counted)
    pub fn root_layout(&self) -> IndexLayout
    {
        let static_roots = self.types.iter().filter(|td| td.has_static_fields()).count();
        IndexLayout::new(self.gc_handles.len(), self.native_objects.len(), static_roots)
    }

    /// Heap for writing and type table for reading, borrowed together
    pub(crate) fn heap_and_types_mut(&mut self) -> (&mut HeapIndex, &[TypeDescription])
    {
        (&mut self.heap, &self.types)
    }
}

/// Builder for [`Snapshot`]
#[derive(Debug, Clone)]
pub struct SnapshotBuilder
{
    vm: VirtualMachineInformation,
    segments: Vec<Segment>,
    types: Vec<TypeDescription>,
    gc_handles: Vec<GcHandle>,
    native_objects: Vec<NativeObject>,
    class_id_names: Vec<String>,
    connections: Vec<Connection>,
}

impl SnapshotBuilder
{
    pub fn new(vm: VirtualMachineInformation) -> Self
    {
        Self {
            vm,
            segments: Vec::new(),
            types: Vec::new(),
            gc_handles: Vec::new(),
            native_objects: Vec::new(),
            class_id_names: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Add a heap segment starting at `start`
    #[must_use]
    pub fn segment(mut self, start: impl Into<Address>, bytes: Vec<u8>) -> Self
    {
        self.segments.push(Segment::new(start, bytes));
        self
    }

    #[must_use]
    pub fn segments(mut self, segments: impl IntoIterator<Item = Segment>) -> Self
    {
        self.segments.extend(segments);
        self
    }

    /// Append a type description; its `type_index` must equal its position
    #[must_use]
    pub fn type_description(mut self, td: TypeDescription) -> Self
    {
        self.types.push(td);
        self
    }

    #[must_use]
    pub fn types(mut self, types: impl IntoIterator<Item = TypeDescription>) -> Self
    {
        self.types.extend(types);
        self
    }

    #[must_use]
    pub fn gc_handle(mut self, target: impl Into<Address>) -> Self
    {
        self.gc_handles.push(GcHandle { target: target.into() });
        self
    }

    #[must_use]
    pub fn gc_handles(mut self, handles: impl IntoIterator<Item = GcHandle>) -> Self
    {
        self.gc_handles.extend(handles);
        self
    }

    #[must_use]
    pub fn native_object(mut self, object: NativeObject) -> Self
    {
        self.native_objects.push(object);
        self
    }

    #[must_use]
    pub fn native_objects(mut self, objects: impl IntoIterator<Item = NativeObject>) -> Self
    {
        self.native_objects.extend(objects);
        self
    }

    #[must_use]
    pub fn class_id_names(mut self, names: impl IntoIterator<Item = String>) -> Self
    {
        self.class_id_names.extend(names);
        self
    }

    /// Add a runtime-recorded edge (native object to native object or GC handle)
    #[must_use]
    pub fn connection(mut self, connection: Connection) -> Self
    {
        self.connections.push(connection);
        self
    }

    #[must_use]
    pub fn connections(mut self, connections: impl IntoIterator<Item = Connection>) -> Self
    {
        self.connections.extend(connections);
        self
    }

    /// Validate and assemble the snapshot
    ///
    /// ## Errors
    ///
    /// - `UnsupportedPointerSize`: the layout declares a pointer width other than 4 or 8
    /// - `OverlappingSegments`: two heap segments cover the same address
    pub fn build(self) -> HeapwalkResult<Snapshot>
    {
        let heap = HeapIndex::new(self.segments, self.vm)?;
        Ok(Snapshot {
            heap,
            types: self.types,
            gc_handles: self.gc_handles,
            native_objects: self.native_objects,
            class_id_names: self.class_id_names,
            connections: self.connections,
        })
    }
}
