//! # Heap Crawler
//!
//! Reconstructs the live managed object graph of a [`Snapshot`].
//!
//! Starting from the roots (GC handles, then the static field block of every
//! type that has one), the crawler follows every reference it can decode:
//!
//! 1. A pointer is resolved against the heap segments. Pointers outside the
//!    managed heap produce no edge.
//! 2. The object header names the object's type. On first encounter the
//!    object gets the next managed index and a [`ManagedObjectRecord`]; every
//!    encounter adds one edge from the referrer.
//! 3. Only first encounters walk the object's contents: instance fields for
//!    classes, elements for arrays. Value types are walked inline wherever
//!    they are stored.
//! 4. Managed objects deriving from the engine base type are linked to the
//!    native object with the same instance id.
//!
//! Traversal uses an explicit work list, so deep or cyclic graphs do not grow
//! the call stack. How visited objects are recognised is pluggable through
//! [`VisitStrategy`]; with [`VisitStrategy::HeaderMarks`] the heap is modified
//! during the crawl and restored before [`Crawler::crawl`] returns, on success
//! and on failure.
//!
//! ## Example
//!
//! ```rust
//! use heapwalk_core::crawler::{CrawlConfig, Crawler, VisitStrategy};
//! use heapwalk_core::heap::VirtualMachineInformation;
//! use heapwalk_core::snapshot::Snapshot;
//!
//! let mut snapshot = Snapshot::builder(VirtualMachineInformation::x64()).build()?;
//! let crawler = Crawler::new(CrawlConfig::default().with_strategy(VisitStrategy::HeaderMarks));
//! let crawled = crawler.crawl(&mut snapshot)?;
//! assert!(crawled.managed_objects.is_empty());
//! # Ok::<(), heapwalk_core::error::HeapwalkError>(())
//! ```

pub mod visit;

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};
pub use visit::{AddressTable, HeaderMarks, Probe, VisitStrategy, VisitTracker};

use crate::error::{HeapwalkError, HeapwalkResult};
use crate::heap::{ByteView, HeapIndex, PointerSize};
use crate::metadata::{TypeCatalog, TypeDescription};
use crate::snapshot::Snapshot;
use crate::types::{Address, Connection, IndexLayout, NodeIndex};

/// Default engine base type whose instances mirror native objects
pub const DEFAULT_NATIVE_BASE_TYPE: &str = "UnityEngine.Object";

/// Default name of the instance id field on the engine base type
pub const DEFAULT_INSTANCE_ID_FIELD: &str = "m_InstanceID";

/// Default bound on inline value-type nesting
pub const DEFAULT_MAX_VALUE_TYPE_DEPTH: usize = 64;

/// Settings for one crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig
{
    /// How visited objects are recognised
    pub strategy: VisitStrategy,
    /// Name of the managed type whose instances wrap native objects
    pub native_base_type: String,
    /// Name of the 32-bit instance id field on `native_base_type`
    pub instance_id_field: String,
    /// Deepest allowed chain of value types stored inside value types
    pub max_value_type_depth: usize,
}

impl Default for CrawlConfig
{
    fn default() -> Self
    {
        Self {
            strategy: VisitStrategy::default(),
            native_base_type: DEFAULT_NATIVE_BASE_TYPE.to_string(),
            instance_id_field: DEFAULT_INSTANCE_ID_FIELD.to_string(),
            max_value_type_depth: DEFAULT_MAX_VALUE_TYPE_DEPTH,
        }
    }
}

impl CrawlConfig
{
    #[must_use]
    pub fn with_strategy(mut self, strategy: VisitStrategy) -> Self
    {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_native_base_type(mut self, name: impl Into<String>) -> Self
    {
        self.native_base_type = name.into();
        self
    }

    #[must_use]
    pub fn with_instance_id_field(mut self, name: impl Into<String>) -> Self
    {
        self.instance_id_field = name.into();
        self
    }

    #[must_use]
    pub fn with_max_value_type_depth(mut self, depth: usize) -> Self
    {
        self.max_value_type_depth = depth;
        self
    }
}

/// One discovered managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManagedObjectRecord
{
    pub address: Address,
    pub type_index: usize,
    /// Instance size of the type; 0 for arrays, whose length is read on demand
    pub size: u32,
}

/// Synthetic root standing for the static fields of one type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticRoot
{
    pub type_index: usize,
}

/// Crawler output: discovered objects and all edges in the flat index space
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrawledSnapshot
{
    /// Segment sizes of the index space, managed objects included
    pub layout: IndexLayout,
    /// Static field roots in index order
    pub static_roots: Vec<StaticRoot>,
    /// Managed objects in discovery (and index) order
    pub managed_objects: Vec<ManagedObjectRecord>,
    /// Runtime-recorded edges followed by the edges found while crawling
    pub connections: Vec<Connection>,
}

impl CrawledSnapshot
{
    /// Number of nodes in the index space
    pub fn node_count(&self) -> usize
    {
        self.layout.len()
    }

    /// Index of the managed object recorded at `address`, if any
    ///
    /// Records are kept in discovery order, so this scans them; use
    /// [`crate::graph::HeapGraph::find_managed`] for repeated lookups.
    pub fn managed_index_of(&self, address: Address) -> Option<NodeIndex>
    {
        self.managed_objects
            .iter()
            .position(|record| record.address == address)
            .map(|position| self.layout.managed_object(position))
    }
}

/// Runs crawls with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Crawler
{
    config: CrawlConfig,
}

impl Crawler
{
    pub fn new(config: CrawlConfig) -> Self
    {
        Self { config }
    }

    pub fn config(&self) -> &CrawlConfig
    {
        &self.config
    }

    /// Discover every reachable managed object and every reference edge
    ///
    /// The snapshot is borrowed mutably because the header-mark strategy writes
    /// to the heap while it runs; on return the heap bytes are identical to
    /// what they were before the call. A crawl must not run concurrently with
    /// any other use of the same snapshot.
    ///
    /// ## Errors
    ///
    /// - `DuplicateTypeHandle` / `TypeIndexMismatch`: invalid type table, detected before traversal
    /// - `PointerRoundTrip`: header-mark self-test failed, detected before traversal
    /// - `CorruptObjectHeader`: header-mark precondition violated
    /// - `UnknownTypeHandle`, `UnknownTypeIndex`, `InvalidFieldOffset`, `OutOfBounds`,
    ///   `ValueTypeNestingTooDeep`: malformed heap or metadata
    pub fn crawl(&self, snapshot: &mut Snapshot) -> HeapwalkResult<CrawledSnapshot>
    {
        match self.config.strategy {
            VisitStrategy::AddressTable => self.crawl_with(snapshot, AddressTable::new()),
            VisitStrategy::HeaderMarks => {
                let tracker = HeaderMarks::new(snapshot.pointer_size())?;
                self.crawl_with(snapshot, tracker)
            }
        }
    }

    /// Crawl using a caller-provided visitation tracker
    pub fn crawl_with<T: VisitTracker>(&self, snapshot: &mut Snapshot, tracker: T) -> HeapwalkResult<CrawledSnapshot>
    {
        let layout = snapshot.root_layout();
        let gc_targets: Vec<Address> = snapshot.gc_handles().iter().map(|handle| handle.target).collect();
        let recorded_connections = snapshot.connections().to_vec();
        let mut native_ids = HashMap::with_capacity(snapshot.native_objects().len());
        for (position, native) in snapshot.native_objects().iter().enumerate() {
            native_ids.entry(native.instance_id).or_insert(position);
        }

        let (heap, types) = snapshot.heap_and_types_mut();
        let catalog = TypeCatalog::new(types)?;
        let static_roots: Vec<StaticRoot> = catalog
            .with_static_fields()
            .map(|td| StaticRoot { type_index: td.type_index })
            .collect();

        info!(
            "Crawling snapshot: {} GC handles, {} native objects, {} static roots, strategy {}",
            layout.gc_handle_count(),
            layout.native_object_count(),
            layout.static_root_count(),
            self.config.strategy
        );

        let mut walk = Walk::new(heap, catalog, types, layout, tracker, self.config.max_value_type_depth);
        walk.connections.extend(recorded_connections);

        let outcome = walk
            .discover(&gc_targets, &static_roots)
            .and_then(|()| walk.connect_native(&native_ids, &self.config));
        let restored = walk.tracker.restore(walk.heap);

        if let Err(err) = outcome {
            if let Err(restore_err) = restored {
                warn!("Heap restoration after failed crawl also failed: {restore_err}");
            }
            return Err(err);
        }
        restored?;

        info!(
            "Crawl complete: {} managed objects, {} connections",
            walk.objects.len(),
            walk.connections.len()
        );
        Ok(CrawledSnapshot {
            layout: layout.with_managed_objects(walk.objects.len()),
            static_roots,
            managed_objects: walk.objects,
            connections: walk.connections,
        })
    }
}

/// Crawl with the default configuration
pub fn crawl(snapshot: &mut Snapshot) -> HeapwalkResult<CrawledSnapshot>
{
    Crawler::default().crawl(snapshot)
}

/// Where a run of fields is stored
#[derive(Debug, Clone, Copy)]
enum Storage
{
    /// Inside the heap object starting at this address
    Heap(Address),
    /// Inside the static field block of this type
    Static(usize),
}

#[derive(Debug, Clone, Copy)]
enum Work
{
    /// Walk the contents of a newly discovered object
    Object
    {
        address: Address,
        index: NodeIndex,
        type_index: usize,
    },
    /// Walk the fields of `type_index` stored at `offset` inside `storage`
    Fields
    {
        storage: Storage,
        offset: usize,
        type_index: usize,
        statics: bool,
        from: NodeIndex,
        depth: usize,
    },
}

struct Walk<'s, T>
{
    heap: &'s mut HeapIndex,
    catalog: TypeCatalog<'s>,
    types: &'s [TypeDescription],
    layout: IndexLayout,
    tracker: T,
    pointer_size: PointerSize,
    header_size: usize,
    array_header_size: usize,
    max_depth: usize,
    objects: Vec<ManagedObjectRecord>,
    connections: Vec<Connection>,
    work: Vec<Work>,
}

impl<'s, T: VisitTracker> Walk<'s, T>
{
    fn new(
        heap: &'s mut HeapIndex,
        catalog: TypeCatalog<'s>,
        types: &'s [TypeDescription],
        layout: IndexLayout,
        tracker: T,
        max_depth: usize,
    ) -> Self
    {
        let vm = *heap.vm();
        let pointer_size = heap.pointer_size();
        Self {
            heap,
            catalog,
            types,
            layout,
            tracker,
            pointer_size,
            header_size: vm.object_header_size as usize,
            array_header_size: vm.array_header_size as usize,
            max_depth,
            objects: Vec::with_capacity(layout.first_managed_object() * 3),
            connections: Vec::new(),
            work: Vec::new(),
        }
    }

    fn discover(&mut self, gc_targets: &[Address], static_roots: &[StaticRoot]) -> HeapwalkResult<()>
    {
        for (position, target) in gc_targets.iter().enumerate() {
            self.visit_pointer(target.value(), self.layout.gc_handle(position))?;
            self.drain()?;
        }
        for (position, root) in static_roots.iter().enumerate() {
            self.work.push(Work::Fields {
                storage: Storage::Static(root.type_index),
                offset: 0,
                type_index: root.type_index,
                statics: true,
                from: self.layout.static_fields(position),
                depth: 0,
            });
            self.drain()?;
        }
        debug!("Discovered {} managed objects", self.objects.len());
        Ok(())
    }

    fn drain(&mut self) -> HeapwalkResult<()>
    {
        while let Some(work) = self.work.pop() {
            match work {
                Work::Object {
                    address,
                    index,
                    type_index,
                } => self.scan_object(address, index, type_index)?,
                Work::Fields {
                    storage,
                    offset,
                    type_index,
                    statics,
                    from,
                    depth,
                } => self.walk_fields(storage, offset, type_index, statics, from, depth)?,
            }
        }
        Ok(())
    }

    fn visit_pointer(&mut self, pointer: u64, from: NodeIndex) -> HeapwalkResult<()>
    {
        let address = Address::new(pointer);
        let Some(object) = self.heap.find(address) else {
            if pointer != 0 {
                trace!("Dropping reference from {from} to unmapped address {address}");
            }
            return Ok(());
        };

        let probe = match self.tracker.probe(object, address)? {
            // a stale or foreign mark bit is not proof of a visit
            Probe::Visited { index } if !self.owns(index, address) => {
                debug!("Ignoring visit mark on {address} that names {index}");
                Probe::Unvisited {
                    type_handle: object.read_pointer()?,
                }
            }
            probe => probe,
        };

        match probe {
            Probe::Visited { index } => {
                self.connections.push(Connection { from, to: index });
            }
            Probe::Unvisited { type_handle } => {
                let td = self
                    .catalog
                    .by_handle(type_handle)
                    .ok_or(HeapwalkError::UnknownTypeHandle {
                        address,
                        handle: type_handle,
                    })?;
                let index = self.layout.managed_object(self.objects.len());
                self.tracker.mark(self.heap, address, type_handle, index)?;
                self.objects.push(ManagedObjectRecord {
                    address,
                    type_index: td.type_index,
                    size: if td.is_array { 0 } else { td.size },
                });
                self.connections.push(Connection { from, to: index });
                self.work.push(Work::Object {
                    address,
                    index,
                    type_index: td.type_index,
                });
            }
        }
        Ok(())
    }

    /// Whether `index` was handed out to the object at `address`
    fn owns(&self, index: NodeIndex, address: Address) -> bool
    {
        index
            .0
            .checked_sub(self.layout.first_managed_object())
            .and_then(|position| self.objects.get(position))
            .is_some_and(|record| record.address == address)
    }

    fn scan_object(&mut self, address: Address, index: NodeIndex, type_index: usize) -> HeapwalkResult<()>
    {
        let td = self.catalog.get(type_index)?;
        if !td.is_array {
            self.work.push(Work::Fields {
                storage: Storage::Heap(address),
                offset: self.header_size,
                type_index,
                statics: false,
                from: index,
                depth: 0,
            });
            return Ok(());
        }

        let length = self.heap.read_array_length(address, td)?;
        let element = self.catalog.element_type(td)?;
        trace!("Array {address} of {} holds {length} elements", element.name);

        let stride = if element.is_value_type {
            element.size as usize
        } else {
            self.pointer_size.bytes()
        };
        let elements = self.heap.resolve(address)?.advance(self.array_header_size);
        elements.slice(length.saturating_mul(stride))?;

        if element.is_value_type {
            for position in 0..length {
                self.work.push(Work::Fields {
                    storage: Storage::Heap(address),
                    offset: self.array_header_size + position * stride,
                    type_index: element.type_index,
                    statics: false,
                    from: index,
                    depth: 1,
                });
            }
            return Ok(());
        }

        let pointers = (0..length)
            .map(|position| elements.advance(position * stride).read_pointer())
            .collect::<HeapwalkResult<Vec<u64>>>()?;
        for pointer in pointers {
            self.visit_pointer(pointer, index)?;
        }
        Ok(())
    }

    fn walk_fields(
        &mut self,
        storage: Storage,
        offset: usize,
        type_index: usize,
        statics: bool,
        from: NodeIndex,
        depth: usize,
    ) -> HeapwalkResult<()>
    {
        if depth > self.max_depth {
            return Err(HeapwalkError::ValueTypeNestingTooDeep {
                type_index,
                depth: self.max_depth,
            });
        }
        let td = self.catalog.get(type_index)?;

        let base = match storage {
            Storage::Heap(address) => self.heap.find(address),
            Storage::Static(owner) => Some(ByteView::new(&self.types[owner].static_field_bytes, self.pointer_size)),
        };
        let Some(base) = base.map(|view| view.advance(offset)) else {
            return Ok(());
        };

        let mut pointers: SmallVec<[u64; 8]> = SmallVec::new();
        for field in &td.fields {
            if field.is_static != statics {
                continue;
            }
            // primitive value types declare a field of their own type
            if td.is_value_type && usize::try_from(field.type_index) == Ok(td.type_index) {
                continue;
            }
            // thread-local statics are not roots
            if field.is_thread_static() {
                continue;
            }

            let field_type = self.catalog.field_type(field)?;
            let relative = field.storage_offset(td.type_index, statics, self.header_size)?;
            if field_type.is_value_type {
                self.work.push(Work::Fields {
                    storage,
                    offset: offset + relative,
                    type_index: field_type.type_index,
                    statics: false,
                    from,
                    depth: depth + 1,
                });
            } else {
                pointers.push(base.advance(relative).read_pointer()?);
            }
        }

        for pointer in pointers {
            self.visit_pointer(pointer, from)?;
        }
        Ok(())
    }

    fn connect_native(&mut self, native_ids: &HashMap<i32, usize>, config: &CrawlConfig) -> HeapwalkResult<()>
    {
        let Some(base) = self.catalog.by_name(&config.native_base_type) else {
            debug!("No type named {}, skipping native connections", config.native_base_type);
            return Ok(());
        };
        let Some(field) = base.field(&config.instance_id_field) else {
            warn!(
                "Type {} has no field {}, skipping native connections",
                base.name, config.instance_id_field
            );
            return Ok(());
        };
        let Ok(field_offset) = u64::try_from(field.offset) else {
            warn!("Field {}.{} has no fixed offset, skipping native connections", base.name, field.name);
            return Ok(());
        };

        let before = self.connections.len();
        for (position, record) in self.objects.iter().enumerate() {
            if !self.catalog.derives_from(record.type_index, base.type_index) {
                continue;
            }
            let instance_id = self.heap.resolve(record.address + field_offset)?.read_i32()?;
            if let Some(&native) = native_ids.get(&instance_id) {
                self.connections.push(Connection {
                    from: self.layout.managed_object(position),
                    to: self.layout.native_object(native),
                });
            }
        }
        debug!("Linked {} managed objects to native objects", self.connections.len() - before);
        Ok(())
    }
}
