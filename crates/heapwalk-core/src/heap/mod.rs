//! # Managed Heap Access
//!
//! Byte-level access to the heap segments captured in a snapshot.
//!
//! A snapshot carries the managed heap as a list of segments, each a byte
//! buffer copied from the process together with the address it started at.
//! [`HeapIndex`] maps addresses of the original process onto those buffers and
//! hands out [`ByteView`]s positioned at the requested address.
//!
//! ## Unmapped addresses
//!
//! [`HeapIndex::find`] returns `None` when no segment covers the address. This
//! is how the crawler recognises references that leave the managed heap (null,
//! native memory, memory that was not captured): such references are not
//! errors, they simply produce no edge. Consumers that need the bytes behind a
//! specific address use [`HeapIndex::resolve`], which turns the miss into
//! [`HeapwalkError::UnmappedAddress`].

pub mod view;
pub mod vm;

use std::fmt;

pub use view::{ByteView, ByteViewMut, PointerSize};
pub use vm::VirtualMachineInformation;

use crate::error::{HeapwalkError, HeapwalkResult};
use crate::metadata::TypeDescription;
use crate::types::Address;

/// Stride between per-dimension lengths in an array bounds buffer
const ARRAY_BOUNDS_STRIDE: usize = 8;

/// Contiguous piece of the managed heap
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment
{
    /// Address of the first byte in the original process
    pub start: Address,
    /// Captured bytes
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Segment
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Segment")
            .field("start", &self.start)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Segment
{
    pub fn new(start: impl Into<Address>, bytes: Vec<u8>) -> Self
    {
        Self {
            start: start.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize
    {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.bytes.is_empty()
    }

    /// One past the last covered address
    pub fn end(&self) -> Address
    {
        self.start.checked_add(self.bytes.len() as u64).unwrap_or(Address::new(u64::MAX))
    }

    /// Whether `start <= address < start + len`
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end()
    }
}

/// Address lookup over the heap segments of one snapshot
#[derive(Debug, Clone)]
pub struct HeapIndex
{
    segments: Vec<Segment>,
    vm: VirtualMachineInformation,
    pointer_size: PointerSize,
}

impl HeapIndex
{
    /// Build the index
    ///
    /// Segments are sorted by start address; empty segments are dropped.
    ///
    /// ## Errors
    ///
    /// - `UnsupportedPointerSize`: `vm.pointer_size` is neither 4 nor 8
    /// - `OverlappingSegments`: two segments cover the same address
    pub fn new(mut segments: Vec<Segment>, vm: VirtualMachineInformation) -> HeapwalkResult<Self>
    {
        let pointer_size = vm.pointer_width()?;
        segments.retain(|segment| !segment.is_empty());
        segments.sort_by_key(|segment| segment.start);
        for pair in segments.windows(2) {
            if pair[0].end() > pair[1].start {
                return Err(HeapwalkError::OverlappingSegments {
                    first: pair[0].start,
                    second: pair[1].start,
                });
            }
        }
        Ok(Self {
            segments,
            vm,
            pointer_size,
        })
    }

    /// Segments sorted by start address
    pub fn segments(&self) -> &[Segment]
    {
        &self.segments
    }

    pub fn vm(&self) -> &VirtualMachineInformation
    {
        &self.vm
    }

    pub fn pointer_size(&self) -> PointerSize
    {
        self.pointer_size
    }

    /// Total number of captured heap bytes
    pub fn total_bytes(&self) -> usize
    {
        self.segments.iter().map(Segment::len).sum()
    }

    fn locate(&self, address: Address) -> Option<(usize, usize)>
    {
        let after = self.segments.partition_point(|segment| segment.start <= address);
        let index = after.checked_sub(1)?;
        let segment = &self.segments[index];
        if !segment.contains(address) {
            return None;
        }
        let offset = usize::try_from(address.offset_from(segment.start)?).ok()?;
        Some((index, offset))
    }

    /// View positioned at `address`, or `None` if no segment covers it
    pub fn find(&self, address: Address) -> Option<ByteView<'_>>
    {
        let (index, offset) = self.locate(address)?;
        Some(ByteView::at(&self.segments[index].bytes, offset, self.pointer_size))
    }

    /// Writable view positioned at `address`, or `None` if no segment covers it
    pub fn find_mut(&mut self, address: Address) -> Option<ByteViewMut<'_>>
    {
        let (index, offset) = self.locate(address)?;
        let pointer_size = self.pointer_size;
        Some(ByteViewMut::at(&mut self.segments[index].bytes, offset, pointer_size))
    }

    /// Like [`HeapIndex::find`], but a miss is an error
    pub fn resolve(&self, address: Address) -> HeapwalkResult<ByteView<'_>>
    {
        self.find(address).ok_or(HeapwalkError::UnmappedAddress(address))
    }

    /// Read the pointer-width value stored at `address`
    pub fn read_pointer(&self, address: Address) -> HeapwalkResult<u64>
    {
        self.resolve(address)?.read_pointer()
    }

    /// Number of elements of the array object at `address`
    ///
    /// A zero bounds pointer means a single-dimensional array whose length is
    /// stored inline in the header. Otherwise the bounds pointer refers to one
    /// 32-bit length per dimension, 8 bytes apart, and the result is their sum.
    /// Negative totals decode as zero.
    pub fn read_array_length(&self, address: Address, array_type: &TypeDescription) -> HeapwalkResult<usize>
    {
        let header = self.resolve(address)?;
        let bounds = header
            .advance(self.vm.array_bounds_offset_in_header as usize)
            .read_pointer()?;

        let total = if bounds == 0 {
            i64::from(header.advance(self.vm.array_size_offset_in_header as usize).read_i32()?)
        } else {
            let mut cursor = self.resolve(Address::new(bounds))?;
            let mut total = 0i64;
            for _ in 0..array_type.array_rank {
                total += i64::from(cursor.read_i32()?);
                cursor = cursor.advance(ARRAY_BOUNDS_STRIDE);
            }
            total
        };
        Ok(usize::try_from(total).unwrap_or(0))
    }
}
