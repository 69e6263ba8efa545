//! Visitation bookkeeping for the crawler.
//!
//! The crawler must hand out each object's index exactly once and recognise
//! objects it has already seen, however many references lead to them. Two
//! strategies implement [`VisitTracker`]:
//!
//! - [`AddressTable`]: a side table keyed by object address. The heap is only
//!   read. This is the default.
//! - [`HeaderMarks`]: the object header itself is the scratch space. The low
//!   bit of the type handle word marks an object as visited and the second
//!   header word holds its index. Every touched header is backed up and written
//!   back by [`VisitTracker::restore`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{HeapwalkError, HeapwalkResult};
use crate::heap::{ByteView, ByteViewMut, HeapIndex, PointerSize};
use crate::types::{Address, NodeIndex};

/// Low bit of the type handle word, set while an object is marked
const MARK_BIT: u64 = 1;

/// Value written and read back before any header is marked
const ROUND_TRIP_MAGIC: u64 = 0xdead_beef_1234_abcd;

/// How the crawler remembers which objects it has visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitStrategy
{
    /// Address-keyed side table; the heap is never written
    #[default]
    AddressTable,
    /// Mark bit and index stored in the object header, restored afterwards
    HeaderMarks,
}

impl FromStr for VisitStrategy
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "table" | "address-table" => Ok(VisitStrategy::AddressTable),
            "header" | "header-marks" | "mark" => Ok(VisitStrategy::HeaderMarks),
            _ => Err(format!("Unknown visit strategy: {s}. Use 'table' or 'header'")),
        }
    }
}

impl fmt::Display for VisitStrategy
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            VisitStrategy::AddressTable => f.write_str("address-table"),
            VisitStrategy::HeaderMarks => f.write_str("header-marks"),
        }
    }
}

/// Result of looking at an object before deciding whether to walk it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe
{
    /// First encounter; `type_handle` is the bare handle from the header
    Unvisited
    {
        type_handle: u64,
    },
    /// Seen before under `index`
    Visited
    {
        index: NodeIndex,
    },
}

/// Remembers visited objects for the duration of one crawl
pub trait VisitTracker
{
    /// Inspect the object whose header starts at `object`
    fn probe(&self, object: ByteView<'_>, address: Address) -> HeapwalkResult<Probe>;

    /// Record that the object at `address` now owns `index`
    fn mark(&mut self, heap: &mut HeapIndex, address: Address, type_handle: u64, index: NodeIndex)
        -> HeapwalkResult<()>;

    /// Undo every change made to `heap` by [`VisitTracker::mark`]
    fn restore(&mut self, heap: &mut HeapIndex) -> HeapwalkResult<()>;
}

/// Side table from object address to assigned index
#[derive(Debug, Default)]
pub struct AddressTable
{
    visited: HashMap<Address, NodeIndex>,
}

impl AddressTable
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn len(&self) -> usize
    {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.visited.is_empty()
    }
}

impl VisitTracker for AddressTable
{
    fn probe(&self, object: ByteView<'_>, address: Address) -> HeapwalkResult<Probe>
    {
        if let Some(&index) = self.visited.get(&address) {
            return Ok(Probe::Visited { index });
        }
        Ok(Probe::Unvisited {
            type_handle: object.read_pointer()?,
        })
    }

    fn mark(&mut self, _heap: &mut HeapIndex, address: Address, _type_handle: u64, index: NodeIndex)
        -> HeapwalkResult<()>
    {
        self.visited.insert(address, index);
        Ok(())
    }

    fn restore(&mut self, _heap: &mut HeapIndex) -> HeapwalkResult<()>
    {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct MarkedHeader
{
    address: Address,
    type_handle: u64,
    second_word: u64,
}

/// In-place header marking
///
/// The second header word must be zero the first time an object is seen; any
/// other value is reported as [`HeapwalkError::CorruptObjectHeader`].
#[derive(Debug)]
pub struct HeaderMarks
{
    marked: Vec<MarkedHeader>,
}

impl HeaderMarks
{
    /// Create the tracker after checking that pointer writes read back intact
    ///
    /// ## Errors
    ///
    /// `PointerRoundTrip` if a pointer written at `pointer_size` does not read
    /// back as the same value.
    pub fn new(pointer_size: PointerSize) -> HeapwalkResult<Self>
    {
        let mut scratch = [0u8; 8];
        let mut word = ByteViewMut::at(&mut scratch, 0, pointer_size);
        word.write_pointer(ROUND_TRIP_MAGIC)?;
        let actual = word.read_pointer()?;
        let expected = match pointer_size {
            PointerSize::Four => ROUND_TRIP_MAGIC & u64::from(u32::MAX),
            PointerSize::Eight => ROUND_TRIP_MAGIC,
        };
        if actual != expected {
            return Err(HeapwalkError::PointerRoundTrip { expected, actual });
        }
        Ok(Self { marked: Vec::new() })
    }

    /// Number of headers currently marked
    pub fn marked_count(&self) -> usize
    {
        self.marked.len()
    }
}

impl VisitTracker for HeaderMarks
{
    fn probe(&self, object: ByteView<'_>, _address: Address) -> HeapwalkResult<Probe>
    {
        let first = object.read_pointer()?;
        if first & MARK_BIT == 0 {
            return Ok(Probe::Unvisited { type_handle: first });
        }
        let stored = object.next_pointer().read_pointer()?;
        let index = usize::try_from(stored).map_err(|_| {
            HeapwalkError::InvalidArgument(format!("stored object index 0x{stored:x} does not fit in usize"))
        })?;
        Ok(Probe::Visited {
            index: NodeIndex(index),
        })
    }

    fn mark(&mut self, heap: &mut HeapIndex, address: Address, type_handle: u64, index: NodeIndex)
        -> HeapwalkResult<()>
    {
        let mut header = heap.find_mut(address).ok_or(HeapwalkError::UnmappedAddress(address))?;
        let second_word = header.as_view().next_pointer().read_pointer()?;
        if second_word != 0 {
            return Err(HeapwalkError::CorruptObjectHeader {
                address,
                value: second_word,
            });
        }

        header.write_pointer(type_handle | MARK_BIT)?;
        self.marked.push(MarkedHeader {
            address,
            type_handle,
            second_word,
        });
        header.next_pointer().write_pointer(index.0 as u64)
    }

    fn restore(&mut self, heap: &mut HeapIndex) -> HeapwalkResult<()>
    {
        debug!("Restoring {} object headers", self.marked.len());
        let mut first_error = None;
        for entry in self.marked.drain(..) {
            let restored = match heap.find_mut(entry.address) {
                Some(mut header) => match header.write_pointer(entry.type_handle) {
                    Ok(()) => header.next_pointer().write_pointer(entry.second_word),
                    Err(err) => Err(err),
                },
                None => Err(HeapwalkError::UnmappedAddress(entry.address)),
            };
            if let Err(err) = restored {
                warn!("Failed to restore object header at {}: {err}", entry.address);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::heap::{Segment, VirtualMachineInformation};

    fn heap_with_header(handle: u64, second: u64) -> HeapIndex
    {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&handle.to_le_bytes());
        bytes.extend_from_slice(&second.to_le_bytes());
        HeapIndex::new(vec![Segment::new(0x1000, bytes)], VirtualMachineInformation::x64()).unwrap()
    }

    #[test]
    fn test_strategy_from_str()
    {
        assert_eq!("table".parse::<VisitStrategy>().unwrap(), VisitStrategy::AddressTable);
        assert_eq!("HEADER".parse::<VisitStrategy>().unwrap(), VisitStrategy::HeaderMarks);
        assert!("bogus".parse::<VisitStrategy>().is_err());
    }

    #[test]
    fn test_address_table_never_writes()
    {
        let mut heap = heap_with_header(0x500, 0);
        let before = heap.segments()[0].bytes.clone();
        let mut table = AddressTable::new();
        let address = Address::new(0x1000);

        let probe = table.probe(heap.find(address).unwrap(), address).unwrap();
        assert_eq!(probe, Probe::Unvisited { type_handle: 0x500 });
        table.mark(&mut heap, address, 0x500, NodeIndex(3)).unwrap();
        let probe = table.probe(heap.find(address).unwrap(), address).unwrap();
        assert_eq!(probe, Probe::Visited { index: NodeIndex(3) });
        assert_eq!(heap.segments()[0].bytes, before);
    }

    #[test]
    fn test_header_marks_mark_and_restore()
    {
        let mut heap = heap_with_header(0x500, 0);
        let before = heap.segments()[0].bytes.clone();
        let mut marks = HeaderMarks::new(PointerSize::Eight).unwrap();
        let address = Address::new(0x1000);

        marks.mark(&mut heap, address, 0x500, NodeIndex(7)).unwrap();
        assert_eq!(heap.read_pointer(address).unwrap(), 0x501);
        assert_eq!(heap.read_pointer(address + 8).unwrap(), 7);
        let probe = marks.probe(heap.find(address).unwrap(), address).unwrap();
        assert_eq!(probe, Probe::Visited { index: NodeIndex(7) });

        marks.restore(&mut heap).unwrap();
        assert_eq!(heap.segments()[0].bytes, before);
        assert_eq!(marks.marked_count(), 0);
    }

    #[test]
    fn test_header_marks_reject_dirty_second_word()
    {
        let mut heap = heap_with_header(0x500, 0x99);
        let before = heap.segments()[0].bytes.clone();
        let mut marks = HeaderMarks::new(PointerSize::Eight).unwrap();
        let result = marks.mark(&mut heap, Address::new(0x1000), 0x500, NodeIndex(0));
        assert!(matches!(result, Err(HeapwalkError::CorruptObjectHeader { value: 0x99, .. })));
        assert_eq!(heap.segments()[0].bytes, before);
    }

    #[test]
    fn test_round_trip_self_test_passes_at_both_widths()
    {
        assert!(HeaderMarks::new(PointerSize::Four).is_ok());
        assert!(HeaderMarks::new(PointerSize::Eight).is_ok());
    }
}
