//! Layout constants of the captured virtual machine.

use crate::error::HeapwalkResult;
use crate::heap::view::PointerSize;

/// Fixed object layout of the runtime that produced the snapshot
///
/// All offsets and sizes are in bytes. `pointer_size` is kept as the raw value
/// found in the snapshot; [`VirtualMachineInformation::pointer_width`] validates
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualMachineInformation
{
    /// Pointer width (4 or 8)
    pub pointer_size: u32,
    /// Size of the header in front of every object's instance data
    pub object_header_size: u32,
    /// Size of the header in front of every array's elements
    pub array_header_size: u32,
    /// Offset of the bounds pointer inside an array header
    pub array_bounds_offset_in_header: u32,
    /// Offset of the 32-bit length inside an array header
    pub array_size_offset_in_header: u32,
    /// Allocation granularity of the managed heap
    pub allocation_granularity: u32,
}

impl VirtualMachineInformation
{
    /// Layout of a 64-bit runtime: two-word object header, array header of
    /// header + bounds pointer + length slot.
    pub const fn x64() -> Self
    {
        Self {
            pointer_size: 8,
            object_header_size: 16,
            array_header_size: 32,
            array_bounds_offset_in_header: 16,
            array_size_offset_in_header: 24,
            allocation_granularity: 8,
        }
    }

    /// Layout of a 32-bit runtime
    pub const fn x86() -> Self
    {
        Self {
            pointer_size: 4,
            object_header_size: 8,
            array_header_size: 16,
            array_bounds_offset_in_header: 8,
            array_size_offset_in_header: 12,
            allocation_granularity: 8,
        }
    }

    /// Validated pointer width
    pub fn pointer_width(&self) -> HeapwalkResult<PointerSize>
    {
        PointerSize::try_from(self.pointer_size)
    }

    /// `size` rounded up to the allocation granularity
    pub fn aligned_size(&self, size: u64) -> u64
    {
        let granularity = u64::from(self.allocation_granularity);
        if granularity <= 1 {
            return size;
        }
        size.div_ceil(granularity) * granularity
    }

    pub(crate) fn header_size(&self) -> usize
    {
        self.object_header_size as usize
    }
}

impl Default for VirtualMachineInformation
{
    fn default() -> Self
    {
        Self::x64()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::error::HeapwalkError;

    #[test]
    fn test_presets_have_valid_pointer_width()
    {
        assert_eq!(VirtualMachineInformation::x64().pointer_width().unwrap(), PointerSize::Eight);
        assert_eq!(VirtualMachineInformation::x86().pointer_width().unwrap(), PointerSize::Four);
    }

    #[test]
    fn test_aligned_size()
    {
        let vm = VirtualMachineInformation::x64();
        assert_eq!(vm.aligned_size(0), 0);
        assert_eq!(vm.aligned_size(20), 24);
        assert_eq!(vm.aligned_size(24), 24);

        let unaligned = VirtualMachineInformation {
            allocation_granularity: 0,
            ..vm
        };
        assert_eq!(unaligned.aligned_size(13), 13);
    }

    #[test]
    fn test_invalid_pointer_width()
    {
        let vm = VirtualMachineInformation {
            pointer_size: 16,
            ..VirtualMachineInformation::x64()
        };
        assert!(matches!(vm.pointer_width(), Err(HeapwalkError::UnsupportedPointerSize(16))));
    }
}
