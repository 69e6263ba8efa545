//! Address in the snapshot's original address space.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address in the captured process
///
/// Snapshot addresses are never dereferenced directly: they are resolved
/// against the heap segments of the snapshot (see [`crate::heap::HeapIndex`]).
/// Keeping them in a newtype stops them from being mixed up with buffer
/// offsets, sizes or flat node indices, which are all plain integers too.
///
/// Addresses are stored as `u64` regardless of the snapshot's pointer width;
/// 32-bit snapshots simply never use the upper half.
///
/// ## Example
///
/// ```rust
/// use heapwalk_core::types::Address;
///
/// let object = Address::from(0x1000);
/// let first_field = object + 0x10;
/// assert_eq!(first_field.value(), 0x1010);
/// assert_eq!(first_field.offset_from(object), Some(0x10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    ///
    /// Null references in object fields decode to this value and never resolve
    /// to a heap segment.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// ```rust
    /// use heapwalk_core::types::Address;
    ///
    /// const HEAP_BASE: Address = Address::new(0x7f00_0000);
    /// assert_eq!(HEAP_BASE.value(), 0x7f00_0000);
    /// ```
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use heapwalk_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Distance in bytes from `base` to this address
    ///
    /// Returns `None` if this address lies below `base`.
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
