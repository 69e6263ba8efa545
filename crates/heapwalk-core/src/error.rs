//! # Error Types
//!
//! General error handling for snapshot crawling and inspection.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::types::{Address, NodeIndex};

/// Main error type for heapwalk operations
///
/// Every variant describes either malformed snapshot input or a mismatch
/// between the declared virtual machine layout and the actual bytes. None of
/// them are transient, so nothing in the crate retries.
///
/// ## Error Categories
///
/// 1. **Configuration errors**: UnsupportedPointerSize, PointerRoundTrip
/// 2. **Metadata errors**: DuplicateTypeHandle, UnknownTypeHandle, UnknownTypeIndex, TypeIndexMismatch,
///    InvalidFieldOffset, ValueTypeNestingTooDeep
/// 3. **Heap errors**: CorruptObjectHeader, OutOfBounds, OverlappingSegments, UnmappedAddress
/// 4. **Graph errors**: EdgeOutOfRange
/// 5. **Inspection errors**: UnsupportedArray
/// 6. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum HeapwalkError
{
    /// The snapshot declares a pointer width other than 4 or 8 bytes
    #[error("Unsupported pointer size: {0} bytes (expected 4 or 8)")]
    UnsupportedPointerSize(u32),

    /// Writing a pointer and reading it back produced a different value
    ///
    /// This is checked once before any object header is marked. A failure
    /// means the declared pointer width does not match how the buffers are
    /// laid out, and marking headers would corrupt them.
    #[error("Pointer write/read round trip failed: wrote 0x{expected:x}, read back 0x{actual:x}")]
    PointerRoundTrip
    {
        /// Value that was written
        expected: u64,
        /// Value that was read back
        actual: u64,
    },

    /// Two type descriptions share the same runtime type handle
    #[error("Duplicate type handle 0x{handle:x} (type {first} and type {second})")]
    DuplicateTypeHandle
    {
        /// The shared type handle address
        handle: u64,
        /// Index of the first type with this handle
        first: usize,
        /// Index of the second type with this handle
        second: usize,
    },

    /// An object header names a type handle that is not in the type catalog
    #[error("Object at {address} has unknown type handle 0x{handle:x}")]
    UnknownTypeHandle
    {
        /// Address of the object
        address: Address,
        /// Type handle read from its header
        handle: u64,
    },

    /// A type or field refers to a type index outside the catalog
    #[error("Unknown type index: {0}")]
    UnknownTypeIndex(i64),

    /// A type description is stored at a position that differs from its declared index
    #[error("Type description at position {position} declares type index {declared}")]
    TypeIndexMismatch
    {
        /// Position in the type table
        position: usize,
        /// Type index stored in the description
        declared: usize,
    },

    /// The scratch word of an object header was not zero on first visit
    ///
    /// The header-mark strategy stores an object's index in the second header
    /// word and requires that word to be zero beforehand. The heap may still
    /// hold marks of other objects when this is returned; treat the snapshot
    /// as unusable.
    #[error("Corrupt object header at {address}: second header word is 0x{value:x}, expected 0")]
    CorruptObjectHeader
    {
        /// Address of the object
        address: Address,
        /// Non-zero value found in the second header word
        value: u64,
    },

    /// A read or write ran past the end of its buffer
    #[error("Access of {len} bytes at offset {offset} is out of bounds (buffer is {available} bytes)")]
    OutOfBounds
    {
        /// Offset of the access within the buffer
        offset: usize,
        /// Number of bytes accessed
        len: usize,
        /// Size of the buffer
        available: usize,
    },

    /// A field offset cannot be resolved against its storage
    #[error("Field '{field}' of type {type_index} has invalid offset {offset}")]
    InvalidFieldOffset
    {
        /// Type declaring the field
        type_index: usize,
        /// Field name
        field: String,
        /// Offset as recorded in the metadata
        offset: i32,
    },

    /// Inline value types nest deeper than the configured bound
    #[error("Value type {type_index} nests deeper than {depth} levels")]
    ValueTypeNestingTooDeep
    {
        /// Type at which the bound was exceeded
        type_index: usize,
        /// Configured bound
        depth: usize,
    },

    /// Two heap segments cover the same addresses
    #[error("Heap segments starting at {first} and {second} overlap")]
    OverlappingSegments
    {
        /// Start of the lower segment
        first: Address,
        /// Start of the overlapping segment
        second: Address,
    },

    /// The address is not covered by any heap segment
    #[error("Address {0} is not in the managed heap")]
    UnmappedAddress(Address),

    /// An edge refers to an index outside the flat index space
    #[error("Edge {from} -> {to} is outside the index space of {len} nodes")]
    EdgeOutOfRange
    {
        /// Source index
        from: NodeIndex,
        /// Target index
        to: NodeIndex,
        /// Number of nodes in the index space
        len: usize,
    },

    /// The array shape cannot be displayed element by element
    #[error("Unsupported array: {0}")]
    UnsupportedArray(String),

    /// Invalid argument passed to a heapwalk function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (for loading snapshot documents, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, HeapwalkError>`
///
/// ```rust
/// use heapwalk_core::error::HeapwalkResult;
/// fn foo() -> HeapwalkResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type HeapwalkResult<T> = std::result::Result<T, HeapwalkError>;
