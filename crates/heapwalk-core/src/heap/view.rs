//! Typed reads and writes at an offset into a byte buffer.
//!
//! All multi-byte values are little-endian. A view is a cheap `Copy` value:
//! advancing produces a new view and never touches the underlying buffer.
//! Views are not bounds-checked when created or advanced; every read checks
//! that the bytes it needs are inside the buffer and reports
//! [`HeapwalkError::OutOfBounds`] otherwise.

use std::fmt;

use crate::error::{HeapwalkError, HeapwalkResult};

/// Width of a pointer in the captured process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerSize
{
    /// 32-bit process
    Four,
    /// 64-bit process
    Eight,
}

impl PointerSize
{
    /// Number of bytes in a pointer
    pub const fn bytes(self) -> usize
    {
        match self {
            PointerSize::Four => 4,
            PointerSize::Eight => 8,
        }
    }
}

impl TryFrom<u32> for PointerSize
{
    type Error = HeapwalkError;

    fn try_from(value: u32) -> HeapwalkResult<Self>
    {
        match value {
            4 => Ok(PointerSize::Four),
            8 => Ok(PointerSize::Eight),
            other => Err(HeapwalkError::UnsupportedPointerSize(other)),
        }
    }
}

impl From<PointerSize> for u32
{
    fn from(size: PointerSize) -> Self
    {
        match size {
            PointerSize::Four => 4,
            PointerSize::Eight => 8,
        }
    }
}

impl fmt::Display for PointerSize
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}-bit", self.bytes() * 8)
    }
}

fn range_check(available: usize, offset: usize, len: usize) -> HeapwalkResult<std::ops::Range<usize>>
{
    match offset.checked_add(len) {
        Some(end) if end <= available => Ok(offset..end),
        _ => Err(HeapwalkError::OutOfBounds { offset, len, available }),
    }
}

/// Read-only view into a byte buffer at a fixed offset
#[derive(Clone, Copy)]
pub struct ByteView<'a>
{
    bytes: &'a [u8],
    offset: usize,
    pointer_size: PointerSize,
}

impl fmt::Debug for ByteView<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ByteView")
            .field("len", &self.bytes.len())
            .field("offset", &self.offset)
            .field("pointer_size", &self.pointer_size)
            .finish()
    }
}

impl<'a> ByteView<'a>
{
    /// View positioned at the start of `bytes`
    pub fn new(bytes: &'a [u8], pointer_size: PointerSize) -> Self
    {
        Self::at(bytes, 0, pointer_size)
    }

    /// View positioned at `offset` inside `bytes`
    pub fn at(bytes: &'a [u8], offset: usize, pointer_size: PointerSize) -> Self
    {
        Self {
            bytes,
            offset,
            pointer_size,
        }
    }

    /// Offset of this view inside its buffer
    pub fn offset(&self) -> usize
    {
        self.offset
    }

    pub fn pointer_size(&self) -> PointerSize
    {
        self.pointer_size
    }

    /// The whole underlying buffer
    pub fn buffer(&self) -> &'a [u8]
    {
        self.bytes
    }

    /// New view `n` bytes further into the same buffer
    #[must_use]
    pub fn advance(self, n: usize) -> Self
    {
        Self {
            offset: self.offset.saturating_add(n),
            ..self
        }
    }

    /// New view one pointer further into the same buffer
    #[must_use]
    pub fn next_pointer(self) -> Self
    {
        self.advance(self.pointer_size.bytes())
    }

    /// Borrow `len` bytes starting at this view
    pub fn slice(&self, len: usize) -> HeapwalkResult<&'a [u8]>
    {
        let range = range_check(self.bytes.len(), self.offset, len)?;
        Ok(&self.bytes[range])
    }

    fn array<const N: usize>(&self) -> HeapwalkResult<[u8; N]>
    {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(N)?);
        Ok(out)
    }

    pub fn read_u8(&self) -> HeapwalkResult<u8>
    {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_i8(&self) -> HeapwalkResult<i8>
    {
        Ok(i8::from_le_bytes(self.array()?))
    }

    /// One byte, non-zero meaning `true`
    pub fn read_bool(&self) -> HeapwalkResult<bool>
    {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&self) -> HeapwalkResult<u16>
    {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn read_i16(&self) -> HeapwalkResult<i16>
    {
        Ok(i16::from_le_bytes(self.array()?))
    }

    /// One UTF-16 code unit; lone surrogates decode to U+FFFD
    pub fn read_char(&self) -> HeapwalkResult<char>
    {
        let unit = self.read_u16()?;
        Ok(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    pub fn read_u32(&self) -> HeapwalkResult<u32>
    {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_i32(&self) -> HeapwalkResult<i32>
    {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn read_u64(&self) -> HeapwalkResult<u64>
    {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn read_i64(&self) -> HeapwalkResult<i64>
    {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn read_f32(&self) -> HeapwalkResult<f32>
    {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn read_f64(&self) -> HeapwalkResult<f64>
    {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// Pointer-width unsigned value, zero-extended to 64 bits
    pub fn read_pointer(&self) -> HeapwalkResult<u64>
    {
        match self.pointer_size {
            PointerSize::Four => self.read_u32().map(u64::from),
            PointerSize::Eight => self.read_u64(),
        }
    }
}

/// Writable view into a byte buffer at a fixed offset
///
/// Only the header-mark visitation strategy writes to heap buffers; it uses
/// this type to set and clear marks.
pub struct ByteViewMut<'a>
{
    bytes: &'a mut [u8],
    offset: usize,
    pointer_size: PointerSize,
}

impl fmt::Debug for ByteViewMut<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ByteViewMut")
            .field("len", &self.bytes.len())
            .field("offset", &self.offset)
            .field("pointer_size", &self.pointer_size)
            .finish()
    }
}

impl<'a> ByteViewMut<'a>
{
    /// Writable view positioned at `offset` inside `bytes`
    pub fn at(bytes: &'a mut [u8], offset: usize, pointer_size: PointerSize) -> Self
    {
        Self {
            bytes,
            offset,
            pointer_size,
        }
    }

    /// Read-only view at the same position
    pub fn as_view(&self) -> ByteView<'_>
    {
        ByteView::at(self.bytes, self.offset, self.pointer_size)
    }

    #[must_use]
    pub fn advance(self, n: usize) -> Self
    {
        Self {
            offset: self.offset.saturating_add(n),
            ..self
        }
    }

    #[must_use]
    pub fn next_pointer(self) -> Self
    {
        let step = self.pointer_size.bytes();
        self.advance(step)
    }

    pub fn read_pointer(&self) -> HeapwalkResult<u64>
    {
        self.as_view().read_pointer()
    }

    fn write_bytes(&mut self, value: &[u8]) -> HeapwalkResult<()>
    {
        let range = range_check(self.bytes.len(), self.offset, value.len())?;
        self.bytes[range].copy_from_slice(value);
        Ok(())
    }

    /// Write the low 32 bits of `value`
    pub fn write_u32(&mut self, value: u32) -> HeapwalkResult<()>
    {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write `value` using the full configured pointer width
    ///
    /// On 4-byte targets the upper 32 bits of `value` are dropped.
    pub fn write_pointer(&mut self, value: u64) -> HeapwalkResult<()>
    {
        match self.pointer_size {
            #[allow(clippy::cast_possible_truncation)]
            PointerSize::Four => self.write_u32(value as u32),
            PointerSize::Eight => self.write_bytes(&value.to_le_bytes()),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_pointer_size_from_u32()
    {
        assert_eq!(PointerSize::try_from(4).unwrap(), PointerSize::Four);
        assert_eq!(PointerSize::try_from(8).unwrap(), PointerSize::Eight);
        assert!(matches!(
            PointerSize::try_from(2),
            Err(HeapwalkError::UnsupportedPointerSize(2))
        ));
    }

    #[test]
    fn test_typed_reads_are_little_endian()
    {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let view = ByteView::new(&bytes, PointerSize::Eight);
        assert_eq!(view.read_u8().unwrap(), 0x01);
        assert_eq!(view.read_u16().unwrap(), 0x0201);
        assert_eq!(view.read_u32().unwrap(), 0x0403_0201);
        assert_eq!(view.read_u64().unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(view.advance(4).read_i32().unwrap(), 0x0807_0605);
    }

    #[test]
    fn test_read_pointer_honors_width()
    {
        let bytes = [0xff; 8];
        assert_eq!(ByteView::new(&bytes, PointerSize::Four).read_pointer().unwrap(), 0xffff_ffff);
        assert_eq!(ByteView::new(&bytes, PointerSize::Eight).read_pointer().unwrap(), u64::MAX);
    }

    #[test]
    fn test_floats()
    {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.25f64).to_le_bytes());
        let view = ByteView::new(&bytes, PointerSize::Four);
        assert_eq!(view.read_f32().unwrap(), 1.5);
        assert_eq!(view.advance(4).read_f64().unwrap(), -2.25);
    }

    #[test]
    fn test_read_past_end_is_an_error()
    {
        let bytes = [0u8; 6];
        let view = ByteView::new(&bytes, PointerSize::Eight);
        assert!(matches!(
            view.read_pointer(),
            Err(HeapwalkError::OutOfBounds { offset: 0, len: 8, available: 6 })
        ));
        assert!(view.advance(usize::MAX).read_u8().is_err());
    }

    #[test]
    fn test_advance_does_not_touch_original()
    {
        let bytes = [1u8, 2, 3, 4];
        let view = ByteView::new(&bytes, PointerSize::Four);
        let next = view.advance(2);
        assert_eq!(view.offset(), 0);
        assert_eq!(next.offset(), 2);
        assert_eq!(view.next_pointer().offset(), 4);
    }

    #[test]
    fn test_write_pointer_round_trips_at_both_widths()
    {
        let mut bytes = [0u8; 16];
        let mut wide = ByteViewMut::at(&mut bytes, 8, PointerSize::Eight);
        wide.write_pointer(0xdead_beef_1234_abcd).unwrap();
        assert_eq!(wide.read_pointer().unwrap(), 0xdead_beef_1234_abcd);

        let mut narrow = ByteViewMut::at(&mut bytes, 0, PointerSize::Four);
        narrow.write_pointer(0x1_dead_beef).unwrap();
        assert_eq!(narrow.read_pointer().unwrap(), 0xdead_beef);
        // the neighbouring word is untouched
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_write_past_end_is_an_error()
    {
        let mut bytes = [0u8; 4];
        let mut view = ByteViewMut::at(&mut bytes, 2, PointerSize::Four);
        assert!(view.write_u32(7).is_err());
        assert_eq!(bytes, [0u8; 4]);
    }
}
