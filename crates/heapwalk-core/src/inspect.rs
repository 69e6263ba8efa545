//! # Object Inspection
//!
//! Read-only decoding of managed objects for consumers of a crawl: field
//! values, strings and array elements. Everything here goes through the same
//! [`HeapIndex`] / [`ByteView`] primitives as the crawler and never writes to
//! the heap, so it is safe to use on a snapshot after (not during) a crawl.
//!
//! ```rust
//! use heapwalk_core::heap::VirtualMachineInformation;
//! use heapwalk_core::inspect::ObjectInspector;
//! use heapwalk_core::snapshot::Snapshot;
//! use heapwalk_core::types::Address;
//!
//! let snapshot = Snapshot::builder(VirtualMachineInformation::x64()).build()?;
//! let inspector = ObjectInspector::new(&snapshot)?;
//! assert!(inspector.read_string(Address::new(0x1000)).is_err());
//! # Ok::<(), heapwalk_core::error::HeapwalkError>(())
//! ```

use std::fmt;

use crate::crawler::DEFAULT_MAX_VALUE_TYPE_DEPTH;
use crate::error::{HeapwalkError, HeapwalkResult};
use crate::heap::{ByteView, HeapIndex};
use crate::metadata::{FieldDescription, TypeCatalog, TypeDescription};
use crate::snapshot::Snapshot;
use crate::types::Address;

/// Decoded value of one field
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FieldValue
{
    Bool(bool),
    Char(char),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Native-sized integer (`IntPtr` / `UIntPtr`)
    Pointer(u64),
    /// Reference to a heap object; null and unmapped targets are kept as-is
    Reference(Address),
    /// Inline value type
    Struct(Vec<FieldEntry>),
    /// Thread-local static with no fixed storage
    ThreadStatic,
}

impl fmt::Display for FieldValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Char(v) => write!(f, "{v:?}"),
            FieldValue::I8(v) => write!(f, "{v}"),
            FieldValue::U8(v) => write!(f, "{v}"),
            FieldValue::I16(v) => write!(f, "{v}"),
            FieldValue::U16(v) => write!(f, "{v}"),
            FieldValue::I32(v) => write!(f, "{v}"),
            FieldValue::U32(v) => write!(f, "{v}"),
            FieldValue::I64(v) => write!(f, "{v}"),
            FieldValue::U64(v) => write!(f, "{v}"),
            FieldValue::F32(v) => write!(f, "{v}"),
            FieldValue::F64(v) => write!(f, "{v}"),
            FieldValue::Pointer(v) => write!(f, "0x{v:x}"),
            FieldValue::Reference(address) if address.is_null() => f.write_str("null"),
            FieldValue::Reference(address) => write!(f, "{address}"),
            FieldValue::Struct(fields) => {
                f.write_str("{ ")?;
                for (position, entry) in fields.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", entry.name, entry.value)?;
                }
                f.write_str(" }")
            }
            FieldValue::ThreadStatic => f.write_str("<thread static>"),
        }
    }
}

/// A named, typed field value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldEntry
{
    pub name: String,
    pub type_name: String,
    pub value: FieldValue,
}

/// Read-only decoder over a snapshot's heap and types
#[derive(Debug, Clone)]
pub struct ObjectInspector<'s>
{
    heap: &'s HeapIndex,
    catalog: TypeCatalog<'s>,
    header_size: usize,
}

impl<'s> ObjectInspector<'s>
{
    /// ## Errors
    ///
    /// Fails if the snapshot's type table is invalid (see [`TypeCatalog::new`]).
    pub fn new(snapshot: &'s Snapshot) -> HeapwalkResult<Self>
    {
        Ok(Self::from_parts(snapshot.heap(), snapshot.catalog()?))
    }

    pub fn from_parts(heap: &'s HeapIndex, catalog: TypeCatalog<'s>) -> Self
    {
        Self {
            heap,
            catalog,
            header_size: heap.vm().header_size(),
        }
    }

    pub fn catalog(&self) -> &TypeCatalog<'s>
    {
        &self.catalog
    }

    /// Decode every instance field of the object at `address`
    ///
    /// `type_index` is the object's own type; inherited fields are not listed
    /// unless the type description repeats them.
    pub fn managed_fields(&self, address: Address, type_index: usize) -> HeapwalkResult<Vec<FieldEntry>>
    {
        let td = self.catalog.get(type_index)?;
        if td.is_array {
            return Err(HeapwalkError::InvalidArgument(format!("{} is an array type", td.name)));
        }
        let body = self.heap.resolve(address)?.advance(self.header_size);
        self.decode_fields(body, td, false, 0)
    }

    /// Decode the static fields of `type_index` from its static block
    pub fn static_fields(&self, type_index: usize) -> HeapwalkResult<Vec<FieldEntry>>
    {
        let td = self.catalog.get(type_index)?;
        let block = ByteView::new(&td.static_field_bytes, self.heap.pointer_size());
        self.decode_fields(block, td, true, 0)
    }

    /// Contents of the string object at `address`
    ///
    /// Strings store a 32-bit character count right after the object header,
    /// followed by that many UTF-16 code units. Unpaired surrogates decode as
    /// U+FFFD.
    pub fn read_string(&self, address: Address) -> HeapwalkResult<String>
    {
        let body = self.heap.resolve(address)?.advance(self.header_size);
        let length = body.read_i32()?;
        let length = usize::try_from(length)
            .map_err(|_| HeapwalkError::InvalidArgument(format!("string at {address} has length {length}")))?;
        let bytes = body.advance(4).slice(length * 2)?;
        let units = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
        Ok(char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }

    /// Number of elements of the array at `address`
    pub fn array_length(&self, address: Address, type_index: usize) -> HeapwalkResult<usize>
    {
        let td = self.array_type(type_index)?;
        self.heap.read_array_length(address, td)
    }

    /// Targets of a single-dimension array of references
    ///
    /// ## Errors
    ///
    /// `UnsupportedArray` for multi-dimensional arrays and for arrays whose
    /// elements are value types.
    pub fn array_elements(&self, address: Address, type_index: usize) -> HeapwalkResult<Vec<Address>>
    {
        let td = self.array_type(type_index)?;
        if td.array_rank != 1 {
            return Err(HeapwalkError::UnsupportedArray(format!(
                "{} has rank {}",
                td.name, td.array_rank
            )));
        }
        let element = self.catalog.element_type(td)?;
        if element.is_value_type {
            return Err(HeapwalkError::UnsupportedArray(format!(
                "{} holds value type {}",
                td.name, element.name
            )));
        }

        let length = self.heap.read_array_length(address, td)?;
        let elements = self
            .heap
            .resolve(address)?
            .advance(self.heap.vm().array_header_size as usize);
        let stride = self.heap.pointer_size().bytes();
        (0..length)
            .map(|position| elements.advance(position * stride).read_pointer().map(Address::new))
            .collect()
    }

    fn array_type(&self, type_index: usize) -> HeapwalkResult<&'s TypeDescription>
    {
        let td = self.catalog.get(type_index)?;
        if !td.is_array {
            return Err(HeapwalkError::InvalidArgument(format!("{} is not an array type", td.name)));
        }
        Ok(td)
    }

    fn decode_fields(
        &self,
        base: ByteView<'_>,
        td: &TypeDescription,
        statics: bool,
        depth: usize,
    ) -> HeapwalkResult<Vec<FieldEntry>>
    {
        if depth > DEFAULT_MAX_VALUE_TYPE_DEPTH {
            return Err(HeapwalkError::ValueTypeNestingTooDeep {
                type_index: td.type_index,
                depth: DEFAULT_MAX_VALUE_TYPE_DEPTH,
            });
        }

        let mut entries = Vec::new();
        for field in td.fields.iter().filter(|field| field.is_static == statics) {
            if td.is_value_type && usize::try_from(field.type_index) == Ok(td.type_index) {
                continue;
            }
            let field_type = self.catalog.field_type(field)?;
            let value = if field.is_thread_static() {
                FieldValue::ThreadStatic
            } else {
                let relative = field.storage_offset(td.type_index, statics, self.header_size)?;
                self.decode_value(base.advance(relative), field, field_type, depth)?
            };
            entries.push(FieldEntry {
                name: field.name.clone(),
                type_name: field_type.name.clone(),
                value,
            });
        }
        Ok(entries)
    }

    fn decode_value(
        &self,
        at: ByteView<'_>,
        field: &FieldDescription,
        field_type: &TypeDescription,
        depth: usize,
    ) -> HeapwalkResult<FieldValue>
    {
        if !field_type.is_value_type {
            return Ok(FieldValue::Reference(Address::new(at.read_pointer()?)));
        }
        let value = match field_type.name.as_str() {
            "System.Boolean" => FieldValue::Bool(at.read_bool()?),
            "System.Char" => FieldValue::Char(at.read_char()?),
            "System.SByte" => FieldValue::I8(at.read_i8()?),
            "System.Byte" => FieldValue::U8(at.read_u8()?),
            "System.Int16" => FieldValue::I16(at.read_i16()?),
            "System.UInt16" => FieldValue::U16(at.read_u16()?),
            "System.Int32" => FieldValue::I32(at.read_i32()?),
            "System.UInt32" => FieldValue::U32(at.read_u32()?),
            "System.Int64" => FieldValue::I64(at.read_i64()?),
            "System.UInt64" => FieldValue::U64(at.read_u64()?),
            "System.Single" => FieldValue::F32(at.read_f32()?),
            "System.Double" => FieldValue::F64(at.read_f64()?),
            "System.IntPtr" | "System.UIntPtr" => FieldValue::Pointer(at.read_pointer()?),
            _ => {
                tracing::trace!("Decoding {} as struct {}", field.name, field_type.name);
                FieldValue::Struct(self.decode_fields(at, field_type, false, depth + 1)?)
            }
        };
        Ok(value)
    }
}
