//! Type and field descriptions as delivered by the snapshot.

use std::fmt;

use crate::error::{HeapwalkError, HeapwalkResult};

/// Marker for "no base class / element type" in `base_or_element_type_index`
pub const NO_TYPE_INDEX: i32 = -1;

/// Field offset used by the runtime for thread-local static fields
pub const THREAD_STATIC_OFFSET: i32 = -1;

/// One field of a type
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDescription
{
    pub name: String,
    /// Byte offset; instance offsets count from the start of the object
    /// (header included), static offsets from the start of the static block
    pub offset: i32,
    /// Index of the field's declared type
    pub type_index: i32,
    pub is_static: bool,
}

impl FieldDescription
{
    pub fn new(name: impl Into<String>, offset: i32, type_index: i32, is_static: bool) -> Self
    {
        Self {
            name: name.into(),
            offset,
            type_index,
            is_static,
        }
    }

    /// Thread-local statics have no fixed storage and are skipped
    pub fn is_thread_static(&self) -> bool
    {
        self.offset == THREAD_STATIC_OFFSET
    }

    /// Offset of the field relative to where a walk over its storage starts
    ///
    /// Walks over object instances (and inline value-type instances) start
    /// just past the object header, so the header is subtracted from the
    /// recorded offset. Static blocks have no header.
    pub(crate) fn storage_offset(&self, owner: usize, statics: bool, header_size: usize) -> HeapwalkResult<usize>
    {
        let offset = i64::from(self.offset);
        let relative = if statics { offset } else { offset - header_size as i64 };
        usize::try_from(relative).map_err(|_| HeapwalkError::InvalidFieldOffset {
            type_index: owner,
            field: self.name.clone(),
            offset: self.offset,
        })
    }
}

/// Layout metadata of one runtime type
#[derive(Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeDescription
{
    /// Fully qualified type name
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub assembly: String,
    /// Position of this type in the snapshot's type table
    pub type_index: usize,
    /// Runtime type handle; object headers point here
    pub type_info_address: u64,
    pub is_value_type: bool,
    pub is_array: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub array_rank: u32,
    /// Instance size; meaningless for arrays
    pub size: u32,
    /// Base class for classes, element type for arrays, [`NO_TYPE_INDEX`] otherwise
    pub base_or_element_type_index: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fields: Vec<FieldDescription>,
    /// Storage of the type's static fields; empty when it has none
    #[cfg_attr(feature = "serde", serde(default))]
    pub static_field_bytes: Vec<u8>,
}

impl fmt::Debug for TypeDescription
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("TypeDescription")
            .field("name", &self.name)
            .field("type_index", &self.type_index)
            .field("type_info_address", &format_args!("0x{:x}", self.type_info_address))
            .field("is_value_type", &self.is_value_type)
            .field("is_array", &self.is_array)
            .field("size", &self.size)
            .field("base_or_element_type_index", &self.base_or_element_type_index)
            .field("fields", &self.fields.len())
            .field("static_field_bytes", &self.static_field_bytes.len())
            .finish()
    }
}

impl TypeDescription
{
    /// Base class (classes) or element type (arrays), if any
    pub fn base_or_element(&self) -> Option<usize>
    {
        usize::try_from(self.base_or_element_type_index).ok()
    }

    /// Whether this type contributes a static field root
    pub fn has_static_fields(&self) -> bool
    {
        !self.static_field_bytes.is_empty()
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDescription>
    {
        self.fields.iter().filter(|field| !field.is_static)
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &FieldDescription>
    {
        self.fields.iter().filter(|field| field.is_static)
    }

    /// Field with the given name, searching only this type
    pub fn field(&self, name: &str) -> Option<&FieldDescription>
    {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_storage_offset()
    {
        let field = FieldDescription::new("m_Value", 24, 0, false);
        assert_eq!(field.storage_offset(3, false, 16).unwrap(), 8);
        assert_eq!(field.storage_offset(3, true, 16).unwrap(), 24);

        let inside_header = FieldDescription::new("bogus", 4, 0, false);
        assert!(matches!(
            inside_header.storage_offset(3, false, 16),
            Err(HeapwalkError::InvalidFieldOffset { type_index: 3, offset: 4, .. })
        ));
    }

    #[test]
    fn test_thread_static_marker()
    {
        assert!(FieldDescription::new("t_Cache", THREAD_STATIC_OFFSET, 0, true).is_thread_static());
        assert!(!FieldDescription::new("s_Cache", 0, 0, true).is_thread_static());
    }

    #[test]
    fn test_base_or_element()
    {
        let mut td = TypeDescription {
            base_or_element_type_index: NO_TYPE_INDEX,
            ..TypeDescription::default()
        };
        assert_eq!(td.base_or_element(), None);
        td.base_or_element_type_index = 7;
        assert_eq!(td.base_or_element(), Some(7));
    }
}
