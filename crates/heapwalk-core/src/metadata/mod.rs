//! # Type Metadata
//!
//! Lookups over the snapshot's type table.
//!
//! Types are addressed two ways: by their position in the type table (used by
//! field descriptions, array element types and base classes) and by their
//! runtime type handle (the value stored in the first word of every object
//! header). [`TypeCatalog`] provides both and validates that they are
//! consistent before anything is crawled.

pub mod types;

use std::collections::HashMap;

pub use types::{FieldDescription, TypeDescription, NO_TYPE_INDEX, THREAD_STATIC_OFFSET};

use crate::error::{HeapwalkError, HeapwalkResult};

/// Indexed view over a snapshot's type descriptions
#[derive(Debug, Clone)]
pub struct TypeCatalog<'a>
{
    types: &'a [TypeDescription],
    by_handle: HashMap<u64, usize>,
}

impl<'a> TypeCatalog<'a>
{
    /// Index `types` by position and by type handle
    ///
    /// ## Errors
    ///
    /// - `TypeIndexMismatch`: a description's `type_index` differs from its position
    /// - `DuplicateTypeHandle`: two descriptions share a type handle
    pub fn new(types: &'a [TypeDescription]) -> HeapwalkResult<Self>
    {
        let mut by_handle = HashMap::with_capacity(types.len());
        for (position, td) in types.iter().enumerate() {
            if td.type_index != position {
                return Err(HeapwalkError::TypeIndexMismatch {
                    position,
                    declared: td.type_index,
                });
            }
            if let Some(first) = by_handle.insert(td.type_info_address, position) {
                return Err(HeapwalkError::DuplicateTypeHandle {
                    handle: td.type_info_address,
                    first,
                    second: position,
                });
            }
        }
        Ok(Self { types, by_handle })
    }

    pub fn len(&self) -> usize
    {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a TypeDescription>
    {
        self.types.iter()
    }

    /// Type at position `index`
    pub fn get(&self, index: usize) -> HeapwalkResult<&'a TypeDescription>
    {
        self.types
            .get(index)
            .ok_or(HeapwalkError::UnknownTypeIndex(index as i64))
    }

    /// Declared type of `field`
    pub fn field_type(&self, field: &FieldDescription) -> HeapwalkResult<&'a TypeDescription>
    {
        usize::try_from(field.type_index)
            .ok()
            .and_then(|index| self.types.get(index))
            .ok_or(HeapwalkError::UnknownTypeIndex(i64::from(field.type_index)))
    }

    /// Element type of an array type
    pub fn element_type(&self, array_type: &TypeDescription) -> HeapwalkResult<&'a TypeDescription>
    {
        array_type
            .base_or_element()
            .and_then(|index| self.types.get(index))
            .ok_or(HeapwalkError::UnknownTypeIndex(i64::from(array_type.base_or_element_type_index)))
    }

    /// Type whose runtime handle is `handle`
    pub fn by_handle(&self, handle: u64) -> Option<&'a TypeDescription>
    {
        self.by_handle.get(&handle).map(|&index| &self.types[index])
    }

    /// First type with the given fully qualified name
    pub fn by_name(&self, name: &str) -> Option<&'a TypeDescription>
    {
        self.types.iter().find(|td| td.name == name)
    }

    /// Types owning a non-empty static field block, in type-index order
    pub fn with_static_fields(&self) -> impl Iterator<Item = &'a TypeDescription>
    {
        self.types.iter().filter(|td| td.has_static_fields())
    }

    /// Whether `type_index` is `base_index` or inherits from it
    ///
    /// Only class inheritance is followed: array types stop the walk, since
    /// their `base_or_element_type_index` names the element type. A chain
    /// longer than the catalog (a cycle in malformed metadata) stops as well.
    pub fn derives_from(&self, type_index: usize, base_index: usize) -> bool
    {
        let mut current = type_index;
        for _ in 0..=self.types.len() {
            if current == base_index {
                return true;
            }
            match self.types.get(current) {
                Some(td) if !td.is_array => match td.base_or_element() {
                    Some(next) => current = next,
                    None => return false,
                },
                _ => return false,
            }
        }
        false
    }
}
