//! Node variants of the materialized heap graph.

use std::fmt;

use crate::types::{Address, NodeIndex};

/// Engine-side object
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NativeObjectNode
{
    pub instance_id: i32,
    pub class_id: i32,
    /// Resolved from the snapshot's class name table; empty if unknown
    pub class_name: String,
    pub name: String,
    pub native_object_address: u64,
    pub size: u64,
    pub hide_flags: u32,
    pub is_persistent: bool,
    pub is_dont_destroy_on_load: bool,
    pub is_manager: bool,
}

/// Object discovered on the managed heap
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManagedObjectNode
{
    pub address: Address,
    pub type_index: usize,
    pub type_name: String,
    /// Instance size; 0 for arrays
    pub size: u64,
}

/// Root held by the runtime outside the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GcHandleNode
{
    pub target: Address,
    /// Width of the handle slot itself
    pub size: u64,
}

/// Synthetic root for the static fields of one type
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticFieldsNode
{
    pub type_index: usize,
    pub type_name: String,
    /// Length of the static field block
    pub size: u64,
}

/// The closed set of node variants
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind
{
    NativeObject(NativeObjectNode),
    ManagedObject(ManagedObjectNode),
    GcHandle(GcHandleNode),
    StaticFields(StaticFieldsNode),
}

impl NodeKind
{
    /// Short label of the variant, used for grouping in reports
    pub fn label(&self) -> &'static str
    {
        match self {
            NodeKind::NativeObject(_) => "native",
            NodeKind::ManagedObject(_) => "managed",
            NodeKind::GcHandle(_) => "gchandle",
            NodeKind::StaticFields(_) => "static",
        }
    }
}

/// One node with resolved adjacency
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node
{
    pub(crate) index: NodeIndex,
    pub(crate) kind: NodeKind,
    pub(crate) references: Box<[NodeIndex]>,
    pub(crate) referenced_by: Box<[NodeIndex]>,
}

impl Node
{
    pub fn index(&self) -> NodeIndex
    {
        self.index
    }

    pub fn kind(&self) -> &NodeKind
    {
        &self.kind
    }

    /// Outgoing edges, one entry per observed reference
    pub fn references(&self) -> &[NodeIndex]
    {
        &self.references
    }

    /// Incoming edges, one entry per observed reference
    pub fn referenced_by(&self) -> &[NodeIndex]
    {
        &self.referenced_by
    }

    /// Display name of the node
    pub fn caption(&self) -> String
    {
        match &self.kind {
            NodeKind::NativeObject(native) => format!("{} ({})", native.name, native.class_name),
            NodeKind::ManagedObject(managed) => managed.type_name.clone(),
            NodeKind::GcHandle(_) => "gchandle".to_string(),
            NodeKind::StaticFields(statics) => format!("static fields of {}", statics.type_name),
        }
    }

    /// Size attributed to this node in bytes
    pub fn size(&self) -> u64
    {
        match &self.kind {
            NodeKind::NativeObject(native) => native.size,
            NodeKind::ManagedObject(managed) => managed.size,
            NodeKind::GcHandle(handle) => handle.size,
            NodeKind::StaticFields(statics) => statics.size,
        }
    }

    pub fn as_native(&self) -> Option<&NativeObjectNode>
    {
        match &self.kind {
            NodeKind::NativeObject(native) => Some(native),
            _ => None,
        }
    }

    pub fn as_managed(&self) -> Option<&ManagedObjectNode>
    {
        match &self.kind {
            NodeKind::ManagedObject(managed) => Some(managed),
            _ => None,
        }
    }

    pub fn as_gc_handle(&self) -> Option<&GcHandleNode>
    {
        match &self.kind {
            NodeKind::GcHandle(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_static_fields(&self) -> Option<&StaticFieldsNode>
    {
        match &self.kind {
            NodeKind::StaticFields(statics) => Some(statics),
            _ => None,
        }
    }
}

impl fmt::Display for Node
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} {}", self.index, self.caption())
    }
}
