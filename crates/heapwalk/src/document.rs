//! JSON snapshot documents.
//!
//! A document mirrors the snapshot model field for field. Heap segment bytes
//! are arrays of numbers; addresses and type handles are plain integers.

use std::fs;
use std::path::Path;

use heapwalk_core::error::{HeapwalkError, HeapwalkResult};
use heapwalk_core::heap::{Segment, VirtualMachineInformation};
use heapwalk_core::metadata::TypeDescription;
use heapwalk_core::snapshot::{GcHandle, NativeObject, Snapshot};
use heapwalk_core::types::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument
{
    #[serde(default)]
    pub vm: VirtualMachineInformation,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub types: Vec<TypeDescription>,
    #[serde(default)]
    pub gc_handles: Vec<GcHandle>,
    #[serde(default)]
    pub native_objects: Vec<NativeObject>,
    #[serde(default)]
    pub class_id_names: Vec<String>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl SnapshotDocument
{
    pub fn from_json(text: &str) -> HeapwalkResult<Self>
    {
        serde_json::from_str(text)
            .map_err(|err| HeapwalkError::InvalidArgument(format!("malformed snapshot document: {err}")))
    }

    pub fn load(path: &Path) -> HeapwalkResult<Self>
    {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn into_snapshot(self) -> HeapwalkResult<Snapshot>
    {
        Snapshot::new(
            self.vm,
            self.segments,
            self.types,
            self.gc_handles,
            self.native_objects,
            self.class_id_names,
            self.connections,
        )
    }
}

/// Load and validate the snapshot stored at `path`
pub fn load_snapshot(path: &Path) -> HeapwalkResult<Snapshot>
{
    SnapshotDocument::load(path)?.into_snapshot()
}

#[cfg(test)]
mod tests
{
    use super::*;

    const DOCUMENT: &str = r#"{
        "vm": {
            "pointer_size": 8,
            "object_header_size": 16,
            "array_header_size": 32,
            "array_bounds_offset_in_header": 16,
            "array_size_offset_in_header": 24,
            "allocation_granularity": 8
        },
        "segments": [
            { "start": 4096, "bytes": [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0] }
        ],
        "types": [
            {
                "name": "Leaf",
                "type_index": 0,
                "type_info_address": 256,
                "is_value_type": false,
                "is_array": false,
                "size": 16,
                "base_or_element_type_index": -1
            }
        ],
        "gc_handles": [ { "target": 4096 } ],
        "native_objects": [ { "instance_id": 3, "name": "Main Camera" } ],
        "connections": [ { "from": 1, "to": 0 } ]
    }"#;

    #[test]
    fn test_document_round_trips_into_snapshot()
    {
        let snapshot = SnapshotDocument::from_json(DOCUMENT).unwrap().into_snapshot().unwrap();
        assert_eq!(snapshot.types()[0].name, "Leaf");
        assert_eq!(snapshot.gc_handles().len(), 1);
        assert_eq!(snapshot.native_objects()[0].name, "Main Camera");
        assert_eq!(snapshot.heap().total_bytes(), 16);
        assert_eq!(snapshot.connections(), &[Connection::new(1, 0)]);
    }

    #[test]
    fn test_missing_sections_default()
    {
        let snapshot = SnapshotDocument::from_json("{}").unwrap().into_snapshot().unwrap();
        assert!(snapshot.types().is_empty());
        assert_eq!(snapshot.vm(), &VirtualMachineInformation::x64());
    }

    #[test]
    fn test_malformed_document()
    {
        assert!(matches!(
            SnapshotDocument::from_json("{ \"segments\": 3 }"),
            Err(HeapwalkError::InvalidArgument(_))
        ));
    }
}
