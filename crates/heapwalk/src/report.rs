//! Human-readable output for the CLI subcommands.

use std::fmt::Write as _;

use heapwalk_core::crawler::CrawledSnapshot;
use heapwalk_core::error::{HeapwalkError, HeapwalkResult};
use heapwalk_core::graph::{HeapGraph, KindTotal};
use heapwalk_core::heap::VirtualMachineInformation;
use heapwalk_core::inspect::{FieldEntry, ObjectInspector};
use heapwalk_core::metadata::TypeDescription;
use heapwalk_core::snapshot::Snapshot;
use heapwalk_core::types::{Address, NodeIndex};

const STRING_TYPE: &str = "System.String";

/// Counts and sizes per node kind
pub fn crawl_summary(crawled: &CrawledSnapshot, graph: &HeapGraph) -> String
{
    let totals = graph.total_size_by_kind();
    let mut out = String::new();
    let _ = writeln!(out, "Crawl Summary:");
    let _ = writeln!(out, "  Nodes: {}", graph.len());
    let _ = writeln!(out, "  Edges: {}", crawled.connections.len());
    write_total(&mut out, "GC handles", totals.gc_handles);
    write_total(&mut out, "Native objects", totals.native_objects);
    write_total(&mut out, "Static roots", totals.static_fields);
    write_total(&mut out, "Managed objects", totals.managed_objects);
    out
}

fn write_total(out: &mut String, label: &str, total: KindTotal)
{
    let _ = writeln!(out, "  {label:<16} {:>8} nodes {:>12} bytes", total.count, total.bytes);
}

/// One line per type description
pub fn type_table(vm: &VirtualMachineInformation, types: &[TypeDescription]) -> String
{
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6}  {:<10} {:>8} {:>8} {:>6} {:>7}  name",
        "index", "kind", "size", "alloc", "fields", "statics"
    );
    for td in types {
        let kind = if td.is_array {
            format!("array[{}]", td.array_rank)
        } else if td.is_value_type {
            "value".to_string()
        } else {
            "class".to_string()
        };
        let _ = writeln!(
            out,
            "{:>6}  {:<10} {:>8} {:>8} {:>6} {:>7}  {}",
            td.type_index,
            kind,
            td.size,
            vm.aligned_size(u64::from(td.size)),
            td.instance_fields().count(),
            td.static_fields().count(),
            td.name
        );
    }
    out
}

/// Everything known about the managed object at `address`
pub fn inspect_object(snapshot: &Snapshot, graph: &HeapGraph, address: Address) -> HeapwalkResult<String>
{
    let node = graph
        .find_managed(address)
        .ok_or_else(|| HeapwalkError::InvalidArgument(format!("no reachable managed object at {address}")))?;
    let managed = node
        .as_managed()
        .ok_or_else(|| HeapwalkError::InvalidArgument(format!("{node} is not a managed object")))?;
    let inspector = ObjectInspector::new(snapshot)?;
    let td = inspector.catalog().get(managed.type_index)?;

    let mut out = String::new();
    let _ = writeln!(out, "Object {address}");
    let _ = writeln!(out, "  Node: {}", node.index());
    let _ = writeln!(out, "  Type: {} (index {})", td.name, td.type_index);

    if td.is_array {
        let length = inspector.array_length(address, td.type_index)?;
        let _ = writeln!(out, "  Length: {length}");
        match inspector.array_elements(address, td.type_index) {
            Ok(elements) => {
                let _ = writeln!(out, "  Elements:");
                for (position, element) in elements.iter().enumerate() {
                    let _ = writeln!(out, "    [{position}] {}", describe_reference(snapshot, graph, *element));
                }
            }
            Err(HeapwalkError::UnsupportedArray(reason)) => {
                let _ = writeln!(out, "  Elements: not shown ({reason})");
            }
            Err(err) => return Err(err),
        }
    } else {
        let _ = writeln!(
            out,
            "  Size: {} bytes ({} allocated)",
            managed.size,
            snapshot.vm().aligned_size(managed.size)
        );
        if td.name == STRING_TYPE {
            let _ = writeln!(out, "  Value: {:?}", inspector.read_string(address)?);
        }
        let fields = inspector.managed_fields(address, td.type_index)?;
        if !fields.is_empty() {
            let _ = writeln!(out, "  Fields:");
            write_fields(&mut out, &fields);
        }
    }

    write_adjacency(&mut out, graph, "References", node.references());
    write_adjacency(&mut out, graph, "Referenced by", node.referenced_by());
    Ok(out)
}

fn write_fields(out: &mut String, fields: &[FieldEntry])
{
    for entry in fields {
        let _ = writeln!(out, "    {}: {} = {}", entry.name, entry.type_name, entry.value);
    }
}

fn write_adjacency(out: &mut String, graph: &HeapGraph, label: &str, indices: &[NodeIndex])
{
    let _ = writeln!(out, "  {label} ({}):", indices.len());
    for &index in indices {
        match graph.node(index) {
            Some(node) => {
                let _ = writeln!(out, "    {node}");
            }
            None => {
                let _ = writeln!(out, "    {index} <missing>");
            }
        }
    }
}

fn describe_reference(snapshot: &Snapshot, graph: &HeapGraph, target: Address) -> String
{
    if target.is_null() {
        return "null".to_string();
    }
    if let Some(node) = graph.find_managed(target) {
        return node.to_string();
    }
    if snapshot.heap().find(target).is_some() {
        format!("{target} <unreached>")
    } else {
        format!("{target} <unmapped>")
    }
}
