//! Shared snapshot fixtures for integration tests
//!
//! `HeapFixture` lays out objects, arrays and static blocks in a single heap
//! segment the way the runtime does: a type handle in the first header word,
//! a zero second word, instance fields at offsets that include the header.

#![allow(dead_code)]

use heapwalk_core::crawler::VisitStrategy;
use heapwalk_core::heap::{PointerSize, VirtualMachineInformation};
use heapwalk_core::metadata::{FieldDescription, TypeDescription, NO_TYPE_INDEX};
use heapwalk_core::snapshot::{NativeObject, Snapshot};
use heapwalk_core::types::{Address, Connection};

pub const HEAP_BASE: u64 = 0x10_0000;
const HANDLE_BASE: u64 = 0x7000_0000;
const ALIGN: usize = 8;

pub fn both_widths() -> [VirtualMachineInformation; 2]
{
    [VirtualMachineInformation::x86(), VirtualMachineInformation::x64()]
}

pub fn both_strategies() -> [VisitStrategy; 2]
{
    [VisitStrategy::AddressTable, VisitStrategy::HeaderMarks]
}

pub struct HeapFixture
{
    pub vm: VirtualMachineInformation,
    pub types: Vec<TypeDescription>,
    heap: Vec<u8>,
    gc_handles: Vec<Address>,
    natives: Vec<NativeObject>,
    class_names: Vec<String>,
    connections: Vec<Connection>,
}

impl HeapFixture
{
    pub fn new(vm: VirtualMachineInformation) -> Self
    {
        Self {
            vm,
            types: Vec::new(),
            // keep the first bytes unused so no object sits at the segment start
            heap: vec![0; ALIGN * 2],
            gc_handles: Vec::new(),
            natives: Vec::new(),
            class_names: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn pointer_bytes(&self) -> usize
    {
        self.vm.pointer_size as usize
    }

    pub fn header(&self) -> i32
    {
        self.vm.object_header_size as i32
    }

    pub fn handle_of(&self, type_index: usize) -> u64
    {
        self.types[type_index].type_info_address
    }

    fn push_type(&mut self, mut td: TypeDescription) -> usize
    {
        let index = self.types.len();
        td.type_index = index;
        td.type_info_address = HANDLE_BASE + (index as u64) * 0x100;
        self.types.push(td);
        index
    }

    /// Reference type with `size` bytes of payload after the header
    pub fn class(&mut self, name: &str, payload: u32, base: Option<usize>) -> usize
    {
        let size = self.vm.object_header_size + payload;
        self.push_type(TypeDescription {
            name: name.to_string(),
            size,
            base_or_element_type_index: base.map_or(NO_TYPE_INDEX, |b| b as i32),
            ..TypeDescription::default()
        })
    }

    /// Value type whose unboxed payload is `payload` bytes
    pub fn value_type(&mut self, name: &str, payload: u32) -> usize
    {
        self.push_type(TypeDescription {
            name: name.to_string(),
            is_value_type: true,
            size: payload,
            base_or_element_type_index: NO_TYPE_INDEX,
            ..TypeDescription::default()
        })
    }

    /// `System.Int32` with its self-typed `m_value` field
    pub fn int32(&mut self) -> usize
    {
        let index = self.value_type("System.Int32", 4);
        let header = self.header();
        self.instance_field(index, "m_value", header, index);
        index
    }

    pub fn array_type(&mut self, name: &str, element: usize, rank: u32) -> usize
    {
        self.push_type(TypeDescription {
            name: name.to_string(),
            is_array: true,
            array_rank: rank,
            base_or_element_type_index: element as i32,
            ..TypeDescription::default()
        })
    }

    /// Instance field at `offset` bytes from the object start (header included)
    pub fn instance_field(&mut self, owner: usize, name: &str, offset: i32, type_index: usize)
    {
        self.types[owner]
            .fields
            .push(FieldDescription::new(name, offset, type_index as i32, false));
    }

    /// Instance field at `payload_offset` bytes after the header
    pub fn payload_field(&mut self, owner: usize, name: &str, payload_offset: i32, type_index: usize)
    {
        let offset = self.header() + payload_offset;
        self.instance_field(owner, name, offset, type_index);
    }

    /// Static field at `offset` in the owner's static block, growing the block to fit
    pub fn static_field(&mut self, owner: usize, name: &str, offset: i32, type_index: usize)
    {
        self.types[owner]
            .fields
            .push(FieldDescription::new(name, offset, type_index as i32, true));
        let needed = offset as usize + self.pointer_bytes();
        let block = &mut self.types[owner].static_field_bytes;
        if block.len() < needed {
            block.resize(needed, 0);
        }
    }

    pub fn thread_static_field(&mut self, owner: usize, name: &str, type_index: usize)
    {
        self.types[owner]
            .fields
            .push(FieldDescription::new(name, -1, type_index as i32, true));
    }

    pub fn set_static_pointer(&mut self, owner: usize, offset: usize, value: Address)
    {
        let bytes = encode(value.value(), self.pointer_bytes());
        self.types[owner].static_field_bytes[offset..offset + bytes.len()].copy_from_slice(&bytes);
    }

    fn reserve(&mut self, len: usize) -> Address
    {
        let start = self.heap.len();
        let padded = len.max(1).div_ceil(ALIGN) * ALIGN;
        self.heap.resize(start + padded, 0);
        Address::new(HEAP_BASE + start as u64)
    }

    /// Allocate an instance of `type_index` and write its type handle
    pub fn object(&mut self, type_index: usize) -> Address
    {
        let size = self.types[type_index].size as usize;
        let address = self.reserve(size.max(self.vm.object_header_size as usize));
        self.write_pointer(address, self.handle_of(type_index));
        address
    }

    fn element_stride(&self, array_type: usize) -> usize
    {
        let element = &self.types[self.types[array_type].base_or_element_type_index as usize];
        if element.is_value_type {
            element.size as usize
        } else {
            self.pointer_bytes()
        }
    }

    /// Single-dimension array with an inline length
    pub fn array(&mut self, type_index: usize, length: i32) -> Address
    {
        let stride = self.element_stride(type_index);
        let body = self.vm.array_header_size as usize + stride * length.max(0) as usize;
        let address = self.reserve(body);
        self.write_pointer(address, self.handle_of(type_index));
        self.write_i32(address + u64::from(self.vm.array_size_offset_in_header), length);
        address
    }

    /// Multi-dimension array whose bounds live in a separate buffer
    pub fn bounded_array(&mut self, type_index: usize, lengths: &[i32]) -> Address
    {
        let bounds = self.reserve(lengths.len() * 8);
        for (position, &length) in lengths.iter().enumerate() {
            self.write_i32(bounds + (position as u64) * 8, length);
        }
        let total: i32 = lengths.iter().sum();
        let stride = self.element_stride(type_index);
        let body = self.vm.array_header_size as usize + stride * total.max(0) as usize;
        let address = self.reserve(body);
        self.write_pointer(address, self.handle_of(type_index));
        self.write_pointer(address + u64::from(self.vm.array_bounds_offset_in_header), bounds.value());
        address
    }

    /// Address of element `position` of an array object
    pub fn element(&self, array: Address, array_type: usize, position: usize) -> Address
    {
        let stride = self.element_stride(array_type);
        array + (self.vm.array_header_size as usize + position * stride) as u64
    }

    /// Address of a field `offset` bytes from the object start
    pub fn at(&self, object: Address, offset: i32) -> Address
    {
        object + offset as u64
    }

    /// Address `payload_offset` bytes after the header
    pub fn payload(&self, object: Address, payload_offset: i32) -> Address
    {
        object + (self.header() + payload_offset) as u64
    }

    pub fn write_pointer(&mut self, address: Address, value: u64)
    {
        let bytes = encode(value, self.pointer_bytes());
        self.write_bytes(address, &bytes);
    }

    pub fn write_ref(&mut self, address: Address, target: Address)
    {
        self.write_pointer(address, target.value());
    }

    pub fn write_i32(&mut self, address: Address, value: i32)
    {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, address: Address, bytes: &[u8])
    {
        let start = (address.value() - HEAP_BASE) as usize;
        self.heap[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Allocate a `System.String` instance holding `text`
    pub fn string(&mut self, string_type: usize, text: &str) -> Address
    {
        let units: Vec<u16> = text.encode_utf16().collect();
        let header = self.vm.object_header_size as usize;
        let address = self.reserve(header + 4 + units.len() * 2 + 2);
        self.write_pointer(address, self.handle_of(string_type));
        self.write_i32(address + header as u64, units.len() as i32);
        let bytes: Vec<u8> = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
        self.write_bytes(address + (header + 4) as u64, &bytes);
        address
    }

    pub fn gc_handle(&mut self, target: Address)
    {
        self.gc_handles.push(target);
    }

    pub fn native(&mut self, instance_id: i32, name: &str, class_id: i32, size: u64)
    {
        self.natives.push(NativeObject {
            instance_id,
            class_id,
            name: name.to_string(),
            size,
            ..NativeObject::default()
        });
    }

    pub fn class_name(&mut self, name: &str)
    {
        self.class_names.push(name.to_string());
    }

    pub fn connection(&mut self, from: usize, to: usize)
    {
        self.connections.push(Connection::new(from, to));
    }

    pub fn heap_bytes(&self) -> &[u8]
    {
        &self.heap
    }

    pub fn build(&self) -> Snapshot
    {
        Snapshot::builder(self.vm)
            .segment(HEAP_BASE, self.heap.clone())
            .types(self.types.clone())
            .gc_handles(self.gc_handles.iter().map(|&target| heapwalk_core::snapshot::GcHandle { target }))
            .native_objects(self.natives.clone())
            .class_id_names(self.class_names.clone())
            .connections(self.connections.clone())
            .build()
            .expect("fixture snapshot is valid")
    }
}

fn encode(value: u64, width: usize) -> Vec<u8>
{
    match width {
        4 => (value as u32).to_le_bytes().to_vec(),
        _ => value.to_le_bytes().to_vec(),
    }
}

/// Copy of every segment's bytes, for before/after comparisons
pub fn heap_image(snapshot: &Snapshot) -> Vec<Vec<u8>>
{
    snapshot
        .heap()
        .segments()
        .iter()
        .map(|segment| segment.bytes.clone())
        .collect()
}

pub fn pointer_size(vm: &VirtualMachineInformation) -> PointerSize
{
    vm.pointer_width().expect("fixture widths are valid")
}
