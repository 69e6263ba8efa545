//! Tests for error handling

use heapwalk_core::error::{HeapwalkError, HeapwalkResult};
use heapwalk_core::types::{Address, NodeIndex};

#[test]
fn test_unsupported_pointer_size_message()
{
    let message = format!("{}", HeapwalkError::UnsupportedPointerSize(6));
    assert!(message.contains("6 bytes"));
    assert!(message.contains("4 or 8"));
}

#[test]
fn test_corrupt_header_message_names_address_and_value()
{
    let error = HeapwalkError::CorruptObjectHeader {
        address: Address::new(0x1000),
        value: 0x2a,
    };
    let message = error.to_string();
    assert!(message.contains("0x0000000000001000"));
    assert!(message.contains("0x2a"));
}

#[test]
fn test_duplicate_type_handle_message()
{
    let error = HeapwalkError::DuplicateTypeHandle {
        handle: 0xbeef,
        first: 1,
        second: 4,
    };
    let message = error.to_string();
    assert!(message.contains("0xbeef"));
    assert!(message.contains("type 1"));
    assert!(message.contains("type 4"));
}

#[test]
fn test_edge_out_of_range_message()
{
    let error = HeapwalkError::EdgeOutOfRange {
        from: NodeIndex(1),
        to: NodeIndex(9),
        len: 5,
    };
    assert_eq!(error.to_string(), "Edge #1 -> #9 is outside the index space of 5 nodes");
}

#[test]
fn test_io_error_conversion()
{
    fn open() -> HeapwalkResult<()>
    {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing snapshot");
        Err(io_error)?;
        Ok(())
    }

    let error = open().unwrap_err();
    assert!(matches!(error, HeapwalkError::Io(_)));
    assert!(error.to_string().contains("missing snapshot"));
}

#[test]
fn test_error_is_std_error()
{
    fn assert_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
    assert_error(&HeapwalkError::InvalidArgument("bad".to_string()));
}
