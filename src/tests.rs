use crate::fragments::{FragmentEntry, FRAGMENT_ENTRY_SIZE};
use crate::{superblock::Superblock, utils::get_set_field_tuple, BLOCK_UNCOMPRESSED, SUPERBLOCK_SIZE};
use std::mem;

struct TestField([u8; 6]);

impl TestField {
    get_set_field_tuple!(test, set_test, u32, 0, 4);
    get_set_field_tuple!(tail, set_tail, u16, 4, 2);
}

#[test]
fn get_set_field() {
    let mut tf = TestField([0; 6]);
    tf.set_test(43434331);
    tf.set_tail(0xbeef);
    assert_eq!(tf.test(), 43434331);
    assert_eq!(tf.tail(), 0xbeef);
    assert_eq!(tf.0, [0x5b, 0xc1, 0x96, 0x02, 0xef, 0xbe]);
}

#[test]
fn superblock_size() {
    assert_eq!(mem::size_of::<Superblock>(), SUPERBLOCK_SIZE);
}

#[test]
fn fragment_entry_layout() {
    assert_eq!(mem::size_of::<FragmentEntry>(), FRAGMENT_ENTRY_SIZE);

    let entry = FragmentEntry::from_location(0x0102_0304_0506, 700 | BLOCK_UNCOMPRESSED);
    let bytes = entry.as_bytes();
    assert_eq!(&bytes[..8], &0x0102_0304_0506u64.to_le_bytes());
    assert_eq!(&bytes[8..12], &(700 | BLOCK_UNCOMPRESSED).to_le_bytes());
    assert_eq!(&bytes[12..], &[0; 4]);
    assert!(!entry.is_compressed());
    assert_eq!(entry.stored_size(), 700);
    assert_eq!(FragmentEntry::new(*bytes), entry);
}
