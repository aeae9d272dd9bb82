//! Content lookup for blocks that were already written.
//!
//! Entries are keyed by CRC32 and size only. Two different payloads with the same size and
//! checksum are treated as one.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct DedupKey {
    pub checksum: u32,
    pub size: u32,
}

impl DedupKey {
    pub fn of(data: &[u8]) -> Self {
        Self {
            checksum: crc32fast::hash(data),
            size: data.len() as u32,
        }
    }
}

#[derive(Debug)]
pub(crate) struct DedupTable<V> {
    entries: HashMap<DedupKey, V>,
}

impl<V> Default for DedupTable<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> DedupTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &DedupKey) -> Option<&V> {
        self.entries.get(key)
    }

    /// Records `value` unless the key is already known. Returns true if it was inserted.
    pub fn insert(&mut self, key: DedupKey, value: V) -> bool {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_wins() {
        let key = DedupKey::of(b"hello");
        let mut table = DedupTable::new();
        assert!(table.lookup(&key).is_none());
        assert!(table.insert(key, 10u64));
        assert!(!table.insert(key, 20u64));
        assert_eq!(table.lookup(&key), Some(&10));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn size_is_part_of_the_key() {
        let a = DedupKey {
            checksum: 0xABCD,
            size: 4096,
        };
        let b = DedupKey {
            checksum: 0xABCD,
            size: 2048,
        };
        let mut table = DedupTable::new();
        table.insert(a, 1u32);
        assert!(table.lookup(&b).is_none());
    }
}
