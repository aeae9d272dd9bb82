use std::ops::RangeFrom;

use crate::error::{Error, Result};
use crate::BLOCK_UNCOMPRESSED;

/// Where one block of a file ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLocation {
    /// Sequence id of the unit that wrote the bytes; `None` for back-references and sparse
    /// blocks, which never went through the queue
    pub sequence: Option<u64>,
    pub offset: u64,
    /// On-disk size field; bit 24 set means stored uncompressed, zero means sparse
    pub size: u32,
    pub checksum: u32,
    pub deduplicated: bool,
}

impl BlockLocation {
    pub(crate) fn sparse() -> Self {
        Self {
            sequence: None,
            offset: 0,
            size: 0,
            checksum: 0,
            deduplicated: false,
        }
    }

    pub(crate) fn back_reference(&self) -> Self {
        Self {
            sequence: None,
            deduplicated: true,
            ..*self
        }
    }

    pub fn is_sparse(&self) -> bool {
        self.size == 0
    }

    pub fn is_compressed(&self) -> bool {
        self.size & BLOCK_UNCOMPRESSED == 0
    }

    pub fn stored_size(&self) -> u32 {
        self.size & !BLOCK_UNCOMPRESSED
    }
}

/// Where a file tail was placed inside a fragment block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentLocation {
    pub index: u32,
    pub offset: u32,
    pub size: u32,
    pub checksum: u32,
}

#[derive(Clone, Copy, Debug)]
enum Row {
    Pending,
    Done(BlockLocation),
    /// Same content as the given row, which is still being written
    Alias(usize),
}

/// Every data block row ever recorded, in submission order.
#[derive(Debug, Default)]
pub(crate) struct BlockTable {
    rows: Vec<Row>,
}

impl BlockTable {
    /// Adds a row for a block that still has to be written.
    pub fn reserve(&mut self) -> usize {
        self.rows.push(Row::Pending);
        self.rows.len() - 1
    }

    pub fn push(&mut self, location: BlockLocation) -> usize {
        self.rows.push(Row::Done(location));
        self.rows.len() - 1
    }

    /// Adds a back-reference to `row`, which must hold a written or pending block.
    pub fn alias(&mut self, row: usize) -> usize {
        self.rows.push(Row::Alias(row));
        self.rows.len() - 1
    }

    pub fn resolve(&mut self, row: usize, location: BlockLocation) -> Result<()> {
        let len = self.rows.len();
        match self.rows.get_mut(row) {
            Some(slot @ Row::Pending) => {
                *slot = Row::Done(location);
                Ok(())
            }
            _ => Err(Error::OutOfOrder {
                expected: len as u64,
                found: row as u64,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Locations of the given rows, failing if any of them is still pending.
    pub fn locations(&self, rows: RangeFrom<usize>) -> Result<Vec<BlockLocation>> {
        let start = rows.start;
        self.rows[rows]
            .iter()
            .enumerate()
            .map(|(i, row)| self.location(start + i, row))
            .collect()
    }

    fn location(&self, index: usize, row: &Row) -> Result<BlockLocation> {
        let pending = || Error::OutOfOrder {
            expected: index as u64,
            found: self.rows.len() as u64,
        };
        match row {
            Row::Done(location) => Ok(*location),
            Row::Alias(original) => match self.rows.get(*original) {
                Some(Row::Done(location)) => Ok(location.back_reference()),
                _ => Err(pending()),
            },
            Row::Pending => Err(pending()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct FragmentRow {
    location: FragmentLocation,
    provisional: bool,
}

/// Every tail ever placed into a fragment block, in the order the tails were added.
#[derive(Debug, Default)]
pub(crate) struct FragmentTable {
    rows: Vec<FragmentRow>,
    // rows before this one are all final
    first_provisional: usize,
}

impl FragmentTable {
    /// Row for a tail sitting in a fragment block that is not written yet.
    pub fn push_provisional(&mut self, location: FragmentLocation) {
        self.rows.push(FragmentRow {
            location,
            provisional: true,
        });
    }

    /// Row for a tail found in an already written fragment block.
    pub fn push_final(&mut self, location: FragmentLocation) {
        self.rows.push(FragmentRow {
            location,
            provisional: false,
        });
        self.skip_final();
    }

    /// Marks every row referencing fragment block `index` as final and returns them.
    pub fn finalize(&mut self, index: u32) -> Vec<FragmentLocation> {
        let mut finalized = Vec::new();
        for row in &mut self.rows[self.first_provisional..] {
            if row.provisional && row.location.index == index {
                row.provisional = false;
                finalized.push(row.location);
            }
        }
        self.skip_final();
        finalized
    }

    fn skip_final(&mut self) {
        while self
            .rows
            .get(self.first_provisional)
            .map_or(false, |row| !row.provisional)
        {
            self.first_provisional += 1;
        }
    }

    pub fn is_final(&self) -> bool {
        self.first_provisional == self.rows.len()
    }

    pub fn locations(&self) -> Vec<FragmentLocation> {
        self.rows.iter().map(|row| row.location).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
