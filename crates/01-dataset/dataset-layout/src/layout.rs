//! Layout descriptor and the canary-bracketed data-region geometry.
//!
//! A data region is laid out as
//!
//! ```text
//! [canary][block_0][canary][canary][block_1][canary]…[canary][block_17][canary]
//! ```
//!
//! with every block's byte offset computed as a running sum of the preceding
//! block sizes plus the bracketing canaries. The descriptor itself is a flat
//! pair of arrays and serializes by copying its bytes behind a versioned
//! header.

use crate::block::{BlockId, NUM_BLOCKS};
use crate::error::{LayoutError, LayoutResult};
use crate::view::BlockSlice;
use bytemuck::{Pod, Zeroable};
use std::mem;
use tracing::debug;

/// Sentinel written before and after every block.
///
/// Five bytes: the ASCII constant including its NUL terminator. The width is
/// part of the on-wire contract and is used identically on both sides.
pub const CANARY: [u8; 5] = *b"OSRM\0";

/// Byte width of [`CANARY`].
pub const CANARY_LEN: usize = CANARY.len();

/// Version embedded at the start of every layout region.
pub const FORMAT_VERSION: u32 = 1;

/// Bit width of one bitset storage chunk.
pub const BITSET_CHUNK_BITS: u64 = 32;

/// Per-block sizing for one dataset: `(num_entries, entry_size)` for every
/// block in wire order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DatasetLayout {
    num_entries: [u64; NUM_BLOCKS],
    entry_size: [u64; NUM_BLOCKS],
}

/// Exact bytes stored in a layout region: version header plus descriptor.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct LayoutRegion {
    format_version: u32,
    _pad: u32,
    layout: DatasetLayout,
}

impl DatasetLayout {
    /// A descriptor with every block empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the sizing of `block`: `entries` elements of type `T`.
    ///
    /// Must be called exactly once per block before the layout is consulted
    /// for offsets or total size. For bitset blocks `entries` is the number
    /// of bits and `T` must be the 32-bit chunk type.
    pub fn set_block_size<T>(&mut self, block: BlockId, entries: u64) {
        self.num_entries[block.index()] = entries;
        self.entry_size[block.index()] = mem::size_of::<T>() as u64;
    }

    /// Number of logical entries in `block` (bits for bitset blocks).
    pub fn num_entries(&self, block: BlockId) -> u64 {
        self.num_entries[block.index()]
    }

    /// Recorded element width of `block` in bytes.
    pub fn entry_size(&self, block: BlockId) -> u64 {
        self.entry_size[block.index()]
    }

    /// Byte length of `block`'s data, excluding canaries.
    ///
    /// Bitset blocks pack `num_entries` bits into 32-bit chunks and always
    /// reserve one trailing chunk.
    pub fn block_size(&self, block: BlockId) -> u64 {
        let index = block.index();
        if block.is_bitset() {
            (self.num_entries[index] / BITSET_CHUNK_BITS + 1) * self.entry_size[index]
        } else {
            self.num_entries[index] * self.entry_size[index]
        }
    }

    /// Byte offset of `block`'s first data byte within the data region.
    pub fn block_offset(&self, block: BlockId) -> u64 {
        self.offset_past(block.index())
    }

    /// Offset immediately past the end canary of block `count - 1`, i.e. the
    /// offset the hypothetical block `count` would start its data at.
    fn offset_past(&self, count: usize) -> u64 {
        let mut offset = CANARY_LEN as u64;
        for block in &BlockId::ALL[..count] {
            offset += self.block_size(*block) + 2 * CANARY_LEN as u64;
        }
        offset
    }

    /// Total byte size of the data region, including all canaries.
    ///
    /// Kept bit-compatible with the historical formula, which adds one more
    /// canary pair per block past the packed end: `block_offset(NUM_BLOCKS) +
    /// NUM_BLOCKS * 2 * CANARY_LEN`. The slack past the last end canary is
    /// never addressed.
    pub fn size_of_layout(&self) -> u64 {
        self.offset_past(NUM_BLOCKS) + (NUM_BLOCKS as u64) * 2 * CANARY_LEN as u64
    }

    /// Byte length of a serialized layout region.
    pub fn serialized_len() -> u64 {
        mem::size_of::<LayoutRegion>() as u64
    }

    /// Serializes the descriptor (with version header) into `region`.
    pub fn write_to(&self, region: &mut [u8]) -> LayoutResult<()> {
        let record = LayoutRegion {
            format_version: FORMAT_VERSION,
            _pad: 0,
            layout: *self,
        };
        let bytes = bytemuck::bytes_of(&record);
        let actual = region.len() as u64;
        let dst = region
            .get_mut(..bytes.len())
            .ok_or(LayoutError::RegionTooSmall {
                required: bytes.len() as u64,
                actual,
            })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Parses a serialized layout region, rejecting unknown versions.
    pub fn read_from(region: &[u8]) -> LayoutResult<Self> {
        let len = mem::size_of::<LayoutRegion>();
        let src = region.get(..len).ok_or(LayoutError::RegionTooSmall {
            required: len as u64,
            actual: region.len() as u64,
        })?;
        let record: LayoutRegion = bytemuck::pod_read_unaligned(src);
        if record.format_version != FORMAT_VERSION {
            return Err(LayoutError::IncompatibleVersion {
                found: record.format_version,
            });
        }
        Ok(record.layout)
    }

    /// Bounds-checks `block` against `region_len` and returns its data byte
    /// range `(start, end)`.
    fn block_range(&self, region_len: u64, block: BlockId) -> LayoutResult<(usize, usize)> {
        let offset = self.block_offset(block);
        let size = self.block_size(block);
        let required = offset + size + CANARY_LEN as u64;
        if required > region_len {
            return Err(LayoutError::RegionTooSmall {
                required,
                actual: region_len,
            });
        }
        Ok((offset as usize, (offset + size) as usize))
    }

    /// Resolves `block`'s data bytes in write mode: stamps both bracketing
    /// canaries and hands back the writable block bytes.
    pub fn writer_block_bytes<'a>(
        &self,
        region: &'a mut [u8],
        block: BlockId,
    ) -> LayoutResult<&'a mut [u8]> {
        let (start, end) = self.block_range(region.len() as u64, block)?;
        region[start - CANARY_LEN..start].copy_from_slice(&CANARY);
        region[end..end + CANARY_LEN].copy_from_slice(&CANARY);
        Ok(&mut region[start..end])
    }

    /// Resolves `block`'s data bytes in read mode, verifying both canaries.
    pub fn reader_block_bytes<'a>(
        &self,
        region: &'a [u8],
        block: BlockId,
    ) -> LayoutResult<&'a [u8]> {
        let (start, end) = self.block_range(region.len() as u64, block)?;
        if region[start - CANARY_LEN..start] != CANARY[..] {
            return Err(LayoutError::CorruptStartCanary(block));
        }
        if region[end..end + CANARY_LEN] != CANARY[..] {
            return Err(LayoutError::CorruptEndCanary(block));
        }
        Ok(&region[start..end])
    }

    /// Resolves a typed read view over `block`, verifying canaries and the
    /// recorded element width.
    pub fn reader_block<'a, T: Pod>(
        &self,
        region: &'a [u8],
        block: BlockId,
    ) -> LayoutResult<BlockSlice<'a, T>> {
        let requested = mem::size_of::<T>() as u64;
        let stored = self.entry_size[block.index()];
        if requested != stored {
            return Err(LayoutError::EntryWidthMismatch {
                block,
                stored,
                requested,
            });
        }
        let bytes = self.reader_block_bytes(region, block)?;
        Ok(BlockSlice::new(bytes))
    }

    /// Verifies every block's canary pair in one pass.
    pub fn verify_all_canaries(&self, region: &[u8]) -> LayoutResult<()> {
        for block in BlockId::ALL {
            self.reader_block_bytes(region, block)?;
        }
        Ok(())
    }

    /// Logs the byte size of every block at debug level.
    pub fn log_block_sizes(&self) {
        for block in BlockId::ALL {
            debug!(
                block = block.name(),
                entries = self.num_entries(block),
                bytes = self.block_size(block),
                "dataset block"
            );
        }
    }
}
