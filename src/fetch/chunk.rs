//! `(filename, index)` chunk addressing math shared by the data plane and
//! the fetch engine.

use crate::CHUNK_SIZE;

/// Number of `CHUNK_SIZE`-aligned chunks needed to cover `filesize` bytes.
pub fn total_chunks(filesize: u64) -> u64 {
    filesize.div_ceil(CHUNK_SIZE)
}

/// Byte offset of chunk `index`.
pub fn offset_of(index: u64) -> u64 {
    index * CHUNK_SIZE
}

/// Length in bytes of chunk `index` given the file's total size: `CHUNK_SIZE`
/// for every chunk but the last, which may be shorter.
pub fn len_of(index: u64, filesize: u64) -> u64 {
    CHUNK_SIZE.min(filesize.saturating_sub(offset_of(index)))
}
