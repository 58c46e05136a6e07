#[macro_use]
extern crate serde_derive;

pub mod conf;
pub mod disk;
pub mod error;
pub mod magnet;
pub mod metadata;
pub mod metainfo;
mod session;
mod storage_info;
#[cfg(test)]
mod test_utils;
mod torrent;

use bitvec::prelude::{BitVec, Msb0};

pub use conf::{Conf, Preallocation};
pub use magnet::MagnetLink;
pub use metadata::MetadataDelivery;
pub use session::Session;
pub use storage_info::{FileInfo, StorageInfo};
pub use torrent::{LocalError, Torrent};

/// The type of a piece's index.
///
/// On the wire all integers are sent as 4-byte big endian integers, but in the
/// source code we use `usize` to be consistent with other index types in Rust.
pub type PieceIndex = usize;

/// The type of a file's index.
pub type FileIndex = usize;

/// Each torrent gets an ID that is unique within the session.
pub type TorrentId = u32;

/// A SHA-1 hash digest, 20 bytes long.
pub type Sha1Hash = [u8; 20];

/// The bitfield represents which pieces of a torrent have been downloaded and
/// verified.
///
/// It is a compact bool vector of most significant bits to least significants
/// bits, that is, where the first highest bit represents the first piece, the
/// second highest element the second piece, and so on (e.g. `0b1100_0001` would
/// mean that we have pieces 0, 1, and 7). A truthy boolean value of a piece's
/// position in this vector means that the piece is present, while a falsy
/// value means it isn't.
pub type Bitfield = BitVec<Msb0, u8>;

/// This is the only block length we're dealing with (except for possibly the
/// last block). It is the widely used and accepted 16 KiB.
pub(crate) const BLOCK_LEN: u32 = 0x4000;

/// Returns the length of the block at the index in piece.
///
/// If the piece is not a multiple of the default block length, the returned
/// value is smaller.
///
/// # Panics
///
/// Panics if the index multiplied by the default block length would exceed the
/// piece length.
pub(crate) fn block_len(piece_len: u32, index: usize) -> u32 {
    let index = index as u32;
    let block_offset = index * BLOCK_LEN;
    assert!(piece_len > block_offset);
    std::cmp::min(piece_len - block_offset, BLOCK_LEN)
}

/// Returns the number of blocks in a piece of the given length.
pub(crate) fn block_count(piece_len: u32) -> usize {
    // all but the last piece are a multiple of the block length, but the
    // last piece may be shorter so we need to account for this by rounding
    // up before dividing to get the number of blocks in piece
    (piece_len as usize + (BLOCK_LEN as usize - 1)) / BLOCK_LEN as usize
}

/// Returns the block length a torrent with the given piece length uses, or
/// `None` if no block length evenly divides it.
///
/// Pieces shorter than the canonical block length are served as a single
/// block. Longer pieces must be an exact multiple of the block length,
/// otherwise the piece cannot be addressed block by block and the torrent is
/// unusable.
pub(crate) fn block_size(piece_len: u32) -> Option<u32> {
    if piece_len == 0 {
        return None;
    }
    let block_len = std::cmp::min(piece_len, BLOCK_LEN);
    if piece_len % block_len == 0 {
        Some(block_len)
    } else {
        None
    }
}
