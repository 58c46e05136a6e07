//! Piece verification against the torrent's expected digests.

use sha1::{Digest, Sha1};

use crate::{session::Session, torrent::Torrent, PieceIndex, BLOCK_LEN};

use super::{error::ReadError, io};

/// The source the verifier pulls piece blocks from.
///
/// A session normally fronts its disk with a write back cache that buffers
/// blocks before flushing them. Verification must observe those pending
/// writes, so it reads through this trait rather than from the files
/// directly. Implementations must serve the post-write bytes of any range
/// that has been written but not yet flushed.
pub trait BlockCache {
    /// Fills the buffer with the block at the given offset within the piece.
    fn read_block(
        &mut self,
        session: &mut Session,
        torrent: &Torrent,
        index: PieceIndex,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<(), ReadError>;
}

/// The degenerate cache with nothing in flight: every block read goes
/// straight to the piece range IO engine.
///
/// This is the backing store a real write back cache sits in front of, and
/// what a session without one verifies through.
pub struct DirectBlockCache;

impl BlockCache for DirectBlockCache {
    fn read_block(
        &mut self,
        session: &mut Session,
        torrent: &Torrent,
        index: PieceIndex,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<(), ReadError> {
        io::read(session, torrent, index, offset, buf)
    }
}

/// Recomputes the piece's SHA-1 digest from its stored blocks and compares
/// it to the expected digest from the metainfo.
///
/// Returns false on any block read failure, without finalizing the hash;
/// a piece that cannot be fully read cannot be valid.
pub fn verify_piece<C: BlockCache>(
    session: &mut Session,
    torrent: &Torrent,
    cache: &mut C,
    index: PieceIndex,
) -> bool {
    let piece_len = match torrent.storage().map(|s| s.piece_len(index)) {
        Some(Ok(len)) => len,
        _ => return false,
    };

    io::prefetch(session, torrent, index, 0, piece_len);

    let mut hasher = Sha1::new();
    // one scratch buffer serves every block of the piece
    let mut buf = vec![0; BLOCK_LEN as usize];
    for block in 0..crate::block_count(piece_len) {
        let offset = block as u32 * BLOCK_LEN;
        let len = crate::block_len(piece_len, block) as usize;
        if let Err(e) =
            cache.read_block(session, torrent, index, offset, &mut buf[..len])
        {
            log::warn!("Failed to read piece {} for hashing: {}", index, e);
            return false;
        }
        hasher.update(&buf[..len]);
    }

    let hash = hasher.finalize();
    log::debug!("Piece {} hash: {:x}", index, hash);
    match torrent.piece_hash(index) {
        Some(expected) => hash.as_slice() == expected,
        None => false,
    }
}
