//! The error types raised by piece range IO.

use std::io;

use thiserror::Error;

/// The error type returned on failed piece range reads.
#[derive(Debug, Error)]
pub enum ReadError {
    /// A file that is expected to hold part of the range does not exist.
    #[error("file not found")]
    NotFound,

    /// The requested range is not within the torrent's bounds, or the torrent
    /// has no metainfo yet.
    #[error("invalid read range")]
    InvalidRange,

    /// The underlying OS read failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The error type returned on failed piece range writes.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The requested range is not within the torrent's bounds, or the torrent
    /// has no metainfo yet.
    #[error("invalid write range")]
    InvalidRange,

    /// The underlying OS write failed. A failure of this kind also faults the
    /// torrent until its local error is cleared.
    #[error(transparent)]
    Io(#[from] io::Error),
}
