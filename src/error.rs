//! The error types returned by the library's public operations.

use thiserror::Error;

pub use crate::disk::error::{ReadError, WriteError};

pub type Result<T> = std::result::Result<T, Error>;

/// The top level error type.
///
/// Disk reads and writes have their own, narrower error types as they are hot
/// paths; everything else funnels into this one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The metainfo is syntactically valid bencode but violates the torrent
    /// file format (missing keys, malformed pieces string, bad paths, ...).
    #[error("invalid metainfo")]
    InvalidMetainfo,

    /// The piece index is not within the torrent's bounds.
    #[error("invalid piece index")]
    InvalidPieceIndex,

    /// The string is not a well formed magnet link.
    #[error("invalid magnet link")]
    InvalidMagnet,

    /// The metainfo parsed but describes a torrent whose piece size cannot be
    /// addressed block by block.
    #[error("metainfo yields an unusable piece size")]
    UnusableMetainfo,

    #[error(transparent)]
    Bencode(#[from] serde_bencode::Error),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
