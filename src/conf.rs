//! This module defines types used to configure the session and its parts.

use std::path::PathBuf;

/// The suffix appended to the name of files that have not been fully
/// downloaded yet, when incomplete file naming is enabled.
pub const PARTIAL_FILE_SUFFIX: &str = ".part";

/// How disk space is reserved for a file when it is first created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preallocation {
    /// Don't reserve anything; the file grows as pieces are written.
    None,
    /// Extend the file to its final length without allocating the blocks
    /// (a sparse file on file systems that support it).
    Sparse,
    /// Ask the OS to allocate all blocks up front.
    Full,
}

/// The global configuration for the session and all its parts.
#[derive(Clone, Debug)]
pub struct Conf {
    /// The directory in which a torrent's files are placed upon download and
    /// from which they are seeded.
    pub download_dir: PathBuf,

    /// The directory in which the session keeps each torrent's `.torrent`
    /// container and `.resume` progress file.
    pub metainfo_dir: PathBuf,

    /// How disk space is reserved when a torrent's files are created.
    pub preallocation: Preallocation,

    /// Whether files that are not yet fully downloaded are created under
    /// a partial name (with [`PARTIAL_FILE_SUFFIX`] appended).
    pub incomplete_file_naming: bool,

    /// The maximum number of file handles kept open in the session's file
    /// cache. Least recently used handles are closed when the limit is hit.
    pub open_file_limit: usize,
}

impl Conf {
    /// Returns the configuration with reasonable defaults, except for the
    /// download and metainfo directories, as it is not sensible to guess those
    /// for the user.
    pub fn new(
        download_dir: impl Into<PathBuf>,
        metainfo_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            download_dir: download_dir.into(),
            metainfo_dir: metainfo_dir.into(),
            // sparse files cost nothing on modern file systems while still
            // reserving the name and length, so it's the default
            preallocation: Preallocation::Sparse,
            incomplete_file_naming: false,
            // enough for several archive torrents while staying well under
            // the usual 1024 soft descriptor limit
            open_file_limit: 32,
        }
    }
}
