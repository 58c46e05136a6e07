use std::{
    fs, io,
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
};

use nix::{
    fcntl::{posix_fadvise, posix_fallocate, PosixFadviseAdvice},
    sys::uio::{pread, pwrite},
};

use crate::{
    conf::{Preallocation, PARTIAL_FILE_SUFFIX},
    storage_info::FileInfo,
};

use super::error::{ReadError, WriteError};

/// An open handle of one of a torrent's files.
#[derive(Debug)]
pub struct TorrentFile {
    pub info: FileInfo,
    pub handle: fs::File,
    /// Whether the handle was opened for writing. A read only handle must be
    /// reopened before it can serve writes.
    pub(crate) writable: bool,
}

impl TorrentFile {
    /// Opens the file, creating it when opening for writing.
    ///
    /// A newly created non-excluded file is preallocated to its final length
    /// according to the given mode. Read only opens of files that don't exist
    /// (under their final or partial name) fail with `NotFound`.
    pub(crate) fn open(
        download_dir: &Path,
        info: FileInfo,
        writable: bool,
        preallocation: Preallocation,
        partial_names: bool,
    ) -> io::Result<Self> {
        let path = resolve_path(download_dir, &info.path, partial_names);

        let create = writable && !path.exists();
        if create {
            // create any subdirectory of the torrent the file is nested in
            if let Some(subdir) = path.parent() {
                if !subdir.exists() {
                    log::info!("Creating torrent subdir {:?}", subdir);
                    fs::create_dir_all(subdir)?;
                }
            }
            log::info!("Creating file {:?}", path);
        }

        let handle = fs::OpenOptions::new()
            .read(true)
            .write(writable)
            .create(writable)
            .open(&path)
            .map_err(|e| {
                log::warn!("Failed to open file {:?}: {}", path, e);
                e
            })?;

        if create && !info.is_dnd && info.len > 0 {
            match preallocation {
                Preallocation::None => {}
                Preallocation::Sparse => handle.set_len(info.len)?,
                Preallocation::Full => {
                    if let Err(e) = posix_fallocate(
                        handle.as_raw_fd(),
                        0,
                        info.len as i64,
                    ) {
                        // not every file system can allocate up front
                        log::warn!(
                            "Failed to preallocate {:?} ({}), \
                             extending sparsely",
                            path,
                            e
                        );
                        handle.set_len(info.len)?;
                    }
                }
            }
        }

        Ok(Self {
            info,
            handle,
            writable,
        })
    }

    /// Fills the buffer from the file starting at the offset, calling `pread`
    /// repeatedly until every byte is accounted for.
    pub fn read_at(
        &self,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<(), ReadError> {
        let mut read_count = 0;
        while read_count < buf.len() {
            let n = pread(
                self.handle.as_raw_fd(),
                &mut buf[read_count..],
                (offset + read_count as u64) as i64,
            )
            .map_err(|e| {
                log::warn!("File {:?} read error: {}", self.info.path, e);
                ReadError::Io(io::Error::last_os_error())
            })?;

            // hitting end of file here means we're reading a portion of the
            // file that was never written
            if n == 0 {
                return Err(ReadError::Io(
                    io::ErrorKind::UnexpectedEof.into(),
                ));
            }
            read_count += n;
        }
        Ok(())
    }

    /// Writes the whole buffer to the file starting at the offset, calling
    /// `pwrite` repeatedly until every byte is transferred.
    pub fn write_at(
        &self,
        buf: &[u8],
        offset: u64,
    ) -> Result<(), WriteError> {
        debug_assert!(self.writable);
        let mut write_count = 0;
        while write_count < buf.len() {
            let n = pwrite(
                self.handle.as_raw_fd(),
                &buf[write_count..],
                (offset + write_count as u64) as i64,
            )
            .map_err(|e| {
                log::warn!("File {:?} write error: {}", self.info.path, e);
                WriteError::Io(io::Error::last_os_error())
            })?;

            if n == 0 {
                return Err(WriteError::Io(io::ErrorKind::WriteZero.into()));
            }
            write_count += n;
        }
        Ok(())
    }

    /// Tells the OS that the given range of the file will soon be read.
    /// Purely an optimization hint, so failures are ignored.
    pub fn advise_read_ahead(&self, offset: u64, len: u64) {
        let _ = posix_fadvise(
            self.handle.as_raw_fd(),
            offset as i64,
            len as i64,
            PosixFadviseAdvice::POSIX_FADV_WILLNEED,
        );
    }
}

/// Returns the path the file lives at, or should be created at.
///
/// An existing file is used under whichever of its two names it is found,
/// the final name taking precedence. A file that doesn't exist yet resolves
/// to the partial name only when incomplete file naming is enabled.
fn resolve_path(
    download_dir: &Path,
    rel_path: &Path,
    partial_names: bool,
) -> PathBuf {
    let final_path = download_dir.join(rel_path);
    if final_path.exists() {
        return final_path;
    }
    let partial = partial_path(&final_path);
    if partial.exists() {
        return partial;
    }
    if partial_names {
        partial
    } else {
        final_path
    }
}

/// Appends [`PARTIAL_FILE_SUFFIX`] to the path's file name.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_FILE_SUFFIX);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_file_info(name: &str, len: u64) -> FileInfo {
        FileInfo {
            path: PathBuf::from(name),
            len,
            torrent_offset: 0,
            is_dnd: false,
        }
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = TorrentFile::open(
            dir.path(),
            make_file_info("f", 100),
            true,
            Preallocation::None,
            false,
        )
        .unwrap();

        file.write_at(b"hello disk", 25).unwrap();

        let mut buf = [0; 10];
        file.read_at(&mut buf, 25).unwrap();
        assert_eq!(&buf, b"hello disk");
    }

    #[test]
    fn test_read_past_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = TorrentFile::open(
            dir.path(),
            make_file_info("f", 100),
            true,
            Preallocation::None,
            false,
        )
        .unwrap();
        file.write_at(b"abc", 0).unwrap();

        let mut buf = [0; 10];
        assert!(matches!(
            file.read_at(&mut buf, 0),
            Err(ReadError::Io(_))
        ));
    }

    #[test]
    fn test_missing_file_read_only_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = TorrentFile::open(
            dir.path(),
            make_file_info("missing", 100),
            false,
            Preallocation::None,
            false,
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_sparse_preallocation() {
        let dir = tempfile::tempdir().unwrap();
        let file = TorrentFile::open(
            dir.path(),
            make_file_info("f", 4096),
            true,
            Preallocation::Sparse,
            false,
        )
        .unwrap();
        assert_eq!(file.handle.metadata().unwrap().len(), 4096);
    }

    #[test]
    fn test_dnd_file_not_preallocated() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = make_file_info("f", 4096);
        info.is_dnd = true;
        let file = TorrentFile::open(
            dir.path(),
            info,
            true,
            Preallocation::Sparse,
            false,
        )
        .unwrap();
        assert_eq!(file.handle.metadata().unwrap().len(), 0);
    }

    #[test]
    fn test_new_file_gets_partial_name() {
        let dir = tempfile::tempdir().unwrap();
        TorrentFile::open(
            dir.path(),
            make_file_info("f", 10),
            true,
            Preallocation::None,
            true,
        )
        .unwrap();
        assert!(dir.path().join("f.part").exists());
        assert!(!dir.path().join("f").exists());
    }

    #[test]
    fn test_existing_partial_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.part"), b"data").unwrap();

        let file = TorrentFile::open(
            dir.path(),
            make_file_info("f", 10),
            false,
            Preallocation::None,
            true,
        )
        .unwrap();
        let mut buf = [0; 4];
        file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"data");
    }

    #[test]
    fn test_final_name_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), b"done").unwrap();
        fs::write(dir.path().join("f.part"), b"stale").unwrap();

        let file = TorrentFile::open(
            dir.path(),
            make_file_info("f", 4),
            false,
            Preallocation::None,
            true,
        )
        .unwrap();
        let mut buf = [0; 4];
        file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"done");
    }
}
