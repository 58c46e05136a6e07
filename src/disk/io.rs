//! The piece range IO engine.
//!
//! Peers exchange torrent content in `(piece, offset, length)` ranges, while
//! the OS deals in per-file reads and writes. The functions here translate
//! between the two: a range is split at file boundaries and each part is
//! served against a pooled file handle at the right in-file offset.
//!
//! A range is not required to stay within one piece; it only has to lie
//! within the torrent.

use std::{io, path::PathBuf};

use crate::{
    session::Session, storage_info::StorageInfo, torrent::Torrent, PieceIndex,
    TorrentId,
};

use super::error::{ReadError, WriteError};

/// Writes the buffer to the files the range maps onto, creating (and, per
/// the session's configuration, preallocating) any that don't exist yet.
///
/// The first failed write faults the torrent: its local error records the
/// offending path, and all further writes are refused until the error is
/// cleared.
pub fn write(
    session: &mut Session,
    torrent: &mut Torrent,
    index: PieceIndex,
    begin: u32,
    data: &[u8],
) -> Result<(), WriteError> {
    let storage = match torrent.storage() {
        Some(storage) => storage,
        None => return Err(WriteError::InvalidRange),
    };
    if !range_is_valid(storage, index, begin, data.len()) {
        log::warn!(
            "Invalid write range: piece {} offset {} len {}",
            index,
            begin,
            data.len()
        );
        return Err(WriteError::InvalidRange);
    }
    if data.is_empty() {
        return Ok(());
    }
    if let Some(error) = torrent.local_error() {
        log::warn!(
            "Refusing write to faulted torrent {}: {}",
            torrent.id(),
            error
        );
        return Err(WriteError::Io(io::Error::new(
            io::ErrorKind::Other,
            "torrent has a local error",
        )));
    }

    let result =
        write_range(session, torrent.id(), storage, index, begin, data);
    match result {
        Ok(()) => Ok(()),
        Err((path, error)) => {
            torrent.set_local_error(path, &error);
            Err(error)
        }
    }
}

/// Fills the buffer from the files the range maps onto.
///
/// Reading a range of a file that doesn't exist (was never written) reports
/// [`ReadError::NotFound`].
pub fn read(
    session: &mut Session,
    torrent: &Torrent,
    index: PieceIndex,
    begin: u32,
    buf: &mut [u8],
) -> Result<(), ReadError> {
    let storage = match torrent.storage() {
        Some(storage) => storage,
        None => return Err(ReadError::InvalidRange),
    };
    if !range_is_valid(storage, index, begin, buf.len()) {
        log::warn!(
            "Invalid read range: piece {} offset {} len {}",
            index,
            begin,
            buf.len()
        );
        return Err(ReadError::InvalidRange);
    }
    if buf.is_empty() {
        return Ok(());
    }

    let id = torrent.id();
    let Session { conf, files, .. } = session;

    let (mut file_index, _) = storage.locate(index, begin);
    let mut torrent_offset = storage.torrent_piece_offset(index) + begin as u64;
    let mut transferred = 0;

    while transferred < buf.len() {
        debug_assert!(file_index < storage.files.len());
        let file_info = &storage.files[file_index];
        // empty files hold no bytes of any range
        if file_info.len == 0 {
            file_index += 1;
            continue;
        }

        let slice = file_info
            .get_slice(torrent_offset, (buf.len() - transferred) as u64);
        let file = files
            .checkout(
                id,
                file_index,
                storage,
                false,
                conf.preallocation,
                conf.incomplete_file_naming,
            )
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ReadError::NotFound
                } else {
                    ReadError::Io(e)
                }
            })?;
        file.read_at(
            &mut buf[transferred..transferred + slice.len as usize],
            slice.offset,
        )?;

        transferred += slice.len as usize;
        torrent_offset += slice.len;
        file_index += 1;
    }

    Ok(())
}

/// Tells the OS that the range will soon be read.
///
/// Purely an optimization hint: every failure, including files that don't
/// exist yet, is silently ignored.
pub fn prefetch(
    session: &mut Session,
    torrent: &Torrent,
    index: PieceIndex,
    begin: u32,
    len: u32,
) {
    let storage = match torrent.storage() {
        Some(storage) => storage,
        None => return,
    };
    if len == 0 || !range_is_valid(storage, index, begin, len as usize) {
        return;
    }

    let id = torrent.id();
    let Session { conf, files, .. } = session;

    let (mut file_index, _) = storage.locate(index, begin);
    let mut torrent_offset = storage.torrent_piece_offset(index) + begin as u64;
    let mut remaining = len as u64;

    while remaining > 0 {
        debug_assert!(file_index < storage.files.len());
        let file_info = &storage.files[file_index];
        if file_info.len == 0 {
            file_index += 1;
            continue;
        }

        let slice = file_info.get_slice(torrent_offset, remaining);
        if let Ok(file) = files.checkout(
            id,
            file_index,
            storage,
            false,
            conf.preallocation,
            conf.incomplete_file_naming,
        ) {
            file.advise_read_ahead(slice.offset, slice.len);
        }

        remaining -= slice.len;
        torrent_offset += slice.len;
        file_index += 1;
    }
}

/// The write loop proper. On failure returns the path of the file whose
/// write (or open) failed, so the caller can fault the torrent with it.
fn write_range(
    session: &mut Session,
    id: TorrentId,
    storage: &StorageInfo,
    index: PieceIndex,
    begin: u32,
    data: &[u8],
) -> Result<(), (PathBuf, WriteError)> {
    let Session { conf, files, .. } = session;

    let (mut file_index, _) = storage.locate(index, begin);
    let mut torrent_offset = storage.torrent_piece_offset(index) + begin as u64;
    let mut transferred = 0;

    while transferred < data.len() {
        debug_assert!(file_index < storage.files.len());
        let file_info = &storage.files[file_index];
        if file_info.len == 0 {
            file_index += 1;
            continue;
        }

        let slice = file_info
            .get_slice(torrent_offset, (data.len() - transferred) as u64);
        let file = files
            .checkout(
                id,
                file_index,
                storage,
                true,
                conf.preallocation,
                conf.incomplete_file_naming,
            )
            .map_err(|e| (file_info.path.clone(), WriteError::Io(e)))?;
        file.write_at(
            &data[transferred..transferred + slice.len as usize],
            slice.offset,
        )
        .map_err(|e| (file_info.path.clone(), e))?;

        transferred += slice.len as usize;
        torrent_offset += slice.len;
        file_index += 1;
    }

    Ok(())
}

/// Returns whether the byte range starting in the piece lies entirely within
/// the torrent.
fn range_is_valid(
    storage: &StorageInfo,
    index: PieceIndex,
    begin: u32,
    len: usize,
) -> bool {
    if index >= storage.piece_count {
        return false;
    }
    let start = storage.torrent_piece_offset(index) + begin as u64;
    start + len as u64 <= storage.download_len
}
