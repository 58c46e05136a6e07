use std::io;

use lru::LruCache;

use crate::{
    conf::Preallocation, storage_info::StorageInfo, FileIndex, TorrentId,
};

use super::file::TorrentFile;

/// The session wide pool of open torrent file handles.
///
/// Opening and closing files around every piece is wasteful, so handles are
/// kept open and reused, keyed by torrent and file index. The pool is
/// bounded: checking out a handle past the limit closes the least recently
/// used one.
pub(crate) struct FileCache {
    handles: LruCache<(TorrentId, FileIndex), TorrentFile>,
}

impl FileCache {
    pub fn new(limit: usize) -> Self {
        Self {
            handles: LruCache::new(limit.max(1)),
        }
    }

    /// Returns the pooled handle for the file, if one is open in a mode that
    /// can serve the request.
    pub fn get_cached(
        &mut self,
        torrent_id: TorrentId,
        file_index: FileIndex,
        writable: bool,
    ) -> Option<&TorrentFile> {
        let key = (torrent_id, file_index);
        let compatible = matches!(
            self.handles.peek(&key),
            Some(file) if file.writable || !writable
        );
        if compatible {
            self.handles.get(&key)
        } else {
            None
        }
    }

    /// Returns a handle for the file, opening (and for writes creating and
    /// preallocating) it on a pool miss.
    ///
    /// A handle pooled in read only mode is reopened when a writable one is
    /// requested.
    pub fn checkout(
        &mut self,
        torrent_id: TorrentId,
        file_index: FileIndex,
        storage: &StorageInfo,
        writable: bool,
        preallocation: Preallocation,
        partial_names: bool,
    ) -> io::Result<&TorrentFile> {
        let key = (torrent_id, file_index);
        let needs_open = match self.handles.peek(&key) {
            Some(file) => writable && !file.writable,
            None => true,
        };

        if needs_open {
            let file = TorrentFile::open(
                &storage.download_dir,
                storage.files[file_index].clone(),
                writable,
                preallocation,
                partial_names,
            )?;
            self.handles.put(key, file);
        }

        // the entry exists: either it was compatible or we just inserted it
        Ok(self
            .handles
            .get(&key)
            .expect("checked out file handle not in pool"))
    }

    /// Closes every pooled handle belonging to the torrent.
    pub fn close_torrent(&mut self, torrent_id: TorrentId) {
        let keys: Vec<_> = self
            .handles
            .iter()
            .map(|(key, _)| *key)
            .filter(|(id, _)| *id == torrent_id)
            .collect();
        for key in keys {
            self.handles.pop(&key);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handles.len()
    }
}
