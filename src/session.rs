//! The session is the explicit context for every core operation.
//!
//! There is no global state: anything shared between torrents, such as the
//! configuration and the pooled file handles, lives here and is passed into
//! the calls that need it. All operations are synchronous and are expected
//! to be driven from a single IO thread.

use crate::{conf::Conf, disk::FileCache, TorrentId};

pub struct Session {
    pub conf: Conf,
    /// The process wide pool of open file handles, shared by all torrents.
    pub(crate) files: FileCache,
    next_torrent_id: TorrentId,
}

impl Session {
    pub fn new(conf: Conf) -> Self {
        let files = FileCache::new(conf.open_file_limit);
        Self {
            conf,
            files,
            next_torrent_id: 0,
        }
    }

    /// Hands out the next torrent ID, unique within this session.
    pub(crate) fn next_torrent_id(&mut self) -> TorrentId {
        let id = self.next_torrent_id;
        self.next_torrent_id += 1;
        id
    }

    /// Closes every pooled file handle of the torrent. Called when a torrent
    /// is stopped or removed.
    pub fn close_torrent_files(&mut self, id: TorrentId) {
        self.files.close_torrent(id);
    }
}
