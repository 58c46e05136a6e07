use std::{
    fmt,
    path::{Path, PathBuf},
};

use url::Url;

use crate::{error::*, storage_info::FileInfo, Sha1Hash};

/// The parsed and validated content of a torrent's metainfo container.
#[derive(Clone)]
pub struct Metainfo {
    /// The torrent's name, used as the download path's last component.
    pub name: String,
    /// The torrent's SHA-1 hash, computed over the canonical bencoding of the
    /// info dictionary. It uniquely identifies a torrent.
    pub info_hash: Sha1Hash,
    /// The concatenation of each piece's SHA-1 digest, so its length is
    /// a multiple of 20.
    pub pieces: Vec<u8>,
    /// The nominal length of a piece. The last piece may be shorter.
    pub piece_len: u32,
    /// The byte length of the canonically bencoded info dictionary. Metadata
    /// exchange serves the info dictionary to peers in slices of this total.
    pub info_len: usize,
    /// The torrent's files, ordered by their offset within the torrent.
    pub files: Vec<FileInfo>,
    /// The trackers that the torrent announces to.
    pub trackers: Vec<Url>,
    /// HTTP sources that serve the torrent's content byte ranges directly.
    pub webseeds: Vec<String>,
}

impl fmt::Debug for Metainfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metainfo")
            .field("name", &self.name)
            .field("info_hash", &hex::encode(self.info_hash))
            .field("pieces", &"<pieces...>")
            .field("piece_len", &self.piece_len)
            .field("files", &self.files)
            .finish()
    }
}

impl Metainfo {
    /// Parses the bytes of a metainfo container into a [`Metainfo`] instance,
    /// or returns an error if the bencoding or the torrent structure is
    /// invalid.
    ///
    /// Rules enforced beyond bencode syntax:
    /// - the length of the pieces string must be a multiple of 20 and must
    ///   cover the download length exactly,
    /// - the info dictionary must contain either `length` (single file) or
    ///   `files` (archive), and not both,
    /// - file paths must be relative and non-empty; file lengths may be zero.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let metainfo: raw::Metainfo = serde_bencode::from_bytes(bytes)?;

        if metainfo.info.name.is_empty() {
            log::warn!("Metainfo name is empty");
            return Err(Error::InvalidMetainfo);
        }

        // the pieces field is a concatenation of 20 byte SHA-1 hashes, so it
        // must be a multiple of 20
        if metainfo.info.pieces.len() % 20 != 0 {
            log::warn!("Metainfo pieces string is not a multiple of 20");
            return Err(Error::InvalidMetainfo);
        }

        if metainfo.info.piece_len == 0
            || metainfo.info.piece_len > u32::MAX as u64
        {
            log::warn!("Metainfo piece length {} invalid", metainfo.info.piece_len);
            return Err(Error::InvalidMetainfo);
        }
        let piece_len = metainfo.info.piece_len as u32;

        // verify download structure and build up files metadata
        let mut files = Vec::new();
        if let Some(len) = metainfo.info.len {
            if metainfo.info.files.is_some() {
                log::warn!("Metainfo cannot contain both `length` and `files`");
                return Err(Error::InvalidMetainfo);
            }

            // the path of this file is just the torrent name
            files.push(FileInfo {
                path: metainfo.info.name.clone().into(),
                len,
                torrent_offset: 0,
                is_dnd: false,
            });
        } else if let Some(raw_files) = &metainfo.info.files {
            if raw_files.is_empty() {
                log::warn!("Metainfo files must not be empty");
                return Err(Error::InvalidMetainfo);
            }

            files.reserve_exact(raw_files.len());

            let mut torrent_offset = 0;
            for file in raw_files.iter() {
                // verify that the path is not empty
                let path: PathBuf = file.path.iter().collect();
                if path.as_os_str().is_empty() {
                    log::warn!("Path in metainfo is empty");
                    return Err(Error::InvalidMetainfo);
                }

                // verify that the path is not absolute
                if path.is_absolute() {
                    log::warn!("Path {:?} is absolute", path);
                    return Err(Error::InvalidMetainfo);
                }

                // verify that the path is not the root
                if path == Path::new("/") {
                    log::warn!("Path {:?} is root", path);
                    return Err(Error::InvalidMetainfo);
                }

                // file is now verified, we can collect it
                files.push(FileInfo {
                    path,
                    torrent_offset,
                    len: file.len,
                    is_dnd: false,
                });

                // advance offset for next file
                torrent_offset += file.len;
            }
        } else {
            log::warn!("No `length` or `files` key present in metainfo");
            return Err(Error::InvalidMetainfo);
        }

        let download_len: u64 = files.iter().map(|f| f.len).sum();
        if download_len == 0 {
            log::warn!("Metainfo download length is 0");
            return Err(Error::InvalidMetainfo);
        }

        // there must be as many piece digests as there are pieces
        let piece_count = (download_len + piece_len as u64 - 1) / piece_len as u64;
        if piece_count as usize != metainfo.info.pieces.len() / 20 {
            log::warn!(
                "Metainfo has {} piece digests for {} pieces",
                metainfo.info.pieces.len() / 20,
                piece_count
            );
            return Err(Error::InvalidMetainfo);
        }

        let mut trackers = Vec::new();
        if !metainfo.announce_list.is_empty() {
            for tier in metainfo.announce_list.iter() {
                for tracker in tier.iter() {
                    trackers.push(Url::parse(tracker)?);
                }
            }
        } else if let Some(tracker) = &metainfo.announce {
            trackers.push(Url::parse(tracker)?);
        }

        if trackers.is_empty() {
            log::warn!("No trackers in metainfo");
        }

        let info_bytes = metainfo.info.to_bytes()?;
        let info_hash = raw::info_hash_of(&info_bytes);

        Ok(Self {
            name: metainfo.info.name,
            info_hash,
            pieces: metainfo.info.pieces,
            piece_len,
            info_len: info_bytes.len(),
            files,
            trackers,
            webseeds: metainfo.url_list,
        })
    }

    /// Returns the number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.pieces.len() / 20
    }

    /// Returns the sum of all file lengths.
    pub fn download_len(&self) -> u64 {
        self.files.iter().map(|f| f.len).sum()
    }

    /// Returns true if the torrent is a multi file download.
    pub fn is_archive(&self) -> bool {
        self.files.len() > 1
    }

    /// Returns the expected SHA-1 digest of the piece at the given index.
    pub fn piece_hash(&self, index: usize) -> Option<Sha1Hash> {
        let pos = index.checked_mul(20)?;
        let slice = self.pieces.get(pos..pos + 20)?;
        let mut hash = [0; 20];
        hash.copy_from_slice(slice);
        Some(hash)
    }
}

pub(crate) mod raw {
    //! The serde image of the metainfo container, used only as
    //! a (de)serialization step towards the validated [`super::Metainfo`].

    use sha1::{Digest, Sha1};

    use crate::Sha1Hash;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Metainfo {
        pub info: Info,
        /// The URL of the tracker.
        #[serde(skip_serializing_if = "Option::is_none")]
        pub announce: Option<String>,
        #[serde(default, rename = "announce-list")]
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub announce_list: Vec<Vec<String>>,
        /// Web seed URLs, per BEP 19.
        #[serde(default, rename = "url-list")]
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub url_list: Vec<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Info {
        /// The suggested file name (single file) or directory name (archive).
        pub name: String,
        /// A concatenation of each piece's SHA-1 digest.
        #[serde(with = "serde_bytes")]
        pub pieces: Vec<u8>,
        /// The number of bytes per piece.
        #[serde(rename = "piece length")]
        pub piece_len: u64,
        /// The size of the file in bytes, present only for single file
        /// torrents.
        #[serde(rename = "length")]
        #[serde(skip_serializing_if = "Option::is_none")]
        pub len: Option<u64>,
        /// One entry per file, present only for archives.
        #[serde(skip_serializing_if = "Option::is_none")]
        pub files: Option<Vec<File>>,
        /// Not interpreted, but kept so that re-serializing the dictionary
        /// reproduces the same info hash.
        #[serde(skip_serializing_if = "Option::is_none")]
        pub private: Option<u8>,
    }

    impl Info {
        /// Returns the canonical bencoding of the info dictionary, the bytes
        /// the torrent's info hash is computed over.
        pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
            serde_bencode::to_bytes(self)
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct File {
        /// The subdirectory names of the file's path, the last of which is
        /// the actual file name.
        pub path: Vec<String>,
        #[serde(rename = "length")]
        pub len: u64,
    }

    /// Computes the SHA-1 digest naming the torrent whose canonically
    /// bencoded info dictionary is the given bytes.
    pub fn info_hash_of(info_bytes: &[u8]) -> Sha1Hash {
        let digest = Sha1::digest(info_bytes);
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&digest);
        info_hash
    }
}

#[cfg(test)]
mod tests {
    use sha1::{Digest, Sha1};

    use super::*;

    // A handcrafted, canonically ordered single file torrent: two pieces of
    // 16 KiB, the digests are 20 'x's and 20 'y's.
    fn single_file_container() -> (Vec<u8>, Vec<u8>) {
        let info = format!(
            "d6:lengthi32768e4:name5:hello12:piece \
             lengthi16384e6:pieces40:{}{}e",
            "x".repeat(20),
            "y".repeat(20)
        )
        .into_bytes();
        let mut container = b"d8:announce10:http://t/a4:info".to_vec();
        container.extend_from_slice(&info);
        container.push(b'e');
        (container, info)
    }

    #[test]
    fn test_parse_single_file() {
        let (container, info) = single_file_container();
        let metainfo = Metainfo::from_bytes(&container).unwrap();

        assert_eq!(metainfo.name, "hello");
        assert_eq!(metainfo.piece_len, 16384);
        assert_eq!(metainfo.piece_count(), 2);
        assert_eq!(metainfo.download_len(), 32768);
        assert!(!metainfo.is_archive());
        assert_eq!(metainfo.files.len(), 1);
        assert_eq!(metainfo.files[0].len, 32768);
        assert_eq!(metainfo.files[0].torrent_offset, 0);
        assert_eq!(metainfo.trackers.len(), 1);

        assert_eq!(metainfo.piece_hash(0), Some([b'x'; 20]));
        assert_eq!(metainfo.piece_hash(1), Some([b'y'; 20]));
        assert_eq!(metainfo.piece_hash(2), None);

        // re-serializing the parsed info dictionary must reproduce the
        // original bytes, otherwise the info hash would not survive a round
        // trip through this type
        assert_eq!(metainfo.info_len, info.len());
        let mut expected = [0; 20];
        expected.copy_from_slice(&Sha1::digest(&info));
        assert_eq!(metainfo.info_hash, expected);
    }

    #[test]
    fn test_parse_archive_with_empty_file() {
        let raw = raw::Metainfo {
            info: raw::Info {
                name: "archive".into(),
                pieces: vec![0; 20],
                piece_len: 16384,
                len: None,
                files: Some(vec![
                    raw::File {
                        path: vec!["a".into()],
                        len: 1000,
                    },
                    raw::File {
                        path: vec!["b".into()],
                        len: 0,
                    },
                    raw::File {
                        path: vec!["sub".into(), "c".into()],
                        len: 2000,
                    },
                ]),
                private: None,
            },
            announce: None,
            announce_list: vec![vec![
                "http://t/a".into(),
                "udp://t:6969/b".into(),
            ]],
            url_list: vec!["http://seed/".into()],
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        let metainfo = Metainfo::from_bytes(&bytes).unwrap();

        assert!(metainfo.is_archive());
        assert_eq!(metainfo.download_len(), 3000);
        let offsets: Vec<_> =
            metainfo.files.iter().map(|f| f.torrent_offset).collect();
        assert_eq!(offsets, vec![0, 1000, 1000]);
        assert_eq!(metainfo.files[2].path, PathBuf::from("sub/c"));
        assert_eq!(metainfo.trackers.len(), 2);
        assert_eq!(metainfo.webseeds, vec!["http://seed/".to_string()]);
    }

    #[test]
    fn test_reject_truncated_pieces() {
        let (mut container, _) = single_file_container();
        // shorten the pieces string by rewriting its length prefix: 40 -> 39
        let pos = container
            .windows(3)
            .position(|w| w == b"40:")
            .unwrap();
        container[pos] = b'3';
        container[pos + 1] = b'9';
        container.remove(pos + 3);
        assert!(matches!(
            Metainfo::from_bytes(&container),
            Err(Error::InvalidMetainfo)
        ));
    }

    #[test]
    fn test_reject_digest_count_mismatch() {
        let raw = raw::Metainfo {
            info: raw::Info {
                name: "short".into(),
                pieces: vec![0; 20],
                piece_len: 16384,
                // two pieces worth of data but only one digest
                len: Some(20000),
                files: None,
                private: None,
            },
            announce: None,
            announce_list: Vec::new(),
            url_list: Vec::new(),
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        assert!(matches!(
            Metainfo::from_bytes(&bytes),
            Err(Error::InvalidMetainfo)
        ));
    }

    #[test]
    fn test_reject_absolute_path() {
        let raw = raw::Metainfo {
            info: raw::Info {
                name: "archive".into(),
                pieces: vec![0; 20],
                piece_len: 16384,
                len: None,
                files: Some(vec![raw::File {
                    path: vec!["/etc".into(), "passwd".into()],
                    len: 100,
                }]),
                private: None,
            },
            announce: None,
            announce_list: Vec::new(),
            url_list: Vec::new(),
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        assert!(matches!(
            Metainfo::from_bytes(&bytes),
            Err(Error::InvalidMetainfo)
        ));
    }
}
