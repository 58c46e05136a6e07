//! Helpers shared by the unit tests: assembling valid metainfo containers
//! and torrents backed by temporary directories.

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::{
    conf::Conf, metainfo::raw, session::Session, torrent::Torrent,
};

/// A session whose download and metainfo directories live under the given
/// (temporary) root.
pub(crate) fn session(root: &Path) -> Session {
    Session::new(Conf::new(root.join("downloads"), root.join("metainfo")))
}

/// Serializes a multi file metainfo container with the given layout and
/// piece digest string.
pub(crate) fn container_bytes(
    name: &str,
    piece_len: u32,
    files: &[(&str, u64)],
    pieces: Vec<u8>,
) -> Vec<u8> {
    let raw = raw::Metainfo {
        info: raw::Info {
            name: name.into(),
            pieces,
            piece_len: piece_len as u64,
            len: None,
            files: Some(
                files
                    .iter()
                    .map(|(path, len)| raw::File {
                        path: vec![(*path).into()],
                        len: *len,
                    })
                    .collect(),
            ),
            private: None,
        },
        announce: Some("http://t/a".into()),
        announce_list: Vec::new(),
        url_list: Vec::new(),
    };
    serde_bencode::to_bytes(&raw).unwrap()
}

/// A torrent with the given layout and all-zero piece digests, for tests
/// that don't verify content.
pub(crate) fn archive_torrent(
    session: &mut Session,
    piece_len: u32,
    files: &[(&str, u64)],
) -> Torrent {
    let total: u64 = files.iter().map(|(_, len)| len).sum();
    let piece_count =
        ((total + piece_len as u64 - 1) / piece_len as u64) as usize;
    let bytes =
        container_bytes("t", piece_len, files, vec![0; piece_count * 20]);
    Torrent::from_metainfo_bytes(session, &bytes).unwrap()
}

/// A torrent with the given layout whose piece digests are computed from
/// the content the files are expected to hold.
pub(crate) fn torrent_with_content(
    session: &mut Session,
    piece_len: u32,
    files: &[(&str, u64)],
    content: &[u8],
) -> Torrent {
    let total: u64 = files.iter().map(|(_, len)| len).sum();
    debug_assert_eq!(total as usize, content.len());
    let pieces = content
        .chunks(piece_len as usize)
        .flat_map(|chunk| Sha1::digest(chunk).to_vec())
        .collect();
    let bytes = container_bytes("t", piece_len, files, pieces);
    Torrent::from_metainfo_bytes(session, &bytes).unwrap()
}

/// Deterministic filler bytes.
pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31).wrapping_add(7) % 251) as u8)
        .collect()
}

/// The on-disk path of one of the torrent's files.
pub(crate) fn torrent_file_path(torrent: &Torrent, name: &str) -> PathBuf {
    torrent
        .storage()
        .expect("torrent has no storage")
        .download_dir
        .join(name)
}
