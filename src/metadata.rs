//! Incremental acquisition of the info dictionary from peers, and the
//! symmetric path that serves it back to peers once it is known.
//!
//! A torrent created from a magnet link knows only its info hash. Peers
//! that support the metadata extension advertise the info dictionary's size
//! and serve it in fixed 16 KiB pieces. Once every piece has arrived and
//! the reassembled buffer hashes to the torrent's info hash, the dictionary
//! is merged into the persisted container and the torrent becomes fully
//! described. A buffer that fails its checksum or doesn't parse is simply
//! re-requested from scratch; acquisition has no terminal failure state.

use std::{collections::VecDeque, fs};

use serde_bencode::value::Value;
use sha1::{Digest, Sha1};

use crate::{
    error::*, metainfo::Metainfo, session::Session, storage_info::StorageInfo,
    torrent::Torrent, Bitfield,
};

/// The size of the pieces the info dictionary is exchanged in. Unrelated to
/// the torrent's content piece size.
pub const METADATA_PIECE_LEN: usize = 16384;

/// A piece handed out by [`Torrent::next_metadata_request`] is not handed
/// out again for this long.
const MIN_REPEAT_INTERVAL_SECS: u64 = 3;

/// A metadata piece that has not arrived yet.
#[derive(Debug)]
struct NeededPiece {
    piece: usize,
    /// When the piece was last handed out for requesting. Zero for never.
    last_requested_at: u64,
}

/// Bookkeeping for an info dictionary being reassembled from peers.
#[derive(Debug)]
pub struct IncompleteMetadata {
    /// Sized up front from the peer's size hint; piece payloads are copied
    /// straight into place.
    data: Vec<u8>,
    piece_count: usize,
    /// The pieces not yet received, ordered least to most recently
    /// requested, so the head is always the best next candidate.
    needed: VecDeque<NeededPiece>,
}

impl IncompleteMetadata {
    fn new(len: usize) -> Self {
        let piece_count = (len + METADATA_PIECE_LEN - 1) / METADATA_PIECE_LEN;
        let mut metadata = Self {
            data: vec![0; len],
            piece_count,
            needed: VecDeque::with_capacity(piece_count),
        };
        metadata.reset();
        metadata
    }

    /// Marks every piece as needed again. The buffer is kept as is;
    /// re-delivered pieces overwrite it.
    fn reset(&mut self) {
        self.needed.clear();
        self.needed.extend((0..self.piece_count).map(|piece| NeededPiece {
            piece,
            last_requested_at: 0,
        }));
    }

    /// The expected payload length of the piece: 16 KiB for all but the
    /// last, which holds the remainder.
    fn piece_len(&self, piece: usize) -> usize {
        debug_assert!(piece < self.piece_count);
        if piece + 1 == self.piece_count {
            self.data.len() - piece * METADATA_PIECE_LEN
        } else {
            METADATA_PIECE_LEN
        }
    }

    /// Picks the piece to request next and stamps it with the current time.
    ///
    /// The head of the queue is the least recently requested outstanding
    /// piece: if even it was handed out too recently, so was everything
    /// behind it. Otherwise the head is rotated to the tail with a fresh
    /// stamp, which cycles requests through all outstanding pieces before
    /// repeating any.
    fn next_request(&mut self, now: u64) -> Option<usize> {
        if self.needed.front()?.last_requested_at + MIN_REPEAT_INTERVAL_SECS
            > now
        {
            return None;
        }
        let head = self.needed.pop_front()?;
        let piece = head.piece;
        self.needed.push_back(NeededPiece {
            piece,
            last_requested_at: now,
        });
        Some(piece)
    }

    /// Copies a piece payload into place. Out of range indices, payloads of
    /// the wrong length, and pieces that are not missing (duplicates) are
    /// dropped. Returns true when the last missing piece was just filled in.
    fn deliver(&mut self, piece: usize, data: &[u8]) -> bool {
        if piece >= self.piece_count {
            log::debug!("Dropping out of range metadata piece {}", piece);
            return false;
        }
        if data.len() != self.piece_len(piece) {
            log::warn!(
                "Dropping metadata piece {} with bad length {} (expected {})",
                piece,
                data.len(),
                self.piece_len(piece)
            );
            return false;
        }
        let position =
            match self.needed.iter().position(|n| n.piece == piece) {
                Some(position) => position,
                None => {
                    log::debug!("Dropping duplicate metadata piece {}", piece);
                    return false;
                }
            };

        let _ = self.needed.remove(position);
        let offset = piece * METADATA_PIECE_LEN;
        self.data[offset..offset + data.len()].copy_from_slice(data);
        self.needed.is_empty()
    }
}

/// The outcome of feeding a metadata piece to a torrent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataDelivery {
    /// The payload was dropped: acquisition isn't running, or the piece had
    /// a bad index or length, or it was a duplicate.
    Ignored,
    /// The payload was stored; more pieces are still missing.
    Stored,
    /// The payload completed the buffer and the info dictionary was
    /// installed: the torrent now has metadata.
    Installed,
    /// The payload completed the buffer, but it failed its checksum or
    /// could not be installed; every piece is marked needed again.
    Retrying,
}

impl Torrent {
    /// Handles a peer advertising the info dictionary's size, allocating the
    /// reassembly buffer on the first usable hint.
    ///
    /// The first hint wins: the hint is rejected once the torrent has
    /// metadata, once acquisition is already under way, and when the size
    /// itself is unusable.
    pub fn set_metadata_size_hint(&mut self, size: i64) -> bool {
        if self.has_metadata() || self.incomplete_metadata.is_some() {
            return false;
        }
        if size <= 0 || size > i32::MAX as i64 {
            log::debug!(
                "Rejecting metadata size hint {} for torrent {}",
                size,
                self.id
            );
            return false;
        }
        log::info!(
            "Torrent {} expecting a {} byte info dict",
            self.id,
            size
        );
        self.incomplete_metadata =
            Some(IncompleteMetadata::new(size as usize));
        true
    }

    /// Returns the metadata piece to request from a peer, if acquisition is
    /// running and a piece is due at `now` (in seconds).
    pub fn next_metadata_request(&mut self, now: u64) -> Option<usize> {
        self.incomplete_metadata.as_mut()?.next_request(now)
    }

    /// The number of metadata pieces still missing. Zero when acquisition
    /// isn't running.
    pub fn missing_metadata_piece_count(&self) -> usize {
        self.incomplete_metadata
            .as_ref()
            .map(|metadata| metadata.needed.len())
            .unwrap_or_default()
    }

    /// Accepts a metadata piece payload from a peer. When the payload
    /// completes the buffer, the whole checksum / parse / install sequence
    /// runs before this returns.
    pub fn deliver_metadata_piece(
        &mut self,
        session: &mut Session,
        piece: usize,
        data: &[u8],
    ) -> MetadataDelivery {
        let metadata = match &mut self.incomplete_metadata {
            Some(metadata) => metadata,
            None => return MetadataDelivery::Ignored,
        };

        let missing_before = metadata.needed.len();
        let complete = metadata.deliver(piece, data);
        if !complete {
            return if metadata.needed.len() < missing_before {
                MetadataDelivery::Stored
            } else {
                MetadataDelivery::Ignored
            };
        }

        if self.install_metadata(session) {
            self.incomplete_metadata = None;
            MetadataDelivery::Installed
        } else {
            MetadataDelivery::Retrying
        }
    }

    /// Runs the install sequence on the completed buffer: verify it against
    /// the info hash, parse it, merge it into the persisted container, and
    /// swap the torrent over to the derived metainfo.
    ///
    /// Checksum and parse failures are absorbed: the pieces are simply
    /// re-requested. A dictionary that parses but yields an unusable piece
    /// size additionally faults the torrent.
    fn install_metadata(&mut self, session: &mut Session) -> bool {
        let (parsed, info_len) = {
            let metadata = self
                .incomplete_metadata
                .as_ref()
                .expect("no metadata buffer to install");

            // the reassembled dictionary must hash to the torrent's identity
            if Sha1::digest(&metadata.data).as_slice() != self.info_hash {
                log::warn!("Torrent {} metadata checksum failed", self.id);
                (None, 0)
            } else {
                match serde_bencode::from_bytes::<Value>(&metadata.data) {
                    Ok(info @ Value::Dict(_)) => {
                        (Some(info), metadata.data.len())
                    }
                    _ => {
                        log::warn!(
                            "Torrent {} metadata parse failed",
                            self.id
                        );
                        (None, 0)
                    }
                }
            }
        };

        let info = match parsed {
            Some(info) => info,
            None => {
                self.reset_incomplete_metadata();
                return false;
            }
        };

        match self.merge_and_swap(session, info, info_len) {
            Ok(()) => true,
            Err(Error::UnusableMetainfo) => {
                log::error!(
                    "Torrent {} metadata is not usable: bad piece size",
                    self.id
                );
                let path = self.container_path(&session.conf);
                self.set_local_error(path, &Error::UnusableMetainfo);
                self.reset_incomplete_metadata();
                false
            }
            Err(e) => {
                log::warn!(
                    "Torrent {} metadata install failed: {}",
                    self.id,
                    e
                );
                self.reset_incomplete_metadata();
                false
            }
        }
    }

    fn reset_incomplete_metadata(&mut self) {
        if let Some(metadata) = &mut self.incomplete_metadata {
            metadata.reset();
        }
    }

    /// Merges the verified info dictionary into the persisted container,
    /// rewrites the container atomically, and swaps the torrent's in-memory
    /// state over to the newly derived metainfo.
    fn merge_and_swap(
        &mut self,
        session: &mut Session,
        info: Value,
        info_len: usize,
    ) -> Result<()> {
        let container_path = self.container_path(&session.conf);

        // a missing or corrupt container degrades to the skeleton persisted
        // at creation: the discovery hints alone
        let mut dict = fs::read(&container_path)
            .ok()
            .and_then(|bytes| {
                match serde_bencode::from_bytes(&bytes) {
                    Ok(Value::Dict(dict)) => Some(dict),
                    _ => None,
                }
            })
            .unwrap_or_default();
        dict.insert(b"info".to_vec(), info);
        let bytes = serde_bencode::to_bytes(&Value::Dict(dict))?;

        let mut metainfo = Metainfo::from_bytes(&bytes)?;
        if crate::block_size(metainfo.piece_len).is_none() {
            return Err(Error::UnusableMetainfo);
        }
        // the magnet identity is authoritative: the raw buffer was verified
        // against it, while the re-derived hash would be thrown off by any
        // info key our serde image doesn't carry
        metainfo.info_hash = self.info_hash;
        metainfo.info_len = info_len;

        // progress recorded against the old, metadata-less state is
        // meaningless now
        self.remove_resume(&session.conf);
        self.save_container(&session.conf, &bytes)?;

        let storage =
            StorageInfo::new(&metainfo, session.conf.download_dir.clone());
        self.completed_pieces = Bitfield::repeat(false, storage.piece_count);
        self.name = metainfo.name.clone();
        self.storage = Some(storage);
        self.metainfo = Some(metainfo);
        self.info_dict_location = None;
        self.is_dirty = true;
        self.is_edited = true;
        // the files may already hold data from a previous life of this
        // torrent; they must be verified against the digests we just learned
        self.needs_recheck = true;

        log::info!(
            "Torrent {} metadata installed ({} bytes)",
            self.id,
            info_len
        );
        Ok(())
    }

    /// Serves one 16 KiB slice of the info dictionary to a peer.
    ///
    /// Returns `None` while the torrent has no metadata, or when the piece
    /// index is out of range, or when the persisted container cannot back
    /// the read.
    pub fn metadata_piece(
        &mut self,
        session: &Session,
        piece: usize,
    ) -> Option<Vec<u8>> {
        if !self.has_metadata() {
            return None;
        }
        let (info_offset, info_len) = self.info_dict_location(session)?;
        let piece_offset = piece.checked_mul(METADATA_PIECE_LEN)?;
        if piece_offset >= info_len {
            return None;
        }
        let len = std::cmp::min(info_len - piece_offset, METADATA_PIECE_LEN);

        let path = self.container_path(&session.conf);
        let file = fs::File::open(&path)
            .map_err(|e| {
                log::warn!("Failed to open container {:?}: {}", path, e)
            })
            .ok()?;
        let mut buf = vec![0; len];
        use std::os::unix::fs::FileExt;
        file.read_exact_at(&mut buf, info_offset + piece_offset as u64)
            .map_err(|e| {
                log::warn!("Failed to read container {:?}: {}", path, e)
            })
            .ok()?;
        Some(buf)
    }

    /// Finds where the info dictionary's bytes live within the persisted
    /// container. Computed once per container and cached.
    fn info_dict_location(&mut self, session: &Session) -> Option<(u64, usize)> {
        if let Some(location) = self.info_dict_location {
            return Some(location);
        }

        let path = self.container_path(&session.conf);
        let container = fs::read(&path)
            .map_err(|e| {
                log::warn!("Failed to read container {:?}: {}", path, e)
            })
            .ok()?;
        let dict = match serde_bencode::from_bytes(&container) {
            Ok(Value::Dict(dict)) => dict,
            _ => {
                log::warn!("Container {:?} is not a bencoded dict", path);
                return None;
            }
        };
        let info = dict.get(&b"info"[..])?;
        let info_bytes = serde_bencode::to_bytes(info).ok()?;

        // dictionary keys are serialized in sorted order, so re-serializing
        // the parsed value reproduces its bytes verbatim and they can be
        // located as a substring of the container
        let offset = match find_subslice(&container, &info_bytes) {
            Some(offset) => offset,
            None => {
                log::warn!(
                    "Info dict bytes not found in container {:?}",
                    path
                );
                return None;
            }
        };

        let location = (offset as u64, info_bytes.len());
        self.info_dict_location = Some(location);
        Some(location)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use crate::{magnet::MagnetLink, test_utils::*};

    use super::*;

    /// Builds a valid single file info dictionary padded to exactly the
    /// target serialized length: two 16 KiB pieces plus an ignored padding
    /// key sized to make up the difference.
    fn info_dict_bytes_of_len(target: usize) -> Vec<u8> {
        fn build(pad: usize) -> Vec<u8> {
            let mut dict = HashMap::new();
            dict.insert(b"length".to_vec(), Value::Int(32768));
            dict.insert(
                b"name".to_vec(),
                Value::Bytes(b"magnetized".to_vec()),
            );
            dict.insert(b"piece length".to_vec(), Value::Int(16384));
            dict.insert(b"pieces".to_vec(), Value::Bytes(vec![0; 40]));
            if pad > 0 {
                dict.insert(
                    b"x-pad".to_vec(),
                    Value::Bytes(vec![b'p'; pad]),
                );
            }
            serde_bencode::to_bytes(&Value::Dict(dict)).unwrap()
        }

        let base = build(1).len();
        let estimate = (target + 1).saturating_sub(base);
        for pad in estimate.saturating_sub(8)..estimate + 8 {
            let bytes = build(pad);
            if bytes.len() == target {
                return bytes;
            }
        }
        panic!("no padding produces a {} byte info dict", target);
    }

    fn magnet_torrent_for(
        session: &mut Session,
        info_bytes: &[u8],
    ) -> Torrent {
        let link = MagnetLink {
            info_hash: crate::metainfo::raw::info_hash_of(info_bytes),
            name: Some("pending".into()),
            trackers: vec!["http://t/a".into()],
            webseeds: Vec::new(),
        };
        Torrent::from_magnet(session, &link).unwrap()
    }

    #[test]
    fn test_size_hint_rules() {
        let root = tempfile::tempdir().unwrap();
        let mut session = session(root.path());
        let info_bytes = info_dict_bytes_of_len(40000);
        let mut torrent = magnet_torrent_for(&mut session, &info_bytes);

        assert!(!torrent.set_metadata_size_hint(0));
        assert!(!torrent.set_metadata_size_hint(-5));
        assert!(!torrent.set_metadata_size_hint(i32::MAX as i64 + 1));
        assert_eq!(torrent.missing_metadata_piece_count(), 0);

        assert!(torrent.set_metadata_size_hint(40000));
        assert_eq!(torrent.missing_metadata_piece_count(), 3);

        // the first hint wins
        assert!(!torrent.set_metadata_size_hint(20000));
        assert_eq!(torrent.missing_metadata_piece_count(), 3);

        // a torrent that already has metadata ignores hints
        let mut described =
            archive_torrent(&mut session, 512, &[("a", 512)]);
        assert!(!described.set_metadata_size_hint(40000));
    }

    #[test]
    fn test_request_rotation_and_throttle() {
        let root = tempfile::tempdir().unwrap();
        let mut session = session(root.path());
        let info_bytes = info_dict_bytes_of_len(40000);
        let mut torrent = magnet_torrent_for(&mut session, &info_bytes);

        // five outstanding pieces
        assert!(torrent
            .set_metadata_size_hint(5 * METADATA_PIECE_LEN as i64));

        // pieces are handed out in order, least recently requested first
        for (now, piece) in (100..105).zip(0..5) {
            assert_eq!(torrent.next_metadata_request(now), Some(piece));
        }

        // the cycle continues with the piece requested the longest ago
        assert_eq!(torrent.next_metadata_request(105), Some(0));
        assert_eq!(torrent.next_metadata_request(105), Some(1));
        // piece 2 was stamped at 102, which is exactly 3 seconds ago
        assert_eq!(torrent.next_metadata_request(105), Some(2));
        // piece 3 was stamped at 103: too fresh
        assert_eq!(torrent.next_metadata_request(105), None);
        assert_eq!(torrent.next_metadata_request(106), Some(3));

        // with no acquisition running there is nothing to request
        let mut described =
            archive_torrent(&mut session, 512, &[("a", 512)]);
        assert_eq!(described.next_metadata_request(100), None);
    }

    #[test]
    fn test_deliver_validates_index_and_length() {
        let root = tempfile::tempdir().unwrap();
        let mut session = session(root.path());
        let info_bytes = info_dict_bytes_of_len(40000);
        let mut torrent = magnet_torrent_for(&mut session, &info_bytes);
        assert!(torrent.set_metadata_size_hint(40000));

        // out of range piece index
        assert_eq!(
            torrent.deliver_metadata_piece(&mut session, 3, &[0; 16384]),
            MetadataDelivery::Ignored
        );
        // the last piece holds the remainder: 40000 - 2 * 16384 bytes
        assert_eq!(
            torrent.deliver_metadata_piece(&mut session, 2, &[0; 7233]),
            MetadataDelivery::Ignored
        );
        assert_eq!(torrent.missing_metadata_piece_count(), 3);

        assert_eq!(
            torrent.deliver_metadata_piece(&mut session, 2, &[0; 7232]),
            MetadataDelivery::Stored
        );
        assert_eq!(torrent.missing_metadata_piece_count(), 2);

        // delivering the same piece again changes nothing
        assert_eq!(
            torrent.deliver_metadata_piece(&mut session, 2, &[0; 7232]),
            MetadataDelivery::Ignored
        );
        assert_eq!(torrent.missing_metadata_piece_count(), 2);
    }

    #[test]
    fn test_install_success() {
        let root = tempfile::tempdir().unwrap();
        let mut session = session(root.path());
        let info_bytes = info_dict_bytes_of_len(40000);
        let mut torrent = magnet_torrent_for(&mut session, &info_bytes);

        assert!(torrent.set_metadata_size_hint(40000));
        assert_eq!(
            torrent.deliver_metadata_piece(
                &mut session,
                0,
                &info_bytes[..16384]
            ),
            MetadataDelivery::Stored
        );
        assert_eq!(
            torrent.deliver_metadata_piece(
                &mut session,
                1,
                &info_bytes[16384..32768]
            ),
            MetadataDelivery::Stored
        );
        assert_eq!(
            torrent.deliver_metadata_piece(
                &mut session,
                2,
                &info_bytes[32768..]
            ),
            MetadataDelivery::Installed
        );

        // the torrent is now fully described
        assert!(torrent.has_metadata());
        assert_eq!(torrent.missing_metadata_piece_count(), 0);
        assert_eq!(torrent.name(), "magnetized");
        let metainfo = torrent.metainfo().unwrap();
        assert_eq!(metainfo.info_len, 40000);
        assert_eq!(metainfo.info_hash, *torrent.info_hash());
        assert_eq!(torrent.storage().unwrap().piece_count, 2);
        assert!(torrent.is_edited());
        assert!(torrent.take_recheck_request());
        assert!(!torrent.take_recheck_request());

        // further hints are rejected now
        assert!(!torrent.set_metadata_size_hint(40000));

        // the container was rewritten with the info dict merged in next to
        // the discovery hints
        let container =
            fs::read(torrent.container_path(&session.conf)).unwrap();
        match serde_bencode::from_bytes(&container).unwrap() {
            Value::Dict(dict) => {
                assert!(dict.contains_key(&b"announce".to_vec()));
                assert!(dict.contains_key(&b"info".to_vec()));
            }
            _ => panic!("container is not a dict"),
        }

        // and the seeding path serves back the exact bytes we assembled
        assert_eq!(
            torrent.metadata_piece(&session, 0).unwrap(),
            &info_bytes[..16384]
        );
        assert_eq!(
            torrent.metadata_piece(&session, 2).unwrap(),
            &info_bytes[32768..]
        );
        assert_eq!(torrent.metadata_piece(&session, 3), None);
    }

    #[test]
    fn test_install_retries_after_checksum_failure() {
        let root = tempfile::tempdir().unwrap();
        let mut session = session(root.path());
        let info_bytes = info_dict_bytes_of_len(40000);
        let mut torrent = magnet_torrent_for(&mut session, &info_bytes);
        assert!(torrent.set_metadata_size_hint(40000));

        // a full assembly of garbage: the checksum fails and every piece
        // becomes needed again, with no intervention required
        torrent.deliver_metadata_piece(&mut session, 0, &[0xff; 16384]);
        torrent.deliver_metadata_piece(&mut session, 1, &[0xff; 16384]);
        assert_eq!(
            torrent.deliver_metadata_piece(&mut session, 2, &[0xff; 7232]),
            MetadataDelivery::Retrying
        );
        assert!(!torrent.has_metadata());
        assert_eq!(torrent.missing_metadata_piece_count(), 3);
        assert!(torrent.local_error().is_none());

        // the second, correct assembly installs
        torrent.deliver_metadata_piece(&mut session, 0, &info_bytes[..16384]);
        torrent.deliver_metadata_piece(
            &mut session,
            1,
            &info_bytes[16384..32768],
        );
        assert_eq!(
            torrent.deliver_metadata_piece(
                &mut session,
                2,
                &info_bytes[32768..]
            ),
            MetadataDelivery::Installed
        );
        assert!(torrent.has_metadata());
    }

    #[test]
    fn test_install_retries_after_parse_failure() {
        let root = tempfile::tempdir().unwrap();
        let mut session = session(root.path());
        // bytes that hash correctly but are not bencode
        let garbage = vec![0x01; 100];
        let mut torrent = magnet_torrent_for(&mut session, &garbage);

        assert!(torrent.set_metadata_size_hint(100));
        assert_eq!(
            torrent.deliver_metadata_piece(&mut session, 0, &garbage),
            MetadataDelivery::Retrying
        );
        assert!(!torrent.has_metadata());
        assert_eq!(torrent.missing_metadata_piece_count(), 1);
        assert!(torrent.local_error().is_none());
    }

    #[test]
    fn test_install_faults_torrent_on_unusable_piece_size() {
        let root = tempfile::tempdir().unwrap();
        let mut session = session(root.path());

        // a valid info dict whose piece length no block length divides
        let mut dict = HashMap::new();
        dict.insert(b"length".to_vec(), Value::Int(16385));
        dict.insert(b"name".to_vec(), Value::Bytes(b"broken".to_vec()));
        dict.insert(b"piece length".to_vec(), Value::Int(16385));
        dict.insert(b"pieces".to_vec(), Value::Bytes(vec![0; 20]));
        let info_bytes = serde_bencode::to_bytes(&Value::Dict(dict)).unwrap();

        let mut torrent = magnet_torrent_for(&mut session, &info_bytes);
        assert!(torrent.set_metadata_size_hint(info_bytes.len() as i64));
        assert_eq!(
            torrent.deliver_metadata_piece(&mut session, 0, &info_bytes),
            MetadataDelivery::Retrying
        );

        assert!(!torrent.has_metadata());
        assert!(torrent.local_error().is_some());
        // acquisition is back at square one
        assert_eq!(torrent.missing_metadata_piece_count(), 1);
    }

    #[test]
    fn test_metadata_piece_from_file_created_torrent() {
        let root = tempfile::tempdir().unwrap();
        let mut session = session(root.path());
        let mut torrent = archive_torrent(
            &mut session,
            16384,
            &[("a", 16384), ("b", 16384)],
        );

        let expected_len = torrent.metainfo().unwrap().info_len;
        let piece = torrent.metadata_piece(&session, 0).unwrap();
        assert_eq!(piece.len(), expected_len.min(METADATA_PIECE_LEN));

        // the served bytes hash to the torrent's identity
        assert_eq!(
            crate::metainfo::raw::info_hash_of(&piece),
            *torrent.info_hash()
        );
        assert_eq!(torrent.metadata_piece(&session, 1), None);
    }
}
