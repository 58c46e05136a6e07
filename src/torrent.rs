use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use serde_bencode::value::Value;
use url::Url;

use crate::{
    conf::Conf, error::*, magnet::MagnetLink, metadata::IncompleteMetadata,
    metainfo::Metainfo, session::Session, storage_info::StorageInfo, Bitfield,
    FileIndex, PieceIndex, Sha1Hash, TorrentId,
};

/// A sticky torrent level fault, raised by the first failed write.
///
/// While set, all further writes to the torrent are refused; the embedding
/// session decides when the underlying condition is resolved and clears it.
#[derive(Clone, Debug)]
pub struct LocalError {
    /// The file the failing operation touched.
    pub path: PathBuf,
    /// Description of the underlying failure.
    pub message: String,
}

impl fmt::Display for LocalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.path)
    }
}

/// A torrent, either fully described by its metainfo or, when created from
/// a magnet link, known only by its info hash until the metadata exchange
/// reassembles the info dictionary.
///
/// The torrent owns its layout, its piece digest table, and the incomplete
/// metadata bookkeeping; the session owns everything shared across torrents.
pub struct Torrent {
    pub(crate) id: TorrentId,
    pub(crate) info_hash: Sha1Hash,
    /// The torrent's name. For magnet created torrents this starts out as
    /// the display name hint (or the hex info hash) and is replaced by the
    /// real name once the metadata is installed.
    pub(crate) name: String,
    pub(crate) trackers: Vec<Url>,
    pub(crate) webseeds: Vec<String>,
    pub(crate) metainfo: Option<Metainfo>,
    pub(crate) storage: Option<StorageInfo>,
    /// Present only while the info dictionary is being fetched from peers.
    pub(crate) incomplete_metadata: Option<IncompleteMetadata>,
    pub(crate) local_error: Option<LocalError>,
    /// One bit per piece that has been downloaded and verified.
    pub(crate) completed_pieces: Bitfield,
    /// Set when in-memory state diverges from the persisted files.
    pub(crate) is_dirty: bool,
    /// Set when the persisted container no longer matches what the torrent
    /// was created from.
    pub(crate) is_edited: bool,
    /// Set when the torrent's files must be re-verified against the piece
    /// digests, e.g. right after metadata installation.
    pub(crate) needs_recheck: bool,
    /// Lazily computed byte offset and length of the info dictionary within
    /// the persisted container file.
    pub(crate) info_dict_location: Option<(u64, usize)>,
}

impl Torrent {
    /// Creates a fully described torrent from the bytes of a metainfo
    /// container, persisting the container under the session's metainfo
    /// directory.
    pub fn from_metainfo_bytes(
        session: &mut Session,
        bytes: &[u8],
    ) -> Result<Self> {
        let metainfo = Metainfo::from_bytes(bytes)?;
        let storage =
            StorageInfo::new(&metainfo, session.conf.download_dir.clone());
        let torrent = Self {
            id: session.next_torrent_id(),
            info_hash: metainfo.info_hash,
            name: metainfo.name.clone(),
            trackers: metainfo.trackers.clone(),
            webseeds: metainfo.webseeds.clone(),
            completed_pieces: Bitfield::repeat(false, storage.piece_count),
            storage: Some(storage),
            metainfo: Some(metainfo),
            incomplete_metadata: None,
            local_error: None,
            is_dirty: false,
            is_edited: false,
            needs_recheck: false,
            info_dict_location: None,
        };
        torrent.save_container(&session.conf, bytes)?;
        Ok(torrent)
    }

    /// Creates a metadata-less torrent from a magnet link.
    ///
    /// A skeleton container carrying the magnet's discovery hints is
    /// persisted right away, so that the metadata installer always has
    /// a container to merge the info dictionary into.
    pub fn from_magnet(
        session: &mut Session,
        link: &MagnetLink,
    ) -> Result<Self> {
        let name = link
            .name
            .clone()
            .unwrap_or_else(|| hex::encode(link.info_hash));

        let mut trackers = Vec::new();
        for tracker in &link.trackers {
            match Url::parse(tracker) {
                Ok(url) => trackers.push(url),
                Err(e) => {
                    log::warn!("Skipping magnet tracker {:?}: {}", tracker, e)
                }
            }
        }

        let torrent = Self {
            id: session.next_torrent_id(),
            info_hash: link.info_hash,
            name,
            trackers,
            webseeds: link.webseeds.clone(),
            metainfo: None,
            storage: None,
            incomplete_metadata: None,
            local_error: None,
            completed_pieces: Bitfield::new(),
            is_dirty: false,
            is_edited: false,
            needs_recheck: false,
            info_dict_location: None,
        };
        let skeleton = torrent.skeleton_container()?;
        torrent.save_container(&session.conf, &skeleton)?;
        Ok(torrent)
    }

    pub fn id(&self) -> TorrentId {
        self.id
    }

    pub fn info_hash(&self) -> &Sha1Hash {
        &self.info_hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the torrent's info dictionary is known. Piece IO is
    /// only possible once this is true.
    pub fn has_metadata(&self) -> bool {
        self.metainfo.is_some()
    }

    pub fn metainfo(&self) -> Option<&Metainfo> {
        self.metainfo.as_ref()
    }

    pub fn storage(&self) -> Option<&StorageInfo> {
        self.storage.as_ref()
    }

    /// Returns the expected SHA-1 digest of the piece at the given index.
    pub fn piece_hash(&self, index: PieceIndex) -> Option<Sha1Hash> {
        self.metainfo.as_ref()?.piece_hash(index)
    }

    /// Renders the torrent's identity as a magnet link.
    pub fn magnet_link(&self) -> MagnetLink {
        MagnetLink {
            info_hash: self.info_hash,
            name: Some(self.name.clone()).filter(|name| !name.is_empty()),
            trackers: self
                .trackers
                .iter()
                .map(|url| url.as_str().to_string())
                .collect(),
            webseeds: self.webseeds.clone(),
        }
    }

    pub fn local_error(&self) -> Option<&LocalError> {
        self.local_error.as_ref()
    }

    /// Faults the torrent. Only the first fault is recorded; later ones are
    /// dropped until the error is cleared.
    pub(crate) fn set_local_error(
        &mut self,
        path: PathBuf,
        error: &dyn fmt::Display,
    ) {
        if self.local_error.is_some() {
            return;
        }
        let error = LocalError {
            path,
            message: error.to_string(),
        };
        log::error!("Torrent {} local error: {}", self.id, error);
        self.local_error = Some(error);
    }

    /// Clears the torrent's fault, re-enabling writes.
    pub fn clear_local_error(&mut self) {
        self.local_error = None;
    }

    /// Records that the piece was downloaded and passed verification.
    pub fn mark_piece_complete(&mut self, index: PieceIndex) {
        if index < self.completed_pieces.len() {
            self.completed_pieces.set(index, true);
            self.is_dirty = true;
        }
    }

    pub fn has_piece(&self, index: PieceIndex) -> bool {
        self.completed_pieces
            .get(index)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.has_metadata() && self.completed_pieces.all()
    }

    /// Excludes a file from, or re-includes it in, the download.
    pub fn set_file_dnd(&mut self, file_index: FileIndex, is_dnd: bool) {
        if let Some(storage) = &mut self.storage {
            if let Some(file) = storage.files.get_mut(file_index) {
                file.is_dnd = is_dnd;
                self.is_dirty = true;
            }
        }
    }

    /// Whether in-memory state has changed since the last resume save.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Whether the persisted container differs from what the torrent was
    /// created from (e.g. magnet metadata was installed).
    pub fn is_edited(&self) -> bool {
        self.is_edited
    }

    /// Returns true once if the torrent's files must be re-verified against
    /// the piece digests. The embedding session is expected to poll this
    /// after feeding metadata pieces and run a stop + verify cycle.
    pub fn take_recheck_request(&mut self) -> bool {
        std::mem::take(&mut self.needs_recheck)
    }

    /// The path of the torrent's persisted metainfo container.
    pub fn container_path(&self, conf: &Conf) -> PathBuf {
        conf.metainfo_dir
            .join(format!("{}.torrent", hex::encode(self.info_hash)))
    }

    /// The path of the torrent's persisted download progress.
    pub fn resume_path(&self, conf: &Conf) -> PathBuf {
        conf.metainfo_dir
            .join(format!("{}.resume", hex::encode(self.info_hash)))
    }

    /// Persists the container bytes, atomically replacing any previous
    /// container of this torrent.
    pub(crate) fn save_container(
        &self,
        conf: &Conf,
        bytes: &[u8],
    ) -> Result<()> {
        fs::create_dir_all(&conf.metainfo_dir)?;
        write_file_atomic(&self.container_path(conf), bytes)?;
        Ok(())
    }

    /// Removes the torrent's resume file, if any.
    pub(crate) fn remove_resume(&self, conf: &Conf) {
        let path = self.resume_path(conf);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove resume file {:?}: {}", path, e);
            }
        }
    }

    /// Persists the torrent's download progress.
    pub fn save_resume(&mut self, conf: &Conf) -> Result<()> {
        let piece_count = self.completed_pieces.len();
        let mut pieces = vec![0u8; (piece_count + 7) / 8];
        for (index, bit) in self.completed_pieces.iter().enumerate() {
            if *bit {
                pieces[index / 8] |= 0x80 >> (index % 8);
            }
        }
        let resume = RawResume { pieces };
        fs::create_dir_all(&conf.metainfo_dir)?;
        write_file_atomic(
            &self.resume_path(conf),
            &serde_bencode::to_bytes(&resume)?,
        )?;
        self.is_dirty = false;
        Ok(())
    }

    /// Restores the torrent's download progress from its resume file.
    /// Missing or short resume data leaves the remaining pieces incomplete.
    pub fn load_resume(&mut self, conf: &Conf) -> Result<()> {
        let bytes = fs::read(self.resume_path(conf))?;
        let resume: RawResume = serde_bencode::from_bytes(&bytes)?;
        for index in 0..self.completed_pieces.len() {
            let bit = resume
                .pieces
                .get(index / 8)
                .map(|byte| byte & (0x80 >> (index % 8)) != 0)
                .unwrap_or_default();
            self.completed_pieces.set(index, bit);
        }
        Ok(())
    }

    /// Builds the minimal container persisted for a magnet created torrent:
    /// just the discovery hints, with the `info` key to be merged in by the
    /// metadata installer.
    fn skeleton_container(&self) -> Result<Vec<u8>> {
        let mut dict = HashMap::new();
        if let Some(first) = self.trackers.first() {
            dict.insert(
                b"announce".to_vec(),
                Value::Bytes(first.as_str().as_bytes().to_vec()),
            );
            let tiers = self
                .trackers
                .iter()
                .map(|url| {
                    Value::List(vec![Value::Bytes(
                        url.as_str().as_bytes().to_vec(),
                    )])
                })
                .collect();
            dict.insert(b"announce-list".to_vec(), Value::List(tiers));
        }
        if !self.webseeds.is_empty() {
            let webseeds = self
                .webseeds
                .iter()
                .map(|url| Value::Bytes(url.as_bytes().to_vec()))
                .collect();
            dict.insert(b"url-list".to_vec(), Value::List(webseeds));
        }
        Ok(serde_bencode::to_bytes(&Value::Dict(dict))?)
    }
}

impl fmt::Debug for Torrent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Torrent")
            .field("id", &self.id)
            .field("info_hash", &hex::encode(self.info_hash))
            .field("name", &self.name)
            .field("has_metadata", &self.has_metadata())
            .finish()
    }
}

/// The serde image of the resume file.
#[derive(Serialize, Deserialize)]
struct RawResume {
    /// One bit per piece, most significant bit first, set for pieces that
    /// are downloaded and verified.
    #[serde(with = "serde_bytes")]
    pieces: Vec<u8>,
}

/// Writes the bytes to a sibling temporary file first and moves it over the
/// target, so the target never holds a half written state.
fn write_file_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
