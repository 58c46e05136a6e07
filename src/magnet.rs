//! Rendering and parsing of magnet links.
//!
//! A magnet link carries a torrent's identity (the info hash) and discovery
//! hints (display name, trackers, web seeds), which is enough to join the
//! swarm and reassemble the info dictionary from peers.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{error::*, Sha1Hash};

/// Everything percent encoded in magnet parameter values: all but the URI
/// unreserved characters.
const ESCAPED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A torrent's identity as carried by a `magnet:` URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MagnetLink {
    /// The torrent's info hash, from the `xt=urn:btih:` parameter.
    pub info_hash: Sha1Hash,
    /// The display name (`dn`), used as the torrent's name until the real
    /// metainfo is known.
    pub name: Option<String>,
    /// Tracker URLs (`tr`).
    pub trackers: Vec<String>,
    /// Web seed URLs (`ws`).
    pub webseeds: Vec<String>,
}

impl MagnetLink {
    /// Parses a magnet link.
    ///
    /// Only the hex form of the v1 info hash is accepted; a link without an
    /// `xt=urn:btih:` parameter is invalid.
    pub fn parse(link: &str) -> Result<Self> {
        let url = url::Url::parse(link)?;
        if url.scheme() != "magnet" {
            return Err(Error::InvalidMagnet);
        }

        let mut info_hash = None;
        let mut name = None;
        let mut trackers = Vec::new();
        let mut webseeds = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    let hex = value
                        .strip_prefix("urn:btih:")
                        .ok_or(Error::InvalidMagnet)?;
                    let bytes =
                        hex::decode(hex).map_err(|_| Error::InvalidMagnet)?;
                    if bytes.len() != 20 {
                        return Err(Error::InvalidMagnet);
                    }
                    let mut hash = [0; 20];
                    hash.copy_from_slice(&bytes);
                    info_hash = Some(hash);
                }
                "dn" => name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                "ws" => webseeds.push(value.into_owned()),
                _ => {}
            }
        }

        match info_hash {
            Some(info_hash) => Ok(Self {
                info_hash,
                name,
                trackers,
                webseeds,
            }),
            None => Err(Error::InvalidMagnet),
        }
    }
}

impl fmt::Display for MagnetLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "magnet:?xt=urn:btih:{}", hex::encode(self.info_hash))?;
        if let Some(name) = &self.name {
            if !name.is_empty() {
                write!(f, "&dn={}", utf8_percent_encode(name, ESCAPED))?;
            }
        }
        for tracker in &self.trackers {
            write!(f, "&tr={}", utf8_percent_encode(tracker, ESCAPED))?;
        }
        for webseed in &self.webseeds {
            write!(f, "&ws={}", utf8_percent_encode(webseed, ESCAPED))?;
        }
        Ok(())
    }
}
