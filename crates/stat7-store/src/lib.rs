//! Embedded persistence layer (spec §6 "Persistence layout"): one `sled`
//! tree per top-level root (`anchors/`, `bitchains/`, `journeys/`, plus
//! `metadata`), wrapped the way `gossipd::storage::Storage` wraps its trees.
//!
//! `stat7-store` depends only on `stat7-core` (for [`BitChain`], whose type
//! is shared) — the anchor and journey record types live in their owning
//! crates (`stat7-anchor`, `stat7-orchestrator`) and are stored through the
//! generic `put_anchor`/`get_anchor`/`append_journey` methods below, so this
//! crate never depends upward on them.

mod error;
mod journeys;

pub use error::{Result, StorageError};
pub use journeys::{JournalEntry, JourneyChain};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use stat7_core::{BitChain, BitChainId};
use std::path::Path;

/// The three persistence roots from spec §6, plus `metadata`.
pub struct Store {
    db: Db,
    bitchains: Tree,
    /// Maps payload content hash -> the single coord address it was first
    /// seen under, to detect `DuplicateContentDifferentCoord` (spec §4.2).
    content_index: Tree,
    anchors: Tree,
    journeys_by_id: Tree,
    journeys_log: Tree,
    metadata: Tree,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Store {
            bitchains: db.open_tree("bitchains")?,
            content_index: db.open_tree("bitchains_content_index")?,
            anchors: db.open_tree("anchors")?,
            journeys_by_id: db.open_tree("journeys_by_id")?,
            journeys_log: db.open_tree("journeys_log")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    /// In-memory store for tests (spec harness / unit tests do not need
    /// durability).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Store {
            bitchains: db.open_tree("bitchains")?,
            content_index: db.open_tree("bitchains_content_index")?,
            anchors: db.open_tree("anchors")?,
            journeys_by_id: db.open_tree("journeys_by_id")?,
            journeys_log: db.open_tree("journeys_log")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    // --- bitchains/ -------------------------------------------------

    /// `put(bitchain) -> id`, idempotent by content hash (spec §4.2).
    /// Rejects a payload that was already stored under a different coord
    /// address with [`StorageError::DuplicateContentDifferentCoord`].
    pub fn put_bitchain(&self, bc: &BitChain) -> Result<BitChainId> {
        let payload_hash = stat7_core::bitchain::payload_hash(&bc.payload);
        let this_address = bc.coord.address().to_hex();

        if let Some(existing) = self.content_index.get(payload_hash)? {
            let existing_address = String::from_utf8_lossy(&existing).to_string();
            if existing_address != this_address {
                return Err(StorageError::DuplicateContentDifferentCoord(
                    bc.id.to_hex(),
                ));
            }
        } else {
            self.content_index
                .insert(payload_hash, this_address.as_bytes())?;
        }

        let value = postcard::to_allocvec(bc)?;
        self.bitchains.insert(bc.id.0, value)?;
        Ok(bc.id)
    }

    pub fn get_bitchain(&self, id: &BitChainId) -> Result<Option<BitChain>> {
        match self.bitchains.get(id.0)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains_bitchain(&self, id: &BitChainId) -> Result<bool> {
        Ok(self.bitchains.contains_key(id.0)?)
    }

    /// `list(filter) -> iterator` (spec §4.2). Filtering is left to the
    /// caller (retrieval composes its own predicates); this just iterates
    /// every stored bit-chain in key order.
    pub fn list_bitchains(&self) -> impl Iterator<Item = Result<BitChain>> + '_ {
        self.bitchains.iter().map(|r| {
            let (_, bytes) = r?;
            Ok(postcard::from_bytes(&bytes)?)
        })
    }

    pub fn bitchain_count(&self) -> usize {
        self.bitchains.len()
    }

    // --- anchors/ -----------------------------------------------------
    // Generic over the anchor record type owned by `stat7-anchor`.

    pub fn put_anchor<T: Serialize>(&self, id: &[u8], value: &T) -> Result<()> {
        let bytes = postcard::to_allocvec(value)?;
        self.anchors.insert(id, bytes)?;
        Ok(())
    }

    pub fn get_anchor<T: DeserializeOwned>(&self, id: &[u8]) -> Result<Option<T>> {
        match self.anchors.get(id)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_anchors<T: DeserializeOwned>(&self) -> impl Iterator<Item = Result<(Vec<u8>, T)>> + '_ {
        self.anchors.iter().map(|r| {
            let (key, bytes) = r?;
            let value = postcard::from_bytes(&bytes)?;
            Ok((key.to_vec(), value))
        })
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    // --- journeys/ ------------------------------------------------------

    /// Append a journey to the tamper-evident, hash-chained log and index
    /// it by id for point lookups (spec §4.9/§6).
    pub fn append_journey<T: Serialize + stat7_core::ToCanonical>(
        &self,
        journey_id: &[u8],
        journey: &T,
    ) -> Result<JournalEntry> {
        journeys::append(self, journey_id, journey)
    }

    pub fn get_journey<T: DeserializeOwned>(&self, journey_id: &[u8]) -> Result<Option<T>> {
        match self.journeys_by_id.get(journey_id)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stream all log entries with `seq >= since` in order, for
    /// `GET /journeys?since=...` (spec §6).
    pub fn journeys_since(&self, since_seq: u64) -> impl Iterator<Item = Result<JournalEntry>> + '_ {
        journeys::since(self, since_seq)
    }

    pub fn journey_chain_head(&self) -> Result<JourneyChain> {
        journeys::chain_head(self)
    }

    // --- metadata -------------------------------------------------------

    pub fn put_metadata(&self, key: &str, value: &[u8]) -> Result<()> {
        self.metadata.insert(key, value)?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.metadata.get(key)?.map(|v| v.to_vec()))
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat7_core::{BitChain, Coord, Horizon, Payload, Polarity, Realm};

    fn coord() -> Coord {
        Coord::new(Realm::Data, 1, 50.0, Horizon::Genesis, 10.0, Polarity::P0, 0).unwrap()
    }

    #[test]
    fn put_is_idempotent_by_content() {
        let store = Store::open_temporary().unwrap();
        let bc = BitChain::new(coord(), Payload::from_text("hi"), None, vec![], None).unwrap();
        let id1 = store.put_bitchain(&bc).unwrap();
        let id2 = store.put_bitchain(&bc).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.bitchain_count(), 1);
    }

    #[test]
    fn duplicate_content_different_coord_is_rejected() {
        let store = Store::open_temporary().unwrap();
        let bc1 = BitChain::new(coord(), Payload::from_text("hi"), None, vec![], None).unwrap();
        let mut other = coord();
        other.lineage = 2;
        let bc2 = BitChain::new(other, Payload::from_text("hi"), None, vec![], None).unwrap();

        store.put_bitchain(&bc1).unwrap();
        let err = store.put_bitchain(&bc2);
        assert!(matches!(err, Err(StorageError::DuplicateContentDifferentCoord(_))));
    }

    #[test]
    fn get_roundtrips() {
        let store = Store::open_temporary().unwrap();
        let bc = BitChain::new(coord(), Payload::from_text("hi"), None, vec![], None).unwrap();
        store.put_bitchain(&bc).unwrap();
        let got = store.get_bitchain(&bc.id).unwrap().unwrap();
        assert_eq!(got.id, bc.id);
    }
}
