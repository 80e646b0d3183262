//! The bit-chain: an immutable record addressed by a STAT7 coordinate
//! (spec §3/§4.2, C2).

use crate::canonical::{canonical_bytes, normalize_f64, CanonicalValue, ToCanonical};
use crate::coord::{Address, Coord};
use crate::error::Result;
use crate::tags::Horizon;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content hash of `(coord, payload)` — the bit-chain's identity.
///
/// Unlike [`Address`] (which hashes only the coordinate), `BitChainId`
/// hashes the payload too, so `put` is idempotent by content: the same
/// payload under the same coordinate always produces the same id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitChainId(#[serde(with = "serde_bytes_32")] pub [u8; 32]);

mod serde_bytes_32 {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let v: Vec<u8> = serde::Deserialize::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected exactly 32 bytes"))
    }
}

impl BitChainId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| crate::error::Error::Canonicalization(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(crate::error::Error::Canonicalization(format!(
                "bitchain id must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(BitChainId(out))
    }
}

impl fmt::Debug for BitChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitChainId({})", self.to_hex())
    }
}

impl fmt::Display for BitChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Lifecycle state of a bit-chain, mirroring [`Horizon`] (spec §3/§4.2).
///
/// Kept as its own enum (rather than reusing `Horizon` directly) because a
/// bit-chain's `status` can be advanced by the store independently of the
/// coordinate's `horizon` field at the moment of creation — `set_status`
/// mutates only this shadow, never the coordinate or address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Genesis,
    Emergence,
    Peak,
    Decay,
    Crystallization,
    Archived,
}

impl From<Horizon> for Status {
    fn from(h: Horizon) -> Self {
        match h {
            Horizon::Genesis => Status::Genesis,
            Horizon::Emergence => Status::Emergence,
            Horizon::Peak => Status::Peak,
            Horizon::Decay => Status::Decay,
            Horizon::Crystallization => Status::Crystallization,
            Horizon::Archived => Status::Archived,
        }
    }
}

impl Status {
    /// Archived records are excluded by default from retrieval (spec §3).
    pub fn is_archived(&self) -> bool {
        matches!(self, Status::Archived)
    }
}

/// The minimal immutable record addressed by a STAT7 coordinate (spec §3).
///
/// `payload` and `coord` never change after construction; only `heat` and
/// `status` are mutated in place, and only through [`BitChain::set_status`]
/// / [`BitChain::refresh_heat`] — never by reassigning the struct wholesale,
/// so the `id` (a content hash) always remains valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitChain {
    pub id: BitChainId,
    pub coord: Coord,
    pub payload: Payload,
    pub created_at: Timestamp,
    pub lineage_parent_id: Option<BitChainId>,
    pub provenance_chain: Vec<BitChainId>,
    pub heat: f64,
    pub status: Status,
    pub signature: Option<Vec<u8>>,
}

/// Opaque payload bytes plus an optional text projection used by the
/// embedding provider and retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub text: Option<String>,
}

impl Payload {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Payload {
            bytes: text.clone().into_bytes(),
            text: Some(text),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Payload { bytes, text: None }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl ToCanonical for Payload {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object()
            .field("bytes_sha256", CanonicalValue::Str(hex::encode(Sha256::digest(&self.bytes))))
            .field(
                "text",
                match &self.text {
                    Some(t) => CanonicalValue::Str(t.clone()),
                    None => CanonicalValue::Null,
                },
            )
            .build()
    }
}

impl BitChain {
    /// Construct a new bit-chain. `heat` starts at `coord.luminosity`
    /// (spec §3: "heat, derived from luminosity + recency").
    pub fn new(
        coord: Coord,
        payload: Payload,
        lineage_parent_id: Option<BitChainId>,
        provenance_chain: Vec<BitChainId>,
        signature: Option<Vec<u8>>,
    ) -> Result<Self> {
        let id = content_id(&coord, &payload);
        Ok(BitChain {
            id,
            status: Status::from(coord.horizon),
            heat: coord.luminosity,
            coord,
            payload,
            created_at: Timestamp::now(),
            lineage_parent_id,
            provenance_chain,
            signature,
        })
    }

    /// Mutate only the status shadow; never touches `coord` or `id`.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Recompute `heat` from the current luminosity and elapsed idle time,
    /// applying the same exponential decay the anchor graph uses for heat
    /// (spec §4.4): `heat <- heat * exp(-lambda * dt)`.
    pub fn refresh_heat(&mut self, now: Timestamp, lambda: f64) -> Result<()> {
        let dt_secs = ((now.unix_millis() - self.created_at.unix_millis()).max(0) as f64) / 1000.0;
        let decayed = self.heat * (-lambda * dt_secs).exp();
        self.heat = normalize_f64("heat", decayed)?;
        Ok(())
    }
}

/// `content_id(coord, payload) -> BitChainId`: `SHA-256(canonical(coord) ‖
/// canonical(payload))`. Two identical payloads under two distinct
/// coordinates necessarily produce distinct ids, which is what lets the
/// store detect `DuplicateContentDifferentCoord` (spec §4.2) by comparing
/// the payload hash independent of the coord.
pub fn content_id(coord: &Coord, payload: &Payload) -> BitChainId {
    let mut bytes = canonical_bytes(coord);
    bytes.extend(canonical_bytes(payload));
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    BitChainId(out)
}

/// `SHA-256` of the raw payload bytes alone — used by the store to detect
/// the same content arriving under two different coordinates, independent
/// of which coordinate was used.
pub fn payload_hash(payload: &Payload) -> [u8; 32] {
    let digest = Sha256::digest(&payload.bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{Horizon, Polarity, Realm};

    fn coord() -> Coord {
        Coord::new(Realm::Data, 1, 50.0, Horizon::Genesis, 10.0, Polarity::P0, 0).unwrap()
    }

    #[test]
    fn put_is_content_addressed() {
        let bc1 = BitChain::new(coord(), Payload::from_text("hello"), None, vec![], None).unwrap();
        let bc2 = BitChain::new(coord(), Payload::from_text("hello"), None, vec![], None).unwrap();
        assert_eq!(bc1.id, bc2.id);
    }

    #[test]
    fn different_coord_changes_id_for_same_payload() {
        let mut other = coord();
        other.lineage = 2;
        let bc1 = BitChain::new(coord(), Payload::from_text("hello"), None, vec![], None).unwrap();
        let bc2 = BitChain::new(other, Payload::from_text("hello"), None, vec![], None).unwrap();
        assert_ne!(bc1.id, bc2.id);
        assert_eq!(payload_hash(&bc1.payload), payload_hash(&bc2.payload));
    }

    #[test]
    fn heat_starts_at_luminosity() {
        let bc = BitChain::new(coord(), Payload::from_text("hi"), None, vec![], None).unwrap();
        assert_eq!(bc.heat, 10.0);
    }

    #[test]
    fn status_mirrors_horizon_at_creation() {
        let bc = BitChain::new(coord(), Payload::from_text("hi"), None, vec![], None).unwrap();
        assert_eq!(bc.status, Status::Genesis);
    }
}
