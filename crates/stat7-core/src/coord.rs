//! The STAT7 coordinate and its address (spec §3, C1).

use crate::canonical::{canonical_bytes, normalize_f64, CanonicalValue, ToCanonical};
use crate::error::{Error, Result};
use crate::tags::{Horizon, Polarity, Realm};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The seven-dimensional STAT7 coordinate (spec §3 table).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub realm: Realm,
    pub lineage: u64,
    pub adjacency: f64,
    pub horizon: Horizon,
    pub luminosity: f64,
    pub polarity: Polarity,
    pub dimensionality: u32,
}

impl Coord {
    /// `make_coord` — validate and quantize raw fields into a `Coord`.
    ///
    /// Fails with [`Error::OutOfRange`]/[`Error::NotFinite`] if `adjacency`
    /// or `luminosity` are not finite numbers in `[0, 100]`. Validity of the
    /// `realm`/`horizon`/`polarity` tags is enforced at parse time by their
    /// `FromStr` implementations, so by the time a `Coord` exists those
    /// fields are already well-formed.
    pub fn new(
        realm: Realm,
        lineage: u64,
        adjacency: f64,
        horizon: Horizon,
        luminosity: f64,
        polarity: Polarity,
        dimensionality: u32,
    ) -> Result<Self> {
        let adjacency = validate_percent("adjacency", adjacency)?;
        let luminosity = validate_percent("luminosity", luminosity)?;
        Ok(Coord {
            realm,
            lineage,
            adjacency,
            horizon,
            luminosity,
            polarity,
            dimensionality,
        })
    }

    /// Build a `Coord` without range-checking `adjacency`/`luminosity`
    /// against `[0, 100]` — only NaN/Inf are rejected.
    ///
    /// This exists solely for the admission ingress path (spec §4.6/§4.8):
    /// an incoming record's claimed coordinate may be out of range before
    /// the WFC collapse gate and conservator have had a chance to flag and
    /// repair it, and `address`/`canonicalize` must still be callable on
    /// that not-yet-valid candidate (the address-uniqueness invariant I2
    /// makes no claim about validity, only about distinctness). Everywhere
    /// else in the system, prefer [`Coord::new`].
    pub fn from_raw_unchecked(
        realm: Realm,
        lineage: u64,
        adjacency: f64,
        horizon: Horizon,
        luminosity: f64,
        polarity: Polarity,
        dimensionality: u32,
    ) -> Result<Self> {
        Ok(Coord {
            realm,
            lineage,
            adjacency: normalize_f64("adjacency", adjacency)?,
            horizon,
            luminosity: normalize_f64("luminosity", luminosity)?,
            polarity,
            dimensionality,
        })
    }

    /// Whether this coordinate is the reserved LUCA ground state (I3).
    pub fn is_luca(&self) -> bool {
        self.lineage == 0
    }

    /// Whether `adjacency`/`luminosity` both fall within the valid
    /// `[0, 100]` grid (spec §3). A coordinate built via [`Coord::new`] is
    /// always valid; one built via [`Coord::from_raw_unchecked`] may not
    /// be, which is exactly the signal the WFC gate and conservator act on.
    pub fn is_range_valid(&self) -> bool {
        (0.0..=100.0).contains(&self.adjacency) && (0.0..=100.0).contains(&self.luminosity)
    }

    /// `canonicalize(coord) -> bytes`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_bytes(self)
    }

    /// `address(coord) -> 32-byte digest`, SHA-256 of the canonical bytes
    /// (spec §3: "The address is SHA-256(canonical-serialization)").
    pub fn address(&self) -> Address {
        let digest = Sha256::digest(self.canonical_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Address(bytes)
    }
}

fn validate_percent(field: &'static str, v: f64) -> Result<f64> {
    let v = normalize_f64(field, v)?;
    if !(0.0..=100.0).contains(&v) {
        return Err(Error::OutOfRange { field, value: v });
    }
    Ok(v)
}

impl ToCanonical for Coord {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object()
            .field("adjacency", CanonicalValue::Float(self.adjacency))
            .field("dimensionality", CanonicalValue::Int(self.dimensionality as i64))
            .field("horizon", self.horizon.into())
            .field("lineage", CanonicalValue::Int(self.lineage as i64))
            .field("luminosity", CanonicalValue::Float(self.luminosity))
            .field("polarity", self.polarity.into())
            .field("realm", self.realm.into())
            .build()
    }
}

/// A SHA-256 content address, rendered as lowercase hex (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(#[serde(with = "serde_bytes_32")] pub [u8; 32]);

impl Address {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::Canonicalization(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::Canonicalization(format!(
                "address must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Coord {
        Coord::new(
            Realm::Data,
            1,
            50.0,
            Horizon::Genesis,
            10.0,
            Polarity::P0,
            0,
        )
        .unwrap()
    }

    #[test]
    fn address_is_deterministic() {
        let c = sample();
        assert_eq!(c.address(), c.address());
    }

    #[test]
    fn luminosity_grid_distinguishes_near_zero_values() {
        // spec §4.1 edge case: 0.0 and 0.00000001 must hash differently.
        let a = Coord::new(Realm::Data, 1, 50.0, Horizon::Genesis, 0.0, Polarity::P0, 0).unwrap();
        let b = Coord::new(
            Realm::Data,
            1,
            50.0,
            Horizon::Genesis,
            0.00000001,
            Polarity::P0,
            0,
        )
        .unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn out_of_range_adjacency_is_rejected() {
        let err = Coord::new(Realm::Data, 1, 500.0, Horizon::Genesis, 10.0, Polarity::P0, 0);
        assert!(matches!(err, Err(Error::OutOfRange { field: "adjacency", .. })));
    }

    #[test]
    fn lineage_zero_is_luca() {
        let luca = Coord::new(Realm::Data, 0, 0.0, Horizon::Genesis, 0.0, Polarity::P0, 0).unwrap();
        assert!(luca.is_luca());
        assert!(!sample().is_luca());
    }

    #[test]
    fn different_coords_produce_different_addresses() {
        let a = sample();
        let mut b = sample();
        b.lineage = 2;
        assert_ne!(a.address(), b.address());
    }
}
