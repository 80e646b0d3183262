//! STAT7 coordinate system, address derivation, and bit-chain entity types
//! (spec components C1, C2).
//!
//! This crate has no dependency on any other STAT7 crate: every other crate
//! in the workspace builds on top of the [`Coord`], [`Address`], and
//! [`BitChain`] types defined here.

pub mod bitchain;
pub mod canonical;
pub mod coord;
pub mod error;
pub mod tags;
pub mod timestamp;

pub use bitchain::{BitChain, BitChainId, Status};
pub use canonical::{CanonicalValue, ToCanonical};
pub use coord::{Address, Coord};
pub use error::{Error, Result};
pub use tags::{Horizon, Polarity, Realm};
pub use timestamp::Timestamp;
