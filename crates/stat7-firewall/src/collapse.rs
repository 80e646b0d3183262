//! The WFC collapse gate (spec §4.6, C6): a deterministic Julia-set
//! admission test over `(coord, payload)`, run before the expensive
//! security/policy gate.
//!
//! `velocity`/`density` and the `c`/`z0` derivation are impl-defined per
//! spec §9's open question; SPEC_FULL.md §6 fixes them as normalized
//! projections of `luminosity`/`adjacency` and a BLAKE3 hash of the
//! bit-chain id and coord address respectively.

use serde::{Deserialize, Serialize};
use stat7_core::{BitChainId, Coord};

/// Fixed-point complex number, real/imaginary in `f64`. Hand-rolled rather
/// than pulled from a numerics crate: this is two multiplications and an
/// add, not a numerics library's worth of surface area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Complex { re, im }
    }

    fn squared(self) -> Self {
        Complex::new(self.re * self.re - self.im * self.im, 2.0 * self.re * self.im)
    }

    fn add(self, other: Complex) -> Self {
        Complex::new(self.re + other.re, self.im + other.im)
    }

    pub fn magnitude(self) -> f64 {
        (self.re * self.re + self.im * self.im).sqrt()
    }
}

/// Julia-set admission verdict (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollapseVerdict {
    Bound,
    Escaped {
        /// Iteration index (0-based) at which `|z| > 2` was first observed.
        first_escape_iteration: u32,
    },
}

impl CollapseVerdict {
    pub fn is_bound(&self) -> bool {
        matches!(self, CollapseVerdict::Bound)
    }
}

/// `{result, iterations, final_magnitude, c, z0}` (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollapseReport {
    pub result: CollapseVerdict,
    pub iterations: u32,
    pub final_magnitude: f64,
    pub c: Complex,
    pub z0: Complex,
}

/// Escape threshold: `|z| > 2` at any step means ESCAPED (spec §4.6).
const ESCAPE_RADIUS: f64 = 2.0;

/// The Julia collapse gate. `iterations` MUST be 7 for spec conformance
/// (spec §6 `wfc_iterations`), but is configurable so the experiment
/// harness (EXP-05/EXP-06) can probe other depths.
#[derive(Debug, Clone, Copy)]
pub struct WfcGate {
    pub iterations: u32,
}

/// Default Julia depth (spec §6 `wfc_iterations`, default 7).
pub const DEFAULT_WFC_ITERATIONS: u32 = 7;

impl Default for WfcGate {
    fn default() -> Self {
        WfcGate {
            iterations: DEFAULT_WFC_ITERATIONS,
        }
    }
}

impl WfcGate {
    pub fn new(iterations: u32) -> Self {
        WfcGate { iterations }
    }

    /// `velocity`/`density` derivation (SPEC_FULL.md §6): normalized
    /// projections of luminosity/adjacency onto `[0, 1]`. Both fields are
    /// already quantized to the 8-decimal grid, so this is deterministic.
    fn velocity(coord: &Coord) -> f64 {
        (coord.luminosity / 100.0).clamp(0.0, 1.0)
    }

    fn density(coord: &Coord) -> f64 {
        (coord.adjacency / 100.0).clamp(0.0, 1.0)
    }

    /// Deterministic scalar per polarity tag, impl-defined per spec §9.
    /// `Neutral` sits at the origin; charged polarities spread evenly
    /// across `(0, 1]`; `Inverted` mirrors across zero.
    fn polarity_scalar(polarity: stat7_core::Polarity) -> f64 {
        use stat7_core::Polarity::*;
        match polarity {
            Neutral => 0.0,
            P0 => 0.25,
            P1 => 0.5,
            P2 => 0.75,
            P3 => 1.0,
            Inverted => -1.0,
        }
    }

    /// Derive `c = (polarity_scalar * 0.5) + i * (velocity * density)`
    /// (spec §4.6).
    fn derive_c(coord: &Coord) -> Complex {
        let re = Self::polarity_scalar(coord.polarity) * 0.5;
        let im = Self::velocity(coord) * Self::density(coord);
        Complex::new(re, im)
    }

    /// Derive `z0` from `hash(bitchain_id || coord_address)` normalized to
    /// `[-0.5, 0.5]^2` (spec §4.6): the hash's first 8 bytes drive the real
    /// part, the next 8 the imaginary part.
    fn derive_z0(bitchain_id: &BitChainId, coord_address: &stat7_core::Address) -> Complex {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"stat7-firewall/wfc-z0/v1:");
        hasher.update(&bitchain_id.0);
        hasher.update(&coord_address.to_hex().into_bytes());
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();

        let re_bits = u64::from_be_bytes(bytes[0..8].try_into().expect("8 bytes"));
        let im_bits = u64::from_be_bytes(bytes[8..16].try_into().expect("8 bytes"));
        let re = (re_bits as f64 / u64::MAX as f64) - 0.5;
        let im = (im_bits as f64 / u64::MAX as f64) - 0.5;
        Complex::new(re, im)
    }

    /// Run the collapse test on `(coord, payload)` via the bit-chain's id
    /// (which is already a content hash of coord + payload, spec §4.2) and
    /// the coord's own address. Deterministic, microseconds-cheap, not an
    /// authenticator (spec §4.6 contract).
    pub fn collapse(&self, bitchain_id: &BitChainId, coord: &Coord) -> CollapseReport {
        let c = Self::derive_c(coord);
        let z0 = Self::derive_z0(bitchain_id, &coord.address());

        let mut z = z0;
        let mut escape: Option<u32> = None;
        let mut steps_run = 0u32;

        for step in 0..self.iterations {
            z = z.squared().add(c);
            steps_run = step + 1;
            if z.magnitude() > ESCAPE_RADIUS {
                escape = Some(step);
                break;
            }
        }

        let result = match escape {
            Some(first_escape_iteration) => CollapseVerdict::Escaped { first_escape_iteration },
            None => CollapseVerdict::Bound,
        };

        CollapseReport {
            result,
            iterations: steps_run,
            final_magnitude: z.magnitude(),
            c,
            z0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat7_core::{Horizon, Polarity, Realm};

    fn coord(adjacency: f64, luminosity: f64, polarity: Polarity) -> Coord {
        Coord::new(Realm::Data, 1, adjacency, Horizon::Genesis, luminosity, polarity, 0).unwrap()
    }

    fn bc_id(coord: &Coord) -> BitChainId {
        let payload = stat7_core::bitchain::Payload::from_text("hello");
        stat7_core::bitchain::content_id(coord, &payload)
    }

    #[test]
    fn same_inputs_produce_same_verdict() {
        let c = coord(50.0, 10.0, Polarity::P0);
        let id = bc_id(&c);
        let gate = WfcGate::default();
        let r1 = gate.collapse(&id, &c);
        let r2 = gate.collapse(&id, &c);
        assert_eq!(r1.result, r2.result);
        assert_eq!(r1.final_magnitude, r2.final_magnitude);
    }

    #[test]
    fn default_iterations_is_seven() {
        assert_eq!(WfcGate::default().iterations, 7);
    }

    #[test]
    fn out_of_range_adjacency_analog_triggers_escape_more_often() {
        // A maximal-drive coordinate (full luminosity/adjacency, charged
        // polarity) pushes |z| toward divergence more readily than a
        // near-origin one; this isn't a strict guarantee for every seed,
        // so the test asserts the weaker, always-true contract instead:
        // the gate terminates and reports a magnitude.
        let hot = coord(100.0, 100.0, Polarity::P3);
        let gate = WfcGate::default();
        let id = bc_id(&hot);
        let report = gate.collapse(&id, &hot);
        assert!(report.final_magnitude.is_finite());
        assert!(report.iterations <= 7);
    }

    #[test]
    fn escaped_reports_first_escape_iteration() {
        // Construct a coord whose derived c/z0 is known to escape by
        // brute-force search over polarity/adjacency/luminosity space so
        // the test is not tautological about the implementation.
        let gate = WfcGate::default();
        let mut found = false;
        for adjacency in [10.0, 30.0, 70.0, 100.0] {
            for luminosity in [10.0, 50.0, 90.0] {
                for polarity in Polarity::ALL {
                    let c = coord(adjacency, luminosity, *polarity);
                    let id = bc_id(&c);
                    let report = gate.collapse(&id, &c);
                    if let CollapseVerdict::Escaped { first_escape_iteration } = report.result {
                        assert!(first_escape_iteration < 7);
                        assert!(report.final_magnitude > ESCAPE_RADIUS);
                        found = true;
                    }
                }
            }
        }
        assert!(found, "expected at least one escaped verdict across the swept coordinates");
    }
}
