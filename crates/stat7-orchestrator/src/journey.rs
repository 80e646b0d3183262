//! The journey: an immutable, hash-chained, non-repudiable audit trail of
//! one admission attempt (spec §4.9).
//!
//! `ENTRY -> COLLAPSED{BOUND|ESCAPED} -> (GATED|REPAIRED) -> ROUTED{...}`,
//! every transition timestamped in ISO-8601 UTC, carrying the C6 report,
//! C7 reason, and C8 actions it names.

use serde::{Deserialize, Serialize};
use stat7_core::canonical::{CanonicalValue, ToCanonical};
use stat7_core::Timestamp;
use stat7_firewall::{CollapseReport, RepairAction};

/// Final admission status codes (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionStatus {
    LucaRegistered,
    RejectedAuth,
    RejectedPolicy,
    RejectedPresence,
    EscapedNotRepaired,
    RepairedAndRegistered,
    Unrecoverable,
}

impl AdmissionStatus {
    /// The canonical spec-string spelling (e.g. `LUCA_REGISTERED`), used on
    /// the wire and in journey canonicalization.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionStatus::LucaRegistered => "LUCA_REGISTERED",
            AdmissionStatus::RejectedAuth => "REJECTED_AUTH",
            AdmissionStatus::RejectedPolicy => "REJECTED_POLICY",
            AdmissionStatus::RejectedPresence => "REJECTED_PRESENCE",
            AdmissionStatus::EscapedNotRepaired => "ESCAPED_NOT_REPAIRED",
            AdmissionStatus::RepairedAndRegistered => "REPAIRED_AND_REGISTERED",
            AdmissionStatus::Unrecoverable => "UNRECOVERABLE",
        }
    }

    /// Whether this status represents a successful admission (spec §4.9 /
    /// §6: 200 on `LUCA_REGISTERED`/`REPAIRED_AND_REGISTERED`).
    pub fn is_success(&self) -> bool {
        matches!(self, AdmissionStatus::LucaRegistered | AdmissionStatus::RepairedAndRegistered)
    }

    /// HTTP status code mapping (spec §6 Admission RPC).
    pub fn http_status(&self) -> u16 {
        match self {
            AdmissionStatus::LucaRegistered | AdmissionStatus::RepairedAndRegistered => 200,
            AdmissionStatus::RejectedAuth => 401,
            AdmissionStatus::RejectedPolicy => 403,
            AdmissionStatus::Unrecoverable => 409,
            AdmissionStatus::RejectedPresence => 422,
            AdmissionStatus::EscapedNotRepaired => 422,
        }
    }
}

impl std::fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One transition in a journey (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JourneyTransition {
    Entry { bitchain_id: String, requester_id: String, intent: String },
    Collapsed { report: CollapseReport },
    Gated { passed: bool, reason: Option<String> },
    Repaired { actions: Vec<RepairAction> },
    Routed { status: AdmissionStatus },
    Cancelled { reason: String },
}

impl JourneyTransition {
    fn kind(&self) -> &'static str {
        match self {
            JourneyTransition::Entry { .. } => "ENTRY",
            JourneyTransition::Collapsed { .. } => "COLLAPSED",
            JourneyTransition::Gated { .. } => "GATED",
            JourneyTransition::Repaired { .. } => "REPAIRED",
            JourneyTransition::Routed { .. } => "ROUTED",
            JourneyTransition::Cancelled { .. } => "CANCELLED",
        }
    }
}

/// One timestamped entry in the journey's ordered trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyEntry {
    pub timestamp: Timestamp,
    pub transition: JourneyTransition,
}

/// The immutable, ordered audit trail of one admission attempt (spec
/// §4.9). Exportable as canonical JSON and content-hashed; within one
/// admission, entries are strictly ordered (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journey {
    pub journey_id: String,
    pub entries: Vec<JourneyEntry>,
}

impl Journey {
    pub fn new(journey_id: String) -> Self {
        Journey {
            journey_id,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, transition: JourneyTransition) {
        self.entries.push(JourneyEntry {
            timestamp: Timestamp::now(),
            transition,
        });
    }

    /// The final routed status, if the journey has reached `ROUTED` (spec
    /// §8 P-JOURNEY-COMPLETE: "every admission result has a journey whose
    /// final state matches the returned status").
    pub fn final_status(&self) -> Option<AdmissionStatus> {
        self.entries.iter().rev().find_map(|e| match &e.transition {
            JourneyTransition::Routed { status } => Some(*status),
            _ => None,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.entries.iter().any(|e| matches!(e.transition, JourneyTransition::Cancelled { .. }))
    }
}

impl ToCanonical for Journey {
    fn to_canonical(&self) -> CanonicalValue {
        let entries = self
            .entries
            .iter()
            .map(|e| {
                CanonicalValue::object()
                    .field("kind", CanonicalValue::Str(e.transition.kind().to_string()))
                    .field("timestamp", CanonicalValue::Str(e.timestamp.to_canonical_string()))
                    .field("detail", CanonicalValue::Str(format!("{:?}", e.transition)))
                    .build()
            })
            .collect();
        CanonicalValue::object()
            .field("entries", CanonicalValue::Array(entries))
            .field("journey_id", CanonicalValue::Str(self.journey_id.clone()))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_status_reflects_last_routed_transition() {
        let mut j = Journey::new("j1".to_string());
        j.push(JourneyTransition::Entry {
            bitchain_id: "bc1".to_string(),
            requester_id: "alice".to_string(),
            intent: "write".to_string(),
        });
        j.push(JourneyTransition::Routed { status: AdmissionStatus::LucaRegistered });
        assert_eq!(j.final_status(), Some(AdmissionStatus::LucaRegistered));
    }

    #[test]
    fn status_strings_match_spec_spelling() {
        assert_eq!(AdmissionStatus::LucaRegistered.as_str(), "LUCA_REGISTERED");
        assert_eq!(AdmissionStatus::RejectedPresence.as_str(), "REJECTED_PRESENCE");
        assert_eq!(AdmissionStatus::Unrecoverable.as_str(), "UNRECOVERABLE");
    }

    #[test]
    fn http_status_mapping_matches_spec_table() {
        assert_eq!(AdmissionStatus::LucaRegistered.http_status(), 200);
        assert_eq!(AdmissionStatus::RejectedAuth.http_status(), 401);
        assert_eq!(AdmissionStatus::RejectedPolicy.http_status(), 403);
        assert_eq!(AdmissionStatus::Unrecoverable.http_status(), 409);
        assert_eq!(AdmissionStatus::RejectedPresence.http_status(), 422);
    }
}
