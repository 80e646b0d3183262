//! The three-layer admission firewall (spec components C6, C7, C8):
//! Julia-set collapse gate -> auth/policy gate -> bounded auto-repair.

mod collapse;
mod conservator;
mod error;
mod recovery;

pub use collapse::{Complex, CollapseReport, CollapseVerdict, WfcGate, DEFAULT_WFC_ITERATIONS};
pub use conservator::{Conservator, RepairAction, RepairResult, RepairSnapshot};
pub use error::{FirewallError, Result};
pub use recovery::{
    AuditEntry, AuditSink, AuthProvider, NullAuditSink, PolicyProvider, RecoveryGate,
    RecoveryOutcome, RequesterId,
};
