//! Integration orchestrator (spec §4.9, C9): wires the collapse gate,
//! recovery gate, and conservator into one admission pipeline and records
//! every step as an immutable [`Journey`].

mod error;
mod journey;
mod orchestrator;

pub use error::{OrchestratorError, Result};
pub use journey::{AdmissionStatus, Journey, JourneyEntry, JourneyTransition};
pub use orchestrator::Orchestrator;
