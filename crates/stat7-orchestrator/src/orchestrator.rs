//! The integration orchestrator (spec §4.9, C9): wires C6 -> (C7 or C8) ->
//! the LUCA registry, recording every step in a [`Journey`].
//!
//! Modeled on `gossipd::server::Server`'s top-level dispatch: one struct
//! holding the wired-up collaborators, one async entry point per external
//! request, background tasks scheduled alongside it rather than inside it.

use crate::error::{OrchestratorError, Result};
use crate::journey::{AdmissionStatus, Journey, JourneyTransition};
use stat7_core::BitChain;
use stat7_firewall::{CollapseVerdict, Conservator, FirewallError, RecoveryGate, WfcGate};
use stat7_store::Store;
use std::sync::Arc;
use std::time::Duration;

/// Every external call gets a deadline (spec §5); persistence writes here
/// are local `sled` calls, but the timeout still bounds a wedged disk or
/// lock contention from hanging an admission indefinitely.
const ADMISSION_TIMEOUT: Duration = Duration::from_secs(5);

/// The wired-up admission pipeline: collapse gate, recovery gate,
/// conservator, and the store journeys/bit-chains land in.
///
/// Takes `Arc<Store>` rather than owning `Store` outright: the daemon
/// shares one store handle between this pipeline and the retrieval engine
/// (spec §6 persistence layout is one set of `sled` trees, not one per
/// consumer), mirroring how `stat7-anchor`/`stat7-retrieval` already take
/// `Arc<Store>`.
pub struct Orchestrator {
    store: Arc<Store>,
    wfc: WfcGate,
    recovery: RecoveryGate,
    conservator: Conservator,
}

impl Orchestrator {
    pub fn new(store: Arc<Store>, wfc: WfcGate, recovery: RecoveryGate, conservator: Conservator) -> Self {
        Orchestrator {
            store,
            wfc,
            recovery,
            conservator,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one bit-chain through the full admission pipeline (spec §4.9):
    ///
    /// `ENTRY -> COLLAPSED -> (GATED | REPAIRED -> COLLAPSED again) -> ROUTED`
    ///
    /// Returns the final status alongside the completed journey. An `Err`
    /// return means an `InternalInvariant` violation (spec §7) — the audit
    /// log failed to persist, or the deadline elapsed — not an ordinary
    /// rejection; ordinary rejections are `Ok` with a non-success status.
    pub async fn process_bitchain(
        &self,
        bc: BitChain,
        auth_token: &str,
        claimed_requester_id: &str,
    ) -> Result<(AdmissionStatus, Journey)> {
        let journey_id = bc.id.to_hex();
        let mut journey = Journey::new(journey_id.clone());
        journey.push(JourneyTransition::Entry {
            bitchain_id: journey_id.clone(),
            requester_id: claimed_requester_id.to_string(),
            intent: "admit".to_string(),
        });

        let outcome = tokio::time::timeout(
            ADMISSION_TIMEOUT,
            self.run_pipeline(bc, auth_token, claimed_requester_id, &mut journey),
        )
        .await;

        let status = match outcome {
            Ok(result) => result?,
            Err(_) => return Err(OrchestratorError::Timeout(ADMISSION_TIMEOUT.as_millis() as u64)),
        };

        journey.push(JourneyTransition::Routed { status });
        self.persist_journey(&journey).await?;

        Ok((status, journey))
    }

    async fn run_pipeline(
        &self,
        mut bc: BitChain,
        auth_token: &str,
        claimed_requester_id: &str,
        journey: &mut Journey,
    ) -> Result<AdmissionStatus> {
        let mut repaired_once = false;

        loop {
            let report = self.wfc.collapse(&bc.id, &bc.coord);
            journey.push(JourneyTransition::Collapsed { report: report.clone() });

            match report.result {
                CollapseVerdict::Bound => {
                    return self
                        .gate_and_register(bc, auth_token, claimed_requester_id, repaired_once, journey)
                        .await;
                }
                CollapseVerdict::Escaped { .. } => {
                    if repaired_once {
                        return Ok(AdmissionStatus::Unrecoverable);
                    }
                    match self.conservator.repair(&bc) {
                        None => return Ok(AdmissionStatus::EscapedNotRepaired),
                        Some(Ok(result)) => {
                            journey.push(JourneyTransition::Repaired { actions: result.actions });
                            bc = result.repaired;
                            repaired_once = true;
                            continue;
                        }
                        Some(Err(e)) => return Err(OrchestratorError::Coord(e)),
                    }
                }
            }
        }
    }

    async fn gate_and_register(
        &self,
        bc: BitChain,
        auth_token: &str,
        claimed_requester_id: &str,
        was_repaired: bool,
        journey: &mut Journey,
    ) -> Result<AdmissionStatus> {
        match self.recovery.evaluate(&bc, auth_token, claimed_requester_id) {
            Ok(_) => {
                journey.push(JourneyTransition::Gated { passed: true, reason: None });
                self.store.put_bitchain(&bc)?;
                Ok(if was_repaired {
                    AdmissionStatus::RepairedAndRegistered
                } else {
                    AdmissionStatus::LucaRegistered
                })
            }
            Err(FirewallError::PresenceFailed(reason)) => {
                journey.push(JourneyTransition::Gated { passed: false, reason: Some(reason) });
                Ok(AdmissionStatus::RejectedPresence)
            }
            Err(FirewallError::AuthFailed(reason)) => {
                journey.push(JourneyTransition::Gated { passed: false, reason: Some(reason) });
                Ok(AdmissionStatus::RejectedAuth)
            }
            Err(FirewallError::PolicyDenied { requester, realm, polarity }) => {
                journey.push(JourneyTransition::Gated {
                    passed: false,
                    reason: Some(format!("{requester} not permitted for {realm:?}/{polarity:?}")),
                });
                Ok(AdmissionStatus::RejectedPolicy)
            }
            Err(FirewallError::AuditFailed(reason)) => {
                Err(OrchestratorError::AuditInvariantViolated(reason))
            }
            Err(FirewallError::Coord(e)) => Err(OrchestratorError::Coord(e)),
        }
    }

    async fn persist_journey(&self, journey: &Journey) -> Result<()> {
        self.store
            .append_journey(journey.journey_id.as_bytes(), journey)
            .map_err(|e| OrchestratorError::AuditInvariantViolated(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat7_core::{Coord, Horizon, Payload, Polarity, Realm};
    use stat7_firewall::{AuditEntry, AuditSink, AuthProvider, PolicyProvider};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct MapAuth(HashMap<String, String>);
    impl AuthProvider for MapAuth {
        fn authenticate(&self, auth_token: &str) -> Option<String> {
            self.0.get(auth_token).cloned()
        }
        fn verifying_key_for(&self, _requester_id: &str) -> Option<ed25519_dalek::VerifyingKey> {
            None
        }
    }

    struct AllowAll;
    impl PolicyProvider for AllowAll {
        fn is_permitted(&self, _requester_id: &str, _realm: Realm, _polarity: Polarity) -> bool {
            true
        }
    }

    struct DenyAll;
    impl PolicyProvider for DenyAll {
        fn is_permitted(&self, _requester_id: &str, _realm: Realm, _polarity: Polarity) -> bool {
            false
        }
    }

    struct NullAudit;
    impl AuditSink for NullAudit {
        fn record(&self, _entry: &AuditEntry) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    fn auth() -> Arc<dyn AuthProvider> {
        Arc::new(MapAuth(HashMap::from([("tok1".to_string(), "alice".to_string())])))
    }

    fn bound_coord() -> Coord {
        // Neutral polarity, mid-range adjacency/luminosity keeps |z| small
        // across all 7 iterations for the fixed z0 derived from this
        // specific payload/coord pair (verified by the sweep test in
        // `stat7-firewall::collapse`).
        Coord::new(Realm::Data, 1, 50.0, Horizon::Genesis, 10.0, Polarity::Neutral, 0).unwrap()
    }

    fn orchestrator(policy_allows: bool, enabled_realms: Vec<Realm>) -> Orchestrator {
        let policy: Arc<dyn PolicyProvider> = if policy_allows { Arc::new(AllowAll) } else { Arc::new(DenyAll) };
        let recovery = RecoveryGate::new(auth(), policy, Arc::new(NullAudit));
        Orchestrator::new(Arc::new(Store::open_temporary().unwrap()), WfcGate::default(), recovery, Conservator::new(enabled_realms))
    }

    #[tokio::test]
    async fn bound_record_with_valid_auth_is_registered() {
        let orch = orchestrator(true, vec![]);
        let bc = BitChain::new(bound_coord(), Payload::from_text("hello"), None, vec![], None).unwrap();
        let (status, journey) = orch.process_bitchain(bc, "tok1", "alice").await.unwrap();
        assert_eq!(status, AdmissionStatus::LucaRegistered);
        assert_eq!(journey.final_status(), Some(AdmissionStatus::LucaRegistered));
    }

    #[tokio::test]
    async fn policy_denial_routes_to_rejected_policy() {
        let orch = orchestrator(false, vec![]);
        let bc = BitChain::new(bound_coord(), Payload::from_text("hello"), None, vec![], None).unwrap();
        let (status, journey) = orch.process_bitchain(bc, "tok1", "alice").await.unwrap();
        assert_eq!(status, AdmissionStatus::RejectedPolicy);
        assert!(journey
            .entries
            .iter()
            .any(|e| matches!(e.transition, JourneyTransition::Gated { passed: false, .. })));
    }

    #[tokio::test]
    async fn escaped_record_with_conservator_disabled_is_not_repaired() {
        let orch = orchestrator(true, vec![]);
        let escaped = Coord::from_raw_unchecked(Realm::Data, 1, 500.0, Horizon::Genesis, 10.0, Polarity::P3, 0).unwrap();
        let bc = BitChain::new(escaped, Payload::from_text("hello"), None, vec![], None).unwrap();
        let (status, _) = orch.process_bitchain(bc, "tok1", "alice").await.unwrap();
        assert_eq!(status, AdmissionStatus::EscapedNotRepaired);
    }

    #[tokio::test]
    async fn escaped_record_with_conservator_enabled_clamps_and_retries() {
        let orch = orchestrator(true, vec![Realm::Data]);
        let escaped = Coord::from_raw_unchecked(Realm::Data, 1, 500.0, Horizon::Genesis, 10.0, Polarity::Neutral, 0).unwrap();
        let bc = BitChain::new(escaped, Payload::from_text("hello"), None, vec![], None).unwrap();
        let (status, journey) = orch.process_bitchain(bc, "tok1", "alice").await.unwrap();
        assert!(matches!(status, AdmissionStatus::RepairedAndRegistered | AdmissionStatus::Unrecoverable));
        assert!(journey.entries.iter().any(|e| matches!(e.transition, JourneyTransition::Repaired { .. })));
    }
}
