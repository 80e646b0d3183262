//! The recovery gate (spec §4.7, C7): auth/policy/intent/audit checks
//! applied to BOUND records, modeled on
//! `gossipd::membership::MembershipManager`'s admit/ban/rate-limit gating
//! generalized from peer admission to bit-chain admission.

use crate::error::{FirewallError, Result};
use serde::{Deserialize, Serialize};
use stat7_core::{BitChain, Polarity, Realm};
use std::sync::Arc;

/// Resolved identity of an authenticated caller (spec §4.9
/// `requester_id`).
pub type RequesterId = String;

/// `auth_token` -> `requester_id` resolution (spec §4.7 check 2), a
/// capability set selected at construction time (spec §9).
pub trait AuthProvider: Send + Sync {
    /// Returns `Some(requester_id)` the token authenticates as, or `None`
    /// if the token is invalid/expired.
    fn authenticate(&self, auth_token: &str) -> Option<RequesterId>;

    /// The verifying key registered for `requester_id`, used by the
    /// presence check to validate an optional payload signature. `None`
    /// means this provider has no key on file for that requester.
    fn verifying_key_for(&self, requester_id: &str) -> Option<ed25519_dalek::VerifyingKey>;
}

/// `requester_id` permission for a realm/polarity under the active policy
/// set (spec §4.7 check 3, spec §6 `policy_set`).
pub trait PolicyProvider: Send + Sync {
    fn is_permitted(&self, requester_id: &str, realm: Realm, polarity: Polarity) -> bool;
}

/// One audited outcome of a recovery-gate check (spec §4.7: "each failure
/// is audited with a distinct reason").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub bitchain_id: String,
    pub requester_id: Option<RequesterId>,
    pub check: &'static str,
    pub passed: bool,
    pub reason: Option<String>,
}

/// `audit record is persisted before the admission returns success` (spec
/// §4.7 check 4) — a capability injected at construction (spec §9), not
/// wired to any specific storage backend from this crate.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> std::result::Result<(), String>;
}

/// An `AuditSink` that does nothing, for tests and harness runs that don't
/// care about the audit trail's durability.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: &AuditEntry) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Successful outcome of [`RecoveryGate::evaluate`].
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub requester_id: RequesterId,
}

/// The four ordered checks of spec §4.7, each a capability wired at
/// construction time rather than global state (spec §9).
pub struct RecoveryGate {
    auth: Arc<dyn AuthProvider>,
    policy: Arc<dyn PolicyProvider>,
    audit: Arc<dyn AuditSink>,
    /// Whether a payload signature is mandatory for presence to pass.
    pub require_signature: bool,
}

impl RecoveryGate {
    pub fn new(auth: Arc<dyn AuthProvider>, policy: Arc<dyn PolicyProvider>, audit: Arc<dyn AuditSink>) -> Self {
        RecoveryGate {
            auth,
            policy,
            audit,
            require_signature: false,
        }
    }

    pub fn with_signature_required(mut self, required: bool) -> Self {
        self.require_signature = required;
        self
    }

    fn audit(&self, bitchain_id: &str, requester_id: Option<&str>, check: &'static str, passed: bool, reason: Option<String>) -> Result<()> {
        let entry = AuditEntry {
            bitchain_id: bitchain_id.to_string(),
            requester_id: requester_id.map(str::to_string),
            check,
            passed,
            reason: reason.clone(),
        };
        self.audit
            .record(&entry)
            .map_err(FirewallError::AuditFailed)?;
        Ok(())
    }

    /// Run the four checks in order (spec §4.7): presence, authentication,
    /// policy, then audit-before-return. Each failure is audited with a
    /// distinct reason and short-circuits the remaining checks; the
    /// bit-chain is not admitted on any failure.
    pub fn evaluate(&self, bc: &BitChain, auth_token: &str, claimed_requester_id: &str) -> Result<RecoveryOutcome> {
        let id = bc.id.to_hex();

        // 1. Presence.
        if bc.payload.is_empty() {
            self.audit(&id, None, "presence", false, Some("empty payload".into()))?;
            return Err(FirewallError::PresenceFailed("payload is empty".into()));
        }
        if self.require_signature || bc.signature.is_some() {
            let signature = bc.signature.as_ref().ok_or_else(|| {
                FirewallError::PresenceFailed("signature required but absent".into())
            });
            let signature = match signature {
                Ok(sig) => sig,
                Err(e) => {
                    self.audit(&id, None, "presence", false, Some(e.to_string()))?;
                    return Err(e);
                }
            };
            let Some(key) = self.auth.verifying_key_for(claimed_requester_id) else {
                self.audit(&id, None, "presence", false, Some("no verifying key on file".into()))?;
                return Err(FirewallError::PresenceFailed("no verifying key on file".into()));
            };
            if !verify_signature(&key, &bc.payload.bytes, signature) {
                self.audit(&id, None, "presence", false, Some("signature verification failed".into()))?;
                return Err(FirewallError::PresenceFailed("signature verification failed".into()));
            }
        }
        self.audit(&id, None, "presence", true, None)?;

        // 2. Authentication.
        let resolved = self.auth.authenticate(auth_token);
        if resolved.as_deref() != Some(claimed_requester_id) {
            self.audit(&id, Some(claimed_requester_id), "authentication", false, Some("token did not resolve to claimed requester".into()))?;
            return Err(FirewallError::AuthFailed(claimed_requester_id.to_string()));
        }
        self.audit(&id, Some(claimed_requester_id), "authentication", true, None)?;

        // 3. Policy.
        if !self.policy.is_permitted(claimed_requester_id, bc.coord.realm, bc.coord.polarity) {
            self.audit(&id, Some(claimed_requester_id), "policy", false, Some("not permitted for realm/polarity".into()))?;
            return Err(FirewallError::PolicyDenied {
                requester: claimed_requester_id.to_string(),
                realm: bc.coord.realm,
                polarity: bc.coord.polarity,
            });
        }
        self.audit(&id, Some(claimed_requester_id), "policy", true, None)?;

        // 4. Audit-before-return: the final, success-marking entry. If this
        // write fails, the admission itself fails (spec §4.7: "failures to
        // log become admission failures").
        self.audit(&id, Some(claimed_requester_id), "admission", true, None)?;

        Ok(RecoveryOutcome {
            requester_id: claimed_requester_id.to_string(),
        })
    }
}

fn verify_signature(key: &ed25519_dalek::VerifyingKey, payload: &[u8], signature: &[u8]) -> bool {
    use ed25519_dalek::Verifier;
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    key.verify(payload, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use stat7_core::{BitChain, Coord, Horizon, Payload};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapAuth(HashMap<String, String>);
    impl AuthProvider for MapAuth {
        fn authenticate(&self, auth_token: &str) -> Option<RequesterId> {
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

    #[derive(Default)]
    struct RecordingAudit(Mutex<Vec<AuditEntry>>);
    impl AuditSink for RecordingAudit {
        fn record(&self, entry: &AuditEntry) -> std::result::Result<(), String> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    fn coord() -> Coord {
        Coord::new(Realm::Data, 1, 50.0, Horizon::Genesis, 10.0, Polarity::P0, 0).unwrap()
    }

    fn bitchain() -> BitChain {
        BitChain::new(coord(), Payload::from_text("hello"), None, vec![], None).unwrap()
    }

    #[test]
    fn valid_token_and_policy_admits() {
        let auth = Arc::new(MapAuth(HashMap::from([("tok1".to_string(), "alice".to_string())])));
        let gate = RecoveryGate::new(auth, Arc::new(AllowAll), Arc::new(RecordingAudit::default()));
        let outcome = gate.evaluate(&bitchain(), "tok1", "alice").unwrap();
        assert_eq!(outcome.requester_id, "alice");
    }

    #[test]
    fn mismatched_requester_is_rejected_auth() {
        let auth = Arc::new(MapAuth(HashMap::from([("tok1".to_string(), "alice".to_string())])));
        let gate = RecoveryGate::new(auth, Arc::new(AllowAll), Arc::new(RecordingAudit::default()));
        let err = gate.evaluate(&bitchain(), "tok1", "mallory");
        assert!(matches!(err, Err(FirewallError::AuthFailed(_))));
    }

    #[test]
    fn policy_denial_is_rejected_after_presence_and_auth_pass() {
        let auth = Arc::new(MapAuth(HashMap::from([("tok1".to_string(), "alice".to_string())])));
        let audit = Arc::new(RecordingAudit::default());
        let gate = RecoveryGate::new(auth, Arc::new(DenyAll), audit.clone());
        let err = gate.evaluate(&bitchain(), "tok1", "alice");
        assert!(matches!(err, Err(FirewallError::PolicyDenied { .. })));

        let entries = audit.0.lock().unwrap();
        assert!(entries.iter().any(|e| e.check == "presence" && e.passed));
        assert!(entries.iter().any(|e| e.check == "authentication" && e.passed));
        assert!(entries.iter().any(|e| e.check == "policy" && !e.passed));
    }

    #[test]
    fn empty_payload_fails_presence_before_auth_runs() {
        let auth = Arc::new(MapAuth(HashMap::new()));
        let audit = Arc::new(RecordingAudit::default());
        let mut bc = bitchain();
        bc.payload = Payload::from_bytes(vec![]);
        let gate = RecoveryGate::new(auth, Arc::new(AllowAll), audit.clone());
        let err = gate.evaluate(&bc, "whatever", "alice");
        assert!(matches!(err, Err(FirewallError::PresenceFailed(_))));
        assert_eq!(audit.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn valid_signature_passes_presence() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying_key = signing_key.verifying_key();
        let payload = b"signed payload".to_vec();
        let signature = signing_key.sign(&payload);

        struct KeyedAuth {
            requester: String,
            key: ed25519_dalek::VerifyingKey,
            token_map: HashMap<String, String>,
        }
        impl AuthProvider for KeyedAuth {
            fn authenticate(&self, auth_token: &str) -> Option<RequesterId> {
                self.token_map.get(auth_token).cloned()
            }
            fn verifying_key_for(&self, requester_id: &str) -> Option<ed25519_dalek::VerifyingKey> {
                (requester_id == self.requester).then_some(self.key)
            }
        }

        let auth = Arc::new(KeyedAuth {
            requester: "alice".to_string(),
            key: verifying_key,
            token_map: HashMap::from([("tok1".to_string(), "alice".to_string())]),
        });

        let coord = Coord::new(Realm::Data, 1, 50.0, Horizon::Genesis, 10.0, Polarity::P0, 0).unwrap();
        let mut bc = BitChain::new(coord, Payload::from_bytes(payload), None, vec![], None).unwrap();
        bc.signature = Some(signature.to_bytes().to_vec());

        let gate = RecoveryGate::new(auth, Arc::new(AllowAll), Arc::new(RecordingAudit::default()))
            .with_signature_required(true);
        assert!(gate.evaluate(&bc, "tok1", "alice").is_ok());
    }
}
