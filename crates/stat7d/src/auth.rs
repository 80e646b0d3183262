//! Concrete `AuthProvider`/`PolicyProvider`/`AuditSink` wiring for the
//! daemon, modeled on `gossipd::membership::MembershipManager`'s file-backed
//! world-phrase/roles configuration but generalized to the recovery gate's
//! capability traits (spec §4.7, §9).

use serde::Deserialize;
use stat7_core::{Polarity, Realm};
use stat7_firewall::{AuditEntry, AuditSink, AuthProvider, PolicyProvider, RequesterId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

/// On-disk shape of `--auth-file` (spec §6 `auth_token` resolution).
#[derive(Debug, Deserialize, Default)]
struct AuthFile {
    #[serde(default)]
    tokens: HashMap<String, String>,
    #[serde(default)]
    keys: HashMap<String, String>,
}

/// Token-to-requester resolution plus optional registered verifying keys,
/// loaded once at startup from a JSON file.
pub struct FileAuthProvider {
    tokens: HashMap<String, String>,
    keys: HashMap<String, ed25519_dalek::VerifyingKey>,
}

impl FileAuthProvider {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let raw = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                serde_json::from_str::<AuthFile>(&text)?
            }
            None => AuthFile::default(),
        };

        let mut keys = HashMap::new();
        for (requester, hex_key) in &raw.keys {
            let bytes = hex::decode(hex_key)?;
            let array: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("verifying key for {requester} must be 32 bytes"))?;
            let key = ed25519_dalek::VerifyingKey::from_bytes(&array)?;
            keys.insert(requester.clone(), key);
        }

        Ok(FileAuthProvider {
            tokens: raw.tokens,
            keys,
        })
    }
}

impl AuthProvider for FileAuthProvider {
    fn authenticate(&self, auth_token: &str) -> Option<RequesterId> {
        self.tokens.get(auth_token).cloned()
    }

    fn verifying_key_for(&self, requester_id: &str) -> Option<ed25519_dalek::VerifyingKey> {
        self.keys.get(requester_id).copied()
    }
}

/// On-disk shape of `--policy-file` (spec §6 `policy_set`): requester id ->
/// the realms it may admit into.
#[derive(Debug, Deserialize, Default)]
struct PolicyFile(HashMap<String, Vec<String>>);

/// `requester_id` -> allowed realm set. A requester absent from the file is
/// denied everywhere; an empty/absent file means every authenticated
/// requester is permitted everywhere (spec §6: unset `policy_set` has no
/// restriction).
pub struct FilePolicyProvider {
    allow: Option<HashMap<String, HashSet<Realm>>>,
}

impl FilePolicyProvider {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(FilePolicyProvider { allow: None });
        };
        let text = std::fs::read_to_string(path)?;
        let raw: PolicyFile = serde_json::from_str(&text)?;
        let mut allow = HashMap::new();
        for (requester, realms) in raw.0 {
            let parsed: HashSet<Realm> = realms
                .iter()
                .map(|r| Realm::from_str(r.trim()))
                .collect::<Result<_, _>>()?;
            allow.insert(requester, parsed);
        }
        Ok(FilePolicyProvider { allow: Some(allow) })
    }
}

impl PolicyProvider for FilePolicyProvider {
    fn is_permitted(&self, requester_id: &str, realm: Realm, _polarity: Polarity) -> bool {
        match &self.allow {
            None => true,
            Some(map) => map
                .get(requester_id)
                .map(|realms| realms.contains(&realm))
                .unwrap_or(false),
        }
    }
}

/// Audit sink that persists each entry as a structured `tracing` event at
/// the `audit` target. `record` returning `Ok` before the admission result
/// is returned satisfies spec §4.7 check 4 ("audit record is persisted
/// before the admission returns success") — the log line is the durable
/// record here, the way `gossipd` treats its own structured event log.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), String> {
        tracing::info!(
            target: "audit",
            bitchain_id = %entry.bitchain_id,
            requester_id = ?entry.requester_id,
            check = entry.check,
            passed = entry.passed,
            reason = ?entry.reason,
            "admission check"
        );
        Ok(())
    }
}
