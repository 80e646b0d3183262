//! Wired-up application state shared across RPC handlers, built once at
//! startup from [`crate::config::Config`].

use crate::auth::{FileAuthProvider, FilePolicyProvider, TracingAuditSink};
use crate::config::Config;
use stat7_anchor::AnchorGraph;
use stat7_embed::{EmbeddingProvider, LocalProvider, RemoteProvider};
use stat7_firewall::{Conservator, RecoveryGate, WfcGate};
use stat7_orchestrator::Orchestrator;
use stat7_retrieval::RetrievalEngine;
use stat7_store::Store;
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub store: Arc<Store>,
    pub anchors: Arc<AnchorGraph>,
    pub retrieval: Arc<RetrievalEngine>,
    pub orchestrator: Arc<Orchestrator>,
    pub cache_ttl: Duration,
}

impl AppState {
    pub fn build(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Arc::new(Store::open(&config.data_dir)?);

        let embedder: Arc<dyn EmbeddingProvider> = if let Some(url) =
            config.embedding_provider.strip_prefix("remote:")
        {
            Arc::new(RemoteProvider::new(url.to_string(), config.embedding_dim))
        } else {
            Arc::new(LocalProvider::new(config.embedding_dim))
        };

        let anchors = Arc::new(AnchorGraph::new(
            store.clone(),
            embedder.clone(),
            config.theta_merge,
        ));

        let cache_ttl = Duration::from_secs(config.cache_ttl_seconds);
        let retrieval = Arc::new(
            RetrievalEngine::new(anchors.clone(), store.clone(), embedder)
                .with_theta_edge(config.theta_edge)
                .with_cache_ttl(cache_ttl),
        );

        let wfc = WfcGate::new(config.wfc_iterations);

        let auth = Arc::new(FileAuthProvider::load(config.auth_file.as_deref())?);
        let policy = Arc::new(FilePolicyProvider::load(config.policy_file.as_deref())?);
        let audit = Arc::new(TracingAuditSink);
        let recovery =
            RecoveryGate::new(auth, policy, audit).with_signature_required(config.require_signature);

        let conservator = Conservator::new(config.conservator_realms()?);
        let orchestrator = Arc::new(Orchestrator::new(store.clone(), wfc, recovery, conservator));

        Ok(AppState {
            store,
            anchors,
            retrieval,
            orchestrator,
            cache_ttl,
        })
    }
}
