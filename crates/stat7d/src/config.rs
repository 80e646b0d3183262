//! Daemon configuration (spec §6 "Configuration" table), modeled on
//! `gossipd::config::Config`: a `clap::Parser` struct with `env` fallbacks
//! for every option an operator might want to set without a flag.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// stat7d - STAT7 content-addressable entity store daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "stat7d")]
#[command(about = "STAT7 admission and retrieval RPC daemon")]
pub struct Config {
    /// Listen address for the RPC surface
    #[arg(long, env = "STAT7D_LISTEN", default_value = "0.0.0.0:7700")]
    pub listen: SocketAddr,

    /// Data directory for the embedded `sled` store
    #[arg(long, env = "STAT7D_DATA_DIR", default_value = "./data/stat7d")]
    pub data_dir: PathBuf,

    /// Embedding provider: `local` or `remote:<url>` (spec §6
    /// `embedding_provider`)
    #[arg(long, env = "STAT7D_EMBEDDING_PROVIDER", default_value = "local")]
    pub embedding_provider: String,

    /// Fixed embedding vector dimension; must match the provider (spec §6
    /// `embedding_dim`)
    #[arg(long, env = "STAT7D_EMBEDDING_DIM", default_value = "256")]
    pub embedding_dim: usize,

    /// Similarity floor for anchor dedup (spec §6 `theta_merge`)
    #[arg(long, env = "STAT7D_THETA_MERGE", default_value = "0.92")]
    pub theta_merge: f32,

    /// Similarity floor for neighborhood edges (spec §6 `theta_edge`)
    #[arg(long, env = "STAT7D_THETA_EDGE", default_value = "0.75")]
    pub theta_edge: f32,

    /// Exponential heat decay rate per second (spec §6 `heat_decay_lambda`)
    #[arg(long, env = "STAT7D_HEAT_DECAY_LAMBDA", default_value = "0.00005")]
    pub heat_decay_lambda: f64,

    /// How often the background heat-decay sweep runs
    #[arg(long, env = "STAT7D_HEAT_DECAY_INTERVAL_SECS", default_value = "60")]
    pub heat_decay_interval_secs: u64,

    /// Retrieval query cache TTL in seconds (spec §6 `cache_ttl_seconds`)
    #[arg(long, env = "STAT7D_CACHE_TTL_SECONDS", default_value = "300")]
    pub cache_ttl_seconds: u64,

    /// Julia collapse depth; MUST be 7 for spec conformance (spec §6
    /// `wfc_iterations`)
    #[arg(long, env = "STAT7D_WFC_ITERATIONS", default_value = "7")]
    pub wfc_iterations: u32,

    /// Comma-separated realms opted into conservator auto-repair (spec §6
    /// `conservator_enabled_realms`), e.g. "data,narrative"
    #[arg(long, env = "STAT7D_CONSERVATOR_REALMS", value_delimiter = ',')]
    pub conservator_enabled_realms: Vec<String>,

    /// Require a payload signature on every admission attempt
    #[arg(long, env = "STAT7D_REQUIRE_SIGNATURE")]
    pub require_signature: bool,

    /// Path to a JSON file of `{"tokens": {token: requester_id}, "keys":
    /// {requester_id: hex_ed25519_pubkey}}` (spec §6's `auth_token`
    /// resolution). Absent means no token authenticates.
    #[arg(long, env = "STAT7D_AUTH_FILE")]
    pub auth_file: Option<PathBuf>,

    /// Path to a JSON policy_set file: `{requester_id: [allowed realms]}`
    /// (spec §6 `policy_set`). Absent means every authenticated requester
    /// is permitted everywhere.
    #[arg(long, env = "STAT7D_POLICY_FILE")]
    pub policy_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "STAT7D_VERBOSE")]
    pub verbose: bool,

    /// Log format: "json" or "pretty"
    #[arg(long, env = "STAT7D_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding_dim == 0 {
            anyhow::bail!("embedding_dim must be > 0");
        }
        if !(0.0..=1.0).contains(&self.theta_merge) {
            anyhow::bail!("theta_merge must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.theta_edge) {
            anyhow::bail!("theta_edge must be in [0, 1]");
        }
        if self.wfc_iterations != 7 {
            tracing::warn!(
                iterations = self.wfc_iterations,
                "wfc_iterations != 7 is not spec-conformant; accepted for experimentation only"
            );
        }
        Ok(())
    }

    pub fn conservator_realms(&self) -> anyhow::Result<Vec<stat7_core::Realm>> {
        use std::str::FromStr;
        self.conservator_enabled_realms
            .iter()
            .map(|s| stat7_core::Realm::from_str(s.trim()).map_err(anyhow::Error::from))
            .collect()
    }
}
