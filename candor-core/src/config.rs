//! Pipeline configuration
//!
//! Every tunable the capture and vouch pipelines depend on, with defaults that
//! match the deployed Candor program. Values can be overridden from the
//! environment.

use std::str::FromStr;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

/// Program address of the deployed Candor program.
pub const DEFAULT_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("HDvUruses5D2tPCUZnhkLiR4GB2B49GwkpjJJUKjCAvw");

/// Sentinel program address meaning "program not deployed yet".
/// Encodes to `11111111111111111111111111111111`.
pub const PLACEHOLDER_PROGRAM_ID: Pubkey = Pubkey::new_from_array([0u8; 32]);

/// Protocol ceiling for a single vouch (5 SOL). Must match the program.
pub const MAX_VOUCH_LAMPORTS: u64 = 5_000_000_000;

/// Transaction fee plus rent buffer reserved by the balance preflight.
pub const ESTIMATED_FEE_LAMPORTS: u64 = 15_000;

/// Default vouch amount (0.005 SOL).
pub const DEFAULT_VOUCH_LAMPORTS: u64 = 5_000_000;

/// Database write attempts before a persistence gap is reported.
pub const DB_RETRY_COUNT: u32 = 3;

/// Base delay for linear database retry backoff.
pub const DB_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Extra submissions allowed after a stale block reference (verify path).
pub const LEDGER_STALE_RETRIES: u32 = 1;

/// Decimal places kept when fuzzing GPS coordinates (~111m).
pub const COORDINATE_PRECISION: u32 = 3;

/// Solana cluster the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cluster {
    #[default]
    Devnet,
    Testnet,
    MainnetBeta,
}

impl Cluster {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
            Self::MainnetBeta => "mainnet-beta",
        }
    }

    /// Public RPC endpoint for the cluster.
    pub fn rpc_url(&self) -> &'static str {
        match self {
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            "mainnet" | "mainnet-beta" => Ok(Self::MainnetBeta),
            other => Err(format!("unknown cluster: {other}")),
        }
    }
}

/// Tunables shared by the capture and vouch pipelines.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Candor program address
    pub program_id: Pubkey,
    /// Sentinel address that disables the ledger step
    pub placeholder_program_id: Pubkey,
    /// Cluster used for explorer links and the default RPC endpoint
    pub cluster: Cluster,
    /// Maximum lamports per vouch
    pub max_vouch_lamports: u64,
    /// Lamports reserved for fees during the balance preflight
    pub estimated_fee_lamports: u64,
    /// Vouch amount used when the caller does not pick one
    pub default_vouch_lamports: u64,
    /// Database write attempts (default: 3)
    pub db_retry_count: u32,
    /// Linear backoff base; attempt n waits n * base (default: 1s)
    pub db_retry_base_delay: Duration,
    /// Retries after a stale block reference on the verify path (default: 1)
    pub ledger_stale_retries: u32,
    /// Decimal places kept for coordinates (default: 3)
    pub coordinate_precision: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID,
            placeholder_program_id: PLACEHOLDER_PROGRAM_ID,
            cluster: Cluster::default(),
            max_vouch_lamports: MAX_VOUCH_LAMPORTS,
            estimated_fee_lamports: ESTIMATED_FEE_LAMPORTS,
            default_vouch_lamports: DEFAULT_VOUCH_LAMPORTS,
            db_retry_count: DB_RETRY_COUNT,
            db_retry_base_delay: DB_RETRY_BASE_DELAY,
            ledger_stale_retries: LEDGER_STALE_RETRIES,
            coordinate_precision: COORDINATE_PRECISION,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let program_id = std::env::var("CANDOR_PROGRAM_ID")
            .ok()
            .and_then(|v| Pubkey::from_str(v.trim()).ok())
            .unwrap_or(defaults.program_id);

        let cluster = std::env::var("CANDOR_CLUSTER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cluster);

        let max_vouch_lamports = std::env::var("CANDOR_MAX_VOUCH_LAMPORTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_vouch_lamports);

        let estimated_fee_lamports = std::env::var("CANDOR_ESTIMATED_FEE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.estimated_fee_lamports);

        let db_retry_count = std::env::var("CANDOR_DB_RETRY_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(defaults.db_retry_count);

        let db_retry_base_delay = std::env::var("CANDOR_DB_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.db_retry_base_delay);

        let coordinate_precision = std::env::var("CANDOR_COORD_PRECISION")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|p: &u32| *p <= 7)
            .unwrap_or(defaults.coordinate_precision);

        Self {
            program_id,
            cluster,
            max_vouch_lamports,
            estimated_fee_lamports,
            db_retry_count,
            db_retry_base_delay,
            coordinate_precision,
            ..defaults
        }
    }

    /// Whether the on-chain program is configured. Decided statically from the
    /// program address, never from a failed submission.
    pub fn ledger_enabled(&self) -> bool {
        self.program_id != self.placeholder_program_id
    }

    /// Configuration with the ledger step disabled (program not deployed).
    pub fn offline() -> Self {
        Self {
            program_id: PLACEHOLDER_PROGRAM_ID,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_encodes_to_all_ones() {
        assert_eq!(
            PLACEHOLDER_PROGRAM_ID.to_string(),
            "11111111111111111111111111111111"
        );
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.ledger_enabled());
        assert_eq!(config.max_vouch_lamports, 5_000_000_000);
        assert_eq!(config.estimated_fee_lamports, 15_000);
        assert_eq!(config.db_retry_count, 3);
        assert_eq!(config.db_retry_base_delay, Duration::from_secs(1));
        assert_eq!(config.ledger_stale_retries, 1);
        assert_eq!(config.coordinate_precision, 3);
        assert_eq!(
            config.program_id.to_string(),
            "HDvUruses5D2tPCUZnhkLiR4GB2B49GwkpjJJUKjCAvw"
        );
    }

    #[test]
    fn test_offline_config_disables_ledger() {
        assert!(!PipelineConfig::offline().ledger_enabled());
    }

    #[test]
    fn test_cluster_parsing() {
        assert_eq!("devnet".parse::<Cluster>(), Ok(Cluster::Devnet));
        assert_eq!("Mainnet".parse::<Cluster>(), Ok(Cluster::MainnetBeta));
        assert!("localnet".parse::<Cluster>().is_err());
    }
}
