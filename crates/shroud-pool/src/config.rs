//! Pool configuration file.
//!
//! ```toml
//! authority = "<64 hex chars>"
//!
//! [economics]
//! base_fee_bps = 10
//!
//! [vault]
//! minimum_reserve = 100000000
//!
//! [nullifiers]
//! tree_height = 26
//! ```
//!
//! Every section and field is optional except `authority`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shroud_guard::GuardParams;
use shroud_nullifier::RegistryConfig;
use shroud_types::AccountId;
use shroud_verifier::Groth16Verifier;

use crate::events::DEFAULT_JOURNAL_CAPACITY;
use crate::note_tree::MAX_TREE_HEIGHT;
use crate::{PoolError, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SHROUD_CONFIG";

/// Complete pool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Account allowed to run admin operations.
    #[serde(default)]
    pub authority: Option<AccountId>,
    /// Fee and deposit settings.
    #[serde(default)]
    pub economics: EconomicsConfig,
    /// Reserve and breaker settings.
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub note_tree: NoteTreeConfig,
    #[serde(default)]
    pub nullifiers: RegistryConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Fee and deposit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicsConfig {
    /// Base protocol fee in basis points.
    #[serde(default = "default_base_fee_bps")]
    pub base_fee_bps: u64,
    #[serde(default = "default_min_deposit")]
    pub min_deposit: u64,
    #[serde(default = "default_max_deposit")]
    pub max_deposit: u64,
    /// Rolling one-hour withdrawal cap. 0 = unlimited.
    #[serde(default = "default_hourly_limit")]
    pub hourly_withdrawal_limit: u64,
}

/// Reserve and breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_minimum_reserve")]
    pub minimum_reserve: u64,
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u64,
}

/// Note tree shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteTreeConfig {
    #[serde(default = "default_tree_height")]
    pub height: u8,
    /// Number of recent roots a withdrawal may prove against.
    #[serde(default = "default_root_history")]
    pub root_history: usize,
}

/// Verifier artifact location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Circuit artifact blob. Empty = no verifier configured.
    #[serde(default)]
    pub artifact_path: String,
    /// Refuse artifacts of any other version. 0 = accept any.
    #[serde(default)]
    pub expected_version: u32,
}

/// Event retention. Log verbosity is left to `RUST_LOG`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Number of events kept in the in-memory journal.
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

// Default value functions

fn default_base_fee_bps() -> u64 {
    GuardParams::default().base_fee_bps
}

fn default_min_deposit() -> u64 {
    GuardParams::default().min_deposit
}

fn default_max_deposit() -> u64 {
    GuardParams::default().max_deposit
}

fn default_hourly_limit() -> u64 {
    GuardParams::default().hourly_withdrawal_limit
}

fn default_minimum_reserve() -> u64 {
    GuardParams::default().minimum_vault_reserve
}

fn default_breaker_threshold() -> u64 {
    GuardParams::default().circuit_breaker_threshold
}

fn default_tree_height() -> u8 {
    20
}

fn default_root_history() -> usize {
    100
}

fn default_journal_capacity() -> usize {
    DEFAULT_JOURNAL_CAPACITY
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            base_fee_bps: default_base_fee_bps(),
            min_deposit: default_min_deposit(),
            max_deposit: default_max_deposit(),
            hourly_withdrawal_limit: default_hourly_limit(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            minimum_reserve: default_minimum_reserve(),
            circuit_breaker_threshold: default_breaker_threshold(),
        }
    }
}

impl Default for NoteTreeConfig {
    fn default() -> Self {
        Self {
            height: default_tree_height(),
            root_history: default_root_history(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            journal_capacity: default_journal_capacity(),
        }
    }
}

impl PoolConfig {
    /// A default configuration administered by `authority`.
    pub fn with_authority(authority: AccountId) -> Self {
        Self {
            authority: Some(authority),
            ..Self::default()
        }
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PoolError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: PoolConfig = toml::from_str(&content)
            .map_err(|e| PoolError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `SHROUD_CONFIG`, or `None` if unset.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(&PathBuf::from(path)).map(Some),
            None => Ok(None),
        }
    }

    /// The authority, which every deployment must name.
    pub fn authority(&self) -> Result<AccountId> {
        self.authority
            .ok_or_else(|| PoolError::InvalidConfig("authority is not set".into()))
    }

    /// Economic parameters in the form the guard consumes.
    pub fn guard_params(&self) -> GuardParams {
        GuardParams {
            base_fee_bps: self.economics.base_fee_bps,
            min_deposit: self.economics.min_deposit,
            max_deposit: self.economics.max_deposit,
            minimum_vault_reserve: self.vault.minimum_reserve,
            circuit_breaker_threshold: self.vault.circuit_breaker_threshold,
            hourly_withdrawal_limit: self.economics.hourly_withdrawal_limit,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.authority()?;
        self.guard_params().validate()?;
        self.nullifiers.validate()?;
        if self.note_tree.height == 0 || self.note_tree.height > MAX_TREE_HEIGHT {
            return Err(PoolError::InvalidConfig(format!(
                "note_tree.height {} outside 1..={MAX_TREE_HEIGHT}",
                self.note_tree.height
            )));
        }
        if self.note_tree.root_history == 0 {
            return Err(PoolError::InvalidConfig(
                "note_tree.root_history must be non-zero".into(),
            ));
        }
        if self.events.journal_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "events.journal_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Load the verifier named by `[verifier]`.
    pub fn load_verifier(&self) -> Result<Groth16Verifier> {
        if self.verifier.artifact_path.is_empty() {
            return Err(PoolError::InvalidConfig(
                "verifier.artifact_path is not set".into(),
            ));
        }
        let path = Path::new(&self.verifier.artifact_path);
        let bytes = std::fs::read(path).map_err(|e| {
            PoolError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let verifier = Groth16Verifier::from_artifact_bytes(&bytes)?;
        let expected = self.verifier.expected_version;
        if expected != 0 {
            use shroud_verifier::ProofVerifier;
            if verifier.artifact_version() != expected {
                return Err(PoolError::InvalidConfig(format!(
                    "artifact version {} differs from expected {expected}",
                    verifier.artifact_version()
                )));
            }
        }
        Ok(verifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const AUTHORITY_HEX: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.economics.base_fee_bps, 10);
        assert_eq!(config.vault.minimum_reserve, 100_000_000);
        assert_eq!(config.note_tree.height, 20);
        assert_eq!(config.note_tree.root_history, 100);
        assert_eq!(config.nullifiers.tree_height, 26);
        assert_eq!(config.events.journal_capacity, DEFAULT_JOURNAL_CAPACITY);
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = PoolConfig::with_authority(AccountId::new([1u8; 32]));
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed: PoolConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.authority, config.authority);
        parsed.validate().expect("valid");
    }

    #[test]
    fn test_partial_file() {
        let toml_str = format!(
            "authority = \"{AUTHORITY_HEX}\"\n\n[economics]\nbase_fee_bps = 50\n\n[nullifiers]\nbatch_size = 4\n"
        );
        let config: PoolConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(config.economics.base_fee_bps, 50);
        assert_eq!(config.economics.min_deposit, 1_000_000);
        assert_eq!(config.nullifiers.batch_size, 4);
        assert_eq!(config.nullifiers.tree_height, 26);
        config.validate().expect("valid");
    }

    #[test]
    fn test_load_from_file_and_env() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            "authority = \"{AUTHORITY_HEX}\"\n[vault]\nminimum_reserve = 0\n"
        )
        .expect("write");

        let config = PoolConfig::load(file.path()).expect("load");
        assert_eq!(config.vault.minimum_reserve, 0);
        assert_eq!(config.authority().expect("authority"), AccountId::new([1u8; 32]));

        std::env::set_var(CONFIG_ENV, file.path());
        let from_env = PoolConfig::from_env().expect("env").expect("set");
        assert_eq!(from_env.vault.minimum_reserve, 0);
        std::env::remove_var(CONFIG_ENV);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PoolConfig::with_authority(AccountId::new([1u8; 32]));
        config.economics.base_fee_bps = 500;
        assert!(matches!(config.validate(), Err(PoolError::Guard(_))));

        let mut config = PoolConfig::with_authority(AccountId::new([1u8; 32]));
        config.note_tree.height = 40;
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));

        let mut config = PoolConfig::with_authority(AccountId::new([1u8; 32]));
        config.events.journal_capacity = 0;
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));

        let mut config = PoolConfig::with_authority(AccountId::new([1u8; 32]));
        config.economics.hourly_withdrawal_limit = 1_000_000;
        config.economics.max_deposit = 1_000_001;
        assert!(matches!(
            config.validate(),
            Err(PoolError::Guard(shroud_guard::GuardError::InvalidParams(_)))
        ));
    }

    #[test]
    fn test_events_section() {
        let toml_str = format!(
            "authority = \"{AUTHORITY_HEX}\"\n\n[events]\njournal_capacity = 64\n"
        );
        let config: PoolConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(config.events.journal_capacity, 64);
        config.validate().expect("valid");
    }

    #[test]
    fn test_missing_artifact() {
        let config = PoolConfig::with_authority(AccountId::new([1u8; 32]));
        assert!(matches!(
            config.load_verifier(),
            Err(PoolError::InvalidConfig(_))
        ));
    }
}
