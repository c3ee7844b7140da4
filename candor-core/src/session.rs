//! Wallet session passed explicitly to every pipeline call.
//!
//! A session optionally persists to a JSON file. Every mutation rewrites the
//! file when one is attached; disconnecting resets all fields to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info};

use crate::error::{CandorError, Result};

pub const DEFAULT_DISPLAY_NAME: &str = "Anon";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    #[serde(default, with = "wallet_string")]
    wallet_address: Option<Pubkey>,
    #[serde(default = "default_display_name")]
    display_name: String,
    #[serde(default)]
    is_onboarded: bool,
}

impl Default for SessionFile {
    fn default() -> Self {
        Self {
            wallet_address: None,
            display_name: default_display_name(),
            is_onboarded: false,
        }
    }
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    state: SessionFile,
    path: Option<PathBuf>,
}

impl Session {
    /// In-memory session with no wallet.
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory session already connected to `wallet`.
    pub fn connected(wallet: Pubkey) -> Self {
        let mut session = Self::new();
        session.state.wallet_address = Some(wallet);
        session
    }

    /// Load from `path`. A missing file yields a fresh session bound to it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let state = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                CandorError::Session(format!("Invalid session file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No session file, starting fresh");
                SessionFile::default()
            }
            Err(e) => {
                return Err(CandorError::Session(format!(
                    "Failed to read session file {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            state,
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the session to its file. No-op for in-memory sessions.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CandorError::Session(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| CandorError::Session(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| {
            CandorError::Session(format!("Failed to write session file {}: {e}", path.display()))
        })
    }

    pub fn connect(&mut self, wallet: Pubkey) -> Result<()> {
        self.state.wallet_address = Some(wallet);
        info!(%wallet, "Wallet connected");
        self.save()
    }

    /// Tear down: every field returns to its default.
    pub fn disconnect(&mut self) -> Result<()> {
        self.state = SessionFile::default();
        info!("Wallet disconnected");
        self.save()
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.state.display_name = if name.trim().is_empty() {
            default_display_name()
        } else {
            name.trim().to_string()
        };
        self.save()
    }

    pub fn complete_onboarding(&mut self) -> Result<()> {
        self.state.is_onboarded = true;
        self.save()
    }

    pub fn wallet(&self) -> Option<&Pubkey> {
        self.state.wallet_address.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.state.wallet_address.is_some()
    }

    pub fn display_name(&self) -> &str {
        &self.state.display_name
    }

    pub fn is_onboarded(&self) -> bool {
        self.state.is_onboarded
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// JSON view for display.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.state).unwrap_or(serde_json::Value::Null)
    }
}

mod wallet_string {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(wallet: &Option<Pubkey>, serializer: S) -> Result<S::Ok, S::Error> {
        match wallet {
            Some(key) => serializer.collect_str(key),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Pubkey>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| Pubkey::from_str(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let session = Session::new();
        assert!(!session.is_connected());
        assert_eq!(session.display_name(), "Anon");
        assert!(!session.is_onboarded());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let wallet = Pubkey::new_unique();

        let mut session = Session::load(&path).unwrap();
        session.connect(wallet).unwrap();
        session.set_display_name("  alice ").unwrap();
        session.complete_onboarding().unwrap();

        let reloaded = Session::load(&path).unwrap();
        assert_eq!(reloaded.wallet(), Some(&wallet));
        assert_eq!(reloaded.display_name(), "alice");
        assert!(reloaded.is_onboarded());

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["walletAddress"], wallet.to_string());
    }

    #[test]
    fn test_disconnect_resets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut session = Session::load(&path).unwrap();
        session.connect(Pubkey::new_unique()).unwrap();
        session.set_display_name("bob").unwrap();
        session.disconnect().unwrap();

        let reloaded = Session::load(&path).unwrap();
        assert_eq!(reloaded, Session::load(&path).unwrap());
        assert!(!reloaded.is_connected());
        assert_eq!(reloaded.display_name(), DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn test_corrupt_file_is_session_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(Session::load(&path), Err(CandorError::Session(_))));
    }
}
