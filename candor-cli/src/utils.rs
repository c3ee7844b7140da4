//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use candor_core::{sol_to_lamports, Session, UserNotice};
use colored::Colorize;
use serde::Serialize;
use solana_sdk::signature::{read_keypair_file, Keypair};

/// Session file used when neither `--session` nor `CANDOR_SESSION` is given.
const SESSION_FILE: &str = ".candor/session.json";

/// Resolve the session file path, defaulting to `$HOME/.candor/session.json`.
pub fn session_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(SESSION_FILE),
        None => PathBuf::from(SESSION_FILE),
    })
}

pub fn load_session(path: &Path) -> Result<Session> {
    Session::load(path).with_context(|| format!("Failed to read session: {}", path.display()))
}

/// Read a Solana CLI keypair file (JSON array of 64 bytes).
pub fn load_keypair(path: &Path) -> Result<Keypair> {
    read_keypair_file(path)
        .map_err(|e| anyhow!("Failed to read keypair file {}: {e}", path.display()))
}

/// Parse a SOL amount such as `0.005` into lamports. Used as a clap value parser.
pub fn parse_sol(value: &str) -> std::result::Result<u64, String> {
    let sol: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("not a number: {value}"))?;
    if !sol.is_finite() || sol < 0.0 {
        return Err(format!("amount must be a non-negative number: {value}"));
    }
    Ok(sol_to_lamports(sol))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Surface a partial-failure notice on stderr. The command still succeeds.
pub fn print_notice(notice: &UserNotice) {
    eprintln!();
    eprintln!("{} {}", "⚠".yellow().bold(), notice.title.yellow().bold());
    eprintln!("  {}", notice.body.yellow());
}

/// Read a required setting from the environment.
pub fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{name} must be set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sol() {
        assert_eq!(parse_sol("0.005"), Ok(5_000_000));
        assert_eq!(parse_sol("5"), Ok(5_000_000_000));
        assert_eq!(parse_sol(" 0.1 "), Ok(100_000_000));
        assert!(parse_sol("-1").is_err());
        assert!(parse_sol("lots").is_err());
        assert!(parse_sol("NaN").is_err());
    }

    #[test]
    fn test_session_path_prefers_explicit() {
        let explicit = PathBuf::from("/tmp/custom.json");
        assert_eq!(session_path(Some(explicit.clone())), explicit);
        assert!(session_path(None).ends_with(SESSION_FILE));
    }

    #[test]
    fn test_load_keypair_missing_file() {
        let err = load_keypair(Path::new("/nonexistent/id.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read keypair file"));
    }
}
