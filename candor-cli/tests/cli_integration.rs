//! CLI integration tests for candor-cli.
//!
//! These run the actual binary and check outputs, exit codes and the session
//! file. Nothing here reaches a ledger, database or storage bucket.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// SHA-256 of `abc`.
const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

const WALLET: &str = "HDvUruses5D2tPCUZnhkLiR4GB2B49GwkpjJJUKjCAvw";

/// Get a Command for the candor binary with an isolated session file.
fn candor(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("candor").unwrap();
    cmd.env("CANDOR_SESSION", temp.path().join("session.json"))
        .env_remove("CANDOR_PROGRAM_ID")
        .env_remove("RUST_LOG");
    cmd
}

fn write_image(temp: &TempDir, bytes: &[u8]) -> String {
    let path = temp.path().join("photo.jpg");
    fs::write(&path, bytes).unwrap();
    path.to_str().unwrap().to_string()
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    let temp = TempDir::new().unwrap();
    candor(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Photo verification and vouching on Solana",
        ))
        .stdout(predicate::str::contains("hash"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("vouch"))
        .stdout(predicate::str::contains("session"));
}

#[test]
fn test_version_displays_version() {
    let temp = TempDir::new().unwrap();
    candor(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("candor"));
}

#[test]
fn test_help_shows_exit_codes() {
    let temp = TempDir::new().unwrap();
    candor(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("65"))
        .stdout(predicate::str::contains("69"));
}

#[test]
fn test_vouch_help_shows_options() {
    let temp = TempDir::new().unwrap();
    candor(&temp)
        .args(["vouch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--amount"))
        .stdout(predicate::str::contains("--keypair"))
        .stdout(predicate::str::contains("--dry-run"));
}

// ============================================================================
// Hash Tests
// ============================================================================

#[test]
fn test_hash_prints_content_hash() {
    let temp = TempDir::new().unwrap();
    let image = write_image(&temp, b"abc");

    candor(&temp)
        .args(["hash", &image])
        .assert()
        .success()
        .stdout(predicate::str::contains(ABC_SHA256));
}

#[test]
fn test_hash_fuzzes_location() {
    let temp = TempDir::new().unwrap();
    let image = write_image(&temp, b"abc");

    let output = candor(&temp)
        .args([
            "--json",
            "hash",
            &image,
            "--lat",
            "37.774929",
            "--lon",
            "-122.419416",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["image_hash"], ABC_SHA256);
    assert_eq!(json["location"]["latitude"], 37.775);
    assert_eq!(json["location"]["longitude"], -122.419);
}

#[test]
fn test_hash_missing_file_returns_input_error() {
    let temp = TempDir::new().unwrap();
    // Exit code 66 = EX_NOINPUT
    candor(&temp)
        .args(["hash", "nonexistent_photo.jpg"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read file"));
}

// ============================================================================
// Address Tests
// ============================================================================

#[test]
fn test_photo_address_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let args = ["address", "photo", "--creator", WALLET, "--hash", ABC_SHA256];

    let first = candor(&temp).args(args).assert().success().get_output().stdout.clone();
    let second = candor(&temp).args(args).assert().success().get_output().stdout.clone();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_invalid_hash_is_usage_error() {
    let temp = TempDir::new().unwrap();
    candor(&temp)
        .args(["address", "photo", "--creator", WALLET, "--hash", "abcd"])
        .assert()
        .code(64)
        .stderr(predicate::str::contains("Invalid photo hash"));
}

// ============================================================================
// Session Tests
// ============================================================================

#[test]
fn test_session_connect_and_disconnect() {
    let temp = TempDir::new().unwrap();

    candor(&temp)
        .args(["session", "connect", WALLET])
        .assert()
        .success();
    let saved = fs::read_to_string(temp.path().join("session.json")).unwrap();
    assert!(saved.contains(WALLET));

    candor(&temp)
        .args(["session", "onboard", "--name", "  Ada  "])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ada"));

    candor(&temp)
        .args(["--json", "session", "disconnect"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"displayName\": \"Anon\""))
        .stdout(predicate::str::contains(WALLET).not());
}

#[test]
fn test_fresh_session_is_not_connected() {
    let temp = TempDir::new().unwrap();
    candor(&temp)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not connected"));
}

// ============================================================================
// Verify Tests
// ============================================================================

#[test]
fn test_verify_dry_run_requires_wallet() {
    let temp = TempDir::new().unwrap();
    let image = write_image(&temp, b"abc");

    // Exit code 65 = request rejected locally
    candor(&temp)
        .args(["verify", &image, "--dry-run"])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Wallet not connected"));
}

#[test]
fn test_verify_dry_run_with_connected_session() {
    let temp = TempDir::new().unwrap();
    let image = write_image(&temp, b"abc");
    candor(&temp)
        .args(["session", "connect", WALLET])
        .assert()
        .success();

    candor(&temp)
        .args(["--json", "verify", &image, "--dry-run", "--caption", "  "])
        .assert()
        .success()
        .stdout(predicate::str::contains(ABC_SHA256))
        .stdout(predicate::str::contains("\"verification\": \"skipped\""))
        .stdout(predicate::str::contains("\"status\": \"stored\""))
        .stdout(predicate::str::contains("\"caption\": null"));
}

#[test]
fn test_verify_without_keypair_is_usage_error() {
    let temp = TempDir::new().unwrap();
    let image = write_image(&temp, b"abc");

    candor(&temp)
        .args(["verify", &image])
        .assert()
        .code(64)
        .stderr(predicate::str::contains("--keypair is required"));
}

// ============================================================================
// Vouch Tests
// ============================================================================

#[test]
fn test_vouch_missing_keypair_returns_input_error() {
    let temp = TempDir::new().unwrap();
    candor(&temp)
        .args([
            "vouch",
            "--photo-id",
            "6f1c2d3e-4b5a-4c7d-8e9f-0a1b2c3d4e5f",
            "--creator",
            WALLET,
            "--hash",
            ABC_SHA256,
            "--keypair",
            "missing-id.json",
        ])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read keypair file"));
}

#[test]
fn test_vouch_rejects_unparseable_amount() {
    let temp = TempDir::new().unwrap();
    candor(&temp)
        .args([
            "vouch",
            "--photo-id",
            "6f1c2d3e-4b5a-4c7d-8e9f-0a1b2c3d4e5f",
            "--creator",
            WALLET,
            "--hash",
            ABC_SHA256,
            "--keypair",
            "id.json",
            "--amount",
            "lots",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a number"));
}
