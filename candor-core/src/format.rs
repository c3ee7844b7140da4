//! Display helpers for lamport amounts and explorer links.

use solana_sdk::native_token::LAMPORTS_PER_SOL;

use crate::config::Cluster;

/// Format lamports as SOL with precision scaled to the magnitude.
pub fn format_sol(lamports: u64) -> String {
    let sol = lamports as f64 / LAMPORTS_PER_SOL as f64;
    if sol < 0.001 {
        format!("{sol:.6} SOL")
    } else if sol < 1.0 {
        format!("{sol:.4} SOL")
    } else {
        format!("{sol:.2} SOL")
    }
}

/// Convert a SOL amount to lamports, rounding to the nearest lamport.
pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).round().max(0.0) as u64
}

/// Explorer link for a transaction signature.
pub fn explorer_tx_url(signature: &str, cluster: Cluster) -> String {
    format!(
        "https://explorer.solana.com/tx/{}?cluster={}",
        signature,
        cluster.as_str()
    )
}

/// Explorer link for an account address.
pub fn explorer_address_url(address: &str, cluster: Cluster) -> String {
    format!(
        "https://explorer.solana.com/address/{}?cluster={}",
        address,
        cluster.as_str()
    )
}

/// Shorten a base58 address to `head...tail`.
pub fn truncate_address(address: &str, chars: usize) -> String {
    if address.len() <= chars * 2 + 3 {
        return address.to_string();
    }
    format!(
        "{}...{}",
        &address[..chars],
        &address[address.len() - chars..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sol_precision() {
        assert_eq!(format_sol(15_000), "0.000015 SOL");
        assert_eq!(format_sol(5_000_000), "0.0050 SOL");
        assert_eq!(format_sol(5_000_000_000), "5.00 SOL");
    }

    #[test]
    fn test_sol_to_lamports() {
        assert_eq!(sol_to_lamports(0.005), 5_000_000);
        assert_eq!(sol_to_lamports(5.0), 5_000_000_000);
        assert_eq!(sol_to_lamports(-1.0), 0);
    }

    #[test]
    fn test_explorer_urls() {
        assert_eq!(
            explorer_tx_url("abc", Cluster::Devnet),
            "https://explorer.solana.com/tx/abc?cluster=devnet"
        );
        assert_eq!(
            explorer_address_url("xyz", Cluster::MainnetBeta),
            "https://explorer.solana.com/address/xyz?cluster=mainnet-beta"
        );
    }

    #[test]
    fn test_truncate_address() {
        assert_eq!(
            truncate_address("HDvUruses5D2tPCUZnhkLiR4GB2B49GwkpjJJUKjCAvw", 4),
            "HDvU...CAvw"
        );
        assert_eq!(truncate_address("short", 4), "short");
    }
}
