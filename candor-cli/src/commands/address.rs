//! Address command - derive program record addresses offline.

use anyhow::{Context, Result};
use candor_core::{photo_record_address, vouch_record_address, CandorError, ImageHash, PipelineConfig};
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use crate::utils;
use crate::AddressCommand;

pub fn execute(command: AddressCommand, json: bool) -> Result<()> {
    let program_id = PipelineConfig::from_env().program_id;

    let (kind, address, bump) = match command {
        AddressCommand::Photo { creator, hash } => {
            let image_hash = ImageHash::from_hex(&hash)
                .map_err(CandorError::from)
                .context("Invalid photo hash")?;
            let (address, bump) = photo_record_address(&program_id, &creator, &image_hash);
            ("photo", address, bump)
        }
        AddressCommand::Vouch {
            voucher,
            photo_record,
        } => {
            let (address, bump) = vouch_record_address(&program_id, &voucher, &photo_record);
            ("vouch", address, bump)
        }
    };

    if json {
        return print_address_json(kind, &program_id, &address, bump);
    }
    println!("{address}");
    Ok(())
}

fn print_address_json(kind: &str, program_id: &Pubkey, address: &Pubkey, bump: u8) -> Result<()> {
    utils::print_json(&json!({
        "kind": kind,
        "program_id": program_id.to_string(),
        "address": address.to_string(),
        "bump": bump,
    }))
}
