//! Vouch command - pay a photo's creator and record the endorsement.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use candor_core::persistence::PgRecordStore;
use candor_core::{
    explorer_tx_url, format_sol, photo_record_address, vouch_record_address, CandorError,
    ImageHash, LedgerIntent, PipelineConfig, Session, ViewCache, VouchPipeline, VouchRequest,
};
use colored::Colorize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;
use tracing::info;

use crate::rpc::{KeypairSigner, RpcLedger};
use crate::utils;

const DB_MAX_CONNECTIONS: u32 = 2;

pub struct VouchArgs {
    pub photo_id: uuid::Uuid,
    pub creator: Pubkey,
    pub hash: String,
    pub amount: u64,
    pub keypair: PathBuf,
    pub dry_run: bool,
    pub json: bool,
}

pub async fn execute(args: VouchArgs) -> Result<()> {
    let image_hash = ImageHash::from_hex(&args.hash)
        .map_err(CandorError::from)
        .context("Invalid photo hash")?;
    let keypair = utils::load_keypair(&args.keypair)?;
    let voucher = keypair.pubkey();
    let config = PipelineConfig::from_env();

    if args.dry_run {
        return print_intent(&config, voucher, &args, &image_hash);
    }

    let rpc_url =
        std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| config.cluster.rpc_url().to_string());
    info!(%rpc_url, %voucher, "Using ledger");
    let ledger = Arc::new(RpcLedger::new(rpc_url));
    let signer = Arc::new(KeypairSigner::new(keypair, ledger.client()));

    let records = PgRecordStore::connect(&utils::require_env("DATABASE_URL")?, DB_MAX_CONNECTIONS)
        .await
        .map_err(CandorError::from)
        .context("Failed to connect to record store")?;

    let cluster = config.cluster;
    let pipeline = VouchPipeline::new(config, ledger, signer, Arc::new(records), ViewCache::new());
    let outcome = pipeline
        .vouch(
            &Session::connected(voucher),
            VouchRequest {
                photo_id: args.photo_id,
                creator_wallet: args.creator,
                image_hash,
                amount_lamports: args.amount,
            },
        )
        .await?;

    if args.json {
        utils::print_json(&outcome)?;
    } else {
        println!("{}", "Vouch sent".green().bold());
        println!();
        println!("   {} {}", "Amount:".dimmed(), format_sol(outcome.amount_lamports));
        println!("   {} {}", "Transaction:".dimmed(), outcome.signature);
        println!(
            "   {} {}",
            "Explorer:".dimmed(),
            explorer_tx_url(&outcome.signature.to_string(), cluster).cyan()
        );
        println!("   {} {}", "Photo record:".dimmed(), outcome.photo_record);
    }

    if let Some(notice) = outcome.user_notice() {
        utils::print_notice(&notice);
    }
    Ok(())
}

/// Show the instruction a vouch would submit, without sending anything.
fn print_intent(
    config: &PipelineConfig,
    voucher: Pubkey,
    args: &VouchArgs,
    image_hash: &ImageHash,
) -> Result<()> {
    let (photo_record, _) = photo_record_address(&config.program_id, &args.creator, image_hash);
    let (vouch_record, _) = vouch_record_address(&config.program_id, &voucher, &photo_record);
    let intent = LedgerIntent::vouch(voucher, args.creator, photo_record, args.amount);
    let data = hex::encode(intent.data());

    if args.json {
        return utils::print_json(&json!({
            "intent": intent,
            "program_id": config.program_id.to_string(),
            "vouch_record": vouch_record.to_string(),
            "data": data,
        }));
    }

    println!("{}", "Dry run: vouch not sent".yellow().bold());
    println!();
    println!("   {} {}", "Amount:".dimmed(), format_sol(args.amount));
    println!("   {} {}", "Voucher:".dimmed(), voucher);
    println!("   {} {}", "Photo record:".dimmed(), photo_record);
    println!("   {} {}", "Vouch record:".dimmed(), vouch_record);
    println!("   {} {}", "Data:".dimmed(), data);
    Ok(())
}
