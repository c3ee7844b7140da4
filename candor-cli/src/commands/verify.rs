//! Verify command - record a photo on-chain, upload it and save the row.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use candor_core::persistence::{PgRecordStore, StorageBucket, StorageBucketConfig};
use candor_core::{
    explorer_tx_url, CaptureOutcome, CapturePipeline, MemoryStore, PersistenceStatus,
    PipelineConfig, Session,
};
use colored::Colorize;
use solana_sdk::signature::Signer;
use tracing::{info, warn};

use crate::commands::hash::seal_file;
use crate::rpc::{KeypairSigner, RpcLedger};
use crate::utils;
use crate::LocationArgs;

/// Pool size for the record store; the CLI runs one flow at a time.
const DB_MAX_CONNECTIONS: u32 = 2;

pub struct VerifyArgs {
    pub file: PathBuf,
    pub keypair: Option<PathBuf>,
    pub caption: String,
    pub location: LocationArgs,
    pub dry_run: bool,
    pub session: PathBuf,
    pub json: bool,
}

pub async fn execute(args: VerifyArgs) -> Result<()> {
    let metadata = seal_file(args.file.clone(), &args.location).await?;
    let stored_session = utils::load_session(&args.session)?;

    let outcome = if args.dry_run {
        warn!("Dry run: ledger skipped, records kept in memory");
        let session = match &args.keypair {
            Some(path) => Session::connected(utils::load_keypair(path)?.pubkey()),
            None => stored_session,
        };
        let store = Arc::new(MemoryStore::new());
        let pipeline = CapturePipeline::new(
            PipelineConfig {
                program_id: candor_core::PLACEHOLDER_PROGRAM_ID,
                ..PipelineConfig::from_env()
            },
            store.clone(),
            store,
        );
        pipeline
            .verify_and_upload(&session, metadata, &args.caption)
            .await?
    } else {
        let Some(keypair_path) = &args.keypair else {
            bail!("Invalid arguments: --keypair is required unless --dry-run is set");
        };
        let keypair = utils::load_keypair(keypair_path)?;
        let wallet = keypair.pubkey();
        if let Some(connected) = stored_session.wallet() {
            if *connected != wallet {
                bail!("Invalid keypair: {wallet} is not the connected wallet {connected}");
            }
        }

        let config = PipelineConfig::from_env();
        let rpc_url = std::env::var("SOLANA_RPC_URL")
            .unwrap_or_else(|_| config.cluster.rpc_url().to_string());
        info!(%rpc_url, program_id = %config.program_id, "Using ledger");

        let ledger = RpcLedger::new(rpc_url);
        let signer = KeypairSigner::new(keypair, ledger.client());

        let records = PgRecordStore::connect(&utils::require_env("DATABASE_URL")?, DB_MAX_CONNECTIONS)
            .await
            .map_err(candor_core::CandorError::from)
            .context("Failed to connect to record store")?;
        let blobs = StorageBucket::new(StorageBucketConfig::new(
            utils::require_env("STORAGE_URL")?,
            utils::require_env("STORAGE_API_KEY")?,
        ))
        .map_err(candor_core::CandorError::from)?;

        let pipeline = CapturePipeline::new(config, Arc::new(blobs), Arc::new(records))
            .with_ledger(Arc::new(ledger), Arc::new(signer));
        pipeline
            .verify_and_upload(&Session::connected(wallet), metadata, &args.caption)
            .await?
    };

    report(&outcome, PipelineConfig::from_env().cluster, args.json)
}

fn report(outcome: &CaptureOutcome, cluster: candor_core::Cluster, json: bool) -> Result<()> {
    if json {
        utils::print_json(outcome)?;
    } else {
        let photo = &outcome.photo;
        println!("{}", "Photo verified".green().bold());
        println!();
        println!("   {} {}", "Hash:".dimmed(), photo.image_hash);
        match photo.verification.signature() {
            Some(signature) => {
                println!("   {} {}", "Transaction:".dimmed(), signature);
                println!(
                    "   {} {}",
                    "Explorer:".dimmed(),
                    explorer_tx_url(&signature.to_string(), cluster).cyan()
                );
            }
            None => println!(
                "   {} {}",
                "Transaction:".dimmed(),
                "skipped (program not deployed)".yellow()
            ),
        }
        println!("   {} {}", "Image:".dimmed(), photo.image_url);
        if let Some(caption) = &photo.caption {
            println!("   {} {}", "Caption:".dimmed(), caption);
        }
        if let PersistenceStatus::Stored { id, .. } = &outcome.persistence {
            println!("   {} {}", "Record:".dimmed(), id);
        }
    }

    if let Some(notice) = outcome.user_notice() {
        utils::print_notice(&notice);
    }
    Ok(())
}
