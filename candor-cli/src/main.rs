//! Candor CLI - capture, verify and vouch for photos on Solana.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use solana_sdk::pubkey::Pubkey;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod rpc;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success (also when signing was declined)
  64  Usage error
  65  Request rejected (self-vouch, amount, balance)
  66  Input file not found
  69  Ledger, database or storage unavailable
  74  Session file error
  75  Another operation is in progress
  78  Configuration error";

#[derive(Parser)]
#[command(name = "candor")]
#[command(author, version, about = "Photo verification and vouching on Solana", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Session file (defaults to ~/.candor/session.json)
    #[arg(long, global = true, env = "CANDOR_SESSION", value_name = "PATH")]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seal an image: content hash, fuzzed location and timestamp
    Hash {
        /// Image file to seal
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// Verify a photo on-chain, upload it and save the record
    Verify {
        /// Image file to verify
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Wallet keypair file (Solana CLI format)
        #[arg(short, long, value_name = "KEYPAIR")]
        keypair: Option<PathBuf>,

        /// Caption stored with the photo
        #[arg(short, long, default_value = "")]
        caption: String,

        #[command(flatten)]
        location: LocationArgs,

        /// Skip the ledger and use in-memory storage
        #[arg(long)]
        dry_run: bool,
    },

    /// Vouch for a photo by sending SOL to its creator
    Vouch {
        /// Photo record id
        #[arg(long, value_name = "UUID")]
        photo_id: uuid::Uuid,

        /// Creator wallet address
        #[arg(long, value_name = "PUBKEY")]
        creator: Pubkey,

        /// Hex-encoded SHA-256 of the photo
        #[arg(long, value_name = "HEX")]
        hash: String,

        /// Amount in SOL (max 5)
        #[arg(short, long, default_value = "0.005", value_parser = utils::parse_sol)]
        amount: u64,

        /// Wallet keypair file (Solana CLI format)
        #[arg(short, long, value_name = "KEYPAIR")]
        keypair: PathBuf,

        /// Print the instruction without sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Derive program record addresses
    #[command(subcommand)]
    Address(AddressCommand),

    /// Inspect or change the local wallet session
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand)]
pub enum AddressCommand {
    /// Photo record for a creator and image hash
    Photo {
        #[arg(long, value_name = "PUBKEY")]
        creator: Pubkey,

        /// Hex-encoded SHA-256 of the photo
        #[arg(long, value_name = "HEX")]
        hash: String,
    },

    /// Vouch record for a voucher and photo record
    Vouch {
        #[arg(long, value_name = "PUBKEY")]
        voucher: Pubkey,

        #[arg(long, value_name = "PUBKEY")]
        photo_record: Pubkey,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Show the current session
    Show,

    /// Connect a wallet address
    Connect {
        #[arg(value_name = "PUBKEY")]
        wallet: Pubkey,
    },

    /// Forget the connected wallet and reset the profile
    Disconnect,

    /// Finish onboarding, optionally setting a display name
    Onboard {
        #[arg(long)]
        name: Option<String>,
    },
}

/// Raw position to attach to a capture. Fuzzed before use.
#[derive(clap::Args, Debug, Clone)]
pub struct LocationArgs {
    /// Latitude in degrees
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude in degrees
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Reported accuracy in meters
    #[arg(long)]
    accuracy: Option<f64>,
}

impl LocationArgs {
    pub fn position(&self) -> Option<candor_core::RawPosition> {
        Some(candor_core::RawPosition {
            latitude: self.lat?,
            longitude: self.lon?,
            accuracy: self.accuracy,
            mocked: false,
        })
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "candor_core=info,candor=info",
        2 => "candor_core=debug,candor=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let session = utils::session_path(cli.session);
    let json = cli.json;

    match cli.command {
        Commands::Hash { file, location } => commands::hash::execute(file, location, json).await,
        Commands::Verify {
            file,
            keypair,
            caption,
            location,
            dry_run,
        } => {
            commands::verify::execute(commands::verify::VerifyArgs {
                file,
                keypair,
                caption,
                location,
                dry_run,
                session,
                json,
            })
            .await
        }
        Commands::Vouch {
            photo_id,
            creator,
            hash,
            amount,
            keypair,
            dry_run,
        } => {
            commands::vouch::execute(commands::vouch::VouchArgs {
                photo_id,
                creator,
                hash,
                amount,
                keypair,
                dry_run,
                json,
            })
            .await
        }
        Commands::Address(command) => commands::address::execute(command, json),
        Commands::Session(command) => commands::session::execute(command, &session, json),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit = match run(cli).await {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };

    if let Some(message) = &exit.message {
        if exit.code == exit_codes::SUCCESS {
            eprintln!("{}", message.dimmed());
        } else {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
    }
    std::process::exit(exit.code);
}
