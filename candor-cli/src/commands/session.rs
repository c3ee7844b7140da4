//! Session command - the wallet and profile a front end remembers.

use std::path::Path;

use anyhow::Result;
use candor_core::format::truncate_address;
use colored::Colorize;

use crate::utils;
use crate::SessionCommand;

pub fn execute(command: SessionCommand, path: &Path, json: bool) -> Result<()> {
    let mut session = utils::load_session(path)?;

    // Every mutation writes through to the session file.
    match command {
        SessionCommand::Show => {}
        SessionCommand::Connect { wallet } => session.connect(wallet)?,
        SessionCommand::Disconnect => session.disconnect()?,
        SessionCommand::Onboard { name } => {
            if let Some(name) = name {
                session.set_display_name(name)?;
            }
            session.complete_onboarding()?;
        }
    }

    if json {
        return utils::print_json(&session.to_json());
    }

    match session.wallet() {
        Some(wallet) => println!(
            "{} {}",
            "Wallet:".dimmed(),
            truncate_address(&wallet.to_string(), 4).green()
        ),
        None => println!("{} {}", "Wallet:".dimmed(), "not connected".yellow()),
    }
    println!("{} {}", "Name:".dimmed(), session.display_name());
    println!(
        "{} {}",
        "Onboarded:".dimmed(),
        if session.is_onboarded() { "yes" } else { "no" }
    );
    Ok(())
}
