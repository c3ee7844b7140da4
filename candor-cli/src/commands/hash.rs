//! Hash command - seal an image file without touching the network.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candor_core::{
    CaptureMetadata, Capturer, FileCamera, FixedLocation, LocationSource, NoLocation,
    PipelineConfig,
};
use colored::Colorize;
use tracing::info;

use crate::utils;
use crate::LocationArgs;

/// Seal `file` the way the camera flow does: hash the exact bytes, then fuzz
/// the optional position.
pub async fn seal_file(file: PathBuf, location: &LocationArgs) -> Result<CaptureMetadata> {
    let precision = PipelineConfig::from_env().coordinate_precision;
    let metadata = match location.position() {
        Some(position) => capture(file, FixedLocation::granted(position), precision, true).await,
        None => capture(file, NoLocation, precision, false).await,
    }?;
    info!(image_hash = %metadata.image_hash(), "Image sealed");
    Ok(metadata)
}

async fn capture<L: LocationSource>(
    file: PathBuf,
    location: L,
    precision: u32,
    wants_location: bool,
) -> Result<CaptureMetadata> {
    let capturer = Capturer::new(FileCamera::new(file), location, precision);
    let metadata = capturer
        .capture(wants_location)
        .await
        .map_err(candor_core::CandorError::from)
        .context("Failed to seal image")?;
    Ok(metadata)
}

pub async fn execute(file: PathBuf, location: LocationArgs, json: bool) -> Result<()> {
    let metadata = seal_file(file, &location).await?;

    if json {
        return utils::print_json(&metadata);
    }

    println!("{}", "Image sealed".green().bold());
    println!();
    println!("   {} {}", "Hash:".dimmed(), metadata.image_hash());
    match metadata.location() {
        Some(loc) => println!(
            "   {} {}, {}",
            "Location:".dimmed(),
            loc.latitude(),
            loc.longitude()
        ),
        None => println!("   {} {}", "Location:".dimmed(), "none".dimmed()),
    }
    println!("   {} {}", "Timestamp:".dimmed(), metadata.timestamp());
    Ok(())
}
