//! cli::commands::repair
//!
//! Reset a local clone after a partially applied commit.

use anyhow::{bail, Context as _, Result};

use super::Context;
use crate::core::config::BackendKind;
use crate::store::open_local_store;

pub async fn repair(ctx: &Context) -> Result<()> {
    if ctx.config.backend() != BackendKind::Local {
        bail!("repair only applies to the local backend");
    }
    let store = open_local_store(&ctx.config, &ctx.cwd).context("Failed to open repository")?;
    match store.repair().await.context("Repair failed")? {
        Some(repaired) => {
            if !ctx.quiet {
                println!(
                    "Reset {} from {} to {}",
                    repaired.marker.branch,
                    repaired.marker.attempted.short(7),
                    repaired.restored.short(7)
                );
            }
        }
        None => {
            if !ctx.quiet {
                println!("Nothing to repair");
            }
        }
    }
    Ok(())
}
