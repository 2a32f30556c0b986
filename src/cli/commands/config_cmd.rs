//! cli::commands::config_cmd
//!
//! `config show`.

use anyhow::{Context as _, Result};

use super::Context;

/// Print the effective configuration and where it was loaded from.
pub fn show(ctx: &Context) -> Result<()> {
    let effective = toml::to_string_pretty(&ctx.config.effective())
        .context("Failed to render config")?;

    if !ctx.quiet {
        if let Some(path) = ctx.config.global_config_loaded_from() {
            println!("# global: {}", path.display());
        }
        if let Some(path) = ctx.config.site_config_loaded_from() {
            println!("# site: {}", path.display());
        }
    }
    print!("{}", effective);
    Ok(())
}
