//! cli::commands::dirs
//!
//! `ls`, `rmdir` and `mvdir`.

use anyhow::Result;

use super::{repo_path, Context};
use crate::core::types::EntryKind;

/// List a directory: kind, short hash and name per line.
pub async fn ls(ctx: &Context, dir: Option<&str>) -> Result<()> {
    let dir = dir.map(repo_path).transpose()?;
    let session = ctx.session()?;
    let children = session.directories.list(dir.as_ref()).await?;

    for child in children {
        let suffix = if child.kind == EntryKind::Tree { "/" } else { "" };
        println!("{}  {}  {}{}", child.kind, child.oid.short(7), child.name, suffix);
    }
    Ok(())
}

/// Delete a directory.
pub async fn rmdir(ctx: &Context, dir: &str) -> Result<()> {
    let dir = repo_path(dir)?;
    let session = ctx.session()?;
    session.directories.delete(&dir).await?;

    if !ctx.quiet {
        println!("Deleted {}/", dir);
    }
    Ok(())
}

/// Rename a directory.
pub async fn mvdir(ctx: &Context, old: &str, new: &str) -> Result<()> {
    let old = repo_path(old)?;
    let new = repo_path(new)?;
    let session = ctx.session()?;
    session.directories.rename(&old, &new).await?;

    if !ctx.quiet {
        println!("Renamed {}/ -> {}/", old, new);
    }
    Ok(())
}
