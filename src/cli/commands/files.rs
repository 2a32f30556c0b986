//! cli::commands::files
//!
//! `read`, `write`, `rm` and `mv`.

use std::io::{Read, Write};

use anyhow::{Context as _, Result};

use super::{repo_path, Context};
use crate::core::types::Oid;
use crate::engine::EngineError;

fn parse_hash(arg: Option<&str>) -> Result<Option<Oid>> {
    arg.map(|h| Oid::new(h).with_context(|| format!("Invalid hash '{}'", h)))
        .transpose()
}

/// Print a file's content, or its hash with `--hash`.
pub async fn read(ctx: &Context, path: &str, hash: bool) -> Result<()> {
    let path = repo_path(path)?;
    let session = ctx.session()?;
    let file = session.files.read(&path).await?;

    if hash {
        println!("{}", file.oid);
    } else {
        std::io::stdout()
            .write_all(&file.content)
            .context("Failed to write to stdout")?;
    }
    Ok(())
}

/// Create the file if it is absent, otherwise update it.
pub async fn write(ctx: &Context, path: &str, content: Option<String>, expect: Option<&str>) -> Result<()> {
    let path = repo_path(path)?;
    let expected = parse_hash(expect)?;
    let content = match content {
        Some(c) => c.into_bytes(),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read content from stdin")?;
            buf
        }
    };

    let session = ctx.session()?;
    let oid = match session.files.update(&path, &content, expected.as_ref()).await {
        Err(EngineError::NotFound(_)) if expected.is_none() => {
            session.files.create(&path, &content).await?
        }
        other => other?,
    };

    if !ctx.quiet {
        println!("{}", oid);
    }
    Ok(())
}

/// Delete a file.
pub async fn rm(ctx: &Context, path: &str, expect: Option<&str>) -> Result<()> {
    let path = repo_path(path)?;
    let expected = parse_hash(expect)?;
    let session = ctx.session()?;
    session.files.delete(&path, expected.as_ref()).await?;

    if !ctx.quiet {
        println!("Deleted {}", path);
    }
    Ok(())
}

/// Rename a file, keeping its content.
pub async fn mv(ctx: &Context, old: &str, new: &str, expect: Option<&str>) -> Result<()> {
    let old = repo_path(old)?;
    let new = repo_path(new)?;
    let expected = parse_hash(expect)?;
    let session = ctx.session()?;

    let current = session.files.read(&old).await?;
    let expected = expected.unwrap_or(current.oid);
    let oid = session
        .files
        .rename(&old, &new, &current.content, Some(&expected))
        .await?;

    if !ctx.quiet {
        println!("Renamed {} -> {} ({})", old, new, oid.short(7));
    }
    Ok(())
}
