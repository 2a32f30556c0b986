//! cli::commands::order
//!
//! `order show|add|remove|rename-subfolder`.

use anyhow::Result;

use super::Context;

pub async fn show(ctx: &Context, collection: &str) -> Result<()> {
    let session = ctx.session()?;
    let index = session.orders.read(collection).await?;
    for item in index.order {
        println!("{}", item);
    }
    Ok(())
}

pub async fn add(ctx: &Context, collection: &str, item: &str, index: Option<usize>) -> Result<()> {
    let session = ctx.session()?;
    session.orders.add_item(collection, item, index).await?;
    if !ctx.quiet {
        println!("Added {} to {}", item, collection);
    }
    Ok(())
}

pub async fn remove(ctx: &Context, collection: &str, item: &str) -> Result<()> {
    let session = ctx.session()?;
    session.orders.delete_item(collection, item).await?;
    if !ctx.quiet {
        println!("Removed {} from {}", item, collection);
    }
    Ok(())
}

pub async fn rename_subfolder(ctx: &Context, collection: &str, old: &str, new: &str) -> Result<()> {
    let session = ctx.session()?;
    session.orders.rename_subfolder(collection, old, new).await?;
    if !ctx.quiet {
        println!("Renamed {}/ -> {}/ in {}", old, new, collection);
    }
    Ok(())
}
