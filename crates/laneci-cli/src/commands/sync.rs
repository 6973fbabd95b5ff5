//! Configuration repository synchronization.

use anyhow::{Context, Result};
use laneci_service::Services;
use laneci_store::PullOutcome;

pub async fn push(services: &Services) -> Result<()> {
    let store = services.store.clone();
    tokio::task::spawn_blocking(move || store.push())
        .await?
        .context("Failed to push configuration repository")?;
    println!("Pushed {}", services.store.branch());
    Ok(())
}

pub async fn pull(services: &Services) -> Result<()> {
    let store = services.store.clone();
    let outcome = tokio::task::spawn_blocking(move || store.pull())
        .await?
        .context("Failed to pull configuration repository")?;
    match outcome {
        PullOutcome::UpToDate => println!("Already up to date"),
        PullOutcome::FastForwarded => println!("Fast-forwarded {}", services.store.branch()),
    }
    Ok(())
}
