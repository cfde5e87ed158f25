use anyhow::Result;
use tollgate_auth::clock::{Clock, SystemClock};
use tollgate_auth::storage::PersistedGrantStore;

use crate::config::DeploymentFile;
use crate::output::print_success;

pub async fn sweep(deployment: &DeploymentFile) -> Result<()> {
    let store = deployment.postgres_store().await?;
    let removed = store.remove_expired(SystemClock.now()).await?;
    print_success(&format!("Removed {removed} expired grant(s)"));
    Ok(())
}

pub async fn migrate(deployment: &DeploymentFile) -> Result<()> {
    deployment.postgres_store().await?;
    print_success("Grant store schema is up to date");
    Ok(())
}
