use std::sync::Arc;

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use propmatch_core::{AppConfig, EngineDeps, NoopInvalidator};
use propmatch_domains::rebuild_snapshot;
use propmatch_domains::store::PgStore;

/// Admin entry point: rebuild one group's snapshot, e.g. after a manual
/// split or merge, and print the result.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let group_id = match std::env::args().nth(1) {
        Some(arg) => Uuid::parse_str(&arg)?,
        None => bail!("usage: rebuild-snapshot <group-id>"),
    };

    let config = AppConfig::from_env()?;
    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let deps = EngineDeps::new(Arc::new(store), Arc::new(NoopInvalidator), config);
    let snapshot = rebuild_snapshot(&deps, group_id).await?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
