//! Read-through, mutate, invalidate, read again against a live Redis.
//!
//! Run with: cargo run --example invalidation_flow
//! Connection and timing settings come from `CACHE_*` environment variables.

use cache_invalidation::{Signal, SignalBus};
use subshare_cache::views::GroupDetail;
use subshare_cache::{CacheConfig, CacheCoordinator, CacheView, CancellationToken};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn load_group(id: &str, name: &str) -> Result<GroupDetail, std::io::Error> {
    info!(group_id = id, "Loading group from the database");
    Ok(GroupDetail {
        id: id.to_string(),
        name: name.to_string(),
        owner_id: "U1".to_string(),
        members: Vec::new(),
        shared_subscriptions: Vec::new(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CacheConfig::from_env()?;
    let coordinator = CacheCoordinator::connect(&config).await?;
    let bus = SignalBus::with_default_handlers(coordinator.store());
    let cancel = CancellationToken::new();

    let key = CacheView::GroupDetail.key("G1")?;
    let ttl = config.ttl_for(CacheView::GroupDetail);

    let group = coordinator
        .get_or_populate(&key, ttl, || load_group("G1", "Family"), &cancel)
        .await?;
    info!(name = %group.name, "First read");

    let group = coordinator
        .get_or_populate(&key, ttl, || load_group("G1", "never loaded"), &cancel)
        .await?;
    info!(name = %group.name, "Second read served from cache");

    // Rename committed elsewhere; drop the stale entries
    let report = bus
        .publish(
            &Signal::GroupUpdated {
                group_id: "G1".to_string(),
                user_id: "U1".to_string(),
            },
            &cancel,
        )
        .await?;
    info!(handlers = report.handlers, "Invalidation published");

    let group = coordinator
        .get_or_populate(&key, ttl, || load_group("G1", "Family Plan"), &cancel)
        .await?;
    info!(name = %group.name, "Read after invalidation");

    info!(stats = ?bus.stats(), "Done");
    Ok(())
}
