use act_zero::runtimes::tokio::spawn_actor;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing::subscriber::set_global_default;
use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};
use vmss_node_groups::cloud_provider;
use vmss_node_groups::config::load_config;
use vmss_node_groups::node_groups::{Manager, NodeGroup, NodeGroupRefresher};

fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(ErrorLayer::default());

    set_global_default(subscriber).context("Failed to set subscriber")?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let config = load_config()?;

    let client = cloud_provider::build_from_config(Arc::clone(&config))?;
    let manager = Manager::create(Arc::clone(&config), client)
        .await
        .context("Initial node group discovery failed")?;

    for node_group in manager.get_asgs() {
        info!(
            name = node_group.id(),
            min = node_group.min_size(),
            max = node_group.max_size(),
            "Registered node group"
        );
    }

    let _refresher = spawn_actor(NodeGroupRefresher::new(
        Arc::clone(&manager),
        config.refresh_interval,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
