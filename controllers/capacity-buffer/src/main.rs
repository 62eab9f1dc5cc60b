//! Capacity Buffer Controller
//!
//! Keeps warm cluster headroom by translating `CapacityBuffer` CRDs into
//! placeholder pods for the cluster scale-up engine.

use std::env;
use std::time::Duration;

use tracing::info;

use capacity_buffer_controller::controller::{Controller, ControllerConfig};
use capacity_buffer_controller::error::ControllerError;
use crds::ACTIVE_CAPACITY_STRATEGY;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting Capacity Buffer Controller");

    // Load configuration from environment variables
    let reconcile_interval = parse_env_u64("RECONCILE_INTERVAL_SECONDS", 5)?;
    let full_sweep_every = parse_env_u64("FULL_SWEEP_EVERY", 60)?;
    let watch_namespace = env::var("WATCH_NAMESPACE").ok();
    let allowed_strategies = env::var("ALLOWED_PROVISIONING_STRATEGIES")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|_| vec![ACTIVE_CAPACITY_STRATEGY.to_string()]);
    let force_safe_to_evict = env::var("FORCE_SAFE_TO_EVICT")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    info!("Configuration:");
    info!("  Reconcile interval: {}s", reconcile_interval);
    info!("  Full sweep every: {} iterations", full_sweep_every);
    info!(
        "  Namespace: {}",
        watch_namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  Allowed strategies: {}", allowed_strategies.join(", "));
    info!("  Force safe-to-evict: {}", force_safe_to_evict);

    let config = ControllerConfig {
        reconcile_interval: Duration::from_secs(reconcile_interval),
        full_sweep_every,
        watch_namespace,
        allowed_strategies,
        force_safe_to_evict,
    };

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ControllerError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{name} must be a positive integer, got {raw:?}"))
        }),
        Err(_) => Ok(default),
    }
}
