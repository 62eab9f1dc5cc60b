//! Controller wiring.
//!
//! Builds the Kubernetes client and assembles the reconciler plus the
//! scale-up engine integration points (pod-list hook and scale-up status
//! processor) from one configuration struct.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kube::Client;
use tokio::sync::watch;
use tracing::info;

use buffer_client::{BufferClientTrait, KubeBufferClient};

use crate::error::ControllerError;
use crate::hook::{FakePodsRegistry, PodListHook};
use crate::reconciler::Reconciler;
use crate::scale_up_status::{FakePodsScaleUpStatusProcessor, RecorderEventSink};

const CONTROLLER_NAME: &str = "capacity-buffer-controller";

/// Controller configuration, read from the environment in `main`.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Time between reconcile passes.
    pub reconcile_interval: Duration,
    /// Every n-th pass bypasses the change filter.
    pub full_sweep_every: u64,
    /// Namespace to watch; `None` watches all namespaces.
    pub watch_namespace: Option<String>,
    /// Provisioning strategies this controller instance handles.
    pub allowed_strategies: Vec<String>,
    /// Annotate placeholder pods as safe to evict.
    pub force_safe_to_evict: bool,
}

/// Main controller for capacity buffer management.
pub struct Controller {
    reconciler: Reconciler,
    hook: PodListHook,
    scale_up_processor: FakePodsScaleUpStatusProcessor,
    interval: Duration,
}

impl Controller {
    /// Creates a new controller instance against the ambient cluster.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing capacity buffer controller");

        let kube_client = Client::try_default().await?;
        let client: Arc<dyn BufferClientTrait> = Arc::new(KubeBufferClient::new(
            kube_client.clone(),
            config.watch_namespace,
        ));

        let reconciler = Reconciler::new(
            client.clone(),
            config.allowed_strategies.clone(),
            config.full_sweep_every,
        );

        let registry = Arc::new(Mutex::new(FakePodsRegistry::default()));
        let hook = PodListHook::new(
            client,
            config.allowed_strategies,
            registry.clone(),
            config.force_safe_to_evict,
        );
        let events = Arc::new(RecorderEventSink::new(kube_client, CONTROLLER_NAME));
        let scale_up_processor = FakePodsScaleUpStatusProcessor::new(registry, events);

        Ok(Self {
            reconciler,
            hook,
            scale_up_processor,
            interval: config.reconcile_interval,
        })
    }

    /// The hook an embedding scale-up engine calls before each attempt.
    pub fn pod_list_hook(&mut self) -> &mut PodListHook {
        &mut self.hook
    }

    /// The processor an embedding scale-up engine calls after each attempt.
    pub fn scale_up_status_processor(&self) -> &FakePodsScaleUpStatusProcessor {
        &self.scale_up_processor
    }

    /// Runs the reconcile loop until an interrupt signal arrives. An
    /// in-flight pass completes before shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Capacity buffer controller running");

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                let _ = stop_tx.send(true);
            }
        });

        self.reconciler.run(self.interval, stop_rx).await;
        Ok(())
    }
}
