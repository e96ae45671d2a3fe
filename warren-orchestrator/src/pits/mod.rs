//! Pit Orchestrator
//!
//! A pit realizes one job: a daemon container on the control node and one
//! worker container per process, on that process's node. Pits spanning
//! more than one physical machine get a private overlay network.
//!
//! Creation either completes or tears down everything it created before
//! returning the original error. Teardown finds a pit's containers by name
//! on every node, so it also removes members nobody remembers creating.

pub mod definition;
pub mod naming;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use warren_client::{ClientError, LxdClient, StateAction};
use warren_core::domain::job::JobId;
use warren_core::domain::node::{Cluster, Node};

use definition::{Device, Devices, ImageSource, container_definition, env_file, network_definition};
use naming::{ContainerName, HOST_SUFFIX, PREFIX, network_name};

/// Where the environment file is written inside every container
pub const PIT_INFO_PATH: &str = "/etc/pit_info";

/// Where a container's startup script is written
pub const SCRIPT_PATH: &str = "/usr/bin/script.sh";

#[derive(Debug, Error)]
pub enum PitError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Teardown of pit {pit_id} incomplete: {message}")]
    Teardown { pit_id: JobId, message: String },
}

pub type Result<T> = std::result::Result<T, PitError>;

/// One worker container of a pit
#[derive(Debug, Clone, PartialEq)]
pub struct PitWorker {
    pub node: Node,
    /// Devices besides the root disk and the overlay interface (e.g. GPUs)
    pub devices: Devices,
    /// Variables added to the pit-wide environment file
    pub env: BTreeMap<String, String>,
    pub script: Option<String>,
}

/// Everything needed to create a pit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PitSpec {
    pub pit_id: JobId,
    /// Host directories mounted into the daemon, keyed by container path
    pub shares: BTreeMap<String, String>,
    pub workers: Vec<PitWorker>,
}

pub struct PitOrchestrator {
    client: LxdClient,
    cluster: Cluster,
    daemon_image: String,
    worker_image: String,
    state_timeout: Duration,
    head_certificate: OnceCell<Option<String>>,
}

impl PitOrchestrator {
    pub fn new(
        client: LxdClient,
        cluster: Cluster,
        daemon_image: impl Into<String>,
        worker_image: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cluster,
            daemon_image: daemon_image.into(),
            worker_image: worker_image.into(),
            state_timeout: Duration::from_secs(10),
            head_certificate: OnceCell::new(),
        }
    }

    /// Timeout passed to the hosts for starting and stopping containers
    pub fn with_state_timeout(mut self, timeout: Duration) -> Self {
        self.state_timeout = timeout;
        self
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    // =============================================================================
    // Creation
    // =============================================================================

    /// Creates and starts a pit
    ///
    /// On failure every container and network of the pit is removed before
    /// the error is returned.
    pub async fn create_pit(&self, spec: &PitSpec) -> Result<()> {
        info!(pit_id = spec.pit_id, workers = spec.workers.len(), "Creating pit");

        match self.build_pit(spec).await {
            Ok(()) => {
                info!(pit_id = spec.pit_id, "Pit started");
                Ok(())
            }
            Err(e) => {
                warn!(pit_id = spec.pit_id, "Pit creation failed, tearing down: {}", e);
                if let Err(teardown) = self.drop_pit(spec.pit_id).await {
                    warn!(pit_id = spec.pit_id, "{}", teardown);
                }
                Err(e)
            }
        }
    }

    async fn build_pit(&self, spec: &PitSpec) -> Result<()> {
        let head = self.cluster.head();
        let pit_id = spec.pit_id;

        let certificate = self.head_certificate().await?;
        let daemon_image = ImageSource {
            server: head.endpoint.clone(),
            certificate: certificate.clone(),
            fingerprint: self.client.image_fingerprint(head, &self.daemon_image).await?,
        };
        let worker_image = ImageSource {
            server: head.endpoint.clone(),
            certificate,
            fingerprint: self.client.image_fingerprint(head, &self.worker_image).await?,
        };

        let physical = physical_nodes(head, spec.workers.iter().map(|w| &w.node));
        let network = if physical.len() > 1 {
            let name = network_name(pit_id);
            settle_all(physical.iter().map(|node| {
                let definition = network_definition(&name, pit_id, node, &physical);
                async move {
                    self.client
                        .create_network(node, definition)
                        .await
                        .map_err(PitError::from)
                }
            }))
            .await?;
            debug!(pit_id, network = %name, nodes = physical.len(), "Overlay network created");
            Some(name)
        } else {
            None
        };

        let daemon = ContainerName::daemon(head, pit_id);
        let workers: Vec<(ContainerName, &PitWorker)> = spec
            .workers
            .iter()
            .enumerate()
            .map(|(index, worker)| (ContainerName::worker(&worker.node, pit_id, index), worker))
            .collect();
        let worker_names: Vec<&ContainerName> = workers.iter().map(|(name, _)| name).collect();
        let pit_info = pit_info(pit_id, &daemon, &worker_names);

        let mut daemon_devices = Devices::new();
        if let Some(network) = &network {
            daemon_devices.insert("eth0".to_string(), Device::overlay_nic(network));
        }
        for (path, source) in &spec.shares {
            daemon_devices.insert(share_device_name(path), Device::share(path, source));
        }
        self.add_container(head, &daemon, &daemon_image, &daemon_devices, &pit_info, None)
            .await?;

        settle_all(workers.iter().map(|(name, worker)| {
            let mut devices = worker.devices.clone();
            if let Some(network) = &network {
                devices.insert("eth0".to_string(), Device::overlay_nic(network));
            }
            let mut env = pit_info.clone();
            env.extend(worker.env.iter().map(|(k, v)| (k.clone(), v.clone())));
            let image = &worker_image;
            async move {
                self.add_container(&worker.node, name, image, &devices, &env, worker.script.as_deref())
                    .await
            }
        }))
        .await?;

        self.start_container(head, &daemon).await?;
        settle_all(
            workers
                .iter()
                .map(|(name, worker)| self.start_container(&worker.node, name)),
        )
        .await?;

        Ok(())
    }

    async fn add_container(
        &self,
        node: &Node,
        name: &ContainerName,
        image: &ImageSource,
        devices: &Devices,
        env: &BTreeMap<String, String>,
        script: Option<&str>,
    ) -> Result<()> {
        let container = name.to_string();
        self.client
            .create_container(node, container_definition(&container, image, devices))
            .await?;
        self.client
            .push_file(node, &container, PIT_INFO_PATH, env_file(env))
            .await?;
        if let Some(script) = script {
            self.client.push_file(node, &container, SCRIPT_PATH, script).await?;
        }
        debug!(node = %node.id, container = %container, "Container created");
        Ok(())
    }

    async fn start_container(&self, node: &Node, name: &ContainerName) -> Result<()> {
        self.client
            .set_container_state(
                node,
                &name.to_string(),
                StateAction::Start,
                self.state_timeout.as_secs(),
                false,
            )
            .await?;
        Ok(())
    }

    async fn head_certificate(&self) -> Result<Option<String>> {
        let certificate = self
            .head_certificate
            .get_or_try_init(|| async {
                let info = self.client.server_info(self.cluster.head()).await?;
                Ok::<_, ClientError>(
                    info.pointer("/environment/certificate")
                        .and_then(|c| c.as_str())
                        .map(str::to_string),
                )
            })
            .await?;
        Ok(certificate.clone())
    }

    // =============================================================================
    // Teardown
    // =============================================================================

    /// Removes every container and the overlay network of a pit
    ///
    /// Best effort: a container that cannot be deleted is logged and the
    /// others are still removed. Returns an error only when some node could
    /// not be inspected, in which case members may remain there.
    pub async fn drop_pit(&self, pit_id: JobId) -> Result<()> {
        info!(pit_id, "Dropping pit");
        let physical = physical_nodes(self.cluster.head(), self.cluster.nodes());

        let listed = join_all(physical.iter().map(|node| self.drop_containers(node, pit_id))).await;

        let network = network_name(pit_id);
        let networks = join_all(physical.iter().map(|node| self.drop_network(node, &network))).await;

        let failures: Vec<String> = listed
            .into_iter()
            .chain(networks)
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if !failures.is_empty() {
            return Err(PitError::Teardown {
                pit_id,
                message: failures.join("; "),
            });
        }
        Ok(())
    }

    async fn drop_containers(&self, node: &Node, pit_id: JobId) -> Result<()> {
        let members: Vec<String> = self
            .client
            .list_containers(node)
            .await?
            .into_iter()
            .filter(|name| ContainerName::parse(name).is_some_and(|n| n.pit_id == pit_id))
            .collect();

        for name in members {
            // Fails for containers that are not running
            let _ = self
                .client
                .set_container_state(node, &name, StateAction::Stop, self.state_timeout.as_secs(), true)
                .await;

            match self.client.delete_container(node, &name).await {
                Ok(()) => debug!(node = %node.id, container = %name, "Container deleted"),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(node = %node.id, container = %name, "Failed to delete container: {}", e),
            }
        }
        Ok(())
    }

    async fn drop_network(&self, node: &Node, network: &str) -> Result<()> {
        let networks = self.client.list_networks(node).await?;
        if !networks.iter().any(|n| n == network) {
            return Ok(());
        }

        match self.client.delete_network(node, network).await {
            Ok(()) => debug!(node = %node.id, network, "Network deleted"),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(node = %node.id, network, "Failed to delete network: {}", e),
        }
        Ok(())
    }

    // =============================================================================
    // Listing
    // =============================================================================

    /// Ids of the pits with at least one container on the control node
    pub async fn get_pits(&self) -> Result<Vec<JobId>> {
        let pits: BTreeSet<JobId> = self
            .client
            .list_containers(self.cluster.head())
            .await?
            .iter()
            .filter_map(|name| ContainerName::parse(name))
            .map(|name| name.pit_id)
            .collect();
        Ok(pits.into_iter().collect())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Runs every request of a fan-out to completion, then reports the first
/// failure
///
/// Requests already sent keep running on the hosts even if dropped here, so
/// teardown must not start before all of them have settled.
async fn settle_all<T, F>(requests: impl IntoIterator<Item = F>) -> Result<Vec<T>>
where
    F: Future<Output = Result<T>>,
{
    join_all(requests).await.into_iter().collect()
}

/// One representative per distinct endpoint, `head` first
fn physical_nodes<'a>(head: &Node, others: impl IntoIterator<Item = &'a Node>) -> Vec<Node> {
    let mut nodes = vec![head.clone()];
    for node in others {
        if !nodes.iter().any(|n| n.endpoint == node.endpoint) {
            nodes.push(node.clone());
        }
    }
    nodes
}

/// Environment shared by every container of a pit
///
/// Worker names embed their node id, so `PIT_WORKER_PREFIX` and
/// `PIT_WORKER_POSTFIX` only bracket a hostname. `PIT_WORKER_HOSTS` lists the
/// actual hostnames in worker order, comma separated.
fn pit_info(pit_id: JobId, daemon: &ContainerName, workers: &[&ContainerName]) -> BTreeMap<String, String> {
    let hosts: Vec<String> = workers.iter().map(|name| name.host()).collect();
    BTreeMap::from([
        ("JOB_NUMBER".to_string(), pit_id.to_string()),
        ("PIT_DAEMON_HOST".to_string(), daemon.host()),
        ("PIT_WORKER_NUMBER".to_string(), workers.len().to_string()),
        ("PIT_WORKER_HOSTS".to_string(), hosts.join(",")),
        ("PIT_WORKER_PREFIX".to_string(), format!("{}-", PREFIX)),
        ("PIT_WORKER_POSTFIX".to_string(), HOST_SUFFIX.to_string()),
    ])
}

/// Device name of a share: its container path with `/` turned into `-`
fn share_device_name(path: &str) -> String {
    path.trim_matches('/').replace('/', "-")
}
