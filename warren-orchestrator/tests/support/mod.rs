//! Shared test harness
//!
//! - [`FakeLxd`]: in-memory container hosts speaking the envelope protocol,
//!   answering mutations with nested async operations, with fault injection
//! - [`FakeScripts`]: a script runner whose scripts exit (or hang) on command
//! - [`FixedReservations`]: a reservation service answering from flags
//! - [`FlakyRepository`]: the in-memory repository, failing one transition
//!   on demand
//! - [`Harness`]: a scheduler wired to all of the above

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use warren_client::{Body, ClientError, Envelope, LxdClient, Method, Request, Transport};
use warren_core::domain::job::{Job, JobId, JobState, StateRecord};
use warren_core::domain::node::{Cluster, Node};
use warren_core::domain::summary::JobSummary;
use warren_core::domain::topology::{Allocation, Process, ProcessGroup, Resource, ResourceKind};
use warren_core::domain::user::User;
use warren_core::dto::job::CreateJob;
use warren_orchestrator::config::Config;
use warren_orchestrator::pits::PitOrchestrator;
use warren_orchestrator::repository::{JobRepository, MemoryJobRepository, RepositoryError};
use warren_orchestrator::reservations::Reservations;
use warren_orchestrator::scheduler::{Scheduler, SchedulerDeps};
use warren_orchestrator::scripts::{
    KILLED_EXIT_CODE, PREPARE_SCRIPT, RunningScript, ScriptControl, ScriptOutcome, ScriptRunner,
    script_channel,
};

pub const HEAD: &str = "https://10.0.0.1:8443";
pub const GPU: &str = "https://10.0.0.2:8443";
pub const CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----\nHEAD\n-----END CERTIFICATE-----";

pub fn head() -> Node {
    Node::new("head", HEAD).unwrap()
}

pub fn gpu() -> Node {
    Node::new("gpu", GPU).unwrap()
}

pub fn cluster() -> Cluster {
    Cluster::new(vec![head(), gpu()]).unwrap()
}

// =============================================================================
// Fake container hosts
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct FakeContainer {
    pub definition: Value,
    pub running: bool,
    pub files: BTreeMap<String, String>,
}

#[derive(Default)]
struct Host {
    containers: BTreeMap<String, FakeContainer>,
    networks: BTreeMap<String, Value>,
}

/// A request failure to inject
///
/// Also selects the requests to slow down, see [`FakeLxd::delay`].
#[derive(Debug, Clone)]
pub struct Fault {
    pub endpoint: Option<String>,
    pub method: Method,
    /// Substring of the request path
    pub path: String,
    /// Match the whole path instead
    pub exact: bool,
    /// `name` field of the request body
    pub name: Option<String>,
    /// Fail only when the mutation is awaited, after the first async hop
    pub while_waiting: bool,
}

impl Fault {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            method,
            path: path.into(),
            exact: false,
            name: None,
            while_waiting: false,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn on(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn while_waiting(mut self) -> Self {
        self.while_waiting = true;
        self
    }

    fn matches(&self, endpoint: &str, method: &Method, path: &str, body: &Body) -> bool {
        let path_matches = if self.exact {
            path == self.path
        } else {
            path.contains(&self.path)
        };
        let name_matches = match (&self.name, body) {
            (None, _) => true,
            (Some(name), Body::Json(definition)) => definition["name"] == *name,
            (Some(_), _) => false,
        };
        self.endpoint.as_deref().is_none_or(|e| e == endpoint)
            && &self.method == method
            && path_matches
            && name_matches
    }
}

/// An operation settling after `hops` more `/wait` calls
struct Pending {
    hops: usize,
    envelope: Envelope,
}

#[derive(Default)]
struct Inner {
    hosts: HashMap<String, Host>,
    operations: HashMap<String, Pending>,
    next_operation: usize,
    faults: Vec<Fault>,
    delays: Vec<(Fault, Duration)>,
    requests: Vec<(String, Method, String)>,
}

/// Simulated container hosts, one per endpoint
///
/// Container mutations answer with an async operation whose `/wait` yields
/// another async operation before settling, so every mutation resolves
/// through a two-level chain.
#[derive(Default)]
pub struct FakeLxd {
    inner: Arc<Mutex<Inner>>,
}

impl FakeLxd {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inject(&self, fault: Fault) {
        self.inner.lock().unwrap().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.inner.lock().unwrap().faults.clear();
    }

    /// Holds back matching requests for `by`
    ///
    /// A delayed request is applied even if the caller stops waiting for it,
    /// as a real host would.
    pub fn delay(&self, matching: Fault, by: Duration) {
        self.inner.lock().unwrap().delays.push((matching, by));
    }

    pub fn containers(&self, endpoint: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .hosts
            .get(endpoint)
            .map(|h| h.containers.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn container(&self, endpoint: &str, name: &str) -> Option<FakeContainer> {
        let inner = self.inner.lock().unwrap();
        inner.hosts.get(endpoint)?.containers.get(name).cloned()
    }

    pub fn networks(&self, endpoint: &str) -> BTreeMap<String, Value> {
        let inner = self.inner.lock().unwrap();
        inner
            .hosts
            .get(endpoint)
            .map(|h| h.networks.clone())
            .unwrap_or_default()
    }

    /// Adds a container behind the scheduler's back
    pub fn plant(&self, endpoint: &str, name: &str, running: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.hosts.entry(endpoint.to_string()).or_default().containers.insert(
            name.to_string(),
            FakeContainer {
                running,
                ..FakeContainer::default()
            },
        );
    }

    /// Adds a network behind the scheduler's back
    pub fn plant_network(&self, endpoint: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .hosts
            .entry(endpoint.to_string())
            .or_default()
            .networks
            .insert(name.to_string(), json!({ "name": name }));
    }

    /// Every request seen so far as `(endpoint, method, path)`
    pub fn requests(&self) -> Vec<(String, Method, String)> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Whether any container or network anywhere still mentions the pit
    pub fn has_trace_of(&self, pit_id: JobId) -> bool {
        let inner = self.inner.lock().unwrap();
        let network = format!("pit{}", pit_id);
        inner.hosts.values().any(|host| {
            host.networks.contains_key(&network)
                || host
                    .containers
                    .keys()
                    .any(|name| name.split('-').nth(2) == Some(pit_id.to_string().as_str()))
        })
    }

    fn handle(inner: &mut Inner, endpoint: &str, request: Request) -> Envelope {
        let Request { method, path, body } = request;

        if let Some(id) = path.strip_suffix("/wait") {
            return match inner.operations.remove(id) {
                Some(Pending { hops: 0, envelope }) => envelope,
                Some(Pending { hops, envelope }) => {
                    let next = Self::operation(inner, hops - 1, envelope);
                    Envelope::operation(next)
                }
                None => Envelope::error(404, "not found"),
            };
        }

        let fault = inner
            .faults
            .iter()
            .find(|f| f.matches(endpoint, &method, &path, &body))
            .cloned();
        if let Some(fault) = &fault {
            if !fault.while_waiting {
                return Envelope::error(500, format!("injected failure: {} {}", method, path));
            }
        }

        let resource = path.strip_prefix("/1.0").unwrap_or(&path).trim_start_matches('/');
        let host = inner.hosts.entry(endpoint.to_string()).or_default();
        let segments: Vec<&str> = resource.split('?').next().unwrap_or("").split('/').collect();

        let result = match (method.as_str(), segments.as_slice()) {
            ("GET", [""]) => Ok(json!({ "environment": { "certificate": CERTIFICATE } })),
            ("GET", ["images", "aliases", alias]) => Ok(json!({ "name": alias, "target": format!("fp-{}", alias) })),
            ("GET", ["containers"]) => Ok(json!(
                host.containers.keys().map(|n| format!("/1.0/containers/{}", n)).collect::<Vec<_>>()
            )),
            ("GET", ["networks"]) => Ok(json!(
                host.networks.keys().map(|n| format!("/1.0/networks/{}", n)).collect::<Vec<_>>()
            )),
            ("POST", ["containers"]) => Self::create_container(host, &body, fault.is_some()),
            ("PUT", ["containers", name, "state"]) => Self::change_state(host, name, &body, fault.is_some()),
            ("DELETE", ["containers", name]) => match host.containers.get(*name) {
                None => Err((404, "not found".to_string())),
                Some(c) if c.running => Err((400, "container is running".to_string())),
                Some(_) if fault.is_some() => Err((500, "injected failure".to_string())),
                Some(_) => {
                    host.containers.remove(*name);
                    Ok(json!({}))
                }
            },
            ("POST", ["containers", name, "files"]) => {
                let target = resource.split("path=").nth(1).unwrap_or("").to_string();
                match (host.containers.get_mut(*name), body) {
                    (Some(container), Body::File(content)) => {
                        container
                            .files
                            .insert(target, String::from_utf8_lossy(&content).into_owned());
                        return Envelope::sync(json!({}));
                    }
                    (None, _) => Err((404, "not found".to_string())),
                    _ => Err((400, "expected file content".to_string())),
                }
            }
            ("POST", ["networks"]) => {
                let Body::Json(definition) = body else {
                    return Envelope::error(400, "expected json");
                };
                let name = definition["name"].as_str().unwrap_or_default().to_string();
                if host.networks.contains_key(&name) {
                    Err((409, "network exists".to_string()))
                } else {
                    host.networks.insert(name, definition);
                    return Envelope::sync(json!({}));
                }
            }
            ("DELETE", ["networks", name]) => {
                return match host.networks.remove(*name) {
                    Some(_) => Envelope::sync(json!({})),
                    None => Envelope::error(404, "not found"),
                };
            }
            _ => Err((400, format!("unsupported request {} {}", method, path))),
        };

        // Mutations and queries alike settle through two async hops
        let settled = match result {
            Ok(metadata) => Envelope::sync(metadata),
            Err((code, message)) => Envelope::error(code, message),
        };
        if method == Method::GET {
            return settled;
        }
        let id = Self::operation(inner, 1, settled);
        Envelope::operation(id)
    }

    fn operation(inner: &mut Inner, hops: usize, envelope: Envelope) -> String {
        inner.next_operation += 1;
        let id = format!("/1.0/operations/op{}", inner.next_operation);
        inner.operations.insert(id.clone(), Pending { hops, envelope });
        id
    }

    fn create_container(host: &mut Host, body: &Body, fail: bool) -> Result<Value, (i64, String)> {
        let Body::Json(definition) = body else {
            return Err((400, "expected json".to_string()));
        };
        let name = definition["name"].as_str().unwrap_or_default().to_string();
        if fail {
            return Err((500, format!("injected failure creating {}", name)));
        }
        if host.containers.contains_key(&name) {
            return Err((409, "container exists".to_string()));
        }
        host.containers.insert(
            name,
            FakeContainer {
                definition: definition.clone(),
                ..FakeContainer::default()
            },
        );
        Ok(json!({}))
    }

    fn change_state(host: &mut Host, name: &str, body: &Body, fail: bool) -> Result<Value, (i64, String)> {
        let Some(container) = host.containers.get_mut(name) else {
            return Err((404, "not found".to_string()));
        };
        if fail {
            return Err((500, format!("injected failure changing state of {}", name)));
        }
        let Body::Json(change) = body else {
            return Err((400, "expected json".to_string()));
        };
        match change["action"].as_str() {
            Some("start") => container.running = true,
            Some("stop") if container.running => container.running = false,
            Some("stop") => return Err((400, "The container is already stopped".to_string())),
            _ => return Err((400, "unknown action".to_string())),
        }
        Ok(json!({}))
    }
}

#[async_trait]
impl Transport for FakeLxd {
    async fn send(&self, node: &Node, request: Request) -> warren_client::Result<Envelope> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .requests
                .push((node.endpoint.clone(), request.method.clone(), request.path.clone()));
            if node.endpoint.contains("unreachable") {
                return Err(ClientError::api_error(502, "host unreachable"));
            }
            let delay = inner
                .delays
                .iter()
                .find(|(f, _)| f.matches(&node.endpoint, &request.method, &request.path, &request.body))
                .map(|(_, by)| *by);
            match delay {
                Some(by) => by,
                None => return Ok(Self::handle(&mut inner, &node.endpoint, request)),
            }
        };

        let inner = Arc::clone(&self.inner);
        let endpoint = node.endpoint.clone();
        let handled = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Self::handle(&mut inner.lock().unwrap(), &endpoint, request)
        });
        Ok(handled.await.unwrap())
    }
}

// =============================================================================
// Fake scripts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPlan {
    /// Exit right away with this code
    Exit(i32),
    /// Run until killed
    Hang,
}

/// Script runner answering from per-script plans
///
/// A successful `prepare.sh` creates the job directory, like the real one.
pub struct FakeScripts {
    plans: Mutex<HashMap<String, ScriptPlan>>,
    runs: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    kills: Arc<AtomicUsize>,
    create_job_dir: AtomicBool,
    spawn_delay: Mutex<Option<Duration>>,
}

impl FakeScripts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
            kills: Arc::new(AtomicUsize::new(0)),
            create_job_dir: AtomicBool::new(true),
            spawn_delay: Mutex::new(None),
        })
    }

    pub fn plan(&self, script: &str, plan: ScriptPlan) {
        self.plans.lock().unwrap().insert(script.to_string(), plan);
    }

    /// Makes a successful preparation leave no job directory behind
    pub fn skip_job_dir(&self) {
        self.create_job_dir.store(false, Ordering::SeqCst);
    }

    /// Makes every spawn take `by` before the script is running
    pub fn slow_spawn(&self, by: Duration) {
        *self.spawn_delay.lock().unwrap() = Some(by);
    }

    pub fn runs(&self, script: &str) -> Vec<BTreeMap<String, String>> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == script)
            .map(|(_, env)| env.clone())
            .collect()
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptRunner for FakeScripts {
    async fn spawn(
        &self,
        script: &str,
        env: BTreeMap<String, String>,
    ) -> warren_orchestrator::scripts::Result<RunningScript> {
        let delay = *self.spawn_delay.lock().unwrap();
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }

        let plan = self
            .plans
            .lock()
            .unwrap()
            .get(script)
            .copied()
            .unwrap_or(ScriptPlan::Exit(0));
        self.runs.lock().unwrap().push((script.to_string(), env.clone()));

        let (control, running) = script_channel();
        match plan {
            ScriptPlan::Exit(code) => {
                if script == PREPARE_SCRIPT && code == 0 && self.create_job_dir.load(Ordering::SeqCst) {
                    if let Some(dir) = env.get("JOB_DIR") {
                        std::fs::create_dir_all(dir).unwrap();
                    }
                }
                control.finish(Ok(ScriptOutcome {
                    exit_code: code,
                    stdout: format!("{} out", script),
                    stderr: format!("{} err", script),
                }));
            }
            ScriptPlan::Hang => {
                let kills = Arc::clone(&self.kills);
                tokio::spawn(async move {
                    let ScriptControl { kill, outcome } = control;
                    if kill.await.is_ok() {
                        kills.fetch_add(1, Ordering::SeqCst);
                        let _ = outcome.send(Ok(ScriptOutcome {
                            exit_code: KILLED_EXIT_CODE,
                            stdout: String::new(),
                            stderr: String::new(),
                        }));
                    }
                });
            }
        }
        Ok(running)
    }
}

// =============================================================================
// Fake reservations
// =============================================================================

pub struct FixedReservations {
    pub allocatable: AtomicBool,
    pub available: AtomicBool,
}

impl FixedReservations {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            allocatable: AtomicBool::new(true),
            available: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Reservations for FixedReservations {
    async fn can_allocate(&self, _request: &str, _user: &User) -> bool {
        self.allocatable.load(Ordering::SeqCst)
    }

    async fn reserve_cluster(&self, request: &str, _user: &User) -> Option<String> {
        self.available
            .load(Ordering::SeqCst)
            .then(|| format!("reserved:{}", request))
    }
}

// =============================================================================
// Flaky repository
// =============================================================================

/// Delegates to a [`MemoryJobRepository`], failing the next transition into
/// the armed state
pub struct FlakyRepository {
    inner: Arc<MemoryJobRepository>,
    fail_into: Mutex<Option<JobState>>,
}

impl FlakyRepository {
    pub fn new(inner: Arc<MemoryJobRepository>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_into: Mutex::new(None),
        })
    }

    pub fn fail_next(&self, state: JobState) {
        *self.fail_into.lock().unwrap() = Some(state);
    }
}

#[async_trait]
impl JobRepository for FlakyRepository {
    async fn create(&self, req: CreateJob) -> warren_orchestrator::repository::Result<Job> {
        self.inner.create(req).await
    }

    async fn find_by_id(&self, id: JobId) -> warren_orchestrator::repository::Result<Option<Job>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_state(&self, state: JobState) -> warren_orchestrator::repository::Result<Vec<Job>> {
        self.inner.find_by_state(state).await
    }

    async fn find_by_state_range(
        &self,
        from: JobState,
        to: JobState,
    ) -> warren_orchestrator::repository::Result<Vec<Job>> {
        self.inner.find_by_state_range(from, to).await
    }

    async fn find_waiting_head(&self) -> warren_orchestrator::repository::Result<Option<Job>> {
        self.inner.find_waiting_head().await
    }

    async fn set_state(
        &self,
        id: JobId,
        state: JobState,
        reason: Option<String>,
    ) -> warren_orchestrator::repository::Result<Job> {
        let fail = {
            let mut armed = self.fail_into.lock().unwrap();
            if *armed == Some(state) { armed.take() } else { None }
        };
        if fail.is_some() {
            return Err(RepositoryError::Corrupt(format!("lost write of job {} to {}", id, state)));
        }
        self.inner.set_state(id, state, reason).await
    }

    async fn state_history(&self, id: JobId) -> warren_orchestrator::repository::Result<Vec<StateRecord>> {
        self.inner.state_history(id).await
    }

    async fn set_allocation(
        &self,
        id: JobId,
        allocation: Option<String>,
    ) -> warren_orchestrator::repository::Result<()> {
        self.inner.set_allocation(id, allocation).await
    }

    async fn archive(&self, id: JobId) -> warren_orchestrator::repository::Result<()> {
        self.inner.archive(id).await
    }

    async fn process_topology(&self, id: JobId) -> warren_orchestrator::repository::Result<Vec<ProcessGroup>> {
        self.inner.process_topology(id).await
    }

    async fn find_user(&self, id: i64) -> warren_orchestrator::repository::Result<Option<User>> {
        self.inner.find_user(id).await
    }

    async fn summaries(&self) -> warren_orchestrator::repository::Result<Vec<JobSummary>> {
        self.inner.summaries().await
    }
}

// =============================================================================
// Harness
// =============================================================================

pub fn orchestrator(lxd: &Arc<FakeLxd>, cluster: Cluster) -> PitOrchestrator {
    let client = LxdClient::new(Arc::clone(lxd) as Arc<dyn Transport>);
    PitOrchestrator::new(client, cluster, "pit-daemon", "pit-worker")
}

pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub lxd: Arc<FakeLxd>,
    pub scripts: Arc<FakeScripts>,
    pub reservations: Arc<FixedReservations>,
    pub repository: Arc<MemoryJobRepository>,
    pub flaky: Arc<FlakyRepository>,
    pub scheduler: Arc<Scheduler>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new("postgres://unused".to_string(), vec![head(), gpu()]);
        config.pits_root = dir.path().join("pits");
        config.mount_root = dir.path().to_path_buf();
        config.max_parallel_prep = 2;

        let lxd = FakeLxd::new();
        let scripts = FakeScripts::new();
        let reservations = FixedReservations::new();
        let repository = Arc::new(MemoryJobRepository::new());
        repository
            .insert_user(User {
                id: 1,
                name: "ada".to_string(),
                admin: false,
                groups: vec!["ml".to_string()],
            })
            .await;
        let flaky = FlakyRepository::new(Arc::clone(&repository));

        let scheduler = Scheduler::new(
            config.clone(),
            SchedulerDeps {
                repository: Arc::clone(&flaky) as Arc<dyn JobRepository>,
                pits: Arc::new(orchestrator(&lxd, cluster())),
                scripts: Arc::clone(&scripts) as Arc<dyn ScriptRunner>,
                reservations: Arc::clone(&reservations) as Arc<dyn Reservations>,
            },
        );

        Self {
            dir,
            config,
            lxd,
            scripts,
            reservations,
            repository,
            flaky,
            scheduler,
        }
    }

    /// Submits a job with one process on the control node and one GPU
    /// process on the gpu node
    pub async fn submit(&self) -> JobId {
        let job = self
            .repository
            .create(CreateJob {
                user_id: 1,
                description: "train".to_string(),
                provisioning: "#!/bin/sh\npython train.py".to_string(),
                request: "2:gpu".to_string(),
                continues: None,
            })
            .await
            .unwrap();
        self.repository.set_topology(job.id, two_node_topology()).await;
        job.id
    }

    pub async fn job(&self, id: JobId) -> Job {
        self.repository.find_by_id(id).await.unwrap().unwrap()
    }

    /// Polls until the job reaches `state`
    pub async fn wait_for(&self, id: JobId, state: JobState) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = self.job(id).await;
            if job.state == state {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} stuck in {} waiting for {}",
                id,
                job.state,
                state
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Reason recorded when the job entered `state`
    pub async fn reason(&self, id: JobId, state: JobState) -> Option<String> {
        self.repository
            .state_history(id)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.state == state)
            .and_then(|r| r.reason)
    }

    pub fn job_dir(&self, id: JobId) -> PathBuf {
        self.config.job_dir(id)
    }
}

pub fn two_node_topology() -> Vec<ProcessGroup> {
    vec![ProcessGroup {
        index: 0,
        processes: vec![
            Process {
                index: 0,
                node_id: "head".to_string(),
                allocations: Vec::new(),
            },
            Process {
                index: 1,
                node_id: "gpu".to_string(),
                allocations: vec![Allocation {
                    id: 1,
                    resource: Resource {
                        id: 1,
                        node_id: "gpu".to_string(),
                        kind: ResourceKind::Cuda,
                        index: 0,
                    },
                    utilizations: Vec::new(),
                }],
            },
        ],
    }]
}
