//! Workflow Execution Engine
//!
//! Walks a workflow from its start node, dispatching every visited node to
//! the handler registered for its kind:
//! - Each node visit runs as its own task, so paths suspended in a delay or
//!   an HTTP call never hold up their siblings
//! - Fan-out forks the path: the first target keeps the path id, every
//!   other target gets a new id and its own copy of the context
//! - Decisions follow only the edges labeled with their branch
//! - A bound on total visits stops cyclic workflows
//! - A run-scoped cancellation token is checked before every dispatch
//!
//! Paths reaching the same node each run it independently with their own
//! context; contexts are never merged at joins.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::context::ExecutionContext;
use super::log::{ExecutionLog, LogLevel, NodeTrace};
use super::result::{
    merge_state, ExecutionState, PathOutcome, PathStatus, RunResult, RunStatus, BOUND_EXCEEDED,
    NO_MATCHING_BRANCH,
};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::handlers::{AiTask, HandlerRegistry, HttpClient, NodeResult, Outcome};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::{check_runnable, NodeKind, Workflow};

type RunTable = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Workflow execution engine.
///
/// Holds the handler registry and the table of active runs. Runs share
/// nothing but the registry.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use flowrunner::{load_workflow, Engine, EngineConfig, ExecutionContext};
/// use flowrunner::handlers::{ReqwestClient, UnconfiguredAi};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("onboarding.json")?;
///     let engine = Engine::builtin(
///         Arc::new(ReqwestClient::new()),
///         Arc::new(UnconfiguredAi),
///         EngineConfig::default(),
///     );
///
///     let result = engine.run(workflow, ExecutionContext::new()).await?;
///     println!("{:?}: {} log entries", result.status, result.log.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
    runs: RunTable,
}

impl Engine {
    /// Creates an engine over a prepared registry.
    pub fn new(registry: HandlerRegistry, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            runs: Arc::default(),
        }
    }

    /// Creates an engine with every built-in kind registered.
    pub fn builtin(http: Arc<dyn HttpClient>, ai: Arc<dyn AiTask>, config: EngineConfig) -> Self {
        let registry = HandlerRegistry::builtin(http, ai, &config);
        Self::new(registry, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Starts a run in the background. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if the workflow cannot run: missing or
    /// duplicate start node, duplicate node ids, dangling edges, or a
    /// reachable node whose kind has no handler. Nothing is logged then.
    pub fn start(&self, workflow: Workflow, input: ExecutionContext) -> Result<RunHandle> {
        check_runnable(&workflow)?;
        self.check_handlers(&workflow)?;
        let start_id = workflow
            .start_node()
            .map(|node| node.id.clone())
            .ok_or_else(|| Error::structural("workflow has no start node"))?;

        let run_id = Uuid::new_v4().to_string();
        let workflow_id = workflow.id.clone();
        let token = CancellationToken::new();
        let status = Arc::new(Mutex::new(RunStatus::NotStarted));
        lock(&self.runs).insert(run_id.clone(), token.clone());

        let run = Run::new(
            run_id.clone(),
            workflow,
            Arc::clone(&self.registry),
            self.config.max_visits,
            token.clone(),
            Arc::clone(&status),
            Arc::clone(&self.runs),
        );
        let task = tokio::spawn(run.execute(start_id, input));

        Ok(RunHandle {
            run_id,
            workflow_id,
            token,
            status,
            task,
        })
    }

    /// Runs a workflow to completion.
    ///
    /// Node failures, the visit bound and cancellation are all reported in
    /// the returned [`RunResult`]; only structural problems are errors.
    pub async fn run(&self, workflow: Workflow, input: ExecutionContext) -> Result<RunResult> {
        Ok(self.start(workflow, input)?.wait().await)
    }

    /// Cancels an active run. Returns false, doing nothing, if no run with
    /// this id is active (including runs that already finished).
    pub fn cancel(&self, run_id: &str) -> bool {
        match lock(&self.runs).get(run_id) {
            Some(token) => {
                info!("Cancelling run {}", run_id);
                token.cancel();
                true
            }
            None => {
                debug!("Run {} is not active, nothing to cancel", run_id);
                false
            }
        }
    }

    /// Ids of runs that have not finished yet.
    pub fn active_runs(&self) -> Vec<String> {
        lock(&self.runs).keys().cloned().collect()
    }

    fn check_handlers(&self, workflow: &Workflow) -> Result<()> {
        let reachable = workflow.reachable_from_start();
        let missing: Vec<String> = workflow
            .nodes
            .iter()
            .filter(|node| reachable.contains(&node.id) && !self.registry.contains(&node.kind))
            .map(|node| format!("no handler registered for kind '{}' (node '{}')", node.kind, node.id))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::structural(missing.join("; ")))
        }
    }
}

/// Handle to a run started with [`Engine::start`].
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    workflow_id: String,
    token: CancellationToken,
    status: Arc<Mutex<RunStatus>>,
    task: JoinHandle<RunResult>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Current status of the run.
    pub fn status(&self) -> RunStatus {
        *lock(&self.status)
    }

    /// Stops scheduling new nodes. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this run, e.g. from a signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits for the run to finish.
    pub async fn wait(self) -> RunResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Run {} task failed: {}", self.run_id, e);
                *lock(&self.status) = RunStatus::Failed;
                RunResult {
                    run_id: self.run_id,
                    workflow_id: self.workflow_id,
                    status: RunStatus::Failed,
                    reason: Some(format!("run task failed: {}", e)),
                    log: Vec::new(),
                    paths: Vec::new(),
                    node_states: BTreeMap::new(),
                    timeline: ExecutionTimeline::new(),
                    visits: 0,
                }
            }
        }
    }
}

/// A finished node visit, sent back to the run loop.
struct Visit {
    node_id: String,
    kind: NodeKind,
    path_id: u64,
    result: NodeResult,
}

/// State of one run. Owned by the run loop; handler tasks only see the log.
struct Run {
    run_id: String,
    workflow: Workflow,
    registry: Arc<HandlerRegistry>,
    max_visits: usize,
    token: CancellationToken,
    status: Arc<Mutex<RunStatus>>,
    runs: RunTable,
    log: ExecutionLog,
    timeline: ExecutionTimeline,
    tasks: JoinSet<Visit>,
    visits: usize,
    /// Visits per (node, path), to tell loops from first visits
    visited: HashMap<(String, u64), usize>,
    next_path_id: u64,
    paths: Vec<PathOutcome>,
    states: HashMap<String, ExecutionState>,
    cancelled: bool,
    bound_exceeded: bool,
}

impl Run {
    fn new(
        run_id: String,
        workflow: Workflow,
        registry: Arc<HandlerRegistry>,
        max_visits: usize,
        token: CancellationToken,
        status: Arc<Mutex<RunStatus>>,
        runs: RunTable,
    ) -> Self {
        Self {
            run_id,
            workflow,
            registry,
            max_visits,
            token,
            status,
            runs,
            log: ExecutionLog::new(),
            timeline: ExecutionTimeline::new(),
            tasks: JoinSet::new(),
            visits: 0,
            visited: HashMap::new(),
            next_path_id: 1,
            paths: Vec::new(),
            states: HashMap::new(),
            cancelled: false,
            bound_exceeded: false,
        }
    }

    async fn execute(mut self, start_id: String, input: ExecutionContext) -> RunResult {
        let started = Instant::now();
        *lock(&self.status) = RunStatus::Running;
        info!(
            "Run {}: starting workflow '{}' ({} nodes, max {} visits)",
            self.run_id,
            self.workflow.name,
            self.workflow.nodes.len(),
            self.max_visits
        );

        self.dispatch(start_id, 0, input);

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(visit) => self.complete(visit),
                Err(e) => error!("Run {}: node task failed to join: {}", self.run_id, e),
            }
        }

        // Leaving the table settles cancellation: a cancel accepted before
        // this point is seen by the token, any later one is refused.
        lock(&self.runs).remove(&self.run_id);
        if self.token.is_cancelled() {
            self.cancelled = true;
        }

        let result = self.finish();
        info!(
            "Run {} finished: {:?} ({} visits, {} paths, {:.2?})",
            result.run_id,
            result.status,
            result.visits,
            result.paths.len(),
            started.elapsed()
        );
        result
    }

    /// Schedules a node on a path, unless the run is cancelled or out of
    /// visits.
    fn dispatch(&mut self, node_id: String, path_id: u64, context: ExecutionContext) {
        if self.token.is_cancelled() {
            debug!("Run {}: cancelled, '{}' not dispatched on path {}", self.run_id, node_id, path_id);
            self.cancelled = true;
            self.end_path(path_id, node_id, PathStatus::Aborted, context);
            return;
        }

        let Some(node) = self.workflow.node(&node_id).cloned() else {
            let reason = format!("node '{}' does not exist", node_id);
            self.end_path(path_id, node_id, PathStatus::Failed(reason), context);
            return;
        };

        if self.visits >= self.max_visits {
            if !self.bound_exceeded {
                warn!("Run {}: {} after {} visits", self.run_id, BOUND_EXCEEDED, self.visits);
            }
            self.bound_exceeded = true;
            self.log
                .append(&node.id, &node.kind, path_id, LogLevel::Error, BOUND_EXCEEDED);
            self.end_path(path_id, node_id, PathStatus::Failed(BOUND_EXCEEDED.into()), context);
            return;
        }

        let Some(handler) = self.registry.get(&node.kind) else {
            let reason = format!("no handler registered for kind '{}'", node.kind);
            self.log
                .append(&node.id, &node.kind, path_id, LogLevel::Error, reason.clone());
            self.mark(&node.id, ExecutionState::Failed);
            self.end_path(path_id, node_id, PathStatus::Failed(reason), context);
            return;
        };

        self.visits += 1;
        let visit = self.visited.entry((node_id.clone(), path_id)).or_insert(0);
        *visit += 1;
        debug!(
            "Run {}: running '{}' ({}) on path {}, visit {}",
            self.run_id, node.id, node.kind, path_id, visit
        );
        self.mark(&node.id, ExecutionState::Running);
        self.timeline.add_event(&node.id, path_id, EventType::Started);

        let trace = NodeTrace::new(self.log.clone(), &node.id, &node.kind, path_id);
        self.tasks.spawn(async move {
            let kind = node.kind.clone();
            let fallback = context.clone();
            // A panicking handler fails its path, not the run loop.
            let handled =
                tokio::spawn(async move { handler.handle(&node, context, &trace).await }).await;
            let result = handled
                .unwrap_or_else(|e| NodeResult::failure(fallback, format!("handler panicked: {}", e)));

            Visit {
                node_id,
                kind,
                path_id,
                result,
            }
        });
    }

    /// Records a finished visit and schedules its successors.
    fn complete(&mut self, visit: Visit) {
        let Visit {
            node_id,
            kind,
            path_id,
            result,
        } = visit;
        let NodeResult {
            context,
            outcome,
            message,
        } = result;

        match self.successors(&node_id, &kind, &outcome) {
            Err(reason) => {
                let message = if outcome.is_failure() {
                    message
                } else {
                    format!("{}; {}", message, reason)
                };
                error!(
                    "Run {}: node '{}' failed on path {}: {}",
                    self.run_id, node_id, path_id, message
                );
                self.log.append(&node_id, &kind, path_id, LogLevel::Error, message);
                self.timeline.add_event(&node_id, path_id, EventType::Failed);
                self.mark(&node_id, ExecutionState::Failed);
                self.end_path(path_id, node_id, PathStatus::Failed(reason), context);
            }
            Ok(targets) => {
                self.log.append(&node_id, &kind, path_id, LogLevel::Success, message);
                self.timeline.add_event(&node_id, path_id, EventType::Completed);
                self.mark(&node_id, ExecutionState::Completed);
                self.fork(node_id, path_id, context, targets);
            }
        }
    }

    /// Nodes a path continues to after a visit, or the reason it failed.
    fn successors(
        &self,
        node_id: &str,
        kind: &NodeKind,
        outcome: &Outcome,
    ) -> std::result::Result<Vec<String>, String> {
        match outcome {
            Outcome::Failure(reason) => Err(reason.clone()),
            _ if *kind == NodeKind::End => Ok(Vec::new()),
            Outcome::Branch(_) => {
                let label = outcome.branch_label();
                let targets: Vec<String> = self
                    .workflow
                    .outgoing(node_id)
                    .filter(|edge| edge.label.as_deref() == label)
                    .map(|edge| edge.target.clone())
                    .collect();

                if targets.is_empty() {
                    Err(NO_MATCHING_BRANCH.to_string())
                } else {
                    Ok(targets)
                }
            }
            Outcome::Success => Ok(self
                .workflow
                .outgoing(node_id)
                .map(|edge| edge.target.clone())
                .collect()),
        }
    }

    fn fork(&mut self, from: String, path_id: u64, context: ExecutionContext, targets: Vec<String>) {
        if targets.is_empty() {
            self.end_path(path_id, from, PathStatus::Completed, context);
            return;
        }

        let last = targets.len() - 1;
        let mut context = context;
        for (index, target) in targets.into_iter().enumerate() {
            let path = if index == 0 {
                path_id
            } else {
                let forked = self.next_path_id;
                self.next_path_id += 1;
                debug!("Run {}: path {} forks path {} at '{}'", self.run_id, path_id, forked, from);
                forked
            };
            let branch_context = if index == last {
                std::mem::take(&mut context)
            } else {
                context.clone()
            };
            self.dispatch(target, path, branch_context);
        }
    }

    fn end_path(&mut self, path_id: u64, last_node: String, status: PathStatus, context: ExecutionContext) {
        debug!("Run {}: path {} ended at '{}': {:?}", self.run_id, path_id, last_node, status);
        self.paths.push(PathOutcome {
            path_id,
            last_node,
            status,
            context,
        });
    }

    fn mark(&mut self, node_id: &str, state: ExecutionState) {
        let current = self
            .states
            .entry(node_id.to_string())
            .or_insert(ExecutionState::Pending);
        *current = merge_state(*current, state);
    }

    fn finish(mut self) -> RunResult {
        self.paths.sort_by_key(|path| path.path_id);

        let (status, reason) = if self.cancelled {
            warn!("Run {} aborted", self.run_id);
            (RunStatus::Aborted, Some("run cancelled".to_string()))
        } else if self.bound_exceeded {
            (RunStatus::Failed, Some(BOUND_EXCEEDED.to_string()))
        } else if let Some(reason) = self.paths.iter().find_map(|path| match &path.status {
            PathStatus::Failed(reason) => Some(format!("node '{}' failed: {}", path.last_node, reason)),
            _ => None,
        }) {
            (RunStatus::Failed, Some(reason))
        } else {
            (RunStatus::Succeeded, None)
        };
        *lock(&self.status) = status;

        let node_states = self
            .workflow
            .nodes
            .iter()
            .map(|node| {
                let state = self
                    .states
                    .get(&node.id)
                    .copied()
                    .unwrap_or(ExecutionState::Skipped);
                (node.id.clone(), state)
            })
            .collect();

        RunResult {
            run_id: self.run_id,
            workflow_id: self.workflow.id,
            status,
            reason,
            log: self.log.snapshot(),
            paths: self.paths,
            node_states,
            timeline: self.timeline,
            visits: self.visits,
        }
    }
}

// Every critical section is a single insert, remove or read, so a poisoned
// lock still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
