//! Engine Runtime
//!
//! The engine ties the graph to the revision layer. It implements refresh,
//! output computation and completion propagation, and decides where deferred
//! work runs.
//!
//! # How Refresh Works
//!
//! Under the node's lock:
//!
//! 1. Every slave is refreshed first, collecting the revision each returns.
//!    A slave reached again through another path in the same walk returns
//!    the revision it settled on the first time, without being revisited.
//! 2. The node counts as changed if it has no revision yet, its input
//!    fingerprint moved, or any collected child revision is not the one
//!    recorded in its current revision.
//! 3. A changed node gets a new revision built from the collected children.
//! 4. If every collected child already has output and the current revision
//!    does not, a [`Job::ComputeOutput`] is emitted.
//!
//! The lock is released before any job runs. A job that stores a fresh output
//! emits one [`Job::Refresh`] per master, which is how completion travels
//! upward.
//!
//! # Thread Safety
//!
//! Locks are taken master before slave and never the other way round, so
//! concurrent refreshes that meet in a diamond serialise on the shared node
//! instead of deadlocking. The second one finds nothing changed and reuses
//! the revision the first one appended.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use super::audit::{EngineSnapshot, NodeHistory};
use super::job::Job;
use super::worker;
use crate::config::{EngineConfig, ExecutionMode};
use crate::error::{EngineError, Result};
use crate::graph::{Graph, NodeId};
use crate::revision::{
    ChildRevisions, Fingerprint, Fingerprinter, Passthrough, Processor, Revision,
    TextFingerprint,
};

/// Where jobs go once a refresh has released its locks.
pub(super) enum Dispatch {
    /// Drained on the calling thread.
    Inline,

    /// Sent to the background worker.
    Background {
        jobs: mpsc::Sender<Job>,
        handle: Handle,
    },
}

/// State of one refresh walk.
#[derive(Default)]
struct Pass {
    /// Nodes this walk already settled, with the revision each settled on.
    settled: HashMap<NodeId, Arc<Revision>>,

    jobs: Vec<Job>,
}

pub(super) struct EngineInner {
    graph: Graph,
    processor: Box<dyn Processor>,
    fingerprinter: Box<dyn Fingerprinter>,
    config: EngineConfig,
    dispatch: Dispatch,
}

/// Handle to an incremental recomputation engine.
///
/// Cloning is cheap; all clones share the same graph.
///
/// # Example
///
/// ```rust,ignore
/// use cascade_core::Engine;
///
/// let engine = Engine::new(|combined: String| combined);
/// let b = engine.add_node("x");
/// let a = engine.add_node("a");
/// engine.add_edge(a, b)?;
///
/// engine.refresh(a)?;
/// let a_rev = engine.current_revision(a)?.unwrap();
/// assert_eq!(a_rev.output(), Some("ax"));
/// ```
#[derive(Clone)]
pub struct Engine {
    pub(super) inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an inline engine with the default text fingerprint.
    pub fn new(processor: impl Processor + 'static) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                graph: Graph::new(),
                processor: Box::new(processor),
                fingerprinter: Box::new(TextFingerprint),
                config: EngineConfig::default(),
                dispatch: Dispatch::Inline,
            }),
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn graph(&self) -> &Graph {
        &self.inner.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn add_node(&self, data: impl Into<String>) -> NodeId {
        self.inner.graph.add_node(data)
    }

    /// See [`Graph::add_edge`].
    pub fn add_edge(&self, master: NodeId, slave: NodeId) -> Result<bool> {
        self.inner.graph.add_edge(master, slave)
    }

    /// See [`Graph::remove_edge`].
    pub fn remove_edge(&self, master: NodeId, slave: NodeId) -> Result<bool> {
        self.inner.graph.remove_edge(master, slave)
    }

    /// Replace a node's input. Nothing is recomputed until the next refresh.
    pub fn set_data(&self, id: NodeId, data: impl Into<String>) -> Result<bool> {
        self.inner.graph.set_data(id, data)
    }

    /// The most recent revision of a node, if it was ever refreshed.
    pub fn current_revision(&self, id: NodeId) -> Result<Option<Arc<Revision>>> {
        Ok(self.inner.graph.node(id)?.current_revision())
    }

    /// A node's full history, oldest first.
    pub fn revisions(&self, id: NodeId) -> Result<Vec<Arc<Revision>>> {
        Ok(self.inner.graph.node(id)?.lock().revisions().to_vec())
    }

    /// Bring a node and everything below it up to date.
    ///
    /// Returns the node's current revision. Output computation it triggers
    /// runs before this returns in inline mode, and later on the worker in
    /// background mode; use [`Revision::wait_output`] to wait for it.
    pub fn refresh(&self, id: NodeId) -> Result<Arc<Revision>> {
        let mut pass = Pass::default();
        let revision = self.refresh_node(id, &mut pass)?;
        self.dispatch(pass.jobs)?;
        Ok(revision)
    }

    /// Refresh every node nothing depends on.
    pub fn refresh_all(&self) -> Result<Vec<Arc<Revision>>> {
        self.inner
            .graph
            .roots()
            .into_iter()
            .map(|root| self.refresh(root))
            .collect()
    }

    /// Compute a revision's output and notify the owning node's masters.
    ///
    /// Fails with [`EngineError::MissingDependencyOutput`] when called before
    /// every dependency has output. Returns the stored value without
    /// recomputing, and without notifying anyone, if output already exists.
    pub fn compute_output(&self, revision: &Arc<Revision>) -> Result<String> {
        let (output, follow_up) = self.run_output(revision)?;
        self.dispatch(follow_up)?;
        Ok(output)
    }

    /// Every node's history in slave-before-master order.
    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        let graph = &self.inner.graph;
        let nodes = graph
            .topological_order()
            .into_iter()
            .map(|id| graph.node(id).map(|node| NodeHistory::capture(&node)))
            .collect::<Result<Vec<_>>>()?;
        Ok(EngineSnapshot { nodes })
    }

    #[instrument(level = "debug", skip_all, fields(node = %id))]
    fn refresh_node(&self, id: NodeId, pass: &mut Pass) -> Result<Arc<Revision>> {
        if let Some(settled) = pass.settled.get(&id) {
            return Ok(Arc::clone(settled));
        }

        let node = self.inner.graph.node(id)?;
        let mut state = node.lock();

        let mut candidates = ChildRevisions::with_capacity(state.slaves().len());
        for &slave in state.slaves() {
            let revision = self.refresh_node(slave, pass)?;
            candidates.insert(slave, revision);
        }

        let input_hash = self.inner.fingerprinter.fingerprint(state.data());
        let has_complete_output = candidates.values().all(|child| child.has_output());

        let unchanged = state
            .current_revision()
            .filter(|previous| !is_changed(previous, &input_hash, &candidates))
            .cloned();

        let current = match unchanged {
            Some(previous) => {
                trace!(revision = %previous.id(), "unchanged");
                previous
            }
            None => {
                let revision = Arc::new(Revision::with_input_hash(
                    id,
                    state.data().to_owned(),
                    input_hash,
                    candidates,
                ));
                state.push_revision(Arc::clone(&revision));
                debug!(
                    revision = %revision.id(),
                    hash = %revision.hash(),
                    history = state.revisions().len(),
                    "new revision",
                );
                revision
            }
        };

        if has_complete_output && !current.has_output() {
            trace!(revision = %current.id(), "scheduling output");
            pass.jobs.push(Job::ComputeOutput(Arc::clone(&current)));
        }

        pass.settled.insert(id, Arc::clone(&current));
        Ok(current)
    }

    /// Fill a revision's output. Follow-up jobs are only emitted by the call
    /// that actually stored it.
    #[instrument(level = "debug", skip_all, fields(node = %revision.node(), revision = %revision.id()))]
    fn run_output(&self, revision: &Arc<Revision>) -> Result<(String, Vec<Job>)> {
        let (output, fresh) = revision.fill_output(self.inner.processor.as_ref())?;
        if !fresh {
            return Ok((output, Vec::new()));
        }

        let masters = self.inner.graph.masters(revision.node())?;
        debug!(masters = masters.len(), "output ready, notifying masters");
        let follow_up = masters.into_iter().map(Job::Refresh).collect();
        Ok((output, follow_up))
    }

    /// Run one job and return the jobs it produced.
    pub(super) fn execute(&self, job: Job) -> Result<Vec<Job>> {
        match job {
            Job::ComputeOutput(revision) => {
                self.run_output(&revision).map(|(_, follow_up)| follow_up)
            }
            Job::Refresh(id) => {
                let mut pass = Pass::default();
                self.refresh_node(id, &mut pass)?;
                Ok(pass.jobs)
            }
        }
    }

    pub(super) fn dispatch(&self, jobs: Vec<Job>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        match &self.inner.dispatch {
            Dispatch::Inline => {
                let mut queue = VecDeque::from(jobs);
                while let Some(job) = queue.pop_front() {
                    queue.extend(self.execute(job)?);
                }
                Ok(())
            }
            Dispatch::Background { jobs: sender, handle } => {
                worker::submit(sender, handle, jobs)
            }
        }
    }

    /// Like [`Engine::dispatch`], for jobs produced on a blocking-pool
    /// thread. Those wait for room in the queue instead of overflowing it.
    pub(super) fn forward(&self, jobs: Vec<Job>) -> Result<()> {
        match &self.inner.dispatch {
            Dispatch::Background { jobs: sender, .. } => worker::forward(sender, jobs),
            Dispatch::Inline => self.dispatch(jobs),
        }
    }
}

/// Whether `candidates` and `input_hash` describe a different state than
/// `previous` recorded. Children are compared by revision identity, in order.
fn is_changed(previous: &Revision, input_hash: &Fingerprint, candidates: &ChildRevisions) -> bool {
    if previous.input_hash() != input_hash {
        return true;
    }

    let recorded = previous.child_revisions();
    recorded.len() != candidates.len()
        || recorded
            .iter()
            .zip(candidates)
            .any(|((old_slave, old), (new_slave, new))| {
                old_slave != new_slave || !Arc::ptr_eq(old, new)
            })
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("node_count", &self.inner.graph.node_count())
            .finish()
    }
}

/// Configures and builds an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    processor: Box<dyn Processor>,
    fingerprinter: Box<dyn Fingerprinter>,
    handle: Option<Handle>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            processor: Box::new(Passthrough),
            fingerprinter: Box::new(TextFingerprint),
            handle: None,
        }
    }
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Box::new(processor);
        self
    }

    pub fn fingerprinter(mut self, fingerprinter: impl Fingerprinter + 'static) -> Self {
        self.fingerprinter = Box::new(fingerprinter);
        self
    }

    /// Runtime the background worker is spawned on. Defaults to the runtime
    /// `build` is called from.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Build the engine, spawning the worker in background mode.
    ///
    /// Fails with [`EngineError::WorkerUnavailable`] in background mode when
    /// no runtime was given and none is current.
    pub fn build(self) -> Result<Engine> {
        let EngineBuilder {
            config,
            processor,
            fingerprinter,
            handle,
        } = self;

        let (dispatch, receiver) = match config.execution {
            ExecutionMode::Inline => (Dispatch::Inline, None),
            ExecutionMode::Background => {
                let handle = match handle {
                    Some(handle) => handle,
                    None => Handle::try_current().map_err(|_| EngineError::WorkerUnavailable)?,
                };
                let (sender, receiver) = mpsc::channel(config.effective_queue_capacity());
                (
                    Dispatch::Background {
                        jobs: sender,
                        handle: handle.clone(),
                    },
                    Some((handle, receiver)),
                )
            }
        };

        let inner = Arc::new(EngineInner {
            graph: Graph::new(),
            processor,
            fingerprinter,
            config,
            dispatch,
        });

        if let Some((handle, receiver)) = receiver {
            handle.spawn(worker::run(Arc::downgrade(&inner), receiver));
        }

        Ok(Engine { inner })
    }
}
