//! GraphBuilder: drives a graph provider over a whole trace.
//!
//! A build creates a fresh [`SharedGraph`], binds it to the provider, sends
//! an [`EventRequest`] covering the whole trace to the reader and blocks the
//! calling thread until the request completes or is cancelled. Events are
//! handed to the provider on the reader's thread; the builder thread only
//! waits.
//!
//! # Concurrency
//!
//! The builder's current build lives in a single mutex-guarded slot (state,
//! request, graph, generation). [`GraphBuilder::build`] checks and replaces
//! the slot under that lock, so two builds can never both be current.
//! [`GraphBuilder::cancel`] and [`GraphBuilder::graph`] are safe to call from
//! any thread while a build is running. A superseded build only records its
//! final state if its generation is still the current one.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use tgraph_core::{GraphError, WorkerKey};
use tgraph_critical::{CriticalPath, CriticalPathEngine};

use crate::error::BuildError;
use crate::event::TraceEvent;
use crate::provider::{GraphProvider, SharedGraph};
use crate::reader::TraceReader;
use crate::request::{EventRequest, RequestHandler, RequestOutcome};

/// Lifecycle of the builder's current build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Idle,
    Building,
    Completed,
    Cancelled,
    /// The provider reported a graph invariant violation.
    Failed,
}

/// What `build` does when another build is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Cancel the in-flight build and start the new one.
    #[default]
    Supersede,
    /// Fail with [`BuildError::AlreadyBuilding`].
    Reject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub on_conflict: ConflictPolicy,
}

/// Host-side cancellation and progress handle for one build.
///
/// The cancelled flag is checked before the request is sent and after it
/// completes; [`BuildMonitor::cancel`] also cancels the running request.
#[derive(Debug, Clone, Default)]
pub struct BuildMonitor {
    inner: Arc<MonitorInner>,
}

#[derive(Debug, Default)]
struct MonitorInner {
    cancelled: AtomicBool,
    request: Mutex<Option<Arc<EventRequest>>>,
}

impl BuildMonitor {
    pub fn new() -> Self {
        BuildMonitor::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(request) = self.request() {
            request.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Events handed to the provider by the attached build so far.
    pub fn events_processed(&self) -> u64 {
        self.request().map_or(0, |r| r.events_delivered())
    }

    fn attach(&self, request: &Arc<EventRequest>) {
        *self
            .inner
            .request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(request));
        // A cancel racing with attach must still reach the request.
        if self.is_cancelled() {
            request.cancel();
        }
    }

    fn request(&self) -> Option<Arc<EventRequest>> {
        self.inner
            .request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Result of a build that was not rejected.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// `Completed` or `Cancelled`.
    pub state: BuildState,
    /// Events handed to the provider.
    pub events: u64,
    /// The frozen graph of this build.
    pub graph: SharedGraph,
}

#[derive(Debug)]
struct BuildSlot {
    state: BuildState,
    generation: u64,
    request: Option<Arc<EventRequest>>,
    graph: Option<SharedGraph>,
}

/// Builds execution graphs from a trace, one build at a time.
pub struct GraphBuilder<R: TraceReader> {
    reader: R,
    config: BuilderConfig,
    slot: Mutex<BuildSlot>,
}

impl<R: TraceReader> GraphBuilder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, BuilderConfig::default())
    }

    pub fn with_config(reader: R, config: BuilderConfig) -> Self {
        GraphBuilder {
            reader,
            config,
            slot: Mutex::new(BuildSlot {
                state: BuildState::Idle,
                generation: 0,
                request: None,
                graph: None,
            }),
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn state(&self) -> BuildState {
        self.lock_slot().state
    }

    /// The current graph, possibly still under construction. `None` before
    /// the first build.
    pub fn graph(&self) -> Option<SharedGraph> {
        self.lock_slot().graph.clone()
    }

    /// Cancels the in-flight build, if any. Never fails.
    pub fn cancel(&self) {
        if let Some(request) = &self.lock_slot().request {
            request.cancel();
        }
    }

    /// Builds a graph over the whole trace. Blocks until done.
    pub fn build(&self, provider: impl GraphProvider + 'static) -> Result<BuildReport, BuildError> {
        self.build_with(provider, &BuildMonitor::new())
    }

    /// Like [`build`](Self::build), observing a host cancellation monitor.
    pub fn build_with(
        &self,
        mut provider: impl GraphProvider + 'static,
        monitor: &BuildMonitor,
    ) -> Result<BuildReport, BuildError> {
        let failure = Arc::new(Mutex::new(None));
        let (generation, graph, request) = {
            let mut slot = self.lock_slot();
            if slot.state == BuildState::Building {
                match self.config.on_conflict {
                    ConflictPolicy::Reject => return Err(BuildError::AlreadyBuilding),
                    ConflictPolicy::Supersede => {
                        tracing::warn!(
                            generation = slot.generation,
                            "superseding in-flight graph build"
                        );
                        if let Some(previous) = &slot.request {
                            previous.cancel();
                        }
                    }
                }
            }

            let graph = SharedGraph::new();
            provider.assign_target_graph(graph.clone());
            let request = EventRequest::new(GraphBuildHandler {
                provider: Box::new(provider),
                graph: graph.clone(),
                failure: Arc::clone(&failure),
            });

            slot.generation += 1;
            slot.state = BuildState::Building;
            slot.request = Some(Arc::clone(&request));
            slot.graph = Some(graph.clone());
            (slot.generation, graph, request)
        };

        monitor.attach(&request);
        tracing::info!(generation, "graph build started");

        if let Err(err) = self.reader.send_request(&request) {
            tracing::error!(generation, error = %err, "failed to send graph build request");
            request.abandon();
            self.settle(generation, BuildState::Failed);
            return Err(err.into());
        }

        let outcome = match request.wait_for_completion() {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(generation, error = %err, "request interrupted");
                request.abandon();
                RequestOutcome::Cancelled
            }
        };

        let failure = failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(err) = failure {
            self.settle(generation, BuildState::Failed);
            return Err(BuildError::Provider(err));
        }

        let state = if outcome == RequestOutcome::Cancelled || monitor.is_cancelled() {
            BuildState::Cancelled
        } else {
            BuildState::Completed
        };
        self.settle(generation, state);

        let events = request.events_delivered();
        {
            let g = graph.read();
            tracing::info!(
                generation,
                ?state,
                events,
                workers = g.worker_count(),
                vertices = g.node_count(),
                edges = g.edge_count(),
                "graph build finished"
            );
        }
        Ok(BuildReport {
            state,
            events,
            graph,
        })
    }

    /// Critical path over the full timeline of `worker` in the current graph.
    pub fn critical_path(
        &self,
        worker: &WorkerKey,
        engine: &CriticalPathEngine,
    ) -> Result<CriticalPath, BuildError> {
        let graph = self.graph().ok_or(BuildError::NoGraph)?;
        let g = graph.read();
        Ok(engine.compute_for_worker(&g, worker)?)
    }

    /// Records the final state of a build unless a newer one took over.
    fn settle(&self, generation: u64, state: BuildState) {
        let mut slot = self.lock_slot();
        if slot.generation == generation {
            slot.state = state;
            slot.request = None;
        }
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, BuildSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forwards request callbacks to the provider and freezes the graph when
/// the stream ends.
struct GraphBuildHandler {
    provider: Box<dyn GraphProvider>,
    graph: SharedGraph,
    failure: Arc<Mutex<Option<GraphError>>>,
}

impl GraphBuildHandler {
    fn record(&self, err: GraphError) {
        tracing::error!(error = %err, "graph provider failed");
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        failure.get_or_insert(err);
    }
}

impl RequestHandler for GraphBuildHandler {
    fn handle_data(&mut self, event: &TraceEvent) -> ControlFlow<()> {
        match self.provider.process_event(event) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                self.record(err);
                ControlFlow::Break(())
            }
        }
    }

    fn done(&mut self) {
        if let Err(err) = self.provider.done() {
            self.record(err);
        }
        self.graph.freeze();
    }

    fn handle_cancel(&mut self) {
        self.provider.handle_cancel();
        self.graph.freeze();
    }
}
