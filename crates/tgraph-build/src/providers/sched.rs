//! Scheduler event provider: one worker per thread.
//!
//! Understands three events:
//!
//! - `sched_switch { prev_tid, prev_state, next_tid }`: `prev_tid` leaves the
//!   CPU (runnable if `prev_state == 0`, blocked otherwise) and `next_tid`
//!   starts running. An epsilon edge links the two at the switch.
//! - `sched_wakeup { tid, waker_tid? }`: a blocked thread becomes runnable. A
//!   `default` edge links the waker to the wakee.
//! - `sched_process_exit { tid }`: the thread's timeline ends.
//!
//! Each horizontal edge is typed by the state the thread was in during the
//! interval. The idle thread (tid 0) gets no worker. Events missing a field
//! are skipped.

use std::collections::HashMap;

use tgraph_core::{EdgeType, ExecGraph, GraphError, VertexId, WorkerKey};

use crate::event::TraceEvent;
use crate::provider::{GraphProvider, SharedGraph};

const IDLE_TID: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadState {
    Unknown,
    Running,
    Runnable,
    Blocked,
    Exited,
}

impl ThreadState {
    fn edge_type(self) -> EdgeType {
        match self {
            ThreadState::Running => EdgeType::Running,
            ThreadState::Runnable => EdgeType::Preempted,
            ThreadState::Blocked => EdgeType::Blocked,
            ThreadState::Unknown | ThreadState::Exited => EdgeType::Unknown,
        }
    }
}

/// Worker key used for a thread.
pub fn thread_key(tid: i64) -> WorkerKey {
    WorkerKey(format!("tid/{}", tid))
}

/// Builds a thread-state graph from Linux scheduler events.
#[derive(Debug, Default)]
pub struct SchedProvider {
    graph: Option<SharedGraph>,
    threads: HashMap<i64, ThreadState>,
    last_timestamp: Option<i64>,
    skipped: u64,
}

impl SchedProvider {
    pub fn new() -> Self {
        SchedProvider::default()
    }

    /// Number of events ignored because a field was missing.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn on_switch(&mut self, graph: &mut ExecGraph, event: &TraceEvent) -> Result<(), GraphError> {
        let (Some(prev), Some(next)) = (event.field_i64("prev_tid"), event.field_i64("next_tid"))
        else {
            self.skip(event);
            return Ok(());
        };
        let prev_state = match event.field_i64("prev_state").unwrap_or(0) {
            0 => ThreadState::Runnable,
            _ => ThreadState::Blocked,
        };
        let ts = event.timestamp;

        let out = self.advance(graph, prev, ts, prev_state)?;
        let into = self.advance(graph, next, ts, ThreadState::Running)?;
        if let (Some(out), Some(into)) = (out, into) {
            if out != into {
                graph.connect(out, into, EdgeType::Epsilon)?;
            }
        }
        Ok(())
    }

    fn on_wakeup(&mut self, graph: &mut ExecGraph, event: &TraceEvent) -> Result<(), GraphError> {
        let Some(tid) = event.field_i64("tid") else {
            self.skip(event);
            return Ok(());
        };
        // Waking a thread that is not waiting changes nothing.
        if matches!(
            self.state_of(tid),
            ThreadState::Running | ThreadState::Runnable
        ) {
            return Ok(());
        }
        let ts = event.timestamp;
        let wakee = self.advance(graph, tid, ts, ThreadState::Runnable)?;

        let waker = match event.field_i64("waker_tid") {
            Some(waker) if waker != tid => {
                let state = self.state_of(waker);
                self.advance(graph, waker, ts, state)?
            }
            _ => None,
        };
        if let (Some(waker), Some(wakee)) = (waker, wakee) {
            graph.connect(waker, wakee, EdgeType::Default)?;
        }
        Ok(())
    }

    fn on_exit(&mut self, graph: &mut ExecGraph, event: &TraceEvent) -> Result<(), GraphError> {
        let Some(tid) = event.field_i64("tid") else {
            self.skip(event);
            return Ok(());
        };
        self.advance(graph, tid, event.timestamp, ThreadState::Exited)?;
        Ok(())
    }

    /// Moves `tid` to `state` at `ts` and returns its vertex there.
    ///
    /// The interval since the thread's last vertex gets an edge typed by the
    /// state it was in. If the thread already has a vertex at `ts`, that
    /// vertex is reused.
    fn advance(
        &mut self,
        graph: &mut ExecGraph,
        tid: i64,
        ts: i64,
        state: ThreadState,
    ) -> Result<Option<VertexId>, GraphError> {
        if tid == IDLE_TID {
            return Ok(None);
        }
        let worker = graph.create_worker(thread_key(tid))?;
        let previous = self.state_of(tid);
        let last = graph.tail(worker).and_then(|v| graph.vertex(v)).map(|v| v.timestamp);

        let vertex = match (graph.tail(worker), last) {
            (Some(tail), Some(last)) if last == ts => tail,
            _ => graph.append_linked(worker, ts, previous.edge_type())?.0,
        };
        self.threads.insert(tid, state);
        Ok(Some(vertex))
    }

    fn state_of(&self, tid: i64) -> ThreadState {
        self.threads
            .get(&tid)
            .copied()
            .unwrap_or(ThreadState::Unknown)
    }

    fn skip(&mut self, event: &TraceEvent) {
        self.skipped += 1;
        tracing::debug!(
            name = %event.name,
            timestamp = event.timestamp,
            "skipping event with missing fields"
        );
    }
}

impl GraphProvider for SchedProvider {
    fn assign_target_graph(&mut self, graph: SharedGraph) {
        self.graph = Some(graph);
        self.threads.clear();
        self.last_timestamp = None;
        self.skipped = 0;
    }

    fn process_event(&mut self, event: &TraceEvent) -> Result<(), GraphError> {
        let Some(shared) = self.graph.clone() else {
            return Ok(());
        };
        self.last_timestamp = Some(event.timestamp);
        let mut graph = shared.write();
        match event.name.as_str() {
            "sched_switch" => self.on_switch(&mut graph, event),
            "sched_wakeup" | "sched_waking" => self.on_wakeup(&mut graph, event),
            "sched_process_exit" => self.on_exit(&mut graph, event),
            _ => Ok(()),
        }
    }

    /// Extends every live thread up to the last timestamp of the trace.
    fn done(&mut self) -> Result<(), GraphError> {
        let (Some(shared), Some(end)) = (self.graph.clone(), self.last_timestamp) else {
            return Ok(());
        };
        let mut graph = shared.write();
        let mut tids: Vec<i64> = self
            .threads
            .iter()
            .filter(|&(_, state)| *state != ThreadState::Exited)
            .map(|(&tid, _)| tid)
            .collect();
        tids.sort_unstable();
        for tid in tids {
            let state = self.state_of(tid);
            self.advance(&mut graph, tid, end, state)?;
        }
        Ok(())
    }

    fn handle_cancel(&mut self) {
        // Open intervals are dropped; everything committed is already whole.
        self.threads.clear();
    }
}
