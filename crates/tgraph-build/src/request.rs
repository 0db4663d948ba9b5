//! Streaming event requests.
//!
//! An [`EventRequest`] describes which events a consumer wants (time range,
//! start index, count) and owns the [`RequestHandler`] that receives them. A
//! [`TraceReader`](crate::reader::TraceReader) starts the request, which
//! yields a [`RequestDriver`]; the reader feeds events through the driver on
//! its own thread and finishes it exactly once.
//!
//! The driver owns the sending half of the completion channel. A reader that
//! drops the driver without finishing disconnects the channel, which
//! [`EventRequest::wait_for_completion`] reports as
//! [`TraceError::Interrupted`].

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::event::{TimeRange, TraceEvent};

/// Request every event in range.
pub const ALL_DATA: u64 = u64::MAX;

/// Scheduling hint for readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionType {
    Foreground,
    Background,
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOutcome {
    Completed,
    Cancelled,
}

/// Receives the events of a request, one at a time, in trace order.
///
/// Exactly one of [`done`](RequestHandler::done) and
/// [`handle_cancel`](RequestHandler::handle_cancel) is called, once.
pub trait RequestHandler: Send {
    /// Consumes one event. Returning `Break` cancels the request.
    fn handle_data(&mut self, event: &TraceEvent) -> ControlFlow<()>;

    /// The stream was exhausted.
    fn done(&mut self);

    /// The stream was cancelled before exhaustion.
    fn handle_cancel(&mut self);
}

/// A request for a stream of trace events.
pub struct EventRequest {
    range: TimeRange,
    index: u64,
    count: u64,
    execution: ExecutionType,
    cancelled: AtomicBool,
    started: AtomicBool,
    finished: AtomicBool,
    delivered: AtomicU64,
    outcome: Mutex<Option<RequestOutcome>>,
    handler: Mutex<Box<dyn RequestHandler>>,
    done_tx: Mutex<Option<Sender<RequestOutcome>>>,
    done_rx: Receiver<RequestOutcome>,
}

impl EventRequest {
    /// Requests every event of the trace with background priority.
    pub fn new(handler: impl RequestHandler + 'static) -> Arc<Self> {
        Self::with_params(
            TimeRange::ETERNITY,
            0,
            ALL_DATA,
            ExecutionType::Background,
            handler,
        )
    }

    pub fn with_params(
        range: TimeRange,
        index: u64,
        count: u64,
        execution: ExecutionType,
        handler: impl RequestHandler + 'static,
    ) -> Arc<Self> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        Arc::new(EventRequest {
            range,
            index,
            count,
            execution,
            cancelled: AtomicBool::new(false),
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            outcome: Mutex::new(None),
            handler: Mutex::new(Box::new(handler)),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
        })
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Number of in-range events to skip before delivering.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Maximum number of events to deliver.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn execution_type(&self) -> ExecutionType {
        self.execution
    }

    /// Requests cancellation. No-op once the request has completed.
    pub fn cancel(&self) {
        if !self.is_completed() {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Number of events handed to the handler so far.
    pub fn events_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn outcome(&self) -> Option<RequestOutcome> {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands the request to a reader. Fails if it was already started.
    pub fn start(self: &Arc<Self>) -> Result<RequestDriver, TraceError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TraceError::AlreadyStarted);
        }
        let tx = self
            .done_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TraceError::AlreadyStarted)?;
        Ok(RequestDriver {
            request: Arc::clone(self),
            tx,
        })
    }

    /// Blocks until the request completes or is cancelled.
    ///
    /// Returns [`TraceError::Interrupted`] if the reader dropped the request
    /// without finishing it.
    pub fn wait_for_completion(&self) -> Result<RequestOutcome, TraceError> {
        if let Some(outcome) = self.outcome() {
            return Ok(outcome);
        }
        match self.done_rx.recv() {
            Ok(outcome) => Ok(outcome),
            Err(_) => self.outcome().ok_or(TraceError::Interrupted),
        }
    }

    /// Cancels the request and runs the cancel callback if nobody finished
    /// it yet. Used when the reader is gone.
    pub fn abandon(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.finish(RequestOutcome::Cancelled);
    }

    fn finish(&self, outcome: RequestOutcome) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        {
            let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
            match outcome {
                RequestOutcome::Completed => handler.done(),
                RequestOutcome::Cancelled => handler.handle_cancel(),
            }
        }
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        true
    }
}

impl std::fmt::Debug for EventRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRequest")
            .field("range", &self.range)
            .field("index", &self.index)
            .field("count", &self.count)
            .field("execution", &self.execution)
            .field("cancelled", &self.is_cancelled())
            .field("completed", &self.is_completed())
            .field("delivered", &self.events_delivered())
            .finish()
    }
}

/// The reader's side of a started request.
pub struct RequestDriver {
    request: Arc<EventRequest>,
    tx: Sender<RequestOutcome>,
}

impl RequestDriver {
    pub fn request(&self) -> &EventRequest {
        &self.request
    }

    /// Returns `true` while the request wants more events.
    pub fn wants_more(&self) -> bool {
        !self.request.is_cancelled() && self.request.events_delivered() < self.request.count
    }

    /// Delivers one event. Returns `false` once no more events are wanted.
    pub fn deliver(&mut self, event: &TraceEvent) -> bool {
        if !self.wants_more() {
            return false;
        }
        let flow = self
            .request
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle_data(event);
        self.request.delivered.fetch_add(1, Ordering::Relaxed);
        if flow.is_break() {
            self.request.cancel();
        }
        self.wants_more()
    }

    /// Ends the stream: `done` if it ran to the end, `handle_cancel` if it
    /// was cancelled.
    pub fn finish(self) -> RequestOutcome {
        let outcome = if self.request.is_cancelled() {
            RequestOutcome::Cancelled
        } else {
            RequestOutcome::Completed
        };
        self.request.finish(outcome);
        let outcome = self.request.outcome().unwrap_or(outcome);
        // The receiver lives as long as the request.
        let _ = self.tx.send(outcome);
        outcome
    }
}
