//! Trace readers: the event sources behind graph builds.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::error::TraceError;
use crate::event::{TimeRange, TraceEvent};
use crate::request::{EventRequest, ExecutionType};

/// A source of trace events.
///
/// Implementations must deliver events to a request one at a time, from a
/// single thread, in non-decreasing timestamp order, and must finish every
/// request they start.
pub trait TraceReader: Send + Sync {
    /// Starts serving `request` in the background and returns immediately.
    fn send_request(&self, request: &Arc<EventRequest>) -> Result<(), TraceError>;

    /// First and last timestamps of the trace, if it has events.
    fn time_range(&self) -> Option<TimeRange>;
}

/// An in-memory trace served from a background thread per request.
#[derive(Debug, Clone)]
pub struct MemoryTrace {
    events: Arc<Vec<TraceEvent>>,
}

impl MemoryTrace {
    /// Wraps events that are already sorted by timestamp.
    pub fn new(events: Vec<TraceEvent>) -> Result<Self, TraceError> {
        for (index, pair) in events.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(TraceError::OutOfOrder {
                    index: index + 1,
                    previous: pair[0].timestamp,
                    timestamp: pair[1].timestamp,
                });
            }
        }
        Ok(MemoryTrace {
            events: Arc::new(events),
        })
    }

    /// Reads a JSON-lines trace: one [`TraceEvent`] object per line. Blank
    /// lines are skipped.
    pub fn from_json_lines(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self, TraceError> {
        let mut events = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|source| TraceError::Parse {
                line: number + 1,
                source,
            })?;
            events.push(event);
        }
        Self::new(events)
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl TraceReader for MemoryTrace {
    fn send_request(&self, request: &Arc<EventRequest>) -> Result<(), TraceError> {
        let mut driver = request.start()?;
        let events = Arc::clone(&self.events);
        let name = match request.execution_type() {
            ExecutionType::Foreground => "tgraph-reader-fg",
            ExecutionType::Background => "tgraph-reader-bg",
        };
        tracing::debug!(?request, "serving event request");

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let range = driver.request().range();
                let skip = usize::try_from(driver.request().index()).unwrap_or(usize::MAX);
                let in_range = events.iter().filter(|e| range.contains(e.timestamp));
                for event in in_range.skip(skip) {
                    if !driver.deliver(event) {
                        break;
                    }
                }
                let outcome = driver.finish();
                tracing::debug!(?outcome, "event request finished");
            })?;
        Ok(())
    }

    fn time_range(&self) -> Option<TimeRange> {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => Some(TimeRange::new(first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::request::tests::Recorder;
    use crate::request::RequestOutcome;

    fn trace(timestamps: &[i64]) -> MemoryTrace {
        MemoryTrace::new(timestamps.iter().map(|&t| TraceEvent::new(t, "e")).collect()).unwrap()
    }

    #[test]
    fn rejects_unsorted_events() {
        let events = vec![TraceEvent::new(5, "a"), TraceEvent::new(3, "b")];
        match MemoryTrace::new(events) {
            Err(TraceError::OutOfOrder {
                index,
                previous,
                timestamp,
            }) => assert_eq!((index, previous, timestamp), (1, 5, 3)),
            other => panic!("expected OutOfOrder, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn serves_whole_trace_in_order() {
        let reader = trace(&[1, 2, 2, 9]);
        assert_eq!(reader.time_range(), Some(TimeRange::new(1, 9)));

        let recorder = Recorder::default();
        let request = EventRequest::new(recorder.clone());
        reader.send_request(&request).unwrap();

        assert_eq!(request.wait_for_completion().unwrap(), RequestOutcome::Completed);
        assert_eq!(
            recorder.entries(),
            vec!["data 1", "data 2", "data 2", "data 9", "done"]
        );
    }

    #[test]
    fn honours_range_index_and_count() {
        let reader = trace(&[1, 2, 3, 4, 5, 6]);
        let recorder = Recorder::default();
        let request = EventRequest::with_params(
            TimeRange::new(2, 6),
            1,
            3,
            ExecutionType::Foreground,
            recorder.clone(),
        );
        reader.send_request(&request).unwrap();

        assert_eq!(request.wait_for_completion().unwrap(), RequestOutcome::Completed);
        assert_eq!(recorder.entries(), vec!["data 3", "data 4", "data 5", "done"]);
    }

    #[test]
    fn cancelled_before_start_only_cancels() {
        let reader = trace(&[1, 2, 3]);
        let recorder = Recorder::default();
        let request = EventRequest::new(recorder.clone());
        request.cancel();
        reader.send_request(&request).unwrap();

        assert_eq!(request.wait_for_completion().unwrap(), RequestOutcome::Cancelled);
        assert_eq!(recorder.entries(), vec!["cancel"]);
    }

    #[test]
    fn parses_json_lines() {
        let input = concat!(
            r#"{"timestamp": 1, "name": "sched_switch", "fields": {"prev_tid": 1}}"#,
            "\n\n",
            r#"{"timestamp": 4, "name": "sched_wakeup", "fields": {"tid": 1}}"#,
            "\n",
        );
        let reader = MemoryTrace::from_reader(Cursor::new(input)).unwrap();
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.events()[1].name, "sched_wakeup");
    }

    #[test]
    fn reports_bad_line_number() {
        let input = "{\"timestamp\": 1, \"name\": \"a\"}\nnot json\n";
        match MemoryTrace::from_reader(Cursor::new(input)) {
            Err(TraceError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected Parse error, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        std::fs::write(&path, "{\"timestamp\": 3, \"name\": \"a\"}\n").unwrap();
        let reader = MemoryTrace::from_json_lines(&path).unwrap();
        assert_eq!(reader.time_range(), Some(TimeRange::new(3, 3)));
    }
}
