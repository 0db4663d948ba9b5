//! Trace graph CLI.
//!
//! Provides the `tgraph` binary. `path` builds a thread-state graph from a
//! JSON-lines scheduler trace and prints a worker's critical path; `summary`
//! prints the shape of the graph. Output is JSON on stdout; logs go to
//! stderr and are filtered with `RUST_LOG`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tgraph_build::{BuildError, GraphBuilder, MemoryTrace, SchedProvider};
use tgraph_core::{EdgeType, ExecGraph, VertexId, WorkerKey};
use tgraph_critical::{CriticalPath, CriticalPathEngine, CriticalPathError, PathEdge, PriorityPolicy};

/// Execution graph and critical path tools for scheduler traces.
#[derive(Parser)]
#[command(name = "tgraph", about = "Execution graph and critical path tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the critical path of one worker.
    Path {
        /// JSON-lines trace file.
        #[arg(short, long)]
        trace: PathBuf,

        /// Worker key, e.g. `tid/42`.
        #[arg(short, long)]
        worker: String,

        /// JSON file holding the edge-type priority order, highest first.
        #[arg(short, long)]
        policy: Option<PathBuf>,

        /// Start at the worker's first vertex at or after this timestamp.
        #[arg(long)]
        start: Option<i64>,

        /// End at the worker's last vertex at or before this timestamp.
        #[arg(long)]
        end: Option<i64>,
    },

    /// Print worker and vertex counts of the graph built from a trace.
    Summary {
        /// JSON-lines trace file.
        #[arg(short, long)]
        trace: PathBuf,
    },
}

/// Exit codes.
const OK: i32 = 0;
const ANALYSIS_ERROR: i32 = 1;
const DISCONNECTED: i32 = 2;
const IO_ERROR: i32 = 3;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Path {
            trace,
            worker,
            policy,
            start,
            end,
        } => run_path(&trace, WorkerKey::new(worker), policy.as_deref(), start, end),
        Commands::Summary { trace } => run_summary(&trace),
    };
    process::exit(exit_code);
}

#[derive(Serialize)]
struct PathOutput<'a> {
    complete: bool,
    start: i64,
    end: i64,
    duration: i64,
    workers: Vec<&'a WorkerKey>,
    breakdown: BTreeMap<EdgeType, i64>,
    edges: &'a [PathEdge],
}

impl<'a> PathOutput<'a> {
    fn new(path: &'a CriticalPath, complete: bool) -> Self {
        PathOutput {
            complete,
            start: path.start().timestamp,
            end: path.end().timestamp,
            duration: path.duration(),
            workers: path.workers(),
            breakdown: path.breakdown(),
            edges: path.edges(),
        }
    }
}

#[derive(Serialize)]
struct WorkerSummary<'a> {
    key: &'a WorkerKey,
    vertices: usize,
    first: Option<i64>,
    last: Option<i64>,
}

#[derive(Serialize)]
struct GraphSummary<'a> {
    events: u64,
    vertices: usize,
    edges: usize,
    time_range: Option<(i64, i64)>,
    edge_types: BTreeMap<EdgeType, usize>,
    workers: Vec<WorkerSummary<'a>>,
}

/// Execute the path subcommand.
fn run_path(
    trace: &Path,
    worker: WorkerKey,
    policy: Option<&Path>,
    start: Option<i64>,
    end: Option<i64>,
) -> i32 {
    match compute_path(trace, &worker, policy, start, end) {
        Ok((path, true)) => print_json(&PathOutput::new(&path, true), OK),
        Ok((partial, false)) => print_json(&PathOutput::new(&partial, false), DISCONNECTED),
        Err(code) => code,
    }
}

/// Builds the trace's graph and computes `worker`'s critical path.
///
/// Returns the path and whether it reached the start; a disconnected
/// traversal yields its partial path. Errors are reported on stderr and
/// mapped to an exit code.
fn compute_path(
    trace: &Path,
    worker: &WorkerKey,
    policy: Option<&Path>,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<(CriticalPath, bool), i32> {
    let engine = CriticalPathEngine::new(policy.map(load_policy).transpose()?.unwrap_or_default());
    let builder = build(trace)?;
    let Some(shared) = builder.graph() else {
        eprintln!("Error: no graph was built");
        return Err(ANALYSIS_ERROR);
    };
    let graph = shared.read();

    let (from, to) = resolve_bounds(&graph, worker, start, end).map_err(|msg| {
        eprintln!("Error: {}", msg);
        ANALYSIS_ERROR
    })?;

    match engine.compute(&graph, from, Some(to)) {
        Ok(path) => Ok((path, true)),
        Err(CriticalPathError::DisconnectedPath { reached, partial }) => {
            eprintln!(
                "Warning: path is disconnected at vertex {}; printing the partial path",
                reached
            );
            Ok((*partial, false))
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(ANALYSIS_ERROR)
        }
    }
}

/// Execute the summary subcommand.
fn run_summary(trace: &Path) -> i32 {
    let builder = match build(trace) {
        Ok(builder) => builder,
        Err(code) => return code,
    };
    let Some(shared) = builder.graph() else {
        eprintln!("Error: no graph was built");
        return ANALYSIS_ERROR;
    };
    let graph = shared.read();

    let mut edge_types = BTreeMap::new();
    for edge in graph.edges() {
        *edge_types.entry(edge.edge_type()).or_insert(0) += 1;
    }
    let workers = graph
        .workers()
        .map(|w| WorkerSummary {
            key: &w.key,
            vertices: w.len(),
            first: w.head().and_then(|v| graph.vertex(v)).map(|v| v.timestamp),
            last: w.last_timestamp(),
        })
        .collect();

    let summary = GraphSummary {
        events: builder.reader().len() as u64,
        vertices: graph.node_count(),
        edges: graph.edge_count(),
        time_range: graph.time_range(),
        edge_types,
        workers,
    };
    print_json(&summary, OK)
}

/// Loads the trace and builds its scheduler graph.
fn build(trace: &Path) -> Result<GraphBuilder<MemoryTrace>, i32> {
    let reader = MemoryTrace::from_json_lines(trace).map_err(|e| {
        eprintln!("Error: failed to load trace '{}': {}", trace.display(), e);
        IO_ERROR
    })?;
    let builder = GraphBuilder::new(reader);
    match builder.build(SchedProvider::new()) {
        Ok(report) => {
            tracing::info!(state = ?report.state, events = report.events, "trace loaded");
            Ok(builder)
        }
        Err(BuildError::Trace(e)) => {
            eprintln!("Error: {}", e);
            Err(IO_ERROR)
        }
        Err(e) => {
            eprintln!("Error: graph build failed: {}", e);
            Err(ANALYSIS_ERROR)
        }
    }
}

fn load_policy(path: &Path) -> Result<PriorityPolicy, i32> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read policy '{}': {}", path.display(), e);
        IO_ERROR
    })?;
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: invalid policy '{}': {}", path.display(), e);
        IO_ERROR
    })
}

/// Picks the start and end vertices on `worker`'s timeline.
fn resolve_bounds(
    graph: &ExecGraph,
    worker: &WorkerKey,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<(VertexId, VertexId), String> {
    let id = graph
        .worker_id(worker)
        .ok_or_else(|| format!("worker not found: {}", worker))?;
    let timeline = graph
        .worker(id)
        .ok_or_else(|| format!("worker not found: {}", worker))?;
    let vertices = timeline.vertices();

    let first = match start {
        None => 0,
        Some(ts) => match timeline.position_at(ts) {
            None => 0,
            Some(i) if graph.vertex(vertices[i]).map(|v| v.timestamp) == Some(ts) => i,
            Some(i) => i + 1,
        },
    };
    let last = match end {
        None => vertices.len().checked_sub(1),
        Some(ts) => timeline.position_at(ts),
    };
    match (vertices.get(first), last.and_then(|i| vertices.get(i))) {
        (Some(&from), Some(&to)) => Ok((from, to)),
        _ => Err(format!(
            "worker {} has no vertices in the requested range",
            worker
        )),
    }
}

fn print_json(value: &impl Serialize, code: i32) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            code
        }
        Err(e) => {
            eprintln!("Error: failed to serialize output: {}", e);
            ANALYSIS_ERROR
        }
    }
}
