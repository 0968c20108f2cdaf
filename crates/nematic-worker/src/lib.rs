//! Background reprocessing worker for the nematic analysis pipeline.
//!
//! [`AnalysisWorker`] owns one decoded source image and a dedicated
//! thread that runs the pipeline on it. A host submits configs as the
//! user adjusts them and waits for the newest result:
//!
//! - at most one run is active at a time;
//! - a single pending slot holds the next request, and a newer
//!   submission replaces one that has not started yet;
//! - every submission gets a monotonically increasing generation, and a
//!   run that finishes after a newer submission is discarded.
//!
//! Dropping the worker lets the active run finish, discards any pending
//! request, and joins the thread.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use nematic_pipeline::{Analysis, ClassificationConfig, PipelineError, RgbaImage};

/// Name of the worker thread.
pub const THREAD_NAME: &str = "nematic-worker";

/// Analysis function run on the worker thread for each request.
pub type Runner =
    Box<dyn Fn(&RgbaImage, &ClassificationConfig) -> Result<Analysis, PipelineError> + Send>;

/// Errors reported by [`AnalysisWorker`].
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The source image could not be decoded.
    #[error("invalid source image: {0}")]
    Source(#[source] PipelineError),

    /// The operating system refused to start the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The run for `generation` failed.
    #[error("analysis {generation} failed: {source}")]
    Pipeline {
        generation: u64,
        #[source]
        source: PipelineError,
    },

    /// [`AnalysisWorker::wait_latest`] was called before any submission.
    #[error("no configuration has been submitted")]
    NothingSubmitted,

    /// The result for the latest generation was already handed out.
    #[error("result for generation {generation} was already delivered")]
    AlreadyDelivered { generation: u64 },

    /// The worker thread exited and will not produce further results.
    #[error("worker thread has stopped")]
    Stopped,

    /// A thread panicked while holding the worker state lock.
    #[error("worker state lock was poisoned")]
    Poisoned,
}

/// A finished run for the latest submitted generation.
#[derive(Debug)]
pub struct Completed {
    pub generation: u64,
    pub analysis: Analysis,
}

/// Counters describing how submissions were handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Configs passed to [`AnalysisWorker::submit`].
    pub submitted: u64,
    /// Runs the worker thread began.
    pub started: u64,
    /// Runs whose result was kept as the latest.
    pub completed: u64,
    /// Runs that finished after a newer submission and were dropped.
    pub discarded_stale: u64,
    /// Pending requests replaced before they started.
    pub superseded: u64,
}

struct Request {
    generation: u64,
    config: ClassificationConfig,
}

#[derive(Default)]
struct State {
    latest: u64,
    delivered: u64,
    pending: Option<Request>,
    active: Option<u64>,
    finished: Option<(u64, Result<Analysis, PipelineError>)>,
    shutdown: bool,
    stopped: bool,
    stats: WorkerStats,
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, State>, WorkerError> {
        self.state.lock().map_err(|_| WorkerError::Poisoned)
    }
}

/// Runs the analysis pipeline for one source image on a background
/// thread, keeping only the newest result.
pub struct AnalysisWorker {
    source: Arc<RgbaImage>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    /// Start a worker that analyzes `source` with
    /// [`nematic_pipeline::analyze_image`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the thread cannot be started.
    pub fn new(source: RgbaImage) -> Result<Self, WorkerError> {
        Self::with_runner(source, Box::new(nematic_pipeline::analyze_image))
    }

    /// Decode `bytes` and start a worker on the resulting image.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Source`] if the bytes are empty or not a
    /// supported image, and [`WorkerError::Spawn`] as for [`Self::new`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkerError> {
        let source = nematic_pipeline::grayscale::decode(bytes).map_err(WorkerError::Source)?;
        Self::new(source)
    }

    /// Start a worker that calls `runner` for each request.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the thread cannot be started.
    pub fn with_runner(source: RgbaImage, runner: Runner) -> Result<Self, WorkerError> {
        let source = Arc::new(source);
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
        });

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn({
                let source = Arc::clone(&source);
                let shared = Arc::clone(&shared);
                move || run_loop(&source, &shared, &runner)
            })
            .map_err(WorkerError::Spawn)?;

        tracing::debug!(
            width = source.width(),
            height = source.height(),
            "analysis worker started"
        );

        Ok(Self {
            source,
            shared,
            thread: Some(thread),
        })
    }

    /// The image every run analyzes.
    #[must_use]
    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    /// Queue a run with `config` and return its generation.
    ///
    /// Replaces any request that has not started yet. A run already in
    /// progress continues, but its result will be discarded.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Stopped`] if the worker thread has exited.
    pub fn submit(&self, config: ClassificationConfig) -> Result<u64, WorkerError> {
        let mut state = self.shared.lock()?;
        if state.stopped {
            return Err(WorkerError::Stopped);
        }

        state.latest += 1;
        let generation = state.latest;
        state.stats.submitted += 1;

        if let Some(replaced) = state.pending.replace(Request { generation, config }) {
            state.stats.superseded += 1;
            tracing::debug!(
                replaced = replaced.generation,
                generation,
                "superseded pending request"
            );
        }
        if state.finished.as_ref().is_some_and(|(g, _)| *g < generation) {
            state.finished = None;
        }

        drop(state);
        self.shared.changed.notify_all();
        Ok(generation)
    }

    /// Block until the latest submitted generation has finished and
    /// take its result.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::NothingSubmitted`] before the first submission.
    /// - [`WorkerError::AlreadyDelivered`] if the latest result was
    ///   already taken.
    /// - [`WorkerError::Pipeline`] if the latest run failed.
    /// - [`WorkerError::Stopped`] if the thread exited first.
    pub fn wait_latest(&self) -> Result<Completed, WorkerError> {
        let mut state = self.shared.lock()?;
        loop {
            if state.latest == 0 {
                return Err(WorkerError::NothingSubmitted);
            }
            if state.delivered == state.latest {
                return Err(WorkerError::AlreadyDelivered {
                    generation: state.latest,
                });
            }
            if let Some(done) = take_latest(&mut state) {
                return done;
            }
            if state.stopped {
                return Err(WorkerError::Stopped);
            }
            state = self
                .shared
                .changed
                .wait(state)
                .map_err(|_| WorkerError::Poisoned)?;
        }
    }

    /// Take the latest result if it is ready, without blocking.
    ///
    /// # Errors
    ///
    /// [`WorkerError::Pipeline`] if the latest run failed, or
    /// [`WorkerError::Poisoned`].
    pub fn try_latest(&self) -> Result<Option<Completed>, WorkerError> {
        let mut state = self.shared.lock()?;
        take_latest(&mut state).transpose()
    }

    /// Whether a run is active or a request is waiting.
    ///
    /// # Errors
    ///
    /// [`WorkerError::Poisoned`].
    pub fn is_busy(&self) -> Result<bool, WorkerError> {
        let state = self.shared.lock()?;
        Ok(state.active.is_some() || state.pending.is_some())
    }

    /// Snapshot of the submission counters.
    ///
    /// # Errors
    ///
    /// [`WorkerError::Poisoned`].
    pub fn stats(&self) -> Result<WorkerStats, WorkerError> {
        Ok(self.shared.lock()?.stats)
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.shutdown = true;
        if let Some(dropped) = state.pending.take() {
            tracing::debug!(
                generation = dropped.generation,
                "dropped pending request on shutdown"
            );
        }
        drop(state);
        self.shared.changed.notify_all();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("analysis worker thread panicked");
            }
        }
    }
}

fn take_latest(state: &mut State) -> Option<Result<Completed, WorkerError>> {
    let latest = state.latest;
    if !state.finished.as_ref().is_some_and(|(g, _)| *g == latest) {
        return None;
    }
    let (generation, outcome) = state.finished.take()?;
    state.delivered = generation;
    Some(
        outcome
            .map(|analysis| Completed {
                generation,
                analysis,
            })
            .map_err(|source| WorkerError::Pipeline { generation, source }),
    )
}

/// Marks the worker stopped when the thread exits, including by panic.
struct StopGuard<'a>(&'a Shared);

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        let mut state = self
            .0
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.stopped = true;
        state.active = None;
        drop(state);
        self.0.changed.notify_all();
    }
}

fn run_loop(source: &RgbaImage, shared: &Shared, runner: &Runner) {
    let _stop = StopGuard(shared);

    while let Some(request) = next_request(shared) {
        let generation = request.generation;
        tracing::debug!(generation, "analysis started");
        let outcome = runner(source, &request.config);

        let Ok(mut state) = shared.lock() else {
            return;
        };
        state.active = None;
        if generation < state.latest {
            state.stats.discarded_stale += 1;
            tracing::debug!(generation, latest = state.latest, "discarded stale result");
        } else {
            state.stats.completed += 1;
            match &outcome {
                Ok(analysis) => tracing::info!(
                    generation,
                    phase = %analysis.classification.phase,
                    lines = analysis.lines.len(),
                    "analysis completed"
                ),
                Err(e) => tracing::warn!(generation, error = %e, "analysis failed"),
            }
            state.finished = Some((generation, outcome));
        }
        drop(state);
        shared.changed.notify_all();
    }
}

/// Wait for the next pending request, or `None` on shutdown.
fn next_request(shared: &Shared) -> Option<Request> {
    let mut state = shared.lock().ok()?;
    loop {
        if state.shutdown {
            return None;
        }
        if let Some(request) = state.pending.take() {
            state.active = Some(request.generation);
            state.stats.started += 1;
            return Some(request);
        }
        state = shared.changed.wait(state).ok()?;
    }
}
