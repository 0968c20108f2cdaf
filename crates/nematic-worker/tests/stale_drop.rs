//! Queue-and-drop-stale behaviour of the analysis worker, driven by a
//! gated runner so the test decides when each run may finish.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use nematic_pipeline::{ClassificationConfig, RgbaImage};
use nematic_worker::{AnalysisWorker, WorkerStats};

fn source() -> RgbaImage {
    RgbaImage::from_fn(32, 32, |x, _| {
        if (x / 4) % 2 == 0 {
            image::Rgba([0, 0, 0, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    })
}

/// Config tagged with `marker` so the runner can report which request
/// it is serving.
fn tagged(marker: usize) -> ClassificationConfig {
    ClassificationConfig {
        min_lines: marker,
        ..ClassificationConfig::default()
    }
}

struct Gate {
    started: Receiver<usize>,
    release: Sender<()>,
}

/// A worker whose runner announces each start and then blocks until
/// released.
fn gated_worker(finished: Arc<AtomicBool>) -> (AnalysisWorker, Gate) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let worker = AnalysisWorker::with_runner(
        source(),
        Box::new(move |image, config| {
            started_tx.send(config.min_lines).ok();
            release_rx.recv().ok();
            let result = nematic_pipeline::analyze_image(image, config);
            finished.store(true, Ordering::SeqCst);
            result
        }),
    )
    .unwrap();
    (
        worker,
        Gate {
            started: started_rx,
            release: release_tx,
        },
    )
}

#[test]
fn newer_submissions_supersede_pending_and_discard_active() {
    let (worker, gate) = gated_worker(Arc::new(AtomicBool::new(false)));

    let first = worker.submit(tagged(1)).unwrap();
    assert_eq!(gate.started.recv().unwrap(), 1);
    assert!(worker.is_busy().unwrap());

    let second = worker.submit(tagged(2)).unwrap();
    let third = worker.submit(tagged(3)).unwrap();
    assert!(first < second && second < third);

    gate.release.send(()).unwrap();
    assert_eq!(gate.started.recv().unwrap(), 3, "request 2 must never start");
    gate.release.send(()).unwrap();

    let done = worker.wait_latest().unwrap();
    assert_eq!(done.generation, third);
    let analysis = &done.analysis;
    assert_eq!(
        analysis.classification.checks.line_count,
        analysis.features.line_count >= 3
    );

    assert_eq!(
        worker.stats().unwrap(),
        WorkerStats {
            submitted: 3,
            started: 2,
            completed: 1,
            discarded_stale: 1,
            superseded: 1,
        }
    );
    assert!(!worker.is_busy().unwrap());
}

#[test]
fn try_latest_is_none_until_the_run_finishes() {
    let (worker, gate) = gated_worker(Arc::new(AtomicBool::new(false)));

    worker.submit(tagged(4)).unwrap();
    assert_eq!(gate.started.recv().unwrap(), 4);
    assert!(worker.try_latest().unwrap().is_none());

    gate.release.send(()).unwrap();
    let done = worker.wait_latest().unwrap();
    assert_eq!(done.generation, 1);
    assert!(worker.try_latest().unwrap().is_none());
}

#[test]
fn drop_waits_for_the_active_run() {
    let finished = Arc::new(AtomicBool::new(false));
    let (worker, gate) = gated_worker(Arc::clone(&finished));

    worker.submit(tagged(1)).unwrap();
    assert_eq!(gate.started.recv().unwrap(), 1);

    let release = gate.release;
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        release.send(()).ok();
    });

    drop(worker);
    assert!(finished.load(Ordering::SeqCst));
    releaser.join().unwrap();
}

#[test]
fn drop_discards_the_pending_request() {
    let (worker, gate) = gated_worker(Arc::new(AtomicBool::new(false)));

    worker.submit(tagged(1)).unwrap();
    assert_eq!(gate.started.recv().unwrap(), 1);
    worker.submit(tagged(2)).unwrap();

    let release = gate.release;
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        release.send(()).ok();
    });

    drop(worker);
    releaser.join().unwrap();
    let later: Vec<usize> = gate.started.try_iter().collect();
    assert!(later.is_empty(), "pending request ran after shutdown: {later:?}");
}
