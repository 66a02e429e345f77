//! Background retraining: runs on its own thread so a slow fit never blocks
//! the capture path. Jobs queue on an mpsc channel and are drained one at a
//! time, matching the "at most one retrain runs concurrently" guarantee.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::detector::{AnomalyDetector, DetectorParams};
use crate::pipeline::FeatureVector;

pub struct RetrainJob {
    pub rows: Vec<FeatureVector>,
    pub params: DetectorParams,
    pub model_path: PathBuf,
}

pub struct RetrainWorker {
    sender: mpsc::Sender<RetrainJob>,
    _thread: std::thread::JoinHandle<()>,
}

impl RetrainWorker {
    /// `target` is the live detector the capture path scores against; a
    /// completed retrain swaps it in under its own lock so in-flight scoring
    /// never blocks on the fit itself.
    pub fn start(target: Arc<Mutex<AnomalyDetector>>) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel::<RetrainJob>();
        let thread = std::thread::Builder::new()
            .name("retrain-worker".into())
            .spawn(move || {
                for job in receiver {
                    run_job(&target, job);
                }
                tracing::info!("retrain worker drained its queue and stopped");
            })?;
        Ok(Self { sender, _thread: thread })
    }

    /// Enqueues a retrain; returns an error only if the worker thread has
    /// already exited (e.g. during shutdown).
    pub fn submit(&self, job: RetrainJob) -> anyhow::Result<()> {
        self.sender
            .send(job)
            .map_err(|_| anyhow::anyhow!("retrain worker is no longer accepting jobs"))
    }
}

fn run_job(target: &Arc<Mutex<AnomalyDetector>>, job: RetrainJob) {
    let mut candidate = AnomalyDetector::new(job.params);
    if let Err(e) = candidate.fit(&job.rows) {
        tracing::warn!("retrain skipped: {e}");
        return;
    }
    if let Err(e) = candidate.save(&job.model_path) {
        tracing::warn!("retrain fit succeeded but save failed: {e}");
        return;
    }
    *target.lock().unwrap() = candidate;
    tracing::info!("retrain complete, detector swapped in");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorParams;

    fn uniform_rows(n: usize) -> Vec<FeatureVector> {
        (0..n)
            .map(|i| FeatureVector {
                protocol: 6.0,
                packet_size_log: 1.0,
                time_diff: (i % 5) as f64,
                dport: 80.0,
                is_ephemeral_sport: 0.0,
                unique_dports_15s: 1.0,
                direction: 1.0,
            })
            .collect()
    }

    #[test]
    fn submitted_job_swaps_the_live_detector() {
        let target = Arc::new(Mutex::new(AnomalyDetector::new(DetectorParams::default())));
        assert!(!target.lock().unwrap().is_ready());

        let worker = RetrainWorker::start(Arc::clone(&target)).unwrap();
        let dir = std::env::temp_dir().join(format!("vigilnet-retrain-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        worker
            .submit(RetrainJob {
                rows: uniform_rows(50),
                params: DetectorParams { contamination: 0.05, n_estimators: 5, random_state: 1 },
                model_path: dir.join("model.bin"),
            })
            .unwrap();

        let mut ready = false;
        for _ in 0..200 {
            if target.lock().unwrap().is_ready() {
                ready = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(ready, "expected the retrain to complete and swap in a ready detector");
        std::fs::remove_dir_all(&dir).ok();
    }
}
