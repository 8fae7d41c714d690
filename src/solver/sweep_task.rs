//! Background frequency scan.
//!
//! A Bode scan may take far longer than one UI frame, so it runs on a
//! worker thread over a snapshot of the circuit. The owner polls progress
//! and the final result once per frame; at most one scan is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, TryRecvError};
use log::{debug, info, warn};

use crate::circuit::Circuit;
use crate::error::{Result, SimError};

use super::ac::{run_bode, BodeConfig, BodePoint};

/// Shared cancellation flag checked between frequency points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Message from the worker to the owner.
#[derive(Debug)]
pub enum SweepEvent {
    Progress { completed: usize, total: usize },
    Done(Result<Vec<BodePoint>>),
}

/// What the owner sees when it polls.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SweepStatus {
    #[default]
    Idle,
    Running { completed: usize, total: usize },
    Finished,
    Failed(String),
    Cancelled,
}

struct Job {
    cancel: CancelToken,
    events: Receiver<SweepEvent>,
    handle: Option<JoinHandle<()>>,
}

/// Owner-side handle of the background frequency scan.
#[derive(Default)]
pub struct FrequencySweeper {
    job: Option<Job>,
    status: SweepStatus,
    results: Vec<BodePoint>,
}

impl FrequencySweeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a scan of a snapshot of `circuit`.
    ///
    /// Rejected with [`SimError::SweepInProgress`] while another scan runs;
    /// invalid ranges are rejected before any thread is spawned.
    pub fn request(&mut self, circuit: &Circuit, config: BodeConfig, temperature: f64) -> Result<()> {
        if self.is_running() {
            warn!("frequency scan requested while one is running");
            return Err(SimError::SweepInProgress);
        }
        config.validate()?;

        let snapshot = circuit.clone();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let (tx, rx) = unbounded();
        let total = config.frequencies().len();

        let handle = thread::Builder::new()
            .name("bode-sweep".to_string())
            .spawn(move || {
                let progress_tx = tx.clone();
                let result = run_bode(&snapshot, &config, temperature, &worker_cancel, |completed, total| {
                    // The owner may have gone away; nothing to do then
                    let _ = progress_tx.send(SweepEvent::Progress { completed, total });
                });
                let _ = tx.send(SweepEvent::Done(result));
            })?;

        debug!("frequency scan started: {total} points");
        self.results.clear();
        self.status = SweepStatus::Running { completed: 0, total };
        self.job = Some(Job {
            cancel,
            events: rx,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Ask the running scan to stop after its current point.
    pub fn cancel(&self) {
        if let Some(job) = &self.job {
            job.cancel.cancel();
        }
    }

    /// Drain pending events without blocking.
    pub fn poll(&mut self) -> &SweepStatus {
        loop {
            let event = match &self.job {
                Some(job) => job.events.try_recv(),
                None => break,
            };
            match event {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finish(SweepStatus::Failed("frequency scan worker exited".to_string()));
                }
            }
        }
        &self.status
    }

    /// Block until the running scan finishes.
    pub fn wait(&mut self) -> &SweepStatus {
        loop {
            let event = match &self.job {
                Some(job) => job.events.recv(),
                None => break,
            };
            match event {
                Ok(event) => self.apply(event),
                Err(_) => {
                    self.finish(SweepStatus::Failed("frequency scan worker exited".to_string()));
                }
            }
        }
        &self.status
    }

    fn apply(&mut self, event: SweepEvent) {
        match event {
            SweepEvent::Progress { completed, total } => {
                self.status = SweepStatus::Running { completed, total };
            }
            SweepEvent::Done(Ok(points)) => {
                info!("frequency scan finished with {} points", points.len());
                self.results = points;
                self.finish(SweepStatus::Finished);
            }
            SweepEvent::Done(Err(SimError::SweepCancelled)) => {
                self.finish(SweepStatus::Cancelled);
            }
            SweepEvent::Done(Err(err)) => {
                warn!("frequency scan failed: {err}");
                self.finish(SweepStatus::Failed(err.to_string()));
            }
        }
    }

    fn finish(&mut self, status: SweepStatus) {
        if let Some(mut job) = self.job.take() {
            if let Some(handle) = job.handle.take() {
                let _ = handle.join();
            }
        }
        self.status = status;
    }

    pub fn status(&self) -> &SweepStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.job.is_some()
    }

    /// Number of points in the last completed scan.
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn results(&self) -> &[BodePoint] {
        &self.results
    }
}

impl Drop for FrequencySweeper {
    fn drop(&mut self) {
        if let Some(mut job) = self.job.take() {
            job.cancel.cancel();
            if let Some(handle) = job.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::NodeId;
    use crate::components::{Capacitor, Resistor, VoltageSource};

    fn lowpass() -> (Circuit, BodeConfig) {
        let mut c = Circuit::new();
        let a = c.add_node("in");
        let b = c.add_node("out");
        let v = c.add(|id| VoltageSource::new(id, "V1", [a, NodeId::GROUND], 0.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, b], 1e3)).unwrap();
        c.add(|id| Capacitor::new(id, "C1", [b, NodeId::GROUND], 1e-6)).unwrap();
        (c, BodeConfig::new(v, b).with_points(50))
    }

    #[test]
    fn test_sweep_completes() {
        let (c, config) = lowpass();
        let mut sweeper = FrequencySweeper::new();
        sweeper.request(&c, config, 27.0).unwrap();
        assert!(sweeper.is_running());
        assert_eq!(sweeper.wait(), &SweepStatus::Finished);
        assert!(!sweeper.is_running());
        assert_eq!(sweeper.result_count(), 50);
        assert!(sweeper.results()[49].magnitude_db < sweeper.results()[0].magnitude_db);
    }

    #[test]
    fn test_second_request_rejected() {
        let (c, config) = lowpass();
        let mut sweeper = FrequencySweeper::new();
        sweeper.request(&c, config.clone().with_points(1000), 27.0).unwrap();
        let err = sweeper.request(&c, config, 27.0).unwrap_err();
        assert!(matches!(err, SimError::SweepInProgress));
        sweeper.wait();
    }

    #[test]
    fn test_invalid_range_rejected_before_spawn() {
        let (c, config) = lowpass();
        let mut sweeper = FrequencySweeper::new();
        let err = sweeper.request(&c, config.with_range(-1.0, 10.0), 27.0).unwrap_err();
        assert!(matches!(err, SimError::InvalidSweepRange { .. }));
        assert!(!sweeper.is_running());
        assert_eq!(sweeper.poll(), &SweepStatus::Idle);
    }

    #[test]
    fn test_cancel_ends_in_cancelled_or_finished() {
        let (c, config) = lowpass();
        let mut sweeper = FrequencySweeper::new();
        sweeper.request(&c, config.with_points(1000), 27.0).unwrap();
        sweeper.cancel();
        let status = sweeper.wait().clone();
        // The worker may already be done when the flag is raised
        assert!(matches!(status, SweepStatus::Cancelled | SweepStatus::Finished));
    }

    #[test]
    fn test_failure_is_reported() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let x = c.add_node("x");
        let y = c.add_node("y");
        let v = c.add(|id| VoltageSource::new(id, "V1", [a, NodeId::GROUND], 0.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, NodeId::GROUND], 1e3)).unwrap();
        c.add(|id| Resistor::new(id, "R2", [x, y], 1e3)).unwrap();

        let mut sweeper = FrequencySweeper::new();
        sweeper.request(&c, BodeConfig::new(v, a), 27.0).unwrap();
        match sweeper.wait() {
            SweepStatus::Failed(message) => assert!(message.contains("Singular")),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(sweeper.result_count(), 0);
    }
}
