//! Background timelapse scan task.
//!
//! Drives the stage through a sequence of scan passes without blocking the
//! caller: a dedicated tokio task owns the exchange with the controller,
//! accepts a stop signal, and reports completion through its join handle.
//! Progress is streamed over a broadcast channel so a frontend can follow
//! along without polling.

use crate::config::TimelapseSettings;
use crate::error::{AppResult, StageError};
use crate::instrument::{exec_blocking, Ack, SharedStage};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// One completed scan trigger within a timelapse run.
#[derive(Clone, Debug)]
pub struct ScanEvent {
    pub timestamp: DateTime<Utc>,
    /// Zero-based index of the scan pass.
    pub timepoint: u32,
    /// Raw response line the controller returned for the `SCAN` trigger.
    pub response: String,
}

/// Cancellable timelapse runner.
///
/// The worker is the single owner of stage access while a run is active
/// (commands are funneled through the shared mutex). `start` spawns the
/// task, `stop` signals it, and `join` waits for the completion
/// notification, returning how many timepoints were actually triggered.
pub struct TimelapseWorker {
    stage: SharedStage,
    events: broadcast::Sender<ScanEvent>,
    stop_tx: Option<Arc<watch::Sender<bool>>>,
    handle: Option<JoinHandle<AppResult<u32>>>,
}

/// Cloneable handle for requesting a stop from another task.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Signals the run to stop after the current timepoint.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

impl TimelapseWorker {
    pub fn new(stage: SharedStage) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            stage,
            events,
            stop_tx: None,
            handle: None,
        }
    }

    /// Subscribes to per-timepoint progress events.
    pub fn events(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the timelapse task.
    ///
    /// The stage is prepared once (stock speed, backlash compensation, scan
    /// pattern, zero reference, scan speed), then `SCAN` is triggered
    /// `nb_timepoints` times with the configured interval in between. A
    /// negative acknowledgment is logged, not fatal; a transport failure
    /// aborts the run and surfaces through [`TimelapseWorker::join`].
    pub fn start(&mut self, params: TimelapseSettings) -> AppResult<()> {
        if self.handle.is_some() {
            return Err(StageError::Worker("timelapse already running".to_string()));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let stage = self.stage.clone();
        let events = self.events.clone();

        self.stop_tx = Some(Arc::new(stop_tx));
        self.handle = Some(tokio::spawn(run_timelapse(stage, params, events, stop_rx)));
        Ok(())
    }

    /// Handle for stopping the run from another task.
    ///
    /// `None` when nothing is running.
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.stop_tx.as_ref().map(|tx| StopHandle { tx: tx.clone() })
    }

    /// Signals the running task to stop after the current timepoint.
    ///
    /// A no-op when nothing is running. An in-flight `SCAN` exchange is
    /// never interrupted; the task re-checks the flag between commands.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
    }

    /// Waits for the task to finish and returns the number of timepoints
    /// that were triggered.
    pub async fn join(&mut self) -> AppResult<u32> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| StageError::Worker("no timelapse running".to_string()))?;
        let completed = handle
            .await
            .map_err(|e| StageError::Worker(format!("timelapse task panicked: {}", e)))?;
        self.stop_tx = None;
        completed
    }
}

async fn run_timelapse(
    stage: SharedStage,
    params: TimelapseSettings,
    events: broadcast::Sender<ScanEvent>,
    mut stop_rx: watch::Receiver<bool>,
) -> AppResult<u32> {
    info!(
        "Starting timelapse: {} timepoints, {:?} interval, {} pattern",
        params.nb_timepoints,
        params.interval(),
        params.scan_mode
    );

    // One-time stage preparation before the first trigger.
    let mode = params.scan_mode;
    let speed = params.scan_speed;
    exec_blocking(stage.clone(), move |s| {
        s.set_default_speed()?;
        s.set_backlash()?;
        s.set_scan_mode(mode)?;
        s.zero()?;
        s.set_speed(speed)
    })
    .await?;

    let mut completed = 0u32;
    for timepoint in 0..params.nb_timepoints {
        if *stop_rx.borrow() {
            break;
        }

        let response = exec_blocking(stage.clone(), |s| s.start_scan()).await?;
        if let Ack::Error(code) = Ack::classify(&response) {
            warn!(
                "Controller rejected scan trigger {} with code {}",
                timepoint, code
            );
        }

        completed += 1;
        let _ = events.send(ScanEvent {
            timestamp: Utc::now(),
            timepoint,
            response,
        });

        if timepoint + 1 < params.nb_timepoints {
            // Sleep until the next timepoint, waking early on stop.
            match tokio::time::timeout(params.interval(), stop_rx.changed()).await {
                Ok(Ok(())) => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
                // Stop handle dropped without a signal; keep pacing.
                Ok(Err(_)) => tokio::time::sleep(params.interval()).await,
                // Interval elapsed with no stop request.
                Err(_) => {}
            }
        }
    }

    info!("Timelapse finished after {} timepoints", completed);
    Ok(completed)
}
