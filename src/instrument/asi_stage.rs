//! ASI motorized stage controller driver.
//!
//! The controller speaks a synchronous request/response protocol: every
//! command is an ASCII frame terminated by a carriage return, and every
//! command is answered by a single text line. One command is in flight at a
//! time; each method blocks the calling thread until the response arrives or
//! the transport deadline passes.
//!
//! ## Protocol Reference
//!
//! | Operation | Wire frame |
//! |---|---|
//! | Set scan speed | `SPEED x=<speed>` |
//! | Set default speed | `SPEED x=10 y=10` |
//! | Set backlash compensation | `BACKLASH x=0.04 y=0.0` |
//! | Set scan mode | `SCAN f=<0\|1>` |
//! | Zero current position | `ZERO` |
//! | Start scan | `SCAN` |
//! | Relative scan | `SCANR x=<x> y=<y>` |
//! | Vector scan | `SCANV x=<x> y=<y> f=<f>` |
//!
//! Responses are not validated against the controller's acknowledgment
//! grammar; the raw line is handed back to the caller. See
//! [`crate::instrument::Ack`] for opt-in classification.

use crate::config::StageSettings;
use crate::error::{AppResult, StageError};
use crate::instrument::transport::StageTransport;
use crate::instrument::ScanMode;
use log::debug;
use std::sync::Arc;
use tokio::sync::Mutex;

#[cfg(feature = "instrument_serial")]
use crate::instrument::transport::SerialTransport;
#[cfg(feature = "instrument_serial")]
use log::info;

/// Driver for an ASI motorized stage controller.
///
/// Owns its transport exclusively for its whole lifetime: the port is opened
/// (and its buffers cleared) in [`AsiStage::open`] and released exactly once
/// when the driver is dropped, whatever happened to the commands in between.
///
/// The driver contains no locking. Callers driving it from more than one
/// thread must serialize access externally; the intended shape is one
/// dedicated owner, see [`SharedStage`] and [`crate::worker`].
pub struct AsiStage {
    transport: Box<dyn StageTransport>,
}

impl std::fmt::Debug for AsiStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsiStage")
            .field("transport", &self.transport.port_name())
            .finish()
    }
}

/// An [`AsiStage`] behind the async-side mutex, for use with
/// [`exec_blocking`] from tokio tasks.
pub type SharedStage = Arc<Mutex<AsiStage>>;

impl AsiStage {
    /// Opens the serial port described by `settings` and wraps it in a
    /// driver.
    ///
    /// Fails with [`StageError::Connection`] when the port cannot be opened;
    /// nothing is left open on that path.
    #[cfg(feature = "instrument_serial")]
    pub fn open(settings: &StageSettings) -> AppResult<Self> {
        let transport = SerialTransport::open(settings)?;
        info!("Connected to ASI stage on '{}'", settings.port);
        Ok(Self::with_transport(Box::new(transport)))
    }

    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(_settings: &StageSettings) -> AppResult<Self> {
        Err(StageError::SerialFeatureDisabled)
    }

    /// Builds a driver over an already-open transport.
    ///
    /// This is the seam used by tests and by callers with exotic links.
    pub fn with_transport(transport: Box<dyn StageTransport>) -> Self {
        Self { transport }
    }

    /// Wraps the driver for shared use from async tasks.
    pub fn into_shared(self) -> SharedStage {
        Arc::new(Mutex::new(self))
    }

    /// Sends one command frame and blocks for its response line.
    fn command(&mut self, frame: &str) -> AppResult<String> {
        debug!(
            "Sending to '{}': {}",
            self.transport.port_name(),
            frame.escape_default()
        );
        self.transport
            .write_frame(format!("{}\r", frame).as_bytes())?;
        let response = self.transport.read_line()?;
        debug!(
            "Response from '{}': {}",
            self.transport.port_name(),
            response.escape_default()
        );
        Ok(response)
    }

    /// Sets the stage scan speed on the scanned axis.
    pub fn set_speed(&mut self, speed: f64) -> AppResult<String> {
        self.command(&format!("SPEED x={}", speed))
    }

    /// Restores the controller's stock motion speed on both axes.
    pub fn set_default_speed(&mut self) -> AppResult<String> {
        self.command("SPEED x=10 y=10")
    }

    /// Applies the fixed backlash compensation offsets.
    pub fn set_backlash(&mut self) -> AppResult<String> {
        self.command("BACKLASH x=0.04 y=0.0")
    }

    /// Selects the raster or serpentine scan pattern.
    pub fn set_scan_mode(&mut self, mode: ScanMode) -> AppResult<String> {
        self.command(&format!("SCAN f={}", mode.wire_code()))
    }

    /// Declares the current position as the origin.
    pub fn zero(&mut self) -> AppResult<String> {
        self.command("ZERO")
    }

    /// Triggers a scan pass with the previously configured parameters.
    pub fn start_scan(&mut self) -> AppResult<String> {
        self.command("SCAN")
    }

    /// Programs a relative scan over the given axis extents.
    pub fn scan_r(&mut self, x: f64, y: f64) -> AppResult<String> {
        self.command(&format!("SCANR x={} y={}", x, y))
    }

    /// Programs a vector scan over the given extents and line factor.
    pub fn scan_v(&mut self, x: f64, y: f64, f: f64) -> AppResult<String> {
        self.command(&format!("SCANV x={} y={} f={}", x, y, f))
    }
}

/// Runs a blocking stage operation from async code.
///
/// Serial I/O blocks for up to the configured timeout, so it is pushed onto
/// tokio's blocking executor; the shared mutex serializes access for callers
/// that hold clones of the same [`SharedStage`].
pub async fn exec_blocking<T, F>(stage: SharedStage, op: F) -> AppResult<T>
where
    F: FnOnce(&mut AsiStage) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = stage.blocking_lock();
        op(&mut guard)
    })
    .await
    .map_err(|e| StageError::Worker(format!("stage I/O task panicked: {}", e)))?
}
