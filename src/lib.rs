//! # ASI Stage Driver Library
//!
//! This crate is the core library for the `asi-stage` application. It
//! encapsulates the serial driver for ASI motorized stage controllers, the
//! configuration layer, and the background timelapse task that frontends
//! build on. By organizing the project as a library, the same driver serves
//! the control CLI, the discovery tool, and potential future GUI frontends.
//!
//! ## Crate Structure
//!
//! The library is organized into several modules, each with a distinct
//! responsibility:
//!
//! - **`config`**: Defines the structures for loading and validating
//!   application configuration from TOML files. See `config::Settings`.
//! - **`error`**: Defines the custom `StageError` enum for centralized error
//!   handling across the crate.
//! - **`instrument`**: The stage driver itself: the `AsiStage` controller,
//!   the `StageTransport` seam, the serial implementation, and a mock
//!   transport for tests.
//! - **`validation`**: A collection of utility functions for validating
//!   configuration parameters.
//! - **`worker`**: The cancellable background timelapse task.
//!
//! ## Concurrency Model
//!
//! The driver is synchronous and holds no locks: each command blocks the
//! calling thread until the controller's response line arrives or the
//! configured deadline passes. Async callers funnel commands through
//! [`instrument::exec_blocking`], which serializes access behind one mutex
//! and keeps the blocking I/O off the runtime threads.

pub mod config;
pub mod error;
pub mod instrument;
pub mod validation;
pub mod worker;

pub use error::{AppResult, StageError};
pub use instrument::{AsiStage, ScanMode};
