//! Mock transport for testing the stage driver without hardware.
//!
//! Provides:
//! - Scripted response lines
//! - Controllable failure injection
//! - A frame log for test verification
//! - A close counter to assert teardown happens exactly once

use crate::error::{AppResult, StageError};
use crate::instrument::transport::StageTransport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Handle onto a [`MockTransport`]'s recorded state.
///
/// The transport itself is moved into the controller under test; tests keep
/// this handle to inspect what was written and whether the transport was
/// dropped.
#[derive(Clone, Default)]
pub struct MockState {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
    fail_next_write: Arc<AtomicBool>,
}

impl MockState {
    /// Every frame written so far, as raw bytes.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().expect("frame log poisoned").clone()
    }

    /// Every frame written so far, lossily decoded for convenient asserts.
    pub fn frames_as_strings(&self) -> Vec<String> {
        self.frames()
            .into_iter()
            .map(|f| String::from_utf8_lossy(&f).into_owned())
            .collect()
    }

    /// How many times the transport has been dropped.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Makes the next write fail with an I/O error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }
}

/// In-memory [`StageTransport`] with scripted responses.
pub struct MockTransport {
    state: MockState,
    responses: VecDeque<String>,
    /// Reply used once the scripted queue is exhausted.
    fallback: Option<String>,
}

impl MockTransport {
    /// Creates a transport that answers every read with a timeout.
    pub fn new() -> Self {
        Self {
            state: MockState::default(),
            responses: VecDeque::new(),
            fallback: None,
        }
    }

    /// Creates a transport that replies with the given lines, in order.
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: MockState::default(),
            responses: responses.into_iter().map(Into::into).collect(),
            fallback: None,
        }
    }

    /// Creates a transport that acknowledges every command with `:A`.
    pub fn always_ack() -> Self {
        let mut t = Self::new();
        t.fallback = Some(":A".to_string());
        t
    }

    /// Handle for inspecting recorded frames and teardown.
    pub fn state(&self) -> MockState {
        self.state.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTransport for MockTransport {
    fn write_frame(&mut self, frame: &[u8]) -> AppResult<()> {
        if self.state.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StageError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        self.state
            .frames
            .lock()
            .expect("frame log poisoned")
            .push(frame.to_vec());
        Ok(())
    }

    fn read_line(&mut self) -> AppResult<String> {
        self.responses
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or(StageError::Timeout(Duration::from_millis(0)))
    }

    fn port_name(&self) -> &str {
        "mock"
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_responses_in_order() {
        let mut transport = MockTransport::with_responses([":A", ":N-4"]);
        transport.write_frame(b"ZERO\r").unwrap();
        assert_eq!(transport.read_line().unwrap(), ":A");
        assert_eq!(transport.read_line().unwrap(), ":N-4");
    }

    #[test]
    fn test_exhausted_responses_time_out() {
        let mut transport = MockTransport::new();
        assert!(matches!(
            transport.read_line().unwrap_err(),
            StageError::Timeout(_)
        ));
    }

    #[test]
    fn test_frame_log_records_exact_bytes() {
        let mut transport = MockTransport::with_responses([":A"]);
        let state = transport.state();
        transport.write_frame(b"SCAN f=1\r").unwrap();
        assert_eq!(state.frames(), vec![b"SCAN f=1\r".to_vec()]);
    }

    #[test]
    fn test_write_failure_is_one_shot() {
        let mut transport = MockTransport::with_responses([":A"]);
        let state = transport.state();

        state.fail_next_write();
        assert!(transport.write_frame(b"ZERO\r").is_err());
        // the flag is consumed; the next write succeeds
        assert!(transport.write_frame(b"ZERO\r").is_ok());
        assert_eq!(state.frames().len(), 1);
    }

    #[test]
    fn test_always_ack_never_runs_dry() {
        let mut transport = MockTransport::always_ack();
        for _ in 0..100 {
            assert_eq!(transport.read_line().unwrap(), ":A");
        }
    }

    #[test]
    fn test_drop_counts_exactly_one_close() {
        let transport = MockTransport::new();
        let state = transport.state();
        assert_eq!(state.close_count(), 0);
        drop(transport);
        assert_eq!(state.close_count(), 1);
    }
}
