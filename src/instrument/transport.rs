//! Serial transport for the stage controller.
//!
//! The controller speaks a line-oriented ASCII protocol over RS-232:
//! commands go out as `\r`-terminated frames, responses come back as single
//! `\n`-terminated lines. This module owns the byte-level side of that
//! exchange behind the [`StageTransport`] trait so the driver logic can be
//! exercised against a mock port in tests.

use crate::error::{AppResult, StageError};
use std::io::Read;
use std::time::{Duration, Instant};

#[cfg(feature = "instrument_serial")]
use crate::config::StageSettings;
#[cfg(feature = "instrument_serial")]
use log::{debug, trace};

/// Byte-level boundary between the stage driver and its serial link.
///
/// One in-flight exchange at a time: `write_frame` transmits a complete
/// command frame, `read_line` blocks for the single response line. No
/// internal locking is provided; a caller operating the driver from several
/// threads must serialize access externally.
pub trait StageTransport: Send {
    /// Transmits one complete command frame (terminator included).
    fn write_frame(&mut self, frame: &[u8]) -> AppResult<()>;

    /// Blocks until one response line arrives or the deadline passes.
    ///
    /// The returned string has the line terminator trimmed.
    fn read_line(&mut self) -> AppResult<String>;

    /// Human-readable port identifier, for logging.
    fn port_name(&self) -> &str;
}

/// Accumulates bytes from `reader` until a `\n` arrives or `timeout` elapses.
///
/// The port is expected to be configured with a short internal read timeout;
/// `TimedOut`/`WouldBlock` reads are retried until the overall deadline.
/// `capacity` pre-sizes the accumulation buffer.
pub(crate) fn read_line_with_deadline<R: Read + ?Sized>(
    reader: &mut R,
    timeout: Duration,
    capacity: usize,
) -> AppResult<String> {
    let start = Instant::now();
    let mut line: Vec<u8> = Vec::with_capacity(capacity.min(4096));
    let mut buf = [0u8; 1];

    loop {
        if start.elapsed() >= timeout {
            return Err(StageError::Timeout(timeout));
        }

        match reader.read(&mut buf) {
            Ok(1) => {
                line.push(buf[0]);
                if buf[0] == b'\n' {
                    break;
                }
            }
            Ok(_) => return Err(StageError::UnexpectedEof),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                continue;
            }
            Err(e) => return Err(StageError::Io(e)),
        }
    }

    Ok(String::from_utf8_lossy(&line).trim_end().to_string())
}

/// RS-232 transport backed by the `serialport` crate.
///
/// Opens the port with the controller's fixed framing (8-N-1, no flow
/// control) and discards any stale bytes left over from a previous session.
/// The port handle is released when the transport is dropped.
#[cfg(feature = "instrument_serial")]
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    port_name: String,
    timeout: Duration,
    buffer_size: usize,
}

/// Internal per-read timeout; the overall deadline is enforced in
/// [`read_line_with_deadline`].
#[cfg(feature = "instrument_serial")]
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[cfg(feature = "instrument_serial")]
impl SerialTransport {
    /// Opens the serial port described by `settings`.
    ///
    /// Returns [`StageError::Connection`] if the port cannot be opened
    /// (missing, busy, insufficient permissions) or its buffers cannot be
    /// reset. No handle is retained on the error path.
    pub fn open(settings: &StageSettings) -> AppResult<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(|e| StageError::Connection {
                port: settings.port.clone(),
                message: e.to_string(),
            })?;

        // Discard stale bytes from a previous session before the first
        // command goes out.
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| StageError::Connection {
                port: settings.port.clone(),
                message: format!("failed to reset buffers: {}", e),
            })?;

        debug!(
            "Serial port '{}' opened at {} baud",
            settings.port, settings.baud_rate
        );

        Ok(Self {
            port,
            port_name: settings.port.clone(),
            timeout: settings.timeout(),
            buffer_size: settings.buffer_size,
        })
    }

    fn map_write_error(&self, e: std::io::Error) -> StageError {
        if e.kind() == std::io::ErrorKind::TimedOut {
            StageError::Timeout(self.timeout)
        } else {
            StageError::Io(e)
        }
    }
}

#[cfg(feature = "instrument_serial")]
impl StageTransport for SerialTransport {
    fn write_frame(&mut self, frame: &[u8]) -> AppResult<()> {
        use std::io::Write;

        self.port
            .write_all(frame)
            .map_err(|e| self.map_write_error(e))?;
        self.port.flush().map_err(|e| self.map_write_error(e))?;
        trace!(
            "Sent {} bytes to '{}': {}",
            frame.len(),
            self.port_name,
            String::from_utf8_lossy(frame).escape_default()
        );
        Ok(())
    }

    fn read_line(&mut self) -> AppResult<String> {
        let line = read_line_with_deadline(&mut self.port, self.timeout, self.buffer_size)?;
        trace!(
            "Received from '{}': {}",
            self.port_name,
            line.escape_default()
        );
        Ok(line)
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[cfg(feature = "instrument_serial")]
impl Drop for SerialTransport {
    fn drop(&mut self) {
        // Best effort: the handle itself closes when the box is dropped.
        debug!("Serial port '{}' closed", self.port_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Read};

    /// Reader that yields a fixed byte sequence, then times out forever.
    struct ScriptedReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl ScriptedReader {
        fn new(data: &[u8]) -> Self {
            Self {
                data: data.to_vec(),
                pos: 0,
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos < self.data.len() {
                buf[0] = self.data[self.pos];
                self.pos += 1;
                Ok(1)
            } else {
                Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
            }
        }
    }

    /// Reader that never produces a byte.
    struct SilentReader;

    impl Read for SilentReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
        }
    }

    /// Reader that reports end-of-stream immediately.
    struct EofReader;

    impl Read for EofReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_reads_one_line_and_strips_terminator() {
        let mut reader = ScriptedReader::new(b":A\r\n");
        let line = read_line_with_deadline(&mut reader, Duration::from_millis(100), 64).unwrap();
        assert_eq!(line, ":A");
    }

    #[test]
    fn test_stops_at_first_newline() {
        let mut reader = ScriptedReader::new(b":A\nleftover");
        let line = read_line_with_deadline(&mut reader, Duration::from_millis(100), 64).unwrap();
        assert_eq!(line, ":A");
        // the bytes after the terminator stay in the reader
        assert_eq!(&reader.data[reader.pos..], b"leftover");
    }

    #[test]
    fn test_silent_port_times_out_within_epsilon() {
        let timeout = Duration::from_millis(50);
        let start = Instant::now();
        let err = read_line_with_deadline(&mut SilentReader, timeout, 64).unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, StageError::Timeout(t) if t == timeout));
        assert!(elapsed >= timeout);
        assert!(
            elapsed < timeout + Duration::from_millis(50),
            "read returned too late: {:?}",
            elapsed
        );
    }

    #[test]
    fn test_partial_line_without_terminator_times_out() {
        let mut reader = ScriptedReader::new(b":A");
        let err =
            read_line_with_deadline(&mut reader, Duration::from_millis(20), 64).unwrap_err();
        assert!(matches!(err, StageError::Timeout(_)));
    }

    #[test]
    fn test_eof_is_distinguished_from_timeout() {
        let err = read_line_with_deadline(&mut EofReader, Duration::from_millis(20), 64)
            .unwrap_err();
        assert!(matches!(err, StageError::UnexpectedEof));
    }
}
