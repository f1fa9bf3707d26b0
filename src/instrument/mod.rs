//! Stage controller, transport seam, and mock implementations.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod asi_stage;
pub mod mock;
pub mod transport;

pub use asi_stage::{exec_blocking, AsiStage, SharedStage};
pub use transport::StageTransport;

/// Stage scan pattern selector.
///
/// The controller encodes the pattern as an integer in the `SCAN f=` command:
/// 0 for raster, 1 for serpentine. No other value is ever put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Raster,
    Serpentine,
}

impl ScanMode {
    /// Integer code transmitted in the `SCAN f=<code>` frame.
    pub fn wire_code(self) -> u8 {
        match self {
            ScanMode::Raster => 0,
            ScanMode::Serpentine => 1,
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Raster => write!(f, "raster"),
            ScanMode::Serpentine => write!(f, "serpentine"),
        }
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raster" => Ok(ScanMode::Raster),
            "serpentine" => Ok(ScanMode::Serpentine),
            other => Err(format!("unknown scan mode '{}'", other)),
        }
    }
}

/// Classification of a response line against the controller's acknowledgment
/// grammar.
///
/// The command methods on [`AsiStage`] deliberately do not parse responses;
/// they hand the raw line back to the caller. Callers that want structured
/// acknowledgment handling (the CLI and the timelapse worker do) can classify
/// the line after the fact. `:A` marks success, `:N-<code>` carries a numeric
/// error code, and anything else is passed through as [`Ack::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Positive acknowledgment (`:A`, optionally followed by data).
    Ok,
    /// Negative acknowledgment with the controller's error code.
    Error(i32),
    /// A line outside the acknowledgment grammar.
    Other,
}

impl Ack {
    /// Classifies a single response line.
    pub fn classify(line: &str) -> Ack {
        let line = line.trim();
        if line.starts_with(":A") {
            return Ack::Ok;
        }
        if let Some(rest) = line.strip_prefix(":N-") {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(code) = digits.parse::<i32>() {
                return Ack::Error(code);
            }
        }
        Ack::Other
    }

    /// Strict variant of [`Ack::classify`]: anything but `:A` is an error.
    ///
    /// This is the documented hardening over the permissive pass-through the
    /// command methods implement; nothing in the driver calls it on the
    /// caller's behalf.
    pub fn expect_ok(line: &str) -> Result<(), crate::error::StageError> {
        match Ack::classify(line) {
            Ack::Ok => Ok(()),
            Ack::Error(code) => Err(crate::error::StageError::Protocol(format!(
                "controller rejected command with code {}",
                code
            ))),
            Ack::Other => Err(crate::error::StageError::Protocol(format!(
                "unrecognized acknowledgment '{}'",
                line.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_are_exactly_zero_and_one() {
        assert_eq!(ScanMode::Raster.wire_code(), 0);
        assert_eq!(ScanMode::Serpentine.wire_code(), 1);
    }

    #[test]
    fn test_scan_mode_from_str() {
        assert_eq!("raster".parse::<ScanMode>().unwrap(), ScanMode::Raster);
        assert_eq!(
            "Serpentine".parse::<ScanMode>().unwrap(),
            ScanMode::Serpentine
        );
        assert!("spiral".parse::<ScanMode>().is_err());
    }

    #[test]
    fn test_ack_positive() {
        assert_eq!(Ack::classify(":A"), Ack::Ok);
        assert_eq!(Ack::classify(":A 0.0"), Ack::Ok);
        assert_eq!(Ack::classify("  :A \r\n"), Ack::Ok);
    }

    #[test]
    fn test_ack_negative_carries_code() {
        assert_eq!(Ack::classify(":N-4"), Ack::Error(4));
        assert_eq!(Ack::classify(":N-21"), Ack::Error(21));
    }

    #[test]
    fn test_ack_other_lines_pass_through() {
        assert_eq!(Ack::classify("Version 9.2"), Ack::Other);
        assert_eq!(Ack::classify(""), Ack::Other);
        assert_eq!(Ack::classify(":N-"), Ack::Other);
    }

    #[test]
    fn test_expect_ok_rejects_nack() {
        assert!(Ack::expect_ok(":A").is_ok());
        assert!(Ack::expect_ok(":N-4").is_err());
        assert!(Ack::expect_ok("garbage").is_err());
    }
}
