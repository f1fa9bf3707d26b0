/*
 * Hardware Discovery Tool
 *
 * This utility scans all available serial ports to identify connected ASI
 * stage controllers by sending a safe status query.
 *
 * ARCHITECTURAL WARNING:
 * Do not run this scan during an active timelapse!
 * 1. Latency: Probing ports blocks the thread and causes jitters.
 * 2. Safety: Sending probe bytes to unrelated devices can be misread as
 * junk commands if baud rates are mismatched.
 * Run this ONCE at startup or via a manual configuration step.
 */

use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Configuration for a hardware probe
struct Probe {
    name: &'static str,
    baud_rate: u32,
    command: &'static [u8],
    expected_response: &'static str,
}

const PROBES: &[Probe] = &[
    // ASI MS-2000 class controllers
    // Protocol: ASCII commands with CR terminator
    // Command: V (firmware version query)
    // Expected: acknowledgment line starting with ":A"
    Probe {
        name: "ASI MS-2000",
        baud_rate: 9600,
        command: b"V\r",
        expected_response: ":A",
    },
    // ASI Tiger controllers
    // Command: BU (build query), replies with the build name
    Probe {
        name: "ASI Tiger",
        baud_rate: 115200,
        command: b"BU\r",
        expected_response: "TIGER",
    },
];

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

fn main() {
    println!("Starting ASI stage discovery scan...");

    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            eprintln!("Failed to enumerate ports: {}", e);
            std::process::exit(1);
        }
    };

    if ports.is_empty() {
        println!("No serial ports detected on this system.");
        return;
    }

    let mut found = 0;
    for port in ports {
        println!("Checking port: {}", port.port_name);

        let mut identified = false;
        for probe in PROBES {
            if try_probe(&port.port_name, probe) {
                println!(
                    "FOUND: {} on {} (baud: {})",
                    probe.name, port.port_name, probe.baud_rate
                );
                identified = true;
                found += 1;
                break;
            }
        }

        if !identified {
            println!("   (unknown device or no response)");
        }
    }

    println!("\nScan complete: {} controller(s) identified.", found);
}

fn try_probe(port_name: &str, probe: &Probe) -> bool {
    // Gentle handshake: open with the controller's framing, clear stale
    // bytes, send the challenge, and look for the expected substring.
    let port = serialport::new(port_name, probe.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open();

    let mut port = match port {
        Ok(port) => port,
        Err(_) => return false, // port busy or unavailable
    };

    if port.clear(serialport::ClearBuffer::All).is_err() {
        return false;
    }

    if port.write_all(probe.command).is_err() {
        return false;
    }

    // Accumulate whatever arrives within the probe window.
    let start = Instant::now();
    let mut response = String::new();
    let mut buf = [0u8; 64];

    while start.elapsed() < PROBE_TIMEOUT {
        match port.read(&mut buf) {
            Ok(n) if n > 0 => {
                response.push_str(&String::from_utf8_lossy(&buf[..n]));
                if response.contains(probe.expected_response) {
                    return true;
                }
            }
            Ok(_) => break,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(_) => break,
        }
    }

    false
}
