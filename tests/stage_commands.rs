//! End-to-end driver behavior over the mock transport, plus the real serial
//! open path against a nonexistent port.

use asi_stage::config::{StageSettings, TimelapseSettings};
use asi_stage::instrument::mock::MockTransport;
use asi_stage::instrument::{Ack, AsiStage, ScanMode};
use asi_stage::worker::TimelapseWorker;
use asi_stage::StageError;

#[test]
fn serpentine_scan_mode_round_trip() {
    // The scenario from the protocol notes: select the serpentine pattern,
    // observe the exact frame, and surface the device's acknowledgment.
    let transport = MockTransport::with_responses([":A"]);
    let state = transport.state();
    let mut stage = AsiStage::with_transport(Box::new(transport));

    let response = stage.set_scan_mode(ScanMode::Serpentine).unwrap();

    assert_eq!(state.frames(), vec![b"SCAN f=1\r".to_vec()]);
    assert_eq!(response, ":A");
    assert_eq!(Ack::classify(&response), Ack::Ok);
}

#[test]
fn full_command_session_frames() {
    let transport = MockTransport::always_ack();
    let state = transport.state();
    let mut stage = AsiStage::with_transport(Box::new(transport));

    stage.set_default_speed().unwrap();
    stage.set_backlash().unwrap();
    stage.set_scan_mode(ScanMode::Raster).unwrap();
    stage.zero().unwrap();
    stage.set_speed(0.75).unwrap();
    stage.scan_r(10.0, 0.0).unwrap();
    stage.scan_v(0.0, 5.5, 2.0).unwrap();
    stage.start_scan().unwrap();

    assert_eq!(
        state.frames_as_strings(),
        vec![
            "SPEED x=10 y=10\r",
            "BACKLASH x=0.04 y=0.0\r",
            "SCAN f=0\r",
            "ZERO\r",
            "SPEED x=0.75\r",
            "SCANR x=10 y=0\r",
            "SCANV x=0 y=5.5 f=2\r",
            "SCAN\r",
        ]
    );
}

#[test]
fn transport_closed_exactly_once_after_failed_command() {
    let transport = MockTransport::with_responses([":A", ":A", ":A"]);
    let state = transport.state();
    let mut stage = AsiStage::with_transport(Box::new(transport));

    stage.zero().unwrap();
    stage.start_scan().unwrap();
    stage.set_speed(1.0).unwrap();
    // fourth command has no scripted response and times out
    assert!(matches!(
        stage.start_scan().unwrap_err(),
        StageError::Timeout(_)
    ));

    assert_eq!(state.close_count(), 0);
    drop(stage);
    assert_eq!(state.close_count(), 1);
}

#[test]
fn write_failure_propagates_and_leaves_driver_usable() {
    let transport = MockTransport::always_ack();
    let state = transport.state();
    let mut stage = AsiStage::with_transport(Box::new(transport));

    state.fail_next_write();
    assert!(matches!(stage.zero().unwrap_err(), StageError::Io(_)));

    // no retry happened on the driver's behalf
    assert!(state.frames().is_empty());

    // the next call goes through untouched
    stage.zero().unwrap();
    assert_eq!(state.frames_as_strings(), vec!["ZERO\r"]);
}

#[cfg(feature = "instrument_serial")]
#[test]
fn opening_a_missing_port_is_a_connection_error() {
    let settings = StageSettings {
        port: "/dev/asi-stage-test-no-such-port".to_string(),
        ..StageSettings::default()
    };

    let err = AsiStage::open(&settings).unwrap_err();
    match err {
        StageError::Connection { port, .. } => {
            assert_eq!(port, "/dev/asi-stage-test-no-such-port");
        }
        other => panic!("expected connection error, got {:?}", other),
    }
}

#[tokio::test]
async fn timelapse_over_mock_transport() {
    let transport = MockTransport::always_ack();
    let state = transport.state();
    let stage = AsiStage::with_transport(Box::new(transport)).into_shared();

    let mut worker = TimelapseWorker::new(stage);
    worker.start(TimelapseSettings {
        nb_timepoints: 4,
        interval_ms: 1,
        scan_speed: 0.5,
        scan_mode: ScanMode::Serpentine,
    })
    .unwrap();

    let completed = worker.join().await.unwrap();
    assert_eq!(completed, 4);

    let frames = state.frames_as_strings();
    // preparation first, then one trigger per timepoint
    assert_eq!(
        &frames[..5],
        [
            "SPEED x=10 y=10\r",
            "BACKLASH x=0.04 y=0.0\r",
            "SCAN f=1\r",
            "ZERO\r",
            "SPEED x=0.5\r",
        ]
    );
    assert_eq!(frames[5..].len(), 4);
    assert!(frames[5..].iter().all(|f| f == "SCAN\r"));
}
