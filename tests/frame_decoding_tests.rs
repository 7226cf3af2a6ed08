// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for continuous frame decoding

use barcode_bridge::engine::scripted::{ScriptOutcome, ScriptStep, ScriptedEngine};
use barcode_bridge::engine::status;
use barcode_bridge::{
    BarcodeReader, DecodeEngine, FrameAdmission, FrameCallbacks, FrameDecodingParameters,
    FrameDecodingState, FrameEvent, FrameId, PixelFormat, ReaderError,
};
use futures::StreamExt;
use futures::channel::mpsc as async_mpsc;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const WIDTH: u32 = 8;
const HEIGHT: u32 = 8;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn reader_with(engine: &Arc<ScriptedEngine>) -> Arc<BarcodeReader> {
    Arc::new(BarcodeReader::new(
        Arc::clone(engine) as Arc<dyn DecodeEngine>
    ))
}

fn echo_engine() -> Arc<ScriptedEngine> {
    Arc::new(ScriptedEngine::with_fallback(ScriptStep::new(
        ScriptOutcome::Echo,
    )))
}

fn params() -> FrameDecodingParameters {
    FrameDecodingParameters::new(WIDTH, HEIGHT, WIDTH, PixelFormat::Grayscale)
}

/// A grayscale frame whose first byte is `marker`
fn frame(marker: u8) -> Vec<u8> {
    let mut pixels = vec![0u8; (WIDTH * HEIGHT) as usize];
    pixels[0] = marker;
    pixels
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Listener that forwards `(frame id, first result text)` to a channel
fn text_listener() -> (FrameCallbacks, mpsc::Receiver<(FrameId, String)>) {
    let (tx, rx) = mpsc::channel();
    let callbacks = FrameCallbacks::new(move |frame| {
        let text = frame
            .results
            .first()
            .map(|r| r.text.clone())
            .unwrap_or_default();
        let _ = tx.send((frame.frame_id, text));
    });
    (callbacks, rx)
}

#[test]
fn test_results_delivered_in_frame_order() {
    let engine = echo_engine();
    // Later frames decode faster than earlier ones
    for delay in [60, 5, 30] {
        engine.push(ScriptStep::new(ScriptOutcome::Echo).with_delay(Duration::from_millis(delay)));
    }
    let reader = reader_with(&engine);
    let (listener, rx) = text_listener();
    reader.start_frame_decoding(params(), listener).unwrap();

    for marker in 1..=3 {
        assert!(reader.append_frame(&frame(marker)).unwrap().is_queued());
    }

    let received: Vec<(FrameId, String)> = (0..3)
        .map(|_| rx.recv_timeout(RECV_TIMEOUT).unwrap())
        .collect();
    assert_eq!(
        received,
        vec![
            (1, "1".to_string()),
            (2, "2".to_string()),
            (3, "3".to_string())
        ]
    );

    reader.stop_frame_decoding().unwrap();
    assert_eq!(engine.outstanding(), 0);
}

#[test]
fn test_start_twice_fails_and_restart_succeeds() {
    let engine = echo_engine();
    let reader = reader_with(&engine);

    reader
        .start_frame_decoding(params(), FrameCallbacks::new(|_| {}))
        .unwrap();
    let err = reader
        .start_frame_decoding(params(), FrameCallbacks::new(|_| {}))
        .unwrap_err();
    assert_eq!(err, ReaderError::AlreadyRunning);
    assert_eq!(reader.frame_decoding_state(), FrameDecodingState::Decoding);

    reader.stop_frame_decoding().unwrap();
    assert_eq!(reader.frame_decoding_state(), FrameDecodingState::Idle);

    let (listener, rx) = text_listener();
    reader.start_frame_decoding(params(), listener).unwrap();
    let admission = reader.append_frame(&frame(9)).unwrap();
    assert_eq!(admission, FrameAdmission::Queued { frame_id: 1 });
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), (1, "9".to_string()));

    reader.stop_frame_decoding().unwrap();
    // Stopping twice is harmless
    reader.stop_frame_decoding().unwrap();
}

#[test]
fn test_repeated_errors_keep_pipeline_running() {
    let engine = echo_engine();
    for _ in 0..3 {
        engine.push_failure(status::IMAGE_READ_FAILED);
    }
    let reader = reader_with(&engine);
    let (tx, rx) = mpsc::channel();
    let listener = FrameCallbacks::new(|_| {}).with_error_handler(move |frame_id, error| {
        let _ = tx.send((frame_id, error.code()));
    });
    reader.start_frame_decoding(params(), listener).unwrap();

    for marker in 1..=3 {
        reader.append_frame(&frame(marker)).unwrap();
        let (frame_id, code) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(frame_id, marker as FrameId);
        assert_eq!(code, status::IMAGE_READ_FAILED);
    }
    assert_eq!(reader.frame_decoding_state(), FrameDecodingState::Decoding);
    assert_eq!(reader.frame_statistics().failed, 3);

    // The next frame decodes normally
    let history_before = reader.recent_results().len();
    reader.append_frame(&frame(4)).unwrap();
    assert!(wait_until(RECV_TIMEOUT, || reader.recent_results().len()
        > history_before));
    assert_eq!(reader.recent_results()[0].frame_id, 4);

    reader.stop_frame_decoding().unwrap();
}

#[test]
fn test_full_queue_drops_newest_without_blocking() {
    let engine = echo_engine();
    engine.push(ScriptStep::new(ScriptOutcome::Echo).with_delay(Duration::from_millis(400)));
    let reader = reader_with(&engine);
    let params = FrameDecodingParameters {
        max_queue_length: 2,
        ..params()
    };
    reader
        .start_frame_decoding(params, FrameCallbacks::new(|_| {}))
        .unwrap();

    reader.append_frame(&frame(1)).unwrap();
    // Frame 1 is now being decoded slowly
    assert!(wait_until(RECV_TIMEOUT, || engine.call_count() == 1));

    let start = Instant::now();
    let admissions: Vec<FrameAdmission> = (2..=4)
        .map(|marker| reader.append_frame(&frame(marker)).unwrap())
        .collect();
    assert!(start.elapsed() < Duration::from_millis(200));

    assert_eq!(
        admissions,
        vec![
            FrameAdmission::Queued { frame_id: 2 },
            FrameAdmission::Queued { frame_id: 3 },
            FrameAdmission::Dropped { frame_id: 4 },
        ]
    );
    assert_eq!(reader.frame_queue_length(), 2);

    reader.stop_frame_decoding().unwrap();
    let stats = reader.frame_statistics();
    assert_eq!(stats.appended, 4);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.discarded, 2);
    assert_eq!(stats.decoded, 1);
    assert_eq!(reader.frame_queue_length(), 0);
}

#[test]
fn test_append_when_not_running() {
    let engine = echo_engine();
    let reader = reader_with(&engine);

    assert_eq!(
        reader.append_frame(&frame(1)).unwrap_err(),
        ReaderError::NotRunning
    );

    reader
        .start_frame_decoding(params(), FrameCallbacks::new(|_| {}))
        .unwrap();
    reader.stop_frame_decoding().unwrap();
    assert_eq!(
        reader.append_frame(&frame(1)).unwrap_err(),
        ReaderError::NotRunning
    );
    assert_eq!(engine.call_count(), 0);
}

#[test]
fn test_short_frame_rejected() {
    let engine = echo_engine();
    let reader = reader_with(&engine);
    reader
        .start_frame_decoding(params(), FrameCallbacks::new(|_| {}))
        .unwrap();

    let err = reader.append_frame(&[0u8; 10]).unwrap_err();
    assert_eq!(err.code(), status::BUFFER_INVALID);
    assert_eq!(reader.frame_statistics().appended, 0);

    reader.stop_frame_decoding().unwrap();
}

#[test]
fn test_invalid_parameters_rejected() {
    let engine = echo_engine();
    let reader = reader_with(&engine);
    let params = FrameDecodingParameters::new(WIDTH, HEIGHT, WIDTH - 1, PixelFormat::Grayscale);

    let err = reader
        .start_frame_decoding(params, FrameCallbacks::new(|_| {}))
        .unwrap_err();
    assert!(matches!(err, ReaderError::Configuration(_)));
    assert_eq!(reader.frame_decoding_state(), FrameDecodingState::Idle);
}

#[test]
fn test_stop_timeout_faults_pipeline() {
    let engine = echo_engine();
    engine.push(ScriptStep::new(ScriptOutcome::Echo).with_delay(Duration::from_millis(500)));
    let reader = reader_with(&engine);
    let grace = Duration::from_millis(50);
    let params = FrameDecodingParameters {
        stop_grace_period: grace,
        ..params()
    };
    reader
        .start_frame_decoding(params.clone(), FrameCallbacks::new(|_| {}))
        .unwrap();

    reader.append_frame(&frame(1)).unwrap();
    assert!(wait_until(RECV_TIMEOUT, || engine.call_count() == 1));

    let err = reader.stop_frame_decoding().unwrap_err();
    assert_eq!(err, ReaderError::StopFailed { grace });
    assert!(err.is_fatal());
    assert_eq!(reader.frame_decoding_state(), FrameDecodingState::Faulted);

    assert!(matches!(
        reader.start_frame_decoding(params, FrameCallbacks::new(|_| {})),
        Err(ReaderError::StopFailed { .. })
    ));
    assert_eq!(
        reader.append_frame(&frame(2)).unwrap_err(),
        ReaderError::NotRunning
    );

    // The detached thread still releases what it decoded
    assert!(wait_until(RECV_TIMEOUT, || engine.outstanding() == 0
        && engine.allocations() == 1));
}

#[test]
fn test_stop_from_listener_fails() {
    let engine = echo_engine();
    let reader = reader_with(&engine);
    let (tx, rx) = mpsc::channel();

    let inner = Arc::clone(&reader);
    let listener = FrameCallbacks::new(move |_| {
        let _ = tx.send(inner.stop_frame_decoding());
    });
    reader.start_frame_decoding(params(), listener).unwrap();
    reader.append_frame(&frame(1)).unwrap();

    let outcome = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert!(matches!(outcome, Err(ReaderError::StopFailed { .. })));
    assert_eq!(reader.frame_decoding_state(), FrameDecodingState::Faulted);
}

#[test]
fn test_history_is_bounded() {
    let engine = echo_engine();
    let reader = reader_with(&engine);
    let params = FrameDecodingParameters {
        max_result_queue_length: 2,
        ..params()
    };
    let (listener, rx) = text_listener();
    reader.start_frame_decoding(params, listener).unwrap();

    for marker in 1..=4 {
        reader.append_frame(&frame(marker)).unwrap();
        rx.recv_timeout(RECV_TIMEOUT).unwrap();
    }
    reader.stop_frame_decoding().unwrap();

    // Kept after stop, oldest first
    let history = reader.recent_results();
    let ids: Vec<FrameId> = history.iter().map(|r| r.frame_id).collect();
    assert_eq!(ids, vec![3, 4]);
    assert_eq!(history[1].results[0].text, "4");
}

#[test]
fn test_settings_fixed_for_the_run() {
    let engine = echo_engine();
    let reader = reader_with(&engine);
    reader
        .modify_runtime_settings(|s| s.min_barcode_text_length = 2)
        .unwrap();
    let (listener, rx) = text_listener();
    reader.start_frame_decoding(params(), listener).unwrap();

    reader
        .modify_runtime_settings(|s| s.min_barcode_text_length = 5)
        .unwrap();
    reader.append_frame(&frame(1)).unwrap();
    rx.recv_timeout(RECV_TIMEOUT).unwrap();
    reader.stop_frame_decoding().unwrap();

    assert_eq!(engine.calls()[0].settings.min_barcode_text_length, 2);
    assert_eq!(
        engine.calls()[0].thread.as_deref(),
        Some(barcode_bridge::constants::frame_decoding::THREAD_NAME)
    );
}

#[test]
fn test_channel_listener() {
    let engine = echo_engine();
    engine.push_failure(status::IMAGE_READ_FAILED);
    let reader = reader_with(&engine);
    let (sender, mut receiver) = async_mpsc::unbounded::<FrameEvent>();
    reader.start_frame_decoding(params(), sender).unwrap();

    reader.append_frame(&frame(1)).unwrap();
    reader.append_frame(&frame(2)).unwrap();

    let events: Vec<FrameEvent> =
        futures::executor::block_on(receiver.by_ref().take(2).collect());
    assert!(matches!(
        events[0],
        FrameEvent::Error { frame_id: 1, .. }
    ));
    match &events[1] {
        FrameEvent::Results(frame) => {
            assert_eq!(frame.frame_id, 2);
            assert_eq!(frame.results[0].text, "2");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    reader.stop_frame_decoding().unwrap();
}

#[test]
fn test_drop_while_decoding_releases_everything() {
    let engine = echo_engine();
    let results = Arc::new(Mutex::new(0usize));
    {
        let reader = reader_with(&engine);
        let counter = Arc::clone(&results);
        reader
            .start_frame_decoding(
                params(),
                FrameCallbacks::new(move |_| *counter.lock().unwrap() += 1),
            )
            .unwrap();
        for marker in 1..=3 {
            reader.append_frame(&frame(marker)).unwrap();
        }
    }

    assert_eq!(engine.outstanding(), 0);
    assert!(*results.lock().unwrap() <= 3);
}

#[test]
fn test_frame_results_report_decode_time() {
    let engine = echo_engine();
    engine.push(ScriptStep::new(ScriptOutcome::Echo).with_delay(Duration::from_millis(40)));
    let reader = reader_with(&engine);
    let (tx, rx) = mpsc::channel();
    reader
        .start_frame_decoding(
            params(),
            FrameCallbacks::new(move |result| {
                let _ = tx.send(result);
            }),
        )
        .unwrap();

    reader.append_frame(&frame(1)).unwrap();
    let delivered = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    reader.stop_frame_decoding().unwrap();

    assert!(delivered.elapsed >= Duration::from_millis(40));
    // History keeps the same record the listener saw
    assert_eq!(reader.recent_results(), vec![delivered]);
}
