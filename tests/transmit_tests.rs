//! Transmit-side scenarios driven through the public API in polled mode.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use gccg_transport::prelude::*;

type Events = Arc<Mutex<Vec<TxCompletion>>>;

fn video_config() -> ConnectionConfig {
    ConnectionConfig::builder()
        .element(MediaElement::video("v0"))
        .build()
        .unwrap()
}

fn polled(transport: Arc<LoopbackTransport>) -> Engine {
    Engine::initialize(EngineConfig::polled(), transport).unwrap()
}

fn transmitter(engine: &Engine, buffer_count: u32) -> (ConnectionHandle, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handle = engine
        .create_transmit_connection(video_config(), 256, buffer_count, move |c: TxCompletion| {
            sink.lock().push(c)
        })
        .unwrap();
    (handle, events)
}

fn filled(engine: &Engine, handle: ConnectionHandle, bytes: &[u8]) -> TxBuffer {
    let mut buffer = engine.request_buffer(handle).unwrap().unwrap();
    buffer.write(bytes).unwrap();
    buffer
}

#[test]
fn test_round_trip_timeout_returns_buffer() {
    let engine = polled(Arc::new(LoopbackTransport::never()));
    let (tx, events) = transmitter(&engine, 4);

    let mut leased: Vec<TxBuffer> = (0..4)
        .map(|_| engine.request_buffer(tx).unwrap().unwrap())
        .collect();
    assert!(engine.request_buffer(tx).unwrap().is_none());

    let mut first = leased.remove(0);
    first.write(b"pgroup").unwrap();
    let seq = engine
        .submit_payload(tx, first, 11, Duration::from_millis(50))
        .unwrap();

    thread::sleep(Duration::from_millis(60));
    assert_eq!(engine.poll_events(tx).unwrap(), 1);

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, Status::TimeoutExpired);
    assert_eq!(events[0].sequence, seq);
    assert_eq!(events[0].user_param, 11);

    assert!(engine.request_buffer(tx).unwrap().is_some());
}

#[test]
fn test_polled_mode_waits_for_poll() {
    let engine = polled(Arc::new(LoopbackTransport::never()));
    let (tx, events) = transmitter(&engine, 2);

    let buffer = filled(&engine, tx, b"x");
    engine
        .submit_payload(tx, buffer, 0, Duration::from_millis(5))
        .unwrap();

    thread::sleep(Duration::from_millis(30));
    assert!(events.lock().is_empty());

    engine.poll_events(tx).unwrap();
    assert_eq!(events.lock().len(), 1);
    assert_eq!(events.lock()[0].status, Status::TimeoutExpired);
}

#[test]
fn test_out_of_order_acks_delivered_in_order() {
    let transport = Arc::new(LoopbackTransport::manual());
    let engine = polled(transport.clone());
    let (tx, events) = transmitter(&engine, 4);

    let seqs: Vec<u64> = (0..3u64)
        .map(|i| {
            let buffer = filled(&engine, tx, &[i as u8; 8]);
            engine
                .submit_payload(tx, buffer, i, Duration::from_secs(5))
                .unwrap()
        })
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    transport.ack(tx, 3).unwrap();
    transport.ack(tx, 2).unwrap();
    engine.poll_events(tx).unwrap();
    assert!(events.lock().is_empty(), "head of line is still in flight");

    transport.ack(tx, 1).unwrap();
    assert_eq!(engine.poll_events(tx).unwrap(), 3);

    let events = events.lock();
    let order: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert!(events.iter().all(|e| e.status == Status::Ok));
}

#[test]
fn test_late_ack_after_timeout_is_ignored() {
    let transport = Arc::new(LoopbackTransport::manual());
    let engine = polled(transport.clone());
    let (tx, events) = transmitter(&engine, 2);

    let buffer = filled(&engine, tx, b"late");
    let seq = engine
        .submit_payload(tx, buffer, 0, Duration::from_millis(5))
        .unwrap();
    thread::sleep(Duration::from_millis(15));
    engine.poll_events(tx).unwrap();

    transport.ack(tx, seq).unwrap();
    engine.poll_events(tx).unwrap();

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, Status::TimeoutExpired);
    assert_eq!(engine.stats(tx).unwrap().stray_signals, 1);
}

#[test]
fn test_destroy_emits_every_in_flight_event() {
    let transport = Arc::new(LoopbackTransport::manual());
    let engine = polled(transport.clone());
    let (tx, events) = transmitter(&engine, 4);

    for i in 0..3u64 {
        let buffer = filled(&engine, tx, b"frame");
        engine
            .submit_payload(tx, buffer, i, Duration::from_millis(20))
            .unwrap();
    }
    transport.ack(tx, 2).unwrap();

    engine.destroy_connection(tx).unwrap();

    let events = events.lock();
    let summary: Vec<(u64, Status)> = events.iter().map(|e| (e.sequence, e.status)).collect();
    assert_eq!(
        summary,
        vec![
            (1, Status::TimeoutExpired),
            (2, Status::Ok),
            (3, Status::TimeoutExpired),
        ]
    );
    assert!(engine.stats(tx).is_err());
    assert_eq!(engine.connection_count(), 0);
}

#[test]
fn test_no_buffer_leak_after_completion() {
    let transport = Arc::new(LoopbackTransport::manual());
    let engine = polled(transport.clone());
    let (tx, _events) = transmitter(&engine, 4);

    for _ in 0..4 {
        let buffer = filled(&engine, tx, b"frame");
        engine
            .submit_payload(tx, buffer, 0, Duration::from_millis(10))
            .unwrap();
    }
    assert!(engine.request_buffer(tx).unwrap().is_none());

    transport.ack(tx, 1).unwrap();
    transport.fail(tx, 2).unwrap();
    thread::sleep(Duration::from_millis(20));
    engine.poll_events(tx).unwrap();

    let stats = engine.stats(tx).unwrap();
    assert_eq!(stats.pool.currently_in_use, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.timed_out, 2);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn test_transport_rejection_completes_with_error() {
    let transport = Arc::new(LoopbackTransport::immediate());
    let engine = polled(transport.clone());
    let (tx, events) = transmitter(&engine, 4);

    let ok = filled(&engine, tx, b"a");
    engine.submit_payload(tx, ok, 1, Duration::from_secs(1)).unwrap();

    transport.set_reject_transmit(true);
    let rejected = filled(&engine, tx, b"b");
    engine
        .submit_payload(tx, rejected, 2, Duration::from_secs(1))
        .unwrap();

    engine.poll_events(tx).unwrap();
    let summary: Vec<(u64, Status)> = events
        .lock()
        .iter()
        .map(|e| (e.user_param, e.status))
        .collect();
    assert_eq!(summary, vec![(1, Status::Ok), (2, Status::Error)]);
}

#[test]
fn test_segment_set_submission() {
    let transport = Arc::new(LoopbackTransport::immediate());
    let engine = polled(transport.clone());
    let (tx, events) = transmitter(&engine, 10);

    let mut set = engine.request_segment_set(tx).unwrap().unwrap();
    assert!(engine.request_segment_set(tx).unwrap().is_none());
    assert_eq!(engine.stats(tx).unwrap().pool.currently_in_use, 8);

    for (i, segment) in set.iter_mut().enumerate() {
        assert_eq!(segment.segment_index(), Some(i as u8));
        segment.write(&[i as u8; 4]).unwrap();
    }
    assert!(set.is_complete());
    engine
        .submit_payload(tx, set, 0, Duration::from_secs(1))
        .unwrap();
    engine.poll_events(tx).unwrap();

    let record = &transport.transmitted(tx)[0];
    assert_eq!(record.segments, (0..8u8).map(Some).collect::<Vec<_>>());
    assert_eq!(record.bytes.len(), 32);
    assert_eq!(&record.bytes[4..8], &[1, 1, 1, 1]);
    assert_eq!(events.lock()[0].status, Status::Ok);
    assert_eq!(engine.stats(tx).unwrap().pool.currently_in_use, 0);
}

#[test]
fn test_partial_segment_set_rejected() {
    let engine = polled(Arc::new(LoopbackTransport::immediate()));
    let (tx, _events) = transmitter(&engine, 8);

    let mut set = engine.request_segment_set(tx).unwrap().unwrap();
    set.segment_mut(0).unwrap().write(b"only one").unwrap();

    let err = engine
        .submit_payload(tx, set, 0, Duration::from_secs(1))
        .unwrap_err();
    assert_eq!(err.status(), Status::InvalidParameter);
    assert_eq!(engine.stats(tx).unwrap().in_flight, 0);

    // Dropping the returned set gives every segment back.
    drop(err);
    assert_eq!(engine.stats(tx).unwrap().pool.currently_in_use, 0);
}

#[test]
fn test_transport_reads_regions_until_resolved() {
    let transport = Arc::new(LoopbackTransport::manual());
    let engine = polled(transport.clone());
    let (tx, events) = transmitter(&engine, 4);

    let acked = engine
        .submit_payload(tx, filled(&engine, tx, b"field one"), 0, Duration::from_secs(5))
        .unwrap();
    let expiring = engine
        .submit_payload(tx, filled(&engine, tx, b"field two"), 0, Duration::from_millis(20))
        .unwrap();

    assert_eq!(transport.read_in_flight(tx, acked).unwrap(), b"field one");
    assert_eq!(transport.read_in_flight(tx, expiring).unwrap(), b"field two");

    transport.ack(tx, acked).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(engine.poll_events(tx).unwrap(), 2);
    assert_eq!(events.lock()[1].status, Status::TimeoutExpired);

    for sequence in [acked, expiring] {
        assert!(matches!(
            transport.read_in_flight(tx, sequence),
            Err(TransportError::NotInFlight(s)) if s == sequence
        ));
    }
}

#[test]
fn test_segments_swapped_between_frames_rejected() {
    let transport = Arc::new(LoopbackTransport::immediate());
    let engine = polled(transport.clone());
    let (tx, _events) = transmitter(&engine, 16);

    let mut a = engine.request_segment_set(tx).unwrap().unwrap();
    let mut b = engine.request_segment_set(tx).unwrap().unwrap();
    std::mem::swap(a.segment_mut(0).unwrap(), b.segment_mut(1).unwrap());
    for segment in a.iter_mut() {
        segment.write(b"slice").unwrap();
    }
    assert!(a.is_complete());

    let err = engine
        .submit_payload(tx, a, 0, Duration::from_secs(1))
        .unwrap_err();
    assert_eq!(err.status(), Status::InvalidParameter);
    assert!(transport.transmitted(tx).is_empty());
    assert_eq!(engine.stats(tx).unwrap().in_flight, 0);

    drop(err);
    drop(b);
    assert_eq!(engine.stats(tx).unwrap().pool.currently_in_use, 0);
}

#[test]
fn test_segment_set_needs_eight_buffers() {
    let engine = polled(Arc::new(LoopbackTransport::immediate()));
    let (tx, _events) = transmitter(&engine, 4);

    let err = engine.request_segment_set(tx).unwrap_err();
    assert_eq!(err.status(), Status::InvalidParameter);
    assert_eq!(engine.stats(tx).unwrap().pool.currently_in_use, 0);
}

#[test]
fn test_origination_timestamp_forwarded() {
    let transport = Arc::new(LoopbackTransport::immediate());
    let engine = polled(transport.clone());
    let (tx, _events) = transmitter(&engine, 2);

    let ts = PtpTimestamp::new(1_700_000_000, 250).unwrap();
    let mut buffer = filled(&engine, tx, b"stamped");
    buffer.set_origination_timestamp(ts).unwrap();
    engine
        .submit_payload_with_json(tx, buffer, r#"{"frame":1}"#, 0, Duration::from_secs(1))
        .unwrap();

    let record = &transport.transmitted(tx)[0];
    assert_eq!(record.origination, vec![ts]);
    assert_eq!(record.payload_json.as_deref(), Some(r#"{"frame":1}"#));
}

#[test]
fn test_sequences_are_per_connection() {
    let engine = polled(Arc::new(LoopbackTransport::immediate()));
    let (a, _) = transmitter(&engine, 2);
    let (b, _) = transmitter(&engine, 2);

    let first_a = engine
        .submit_payload(a, filled(&engine, a, b"a"), 0, Duration::from_secs(1))
        .unwrap();
    let first_b = engine
        .submit_payload(b, filled(&engine, b, b"b"), 0, Duration::from_secs(1))
        .unwrap();
    assert_eq!((first_a, first_b), (1, 1));
    assert_eq!(engine.poll_all().unwrap(), 2);
}

#[test]
fn test_stale_handle_rejected_after_destroy() {
    let engine = polled(Arc::new(LoopbackTransport::immediate()));
    let (old, _) = transmitter(&engine, 1);
    engine.destroy_connection(old).unwrap();
    let (new, _) = transmitter(&engine, 1);

    assert_eq!(old.index(), new.index());
    assert_eq!(
        engine.request_buffer(old).unwrap_err().status(),
        Status::InvalidParameter
    );
    assert!(engine.request_buffer(new).unwrap().is_some());
}
