//! Threaded-mode scenarios: events arrive without any poll call.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use gccg_transport::prelude::*;

const WAIT: Duration = Duration::from_secs(2);

fn config() -> ConnectionConfig {
    ConnectionConfig::builder()
        .element(MediaElement::audio("a0"))
        .build()
        .unwrap()
}

fn threaded(transport: Arc<LoopbackTransport>, workers: i32) -> Engine {
    let config = EngineConfig::builder()
        .max_threads(workers)
        .thread_name("gccg-test")
        .build()
        .unwrap();
    Engine::initialize(config, transport).unwrap()
}

fn transmitter(engine: &Engine, buffer_count: u32) -> (ConnectionHandle, mpsc::Receiver<TxCompletion>) {
    let (events_tx, events_rx) = mpsc::channel();
    let handle = engine
        .create_transmit_connection(config(), 128, buffer_count, move |c: TxCompletion| {
            let _ = events_tx.send(c);
        })
        .unwrap();
    (handle, events_rx)
}

fn submit(engine: &Engine, handle: ConnectionHandle, user_param: u64, timeout: Duration) -> u64 {
    let mut buffer = engine.request_buffer(handle).unwrap().unwrap();
    buffer.write(&[0x5a; 32]).unwrap();
    engine
        .submit_payload(handle, buffer, user_param, timeout)
        .unwrap()
}

#[test]
fn test_completion_without_polling() {
    let engine = threaded(Arc::new(LoopbackTransport::immediate()), 2);
    assert_eq!(engine.threading_mode(), ThreadingMode::Threaded { workers: 2 });
    let (tx, events) = transmitter(&engine, 4);

    let seq = submit(&engine, tx, 42, Duration::from_secs(1));
    let done = events.recv_timeout(WAIT).unwrap();
    assert_eq!(done.sequence, seq);
    assert_eq!(done.status, Status::Ok);
    assert_eq!(done.user_param, 42);

    assert_eq!(engine.poll_events(tx).unwrap(), 0);
    engine.destroy_connection(tx).unwrap();
    engine.shutdown().unwrap();
}

#[test]
fn test_timeout_fires_on_worker() {
    let engine = threaded(Arc::new(LoopbackTransport::never()), 1);
    let (tx, events) = transmitter(&engine, 2);

    let started = Instant::now();
    submit(&engine, tx, 0, Duration::from_millis(30));
    let done = events.recv_timeout(WAIT).unwrap();
    assert_eq!(done.status, Status::TimeoutExpired);
    assert!(started.elapsed() >= Duration::from_millis(30));

    engine.destroy_connection(tx).unwrap();
    engine.shutdown().unwrap();
}

#[test]
fn test_destroy_waits_for_in_flight() {
    let engine = threaded(Arc::new(LoopbackTransport::never()), 2);
    let (tx, events) = transmitter(&engine, 4);

    for i in 0..3 {
        submit(&engine, tx, i, Duration::from_millis(40));
    }
    engine.destroy_connection(tx).unwrap();

    let delivered: Vec<(u64, Status)> = events
        .try_iter()
        .map(|e| (e.sequence, e.status))
        .collect();
    assert_eq!(
        delivered,
        vec![
            (1, Status::TimeoutExpired),
            (2, Status::TimeoutExpired),
            (3, Status::TimeoutExpired),
        ]
    );
    engine.shutdown().unwrap();
}

#[test]
fn test_ordering_under_concurrent_submitters() {
    let transport = Arc::new(LoopbackTransport::manual());
    let engine = threaded(transport.clone(), 4);
    let (tx, events) = transmitter(&engine, 64);

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..8 {
                    submit(&engine, tx, t * 100 + i, Duration::from_secs(5));
                }
            })
        })
        .collect();
    for s in submitters {
        s.join().unwrap();
    }

    // Acknowledge newest first; delivery must still follow sequence order.
    let mut pending = transport.unacked(tx);
    pending.sort_unstable_by(|a, b| b.cmp(a));
    for seq in pending {
        transport.ack(tx, seq).unwrap();
    }

    let sequences: Vec<u64> = (0..32)
        .map(|_| events.recv_timeout(WAIT).unwrap().sequence)
        .collect();
    assert_eq!(sequences, (1..=32).collect::<Vec<_>>());

    engine.destroy_connection(tx).unwrap();
    engine.shutdown().unwrap();
}

#[test]
fn test_callback_may_resubmit() {
    let engine = threaded(Arc::new(LoopbackTransport::immediate()), 2);
    let (done_tx, done_rx) = mpsc::channel();
    let slot = Arc::new(parking_lot::Mutex::new(None::<ConnectionHandle>));

    let owner = engine.clone();
    let handle_slot = slot.clone();
    let tx = engine
        .create_transmit_connection(config(), 64, 1, move |c: TxCompletion| {
            let _ = done_tx.send(c.sequence);
            let Some(handle) = *handle_slot.lock() else {
                return;
            };
            if c.sequence < 3 {
                // The only buffer is free again by the time the callback runs.
                let mut buffer = owner.request_buffer(handle).unwrap().unwrap();
                buffer.write(b"again").unwrap();
                owner
                    .submit_payload(handle, buffer, 0, Duration::from_secs(1))
                    .unwrap();
            }
        })
        .unwrap();
    *slot.lock() = Some(tx);

    submit(&engine, tx, 0, Duration::from_secs(1));
    let sequences: Vec<u64> = (0..3).map(|_| done_rx.recv_timeout(WAIT).unwrap()).collect();
    assert_eq!(sequences, vec![1, 2, 3]);

    engine.destroy_connection(tx).unwrap();
    engine.shutdown().unwrap();
}

#[test]
fn test_slow_callback_stalls_only_its_connection() {
    let engine = threaded(Arc::new(LoopbackTransport::immediate()), 2);
    let (started_tx, started_rx) = mpsc::channel();
    let slow = engine
        .create_transmit_connection(config(), 64, 2, move |_: TxCompletion| {
            let _ = started_tx.send(());
            std::thread::sleep(Duration::from_millis(600));
        })
        .unwrap();
    let (fast, events) = transmitter(&engine, 2);

    let blocked_at = Instant::now();
    submit(&engine, slow, 0, Duration::from_secs(5));
    started_rx.recv_timeout(WAIT).unwrap();

    for round in 0..5 {
        let submitted = Instant::now();
        let seq = submit(&engine, fast, round, Duration::from_secs(5));
        let done = events.recv_timeout(WAIT).unwrap();
        assert_eq!(done.sequence, seq);
        assert!(submitted.elapsed() < Duration::from_millis(200));
    }
    // Every round finished while the slow callback was still sleeping.
    assert!(blocked_at.elapsed() < Duration::from_millis(600));

    engine.destroy_connection(fast).unwrap();
    engine.destroy_connection(slow).unwrap();
    engine.shutdown().unwrap();
}

#[test]
fn test_destroy_waits_for_running_callback() {
    let engine = threaded(Arc::new(LoopbackTransport::immediate()), 2);
    let (started_tx, started_rx) = mpsc::channel();
    let finished = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = finished.clone();
    let tx = engine
        .create_transmit_connection(config(), 64, 2, move |_: TxCompletion| {
            let _ = started_tx.send(());
            std::thread::sleep(Duration::from_millis(100));
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();

    submit(&engine, tx, 0, Duration::from_secs(1));
    started_rx.recv_timeout(WAIT).unwrap();
    engine.destroy_connection(tx).unwrap();
    assert_eq!(finished.load(std::sync::atomic::Ordering::SeqCst), 1);

    engine.shutdown().unwrap();
}
