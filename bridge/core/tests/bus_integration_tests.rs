//! Integration tests for the command bus
//!
//! These tests drive the bus the way the daemon does: an interpreter on a
//! plain OS thread blocks in read-line waits while async pollers and posters
//! talk to the bus from the runtime.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use bridge_core::{BusConfig, CommandBus, InboundCommand, OutboundCommand};

const LIMIT: Duration = Duration::from_secs(5);

/// Blocking read-line, as an interpreter thread performs it
fn blocking_read_line(bus: &CommandBus, prompt: &str) -> Option<String> {
    let (tx, rx) = oneshot::channel();
    bus.register_one_shot_consumer(move |cmd, scope| {
        scope.revoke();
        let _ = tx.send(cmd.text_line);
    });
    bus.enqueue_outbound(OutboundCommand::read_line(false, Some(prompt.to_string())))
        .ok()?;
    rx.blocking_recv().ok()
}

async fn next_outbound(bus: &CommandBus) -> OutboundCommand {
    bus.wait_for_outbound(LIMIT)
        .await
        .expect("expected an outbound command")
}

// =============================================================================
// Test 1: Nested read-line waits are answered innermost first
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_nested_read_line_innermost_first() {
    let bus = CommandBus::start(BusConfig::default());

    let outer = {
        let bus = bus.clone();
        tokio::task::spawn_blocking(move || blocking_read_line(&bus, "outer: "))
    };
    assert_eq!(
        next_outbound(&bus).await,
        OutboundCommand::read_line(false, Some("outer: ".into()))
    );

    let inner = {
        let bus = bus.clone();
        tokio::task::spawn_blocking(move || blocking_read_line(&bus, "inner: "))
    };
    assert_eq!(
        next_outbound(&bus).await,
        OutboundCommand::read_line(false, Some("inner: ".into()))
    );
    assert_eq!(bus.pending_consumers(), 2);

    bus.enqueue_inbound(InboundCommand::new("first answer", 80))
        .unwrap();
    let inner_value = tokio::time::timeout(LIMIT, inner).await.unwrap().unwrap();
    assert_eq!(inner_value.as_deref(), Some("first answer"));

    bus.enqueue_inbound(InboundCommand::new("second answer", 80))
        .unwrap();
    let outer_value = tokio::time::timeout(LIMIT, outer).await.unwrap().unwrap();
    assert_eq!(outer_value.as_deref(), Some("second answer"));
}

// =============================================================================
// Test 2: Newest of N consumers always wins
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_newest_of_n_consumers_receives_command() {
    for n in 1..=8usize {
        let bus = CommandBus::start(BusConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        for index in 0..n {
            let tx = tx.clone();
            bus.register_one_shot_consumer(move |cmd, _| {
                tx.send((index, cmd.text_line)).unwrap();
            });
        }

        bus.enqueue_inbound(InboundCommand::new(format!("cmd-{n}"), 80))
            .unwrap();
        let (index, text) = tokio::time::timeout(LIMIT, rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(index, n - 1, "with {n} consumers");
        assert_eq!(text, format!("cmd-{n}"));
        assert_eq!(bus.pending_consumers(), n - 1);
        bus.shutdown();
    }
}

// =============================================================================
// Test 3: A blocked consumer does not stall intake
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_blocked_consumer_does_not_stall_intake() {
    let bus = CommandBus::start(BusConfig::default());
    let release = Arc::new(Barrier::new(2));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tx_slow = tx.clone();
    let release_slow = Arc::clone(&release);
    bus.register_one_shot_consumer(move |cmd, _| {
        tx_slow.send(format!("slow started: {}", cmd.text_line)).unwrap();
        release_slow.wait();
        tx_slow.send("slow finished".to_string()).unwrap();
    });

    bus.enqueue_inbound(InboundCommand::new("one", 80)).unwrap();
    assert_eq!(
        tokio::time::timeout(LIMIT, rx.recv()).await.unwrap().unwrap(),
        "slow started: one"
    );

    // The slow consumer is still blocked; a new wait must still be served
    let tx_fast = tx.clone();
    bus.register_one_shot_consumer(move |cmd, _| {
        tx_fast.send(format!("fast: {}", cmd.text_line)).unwrap();
    });
    bus.enqueue_inbound(InboundCommand::new("two", 80)).unwrap();
    assert_eq!(
        tokio::time::timeout(LIMIT, rx.recv()).await.unwrap().unwrap(),
        "fast: two"
    );

    let release_main = Arc::clone(&release);
    tokio::task::spawn_blocking(move || release_main.wait())
        .await
        .unwrap();
    assert_eq!(
        tokio::time::timeout(LIMIT, rx.recv()).await.unwrap().unwrap(),
        "slow finished"
    );
}

// =============================================================================
// Test 4: Revocation racing with dispatch never double-invokes
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_revoke_racing_dispatch_is_at_most_once() {
    const CONSUMERS: usize = 200;

    let bus = CommandBus::start(BusConfig::default());
    let invocations: Arc<Vec<AtomicUsize>> =
        Arc::new((0..CONSUMERS).map(|_| AtomicUsize::new(0)).collect());
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let mut handles = Vec::with_capacity(CONSUMERS);
    for index in 0..CONSUMERS {
        let invocations = Arc::clone(&invocations);
        let done_tx = done_tx.clone();
        handles.push(bus.register_one_shot_consumer(move |_, _| {
            invocations[index].fetch_add(1, Ordering::SeqCst);
            done_tx.send(index).unwrap();
        }));
    }
    drop(done_tx);

    // Revoke every other consumer from a separate thread while commands flow
    let revoker = {
        let handles = handles.clone();
        std::thread::spawn(move || {
            handles
                .iter()
                .step_by(2)
                .filter(|handle| handle.revoke())
                .count()
        })
    };
    for i in 0..CONSUMERS {
        bus.enqueue_inbound(InboundCommand::new(format!("cmd-{i}"), 80))
            .unwrap();
    }
    let revoked = revoker.join().unwrap();

    // Everything not revoked gets fired: either by one of the commands above,
    // or it is still pending. Drain what remains.
    let remaining = bus.pending_consumers();
    for i in 0..remaining {
        bus.enqueue_inbound(InboundCommand::new(format!("drain-{i}"), 80))
            .unwrap();
    }

    let mut fired = HashSet::new();
    while fired.len() < CONSUMERS - revoked {
        let index = tokio::time::timeout(LIMIT, done_rx.recv())
            .await
            .expect("consumer did not fire")
            .expect("all consumers dropped early");
        assert!(fired.insert(index), "consumer {index} fired twice");
    }

    for (index, count) in invocations.iter().enumerate() {
        assert!(count.load(Ordering::SeqCst) <= 1, "consumer {index}");
    }
    for handle in &handles {
        assert!(!handle.is_pending());
    }
}

// =============================================================================
// Test 5: Concurrent pollers never duplicate or lose a command
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_pollers_each_command_once() {
    const COMMANDS: usize = 100;

    let bus = CommandBus::start(BusConfig::default());
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let mut pollers = Vec::new();
    for _ in 0..4 {
        let bus = bus.clone();
        let seen_tx = seen_tx.clone();
        pollers.push(tokio::spawn(async move {
            while let Some(cmd) = bus.wait_for_outbound(Duration::from_millis(300)).await {
                seen_tx.send(cmd).unwrap();
            }
        }));
    }
    drop(seen_tx);

    for i in 0..COMMANDS {
        bus.enqueue_outbound(OutboundCommand::print(i.to_string()))
            .unwrap();
    }

    let mut seen = HashSet::new();
    while let Some(cmd) = tokio::time::timeout(LIMIT, seen_rx.recv()).await.unwrap() {
        let text = cmd.as_print().unwrap().to_string();
        assert!(seen.insert(text.clone()), "{text} delivered twice");
    }
    for poller in pollers {
        poller.await.unwrap();
    }

    assert_eq!(seen.len(), COMMANDS);
    assert_eq!(bus.stats().outbound_delivered, COMMANDS as u64);
}

// =============================================================================
// Test 6: Shutdown releases a blocked interpreter
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_releases_blocked_read_line() {
    let bus = CommandBus::start(BusConfig::default());

    let reader = {
        let bus = bus.clone();
        tokio::task::spawn_blocking(move || blocking_read_line(&bus, "> "))
    };
    next_outbound(&bus).await;

    bus.shutdown();
    let value = tokio::time::timeout(LIMIT, reader).await.unwrap().unwrap();
    assert_eq!(value, None);
    assert!(bus
        .enqueue_inbound(InboundCommand::new("late", 80))
        .is_err());
}
