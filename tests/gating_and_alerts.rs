//! Back-pressure, gating registry membership, cancellation, and
//! configuration rejection.

use slipstream::exchange::{
    BlockingWaitStrategy, ClosureEventHandler, DefaultEventFactory, ExchangeError, RingBuffer,
    Sequence, SleepingWaitStrategy,
};
use slipstream::BatchEventProcessor;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ValueEvent {
    value: i64,
}

#[test]
fn slow_consumer_back_pressures_try_next() {
    const EVENTS: i64 = 20;

    let ring = Arc::new(
        RingBuffer::create_single_producer(
            DefaultEventFactory::<ValueEvent>::new(),
            4,
            Arc::new(BlockingWaitStrategy::new()),
        )
        .unwrap(),
    );

    let consumer_sequence = Arc::new(Sequence::default());
    ring.add_gating_sequences(&[Arc::clone(&consumer_sequence)]);
    let barrier = ring.new_barrier(&[]);

    let consumer = {
        let ring = Arc::clone(&ring);
        let consumer_sequence = Arc::clone(&consumer_sequence);
        thread::spawn(move || {
            let mut next_sequence = 0i64;
            let mut sum = 0i64;
            while next_sequence < EVENTS {
                let available = barrier.wait_for(next_sequence).unwrap();
                while next_sequence <= available {
                    sum += ring.get(next_sequence).value;
                    // Deliberately slow: one millisecond per event.
                    thread::sleep(Duration::from_millis(1));
                    consumer_sequence.set(next_sequence);
                    next_sequence += 1;
                }
            }
            sum
        })
    };

    let mut refusals = 0u32;
    for value in 0..EVENTS {
        loop {
            match ring.try_next() {
                Ok(sequence) => {
                    // SAFETY: claim held, not yet published.
                    unsafe { ring.get_preallocated(sequence).value = value };
                    ring.publish(sequence);
                    break;
                }
                Err(ExchangeError::InsufficientCapacity) => {
                    refusals += 1;
                    thread::yield_now();
                }
                Err(other) => panic!("unexpected claim failure: {other}"),
            }
        }
    }

    // With four slots and a consumer draining one per millisecond, the vast
    // majority of first attempts must be refused.
    assert!(refusals >= 16, "only {refusals} refusals");

    // All twenty still arrive once the consumer drains.
    assert_eq!(consumer.join().unwrap(), (0..EVENTS).sum::<i64>());
    assert_eq!(ring.get_cursor(), EVENTS - 1);
}

#[test]
fn alert_unblocks_a_waiting_consumer_within_100ms() {
    let ring = RingBuffer::create_single_producer(
        DefaultEventFactory::<ValueEvent>::new(),
        8,
        Arc::new(BlockingWaitStrategy::new()),
    )
    .unwrap();

    let barrier = ring.new_barrier(&[]);

    let waiter = {
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || barrier.wait_for(1000))
    };

    // Let the consumer actually block; the cursor stays at -1 forever.
    thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    barrier.alert();
    let result = waiter.join().unwrap();

    assert!(matches!(result, Err(ExchangeError::Alert)));
    assert!(
        start.elapsed() < Duration::from_millis(100),
        "alert took {:?}",
        start.elapsed()
    );

    // The barrier is reusable after the alert is cleared.
    barrier.clear_alert();
    assert!(barrier.check_alert().is_ok());
}

#[test]
fn rejected_and_accepted_buffer_sizes() {
    for bad_size in [0, 7] {
        let result = RingBuffer::<ValueEvent>::create_single_producer(
            DefaultEventFactory::new(),
            bad_size,
            Arc::new(BlockingWaitStrategy::new()),
        );
        assert!(
            matches!(result, Err(ExchangeError::InvalidBufferSize(s)) if s == bad_size),
            "size {bad_size} must be rejected"
        );
    }

    let ring = RingBuffer::<ValueEvent>::create_single_producer(
        DefaultEventFactory::new(),
        8,
        Arc::new(BlockingWaitStrategy::new()),
    )
    .unwrap();
    assert_eq!(ring.buffer_size(), 8);
}

#[test]
fn gating_membership_round_trips() {
    let ring = RingBuffer::<ValueEvent>::create_single_producer(
        DefaultEventFactory::new(),
        8,
        Arc::new(BlockingWaitStrategy::new()),
    )
    .unwrap();

    let stable = Arc::new(Sequence::default());
    let transient = Arc::new(Sequence::default());
    ring.add_gating_sequences(&[Arc::clone(&stable)]);

    for _ in 0..8 {
        let sequence = ring.next();
        ring.publish(sequence);
    }
    stable.set(7);
    assert!(ring.has_available_capacity(8));

    // Attach a second consumer mid-stream, then let only the first keep up.
    ring.add_gating_sequences(&[Arc::clone(&transient)]);
    for _ in 0..4 {
        let sequence = ring.next();
        ring.publish(sequence);
    }
    stable.set(11);

    // The lagging transient consumer throttles the producer; removing it
    // restores the prior gating behavior.
    assert!(!ring.has_available_capacity(8));
    assert!(ring.remove_gating_sequence(&transient));
    assert!(ring.has_available_capacity(8));
    assert!(!ring.remove_gating_sequence(&transient));
}

#[test]
fn late_attached_consumer_is_seeded_to_the_cursor() {
    let ring = RingBuffer::<ValueEvent>::create_single_producer(
        DefaultEventFactory::new(),
        8,
        Arc::new(BlockingWaitStrategy::new()),
    )
    .unwrap();

    for _ in 0..5 {
        let sequence = ring.next();
        ring.publish(sequence);
    }

    let late = Arc::new(Sequence::default());
    ring.add_gating_sequences(&[Arc::clone(&late)]);

    // The new consumer starts at the cursor, so the producer is not throttled
    // by history it was never going to read.
    assert_eq!(late.get(), ring.get_cursor());
    assert!(ring.has_available_capacity(8));
}

#[test]
fn processor_pipeline_halts_cleanly() {
    let ring = Arc::new(
        RingBuffer::create_single_producer(
            DefaultEventFactory::<ValueEvent>::new(),
            16,
            Arc::new(SleepingWaitStrategy::new()),
        )
        .unwrap(),
    );

    let sum = Arc::new(AtomicI64::new(0));
    let handler = {
        let sum = Arc::clone(&sum);
        ClosureEventHandler::new(move |event: &ValueEvent, _sequence, _end_of_batch| {
            sum.fetch_add(event.value, Ordering::SeqCst);
        })
    };

    let processor = Arc::new(BatchEventProcessor::new(
        Arc::clone(&ring),
        ring.new_barrier(&[]),
        Box::new(handler),
    ));
    ring.add_gating_sequences(&[processor.get_sequence()]);

    let runner = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.run())
    };

    for value in 1..=100 {
        let sequence = ring.next();
        unsafe { ring.get_preallocated(sequence).value = value };
        ring.publish(sequence);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while processor.get_sequence().get() < 99 && Instant::now() < deadline {
        thread::yield_now();
    }
    assert_eq!(sum.load(Ordering::SeqCst), 5050);

    processor.halt();
    runner.join().unwrap();
    assert!(!processor.is_running());
}
