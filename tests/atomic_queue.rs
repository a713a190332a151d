use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use hearth_engine::{AtomicQueue, QueueMode};

#[test]
fn capacity_rounds_up_to_power_of_two() {
    let queue: AtomicQueue<u32> = AtomicQueue::new(100, QueueMode::Multiple, QueueMode::Multiple);
    assert_eq!(queue.capacity(), 128);

    let queue: AtomicQueue<u32> = AtomicQueue::new(0, QueueMode::Single, QueueMode::Single);
    assert_eq!(queue.capacity(), 1);
}

#[test]
fn single_thread_fifo_order() {
    let queue = AtomicQueue::new(8, QueueMode::Single, QueueMode::Single);
    for i in 0..8 {
        queue.push(i).unwrap();
    }
    assert_eq!(queue.len(), 8);

    let popped: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
    assert_eq!(popped, (0..8).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn pop_on_empty_queue_leaves_output_untouched() {
    let queue: AtomicQueue<u64> = AtomicQueue::new(4, QueueMode::Multiple, QueueMode::Multiple);
    let mut out = 77;
    assert!(!queue.pop_if_not_empty(&mut out));
    assert_eq!(out, 77);

    queue.push(5).unwrap();
    assert!(queue.pop_if_not_empty(&mut out));
    assert_eq!(out, 5);
}

#[test]
fn full_queue_returns_the_rejected_value() {
    let queue = AtomicQueue::new(4, QueueMode::Multiple, QueueMode::Multiple);
    for i in 0..4 {
        queue.push(i).unwrap();
    }

    let full = queue.push(99).unwrap_err();
    assert_eq!(full.capacity, 4);
    assert_eq!(full.into_inner(), 99);

    // Nothing was overwritten.
    let popped: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
    assert_eq!(popped, vec![0, 1, 2, 3]);
}

#[test]
fn wraps_around_many_laps() {
    let queue = AtomicQueue::new(4, QueueMode::Single, QueueMode::Single);
    for lap in 0..1000u32 {
        queue.push(lap).unwrap();
        queue.push(lap + 1).unwrap();
        assert_eq!(queue.pop(), Some(lap));
        assert_eq!(queue.pop(), Some(lap + 1));
    }
    assert!(queue.pop().is_none());
}

#[test]
fn dropping_queue_drops_remaining_values() {
    struct Tracked(Arc<AtomicUsize>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    {
        let queue = AtomicQueue::new(8, QueueMode::Multiple, QueueMode::Multiple);
        for _ in 0..5 {
            queue.push(Tracked(drops.clone())).unwrap();
        }
        drop(queue.pop());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 5);
}

#[test]
fn concurrent_producers_and_consumers_deliver_every_value_once() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 10_000;

    let queue = Arc::new(AtomicQueue::new(64, QueueMode::Multiple, QueueMode::Multiple));
    let barrier = Arc::new(Barrier::new(PRODUCERS + CONSUMERS));
    let consumed = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_PRODUCER {
                    let mut value = p * PER_PRODUCER + i;
                    loop {
                        match queue.push(value) {
                            Ok(()) => break,
                            Err(full) => {
                                value = full.into_inner();
                                thread::yield_now();
                            }
                        }
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            let barrier = barrier.clone();
            let consumed = consumed.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut seen = Vec::new();
                while consumed.load(Ordering::SeqCst) < PRODUCERS * PER_PRODUCER {
                    match queue.pop() {
                        Some(value) => {
                            seen.push(value);
                            consumed.fetch_add(1, Ordering::SeqCst);
                        }
                        None => thread::yield_now(),
                    }
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    let mut all = HashSet::new();
    for consumer in consumers {
        for value in consumer.join().unwrap() {
            assert!(all.insert(value), "value {value} delivered twice");
        }
    }
    assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
    assert!(queue.is_empty());
}

#[test]
fn single_producer_single_consumer_preserves_order_across_threads() {
    const COUNT: u64 = 50_000;
    let queue = Arc::new(AtomicQueue::new(32, QueueMode::Single, QueueMode::Single));

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..COUNT {
                while queue.push(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        })
    };

    let mut expected = 0;
    while expected < COUNT {
        if let Some(value) = queue.pop() {
            assert_eq!(value, expected);
            expected += 1;
        }
    }
    producer.join().unwrap();
}
