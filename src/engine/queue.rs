//! Bounded lock-free FIFO queue.
//!
//! [`AtomicQueue`] is the transport between task producers (any thread) and
//! the task executors. It is a fixed-capacity ring buffer whose slots carry a
//! sequence stamp:
//!
//! * a slot whose stamp equals the producer position is free for writing,
//! * a slot whose stamp equals the consumer position plus one holds a value.
//!
//! A producer first *claims* a position (compare-and-swap on the tail in
//! [`QueueMode::Multiple`], a plain store in [`QueueMode::Single`]), then
//! writes the value, then *publishes* it by advancing the slot stamp with
//! release ordering. Consumers do the mirror image on the head. A consumer can
//! therefore never observe a claimed but not yet written slot.
//!
//! ## Invariants
//!
//! * Capacity is a power of two and never changes after construction.
//! * A push never overwrites an unconsumed value; a full queue hands the
//!   value back in [`QueueFull`].
//! * Values are moved out on pop; the queue never lends references into its
//!   ring.
//! * `Single` modes are only sound with exactly one thread on that side. The
//!   queue cannot check this; callers pick the mode.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::engine::error::QueueFull;


/// How many threads may operate on one side of an [`AtomicQueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum QueueMode {
    /// Exactly one thread uses this side.
    Single,
    /// Any number of threads use this side concurrently.
    #[default]
    Multiple,
}

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity multi/single producer, multi/single consumer FIFO queue.
pub struct AtomicQueue<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    slots: Box<[Slot<T>]>,
    mask: usize,
    producer: QueueMode,
    consumer: QueueMode,
}

// SAFETY: slot access is serialized through the stamp protocol; values of `T`
// move between threads, which requires `T: Send` and nothing more.
unsafe impl<T: Send> Send for AtomicQueue<T> {}
unsafe impl<T: Send> Sync for AtomicQueue<T> {}

impl<T> AtomicQueue<T> {
    /// Creates a queue holding at least `capacity` values.
    ///
    /// The capacity is rounded up to the next power of two (minimum 1).
    pub fn new(capacity: usize, producer: QueueMode, consumer: QueueMode) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots,
            mask: capacity - 1,
            producer,
            consumer,
        }
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Producer-side mode chosen at construction.
    #[inline]
    pub fn producer_mode(&self) -> QueueMode {
        self.producer
    }

    /// Consumer-side mode chosen at construction.
    #[inline]
    pub fn consumer_mode(&self) -> QueueMode {
        self.consumer
    }

    /// Approximate number of queued values.
    ///
    /// Exact only when no other thread is pushing or popping.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity())
    }

    /// Returns `true` if no value is queued (see [`len`](Self::len)).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `value` at the tail.
    ///
    /// Returns the value inside [`QueueFull`] when all slots are occupied.
    pub fn push(&self, value: T) -> Result<(), QueueFull<T>> {
        let backoff = Backoff::new();
        let mut position = self.tail.load(Ordering::Relaxed);

        loop {
            let slot = &self.slots[position & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let lag = stamp.wrapping_sub(position) as isize;

            if lag == 0 {
                let claimed = match self.producer {
                    QueueMode::Single => {
                        self.tail.store(position.wrapping_add(1), Ordering::Relaxed);
                        Ok(position)
                    }
                    QueueMode::Multiple => self.tail.compare_exchange_weak(
                        position,
                        position.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ),
                };

                match claimed {
                    Ok(_) => {
                        // SAFETY: the claim gives this thread exclusive access to
                        // the slot until the stamp is published below.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.stamp.store(position.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => {
                        position = current;
                        backoff.spin();
                    }
                }
            } else if lag < 0 {
                // The slot still holds the value from one lap ago.
                return Err(QueueFull {
                    value,
                    capacity: self.capacity(),
                });
            } else {
                backoff.spin();
                position = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Removes the value at the head, or returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut position = self.head.load(Ordering::Relaxed);

        loop {
            let slot = &self.slots[position & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let lag = stamp.wrapping_sub(position.wrapping_add(1)) as isize;

            if lag == 0 {
                let claimed = match self.consumer {
                    QueueMode::Single => {
                        self.head.store(position.wrapping_add(1), Ordering::Relaxed);
                        Ok(position)
                    }
                    QueueMode::Multiple => self.head.compare_exchange_weak(
                        position,
                        position.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ),
                };

                match claimed {
                    Ok(_) => {
                        // SAFETY: the stamp proved the slot was published and the
                        // claim makes this thread its only reader.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.stamp
                            .store(position.wrapping_add(self.capacity()), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => {
                        position = current;
                        backoff.spin();
                    }
                }
            } else if lag < 0 {
                return None;
            } else {
                backoff.spin();
                position = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Pops into `out` if a value is available.
    ///
    /// Returns `false` and leaves `out` untouched when the queue is empty.
    pub fn pop_if_not_empty(&self, out: &mut T) -> bool {
        match self.pop() {
            Some(value) => {
                *out = value;
                true
            }
            None => false,
        }
    }
}

impl<T> Drop for AtomicQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> std::fmt::Debug for AtomicQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("producer", &self.producer)
            .field("consumer", &self.consumer)
            .finish()
    }
}
