//! Spin and adaptive locks.
//!
//! [`SpinLock`] burns cycles in a pause loop and suits critical sections of
//! a few instructions. [`AdaptiveLock`] starts the same way but backs off
//! through randomized microsleeps under contention, so it is safe to hold
//! across slower sections.

use std::time::Duration;

use rand::Rng;

use crate::sync::atomic::AtomicWord;
use crate::sync::guard::RawLock;

const MIN_SLEEP_MICROS: u64 = 500;
const MAX_SLEEP_MICROS: u64 = 20_000;
const MAX_SPIN_COUNT: u32 = 0x7FF;

/// Exponential backoff helper shared by the adaptive lock and the
/// singleton-initialization lock.
#[derive(Debug)]
pub(crate) struct SpinWait {
    sleep_micros: u64,
    spins: u32,
}

impl SpinWait {
    pub(crate) fn new() -> Self {
        Self {
            sleep_micros: MIN_SLEEP_MICROS,
            spins: 0,
        }
    }

    /// One backoff step: pause, then randomized sleep with a growing base
    /// interval, then an OS yield at the spin-count rollover.
    pub(crate) fn sleep(&mut self) {
        self.spins = self.spins.wrapping_add(1);
        if self.spins == MAX_SPIN_COUNT {
            std::thread::yield_now();
        } else if self.spins & MAX_SPIN_COUNT == 0 {
            std::thread::sleep(Duration::from_micros(randomize_sleep(self.sleep_micros)));
            self.sleep_micros = (self.sleep_micros * 3 / 2).min(MAX_SLEEP_MICROS);
        } else {
            std::hint::spin_loop();
        }
    }
}

// Randomize around the base interval so contending threads desynchronize:
// result is in [0.8*t, 1.2*t).
fn randomize_sleep(t: u64) -> u64 {
    let jitter = rand::thread_rng().gen_range(0..t.max(1));
    (t * 4 + jitter * 2) / 5
}

/// Pure busy-wait lock.
#[derive(Debug, Default)]
pub struct SpinLock {
    value: AtomicWord,
}

impl SpinLock {
    /// Creates an unlocked spin lock.
    pub const fn new() -> Self {
        Self {
            value: AtomicWord::new(0),
        }
    }

    /// Whether the lock is currently held by anyone.
    pub fn is_locked(&self) -> bool {
        self.value.load() != 0
    }
}

impl RawLock for SpinLock {
    fn acquire(&self) {
        if !self.value.try_lock() {
            loop {
                std::hint::spin_loop();
                if self.value.try_and_try_lock() {
                    break;
                }
            }
        }
    }

    fn release(&self) {
        self.value.unlock();
    }

    fn try_acquire(&self) -> bool {
        self.value.try_lock()
    }
}

/// Spin-then-backoff lock.
#[derive(Debug, Default)]
pub struct AdaptiveLock {
    value: AtomicWord,
}

impl AdaptiveLock {
    /// Creates an unlocked adaptive lock.
    pub const fn new() -> Self {
        Self {
            value: AtomicWord::new(0),
        }
    }

    /// Whether the lock is currently held by anyone.
    pub fn is_locked(&self) -> bool {
        self.value.load() != 0
    }
}

impl RawLock for AdaptiveLock {
    fn acquire(&self) {
        if !self.value.try_lock() {
            let mut backoff = SpinWait::new();
            while !self.value.try_and_try_lock() {
                backoff.sleep();
            }
        }
    }

    fn release(&self) {
        self.value.unlock();
    }

    fn try_acquire(&self) -> bool {
        self.value.try_lock()
    }
}
