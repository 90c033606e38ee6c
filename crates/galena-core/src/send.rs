//! # Send Monitor
//!
//! Bounds the number of threads inside a send critical section and admits
//! them in strict FIFO arrival order. There is no seqno here: a ticket is
//! handed out on arrival and tickets are served in order.
//!
//! Entry is two-phase so a caller can reserve its position before doing work
//! that must not reorder:
//!
//! ```rust
//! use galena_core::send::{SendMonitor, SendMonitorConfig};
//!
//! let sm = SendMonitor::new(SendMonitorConfig::default()).unwrap();
//!
//! let handle = sm.schedule().unwrap();
//! sm.enter(handle).unwrap();
//! // ... send ...
//! sm.leave();
//! ```
//!
//! [`pause`](SendMonitor::pause) and [`resume`](SendMonitor::resume) provide
//! flow control: while paused nobody new is admitted, and
//! [`stats`](SendMonitor::stats) reports which fraction of time was spent
//! paused.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{protocol_violation, validate_queue, ConfigError};

/// Errors returned by [`SendMonitor`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendMonitorError {
    /// The monitor has been closed.
    #[error("send monitor is closed")]
    Closed,

    /// The waiter was interrupted and gave up its queue position.
    #[error("send monitor wait was interrupted")]
    Interrupted,

    /// The handle does not name a queued waiter.
    #[error("no such waiter in the send queue")]
    UnknownWaiter,
}

/// Configuration for a [`SendMonitor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMonitorConfig {
    /// Wait queue capacity (power of two).
    pub capacity: usize,
    /// Maximum number of simultaneous holders.
    pub concurrency: usize,
}

impl Default for SendMonitorConfig {
    fn default() -> Self {
        Self {
            capacity: crate::seqno::DEFAULT_CAPACITY,
            concurrency: 1,
        }
    }
}

impl SendMonitorConfig {
    /// Creates a configuration with the given capacity and concurrency 1.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            concurrency: 1,
        }
    }

    /// Sets the concurrency parameter.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on a bad capacity or concurrency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_queue(self.capacity, self.concurrency)
    }
}

/// Queue position returned by [`SendMonitor::schedule`].
///
/// Pass it to [`SendMonitor::enter`] exactly once. A copy may be handed to
/// another thread for [`SendMonitor::interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterHandle {
    ticket: u64,
}

impl WaiterHandle {
    /// Arrival ticket of this waiter.
    #[must_use]
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// Sampled send queue statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendMonitorStats {
    /// Threads currently scheduled or inside the monitor.
    pub queue_len: usize,
    /// Average queue length seen by arrivals that had to wait, over the
    /// sampling interval.
    pub queue_len_avg: f64,
    /// Fraction of the sampling interval spent paused.
    pub paused_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waiter {
    Vacant,
    /// Holds a ticket but has not called `enter` yet.
    Scheduled,
    Waiting,
    Interrupted,
    /// Left without entering; skipped when it reaches the head.
    Gone,
}

struct Sampling {
    start: Instant,
    pause_start: Instant,
    paused_for: Duration,
    samples: u64,
    queue_len_sum: u64,
}

impl Sampling {
    fn new(now: Instant) -> Self {
        Self {
            start: now,
            pause_start: now,
            paused_for: Duration::ZERO,
            samples: 0,
            queue_len_sum: 0,
        }
    }
}

struct Queue {
    slots: Vec<(u64, Waiter)>,
    mask: u64,
    capacity: u64,
    concurrency: usize,
    /// Next ticket to admit.
    head: u64,
    /// Next ticket to hand out.
    tail: u64,
    entered: usize,
    overflowed: usize,
    paused: bool,
    closed: bool,
    sampling: Sampling,
}

impl Queue {
    #[inline]
    #[allow(clippy::cast_possible_truncation)] // masked below capacity
    fn index(&self, ticket: u64) -> usize {
        (ticket & self.mask) as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    fn users(&self) -> usize {
        (self.tail - self.head) as usize + self.entered
    }

    fn can_admit(&self, ticket: u64) -> bool {
        ticket == self.head && self.entered < self.concurrency && !self.paused
    }

    fn drained(&self) -> bool {
        self.entered == 0 && self.head == self.tail
    }
}

/// FIFO admission monitor for senders.
pub struct SendMonitor {
    queue: Mutex<Queue>,
    wakeups: Box<[Condvar]>,
    /// Signaled when a queue position frees up.
    overflow: Condvar,
    drained: Condvar,
}

impl SendMonitor {
    /// Creates a new send monitor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: SendMonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = Queue {
            slots: vec![(0, Waiter::Vacant); config.capacity],
            mask: config.capacity as u64 - 1,
            capacity: config.capacity as u64,
            concurrency: config.concurrency,
            head: 0,
            tail: 0,
            entered: 0,
            overflowed: 0,
            paused: false,
            closed: false,
            sampling: Sampling::new(Instant::now()),
        };

        Ok(Self {
            queue: Mutex::new(queue),
            wakeups: (0..config.capacity).map(|_| Condvar::new()).collect(),
            overflow: Condvar::new(),
            drained: Condvar::new(),
        })
    }

    /// Reserves the next FIFO position.
    ///
    /// Blocks while the wait queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`SendMonitorError::Closed`] if the monitor is closed.
    pub fn schedule(&self) -> Result<WaiterHandle, SendMonitorError> {
        let mut q = self.queue.lock();
        loop {
            if q.closed {
                return Err(SendMonitorError::Closed);
            }
            if q.tail - q.head < q.capacity {
                break;
            }
            q.overflowed += 1;
            self.overflow.wait(&mut q);
            q.overflowed -= 1;
        }

        let ticket = q.tail;
        q.tail += 1;
        let idx = q.index(ticket);
        q.slots[idx] = (ticket, Waiter::Scheduled);

        q.sampling.samples += 1;
        if !q.can_admit(ticket) {
            q.sampling.queue_len_sum += q.users() as u64 - 1;
        }

        Ok(WaiterHandle { ticket })
    }

    /// Waits until `handle` reaches the head of the queue and a holder slot
    /// is free, then enters.
    ///
    /// # Errors
    ///
    /// - [`SendMonitorError::Interrupted`] if the waiter was interrupted.
    /// - [`SendMonitorError::Closed`] if the monitor was closed, including
    ///   while waiting.
    ///
    /// # Panics
    ///
    /// Panics if the handle was already used.
    pub fn enter(&self, handle: WaiterHandle) -> Result<(), SendMonitorError> {
        let mut q = self.queue.lock();
        let ticket = handle.ticket;
        let idx = q.index(ticket);

        if ticket < q.head || ticket >= q.tail || q.slots[idx].0 != ticket {
            protocol_violation!("enter with stale send monitor ticket {ticket}");
        }

        loop {
            match q.slots[idx].1 {
                Waiter::Interrupted => {
                    q.slots[idx].1 = Waiter::Gone;
                    self.wake_next(&mut q);
                    return Err(SendMonitorError::Interrupted);
                }
                Waiter::Scheduled | Waiter::Waiting if q.closed => {
                    q.slots[idx].1 = Waiter::Gone;
                    self.wake_next(&mut q);
                    return Err(SendMonitorError::Closed);
                }
                Waiter::Scheduled | Waiter::Waiting if q.can_admit(ticket) => {
                    q.slots[idx].1 = Waiter::Vacant;
                    q.head += 1;
                    q.entered += 1;
                    self.wake_next(&mut q);
                    return Ok(());
                }
                Waiter::Scheduled | Waiter::Waiting => {
                    q.slots[idx].1 = Waiter::Waiting;
                    self.wakeups[idx].wait(&mut q);
                }
                state @ (Waiter::Vacant | Waiter::Gone) => {
                    protocol_violation!("send monitor ticket {ticket} entered twice ({state:?})");
                }
            }
        }
    }

    /// Schedules and enters in one call.
    ///
    /// # Errors
    ///
    /// See [`schedule`](Self::schedule) and [`enter`](Self::enter).
    pub fn acquire(&self) -> Result<(), SendMonitorError> {
        let handle = self.schedule()?;
        self.enter(handle)
    }

    /// Leaves the monitor and admits the next waiter in FIFO order.
    ///
    /// # Panics
    ///
    /// Panics if nobody is inside the monitor.
    pub fn leave(&self) {
        let mut q = self.queue.lock();
        if q.entered == 0 {
            protocol_violation!("leave of an empty send monitor");
        }
        q.entered -= 1;
        self.wake_next(&mut q);
    }

    /// Makes the `enter` of `handle` fail with
    /// [`SendMonitorError::Interrupted`] and frees its position.
    ///
    /// # Errors
    ///
    /// Returns [`SendMonitorError::UnknownWaiter`] if the handle has already
    /// entered or left.
    pub fn interrupt(&self, handle: WaiterHandle) -> Result<(), SendMonitorError> {
        let mut q = self.queue.lock();
        let ticket = handle.ticket;
        if ticket < q.head || ticket >= q.tail {
            return Err(SendMonitorError::UnknownWaiter);
        }

        let idx = q.index(ticket);
        match q.slots[idx] {
            (t, Waiter::Waiting) if t == ticket => {
                debug!(ticket, "interrupting send monitor waiter");
                q.slots[idx].1 = Waiter::Interrupted;
                self.wakeups[idx].notify_all();
                Ok(())
            }
            (t, Waiter::Scheduled) if t == ticket => {
                q.slots[idx].1 = Waiter::Interrupted;
                Ok(())
            }
            (t, Waiter::Interrupted) if t == ticket => Ok(()),
            _ => Err(SendMonitorError::UnknownWaiter),
        }
    }

    /// Stops admitting new holders until [`resume`](Self::resume).
    ///
    /// Current holders are unaffected. Has no effect on a closed monitor.
    pub fn pause(&self) {
        let mut q = self.queue.lock();
        if q.closed || q.paused {
            return;
        }
        q.paused = true;
        q.sampling.pause_start = Instant::now();
        debug!("send monitor paused");
    }

    /// Resumes admission after [`pause`](Self::pause).
    pub fn resume(&self) {
        let mut q = self.queue.lock();
        self.resume_locked(&mut q);
    }

    /// Closes the monitor.
    ///
    /// All current and future `enter`/`schedule` calls fail with
    /// [`SendMonitorError::Closed`]. Blocks until every holder has left and
    /// every scheduled waiter has given up its position.
    pub fn close(&self) {
        let mut q = self.queue.lock();
        if q.closed {
            return;
        }

        info!(users = q.users(), "closing send monitor");
        q.closed = true;
        if q.paused {
            self.resume_locked(&mut q);
        }
        for cond in self.wakeups.iter() {
            cond.notify_all();
        }
        self.overflow.notify_all();

        while !q.drained() {
            self.drained.wait(&mut q);
        }
        info!("closed send monitor");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    /// Returns `true` while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.queue.lock().paused
    }

    /// Samples queue statistics and starts a new sampling interval.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> SendMonitorStats {
        let now = Instant::now();
        let (queue_len, sample, paused) = {
            let mut q = self.queue.lock();
            let sample = std::mem::replace(&mut q.sampling, Sampling::new(now));
            (q.users(), sample, q.paused)
        };

        let mut paused_for = sample.paused_for;
        if paused {
            paused_for += now.saturating_duration_since(sample.pause_start);
        }
        let elapsed = now.saturating_duration_since(sample.start).as_secs_f64();
        let paused_fraction = if elapsed > 0.0 {
            paused_for.as_secs_f64() / elapsed
        } else {
            0.0
        };
        let queue_len_avg = if sample.samples > 0 {
            sample.queue_len_sum as f64 / sample.samples as f64
        } else {
            0.0
        };

        SendMonitorStats {
            queue_len,
            queue_len_avg,
            paused_fraction,
        }
    }

    fn resume_locked(&self, q: &mut MutexGuard<'_, Queue>) {
        if !q.paused {
            debug!("trying to resume an unpaused send monitor");
            return;
        }
        q.paused = false;
        let paused = q.sampling.pause_start.elapsed();
        q.sampling.paused_for += paused;
        self.wake_next(q);
    }

    /// Skips abandoned positions and signals the head if it may enter.
    fn wake_next(&self, q: &mut MutexGuard<'_, Queue>) {
        while q.head < q.tail {
            let idx = q.index(q.head);
            if q.slots[idx].1 != Waiter::Gone {
                break;
            }
            q.slots[idx].1 = Waiter::Vacant;
            q.head += 1;
        }

        if q.head < q.tail {
            let idx = q.index(q.head);
            if q.slots[idx].1 == Waiter::Waiting && q.can_admit(q.head) {
                self.wakeups[idx].notify_all();
            }
        }
        if q.overflowed > 0 && q.tail - q.head < q.capacity {
            self.overflow.notify_all();
        }
        if q.closed && q.drained() {
            self.drained.notify_all();
        }
    }
}

impl std::fmt::Debug for SendMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.queue.lock();
        f.debug_struct("SendMonitor")
            .field("head", &q.head)
            .field("tail", &q.tail)
            .field("entered", &q.entered)
            .field("paused", &q.paused)
            .field("closed", &q.closed)
            .finish_non_exhaustive()
    }
}
