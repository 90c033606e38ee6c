//! # Seqno Admission Monitor
//!
//! Serializes access to a critical section by sequence number. For any `N`,
//! `grab(N)` returns only after every smaller outstanding seqno has been
//! released or canceled.
//!
//! ## Design
//!
//! The monitor keeps a fixed-capacity circular array of slot states indexed
//! by `seqno & mask`, plus one condition variable per slot. Waking a seqno
//! signals only its own slot, never the whole queue.
//!
//! ```text
//!            head                      head + capacity
//!             │                              │
//!   ──────────▼──────────────────────────────▼───────
//!   retired   │ G │ W │ C │ W │   │   │ ... │  blocked until
//!   (< head)  └───┴───┴───┴───┴───┴───┘     │  the window moves
//!               ▲
//!               └─ admissible: [head, head + concurrency)
//! ```
//!
//! `G` granted, `W` waiting, `C` canceled. Releasing or canceling the head
//! advances it across every consecutive retired slot and signals the
//! seqnos that became admissible.
//!
//! ## Cancellation
//!
//! - [`cancel`](SeqnoAdmissionMonitor::cancel) retires somebody else's seqno.
//!   A later `grab` of that seqno returns [`MonitorError::Canceled`] without
//!   blocking.
//! - [`self_cancel`](SeqnoAdmissionMonitor::self_cancel) retires the caller's
//!   own seqno without entering the critical section.
//! - [`interrupt`](SeqnoAdmissionMonitor::interrupt) kicks a waiter out but
//!   keeps the seqno in the queue; the owner must grab it again or
//!   self-cancel it.
//!
//! There is no timeout parameter. Callers that need one race a timer thread
//! calling `cancel` or `interrupt` on their seqno.

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{protocol_violation, validate_queue, ConfigError};

/// Default wait queue capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Errors returned by [`SeqnoAdmissionMonitor`] operations.
///
/// None of these indicate a bug: they are expected control-flow outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// The seqno was canceled; it will not be applied.
    #[error("seqno was canceled")]
    Canceled,

    /// The monitor has been closed; it admits nobody any more.
    #[error("monitor is closed")]
    Closed,

    /// The wait was interrupted; the seqno is still queued.
    #[error("wait was interrupted")]
    Interrupted,

    /// The seqno currently holds the monitor or has already been canceled.
    #[error("seqno {seqno} is in use")]
    InUse {
        /// The seqno in question.
        seqno: u64,
    },

    /// The seqno has already been retired.
    #[error("seqno {seqno} is already retired")]
    Stale {
        /// The seqno in question.
        seqno: u64,
    },
}

/// Configuration for a [`SeqnoAdmissionMonitor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Wait queue capacity. Must be a power of two and exceed the number of
    /// seqnos that can be outstanding at once.
    pub capacity: usize,
    /// Number of seqnos that may hold the monitor simultaneously
    /// (1 = strict total order).
    pub concurrency: usize,
    /// First seqno the monitor expects to be grabbed.
    pub initial_seqno: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            concurrency: 1,
            initial_seqno: 0,
        }
    }
}

impl MonitorConfig {
    /// Creates a strict total-order configuration with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Sets the concurrency parameter.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the first expected seqno.
    #[must_use]
    pub fn initial_seqno(mut self, seqno: u64) -> Self {
        self.initial_seqno = seqno;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the capacity is not a power of two or the
    /// concurrency is not in `1..=capacity`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_queue(self.capacity, self.concurrency)
    }
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    /// Lowest seqno not yet retired.
    pub head: u64,
    /// Seqnos currently holding the monitor.
    pub holders: usize,
    /// Threads blocked in `grab`.
    pub waiters: usize,
}

/// State of one queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Free: nobody has touched this seqno yet.
    Released,
    /// A thread is blocked in `grab`.
    Waiting,
    /// The seqno holds the monitor.
    Granted,
    /// Retired without being applied.
    Canceled,
    /// Marked by `interrupt`; the next `grab` returns `Interrupted`.
    Interrupted,
    /// Released ahead of the head (only with concurrency > 1).
    Finished,
}

struct Queue {
    head: u64,
    slots: Vec<Slot>,
    mask: u64,
    capacity: u64,
    concurrency: u64,
    holders: usize,
    waiters: usize,
    /// Threads blocked because their seqno is outside the window.
    overflowed: usize,
    closed: bool,
}

impl Queue {
    #[inline]
    #[allow(clippy::cast_possible_truncation)] // masked below capacity
    fn index(&self, seqno: u64) -> usize {
        (seqno & self.mask) as usize
    }

    #[inline]
    fn in_window(&self, seqno: u64) -> bool {
        seqno - self.head < self.capacity
    }

    #[inline]
    fn admissible(&self, seqno: u64) -> bool {
        seqno - self.head < self.concurrency
    }

    /// Moves the head across retired slots.
    fn advance(&mut self) -> bool {
        let start = self.head;
        loop {
            let idx = self.index(self.head);
            match self.slots[idx] {
                Slot::Canceled | Slot::Finished => {
                    self.slots[idx] = Slot::Released;
                    self.head += 1;
                }
                _ => break,
            }
        }
        self.head != start
    }
}

/// Total-order admission monitor.
///
/// # Thread Safety
///
/// All bookkeeping happens under one internal mutex. Blocked threads wait on
/// the condition variable of their own slot.
pub struct SeqnoAdmissionMonitor {
    queue: Mutex<Queue>,
    /// One per slot.
    wakeups: Box<[Condvar]>,
    /// Waiters whose seqno is beyond `head + capacity`.
    window: Condvar,
    /// Signaled when the last holder leaves a closed monitor.
    drained: Condvar,
}

impl SeqnoAdmissionMonitor {
    /// Creates a new monitor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let wakeups = (0..config.capacity).map(|_| Condvar::new()).collect();
        let queue = Queue {
            head: config.initial_seqno,
            slots: vec![Slot::Released; config.capacity],
            mask: config.capacity as u64 - 1,
            capacity: config.capacity as u64,
            concurrency: config.concurrency as u64,
            holders: 0,
            waiters: 0,
            overflowed: 0,
            closed: false,
        };

        Ok(Self {
            queue: Mutex::new(queue),
            wakeups,
            window: Condvar::new(),
            drained: Condvar::new(),
        })
    }

    /// Blocks until `seqno` may enter the critical section.
    ///
    /// Must be paired with [`release`](Self::release) on success.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::Canceled`] if `seqno` was canceled before or during
    ///   the wait, or has already been skipped.
    /// - [`MonitorError::Interrupted`] if [`interrupt`](Self::interrupt) hit
    ///   this seqno.
    /// - [`MonitorError::Closed`] if the monitor was closed.
    ///
    /// # Panics
    ///
    /// Panics if `seqno` is already granted or already being waited for.
    pub fn grab(&self, seqno: u64) -> Result<(), MonitorError> {
        let mut q = self.queue.lock();
        self.wait_for_window(&mut q, seqno)?;

        let idx = q.index(seqno);
        match q.slots[idx] {
            Slot::Released => {}
            Slot::Canceled => return Err(MonitorError::Canceled),
            Slot::Interrupted => {
                q.slots[idx] = Slot::Released;
                return Err(MonitorError::Interrupted);
            }
            state @ (Slot::Waiting | Slot::Granted | Slot::Finished) => {
                protocol_violation!("grab of seqno {seqno} in state {state:?}");
            }
        }

        q.waiters += 1;
        q.slots[idx] = Slot::Waiting;
        let outcome = loop {
            if seqno < q.head {
                // Canceled and skipped while we were asleep.
                break Err(MonitorError::Canceled);
            }
            match q.slots[idx] {
                Slot::Canceled => break Err(MonitorError::Canceled),
                Slot::Interrupted => {
                    q.slots[idx] = Slot::Released;
                    break Err(MonitorError::Interrupted);
                }
                Slot::Waiting if q.closed => {
                    q.slots[idx] = Slot::Released;
                    break Err(MonitorError::Closed);
                }
                Slot::Waiting if q.admissible(seqno) => {
                    q.slots[idx] = Slot::Granted;
                    q.holders += 1;
                    break Ok(());
                }
                Slot::Waiting => self.wakeups[idx].wait(&mut q),
                state => {
                    protocol_violation!("seqno {seqno} woke up in state {state:?}");
                }
            }
        };
        q.waiters -= 1;
        outcome
    }

    /// Releases a granted seqno and wakes the next one in order.
    ///
    /// # Panics
    ///
    /// Panics if `seqno` does not currently hold the monitor (double release
    /// or release without grab).
    pub fn release(&self, seqno: u64) {
        let mut q = self.queue.lock();

        if seqno < q.head || !q.in_window(seqno) {
            protocol_violation!(
                "release of seqno {seqno} outside the window (head {})",
                q.head
            );
        }
        let idx = q.index(seqno);
        if q.slots[idx] != Slot::Granted {
            protocol_violation!("release of seqno {seqno} in state {:?}", q.slots[idx]);
        }

        q.slots[idx] = Slot::Finished;
        q.holders -= 1;
        if seqno == q.head {
            self.advance_and_wake(&mut q);
        }
        if q.closed && q.holders == 0 {
            self.drained.notify_all();
        }
    }

    /// Cancels a seqno on behalf of another actor.
    ///
    /// If a thread waits for `seqno` it wakes up with
    /// [`MonitorError::Canceled`]; if none has arrived yet, its future
    /// `grab` fails immediately.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::Canceled`] if the seqno was already canceled.
    /// - [`MonitorError::InUse`] if the seqno currently holds the monitor.
    /// - [`MonitorError::Stale`] if the seqno has already been retired.
    ///
    /// # Panics
    ///
    /// Panics if `seqno` lies beyond the queue capacity: the wait queue is
    /// too small for the workload.
    pub fn cancel(&self, seqno: u64) -> Result<(), MonitorError> {
        let mut q = self.queue.lock();

        if seqno < q.head {
            warn!(seqno, head = q.head, "trying to cancel a retired seqno");
            return Err(MonitorError::Stale { seqno });
        }
        if !q.in_window(seqno) {
            protocol_violation!(
                "cancel of seqno {seqno} overflows the wait queue (head {}, capacity {})",
                q.head,
                q.capacity
            );
        }

        let idx = q.index(seqno);
        match q.slots[idx] {
            Slot::Granted => {
                warn!(seqno, "trying to cancel the current holder");
                Err(MonitorError::InUse { seqno })
            }
            Slot::Canceled => Err(MonitorError::Canceled),
            Slot::Finished => Err(MonitorError::Stale { seqno }),
            state @ (Slot::Released | Slot::Waiting | Slot::Interrupted) => {
                q.slots[idx] = Slot::Canceled;
                if state == Slot::Waiting {
                    self.wakeups[idx].notify_all();
                }
                if seqno == q.head {
                    self.advance_and_wake(&mut q);
                }
                Ok(())
            }
        }
    }

    /// Retires the caller's own seqno without entering the critical section.
    ///
    /// Equivalent to a grab immediately followed by a release, minus the
    /// wait. Safe to race with [`cancel`](Self::cancel) on the same seqno:
    /// exactly one of them succeeds.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::Canceled`] if another actor canceled the seqno first.
    /// - [`MonitorError::Closed`] once the monitor is closed.
    ///
    /// # Panics
    ///
    /// Panics if the seqno is currently granted, waited for, or already
    /// released.
    pub fn self_cancel(&self, seqno: u64) -> Result<(), MonitorError> {
        let mut q = self.queue.lock();

        if seqno < q.head {
            // Canceled by somebody else and already skipped.
            return Err(MonitorError::Canceled);
        }
        self.wait_for_window(&mut q, seqno)?;

        let idx = q.index(seqno);
        match q.slots[idx] {
            Slot::Canceled => Err(MonitorError::Canceled),
            Slot::Released | Slot::Interrupted => {
                q.slots[idx] = Slot::Canceled;
                if seqno == q.head {
                    self.advance_and_wake(&mut q);
                }
                Ok(())
            }
            state @ (Slot::Waiting | Slot::Granted | Slot::Finished) => {
                protocol_violation!("self-cancel of seqno {seqno} in state {state:?}");
            }
        }
    }

    /// Interrupts the wait of `seqno`.
    ///
    /// The seqno stays in the queue and later seqnos keep waiting for it. The
    /// owner must call [`grab`](Self::grab) again or
    /// [`self_cancel`](Self::self_cancel).
    ///
    /// # Errors
    ///
    /// - [`MonitorError::InUse`] if the seqno holds the monitor or is canceled.
    /// - [`MonitorError::Stale`] if the seqno has already been retired.
    ///
    /// # Panics
    ///
    /// Panics if `seqno` lies beyond the queue capacity.
    pub fn interrupt(&self, seqno: u64) -> Result<(), MonitorError> {
        let mut q = self.queue.lock();

        if seqno < q.head {
            debug!(seqno, head = q.head, "trying to interrupt a retired seqno");
            return Err(MonitorError::Stale { seqno });
        }
        if !q.in_window(seqno) {
            protocol_violation!(
                "interrupt of seqno {seqno} overflows the wait queue (head {})",
                q.head
            );
        }

        let idx = q.index(seqno);
        match q.slots[idx] {
            Slot::Granted | Slot::Canceled => {
                debug!(seqno, state = ?q.slots[idx], "trying to interrupt a seqno in use");
                Err(MonitorError::InUse { seqno })
            }
            Slot::Finished => Err(MonitorError::Stale { seqno }),
            Slot::Waiting => {
                debug!(seqno, "signaling waiter to interrupt");
                q.slots[idx] = Slot::Interrupted;
                self.wakeups[idx].notify_all();
                Ok(())
            }
            Slot::Released => {
                q.slots[idx] = Slot::Interrupted;
                Ok(())
            }
            Slot::Interrupted => {
                debug!(seqno, "seqno already interrupted");
                Ok(())
            }
        }
    }

    /// Closes the monitor.
    ///
    /// Every thread blocked in `grab` returns [`MonitorError::Closed`], as
    /// does every later `grab`. Blocks until all current holders have
    /// released. Closing is final. Must not be called by a thread that
    /// holds the monitor.
    pub fn close(&self) {
        let mut q = self.queue.lock();
        if q.closed {
            debug!("monitor already closed");
            return;
        }

        info!(head = q.head, holders = q.holders, waiters = q.waiters, "closing seqno monitor");
        q.closed = true;
        for cond in self.wakeups.iter() {
            cond.notify_all();
        }
        self.window.notify_all();

        while q.holders > 0 {
            self.drained.wait(&mut q);
        }
        info!(head = q.head, "closed seqno monitor");
    }

    /// Highest seqno that is no longer in use, if any.
    #[must_use]
    pub fn last_released(&self) -> Option<u64> {
        self.queue.lock().head.checked_sub(1)
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    /// Returns a snapshot of the queue counters.
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        let q = self.queue.lock();
        MonitorStats {
            head: q.head,
            holders: q.holders,
            waiters: q.waiters + q.overflowed,
        }
    }

    /// Blocks while `seqno` is beyond the queue window.
    fn wait_for_window(
        &self,
        q: &mut MutexGuard<'_, Queue>,
        seqno: u64,
    ) -> Result<(), MonitorError> {
        loop {
            if q.closed {
                return Err(MonitorError::Closed);
            }
            if seqno < q.head {
                return Err(MonitorError::Canceled);
            }
            if q.in_window(seqno) {
                return Ok(());
            }
            q.overflowed += 1;
            self.window.wait(q);
            q.overflowed -= 1;
        }
    }

    fn advance_and_wake(&self, q: &mut MutexGuard<'_, Queue>) {
        if !q.advance() {
            return;
        }
        let end = q.head + q.concurrency;
        for seqno in q.head..end {
            let idx = q.index(seqno);
            if q.slots[idx] == Slot::Waiting {
                self.wakeups[idx].notify_all();
            }
        }
        if q.overflowed > 0 {
            self.window.notify_all();
        }
    }
}

impl std::fmt::Debug for SeqnoAdmissionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.queue.lock();
        f.debug_struct("SeqnoAdmissionMonitor")
            .field("head", &q.head)
            .field("capacity", &q.capacity)
            .field("concurrency", &q.concurrency)
            .field("holders", &q.holders)
            .field("closed", &q.closed)
            .finish_non_exhaustive()
    }
}
