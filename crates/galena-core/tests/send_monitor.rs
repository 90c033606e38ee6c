//! FIFO admission through the send monitor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use galena_core::{SendMonitor, SendMonitorConfig, SendMonitorError};
use parking_lot::Mutex;

#[test]
fn admission_follows_schedule_order() {
    let sm = Arc::new(SendMonitor::new(SendMonitorConfig::with_capacity(32)).unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));

    // hold the monitor so that everybody queues up
    sm.acquire().unwrap();

    let handles: Vec<_> = (0..16).map(|_| sm.schedule().unwrap()).collect();
    let threads: Vec<_> = handles
        .into_iter()
        .rev()
        .map(|handle| {
            let sm = Arc::clone(&sm);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                sm.enter(handle).unwrap();
                order.lock().push(handle.ticket());
                sm.leave();
            })
        })
        .collect();

    sm.leave();
    for t in threads {
        t.join().unwrap();
    }

    let order = order.lock();
    assert_eq!(*order, (1..=16).collect::<Vec<u64>>());
}

#[test]
fn concurrency_bounds_holders() {
    const CC: usize = 3;
    let sm = Arc::new(
        SendMonitor::new(SendMonitorConfig::with_capacity(64).concurrency(CC)).unwrap(),
    );
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..12)
        .map(|_| {
            let sm = Arc::clone(&sm);
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..200 {
                    sm.acquire().unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                    sm.leave();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= CC);
    assert_eq!(sm.stats().queue_len, 0);
}

#[test]
fn full_queue_blocks_schedule() {
    let sm = Arc::new(SendMonitor::new(SendMonitorConfig::with_capacity(2)).unwrap());
    sm.acquire().unwrap();
    let a = sm.schedule().unwrap();
    let b = sm.schedule().unwrap();

    let late = {
        let sm = Arc::clone(&sm);
        thread::spawn(move || {
            let h = sm.schedule().unwrap();
            sm.enter(h).unwrap();
            sm.leave();
            h.ticket()
        })
    };

    sm.leave();
    sm.enter(a).unwrap();
    sm.leave();
    sm.enter(b).unwrap();
    sm.leave();
    assert_eq!(late.join().unwrap(), 3);
}

#[test]
fn close_fails_queued_and_future_senders() {
    let sm = Arc::new(SendMonitor::new(SendMonitorConfig::default()).unwrap());
    sm.acquire().unwrap();
    let queued = sm.schedule().unwrap();

    let closer = {
        let sm = Arc::clone(&sm);
        thread::spawn(move || sm.close())
    };
    while !sm.is_closed() {
        thread::yield_now();
    }

    assert_eq!(sm.enter(queued), Err(SendMonitorError::Closed));
    assert_eq!(sm.schedule(), Err(SendMonitorError::Closed));
    sm.leave();
    closer.join().unwrap();
}

#[test]
fn close_resumes_paused_monitor() {
    let sm = SendMonitor::new(SendMonitorConfig::default()).unwrap();
    sm.pause();
    sm.close();
    assert!(!sm.is_paused());
    // pausing a closed monitor is ignored
    sm.pause();
    assert!(!sm.is_paused());
}
