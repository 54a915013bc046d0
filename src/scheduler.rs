//! The pump: one thread per stopwatch that fires ticks on absolute
//! boundaries measured from the activation reference.
//!
//! Deadlines are never computed as "interval from now". After each firing
//! the next deadline is the first boundary strictly after the firing
//! instant, so a callback that overruns only collapses the boundaries it
//! covered into a single late tick; the grid itself does not move.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

use stopwatch_core::{boundaries_crossed, next_boundary_after, Clock};

/// One firing of the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Clock reading when the tick fired.
    pub now_ms: u64,
    pub reference_ms: u64,
    /// `now_ms - reference_ms`.
    pub since_reference_ms: u64,
    /// Boundaries crossed since the reference, including any that a slow
    /// callback caused to be skipped.
    pub boundary: u64,
}

#[derive(Debug, Clone, Copy)]
struct Arming {
    reference_ms: u64,
    interval_ms: u64,
    deadline_ms: u64,
}

#[derive(Debug, Default)]
struct PumpState {
    arming: Option<Arming>,
    delivering: bool,
    quit: bool,
    // set once the pump thread is gone, however it left
    exited: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<PumpState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PumpState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, PumpState>) -> MutexGuard<'a, PumpState> {
        self.wake.wait(guard).unwrap_or_else(|e| e.into_inner())
    }
}

pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl Scheduler {
    /// Starts the pump thread. It idles until [`Scheduler::arm`].
    pub fn spawn<F>(clock: Arc<dyn Clock>, on_tick: F) -> Self
    where
        F: FnMut(Tick) + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let pump_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("stopwatch-pump".into())
            .spawn(move || pump_thread(pump_shared, clock, on_tick))
            .expect("can't spawn pump thread");
        let worker_id = worker.thread().id();
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
            worker_id,
        }
    }

    /// Schedules the first firing `interval_ms` after `reference_ms`, which
    /// may already be in the past. Replaces any previous arming.
    pub fn arm(&self, reference_ms: u64, interval_ms: u64) {
        debug_assert!(interval_ms > 0);
        let mut pump = self.shared.lock();
        pump.arming = Some(Arming {
            reference_ms,
            interval_ms,
            deadline_ms: reference_ms.saturating_add(interval_ms),
        });
        self.shared.wake.notify_all();
    }

    /// Moves the boundary grid to a new reference without disarming.
    pub fn rebase(&self, reference_ms: u64) {
        let mut pump = self.shared.lock();
        if let Some(arming) = pump.arming.as_mut() {
            arming.reference_ms = reference_ms;
            arming.deadline_ms = reference_ms.saturating_add(arming.interval_ms);
            self.shared.wake.notify_all();
        }
    }

    /// Cancels the pending firing. Once this returns no tick is delivered
    /// until the next `arm`. Waits for a delivery running on another thread;
    /// from inside a tick callback it returns immediately.
    pub fn disarm(&self) {
        let mut pump = self.shared.lock();
        pump.arming = None;
        self.shared.wake.notify_all();
        if !self.on_worker() {
            while pump.delivering && !pump.exited {
                pump = self.shared.wait(pump);
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock().arming.is_some()
    }

    /// Disarms and stops the pump thread. Idempotent.
    pub fn shutdown(&self) {
        self.disarm();
        {
            let mut pump = self.shared.lock();
            pump.quit = true;
            self.shared.wake.notify_all();
        }
        if self.on_worker() {
            // the loop sees `quit` once the current callback returns
            return;
        }
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("pump thread panicked");
            }
        }
    }

    fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Marks the pump as gone when its thread ends, unwinding included, so
/// `disarm` never waits on a delivery that cannot finish.
struct ExitGuard<'a>(&'a Shared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        let mut pump = self.0.lock();
        pump.delivering = false;
        pump.exited = true;
        self.0.wake.notify_all();
    }
}

fn pump_thread<F: FnMut(Tick)>(shared: Arc<Shared>, clock: Arc<dyn Clock>, mut on_tick: F) {
    log::debug!("pump thread started");
    let _exit = ExitGuard(&shared);
    let mut pump = shared.lock();

    loop {
        if pump.quit {
            break;
        }
        let Some(mut arming) = pump.arming else {
            // Block-wait while disarmed
            pump = shared.wait(pump);
            continue;
        };

        let now = clock.now_ms();
        if now < arming.deadline_ms {
            let hint = clock.wait_hint(arming.deadline_ms);
            pump = shared
                .wake
                .wait_timeout(pump, hint)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
            continue;
        }

        let boundary = boundaries_crossed(arming.reference_ms, arming.interval_ms, now);
        let due = boundaries_crossed(arming.reference_ms, arming.interval_ms, arming.deadline_ms);
        if boundary > due {
            log::warn!(
                "tick callback overran; {} boundaries collapsed into one tick",
                boundary - due
            );
        }
        arming.deadline_ms = next_boundary_after(arming.reference_ms, arming.interval_ms, now);
        pump.arming = Some(arming);
        pump.delivering = true;
        drop(pump);

        let tick = Tick {
            now_ms: now,
            reference_ms: arming.reference_ms,
            since_reference_ms: now.saturating_sub(arming.reference_ms),
            boundary,
        };
        log::trace!("tick {:?}", tick);
        if panic::catch_unwind(AssertUnwindSafe(|| on_tick(tick))).is_err() {
            log::error!("tick callback panicked at {} ms; pump keeps running", now);
        }

        pump = shared.lock();
        pump.delivering = false;
        shared.wake.notify_all();
    }

    log::debug!("pump thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use stopwatch_core::ManualClock;

    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(50);

    fn pump(clock: &Arc<ManualClock>) -> (Scheduler, mpsc::Receiver<Tick>) {
        let (tx, rx) = mpsc::channel();
        let scheduler = Scheduler::spawn(clock.clone(), move |tick| {
            tx.send(tick).ok();
        });
        (scheduler, rx)
    }

    #[test]
    fn test_fires_on_boundaries() {
        let clock = Arc::new(ManualClock::new(0));
        let (scheduler, rx) = pump(&clock);
        scheduler.arm(0, 10);
        assert!(rx.recv_timeout(QUIET).is_err());

        clock.set(10);
        let tick = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(tick.since_reference_ms, 10);
        assert_eq!(tick.boundary, 1);

        clock.set(19);
        assert!(rx.recv_timeout(QUIET).is_err());
        clock.set(20);
        assert_eq!(rx.recv_timeout(WAIT).unwrap().boundary, 2);
    }

    #[test]
    fn test_reference_in_the_past() {
        let clock = Arc::new(ManualClock::new(1005));
        let (scheduler, rx) = pump(&clock);
        scheduler.arm(1000, 10);
        clock.set(1010);
        let tick = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(tick.reference_ms, 1000);
        assert_eq!(tick.since_reference_ms, 10);
    }

    #[test]
    fn test_slow_callback_does_not_drift() {
        let clock = Arc::new(ManualClock::new(0));
        let (tx, rx) = mpsc::channel();
        let callback_clock = clock.clone();
        let mut calls = 0;
        let scheduler = Scheduler::spawn(clock.clone(), move |tick| {
            calls += 1;
            if calls == 1 {
                // blocks for five intervals
                callback_clock.advance(50);
            }
            tx.send(tick).ok();
        });
        scheduler.arm(0, 10);

        clock.set(10);
        let first = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(first.since_reference_ms, 10);

        let second = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(second.since_reference_ms, 60);
        assert_eq!(second.boundary, 6);

        // back on the grid: next firing at 70, not 60 + 10 from callback return
        clock.set(69);
        assert!(rx.recv_timeout(QUIET).is_err());
        clock.set(70);
        assert_eq!(rx.recv_timeout(WAIT).unwrap().since_reference_ms, 70);
    }

    #[test]
    fn test_disarm_is_final() {
        let clock = Arc::new(ManualClock::new(0));
        let (scheduler, rx) = pump(&clock);
        scheduler.arm(0, 10);
        assert!(scheduler.is_armed());
        scheduler.disarm();
        assert!(!scheduler.is_armed());
        clock.set(100);
        assert!(rx.recv_timeout(QUIET).is_err());

        // disarming twice is fine
        scheduler.disarm();
    }

    #[test]
    fn test_rearm_restarts_grid() {
        let clock = Arc::new(ManualClock::new(0));
        let (scheduler, rx) = pump(&clock);
        scheduler.arm(0, 1000);
        clock.set(1000);
        assert_eq!(rx.recv_timeout(WAIT).unwrap().boundary, 1);
        scheduler.disarm();

        clock.set(3500);
        scheduler.arm(3500, 1000);
        clock.set(4499);
        assert!(rx.recv_timeout(QUIET).is_err());
        clock.set(4500);
        let tick = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(tick.boundary, 1);
        assert_eq!(tick.since_reference_ms, 1000);
    }

    #[test]
    fn test_rebase_moves_grid() {
        let clock = Arc::new(ManualClock::new(0));
        let (scheduler, rx) = pump(&clock);
        scheduler.arm(0, 100);
        clock.set(50);
        scheduler.rebase(50);
        clock.set(100);
        assert!(rx.recv_timeout(QUIET).is_err());
        clock.set(150);
        let tick = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(tick.reference_ms, 50);
        assert_eq!(tick.since_reference_ms, 100);
    }

    #[test]
    fn test_disarm_from_callback() {
        let clock = Arc::new(ManualClock::new(0));
        let slot: Arc<Mutex<Option<Arc<Scheduler>>>> = Arc::new(Mutex::new(None));
        let cb_slot = slot.clone();
        let (tx, rx) = mpsc::channel();
        let scheduler = Arc::new(Scheduler::spawn(clock.clone(), move |tick| {
            if let Some(s) = cb_slot.lock().unwrap().as_ref() {
                s.disarm();
            }
            tx.send(tick).ok();
        }));
        *slot.lock().unwrap() = Some(scheduler.clone());

        scheduler.arm(0, 10);
        clock.set(10);
        assert!(rx.recv_timeout(WAIT).is_ok());
        clock.set(20);
        assert!(rx.recv_timeout(QUIET).is_err());
        assert!(!scheduler.is_armed());

        slot.lock().unwrap().take();
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let clock = Arc::new(ManualClock::new(5));
        let (scheduler, rx) = pump(&clock);
        scheduler.arm(5, u64::MAX);
        scheduler.rebase(7);
        assert!(scheduler.is_armed());
        clock.set(1_000_000);
        assert!(rx.recv_timeout(QUIET).is_err());
        scheduler.disarm();
    }

    #[test]
    fn test_panicking_callback_keeps_pump_alive() {
        let clock = Arc::new(ManualClock::new(0));
        let (tx, rx) = mpsc::channel();
        let mut calls = 0;
        let scheduler = Scheduler::spawn(clock.clone(), move |_| {
            calls += 1;
            tx.send(calls).ok();
            if calls == 1 {
                panic!("listener bug");
            }
        });
        scheduler.arm(0, 10);
        clock.set(10);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
        clock.set(20);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
        scheduler.disarm();
        scheduler.shutdown();
    }

    #[test]
    fn test_disarm_waits_for_delivery_in_flight() {
        let clock = Arc::new(ManualClock::new(0));
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel::<()>();
        let scheduler = Arc::new(Scheduler::spawn(clock.clone(), move |tick| {
            entered_tx.send(tick).ok();
            release_rx.recv().ok();
        }));
        scheduler.arm(0, 10);
        clock.set(10);
        assert_eq!(entered.recv_timeout(WAIT).unwrap().boundary, 1);

        let (done_tx, done) = mpsc::channel();
        let disarming = scheduler.clone();
        let helper = thread::spawn(move || {
            disarming.disarm();
            done_tx.send(()).ok();
        });
        // still blocked inside the callback
        assert!(done.recv_timeout(QUIET).is_err());

        release.send(()).unwrap();
        assert!(done.recv_timeout(WAIT).is_ok());
        helper.join().unwrap();

        clock.set(100);
        assert!(entered.recv_timeout(QUIET).is_err());
        drop(release);
    }

    #[test]
    fn test_shutdown_joins() {
        let clock = Arc::new(ManualClock::new(0));
        let (scheduler, rx) = pump(&clock);
        scheduler.arm(0, 10);
        scheduler.shutdown();
        scheduler.shutdown();
        clock.set(10);
        assert!(rx.recv_timeout(QUIET).is_err());
    }
}
