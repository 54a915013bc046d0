use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use stopwatch_core::{Clock, Config, StopwatchError, SystemClock, TimingState};

use crate::listeners::{ListenerId, TickListeners};
use crate::scheduler::{Scheduler, Tick};

/// Point-in-time copy of a stopwatch's configuration and accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub update_interval_ms: u64,
    pub start_offset_ms: u64,
    /// Stored value; see [`Stopwatch::elapsed_ms`].
    pub elapsed_ms: u64,
    pub active: bool,
    pub format: String,
}

struct Inner {
    clock: Arc<dyn Clock>,
    // None once destroyed
    state: Mutex<Option<TimingState>>,
    listeners: TickListeners,
    scheduler: Scheduler,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, Option<TimingState>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_tick(&self, tick: Tick) {
        let mut state = self.lock_state();
        let elapsed = match state.as_mut() {
            Some(timing) if timing.is_active() => timing.observe(tick.now_ms),
            _ => return,
        };
        // listeners may call back into the stopwatch
        drop(state);
        self.listeners.notify(elapsed);
    }
}

/// Handle to one stopwatch. Clones share the same instance.
///
/// Every operation on a destroyed instance fails with
/// [`StopwatchError::Destroyed`].
#[derive(Clone)]
pub struct Stopwatch {
    inner: Arc<Inner>,
}

impl Stopwatch {
    /// Creates a stopwatch on the system clock.
    pub fn new(config: Config) -> Result<Self, StopwatchError> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self, StopwatchError> {
        let state = TimingState::new(&config)?;
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let scheduler = Scheduler::spawn(clock.clone(), move |tick| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_tick(tick);
                }
            });
            Inner {
                clock,
                state: Mutex::new(Some(state)),
                listeners: TickListeners::default(),
                scheduler,
            }
        });
        log::info!(
            "stopwatch created: interval {} ms, offset {} ms, format {:?}",
            config.update_interval,
            config.start_offset,
            config.format
        );
        Ok(Self { inner })
    }

    /// True if both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Stopwatch) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Non-owning handle, for listeners that call back into this stopwatch.
    pub fn downgrade(&self) -> WeakStopwatch {
        WeakStopwatch {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn with_state<R>(
        &self,
        f: impl FnOnce(&mut TimingState, u64) -> R,
    ) -> Result<R, StopwatchError> {
        let mut state = self.inner.lock_state();
        let state = state.as_mut().ok_or(StopwatchError::Destroyed)?;
        let now = self.inner.clock.now_ms();
        Ok(f(state, now))
    }

    /// Starts counting and arms the pump. No-op if already running.
    pub fn start(&self) -> Result<(), StopwatchError> {
        self.with_state(|state, now| {
            if state.start(now) {
                self.inner.scheduler.arm(now, state.update_interval_ms());
                log::debug!("started at {} ms, elapsed {} ms", now, state.elapsed_ms());
            }
        })
    }

    /// Freezes elapsed at this instant. No-op if already stopped.
    pub fn stop(&self) -> Result<(), StopwatchError> {
        if !self.is_active()? {
            return Ok(());
        }
        // Disarm first so a tick in flight cannot land after the freeze.
        // The state lock must not be held here: the delivery takes it.
        self.inner.scheduler.disarm();
        self.with_state(|state, now| {
            if state.stop(now) {
                log::debug!("stopped at {} ms, elapsed {} ms", now, state.elapsed_ms());
            }
        })
    }

    pub fn toggle(&self) -> Result<(), StopwatchError> {
        if self.is_active()? {
            self.stop()
        } else {
            self.start()
        }
    }

    /// Restores the start offset. A running stopwatch keeps running and
    /// its tick boundaries realign to the reset instant.
    pub fn reset(&self) -> Result<(), StopwatchError> {
        self.with_state(|state, now| {
            state.reset(now);
            if state.is_active() {
                self.inner.scheduler.rebase(now);
            }
            log::debug!("reset to {} ms", state.start_offset_ms());
        })
    }

    /// Authoritative elapsed milliseconds right now.
    pub fn get_time(&self) -> Result<u64, StopwatchError> {
        self.with_state(|state, now| state.current_ms(now))
    }

    /// `get_time` run through the configured format.
    pub fn render(&self) -> Result<String, StopwatchError> {
        self.with_state(|state, now| state.render(now))
    }

    /// Stored elapsed value. Exact while stopped; while running it lags
    /// [`Stopwatch::get_time`] until the next tick.
    pub fn elapsed_ms(&self) -> Result<u64, StopwatchError> {
        self.with_state(|state, _| state.elapsed_ms())
    }

    pub fn is_active(&self) -> Result<bool, StopwatchError> {
        self.with_state(|state, _| state.is_active())
    }

    pub fn snapshot(&self) -> Result<Snapshot, StopwatchError> {
        self.with_state(|state, _| Snapshot {
            update_interval_ms: state.update_interval_ms(),
            start_offset_ms: state.start_offset_ms(),
            elapsed_ms: state.elapsed_ms(),
            active: state.is_active(),
            format: state.format().source().to_string(),
        })
    }

    /// Registers a tick listener. It receives the elapsed milliseconds and
    /// may call back into this stopwatch.
    ///
    /// A listener that captures a `Stopwatch` clone keeps the instance and
    /// its pump thread alive until [`Stopwatch::destroy`]. Capture a
    /// [`WeakStopwatch`] instead to let dropping the last handle clean up.
    pub fn register_listener<F>(&self, listener: F) -> Result<ListenerId, StopwatchError>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.with_state(|_, _| ())?;
        Ok(self.inner.listeners.register(listener))
    }

    /// `Ok(false)` if the listener was not registered.
    pub fn unregister_listener(&self, id: ListenerId) -> Result<bool, StopwatchError> {
        self.with_state(|_, _| ())?;
        Ok(self.inner.listeners.unregister(id))
    }

    /// Stops the pump and discards the state. No tick is delivered after
    /// this returns.
    pub fn destroy(&self) -> Result<(), StopwatchError> {
        if self.inner.lock_state().is_none() {
            return Err(StopwatchError::Destroyed);
        }
        self.inner.scheduler.shutdown();
        self.inner.lock_state().take();
        // listeners may hold handles to this instance
        self.inner.listeners.clear();
        log::info!("stopwatch destroyed");
        Ok(())
    }
}

impl fmt::Debug for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stopwatch")
            .field("state", &*self.inner.lock_state())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

/// Handle from [`Stopwatch::downgrade`] that does not keep the instance
/// alive.
#[derive(Clone)]
pub struct WeakStopwatch {
    inner: Weak<Inner>,
}

impl WeakStopwatch {
    /// `None` once every `Stopwatch` handle has been dropped.
    pub fn upgrade(&self) -> Option<Stopwatch> {
        self.inner.upgrade().map(|inner| Stopwatch { inner })
    }
}

impl fmt::Debug for WeakStopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStopwatch")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Host-side storage for at most one stopwatch, giving `init` its
/// get-or-create behaviour.
#[derive(Default)]
pub struct StopwatchSlot {
    clock: Option<Arc<dyn Clock>>,
    current: Option<Stopwatch>,
}

impl StopwatchSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stopwatches created by this slot read `clock` instead of the
    /// system clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock: Some(clock),
            current: None,
        }
    }

    /// Returns the attached stopwatch, creating it from `config` if there
    /// is none. An existing stopwatch is returned unchanged and `config`
    /// is ignored.
    pub fn init(&mut self, config: Config) -> Result<Stopwatch, StopwatchError> {
        if let Some(existing) = &self.current {
            return Ok(existing.clone());
        }
        let clock = self
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let stopwatch = Stopwatch::with_clock(config, clock)?;
        self.current = Some(stopwatch.clone());
        Ok(stopwatch)
    }

    pub fn get(&self) -> Option<&Stopwatch> {
        self.current.as_ref()
    }

    /// Destroys and detaches the stopwatch.
    pub fn destroy(&mut self) -> Result<(), StopwatchError> {
        self.current
            .take()
            .ok_or(StopwatchError::Uninitialized)?
            .destroy()
    }
}
