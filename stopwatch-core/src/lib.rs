//! Pure timing logic library with no platform dependencies.
//! Testable on host; the pump thread that fires ticks lives in `stopwatch`.

mod clock;
mod config;
mod error;
mod format;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, DEFAULT_UPDATE_INTERVAL_MS};
pub use error::{ConfigError, FormatError, StopwatchError};
pub use format::{Format, DEFAULT_FORMAT};

/// Accounting record for one stopwatch.
///
/// While stopped, `elapsed_ms` is authoritative. While running, the live
/// value is `banked + (now - activated_at)`; `elapsed_ms` only catches up
/// when a tick is observed or the stopwatch stops.
#[derive(Debug, Clone)]
pub struct TimingState {
    update_interval_ms: u64,
    start_offset_ms: u64,
    format: Format,
    active: bool,
    // accumulated before the current activation
    banked_ms: u64,
    elapsed_ms: u64,
    activated_at_ms: u64,
}

impl TimingState {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let format = config.validate()?;
        Ok(Self {
            update_interval_ms: config.update_interval,
            start_offset_ms: config.start_offset,
            format,
            active: false,
            banked_ms: config.start_offset,
            elapsed_ms: config.start_offset,
            activated_at_ms: 0,
        })
    }

    pub fn update_interval_ms(&self) -> u64 {
        self.update_interval_ms
    }

    pub fn start_offset_ms(&self) -> u64 {
        self.start_offset_ms
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stored elapsed value, as of the last tick, stop or reset.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Activation reference while running.
    pub fn activated_at_ms(&self) -> Option<u64> {
        self.active.then_some(self.activated_at_ms)
    }

    /// Returns false if already running.
    pub fn start(&mut self, now_ms: u64) -> bool {
        if self.active {
            return false;
        }
        self.banked_ms = self.elapsed_ms;
        self.activated_at_ms = now_ms;
        self.active = true;
        true
    }

    /// Freezes elapsed at `now_ms`. Returns false if already stopped.
    pub fn stop(&mut self, now_ms: u64) -> bool {
        if !self.active {
            return false;
        }
        self.elapsed_ms = self.current_ms(now_ms);
        self.banked_ms = self.elapsed_ms;
        self.active = false;
        true
    }

    /// Returns the new activity.
    pub fn toggle(&mut self, now_ms: u64) -> bool {
        if self.active {
            self.stop(now_ms);
        } else {
            self.start(now_ms);
        }
        self.active
    }

    /// Restores the start offset. A running stopwatch keeps running from
    /// the offset, re-anchored at `now_ms`.
    pub fn reset(&mut self, now_ms: u64) {
        self.banked_ms = self.start_offset_ms;
        self.elapsed_ms = self.start_offset_ms;
        if self.active {
            self.activated_at_ms = now_ms;
        }
    }

    /// Authoritative elapsed time at `now_ms`. Does not mutate.
    pub fn current_ms(&self, now_ms: u64) -> u64 {
        if self.active {
            self.banked_ms
                .saturating_add(now_ms.saturating_sub(self.activated_at_ms))
        } else {
            self.elapsed_ms
        }
    }

    /// Tick bookkeeping: stores and returns the live value.
    pub fn observe(&mut self, now_ms: u64) -> u64 {
        self.elapsed_ms = self.current_ms(now_ms);
        self.elapsed_ms
    }

    pub fn render(&self, now_ms: u64) -> String {
        self.format.render(self.current_ms(now_ms))
    }
}

/// Whole intervals between `reference_ms` and `now_ms`.
pub fn boundaries_crossed(reference_ms: u64, interval_ms: u64, now_ms: u64) -> u64 {
    now_ms.saturating_sub(reference_ms) / interval_ms
}

/// First boundary strictly after `now_ms`, measured from `reference_ms`.
/// Boundaries are absolute, so a late caller never shifts the grid.
/// Saturates at `u64::MAX` rather than wrapping.
pub fn next_boundary_after(reference_ms: u64, interval_ms: u64, now_ms: u64) -> u64 {
    let crossed = boundaries_crossed(reference_ms, interval_ms, now_ms);
    reference_ms.saturating_add(interval_ms.saturating_mul(crossed.saturating_add(1)))
}
