//! Stopwatch engine: pause/resume accounting from `stopwatch-core`, a pump
//! thread that ticks on absolute boundaries, and per-instance listeners.
//!
//! ```no_run
//! use stopwatch::{Config, Stopwatch};
//!
//! let sw = Stopwatch::new(Config::default().with_update_interval(100))?;
//! let display = sw.downgrade();
//! sw.register_listener(move |_elapsed| {
//!     if let Some(text) = display.upgrade().and_then(|sw| sw.render().ok()) {
//!         println!("{}", text);
//!     }
//! })?;
//! sw.start()?;
//! # Ok::<(), stopwatch::StopwatchError>(())
//! ```

pub mod listeners;
pub mod logging;
pub mod scheduler;
mod stopwatch;

pub use crate::listeners::{ListenerId, TickListeners};
pub use crate::scheduler::{Scheduler, Tick};
pub use crate::stopwatch::{Snapshot, Stopwatch, StopwatchSlot, WeakStopwatch};
pub use stopwatch_core::{
    Clock, Config, ConfigError, Format, FormatError, ManualClock, StopwatchError, SystemClock,
    TimingState, DEFAULT_FORMAT, DEFAULT_UPDATE_INTERVAL_MS,
};
