use std::io::{self, Write};

use stopwatch::{Stopwatch, StopwatchError};

pub const HELP_TEXT: &str = "\
STOPWATCH
  Enter/space  start or stop
  s            start
  p            stop
  r            reset
  t            print elapsed milliseconds
  h            this help
  q            quit
(type a key, then press Enter)";

pub fn draw_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{}", HELP_TEXT)
}

/// Rewrites the status line in place.
pub fn draw_stopwatch(out: &mut impl Write, sw: &Stopwatch) -> Result<(), StopwatchError> {
    let time_str = sw.render()?;
    let status = if sw.is_active()? { "running" } else { "stopped" };
    write!(out, "\r  {}  [{}]   ", time_str, status).ok();
    out.flush().ok();
    Ok(())
}

pub fn draw_elapsed(out: &mut impl Write, elapsed_ms: u64) -> io::Result<()> {
    writeln!(out, "\n  elapsed: {} ms", elapsed_ms)
}
