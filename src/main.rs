mod ui;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use num_traits::{FromPrimitive, ToPrimitive};
use stopwatch::logging::{init_logging, LoggingConfig};
use stopwatch::{Config, ConfigError, Stopwatch, StopwatchError, StopwatchSlot};
use thiserror::Error;

#[derive(Debug, num_derive::FromPrimitive, num_derive::ToPrimitive)]
enum AppOp {
    Redraw = 0,
    Rawkeys,
    Tick,
    Quit,
}

/// Scalar message on the host loop: an opcode and one argument.
#[derive(Debug, Clone, Copy)]
struct Message {
    id: usize,
    arg: u64,
}

impl Message {
    fn new(op: AppOp, arg: u64) -> Self {
        Self {
            id: op.to_usize().unwrap_or(usize::MAX),
            arg,
        }
    }
}

#[derive(Debug, Error)]
enum HostError {
    #[error("can't read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stopwatch(#[from] StopwatchError),
}

struct StopwatchApp {
    slot: StopwatchSlot,
    stopwatch: Stopwatch,
    allow_redraw: bool,
}

impl StopwatchApp {
    fn new(config: Config, conn: Sender<Message>) -> Result<Self, HostError> {
        let mut slot = StopwatchSlot::new();
        let stopwatch = slot.init(config)?;
        stopwatch.register_listener(move |elapsed| {
            conn.send(Message::new(AppOp::Tick, elapsed)).ok();
        })?;
        Ok(Self {
            slot,
            stopwatch,
            allow_redraw: true,
        })
    }

    fn redraw(&self) -> Result<(), StopwatchError> {
        if !self.allow_redraw {
            return Ok(());
        }
        ui::draw_stopwatch(&mut io::stdout(), &self.stopwatch)
    }

    /// Returns false when the app should quit.
    fn handle_key(&self, key: char) -> Result<bool, StopwatchError> {
        match key {
            '\n' | ' ' => self.stopwatch.toggle()?,
            's' => self.stopwatch.start()?,
            'p' => self.stopwatch.stop()?,
            'r' => self.stopwatch.reset()?,
            't' => {
                ui::draw_elapsed(&mut io::stdout(), self.stopwatch.get_time()?).ok();
            }
            'h' => {
                ui::draw_help(&mut io::stdout()).ok();
            }
            'q' => return Ok(false),
            other => log::debug!("ignoring key {:?}", other),
        }
        self.redraw()?;
        Ok(true)
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, HostError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let json = std::fs::read_to_string(&path)
        .map_err(|source| HostError::ReadConfig { path: path.clone(), source })?;
    let config = Config::from_json(&json)?;
    log::info!("loaded config from {}", path.display());
    Ok(config)
}

/// Forwards stdin to the host loop. Each line is a run of keys; an empty
/// line is a bare Enter.
fn input_thread(conn: Sender<Message>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let keys: Vec<char> = if line.is_empty() {
            vec!['\n']
        } else {
            line.chars().collect()
        };
        for key in keys {
            if conn.send(Message::new(AppOp::Rawkeys, key as u64)).is_err() {
                return;
            }
        }
    }
    conn.send(Message::new(AppOp::Quit, 0)).ok();
}

fn run(inbox: Receiver<Message>, mut app: StopwatchApp) -> Result<(), HostError> {
    ui::draw_help(&mut io::stdout()).ok();

    while let Ok(msg) = inbox.recv() {
        match FromPrimitive::from_usize(msg.id) {
            Some(AppOp::Redraw) => app.redraw()?,
            Some(AppOp::Rawkeys) => {
                let key = char::from_u32(msg.arg as u32).unwrap_or('\u{0000}');
                if key != '\u{0000}' && !app.handle_key(key)? {
                    break;
                }
            }
            Some(AppOp::Tick) => {
                log::trace!("tick at {} ms", msg.arg);
                app.redraw()?;
            }
            Some(AppOp::Quit) => break,
            None => log::error!("unknown opcode: {:?}", msg),
        }
    }

    // Clean up
    app.allow_redraw = false;
    app.slot.destroy()?;
    println!();
    Ok(())
}

fn main() {
    init_logging(LoggingConfig::default());
    log::info!("stopwatch PID is {}", std::process::id());

    let config = match load_config(std::env::args_os().nth(1).map(PathBuf::from)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let (conn, inbox) = mpsc::channel();
    let app = match StopwatchApp::new(config, conn.clone()) {
        Ok(app) => app,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    conn.send(Message::new(AppOp::Redraw, 0)).ok();
    std::thread::spawn(move || input_thread(conn));

    if let Err(e) = run(inbox, app) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
