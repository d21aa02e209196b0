// Progress reporting for chunked transfers. The transport calls into a
// `Progress` observer once per chunk; the binary picks either terminal
// bars (indicatif) or log lines.

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use log::info;
use std::cell::RefCell;

/// Direction of a transfer, used for labels only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    fn verb(&self) -> &'static str {
        match self {
            Direction::Upload => "Uploading",
            Direction::Download => "Downloading",
        }
    }
}

pub trait Progress {
    fn start(&self, direction: Direction, name: &str, total: Option<u64>);
    fn advance(&self, transferred: u64);
    fn finish(&self);
}

/// Discards all events.
pub struct Silent;

impl Progress for Silent {
    fn start(&self, _: Direction, _: &str, _: Option<u64>) {}
    fn advance(&self, _: u64) {}
    fn finish(&self) {}
}

#[derive(Default)]
struct LogState {
    direction: Option<Direction>,
    total: Option<u64>,
    transferred: u64,
}

/// Writes one log line per chunk, e.g.
/// `Uploading file: 42.00% (4.20 MiB / 10.00 MiB)`.
#[derive(Default)]
pub struct LogProgress {
    state: RefCell<LogState>,
}

impl Progress for LogProgress {
    fn start(&self, direction: Direction, _name: &str, total: Option<u64>) {
        *self.state.borrow_mut() = LogState {
            direction: Some(direction),
            total,
            transferred: 0,
        };
    }

    fn advance(&self, transferred: u64) {
        let mut state = self.state.borrow_mut();
        state.transferred = transferred;
        let verb = state.direction.map(|d| d.verb()).unwrap_or("Transferring");
        match state.total {
            Some(total) if total > 0 => info!(
                "{} file: {:.2}% ({} / {})",
                verb,
                transferred as f64 * 100.0 / total as f64,
                HumanBytes(transferred),
                HumanBytes(total)
            ),
            _ => info!("{} file: {}", verb, HumanBytes(transferred)),
        }
    }

    fn finish(&self) {
        let state = self.state.borrow();
        if let Some(direction) = state.direction {
            let total = state.total.unwrap_or(state.transferred);
            info!(
                "{} file: 100.00% ({} / {})",
                direction.verb(),
                HumanBytes(state.transferred.max(total)),
                HumanBytes(total)
            );
        }
    }
}

/// Terminal progress bar, one per file.
#[derive(Default)]
pub struct BarProgress {
    bar: RefCell<Option<ProgressBar>>,
}

impl Progress for BarProgress {
    fn start(&self, direction: Direction, name: &str, total: Option<u64>) {
        let bar = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner} {msg} {bytes}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(format!("{} {}", direction.verb(), name));
        if let Some(old) = self.bar.borrow_mut().replace(bar) {
            old.finish_and_clear();
        }
    }

    fn advance(&self, transferred: u64) {
        if let Some(bar) = self.bar.borrow().as_ref() {
            bar.set_position(transferred);
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.finish();
        }
    }
}

/// Pick bars for an interactive terminal, log lines otherwise.
pub fn for_terminal(interactive: bool) -> Box<dyn Progress> {
    if interactive {
        Box::new(BarProgress::default())
    } else {
        Box::new(LogProgress::default())
    }
}
