//! Transfer progress reporting
//!
//! The streaming code only knows about [`ProgressObserver`]. Rendering lives
//! in [`TerminalProgress`], which draws indicatif bars in the same style as
//! the rest of the console output.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Standard spinner characters
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard tick interval for spinners
const TICK_INTERVAL_MS: u64 = 80;

const SPINNER_TEMPLATE: &str = "     {spinner:.cyan} {msg}";
const BYTES_TEMPLATE: &str = "     {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({eta})";

/// Receives byte counts while a blob is being transferred.
pub trait ProgressObserver {
    /// A transfer is starting. `total` is the declared body size, if any.
    fn start(&mut self, label: &str, total: Option<u64>);

    /// `transferred` bytes have been written so far.
    fn advance(&mut self, transferred: u64);

    /// The transfer ended, successfully or not.
    fn finish(&mut self);
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl ProgressObserver for Silent {
    fn start(&mut self, _label: &str, _total: Option<u64>) {}
    fn advance(&mut self, _transferred: u64) {}
    fn finish(&mut self) {}
}

/// Observer that renders a spinner, upgraded to a byte bar when the
/// content length is known.
#[derive(Default)]
pub struct TerminalProgress {
    bar: Option<ProgressBar>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressObserver for TerminalProgress {
    fn start(&mut self, label: &str, total: Option<u64>) {
        if let Some(old) = self.bar.take() {
            old.finish_and_clear();
        }
        let bar = match total {
            Some(len) => byte_bar(len),
            None => spinner(),
        };
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(TICK_INTERVAL_MS));
        self.bar = Some(bar);
    }

    fn advance(&mut self, transferred: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(transferred);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
        pb.set_style(style.tick_chars(SPINNER_CHARS));
    }
    pb
}

fn byte_bar(total_bytes: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_bytes);
    if let Ok(style) = ProgressStyle::default_bar().template(BYTES_TEMPLATE) {
        pb.set_style(style.progress_chars("━╸━"));
    }
    pb
}
