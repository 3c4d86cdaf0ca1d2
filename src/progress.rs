//! # Console Progress Module
//!
//! Progress bar con `indicatif`, agganciata alla pipeline come observer.
//!
//! ## Responsabilità:
//! - La lunghezza della barra cresce con `Discovered` (la scansione è lazy)
//! - Avanza di uno per ogni `Finished`, con messaggio di stato e ETA
//! - Spinner per operazioni indeterminate (es. `restore`)
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [=======================>----------------] 150/260 (57%) [OK] wall.png | ETA 1m 12s
//! ```

use crate::pipeline::{ProgressEvent, ProgressObserver};
use crate::task::TaskStatus;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Terminal progress bar driven by pipeline events
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    /// Create a new progress manager; the length grows as tasks are discovered
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);

        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Bar that never draws, for JSON mode and tests. Unlike
    /// `ProgressBar::hidden()` it has a length, so it still counts.
    pub fn hidden() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_draw_target(ProgressDrawTarget::hidden());
        Self { bar }
    }

    /// Set a custom message without incrementing
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

impl ProgressObserver for ProgressManager {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Discovered { .. } => self.bar.inc_length(1),
            ProgressEvent::Finished {
                path,
                status,
                snapshot,
            } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let tag = match status {
                    TaskStatus::Succeeded => "[OK]",
                    TaskStatus::Failed(_) => "[ERROR]",
                    _ => "[SKIP]",
                };
                let mut message = format!("{} {}", tag, name);
                if let Some(eta) = snapshot.estimated_remaining {
                    message.push_str(&format!(" | ETA {}", format_eta(eta)));
                }
                self.bar.inc(1);
                self.bar.set_message(message);
            }
            ProgressEvent::ScanComplete { discovered, .. } => {
                self.bar.set_length(*discovered as u64);
            }
            ProgressEvent::StageChanged { .. } => {}
        }
    }
}
