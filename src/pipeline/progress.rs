//! # Progress Aggregator
//!
//! Contatori thread-safe condivisi da discovery e worker.
//!
//! ## Responsabilità:
//! - `record()` una sola volta per task, alla transizione terminale
//! - Media mobile esponenziale (alpha 0.2) dell'intervallo tra completamenti,
//!   da cui si stima il tempo residuo: `ema * (discovered - done)`
//! - `snapshot()` consistente, con contatori mai decrescenti
//! - Eventi push verso i `ProgressObserver` registrati, in ordine
//!
//! Gli observer vengono chiamati fuori dal lock dei contatori, quindi
//! possono chiamare `snapshot()` senza deadlock.

use crate::task::{Reason, Task, TaskStatus};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::warn;

const EMA_ALPHA: f64 = 0.2;

/// Point-in-time view of the run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub discovered: usize,
    pub scan_complete: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub elapsed: Duration,
    pub estimated_remaining: Option<Duration>,
}

impl ProgressSnapshot {
    /// Tasks in a terminal state
    pub fn done(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Discovered but not yet terminal
    pub fn pending(&self) -> usize {
        self.discovered.saturating_sub(self.done())
    }

    pub fn percent(&self) -> f64 {
        if self.discovered == 0 {
            0.0
        } else {
            self.done() as f64 / self.discovered as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Discovered {
        path: PathBuf,
        index: usize,
    },
    StageChanged {
        path: PathBuf,
        status: TaskStatus,
    },
    Finished {
        path: PathBuf,
        status: TaskStatus,
        snapshot: ProgressSnapshot,
    },
    ScanComplete {
        discovered: usize,
        up_to_date: usize,
        unreadable: usize,
    },
}

/// Push interface for progress events
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// A failed or skipped source with its reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskIssue {
    pub path: PathBuf,
    pub reason: Reason,
}

#[derive(Debug, Default)]
struct Counters {
    discovered: usize,
    scan_complete: bool,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    in_flight: HashSet<usize>,
    peak_in_flight: usize,
    started: Option<Instant>,
    last_completion: Option<Instant>,
    ema_interval: Option<f64>,
    failures: Vec<TaskIssue>,
    skips: Vec<TaskIssue>,
}

struct Inner {
    created: Instant,
    counters: Mutex<Counters>,
    observers: RwLock<Vec<Arc<dyn ProgressObserver>>>,
    // serializes event delivery so observers see events in counter order
    dispatch: Mutex<()>,
}

/// Shared handle; clones observe the same run
#[derive(Clone)]
pub struct ProgressAggregator {
    inner: Arc<Inner>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                created: Instant::now(),
                counters: Mutex::new(Counters::default()),
                observers: RwLock::new(Vec::new()),
                dispatch: Mutex::new(()),
            }),
        }
    }

    pub fn subscribe(&self, observer: impl ProgressObserver + 'static) {
        self.subscribe_arc(Arc::new(observer));
    }

    pub fn subscribe_arc(&self, observer: Arc<dyn ProgressObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.inner
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch_guard(&self) -> MutexGuard<'_, ()> {
        self.inner
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ProgressEvent) {
        let observers: Vec<Arc<dyn ProgressObserver>> = self
            .inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.on_event(&event);
        }
    }

    /// Start timing the run now; until then the clock runs from creation
    pub fn start_clock(&self) {
        let mut counters = self.counters();
        counters.started = Some(Instant::now());
        counters.last_completion = None;
        counters.ema_interval = None;
    }

    fn started(&self, counters: &Counters) -> Instant {
        counters.started.unwrap_or(self.inner.created)
    }

    /// A new task entered the queue; returns its discovery index
    pub fn discovered(&self, path: &Path) -> usize {
        let _order = self.dispatch_guard();
        let index = {
            let mut counters = self.counters();
            counters.discovered += 1;
            counters.discovered - 1
        };
        self.emit(ProgressEvent::Discovered {
            path: path.to_path_buf(),
            index,
        });
        index
    }

    pub fn scan_complete(&self, up_to_date: usize, unreadable: usize) {
        let _order = self.dispatch_guard();
        let discovered = {
            let mut counters = self.counters();
            counters.scan_complete = true;
            counters.discovered
        };
        self.emit(ProgressEvent::ScanComplete {
            discovered,
            up_to_date,
            unreadable,
        });
    }

    /// A worker moved `task` into a non-terminal stage
    pub fn stage_changed(&self, task: &Task) {
        let _order = self.dispatch_guard();
        if !task.status().is_terminal() {
            let mut counters = self.counters();
            if counters.in_flight.insert(task.id()) {
                counters.peak_in_flight = counters.peak_in_flight.max(counters.in_flight.len());
            }
        }
        self.emit(ProgressEvent::StageChanged {
            path: task.source().to_path_buf(),
            status: task.status().clone(),
        });
    }

    /// Record the terminal outcome of `task`. Non-terminal tasks are ignored.
    pub fn record(&self, task: &Task) {
        let status = task.status();
        if !status.is_terminal() {
            warn!(
                "Ignoring non-terminal outcome for {}: {}",
                task.source().display(),
                status.label()
            );
            return;
        }

        let _order = self.dispatch_guard();
        let snapshot = {
            let mut counters = self.counters();
            counters.in_flight.remove(&task.id());

            match status {
                TaskStatus::Succeeded => counters.succeeded += 1,
                TaskStatus::Failed(reason) => {
                    counters.failed += 1;
                    counters.failures.push(TaskIssue {
                        path: task.source().to_path_buf(),
                        reason: reason.clone(),
                    });
                }
                TaskStatus::Skipped(reason) => {
                    counters.skipped += 1;
                    counters.skips.push(TaskIssue {
                        path: task.source().to_path_buf(),
                        reason: reason.clone(),
                    });
                }
                _ => {}
            }

            let now = Instant::now();
            let interval = now
                .duration_since(
                    counters
                        .last_completion
                        .unwrap_or_else(|| self.started(&counters)),
                )
                .as_secs_f64();
            counters.ema_interval = Some(match counters.ema_interval {
                Some(ema) => EMA_ALPHA * interval + (1.0 - EMA_ALPHA) * ema,
                None => interval,
            });
            counters.last_completion = Some(now);

            self.build_snapshot(&counters)
        };

        self.emit(ProgressEvent::Finished {
            path: task.source().to_path_buf(),
            status: status.clone(),
            snapshot,
        });
    }

    fn build_snapshot(&self, counters: &Counters) -> ProgressSnapshot {
        let done = counters.succeeded + counters.failed + counters.skipped;
        let remaining = counters.discovered.saturating_sub(done);
        ProgressSnapshot {
            discovered: counters.discovered,
            scan_complete: counters.scan_complete,
            succeeded: counters.succeeded,
            failed: counters.failed,
            skipped: counters.skipped,
            in_flight: counters.in_flight.len(),
            peak_in_flight: counters.peak_in_flight,
            elapsed: self.started(counters).elapsed(),
            estimated_remaining: counters
                .ema_interval
                .map(|ema| Duration::from_secs_f64(ema * remaining as f64)),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = self.counters();
        self.build_snapshot(&counters)
    }

    pub fn failures(&self) -> Vec<TaskIssue> {
        self.counters().failures.clone()
    }

    pub fn skips(&self) -> Vec<TaskIssue> {
        self.counters().skips.clone()
    }
}
