//! # Run Controller
//!
//! Orchestratore principale di un run di conversione.
//!
//! ## Ciclo di vita:
//! 1. Cattura e valida la configurazione (root non valida = errore fatale)
//! 2. `probe()` del backend (backend non disponibile = errore fatale)
//! 3. Avvio discovery + pool di worker
//! 4. Streaming del progresso verso gli observer
//! 5. Drain (o cancellazione) e produzione del `RunResult`
//!
//! `cancel()` è sicuro in qualsiasi momento ed è idempotente.

use crate::backend::{select_backend, CompressionBackend};
use crate::config::RunConfig;
use crate::error::RunError;
use crate::file_manager::FileManager;
use crate::manifest::{ManifestStats, OutputManifest, SharedManifest};
use crate::pipeline::progress::{ProgressAggregator, ProgressObserver, ProgressSnapshot, TaskIssue};
use crate::pipeline::scheduler::WorkScheduler;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

/// Cloneable, idempotent cancellation flag
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        if !self.tx.send_replace(true) {
            info!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel()` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in self, so the channel cannot close while waiting
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Final outcome of a run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Discovered but never dispatched
    pub pending: usize,
    /// Excluded by the incremental check
    pub up_to_date: usize,
    pub unreadable: usize,
    pub cancelled: bool,
    pub failures: Vec<TaskIssue>,
    pub skips: Vec<TaskIssue>,
    pub elapsed: Duration,
    pub peak_in_flight: usize,
    /// Size of the converted sources
    pub source_bytes: u64,
    /// Size of the written outputs
    pub output_bytes: u64,
    /// Textures enlarged before compression
    pub upscaled: usize,
    /// Outputs encoded on the GPU
    pub gpu_conversions: usize,
    /// Outputs encoded on the CPU
    pub cpu_conversions: usize,
    /// Totals over every output ever recorded for this root
    pub history: Option<ManifestStats>,
}

impl RunResult {
    /// succeeded + failed + skipped + pending == discovered
    pub fn is_conserved(&self) -> bool {
        self.succeeded + self.failed + self.skipped + self.pending == self.discovered
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Converted: {} | Failed: {} | Skipped: {} | Up to date: {} | Pending: {} | {} -> {} in {:.1}s",
            self.succeeded,
            self.failed,
            self.skipped,
            self.up_to_date,
            self.pending,
            FileManager::format_size(self.source_bytes),
            FileManager::format_size(self.output_bytes),
            self.elapsed.as_secs_f64()
        );
        if self.succeeded > 0 || self.upscaled > 0 {
            summary.push_str(&format!(
                " | GPU: {} | CPU: {} | Upscaled: {}",
                self.gpu_conversions, self.cpu_conversions, self.upscaled
            ));
        }
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }
}

pub struct RunController {
    config: Arc<RunConfig>,
    backend: Arc<dyn CompressionBackend>,
    progress: ProgressAggregator,
    cancel: CancelHandle,
}

impl RunController {
    /// Validate `config` and probe `backend`; both failures are fatal
    pub fn new(config: RunConfig, backend: Arc<dyn CompressionBackend>) -> Result<Self, RunError> {
        config.validate()?;
        backend
            .probe()
            .map_err(|source| RunError::BackendUnavailable {
                backend: backend.name().to_string(),
                source,
            })?;

        Ok(Self {
            config: Arc::new(config),
            backend,
            progress: ProgressAggregator::new(),
            cancel: CancelHandle::new(),
        })
    }

    /// Validate `config` and bind the backend it asks for
    pub fn from_config(config: RunConfig) -> Result<Self, RunError> {
        config.validate()?;
        let backend = select_backend(&config)?;
        Self::new(config, backend)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn subscribe(&self, observer: impl ProgressObserver + 'static) {
        self.progress.subscribe(observer);
    }

    pub fn subscribe_arc(&self, observer: Arc<dyn ProgressObserver>) {
        self.progress.subscribe_arc(observer);
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Shared progress handle, usable while `run` is in progress
    pub fn progress(&self) -> ProgressAggregator {
        self.progress.clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    async fn load_manifest(&self) -> Option<SharedManifest> {
        match OutputManifest::load(&self.config.root, self.config.state_dir.as_deref()).await {
            Ok(mut manifest) => {
                let pruned = manifest.cleanup();
                if pruned > 0 {
                    info!("Pruned {} manifest entries with no output", pruned);
                }
                Some(Arc::new(Mutex::new(manifest)))
            }
            Err(e) => {
                warn!("Output manifest unavailable, continuing without it: {:#}", e);
                if self.config.verify_outputs {
                    warn!("Output verification disabled: existing outputs are trusted by timestamp");
                }
                None
            }
        }
    }

    async fn save_manifest(manifest: &SharedManifest) -> ManifestStats {
        let snapshot = manifest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Err(e) = snapshot.save().await {
            warn!("Could not save output manifest: {:#}", e);
        }
        snapshot.get_stats()
    }

    /// Run to completion (or cancellation) and produce the result
    pub async fn run(self) -> Result<RunResult, RunError> {
        let started = Instant::now();
        self.progress.start_clock();
        info!(
            "Converting textures in {} with {} ({} workers)",
            self.config.root.display(),
            self.backend.name(),
            self.config.workers
        );

        let manifest = self.load_manifest().await;

        let scheduler = WorkScheduler::new(
            self.config.clone(),
            self.backend.clone(),
            self.progress.clone(),
            self.cancel.clone(),
            manifest.clone(),
        );
        let outcome = scheduler.run().await?;

        let history = match &manifest {
            Some(manifest) => Some(Self::save_manifest(manifest).await),
            None => None,
        };

        let snapshot = self.progress.snapshot();
        let result = RunResult {
            discovered: snapshot.discovered,
            succeeded: snapshot.succeeded,
            failed: snapshot.failed,
            skipped: snapshot.skipped,
            pending: snapshot.pending(),
            up_to_date: outcome.scan.up_to_date,
            unreadable: outcome.scan.unreadable,
            cancelled: self.cancel.is_cancelled(),
            failures: self.progress.failures(),
            skips: self.progress.skips(),
            elapsed: started.elapsed(),
            peak_in_flight: snapshot.peak_in_flight,
            source_bytes: outcome.source_bytes,
            output_bytes: outcome.output_bytes,
            upscaled: outcome.upscaled,
            gpu_conversions: outcome.gpu_conversions,
            cpu_conversions: outcome.cpu_conversions,
            history,
        };

        if !result.is_conserved() {
            warn!("Task accounting mismatch: {:?}", result);
        }
        info!("{}", result.format_summary());
        Ok(result)
    }
}
