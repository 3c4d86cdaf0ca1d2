//! # Work Scheduler
//!
//! Coda bounded tra discovery e un pool fisso di N worker.
//!
//! ## Flusso:
//! 1. Lo stage di discovery (thread bloccante) scansiona, ispeziona l'header
//!    e accoda i task; si blocca quando la coda è piena
//! 2. Ogni worker preleva un task alla volta (FIFO) e lo porta a uno stato
//!    terminale: preprocess e compressione girano su `spawn_blocking`
//! 3. L'output viene scritto in un file temporaneo e poi rinominato
//!
//! Due sorgenti che producono lo stesso output (`wall.png` e `wall.PNG`)
//! non vengono mai processati entrambi: il secondo è `duplicate-destination`.
//!
//! ## Cancellazione:
//! - Nessun nuovo dispatch dopo che il flag è stato osservato
//! - Un task in volo finisce lo stage corrente, mai interrotto a metà scrittura
//! - Se tutti i worker escono, il receiver viene droppato e la discovery si ferma

use crate::backend::{CompressionBackend, Compressed, Device, QualityProfile};
use crate::config::{RunConfig, TextureFormat};
use crate::error::RunError;
use crate::inspector::ImageInspector;
use crate::manifest::{ConvertedTexture, SharedManifest};
use crate::pipeline::controller::CancelHandle;
use crate::pipeline::path_resolver::PathResolver;
use crate::pipeline::progress::ProgressAggregator;
use crate::preprocess::Preprocessor;
use crate::scanner::AssetScanner;
use crate::task::{Reason, ReasonCode, Task, TaskStatus};
use futures::future::join_all;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

type Queue = Arc<Mutex<mpsc::Receiver<Task>>>;

/// What the discovery stage saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanTotals {
    pub discovered: usize,
    pub up_to_date: usize,
    pub unreadable: usize,
}

/// Totals returned once the pool has drained
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleOutcome {
    pub scan: ScanTotals,
    pub source_bytes: u64,
    pub output_bytes: u64,
    /// Tasks whose image was enlarged before compression
    pub upscaled: usize,
    pub gpu_conversions: usize,
    pub cpu_conversions: usize,
}

pub struct WorkScheduler {
    config: Arc<RunConfig>,
    context: Arc<WorkerContext>,
}

/// Everything a worker needs, shared by the pool
struct WorkerContext {
    backend: Arc<dyn CompressionBackend>,
    preprocessor: Preprocessor,
    progress: ProgressAggregator,
    cancel: CancelHandle,
    manifest: Option<SharedManifest>,
    generate_mipmaps: bool,
    premultiply_alpha: bool,
    format: TextureFormat,
    source_bytes: AtomicU64,
    output_bytes: AtomicU64,
    upscaled: AtomicUsize,
    gpu_conversions: AtomicUsize,
    cpu_conversions: AtomicUsize,
}

impl WorkScheduler {
    pub fn new(
        config: Arc<RunConfig>,
        backend: Arc<dyn CompressionBackend>,
        progress: ProgressAggregator,
        cancel: CancelHandle,
        manifest: Option<SharedManifest>,
    ) -> Self {
        let context = Arc::new(WorkerContext {
            backend,
            preprocessor: Preprocessor::new(&config),
            progress,
            cancel,
            manifest,
            generate_mipmaps: config.generate_mipmaps,
            premultiply_alpha: config.premultiply_alpha,
            format: config.texture_format,
            source_bytes: AtomicU64::new(0),
            output_bytes: AtomicU64::new(0),
            upscaled: AtomicUsize::new(0),
            gpu_conversions: AtomicUsize::new(0),
            cpu_conversions: AtomicUsize::new(0),
        });
        Self { config, context }
    }

    /// Run discovery and the worker pool until drained or cancelled
    pub async fn run(self) -> Result<ScheduleOutcome, RunError> {
        let (tx, rx) = mpsc::channel::<Task>(self.config.queue_capacity);

        let discovery = {
            let config = self.config.clone();
            let context = self.context.clone();
            tokio::task::spawn_blocking(move || discover(&config, &context, tx))
        };

        let queue: Queue = Arc::new(Mutex::new(rx));
        let workers: Vec<_> = (0..self.config.workers)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, self.context.clone(), queue.clone())))
            .collect();
        // only workers hold the receiver, so discovery stops once they all exit
        drop(queue);

        for (worker_id, joined) in join_all(workers).await.into_iter().enumerate() {
            if let Err(e) = joined {
                error!("Worker {} terminated abnormally: {}", worker_id, e);
            }
        }

        let scan = discovery
            .await
            .map_err(|e| RunError::Internal(format!("discovery stage failed: {}", e)))?;

        Ok(ScheduleOutcome {
            scan,
            source_bytes: self.context.source_bytes.load(Ordering::Relaxed),
            output_bytes: self.context.output_bytes.load(Ordering::Relaxed),
            upscaled: self.context.upscaled.load(Ordering::Relaxed),
            gpu_conversions: self.context.gpu_conversions.load(Ordering::Relaxed),
            cpu_conversions: self.context.cpu_conversions.load(Ordering::Relaxed),
        })
    }
}

/// Scan, inspect and enqueue. Runs on a blocking thread.
fn discover(config: &RunConfig, context: &WorkerContext, tx: mpsc::Sender<Task>) -> ScanTotals {
    let mut scanner = AssetScanner::new(config);
    if config.verify_outputs {
        if let Some(manifest) = &context.manifest {
            scanner = scanner.with_verification(manifest.clone());
        }
    }
    let inspector = ImageInspector::new(config);

    let mut totals = ScanTotals::default();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut scan = scanner.candidates();

    for source in scan.by_ref() {
        if context.cancel.is_cancelled() {
            debug!("Discovery stopped by cancellation");
            break;
        }

        let destination = scanner.destination_for(&source);
        let task = if !claimed.insert(PathResolver::collision_key(&destination)) {
            warn!(
                "{} maps to {}, already claimed by another source",
                source.display(),
                destination.display()
            );
            let detail = format!("{} is produced from another source", destination.display());
            Task::rejected(
                totals.discovered,
                source,
                destination,
                Reason::new(ReasonCode::DuplicateDestination, detail),
            )
        } else {
            plan(&inspector, totals.discovered, source, destination)
        };

        // counted before the send so completions never outrun discovery
        context.progress.discovered(task.source());
        totals.discovered += 1;

        if tx.blocking_send(task).is_err() {
            debug!("All workers exited, stopping discovery");
            break;
        }
    }

    totals.up_to_date = scan.up_to_date();
    totals.unreadable = scan.unreadable();
    drop(tx);

    context
        .progress
        .scan_complete(totals.up_to_date, totals.unreadable);
    info!(
        "Scan complete: {} queued, {} up to date, {} unreadable",
        totals.discovered, totals.up_to_date, totals.unreadable
    );
    totals
}

/// Inspect the header; an unreadable source is born skipped
fn plan(inspector: &ImageInspector, id: usize, source: PathBuf, destination: PathBuf) -> Task {
    match inspector.inspect(&source) {
        Ok(inspection) => Task::planned(id, source, destination, &inspection),
        Err(e) => {
            warn!("Invalid source {}: {}", source.display(), e);
            Task::rejected(
                id,
                source,
                destination,
                Reason::new(ReasonCode::InvalidSource, e.to_string()),
            )
        }
    }
}

async fn worker_loop(worker_id: usize, context: Arc<WorkerContext>, queue: Queue) {
    debug!("Worker {} started", worker_id);
    loop {
        if context.cancel.is_cancelled() {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => None,
            task = async { queue.lock().await.recv().await } => task,
        };

        let Some(task) = next else {
            break;
        };
        WorkerContext::handle(&context, task).await;
    }
    debug!("Worker {} stopped", worker_id);
}

impl WorkerContext {
    async fn handle(context: &Arc<Self>, mut task: Task) {
        if task.status().is_terminal() {
            // rejected during discovery, never in flight
            context.finish(&task);
            return;
        }

        context.advance(&mut task, TaskStatus::Preprocessing);
        let backup = task.clone();

        let worker = context.clone();
        let task = match tokio::task::spawn_blocking(move || worker.convert(task)).await {
            Ok(task) => task,
            Err(e) => {
                let mut task = backup;
                context.advance(
                    &mut task,
                    TaskStatus::Failed(Reason::new(ReasonCode::WorkerPanic, e.to_string())),
                );
                task
            }
        };

        context.finish(&task);
    }

    /// Preprocess, compress and place one task. Runs on a blocking thread.
    fn convert(&self, mut task: Task) -> Task {
        let prepared = match self.preprocessor.prepare(&task) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.advance(
                    &mut task,
                    TaskStatus::Failed(Reason::new(ReasonCode::PreprocessError, e.to_string())),
                );
                return task;
            }
        };
        if prepared.is_upscaled() {
            self.upscaled.fetch_add(1, Ordering::Relaxed);
        }

        if self.cancel.is_cancelled() {
            self.advance(
                &mut task,
                TaskStatus::Skipped(Reason::new(ReasonCode::Cancelled, "cancelled before compression")),
            );
            return task;
        }

        self.advance(&mut task, TaskStatus::Compressing);
        let profile = QualityProfile {
            format: self.format,
            premultiplied_alpha: self.premultiply_alpha && task.has_alpha(),
        };

        let compressed = match self
            .backend
            .compress(prepared.image(), &profile, self.generate_mipmaps)
        {
            Ok(compressed) => compressed,
            Err(e) => {
                self.advance(
                    &mut task,
                    TaskStatus::Failed(Reason::new(ReasonCode::BackendError, e.to_string())),
                );
                return task;
            }
        };

        if let Err(e) = PathResolver::place_atomically(task.destination(), &compressed.bytes) {
            self.advance(
                &mut task,
                TaskStatus::Failed(Reason::new(ReasonCode::WriteError, e.to_string())),
            );
            return task;
        }

        self.account(&task, &compressed);
        self.advance(&mut task, TaskStatus::Succeeded);
        task
    }

    fn account(&self, task: &Task, compressed: &Compressed) {
        let entry = ConvertedTexture::new(task.source(), task.destination(), &compressed.bytes);
        self.source_bytes.fetch_add(entry.source_size, Ordering::Relaxed);
        self.output_bytes.fetch_add(entry.size, Ordering::Relaxed);
        match compressed.device {
            Device::Gpu => self.gpu_conversions.fetch_add(1, Ordering::Relaxed),
            Device::Cpu => self.cpu_conversions.fetch_add(1, Ordering::Relaxed),
        };

        if let Some(manifest) = &self.manifest {
            manifest
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(entry);
        }
    }

    /// Apply a transition driven by this worker and publish non-terminal stages
    fn advance(&self, task: &mut Task, next: TaskStatus) {
        if let Err(e) = task.transition(next) {
            error!("{}: {}", task.source().display(), e);
            return;
        }
        if !task.status().is_terminal() {
            self.progress.stage_changed(task);
        }
    }

    fn finish(&self, task: &Task) {
        match task.status() {
            TaskStatus::Succeeded => debug!("Converted {}", task.source().display()),
            TaskStatus::Failed(reason) => {
                error!("Failed {}: {}", task.source().display(), reason);
                self.discard_stale_output(task);
            }
            TaskStatus::Skipped(reason) => {
                warn!("Skipped {}: {}", task.source().display(), reason);
                // the destination belongs to the source that claimed it first
                if reason.code != ReasonCode::DuplicateDestination {
                    self.discard_stale_output(task);
                }
            }
            _ => {}
        }
        self.progress.record(task);
    }

    /// An older output would shadow the source in game; the task was queued
    /// only because that output is out of date
    fn discard_stale_output(&self, task: &Task) {
        let destination = task.destination();
        if !destination.exists() {
            return;
        }
        match std::fs::remove_file(destination) {
            Ok(()) => {
                info!("Removed stale {}", destination.display());
                if let Some(manifest) = &self.manifest {
                    manifest
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .forget(destination);
                }
            }
            Err(e) => warn!("Could not remove stale {}: {}", destination.display(), e),
        }
    }
}
