//! # JSON Output Module
//!
//! Output strutturato JSON-lines su stdout, per front end esterni.
//!
//! ## Responsabilità:
//! - Un messaggio JSON per riga, con campo `type`
//! - `JsonObserver` traduce gli eventi della pipeline in messaggi
//! - I log vanno su stderr in questa modalità, stdout resta pulito
//!
//! ## Tipi di messaggi:
//! - `start`: inizio run (root, backend, configurazione)
//! - `discovered` / `stage`: task accodato / cambio di stage
//! - `file_complete`: task terminato, con snapshot del progresso
//! - `scan_complete`: scansione terminata
//! - `complete`: fine run con statistiche finali e storiche
//! - `error`: errore fatale

use crate::config::RunConfig;
use crate::manifest::ManifestStats;
use crate::pipeline::{ProgressEvent, ProgressObserver, ProgressSnapshot, RunResult, TaskIssue};
use crate::task::Reason;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        root: PathBuf,
        backend: String,
        config: JsonConfig,
    },
    Discovered {
        path: PathBuf,
        index: usize,
    },
    Stage {
        path: PathBuf,
        status: &'static str,
    },
    FileComplete {
        path: PathBuf,
        status: &'static str,
        reason: Option<Reason>,
        progress: JsonProgress,
    },
    ScanComplete {
        discovered: usize,
        up_to_date: usize,
        unreadable: usize,
    },
    Complete {
        discovered: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        pending: usize,
        up_to_date: usize,
        cancelled: bool,
        source_bytes: u64,
        output_bytes: u64,
        files_upscaled: usize,
        gpu_conversions: usize,
        cpu_conversions: usize,
        duration_seconds: f64,
        failures: Vec<TaskIssue>,
        skips: Vec<TaskIssue>,
        historical_stats: Option<HistoricalStats>,
    },
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione per output JSON
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub workers: usize,
    pub enable_upscale: bool,
    pub prefer_gpu: bool,
    pub format: String,
    pub generate_mipmaps: bool,
    pub verify_outputs: bool,
}

#[derive(Debug, Serialize)]
pub struct JsonProgress {
    pub done: usize,
    pub discovered: usize,
    pub percentage: f64,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub in_flight: usize,
    pub eta_seconds: Option<f64>,
}

/// Statistiche storiche
#[derive(Debug, Serialize)]
pub struct HistoricalStats {
    pub total_textures_converted: usize,
    pub total_source_bytes: u64,
    pub total_output_bytes: u64,
}

impl From<&RunConfig> for JsonConfig {
    fn from(config: &RunConfig) -> Self {
        Self {
            workers: config.workers,
            enable_upscale: config.enable_upscale,
            prefer_gpu: config.prefer_gpu,
            format: config.texture_format.dxgi_name().to_string(),
            generate_mipmaps: config.generate_mipmaps,
            verify_outputs: config.verify_outputs,
        }
    }
}

impl From<&ProgressSnapshot> for JsonProgress {
    fn from(snapshot: &ProgressSnapshot) -> Self {
        Self {
            done: snapshot.done(),
            discovered: snapshot.discovered,
            percentage: snapshot.percent(),
            succeeded: snapshot.succeeded,
            failed: snapshot.failed,
            skipped: snapshot.skipped,
            in_flight: snapshot.in_flight,
            eta_seconds: snapshot.estimated_remaining.map(|d| d.as_secs_f64()),
        }
    }
}

impl From<ManifestStats> for HistoricalStats {
    fn from(stats: ManifestStats) -> Self {
        Self {
            total_textures_converted: stats.textures,
            total_source_bytes: stats.source_bytes,
            total_output_bytes: stats.output_bytes,
        }
    }
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout (una riga)
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", json);
            let _ = stdout.flush();
        }
    }

    pub fn start(root: PathBuf, backend: String, config: &RunConfig) -> Self {
        Self::Start {
            root,
            backend,
            config: JsonConfig::from(config),
        }
    }

    pub fn complete(result: &RunResult) -> Self {
        Self::Complete {
            discovered: result.discovered,
            succeeded: result.succeeded,
            failed: result.failed,
            skipped: result.skipped,
            pending: result.pending,
            up_to_date: result.up_to_date,
            cancelled: result.cancelled,
            source_bytes: result.source_bytes,
            output_bytes: result.output_bytes,
            files_upscaled: result.upscaled,
            gpu_conversions: result.gpu_conversions,
            cpu_conversions: result.cpu_conversions,
            duration_seconds: result.elapsed.as_secs_f64(),
            failures: result.failures.clone(),
            skips: result.skips.clone(),
            historical_stats: result.history.map(HistoricalStats::from),
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }

    /// Message for a pipeline event
    pub fn from_event(event: &ProgressEvent) -> Self {
        match event {
            ProgressEvent::Discovered { path, index } => Self::Discovered {
                path: path.clone(),
                index: *index,
            },
            ProgressEvent::StageChanged { path, status } => Self::Stage {
                path: path.clone(),
                status: status.label(),
            },
            ProgressEvent::Finished {
                path,
                status,
                snapshot,
            } => Self::FileComplete {
                path: path.clone(),
                status: status.label(),
                reason: status.reason().cloned(),
                progress: JsonProgress::from(snapshot),
            },
            ProgressEvent::ScanComplete {
                discovered,
                up_to_date,
                unreadable,
            } => Self::ScanComplete {
                discovered: *discovered,
                up_to_date: *up_to_date,
                unreadable: *unreadable,
            },
        }
    }
}

/// Streams every pipeline event to stdout as JSON lines
#[derive(Debug, Default)]
pub struct JsonObserver;

impl ProgressObserver for JsonObserver {
    fn on_event(&self, event: &ProgressEvent) {
        JsonMessage::from_event(event).emit();
    }
}
