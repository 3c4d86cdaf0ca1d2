//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file fuori dalla pipeline.
//!
//! ## Responsabilità:
//! - Formattazione human-readable delle dimensioni (KB, MB, GB)
//! - Calcolo della variazione di dimensione sorgente -> DDS
//! - Discovery dei DDS generati (comando `restore`)
//! - Rimozione dei DDS generati, senza mai toccare i PNG sorgente
//!
//! ## Sicurezza operazioni:
//! - Un DDS viene considerato "generato" solo se esiste il PNG fratello
//! - Le directory escluse non vengono mai visitate
//! - `dry_run` elenca senza cancellare
//!
//! ## Esempio:
//! ```rust,ignore
//! let outputs = FileManager::find_generated_outputs(&root, &rules, "dds");
//! let report = FileManager::restore(&outputs, false).await;
//! println!("Removed {} files", report.removed);
//! ```

use crate::scanner::ExclusionRules;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Outcome of a restore pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub removed: usize,
    pub bytes_freed: u64,
    pub errors: Vec<(PathBuf, String)>,
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Converted outputs under `root`: files with `extension` that have a
    /// sibling `.png` with the same stem
    pub fn find_generated_outputs(
        root: &Path,
        rules: &ExclusionRules,
        extension: &str,
    ) -> Vec<PathBuf> {
        let extension = extension.trim_start_matches('.');
        let mut outputs = Vec::new();

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && rules.is_excluded_dir(&entry.file_name().to_string_lossy()))
        });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let matches_ext = path
                .extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if matches_ext && Self::sibling_source(path).is_some() {
                outputs.push(path.to_path_buf());
            }
        }

        outputs.sort();
        outputs
    }

    /// The `.png` (any case) next to `output`, if present
    pub fn sibling_source(output: &Path) -> Option<PathBuf> {
        ["png", "PNG", "Png"]
            .iter()
            .map(|ext| output.with_extension(ext))
            .find(|candidate| candidate.is_file())
    }

    /// Delete `outputs`. Sources are never touched.
    pub async fn restore(outputs: &[PathBuf], dry_run: bool) -> RestoreReport {
        let mut report = RestoreReport::default();

        for output in outputs {
            let size = fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
            if dry_run {
                debug!("Would remove {}", output.display());
                report.removed += 1;
                report.bytes_freed += size;
                continue;
            }

            match fs::remove_file(output).await {
                Ok(()) => {
                    debug!("Removed {}", output.display());
                    report.removed += 1;
                    report.bytes_freed += size;
                }
                Err(e) => {
                    warn!("Could not remove {}: {}", output.display(), e);
                    report.errors.push((output.clone(), e.to_string()));
                }
            }
        }

        report
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Percentage change from `original_size` to `new_size` (negative = grew)
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
