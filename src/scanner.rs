//! # Asset Scanner
//!
//! Discovery lazy delle texture PNG da convertire sotto una root.
//!
//! ## Responsabilità:
//! - Walk ricorsivo con `walkdir`, senza scendere nelle directory escluse
//! - Filtra per estensione `png` (case-insensitive) e pattern di nome esclusi
//! - Salta i sorgenti già convertiti (DDS presente e più recente)
//! - Conta gli up-to-date e le entry illeggibili, mai un errore fatale
//!
//! Ogni chiamata a `candidates()` riparte da zero: la sequenza è restartable.

use crate::config::RunConfig;
use crate::manifest::SharedManifest;
use crate::pipeline::path_resolver::PathResolver;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory names and file name fragments that are never converted
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    dirs: HashSet<String>,
    patterns: Vec<String>,
}

impl ExclusionRules {
    pub fn new<D, P>(dirs: D, patterns: P) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.exclude_dirs.iter().cloned(), &config.exclude_patterns)
    }

    /// Exact directory name match
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.dirs.contains(name)
    }

    /// Case-insensitive substring match on the file name
    pub fn is_excluded_file(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.patterns.iter().any(|p| lower.contains(p.as_str()))
    }
}

pub struct AssetScanner {
    root: PathBuf,
    rules: ExclusionRules,
    extension: String,
    manifest: Option<SharedManifest>,
}

impl AssetScanner {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            root: config.root.clone(),
            rules: ExclusionRules::from_config(config),
            extension: config.destination_extension().to_string(),
            manifest: None,
        }
    }

    /// Only trust existing outputs whose checksum matches the manifest
    pub fn with_verification(mut self, manifest: SharedManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a fresh walk of the root
    pub fn candidates(&self) -> Scan<'_> {
        Scan {
            scanner: self,
            walker: WalkDir::new(&self.root).into_iter(),
            up_to_date: 0,
            unreadable: 0,
        }
    }

    pub fn destination_for(&self, source: &Path) -> PathBuf {
        PathResolver::destination_for(source, &self.extension)
    }

    /// The destination exists, is at least as new as the source and, when
    /// verifying, still matches its recorded digest
    fn is_up_to_date(&self, source: &Path) -> bool {
        let destination = self.destination_for(source);
        let (Ok(src_meta), Ok(dst_meta)) = (source.metadata(), destination.metadata()) else {
            return false;
        };
        let fresh = match (src_meta.modified(), dst_meta.modified()) {
            (Ok(src), Ok(dst)) => dst >= src,
            _ => false,
        };
        if !fresh {
            return false;
        }

        match &self.manifest {
            Some(manifest) => {
                let manifest = manifest.lock().unwrap_or_else(PoisonError::into_inner);
                let valid = manifest.verify(&destination);
                if !valid {
                    debug!("Checksum mismatch, reconverting {}", source.display());
                }
                valid
            }
            None => true,
        }
    }
}

/// One lazy pass over the root
pub struct Scan<'a> {
    scanner: &'a AssetScanner,
    walker: walkdir::IntoIter,
    up_to_date: usize,
    unreadable: usize,
}

impl Scan<'_> {
    /// Sources skipped because their output is current
    pub fn up_to_date(&self) -> usize {
        self.up_to_date
    }

    /// Entries that could not be read
    pub fn unreadable(&self) -> usize {
        self.unreadable
    }
}

impl Iterator for Scan<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    self.unreadable += 1;
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_dir() {
                if entry.depth() > 0 && self.scanner.rules.is_excluded_dir(&name) {
                    debug!("Skipping excluded directory {}", entry.path().display());
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if !entry.file_type().is_file() || !PathResolver::is_source_texture(entry.path()) {
                continue;
            }

            if self.scanner.rules.is_excluded_file(&name) {
                debug!("Skipping excluded file {}", entry.path().display());
                continue;
            }

            if let Err(e) = File::open(entry.path()) {
                warn!("Skipping unreadable file {}: {}", entry.path().display(), e);
                self.unreadable += 1;
                continue;
            }

            if self.scanner.is_up_to_date(entry.path()) {
                debug!("Up to date: {}", entry.path().display());
                self.up_to_date += 1;
                continue;
            }

            return Some(entry.into_path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ConvertedTexture, OutputManifest};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    fn sorted(scan: Scan<'_>) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = scan.collect();
        found.sort();
        found
    }

    #[test]
    fn test_finds_png_case_insensitive() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("ModA/Textures/wall.png"));
        touch(&root.join("ModA/Textures/door.PNG"));
        touch(&root.join("ModA/Textures/readme.txt"));

        let scanner = AssetScanner::new(&RunConfig::new(root));
        let found = sorted(scanner.candidates());
        assert_eq!(
            found,
            vec![
                root.join("ModA/Textures/door.PNG"),
                root.join("ModA/Textures/wall.png")
            ]
        );
    }

    #[test]
    fn test_exclusions() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("ModA/About/preview.png"));
        touch(&root.join("ModA/Defs/thing.png"));
        touch(&root.join("ModA/Textures/Things/gun_icon.png"));
        touch(&root.join("ModA/Textures/Things/gun.png"));

        let scanner = AssetScanner::new(&RunConfig::new(root));
        let found = sorted(scanner.candidates());
        assert_eq!(found, vec![root.join("ModA/Textures/Things/gun.png")]);
    }

    #[test]
    fn test_root_named_like_excluded_dir_is_walked() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("Common");
        touch(&root.join("Textures/a.png"));

        let scanner = AssetScanner::new(&RunConfig::new(&root));
        assert_eq!(scanner.candidates().count(), 1);
    }

    #[test]
    fn test_up_to_date_outputs_are_counted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let fresh = root.join("Textures/fresh.png");
        let stale = root.join("Textures/stale.png");
        touch(&fresh);
        touch(&stale);
        touch(&fresh.with_extension("dds"));
        touch(&stale.with_extension("dds"));

        let now = SystemTime::now();
        set_mtime(&fresh, now - Duration::from_secs(60));
        set_mtime(&fresh.with_extension("dds"), now);
        set_mtime(&stale, now);
        set_mtime(&stale.with_extension("dds"), now - Duration::from_secs(60));

        let scanner = AssetScanner::new(&RunConfig::new(root));
        let mut scan = scanner.candidates();
        let found: Vec<PathBuf> = scan.by_ref().collect();
        assert_eq!(found, vec![stale]);
        assert_eq!(scan.up_to_date(), 1);
        assert_eq!(scan.unreadable(), 0);
    }

    #[test]
    fn test_candidates_is_restartable() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("a.png"));
        touch(&temp_dir.path().join("b.png"));

        let scanner = AssetScanner::new(&RunConfig::new(temp_dir.path()));
        assert_eq!(scanner.candidates().count(), 2);
        assert_eq!(scanner.candidates().count(), 2);
    }

    #[tokio::test]
    async fn test_verification_requeues_unrecorded_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let recorded = root.join("recorded.png");
        let unknown = root.join("unknown.png");
        for source in [&recorded, &unknown] {
            touch(source);
            set_mtime(source, SystemTime::now() - Duration::from_secs(60));
            std::fs::write(source.with_extension("dds"), b"DDS data").unwrap();
        }

        let mut manifest = OutputManifest::load(&root, Some(&temp_dir.path().join("state")))
            .await
            .unwrap();
        manifest.record(ConvertedTexture::new(
            &recorded,
            &recorded.with_extension("dds"),
            b"DDS data",
        ));

        let scanner = AssetScanner::new(&RunConfig::new(&root))
            .with_verification(Arc::new(Mutex::new(manifest)));
        let mut scan = scanner.candidates();
        let found: Vec<PathBuf> = scan.by_ref().collect();
        assert_eq!(found, vec![unknown]);
        assert_eq!(scan.up_to_date(), 1);
    }
}
