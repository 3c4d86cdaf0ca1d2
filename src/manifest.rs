//! # Output Manifest Module
//!
//! Questo modulo tiene traccia dei file DDS generati per ogni root.
//!
//! ## Responsabilità:
//! - Registra ogni conversione riuscita (sorgente, destinazione, sha256, dimensioni)
//! - Persiste lo stato in un file JSON per root
//! - Fornisce il checksum usato da `verify_outputs` per rivalidare un output
//! - Statistiche storiche per il report finale
//! - Cleanup automatico di entry il cui DDS non esiste più
//!
//! ## Strategia di persistence:
//! - Un file JSON per root (basato su hash del path)
//! - Salvataggio in `~/.texture-optimizer/manifest_<hash>.json`
//!
//! ## Esempio struttura manifest:
//! ```json
//! {
//!   "outputs": {
//!     "/mods/A/Textures/wall.dds": {
//!       "source": "/mods/A/Textures/wall.png",
//!       "destination": "/mods/A/Textures/wall.dds",
//!       "sha256": "9f86d081884c7d65...",
//!       "size": 174904,
//!       "source_size": 52011,
//!       "source_modified": 1642680000,
//!       "converted_at": 1642680100
//!     }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::fs;

/// Manifest handle shared by the discovery stage and the workers
pub type SharedManifest = Arc<Mutex<OutputManifest>>;

/// Information about a generated DDS file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConvertedTexture {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub sha256: String,
    pub size: u64,
    pub source_size: u64,
    pub source_modified: u64,
    pub converted_at: u64,
}

impl ConvertedTexture {
    /// Describe an output from the bytes that were written for it
    pub fn new(source: &Path, destination: &Path, bytes: &[u8]) -> Self {
        let (source_size, source_modified) = std::fs::metadata(source)
            .map(|m| (m.len(), m.modified().map(unix_secs).unwrap_or(0)))
            .unwrap_or((0, 0));

        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            sha256: digest(bytes),
            size: bytes.len() as u64,
            source_size,
            source_modified,
            converted_at: unix_secs(SystemTime::now()),
        }
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Hex-encoded SHA-256 of `bytes`
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
struct ManifestFile {
    outputs: HashMap<String, ConvertedTexture>,
}

/// Historical totals over every recorded output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestStats {
    pub textures: usize,
    pub source_bytes: u64,
    pub output_bytes: u64,
}

/// Tracks the outputs produced under one root
#[derive(Debug, Clone)]
pub struct OutputManifest {
    manifest_path: PathBuf,
    state: ManifestFile,
}

impl OutputManifest {
    /// Load (or start) the manifest for `root`.
    /// `state_dir` overrides the default `~/.texture-optimizer`.
    pub async fn load(root: &Path, state_dir: Option<&Path>) -> Result<Self> {
        let state_dir = match state_dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
                .join(".texture-optimizer"),
        };

        fs::create_dir_all(&state_dir)
            .await
            .with_context(|| format!("Failed to create {}", state_dir.display()))?;

        let mut hasher = Sha256::new();
        hasher.update(root.to_string_lossy().as_bytes());
        let hash = hex::encode(hasher.finalize())[..16].to_string();

        let manifest_path = state_dir.join(format!("manifest_{}.json", hash));

        let state = if manifest_path.exists() {
            let content = fs::read_to_string(&manifest_path).await?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            ManifestFile::default()
        };

        Ok(Self {
            manifest_path,
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.manifest_path
    }

    /// Save current state to file
    pub async fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.state)?;
        fs::write(&self.manifest_path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.manifest_path.display()))?;
        Ok(())
    }

    pub fn record(&mut self, entry: ConvertedTexture) {
        self.state
            .outputs
            .insert(entry.destination.to_string_lossy().to_string(), entry);
    }

    pub fn get(&self, destination: &Path) -> Option<&ConvertedTexture> {
        self.state
            .outputs
            .get(destination.to_string_lossy().as_ref())
    }

    /// True when `destination` is recorded and its bytes still match the digest
    pub fn verify(&self, destination: &Path) -> bool {
        let Some(entry) = self.get(destination) else {
            return false;
        };
        match std::fs::read(destination) {
            Ok(bytes) => digest(&bytes) == entry.sha256,
            Err(_) => false,
        }
    }

    pub fn forget(&mut self, destination: &Path) -> Option<ConvertedTexture> {
        self.state
            .outputs
            .remove(destination.to_string_lossy().as_ref())
    }

    pub fn len(&self) -> usize {
        self.state.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.outputs.is_empty()
    }

    pub fn get_stats(&self) -> ManifestStats {
        self.state
            .outputs
            .values()
            .fold(ManifestStats::default(), |mut stats, entry| {
                stats.textures += 1;
                stats.source_bytes += entry.source_size;
                stats.output_bytes += entry.size;
                stats
            })
    }

    /// Drop entries whose destination no longer exists; returns how many
    pub fn cleanup(&mut self) -> usize {
        let before = self.state.outputs.len();
        self.state
            .outputs
            .retain(|_, entry| entry.destination.exists());
        before - self.state.outputs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_save_reload() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path().join("state");
        let source = temp_dir.path().join("wall.png");
        let destination = temp_dir.path().join("wall.dds");
        std::fs::write(&source, b"png bytes").unwrap();
        std::fs::write(&destination, b"DDS payload").unwrap();

        let mut manifest = OutputManifest::load(temp_dir.path(), Some(&state_dir))
            .await
            .unwrap();
        assert!(manifest.is_empty());
        manifest.record(ConvertedTexture::new(&source, &destination, b"DDS payload"));
        manifest.save().await.unwrap();

        let reloaded = OutputManifest::load(temp_dir.path(), Some(&state_dir))
            .await
            .unwrap();
        assert_eq!(reloaded.path(), manifest.path());
        let entry = reloaded.get(&destination).unwrap();
        assert_eq!(entry.size, 11);
        assert_eq!(entry.source_size, 9);
        assert!(reloaded.verify(&destination));

        let stats = reloaded.get_stats();
        assert_eq!(stats.textures, 1);
        assert_eq!(stats.output_bytes, 11);
    }

    #[tokio::test]
    async fn test_verify_detects_tampering() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.png");
        let destination = temp_dir.path().join("a.dds");
        std::fs::write(&source, b"png").unwrap();
        std::fs::write(&destination, b"original").unwrap();

        let mut manifest = OutputManifest::load(temp_dir.path(), Some(temp_dir.path()))
            .await
            .unwrap();
        manifest.record(ConvertedTexture::new(&source, &destination, b"original"));
        assert!(manifest.verify(&destination));

        std::fs::write(&destination, b"tampered").unwrap();
        assert!(!manifest.verify(&destination));
        assert!(!manifest.verify(&temp_dir.path().join("unknown.dds")));
    }

    #[tokio::test]
    async fn test_cleanup_and_forget() {
        let temp_dir = TempDir::new().unwrap();
        let kept = temp_dir.path().join("kept.dds");
        let gone = temp_dir.path().join("gone.dds");
        std::fs::write(&kept, b"k").unwrap();

        let mut manifest = OutputManifest::load(temp_dir.path(), Some(temp_dir.path()))
            .await
            .unwrap();
        manifest.record(ConvertedTexture::new(&temp_dir.path().join("kept.png"), &kept, b"k"));
        manifest.record(ConvertedTexture::new(&temp_dir.path().join("gone.png"), &gone, b"g"));

        assert_eq!(manifest.cleanup(), 1);
        assert_eq!(manifest.len(), 1);
        assert!(manifest.forget(&kept).is_some());
        assert!(manifest.is_empty());
    }
}
