//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione di un run di conversione.
//!
//! ## Responsabilità:
//! - Definisce `RunConfig` con tutti i parametri della conversione
//! - Validazione robusta prima di avviare qualsiasi lavoro
//! - Caricamento/salvataggio delle impostazioni da/verso file JSON
//! - Valori di default sensati (quelli del tool originale per RimWorld)
//!
//! ## Parametri principali:
//! - `root`: directory da scansionare (es. la cartella Mods)
//! - `enable_upscale`: upscale 2x delle texture sotto `min_upscale_dimension`
//! - `prefer_gpu`: usa il percorso GPU del backend quando disponibile
//! - `workers`: numero di worker paralleli (default: core disponibili, max 8)
//! - `output_extension`: l'output va accanto al sorgente con questa estensione
//!
//! ## Validazione:
//! - La root deve esistere, essere una directory ed essere leggibile
//! - `workers` e `queue_capacity` devono essere > 0
//! - L'estensione di output non può coincidere con quella del sorgente
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = RunConfig {
//!     workers: 8,
//!     enable_upscale: false,
//!     ..RunConfig::new("/games/RimWorld/Mods")
//! };
//! config.validate()?;
//! ```

use crate::error::RunError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound for the default worker count; the backend saturates before the CPU does
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Hard limit accepted by validation
pub const MAX_WORKERS: usize = 64;

/// Block-compressed DDS formats the backends can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    /// BC7: best quality, full alpha
    Bc7,
    /// BC3 (DXT5): wider compatibility
    Bc3,
}

impl TextureFormat {
    /// DXGI name as understood by texconv
    pub fn dxgi_name(&self) -> &'static str {
        match self {
            TextureFormat::Bc7 => "BC7_UNORM",
            TextureFormat::Bc3 => "BC3_UNORM",
        }
    }
}

/// Which compression backend to bind at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// texconv when it can be found, otherwise the native encoder
    Auto,
    /// External texconv tool only
    Texconv,
    /// In-process encoder only (CPU)
    Native,
}

/// Vertical order in which pixel rows are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RowOrder {
    TopDown,
    BottomUp,
}

/// Configuration for a conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory tree to convert
    pub root: PathBuf,
    /// Upscale textures smaller than `min_upscale_dimension`
    pub enable_upscale: bool,
    /// Prefer the GPU path of the backend (falls back to CPU)
    pub prefer_gpu: bool,
    /// Number of parallel workers
    pub workers: usize,
    /// Capacity of the queue between discovery and workers
    pub queue_capacity: usize,
    /// Textures whose largest side is below this get upscaled
    pub min_upscale_dimension: u32,
    /// Integer upscale factor
    pub upscale_factor: u32,
    /// Row order the consuming game expects
    pub target_row_order: RowOrder,
    /// Output compression format
    pub texture_format: TextureFormat,
    /// Generate the full mip chain
    pub generate_mipmaps: bool,
    /// Premultiply alpha for textures that have an alpha channel
    pub premultiply_alpha: bool,
    /// Backend selection
    pub backend: BackendKind,
    /// Explicit texconv location
    pub texconv_path: Option<PathBuf>,
    /// Extension of the converted file written beside each source
    pub output_extension: String,
    /// Directory names never descended into
    pub exclude_dirs: Vec<String>,
    /// File name fragments that exclude a texture (case-insensitive)
    pub exclude_patterns: Vec<String>,
    /// Re-validate existing outputs against the manifest checksum
    pub verify_outputs: bool,
    /// Where the output manifest lives (None = ~/.texture-optimizer)
    pub state_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            enable_upscale: true,
            prefer_gpu: true,
            workers: default_workers(),
            queue_capacity: default_workers() * 4,
            min_upscale_dimension: 256,
            upscale_factor: 2,
            target_row_order: RowOrder::BottomUp,
            texture_format: TextureFormat::Bc7,
            generate_mipmaps: true,
            premultiply_alpha: true,
            backend: BackendKind::Auto,
            texconv_path: None,
            output_extension: "dds".to_string(),
            exclude_dirs: [
                "About", "Assemblies", "Defs", "Languages", "Patches", "Sounds", "Source",
                ".git", ".svn", "__pycache__", "Common", "v1.4", "v1.5",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_patterns: [
                "_preview.png", "_thumb.png", "preview.png", "thumbnail.png", "icon.png",
                "logo.png",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            verify_outputs: false,
            state_dir: None,
        }
    }
}

/// Worker count derived from the available cores, capped
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, MAX_DEFAULT_WORKERS)
}

impl RunConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters and the root directory
    pub fn validate(&self) -> Result<(), RunError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(RunError::InvalidConfig(format!(
                "Number of workers must be between 1 and {}",
                MAX_WORKERS
            )));
        }

        if self.queue_capacity == 0 {
            return Err(RunError::InvalidConfig(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.min_upscale_dimension == 0 {
            return Err(RunError::InvalidConfig(
                "Minimum upscale dimension must be greater than 0".to_string(),
            ));
        }

        if !(2..=4).contains(&self.upscale_factor) {
            return Err(RunError::InvalidConfig(
                "Upscale factor must be 2, 3 or 4".to_string(),
            ));
        }

        let ext = self.output_extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) || ext.split('.').any(str::is_empty) {
            return Err(RunError::InvalidConfig(format!(
                "Invalid output extension: '{}'",
                self.output_extension
            )));
        }
        // outputs are recognised by their final extension, like sources
        let last = ext.rsplit('.').next().unwrap_or(ext);
        if last.eq_ignore_ascii_case("png") {
            return Err(RunError::InvalidConfig(
                "Output extension must differ from the source extension".to_string(),
            ));
        }

        self.validate_root()
    }

    fn validate_root(&self) -> Result<(), RunError> {
        if !self.root.exists() {
            return Err(RunError::RootNotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(RunError::RootNotDirectory(self.root.clone()));
        }
        std::fs::read_dir(&self.root).map_err(|source| RunError::RootUnreadable {
            path: self.root.clone(),
            source,
        })?;
        Ok(())
    }

    /// Extension of converted files, without the leading dot
    pub fn destination_extension(&self) -> &str {
        self.output_extension.trim_start_matches('.')
    }

    /// Load configuration from file; missing file means defaults
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write settings {}", path.display()))?;
        Ok(())
    }

    /// Default settings location: `<config_dir>/texture-optimizer/settings.json`
    pub fn default_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("texture-optimizer").join("settings.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = RunConfig::new(temp_dir.path());
        assert!(config.validate().is_ok());

        config.workers = 0;
        assert!(matches!(config.validate(), Err(RunError::InvalidConfig(_))));

        config.workers = 2;
        config.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.queue_capacity = 8;
        config.output_extension = "PNG".to_string();
        assert!(config.validate().is_err());

        config.output_extension = "tar.png".to_string();
        assert!(config.validate().is_err());

        config.output_extension = "dds.".to_string();
        assert!(config.validate().is_err());

        config.output_extension = "png.dds".to_string();
        assert!(config.validate().is_ok());

        config.output_extension = ".dds".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.destination_extension(), "dds");

        config.upscale_factor = 3;
        assert!(config.validate().is_ok());
        config.upscale_factor = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();

        let missing = RunConfig::new(temp_dir.path().join("nope"));
        assert!(matches!(missing.validate(), Err(RunError::RootNotFound(_))));

        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        let not_dir = RunConfig::new(&file);
        assert!(matches!(not_dir.validate(), Err(RunError::RootNotDirectory(_))));
    }

    #[test]
    fn test_config_default() {
        let config = RunConfig::default();
        assert!(config.enable_upscale);
        assert!(config.prefer_gpu);
        assert!(config.workers >= 1 && config.workers <= MAX_DEFAULT_WORKERS);
        assert_eq!(config.min_upscale_dimension, 256);
        assert_eq!(config.upscale_factor, 2);
        assert_eq!(config.texture_format, TextureFormat::Bc7);
        assert_eq!(config.target_row_order, RowOrder::BottomUp);
        assert!(config.exclude_dirs.iter().any(|d| d == "Defs"));
        assert_eq!(TextureFormat::Bc3.dxgi_name(), "BC3_UNORM");
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.json");

        let original_config = RunConfig {
            workers: 3,
            enable_upscale: false,
            texture_format: TextureFormat::Bc3,
            backend: BackendKind::Native,
            texconv_path: Some(PathBuf::from("/opt/texconv.exe")),
            ..RunConfig::new("/games/RimWorld/Mods")
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = RunConfig::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.root, PathBuf::from("/games/RimWorld/Mods"));
        assert_eq!(loaded_config.workers, 3);
        assert!(!loaded_config.enable_upscale);
        assert_eq!(loaded_config.texture_format, TextureFormat::Bc3);
        assert_eq!(loaded_config.backend, BackendKind::Native);
        assert_eq!(loaded_config.texconv_path, Some(PathBuf::from("/opt/texconv.exe")));
    }

    #[tokio::test]
    async fn test_partial_settings_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.json");
        tokio::fs::write(&config_path, r#"{ "workers": 2, "prefer_gpu": false }"#)
            .await
            .unwrap();

        let loaded = RunConfig::from_file(&config_path).await.unwrap();
        assert_eq!(loaded.workers, 2);
        assert!(!loaded.prefer_gpu);
        assert_eq!(loaded.output_extension, "dds");

        let missing = RunConfig::from_file(&temp_dir.path().join("none.json")).await.unwrap();
        assert_eq!(missing.min_upscale_dimension, 256);
    }
}
