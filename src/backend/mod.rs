//! # Compression Backends
//!
//! Il backend è una black box: riceve un buffer RGBA8 già preparato e
//! restituisce i byte di un file DDS completo.
//!
//! ## Implementazioni:
//! - `TexconvBackend`: tool esterno `texconv`, variante GPU o CPU
//! - `NativeBackend`: encoder in-process (`image_dds`), solo CPU
//! - `FallbackBackend`: prova il primario, poi il secondario (GPU -> CPU)
//!
//! Un solo handle (`Arc<dyn CompressionBackend>`) viene scelto all'avvio e
//! condiviso da tutti i worker. Solo il `probe()` iniziale può essere fatale.

pub mod native;
pub mod texconv;

pub use native::NativeBackend;
pub use texconv::TexconvBackend;

use crate::config::{BackendKind, RunConfig, TextureFormat};
use crate::error::{BackendError, RunError};
use crate::tool_resolver::ToolResolver;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output settings for one compress call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityProfile {
    pub format: TextureFormat,
    pub premultiplied_alpha: bool,
}

/// Where an encode actually ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Gpu,
    Cpu,
}

/// A complete DDS file and the device that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub device: Device,
}

impl Compressed {
    pub fn new(bytes: Vec<u8>, device: Device) -> Self {
        Self { bytes, device }
    }
}

pub trait CompressionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Startup check; an error here aborts the run before any dispatch
    fn probe(&self) -> Result<(), BackendError>;

    /// Encode `image` into the bytes of a complete DDS file
    fn compress(
        &self,
        image: &RgbaImage,
        profile: &QualityProfile,
        mipmaps: bool,
    ) -> Result<Compressed, BackendError>;
}

/// Primary backend with a secondary tried on error
pub struct FallbackBackend {
    name: String,
    primary: Box<dyn CompressionBackend>,
    secondary: Box<dyn CompressionBackend>,
}

impl FallbackBackend {
    pub fn new(primary: Box<dyn CompressionBackend>, secondary: Box<dyn CompressionBackend>) -> Self {
        Self {
            name: format!("{} (fallback: {})", primary.name(), secondary.name()),
            primary,
            secondary,
        }
    }
}

impl CompressionBackend for FallbackBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> Result<(), BackendError> {
        match self.primary.probe() {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("{} unavailable ({}), relying on {}", self.primary.name(), e, self.secondary.name());
                self.secondary.probe()
            }
        }
    }

    fn compress(
        &self,
        image: &RgbaImage,
        profile: &QualityProfile,
        mipmaps: bool,
    ) -> Result<Compressed, BackendError> {
        match self.primary.compress(image, profile, mipmaps) {
            Ok(compressed) => Ok(compressed),
            Err(primary) => {
                debug!("{} failed ({}), retrying with {}", self.primary.name(), primary, self.secondary.name());
                self.secondary
                    .compress(image, profile, mipmaps)
                    .map_err(|secondary| BackendError::Exhausted {
                        primary: Box::new(primary),
                        secondary: Box::new(secondary),
                    })
            }
        }
    }
}

fn texconv_chain(exe: PathBuf, prefer_gpu: bool) -> Arc<dyn CompressionBackend> {
    if prefer_gpu {
        Arc::new(FallbackBackend::new(
            Box::new(TexconvBackend::gpu(exe.clone())),
            Box::new(TexconvBackend::cpu(exe)),
        ))
    } else {
        Arc::new(TexconvBackend::cpu(exe))
    }
}

/// Bind the backend requested by `config`. Not probed yet.
pub fn select_backend(config: &RunConfig) -> Result<Arc<dyn CompressionBackend>, RunError> {
    let resolver = ToolResolver::new(config.texconv_path.clone());

    let backend: Arc<dyn CompressionBackend> = match config.backend {
        BackendKind::Native => {
            if config.prefer_gpu {
                debug!("Native encoder runs on the CPU only");
            }
            Arc::new(NativeBackend::new())
        }
        BackendKind::Texconv => {
            let exe = resolver.texconv().ok_or_else(|| RunError::BackendUnavailable {
                backend: "texconv".to_string(),
                source: BackendError::Unavailable(
                    "texconv not found (use --texconv, TOOLS_DIR or a compressors/ folder)".to_string(),
                ),
            })?;
            texconv_chain(exe, config.prefer_gpu)
        }
        BackendKind::Auto => match resolver.texconv() {
            Some(exe) => texconv_chain(exe, config.prefer_gpu),
            None => {
                info!("texconv not found, using the native encoder");
                Arc::new(NativeBackend::new())
            }
        },
    };

    Ok(backend)
}
