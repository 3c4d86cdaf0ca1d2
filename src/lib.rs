//! # Texture Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! Converte in batch le texture PNG di una cartella di mod in DDS compressi
//! (BC7/BC3), scrivendo ogni output accanto al sorgente senza mai modificarlo.
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `task`: Unità di lavoro e macchina a stati
//! - `scanner`: Discovery lazy delle texture
//! - `inspector`: Lettura header e piano di conversione
//! - `preprocess`: Decode, flip e upscale
//! - `backend`: Backend di compressione (texconv, nativo, fallback)
//! - `pipeline`: Orchestratore, scheduler, progress
//! - `manifest`: Tracking dei DDS generati
//! - `tool_resolver`: Ricerca dei tool esterni
//! - `file_manager`: Operazioni sui file e restore
//! - `progress` / `json_output`: Observer per console e JSON
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use texture_optimizer::{RunConfig, RunController};
//!
//! let controller = RunController::from_config(RunConfig::new("/games/RimWorld/Mods"))?;
//! let result = controller.run().await?;
//! println!("{}", result.format_summary());
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod inspector;
pub mod json_output;
pub mod manifest;
pub mod pipeline;
pub mod preprocess;
pub mod progress;
pub mod scanner;
pub mod task;
pub mod tool_resolver;

pub use backend::{CompressionBackend, Compressed, Device, QualityProfile};
pub use config::{BackendKind, RowOrder, RunConfig, TextureFormat};
pub use error::{BackendError, RunError};
pub use pipeline::{
    CancelHandle, ProgressEvent, ProgressObserver, ProgressSnapshot, RunController, RunResult,
};
pub use task::{Reason, ReasonCode, Task, TaskStatus};
