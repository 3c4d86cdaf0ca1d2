//! # Path Resolution Module
//!
//! Centralizza il calcolo dei path di output e il posizionamento atomico.
//! L'output va sempre accanto al sorgente: stessa directory, stesso stem,
//! estensione `dds`. Il sorgente non viene mai aperto in scrittura.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Utility per calcolare i path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Destination for `source`: same directory and stem, `extension` replaced
    pub fn destination_for(source: &Path, extension: &str) -> PathBuf {
        source.with_extension(extension.trim_start_matches('.'))
    }

    /// True for files with a `png` extension, any case
    pub fn is_source_texture(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("png"))
            .unwrap_or(false)
    }

    /// Identity of a destination for collision checks. Windows paths are
    /// case-insensitive, so `Wall.dds` and `wall.dds` are the same file there.
    pub fn collision_key(destination: &Path) -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(destination.to_string_lossy().to_lowercase())
        } else {
            destination.to_path_buf()
        }
    }

    /// Write `bytes` to a hidden temporary file beside `destination`, then
    /// rename it into place. On any error the temporary file is removed and
    /// `destination` is left as it was.
    pub fn place_atomically(destination: &Path, bytes: &[u8]) -> io::Result<()> {
        let dir = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let mut staged = tempfile::Builder::new()
            .prefix(".")
            .suffix(".dds.partial")
            .tempfile_in(dir)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;

        // NamedTempFile deletes itself when persist fails and the error is dropped
        staged.persist(destination).map_err(|e| e.error)?;
        debug!("Placed {} ({} bytes)", destination.display(), bytes.len());
        Ok(())
    }

    /// Leftover temporary files in `dir` (non-recursive)
    pub fn staged_leftovers(dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut leftovers = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.starts_with('.') && name.ends_with(".partial") {
                leftovers.push(path);
            }
        }
        Ok(leftovers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_destination_beside_source() {
        let source = Path::new("/mods/A/Textures/Things/wall_north.PNG");
        assert_eq!(
            PathResolver::destination_for(source, "dds"),
            PathBuf::from("/mods/A/Textures/Things/wall_north.dds")
        );
        assert_eq!(
            PathResolver::destination_for(Path::new("a.b.png"), ".dds"),
            PathBuf::from("a.b.dds")
        );
    }

    #[test]
    fn test_case_variants_share_a_destination() {
        let lower = PathResolver::destination_for(Path::new("/mods/wall.png"), "dds");
        let upper = PathResolver::destination_for(Path::new("/mods/wall.PNG"), "dds");
        assert_eq!(
            PathResolver::collision_key(&lower),
            PathResolver::collision_key(&upper)
        );
    }

    #[test]
    fn test_is_source_texture() {
        assert!(PathResolver::is_source_texture(Path::new("x/y.png")));
        assert!(PathResolver::is_source_texture(Path::new("x/y.PnG")));
        assert!(!PathResolver::is_source_texture(Path::new("x/y.dds")));
        assert!(!PathResolver::is_source_texture(Path::new("x/png")));
    }

    #[test]
    fn test_place_atomically() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("wall.dds");

        PathResolver::place_atomically(&destination, b"DDS first").unwrap();
        PathResolver::place_atomically(&destination, b"DDS second").unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"DDS second");
        assert!(PathResolver::staged_leftovers(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_place_into_missing_dir_fails_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("missing").join("wall.dds");

        assert!(PathResolver::place_atomically(&destination, b"DDS").is_err());
        assert!(!destination.exists());
    }
}
