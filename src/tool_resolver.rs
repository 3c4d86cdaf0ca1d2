//! # Tool Path Resolver
//!
//! Trova i tool esterni di compressione (per ora solo `texconv`).
//!
//! Ordine di ricerca:
//! 1. Path esplicito da configurazione (`--texconv`)
//! 2. Variabile d'ambiente `TOOLS_DIR`
//! 3. Cartella `compressors/` accanto all'eseguibile o nella working directory
//! 4. `PATH` di sistema

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const TEXCONV: &str = "texconv";

/// Directory name used by the usual modding tool bundles
const BUNDLE_DIR: &str = "compressors";

/// Tool path resolver for bundled and system-installed tools
#[derive(Debug, Clone)]
pub struct ToolResolver {
    explicit: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    use_system_path: bool,
}

impl ToolResolver {
    /// Resolver with the standard search order
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            search_dirs: Self::detect_bundle_dirs(),
            use_system_path: true,
        }
    }

    /// Resolver that only looks in `dirs` (plus the explicit path)
    pub fn with_search_dirs(explicit: Option<PathBuf>, dirs: Vec<PathBuf>) -> Self {
        Self {
            explicit,
            search_dirs: dirs,
            use_system_path: false,
        }
    }

    fn detect_bundle_dirs() -> Vec<PathBuf> {
        let mut dirs = Vec::new();

        if let Ok(tools_dir) = env::var("TOOLS_DIR") {
            debug!("Checking TOOLS_DIR environment variable: {}", tools_dir);
            dirs.push(PathBuf::from(tools_dir));
        }

        if let Some(app_dir) = env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
            dirs.push(app_dir.join(BUNDLE_DIR));
        }

        if let Ok(current_dir) = env::current_dir() {
            dirs.push(current_dir.join(BUNDLE_DIR));
        }

        dirs
    }

    fn executable_name(tool_name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", tool_name)
        } else {
            tool_name.to_string()
        }
    }

    /// Resolve the path to a specific tool
    pub fn resolve(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(explicit) = &self.explicit {
            if explicit.is_file() {
                debug!("Using configured {} -> {}", tool_name, explicit.display());
                return Some(explicit.clone());
            }
            warn!("Configured {} path does not exist: {}", tool_name, explicit.display());
            return None;
        }

        let executable = Self::executable_name(tool_name);
        // texconv ships as texconv.exe even when run through wine
        let candidates = [executable.clone(), format!("{}.exe", tool_name)];

        for dir in &self.search_dirs {
            for name in &candidates {
                let path = dir.join(name);
                if path.is_file() {
                    debug!("Using bundled tool: {} -> {}", tool_name, path.display());
                    return Some(path);
                }
            }
        }

        if self.use_system_path {
            if let Some(path) = Self::find_in_system_path(&executable) {
                debug!("Using system tool: {} -> {}", tool_name, path.display());
                return Some(path);
            }
        }

        debug!("Tool not found: {}", tool_name);
        None
    }

    /// Find tool in system PATH
    fn find_in_system_path(executable: &str) -> Option<PathBuf> {
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(executable))
            .find(|path| path.is_file())
    }

    pub fn texconv(&self) -> Option<PathBuf> {
        self.resolve(TEXCONV)
    }

    /// Get a report of tool availability
    pub fn report(&self) -> String {
        let mut report = String::from("Tool Resolver Report\n");
        if let Some(explicit) = &self.explicit {
            report.push_str(&format!("Configured texconv: {}\n", explicit.display()));
        }
        report.push_str("Search directories:\n");
        for dir in &self.search_dirs {
            let marker = if dir.is_dir() { "found" } else { "missing" };
            report.push_str(&format!("  {} ({})\n", dir.display(), marker));
        }
        if self.use_system_path {
            report.push_str("  + system PATH\n");
        }

        report.push_str("\nTools:\n");
        match self.texconv() {
            Some(path) => report.push_str(&format!("  ✅ {} -> {}\n", TEXCONV, path.display())),
            None => report.push_str(&format!(
                "  ❌ {} (not found, the native encoder will be used)\n",
                TEXCONV
            )),
        }
        report.push_str("  ✅ native (built in)\n");
        report
    }
}

impl Default for ToolResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolves_from_bundle_dir() {
        let temp_dir = TempDir::new().unwrap();
        let bundle = temp_dir.path().join(BUNDLE_DIR);
        std::fs::create_dir_all(&bundle).unwrap();
        std::fs::write(bundle.join("texconv.exe"), b"").unwrap();

        let resolver = ToolResolver::with_search_dirs(None, vec![bundle.clone()]);
        assert_eq!(resolver.texconv(), Some(bundle.join("texconv.exe")));
    }

    #[test]
    fn test_explicit_path_wins() {
        let temp_dir = TempDir::new().unwrap();
        let explicit = temp_dir.path().join("my-texconv");
        std::fs::write(&explicit, b"").unwrap();

        let resolver = ToolResolver::with_search_dirs(Some(explicit.clone()), vec![]);
        assert_eq!(resolver.texconv(), Some(explicit));
    }

    #[test]
    fn test_missing_explicit_path_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let bundle = temp_dir.path().to_path_buf();
        std::fs::write(bundle.join("texconv.exe"), b"").unwrap();

        let resolver =
            ToolResolver::with_search_dirs(Some(bundle.join("nope.exe")), vec![bundle]);
        assert!(resolver.texconv().is_none());
    }

    #[test]
    fn test_report_lists_tools() {
        let resolver = ToolResolver::with_search_dirs(None, vec![PathBuf::from("/nonexistent")]);
        let report = resolver.report();
        assert!(report.contains("/nonexistent (missing)"));
        assert!(report.contains("❌ texconv"));
    }
}
