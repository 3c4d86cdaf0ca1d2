//! # Texconv Backend
//!
//! Adapter sul tool esterno `texconv` (DirectXTex).
//!
//! L'immagine preparata viene scritta come PNG in una directory temporanea
//! privata, `texconv` la converte lì dentro e i byte del DDS vengono letti
//! indietro. La directory temporanea sparisce con il `TempDir`.

use super::{CompressionBackend, Compressed, Device, QualityProfile};
use crate::error::BackendError;
use image::{ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

const STAGED_STEM: &str = "input";

pub struct TexconvBackend {
    exe: PathBuf,
    device: Device,
    name: &'static str,
}

impl TexconvBackend {
    /// GPU path (`-gpu 0`)
    pub fn gpu(exe: PathBuf) -> Self {
        Self {
            exe,
            device: Device::Gpu,
            name: "texconv-gpu",
        }
    }

    /// CPU-only path (`-nogpu`)
    pub fn cpu(exe: PathBuf) -> Self {
        Self {
            exe,
            device: Device::Cpu,
            name: "texconv-cpu",
        }
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    /// Command line for converting `input` into `out_dir`
    pub fn build_args(
        &self,
        input: &Path,
        out_dir: &Path,
        profile: &QualityProfile,
        mipmaps: bool,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-f".into(),
            profile.format.dxgi_name().into(),
            "-ft".into(),
            "dds".into(),
            "-y".into(),
            "-nologo".into(),
            "-o".into(),
            out_dir.to_string_lossy().into_owned(),
            "-m".into(),
            if mipmaps { "0" } else { "1" }.into(),
        ];

        if profile.premultiplied_alpha {
            args.push("-pmalpha".into());
        }

        match self.device {
            Device::Gpu => args.extend(["-gpu".into(), "0".into()]),
            Device::Cpu => args.push("-nogpu".into()),
        }

        args.push(input.to_string_lossy().into_owned());
        args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.exe);
        command.stdin(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        command
    }

    fn run(&self, args: &[String]) -> Result<Output, BackendError> {
        debug!("{} {}", self.exe.display(), args.join(" "));
        let output = self.command().args(args).output()?;
        if !output.status.success() {
            return Err(BackendError::ToolFailed {
                tool: self.name.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// texconv keeps the input stem and may pick the extension's case
    fn find_output(dir: &Path) -> Option<PathBuf> {
        std::fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .find(|path| {
                path.file_stem().map(|s| s == STAGED_STEM).unwrap_or(false)
                    && path
                        .extension()
                        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("dds"))
                        .unwrap_or(false)
            })
    }
}

impl CompressionBackend for TexconvBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn probe(&self) -> Result<(), BackendError> {
        if !self.exe.is_file() {
            return Err(BackendError::Unavailable(format!(
                "texconv not found at {}",
                self.exe.display()
            )));
        }
        // texconv prints its usage and exits non-zero without arguments;
        // only a failure to launch matters here
        self.command()
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                BackendError::Unavailable(format!("cannot launch {}: {}", self.exe.display(), e))
            })?;
        Ok(())
    }

    fn compress(
        &self,
        image: &RgbaImage,
        profile: &QualityProfile,
        mipmaps: bool,
    ) -> Result<Compressed, BackendError> {
        let staging = tempfile::Builder::new().prefix("texconv-").tempdir()?;
        let input = staging.path().join(format!("{}.png", STAGED_STEM));
        let out_dir = staging.path().join("out");
        std::fs::create_dir(&out_dir)?;

        image
            .save_with_format(&input, ImageFormat::Png)
            .map_err(|e| BackendError::Encode(format!("staging input failed: {}", e)))?;

        self.run(&self.build_args(&input, &out_dir, profile, mipmaps))?;

        let produced = Self::find_output(&out_dir)
            .ok_or_else(|| BackendError::MissingOutput(self.name.to_string()))?;
        Ok(Compressed::new(std::fs::read(produced)?, self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextureFormat;

    fn profile(premultiplied_alpha: bool) -> QualityProfile {
        QualityProfile {
            format: TextureFormat::Bc7,
            premultiplied_alpha,
        }
    }

    #[test]
    fn test_gpu_args() {
        let backend = TexconvBackend::gpu(PathBuf::from("texconv.exe"));
        let args = backend.build_args(Path::new("in.png"), Path::new("out"), &profile(true), true);

        assert_eq!(
            args,
            vec![
                "-f", "BC7_UNORM", "-ft", "dds", "-y", "-nologo", "-o", "out", "-m", "0",
                "-pmalpha", "-gpu", "0", "in.png"
            ]
        );
    }

    #[test]
    fn test_cpu_args_without_mips() {
        let backend = TexconvBackend::cpu(PathBuf::from("texconv.exe"));
        let profile = QualityProfile {
            format: TextureFormat::Bc3,
            premultiplied_alpha: false,
        };
        let args = backend.build_args(Path::new("in.png"), Path::new("out"), &profile, false);

        assert!(args.windows(2).any(|w| w == ["-f", "BC3_UNORM"]));
        assert!(args.windows(2).any(|w| w == ["-m", "1"]));
        assert!(args.contains(&"-nogpu".to_string()));
        assert!(!args.contains(&"-pmalpha".to_string()));
        assert!(!args.contains(&"-gpu".to_string()));
    }

    #[test]
    fn test_find_output_any_case() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(TexconvBackend::find_output(temp_dir.path()).is_none());

        std::fs::write(temp_dir.path().join("input.DDS"), b"DDS ").unwrap();
        assert_eq!(
            TexconvBackend::find_output(temp_dir.path()),
            Some(temp_dir.path().join("input.DDS"))
        );
    }

    #[test]
    fn test_probe_missing_exe() {
        let backend = TexconvBackend::cpu(PathBuf::from("/definitely/not/texconv.exe"));
        assert!(matches!(backend.probe(), Err(BackendError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_reports_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let script = temp_dir.path().join("texconv");
        std::fs::write(&script, "#!/bin/sh\necho 'no adapter' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = TexconvBackend::cpu(script);
        let err = backend
            .compress(&RgbaImage::new(4, 4), &profile(false), true)
            .unwrap_err();
        match err {
            BackendError::ToolFailed { tool, stderr, .. } => {
                assert_eq!(tool, "texconv-cpu");
                assert_eq!(stderr, "no adapter");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_tool_output_is_read_back() {
        use std::os::unix::fs::PermissionsExt;

        // writes "DDS fake" into the -o directory, named after the input stem
        let temp_dir = tempfile::TempDir::new().unwrap();
        let script = temp_dir.path().join("texconv");
        std::fs::write(
            &script,
            "#!/bin/sh\nout=''\nwhile [ $# -gt 1 ]; do\n  if [ \"$1\" = '-o' ]; then out=\"$2\"; fi\n  shift\ndone\nprintf 'DDS fake' > \"$out/input.dds\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = TexconvBackend::gpu(script);
        let compressed = backend
            .compress(&RgbaImage::new(4, 4), &profile(true), true)
            .unwrap();
        assert_eq!(compressed.bytes, b"DDS fake");
        assert_eq!(compressed.device, Device::Gpu);
    }
}
