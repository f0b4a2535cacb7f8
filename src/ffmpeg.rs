//! FFmpeg command wrapper utilities

use std::process::{Command, Output};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("FFmpeg not found in system PATH")]
    NotInstalled,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct FfmpegCommand {
    args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        // Never block on an overwrite prompt; temp outputs already exist
        Self { args: vec!["-y".to_string(), "-loglevel".to_string(), "error".to_string()] }
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("-i".to_string());
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn execute(self) -> Result<Output, FfmpegError> {
        if !is_ffmpeg_installed() {
            return Err(FfmpegError::NotInstalled);
        }

        let output = Command::new("ffmpeg")
            .args(&self.args)
            .output()
            .map_err(|e| FfmpegError::ExecutionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FfmpegError::ExecutionFailed(stderr.to_string()));
        }

        Ok(output)
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode any FFmpeg-readable audio file into a mono 32-bit float WAV.
pub fn decode_to_wav(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<(), FfmpegError> {
    FfmpegCommand::new()
        .input(input)
        .args(&[
            "-vn",                 // Drop cover art streams
            "-ac", "1",            // Downmix to mono
            "-c:a", "pcm_f32le",
            "-f", "wav",
        ])
        .output(output)
        .execute()?;

    Ok(())
}

pub fn is_ffmpeg_installed() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .is_ok()
}
