use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_SCRATCH_DIR: &str = "scratch";
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
const DEFAULT_MAX_UPLOAD_MB: u64 = 500;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub scratch_dir: PathBuf,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let session_ttl_secs = match env::var("KOMPRES_SESSION_TTL_SECS") {
            Ok(v) => v
                .parse()
                .context("KOMPRES_SESSION_TTL_SECS is not a number")?,
            Err(_) => DEFAULT_SESSION_TTL_SECS,
        };
        let max_upload_mb: u64 = match env::var("KOMPRES_MAX_UPLOAD_MB") {
            Ok(v) => v.parse().context("KOMPRES_MAX_UPLOAD_MB is not a number")?,
            Err(_) => DEFAULT_MAX_UPLOAD_MB,
        };

        Ok(Self {
            bind_addr: env::var("KOMPRES_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_owned()),
            scratch_dir: env::var("KOMPRES_SCRATCH_DIR")
                .unwrap_or_else(|_| DEFAULT_SCRATCH_DIR.to_owned())
                .into(),
            ffmpeg_bin: env::var("KOMPRES_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_owned()),
            ffprobe_bin: env::var("KOMPRES_FFPROBE").unwrap_or_else(|_| "ffprobe".to_owned()),
            session_ttl: Duration::from_secs(session_ttl_secs),
            max_upload_bytes: (max_upload_mb * 1024 * 1024) as usize,
        })
    }
}
