pub mod manifest;

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::media::params::SUPPORTED_FORMATS;
use self::manifest::Manifest;

const TOKEN_LEN: usize = 16;

/// Metadata record published beside each uploaded file, so a returning
/// browser tab can reattach to an in-flight or recent upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub original_name: String,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub timestamp: u64,
    pub session_id: String,
    pub token: String,
}

/// Scratch-directory store. Every artifact a session creates is named by
/// its token, so ownership needs no bookkeeping beyond the directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    scratch_dir: PathBuf,
    ttl: Duration,
}

impl SessionStore {
    pub async fn new(scratch_dir: PathBuf, ttl: Duration) -> Result<Self> {
        fs::create_dir_all(&scratch_dir)
            .await
            .with_context(|| format!("creating scratch dir {}", scratch_dir.display()))?;
        info!(dir = %scratch_dir.display(), "scratch directory ready");
        Ok(Self { scratch_dir, ttl })
    }

    /// The allow-listed container extension of an upload, lowercased.
    pub fn allowed_extension(original_name: &str) -> Option<String> {
        let ext = Path::new(original_name).extension()?.to_str()?.to_lowercase();
        SUPPORTED_FORMATS.contains(&ext.as_str()).then_some(ext)
    }

    /// Write the upload to scratch and publish its session record. The
    /// record is only written after the bytes are fully on disk, so a
    /// record never references a partial file.
    pub async fn store_upload(&self, original_name: &str, data: &[u8]) -> Result<SessionRecord> {
        let ext = Self::allowed_extension(original_name)
            .context("upload extension is not allow-listed")?;
        let token = generate_token();
        let file_path = self.scratch_dir.join(format!("{}.{}", token, ext));

        fs::write(&file_path, data)
            .await
            .with_context(|| format!("writing upload to {}", file_path.display()))?;

        let record = SessionRecord {
            original_name: original_name.to_owned(),
            file_path: file_path.clone(),
            file_size: data.len() as u64,
            timestamp: unix_now(),
            session_id: generate_token(),
            token: token.clone(),
        };
        let json = serde_json::to_vec(&record)?;
        fs::write(self.record_path(&token), json)
            .await
            .context("publishing session record")?;

        debug!(%token, size = record.file_size, "stored upload");
        Ok(record)
    }

    /// Resume lookup. A record past the expiry window, or whose source file
    /// is gone, is never returned.
    pub async fn lookup(&self, token: &str) -> Option<SessionRecord> {
        if !valid_token(token) {
            return None;
        }
        let raw = fs::read(self.record_path(token)).await.ok()?;
        let record: SessionRecord = serde_json::from_slice(&raw).ok()?;
        if unix_now().saturating_sub(record.timestamp) > self.ttl.as_secs() {
            debug!(token, "session record expired");
            return None;
        }
        if fs::metadata(&record.file_path).await.is_err() {
            debug!(token, "session source file is gone");
            return None;
        }
        Some(record)
    }

    pub fn record_path(&self, token: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}.json", token))
    }

    pub fn output_path(&self, token: &str, ext: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}_out.{}", token, ext))
    }

    pub fn palette_path(&self, token: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}_palette.png", token))
    }

    /// Everything in scratch belonging to a token, as a releasable manifest.
    pub async fn manifest(&self, token: &str) -> Manifest {
        let mut manifest = Manifest::default();
        if !valid_token(token) {
            return manifest;
        }
        let source_prefix = format!("{}.", token);
        let derived_prefix = format!("{}_", token);
        if let Ok(mut entries) = fs::read_dir(&self.scratch_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.starts_with(&source_prefix) || name.starts_with(&derived_prefix) {
                    manifest.add(entry.path());
                }
            }
        }
        manifest
    }

    pub async fn release(&self, token: &str) {
        self.manifest(token).await.release().await;
    }

    /// Delete any scratch entry older than the session TTL. Runs
    /// opportunistically on each new upload and once at shutdown.
    pub async fn sweep(&self) {
        let cutoff = SystemTime::now() - self.ttl;
        let mut entries = match fs::read_dir(&self.scratch_dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%err, "scratch sweep could not read directory");
                return;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let stale = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified < cutoff,
                Err(_) => false,
            };
            if stale {
                let path = entry.path();
                match fs::remove_file(&path).await {
                    Ok(()) => debug!(path = %path.display(), "swept stale scratch file"),
                    Err(err) => debug!(path = %path.display(), %err, "sweep skipped file"),
                }
            }
        }
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Tokens name files in the scratch directory, so anything outside the
/// alphanumeric alphabet is rejected outright.
fn valid_token(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
