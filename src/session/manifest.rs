use std::path::PathBuf;

use tokio::fs;
use tracing::debug;

/// The set of scratch paths one session owns: source file, metadata record,
/// palette and output. Release deletes them all, best effort; scratch space
/// is advisory, so failures are only logged.
#[derive(Debug, Default)]
pub struct Manifest {
    paths: Vec<PathBuf>,
}

impl Manifest {
    pub fn add(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub async fn release(self) {
        for path in self.paths {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "released scratch file"),
                Err(err) => debug!(path = %path.display(), %err, "scratch release skipped"),
            }
        }
    }
}
