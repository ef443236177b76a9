//! RAII guard over the scratch files of a single transfer.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use common::Job;

/// Compressed and decompressed scratch paths of one job.
///
/// Both files are removed when the guard is dropped, which covers normal
/// return, `?` propagation, panics and the task being aborted.
#[derive(Debug)]
pub struct StagedFiles {
    pub gz: PathBuf,
    pub csv: PathBuf,
}

impl StagedFiles {
    pub fn new(staging_dir: &Path, job: &Job) -> Self {
        Self {
            gz: staging_dir.join(job.gz_name()),
            csv: staging_dir.join(job.csv_name()),
        }
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        for path in [&self.gz, &self.csv] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("could not remove {}: {e}", path.display()),
            }
        }
    }
}
