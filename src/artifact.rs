//! Artifact downloader
//!
//! Fetches a rendered report (PDF or CSV), stages it in a temporary file and
//! lends it to the caller. The temporary file lives only as long as the
//! caller's action; it is removed afterwards whether the action succeeds,
//! fails or panics.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::backend::AnalysisBackend;
use crate::error::{AnalysisError, Result};
use crate::types::{ArtifactFormat, JobId};

/// A downloaded artifact, valid for the duration of the caller's action
#[derive(Debug)]
pub struct Artifact {
    job_id: JobId,
    format: ArtifactFormat,
    path: PathBuf,
    len: u64,
}

impl Artifact {
    /// Job the artifact belongs to
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Location of the staged bytes
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `file://` URI of the staged bytes
    pub fn uri(&self) -> String {
        format!("file://{}", self.path.display())
    }

    /// Size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Suggested name for saving, e.g. `wallet-analysis-job-1.pdf`
    pub fn file_name(&self) -> String {
        file_name(&self.job_id, self.format)
    }

    /// Read the staged bytes into memory
    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}

fn file_name(job_id: &JobId, format: ArtifactFormat) -> String {
    let safe: String = job_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("wallet-analysis-{}.{}", safe, format.as_str())
}

/// Downloads report artifacts into short-lived temporary files
pub struct ArtifactDownloader {
    backend: Arc<dyn AnalysisBackend>,
    scratch_dir: Option<PathBuf>,
}

impl ArtifactDownloader {
    /// Downloader staging into the system temp directory
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self {
            backend,
            scratch_dir: None,
        }
    }

    /// Stage artifacts under `dir` instead of the system temp directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Download an artifact and run `action` on it.
    ///
    /// `format` is validated before any request. The staged file is deleted
    /// once `action` returns (or unwinds).
    pub async fn download_with<T, E, F>(
        &self,
        job_id: &JobId,
        format: &str,
        action: F,
    ) -> std::result::Result<T, E>
    where
        E: From<AnalysisError>,
        F: FnOnce(&Artifact) -> std::result::Result<T, E>,
    {
        let format: ArtifactFormat = format.parse()?;
        let staged = self.stage(job_id, format).await?;

        let artifact = Artifact {
            job_id: job_id.clone(),
            format,
            path: staged.path().to_path_buf(),
            len: staged.as_file().metadata().map_err(AnalysisError::from)?.len(),
        };
        debug!("Staged {} artifact of {} at {}", format, job_id, artifact.uri());

        let result = action(&artifact);

        if let Err(e) = staged.close() {
            warn!("Failed to remove staged artifact {}: {}", artifact.path.display(), e);
        }
        result
    }

    /// Download an artifact and save it into `dir` under its suggested name
    pub async fn save_to(&self, job_id: &JobId, format: &str, dir: &Path) -> Result<PathBuf> {
        let format: ArtifactFormat = format.parse()?;
        std::fs::create_dir_all(dir)?;
        let saved = self
            .download_with(job_id, format.as_str(), |artifact| -> Result<PathBuf> {
                let target = dir.join(artifact.file_name());
                std::fs::copy(artifact.path(), &target)?;
                Ok(target)
            })
            .await?;
        info!("Saved artifact of analysis {} to {}", job_id, saved.display());
        Ok(saved)
    }

    async fn stage(&self, job_id: &JobId, format: ArtifactFormat) -> Result<NamedTempFile> {
        let bytes = self.backend.download_artifact(job_id, format).await?;

        let suffix = format!(".{}", format.as_str());
        let mut builder = tempfile::Builder::new();
        builder.prefix("wallet-analysis-").suffix(&suffix);
        let mut file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(file)
    }
}
