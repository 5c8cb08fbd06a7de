// crates/core/src/download.rs
//! Fetching a completed job's artifact and handing it to a save sink.
//!
//! Gating (completed only, one download at a time) lives in the
//! orchestrator; this module only moves bytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::api::JobApi;
use crate::error::DownloadError;

/// Name the artifact of job `id` is saved under.
pub fn artifact_file_name(job_id: &str) -> String {
    let safe: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("job-{safe}.zip")
}

/// Where a downloaded artifact ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Receives the downloaded blob.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save(&self, job_id: &str, blob: Bytes) -> Result<SavedArtifact, DownloadError>;
}

/// Writes `job-<id>.zip` into a directory, creating it if needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(&self, job_id: &str, blob: Bytes) -> Result<SavedArtifact, DownloadError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(save_err(&self.dir))?;

        let path = self.dir.join(artifact_file_name(job_id));
        // Only complete files appear under the final name.
        let partial = path.with_extension("zip.part");
        tokio::fs::write(&partial, &blob)
            .await
            .map_err(save_err(&partial))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(save_err(&path))?;

        Ok(SavedArtifact {
            path,
            bytes: blob.len() as u64,
        })
    }
}

/// Fetches artifacts and passes them to a sink.
#[derive(Clone)]
pub struct DownloadTrigger {
    sink: Arc<dyn ArtifactSink>,
}

fn save_err(path: &Path) -> impl FnOnce(std::io::Error) -> DownloadError {
    let path = path.display().to_string();
    move |source| DownloadError::Save { path, source }
}

impl DownloadTrigger {
    pub fn new(sink: Arc<dyn ArtifactSink>) -> Self {
        Self { sink }
    }

    pub fn to_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(DirectorySink::new(dir)))
    }

    /// Download through `api` (captured by the caller) and save.
    pub async fn fetch_and_save(
        &self,
        api: &dyn JobApi,
        job_id: &str,
    ) -> Result<SavedArtifact, DownloadError> {
        let t0 = std::time::Instant::now();
        let blob = api.download(job_id).await.map_err(|e| {
            tracing::warn!(job_id, endpoint = %api.endpoint(), error = %e, "download failed");
            DownloadError::from(e)
        })?;
        let saved = self.sink.save(job_id, blob).await?;
        tracing::info!(
            job_id,
            path = %saved.path.display(),
            bytes = saved.bytes,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "artifact saved"
        );
        Ok(saved)
    }
}

impl std::fmt::Debug for DownloadTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTrigger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::testing::FakeApi;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(artifact_file_name("abc123"), "job-abc123.zip");
        assert_eq!(artifact_file_name("../etc"), "job-___etc.zip");
    }

    #[tokio::test]
    async fn test_saves_blob_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("stems");
        let api = FakeApi::new();
        api.downloads.push(Ok(Bytes::from_static(b"PK\x03\x04")));

        let saved = DownloadTrigger::to_dir(&target)
            .fetch_and_save(&api, "abc123")
            .await
            .unwrap();

        assert_eq!(saved.path, target.join("job-abc123.zip"));
        assert_eq!(saved.bytes, 4);
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"PK\x03\x04");
        assert!(!target.join("job-abc123.zip.part").exists());
    }

    #[tokio::test]
    async fn test_server_error_body_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi::new();
        api.downloads.push(Err(ApiError::Server {
            status: 409,
            body: r#"{"error":"job not completed"}"#.into(),
        }));

        let err = DownloadTrigger::to_dir(dir.path())
            .fetch_and_save(&api, "abc123")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), r#"{"error":"job not completed"}"#);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_target_is_save_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let api = FakeApi::new();
        api.downloads.push(Ok(Bytes::from_static(b"PK")));

        let err = DownloadTrigger::to_dir(blocker.join("sub"))
            .fetch_and_save(&api, "abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Save { .. }));
    }
}
