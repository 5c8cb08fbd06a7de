// crates/core/src/upload.rs
//! Submission of a WAV file plus job config.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use stemsmith_types::{JobConfig, JobHandle};

use crate::api::{ApiSlot, SubmitRequest};
use crate::error::{ApiError, UploadError};

/// MIME types accepted as WAV when the file name says otherwise.
pub const WAV_CONTENT_TYPES: &[&str] = &["audio/wav", "audio/x-wav", "audio/wave"];

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    /// Declared MIME type, if the source knew one.
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string());
        Ok(Self::new(file_name, content_type, Bytes::from(bytes)))
    }

    fn has_wav_suffix(&self) -> bool {
        has_wav_suffix(&self.file_name)
    }

    fn has_wav_mime(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.split(';').next().unwrap_or("").trim();
                WAV_CONTENT_TYPES.iter().any(|w| w.eq_ignore_ascii_case(ct))
            })
            .unwrap_or(false)
    }

    /// Recognised as WAV by suffix or declared MIME type.
    pub fn is_wav(&self) -> bool {
        self.has_wav_suffix() || self.has_wav_mime()
    }

    /// Filename sent in the multipart part. The service only accepts `.wav`
    /// names, so a file accepted by MIME alone gets the suffix appended.
    pub fn part_file_name(&self) -> String {
        if self.has_wav_suffix() {
            self.file_name.clone()
        } else if self.file_name.is_empty() {
            "upload.wav".to_string()
        } else {
            format!("{}.wav", self.file_name)
        }
    }
}

fn has_wav_suffix(name: &str) -> bool {
    name.len() > 4
        && name
            .get(name.len() - 4..)
            .map(|ext| ext.eq_ignore_ascii_case(".wav"))
            .unwrap_or(false)
}

/// Validates and uploads files. Concurrent submissions are not deduplicated;
/// callers read [`UploadCoordinator::is_uploading`] to disable their control.
#[derive(Debug, Clone)]
pub struct UploadCoordinator {
    api: ApiSlot,
    in_flight: Arc<AtomicUsize>,
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl UploadCoordinator {
    pub fn new(api: ApiSlot) -> Self {
        Self {
            api,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    /// Upload `file` with an optional config. Returns a fresh handle on
    /// success; nothing is retried.
    pub async fn submit(
        &self,
        file: Option<UploadFile>,
        config: Option<&JobConfig>,
    ) -> Result<JobHandle, UploadError> {
        let file = file.ok_or(UploadError::MissingFile)?;
        if !file.is_wav() {
            return Err(UploadError::NotWav {
                file_name: file.file_name,
            });
        }
        let config_json = config
            .map(JobConfig::to_json)
            .transpose()
            .map_err(|e| UploadError::InvalidConfig(e.to_string()))?;

        let request = SubmitRequest {
            file_name: file.part_file_name(),
            bytes: file.bytes,
            config_json,
        };

        let _guard = InFlight::enter(&self.in_flight);
        let api = self.api.current();
        tracing::debug!(
            endpoint = %api.endpoint(),
            file_name = %request.file_name,
            bytes = request.bytes.len(),
            "uploading"
        );
        match api.submit(request).await {
            Ok(id) => Ok(JobHandle::new(id)),
            Err(e) => {
                tracing::warn!(endpoint = %api.endpoint(), error = %e, "upload failed");
                Err(upload_error(e))
            }
        }
    }
}

fn upload_error(e: ApiError) -> UploadError {
    match e {
        ApiError::Server { status, body } => UploadError::Rejected { status, body },
        ApiError::NotFound => UploadError::Rejected {
            status: 404,
            body: String::new(),
        },
        other => UploadError::Failed {
            detail: other.to_string(),
        },
    }
}
