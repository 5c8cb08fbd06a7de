// crates/core/src/api/http.rs
//! reqwest-backed [`JobApi`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use stemsmith_types::{JobId, JobStatus, SubmitResponse};

use super::{JobApi, SubmitRequest};
use crate::error::ApiError;

/// MIME type every audio part is labelled with, whatever the file declared.
pub const WAV_MIME: &str = "audio/wav";

/// HTTP client for one service endpoint.
#[derive(Debug, Clone)]
pub struct HttpJobApi {
    client: Client,
    base: String,
}

impl HttpJobApi {
    /// Create a client for `base_url`. Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = normalize_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    fn job_url(&self, job_id: &str, suffix: &str) -> String {
        let id = urlencoding::encode(job_id);
        self.url(&format!("jobs/{id}{suffix}"))
    }
}

/// Validate an endpoint and strip trailing slashes.
pub fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
    let trimmed = base_url.trim();
    let parsed = Url::parse(trimmed).map_err(|e| ApiError::InvalidEndpoint {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::InvalidEndpoint {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn submit(&self, request: SubmitRequest) -> Result<JobId, ApiError> {
        let len = request.bytes.len() as u64;
        let audio = Part::stream_with_length(request.bytes, len)
            .file_name(request.file_name)
            .mime_str(WAV_MIME)?;
        let mut form = Form::new().part("file", audio);
        if let Some(config) = request.config_json {
            form = form.part("config", Part::text(config).mime_str("application/json")?);
        }

        let t0 = std::time::Instant::now();
        let resp = self.client.post(self.url("jobs")).multipart(form).send().await?;
        if !resp.status().is_success() {
            let err = ApiError::from_response(resp).await;
            tracing::warn!(endpoint = %self.base, error = %err, "job submission rejected");
            return Err(err);
        }
        let body: SubmitResponse = resp.json().await?;
        tracing::info!(
            endpoint = %self.base,
            job_id = %body.id,
            bytes = len,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "job submitted"
        );
        Ok(body.id)
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatus, ApiError> {
        let resp = self.client.get(self.job_url(job_id, "")).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::from_response(resp).await);
        }
        let mut status: JobStatus = resp.json().await?;
        if status.id.is_empty() {
            status.id = job_id.to_string();
        }
        Ok(status)
    }

    async fn download(&self, job_id: &str) -> Result<Bytes, ApiError> {
        let resp = self
            .client
            .get(self.job_url(job_id, "/download"))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::from_response(resp).await);
        }
        Ok(resp.bytes().await?)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), ApiError> {
        let resp = self.client.delete(self.job_url(job_id, "")).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::from_response(resp).await);
        }
        Ok(())
    }

    async fn health(&self) -> Result<(), ApiError> {
        let resp = self.client.get(self.url("health")).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::from_response(resp).await);
        }
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use stemsmith_types::JobPhase;

    fn api(server: &mockito::Server) -> HttpJobApi {
        HttpJobApi::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:8345/").unwrap(),
            "http://localhost:8345"
        );
        assert!(matches!(
            normalize_base_url("localhost:8345"),
            Err(ApiError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            normalize_base_url("ftp://example.com"),
            Err(ApiError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_sends_multipart_and_returns_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/jobs")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".into()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file"; filename="track.wav""#.into()),
                Matcher::Regex("(?i)content-type: audio/wav".into()),
                Matcher::Regex(r#"name="config""#.into()),
                Matcher::Regex(r#"\{"model":"balanced-four-stem","stems":\["drums","vocals"\]\}"#.into()),
            ]))
            .with_status(202)
            .with_body(r#"{"id":"abc123"}"#)
            .create_async()
            .await;

        let id = api(&server)
            .submit(SubmitRequest {
                file_name: "track.wav".into(),
                bytes: Bytes::from_static(b"RIFF....WAVEfmt "),
                config_json: Some(
                    r#"{"model":"balanced-four-stem","stems":["drums","vocals"]}"#.into(),
                ),
            })
            .await
            .unwrap();

        assert_eq!(id, "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_rejection_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/jobs")
            .with_status(400)
            .with_body(r#"{"error":"WAV input required"}"#)
            .create_async()
            .await;

        let err = api(&server)
            .submit(SubmitRequest {
                file_name: "track.wav".into(),
                bytes: Bytes::from_static(b"RIFF"),
                config_json: None,
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ApiError::Server {
                status: 400,
                body: r#"{"error":"WAV input required"}"#.into()
            }
        );
    }

    #[tokio::test]
    async fn test_get_status_decodes_snapshot() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"abc123","status":"running","progress":0.42}"#)
            .create_async()
            .await;

        let status = api(&server).get_status("abc123").await.unwrap();
        assert_eq!(status.status, JobPhase::Running);
        assert_eq!(status.percent(), Some(42));
    }

    #[tokio::test]
    async fn test_get_status_fills_missing_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"failed","error":"decoder error"}"#)
            .create_async()
            .await;

        let status = api(&server).get_status("abc123").await.unwrap();
        assert_eq!(status.id, "abc123");
        assert_eq!(status.status, JobPhase::Failed);
        assert_eq!(status.visible_error(), Some("decoder error"));
    }

    #[tokio::test]
    async fn test_get_status_completed_without_id_or_progress() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"completed","output_dir":"/out/abc123"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/jobs/def456")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"def456","status":"queued","progress":null}"#)
            .create_async()
            .await;

        let api = api(&server);
        let done = api.get_status("abc123").await.unwrap();
        assert_eq!(done.id, "abc123");
        assert!(done.is_terminal());
        assert_eq!(done.output_location.as_deref(), Some("/out/abc123"));
        assert_eq!(done.progress(), None);

        let queued = api.get_status("def456").await.unwrap();
        assert_eq!(queued.status, JobPhase::Queued);
        assert_eq!(queued.progress, None);
    }

    #[tokio::test]
    async fn test_get_status_404_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/missing")
            .with_status(404)
            .with_body(r#"{"error":"job not found"}"#)
            .create_async()
            .await;

        let err = api(&server).get_status("missing").await.unwrap_err();
        assert_eq!(err, ApiError::NotFound);
    }

    #[tokio::test]
    async fn test_get_status_500_is_recoverable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc123")
            .with_status(503)
            .with_body(r#"{"error":"service not ready"}"#)
            .create_async()
            .await;

        let err = api(&server).get_status("abc123").await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, ApiError::Server { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_get_status_malformed_json_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc123")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = api(&server).get_status("abc123").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_job_id_is_percent_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/jobs/a%20b")
            .with_status(204)
            .create_async()
            .await;

        api(&server).cancel("a b").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_404_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/jobs/gone")
            .with_status(404)
            .create_async()
            .await;

        assert_eq!(api(&server).cancel("gone").await.unwrap_err(), ApiError::NotFound);
    }

    #[tokio::test]
    async fn test_download_returns_bytes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc123/download")
            .with_status(200)
            .with_header("content-type", "application/zip")
            .with_body(b"PK\x03\x04stems")
            .create_async()
            .await;

        let bytes = api(&server).download("abc123").await.unwrap();
        assert_eq!(&bytes[..], b"PK\x03\x04stems");
    }

    #[tokio::test]
    async fn test_download_conflict_surfaces_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc123/download")
            .with_status(409)
            .with_body(r#"{"error":"job not completed"}"#)
            .create_async()
            .await;

        let err = api(&server).download("abc123").await.unwrap_err();
        assert_eq!(err.to_string(), r#"{"error":"job not completed"}"#);
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;
        assert!(api(&server).health().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) is closed on CI hosts.
        let api = HttpJobApi::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = api.health().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
