// crates/core/src/lib.rs
pub mod api;
pub mod client;
pub mod config;
pub mod download;
pub mod endpoint;
pub mod error;
pub mod generation;
pub mod health;
pub mod orchestrator;
pub mod paths;
pub mod poller;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiSlot, HttpJobApi, JobApi, SubmitRequest};
pub use client::StemsmithClient;
pub use config::ClientConfig;
pub use download::{ArtifactSink, DirectorySink, DownloadTrigger, SavedArtifact};
pub use endpoint::{EndpointStore, DEFAULT_ENDPOINT, ENDPOINT_STORAGE_KEY};
pub use error::*;
pub use health::HealthProber;
pub use orchestrator::{Orchestrator, RemovalChoice, RemoveOutcome};
pub use poller::{JobPoller, PollEvent, PollSink, PollerState};
pub use upload::{UploadCoordinator, UploadFile};
