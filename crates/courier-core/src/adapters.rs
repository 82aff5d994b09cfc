//! Seams to the external Extractor and DeliveryGateway capabilities.
//!
//! The core treats both as opaque, possibly slow, possibly flaky
//! dependencies: no retries happen inside an adapter, classification into
//! transient/permanent is the adapter's job, and the scheduler retries at
//! the job level.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DeliverError, ExtractError};
use crate::store::types::QualitySpec;

/// What kind of media an artifact holds; delivery layers use it to pick the
/// right upload channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

/// A resolved, locally materialized media file ready for delivery.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Lives inside the job's spool directory until delivered.
    pub path: PathBuf,
    pub size_bytes: u64,
    pub media_kind: MediaKind,
}

/// Resolves a source URL and quality into a concrete local file.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Materialize the media behind `url` at `quality` into a file under
    /// `dest_dir`. Must not write outside `dest_dir`.
    async fn resolve(
        &self,
        url: &str,
        quality: QualitySpec,
        dest_dir: &Path,
    ) -> Result<Artifact, ExtractError>;
}

/// Uploads a finished artifact to the requesting user's channel.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn deliver(&self, owner_id: &str, artifact: &Artifact) -> Result<(), DeliverError>;
}
