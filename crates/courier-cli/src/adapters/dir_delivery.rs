//! Reference delivery gateway: copies finished artifacts into a per-user
//! directory, enforcing the configured size limit the way a messaging
//! platform would.

use std::path::PathBuf;

use async_trait::async_trait;

use courier_core::{Artifact, DeliverError, DeliveryGateway};

pub struct DirDelivery {
    root: PathBuf,
    max_bytes: u64,
}

impl DirDelivery {
    pub fn new(root: PathBuf, max_bytes: u64) -> Self {
        Self { root, max_bytes }
    }
}

#[async_trait]
impl DeliveryGateway for DirDelivery {
    async fn deliver(&self, owner_id: &str, artifact: &Artifact) -> Result<(), DeliverError> {
        if artifact.size_bytes > self.max_bytes {
            return Err(DeliverError::TooLarge {
                size_bytes: artifact.size_bytes,
                limit_bytes: self.max_bytes,
            });
        }

        let dir = self.root.join(owner_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DeliverError::Transient(format!("delivery dir: {e}")))?;

        let file_name = artifact
            .path
            .file_name()
            .ok_or_else(|| DeliverError::Permanent("artifact has no file name".to_string()))?;
        let dest = dir.join(file_name);

        // Copy rather than rename: the spool may live on another filesystem,
        // and the engine removes the spool copy after settling.
        tokio::fs::copy(&artifact.path, &dest)
            .await
            .map_err(|e| DeliverError::Transient(format!("copy to delivery dir: {e}")))?;

        tracing::debug!(
            owner = owner_id,
            dest = %dest.display(),
            bytes = artifact.size_bytes,
            "artifact delivered"
        );
        Ok(())
    }
}
