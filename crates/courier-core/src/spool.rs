//! Temporary artifact area, namespaced per job id so concurrent workers
//! never collide. Every terminal path removes the job's directory.

use std::path::{Path, PathBuf};

use crate::store::types::JobId;

/// Directory where a job's extractor output lives until delivery.
pub fn job_dir(spool_root: &Path, id: JobId) -> PathBuf {
    spool_root.join(format!("job-{id}"))
}

/// Create the job's spool directory (and the root, on first use).
pub async fn prepare(spool_root: &Path, id: JobId) -> std::io::Result<PathBuf> {
    let dir = job_dir(spool_root, id);
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

/// Remove the job's spool directory and anything in it. Idempotent: a
/// missing directory is success, so finalize can re-run after a crash.
pub async fn cleanup(spool_root: &Path, id: JobId) -> std::io::Result<()> {
    let dir = job_dir(spool_root, id);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepare_and_cleanup_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let dir = prepare(root.path(), 7).await.unwrap();
        assert!(dir.ends_with("job-7"));
        tokio::fs::write(dir.join("artifact.mp4"), b"x").await.unwrap();

        cleanup(root.path(), 7).await.unwrap();
        assert!(!dir.exists());
        // Second cleanup of the same job is a no-op.
        cleanup(root.path(), 7).await.unwrap();
    }

    #[tokio::test]
    async fn job_dirs_are_disjoint() {
        let root = tempfile::tempdir().unwrap();
        let a = prepare(root.path(), 1).await.unwrap();
        let b = prepare(root.path(), 2).await.unwrap();
        assert_ne!(a, b);
    }
}
