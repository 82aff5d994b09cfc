//! Reference extractor: a single-stream HTTP GET into the job's spool
//! directory, with curl/status failures classified into transient vs
//! permanent for the engine's retry policy.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use courier_core::{Artifact, ExtractError, Extractor, MediaKind, QualitySpec};

pub struct HttpExtractor;

impl HttpExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HttpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn resolve(
        &self,
        url: &str,
        quality: QualitySpec,
        dest_dir: &Path,
    ) -> Result<Artifact, ExtractError> {
        // A plain GET has no quality ladder to pick from; the requested
        // quality is recorded on the job but does not change the fetch.
        tracing::debug!(url, quality = %quality, "fetching via single-stream GET");

        let file_name = file_name_for(url);
        let dest: PathBuf = dest_dir.join(&file_name);
        let url = url.to_string();
        let fetch_dest = dest.clone();

        // curl is blocking; keep it off the async workers.
        let size_bytes = tokio::task::spawn_blocking(move || fetch(&url, &fetch_dest))
            .await
            .map_err(|e| ExtractError::Transient(format!("fetch task: {e}")))??;

        Ok(Artifact {
            path: dest,
            size_bytes,
            media_kind: media_kind_for(&file_name),
        })
    }
}

fn fetch(url: &str, dest: &Path) -> Result<u64, ExtractError> {
    let mut file =
        File::create(dest).map_err(|e| ExtractError::Transient(format!("spool file: {e}")))?;

    let mut easy = curl::easy::Easy::new();
    easy.url(url)
        .map_err(|e| ExtractError::Permanent(format!("invalid URL: {e}")))?;
    easy.follow_location(true).map_err(classify_curl)?;
    easy.max_redirections(10).map_err(classify_curl)?;
    easy.connect_timeout(Duration::from_secs(30))
        .map_err(classify_curl)?;
    easy.low_speed_limit(1024).map_err(classify_curl)?;
    easy.low_speed_time(Duration::from_secs(60))
        .map_err(classify_curl)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| match file.write_all(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    tracing::warn!("spool write failed: {}", e);
                    Ok(0) // abort transfer
                }
            })
            .map_err(classify_curl)?;
        transfer.perform().map_err(classify_curl)?;
    }

    let code = easy.response_code().map_err(classify_curl)?;
    if let Some(err) = classify_http_status(code) {
        return Err(err);
    }

    let size = file
        .metadata()
        .map_err(|e| ExtractError::Transient(format!("spool metadata: {e}")))?
        .len();
    Ok(size)
}

/// Non-2xx statuses: throttling and server-side trouble are retryable,
/// everything else in 4xx means the URL will never work.
fn classify_http_status(code: u32) -> Option<ExtractError> {
    match code {
        200..=299 => None,
        408 | 429 | 500..=599 => Some(ExtractError::Transient(format!("HTTP {code}"))),
        _ => Some(ExtractError::Permanent(format!("HTTP {code}"))),
    }
}

fn classify_curl(e: curl::Error) -> ExtractError {
    if e.is_unsupported_protocol() || e.is_url_malformed() {
        return ExtractError::Permanent(format!("curl: {e}"));
    }
    // Timeouts, connection resets, DNS hiccups: all worth another attempt.
    ExtractError::Transient(format!("curl: {e}"))
}

/// Last path segment of the URL, or a fallback when the path has none.
fn file_name_for(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download.bin".to_string())
}

fn media_kind_for(file_name: &str) -> MediaKind {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "mkv" | "webm" | "mov" | "avi" => MediaKind::Video,
        "mp3" | "m4a" | "ogg" | "opus" | "flac" | "wav" => MediaKind::Audio,
        _ => MediaKind::Document,
    }
}
