//! Prebuilt archive packaging and HTTP download (spec §1: out-of-scope
//! collaborator exposing `download(url) -> path`, `extract_and_validate(path)
//! -> metadata`).
//!
//! Archive format (spec §6): gzip tar containing `chroma_db/` plus
//! `prebuilt_metadata.json`. Downloads are cached by a SHA-256 hash of the
//! URL under `index_cache/` (supplemented feature, grounded in
//! `examples/original_source/`'s md5-by-url cache, reimplemented with
//! SHA-256 since MD5 is a broken hash not worth carrying into new code).

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{CangjieError, Result};
use crate::models::PrebuiltMetadata;

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

pub fn cache_path_for_url(cache_dir: &Path, url: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = hex::encode(hasher.finalize());
    cache_dir.join(format!("{hash}.tar.gz"))
}

/// Downloads `url`, streaming to a temp file atomically renamed on success.
/// A cache hit skips the network call entirely.
pub async fn download(url: &str, cache_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir).map_err(CangjieError::backend)?;
    let dest = cache_path_for_url(cache_dir, url);
    if dest.exists() {
        tracing::info!(url, "prebuilt archive cache hit");
        return Ok(dest);
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .build()
        .map_err(CangjieError::backend)?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CangjieError::SourceUnavailable(format!("prebuilt URL unreachable: {e}")))?;
    if !response.status().is_success() {
        return Err(CangjieError::SourceUnavailable(format!(
            "prebuilt download failed with status {}",
            response.status()
        )));
    }

    let tmp_path = dest.with_extension("tar.gz.part");
    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(CangjieError::backend)?;
    let mut stream = response.bytes_stream();
    use futures_util::StreamExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CangjieError::backend)?;
        file.write_all(&chunk).await.map_err(CangjieError::backend)?;
    }
    file.flush().await.map_err(CangjieError::backend)?;
    tokio::fs::rename(&tmp_path, &dest).await.map_err(CangjieError::backend)?;
    Ok(dest)
}

/// Extracts `archive_path` into `install_dir` (write-to-tmp-then-move, so a
/// failed validation never leaves a partial installation) and validates the
/// required members are present.
pub fn extract_and_validate(archive_path: &Path, install_dir: &Path) -> Result<PrebuiltMetadata> {
    let tmp_dir = install_dir.with_extension("tmp");
    if tmp_dir.exists() {
        std::fs::remove_dir_all(&tmp_dir).map_err(CangjieError::backend)?;
    }
    std::fs::create_dir_all(&tmp_dir).map_err(CangjieError::backend)?;

    let file = std::fs::File::open(archive_path).map_err(CangjieError::backend)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(&tmp_dir).map_err(|e| {
        CangjieError::IntegrityError(format!("failed to unpack prebuilt archive: {e}"))
    })?;

    let metadata_path = tmp_dir.join("prebuilt_metadata.json");
    if !metadata_path.exists() {
        return Err(CangjieError::IntegrityError(
            "prebuilt archive missing prebuilt_metadata.json".into(),
        ));
    }
    if !tmp_dir.join("chroma_db").exists() {
        return Err(CangjieError::IntegrityError(
            "prebuilt archive missing chroma_db/".into(),
        ));
    }
    let content = std::fs::read_to_string(&metadata_path).map_err(CangjieError::backend)?;
    let metadata: PrebuiltMetadata = serde_json::from_str(&content)
        .map_err(|e| CangjieError::IntegrityError(format!("malformed prebuilt_metadata.json: {e}")))?;

    if install_dir.exists() {
        std::fs::remove_dir_all(install_dir).map_err(CangjieError::backend)?;
    }
    std::fs::rename(&tmp_dir, install_dir).map_err(CangjieError::backend)?;

    Ok(metadata)
}

pub fn read_installed_metadata(install_dir: &Path) -> Option<PrebuiltMetadata> {
    let content = std::fs::read_to_string(install_dir.join("prebuilt_metadata.json")).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cache_path_is_deterministic_per_url() {
        let tmp = TempDir::new().unwrap();
        let a = cache_path_for_url(tmp.path(), "https://example.com/a.tar.gz");
        let b = cache_path_for_url(tmp.path(), "https://example.com/a.tar.gz");
        assert_eq!(a, b);
    }

    #[test]
    fn cache_path_differs_per_url() {
        let tmp = TempDir::new().unwrap();
        let a = cache_path_for_url(tmp.path(), "https://example.com/a.tar.gz");
        let b = cache_path_for_url(tmp.path(), "https://example.com/b.tar.gz");
        assert_ne!(a, b);
    }

    #[test]
    fn extract_and_validate_rejects_missing_metadata() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("bad.tar.gz");
        let file = std::fs::File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.finish().unwrap();

        let install_dir = tmp.path().join("installed");
        let result = extract_and_validate(&archive_path, &install_dir);
        assert!(result.is_err());
    }
}
