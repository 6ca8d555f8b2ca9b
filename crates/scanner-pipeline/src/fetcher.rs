//! # Artifact Fetcher (spec §4.2)
//!
//! Obtains registry metadata and archive bytes over HTTPS and extracts a
//! tarball or zip archive into a scoped temporary directory. Extraction
//! normalizes every entry path and rejects one that would resolve outside
//! the extraction root (archive-traversal defense); that rejection escalates
//! to a `PATH_ESCAPE` threat rather than a bare error, matching the
//! tar/flate2/zip extraction style used elsewhere in the corpus for
//! plugin-archive security scanning.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::Client;
use scanner_core::{PackageRef, Severity, Threat, ThreatKind};
use serde::Deserialize;

use crate::error::{PipelineError, Result};

const MAX_ARCHIVE_BYTES: u64 = 10 * 1024 * 1024;

/// Registry metadata needed to locate and validate a package's archive.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub tarball_url: String,
    #[serde(default)]
    pub shasum: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

/// A temporary directory holding one extracted archive. Removed on drop,
/// including when the archive's owner panics, since `tempfile::TempDir`'s
/// own `Drop` impl runs during unwind.
pub struct ExtractedArchive {
    dir: tempfile::TempDir,
}

impl ExtractedArchive {
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub struct ArtifactFetcher {
    client: Client,
    registry_base_url: String,
}

impl ArtifactFetcher {
    #[must_use]
    pub fn new(registry_base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, registry_base_url: registry_base_url.into() }
    }

    /// `GET {registry}/{name}/{version}` and deserialize the metadata body.
    pub async fn fetch_metadata(&self, name: &str, version: &str) -> Result<PackageMetadata> {
        let url = format!("{}/{}/{}", self.registry_base_url.trim_end_matches('/'), name, version);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::RegistryUnreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::RegistryUnreachable(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        response
            .json::<PackageMetadata>()
            .await
            .map_err(|e| PipelineError::RegistryUnreachable(e.to_string()))
    }

    /// Downloads the archive, aborting once the advertised or observed size
    /// exceeds [`MAX_ARCHIVE_BYTES`].
    pub async fn fetch_archive(&self, metadata: &PackageMetadata) -> Result<Vec<u8>> {
        if let Some(advertised) = metadata.size_bytes {
            if advertised > MAX_ARCHIVE_BYTES {
                return Err(PipelineError::ArchiveTooLarge(advertised));
            }
        }
        let response = self
            .client
            .get(&metadata.tarball_url)
            .send()
            .await
            .map_err(|e| PipelineError::RegistryUnreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::RegistryUnreachable(format!(
                "{} returned {}",
                metadata.tarball_url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::RegistryUnreachable(e.to_string()))?;
        if bytes.len() as u64 > MAX_ARCHIVE_BYTES {
            return Err(PipelineError::ArchiveTooLarge(bytes.len() as u64));
        }
        Ok(bytes.to_vec())
    }

    /// `GET {registry}/{name}` and pulls the package's registry-creation
    /// timestamp out of the `time.created` field, feeding the
    /// dependency-confusion Timeline signal. Any failure, including a
    /// missing field, degrades to `None` rather than erroring.
    pub async fn fetch_created_at(&self, name: &str) -> Option<DateTime<Utc>> {
        let url = format!("{}/{}", self.registry_base_url.trim_end_matches('/'), name);
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: serde_json::Value = response.json().await.ok()?;
        let created = body.get("time")?.get("created")?.as_str()?;
        DateTime::parse_from_rfc3339(created).ok().map(|dt| dt.with_timezone(&Utc))
    }

    /// Extract `bytes` (a `.tgz`/`.tar.gz` tarball, or a zip archive if the
    /// tarball decode fails) into a fresh scoped temp directory.
    pub fn extract(&self, bytes: &[u8]) -> Result<ExtractedArchive> {
        let dir = tempfile::tempdir().map_err(|e| PipelineError::TempDirUnavailable(e.to_string()))?;
        if Self::extract_tar(bytes, dir.path()).is_err() {
            Self::extract_zip(bytes, dir.path())?;
        }
        Ok(ExtractedArchive { dir })
    }

    fn extract_tar(bytes: &[u8], destination: &Path) -> Result<()> {
        let decoder = flate2::read::GzDecoder::new(bytes);
        let mut archive = tar::Archive::new(decoder);
        let entries = archive
            .entries()
            .map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
            let entry_path = entry
                .path()
                .map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?
                .into_owned();
            let target = normalize_into(destination, &entry_path)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
            }
            entry.unpack(&target).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
        }
        Ok(())
    }

    fn extract_zip(bytes: &[u8], destination: &Path) -> Result<()> {
        let cursor = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(cursor).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
            let Some(entry_name) = file.enclosed_name().map(Path::to_path_buf) else {
                return Err(PipelineError::PathEscape(file.name().to_string()));
            };
            let target = normalize_into(destination, &entry_name)?;
            if file.is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
            }
            let mut out = std::fs::File::create(&target).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
            std::io::Write::write_all(&mut out, &buf).map_err(|e| PipelineError::ArchiveMalformed(e.to_string()))?;
        }
        Ok(())
    }

    /// Turns a `PATH_ESCAPE` extraction failure into a threat rather than
    /// aborting the whole scan, per §4.2's failure-escalation contract.
    #[must_use]
    pub fn path_escape_threat(package: &PackageRef, entry: &str) -> Threat {
        Threat::new(
            ThreatKind::PathEscape,
            Severity::Critical,
            0.9,
            format!("archive entry '{entry}' would extract outside the package root"),
            package.clone(),
        )
    }
}

/// Joins `entry` onto `root`, rejecting any `..` component and any result
/// that normalizes outside `root`.
fn normalize_into(root: &Path, entry: &Path) -> Result<PathBuf> {
    if entry
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
    {
        return Err(PipelineError::PathEscape(entry.display().to_string()));
    }
    let target = root.join(entry);
    if !target.starts_with(root) {
        return Err(PipelineError::PathEscape(entry.display().to_string()));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn extracts_a_well_formed_tarball() {
        let bytes = make_tarball(&[("package/index.js", b"module.exports = {};")]);
        let fetcher = ArtifactFetcher::new("https://registry.example", 10);
        let extracted = fetcher.extract(&bytes).unwrap();
        assert!(extracted.path().join("package/index.js").is_file());
    }

    #[test]
    fn rejects_a_traversal_entry() {
        let bytes = make_tarball(&[("../../etc/passwd", b"evil")]);
        let fetcher = ArtifactFetcher::new("https://registry.example", 10);
        let result = fetcher.extract(&bytes);
        assert!(matches!(result, Err(PipelineError::PathEscape(_))));
    }

    #[test]
    fn malformed_bytes_fail_both_extraction_paths() {
        let fetcher = ArtifactFetcher::new("https://registry.example", 10);
        let result = fetcher.extract(b"not an archive");
        assert!(result.is_err());
    }

    #[test]
    fn archive_size_over_budget_is_rejected_before_download() {
        let metadata = PackageMetadata {
            name: "huge-package".to_string(),
            version: "1.0.0".to_string(),
            tarball_url: "https://registry.example/huge-package-1.0.0.tgz".to_string(),
            shasum: None,
            size_bytes: Some(MAX_ARCHIVE_BYTES + 1),
        };
        let fetcher = ArtifactFetcher::new("https://registry.example", 10);
        let result = tokio_test_block_on(fetcher.fetch_archive(&metadata));
        assert!(matches!(result, Err(PipelineError::ArchiveTooLarge(_))));
    }

    fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
