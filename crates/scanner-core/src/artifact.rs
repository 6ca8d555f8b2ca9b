//! Artifacts: the unit of analysis produced by the Target Resolver.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How an artifact was classified by the Target Resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    File,
    Directory,
    RegistryPackage,
    Archive,
}

/// A best-effort language/content-kind hint, used by the Entropy Analyzer
/// to pick a threshold and by the AST Analyzer to decide whether to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Source,
    Structured,
    Text,
    Opaque,
}

impl ContentKind {
    /// Guess from a file extension. Unrecognized extensions are `Opaque`.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" | "ts" | "tsx" | "jsx" => Self::Source,
            "json" | "yaml" | "yml" | "toml" | "xml" => Self::Structured,
            "md" | "txt" | "rst" => Self::Text,
            _ => Self::Opaque,
        }
    }
}

/// Identity of the package or file an artifact (or a threat derived from
/// it) belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageRef {
    /// A bare filesystem path, used outside registry/package mode.
    Path(String),
    /// A registry package identity.
    Named { name: String, version: String },
}

impl PackageRef {
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    #[must_use]
    pub fn named(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            version: version.into(),
        }
    }

    /// A stable string identity used for dedup keys and cache keys.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Path(p) => p.clone(),
            Self::Named { name, version } => format!("{name}@{version}"),
        }
    }
}

/// A SHA-256 content fingerprint, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex_encode(&hasher.finalize()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// One unit of analysis. Immutable once produced by the Target Resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub package: PackageRef,
    pub kind: ArtifactKind,
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    pub fingerprint: Fingerprint,
    pub content_kind: ContentKind,
}

impl Artifact {
    #[must_use]
    pub fn for_file(path: PathBuf, bytes: &[u8]) -> Self {
        let content_kind = path
            .extension()
            .and_then(|e| e.to_str())
            .map(ContentKind::from_extension)
            .unwrap_or(ContentKind::Opaque);
        let package = PackageRef::file(path.display().to_string());
        Self {
            package,
            kind: ArtifactKind::File,
            size_bytes: bytes.len() as u64,
            fingerprint: Fingerprint::of_bytes(bytes),
            content_kind,
            path: Some(path),
        }
    }

    #[must_use]
    pub fn for_registry_package(name: &str, version: &str, tarball: &[u8]) -> Self {
        Self {
            package: PackageRef::named(name, version),
            kind: ArtifactKind::RegistryPackage,
            size_bytes: tarball.len() as u64,
            fingerprint: Fingerprint::of_bytes(tarball),
            content_kind: ContentKind::Opaque,
            path: None,
        }
    }
}
