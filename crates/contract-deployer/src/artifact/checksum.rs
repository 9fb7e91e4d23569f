// SHA-256 checksum gate against sha256sum-style manifests

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::error::ErrorKind;

const READ_CHUNK: usize = 64 * 1024;

/// Lowercase hex SHA-256 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Parse a 64-character hex digest, any case
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a file without loading it into memory at once
pub async fn sha256_file(path: &Path) -> Result<Checksum, ErrorKind> {
    let read_error = |e: std::io::Error| ErrorKind::FetchError {
        url: path.display().to_string(),
        reason: e.to_string(),
    };

    let mut file = tokio::fs::File::open(path).await.map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_CHUNK];

    loop {
        let n = file.read(&mut buffer).await.map_err(read_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Checksum(hex::encode(hasher.finalize())))
}

/// One `<hex>  <filename>` line of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub checksum: Checksum,
    pub filename: String,
}

/// Parsed checksum manifest
#[derive(Debug, Clone, Default)]
pub struct ChecksumManifest {
    pub entries: Vec<ManifestEntry>,
}

impl ChecksumManifest {
    /// Parse `sha256sum` output. Blank lines, `#` comments and lines that
    /// do not start with a 64-character digest are skipped.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (digest, rest) = line.split_once(char::is_whitespace)?;
                let checksum = Checksum::from_hex(digest)?;
                // `*` marks binary mode in sha256sum output
                let filename = rest.trim_start().trim_start_matches('*').trim();
                if filename.is_empty() {
                    return None;
                }
                Some(ManifestEntry {
                    checksum,
                    filename: filename.to_string(),
                })
            })
            .collect();

        Self { entries }
    }

    pub async fn load(path: &Path) -> Result<Self, ErrorKind> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ErrorKind::FetchError {
                url: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::parse(&content))
    }

    /// Entry for `filename`; manifest paths like `./artifacts/x.wasm` match `x.wasm`
    pub fn lookup(&self, filename: &str) -> Option<&ManifestEntry> {
        self.entries
            .iter()
            .find(|entry| entry.filename == filename)
            .or_else(|| {
                self.entries.iter().find(|entry| {
                    Path::new(&entry.filename)
                        .file_name()
                        .map_or(false, |name| name == filename)
                })
            })
    }
}

/// Check `binary` against the manifest line naming its filename
///
/// Returns the verified digest. Fails with `ManifestEntryNotFound` if no line
/// names the binary, `ChecksumMismatch` if the digests differ.
pub async fn verify(binary: &Path, manifest: &Path) -> Result<Checksum, ErrorKind> {
    let filename = binary
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ErrorKind::FetchError {
            url: binary.display().to_string(),
            reason: "artifact path has no file name".to_string(),
        })?;

    let parsed = ChecksumManifest::load(manifest).await?;
    let entry = parsed
        .lookup(filename)
        .ok_or_else(|| ErrorKind::ManifestEntryNotFound {
            file: filename.to_string(),
            manifest: manifest.display().to_string(),
        })?;

    let actual = sha256_file(binary).await?;
    debug!("{} hashes to {}", filename, actual);

    if actual != entry.checksum {
        return Err(ErrorKind::ChecksumMismatch {
            file: filename.to_string(),
            expected: entry.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    info!("Checksum verified for {}: {}", filename, actual);
    Ok(actual)
}
