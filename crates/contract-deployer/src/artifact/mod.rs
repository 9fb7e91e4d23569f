// Contract artifact resolution
// Release layout: <base>/<slug>/<version>/<slug_snake>.wasm next to checksums.txt

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::chain::ChainError;
use crate::config::ArtifactConfig;
use crate::error::ErrorKind;
use crate::retry::{with_retry, RetryPolicy};

pub mod checksum;

pub use checksum::{verify, Checksum, ChecksumManifest};

/// Kebab-case release slug of a contract name
///
/// `InterchainTokenService` becomes `interchain-token-service`; names already
/// in kebab or snake case are normalized the same way.
pub fn contract_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for c in name.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else if c.is_ascii_uppercase() {
            if prev.map_or(false, |p| p.is_ascii_lowercase() || p.is_ascii_digit()) && !slug.ends_with('-') {
                slug.push('-');
            }
            slug.push(c.to_ascii_lowercase());
        } else {
            slug.push(c);
        }
        prev = Some(c);
    }

    slug
}

/// File name of the compiled contract: `multisig_prover.wasm`
pub fn binary_file_name(name: &str) -> String {
    format!("{}.wasm", contract_slug(name).replace('-', "_"))
}

fn is_semver(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

fn is_commit_hash(s: &str) -> bool {
    s.len() >= 7 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a release version: semver (`2.0.0`, a leading `v` is dropped)
/// or a commit hash (lowercased)
pub fn normalize_version(version: &str) -> Result<String, ErrorKind> {
    let version = version.trim();
    let stripped = version.strip_prefix('v').unwrap_or(version);

    if is_semver(stripped) {
        Ok(stripped.to_string())
    } else if is_commit_hash(version) {
        Ok(version.to_lowercase())
    } else {
        Err(ErrorKind::InvalidPayload(format!(
            "invalid version '{}', use semver (e.g. 2.0.0) or a commit hash (e.g. 12e6126)",
            version
        )))
    }
}

/// A binary and the manifest that vouches for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub binary: PathBuf,
    pub manifest: PathBuf,
}

/// Locates or downloads contract binaries and their checksum manifests
pub struct ArtifactResolver {
    client: reqwest::Client,
    base_url: String,
    artifact_dir: PathBuf,
    manifest_name: String,
    policy: RetryPolicy,
}

impl ArtifactResolver {
    pub fn new(config: &ArtifactConfig, policy: RetryPolicy) -> Result<Self, ErrorKind> {
        let client = reqwest::Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| ErrorKind::FetchError {
                url: config.release_base_url.clone(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.release_base_url.trim_end_matches('/').to_string(),
            artifact_dir: config.artifact_dir.clone(),
            manifest_name: config.manifest_name.clone(),
            policy,
        })
    }

    fn release_url(&self, contract: &str, version: &str) -> String {
        format!("{}/{}/{}", self.base_url, contract_slug(contract), version)
    }

    pub fn binary_url(&self, contract: &str, version: &str) -> String {
        format!("{}/{}", self.release_url(contract, version), binary_file_name(contract))
    }

    pub fn manifest_url(&self, contract: &str, version: &str) -> String {
        format!("{}/{}", self.release_url(contract, version), self.manifest_name)
    }

    /// Download the published binary and manifest of `contract` at `version`
    pub async fn resolve(&self, contract: &str, version: &str) -> Result<ResolvedArtifact, ErrorKind> {
        let version = normalize_version(version)?;
        let target_dir = self
            .artifact_dir
            .join(contract_slug(contract))
            .join(&version);

        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| ErrorKind::FetchError {
                url: target_dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let binary = target_dir.join(binary_file_name(contract));
        let manifest = target_dir.join(&self.manifest_name);

        info!("Fetching {} {} from {}", contract, version, self.release_url(contract, &version));

        let binary_url = self.binary_url(contract, &version);
        let manifest_url = self.manifest_url(contract, &version);
        futures::try_join!(
            self.download(&binary_url, &binary),
            self.download(&manifest_url, &manifest),
        )?;

        Ok(ResolvedArtifact { binary, manifest })
    }

    /// Use a local binary as-is
    ///
    /// The manifest is taken from beside the binary when present, otherwise
    /// downloaded for `version` into the binary's directory.
    pub async fn resolve_local(
        &self,
        binary: &Path,
        contract: &str,
        version: Option<&str>,
    ) -> Result<ResolvedArtifact, ErrorKind> {
        if !binary.is_file() {
            return Err(ErrorKind::FetchError {
                url: binary.display().to_string(),
                reason: "local artifact does not exist".to_string(),
            });
        }

        let dir = binary.parent().unwrap_or_else(|| Path::new("."));
        let manifest = dir.join(&self.manifest_name);

        if !manifest.is_file() {
            let version = version.ok_or_else(|| ErrorKind::FetchError {
                url: manifest.display().to_string(),
                reason: "no manifest next to the artifact and no --version to download one".to_string(),
            })?;
            let version = normalize_version(version)?;
            self.download(&self.manifest_url(contract, &version), &manifest)
                .await?;
        }

        debug!("Using local artifact {} with manifest {}", binary.display(), manifest.display());
        Ok(ResolvedArtifact {
            binary: binary.to_path_buf(),
            manifest,
        })
    }

    /// Fetch `url` into `dest`, retrying transient failures
    async fn download(&self, url: &str, dest: &Path) -> Result<(), ErrorKind> {
        let bytes = with_retry(&self.policy, "download", || self.fetch(url))
            .await
            .map_err(|e| ErrorKind::FetchError {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        // only a complete download is renamed into place
        let partial = dest.with_extension("partial");
        let write_error = |e: std::io::Error| ErrorKind::FetchError {
            url: url.to_string(),
            reason: format!("cannot write {}: {}", dest.display(), e),
        };
        tokio::fs::write(&partial, &bytes).await.map_err(write_error)?;
        tokio::fs::rename(&partial, dest).await.map_err(write_error)?;

        debug!("Downloaded {} ({} bytes) to {}", url, bytes.len(), dest.display());
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ChainError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(ChainError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(base_url: &str, dir: &Path) -> ArtifactResolver {
        let config = ArtifactConfig {
            release_base_url: base_url.to_string(),
            artifact_dir: dir.to_path_buf(),
            manifest_name: "checksums.txt".to_string(),
        };
        let policy = RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        ArtifactResolver::new(&config, policy).unwrap()
    }

    #[test]
    fn test_contract_slug() {
        assert_eq!(contract_slug("Multisig"), "multisig");
        assert_eq!(contract_slug("InterchainTokenService"), "interchain-token-service");
        assert_eq!(contract_slug("MultisigProver"), "multisig-prover");
        assert_eq!(contract_slug("voting-verifier"), "voting-verifier");
        assert_eq!(contract_slug("service_registry"), "service-registry");
        assert_eq!(binary_file_name("InterchainTokenService"), "interchain_token_service.wasm");
    }

    #[test]
    fn test_version_normalization() {
        assert_eq!(normalize_version("2.0.0").unwrap(), "2.0.0");
        assert_eq!(normalize_version("v1.2.3").unwrap(), "1.2.3");
        assert_eq!(normalize_version("12E6126").unwrap(), "12e6126");
        assert!(normalize_version("1.0").is_err());
        assert!(normalize_version("latest").is_err());
    }

    #[test]
    fn test_release_urls() {
        let dir = tempdir().unwrap();
        let resolver = resolver("https://static.axelar.network/releases/cosmwasm/", dir.path());

        assert_eq!(
            resolver.binary_url("InterchainTokenService", "1.2.0"),
            "https://static.axelar.network/releases/cosmwasm/interchain-token-service/1.2.0/interchain_token_service.wasm"
        );
        assert_eq!(
            resolver.manifest_url("Multisig", "2.0.0"),
            "https://static.axelar.network/releases/cosmwasm/multisig/2.0.0/checksums.txt"
        );
    }

    #[tokio::test]
    async fn test_resolve_downloads_binary_and_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/multisig/2.0.0/multisig.wasm"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"wasm".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/multisig/2.0.0/checksums.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abc  multisig.wasm\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolved = resolver(&server.uri(), dir.path())
            .resolve("Multisig", "v2.0.0")
            .await
            .unwrap();

        assert_eq!(resolved.binary, dir.path().join("multisig/2.0.0/multisig.wasm"));
        assert_eq!(std::fs::read(&resolved.binary).unwrap(), b"wasm");
        assert!(std::fs::read_to_string(&resolved.manifest).unwrap().contains("multisig.wasm"));
    }

    #[tokio::test]
    async fn test_missing_release_is_fetch_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let result = resolver(&server.uri(), dir.path()).resolve("Multisig", "9.9.9").await;

        match result {
            Err(ErrorKind::FetchError { url, .. }) => assert!(url.contains("/multisig/9.9.9/")),
            other => panic!("expected fetch error, got {:?}", other),
        }
        // at most one attempt each for binary and manifest
        let requests = server.received_requests().await.unwrap().len();
        assert!((1..=2).contains(&requests));
    }

    #[tokio::test]
    async fn test_transient_download_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/multisig/2.0.0/checksums.txt"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/multisig/2.0.0/checksums.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("manifest"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let binary = dir.path().join("multisig.wasm");
        std::fs::write(&binary, b"local").unwrap();

        let resolved = resolver(&server.uri(), dir.path())
            .resolve_local(&binary, "Multisig", Some("2.0.0"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(resolved.manifest).unwrap(), "manifest");
    }

    #[tokio::test]
    async fn test_local_artifact_uses_sibling_manifest() {
        let dir = tempdir().unwrap();
        let binary = dir.path().join("multisig.wasm");
        std::fs::write(&binary, b"local").unwrap();
        std::fs::write(dir.path().join("checksums.txt"), "x").unwrap();

        // unreachable base url: nothing may be fetched
        let resolved = resolver("http://127.0.0.1:9", dir.path())
            .resolve_local(&binary, "Multisig", None)
            .await
            .unwrap();
        assert_eq!(resolved.manifest, dir.path().join("checksums.txt"));

        let missing = resolver("http://127.0.0.1:9", dir.path())
            .resolve_local(&dir.path().join("absent.wasm"), "Multisig", None)
            .await;
        assert!(matches!(missing, Err(ErrorKind::FetchError { .. })));
    }
}
