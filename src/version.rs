//! depot CLI version resolution.
//!
//! An explicit version is used as given. Otherwise the latest release for
//! the host OS and architecture is looked up on every call; nothing is cached.

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{Error, Result};

/// Release metadata host for the depot CLI.
pub const DEFAULT_RELEASE_URL: &str = "https://dl.depot.dev";

/// Repository of the container image that ships the depot CLI.
pub const CLI_IMAGE_REPOSITORY: &str = "public.ecr.aws/depot/cli";

/// Image reference for a given depot CLI version.
pub fn cli_image(version: &str) -> String {
    format!("{}:{}", CLI_IMAGE_REPOSITORY, version)
}

/// Host OS and architecture, named the way depot release URLs name them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: String,
    pub arch: String,
}

impl HostPlatform {
    /// The platform this process runs on.
    pub fn current() -> Self {
        Self {
            os: release_os(std::env::consts::OS).to_string(),
            arch: release_arch(std::env::consts::ARCH).to_string(),
        }
    }
}

/// Map Rust `std::env::consts::OS` values to release names.
fn release_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Map Rust `std::env::consts::ARCH` values to release names.
fn release_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    version: String,
}

/// Resolves which depot CLI version to run.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    client: reqwest::Client,
    base_url: String,
    platform: HostPlatform,
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionResolver {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_RELEASE_URL)
    }

    /// Use a different release host (mirrors, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            platform: HostPlatform::current(),
        }
    }

    /// Query releases for a platform other than the host's.
    pub fn platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// URL of the "latest release" document for the configured platform.
    pub fn latest_url(&self) -> String {
        format!(
            "{}/cli/release/{}/{}/latest",
            self.base_url, self.platform.os, self.platform.arch
        )
    }

    /// Return `explicit` unchanged when it is non-empty, otherwise the latest
    /// released version.
    pub async fn resolve(&self, explicit: Option<&str>) -> Result<String> {
        match explicit {
            Some(version) if !version.is_empty() => {
                debug!(version, "using requested depot CLI version");
                Ok(version.to_string())
            }
            _ => self.latest().await,
        }
    }

    /// Look up the latest released version.
    pub async fn latest(&self) -> Result<String> {
        let url = self.latest_url();
        debug!(url = %url, "querying latest depot CLI release");

        let resp = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| Error::Network(format!("failed to fetch {}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "failed to fetch {} (HTTP {})",
                url,
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read body from {}: {}", url, e)))?;

        let release: LatestRelease = serde_json::from_slice(&body)
            .map_err(|e| Error::Decode(format!("invalid release document from {}: {}", url, e)))?;

        info!(version = %release.version, "resolved latest depot CLI");
        Ok(release.version)
    }
}
