//! Build artifacts handed back to callers.
//!
//! A [`BuildArtifact`] only exists once depot has run successfully and its
//! metadata file has been decoded. It is never mutated afterwards.

use depot_metadata::{BakeMetadata, BuildMetadata};
use secrecy::SecretString;
use tracing::debug;

use crate::executor::{Directory, Executor};
use crate::{Error, ExecOutput, Result};

/// Registry that depot saves images to.
pub const DEPOT_REGISTRY: &str = "registry.depot.dev";
/// Username paired with a depot token for registry access.
pub const DEPOT_REGISTRY_USER: &str = "x-token";

/// Credentials for pulling from a registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub host: String,
    pub username: String,
    pub password: SecretString,
}

impl RegistryAuth {
    /// Credentials for the depot registry using `token`.
    pub fn depot(token: SecretString) -> Self {
        Self {
            host: DEPOT_REGISTRY.to_string(),
            username: DEPOT_REGISTRY_USER.to_string(),
            password: token,
        }
    }
}

/// The result of one image build.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    /// depot token, needed to pull the image.
    pub token: SecretString,
    /// depot project id
    pub project: String,
    pub metadata: BuildMetadata,
    /// Present only when SBOMs were requested.
    pub sbom_dir: Option<Directory>,
}

impl BuildArtifact {
    /// Image reference to pull.
    pub fn image_name(&self) -> &str {
        &self.metadata.image_name
    }

    /// Every reference the image was saved under. A build tagged more than
    /// once reports them comma separated in [`image_name`](Self::image_name).
    pub fn image_refs(&self) -> Vec<&str> {
        self.metadata.image_refs()
    }

    /// Size of the image in bytes.
    ///
    /// This is the sum of the image config and all layers across every
    /// platform. Layers are counted compressed, as stored in the registry.
    pub fn image_bytes(&self) -> i64 {
        self.metadata.size()
    }

    pub fn registry_auth(&self) -> RegistryAuth {
        RegistryAuth::depot(self.token.clone())
    }

    /// Names of the SBOM files produced by the build.
    pub async fn sbom_files(&self) -> Result<Vec<String>> {
        let dir = self.sbom_dir.as_ref().ok_or_else(sbom_not_requested)?;
        match dir.entries().await {
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Contents of the first SBOM file, unchanged.
    pub async fn sbom(&self) -> Result<Vec<u8>> {
        let dir = self.sbom_dir.as_ref().ok_or_else(sbom_not_requested)?;
        let files = self.sbom_files().await?;
        let first = files
            .first()
            .ok_or_else(|| Error::NotFound("no sboms found".to_string()))?;
        debug!(file = %first, "reading sbom");
        dir.read(first).await
    }

    /// Log in to the depot registry and pull the image under its first
    /// reference.
    pub async fn pull(&self, executor: &dyn Executor) -> Result<ExecOutput> {
        let image = self.image_refs().first().copied().ok_or_else(|| {
            Error::NotFound("build metadata has no image name; was the image saved?".to_string())
        })?;
        executor.pull(image, &self.registry_auth()).await
    }
}

fn sbom_not_requested() -> Error {
    Error::NotFound("sbom not generated; use --sbom".to_string())
}

/// The results of one bake, one artifact per target.
#[derive(Debug, Clone)]
pub struct BakeArtifacts {
    pub token: SecretString,
    pub project: String,
    pub metadata: BakeMetadata,
    /// Shared by all targets; each target only sees its own files.
    /// Present only when SBOMs were requested.
    pub sbom_dir: Option<Directory>,
}

impl BakeArtifacts {
    /// Target names in the order depot reported them.
    pub fn targets(&self) -> Vec<&str> {
        self.metadata.target_names()
    }

    /// The artifact for one target.
    pub fn target(&self, name: &str) -> Result<BuildArtifact> {
        let metadata = self.metadata.target(name).ok_or_else(|| {
            Error::NotFound(format!(
                "target {} not found; valid targets are: {}",
                name,
                self.targets().join(", ")
            ))
        })?;

        Ok(BuildArtifact {
            token: self.token.clone(),
            project: self.project.clone(),
            metadata: metadata.clone(),
            sbom_dir: self.sbom_dir.as_ref().map(|dir| dir.for_target(name)),
        })
    }
}
