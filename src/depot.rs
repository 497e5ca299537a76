//! Build and bake pipelines.
//!
//! Each call runs one straight line: resolve the CLI version, wire the
//! invocation, execute it, decode the metadata file. Any failure ends the
//! call; there is no partial result.

use depot_metadata::{BakeMetadata, BuildMetadata, METADATA_FILE};
use tracing::{debug, info};

use crate::artifact::{BakeArtifacts, BuildArtifact};
use crate::executor::{Directory, DockerExecutor, Executor, Workspace};
use crate::invocation::{BakeRequest, BuildRequest, DockerHost, Invocation, SBOM_DIR};
use crate::version::VersionResolver;
use crate::Result;

/// Entry point for running depot builds.
pub struct Depot<E = DockerExecutor> {
    resolver: VersionResolver,
    executor: E,
    docker_host: DockerHost,
}

impl Depot<DockerExecutor> {
    /// Run depot through the local docker CLI against the default docker host.
    pub fn docker() -> Self {
        Self::new(DockerExecutor::new())
    }
}

impl<E: Executor> Depot<E> {
    pub fn new(executor: E) -> Self {
        Self {
            resolver: VersionResolver::new(),
            executor,
            docker_host: DockerHost::default(),
        }
    }

    pub fn resolver(mut self, resolver: VersionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn docker_host(mut self, docker_host: DockerHost) -> Self {
        self.docker_host = docker_host;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Build an image with `depot build`.
    ///
    /// `version` pins the depot CLI; `None` or an empty string uses the
    /// latest release.
    pub async fn build(
        &self,
        request: &BuildRequest,
        version: Option<&str>,
    ) -> Result<BuildArtifact> {
        let version = self.resolver.resolve(version).await?;
        let invocation = Invocation::build(request, &version, &self.docker_host);
        info!(project = %request.project, version = %version, "starting depot build");

        let workspace = self.executor.exec(&invocation).await?;
        let metadata = BuildMetadata::from_slice(&workspace.read_file(METADATA_FILE).await?)?;
        info!(
            build_id = %metadata.depot_build.build_id,
            image = %metadata.image_name,
            bytes = metadata.size(),
            "depot build finished",
        );

        Ok(BuildArtifact {
            token: request.token.clone(),
            project: request.project.clone(),
            metadata,
            sbom_dir: sbom_dir(&workspace, request.options.sbom)?,
        })
    }

    /// Build every target of a bake file with `depot bake`.
    pub async fn bake(
        &self,
        request: &BakeRequest,
        version: Option<&str>,
    ) -> Result<BakeArtifacts> {
        let version = self.resolver.resolve(version).await?;
        let invocation = Invocation::bake(request, &version, &self.docker_host);
        info!(
            project = %request.project,
            version = %version,
            bake_file = %request.options.bake_file,
            "starting depot bake",
        );

        let workspace = self.executor.exec(&invocation).await?;
        let metadata = BakeMetadata::from_slice(&workspace.read_file(METADATA_FILE).await?)?;
        info!(
            build_id = %metadata.depot_build.build_id,
            targets = metadata.targets.len(),
            "depot bake finished",
        );

        Ok(BakeArtifacts {
            token: request.token.clone(),
            project: request.project.clone(),
            metadata,
            sbom_dir: sbom_dir(&workspace, request.options.sbom)?,
        })
    }
}

fn sbom_dir(workspace: &Workspace, requested: bool) -> Result<Option<Directory>> {
    if !requested {
        return Ok(None);
    }
    let dir = workspace.directory(SBOM_DIR)?;
    debug!(path = %dir.path().display(), "sbom directory");
    Ok(Some(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use crate::invocation::BuildOptions;
    use crate::Error;

    fn unreachable_resolver() -> VersionResolver {
        VersionResolver::with_base_url("http://127.0.0.1:9")
    }

    fn request() -> BuildRequest {
        BuildRequest::new("tok".to_string().into(), "prj", "/src", BuildOptions::default())
    }

    #[tokio::test]
    async fn version_failure_produces_no_invocation() {
        let depot =
            Depot::new(MockExecutor::new().metadata("{}")).resolver(unreachable_resolver());
        let err = depot.build(&request(), None).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(depot.executor().invocations().is_empty());
    }

    #[tokio::test]
    async fn missing_metadata_file_fails_the_build() {
        let depot = Depot::new(MockExecutor::new()).resolver(unreachable_resolver());
        let err = depot.build(&request(), Some("2.76.0")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn malformed_metadata_is_a_decode_error() {
        let depot = Depot::new(MockExecutor::new().metadata("{not json"))
            .resolver(unreachable_resolver());
        let err = depot.build(&request(), Some("2.76.0")).await.unwrap_err();
        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn pinned_version_selects_cli_image() {
        let depot =
            Depot::new(MockExecutor::new().metadata("{}")).resolver(unreachable_resolver());
        depot.build(&request(), Some("2.76.0")).await.unwrap();
        let calls = depot.executor().invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].image, "public.ecr.aws/depot/cli:2.76.0");
    }
}
