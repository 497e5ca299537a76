//! Executor Module
//!
//! An [`Executor`] runs a fully wired [`Invocation`] in a container and hands
//! back a [`Workspace`]: the state of the container's working directory
//! after the command finished, from which the metadata file and SBOMs are
//! read.
//!
//! - [`DockerExecutor`] runs the depot CLI image through the local `docker` CLI
//! - [`MockExecutor`] writes canned outputs, for tests
//!
//! # Example
//!
//! ```no_run
//! use depot_box::executor::{DockerExecutor, Executor};
//! use depot_box::invocation::{BuildOptions, BuildRequest, DockerHost, Invocation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = BuildRequest::new(
//!         std::env::var("DEPOT_TOKEN")?.into(),
//!         "prj123",
//!         ".",
//!         BuildOptions::default(),
//!     );
//!     let invocation = Invocation::build(&request, "2.76.0", &DockerHost::default());
//!
//!     let workspace = DockerExecutor::new().exec(&invocation).await?;
//!     let metadata = workspace.read_file("metadata.json").await?;
//!     println!("{}", String::from_utf8_lossy(&metadata));
//!     Ok(())
//! }
//! ```

pub mod docker;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::TempDir;
use tracing::{debug, warn};

pub use docker::DockerExecutor;

use crate::artifact::RegistryAuth;
use crate::invocation::{Invocation, SBOM_DIR, WORKDIR};
use crate::{Error, ExecOutput, Result};

/// Runs depot CLI invocations.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// Fails with [`Error::Execution`] when the command cannot be started or
    /// exits non-zero.
    async fn exec(&self, invocation: &Invocation) -> Result<Workspace>;

    /// Authenticate against `auth.host` and pull `image`.
    async fn pull(&self, image: &str, auth: &RegistryAuth) -> Result<ExecOutput>;
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Post-execution view of the container's working directory.
///
/// The backing directory is removed once the workspace and every
/// [`Directory`] taken from it are dropped.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: Arc<Scratch>,
    /// Output of the command that produced this workspace.
    pub output: ExecOutput,
}

impl Workspace {
    pub fn new(root: TempDir, output: ExecOutput) -> Self {
        Self {
            root: Arc::new(Scratch::new(root)),
            output,
        }
    }

    /// Host directory standing in for the container's working directory.
    pub fn root(&self) -> &Path {
        &self.root.path
    }

    /// Map a container path (absolute under the working directory, or
    /// relative to it) to a host path.
    pub fn host_path(&self, container_path: &str) -> Result<PathBuf> {
        let relative = if let Some(rest) = container_path.strip_prefix(WORKDIR) {
            if !rest.is_empty() && !rest.starts_with('/') {
                return Err(outside_workdir(container_path));
            }
            rest.trim_start_matches('/')
        } else if container_path.starts_with('/') {
            return Err(outside_workdir(container_path));
        } else {
            container_path
        };
        Ok(self.root.path.join(relative))
    }

    /// Read a file the command left behind.
    pub async fn read_file(&self, container_path: &str) -> Result<Vec<u8>> {
        let path = self.host_path(container_path)?;
        debug!(path = %path.display(), "reading workspace file");
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("{} was not produced", container_path))
            }
            _ => Error::Io(e),
        })
    }

    /// A handle to a directory the command may have written.
    ///
    /// The directory does not have to exist; that is reported when its
    /// entries are listed.
    pub fn directory(&self, container_path: &str) -> Result<Directory> {
        Ok(Directory {
            path: self.host_path(container_path)?,
            container_path: container_path.to_string(),
            scope: None,
            _workspace: Some(Arc::clone(&self.root)),
        })
    }
}

/// Staging directory that logs, rather than ignores, a failed removal.
///
/// Files the container wrote as another user can make removal fail; the
/// directory is then left behind under the system temp dir.
#[derive(Debug)]
struct Scratch {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl Scratch {
    fn new(dir: TempDir) -> Self {
        Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove staging directory",
                );
            }
        }
    }
}

fn outside_workdir(container_path: &str) -> Error {
    Error::NotFound(format!(
        "{} is outside the working directory {}",
        container_path, WORKDIR
    ))
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// A directory of output files, e.g. generated SBOMs.
///
/// A directory can be narrowed to one bake target with
/// [`Directory::for_target`]; it then only lists that target's files.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
    container_path: String,
    scope: Option<String>,
    _workspace: Option<Arc<Scratch>>,
}

impl Directory {
    /// A directory that is not tied to a workspace.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            container_path: path.display().to_string(),
            path,
            scope: None,
            _workspace: None,
        }
    }

    /// The files of one bake target.
    ///
    /// depot writes either a `<target>/` subdirectory or files named
    /// `<target>.<ext>` / `<target>_<platform>.<ext>`. The subdirectory
    /// wins when both exist.
    pub fn for_target(&self, target: &str) -> Directory {
        Directory {
            scope: Some(target.to_string()),
            ..self.clone()
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File names in the directory, sorted. Names are relative to
    /// [`Directory::path`] and can be passed to [`Directory::read`].
    pub async fn entries(&self) -> Result<Vec<String>> {
        let Some(target) = &self.scope else {
            return list_files(&self.path, &self.container_path).await;
        };

        let nested = self.path.join(target);
        if tokio::fs::metadata(&nested)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            let names = list_files(&nested, &self.container_path).await?;
            return Ok(names
                .into_iter()
                .map(|name| format!("{}/{}", target, name))
                .collect());
        }

        let names = list_files(&self.path, &self.container_path).await?;
        Ok(names
            .into_iter()
            .filter(|name| belongs_to_target(name, target))
            .collect())
    }

    /// Read one file by name.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path.join(name)).await?)
    }
}

async fn list_files(path: &Path, container_path: &str) -> Result<Vec<String>> {
    let mut dir = tokio::fs::read_dir(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            Error::NotFound(format!("directory {} does not exist", container_path))
        }
        _ => Error::Io(e),
    })?;

    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn belongs_to_target(file_name: &str, target: &str) -> bool {
    file_name
        .strip_prefix(target)
        .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('_'))
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Executor for testing: never starts a process.
///
/// Each `exec` writes the configured metadata file into a fresh workspace,
/// plus the configured SBOM files when the invocation asked for SBOMs.
pub struct MockExecutor {
    metadata: Option<Vec<u8>>,
    sboms: Vec<(String, Vec<u8>)>,
    failure: Option<(i32, String)>,
    invocations: Mutex<Vec<Invocation>>,
    pulls: Mutex<Vec<(String, String)>>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    /// A mock that succeeds without writing a metadata file.
    pub fn new() -> Self {
        Self {
            metadata: None,
            sboms: Vec::new(),
            failure: None,
            invocations: Mutex::new(Vec::new()),
            pulls: Mutex::new(Vec::new()),
        }
    }

    /// Contents of the metadata file to write.
    pub fn metadata(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.metadata = Some(contents.into());
        self
    }

    /// Add a file to write into the SBOM directory. `name` may contain a
    /// subdirectory, e.g. `web/linux_amd64.spdx.json`.
    pub fn sbom(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.sboms.push((name.into(), contents.into()));
        self
    }

    /// Make every `exec` fail as if depot exited with `exit_code`.
    pub fn fail(mut self, exit_code: i32, stderr: impl Into<String>) -> Self {
        self.failure = Some((exit_code, stderr.into()));
        self
    }

    /// Invocations received so far.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(image, registry host)` pairs pulled so far.
    pub fn pulls(&self) -> Vec<(String, String)> {
        self.pulls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl Executor for MockExecutor {
    async fn exec(&self, invocation: &Invocation) -> Result<Workspace> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        if let Some((exit_code, stderr)) = &self.failure {
            return Err(Error::Execution {
                exit_code: Some(*exit_code),
                stderr: stderr.clone(),
            });
        }

        let root = tempfile::tempdir()?;
        let workspace = Workspace::new(root, ExecOutput::new(Vec::new(), Vec::new(), 0));

        if let Some(metadata) = &self.metadata {
            let path = workspace.host_path(depot_metadata::METADATA_FILE)?;
            tokio::fs::write(&path, metadata).await?;
        }

        if invocation.wants_sbom() && !self.sboms.is_empty() {
            let dir = workspace.host_path(SBOM_DIR)?;
            tokio::fs::create_dir_all(&dir).await?;
            for (name, contents) in &self.sboms {
                let path = dir.join(name);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, contents).await?;
            }
        }

        Ok(workspace)
    }

    async fn pull(&self, image: &str, auth: &RegistryAuth) -> Result<ExecOutput> {
        self.pulls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((image.to_string(), auth.host.clone()));
        Ok(ExecOutput::new(Vec::new(), Vec::new(), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{BuildOptions, BuildRequest, DockerHost};

    fn invocation(sbom: bool) -> Invocation {
        let request = BuildRequest::new(
            "t".to_string().into(),
            "p",
            "/src",
            BuildOptions {
                sbom,
                ..Default::default()
            },
        );
        Invocation::build(&request, "v", &DockerHost::default())
    }

    #[test]
    fn host_path_mapping() {
        let ws = Workspace::new(
            tempfile::tempdir().unwrap(),
            ExecOutput::new(Vec::new(), Vec::new(), 0),
        );
        assert_eq!(
            ws.host_path("metadata.json").unwrap(),
            ws.root().join("metadata.json")
        );
        assert_eq!(ws.host_path("/mnt/sboms").unwrap(), ws.root().join("sboms"));
        assert_eq!(ws.host_path("/mnt").unwrap(), ws.root().join(""));
        assert!(ws.host_path("/etc/passwd").is_err());
        assert!(ws.host_path("/mntx/file").is_err());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let ws = Workspace::new(
            tempfile::tempdir().unwrap(),
            ExecOutput::new(Vec::new(), Vec::new(), 0),
        );
        let err = ws.read_file("metadata.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn directory_outlives_workspace() {
        let ws = Workspace::new(
            tempfile::tempdir().unwrap(),
            ExecOutput::new(Vec::new(), Vec::new(), 0),
        );
        std::fs::create_dir_all(ws.root().join("sboms")).unwrap();
        std::fs::write(ws.root().join("sboms/b.json"), b"b").unwrap();
        std::fs::write(ws.root().join("sboms/a.json"), b"a").unwrap();
        std::fs::create_dir_all(ws.root().join("sboms/nested")).unwrap();

        let dir = ws.directory(SBOM_DIR).unwrap();
        drop(ws);

        assert_eq!(dir.entries().await.unwrap(), vec!["a.json", "b.json"]);
        assert_eq!(dir.read("a.json").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn target_scope_filters_by_file_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let names = [
            "api.spdx.json",
            "web.spdx.json",
            "web_linux_arm64.spdx.json",
            "webapp.json",
        ];
        for name in names {
            std::fs::write(tmp.path().join(name), name).unwrap();
        }

        let dir = Directory::from_path(tmp.path());
        assert_eq!(
            dir.for_target("web").entries().await.unwrap(),
            vec!["web.spdx.json", "web_linux_arm64.spdx.json"]
        );
        assert_eq!(
            dir.for_target("api").entries().await.unwrap(),
            vec!["api.spdx.json"]
        );
        assert!(dir.for_target("db").entries().await.unwrap().is_empty());
        assert_eq!(dir.entries().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn target_scope_prefers_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("web")).unwrap();
        std::fs::write(tmp.path().join("web/linux_amd64.spdx.json"), b"web").unwrap();
        std::fs::write(tmp.path().join("web.spdx.json"), b"flat").unwrap();

        let web = Directory::from_path(tmp.path()).for_target("web");
        let entries = web.entries().await.unwrap();
        assert_eq!(entries, vec!["web/linux_amd64.spdx.json"]);
        assert_eq!(web.read(&entries[0]).await.unwrap(), b"web");
    }

    #[tokio::test]
    async fn staging_directory_is_removed_with_last_handle() {
        let ws = Workspace::new(
            tempfile::tempdir().unwrap(),
            ExecOutput::new(Vec::new(), Vec::new(), 0),
        );
        let root = ws.root().to_path_buf();
        let dir = ws.directory(SBOM_DIR).unwrap();

        drop(ws);
        assert!(root.exists());
        drop(dir);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn absent_directory_lists_as_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Directory::from_path(tmp.path().join("nope"));
        assert!(dir.entries().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn mock_writes_metadata_and_records_calls() {
        let mock = MockExecutor::new()
            .metadata(r#"{"image.name": "x"}"#)
            .sbom("sbom.spdx.json", "{}");

        let ws = mock.exec(&invocation(false)).await.unwrap();
        assert_eq!(
            ws.read_file("metadata.json").await.unwrap(),
            br#"{"image.name": "x"}"#
        );
        assert!(!ws.root().join("sboms").exists());

        let ws = mock.exec(&invocation(true)).await.unwrap();
        let entries = ws.directory(SBOM_DIR).unwrap().entries().await.unwrap();
        assert_eq!(entries, vec!["sbom.spdx.json"]);

        assert_eq!(mock.invocations().len(), 2);
    }

    #[tokio::test]
    async fn mock_failure_is_an_execution_error() {
        let mock = MockExecutor::new().fail(2, "unauthenticated");
        match mock.exec(&invocation(false)).await {
            Err(Error::Execution { exit_code, stderr }) => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(stderr, "unauthenticated");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(mock.invocations().len(), 1);
    }
}
