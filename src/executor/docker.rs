//! Docker Executor
//!
//! Runs the depot CLI image with the local `docker` CLI.
//!
//! The source directory is copied into a scratch directory before the run,
//! so the container sees a private snapshot and files depot writes there
//! (the metadata file, SBOMs) never land in the caller's tree.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use secrecy::ExposeSecret;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{Executor, Workspace};
use crate::artifact::RegistryAuth;
use crate::invocation::Invocation;
use crate::{Error, ExecOutput, Result};

/// Executor backed by `docker run`.
#[derive(Debug, Clone)]
pub struct DockerExecutor {
    docker: PathBuf,
}

impl Default for DockerExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerExecutor {
    /// Use `docker` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a specific docker-compatible CLI (e.g. `podman`).
    pub fn with_binary(docker: impl Into<PathBuf>) -> Self {
        Self {
            docker: docker.into(),
        }
    }

    /// Arguments for `docker run`, with the source snapshot at `staged`.
    ///
    /// Secret variables are passed by name only; their values reach docker
    /// through its own environment and never appear in argv.
    pub fn run_args(&self, invocation: &Invocation, staged: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "run".into(),
            "--rm".into(),
            "--entrypoint".into(),
            "".into(),
            "--workdir".into(),
            invocation.workdir.clone().into(),
            "--volume".into(),
            volume(staged, &invocation.mount.container),
        ];

        for socket in &invocation.sockets {
            args.push("--volume".into());
            args.push(volume(&socket.host_path, &socket.container_path));
        }

        for (key, value) in &invocation.env {
            args.push("--env".into());
            args.push(format!("{}={}", key, value).into());
        }

        for (key, _) in &invocation.secret_env {
            args.push("--env".into());
            args.push(key.clone().into());
        }

        args.push(invocation.image.clone().into());
        args.extend(invocation.args.iter().map(OsString::from));
        args
    }

    async fn run(&self, mut cmd: Command, stdin: Option<&[u8]>) -> Result<ExecOutput> {
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| Error::Execution {
            exit_code: None,
            stderr: format!("failed to start {}: {}", self.docker.display(), e),
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            // Close stdin so the child sees EOF.
            drop(pipe);
        }

        let output = child.wait_with_output().await?;
        let exec = ExecOutput::new(
            output.stdout,
            output.stderr,
            output.status.code().unwrap_or(-1),
        );

        if !output.status.success() {
            warn!(
                exit_code = ?output.status.code(),
                "{} failed; stderr={}",
                self.docker.display(),
                exec.stderr_str().trim(),
            );
            return Err(Error::Execution {
                exit_code: output.status.code(),
                stderr: exec.stderr_str(),
            });
        }

        Ok(exec)
    }
}

fn volume(host: &Path, container: &str) -> OsString {
    let mut spec = host.as_os_str().to_os_string();
    spec.push(":");
    spec.push(container);
    spec
}

#[async_trait::async_trait]
impl Executor for DockerExecutor {
    async fn exec(&self, invocation: &Invocation) -> Result<Workspace> {
        let source = invocation.mount.host.clone();
        let staged = tempfile::tempdir()?;
        let dest = staged.path().to_path_buf();

        // Copying is blocking filesystem work; run it off the async workers.
        let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &dest))
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "staging task panicked: {}",
                    e
                )))
            })??;
        debug!(files = copied, staged = %staged.path().display(), "staged source directory");

        let mut cmd = Command::new(&self.docker);
        cmd.args(self.run_args(invocation, staged.path()));
        for (key, value) in &invocation.secret_env {
            cmd.env(key, value.expose_secret());
        }

        info!(image = %invocation.image, command = ?invocation.args.get(1), "running depot");
        debug!(args = ?invocation.args, "depot arguments");

        let output = self.run(cmd, None).await?;
        Ok(Workspace::new(staged, output))
    }

    async fn pull(&self, image: &str, auth: &RegistryAuth) -> Result<ExecOutput> {
        let mut login = Command::new(&self.docker);
        login.args([
            "login",
            auth.host.as_str(),
            "--username",
            auth.username.as_str(),
            "--password-stdin",
        ]);
        self.run(login, Some(auth.password.expose_secret().as_bytes()))
            .await?;
        debug!(registry = %auth.host, "logged in");

        let mut pull = Command::new(&self.docker);
        pull.args(["pull", image]);
        let output = self.run(pull, None).await?;
        info!(image, "pulled image");
        Ok(output)
    }
}

/// Recursively copy `source` into `dest`, returning the number of files copied.
fn copy_tree(source: &Path, dest: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(Error::Config(format!(
            "source directory {} does not exist",
            source.display()
        )));
    }

    let mut files = 0;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }
    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let pointee = std::fs::read_link(link)?;
    std::os::unix::fs::symlink(pointee, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    if link.is_file() {
        std::fs::copy(link, target)?;
    }
    Ok(())
}
