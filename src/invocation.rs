//! Invocation Builder
//!
//! Turns a [`BuildRequest`] or [`BakeRequest`] into an [`Invocation`]: the
//! depot CLI argument vector plus everything the container running it needs
//! (image, mounts, environment, secrets, sockets).
//!
//! An `Invocation` is complete when constructed. Executors receive it by
//! reference and cannot add env or sockets after the fact, so the socket
//! and `DOCKER_HOST` wiring is always in place before the command runs.
//!
//! # Example
//!
//! ```
//! use depot_box::invocation::{BuildOptions, BuildRequest, DockerHost, Invocation};
//!
//! let request = BuildRequest::new(
//!     "depot-token".to_string().into(),
//!     "prj123",
//!     ".",
//!     BuildOptions {
//!         platforms: vec!["linux/amd64".into(), "linux/arm64".into()],
//!         ..Default::default()
//!     },
//! );
//! let invocation = Invocation::build(&request, "2.76.0", &DockerHost::default());
//! assert_eq!(invocation.image, "public.ecr.aws/depot/cli:2.76.0");
//! assert!(invocation.args.contains(&"--platform".to_string()));
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::version::cli_image;
use crate::{Error, Result};

/// Path of the depot binary inside the CLI image.
pub const DEPOT_BIN: &str = "/usr/bin/depot";
/// Where the source directory is mounted, and the working directory.
pub const WORKDIR: &str = "/mnt";
/// Where `--sbom-dir` points when SBOMs are requested.
pub const SBOM_DIR: &str = "/mnt/sboms";
/// Container path the host's docker socket is attached at.
pub const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";
/// Docker host used when none is configured.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

pub const ENV_PROJECT_ID: &str = "DEPOT_PROJECT_ID";
pub const ENV_TOKEN: &str = "DEPOT_TOKEN";
pub const ENV_DISABLE_OTEL: &str = "DEPOT_DISABLE_OTEL";
pub const ENV_DOCKER_HOST: &str = "DOCKER_HOST";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_bake_file() -> String {
    "docker-bake.hcl".to_string()
}

/// Options for `depot build`. Empty strings mean "not set".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Path to the Dockerfile, relative to the source directory. Default `Dockerfile`.
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    /// Target platforms such as `linux/amd64`.
    pub platforms: Vec<String>,
    pub tags: Vec<String>,
    /// `KEY=VALUE` build arguments.
    pub build_args: Vec<String>,
    /// `KEY=VALUE` image labels.
    pub labels: Vec<String>,
    /// Output specs overriding the default.
    pub outputs: Vec<String>,
    /// Provenance attestation setting, e.g. `mode=max`.
    pub provenance: String,
    /// Generate SBOMs and download them to [`SBOM_DIR`].
    pub sbom: bool,
    pub no_cache: bool,
    /// Skip saving the image to the depot ephemeral registry.
    pub no_save: bool,
    pub lint: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            dockerfile: default_dockerfile(),
            platforms: Vec::new(),
            tags: Vec::new(),
            build_args: Vec::new(),
            labels: Vec::new(),
            outputs: Vec::new(),
            provenance: String::new(),
            sbom: false,
            no_cache: false,
            no_save: false,
            lint: false,
        }
    }
}

/// Options for `depot bake`. Empty strings mean "not set".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeOptions {
    /// Bake definition file. Default `docker-bake.hcl`.
    #[serde(default = "default_bake_file")]
    pub bake_file: String,
    pub sbom: bool,
    pub no_cache: bool,
    pub no_save: bool,
    pub lint: bool,
    pub provenance: String,
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            bake_file: default_bake_file(),
            sbom: false,
            no_cache: false,
            no_save: false,
            lint: false,
            provenance: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Everything needed to run one `depot build`.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub token: SecretString,
    pub project: String,
    /// Source context directory on the host.
    pub directory: PathBuf,
    pub options: BuildOptions,
}

impl BuildRequest {
    pub fn new(
        token: SecretString,
        project: impl Into<String>,
        directory: impl Into<PathBuf>,
        options: BuildOptions,
    ) -> Self {
        Self {
            token,
            project: project.into(),
            directory: directory.into(),
            options,
        }
    }
}

/// Everything needed to run one `depot bake`.
#[derive(Debug, Clone)]
pub struct BakeRequest {
    pub token: SecretString,
    pub project: String,
    pub directory: PathBuf,
    pub options: BakeOptions,
}

impl BakeRequest {
    pub fn new(
        token: SecretString,
        project: impl Into<String>,
        directory: impl Into<PathBuf>,
        options: BakeOptions,
    ) -> Self {
        Self {
            token,
            project: project.into(),
            directory: directory.into(),
            options,
        }
    }
}

// ---------------------------------------------------------------------------
// Docker host
// ---------------------------------------------------------------------------

/// The container engine depot should talk to for `--load` style outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerHost {
    /// A local unix socket, attached into the container.
    Unix(PathBuf),
    /// A TCP endpoint, passed through verbatim.
    Tcp(String),
}

impl DockerHost {
    /// Parse a `unix://` or `tcp://` address.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(path) = raw.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::Config(format!("docker host {raw:?} has no socket path")));
            }
            Ok(DockerHost::Unix(PathBuf::from(path)))
        } else if raw.starts_with("tcp://") {
            Ok(DockerHost::Tcp(raw.to_string()))
        } else {
            Err(Error::Config(format!(
                "unsupported docker host {raw:?}: expected unix:// or tcp://"
            )))
        }
    }
}

impl Default for DockerHost {
    fn default() -> Self {
        DockerHost::Unix(PathBuf::from(
            DEFAULT_DOCKER_HOST.trim_start_matches("unix://"),
        ))
    }
}

impl fmt::Display for DockerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerHost::Unix(path) => write!(f, "unix://{}", path.display()),
            DockerHost::Tcp(addr) => f.write_str(addr),
        }
    }
}

impl std::str::FromStr for DockerHost {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// A host directory made visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
}

/// A host unix socket made visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketAttachment {
    pub host_path: PathBuf,
    pub container_path: String,
}

/// A fully wired depot CLI invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Image providing the depot CLI.
    pub image: String,
    /// Argument vector, starting with the depot binary.
    pub args: Vec<String>,
    /// Plain environment variables.
    pub env: Vec<(String, String)>,
    /// Environment variables whose values must not be logged or shown in argv.
    pub secret_env: Vec<(String, SecretString)>,
    pub mount: Mount,
    pub workdir: String,
    pub sockets: Vec<SocketAttachment>,
}

impl Invocation {
    /// Invocation for `depot build`.
    pub fn build(request: &BuildRequest, version: &str, docker_host: &DockerHost) -> Self {
        let opts = &request.options;
        let mut args = vec![
            DEPOT_BIN.to_string(),
            "build".to_string(),
            ".".to_string(),
            format!("--metadata-file={}", depot_metadata::METADATA_FILE),
        ];

        push_flags(&mut args, !opts.no_save, opts.sbom, opts.no_cache, opts.lint);

        push_repeated(&mut args, "--platform", &opts.platforms);
        push_repeated(&mut args, "--tag", &opts.tags);
        push_repeated(&mut args, "--build-arg", &opts.build_args);
        push_repeated(&mut args, "--label", &opts.labels);
        push_repeated(&mut args, "--output", &opts.outputs);

        push_optional(&mut args, "--file", &opts.dockerfile);
        push_optional(&mut args, "--provenance", &opts.provenance);

        Self::wire(
            args,
            version,
            &request.token,
            &request.project,
            &request.directory,
            docker_host,
        )
    }

    /// Invocation for `depot bake`.
    pub fn bake(request: &BakeRequest, version: &str, docker_host: &DockerHost) -> Self {
        let opts = &request.options;
        let mut args = vec![
            DEPOT_BIN.to_string(),
            "bake".to_string(),
            "-f".to_string(),
            opts.bake_file.clone(),
            format!("--metadata-file={}", depot_metadata::METADATA_FILE),
        ];

        push_flags(&mut args, !opts.no_save, opts.sbom, opts.no_cache, opts.lint);
        push_optional(&mut args, "--provenance", &opts.provenance);

        Self::wire(
            args,
            version,
            &request.token,
            &request.project,
            &request.directory,
            docker_host,
        )
    }

    fn wire(
        args: Vec<String>,
        version: &str,
        token: &SecretString,
        project: &str,
        directory: &Path,
        docker_host: &DockerHost,
    ) -> Self {
        let mut env = vec![
            (ENV_PROJECT_ID.to_string(), project.to_string()),
            (ENV_DISABLE_OTEL.to_string(), "true".to_string()),
        ];
        let mut sockets = Vec::new();

        match docker_host {
            DockerHost::Unix(path) => {
                sockets.push(SocketAttachment {
                    host_path: path.clone(),
                    container_path: DOCKER_SOCKET_PATH.to_string(),
                });
                env.push((
                    ENV_DOCKER_HOST.to_string(),
                    format!("unix://{}", DOCKER_SOCKET_PATH),
                ));
            }
            DockerHost::Tcp(addr) => {
                env.push((ENV_DOCKER_HOST.to_string(), addr.clone()));
            }
        }

        Self {
            image: cli_image(version),
            args,
            env,
            secret_env: vec![(ENV_TOKEN.to_string(), token.clone())],
            mount: Mount {
                host: directory.to_path_buf(),
                container: WORKDIR.to_string(),
            },
            workdir: WORKDIR.to_string(),
            sockets,
        }
    }

    /// Value of a plain environment variable.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the command asked depot to write SBOMs.
    pub fn wants_sbom(&self) -> bool {
        self.args.iter().any(|a| a == "--sbom=true")
    }
}

fn push_flags(args: &mut Vec<String>, save: bool, sbom: bool, no_cache: bool, lint: bool) {
    if save {
        args.push("--save".to_string());
    }
    if sbom {
        args.push("--sbom=true".to_string());
        args.push(format!("--sbom-dir={}", SBOM_DIR));
    }
    if no_cache {
        args.push("--no-cache".to_string());
    }
    if lint {
        args.push("--lint".to_string());
    }
}

fn push_repeated(args: &mut Vec<String>, flag: &str, values: &[String]) {
    for value in values {
        args.push(flag.to_string());
        args.push(value.clone());
    }
}

fn push_optional(args: &mut Vec<String>, flag: &str, value: &str) {
    if !value.is_empty() {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}
