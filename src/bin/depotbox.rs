use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use depot_box::artifact::BuildArtifact;
use depot_box::config::{load_config, DepotConfig};
use depot_box::executor::DockerExecutor;
use depot_box::invocation::{BakeOptions, BakeRequest, BuildOptions, BuildRequest, DockerHost};
use depot_box::version::{VersionResolver, DEFAULT_RELEASE_URL};
use depot_box::Depot;

/// Build container images on depot.dev.
#[derive(Debug, Parser)]
#[command(name = "depotbox", version, about)]
struct Cli {
    /// YAML or JSON file with default build/bake options
    #[arg(long, global = true, env = "DEPOTBOX_CONFIG")]
    config: Option<PathBuf>,

    /// depot CLI version (default: latest release)
    #[arg(long, global = true, env = "DEPOT_CLI_VERSION")]
    depot_version: Option<String>,

    /// Container engine address, unix:// or tcp://
    #[arg(long, global = true, env = "DOCKER_HOST")]
    docker_host: Option<String>,

    /// docker-compatible CLI used to run the depot image
    #[arg(long, global = true, default_value = "docker")]
    docker: PathBuf,

    #[arg(long, global = true, hide = true, default_value = DEFAULT_RELEASE_URL)]
    release_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build an image from a Dockerfile
    Build {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        options: BuildArgs,
        /// What to print once the build finishes
        #[arg(value_enum, default_value_t = Emit::ImageName)]
        emit: Emit,
    },
    /// Build every target of a bake file
    Bake {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        options: BakeArgs,
        /// Only report this target
        #[arg(long)]
        target: Option<String>,
        /// What to print for the selected target
        #[arg(value_enum, default_value_t = Emit::ImageName)]
        emit: Emit,
    },
    /// Print the latest released depot CLI version, ignoring any pin
    Version,
}

#[derive(Debug, Args)]
struct ProjectArgs {
    /// depot token
    #[arg(long, env = "DEPOT_TOKEN", hide_env_values = true)]
    token: String,
    /// depot project id
    #[arg(long, env = "DEPOT_PROJECT_ID")]
    project: String,
    /// Source context directory
    #[arg(long, default_value = ".")]
    directory: PathBuf,
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Path to the Dockerfile
    #[arg(long)]
    dockerfile: Option<String>,
    #[arg(long = "platform")]
    platforms: Vec<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long = "build-arg")]
    build_args: Vec<String>,
    #[arg(long = "label")]
    labels: Vec<String>,
    #[arg(long = "output")]
    outputs: Vec<String>,
    #[arg(long)]
    provenance: Option<String>,
    /// Produce a software bill of materials
    #[arg(long)]
    sbom: bool,
    #[arg(long)]
    no_cache: bool,
    /// Do not save the image to the depot ephemeral registry
    #[arg(long)]
    no_save: bool,
    #[arg(long)]
    lint: bool,
}

#[derive(Debug, Args)]
struct BakeArgs {
    /// Bake definition file
    #[arg(long)]
    bake_file: Option<String>,
    #[arg(long)]
    provenance: Option<String>,
    #[arg(long)]
    sbom: bool,
    #[arg(long)]
    no_cache: bool,
    #[arg(long)]
    no_save: bool,
    #[arg(long)]
    lint: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Image references in the depot registry, one per line
    ImageName,
    /// Image size in bytes (config + compressed layers)
    ImageBytes,
    /// First SBOM document (requires --sbom)
    Sbom,
    /// Decoded build metadata as JSON
    Metadata,
    /// Pull the image into the local container engine
    Pull,
}

impl BuildArgs {
    fn apply(self, mut opts: BuildOptions) -> BuildOptions {
        if let Some(dockerfile) = self.dockerfile {
            opts.dockerfile = dockerfile;
        }
        if let Some(provenance) = self.provenance {
            opts.provenance = provenance;
        }
        replace_if_set(&mut opts.platforms, self.platforms);
        replace_if_set(&mut opts.tags, self.tags);
        replace_if_set(&mut opts.build_args, self.build_args);
        replace_if_set(&mut opts.labels, self.labels);
        replace_if_set(&mut opts.outputs, self.outputs);
        opts.sbom |= self.sbom;
        opts.no_cache |= self.no_cache;
        opts.no_save |= self.no_save;
        opts.lint |= self.lint;
        opts
    }
}

impl BakeArgs {
    fn apply(self, mut opts: BakeOptions) -> BakeOptions {
        if let Some(bake_file) = self.bake_file {
            opts.bake_file = bake_file;
        }
        if let Some(provenance) = self.provenance {
            opts.provenance = provenance;
        }
        opts.sbom |= self.sbom;
        opts.no_cache |= self.no_cache;
        opts.no_save |= self.no_save;
        opts.lint |= self.lint;
        opts
    }
}

fn replace_if_set(target: &mut Vec<String>, values: Vec<String>) {
    if !values.is_empty() {
        *target = values;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("{}", latest_version(&cli).await?);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DepotConfig::default(),
    };
    let docker_host = match cli.docker_host.as_deref() {
        Some(raw) => DockerHost::parse(raw)?,
        None => config.docker_host()?,
    };
    let version = cli.depot_version.clone().or(config.depot_version.clone());
    let depot = Depot::new(DockerExecutor::with_binary(&cli.docker))
        .resolver(VersionResolver::with_base_url(&cli.release_url))
        .docker_host(docker_host);

    match cli.command {
        Command::Build {
            project,
            options,
            emit,
        } => {
            let request = BuildRequest::new(
                project.token.into(),
                project.project,
                project.directory,
                options.apply(config.build),
            );
            let artifact = depot.build(&request, version.as_deref()).await?;
            emit_artifact(&depot, &artifact, emit).await?;
        }
        Command::Bake {
            project,
            options,
            target,
            emit,
        } => {
            let request = BakeRequest::new(
                project.token.into(),
                project.project,
                project.directory,
                options.apply(config.bake),
            );
            let artifacts = depot.bake(&request, version.as_deref()).await?;
            match target {
                Some(name) => emit_artifact(&depot, &artifacts.target(&name)?, emit).await?,
                None => {
                    let mut out = io::stdout().lock();
                    for name in artifacts.targets() {
                        let artifact = artifacts.target(name)?;
                        writeln!(
                            out,
                            "{}\t{}\t{}",
                            name,
                            artifact.image_name(),
                            artifact.image_bytes()
                        )?;
                    }
                }
            }
        }
        Command::Version => {}
    }

    Ok(())
}

async fn latest_version(cli: &Cli) -> depot_box::Result<String> {
    VersionResolver::with_base_url(&cli.release_url).latest().await
}

async fn emit_artifact(
    depot: &Depot<DockerExecutor>,
    artifact: &BuildArtifact,
    emit: Emit,
) -> Result<(), Box<dyn std::error::Error>> {
    match emit {
        Emit::ImageName => {
            for image in artifact.image_refs() {
                println!("{}", image);
            }
        }
        Emit::ImageBytes => println!("{}", artifact.image_bytes()),
        Emit::Sbom => {
            let sbom = artifact.sbom().await?;
            let mut out = io::stdout().lock();
            out.write_all(&sbom)?;
            out.flush()?;
        }
        Emit::Metadata => {
            println!("{}", serde_json::to_string_pretty(&artifact.metadata)?);
        }
        Emit::Pull => {
            artifact.pull(depot.executor()).await?;
            if let Some(image) = artifact.image_refs().first() {
                println!("{}", image);
            }
        }
    }
    Ok(())
}
