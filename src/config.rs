//! Configuration file for the `depotbox` CLI.
//!
//! ```yaml
//! depot_version: "2.76.0"     # omit to use the latest release
//! docker_host: unix:///var/run/docker.sock
//! build:
//!   dockerfile: docker/Dockerfile
//!   platforms: [linux/amd64, linux/arm64]
//!   sbom: true
//! bake:
//!   bake_file: docker-bake.hcl
//! ```
//!
//! Command-line flags override values from the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::invocation::{BakeOptions, BuildOptions, DockerHost};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepotConfig {
    /// Pinned depot CLI version. Empty means latest.
    pub depot_version: Option<String>,
    /// `unix://` or `tcp://` address. Default `unix:///var/run/docker.sock`.
    pub docker_host: Option<String>,
    pub build: BuildOptions,
    pub bake: BakeOptions,
}

impl DepotConfig {
    /// Parsed docker host, or the default when unset.
    pub fn docker_host(&self) -> Result<DockerHost> {
        match self.docker_host.as_deref() {
            Some(raw) => DockerHost::parse(raw),
            None => Ok(DockerHost::default()),
        }
    }
}

/// Load a YAML (`.yaml`/`.yml`) or JSON config file.
pub fn load_config(path: &Path) -> Result<DepotConfig> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let config: DepotConfig = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid JSON config {}: {}", path.display(), e)))?
    } else {
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid YAML config {}: {}", path.display(), e)))?
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &DepotConfig) -> Result<()> {
    config.docker_host()?;
    if config.bake.bake_file.trim().is_empty() {
        return Err(Error::Config("bake.bake_file cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_yaml_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "depot.yaml",
            r#"
depot_version: "2.76.0"
docker_host: tcp://10.0.0.1:2375
build:
  dockerfile: docker/Dockerfile
  platforms: [linux/amd64, linux/arm64]
  sbom: true
bake:
  bake_file: ci/bake.hcl
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.depot_version.as_deref(), Some("2.76.0"));
        assert_eq!(config.docker_host().unwrap(), DockerHost::Tcp("tcp://10.0.0.1:2375".into()));
        assert_eq!(config.build.dockerfile, "docker/Dockerfile");
        assert_eq!(config.build.platforms.len(), 2);
        assert!(config.build.sbom);
        assert_eq!(config.bake.bake_file, "ci/bake.hcl");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "depot.yml", "{}\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config, DepotConfig::default());
        assert_eq!(config.docker_host().unwrap(), DockerHost::default());
        assert_eq!(config.build.dockerfile, "Dockerfile");
    }

    #[test]
    fn json_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "depot.json", r#"{"build": {"no_save": true}}"#);
        assert!(load_config(&path).unwrap().build.no_save);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "depot.yaml", "tokn: abc\n");
        assert!(matches!(load_config(&path), Err(Error::Config(_))));
    }

    #[test]
    fn bad_docker_host_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "depot.yaml", "docker_host: npipe:////./pipe/docker\n");
        assert!(matches!(load_config(&path), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            load_config(Path::new("/no/such/depot.yaml")),
            Err(Error::Config(_))
        ));
    }
}
