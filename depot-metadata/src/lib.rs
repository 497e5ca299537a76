pub mod bake;
pub mod error;
pub mod manifest;

pub use bake::BakeMetadata;
pub use error::{MetadataError, Result};
pub use manifest::{DepotBuild, Manifest, OciDescriptor};

use serde::{Deserialize, Serialize};

/// File name `depot` writes build metadata to, relative to its working directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Top-level key that carries the build and project identifiers.
pub const DEPOT_BUILD_KEY: &str = "depot.build";

/// Decoded contents of the metadata file written by `depot build`.
///
/// Only the fields needed downstream are modelled. The file also carries
/// `containerimage.buildinfo` sections, keyed per platform for multi-platform
/// builds and unkeyed for single-platform ones; those are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetadata {
    /// Descriptor of the pushed manifest list (or single manifest).
    #[serde(rename = "containerimage.descriptor", default)]
    pub container_image_descriptor: OciDescriptor,

    #[serde(rename = "depot.build", default)]
    pub depot_build: DepotBuild,

    /// Reference of the saved image; the value to pull.
    #[serde(rename = "image.name", default, skip_serializing_if = "String::is_empty")]
    pub image_name: String,

    /// One entry per built platform.
    #[serde(default)]
    pub manifests: Vec<Manifest>,
}

impl BuildMetadata {
    /// Decode a metadata file.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Total image size in bytes: the descriptor plus, for every manifest,
    /// its config and all of its layers.
    ///
    /// Saturates at `i64::MAX` instead of overflowing.
    pub fn size(&self) -> i64 {
        self.manifests
            .iter()
            .map(Manifest::size)
            .fold(self.container_image_descriptor.size, i64::saturating_add)
    }

    /// `image.name` may hold several comma separated references when the
    /// build was tagged more than once.
    pub fn image_refs(&self) -> Vec<&str> {
        self.image_name
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_PLATFORM: &str = r#"{
        "containerimage.buildinfo/linux/amd64": {"frontend": "dockerfile.v0"},
        "containerimage.buildinfo/linux/arm64": {"frontend": "dockerfile.v0"},
        "containerimage.descriptor": {
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "digest": "sha256:index",
            "size": 856
        },
        "containerimage.digest": "sha256:index",
        "depot.build": {"buildID": "bld123", "projectID": "prj456"},
        "image.name": "registry.depot.dev/prj456:bld123",
        "manifests": [
            {
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:c1", "size": 100},
                "layers": [
                    {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:l1", "size": 1000},
                    {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:l2", "size": 2000}
                ]
            },
            {
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:c2", "size": 200},
                "layers": [
                    {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:l3", "size": 3000}
                ]
            }
        ]
    }"#;

    #[test]
    fn decode_multi_platform() {
        let m = BuildMetadata::from_slice(MULTI_PLATFORM.as_bytes()).unwrap();
        assert_eq!(m.depot_build.build_id, "bld123");
        assert_eq!(m.depot_build.project_id, "prj456");
        assert_eq!(m.image_name, "registry.depot.dev/prj456:bld123");
        assert_eq!(m.manifests.len(), 2);
    }

    #[test]
    fn size_sums_descriptor_configs_and_layers() {
        let m = BuildMetadata::from_slice(MULTI_PLATFORM.as_bytes()).unwrap();
        assert_eq!(m.size(), 856 + (100 + 1000 + 2000) + (200 + 3000));
    }

    #[test]
    fn size_without_manifests_is_descriptor_size() {
        let m = BuildMetadata::from_slice(
            br#"{"containerimage.descriptor": {"digest": "sha256:x", "size": 512}}"#,
        )
        .unwrap();
        assert!(m.manifests.is_empty());
        assert_eq!(m.size(), 512);
    }

    #[test]
    fn empty_object_decodes_to_defaults() {
        let m = BuildMetadata::from_slice(b"{}").unwrap();
        assert_eq!(m, BuildMetadata::default());
        assert_eq!(m.size(), 0);
    }

    #[test]
    fn size_saturates_instead_of_overflowing() {
        let m = BuildMetadata::from_slice(
            br#"{
                "containerimage.descriptor": {"size": 9223372036854775000},
                "manifests": [{"config": {"size": 9223372036854775000}, "layers": [{"size": 1}]}]
            }"#,
        )
        .unwrap();
        assert_eq!(m.size(), i64::MAX);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = BuildMetadata::from_slice(b"{\"image.name\": ").unwrap_err();
        assert!(matches!(err, MetadataError::Json(_)));
    }

    #[test]
    fn wrong_field_type_is_an_error() {
        assert!(BuildMetadata::from_slice(br#"{"manifests": "nope"}"#).is_err());
    }

    #[test]
    fn image_refs_split_on_commas() {
        let m = BuildMetadata {
            image_name: "registry.depot.dev/p:a, registry.depot.dev/p:b".to_string(),
            ..Default::default()
        };
        assert_eq!(
            m.image_refs(),
            vec!["registry.depot.dev/p:a", "registry.depot.dev/p:b"]
        );
        assert!(BuildMetadata::default().image_refs().is_empty());
    }
}
