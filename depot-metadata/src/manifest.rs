use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// A content-addressable descriptor for one blob: an image config, a layer,
/// or the manifest list itself.
///
/// depot omits zero-valued fields, so every field defaults on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OciDescriptor {
    #[serde(rename = "mediaType", default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,

    #[serde(default)]
    pub size: i64,
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One platform variant of a built image, as recorded under `manifests`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: i64,

    #[serde(rename = "mediaType", default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,

    #[serde(default)]
    pub config: OciDescriptor,

    #[serde(default)]
    pub layers: Vec<OciDescriptor>,
}

impl Manifest {
    /// Config size plus the size of every layer.
    ///
    /// Layer sizes are the compressed sizes stored in the registry; the
    /// unpacked on-disk size is not recorded anywhere in the metadata.
    pub fn size(&self) -> i64 {
        self.layers
            .iter()
            .map(|l| l.size)
            .fold(self.config.size, i64::saturating_add)
    }
}

// ---------------------------------------------------------------------------
// Build identifiers
// ---------------------------------------------------------------------------

/// The `depot.build` section: which depot build and project produced the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotBuild {
    #[serde(rename = "buildID", default, skip_serializing_if = "String::is_empty")]
    pub build_id: String,

    #[serde(rename = "projectID", default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
