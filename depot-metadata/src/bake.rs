use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::{BuildMetadata, DepotBuild, MetadataError, Result, DEPOT_BUILD_KEY};

/// Decoded contents of the metadata file written by `depot bake`.
///
/// The file has no fixed schema: every top-level key except `depot.build`
/// is a target name whose value has the same shape as a single build's
/// metadata. Targets keep the order they appear in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BakeMetadata {
    pub depot_build: DepotBuild,
    pub targets: IndexMap<String, BuildMetadata>,
}

impl BakeMetadata {
    /// Decode a bake metadata file.
    ///
    /// Decoding happens in two passes: the document is first read as a
    /// generic object, then each key is classified by name. A target that is
    /// literally named `depot.build` cannot be told apart from the build
    /// identifiers and is read as the latter.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let object = match value {
            Value::Object(object) => object,
            other => return Err(MetadataError::NotAnObject(json_kind(&other))),
        };

        let mut metadata = BakeMetadata::default();
        for (key, value) in object {
            if key == DEPOT_BUILD_KEY {
                metadata.depot_build = serde_json::from_value(value)?;
                continue;
            }

            let target = serde_json::from_value::<BuildMetadata>(value).map_err(|source| {
                MetadataError::Target {
                    target: key.clone(),
                    source,
                }
            })?;
            debug!(target = %key, image = %target.image_name, "decoded bake target");
            metadata.targets.insert(key, target);
        }

        Ok(metadata)
    }

    /// Target names in file order.
    pub fn target_names(&self) -> Vec<&str> {
        self.targets.keys().map(String::as_str).collect()
    }

    pub fn target(&self, name: &str) -> Option<&BuildMetadata> {
        self.targets.get(name)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_BAKE: &str = r#"{
        "web": {
            "containerimage.descriptor": {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:w", "size": 10},
            "image.name": "registry.depot.dev/prj:bld-web",
            "manifests": [
                {"config": {"size": 5}, "layers": [{"size": 100}, {"size": 200}]}
            ]
        },
        "depot.build": {"buildID": "bld", "projectID": "prj"},
        "api": {
            "containerimage.descriptor": {"digest": "sha256:a", "size": 20},
            "image.name": "registry.depot.dev/prj:bld-api"
        }
    }"#;

    #[test]
    fn partitions_reserved_key_and_targets() {
        let m = BakeMetadata::from_slice(SAMPLE_BAKE.as_bytes()).unwrap();
        assert_eq!(m.depot_build.build_id, "bld");
        assert_eq!(m.depot_build.project_id, "prj");
        assert_eq!(m.target_names(), vec!["web", "api"]);
        assert!(m.target(DEPOT_BUILD_KEY).is_none());
    }

    #[test]
    fn reordered_keys_decode_the_same_targets() {
        let reordered = r#"{
            "api": {"containerimage.descriptor": {"size": 20}, "image.name": "registry.depot.dev/prj:bld-api"},
            "web": {"containerimage.descriptor": {"size": 10}, "image.name": "registry.depot.dev/prj:bld-web",
                    "manifests": [{"config": {"size": 5}, "layers": [{"size": 100}, {"size": 200}]}]},
            "depot.build": {"projectID": "prj", "buildID": "bld"}
        }"#;
        let a = BakeMetadata::from_slice(SAMPLE_BAKE.as_bytes()).unwrap();
        let b = BakeMetadata::from_slice(reordered.as_bytes()).unwrap();
        assert_eq!(a.depot_build, b.depot_build);
        assert_eq!(b.target_names(), vec!["api", "web"]);
        assert_eq!(a.targets, b.targets);
        for name in a.target_names() {
            assert_eq!(a.target(name).unwrap().size(), b.target(name).unwrap().size());
        }
    }

    #[test]
    fn target_size_matches_single_build_decode() {
        let m = BakeMetadata::from_slice(SAMPLE_BAKE.as_bytes()).unwrap();
        assert_eq!(m.target("web").unwrap().size(), 10 + 5 + 100 + 200);
        assert_eq!(m.target("api").unwrap().size(), 20);
    }

    #[test]
    fn missing_reserved_key_leaves_identifiers_empty() {
        let m = BakeMetadata::from_slice(br#"{"web": {"image.name": "x"}}"#).unwrap();
        assert_eq!(m.depot_build, DepotBuild::default());
        assert_eq!(m.target_names(), vec!["web"]);
    }

    #[test]
    fn malformed_target_names_the_key() {
        let err = BakeMetadata::from_slice(br#"{"web": {"manifests": 3}}"#).unwrap_err();
        match err {
            MetadataError::Target { target, .. } => assert_eq!(target, "web"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_object_target_is_an_error() {
        assert!(matches!(
            BakeMetadata::from_slice(br#"{"web": "registry.depot.dev/prj:bld"}"#),
            Err(MetadataError::Target { .. })
        ));
    }

    #[test]
    fn malformed_reserved_key_is_an_error() {
        assert!(matches!(
            BakeMetadata::from_slice(br#"{"depot.build": [1, 2]}"#),
            Err(MetadataError::Json(_))
        ));
    }

    #[test]
    fn top_level_must_be_an_object() {
        let err = BakeMetadata::from_slice(b"[]").unwrap_err();
        assert!(matches!(err, MetadataError::NotAnObject("an array")));
    }
}
