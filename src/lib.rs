//! depot-box: run depot.dev container builds from Rust
//!
//! Wraps the `depot` CLI: resolves which CLI version to run, wires up a
//! container invocation of it, executes that invocation, and decodes the
//! metadata file depot writes into typed artifacts.
//!
//! # Example: Build and inspect an image
//!
//! ```no_run
//! use depot_box::invocation::{BuildOptions, BuildRequest};
//! use depot_box::Depot;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = BuildRequest::new(
//!         std::env::var("DEPOT_TOKEN")?.into(),
//!         std::env::var("DEPOT_PROJECT_ID")?,
//!         ".",
//!         BuildOptions {
//!             sbom: true,
//!             ..Default::default()
//!         },
//!     );
//!
//!     let artifact = Depot::docker().build(&request, None).await?;
//!     println!("image: {}", artifact.image_name());
//!     println!("bytes: {}", artifact.image_bytes());
//!     println!("sbom:  {}", String::from_utf8_lossy(&artifact.sbom().await?));
//!     Ok(())
//! }
//! ```
//!
//! # Example: Bake many images
//!
//! ```no_run
//! use depot_box::invocation::{BakeOptions, BakeRequest};
//! use depot_box::Depot;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = BakeRequest::new(
//!         std::env::var("DEPOT_TOKEN")?.into(),
//!         std::env::var("DEPOT_PROJECT_ID")?,
//!         ".",
//!         BakeOptions::default(),
//!     );
//!
//!     let artifacts = Depot::docker().bake(&request, Some("2.76.0")).await?;
//!     for name in artifacts.targets() {
//!         let target = artifacts.target(name)?;
//!         println!("{name}: {} ({} bytes)", target.image_name(), target.image_bytes());
//!     }
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod depot;
pub mod error;
pub mod executor;
pub mod invocation;
pub mod version;

// Re-exports for convenience
pub use depot::Depot;
pub use depot_metadata as metadata;
pub use error::{Error, Result};

// Prelude for common imports
pub mod prelude {
    pub use crate::artifact::{BakeArtifacts, BuildArtifact, RegistryAuth};
    pub use crate::error::{Error, Result};
    pub use crate::executor::{DockerExecutor, Executor, MockExecutor};
    pub use crate::invocation::{BakeOptions, BakeRequest, BuildOptions, BuildRequest, DockerHost};
    pub use crate::version::VersionResolver;
    pub use crate::Depot;
    pub use crate::ExecOutput;
}

/// Captured output of a finished docker or depot process.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    /// Passed through unmodified in [`Error::Execution`].
    pub stderr: Vec<u8>,
    /// `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }

    /// stderr as UTF-8, with invalid sequences replaced.
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_is_decoded_lossily() {
        let output = ExecOutput::new(Vec::new(), b"denied \xff\n".to_vec(), 1);
        assert_eq!(output.stderr_str(), "denied \u{fffd}\n");
    }
}
