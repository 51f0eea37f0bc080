//! Container image collaborators.
//!
//! Images are never touched directly: layer lists and pulls go through the docker CLI.

mod identity;

pub use identity::{ImageIdentity, ImageIdentityComparator};

use serde::Deserialize;
use tracing::debug;

use crate::error::ProcessExecutionError;
use crate::process::{CommandSpec, ProcessRunner};

/// Reads the ordered layer digests of a local image.
pub trait ImageInspector {
    /// `None` when the image is unknown or its metadata cannot be read.
    fn layers(&self, tag: &str) -> Option<Vec<String>>;
}

/// Fetches an image from its registry.
pub trait ImagePuller {
    fn pull(&self, tag: &str) -> Result<(), ProcessExecutionError>;
}

/// Docker CLI backed inspector and puller.
pub struct DockerCli<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> DockerCli<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }
}

impl ImageInspector for DockerCli<'_> {
    fn layers(&self, tag: &str) -> Option<Vec<String>> {
        let command = CommandSpec::new("docker").args(["image", "inspect", tag]);
        match self.runner.run(&command) {
            Ok(output) => parse_layers(&output.stdout),
            Err(err) => {
                debug!(tag, error = %err, "image inspect failed");
                None
            }
        }
    }
}

impl ImagePuller for DockerCli<'_> {
    fn pull(&self, tag: &str) -> Result<(), ProcessExecutionError> {
        let command = CommandSpec::new("docker").args(["image", "pull", tag]);
        self.runner.run(&command).map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "RootFS")]
    root_fs: Option<RootFs>,
}

#[derive(Debug, Deserialize)]
struct RootFs {
    #[serde(rename = "Layers")]
    layers: Option<Vec<String>>,
}

/// Extract `[0].RootFS.Layers` from `docker image inspect` output.
pub fn parse_layers(content: &str) -> Option<Vec<String>> {
    let entries: Vec<InspectEntry> = serde_json::from_str(content).ok()?;
    entries.into_iter().next()?.root_fs?.layers
}
