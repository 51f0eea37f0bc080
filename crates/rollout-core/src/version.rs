//! Deploy version selection.
//!
//! A freshly built image whose layers match the image already released is not rolled
//! out again: the release keeps pointing at the existing version.

use tracing::{debug, info};

use crate::image::{ImageIdentityComparator, ImageInspector, ImagePuller};

pub struct VersionDecisionEngine<'a> {
    puller: &'a dyn ImagePuller,
    inspector: &'a dyn ImageInspector,
}

impl<'a> VersionDecisionEngine<'a> {
    pub fn new(puller: &'a dyn ImagePuller, inspector: &'a dyn ImageInspector) -> Self {
        Self { puller, inspector }
    }

    /// Pick the version to deploy.
    ///
    /// Returns `remote_version` only when the remote image could be pulled and its ordered
    /// layers equal the local image's. Every failure along the way selects `local_version`.
    pub fn decide(
        &self,
        local_tag: &str,
        remote_tag: &str,
        remote_version: Option<&str>,
        local_version: &str,
    ) -> String {
        let Some(remote_version) = remote_version else {
            info!(local_version, "no release found, deploying new version");
            return local_version.to_string();
        };

        if let Err(err) = self.puller.pull(remote_tag) {
            debug!(remote_tag, error = %err, "remote image not available");
            info!(local_version, "deploying new version");
            return local_version.to_string();
        }

        let identity = ImageIdentityComparator::new(self.inspector).compare(local_tag, remote_tag);
        if identity.is_identical() {
            info!(remote_version, "local image has the same layers, deploying existing version");
            return remote_version.to_string();
        }
        info!(local_version, ?identity, "local image differs, deploying new version");
        local_version.to_string()
    }

    /// [`decide`](Self::decide) with the layer check bypass.
    pub fn decide_with_bypass(
        &self,
        skip_layer_check: bool,
        local_tag: &str,
        remote_tag: &str,
        remote_version: Option<&str>,
        local_version: &str,
    ) -> String {
        if skip_layer_check {
            info!(local_version, "layer check skipped");
            return local_version.to_string();
        }
        self.decide(local_tag, remote_tag, remote_version, local_version)
    }
}
