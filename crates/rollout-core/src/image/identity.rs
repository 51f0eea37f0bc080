use super::ImageInspector;

/// Result of comparing two images by layer content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageIdentity {
    /// Same layer digests in the same order
    Identical,
    Different,
    /// At least one side could not be inspected
    Unknown,
}

impl ImageIdentity {
    pub fn is_identical(self) -> bool {
        self == ImageIdentity::Identical
    }
}

/// Compares images by their ordered layer digests.
pub struct ImageIdentityComparator<'a> {
    inspector: &'a dyn ImageInspector,
}

impl<'a> ImageIdentityComparator<'a> {
    pub fn new(inspector: &'a dyn ImageInspector) -> Self {
        Self { inspector }
    }

    pub fn compare(&self, local: &str, remote: &str) -> ImageIdentity {
        let remote_layers = self.inspector.layers(remote);
        let local_layers = self.inspector.layers(local);
        compare_layers(local_layers.as_deref(), remote_layers.as_deref())
    }
}

/// Order matters: the same layers in a different order are a different image.
pub fn compare_layers(local: Option<&[String]>, remote: Option<&[String]>) -> ImageIdentity {
    match (local, remote) {
        (Some(local), Some(remote)) if local == remote => ImageIdentity::Identical,
        (Some(_), Some(_)) => ImageIdentity::Different,
        _ => ImageIdentity::Unknown,
    }
}
