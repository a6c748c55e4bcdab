//! Test image references

use crate::config::ServingFlags;

/// Prefix an image name with the configured repository and suffix it with the tag
///
/// No validation is done: whatever the flags hold ends up in the reference.
pub fn image_path(flags: &ServingFlags, name: &str) -> String {
    format!("{}/{}:{}", flags.docker_repo, name, flags.tag)
}

impl ServingFlags {
    /// Fully qualified reference for the named test image
    pub fn image_path(&self, name: &str) -> String {
        image_path(self, name)
    }
}
