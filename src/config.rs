//! Environment configuration shared by the e2e helpers
//!
//! Values are read once when the test binary starts and then passed
//! explicitly to the helpers that need them.

/// Environment variable naming the repository test images are pushed to
pub const DOCKER_REPO_ENV: &str = "KO_DOCKER_REPO";

/// Environment variable naming the tag of the test images
pub const TAG_ENV: &str = "TAG";

/// Tag used when `TAG` is not set
pub const DEFAULT_TAG: &str = "latest";

/// Flags describing where the test images live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingFlags {
    /// Repository root, e.g. `gcr.io/my-project`
    pub docker_repo: String,
    /// Image tag, e.g. `latest`
    pub tag: String,
}

impl ServingFlags {
    pub fn new(docker_repo: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            docker_repo: docker_repo.into(),
            tag: tag.into(),
        }
    }

    /// Load flags from the process environment
    ///
    /// - KO_DOCKER_REPO: image repository (default: empty)
    /// - TAG: image tag (default: "latest")
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load flags through an arbitrary key lookup
    ///
    /// Empty values are treated the same as missing ones.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            docker_repo: non_empty(DOCKER_REPO_ENV).unwrap_or_default(),
            tag: non_empty(TAG_ENV).unwrap_or_else(|| DEFAULT_TAG.to_string()),
        }
    }
}

impl Default for ServingFlags {
    fn default() -> Self {
        Self::new("", DEFAULT_TAG)
    }
}
