//! Environment variable names and lookup helpers.
//!
//! Centralizes every environment variable the crate recognizes so that
//! settings, the image provisioner and the container profiles agree on names.

/// Docker network new containers attach to
pub const TESTCONTAINER_DOCKER_NETWORK: &str = "TESTCONTAINER_DOCKER_NETWORK";

/// Default network when none is configured
pub const DEFAULT_DOCKER_NETWORK: &str = "bridge";

/// Remote Docker daemon address
pub const DOCKER_HOST: &str = "DOCKER_HOST";

/// Selects the BuildKit CLI build backend when set
pub const DOCKER_BUILDKIT: &str = "DOCKER_BUILDKIT";

/// Optional path to a settings file
pub const TESTCONTAINER_CONFIG: &str = "TESTCONTAINER_CONFIG";

/// Settings file looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "testcontainers.toml";

/// Markers set when several test worker processes share one daemon.
pub const PARALLEL_WORKER_MARKERS: &[&str] = &["TESTCONTAINER_WORKER_ID", "NEXTEST_RUN_ID"];

/// Application image build parameters
pub mod image {
    /// Use this image instead of building one
    pub const TESTCONTAINER_IMAGE_ID: &str = "TESTCONTAINER_IMAGE_ID";

    /// Dockerfile to build from
    pub const TESTCONTAINER_DOCKERFILE_PATH: &str = "TESTCONTAINER_DOCKERFILE_PATH";

    /// Build context directory
    pub const TESTCONTAINER_DOCKER_BUILD_CONTEXT: &str = "TESTCONTAINER_DOCKER_BUILD_CONTEXT";

    /// Multi-stage build target
    pub const TESTCONTAINER_DOCKER_BUILD_TARGET: &str = "TESTCONTAINER_DOCKER_BUILD_TARGET";
}

/// AWS emulator credentials
pub mod aws {
    pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
    pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

    /// Fallback for both key ID and secret
    pub const DEFAULT_CREDENTIAL: &str = "testing";
}

/// Read a variable, treating empty values as unset.
pub fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Read a variable or fall back to a default.
pub fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

/// Interpret a variable as a boolean toggle.
///
/// Any non-empty value except `0`, `false`, `no` and `off` enables it.
pub fn flag(name: &str) -> bool {
    var(name).is_some_and(|value| is_truthy(&value))
}

pub(crate) fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// Whether this process is one of several parallel test workers.
pub fn is_parallel_worker() -> bool {
    PARALLEL_WORKER_MARKERS.iter().any(|name| var(name).is_some())
}

/// `<PREFIX>_TESTCONTAINER_IMAGE_ID`, the per-profile image override.
pub fn profile_image_var(prefix: &str) -> String {
    format!("{}_TESTCONTAINER_IMAGE_ID", prefix)
}

/// `<PREFIX>_TESTCONTAINER_DISABLE_LOGGING`, the per-profile log toggle.
pub fn profile_disable_logging_var(prefix: &str) -> String {
    format!("{}_TESTCONTAINER_DISABLE_LOGGING", prefix)
}

/// Resolve a profile image, honoring its override variable.
pub fn profile_image(prefix: &str, default: &str) -> String {
    var_or(&profile_image_var(prefix), default)
}

/// Whether log forwarding is disabled for a profile.
pub fn profile_logging_disabled(prefix: &str) -> bool {
    flag(&profile_disable_logging_var(prefix))
}
