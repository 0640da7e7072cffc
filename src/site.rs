//! Location of the shared installation tree.
//!
//! Standard images and companion tools live under a root directory
//! published through an environment variable. When the variable is not
//! set, lookups return `None` and dependent features are simply
//! disabled; nothing in this crate fails because of an unset root.

use crate::paths;
use std::env;
use std::path::PathBuf;

/// The environment variable naming the shared installation root.
pub const ROOT_ENV_VAR: &str = "IMAGEWRAP_ROOT";

/// The shared installation root, if the environment provides one.
pub fn root() -> Option<PathBuf> {
    match env::var_os(ROOT_ENV_VAR) {
        Some(v) if !v.is_empty() => Some(PathBuf::from(v)),
        _ => {
            tracing::debug!("{} is not set, site lookups are disabled", ROOT_ENV_VAR);
            None
        }
    }
}

/// The directory holding the standard reference images, if a root is
/// configured.
pub fn standard_dir() -> Option<PathBuf> {
    root().map(|r| r.join("data").join("standard"))
}

/// Resolve a standard reference image by prefix, if a root is
/// configured and the image exists there.
pub fn standard_image(name: &str) -> Option<PathBuf> {
    standard_dir().and_then(|d| paths::add_ext(d.join(name)).ok())
}
