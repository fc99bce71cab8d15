pub mod connection;
pub mod direct;
pub mod error;
pub mod logging;
pub mod request;

use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
};

pub use connection::{ConnectionInfo, DEFAULT_NAMESPACE};
pub use direct::*;
pub use error::{ConfigError, RequestError, ResolveError};
pub use request::{fetch_resource, ApiClient, DEFAULT_TIMEOUT};

/// `~/.kube`, or `None` when no home directory can be determined.
pub fn kube_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kube"))
}

/// The kubeconfig a tool should read when none is given explicitly.
///
/// Only the first entry of `$KUBECONFIG` is used, since configs are never merged.
pub fn default_config_path() -> Option<PathBuf> {
    config_path_from(env::var_os("KUBECONFIG").as_deref(), kube_dir().as_deref())
}

fn config_path_from(kubeconfig: Option<&OsStr>, kube_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(paths) = kubeconfig {
        if let Some(first) = env::split_paths(paths).find(|p| !p.as_os_str().is_empty()) {
            return Some(first);
        }
    }
    kube_dir.map(|dir| dir.join("config"))
}
