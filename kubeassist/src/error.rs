//! Error types for loading, resolving and requesting.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures of the kubeconfig document itself: codec, file access and mutation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("decoding kube config: {0}")]
    Decode(#[source] serde_yaml::Error),

    #[error("encoding kube config: {0}")]
    Encode(#[source] serde_yaml::Error),

    #[error("reading kube config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("writing kube config {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("context {0:?} does not exist")]
    ContextNotFound(String),

    #[error("no current context set")]
    NoContextSelected,
}

/// Why a kubeconfig could not be turned into a [`crate::ConnectionInfo`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no current context set")]
    NoContextSelected,

    #[error("context {context:?} is incomplete: it must name both a cluster and a user")]
    IncompleteContext { context: String },

    #[error("no token found for user {user:?}")]
    NoToken { user: String },

    #[error("no server found for cluster {cluster:?}")]
    NoServer { cluster: String },
}

/// Failures of a single API request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("reading certificate authority {}: {source}", path.display())]
    ReadCa { path: PathBuf, source: io::Error },

    #[error("invalid certificate authority {}: {source}", path.display())]
    InvalidCa {
        path: PathBuf,
        source: reqwest::Error,
    },

    #[error("no PEM certificates found in {}", path.display())]
    EmptyCa { path: PathBuf },

    #[error("building TLS client: {0}")]
    Tls(#[source] reqwest::Error),

    #[error("invalid API url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("token cannot be sent as a header: {0}")]
    InvalidToken(#[source] reqwest::header::InvalidHeaderValue),

    #[error("request to {url} failed: {source}")]
    Network { url: String, source: reqwest::Error },
}

impl RequestError {
    /// True when the request ran out of time rather than failing outright.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Network { source, .. } if source.is_timeout())
    }
}
