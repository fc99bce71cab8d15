//! Resolving the current context into what a request needs.

use std::fmt;

use tracing::debug;

use crate::direct::{find, KubeConfig};
use crate::error::ResolveError;

/// Namespace used when the current context does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Everything needed to talk to the API server of the current context.
///
/// Derived from a [`KubeConfig`] on every call and never stored in it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub token: String,
    pub server: String,
    /// Path to the PEM encoded certificate authority of the server.
    pub ca: String,
    pub namespace: String,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("token", &"<redacted>")
            .field("server", &self.server)
            .field("ca", &self.ca)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl KubeConfig {
    /// Follow `current-context` to its cluster and user.
    ///
    /// References are only checked here, so a config that loads fine may still
    /// fail to resolve. When several entries share a name the first one is used.
    pub fn connection_info(&self) -> Result<ConnectionInfo, ResolveError> {
        if self.current_context.is_empty() {
            return Err(ResolveError::NoContextSelected);
        }

        // A current-context without a matching entry resolves like an empty
        // entry and is reported as incomplete.
        let (cluster, user, namespace) = match find(&self.contexts, &self.current_context) {
            Some(ctx) => (
                ctx.context.cluster.as_str(),
                ctx.context.user.as_str(),
                ctx.context.namespace_or_default(),
            ),
            None => ("", "", DEFAULT_NAMESPACE),
        };

        if cluster.is_empty() || user.is_empty() {
            return Err(ResolveError::IncompleteContext {
                context: self.current_context.clone(),
            });
        }

        // TODO: fall back to client-certificate/client-key once mTLS is supported
        let token = find(&self.users, user)
            .and_then(|u| u.user.token.as_deref())
            .unwrap_or_default();
        if token.is_empty() {
            return Err(ResolveError::NoToken {
                user: user.to_owned(),
            });
        }

        let (server, ca) = find(&self.clusters, cluster)
            .map(|c| {
                (
                    c.cluster.server.as_str(),
                    c.cluster.certificate_authority.as_deref().unwrap_or_default(),
                )
            })
            .unwrap_or_default();
        if server.is_empty() {
            return Err(ResolveError::NoServer {
                cluster: cluster.to_owned(),
            });
        }

        debug!(
            context = %self.current_context,
            cluster,
            user,
            namespace,
            server,
            "resolved connection info"
        );

        Ok(ConnectionInfo {
            token: token.to_owned(),
            server: server.to_owned(),
            ca: ca.to_owned(),
            namespace: namespace.to_owned(),
        })
    }
}
