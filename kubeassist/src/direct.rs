use std::io::{self, Write as _};
use std::{collections::BTreeMap, fs, path::Path};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use serde::*;
use serde_yaml::Value as YamlValue;
use tracing::debug;

use crate::{connection::DEFAULT_NAMESPACE, error::ConfigError};

/// Keys this crate does not interpret. They are kept so that a dump writes them back.
pub type Extra = BTreeMap<String, YamlValue>;

/// kubectl writes `users: null` for empty sections.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Entries referenced by name from elsewhere in the document.
pub(crate) trait Named {
    fn name(&self) -> &str;
}

/// First entry called `name`. Duplicate names are not rejected, so the earliest one wins.
pub(crate) fn find<'a, T: Named>(entries: &'a [T], name: &str) -> Option<&'a T> {
    entries.iter().find(|entry| entry.name() == name)
}

fn find_mut<'a, T: Named>(entries: &'a mut [T], name: &str) -> Option<&'a mut T> {
    entries.iter_mut().find(|entry| entry.name() == name)
}

// region: Context
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ContextSpec {
    pub cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub user: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Context {
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub context: ContextSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ContextSpec {
    /// The namespace to work in; unset and empty both mean [`DEFAULT_NAMESPACE`].
    pub fn namespace_or_default(&self) -> &str {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => DEFAULT_NAMESPACE,
        }
    }
}

impl Named for Context {
    fn name(&self) -> &str {
        &self.name
    }
}
// endregion

// region: Cluster
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClusterSpec {
    /// Path to a PEM file holding the cluster's CA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<String>,
    pub server: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Cluster {
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cluster: ClusterSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Named for Cluster {
    fn name(&self) -> &str {
        &self.name
    }
}
// endregion

// region: User
/// Credentials of a user. Only the bearer token is used to authenticate;
/// the client certificate and key are carried along but never read.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct UserSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct User {
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user: UserSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Named for User {
    fn name(&self) -> &str {
        &self.name
    }
}
// endregion

// region: Common
/// A parsed kubeconfig file.
///
/// Cross references between sections are plain names and are only checked
/// when a connection is resolved, see [`KubeConfig::connection_info`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion", skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub clusters: Vec<Cluster>,
    #[serde(deserialize_with = "null_as_default")]
    pub contexts: Vec<Context>,
    #[serde(deserialize_with = "null_as_default")]
    pub current_context: String,
    #[serde(deserialize_with = "null_as_default")]
    pub preferences: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub users: Vec<User>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl KubeConfig {
    pub fn from_slice(bytes: &[u8]) -> Result<KubeConfig, ConfigError> {
        serde_yaml::from_slice(bytes).map_err(ConfigError::Decode)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ConfigError> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .map_err(ConfigError::Encode)
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<KubeConfig, ConfigError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        debug!(path = %path.display(), "read kube config");
        Self::from_slice(&data)
    }

    /// Write the config to `path`, replacing its content.
    ///
    /// The file holds bearer tokens, so on unix it ends up readable by its owner only.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let data = self.to_vec()?;
        write_private(path, &data).map_err(|source| ConfigError::Write {
            path: path.to_owned(),
            source,
        })?;
        debug!(path = %path.display(), "wrote kube config");
        Ok(())
    }

    pub fn context_names(&self) -> impl Iterator<Item = &str> {
        self.contexts.iter().map(|ctx| ctx.name.as_str())
    }

    /// The context `current-context` points at, if it points anywhere.
    pub fn current_context_spec(&self) -> Option<&ContextSpec> {
        if self.current_context.is_empty() {
            return None;
        }
        find(&self.contexts, &self.current_context).map(|ctx| &ctx.context)
    }

    /// Make `name` the current context. Nothing changes unless such a context exists.
    pub fn set_context(&mut self, name: &str) -> Result<(), ConfigError> {
        if find(&self.contexts, name).is_none() {
            return Err(ConfigError::ContextNotFound(name.to_owned()));
        }
        debug!(from = %self.current_context, to = %name, "switching context");
        self.current_context = name.to_owned();
        Ok(())
    }

    /// Set the namespace of the current context.
    pub fn set_namespace(&mut self, namespace: &str) -> Result<(), ConfigError> {
        let current = &self.current_context;
        if current.is_empty() {
            return Err(ConfigError::NoContextSelected);
        }
        let Some(context) = find_mut(&mut self.contexts, current) else {
            return Err(ConfigError::ContextNotFound(current.clone()));
        };
        debug!(context = %current, namespace, "setting namespace");
        context.context.namespace = Some(namespace.to_owned());
        Ok(())
    }
}

fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path)?;
    // `mode` only applies to newly created files.
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(data)?;
    file.flush()
}
// endregion

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    const FULL: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    certificate-authority: /etc/kube/ca.crt
    certificate-authority-data: TFMwdExTMUNSVWRKVGc9PQ==
    server: https://prod.example.com:6443
    extensions:
    - name: client.authentication.k8s.io/exec
      extension: {}
contexts:
- name: prod
  context:
    cluster: prod
    user: admin
    namespace: web
- name: staging
  context:
    cluster: prod
    user: admin
current-context: prod
preferences:
  colors: "true"
users:
- name: admin
  user:
    token: s3cr3t
    client-certificate: /etc/kube/admin.crt
    client-key: /etc/kube/admin.key
    client-key-data: a2V5
x-generated-by: hand
"#;

    fn full() -> KubeConfig {
        KubeConfig::from_slice(FULL.as_bytes()).unwrap()
    }

    #[test]
    fn test_load_reads_every_section() {
        let kc = full();

        assert_eq!(kc.api_version, "v1");
        assert_eq!(kc.kind, "Config");
        assert_eq!(kc.current_context, "prod");
        assert_eq!(kc.preferences.get("colors").map(String::as_str), Some("true"));
        assert_eq!(kc.context_names().collect::<Vec<_>>(), ["prod", "staging"]);

        let cluster = &kc.clusters[0].cluster;
        assert_eq!(cluster.server, "https://prod.example.com:6443");
        assert_eq!(cluster.certificate_authority.as_deref(), Some("/etc/kube/ca.crt"));

        let user = &kc.users[0].user;
        assert_eq!(user.token.as_deref(), Some("s3cr3t"));
        assert_eq!(user.client_certificate.as_deref(), Some("/etc/kube/admin.crt"));
        assert_eq!(user.client_key.as_deref(), Some("/etc/kube/admin.key"));
    }

    #[test]
    fn test_unknown_keys_survive_dump() {
        let kc = full();
        assert!(kc.extra.contains_key("x-generated-by"));
        assert!(kc.clusters[0].cluster.extra.contains_key("certificate-authority-data"));
        assert!(kc.users[0].user.extra.contains_key("client-key-data"));

        let dumped = String::from_utf8(kc.to_vec().unwrap()).unwrap();
        assert!(dumped.contains("certificate-authority-data"));
        assert!(dumped.contains("client-key-data"));
        assert!(dumped.contains("x-generated-by"));
        assert_eq!(KubeConfig::from_slice(dumped.as_bytes()).unwrap(), kc);
    }

    #[test]
    fn test_null_sections_are_empty() {
        let kc = KubeConfig::from_slice(
            b"apiVersion: v1\nkind: Config\nclusters: null\ncontexts: null\ncurrent-context: \"\"\npreferences: {}\nusers: null\n",
        )
        .unwrap();

        assert!(kc.clusters.is_empty());
        assert!(kc.contexts.is_empty());
        assert!(kc.users.is_empty());
        assert_eq!(kc.current_context, "");
    }

    #[test]
    fn test_missing_sections_default() {
        let kc = KubeConfig::from_slice(b"current-context: a\n").unwrap();
        assert_eq!(kc.current_context, "a");
        assert!(kc.contexts.is_empty());
        assert!(kc.current_context_spec().is_none());
    }

    #[test]
    fn test_load_rejects_malformed_documents() {
        assert_matches!(
            KubeConfig::from_slice(b"clusters: [unclosed"),
            Err(ConfigError::Decode(_))
        );
        assert_matches!(
            KubeConfig::from_slice(b"clusters: not-a-list\n"),
            Err(ConfigError::Decode(_))
        );
        assert_matches!(
            KubeConfig::from_slice(b"- just\n- a list\n"),
            Err(ConfigError::Decode(_))
        );
    }

    #[test]
    fn test_set_context() {
        let mut kc = full();
        kc.set_context("staging").unwrap();
        assert_eq!(kc.current_context, "staging");
    }

    #[test]
    fn test_set_missing_context_changes_nothing() {
        let mut kc = full();
        let before = kc.clone();

        let err = kc.set_context("missing_context").unwrap_err();

        assert_matches!(err, ConfigError::ContextNotFound(name) if name == "missing_context");
        assert_eq!(kc, before);
    }

    #[test]
    fn test_set_namespace_targets_current_context() {
        let mut kc = full();
        kc.set_context("staging").unwrap();
        kc.set_namespace("kube-system").unwrap();

        assert_eq!(kc.contexts[0].context.namespace.as_deref(), Some("web"));
        assert_eq!(kc.contexts[1].context.namespace.as_deref(), Some("kube-system"));
        assert_eq!(
            kc.current_context_spec().unwrap().namespace.as_deref(),
            Some("kube-system")
        );
    }

    #[test]
    fn test_set_namespace_without_context() {
        let mut kc = full();
        kc.current_context.clear();
        let err = kc.set_namespace("kube-system").unwrap_err();
        assert_matches!(err, ConfigError::NoContextSelected);
        assert_eq!(err.to_string(), "no current context set");

        kc.current_context = "gone".to_owned();
        let before = kc.clone();
        assert_matches!(
            kc.set_namespace("kube-system"),
            Err(ConfigError::ContextNotFound(name)) if name == "gone"
        );
        assert_eq!(kc, before);
    }

    #[test]
    fn test_namespace_or_default() {
        let mut spec = ContextSpec::default();
        assert_eq!(spec.namespace_or_default(), DEFAULT_NAMESPACE);

        spec.namespace = Some(String::new());
        assert_eq!(spec.namespace_or_default(), DEFAULT_NAMESPACE);

        spec.namespace = Some("web".to_owned());
        assert_eq!(spec.namespace_or_default(), "web");
    }

    #[test]
    fn test_set_namespace_on_duplicate_names_updates_first() {
        let mut kc = KubeConfig::from_slice(
            b"contexts:\n- name: a\n  context: {cluster: c1, user: u}\n- name: a\n  context: {cluster: c2, user: u}\ncurrent-context: a\n",
        )
        .unwrap();

        kc.set_namespace("ns").unwrap();

        assert_eq!(kc.contexts[0].context.namespace.as_deref(), Some("ns"));
        assert_eq!(kc.contexts[1].context.namespace, None);
    }

    #[test]
    fn test_dump_after_mutation_round_trips() {
        let mut kc = full();
        kc.set_context("staging").unwrap();
        kc.set_namespace("batch").unwrap();

        let reloaded = KubeConfig::from_slice(&kc.to_vec().unwrap()).unwrap();

        assert_eq!(reloaded, kc);
    }

    #[test]
    fn test_write_to_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            "stale content that is longer than what replaces it ".repeat(100),
        )
        .unwrap();

        let kc = full();
        kc.write_to(&path).unwrap();

        assert_eq!(KubeConfig::read_from(&path).unwrap(), kc);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_to_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh");
        let existing = dir.path().join("existing");
        fs::write(&existing, "").unwrap();
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o644)).unwrap();

        let kc = full();
        kc.write_to(&fresh).unwrap();
        kc.write_to(&existing).unwrap();

        for path in [fresh, existing] {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        }
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            KubeConfig::read_from(dir.path().join("nope")),
            Err(ConfigError::Read { .. })
        );
    }
}
