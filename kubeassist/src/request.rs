//! One authenticated GET against the API server of the current context.

use std::{fs, path::Path, time::Duration};

use reqwest::{
    blocking::Client,
    header::{HeaderValue, AUTHORIZATION},
    Certificate,
};
use tracing::{debug, info, instrument};
use url::Url;

use crate::{direct::KubeConfig, error::RequestError};

/// Default timeout for a whole request, from connect to the last body byte.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues GET requests using the connection info of a [`KubeConfig`].
///
/// Every call builds a fresh HTTP client trusting only the cluster's CA,
/// so nothing is pooled or cached between calls.
#[derive(Debug, Clone)]
pub struct ApiClient {
    timeout: Duration,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `path` on the current context's server and return the raw body.
    ///
    /// The status code is not looked at: an error page from the server is
    /// returned like any other body.
    #[instrument(skip_all, fields(path = %path))]
    pub fn fetch(&self, kc: &KubeConfig, path: &str) -> Result<Vec<u8>, RequestError> {
        let conn = kc.connection_info()?;
        let client = self.http_client(Path::new(&conn.ca))?;

        let raw_url = format!("{}{}", conn.server, path);
        let url = Url::parse(&raw_url).map_err(|source| RequestError::InvalidUrl {
            url: raw_url.clone(),
            source,
        })?;

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", conn.token))
            .map_err(RequestError::InvalidToken)?;
        bearer.set_sensitive(true);

        info!(%url, namespace = %conn.namespace, "GET");
        let network = |source: reqwest::Error| RequestError::Network {
            url: raw_url.clone(),
            source,
        };
        let response = client
            .get(url)
            .header(AUTHORIZATION, bearer)
            .send()
            .map_err(network)?;
        let status = response.status();
        let body = response.bytes().map_err(network)?;
        debug!(%status, len = body.len(), "response read");

        Ok(body.to_vec())
    }

    fn http_client(&self, ca_path: &Path) -> Result<Client, RequestError> {
        let pem = fs::read(ca_path).map_err(|source| RequestError::ReadCa {
            path: ca_path.to_owned(),
            source,
        })?;
        let certs = Certificate::from_pem_bundle(&pem).map_err(|source| RequestError::InvalidCa {
            path: ca_path.to_owned(),
            source,
        })?;
        if certs.is_empty() {
            return Err(RequestError::EmptyCa {
                path: ca_path.to_owned(),
            });
        }
        debug!(ca = %ca_path.display(), count = certs.len(), "loaded certificate authority");

        let mut builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .no_proxy()
            .timeout(self.timeout)
            .pool_max_idle_per_host(0);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
        builder.build().map_err(RequestError::Tls)
    }
}

/// [`ApiClient::fetch`] with the default timeout.
pub fn fetch_resource(kc: &KubeConfig, path: &str) -> Result<Vec<u8>, RequestError> {
    ApiClient::default().fetch(kc, path)
}
