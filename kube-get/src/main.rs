use std::io::{self, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use kubeassist::{default_config_path, ApiClient, KubeConfig};

/// GET a Kubernetes API path using the current kube context and print the raw body
#[derive(Parser)]
#[command(name = "kube-get")]
struct Cli {
    /// API path, e.g. /api/v1/namespaces/{namespace}/pods.
    /// `{namespace}` is replaced with the context's namespace.
    path: String,

    /// Kube config to read instead of $KUBECONFIG or ~/.kube/config
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Use this context for the request without saving it
    #[arg(long)]
    context: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

fn main() -> anyhow::Result<()> {
    kubeassist::logging::init();
    let cli = Cli::parse();

    let file_path = cli
        .kubeconfig
        .or_else(default_config_path)
        .context("Locating kube config")?;
    let mut kc = KubeConfig::read_from(&file_path)?;

    if let Some(context) = &cli.context {
        kc.set_context(context)?;
    }

    let path = match cli.path.contains("{namespace}") {
        true => {
            let conn = kc.connection_info()?;
            cli.path.replace("{namespace}", &conn.namespace)
        }
        false => cli.path,
    };
    tracing::debug!(%path, context = %kc.current_context, "fetching");

    let body = ApiClient::new()
        .with_timeout(Duration::from_secs(cli.timeout))
        .fetch(&kc, &path)
        .with_context(|| format!("GET {path}"))?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&body)?;
    stdout.flush()?;

    Ok(())
}
