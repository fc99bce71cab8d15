use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use kubeassist::{default_config_path, KubeConfig};

/// Print the current kube context and the namespace it uses
#[derive(Parser)]
#[command(name = "current-kube-context")]
struct Cli {
    /// Kube config to read instead of $KUBECONFIG or ~/.kube/config
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    kubeassist::logging::init();
    let cli = Cli::parse();

    let path = cli
        .kubeconfig
        .or_else(default_config_path)
        .context("Locating kube config")?;
    let kube_config = KubeConfig::read_from(&path)?;

    if kube_config.current_context.is_empty() {
        bail!("No current context set in {}", path.display());
    }
    let context = kube_config
        .current_context_spec()
        .context("No matching context found")?;
    println!(
        "{}\t{}",
        kube_config.current_context,
        context.namespace_or_default()
    );

    Ok(())
}
