use anyhow::{bail, Context as _};
use clap::Parser;
use console::style;
use dialoguer::Select;
use similar::TextDiff;

use std::fs;
use std::path::{Path, PathBuf};

use tabular::{row, Table};

use chrono::Local;
use kubeassist::{default_config_path, KubeConfig, DEFAULT_NAMESPACE};

/// Switch the current kube context and its namespace
#[derive(Parser)]
#[command(name = "kswitch")]
struct Cli {
    /// Context to switch to. Without it (and without --namespace) a picker is shown
    context: Option<String>,

    /// Namespace to set on the selected context
    #[arg(short, long)]
    namespace: Option<String>,

    /// Kube config to edit instead of $KUBECONFIG or ~/.kube/config
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// List contexts and exit
    #[arg(short, long)]
    list: bool,

    /// Print the change as a diff instead of writing it
    #[arg(long)]
    dry_run: bool,

    /// Overwrite the config without keeping a timestamped copy
    #[arg(long)]
    no_backup: bool,
}

fn print_contexts(kc: &KubeConfig) {
    let mut table = Table::new("{:<} {:<} {:<} {:<} {:<}");
    for ctx in &kc.contexts {
        let sym = if ctx.name == kc.current_context { '*' } else { ' ' };
        let cluster = &ctx.context.cluster;
        let user = &ctx.context.user;
        let namespace = ctx.context.namespace_or_default();
        table.add_row(row!(
            sym,
            &ctx.name,
            format!("🖥  {cluster}"),
            format!("🧑 {user}"),
            namespace
        ));
    }
    for line in table.to_string().lines() {
        if line.starts_with('*') {
            println!("{}", style(line).green())
        } else {
            println!("{line}")
        };
    }
}

fn pick_context(kc: &KubeConfig) -> anyhow::Result<Option<String>> {
    let names = kc.context_names().collect::<Vec<_>>();
    if names.is_empty() {
        bail!("No contexts to choose from");
    }
    let current = names
        .iter()
        .position(|name| *name == kc.current_context)
        .unwrap_or(0);

    let choice = Select::new()
        .with_prompt("Context")
        .items(&names)
        .default(current)
        .interact_opt()?;
    Ok(choice.map(|idx| names[idx].to_owned()))
}

fn backup(path: &Path) -> anyhow::Result<PathBuf> {
    let now = Local::now().format("%Y%m%d%H%M%S");
    let file_name = path
        .file_name()
        .context("Kube config path has no file name")?
        .to_string_lossy();
    let current_backup = path.with_file_name(format!("{file_name}_{now}"));

    // Copied, not moved: if the rewrite fails the original stays in place.
    fs::copy(path, &current_backup)
        .with_context(|| format!("Backing up kube config to {}", current_backup.display()))?;
    Ok(current_backup)
}

fn main() -> anyhow::Result<()> {
    kubeassist::logging::init();
    let cli = Cli::parse();

    let path = cli
        .kubeconfig
        .or_else(default_config_path)
        .context("Locating kube config")?;
    let original = KubeConfig::read_from(&path)?;

    if cli.list {
        print_contexts(&original);
        return Ok(());
    }

    let mut kc = original.clone();

    let context = match (cli.context, &cli.namespace) {
        (Some(context), _) => Some(context),
        (None, Some(_)) => None,
        (None, None) => match pick_context(&kc)? {
            Some(context) => Some(context),
            None => return Ok(()),
        },
    };

    if let Some(context) = &context {
        kc.set_context(context)?;
    }
    if let Some(namespace) = &cli.namespace {
        kc.set_namespace(namespace)?;
    }

    let namespace = kc
        .current_context_spec()
        .map_or(DEFAULT_NAMESPACE, |ctx| ctx.namespace_or_default());
    let summary = format!(
        "context {} (namespace {})",
        style(&kc.current_context).green(),
        style(namespace).cyan()
    );

    if kc == original {
        println!("Already on {summary}");
        return Ok(());
    }

    if cli.dry_run {
        let before = String::from_utf8(original.to_vec()?)?;
        let after = String::from_utf8(kc.to_vec()?)?;
        let diff = TextDiff::from_lines(&before, &after);
        let display_path = path.display().to_string();
        print!("{}", diff.unified_diff().header(&display_path, &display_path));
        return Ok(());
    }

    if !cli.no_backup {
        let saved = backup(&path)?;
        tracing::info!(backup = %saved.display(), "kept previous kube config");
    }
    kc.write_to(&path)?;

    println!("Switched to {summary}");

    Ok(())
}
