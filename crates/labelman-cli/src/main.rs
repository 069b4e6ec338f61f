//! labelman CLI: browse datasets, tag images and train classifiers from the terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use labelman::config::{ENV_API_URL, ENV_TOKEN};
use labelman::server::{serve, ServerConfig};
use labelman::{
    ClientConfig, ClusterId, Gateway, HttpGateway, LabelingWorkflow, LoadRequest,
    ModelArchitecture, Notification, Notifier, NotifyLevel, SessionStore, TrainingConfig,
    TrainingInput, TrainingOrchestrator, TrainingResults, TrainingState,
};

#[derive(Parser)]
#[command(
    name = "labelman",
    about = "🏷️  labelman: dataset labeling and classifier training",
    version,
    author
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// YAML client configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Root of the labeling API
    #[arg(long, global = true, env = ENV_API_URL)]
    api_url: Option<String>,
    /// Bearer token for the API (and for `serve`, the token it requires)
    #[arg(long, global = true, env = ENV_TOKEN, hide_env_values = true)]
    token: Option<String>,
    /// Also write JSON logs to a daily-rotated file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the development API server over a YAML fixture
    Serve {
        /// Fixture with datasets and cluster results
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind to
        #[arg(long, short, default_value_t = 8000)]
        port: u16,
    },
    /// List the items of a dataset
    Items {
        dataset: String,
        /// Join with this cluster result
        #[arg(long)]
        clusters: Option<String>,
        /// Only show one cluster (requires --clusters)
        #[arg(long)]
        group: Option<ClusterId>,
    },
    /// Inspect and edit the custom tags of one image
    Tags {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Rank the AI suggestions shared by a set of images
    Suggest {
        dataset: String,
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Apply one label to several images
    BulkTag {
        dataset: String,
        label: String,
        /// Images to tag
        items: Vec<String>,
        /// Tag every image in the dataset
        #[arg(long, conflicts_with = "items")]
        all: bool,
    },
    /// Label whole clusters at once
    GroupTag {
        dataset: String,
        cluster_result: String,
        /// CLUSTER=LABEL, repeatable
        #[arg(long = "label", short, value_parser = parse_group_label, required = true)]
        labels: Vec<(ClusterId, String)>,
    },
    /// Train a classifier on the dataset's labels
    Train {
        dataset: String,
        /// Train from cluster labels of this cluster result
        #[arg(long, requires = "labels")]
        clusters: Option<String>,
        /// CLUSTER=LABEL, repeatable (with --clusters)
        #[arg(long = "label", short, value_parser = parse_group_label)]
        labels: Vec<(ClusterId, String)>,
        /// Model architecture
        #[arg(long, default_value = "resnet18")]
        arch: ModelArchitecture,
        /// Training epochs
        #[arg(long, default_value_t = 10)]
        epochs: u32,
        /// Save the trained model
        #[arg(long)]
        save: bool,
        /// Display name for the saved model (default: derived from labels)
        #[arg(long, requires = "save")]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// Show an image's custom tags as stored remotely
    List { item: String },
    /// Add a custom tag
    Add {
        dataset: String,
        item: String,
        label: String,
    },
    /// Remove a custom tag
    Rm {
        dataset: String,
        item: String,
        label: String,
    },
}

fn parse_group_label(s: &str) -> std::result::Result<(ClusterId, String), String> {
    let (cluster, label) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CLUSTER=LABEL, got '{s}'"))?;
    let cluster = cluster
        .trim()
        .parse()
        .map_err(|_| format!("invalid cluster id '{cluster}'"))?;
    Ok((cluster, label.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    let _guard = init_tracing(cli.global.log_dir.as_deref(), default_level);

    let config = load_config(&cli.global)?;

    match cli.command {
        Commands::Serve {
            fixture,
            host,
            port,
        } => cmd_serve(fixture, host, port, config.token).await,
        command => {
            let (notifier, mut rx) = Notifier::channel();
            let result = run(command, &config, notifier).await;
            print_notifications(&mut rx);
            result
        }
    }
}

fn init_tracing(log_dir: Option<&Path>, default_level: &str) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "labelman.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
                .init();
            None
        }
    }
}

/// Flag, then environment, then file, then defaults.
fn load_config(args: &GlobalArgs) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => ClientConfig::default(),
    }
    .with_env();
    // clap already folded the environment into these.
    if let Some(url) = &args.api_url {
        config.base_url = url.clone();
    }
    if let Some(token) = &args.token {
        config.token = Some(token.clone());
    }
    debug!(base_url = %config.base_url, auth = config.token.is_some(), "Client configuration resolved");
    Ok(config)
}

async fn run(command: Commands, config: &ClientConfig, notifier: Notifier) -> Result<()> {
    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::from_config(config)?);
    match command {
        Commands::Serve { .. } => anyhow::bail!("`serve` does not talk to a remote API"),
        Commands::Items {
            dataset,
            clusters,
            group,
        } => {
            let mut wf = LabelingWorkflow::from_config(gateway, notifier, config);
            cmd_items(&mut wf, dataset, clusters, group).await
        }
        Commands::Tags { action } => cmd_tags(gateway, notifier, config, action).await,
        Commands::Suggest { dataset, items } => {
            let mut wf = LabelingWorkflow::from_config(gateway, notifier, config);
            cmd_suggest(&mut wf, dataset, items).await
        }
        Commands::BulkTag {
            dataset,
            label,
            items,
            all,
        } => {
            let mut wf = LabelingWorkflow::from_config(gateway, notifier, config);
            cmd_bulk_tag(&mut wf, dataset, label, items, all).await
        }
        Commands::GroupTag {
            dataset,
            cluster_result,
            labels,
        } => {
            let mut wf = LabelingWorkflow::from_config(gateway, notifier, config);
            cmd_group_tag(&mut wf, dataset, cluster_result, labels).await
        }
        Commands::Train {
            dataset,
            clusters,
            labels,
            arch,
            epochs,
            save,
            name,
        } => {
            let training = TrainingConfig::new(arch, epochs)?;
            let mut wf = LabelingWorkflow::from_config(gateway.clone(), notifier.clone(), config);
            let mut orch = TrainingOrchestrator::new(
                gateway,
                SessionStore::new(),
                notifier,
                config.close_grace(),
            );
            let job = TrainJob {
                dataset,
                clusters,
                labels,
                training,
                save,
                name,
            };
            cmd_train(&mut wf, &mut orch, job).await
        }
    }
}

// ─── Command implementations ──────────────────────────────────────────────────

async fn cmd_serve(
    fixture: Option<PathBuf>,
    host: String,
    port: u16,
    token: Option<String>,
) -> Result<()> {
    println!("🏷️  labelman development server");
    match &fixture {
        Some(path) => println!("   Fixture: {}", path.display()),
        None => println!("   Fixture: (empty)"),
    }
    println!("   API:     http://{}:{}/api", host, port);
    if token.is_some() {
        println!("   Auth:    ✓ bearer token required");
    }
    println!();

    let config = ServerConfig {
        host,
        port,
        fixture,
        token,
    };
    serve(config).await
}

async fn open(wf: &mut LabelingWorkflow, dataset: String, clusters: Option<String>) -> Result<()> {
    let request = match clusters {
        Some(id) => LoadRequest::new(dataset).with_clusters(id),
        None => LoadRequest::new(dataset),
    };
    wf.open_dataset(request).await?;
    Ok(())
}

async fn cmd_items(
    wf: &mut LabelingWorkflow,
    dataset: String,
    clusters: Option<String>,
    group: Option<ClusterId>,
) -> Result<()> {
    open(wf, dataset, clusters).await?;
    if let Some(group) = group {
        wf.set_active_group(group)?;
    }

    let collection = wf.store().collection();
    let items = match (group, collection.grouping()) {
        (Some(_), Some(_)) => wf.source_items(),
        _ => collection.items().iter().collect(),
    };
    if items.is_empty() {
        println!("No items found in dataset '{}'", collection.dataset_id);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Item", "Path", "Cluster", "Tags", "Suggestions"]);
    for item in &items {
        let cluster = item
            .cluster_id
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let tags = item.custom_tags.iter().cloned().collect::<Vec<_>>().join(", ");
        let suggestions = item
            .ai_suggested_tags
            .iter()
            .map(|t| format!("{} ({:.0}%)", t.label, t.confidence * 100.0))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row([
            item.item_id.as_str(),
            item.storage_path.as_str(),
            &cluster,
            &tags,
            &suggestions,
        ]);
    }

    let name = collection
        .dataset_name
        .as_deref()
        .unwrap_or(&collection.dataset_id);
    match collection.grouping() {
        Some(grouping) => println!(
            "Dataset: {} ({} items, {} groups)",
            name,
            collection.len(),
            grouping.len()
        ),
        None => println!("Dataset: {} ({} items)", name, collection.len()),
    }
    println!("{}", table);

    if !wf.group_tags().is_empty() {
        println!("Proposed group labels:");
        for (cluster, label) in wf.group_tags().iter() {
            println!("  {cluster}: {label}");
        }
    }
    Ok(())
}

async fn cmd_tags(
    gateway: Arc<dyn Gateway>,
    notifier: Notifier,
    config: &ClientConfig,
    action: TagAction,
) -> Result<()> {
    match action {
        TagAction::List { item } => {
            let tags = gateway.list_tags(&item).await?;
            if tags.is_empty() {
                println!("No custom tags on '{}'", item);
            }
            for tag in tags {
                println!("{}", tag);
            }
        }
        TagAction::Add {
            dataset,
            item,
            label,
        } => {
            let mut wf = LabelingWorkflow::from_config(gateway, notifier, config);
            open(&mut wf, dataset, None).await?;
            wf.add_tag_to(&item, &label).await?;
        }
        TagAction::Rm {
            dataset,
            item,
            label,
        } => {
            let mut wf = LabelingWorkflow::from_config(gateway, notifier, config);
            open(&mut wf, dataset, None).await?;
            wf.delete_tag(&item, &label).await?;
        }
    }
    Ok(())
}

async fn cmd_suggest(wf: &mut LabelingWorkflow, dataset: String, items: Vec<String>) -> Result<()> {
    open(wf, dataset, None).await?;
    for item in &items {
        wf.toggle_selection(item)?;
    }

    let ranked = wf.common_suggestions();
    if ranked.is_empty() {
        println!("No AI suggestions for the selected images");
        return Ok(());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Suggestion", "Images"]);
    for (label, count) in &ranked {
        table.add_row([label.as_str(), &format!("{}/{}", count, items.len())]);
    }
    println!("{}", table);
    Ok(())
}

async fn cmd_bulk_tag(
    wf: &mut LabelingWorkflow,
    dataset: String,
    label: String,
    items: Vec<String>,
    all: bool,
) -> Result<()> {
    open(wf, dataset, None).await?;
    if all {
        wf.select_all();
    } else {
        for item in &items {
            wf.toggle_selection(item)?;
        }
    }
    wf.set_bulk_label(label);

    let outcome = wf.apply_bulk_tag().await?;
    println!(
        "Tagged {}/{} images with '{}'",
        outcome.applied.len(),
        outcome.attempted(),
        outcome.label
    );
    for (item, error) in &outcome.failed {
        println!("  ✗ {}: {}", item, error);
    }
    if !outcome.is_complete() {
        anyhow::bail!("{} images could not be tagged", outcome.failed.len());
    }
    Ok(())
}

async fn cmd_group_tag(
    wf: &mut LabelingWorkflow,
    dataset: String,
    cluster_result: String,
    labels: Vec<(ClusterId, String)>,
) -> Result<()> {
    open(wf, dataset, Some(cluster_result)).await?;
    if wf.store().grouping().is_none() {
        anyhow::bail!("Cluster result could not be loaded");
    }
    for (cluster, label) in labels {
        wf.set_group_label(cluster, label)?;
    }
    let message = wf.apply_group_tags().await?;
    if !message.is_empty() {
        println!("{}", message);
    }
    Ok(())
}

struct TrainJob {
    dataset: String,
    clusters: Option<String>,
    labels: Vec<(ClusterId, String)>,
    training: TrainingConfig,
    save: bool,
    name: Option<String>,
}

async fn cmd_train(
    wf: &mut LabelingWorkflow,
    orch: &mut TrainingOrchestrator,
    job: TrainJob,
) -> Result<()> {
    let grouped = job.clusters.is_some();
    open(wf, job.dataset.clone(), job.clusters).await?;
    let input = if grouped {
        if wf.store().grouping().is_none() {
            anyhow::bail!("Cluster result could not be loaded");
        }
        for (cluster, label) in job.labels {
            wf.set_group_label(cluster, label)?;
        }
        wf.training_input()?
    } else {
        TrainingInput::custom_tags()
    };

    orch.open(job.training);
    let spinner = spinner(format!(
        "Training {} for {} epochs…",
        job.training.model_architecture, job.training.epochs
    ));
    let state = orch.submit(input).await;
    spinner.finish_and_clear();

    let Some(session) = orch.session() else {
        anyhow::bail!("Training dialog closed unexpectedly");
    };
    match state? {
        TrainingState::Results => {}
        _ => anyhow::bail!(
            "Training failed: {}",
            session.error.as_deref().unwrap_or("unknown error")
        ),
    }
    if let Some(results) = &session.results {
        print_results(results);
    }

    if job.save {
        if let Some(name) = job.name {
            orch.set_model_name(name)?;
        }
        let handle = orch.save_model(&job.dataset)?;
        println!(
            "Recorded model '{}' ({})",
            handle.record.display_name, handle.record.id
        );
        let spinner = self::spinner("Saving model…".to_string());
        let saved = handle.task.await;
        spinner.finish_and_clear();
        saved.context("Background save task panicked")?;
    }
    Ok(())
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_results(results: &TrainingResults) {
    if let Some(acc) = results.accuracy() {
        println!("Accuracy: {:.1}%", acc * 100.0);
    }

    let mut report = Table::new();
    report.load_preset(UTF8_FULL);
    report.set_header(["Label", "Precision", "Recall", "F1", "Support"]);
    for (label, m) in results.class_rows() {
        report.add_row([
            label.to_string(),
            format!("{:.3}", m.precision),
            format!("{:.3}", m.recall),
            format!("{:.3}", m.f1_score),
            format!("{}", m.support),
        ]);
    }
    println!("{}", report);

    if !results.confusion_matrix.is_empty() {
        let mut matrix = Table::new();
        matrix.load_preset(UTF8_FULL);
        let mut header = vec!["actual \\ predicted".to_string()];
        header.extend(results.confusion_matrix_labels.iter().cloned());
        matrix.set_header(header);
        for (i, row) in results.confusion_matrix.iter().enumerate() {
            let label = results
                .confusion_matrix_labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| i.to_string());
            let mut cells = vec![label];
            cells.extend(row.iter().map(|n| n.to_string()));
            matrix.add_row(cells);
        }
        println!("{}", matrix);
    }
}

fn print_notifications(rx: &mut UnboundedReceiver<Notification>) {
    while let Ok(n) = rx.try_recv() {
        let marker = match n.level {
            NotifyLevel::Info => "ℹ",
            NotifyLevel::Success => "✓",
            NotifyLevel::Warn => "⚠",
            NotifyLevel::Error => "✗",
        };
        println!("{} {}", marker, n.message);
    }
}
