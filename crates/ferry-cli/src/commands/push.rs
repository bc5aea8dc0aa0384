//! Push command for replicating a bundle into a destination registry.
//!
//! The bundle's images are expected to be served by an already-running
//! local registry (`--from-registry`). Images are pushed first, then charts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ferry_core::{ChartRepositorySet, RegistryImageSet};
use ferry_push::{ConflictPolicy, Endpoint, LogProgress, PushOptions, PushSummary, Pusher};
use ferry_registry::{RegistryAuth, RegistryClient, RegistryConfig, TlsConfig};
use url::Url;

/// Arguments for the push command.
#[derive(Args)]
pub struct PushArgs {
    #[command(subcommand)]
    pub command: PushCommands,
}

/// Things that can be pushed.
#[derive(Subcommand)]
pub enum PushCommands {
    /// Push the images and charts of a bundle
    Bundle(BundleArgs),
}

/// Arguments for `push bundle`.
#[derive(Args)]
pub struct BundleArgs {
    /// Address (host[:port]) of the local registry serving the bundle
    #[arg(long)]
    pub from_registry: String,

    /// YAML file listing the images to push
    #[arg(long)]
    pub images_config: Option<PathBuf>,

    /// YAML file listing the charts to push
    #[arg(long)]
    pub charts_config: Option<PathBuf>,

    /// Destination registry URL; any path becomes the repository prefix
    #[arg(long)]
    pub to_registry: String,

    /// CA certificate (PEM) to trust for the destination registry
    #[arg(long, conflicts_with = "to_registry_insecure_skip_tls_verify")]
    pub to_registry_ca_cert_file: Option<PathBuf>,

    /// Skip TLS verification of the destination registry
    #[arg(long)]
    pub to_registry_insecure_skip_tls_verify: bool,

    /// Username for the destination registry
    #[arg(long, requires = "to_registry_password")]
    pub to_registry_username: Option<String>,

    /// Password for the destination registry
    #[arg(long, requires = "to_registry_username")]
    pub to_registry_password: Option<String>,

    /// What to do when a tag already exists in the destination:
    /// overwrite, error, skip, merge-with-retain, merge-with-overwrite
    #[arg(long, default_value_t = ConflictPolicy::Overwrite)]
    pub on_existing_tag: ConflictPolicy,

    /// Number of image tags pushed at once
    #[arg(long, default_value = "1")]
    pub image_push_concurrency: usize,

    /// Rewrite Docker manifest lists to OCI indexes before pushing
    #[arg(long)]
    pub force_oci_media_types: bool,
}

/// Where pushed content lands.
#[derive(Debug, PartialEq, Eq)]
struct Destination {
    url: String,
    path: String,
}

/// Execute the push command.
pub async fn execute(args: PushArgs) -> Result<()> {
    match args.command {
        PushCommands::Bundle(bundle) => push_bundle(bundle).await,
    }
}

async fn push_bundle(args: BundleArgs) -> Result<()> {
    if args.images_config.is_none() && args.charts_config.is_none() {
        anyhow::bail!("At least one of --images-config or --charts-config must be specified");
    }

    let images = args
        .images_config
        .as_deref()
        .map(load_images)
        .transpose()?
        .unwrap_or_default();
    let charts = args
        .charts_config
        .as_deref()
        .map(load_charts)
        .transpose()?
        .unwrap_or_default();

    let destination = parse_destination(&args.to_registry)?;
    let options = PushOptions::builder()
        .concurrency(args.image_push_concurrency)
        .on_existing_tag(args.on_existing_tag)
        .force_oci_media_types(args.force_oci_media_types)
        .destination_path(destination.path.as_str())
        .build();
    tracing::info!(
        from = %args.from_registry,
        to = %destination.url,
        path = %destination.path,
        policy = %options.on_existing_tag,
        images = images.total_images(),
        charts = charts.total_charts(),
        "pushing bundle"
    );

    let source = RegistryClient::new(source_config(&args.from_registry))
        .context("Failed to create source registry client")?;
    let target = RegistryClient::new(destination_config(&args, &destination))
        .context("Failed to create destination registry client")?;

    let source = endpoint(source);
    let target = endpoint(target);
    let pusher = |status: &str| -> Result<Pusher> {
        let pusher = Pusher::new(source.clone(), target.clone(), options.clone())
            .context("Invalid push options")?;
        Ok(pusher.with_progress(Arc::new(LogProgress::new(status))))
    };

    if !images.is_empty() {
        let summary = pusher("Pushing bundled images")?
            .push_images(&images)
            .await
            .context("Failed to push bundled images")?;
        print_summary("image tags", &summary);
    }

    if !charts.is_empty() {
        let summary = pusher("Pushing bundled charts")?
            .copy_charts(&charts)
            .await
            .context("Failed to push bundled charts")?;
        print_summary("chart versions", &summary);
    }

    Ok(())
}

fn endpoint(client: RegistryClient) -> Endpoint {
    let registry = client.registry().clone();
    Endpoint::new(Arc::new(client), registry)
}

fn load_images(path: &Path) -> Result<RegistryImageSet> {
    RegistryImageSet::from_yaml_file(path)
        .with_context(|| format!("Failed to read images config {}", path.display()))
}

fn load_charts(path: &Path) -> Result<ChartRepositorySet> {
    ChartRepositorySet::from_yaml_file(path)
        .with_context(|| format!("Failed to read charts config {}", path.display()))
}

/// Splits the destination URL into the registry URL and repository prefix.
/// A destination without a scheme is reached over https.
fn parse_destination(to_registry: &str) -> Result<Destination> {
    let with_scheme = if to_registry.contains("://") {
        to_registry.to_string()
    } else {
        format!("https://{to_registry}")
    };
    let url = Url::parse(&with_scheme)
        .with_context(|| format!("Invalid --to-registry URL '{to_registry}'"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => anyhow::bail!("Unsupported --to-registry scheme '{other}'. Use: http or https"),
    }
    let host = url
        .host_str()
        .with_context(|| format!("--to-registry URL '{to_registry}' has no host"))?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Ok(Destination {
        url: format!("{}://{authority}", url.scheme()),
        path: url.path().trim_matches('/').to_string(),
    })
}

fn source_config(from_registry: &str) -> RegistryConfig {
    if from_registry.contains("://") {
        RegistryConfig::new(from_registry)
    } else {
        RegistryConfig::new(format!("http://{from_registry}"))
    }
}

fn destination_config(args: &BundleArgs, destination: &Destination) -> RegistryConfig {
    let mut config = RegistryConfig::new(destination.url.as_str());

    if let (Some(username), Some(password)) =
        (&args.to_registry_username, &args.to_registry_password)
    {
        config = config.with_auth(RegistryAuth::basic(username, password));
    }

    if let Some(ca_cert) = &args.to_registry_ca_cert_file {
        config = config.with_tls(TlsConfig::new().with_ca_cert(ca_cert));
    } else if args.to_registry_insecure_skip_tls_verify {
        config = config.with_tls(TlsConfig::new().insecure());
    }

    config
}

fn print_summary(what: &str, summary: &PushSummary) {
    println!("Pushed {} {what}", summary.pushed);
    if summary.skipped > 0 {
        println!("Skipped {} {what} already present", summary.skipped);
    }
}
