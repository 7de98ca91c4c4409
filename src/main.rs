use anyhow::Context;
use catalog_notify::broker::{InMemoryBroker, MessageBody, StaticDirectory};
use catalog_notify::catalog::{CatalogSnapshot, InMemoryCatalog};
use catalog_notify::notification::EVENT_PROPERTY;
use catalog_notify::replay::{ReplaySummary, Replayer};
use catalog_notify::{Config, NotificationListener};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "catalog-notify")]
#[command(about = "Publishes catalog change notifications to a message bus", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(long, value_name = "FILE", help = "JSON snapshot seeding the catalog")]
    catalog: Option<PathBuf>,

    #[arg(short, long, value_name = "FILE", help = "Catalog events to replay, one JSON object per line")]
    events: PathBuf,

    #[arg(long, help = "Publish to an in-memory broker and print the messages")]
    dry_run: bool,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting catalog-notify");
    info!("Loading configuration from {:?}", args.config);

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    info!(
        brokers = ?config.broker.brokers,
        transactional_id = %config.broker.transactional_id,
        connection_factory = %config.directory.connection_factory,
        dry_run = args.dry_run,
        "Configuration summary"
    );

    let catalog = Arc::new(load_catalog(args.catalog.as_ref(), &config).await?);

    let broker = InMemoryBroker::new();
    let listener = if args.dry_run {
        let directory = StaticDirectory::new().bind(
            config.directory.connection_factory.clone(),
            Arc::new(broker.clone()),
        );
        NotificationListener::new(Arc::new(directory), &config)
    } else {
        NotificationListener::from_config(&config)
    };

    if !listener.start().await {
        warn!("Message bus unavailable at startup, will retry on first publish");
    }

    let replayer = Replayer::new(listener, catalog);
    let result = replayer.replay_file(&args.events).await;
    replayer.into_listener().shutdown().await;

    let summary =
        result.with_context(|| format!("failed to read events from {:?}", args.events))?;

    if args.dry_run {
        print_delivered(&broker)?;
    }
    print_summary(&summary);

    Ok(())
}

async fn load_catalog(path: Option<&PathBuf>, config: &Config) -> anyhow::Result<InMemoryCatalog> {
    let mut snapshot = match path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read catalog snapshot {:?}", path))?;
            serde_json::from_str::<CatalogSnapshot>(&raw)
                .with_context(|| format!("invalid catalog snapshot {:?}", path))?
        }
        None => CatalogSnapshot::default(),
    };

    // Snapshot settings override the configured host properties.
    for (key, value) in &config.host.properties {
        snapshot
            .settings
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    Ok(InMemoryCatalog::from_snapshot(snapshot))
}

fn print_delivered(broker: &InMemoryBroker) -> anyhow::Result<()> {
    for delivered in broker.delivered() {
        let event = delivered
            .message
            .string_property(EVENT_PROPERTY)
            .unwrap_or_default();
        let body = match delivered.message.body() {
            MessageBody::Map(fields) => serde_json::to_string(fields)?,
            MessageBody::Object(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        };
        println!(
            "{}\t{}\t{}\t{}",
            delivered.committed_at.to_rfc3339(),
            delivered.topic,
            event,
            body
        );
    }
    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    println!(
        "events: {}, delivered: {}, ignored: {}, suppressed: {}, failed: {}, errors: {}",
        summary.total(),
        summary.delivered,
        summary.ignored,
        summary.suppressed,
        summary.failed,
        summary.errors
    );
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("catalog_notify=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("catalog_notify=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
