//! apiwire command line client.
//!
//! ```text
//!   apiwire call  ──▶ Dispatcher::send ──▶ envelope (JSON, stdout)
//!
//!   apiwire watch ──▶ Dispatcher::send ──▶ RealtimeHub::attach
//!                                           └─▶ subscribe ──▶ field changes (stdout)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use apiwire::cache::{MemoryCache, ResponseCache};
use apiwire::config::{load_config, ClientConfig};
use apiwire::dispatch::{Dispatcher, TokenProvider, TracingMiddleware};
use apiwire::observability::{logging, metrics};
use apiwire::realtime::{RealtimeDescriptor, RealtimeHub, RealtimeRegistry};
use apiwire::request::{ApiRequest, CacheStrategy, HttpMethod};

#[derive(Parser)]
#[command(name = "apiwire")]
#[command(about = "Call a JSON API and follow realtime updates", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bearer token for authenticated calls
    #[arg(short, long, env = "APIWIRE_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request and print the response envelope
    Call(CallArgs),
    /// Fetch an entity and print pushed field changes until Ctrl-C
    Watch(WatchArgs),
}

#[derive(Args)]
struct CallArgs {
    /// HTTP method
    method: HttpMethod,

    /// Absolute URL, or path relative to http.base_url
    endpoint: String,

    /// JSON payload
    #[arg(short, long, default_value = "{}")]
    body: String,

    /// Send without an Authorization header
    #[arg(long)]
    no_auth: bool,

    /// Per-call timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    call: CallArgs,

    /// Entity group prefix
    #[arg(long)]
    prefix: String,

    /// Identifier field of the response content
    #[arg(long, default_value = "id")]
    id_field: String,

    /// Updatable field (repeatable)
    #[arg(long = "field", required = true)]
    fields: Vec<String>,

    #[arg(long, default_value = "SubscribeToGroup")]
    subscribe_method: String,

    #[arg(long, default_value = "UnsubscribeFromGroup")]
    unsubscribe_method: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "apiwire starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = CancellationToken::new();
    let memory = MemoryCache::new();
    let sweeper = (config.cache.sweep_interval_secs > 0).then(|| {
        memory.spawn_sweeper(
            Duration::from_secs(config.cache.sweep_interval_secs),
            shutdown.clone(),
        )
    });

    let dispatcher = Dispatcher::configure(&config)?
        .cache(ResponseCache::new(
            Arc::new(memory),
            Duration::from_secs(config.cache.default_ttl_secs),
        ))
        .middleware(Arc::new(TracingMiddleware))
        .build();

    if let Some(token) = cli.token {
        dispatcher.tokens().set_token(token);
    }

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            ctrl_c.cancel();
        }
    });

    let outcome = match cli.command {
        Commands::Call(args) => call(&dispatcher, &args, &shutdown).await,
        Commands::Watch(args) => watch(&dispatcher, &config, args, &shutdown).await,
    };

    shutdown.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    outcome
}

fn build_request(args: &CallArgs) -> Result<ApiRequest<Value, Value>, serde_json::Error> {
    let payload: Value = serde_json::from_str(&args.body)?;
    Ok(ApiRequest::new(args.method, args.endpoint.clone(), payload)
        .with_auth(!args.no_auth)
        .with_cache_strategy(CacheStrategy::Disabled)
        .with_timeout(Duration::from_millis(args.timeout_ms)))
}

async fn call(
    dispatcher: &Dispatcher,
    args: &CallArgs,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = build_request(args)?;
    let envelope = dispatcher.send(&request, Some(cancel)).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

async fn watch(
    dispatcher: &Dispatcher,
    config: &ClientConfig,
    args: WatchArgs,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = build_request(&args.call)?;
    let envelope = dispatcher.send(&request, Some(cancel)).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if !envelope.is_success() {
        return Ok(());
    }

    let descriptor = args.fields.into_iter().fold(
        RealtimeDescriptor::new(args.prefix, args.subscribe_method, args.unsubscribe_method)
            .with_id_field(args.id_field),
        |descriptor, field| descriptor.with_field(field),
    );
    let registry = RealtimeRegistry::new();
    registry.register::<Value>(descriptor)?;

    let hub = RealtimeHub::connect(&config.realtime, Arc::new(registry)).await?;
    let live = hub.attach(envelope);
    let mut changes = live.changes();
    live.subscribe().await?;

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => println!("{} = {}", change.field, change.value),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed field changes");
                }
                Err(RecvError::Closed) => break,
            },
            _ = cancel.cancelled() => break,
        }
    }

    live.unsubscribe().await?;
    Ok(())
}
