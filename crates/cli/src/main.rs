use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use settle_apply::{ApplyOptions, DEFAULT_FIELD_MANAGER};
use settle_core::{ControlPlane, ResourceKey, ResourceKind, WatchTarget};
use settle_kubehub::KubeControlPlane;
use settle_wait::{WaitContext, Waiter, WaiterConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "settlectl", version, about = "Apply resources and wait until they settle")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (omit for cluster-scoped kinds)
    #[arg(long = "ns", global = true, env = "SETTLE_NAMESPACE")]
    namespace: Option<String>,

    /// Give up waiting after this many seconds (0 disables the timeout).
    /// Falls back to SETTLE_WAIT_TIMEOUT_SECS, then 600.
    #[arg(long = "timeout", global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wait for an existing resource to report Ready
    Wait {
        /// GVK key, e.g. "v1/ConfigMap" or "kpack.io/v1alpha2/Image"
        gvk: String,
        name: String,
        /// Generation to wait for (default: the resource's current generation)
        #[arg(long = "generation")]
        generation: Option<i64>,
    },
    /// Server-side apply a YAML manifest
    Apply {
        /// Path to the manifest
        #[arg(short = 'f', long = "file")]
        file: String,
        /// Wait for the applied generation to become ready
        #[arg(long = "wait", action = ArgAction::SetTrue)]
        wait: bool,
        #[arg(long = "dry-run", action = ArgAction::SetTrue)]
        dry_run: bool,
        #[arg(long = "field-manager", default_value = DEFAULT_FIELD_MANAGER)]
        field_manager: String,
    },
}

fn init_tracing() {
    let env = std::env::var("SETTLE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("SETTLE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid SETTLE_METRICS_ADDR; expected host:port");
        }
    }
}

fn waiter_config(timeout_secs: Option<u64>) -> WaiterConfig {
    let env = WaiterConfig::from_env();
    match timeout_secs {
        Some(0) => WaiterConfig { timeout: None, ..env },
        Some(secs) => WaiterConfig { timeout: Some(Duration::from_secs(secs)), ..env },
        None => env,
    }
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                    return;
                }
                info!("interrupted; cancelling");
                token.cancel();
            }
        }
    });
}

async fn wait_for(cp: Arc<KubeControlPlane>, cfg: WaiterConfig, target: &WatchTarget, ctx: &WaitContext) -> Result<()> {
    let waiter = Waiter::new(cp, cfg);
    waiter.wait(ctx, target).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let cfg = waiter_config(cli.timeout_secs);

    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());
    let ctx = WaitContext::background().with_cancellation(token.clone());

    let cp = Arc::new(KubeControlPlane::try_default().await.context("connecting to cluster")?);
    let result = match cli.command {
        Commands::Wait { gvk, name, generation } => {
            let kind = ResourceKind::parse(&gvk)?;
            let ns = cli.namespace.as_deref();
            info!(gvk = %gvk, ns = ?ns, name = %name, generation = ?generation, "wait invoked");
            let target = match generation {
                Some(g) => WatchTarget::new(kind, ns, &name, g),
                None => {
                    let key = ResourceKey::new(kind.clone(), ns, &name);
                    let obj = cp.get(&key).await.with_context(|| format!("fetching {}", key))?;
                    WatchTarget::from_object(kind, &obj).context("reading resource metadata")?
                }
            };
            wait_for(cp.clone(), cfg, &target, &ctx).await.map(|()| {
                match cli.output {
                    Output::Human => println!("{:?} ready", target.name()),
                    Output::Json => println!("{}", serde_json::json!({"name": target.name(), "generation": target.generation(), "ready": true})),
                }
            })
        }
        Commands::Apply { file, wait, dry_run, field_manager } => {
            let yaml = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file))?;
            let manifest = settle_apply::parse_manifest(&yaml, cli.namespace.as_deref())?;
            info!(file = %file, key = %manifest.key, dry_run, wait, "apply invoked");
            let opts = ApplyOptions { field_manager, dry_run };
            let applied = settle_apply::apply(&cp, &manifest, &opts).await?;
            match cli.output {
                Output::Human => println!("{:?} applied{}", applied.key.name, if dry_run { " (dry run)" } else { "" }),
                Output::Json => println!("{}", serde_json::to_string_pretty(&applied.object)?),
            }
            if wait && !dry_run {
                let target = applied.watch_target()?;
                wait_for(cp.clone(), cfg, &target, &ctx).await.map(|()| {
                    if cli.output == Output::Human {
                        println!("{:?} ready", target.name());
                    }
                })
            } else {
                Ok(())
            }
        }
    };
    token.cancel();
    result
}
