use std::panic;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use backtrace::Backtrace;
use clap::Parser;
use meshtask_core::CallableRegistry;
use meshtask_messages::ArgTree;
use meshtask_node::callables;
use meshtask_node::config::Config;
use meshtask_node::run_cluster;
use mimalloc::MiMalloc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing::span;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use warp::Filter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Clone, Debug)]
struct Cli {
    /// Path to the configuration file.
    #[clap(short, long)]
    config: Option<String>,

    /// If set, output logs in JSON format.
    #[clap(short, long, action)]
    json: bool,
}

fn setup_logging(json: bool) {
    if json {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_env_filter(EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy())
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting up logging failed");
    } else {
        let subscriber = tracing_subscriber::fmt()
            .pretty()
            .compact()
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_env_filter(EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy())
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting up logging failed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.json);

    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let (file, lineno, col) = match panic_info.location() {
            Some(l) => (l.file(), l.line(), l.column()),
            None => ("<unknown>", 0, 0),
        };
        error!(msg, file, lineno, col, "panic occurred: {:?}", Backtrace::new());
    }));

    let config = Config::load(cli.config);
    config.validate();
    debug!("loaded configuration: {:?}", config);

    let version = env!("CARGO_PKG_VERSION");
    let span = span!(Level::INFO, "run", worker_count = config.cluster.worker_count, version);
    let _guard = span.enter();

    info!("starting cluster. version: {} worker_count: {}", version, config.cluster.worker_count);

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.prometheus.port))
        .install()
        .context("setting up Prometheus")?;

    let mut registry = CallableRegistry::new();
    callables::register_builtin(&mut registry);

    let mut cluster = run_cluster(&config, registry);

    let last_task_processed = Arc::new(AtomicU64::new(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs()));
    let liveness_check_interval = config.health.liveness_check_interval_secs;
    let health_port = config.health.port;
    let last_task_processed_clone = Arc::clone(&last_task_processed);
    tokio::spawn(async move {
        let readiness_route = warp::path!("readiness").map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));
        let liveness_route = warp::path!("liveness").map(move || {
            let last_processed = last_task_processed_clone.load(Ordering::Relaxed);
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
            if now - last_processed <= liveness_check_interval {
                warp::reply::with_status("OK", warp::http::StatusCode::OK)
            } else {
                warp::reply::with_status("FAIL", warp::http::StatusCode::INTERNAL_SERVER_ERROR)
            }
        });
        let routes = readiness_route.or(liveness_route);
        warp::serve(routes).run(([0, 0, 0, 0], health_port)).await;
    });

    // No external task source is in scope for this workspace (process
    // bootstrap of the messaging substrate is a stated non-goal); run a
    // small self-check workload so a freshly started node proves the
    // cluster is actually wired up before settling into serving health
    // checks until told to stop.
    let check = cluster
        .controller
        .submit("add", ArgTree::Tuple(vec![ArgTree::value(&1i64), ArgTree::value(&1i64)]), ArgTree::Map(vec![]), 1)
        .await
        .context("submitting self-check task")?;
    let result = cluster.controller.get(&check[0]).await.context("awaiting self-check result")?;
    last_task_processed.store(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(), Ordering::Relaxed);
    info!("self-check task produced {}", bincode::deserialize::<i64>(&result).unwrap_or_default());

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received, cancelling cluster");
    cluster.shutdown().await.context("shutting down cluster")?;

    Ok(())
}
