use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use muninn::config::EnumConfig;
use muninn::enumeration::Enumeration;
use muninn::error::EnumError;
use muninn::graph::{Graph, MemGraph};
use muninn::resolve::StubResolver;

/// DNS-driven subdomain enumeration engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root domain to enumerate (repeatable)
    #[arg(short = 'd', long = "domain")]
    domains: Vec<String>,

    /// Seed ASN for ASN-aware data sources (repeatable)
    #[arg(long = "asn")]
    asns: Vec<i32>,

    /// Known name to feed into the run (repeatable)
    #[arg(short = 'n', long = "name")]
    names: Vec<String>,

    /// Name or subtree that must never be resolved (repeatable)
    #[arg(long = "blacklist")]
    blacklist: Vec<String>,

    /// Skip all resolution stages
    #[arg(long)]
    passive: bool,

    /// Enable zone transfers and wider reverse sweeps
    #[arg(long)]
    active: bool,

    /// Keep in-scope names that fail to resolve
    #[arg(long = "include-unresolvable")]
    include_unresolvable: bool,

    /// Upstream resolver address (repeatable; system defaults otherwise)
    #[arg(short = 'r', long = "resolver")]
    resolvers: Vec<SocketAddr>,

    /// Worker threads for the runtime (0 = default)
    #[arg(long, default_value = "0")]
    worker_threads: usize,
}

fn main() {
    let args = Args::parse();

    let mut config = EnumConfig::from_env();
    config.domains.extend(args.domains);
    config.asns.extend(args.asns);
    config.provided_names.extend(args.names);
    config.blacklist.extend(args.blacklist);
    config.passive |= args.passive;
    config.active |= args.active;
    config.include_unresolvable |= args.include_unresolvable;
    if !args.resolvers.is_empty() {
        config.resolvers = args.resolvers;
    }
    if args.worker_threads > 0 {
        config.worker_threads = args.worker_threads;
    }

    if let Err(e) = config.check_settings() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if config.worker_threads > 0 {
        builder.worker_threads(config.worker_threads);
    }
    let runtime = builder
        .enable_all()
        .thread_name("muninn-worker")
        .build()
        .expect("failed to build the Tokio runtime");

    if runtime.block_on(async_main(config)) {
        std::process::exit(0);
    }
    std::process::exit(1);
}

async fn async_main(config: EnumConfig) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muninn=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "muninn starting: domains={:?}, passive={}, active={}",
        config.domains, config.passive, config.active
    );

    let resolver = Arc::new(StubResolver::new(&config.resolvers));
    let trusted_resolver = Arc::new(StubResolver::new(&config.trusted_resolvers));
    let graph = Arc::new(MemGraph::new());
    let event = config.uuid.clone();

    let enumeration = Enumeration::new(
        config,
        resolver,
        trusted_resolver,
        graph.clone(),
        Vec::new(),
    );

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, draining the run");
            signal_token.cancel();
        }
    });

    let result = enumeration.start(token).await;
    match result {
        Ok(()) => {}
        Err(EnumError::Cancelled) => warn!("run cancelled; reporting partial results"),
        Err(e) => {
            error!("{e}");
            return false;
        }
    }

    let mut names = graph.event_fqdns(&event).await;
    names.sort();
    info!("{} name(s) discovered", names.len());
    for name in names {
        println!("{name}");
    }
    true
}
