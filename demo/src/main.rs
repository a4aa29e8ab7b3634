use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use ordercast::{Config, Error, Node};
use tokio::{signal, task::JoinSet};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

mod script;

/// Run members of an ordered multicast group through a short scripted
/// exchange, logging each member's inbox as messages are delivered.
#[derive(Parser, Debug)]
#[command(name = "ordercast-demo", version, about)]
struct Args {
    /// Group configuration file.
    config: PathBuf,

    /// Run only this member of the group instead of all of them.
    #[arg(long)]
    node: Option<usize>,

    /// With --node, how long to wait for the other members to start before
    /// sending anything.
    #[arg(long, default_value_t = 2000)]
    startup_delay_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_tracing();
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %args.config.display(), error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(&args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "demo failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, config: Config) -> Result<(), Error> {
    let members: Vec<usize> = match args.node {
        Some(index) => vec![index],
        None => (0..config.group.len()).collect(),
    };

    // every listener in this process is bound before any member sends
    let mut nodes = Vec::with_capacity(members.len());
    for index in members {
        let node = Node::start(config.group.clone(), index, config.options.clone()).await?;
        nodes.push(Arc::new(node));
    }

    if args.node.is_some() {
        tokio::time::sleep(Duration::from_millis(args.startup_delay_ms)).await;
    }

    let mut tasks = JoinSet::new();
    for node in &nodes {
        let generator = Arc::clone(node);
        tasks.spawn(async move {
            if let Err(err) = script::generate(&generator).await {
                error!(node = generator.index(), error = %err, "script stopped");
            }
        });

        let consumer = Arc::clone(node);
        tasks.spawn(async move { script::consume(&consumer).await });
    }

    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to wait for interrupt");
    }
    info!("shutting down");

    for node in &nodes {
        node.shutdown();
    }
    while tasks.join_next().await.is_some() {}

    for node in nodes {
        let Some(node) = Arc::into_inner(node) else {
            continue;
        };
        let index = node.index();
        let summary = node.stop().await?;

        info!(
            node = index,
            clock = summary.clock,
            delivered = summary.delivered,
            pending = summary.pending,
            awaiting_acks = summary.awaiting_acks,
            "stopped"
        );
    }

    Ok(())
}

#[cfg(debug_assertions)]
fn setup_tracing() {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
}

#[cfg(not(debug_assertions))]
fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
}
