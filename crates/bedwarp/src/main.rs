//! `bedwarp` command-line entry point.

use std::process::ExitCode;

use bedwarp::prelude::*;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Bedrock login proxy.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,
    /// UDP port to listen on
    #[arg(short, long, default_value_t = 19132)]
    port: u16,
    /// Server name shown in the server list
    #[arg(long, default_value = "bedwarp")]
    motd: String,
    /// Second server list line (defaults to the MOTD)
    #[arg(long)]
    sub_motd: Option<String>,
    /// Advertised player limit
    #[arg(long, default_value_t = 1337)]
    max_players: u32,
    /// Server to transfer clients to
    #[arg(short, long, default_value = "127.0.0.1")]
    target: String,
    /// Port of the server to transfer clients to
    #[arg(long, default_value_t = 19133)]
    target_port: u16,
    /// Concurrent identity verifications
    #[arg(long, default_value_t = 32)]
    workers: usize,
    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bedwarp exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), BedwarpError> {
    let sub_motd = args.sub_motd.unwrap_or_else(|| args.motd.clone());
    let config = ServerConfig::builder()
        .bind(&args.bind, args.port)
        .motd(args.motd)
        .sub_motd(sub_motd)
        .max_players(args.max_players)
        .backend(args.target, args.target_port)
        .worker_threads(args.workers)
        .build();

    let proxy = ProxyServer::new(config).observer(LoggingObserver).start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "could not listen for ctrl-c, shutting down");
    }
    proxy.shutdown().await
}
