use std::net::IpAddr;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use signpost::resolver::{Resolver, StaticAnswer};
use signpost::server::{self, ServerConfig};

#[derive(Parser)]
#[command(name = "signpost")]
#[command(about = "Lightweight DNS answering server", long_about = None)]
struct Args {
    /// Address to listen on; repeat for multiple interfaces
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: Vec<IpAddr>,

    /// Port for both the TCP and UDP sockets
    #[arg(short, long, default_value_t = server::DEFAULT_PORT)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    let config = ServerConfig {
        addresses: args.bind,
        port: args.port,
    };
    let resolver = Resolver::new(Box::new(StaticAnswer));

    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, server::run(config, resolver))?;

    Ok(())
}
