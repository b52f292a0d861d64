// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! station2pkfwd CLI
//!
//! Runs the LNS listeners for a set of gateways and bridges each one to a
//! packet-forwarder backend.
//!
//! # Usage
//!
//! ```bash
//! # Serve every router configured in the current directory
//! station2pkfwd
//!
//! # Explicit listeners, backend and routers
//! station2pkfwd --infosuri ws://0.0.0.0:6090 --pkfwduri udp://ns.local:1700 router-::1
//!
//! # Using a JSON configuration file
//! station2pkfwd --config gateway.json
//!
//! # Write sample regions.yaml and router-::1.yaml
//! station2pkfwd gen-config --output conf --router 1 --region EU863
//! ```

use clap::{Parser, Subcommand};
use station2pkfwd::config::{ConfigStore, Region, ServerConfig};
use station2pkfwd::{templates, Registry, RouterId};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// LNS to packet-forwarder bridge
#[derive(Parser, Debug)]
#[command(name = "station2pkfwd")]
#[command(about = "Bridge LoRa Basic Stations to legacy UDP packet-forwarder backends")]
#[command(version)]
struct Args {
    /// JSON configuration file (flags below are ignored when set)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Discovery (infos) server URI
    #[arg(long, default_value = "ws://localhost:6090")]
    infosuri: String,

    /// Session (muxs) server URI (default: infos host, port + 2)
    #[arg(long)]
    muxsuri: Option<String>,

    /// Packet forwarder backend URI
    #[arg(long, default_value = "udp://localhost:1680")]
    pkfwduri: String,

    /// Address both listeners bind to
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration directory (can repeat)
    #[arg(long, default_value = ".")]
    confdir: Vec<PathBuf>,

    /// Pause between session accept and the first message (milliseconds)
    #[arg(long, default_value = "300")]
    settle_delay_ms: u64,

    /// PULL_DATA keepalive interval (seconds)
    #[arg(long, default_value = "10")]
    keepalive: u64,

    /// Send gateway stats every N keepalives (0 to disable)
    #[arg(long, default_value = "6")]
    stat_interval: u64,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Routers to serve (default: every configured router)
    routerids: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate sample regions.yaml and router configuration
    GenConfig {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Router id
        #[arg(short, long, default_value = "1")]
        router: String,

        /// Region (EU863 or US902)
        #[arg(long, default_value = "EU863")]
        region: String,
    },

    /// Validate a configuration directory
    Validate {
        /// Configuration directory (can repeat)
        #[arg(long, default_value = ".")]
        confdir: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match &args.logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
    }

    // Handle subcommands
    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig {
                output,
                router,
                region,
            } => cmd_gen_config(output, &router, &region),
            Commands::Validate { confdir } => cmd_validate(confdir),
        };
    }

    let config = build_config(&args)?;
    config.validate()?;

    info!("station2pkfwd v{}", env!("CARGO_PKG_VERSION"));

    let store = ConfigStore::load(config.confdir.as_slice())?;
    let routers = config.router_ids()?;
    let settings = config.bridge_settings()?;
    let muxs_uri = config.muxs_base_uri()?;
    info!("Backend: {}", settings.pkfwd_addr);

    let registry = Arc::new(Registry::start(&store, &routers, &settings, muxs_uri.as_str()).await?);
    if registry.is_empty() {
        return Err("no routers configured".into());
    }
    for router in registry.routers() {
        info!("Serving {}", router);
    }

    let infos_addr = SocketAddr::new(config.bind_address, config.infos_endpoint()?.port);
    let muxs_addr = SocketAddr::new(config.bind_address, config.muxs_endpoint()?.port);
    let infos = TcpListener::bind(infos_addr).await?;
    let muxs = TcpListener::bind(muxs_addr).await?;
    info!("Discovery endpoint: ws://{}", infos_addr);
    info!("Session endpoint: {}/<router>", muxs_uri);

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutting down..."),
            Err(e) => error!("Signal handler failed: {}", e),
        }
        signal.notify_waiters();
    });

    station2pkfwd::server::run(infos, muxs, Arc::clone(&registry), shutdown).await?;
    registry.shutdown().await;
    Ok(())
}

fn build_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    // Load from file if specified
    if let Some(ref path) = args.config {
        let mut config = ServerConfig::from_file(path)?;
        if !args.routerids.is_empty() {
            config.routers = args.routerids.clone();
        }
        return Ok(config);
    }

    Ok(ServerConfig {
        infos_uri: args.infosuri.clone(),
        muxs_uri: args.muxsuri.clone(),
        pkfwd_uri: args.pkfwduri.clone(),
        bind_address: args.bind.parse()?,
        confdir: args.confdir.clone(),
        settle_delay_ms: args.settle_delay_ms,
        keepalive_interval_secs: args.keepalive,
        stat_interval: args.stat_interval,
        routers: args.routerids.clone(),
        ..ServerConfig::default()
    })
}

fn cmd_gen_config(output: PathBuf, router: &str, region: &str) -> Result<(), Box<dyn std::error::Error>> {
    let router = RouterId::parse_router(router)?;
    let region = Region::from_name(region)?;

    std::fs::create_dir_all(&output)?;

    let regions_path = output.join("regions.yaml");
    std::fs::write(&regions_path, templates::REGIONS_YAML)?;
    println!("Generated region table: {}", regions_path.display());

    let router_path = output.join(format!("{}.yaml", router));
    let content = format!(
        "# {} configuration ({})\n# Generated by station2pkfwd gen-config\n\n{}",
        router,
        region.name(),
        templates::router_yaml(region)
    );
    std::fs::write(&router_path, content)?;
    println!("Generated router configuration: {}", router_path.display());
    Ok(())
}

fn cmd_validate(confdir: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match ConfigStore::load(confdir.as_slice()) {
        Ok(store) if !store.is_empty() => {
            println!("Configuration valid!");
            println!();
            println!("Regions: {}", store.regions().len());
            println!("Routers: {}", store.len());
            for id in store.router_ids() {
                if let Some(config) = store.get(&id) {
                    println!(
                        "  {} region {} ({}), gateway {:016X}, hwspec {}",
                        id,
                        config.region().name(),
                        config.region_id(),
                        config.gateway_id(),
                        config.hwspec()
                    );
                }
            }
            Ok(())
        }
        Ok(_) => {
            eprintln!("Configuration invalid: no router configuration found");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
