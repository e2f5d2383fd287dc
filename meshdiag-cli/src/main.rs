#![forbid(unsafe_code)]

//! Mesh daemon diagnostics tool.
//!
//! Implements ping, route, dump, peers, log and kill subcommands against the
//! daemon's admin interface.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use meshdiag_core::admin::{AdminConnection, LogFilter};
use meshdiag_core::ping::PingState;
use meshdiag_core::table::{self, SortKey};
use meshdiag_core::{
    direct_peers, fetch_table_until, logs, AdminCredentials, MeshConfig, MeshError, Pinger, Route, Target,
};

mod admin_client;
mod bencode;
mod render;

use admin_client::UdpAdmin;
use render::OutputFormat;

const CONFIG_ENV: &str = "MESHDIAG_CONFIG";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tool configuration file (TOML). Falls back to $MESHDIAG_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Daemon configuration file holding the admin credentials
    #[arg(short = 'f', long = "file")]
    admin_file: Option<PathBuf>,

    /// Verbose diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send probes to a node and print round-trip statistics
    Ping {
        /// IPv6 address or route label of the node
        target: String,
        /// Time in milliseconds the daemon waits for each reply
        #[arg(short = 't', long)]
        timeout: Option<u64>,
        /// Number of probes to send (0 or absent: until interrupted)
        #[arg(short = 'c', long)]
        count: Option<u32>,
        /// Pause between probes in milliseconds
        #[arg(short = 'i', long)]
        interval: Option<u64>,
    },
    /// Print all routes to an IP, or the IP behind a route label
    Route {
        /// IPv6 address or route label
        target: String,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Print the routing table
    Dump {
        /// Include routes with zero link quality
        #[arg(short, long)]
        all: bool,
        #[arg(short, long, value_enum, default_value = "none")]
        sort: SortArg,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Find the direct peers of a node from the routing table
    Peers {
        /// IPv6 address or route label of the node
        target: String,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Stream the daemon log until interrupted
    Log {
        /// Minimum log level
        #[arg(short = 'l', long)]
        level: Option<String>,
        /// Only lines from this daemon source file
        #[arg(long = "logfile")]
        file: Option<String>,
        /// Only this source line
        #[arg(long)]
        line: Option<u32>,
    },
    /// Ask the daemon to exit and wait until it stops answering
    Kill,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    None,
    Ip,
    Path,
    Link,
}

impl From<SortArg> for SortKey {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::None => SortKey::None,
            SortArg::Ip => SortKey::Ip,
            SortArg::Path => SortKey::Path,
            SortArg::Link => SortKey::Link,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    if let Some(path) = &cli.admin_file {
        config.admin_file = path.clone();
    }
    init_tracing(&config, cli.verbose);

    // Setup signal handler for graceful shutdown
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trip.cancel();
        }
    });

    match cli.command {
        Commands::Ping { target, timeout, count, interval } => {
            let target = Target::parse(&target)?;
            let mut ping = config.ping.clone();
            if let Some(t) = timeout {
                ping.timeout_ms = t;
            }
            if count.is_some() {
                ping.count = count;
            }
            if let Some(i) = interval {
                ping.interval_ms = i;
            }
            let mut conn = connect(&config, &cancel).await?;
            cmd_ping(&mut conn, &target, ping, &cancel).await
        }
        Commands::Route { target, format } => {
            let target = Target::parse(&target)?;
            let mut conn = connect(&config, &cancel).await?;
            let table = load_table(&mut conn, &cancel).await?;
            render::routes(&table::routes_to(&table, &target), format)
        }
        Commands::Dump { all, sort, format } => {
            let mut conn = connect(&config, &cancel).await?;
            let table = load_table(&mut conn, &cancel).await?;
            render::routes(&table::listing(&table, all, sort.into()), format)
        }
        Commands::Peers { target, format } => {
            let target = Target::parse(&target)?;
            let mut conn = connect(&config, &cancel).await?;
            let table = load_table(&mut conn, &cancel).await?;
            cmd_peers(&table, &target, format)
        }
        Commands::Log { level, file, line } => {
            let mut filter: LogFilter = config.log.clone().into();
            if let Some(l) = level {
                filter.level = l;
            }
            if let Some(f) = file {
                filter.file = f;
            }
            if let Some(l) = line {
                filter.line = l;
            }
            let mut conn = connect(&config, &cancel).await?;
            let n = logs::follow(&mut conn, &filter, &cancel, render::log_line).await?;
            debug!(lines = n, "log stream closed");
            Ok(())
        }
        Commands::Kill => {
            let mut conn = connect(&config, &cancel).await?;
            cmd_kill(&mut conn, &cancel).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<MeshConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(p) => MeshConfig::load(&p).with_context(|| format!("loading {}", p.display())),
        None => Ok(MeshConfig::default()),
    }
}

fn init_tracing(config: &MeshConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")?,
    );
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

async fn connect(config: &MeshConfig, cancel: &CancellationToken) -> Result<UdpAdmin> {
    let creds = AdminCredentials::from_file(&config.admin_file)
        .with_context(|| format!("reading admin credentials from {}", config.admin_file.display()))?;
    let spinner = spinner(&format!("Connecting to daemon at {}", creds.bind))?;
    let conn = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MeshError::Cancelled),
        conn = UdpAdmin::connect(&creds) => conn,
    };
    spinner.finish_and_clear();
    let conn = conn.with_context(|| format!("unable to connect to daemon at {}", creds.bind))?;
    info!(bind = %creds.bind, "connected");
    Ok(conn)
}

async fn load_table(conn: &mut UdpAdmin, cancel: &CancellationToken) -> Result<Vec<Route>> {
    let spinner = spinner("Fetching routing table")?;
    let table = fetch_table_until(conn, cancel).await;
    spinner.finish_and_clear();
    Ok(table?)
}

async fn cmd_ping(conn: &mut UdpAdmin, target: &Target, config: meshdiag_core::PingConfig, cancel: &CancellationToken) -> Result<()> {
    let mut pinger = Pinger::new(target.wire_form(), config);
    let run = pinger.run(conn, cancel, render::probe_line).await;

    println!();
    println!("{}", run.summary);
    if run.state == PingState::Stopped && run.error.is_none() {
        debug!("ping interrupted");
    }
    match run.error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn cmd_peers(table: &[Route], target: &Target, format: OutputFormat) -> Result<()> {
    let label = match target {
        Target::Ip(ip) => ip.clone(),
        Target::Path(path) => match table::routes_to(table, target).first() {
            Some(r) if !r.ip.is_empty() => format!("{path} ({})", r.ip),
            _ => path.to_string(),
        },
    };
    if format != OutputFormat::Json {
        println!("Finding all direct peers of {}", style(label).bold());
    }
    let peers = direct_peers(table, target);
    let rows: Vec<&Route> = peers.iter().collect();
    render::routes(&rows, format)
}

async fn cmd_kill(conn: &mut UdpAdmin, cancel: &CancellationToken) -> Result<()> {
    conn.exit().await?;
    println!("daemon is shutting down...");
    loop {
        let alive = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            alive = conn.is_alive(1000) => alive?,
        };
        if !alive {
            println!("{}", style("daemon stopped").green());
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}
