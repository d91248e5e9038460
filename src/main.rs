use clap::{Parser, Subcommand};
use ndproxy::clock::MonotonicClock;
use ndproxy::config::{self, Config, Overrides};
use ndproxy::dataplane::{Dispatcher, Fdb, Lifecycle, PendingQueries, Relay, RelayConfig};
use ndproxy::port::{interface_mac, InterfacePort, PortId, PortMap};
use ndproxy::protocol::{LinkAddr, MacAddr};
use ndproxy::telemetry::{init_logging, ProxyStats};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "ndproxy.toml";

#[derive(Parser)]
#[command(name = "ndproxy")]
#[command(about = "IPv6 Neighbor Discovery proxy between a WAN and a LAN interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy
    Run {
        /// Path to config file (defaults to ndproxy.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// LAN interface
        #[arg(short = 'l', long)]
        lan: Option<String>,

        /// WAN interface
        #[arg(short = 'w', long)]
        wan: Option<String>,

        /// Maximum neighbor table entries
        #[arg(long)]
        max_entries: Option<u32>,

        /// Seconds before an unseen neighbor is forgotten
        #[arg(long)]
        aging_time: Option<u64>,

        /// Seconds between maintenance passes
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Validate a config file without starting the proxy
    CheckConfig {
        /// Path to config file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            lan,
            wan,
            max_entries,
            aging_time,
            timeout,
        } => {
            let overrides = Overrides {
                lan,
                wan,
                max_entries,
                aging_time,
                idle_timeout: timeout,
            };
            cmd_run(config.as_deref(), &overrides)
        }
        Commands::CheckConfig { config } => cmd_check_config(&config),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => config::load(path)
            .map_err(|e| format!("Failed to load {}: {}", path.display(), e)),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load(DEFAULT_CONFIG)
            .map_err(|e| format!("Failed to load {}: {}", DEFAULT_CONFIG, e)),
        None => Ok(Config::default()),
    }
}

fn cmd_check_config(path: &Path) -> Result<(), String> {
    let config = load_config(Some(path))?;
    let result = config::validate(&config);
    result.print_diagnostics();

    if result.has_errors() {
        return Err(format!(
            "{} has {} error(s)",
            path.display(),
            result.errors.len()
        ));
    }
    println!("{} is valid", path.display());
    Ok(())
}

/// The link-layer address the proxy advertises on `port`
fn resolve_link_addr(config: &Config, port: PortId) -> Result<LinkAddr, String> {
    let mac = match config.interfaces.link_addr(port) {
        Some(addr) => addr
            .parse::<MacAddr>()
            .map_err(|e| format!("Invalid {} link address {:?}: {}", port, addr, e))?,
        None => {
            let name = config.interfaces.name(port);
            interface_mac(name)
                .map_err(|e| format!("Failed to read MAC address of {}: {}", name, e))?
        }
    };
    Ok(mac.into())
}

fn cmd_run(path: Option<&Path>, overrides: &Overrides) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let mut config = load_config(path)?;
    overrides.apply(&mut config);

    // RUST_LOG still takes priority over the [log] section
    init_logging(Some(&config.log));

    let validation = config::validate(&config);
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if validation.has_errors() {
        validation.print_diagnostics();
        return Err("invalid configuration".to_string());
    }

    let link_addrs = PortMap::new(
        resolve_link_addr(&config, PortId::Lan)?,
        resolve_link_addr(&config, PortId::Wan)?,
    );

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let mut sockets = Vec::with_capacity(2);
        for port in PortId::ALL {
            let name = config.interfaces.name(port);
            info!("Binding {} to interface {}...", port, name);
            let socket = InterfacePort::bind(name).map_err(|e| {
                format!(
                    "Failed to bind to {}: {}. Run with root privileges.",
                    name, e
                )
            })?;
            info!(
                "  {} configured: ifindex={}, link address={}",
                name,
                socket.ifindex(),
                link_addrs[port]
            );
            sockets.push(socket);
        }
        let (Some(wan), Some(lan)) = (sockets.pop(), sockets.pop()) else {
            return Err("Failed to bind interfaces".to_string());
        };

        let stats = Arc::new(ProxyStats::new());
        let fdb = Fdb::new(
            config.proxy.max_entries,
            config.proxy.aging_time(),
            Arc::new(MonotonicClock),
        );
        let pending = PendingQueries::with_capacity(
            config.proxy.pending_timeout(),
            config.proxy.pending_retries,
            config.proxy.max_pending,
        );
        let relay = Relay::new(
            RelayConfig {
                link_addrs,
                relay_router_discovery: config.router_discovery.relay,
                set_proxy_flag: config.router_discovery.set_proxy_flag,
                probe_stale: config.proxy.probe_stale,
            },
            fdb,
            pending,
            stats,
        );

        let mut dispatcher = Dispatcher::new(
            PortMap::new(lan, wan),
            relay,
            config.multicast.groups(),
            config.proxy.idle_timeout(),
        );

        info!(
            "ndproxy started: max_entries={}, aging_time={}s, idle_timeout={}s",
            config.proxy.max_entries, config.proxy.aging_time, config.proxy.idle_timeout
        );

        let lifecycle = Lifecycle::new();
        tokio::spawn(shutdown_on_signal(lifecycle.clone()));

        dispatcher
            .run(&lifecycle)
            .await
            .map_err(|e| format!("Proxy stopped: {}", e))
    })
}

/// Request shutdown on SIGINT or SIGTERM
async fn shutdown_on_signal(lifecycle: Lifecycle) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            None
        }
    };

    let sigterm = async {
        match terminate.as_mut() {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    let sigint = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = sigint => {
            info!("Received SIGINT");
        }
        _ = sigterm => {
            info!("Received SIGTERM");
        }
    }

    lifecycle.request_shutdown();
}
