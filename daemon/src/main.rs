use anyhow::Result;
use clap::Parser;
use pidwatch_daemon::{
    collector::PlatformService,
    config::Config,
    socket::serve_stdio,
    tools::ProcessTools,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pidwatchd", version, about = "List and terminate host processes over JSON lines")]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Unix socket to listen on
    #[arg(long, conflicts_with = "stdio")]
    socket: Option<PathBuf>,

    /// Serve a single session on stdin/stdout instead of a socket
    #[arg(long)]
    stdio: bool,
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The log level lives in the config, so report how loading went only
    // once the subscriber is installed.
    let config_path = args.config.clone().unwrap_or_else(Config::config_path);
    let loaded = config_path.exists().then(|| Config::load(&config_path));
    let config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => Config::default(),
    };
    init_logging(&config.general.log_level);
    info!("pidwatch daemon starting...");
    match loaded {
        Some(Ok(_)) => info!("Loaded config from {:?}", config_path),
        Some(Err(e)) => warn!("Failed to load config: {}, using defaults", e),
        None => info!("No config file found, using defaults"),
    }

    let service = Arc::new(PlatformService::new());
    let tools = Arc::new(ProcessTools::for_platform(service, &config));

    if args.stdio {
        serve_stdio(tools).await;
        return Ok(());
    }

    serve_socket(args.socket.or(config.general.socket_path), tools).await
}

#[cfg(unix)]
async fn serve_socket(
    path: Option<PathBuf>,
    tools: Arc<ProcessTools<PlatformService>>,
) -> Result<()> {
    use pidwatch_daemon::socket::SocketServer;

    let socket_path = path.unwrap_or_else(SocketServer::socket_path);
    let server = SocketServer::bind(&socket_path).await?;
    info!("Daemon ready, listening for connections...");

    tokio::select! {
        _ = server.serve(tools) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn serve_socket(
    _path: Option<PathBuf>,
    _tools: Arc<ProcessTools<PlatformService>>,
) -> Result<()> {
    anyhow::bail!("socket transport needs Unix domain sockets; run with --stdio")
}
