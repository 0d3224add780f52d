use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use reelvault::{config, server};

#[derive(Parser)]
#[command(name = "reelvault", version, about = "Self-hosted video delivery service")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Bind host, overriding the config file.
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overriding the config file.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Report which external tools were found.
    CheckTools,
    /// Load the config file and print validation warnings.
    Validate,
}

async fn start_server(
    config_path: Option<&std::path::Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = config::Config::load_or_default(config_path);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    tracing::info!("Starting reelvault server");

    // No torrent backend is linked into this binary; the download API
    // reports 503 until one is wired in behind the TransferEngine trait.
    let ctx = server::AppContext::new(config, None);
    if !ctx.downloads.has_engine() {
        tracing::warn!("no transfer engine available; download endpoints are disabled");
    }

    for tool in ctx.tools.check_all() {
        if tool.available {
            tracing::info!(tool = %tool.name, path = ?tool.path, "tool found");
        } else {
            tracing::warn!(tool = %tool.name, "tool not found; related features degrade");
        }
    }

    server::serve(ctx, addr).await
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::Config::load_or_default(config_path);
    let registry = reelvault_av::ToolRegistry::discover(&config.tools);

    for info in registry.check_all() {
        let status = if info.available { "ok" } else { "missing" };
        let version = info.version.as_deref().unwrap_or("-");
        println!("{:<10} {:<8} {}", info.name, status, version);
    }
    Ok(())
}

fn validate_config(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::Config::load_or_default(config_path);
    let warnings = config.validate();
    if warnings.is_empty() {
        println!("config ok");
    } else {
        for w in &warnings {
            println!("warning: {w}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelvault=trace,reelvault_av=trace,reelvault_torrent=trace,tower_http=debug".to_string()
        } else {
            "reelvault=debug,reelvault_av=debug,reelvault_torrent=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(cli.config.as_deref(), host, port))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate => validate_config(cli.config.as_deref()),
    }
}
