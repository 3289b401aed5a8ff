use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use chatcast_config::ChatcastConfig;

#[derive(Parser)]
#[command(name = "chatcast", about = "Chatcast, a real-time chat broadcaster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of discovering one.
    #[arg(long, global = true, env = "CHATCAST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the broadcaster.
    Serve {
        /// Override `server.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the newest stored messages, one JSON object per line.
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ChatcastConfig> {
    match &cli.config {
        Some(path) => chatcast_config::load_config(path)
            .with_context(|| format!("invalid config {}", path.display())),
        None => Ok(chatcast_config::discover_and_load()),
    }
}

async fn print_history(config: &ChatcastConfig, limit: usize) -> anyhow::Result<()> {
    let store = chatcast_store::open_store(&config.store).await?;
    for message in store.recent(limit).await? {
        println!("{}", message.encode()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "chatcast starting");

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            chatcast_gateway::server::start_gateway(&config).await
        },
        Commands::History { limit } => print_history(&config, limit).await,
    }
}
