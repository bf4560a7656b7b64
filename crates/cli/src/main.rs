use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wxbot")]
#[command(about = "MAX weather webhook bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook server. Requires a bot secret (BOT_SECRET env or bot.secret in the config file).
    Serve {
        /// Config file path (default: BOT_CONFIG_PATH or ./wxbot.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Listen port (overrides BOT_PORT and the config file; default 8443)
        #[arg(long, short)]
        port: Option<u16>,

        /// Bind host (overrides BOT_HOST and the config file; default 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
    },

    /// Look up the weather for a place and print the reply text (one-off check, no server).
    Weather {
        /// Place name, as a user would type it
        place: String,

        /// Use the multi-field detailed format instead of the one-line summary
        #[arg(long, short)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("wxbot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port, host }) => {
            if let Err(e) = run_serve(config, port, host).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Weather { place, detailed }) => {
            run_weather(place, detailed).await;
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Resolve config path: flag, then BOT_CONFIG_PATH env, then ./wxbot.json.
fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var("BOT_CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("wxbot.json"))
}

/// Precedence for server settings: CLI flag > env > config file > default.
async fn run_serve(
    config: Option<PathBuf>,
    port: Option<u16>,
    host: Option<String>,
) -> anyhow::Result<()> {
    let path = config_path(config);
    let mut config = lib::config::Config::load(&path)?;
    config.server.port = port.unwrap_or_else(|| lib::config::resolve_port(&config));
    config.server.host = host.unwrap_or_else(|| lib::config::resolve_host(&config));
    log::info!("starting server on {}:{}", config.server.host, config.server.port);
    lib::server::run_server(config).await
}

async fn run_weather(place: String, detailed: bool) {
    let detail = if detailed {
        lib::weather::DetailLevel::Detailed
    } else {
        lib::weather::DetailLevel::Short
    };
    let client = lib::weather::WeatherClient::new(None);
    let result = client.fetch(&place, detail).await;
    println!("{}", lib::webhook::weather_reply(result));
}
