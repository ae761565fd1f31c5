//! Binary entrypoint for the crawlgate CLI.
//!
//! Commands:
//! - `init` - write a starter `crawlgate.toml`
//! - `catalogue` - print the capability catalogue as JSON
//! - `smoketest [--start]` - log in, list games, optionally start one and print its state
//! - `act <name[=json]>...` - start a game and run capabilities in order, printing each response
//!
//! See the library crate docs for module-level details: `crawlgate::`.
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::Value;

use crawlgate::capability::Capabilities;
use crawlgate::client::CrawlClient;
use crawlgate::config::Config;
use crawlgate::game::view;

#[derive(Parser)]
#[command(name = "crawlgate")]
#[command(about = "Gated client for Dungeon Crawl Stone Soup webtiles servers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "crawlgate.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Print the capability catalogue as JSON
    Catalogue,
    /// Connect, log in and list the server's games
    Smoketest {
        /// Also start a game and print the initial state
        #[arg(long)]
        start: bool,
    },
    /// Start a game and run capabilities, e.g. `get_stats move='{"direction":"n"}'`
    Act {
        /// Capability calls in order: `name` or `name=<json params>`
        #[arg(required = true)]
        steps: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            if std::path::Path::new(&cli.config).exists() {
                warn!("{} already exists; not overwriting", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Wrote default configuration to {}", cli.config);
            println!("Created {}. Edit [server] before connecting.", cli.config);
        }
        Commands::Catalogue => {
            println!("{}", serde_json::to_string_pretty(Capabilities::catalogue())?);
        }
        Commands::Smoketest { start } => {
            let config = load_config(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting crawlgate v{}", env!("CARGO_PKG_VERSION"));
            let client = CrawlClient::connect(config).await?;
            println!("Logged in. Games offered: {}", client.game_ids().join(", "));
            let outcome = if start {
                match client.start_game().await {
                    Ok(game) => {
                        if game.resumed {
                            println!("(resumed an existing save)");
                        }
                        let session = client.session().read().await;
                        println!("{}", view::state_text(&session));
                        Ok(())
                    }
                    Err(e) => Err(anyhow!("start_game failed: {}", e)),
                }
            } else {
                Ok(())
            };
            client.teardown().await;
            outcome?;
        }
        Commands::Act { steps } => {
            let calls = steps
                .iter()
                .map(|step| parse_step(step))
                .collect::<Result<Vec<_>>>()?;
            let config = load_config(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let client = CrawlClient::connect(config).await?;
            if let Err(e) = client.start_game().await {
                client.teardown().await;
                return Err(anyhow!("start_game failed: {}", e));
            }
            for (name, params) in calls {
                let response = client.capabilities().invoke(&name, &params).await;
                println!("{}", serde_json::to_string_pretty(&response)?);
                if response.state_snapshot.is_ended {
                    info!("Session ended; skipping remaining steps");
                    break;
                }
            }
            client.teardown().await;
        }
    }

    Ok(())
}

/// Missing config file falls back to defaults plus environment overrides.
async fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        return Config::load(path).await;
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    config.validate().context("default configuration is invalid")?;
    Ok(config)
}

fn parse_step(step: &str) -> Result<(String, Value)> {
    match step.split_once('=') {
        Some((name, json)) => {
            let params: Value = serde_json::from_str(json)
                .with_context(|| format!("invalid JSON parameters for {}", name))?;
            Ok((name.to_string(), params))
        }
        None => Ok((step.to_string(), Value::Null)),
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|path| std::fs::OpenOptions::new().create(true).append(true).open(path).ok());
    if let Some(f) = log_file {
        let file = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
