//! repeat-bot CLI entry point.
//!
//! This is the main binary for repeat-bot.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repeat_bot::channels::{ConsoleDelivery, ConsoleReporter, DiscordBot};
use repeat_bot::config::{AppConfig, LoggingConfig};
use repeat_bot::error::DeliveryError;
use repeat_bot::{RepeatController, RunKey, StartRequest};

/// Chat bot that repeats a message into a channel.
#[derive(Parser)]
#[command(name = "repeat-bot")]
#[command(about = "Repeat a message into a channel, with stop and rate-limit backoff.")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "~/.repeat-bot/config.json")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and serve the slash commands
    Run {
        /// Bot token (overrides the config file)
        #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Application ID (overrides the config file)
        #[arg(long, env = "CLIENT_ID")]
        application_id: Option<u64>,

        /// Do not register the slash commands on startup
        #[arg(long)]
        no_register: bool,
    },

    /// Run the repeat loop against the console instead of a chat platform
    Simulate {
        /// Message to repeat
        message: String,

        /// Number of sends
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u32,

        /// Destination shown in the output
        #[arg(short, long, default_value = "general")]
        destination: String,

        /// Initiator shown in the output
        #[arg(short, long, default_value = "me")]
        user: String,

        /// Interval between sends in milliseconds (overrides the config file)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Fail the Nth attempt with a generic error
        #[arg(long)]
        fail_at: Option<usize>,

        /// Fail the Nth attempt with a permission error
        #[arg(long)]
        deny_at: Option<usize>,

        /// Rate-limit the Nth attempt for one second
        #[arg(long)]
        throttle_at: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current config
    Show,

    /// Validate config
    Validate,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let log_level = if verbose { "debug".to_string() } else { config.level.clone() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_level.into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default(&cli.config)?;

    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Run {
            token,
            application_id,
            no_register,
        } => {
            if let Some(token) = token {
                config.discord.token = token;
            }
            if let Some(id) = application_id {
                config.discord.application_id = id;
            }
            if no_register {
                config.discord.register_commands = false;
            }
            config.validate()?;

            tracing::info!("Starting repeat-bot {}", repeat_bot::VERSION);
            DiscordBot::new(config.discord, config.controller).run().await?;
        }

        Commands::Simulate {
            message,
            count,
            destination,
            user,
            interval_ms,
            fail_at,
            deny_at,
            throttle_at,
        } => {
            if let Some(ms) = interval_ms {
                config.controller.interval_ms = ms;
            }
            config.validate()?;

            let mut delivery = ConsoleDelivery::new();
            if let Some(n) = fail_at {
                delivery = delivery.with_fault(n, DeliveryError::Other("injected failure".to_string()));
            }
            if let Some(n) = deny_at {
                delivery = delivery.with_fault(
                    n,
                    DeliveryError::PermissionDenied("Missing Permissions".to_string()),
                );
            }
            if let Some(n) = throttle_at {
                delivery = delivery.with_fault(
                    n,
                    DeliveryError::RateLimited {
                        retry_after: Some(Duration::from_secs(1)),
                    },
                );
            }

            let controller = RepeatController::new(config.controller, Arc::new(delivery))?;
            let key = RunKey::new(user, destination);
            let handle = controller.start(
                StartRequest::new(key.clone(), message, count),
                Arc::new(ConsoleReporter),
            )?;

            // Ctrl-C acts as the stop command.
            let registry = controller.registry().clone();
            let stopper = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    registry.cancel(&key);
                }
            });

            let report = handle.join().await?;
            stopper.abort();

            println!();
            println!("Sent:    {}/{}", report.sent, report.target);
            println!("Exit:    {:?}", report.exit);
            println!("Retries: {}", report.rate_limit_retries);
        }

        Commands::Config { action } => match action {
            ConfigCommands::Show => {
                let mut shown = config.clone();
                if !shown.discord.token.is_empty() {
                    shown.discord.token = "********".to_string();
                }
                println!("Config path: {:?}", cli.config);
                println!("{}", serde_json::to_string_pretty(&shown)?);
            }
            ConfigCommands::Validate => {
                println!("Validating config...");
                config.validate()?;
                match config.discord.validate() {
                    Ok(()) => println!("✓ Config is valid"),
                    Err(e) => println!("✓ Config is valid ({}; set DISCORD_TOKEN to run the bot)", e),
                }
            }
            ConfigCommands::Init { force } => {
                let path = repeat_bot::config::expand_path(&cli.config);
                if path.exists() && !force {
                    println!("{} already exists (use --force to overwrite)", path.display());
                } else {
                    AppConfig::default().save(&path)?;
                    println!("Wrote default config to {}", path.display());
                }
            }
        },
    }

    Ok(())
}
