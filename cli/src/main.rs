use clap::{Parser, Subcommand};
use tempo_cli::{CliContext, commands, logging};
use tempo_core::TempoConfigExt;
use tempo_types::TempoConfig;

#[derive(Parser)]
#[command(version, about = "Round timing and notification driver")]
struct Cli {
    /// Run on virtual time instead of the wall clock
    #[arg(long, global = true)]
    instant: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one countdown with the console renderer
    Round {
        #[arg(short, long, default_value_t = 3.0)]
        duration: f64,
    },
    /// Run a between-rounds cooldown
    Cooldown {
        #[arg(short, long)]
        duration: Option<f64>,
        /// Skip the cooldown after this many seconds
        #[arg(long)]
        skip_after: Option<f64>,
        /// Drive a battle machine instead of broadcasting readiness
        #[arg(long)]
        orchestrated: bool,
    },
    /// Show a burst of notifications
    Notify {
        #[arg(short, long, default_value_t = 5)]
        count: u32,
    },
    /// Wait for the opponent prompt
    Prompt {
        #[arg(long, default_value_t = 0.0)]
        delay: f64,
        #[arg(long, default_value_t = 0.0)]
        min_visible: f64,
        #[arg(long)]
        buffer: Option<f64>,
        /// Publish the host timestamp after this many milliseconds
        #[arg(long)]
        timestamp_after: Option<f64>,
        /// Broadcast prompt readiness after this many milliseconds
        #[arg(long)]
        ready_after: Option<f64>,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    let _guard = logging::init(cli.instant);
    let config = TempoConfig::load_or_default();

    if let Commands::Config = cli.command {
        commands::show_config(&config);
        return Ok(());
    }

    let ctx = CliContext::new(config, cli.instant);
    tracing::debug!(instant = ctx.is_instant(), "running command");

    // Timeouts are spawned with `spawn_local`
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            match cli.command {
                Commands::Round { duration } => commands::round(&ctx, duration).await,
                Commands::Cooldown {
                    duration,
                    skip_after,
                    orchestrated,
                } => {
                    let duration = duration.unwrap_or(ctx.config.cooldown.duration_secs);
                    commands::cooldown(&ctx, duration, skip_after, orchestrated).await
                }
                Commands::Notify { count } => commands::notify(&ctx, count).await,
                Commands::Prompt {
                    delay,
                    min_visible,
                    buffer,
                    timestamp_after,
                    ready_after,
                } => {
                    commands::prompt(&ctx, delay, min_visible, buffer, timestamp_after, ready_after)
                        .await
                }
                Commands::Config => Ok(()),
            }
        })
        .await
}
