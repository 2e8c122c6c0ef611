mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "recall-cli", about = "Spaced review scheduling from the command line", version)]
struct Cli {
    /// Path to a TOML config file (default: <config dir>/recall/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Learner whose data to use (overrides the config file)
    #[arg(long, global = true)]
    learner: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run a review session over due items (or the given items)
    Review {
        /// Comma-separated item ids to review instead of the due queue
        #[arg(long)]
        items: Option<String>,
        /// Maximum items taken from the due queue
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Comma-separated grades to apply in order instead of prompting
        #[arg(long)]
        grades: Option<String>,
    },

    /// List items that are due for review
    Due {
        /// Maximum results
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show the interval each grade would give an item
    Preview {
        /// Item id
        item: String,
    },

    /// Show the mastery indicator for a scope
    Mastery {
        /// Course or concept scope
        scope: String,
        /// JSON file of knowledge probabilities to store for the scope first
        #[arg(long)]
        import: Option<PathBuf>,
    },

    /// Inspect or drain the persistence outbox
    #[command(subcommand)]
    Outbox(OutboxCommand),
}

#[derive(Subcommand)]
enum OutboxCommand {
    /// Show pending and dead-lettered entries
    Status,
    /// Deliver pending entries to the store now
    Flush,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    let app = app::App::new(cli.config.as_deref(), cli.learner.as_deref())?;

    match cli.command {
        Command::Review { items, limit, grades } => {
            commands::review::run(&app, items.as_deref(), limit, grades.as_deref(), &cli.format, use_color)
                .await?;
        }
        Command::Due { limit } => {
            commands::due::run(&app, limit, &cli.format, use_color)?;
        }
        Command::Preview { item } => {
            commands::preview::run(&app, &item, &cli.format, use_color)?;
        }
        Command::Mastery { scope, import } => {
            commands::mastery::run(&app, &scope, import.as_deref(), &cli.format, use_color).await?;
        }
        Command::Outbox(subcmd) => match subcmd {
            OutboxCommand::Status => commands::outbox::run_status(&app, &cli.format)?,
            OutboxCommand::Flush => commands::outbox::run_flush(&app, &cli.format).await?,
        },
    }

    Ok(())
}
