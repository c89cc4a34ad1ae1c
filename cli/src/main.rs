use clap::{Parser, Subcommand};
use delve_cli::{commands, logging};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Dungeon instance engine tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate settings and dungeon types
    CheckConfig {
        #[arg(short, long)]
        settings: Option<PathBuf>,
        #[arg(short, long)]
        dungeons: Option<PathBuf>,
    },
    /// Inspect or clean the instance store
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
    /// Run one instance end to end against an in-memory world
    Simulate {
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(short, long, default_value_t = 1)]
        party: usize,
        #[arg(short, long)]
        settings: Option<PathBuf>,
        #[arg(short, long)]
        dungeons: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    Show {
        #[arg(long)]
        data: Option<PathBuf>,
    },
    Cleanup {
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long, default_value = "24h")]
        max_age: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _log_guard = logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::CheckConfig { settings, dungeons } => commands::check_config(settings, dungeons),
        Commands::Store { action } => match action {
            StoreAction::Show { data } => commands::store_show(data),
            StoreAction::Cleanup { data, max_age } => commands::store_cleanup(data, &max_age),
        },
        Commands::Simulate {
            seed,
            party,
            settings,
            dungeons,
        } => commands::simulate(settings, dungeons, seed, party),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
