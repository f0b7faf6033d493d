use crate::demo::{run_demo, run_matching_repair, run_matching_run, DemoArgs, MatchingRepairArgs, MatchingRunArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use philip_sophy::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Philip & Sophy Matching Service",
    about = "Run and operate the daily profile-book matching pipeline from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Offline matching operations over an exported cohort snapshot
    Matching {
        #[command(subcommand)]
        command: MatchingCommand,
    },
    /// Run an end-to-end CLI demo over a generated sample cohort
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum MatchingCommand {
    /// Run the random matching policy for one target date
    Run(MatchingRunArgs),
    /// Restore a date's stored result from its confirmation-time backup
    Repair(MatchingRepairArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Cohort snapshot JSON file(s) to preload into the in-memory store
    #[arg(long)]
    pub(crate) snapshot: Vec<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Matching {
            command: MatchingCommand::Run(args),
        } => run_matching_run(args),
        Command::Matching {
            command: MatchingCommand::Repair(args),
        } => run_matching_repair(args),
        Command::Demo(args) => run_demo(args),
    }
}
