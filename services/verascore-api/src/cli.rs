use crate::configs::{run_configs_list, run_configs_validate, ConfigsArgs};
use crate::demo::{run_demo, run_score, DemoArgs, ScoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use verascore::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "VeraScore",
    about = "Score securities against configurable factor and persona definitions",
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
    /// Score one security from a universe file
    Score(ScoreArgs),
    /// Inspect or validate scoring definitions
    Configs {
        #[command(subcommand)]
        command: ConfigsCommand,
    },
    /// Score the bundled demo universe under every persona
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ConfigsCommand {
    /// List loaded factors and personas
    List(ConfigsArgs),
    /// Validate definitions and report every issue found
    Validate(ConfigsArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Score(args) => run_score(args),
        Command::Configs {
            command: ConfigsCommand::List(args),
        } => run_configs_list(args),
        Command::Configs {
            command: ConfigsCommand::Validate(args),
        } => run_configs_validate(args),
        Command::Demo(args) => run_demo(args),
    }
}
