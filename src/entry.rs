use clap::{CommandFactory, FromArgMatches};

use crate::agent::run_agent;
use crate::args::{Command, LoadFleetArgs};
use crate::config::load_config;
use crate::error::AppResult;
use crate::fleet::{run_set, run_start, run_status, run_stop};

pub(crate) fn run() -> AppResult<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    crate::logger::init_logging(args.verbose, args.no_color);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_async(args))
}

/// Parses the command line. Prints usage and returns `None` when no
/// subcommand was given.
fn parse_args() -> AppResult<Option<LoadFleetArgs>> {
    let mut cmd = LoadFleetArgs::command();
    let matches = cmd.clone().get_matches();
    let args = LoadFleetArgs::from_arg_matches(&matches)?;

    if args.command.is_none() {
        cmd.print_help()?;
        println!();
        return Ok(None);
    }
    Ok(Some(args))
}

async fn run_async(args: LoadFleetArgs) -> AppResult<()> {
    let Some(command) = args.command else {
        return Ok(());
    };
    let config_path = args.config.as_deref();
    match command {
        Command::Agent(agent_args) => run_agent(agent_args).await,
        Command::Start(start_args) => run_start(&load_config(config_path)?, start_args).await,
        Command::Stop(stop_args) => run_stop(&load_config(config_path)?, stop_args).await,
        Command::Status(status_args) => run_status(&load_config(config_path)?, status_args).await,
        Command::Set(set_args) => run_set(&load_config(config_path)?, set_args).await,
    }
}
