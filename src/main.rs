mod cli;
mod commands;
mod config;
mod model;
mod server;
mod storage;
mod view;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deadline_board=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();
    let command = args.command.unwrap_or(cli::Command::Serve {
        bind: None,
        port: None,
    });
    let config = config::Config::load(args.config.as_deref())?;
    match command {
        cli::Command::Serve { bind, port } => {
            commands::serve(config.with_overrides(args.data_dir, bind, port)).await
        }
        cli::Command::List { year } => {
            commands::list(&config.with_overrides(args.data_dir, None, None), year)
        }
        cli::Command::Add {
            program,
            deadline,
            name,
        } => commands::add(
            &config.with_overrides(args.data_dir, None, None),
            program,
            deadline,
            name,
        ),
        cli::Command::Reschedule { file, deadline } => commands::reschedule(
            &config.with_overrides(args.data_dir, None, None),
            file,
            deadline,
        ),
    }
}
