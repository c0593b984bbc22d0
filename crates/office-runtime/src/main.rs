//! office-tracker: Discord bot tracking who is currently in the office.
//! Single process: gateway session, interaction handlers, reconciliation
//! sweep and a health endpoint.

use clap::Parser;

mod bot;
mod cli;
mod cmd_history;
mod cmd_register;
mod cmd_status;
mod config;
mod context;
mod handlers;
mod notify;
mod panel;
mod platform;
mod server;
mod sweep;
mod sync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("OFFICE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let settings = config::Settings::from_args(&args.config)?;

    match args.command.unwrap_or(cli::Command::Run) {
        cli::Command::Run => bot::run_bot(&settings).await?,
        cli::Command::RegisterCommands => cmd_register::cmd_register(&settings).await?,
        cli::Command::Status => cmd_status::cmd_status(&settings).await?,
        cli::Command::History(opts) => cmd_history::cmd_history(&settings, opts.limit).await?,
    }

    Ok(())
}
