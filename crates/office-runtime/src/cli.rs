//! CLI definition using clap derive. Every option can also come from the
//! process environment.

use clap::{Args, Parser, Subcommand, ValueEnum};

use office_core::ConflictPolicy;

#[derive(Parser)]
#[command(name = "office-tracker", about = "Discord bot tracking who is in the office")]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the bot: gateway session, reconciliation sweep and health endpoint (default)
    Run,
    /// Register the setup-office / remove-office guild commands
    RegisterCommands,
    /// Print the panel as it would currently render
    Status,
    /// Print the most recent closed entries
    History(HistoryOpts),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct HistoryOpts {
    /// Number of entries to show
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,
}

/// How much direct feedback users get for their own actions.
#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    /// Acknowledge silently; only "already registered" / "not registered" are answered.
    #[default]
    Quiet,
    /// Reply to every action, including ignored malformed times.
    Verbose,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Bot token
    #[arg(long, env = "DISCORD_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Application id (for register-commands)
    #[arg(long, env = "CLIENT_ID", global = true)]
    pub application_id: Option<String>,

    /// Guild id (for register-commands)
    #[arg(long, env = "GUILD_ID", global = true)]
    pub guild_id: Option<String>,

    /// Channel receiving transition notifications (disabled when unset)
    #[arg(long, env = "NOTIFY_CHANNEL_ID", global = true)]
    pub notify_channel: Option<String>,

    /// SQLite database path, `sqlite://path` or `:memory:`
    #[arg(long, env = "DATABASE_URL", default_value = "office.db", global = true)]
    pub database_url: String,

    /// Pooled store connections
    #[arg(long, env = "DB_POOL_SIZE", default_value = "5", global = true)]
    pub db_pool_size: usize,

    /// Upper bound on any single store call, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "20000", global = true)]
    pub store_timeout_ms: u64,

    /// Health endpoint port
    #[arg(long, env = "PORT", default_value = "10000", global = true)]
    pub port: u16,

    /// Reconciliation sweep period in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "60", global = true)]
    pub sweep_interval_secs: u64,

    /// Reference time zone, hours east of UTC
    #[arg(
        long,
        env = "UTC_OFFSET_HOURS",
        default_value = "9",
        allow_negative_numbers = true,
        global = true
    )]
    pub utc_offset_hours: i32,

    /// Re-registration policy: reject or replace
    #[arg(long, env = "CONFLICT_POLICY", default_value = "reject", value_parser = parse_policy, global = true)]
    pub conflict_policy: ConflictPolicy,

    /// User-facing acknowledgement verbosity
    #[arg(long, env = "FEEDBACK", value_enum, default_value_t = Feedback::Quiet, global = true)]
    pub feedback: Feedback,
}

fn parse_policy(s: &str) -> Result<ConflictPolicy, String> {
    s.parse().map_err(|e: office_core::EngineError| e.to_string())
}
