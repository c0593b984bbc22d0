//! Validated runtime settings built from CLI/env arguments.

use std::time::Duration;

use thiserror::Error;

use office_core::{ConflictPolicy, ReferenceZone, StoreResult};
use office_store::SqliteStore;

use crate::cli::{ConfigArgs, Feedback};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {name}: {detail}")]
    Invalid { name: &'static str, detail: String },
}

#[derive(Clone)]
pub struct Settings {
    token: Option<String>,
    application_id: Option<String>,
    guild_id: Option<String>,
    pub notify_channel: Option<String>,
    pub database_url: String,
    pub db_pool_size: usize,
    pub store_timeout: Duration,
    pub port: u16,
    pub sweep_interval: Duration,
    pub zone: ReferenceZone,
    pub policy: ConflictPolicy,
    pub feedback: Feedback,
}

impl Settings {
    pub fn from_args(args: &ConfigArgs) -> Result<Self, ConfigError> {
        let zone = ReferenceZone::from_hours(args.utc_offset_hours).ok_or_else(|| {
            ConfigError::Invalid {
                name: "UTC_OFFSET_HOURS",
                detail: format!("{} is outside -23..=23", args.utc_offset_hours),
            }
        })?;
        if args.db_pool_size == 0 {
            return Err(ConfigError::Invalid {
                name: "DB_POOL_SIZE",
                detail: "must be at least 1".to_string(),
            });
        }
        if args.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SWEEP_INTERVAL_SECS",
                detail: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            token: non_empty(args.token.as_deref()),
            application_id: non_empty(args.application_id.as_deref()),
            guild_id: non_empty(args.guild_id.as_deref()),
            notify_channel: non_empty(args.notify_channel.as_deref()),
            database_url: args.database_url.clone(),
            db_pool_size: args.db_pool_size,
            store_timeout: Duration::from_millis(args.store_timeout_ms.max(1)),
            port: args.port,
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            zone,
            policy: args.conflict_policy,
            feedback: args.feedback,
        })
    }

    pub fn token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or(ConfigError::Missing("DISCORD_TOKEN"))
    }

    pub fn application_id(&self) -> Result<&str, ConfigError> {
        self.application_id
            .as_deref()
            .ok_or(ConfigError::Missing("CLIENT_ID"))
    }

    pub fn guild_id(&self) -> Result<&str, ConfigError> {
        self.guild_id.as_deref().ok_or(ConfigError::Missing("GUILD_ID"))
    }

    /// Blocking: opens the pool and runs migrations.
    pub fn open_store(&self) -> StoreResult<SqliteStore> {
        SqliteStore::connect(&self.database_url, self.db_pool_size, self.store_timeout)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    fn args(extra: &[&str]) -> ConfigArgs {
        let mut argv = vec!["office-tracker"];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap().config
    }

    #[test]
    fn missing_token_is_reported_by_name() {
        let mut a = args(&[]);
        a.token = None;
        let settings = Settings::from_args(&a).unwrap();
        let err = settings.token().unwrap_err();
        assert_eq!(err.to_string(), "DISCORD_TOKEN is required");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let mut a = args(&[]);
        a.token = Some("   ".to_string());
        a.notify_channel = Some(String::new());
        let settings = Settings::from_args(&a).unwrap();
        assert!(settings.token().is_err());
        assert!(settings.notify_channel.is_none());
    }

    #[test]
    fn values_are_carried_over() {
        let a = args(&[
            "--token",
            "abc",
            "--notify-channel",
            "123",
            "--store-timeout-ms",
            "1500",
            "--utc-offset-hours",
            "0",
        ]);
        let settings = Settings::from_args(&a).unwrap();
        assert_eq!(settings.token().unwrap(), "abc");
        assert_eq!(settings.notify_channel.as_deref(), Some("123"));
        assert_eq!(settings.store_timeout, Duration::from_millis(1500));
        assert_eq!(settings.zone, ReferenceZone::from_hours(0).unwrap());
    }

    #[test]
    fn out_of_range_offset_is_invalid() {
        let mut a = args(&[]);
        a.utc_offset_hours = 30;
        assert!(matches!(
            Settings::from_args(&a),
            Err(ConfigError::Invalid { name: "UTC_OFFSET_HOURS", .. })
        ));
    }

    #[test]
    fn open_store_accepts_sqlite_url() {
        use office_core::OccupancyStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("office.db");
        let url = format!("sqlite://{}", path.display());
        let settings = Settings::from_args(&args(&["--database-url", &url, "--db-pool-size", "2"]))
            .unwrap();
        let store = settings.open_store().unwrap();
        assert_eq!(store.pool_size(), 2);
        assert!(store.entries().unwrap().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn zero_pool_is_invalid() {
        let mut a = args(&[]);
        a.db_pool_size = 0;
        assert!(Settings::from_args(&a).is_err());
    }
}
