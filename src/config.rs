use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;

use crate::cli::Cli;
use crate::error::{ReminderError, Result};
use crate::service::event_cache::DispatchPolicy;
use crate::service::notifier::{DEFAULT_ICON, NotifierKind};
use crate::service::reminder_message::DisplayConfig;
use crate::service::session_store::DEFAULT_TOKEN_FILE;
use crate::tasks::scheduler::SchedulerConfig;

const ENV_PREFIX: &str = "CALENDAR_REMINDER_";

pub const DEFAULT_PORT: u16 = 5500;
pub const DEFAULT_TENANT: &str = "common";
pub const DEFAULT_TIME_FORMAT: &str = "%-I:%M%p";
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";
pub const DEFAULT_TICKER_SECONDS: u64 = 30;
pub const DEFAULT_REFRESH_MINUTES: u64 = 15;
pub const DEFAULT_LOOK_AHEAD_MINUTES: u64 = 60;

const MIN_TICKER_SECONDS: u64 = 30;
const MAX_TICKER_SECONDS: u64 = 24 * 60 * 60;
const MIN_REFRESH_MINUTES: u64 = 5;
const LOOK_AHEAD_RANGE_MINUTES: std::ops::RangeInclusive<u64> = 5..=1440;

/// Values read from a `KEY=VALUE` file, with the environment as fallback.
#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ReminderError::InvalidConfig(format!(
                    "Invalid config line {}: {}",
                    idx + 1,
                    line
                )));
            };
            let key = key.trim();
            let mut value = value.trim().to_string();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    /// `name` is the option name without prefix, e.g. `TICKER`.
    pub fn get(&self, name: &str) -> Option<String> {
        let key = format!("{ENV_PREFIX}{name}");
        self.values
            .get(&key)
            .cloned()
            .or_else(|| env::var(&key).ok())
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                ReminderError::InvalidConfig(format!("{ENV_PREFIX}{name}={raw}: {e}"))
            }),
            None => Ok(None),
        }
    }

    fn flag(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    }
}

/// Validated, immutable settings for one run of the program.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub port: u16,
    pub client_id: String,
    pub client_secret: String,
    pub tenant: String,
    pub notifier: NotifierKind,
    pub icon: String,
    pub token_file: PathBuf,
    pub scheduler: SchedulerConfig,
    pub debug: bool,
    pub dry_run: bool,
}

fn invalid(message: impl Into<String>) -> ReminderError {
    ReminderError::InvalidConfig(message.into())
}

fn validate_time_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(invalid(format!("invalid time format {:?}", format)));
    }
    Ok(())
}

impl EngineConfig {
    /// Command line first, then the config file, then the environment,
    /// then defaults.
    pub fn resolve(cli: &Cli, file: &AppConfig) -> Result<Self> {
        let debug = cli.debug || file.flag("DEBUG");
        let dry_run = cli.dry_run || file.flag("DRY_RUN");

        let port = match cli.port {
            Some(port) => port,
            None => file.parsed("PORT")?.unwrap_or(DEFAULT_PORT),
        };
        let client_id = cli.client_id.clone().or_else(|| file.get("CLIENT")).unwrap_or_default();
        let client_secret = cli
            .client_secret
            .clone()
            .or_else(|| file.get("SECRET"))
            .unwrap_or_default();
        if !dry_run && (client_id.trim().is_empty() || client_secret.trim().is_empty()) {
            return Err(invalid("client id and client secret are required"));
        }
        let tenant = cli
            .tenant
            .clone()
            .or_else(|| file.get("TENANT"))
            .unwrap_or_else(|| DEFAULT_TENANT.to_string());

        let notifier = cli
            .notifier
            .clone()
            .or_else(|| file.get("NOTIFIER"))
            .map(|raw| raw.parse::<NotifierKind>().map_err(invalid))
            .transpose()?
            .unwrap_or_default();
        let icon = cli
            .icon
            .clone()
            .or_else(|| file.get("ICON"))
            .unwrap_or_else(|| DEFAULT_ICON.to_string());

        let time_format = cli
            .time_format
            .clone()
            .or_else(|| file.get("TIMEFORMAT"))
            .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string());
        validate_time_format(&time_format)?;

        let tz_name = cli
            .tz
            .clone()
            .or_else(|| file.get("TZ"))
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = tz_name
            .trim()
            .parse::<Tz>()
            .map_err(|e| invalid(format!("unknown time zone {:?}: {}", tz_name, e)))?;

        let ticker_seconds = match cli.ticker_seconds {
            Some(v) => v,
            None => file.parsed("TICKER")?.unwrap_or(DEFAULT_TICKER_SECONDS),
        };
        if !(MIN_TICKER_SECONDS..=MAX_TICKER_SECONDS).contains(&ticker_seconds) {
            return Err(invalid(format!(
                "ticker should be >= {MIN_TICKER_SECONDS} seconds and <= {MAX_TICKER_SECONDS} seconds"
            )));
        }
        let refresh_minutes = match cli.refresh_minutes {
            Some(v) => v,
            None => file.parsed("REFRESH")?.unwrap_or(DEFAULT_REFRESH_MINUTES),
        };
        if refresh_minutes < MIN_REFRESH_MINUTES {
            return Err(invalid(format!("refresh should be >= {MIN_REFRESH_MINUTES} minutes")));
        }
        let refresh_seconds = refresh_minutes
            .checked_mul(60)
            .ok_or_else(|| invalid(format!("refresh of {refresh_minutes} minutes is too large")))?;
        let look_ahead_minutes = match cli.look_ahead_minutes {
            Some(v) => v,
            None => file.parsed("LOOKAHEAD")?.unwrap_or(DEFAULT_LOOK_AHEAD_MINUTES),
        };
        if !LOOK_AHEAD_RANGE_MINUTES.contains(&look_ahead_minutes) {
            return Err(invalid(format!(
                "lookahead should be >= {} minutes and <= {} minutes",
                LOOK_AHEAD_RANGE_MINUTES.start(),
                LOOK_AHEAD_RANGE_MINUTES.end()
            )));
        }

        let policy = cli
            .policy
            .clone()
            .or_else(|| file.get("POLICY"))
            .map(|raw| raw.parse::<DispatchPolicy>().map_err(invalid))
            .transpose()?
            .unwrap_or_default();

        let token_file = cli
            .token_file
            .clone()
            .or_else(|| file.get("TOKEN_FILE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE));

        Ok(Self {
            port,
            client_id,
            client_secret,
            tenant,
            notifier,
            icon,
            token_file,
            scheduler: SchedulerConfig {
                tick_interval: StdDuration::from_secs(ticker_seconds),
                refresh_interval: StdDuration::from_secs(refresh_seconds),
                look_ahead: chrono::Duration::minutes(look_ahead_minutes as i64),
                policy,
                display: DisplayConfig {
                    timezone,
                    time_format,
                },
            },
            debug,
            dry_run,
        })
    }
}
