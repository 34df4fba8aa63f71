use std::path::PathBuf;

use clap::Parser;

/// Desktop reminders for upcoming Outlook calendar events.
///
/// Every option can also come from the `--config` file or the environment
/// (`CALENDAR_REMINDER_<OPTION>`, e.g. `CALENDAR_REMINDER_TICKER`).
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "calendar-reminder", version)]
pub struct Cli {
    /// Port to use for this application's http server
    #[arg(long)]
    pub port: Option<u16>,

    /// A client that is registered in the Microsoft identity platform with calendar read permission
    #[arg(long = "client")]
    pub client_id: Option<String>,

    /// The client secret
    #[arg(long = "secret")]
    pub client_secret: Option<String>,

    /// The Microsoft directory to use for login
    #[arg(long)]
    pub tenant: Option<String>,

    /// Application to use for notifications: zenity, notify-send
    #[arg(long)]
    pub notifier: Option<String>,

    /// Icon shown by notify-send
    #[arg(long)]
    pub icon: Option<String>,

    /// Display format for reminder times (strftime)
    #[arg(long = "timeformat")]
    pub time_format: Option<String>,

    /// Frequency of reminder checks in seconds
    #[arg(long = "ticker")]
    pub ticker_seconds: Option<u64>,

    /// Frequency of refreshing event data in minutes
    #[arg(long = "refresh")]
    pub refresh_minutes: Option<u64>,

    /// Minutes of lookahead data to get from the calendar
    #[arg(long = "lookahead")]
    pub look_ahead_minutes: Option<u64>,

    /// Local time zone
    #[arg(long)]
    pub tz: Option<String>,

    /// Reminder policy: single (fire once) or confirm (fire again after five minutes)
    #[arg(long)]
    pub policy: Option<String>,

    /// Where the authorization token is kept
    #[arg(long = "token-file")]
    pub token_file: Option<PathBuf>,

    /// KEY=VALUE file with defaults for the options above
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Show a test notification and exit
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}
