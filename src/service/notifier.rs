use std::str::FromStr;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{ReminderError, Result};

pub const DEFAULT_ICON: &str = "/usr/share/icons/gnome/32x32/status/appointment-soon.png";

/// Renders a reminder on the desktop.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, summary: &str, message: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifierKind {
    #[default]
    Zenity,
    NotifySend,
}

impl FromStr for NotifierKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim() {
            "zenity" => Ok(Self::Zenity),
            "notify-send" => Ok(Self::NotifySend),
            other => Err(format!(
                "invalid notifier {:?}, options: zenity, notify-send",
                other
            )),
        }
    }
}

pub fn select_notifier(kind: NotifierKind, icon: &str) -> Box<dyn Notifier> {
    match kind {
        NotifierKind::Zenity => Box::new(ZenityNotifier),
        NotifierKind::NotifySend => Box::new(NotifySendNotifier::new(icon)),
    }
}

async fn run(mut command: Command) -> Result<()> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let status = command
        .status()
        .await
        .map_err(|e| ReminderError::Notify(format!("{program}: {e}")))?;
    if !status.success() {
        return Err(ReminderError::Notify(format!("{program} exited with {status}")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ZenityNotifier;

impl ZenityNotifier {
    pub fn markup(summary: &str, message: &str) -> String {
        format!(
            "<span foreground=\"blue\" size=\"large\">{}</span>\n<span>{}</span>",
            escape_markup(summary),
            escape_markup(message)
        )
    }
}

#[async_trait]
impl Notifier for ZenityNotifier {
    async fn send(&self, summary: &str, message: &str) -> Result<()> {
        let mut command = Command::new("zenity");
        command
            .arg("--info")
            .args(["--icon-name", "appointment-soon"])
            .args(["--title", "Reminder"])
            .arg("--text")
            .arg(Self::markup(summary, message));
        run(command).await
    }
}

#[derive(Debug, Clone)]
pub struct NotifySendNotifier {
    icon: String,
}

impl NotifySendNotifier {
    pub fn new(icon: &str) -> Self {
        Self {
            icon: icon.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for NotifySendNotifier {
    async fn send(&self, summary: &str, message: &str) -> Result<()> {
        let mut command = Command::new("notify-send");
        command.args(["-i", self.icon.as_str(), summary, message]);
        run(command).await
    }
}

fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
