//! Operational notifications.
//!
//! Rate limits and abuse detection are reported to the operators through a [`Notifier`]. Without
//! a Discord webhook configured, notices only end up in the log.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::NotificationsConfig;

mod discord;

pub use discord::DiscordNotifier;

/// How urgent a [`Notice`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// A message for the operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Additional named values, rendered as a list of fields.
    pub details: BTreeMap<String, String>,
}

impl Notice {
    pub fn new(severity: Severity, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            description: description.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(name.into(), value.to_string());
        self
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification endpoint responded with {0}")]
    Status(StatusCode),
    #[error("failed to deliver notification")]
    Transport(#[from] reqwest::Error),
}

/// Delivers [`Notice`]s.
///
/// The returned future does not borrow the notifier, so it can be spawned.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notice: Notice) -> BoxFuture<'static, Result<(), NotifyError>>;
}

/// A [`Notifier`] that writes notices to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) -> BoxFuture<'static, Result<(), NotifyError>> {
        let Notice {
            severity,
            title,
            description,
            details,
        } = notice;

        match severity {
            Severity::Info => tracing::info!(?details, "{title}: {description}"),
            Severity::Warning => tracing::warn!(?details, "{title}: {description}"),
            Severity::Error => tracing::error!(?details, "{title}: {description}"),
        }

        Box::pin(futures::future::ready(Ok(())))
    }
}

/// Creates the notifier for the given configuration.
pub fn create_notifier(
    config: &NotificationsConfig,
    client: reqwest::Client,
) -> Arc<dyn Notifier> {
    match &config.discord_webhook_url {
        Some(webhook) => Arc::new(DiscordNotifier::new(client, webhook.clone(), config.timeout)),
        None => Arc::new(LogNotifier),
    }
}
