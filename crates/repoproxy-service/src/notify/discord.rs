use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use url::Url;

use super::{Notice, Notifier, NotifyError, Severity};

const YELLOW: u32 = 16_705_372;
const RED: u32 = 15_548_997;

#[derive(Debug, Serialize)]
struct WebhookMessage {
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    fields: Vec<EmbedField>,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

impl From<Notice> for WebhookMessage {
    fn from(notice: Notice) -> Self {
        let color = match notice.severity {
            Severity::Info => None,
            Severity::Warning => Some(YELLOW),
            Severity::Error => Some(RED),
        };

        let fields = notice
            .details
            .into_iter()
            .map(|(name, value)| EmbedField {
                name,
                value,
                inline: true,
            })
            .collect();

        WebhookMessage {
            embeds: vec![Embed {
                title: notice.title,
                description: notice.description,
                color,
                fields,
            }],
        }
    }
}

/// Posts notices as embeds to a Discord webhook.
#[derive(Clone, Debug)]
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook: Url,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(client: reqwest::Client, webhook: Url, timeout: Duration) -> Self {
        Self {
            client,
            webhook,
            timeout,
        }
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, notice: Notice) -> BoxFuture<'static, Result<(), NotifyError>> {
        let request = self
            .client
            .post(self.webhook.clone())
            .timeout(self.timeout)
            .json(&WebhookMessage::from(notice));

        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(NotifyError::Status(status));
            }
            Ok(())
        })
    }
}
