use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use super::traits::{Channel, ChannelMessage, SendMessage};

/// Line-oriented terminal channel.
///
/// Each stdin line is `user: text`; a line without a `user: ` prefix is
/// attributed to the default user. Replies print as `[user] text`.
pub struct ConsoleChannel {
    default_user: String,
}

impl ConsoleChannel {
    pub fn new(default_user: impl Into<String>) -> Self {
        Self {
            default_user: default_user.into(),
        }
    }

    /// Split a console line into `(sender, text)`. Blank lines yield `None`.
    ///
    /// A prefix counts as a user only when it is an id (letters, digits,
    /// `_`, `-`, `.`) followed by `: `, so `ab:cdef1234` stays one message
    /// from the default user.
    pub fn parse_line(&self, line: &str) -> Option<(String, String)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some((user, text)) = line.split_once(':') {
            let is_user_id = !user.is_empty()
                && user
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            let separated = text.is_empty() || text.starts_with(char::is_whitespace);
            if is_user_id && separated {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                return Some((user.to_string(), text.to_string()));
            }
        }

        Some((self.default_user.clone(), line.to_string()))
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, message: &SendMessage) -> anyhow::Result<()> {
        let mut stdout = tokio::io::stdout();
        for line in message.content.lines() {
            stdout
                .write_all(format!("[{}] {line}\n", message.recipient).as_bytes())
                .await?;
        }
        stdout.flush().await?;
        Ok(())
    }

    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let Some((sender, content)) = self.parse_line(&line) else {
                continue;
            };

            let message = ChannelMessage {
                id: Uuid::new_v4().to_string(),
                reply_target: sender.clone(),
                sender,
                content,
                channel: self.name().to_string(),
                timestamp: std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            };

            if tx.send(message).await.is_err() {
                tracing::debug!("Console: dispatcher closed, stopping listener");
                break;
            }
        }

        tracing::info!("Console: stdin closed");
        Ok(())
    }
}
