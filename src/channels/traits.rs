use async_trait::async_trait;

/// A message received from a chat transport.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: String,
    /// Platform user id of the author; becomes the session key.
    pub sender: String,
    /// Where replies go (chat id, user id, ...).
    pub reply_target: String,
    pub content: String,
    pub channel: String,
    /// Unix epoch seconds.
    pub timestamp: u64,
}

/// A message to deliver through a chat transport.
#[derive(Debug, Clone)]
pub struct SendMessage {
    pub content: String,
    pub recipient: String,
}

impl SendMessage {
    pub fn new(content: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            recipient: recipient.into(),
        }
    }
}

/// A chat transport: something that yields inbound text and accepts replies.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Deliver one reply.
    async fn send(&self, message: &SendMessage) -> anyhow::Result<()>;

    /// Push inbound messages into `tx` until the transport closes.
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> anyhow::Result<()>;
}
