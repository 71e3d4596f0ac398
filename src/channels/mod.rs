//! Chat transports and the dispatch loop that feeds them to the bot.
//!
//! Messages from different users are handled concurrently. Messages from
//! the same user go through a per-user lane so a roll number and the
//! password typed right after it are never processed out of order. A lane
//! closes itself after sitting idle.

pub mod console;
pub mod traits;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bot::Bot;

pub use console::ConsoleChannel;
pub use traits::{Channel, ChannelMessage, SendMessage};

/// Inbound buffer between the transport listener and the dispatcher.
const INBOUND_BUFFER: usize = 64;

/// How long a per-user lane waits for more input before shutting down.
const LANE_IDLE: Duration = Duration::from_secs(60);

struct Lane {
    tx: mpsc::UnboundedSender<ChannelMessage>,
    worker: JoinHandle<()>,
}

/// Run `channel` against `bot` until the transport stops producing messages.
pub async fn run_dispatch(bot: Arc<Bot>, channel: Arc<dyn Channel>) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(INBOUND_BUFFER);

    let listener = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.listen(tx).await })
    };

    tracing::info!(channel = channel.name(), "Dispatcher started");

    let mut lanes: HashMap<String, Lane> = HashMap::new();

    while let Some(message) = rx.recv().await {
        lanes.retain(|_, lane| !lane.worker.is_finished());
        let sender = message.sender.clone();

        let (message, previous) = match lanes.remove(&sender) {
            Some(lane) => match lane.tx.send(message) {
                Ok(()) => {
                    lanes.insert(sender, lane);
                    continue;
                }
                // Lane went idle and closed; the replacement waits for it to drain.
                Err(mpsc::error::SendError(message)) => (message, Some(lane.worker)),
            },
            None => (message, None),
        };

        let (lane_tx, lane_rx) = mpsc::unbounded_channel();
        // A brand-new receiver is open, so this cannot fail.
        let _ = lane_tx.send(message);
        let worker = tokio::spawn(run_lane(bot.clone(), channel.clone(), lane_rx, previous));
        lanes.insert(
            sender,
            Lane {
                tx: lane_tx,
                worker,
            },
        );
    }

    let workers: Vec<JoinHandle<()>> = lanes.into_values().map(|lane| lane.worker).collect();
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(channel = channel.name(), "Lane task failed: {err}");
        }
    }

    tracing::info!(channel = channel.name(), "Dispatcher stopped");
    listener.await?
}

async fn run_lane(
    bot: Arc<Bot>,
    channel: Arc<dyn Channel>,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    loop {
        match tokio::time::timeout(LANE_IDLE, rx.recv()).await {
            Ok(Some(message)) => deliver(&bot, channel.as_ref(), &message).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Ok(message) = rx.try_recv() {
                    deliver(&bot, channel.as_ref(), &message).await;
                }
                break;
            }
        }
    }
}

async fn deliver(bot: &Bot, channel: &dyn Channel, message: &ChannelMessage) {
    for reply in bot.handle(message).await {
        let outbound = SendMessage::new(reply, &message.reply_target);
        if let Err(err) = channel.send(&outbound).await {
            tracing::error!(
                channel = channel.name(),
                recipient = %message.reply_target,
                "Failed to send reply: {err:#}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::LoginPolicy;
    use crate::portal::SimulatedPortal;
    use crate::security::Cipher;
    use crate::session::{MemoryBackend, SessionStore, UserKey};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Channel that replays a fixed script and records replies. Each step
    /// waits `delay` before it is sent.
    struct ScriptedChannel {
        script: Vec<(Duration, &'static str, &'static str)>,
        sent: Mutex<Vec<SendMessage>>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<(Duration, &'static str, &'static str)>) -> Self {
            Self {
                script,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn immediate(script: Vec<(&'static str, &'static str)>) -> Self {
            Self::new(
                script
                    .into_iter()
                    .map(|(sender, content)| (Duration::ZERO, sender, content))
                    .collect(),
            )
        }

        fn replies_to(&self, recipient: &str) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .filter(|m| m.recipient == recipient)
                .map(|m| m.content.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, message: &SendMessage) -> anyhow::Result<()> {
            self.sent.lock().push(message.clone());
            Ok(())
        }

        async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> anyhow::Result<()> {
            for (i, (delay, sender, content)) in self.script.iter().enumerate() {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                tx.send(ChannelMessage {
                    id: i.to_string(),
                    sender: sender.to_string(),
                    reply_target: sender.to_string(),
                    content: content.to_string(),
                    channel: "scripted".into(),
                    timestamp: 0,
                })
                .await?;
            }
            Ok(())
        }
    }

    fn bot_with_store() -> (Arc<SessionStore>, Arc<Bot>) {
        let store = Arc::new(
            SessionStore::open(Cipher::new([4u8; 32]), MemoryBackend::new(), 3600).unwrap(),
        );
        let bot = Arc::new(Bot::new(
            store.clone(),
            Arc::new(SimulatedPortal::default()),
            LoginPolicy::default(),
        ));
        (store, bot)
    }

    #[tokio::test(start_paused = true)]
    async fn idle_lane_closes_and_replacement_keeps_order() {
        let (store, bot) = bot_with_store();
        let gap = LANE_IDLE + Duration::from_secs(1);
        let channel = Arc::new(ScriptedChannel::new(vec![
            (Duration::ZERO, "dave", "/login"),
            (Duration::ZERO, "dave", "DAVE00001"),
            // The first lane times out during this gap.
            (gap, "dave", "davepw"),
            (Duration::ZERO, "dave", "/status"),
        ]));

        run_dispatch(bot, channel.clone()).await.unwrap();

        assert_eq!(
            store.get(&UserKey::from("dave")).unwrap().unwrap().identifier,
            "DAVE00001"
        );
        let replies = channel.replies_to("dave");
        assert_eq!(replies.len(), 4, "{replies:?}");
        assert!(replies[0].contains("Please enter your Roll Number"));
        assert!(replies[1].contains("Roll Number saved: DAVE00001"));
        assert!(replies[2].starts_with("Login Successful!"));
        assert!(replies[3].starts_with("You are logged in."));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_after_idle_is_handled_in_order() {
        let (store, bot) = bot_with_store();
        let gap = LANE_IDLE * 2;
        let channel = Arc::new(ScriptedChannel::new(vec![
            (Duration::ZERO, "erin", "/status"),
            (gap, "erin", "/login"),
            (Duration::ZERO, "erin", "ERIN00001"),
            (Duration::ZERO, "erin", "erinpw"),
        ]));

        run_dispatch(bot, channel.clone()).await.unwrap();

        assert!(store.has(&UserKey::from("erin")).unwrap());
        let replies = channel.replies_to("erin");
        assert_eq!(replies.len(), 4, "{replies:?}");
        assert!(replies[0].contains("/login first"));
        assert!(replies[1].contains("Please enter your Roll Number"));
        assert!(replies[2].contains("Roll Number saved: ERIN00001"));
        assert!(replies[3].starts_with("Login Successful!"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn interleaved_users_each_log_in() {
        let (store, bot) = bot_with_store();
        let channel = Arc::new(ScriptedChannel::immediate(vec![
            ("alice", "/login"),
            ("bob", "/login"),
            ("alice", "ALICE0001"),
            ("bob", "BOB000002"),
            ("alice", "alicepw"),
            ("bob", "bobpw"),
            ("carol", "/attendance"),
        ]));

        run_dispatch(bot, channel.clone()).await.unwrap();

        assert_eq!(
            store.get(&UserKey::from("alice")).unwrap().unwrap().identifier,
            "ALICE0001"
        );
        assert_eq!(
            store.get(&UserKey::from("bob")).unwrap().unwrap().identifier,
            "BOB000002"
        );

        let to_alice = channel.replies_to("alice");
        assert_eq!(to_alice.len(), 3);
        assert!(to_alice[0].contains("Please enter your Roll Number"));
        assert!(to_alice[1].contains("Roll Number saved: ALICE0001"));
        assert!(to_alice[2].starts_with("Login Successful!"));

        assert!(channel
            .replies_to("carol")
            .iter()
            .any(|reply| reply.contains("/login first")));
    }
}
