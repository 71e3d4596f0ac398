//! Chat command dispatcher.
//!
//! Turns one inbound [`ChannelMessage`] into zero or more plain-text
//! replies. Slash commands route to their handlers; any other text goes to
//! the sender's login conversation when one is running.
//!
//! Protected actions (`/attendance`, `/update`) pass through the
//! [`SessionGate`]; a missing or expired session becomes a "log in first"
//! reply, never an error.

pub mod commands;

use std::sync::Arc;

use crate::channels::ChannelMessage;
use crate::login::{LoginFlow, LoginPolicy, LoginReply};
use crate::portal::{format_report, Portal};
use crate::session::{GateError, SessionError, SessionGate, SessionStore, UserKey};

pub use commands::Command;

const HELP_TEXT: &str = "Available Commands:\n\
\n\
/start - Show welcome message\n\
/login - Enter roll number and password\n\
/attendance - Check your attendance details\n\
/update - Refresh attendance\n\
/status - Show remaining session time\n\
/logout - Clear saved credentials\n\
/cancel - Abort an ongoing login\n\
/help - Show this help message";

const NOT_LOGGED_IN: &str =
    "No saved credentials found.\n\nPlease use /login first to save your credentials.";

const STORAGE_TROUBLE: &str =
    "Something went wrong while saving your session. Please try again in a moment.";

const FETCH_TROUBLE: &str = "Could not fetch attendance right now. Please try again later.";

/// The attendance bot: login conversations, session gate and portal access.
pub struct Bot {
    store: Arc<SessionStore>,
    gate: SessionGate,
    flow: LoginFlow,
    portal: Arc<dyn Portal>,
}

impl Bot {
    pub fn new(store: Arc<SessionStore>, portal: Arc<dyn Portal>, policy: LoginPolicy) -> Self {
        Self {
            gate: SessionGate::new(store.clone()),
            flow: LoginFlow::new(store.clone(), portal.clone(), policy),
            store,
            portal,
        }
    }

    pub fn login_flow(&self) -> &LoginFlow {
        &self.flow
    }

    /// Handle one inbound message and return the replies, in order.
    pub async fn handle(&self, message: &ChannelMessage) -> Vec<String> {
        let key = UserKey::new(&message.sender);

        match Command::parse(&message.content) {
            // Unrecognised slash text mid-login is conversation input (a
            // password may start with `/`), never a command to echo.
            Some(Command::Unknown(_)) | None if self.flow.is_active(&key) => {
                match self.flow.handle_input(&key, &message.content).await {
                    Ok(reply) => vec![self.render_login_reply(reply)],
                    Err(err) => {
                        tracing::error!(user_key = %key, "Login could not be saved: {err}");
                        vec![STORAGE_TROUBLE.to_string()]
                    }
                }
            }
            Some(command) => {
                tracing::debug!(
                    user_key = %key,
                    channel = %message.channel,
                    command = command.name(),
                    "Command received"
                );
                self.handle_command(&key, command).await
            }
            None => vec!["Use /login to sign in or /help to see all commands.".to_string()],
        }
    }

    async fn handle_command(&self, key: &UserKey, command: Command) -> Vec<String> {
        match command {
            Command::Start => vec!["Welcome to the Attendance Bot!\n\n\
                 I can help you check your attendance anytime.\n\n\
                 Use /login to enter your credentials\n\
                 Use /attendance to check your attendance\n\
                 Use /logout to clear saved credentials\n\
                 Use /help for more options"
                .to_string()],
            Command::Help => vec![format!(
                "{HELP_TEXT}\n\nYour credentials are encrypted and expire after {}.",
                format_remaining(self.store.timeout_secs())
            )],
            Command::Login => vec![self.render_login_reply(self.flow.start(key))],
            Command::Cancel => match self.flow.cancel(key) {
                LoginReply::NoConversation => vec!["Nothing to cancel.".to_string()],
                reply => vec![self.render_login_reply(reply)],
            },
            Command::Attendance => self.attendance(key, true).await,
            Command::Update => self.attendance(key, false).await,
            Command::Logout => match self.store.delete(key) {
                Ok(true) => vec![
                    "Logged Out Successfully\n\n\
                     Your credentials have been deleted.\n\
                     Use /login to login again."
                        .to_string(),
                ],
                Ok(false) => vec!["No active session found.".to_string()],
                Err(err) => self.storage_trouble(key, &err),
            },
            Command::Status => match self.gate.require_session(key) {
                Ok(_) => match self.gate.remaining_secs(key) {
                    Ok(secs) => vec![format!(
                        "You are logged in.\nSession expires in: {}",
                        format_remaining(secs)
                    )],
                    Err(err) => self.storage_trouble(key, &err),
                },
                Err(GateError::NotAuthenticated) => vec![NOT_LOGGED_IN.to_string()],
                Err(GateError::Session(err)) => self.storage_trouble(key, &err),
            },
            Command::Unknown(_) => {
                vec!["Unknown command. Use /help to see all commands.".to_string()]
            }
        }
    }

    /// `/attendance` (with remaining time) and `/update` (without).
    async fn attendance(&self, key: &UserKey, show_remaining: bool) -> Vec<String> {
        let credentials = match self.gate.require_session(key) {
            Ok(credentials) => credentials,
            Err(GateError::NotAuthenticated) => return vec![NOT_LOGGED_IN.to_string()],
            Err(GateError::Session(err)) => return self.storage_trouble(key, &err),
        };

        let mut replies = vec![if show_remaining {
            "Fetching attendance data...".to_string()
        } else {
            "Updating attendance...".to_string()
        }];

        match self.portal.fetch_attendance(&credentials.identifier).await {
            Ok(report) => replies.push(format_report(&report)),
            Err(err) => {
                tracing::warn!(
                    user_key = %key,
                    portal = self.portal.name(),
                    "Attendance fetch failed: {err:#}"
                );
                replies.push(FETCH_TROUBLE.to_string());
                return replies;
            }
        }

        if show_remaining {
            match self.gate.remaining_secs(key) {
                Ok(secs) => replies.push(format!(
                    "Session expires in: {}",
                    format_remaining(secs)
                )),
                Err(err) => replies.extend(self.storage_trouble(key, &err)),
            }
        }

        replies
    }

    fn render_login_reply(&self, reply: LoginReply) -> String {
        match reply {
            LoginReply::PromptIdentifier => {
                "Login to Your ECAP Account\n\nPlease enter your Roll Number:".to_string()
            }
            LoginReply::IdentifierRejected { min_len } => format!(
                "Roll number must be at least {min_len} characters.\nPlease try again:"
            ),
            LoginReply::PromptSecret { identifier } => format!(
                "Roll Number saved: {identifier}\n\nNow enter your Password:"
            ),
            LoginReply::SecretRejected { min_len } => format!(
                "Password must be at least {min_len} characters.\nPlease try again:"
            ),
            LoginReply::AuthenticationFailed => "Login Failed!\n\n\
                 Invalid roll number or password.\n\
                 Please try again:\n\n\
                 Enter your Roll Number:"
                .to_string(),
            LoginReply::LoggedIn => format!(
                "Login Successful!\n\n\
                 Your credentials are encrypted and saved securely.\n\
                 They will expire in {}.\n\n\
                 Use /attendance to check your attendance now!",
                format_remaining(self.store.timeout_secs())
            ),
            LoginReply::Cancelled => "Login cancelled.\n\nUse /login to try again.".to_string(),
            LoginReply::NoConversation => {
                "No login in progress. Use /login to start.".to_string()
            }
        }
    }

    fn storage_trouble(&self, key: &UserKey, err: &SessionError) -> Vec<String> {
        tracing::error!(user_key = %key, "Session store failure: {err}");
        vec![STORAGE_TROUBLE.to_string()]
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("store", &self.store)
            .field("flow", &self.flow)
            .field("portal", &self.portal.name())
            .finish()
    }
}

/// `3725` -> `"1h 2m"`.
pub fn format_remaining(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    format!("{hours}h {minutes}m")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::SimulatedPortal;
    use crate::security::Cipher;
    use crate::session::{ManualClock, MemoryBackend};
    use std::time::Duration;

    const T: u64 = 86_400;

    fn setup() -> (Arc<ManualClock>, Arc<MemoryBackend>, Bot) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(
            SessionStore::with_clock(Cipher::new([8u8; 32]), backend.clone(), T, clock.clone())
                .unwrap(),
        );
        let bot = Bot::new(
            store,
            Arc::new(SimulatedPortal::default()),
            LoginPolicy::default(),
        );
        (clock, backend, bot)
    }

    fn msg(sender: &str, content: &str) -> ChannelMessage {
        ChannelMessage {
            id: "m".into(),
            sender: sender.into(),
            reply_target: sender.into(),
            content: content.into(),
            channel: "test".into(),
            timestamp: 0,
        }
    }

    async fn login(bot: &Bot, sender: &str) {
        bot.handle(&msg(sender, "/login")).await;
        bot.handle(&msg(sender, "21A81R0001")).await;
        let replies = bot.handle(&msg(sender, "pass1234")).await;
        assert!(replies[0].starts_with("Login Successful!"), "{replies:?}");
    }

    #[test]
    fn format_remaining_hours_minutes() {
        assert_eq!(format_remaining(0), "0h 0m");
        assert_eq!(format_remaining(3725), "1h 2m");
        assert_eq!(format_remaining(86_400), "24h 0m");
    }

    #[tokio::test]
    async fn attendance_requires_login() {
        let (_clock, _backend, bot) = setup();
        let replies = bot.handle(&msg("1", "/attendance")).await;
        assert_eq!(replies, vec![NOT_LOGGED_IN.to_string()]);
    }

    #[tokio::test]
    async fn full_login_then_attendance() {
        let (_clock, _backend, bot) = setup();

        let replies = bot.handle(&msg("1", "/login")).await;
        assert!(replies[0].contains("Roll Number"));
        let replies = bot.handle(&msg("1", "21A81R0001")).await;
        assert!(replies[0].contains("Roll Number saved: 21A81R0001"));
        let replies = bot.handle(&msg("1", "pass1234")).await;
        assert!(replies[0].contains("They will expire in 24h 0m"));

        let replies = bot.handle(&msg("1", "/attendance")).await;
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], "Fetching attendance data...");
        assert!(replies[1].contains("Hi, Roll Number: 21A81R0001"));
        assert!(replies[1].contains("Total: 329/347 (94.81%)"));
        assert_eq!(replies[2], "Session expires in: 24h 0m");
    }

    #[tokio::test]
    async fn update_skips_remaining_time() {
        let (_clock, _backend, bot) = setup();
        login(&bot, "1").await;

        let replies = bot.handle(&msg("1", "/update")).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], "Updating attendance...");
    }

    #[tokio::test]
    async fn short_inputs_reprompt() {
        let (_clock, _backend, bot) = setup();
        bot.handle(&msg("1", "/login")).await;

        let replies = bot.handle(&msg("1", "ab")).await;
        assert!(replies[0].contains("at least 8 characters"));
        bot.handle(&msg("1", "21A81R0001")).await;
        let replies = bot.handle(&msg("1", "x")).await;
        assert!(replies[0].contains("at least 4 characters"));
    }

    #[tokio::test]
    async fn session_expires() {
        let (clock, _backend, bot) = setup();
        login(&bot, "1").await;

        clock.advance(Duration::from_secs(T));
        let replies = bot.handle(&msg("1", "/attendance")).await;
        assert_eq!(replies, vec![NOT_LOGGED_IN.to_string()]);
    }

    #[tokio::test]
    async fn status_reports_remaining() {
        let (clock, _backend, bot) = setup();
        assert_eq!(
            bot.handle(&msg("1", "/status")).await,
            vec![NOT_LOGGED_IN.to_string()]
        );

        login(&bot, "1").await;
        clock.advance(Duration::from_secs(3600 + 120));
        let replies = bot.handle(&msg("1", "/status")).await;
        assert!(replies[0].ends_with("Session expires in: 22h 58m"));
    }

    #[tokio::test]
    async fn logout_deletes_session() {
        let (_clock, backend, bot) = setup();
        login(&bot, "1").await;

        let replies = bot.handle(&msg("1", "/logout")).await;
        assert!(replies[0].starts_with("Logged Out Successfully"));
        assert!(backend.snapshot().is_empty());

        let replies = bot.handle(&msg("1", "/logout")).await;
        assert_eq!(replies, vec!["No active session found.".to_string()]);
    }

    #[tokio::test]
    async fn cancel_mid_login() {
        let (_clock, _backend, bot) = setup();
        bot.handle(&msg("1", "/login")).await;

        let replies = bot.handle(&msg("1", "/cancel")).await;
        assert!(replies[0].starts_with("Login cancelled."));
        let replies = bot.handle(&msg("1", "/cancel")).await;
        assert_eq!(replies, vec!["Nothing to cancel.".to_string()]);

        let replies = bot.handle(&msg("1", "21A81R0001")).await;
        assert!(replies[0].contains("/login"));
    }

    #[tokio::test]
    async fn storage_failure_is_reported_not_fatal() {
        let (_clock, backend, bot) = setup();
        bot.handle(&msg("1", "/login")).await;
        bot.handle(&msg("1", "21A81R0001")).await;

        backend.set_fail_writes(true);
        let replies = bot.handle(&msg("1", "pass1234")).await;
        assert_eq!(replies, vec![STORAGE_TROUBLE.to_string()]);
        assert!(bot.login_flow().is_active(&UserKey::from("1")));
    }

    #[tokio::test]
    async fn unknown_command_hint() {
        let (_clock, _backend, bot) = setup();
        let replies = bot.handle(&msg("1", "/frobnicate")).await;
        assert_eq!(
            replies,
            vec!["Unknown command. Use /help to see all commands.".to_string()]
        );
    }

    #[tokio::test]
    async fn slash_password_is_login_input_not_echoed() {
        let (_clock, _backend, bot) = setup();
        bot.handle(&msg("1", "/login")).await;
        bot.handle(&msg("1", "21A81R0001")).await;

        let replies = bot.handle(&msg("1", "/MySecretPw")).await;
        assert!(replies[0].starts_with("Login Successful!"), "{replies:?}");
        for reply in &replies {
            assert!(!reply.to_lowercase().contains("mysecretpw"), "{reply}");
        }
        assert!(!bot.login_flow().is_active(&UserKey::from("1")));
    }

    #[tokio::test]
    async fn known_commands_still_work_mid_login() {
        let (_clock, _backend, bot) = setup();
        bot.handle(&msg("1", "/login")).await;
        bot.handle(&msg("1", "21A81R0001")).await;

        let replies = bot.handle(&msg("1", "/cancel")).await;
        assert!(replies[0].starts_with("Login cancelled."));
    }

    #[tokio::test]
    async fn status_in_final_second_is_still_logged_in() {
        let (clock, _backend, bot) = setup();
        login(&bot, "1").await;

        clock.advance(Duration::from_millis(T * 1000 - 500));
        let replies = bot.handle(&msg("1", "/status")).await;
        assert_eq!(
            replies,
            vec!["You are logged in.\nSession expires in: 0h 0m".to_string()]
        );
    }

    #[tokio::test]
    async fn sessions_are_per_user() {
        let (_clock, _backend, bot) = setup();
        login(&bot, "1").await;

        let replies = bot.handle(&msg("2", "/attendance")).await;
        assert_eq!(replies, vec![NOT_LOGGED_IN.to_string()]);
    }
}
