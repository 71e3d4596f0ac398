/// Slash commands the bot understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Greeting
    Start,
    /// Command list
    Help,
    /// Begin the login conversation
    Login,
    /// Abort the login conversation
    Cancel,
    /// Fetch attendance plus remaining session time
    Attendance,
    /// Re-fetch attendance
    Update,
    /// Drop the stored session
    Logout,
    /// Show remaining session time
    Status,
    /// Anything else starting with `/`
    Unknown(String),
}

impl Command {
    /// Name for logs. Unrecognised input is never echoed.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Login => "login",
            Self::Cancel => "cancel",
            Self::Attendance => "attendance",
            Self::Update => "update",
            Self::Logout => "logout",
            Self::Status => "status",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Parse a message as a command. Returns `None` for plain text.
    ///
    /// Matching is case-insensitive and ignores a `@botname` suffix and any
    /// arguments after the command word.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let rest = trimmed.strip_prefix('/')?;

        let word = rest.split_whitespace().next().unwrap_or("");
        let word = word.split('@').next().unwrap_or("").to_lowercase();

        Some(match word.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "login" => Self::Login,
            "cancel" => Self::Cancel,
            "attendance" => Self::Attendance,
            "update" => Self::Update,
            "logout" => Self::Logout,
            "status" => Self::Status,
            _ => Self::Unknown(word),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("/login"), Some(Command::Login));
        assert_eq!(Command::parse("/cancel"), Some(Command::Cancel));
        assert_eq!(Command::parse("/attendance"), Some(Command::Attendance));
        assert_eq!(Command::parse("/update"), Some(Command::Update));
        assert_eq!(Command::parse("/logout"), Some(Command::Logout));
        assert_eq!(Command::parse("/status"), Some(Command::Status));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Command::parse("  /LOGIN "), Some(Command::Login));
    }

    #[test]
    fn parse_strips_bot_suffix_and_args() {
        assert_eq!(
            Command::parse("/attendance@VIPT_Attendance_Bot now"),
            Some(Command::Attendance)
        );
    }

    #[test]
    fn parse_unknown() {
        assert_eq!(
            Command::parse("/shell ls"),
            Some(Command::Unknown("shell".into()))
        );
    }

    #[test]
    fn unknown_name_hides_input() {
        assert_eq!(Command::parse("/Hunter22").unwrap().name(), "unknown");
        assert_eq!(Command::parse("/status").unwrap().name(), "status");
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(Command::parse("21A81R0001"), None);
        assert_eq!(Command::parse("pass/word"), None);
    }
}
