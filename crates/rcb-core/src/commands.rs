//! Bot command parsing.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Login,
    /// Code or redirect URL pasted after logging in.
    Auth(String),
    /// Revoke and forget the FIB API credentials.
    Logout,
    WhoAmI,
    /// Send the most recent notice.
    Test,
    /// Send one notice by id; `None` when the argument is not a number.
    Debug(Option<i64>),
    /// Run a push cycle now.
    Push,
    Unknown(String),
}

impl BotCommand {
    /// Command name for logs; never includes arguments.
    pub fn name(&self) -> &str {
        match self {
            BotCommand::Start => "start",
            BotCommand::Help => "help",
            BotCommand::Login => "login",
            BotCommand::Auth(_) => "auth",
            BotCommand::Logout => "logout",
            BotCommand::WhoAmI => "whoami",
            BotCommand::Test => "test",
            BotCommand::Debug(_) => "debug",
            BotCommand::Push => "push",
            BotCommand::Unknown(name) => name,
        }
    }
}

pub const HELP_HTML: &str = "<b>Racó notice bot</b>\n\n\
/login - Link your FIB account\n\
/auth &lt;code or URL&gt; - Finish linking with the code you received\n\
/logout - Unlink your FIB account\n\
/whoami - Show your FIB profile\n\
/push - Check for new notices now\n\
/test - Send the most recent notice\n\
/debug &lt;id&gt; - Send the notice with this id";

/// Parse a `/command args` message. Returns `None` for plain text.
pub fn parse_command(text: &str) -> Option<BotCommand> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    let name = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    Some(match name.as_str() {
        "start" => BotCommand::Start,
        "help" => BotCommand::Help,
        "login" => BotCommand::Login,
        "auth" => BotCommand::Auth(rest.to_string()),
        "logout" => BotCommand::Logout,
        "whoami" => BotCommand::WhoAmI,
        "test" => BotCommand::Test,
        "debug" => BotCommand::Debug(rest.parse().ok()),
        "push" => BotCommand::Push,
        _ => BotCommand::Unknown(name),
    })
}
