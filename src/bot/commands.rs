//! Text command parsing.

/// Parses message text into commands.
pub struct CommandParser;

impl CommandParser {
    /// Parse message text. Anything not starting with `/` is plain text.
    pub fn parse(content: &str) -> Command {
        let trimmed = content.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Text(content.to_string());
        };

        let mut parts = rest.split_whitespace();
        let head = parts.next().unwrap_or_default();
        // Group chats address commands as `/cmd@BotName`.
        let name = head.split('@').next().unwrap_or_default();

        match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "sign_up" => Command::SignUp,
            "modify" => Command::Modify,
            "modify_email" => Command::ModifyEmail,
            "set_skills" => Command::SetSkills,
            "set_preferences" => Command::SetPreferences,
            "add_project" => Command::AddProject,
            "portfolio" => Command::Portfolio,
            "profile" => Command::Profile,
            "about_me" => Command::AboutMe,
            "find_team" => Command::FindTeam,
            "shop" => Command::Shop,
            "refund" => Command::Refund {
                charge_id: parts.next().map(String::from),
            },
            "cancel" => Command::Cancel,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// A parsed inbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    SignUp,
    Modify,
    ModifyEmail,
    SetSkills,
    SetPreferences,
    AddProject,
    Portfolio,
    Profile,
    AboutMe,
    FindTeam,
    Shop,
    /// `/refund <charge_id>`; the id is missing if the user gave none.
    Refund { charge_id: Option<String> },
    Cancel,
    /// A `/command` the bot does not know. Never fed to a flow.
    Unknown(String),
    /// Free text, passed to the open flow if any.
    Text(String),
}
