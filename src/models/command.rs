//! Commands and callback actions parsed once at the transport boundary.

use super::UserId;
use crate::{Error, Result};

/// A slash command sent as a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request access, or show the welcome text when already approved.
    Start,
    /// Open the feedback flow.
    Feedback,
    /// Abort the open conversation, if any.
    Cancel,
    /// Force-approve a single identity.
    AddUser(String),
    /// Force-approve several identities.
    AddUsers(String),
    /// Open the add-entry flow.
    Add,
    /// Open the edit-entry flow.
    Edit,
    /// Open the delete-entry flow.
    Delete,
    /// Browse entries with edit/delete buttons.
    List,
    /// Show the most recent searches.
    History,
    /// Show usage statistics.
    Stats,
    /// Show the user roster with toggle buttons.
    Users,
    /// Open the broadcast flow.
    Broadcast,
    /// Re-read the backing document and announce new keywords.
    Reload,
    /// Anything else starting with `/`.
    Unknown(String),
}

impl Command {
    /// Parses a message as a command.
    ///
    /// Returns `None` for plain text. Accepts the `/name@botname args` form.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(h, a)| (h, a.trim()));
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        let command = match name.as_str() {
            "start" => Self::Start,
            "feedback" => Self::Feedback,
            "cancel" => Self::Cancel,
            "adduser" => Self::AddUser(args.to_string()),
            "addusers" => Self::AddUsers(args.to_string()),
            "add" => Self::Add,
            "edit" => Self::Edit,
            "del" | "delete" => Self::Delete,
            "list" => Self::List,
            "history" => Self::History,
            "stats" => Self::Stats,
            "users" => Self::Users,
            "broadcast" => Self::Broadcast,
            "reload" => Self::Reload,
            _ => Self::Unknown(name),
        };
        Some(command)
    }

    /// Returns true for commands reserved to the administrator.
    #[must_use]
    pub const fn is_admin_only(&self) -> bool {
        !matches!(
            self,
            Self::Start | Self::Feedback | Self::Cancel | Self::Unknown(_)
        )
    }
}

/// Parses whitespace- or comma-separated user ids.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if no id is given or any token is not a number.
pub fn parse_user_ids(args: &str) -> Result<Vec<UserId>> {
    let ids = args
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(str::parse::<UserId>)
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(Error::InvalidInput("no user id given".to_string()));
    }
    Ok(ids)
}

/// An inline-button action.
///
/// Encoded as a short prefixed string in the callback payload and parsed back
/// exactly once when the callback arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Approve a pending user from the access request notice.
    Approve(UserId),
    /// Flip a user between approved and blocked from the roster.
    Toggle(UserId),
    /// Start editing the entry with this callback token.
    EditEntry(String),
    /// Delete the entry with this callback token.
    DeleteEntry(String),
}

impl CallbackAction {
    /// Encodes the action as a callback payload.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Approve(id) => format!("approve_{id}"),
            Self::Toggle(id) => format!("toggle_{id}"),
            Self::EditEntry(token) => format!("e_{token}"),
            Self::DeleteEntry(token) => format!("d_{token}"),
        }
    }

    /// Parses a callback payload.
    ///
    /// Returns `None` for unknown prefixes or malformed ids.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let (prefix, value) = data.split_once('_')?;
        if value.is_empty() {
            return None;
        }
        match prefix {
            "approve" => value.parse().ok().map(Self::Approve),
            "toggle" => value.parse().ok().map(Self::Toggle),
            "e" => Some(Self::EditEntry(value.to_string())),
            "d" => Some(Self::DeleteEntry(value.to_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/start", Some(Command::Start) ; "plain")]
    #[test_case("  /START  ", Some(Command::Start) ; "case and whitespace")]
    #[test_case("/start@kb_bot", Some(Command::Start) ; "bot suffix")]
    #[test_case("/adduser 42", Some(Command::AddUser("42".to_string())) ; "with args")]
    #[test_case("/addusers 1 2,3", Some(Command::AddUsers("1 2,3".to_string())) ; "multiple args")]
    #[test_case("/del", Some(Command::Delete) ; "del alias")]
    #[test_case("/nope", Some(Command::Unknown("nope".to_string())) ; "unknown")]
    #[test_case("apple", None ; "plain text")]
    fn test_command_parse(input: &str, expected: Option<Command>) {
        assert_eq!(Command::parse(input), expected);
    }

    #[test]
    fn test_admin_only() {
        assert!(!Command::Start.is_admin_only());
        assert!(!Command::Cancel.is_admin_only());
        assert!(!Command::Feedback.is_admin_only());
        assert!(Command::Add.is_admin_only());
        assert!(Command::Users.is_admin_only());
        assert!(Command::AddUser(String::new()).is_admin_only());
    }

    #[test]
    fn test_parse_user_ids() {
        let ids = parse_user_ids("405262718, 350734787 777582106").unwrap_or_default();
        assert_eq!(
            ids,
            vec![
                UserId::new(405_262_718),
                UserId::new(350_734_787),
                UserId::new(777_582_106)
            ]
        );
        assert!(matches!(parse_user_ids(""), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_user_ids("12 x"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_callback_roundtrip_and_rejects() {
        let action = CallbackAction::Toggle(UserId::new(7));
        assert_eq!(action.encode(), "toggle_7");
        assert_eq!(CallbackAction::parse("toggle_7"), Some(action));
        assert_eq!(
            CallbackAction::parse("e_abc123"),
            Some(CallbackAction::EditEntry("abc123".to_string()))
        );
        assert_eq!(CallbackAction::parse("approve_x"), None);
        assert_eq!(CallbackAction::parse("approve_"), None);
        assert_eq!(CallbackAction::parse("zap_1"), None);
        assert_eq!(CallbackAction::parse("nounderscore"), None);
    }
}
