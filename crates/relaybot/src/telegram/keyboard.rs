//! Inline keyboard for recovery decisions
//!
//! Callback payload format: `rcv:<action>:<recovery id>`.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use relaycore::RecoveryId;

const PREFIX: &str = "rcv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry,
    SendAvailable,
    Cancel,
}

impl RecoveryAction {
    fn code(&self) -> &'static str {
        match self {
            RecoveryAction::Retry => "retry",
            RecoveryAction::SendAvailable => "avail",
            RecoveryAction::Cancel => "cancel",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "retry" => Some(RecoveryAction::Retry),
            "avail" => Some(RecoveryAction::SendAvailable),
            "cancel" => Some(RecoveryAction::Cancel),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecoveryAction::Retry => "🔁 Retry failed",
            RecoveryAction::SendAvailable => "📤 Send available",
            RecoveryAction::Cancel => "✖️ Cancel",
        }
    }
}

pub fn callback_data(action: RecoveryAction, id: RecoveryId) -> String {
    format!("{}:{}:{}", PREFIX, action.code(), id)
}

/// Parses callback data produced by [`callback_data`]. Anything else is `None`.
pub fn parse_callback(data: &str) -> Option<(RecoveryAction, RecoveryId)> {
    let mut parts = data.splitn(3, ':');
    if parts.next()? != PREFIX {
        return None;
    }
    let action = RecoveryAction::from_code(parts.next()?)?;
    let id = parts.next()?.parse().ok()?;
    Some((action, id))
}

pub fn recovery_keyboard(id: RecoveryId) -> InlineKeyboardMarkup {
    let button = |action: RecoveryAction| InlineKeyboardButton::callback(action.label(), callback_data(action, id));
    InlineKeyboardMarkup::new(vec![
        vec![button(RecoveryAction::Retry), button(RecoveryAction::SendAvailable)],
        vec![button(RecoveryAction::Cancel)],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_callback_round_trip() {
        let id = RecoveryId::new();
        for action in [RecoveryAction::Retry, RecoveryAction::SendAvailable, RecoveryAction::Cancel] {
            let data = callback_data(action, id);
            assert!(data.len() <= 64, "Telegram limits callback data to 64 bytes");
            assert_eq!(parse_callback(&data), Some((action, id)));
        }
    }

    #[test]
    fn test_foreign_callbacks_are_ignored() {
        assert_eq!(parse_callback("menu:settings"), None);
        assert_eq!(parse_callback("rcv:explode:0123"), None);
        assert_eq!(parse_callback("rcv:retry:not-a-uuid"), None);
        assert_eq!(parse_callback("rcv:retry"), None);
        assert_eq!(parse_callback(""), None);
    }

    #[test]
    fn test_keyboard_has_three_choices() {
        let keyboard = recovery_keyboard(RecoveryId::new());
        let buttons: usize = keyboard.inline_keyboard.iter().map(Vec::len).sum();
        assert_eq!(buttons, 3);
    }
}
