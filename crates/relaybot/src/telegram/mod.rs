pub mod bot;
pub mod handlers;
pub mod keyboard;
pub mod messages;
pub mod progress;
pub mod transport;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
pub use keyboard::{recovery_keyboard, RecoveryAction};
pub use progress::TelegramProgress;
pub use transport::TelegramTransport;

pub use teloxide::Bot;
