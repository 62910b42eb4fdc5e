pub mod dispatcher;
pub mod telegram;

pub use dispatcher::{BotDispatcher, Command};
pub use telegram::{start_telegram_listener, TelegramFileFetcher, TelegramNotifier};
