use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ParseMode as TgParseMode,
};
use tokio_util::sync::CancellationToken;

use super::dispatcher::{BotDispatcher, Command};
use crate::config::MAX_MESSAGE_LENGTH;
use crate::notifications::Notifier;
use crate::ui::files::{FileFetcher, IncomingFile};
use crate::ui::{split_message, CallbackOutcome, MediaKind, ParseMode, Reply, SendFile};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[allow(deprecated)]
fn telegram_parse_mode(mode: ParseMode) -> Option<TgParseMode> {
    match mode {
        // Legacy Markdown: `*bold*`, `_italic_`, backtick code
        ParseMode::Markdown => Some(TgParseMode::Markdown),
        ParseMode::Html => Some(TgParseMode::Html),
        ParseMode::Plain => None,
    }
}

fn keyboard_markup(reply: &Reply) -> Option<InlineKeyboardMarkup> {
    if reply.keyboard.is_empty() {
        return None;
    }
    Some(InlineKeyboardMarkup::new(reply.keyboard.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
            .collect::<Vec<_>>()
    })))
}

/// Send a reply, split to Telegram's length limit with the keyboard on the
/// last chunk. Text the API refuses to parse is re-sent unformatted.
async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply, reply_to: Option<MessageId>) -> HandlerResult {
    let chunks = split_message(&reply.text, MAX_MESSAGE_LENGTH);
    let last = chunks.len().saturating_sub(1);

    for (i, chunk) in chunks.iter().enumerate() {
        let markup = if i == last { keyboard_markup(reply) } else { None };

        let mut request = bot.send_message(chat_id, chunk.clone());
        if let Some(mode) = telegram_parse_mode(reply.parse_mode) {
            request = request.parse_mode(mode);
        }
        if let Some(markup) = markup.clone() {
            request = request.reply_markup(markup);
        }
        if let (0, Some(id)) = (i, reply_to) {
            request = request.reply_to_message_id(id);
        }

        if let Err(e) = request.await {
            if reply.parse_mode == ParseMode::Plain {
                return Err(Box::new(e));
            }
            log::warn!("[TELEGRAM] Formatted send failed ({}), retrying as plain text", e);
            let mut plain = bot.send_message(chat_id, chunk.clone());
            if let Some(markup) = markup {
                plain = plain.reply_markup(markup);
            }
            plain.await?;
        }
    }
    Ok(())
}

async fn edit_reply(bot: &Bot, chat_id: ChatId, message_id: MessageId, reply: &Reply) -> HandlerResult {
    let text: String = reply.text.chars().take(MAX_MESSAGE_LENGTH).collect();

    let mut request = bot.edit_message_text(chat_id, message_id, text.clone());
    if let Some(mode) = telegram_parse_mode(reply.parse_mode) {
        request = request.parse_mode(mode);
    }
    if let Some(markup) = keyboard_markup(reply) {
        request = request.reply_markup(markup);
    }

    if let Err(e) = request.await {
        if reply.parse_mode == ParseMode::Plain {
            return Err(Box::new(e));
        }
        log::warn!("[TELEGRAM] Formatted edit failed ({}), retrying as plain text", e);
        let mut plain = bot.edit_message_text(chat_id, message_id, text);
        if let Some(markup) = keyboard_markup(reply) {
            plain = plain.reply_markup(markup);
        }
        plain.await?;
    }
    Ok(())
}

async fn send_stored_file(bot: &Bot, chat_id: ChatId, file: &SendFile) -> HandlerResult {
    let input = InputFile::file_id(file.telegram_file_id.clone());
    match file.kind {
        MediaKind::Photo => {
            bot.send_photo(chat_id, input).caption(file.caption.clone()).await?;
        }
        MediaKind::Document => {
            bot.send_document(chat_id, input).caption(file.caption.clone()).await?;
        }
    }
    Ok(())
}

/// Downloads uploads through the Bot API file endpoint
pub struct TelegramFileFetcher {
    bot: Bot,
}

impl TelegramFileFetcher {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl FileFetcher for TelegramFileFetcher {
    async fn fetch(&self, telegram_file_id: &str, destination: &Path) -> Result<(), String> {
        let file = self
            .bot
            .get_file(telegram_file_id)
            .await
            .map_err(|e| format!("Failed to get file info: {}", e))?;
        let mut dst = tokio::fs::File::create(destination)
            .await
            .map_err(|e| format!("Failed to create {}: {}", destination.display(), e))?;
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(|e| format!("Failed to download file: {}", e))?;
        Ok(())
    }
}

/// Pushes HTML notifications to chats
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, chat_id: i64, html: &str) -> Result<(), String> {
        self.bot
            .send_message(ChatId(chat_id), html)
            .parse_mode(TgParseMode::Html)
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to send notification: {}", e))
    }
}

fn incoming_file(msg: &Message) -> Option<IncomingFile> {
    let caption = msg.caption().map(str::to_string);
    if let Some(doc) = msg.document() {
        return Some(IncomingFile {
            kind: MediaKind::Document,
            telegram_file_id: doc.file.id.clone(),
            telegram_file_unique_id: doc.file.unique_id.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.to_string()),
            caption,
            message_id: msg.id.0,
        });
    }
    // Telegram lists photo sizes smallest first
    let photo = msg.photo()?.last()?;
    Some(IncomingFile {
        kind: MediaKind::Photo,
        telegram_file_id: photo.file.id.clone(),
        telegram_file_unique_id: photo.file.unique_id.clone(),
        file_name: None,
        mime_type: None,
        caption,
        message_id: msg.id.0,
    })
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, dispatcher: Arc<BotDispatcher>) -> HandlerResult {
    let first_name = msg
        .from()
        .map(|u| u.first_name.clone())
        .unwrap_or_else(|| "there".to_string());

    let is_link = matches!(cmd, Command::Link(_));
    let reply = dispatcher.command(msg.chat.id.0, &first_name, cmd).await;

    if is_link {
        // The /link message holds a password
        if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
            log::warn!("[TELEGRAM] Could not delete /link message in chat {}: {}", msg.chat.id, e);
        }
        send_reply(&bot, msg.chat.id, &reply, None).await
    } else {
        send_reply(&bot, msg.chat.id, &reply, Some(msg.id)).await
    }
}

async fn handle_callback(bot: Bot, q: CallbackQuery, dispatcher: Arc<BotDispatcher>) -> HandlerResult {
    let Some(message) = q.message.as_ref() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let chat_id = message.chat.id;
    let data = q.data.clone().unwrap_or_default();

    let CallbackOutcome { toast, edit, file, follow_up } = dispatcher.callback(chat_id.0, &data).await;

    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Some(toast) = toast {
        answer = answer.text(toast);
    }
    if let Err(e) = answer.await {
        log::warn!("[TELEGRAM] Failed to answer callback: {}", e);
    }

    if let Some(reply) = edit {
        if let Err(e) = edit_reply(&bot, chat_id, message.id, &reply).await {
            log::error!("[TELEGRAM] Failed to edit message in chat {}: {}", chat_id, e);
        }
    }
    if let Some(file) = file {
        if let Err(e) = send_stored_file(&bot, chat_id, &file).await {
            log::error!("[TELEGRAM] Failed to re-send file in chat {}: {}", chat_id, e);
            send_reply(&bot, chat_id, &Reply::plain(format!("❌ Error: {}", e)), None).await?;
        }
    }
    if let Some(reply) = follow_up {
        send_reply(&bot, chat_id, &reply, None).await?;
    }
    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, dispatcher: Arc<BotDispatcher>) -> HandlerResult {
    let chat_id = msg.chat.id;

    if msg.document().is_some() || msg.photo().is_some() {
        let reply = match incoming_file(&msg) {
            Some(incoming) => {
                log::info!("[TELEGRAM] File upload in chat {}", chat_id);
                let fetcher = TelegramFileFetcher::new(bot.clone());
                dispatcher.upload(chat_id.0, &fetcher, incoming).await
            }
            None => Reply::plain("❌ No file detected"),
        };
        return send_reply(&bot, chat_id, &reply, Some(msg.id)).await;
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };
    log::debug!("[TELEGRAM] Text from chat {}", chat_id);

    let reply = dispatcher.text(chat_id.0, text).await;
    send_reply(&bot, chat_id, &reply, Some(msg.id)).await
}

/// Run the bot until `shutdown` fires or the dispatcher stops.
pub async fn start_telegram_listener(
    bot: Bot,
    dispatcher: Arc<BotDispatcher>,
    shutdown: CancellationToken,
) -> Result<(), String> {
    log::info!("[TELEGRAM] Validating bot token...");
    let me = match bot.get_me().await {
        Ok(me) => {
            log::info!("[TELEGRAM] Bot validated - username: @{}, id: {}", me.username(), me.id);
            me
        }
        Err(e) => {
            let error = format!("Invalid Telegram bot token: {}", e);
            log::error!("[TELEGRAM] {}", error);
            return Err(error);
        }
    };

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_message().endpoint(handle_message));

    let mut tg_dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher, me])
        .default_handler(|upd| async move {
            log::debug!("[TELEGRAM] Unhandled update: {:?}", upd.kind);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("[TELEGRAM] Handler error"))
        .enable_ctrlc_handler()
        .build();

    tokio::select! {
        _ = shutdown.cancelled() => {
            log::info!("[TELEGRAM] Listener received shutdown signal");
        }
        _ = tg_dispatcher.dispatch() => {
            log::info!("[TELEGRAM] Listener stopped");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::Button;

    #[test]
    fn test_keyboard_markup_rows() {
        let reply = Reply::plain("x").with_keyboard(vec![
            vec![Button::new("A", "a"), Button::new("B", "b")],
            vec![Button::new("C", "c")],
        ]);
        let markup = keyboard_markup(&reply).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "C");

        assert!(keyboard_markup(&Reply::plain("no buttons")).is_none());
    }

    #[test]
    fn test_plain_replies_have_no_parse_mode() {
        assert!(telegram_parse_mode(ParseMode::Plain).is_none());
        assert_eq!(telegram_parse_mode(ParseMode::Html), Some(TgParseMode::Html));
    }
}
