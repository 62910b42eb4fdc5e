//! File storage: uploads from chat, directory browsing and re-sending
//! stored files.
//!
//! Directories are logical paths kept by the backend. On disk every upload
//! lands flat in the storage root under its original name, with a `_N`
//! suffix when that name is taken.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;
use std::path::{Path, PathBuf};

use super::{format_size, truncate, Button, CallbackOutcome, MediaKind, Reply, SendFile};
use crate::graphql::models::{DirectoryInfo, FileConnection, FileRecord};
use crate::graphql::{queries, take_field, BackendSession, GraphQLError};
use crate::sessions::{normalize_directory, SessionStore};

const LISTING_LIMIT: i64 = 20;
const DOWNLOAD_MENU_LIMIT: i64 = 10;
const SUBDIRECTORIES_SHOWN: usize = 10;
const SUBDIRECTORY_BUTTONS: usize = 5;
const FILES_SHOWN: usize = 10;
const FILENAME_MAX: usize = 30;
const FILENAME_KEEP: usize = 27;

/// Downloads a file held by Telegram to a local path.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, telegram_file_id: &str, destination: &Path) -> Result<(), String>;
}

/// A document or photo received in chat
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub kind: MediaKind,
    pub telegram_file_id: String,
    pub telegram_file_unique_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub message_id: i32,
}

impl IncomingFile {
    /// Photos arrive without a name and are always JPEG.
    fn name_and_mime(&self, now: NaiveDateTime) -> (String, String) {
        match self.kind {
            MediaKind::Photo => (
                format!("photo_{}.jpg", now.format("%Y%m%d_%H%M%S")),
                "image/jpeg".to_string(),
            ),
            MediaKind::Document => (
                self.file_name
                    .as_deref()
                    .and_then(|n| Path::new(n).file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file".to_string()),
                self.mime_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            ),
        }
    }
}

/// Upload target and description from a caption. `/path` picks the directory;
/// `dir → description` picks both; anything else is a description.
pub fn parse_caption(caption: Option<&str>, current_directory: &str) -> (String, Option<String>) {
    let (directory, description) = match caption {
        Some(c) if c.starts_with('/') => (c.trim().to_string(), None),
        Some(c) if c.contains('→') => {
            let (dir, desc) = c.split_once('→').unwrap_or((c, ""));
            let desc = desc.trim();
            (
                dir.trim().to_string(),
                (!desc.is_empty()).then(|| desc.to_string()),
            )
        }
        Some(c) => (current_directory.to_string(), Some(c.to_string())),
        None => (current_directory.to_string(), None),
    };
    (normalize_directory(&directory), description)
}

/// `name`, or `stem_N.ext` for the first N not already present in `root`.
pub fn unique_storage_name(root: &Path, name: &str) -> String {
    if !root.join(name).exists() {
        return name.to_string();
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1;
    loop {
        let candidate = format!("{}_{}{}", stem, counter, ext);
        if !root.join(&candidate).exists() {
            return candidate;
        }
        counter += 1;
    }
}

pub async fn upload(
    backend: &BackendSession,
    store: &SessionStore,
    chat_id: i64,
    storage_root: &Path,
    fetcher: &dyn FileFetcher,
    incoming: IncomingFile,
    now: NaiveDateTime,
) -> Reply {
    let (original_name, mime_type) = incoming.name_and_mime(now);
    let (directory, description) =
        parse_caption(incoming.caption.as_deref(), &store.current_directory(chat_id));

    let mut stored_at: Option<PathBuf> = None;
    let result = store_and_register(
        backend,
        storage_root,
        fetcher,
        &incoming,
        &original_name,
        &mime_type,
        &directory,
        description.as_deref(),
        &mut stored_at,
    )
    .await;

    match result {
        Ok(Some((record, size))) => {
            log::info!(
                "[FILES] Chat {} uploaded {} to {} as {}",
                chat_id, original_name, directory, record.id
            );
            let mut text = format!(
                "✅ *File uploaded successfully!*\n\n\
                 📁 Directory: `{}`\n📄 Filename: `{}`\n💾 Size: {}\n🆔 ID: `{}`",
                directory,
                original_name,
                format_size(size as i64, false),
                record.id
            );
            if let Some(description) = &description {
                text.push_str(&format!("\n📝 Description: {}", description));
            }
            Reply::markdown(text).with_keyboard(vec![vec![
                Button::new("📂 View Directory", format!("files_list:{}", directory)),
                Button::new("🏠 Root", "files_list:/"),
            ]])
        }
        Ok(None) => {
            remove_stored(stored_at.as_deref()).await;
            Reply::plain("❌ Failed to create file record")
        }
        Err(e) => {
            log::error!("[FILES] Upload failed for chat {}: {}", chat_id, e);
            remove_stored(stored_at.as_deref()).await;
            Reply::plain(format!("❌ Error uploading file: {}", e))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn store_and_register(
    backend: &BackendSession,
    storage_root: &Path,
    fetcher: &dyn FileFetcher,
    incoming: &IncomingFile,
    original_name: &str,
    mime_type: &str,
    directory: &str,
    description: Option<&str>,
    stored_at: &mut Option<PathBuf>,
) -> Result<Option<(FileRecord, u64)>, String> {
    tokio::fs::create_dir_all(storage_root)
        .await
        .map_err(|e| format!("Failed to create storage directory: {}", e))?;

    let storage_name = unique_storage_name(storage_root, original_name);
    let target = storage_root.join(&storage_name);
    *stored_at = Some(target.clone());

    fetcher.fetch(&incoming.telegram_file_id, &target).await?;
    let size = tokio::fs::metadata(&target)
        .await
        .map_err(|e| format!("Failed to read stored file: {}", e))?
        .len();
    log::info!("[FILES] Saved {} ({} bytes)", target.display(), size);

    let variables = json!({
        "input": {
            "filename": original_name,
            "directory": directory,
            "originalFilename": original_name,
            "mimeType": mime_type,
            "fileSize": size,
            "telegramFileId": incoming.telegram_file_id,
            "telegramFileUniqueId": incoming.telegram_file_unique_id,
            "telegramMessageId": incoming.message_id,
            "storagePath": storage_name,
            "description": description,
            "tags": [],
        }
    });

    let record: Option<FileRecord> = backend
        .fetch(queries::CREATE_FILE, variables, "createFile")
        .await
        .map_err(|e| e.to_string())?;
    Ok(record.map(|r| (r, size)))
}

async fn remove_stored(path: Option<&Path>) {
    let Some(path) = path else { return };
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::error!("[FILES] Failed to clean up {}: {}", path.display(), e);
        }
    }
}

/// `None` for the root.
pub fn parent_directory(directory: &str) -> Option<String> {
    if directory == "/" {
        return None;
    }
    let parent = Path::new(directory)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    Some(normalize_directory(&parent))
}

fn short_name(name: &str) -> String {
    truncate(name, FILENAME_MAX, FILENAME_KEEP)
}

/// Lists `directory` and makes it the chat's upload directory.
pub async fn directory_listing(
    backend: &BackendSession,
    store: &SessionStore,
    chat_id: i64,
    directory: &str,
) -> Result<Reply, GraphQLError> {
    let directory = normalize_directory(directory);

    let data = backend
        .execute(
            queries::DIRECTORY_LISTING,
            json!({
                "filter": { "directory": directory },
                "limit": LISTING_LIMIT,
                "directory": directory,
            }),
        )
        .await?;
    let files: Option<FileConnection> = take_field(data.clone(), "files")?;
    let info: DirectoryInfo = take_field(data, "directory")?.unwrap_or_default();

    let (files, total) = match files {
        Some(conn) => {
            let total = conn.total_count.unwrap_or(conn.nodes.len() as i64);
            (conn.nodes, total)
        }
        None => (Vec::new(), 0),
    };

    let reply = render_listing(&directory, &files, total, &info.subdirectories);
    store.set_current_directory(chat_id, &directory);
    Ok(reply)
}

pub fn render_listing(directory: &str, files: &[FileRecord], total: i64, subdirectories: &[String]) -> Reply {
    let mut text = format!("📂 *Directory:* `{}`\n📊 Files: {}\n\n", directory, total);

    if !subdirectories.is_empty() {
        text.push_str("*📁 Subdirectories:*\n");
        for sub in subdirectories.iter().take(SUBDIRECTORIES_SHOWN) {
            text.push_str(&format!("  └─ `{}`\n", sub));
        }
        if subdirectories.len() > SUBDIRECTORIES_SHOWN {
            text.push_str(&format!(
                "  ... and {} more\n",
                subdirectories.len() - SUBDIRECTORIES_SHOWN
            ));
        }
        text.push('\n');
    }

    if files.is_empty() {
        text.push_str("_No files in this directory_\n");
    } else {
        text.push_str("*📄 Files:*\n");
        for file in files.iter().take(FILES_SHOWN) {
            text.push_str(&format!(
                "  • `{}` ({})\n",
                short_name(file.display_name()),
                format_size(file.file_size.unwrap_or(0), true)
            ));
        }
        if total > FILES_SHOWN as i64 {
            text.push_str(&format!("  ... and {} more files\n", total - FILES_SHOWN as i64));
        }
    }

    let mut keyboard = Vec::new();
    if let Some(parent) = parent_directory(directory) {
        keyboard.push(vec![Button::new(
            "⬆️ Parent Directory",
            format!("files_list:{}", parent),
        )]);
    }
    for sub in subdirectories.iter().take(SUBDIRECTORY_BUTTONS) {
        let path = if directory == "/" {
            format!("/{}", sub)
        } else {
            format!("{}/{}", directory, sub)
        };
        keyboard.push(vec![Button::new(format!("📁 {}", sub), format!("files_list:{}", path))]);
    }

    let mut actions = Vec::new();
    if !files.is_empty() {
        actions.push(Button::new("📥 Download", format!("files_download_menu:{}", directory)));
    }
    actions.push(Button::new("🔄 Refresh", format!("files_list:{}", directory)));
    keyboard.push(actions);
    keyboard.push(vec![Button::new("🏠 Root", "files_list:/")]);

    Reply::markdown(text).with_keyboard(keyboard)
}

/// `/files [dir]`: lists `dir`, or the root.
pub async fn files_command(
    backend: &BackendSession,
    store: &SessionStore,
    chat_id: i64,
    args: &str,
) -> Reply {
    let directory = if args.trim().is_empty() { "/" } else { args.trim() };
    match directory_listing(backend, store, chat_id, directory).await {
        Ok(reply) => reply,
        Err(e) => {
            log::error!("[FILES] Listing {} failed: {}", directory, e);
            Reply::plain(format!("❌ Error listing files: {}", e))
        }
    }
}

/// `/cd [dir]`: shows or sets the upload directory.
pub fn cd_command(store: &SessionStore, chat_id: i64, args: &str) -> Reply {
    if args.trim().is_empty() {
        return Reply::markdown(format!(
            "📂 *Current upload directory:* `{}`\n\n\
             Usage: `/cd /path/to/directory`\n\
             Example: `/cd /documents/work`\n\n\
             💡 _This sets where new files will be uploaded. Use /files to view files in any directory._",
            store.current_directory(chat_id)
        ));
    }

    let directory = store.set_current_directory(chat_id, args);
    log::info!("[FILES] Chat {} upload directory set to {}", chat_id, directory);
    Reply::markdown(format!(
        "✅ *Upload directory changed to:* `{dir}`\n\n\
         📤 Files you upload now will be saved to this directory.\n\
         📂 Use `/files {dir}` to view files in this directory.",
        dir = directory
    ))
}

pub async fn download_menu(backend: &BackendSession, directory: &str) -> CallbackOutcome {
    let files: Result<Option<FileConnection>, _> = backend
        .fetch(
            queries::DOWNLOADABLE_FILES,
            json!({ "filter": { "directory": directory }, "limit": DOWNLOAD_MENU_LIMIT }),
            "files",
        )
        .await;

    let files = match files {
        Ok(conn) => conn.map(|c| c.nodes).unwrap_or_default(),
        Err(e) => {
            log::error!("[FILES] Download menu for {} failed: {}", directory, e);
            return CallbackOutcome::toast(format!("❌ Error: {}", e));
        }
    };

    if files.is_empty() {
        return CallbackOutcome::toast("No files to download");
    }

    let mut keyboard: Vec<Vec<Button>> = files
        .iter()
        .map(|f| {
            vec![Button::new(
                format!("📄 {}", short_name(f.display_name())),
                format!("files_download:{}", f.id),
            )]
        })
        .collect();
    keyboard.push(vec![Button::new("⬅️ Back", format!("files_list:{}", directory))]);

    CallbackOutcome::edit(
        Reply::markdown(format!("📥 *Select file to download:*\n\nDirectory: `{}`", directory))
            .with_keyboard(keyboard),
    )
}

pub async fn download(backend: &BackendSession, file_id: &str) -> CallbackOutcome {
    let file: Result<Option<FileRecord>, _> =
        backend.fetch(queries::FILE, json!({ "id": file_id }), "file").await;

    let file = match file {
        Ok(Some(file)) => file,
        Ok(None) => {
            return CallbackOutcome {
                toast: Some("⏳ Preparing download...".to_string()),
                follow_up: Some(Reply::plain("❌ File not found")),
                ..Default::default()
            };
        }
        Err(e) => {
            log::error!("[FILES] Download of {} failed: {}", file_id, e);
            return CallbackOutcome::toast(format!("❌ Error: {}", e));
        }
    };

    let mut outcome = CallbackOutcome::toast("⏳ Preparing download...");
    match file.telegram_file_id.clone() {
        Some(telegram_file_id) => {
            let mut caption = format!("📄 {}\n", file.display_name());
            if let Some(description) = file.description.as_deref().filter(|d| !d.is_empty()) {
                caption.push_str(&format!("📝 {}\n", description));
            }
            caption.push_str(&format!("📂 {}", file.directory.as_deref().unwrap_or("/")));

            let kind = if file.is_image() {
                MediaKind::Photo
            } else {
                MediaKind::Document
            };
            log::info!("[FILES] Re-sending {} as {:?}", file.id, kind);
            outcome.file = Some(SendFile {
                kind,
                telegram_file_id,
                caption,
            });
        }
        None => {
            outcome.follow_up = Some(Reply::plain(
                "⚠️ File not cached in Telegram. Download from storage not yet implemented.",
            ));
        }
    }
    outcome
}
