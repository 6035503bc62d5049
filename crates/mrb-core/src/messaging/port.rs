use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ArchiveLocator, ChannelId, ChatId, MessageRef, UserId},
    Result,
};

/// Cross-messenger port.
///
/// Telegram is the first implementation; the shape is kept small enough
/// that another transport can sit behind it with the same semantics. The
/// archival and audit sinks are ordinary channels on the same transport.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// Append a document to a storage channel; returns the locator of the
    /// stored copy.
    async fn send_document(
        &self,
        channel: ChannelId,
        path: &Path,
        caption: &str,
        filename: &str,
    ) -> Result<ArchiveLocator>;

    /// Append a text record to a storage channel.
    async fn send_channel_text(&self, channel: ChannelId, text: &str) -> Result<()>;

    /// Download a transport-held file to a local path.
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<()>;

    /// Is the user a member of the given channel (by @handle)?
    async fn is_channel_member(&self, user: UserId, channel_handle: &str) -> Result<bool>;

    async fn ban_chat_member(&self, chat: ChatId, user: UserId) -> Result<()>;
    async fn unban_chat_member(&self, chat: ChatId, user: UserId) -> Result<()>;
}
