//! Telegram adapter (teloxide).
//!
//! This crate implements the `mrb-core` MessagingPort over the Telegram
//! Bot API: ordinary chats plus the archival/audit storage channels.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{net::Download, prelude::*, types::InputFile};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

#[cfg(test)]
pub(crate) mod testutil;

use mrb_core::{
    domain::{ArchiveLocator, ChannelId, ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::MessagingPort,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_channel(channel: ChannelId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(channel.0)
    }

    fn tg_user(user: UserId) -> teloxide::types::UserId {
        teloxide::types::UserId(user.0 as u64)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot.delete_message(
                Self::tg_chat(msg.chat_id),
                teloxide::types::MessageId(msg.message_id.0),
            )
        })
        .await?;
        Ok(())
    }

    async fn send_document(
        &self,
        channel: ChannelId,
        path: &Path,
        caption: &str,
        filename: &str,
    ) -> Result<ArchiveLocator> {
        let msg = self
            .with_retry(|| {
                let file = InputFile::file(path).file_name(filename.to_string());
                self.bot
                    .send_document(Self::tg_channel(channel), file)
                    .caption(caption.to_string())
            })
            .await?;

        Ok(ArchiveLocator(msg.id.0.to_string()))
    }

    async fn send_channel_text(&self, channel: ChannelId, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_channel(channel), text.to_string())
        })
        .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<()> {
        let file = self
            .with_retry(|| self.bot.get_file(file_id.to_string()))
            .await?;

        let mut out = tokio::fs::File::create(dest).await.map_err(Error::Io)?;
        self.bot
            .download_file(&file.path, &mut out)
            .await
            .map_err(|e| Error::External(format!("telegram download error: {e}")))?;
        Ok(())
    }

    async fn is_channel_member(&self, user: UserId, channel_handle: &str) -> Result<bool> {
        use teloxide::types::{ChatMemberStatus, Recipient};

        let handle = if channel_handle.starts_with('@') {
            channel_handle.to_string()
        } else {
            format!("@{channel_handle}")
        };

        let member = self
            .with_retry(|| {
                self.bot.get_chat_member(
                    Recipient::ChannelUsername(handle.clone()),
                    Self::tg_user(user),
                )
            })
            .await?;

        Ok(matches!(
            member.status(),
            ChatMemberStatus::Owner | ChatMemberStatus::Administrator | ChatMemberStatus::Member
        ))
    }

    async fn ban_chat_member(&self, chat: ChatId, user: UserId) -> Result<()> {
        self.with_retry(|| self.bot.ban_chat_member(Self::tg_chat(chat), Self::tg_user(user)))
            .await?;
        Ok(())
    }

    async fn unban_chat_member(&self, chat: ChatId, user: UserId) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .unban_chat_member(Self::tg_chat(chat), Self::tg_user(user))
        })
        .await?;
        Ok(())
    }
}
