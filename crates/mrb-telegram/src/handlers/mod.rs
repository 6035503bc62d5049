//! Telegram update handlers.
//!
//! Each handler is a thin adapter: it converts the teloxide update into the
//! transport-agnostic `InboundMessage`, runs the gatekeeping checks (ban
//! list, force-subscribe), and hands off to the core pipeline. All
//! user-visible side effects go back out through the `MessagingPort`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message},
};

use mrb_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::{Attachment, AttachmentKind, InboundMessage},
};

use crate::router::AppState;

mod callback;
mod commands;
mod media;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

/// Where an inbound message goes after gatekeeping. The gate outranks
/// everything except the ban list: commands included, an unsubscribed
/// user only ever sees the join prompt.
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Drop,
    GatePrompt,
    Command,
    Media,
    Text,
    Ignore,
}

fn route(inbound: &InboundMessage, banned: bool, gated: bool) -> Route {
    if banned {
        return Route::Drop;
    }
    if gated {
        return Route::GatePrompt;
    }
    if let Some(text) = inbound.text.as_deref() {
        if text.starts_with('/') {
            return Route::Command;
        }
    }
    if inbound.attachment.is_some() {
        return Route::Media;
    }
    if inbound.text.is_some() {
        return Route::Text;
    }
    Route::Ignore
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(inbound) = to_inbound(&msg) else {
        return Ok(());
    };

    let banned = state.directory.is_banned(inbound.sender);
    let missing = if banned {
        Vec::new()
    } else {
        missing_subscriptions(&state, inbound.sender).await
    };

    let chat_id = inbound.chat.0;

    match route(&inbound, banned, !missing.is_empty()) {
        Route::Drop => {
            tracing::debug!(user_id = inbound.sender.0, "dropping message from banned user");
            Ok(())
        }
        Route::GatePrompt => {
            send_join_prompt(&bot, &msg, &missing).await;
            Ok(())
        }
        Route::Command => commands::handle_command(bot, inbound, state).await,
        Route::Media => {
            let _guard = state.chat_locks.lock_chat(chat_id).await;
            media::handle_media(inbound, state).await
        }
        Route::Text => {
            let _guard = state.chat_locks.lock_chat(chat_id).await;
            text::handle_text(inbound, state).await
        }
        Route::Ignore => Ok(()),
    }
}

/// Convert a teloxide message into the transport-agnostic event. Messages
/// without a sender (channel posts) are ignored.
fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let user = msg.from()?;

    let attachment = if let Some(doc) = msg.document() {
        Some(Attachment {
            file_id: doc.file.id.clone(),
            kind: AttachmentKind::Document,
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.to_string()),
        })
    } else if let Some(sizes) = msg.photo() {
        // Telegram sends several resolutions; the last one is the largest.
        sizes.last().map(|p| Attachment {
            file_id: p.file.id.clone(),
            kind: AttachmentKind::Photo,
            file_name: None,
            mime_type: Some("image/jpeg".to_string()),
        })
    } else if let Some(video) = msg.video() {
        Some(Attachment {
            file_id: video.file.id.clone(),
            kind: AttachmentKind::Video,
            file_name: video.file_name.clone(),
            mime_type: video.mime_type.as_ref().map(|m| m.to_string()),
        })
    } else if let Some(audio) = msg.audio() {
        Some(Attachment {
            file_id: audio.file.id.clone(),
            kind: AttachmentKind::Audio,
            file_name: audio.file_name.clone(),
            mime_type: audio.mime_type.as_ref().map(|m| m.to_string()),
        })
    } else {
        None
    };

    Some(InboundMessage {
        sender: UserId(user.id.0 as i64),
        chat: ChatId(msg.chat.id.0),
        message: MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        },
        username: user.username.clone(),
        text: msg.text().or(msg.caption()).map(|s| s.to_string()),
        attachment,
        timestamp: msg.date.timestamp(),
    })
}

/// Channels (by @handle) the user still has to join before the bot serves
/// them. Empty when the gate is disabled or the user is staff. Membership
/// lookups that fail count as satisfied so a channel outage never locks
/// everyone out.
pub(crate) async fn missing_subscriptions(state: &AppState, user: UserId) -> Vec<String> {
    if state.cfg.force_sub_channels.is_empty() || state.directory.is_admin(user) {
        return Vec::new();
    }

    let mut missing = Vec::new();
    for handle in &state.cfg.force_sub_channels {
        match state.messenger.is_channel_member(user, handle).await {
            Ok(true) => {}
            Ok(false) => missing.push(handle.clone()),
            Err(e) => {
                tracing::warn!(channel = %handle, error = %e, "membership check failed");
            }
        }
    }
    missing
}

async fn send_join_prompt(bot: &Bot, msg: &Message, missing: &[String]) {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = missing
        .iter()
        .filter_map(|handle| {
            let plain = handle.trim_start_matches('@');
            let url = reqwest::Url::parse(&format!("https://t.me/{plain}")).ok()?;
            Some(vec![InlineKeyboardButton::url(format!("Join @{plain}"), url)])
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "I've joined",
        "subscribe_check",
    )]);

    let _ = bot
        .send_message(
            msg.chat.id,
            "Please join our channel(s) to use this bot, then tap the button below.",
        )
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await;
}
