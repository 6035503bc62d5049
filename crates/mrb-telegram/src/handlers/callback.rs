use std::sync::Arc;

use teloxide::prelude::*;

use mrb_core::domain::{ChatId, MessageId, MessageRef, UserId};

use crate::handlers::{commands::format_stats, missing_subscriptions};
use crate::router::AppState;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user = UserId(q.from.id.0 as i64);
    let data = q.data.clone().unwrap_or_default();

    let Some(msg) = q.message.as_ref() else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };
    let chat_id = msg.chat.id;

    match data.as_str() {
        "admin_stats" => {
            if !state.directory.is_admin(user) {
                let _ = bot.answer_callback_query(cb_id).text("Admins only").await;
                return Ok(());
            }
            let _ = bot
                .edit_message_text(chat_id, msg.id, format_stats(&state))
                .await;
            let _ = bot.answer_callback_query(cb_id).await;
        }

        "admin_settings" => {
            if !state.directory.is_admin(user) {
                let _ = bot.answer_callback_query(cb_id).text("Admins only").await;
                return Ok(());
            }
            let body = format!(
                "Settings\n\n\
Force-subscribe channels: {}\n\
URL scan settle: {}s\n\
Reply chunk limit: {} chars\n\
URL scanning: {}\n\
AI moderation: {}",
                if state.cfg.force_sub_channels.is_empty() {
                    "disabled".to_string()
                } else {
                    state.cfg.force_sub_channels.join(", ")
                },
                state.cfg.scan_settle.as_secs(),
                state.cfg.telegram_safe_limit,
                if state.cfg.urlscan_api_key.is_some() {
                    "enabled"
                } else {
                    "no API key"
                },
                if state.cfg.gemini_api_key.is_some() {
                    "enabled"
                } else {
                    "no API key"
                },
            );
            let _ = bot.edit_message_text(chat_id, msg.id, body).await;
            let _ = bot.answer_callback_query(cb_id).await;
        }

        "subscribe_check" => {
            let missing = missing_subscriptions(&state, user).await;
            if missing.is_empty() {
                let _ = bot
                    .answer_callback_query(cb_id)
                    .text("Thanks for subscribing! You can use the bot now.")
                    .await;
                // The join prompt has served its purpose.
                let _ = state
                    .messenger
                    .delete_message(MessageRef {
                        chat_id: ChatId(chat_id.0),
                        message_id: MessageId(msg.id.0),
                    })
                    .await;
            } else {
                let _ = bot
                    .answer_callback_query(cb_id)
                    .text("You haven't joined all required channels yet.")
                    .show_alert(true)
                    .await;
            }
        }

        _ => {
            let _ = bot.answer_callback_query(cb_id).await;
        }
    }

    Ok(())
}
