use std::sync::Arc;

use teloxide::prelude::*;

use mrb_core::{
    audit::AuditEvent,
    pipeline::{content_warning, split_reply, url_warning, Action},
    scanner::extract_urls,
};

use crate::router::AppState;

pub async fn handle_text(inbound: mrb_core::messaging::InboundMessage, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = inbound.text.clone() else {
        return Ok(());
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    let user = inbound.sender;
    let chat = inbound.chat;
    let username = inbound.username.clone().unwrap_or_else(|| "unknown".to_string());

    state.stats.record_message(user);

    let urls = extract_urls(&text);
    let action = state.pipeline.screen_text(&text).await;

    // A blocking verdict short-circuits the scan loop at the first
    // occurrence of the offending URL; everything after it was never
    // submitted and must not count as scanned.
    let scanned = match &action {
        Action::RejectUrl { url, .. } => {
            urls.iter().position(|u| u == url).map_or(1, |i| i + 1)
        }
        _ => urls.len(),
    };
    for _ in 0..scanned {
        state.stats.record_url_scan();
    }

    match action {
        Action::RejectUrl { url, verdict } => {
            tracing::info!(
                user_id = user.0,
                url = %url,
                risk = verdict.risk_level.as_str(),
                "message blocked: dangerous URL"
            );
            if let Err(e) = state.messenger.delete_message(inbound.message).await {
                tracing::warn!(error = %e, "failed to delete blocked message");
            }
            let _ = state
                .messenger
                .send_text(chat, &url_warning(&url, &verdict))
                .await;

            state.stats.record_blocked();
            let _ = state.audit.write(AuditEvent::blocked(
                user.0,
                &username,
                &text,
                &[verdict.risk_level.as_str()],
            ));
        }

        Action::RejectContent { violations, .. } => {
            let names: Vec<&str> = violations.iter().map(|v| v.as_str()).collect();
            tracing::info!(
                user_id = user.0,
                violations = ?names,
                "message blocked: content policy"
            );
            if let Err(e) = state.messenger.delete_message(inbound.message).await {
                tracing::warn!(error = %e, "failed to delete blocked message");
            }
            let _ = state
                .messenger
                .send_text(chat, &content_warning(&violations))
                .await;

            state.stats.record_blocked();
            let _ = state
                .audit
                .write(AuditEvent::blocked(user.0, &username, &text, &names));
        }

        Action::Allow { text } => {
            let _ = state
                .audit
                .write(AuditEvent::message(user.0, &username, "TEXT", &text));

            let context = format!("User ID: {}, Chat: {}", user.0, chat.0);
            let reply = state.responder.respond(&text, Some(&context)).await;

            // Long replies go out as ordered chunks under the transport
            // message-size ceiling.
            for chunk in split_reply(&reply, state.cfg.telegram_safe_limit) {
                if let Err(e) = state.messenger.send_text(chat, &chunk).await {
                    tracing::warn!(error = %e, "failed to deliver reply chunk");
                    break;
                }
            }
        }
    }

    Ok(())
}
