use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use std::sync::Arc;

use teloxide::prelude::*;

use mrb_core::{
    audit::AuditEvent,
    intake::{format_file_size, TempFile},
    messaging::InboundMessage,
};

use crate::router::AppState;

static FILE_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.trim_matches(['.', '_']).is_empty() {
        "upload".to_string()
    } else {
        out
    }
}

fn uniquify_filename(name: &str, ts: u128, n: usize) -> String {
    let base = sanitize_filename(name);
    if let Some((stem, ext)) = base.rsplit_once('.') {
        if !stem.is_empty() && !ext.is_empty() {
            return format!("{stem}_{ts}_{n}.{ext}");
        }
    }
    format!("{base}_{ts}_{n}")
}

pub async fn handle_media(inbound: InboundMessage, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(attachment) = inbound.attachment.clone() else {
        return Ok(());
    };

    let user = inbound.sender;
    let chat = inbound.chat;
    let username = inbound.username.clone().unwrap_or_else(|| "unknown".to_string());
    let display_name = attachment.display_name();

    let _ = state
        .messenger
        .send_text(chat, "Processing your file...")
        .await;

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let n = FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let local_path = state
        .cfg
        .temp_dir
        .join(uniquify_filename(&display_name, ts, n));

    if let Err(e) = state
        .messenger
        .download_file(&attachment.file_id, &local_path)
        .await
    {
        tracing::warn!(error = %e, file = %display_name, "file download failed");
        let _ = state
            .messenger
            .send_text(chat, "Failed to download your file. Please try again.")
            .await;
        let _ = state.audit.write(AuditEvent::error(
            user.0,
            &username,
            &e.to_string(),
            Some("file download"),
        ));
        return Ok(());
    }

    // Cleanup on every exit path from here on.
    let local = TempFile::new(local_path);

    if attachment.is_image() {
        if let Some(reason) = state.pipeline.screen_image(local.path()) {
            tracing::info!(user_id = user.0, reason = %reason, "image rejected before intake");
            if let Err(e) = state.messenger.delete_message(inbound.message).await {
                tracing::warn!(error = %e, "failed to delete rejected image message");
            }
            let _ = state
                .messenger
                .send_text(chat, &format!("File removed: {reason}"))
                .await;

            state.stats.record_blocked();
            let _ = state.audit.write(AuditEvent::blocked(
                user.0,
                &username,
                &display_name,
                &["Unsafe image"],
            ));
            return Ok(());
        }
    }

    match state.intake.archive(local.path(), user.0, &display_name).await {
        Ok(record) => {
            state.stats.record_file();

            let summary = format!(
                "File received and archived.\n\nName: {}\nSize: {}\nType: {}\nHash: {}\nRef: {}",
                record.original_name,
                format_file_size(record.size_bytes),
                record.mime_type,
                &record.content_hash[..16.min(record.content_hash.len())],
                record.archive_locator,
            );
            let _ = state.messenger.send_text(chat, &summary).await;

            let _ = state.audit.write(AuditEvent::file(
                user.0,
                &username,
                &record.original_name,
                &record.archive_locator.to_string(),
            ));
        }
        Err(e) => {
            tracing::warn!(error = %e, file = %display_name, "file archival failed");
            let _ = state
                .messenger
                .send_text(chat, "Failed to archive your file. Please try again later.")
                .await;
            let _ = state.audit.write(AuditEvent::error(
                user.0,
                &username,
                &e.to_string(),
                Some("file archival"),
            ));
        }
    }

    Ok(())
}
