use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

use mrb_core::{
    audit::{iso_timestamp_utc, AuditEvent},
    domain::UserId,
    messaging::InboundMessage,
    scanner::ScanVerdict,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn format_scan_report(url: &str, verdict: &ScanVerdict) -> String {
    let mut lines = vec![
        "URL Scan Report".to_string(),
        format!("URL: {url}"),
        format!("Risk level: {}", verdict.risk_level.as_str().to_uppercase()),
    ];
    if let Some(score) = verdict.score {
        lines.push(format!("Score: {score}/100"));
    }
    lines.push(format!(
        "Status: {}",
        if verdict.is_safe {
            "No blocking threat found"
        } else {
            "Threat detected"
        }
    ));
    lines.push(format!("Details: {}", verdict.message));
    if let Some(report) = &verdict.report_url {
        lines.push(format!("Full report: {report}"));
    }
    lines.join("\n")
}

/// Append a text record to the audit channel. Best-effort like the intake
/// audit record: losing it is logged, never surfaced.
async fn post_audit_record(state: &AppState, text: &str) {
    if let Err(e) = state
        .messenger
        .send_channel_text(state.cfg.audit_channel, text)
        .await
    {
        tracing::warn!(error = %e, "audit channel record lost");
    }
}

fn user_record(user: UserId, username: &str) -> String {
    format!(
        "New User\nID: {}\nUsername: @{username}\nTime: {}",
        user.0,
        iso_timestamp_utc(),
    )
}

fn admin_action_record(by: UserId, by_name: &str, action: &str, target: UserId) -> String {
    format!(
        "Admin Action\nAction: {action}\nTarget: {}\nBy: {} (@{by_name})\nTime: {}",
        target.0,
        by.0,
        iso_timestamp_utc(),
    )
}

pub async fn handle_command(
    bot: Bot,
    inbound: InboundMessage,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(text) = inbound.text.as_deref() else {
        return Ok(());
    };

    let user = inbound.sender;
    let chat = inbound.chat;
    let username = inbound.username.clone().unwrap_or_else(|| "unknown".to_string());

    let (cmd, arg) = parse_command(text);

    match cmd.as_str() {
        "start" | "help" => {
            let body = format!(
                "Hello! I am a moderation relay bot run by {}.\n\n\
Send me a message and I will screen it and answer.\n\
Send me a file and I will archive it safely.\n\n\
Commands:\n\
/start - Show this message\n\
/scan <url> - Scan a URL for threats\n\
/stats - Usage statistics (admins)\n\
/admin - Admin panel (admins)\n\
/ban <user_id> - Ban a user (admins)\n\
/unban <user_id> - Unban a user (admins)\n\
/addadmin <user_id> - Grant admin (owner)\n\
/deladmin <user_id> - Revoke admin (owner)",
                state.cfg.bot_owner_name,
            );
            let _ = state.messenger.send_text(chat, &body).await;

            post_audit_record(&state, &user_record(user, &username)).await;
            let _ = state
                .audit
                .write(AuditEvent::message(user.0, &username, "COMMAND", "/start"));
        }

        "scan" => {
            if arg.is_empty() {
                let _ = state
                    .messenger
                    .send_text(chat, "Usage: /scan <url>")
                    .await;
                return Ok(());
            }

            let _ = state
                .messenger
                .send_text(chat, "Scanning URL... Please wait.")
                .await;

            state.stats.record_url_scan();
            let verdict = state.scanner.scan(&arg).await;
            let _ = state
                .messenger
                .send_text(chat, &format_scan_report(&arg, &verdict))
                .await;
        }

        "stats" => {
            if !state.directory.is_admin(user) {
                let _ = state
                    .messenger
                    .send_text(chat, "This command is for admins only.")
                    .await;
                return Ok(());
            }
            let _ = state
                .messenger
                .send_text(chat, &format_stats(&state))
                .await;
        }

        "admin" => {
            if !state.directory.is_admin(user) {
                let _ = state
                    .messenger
                    .send_text(chat, "This command is for admins only.")
                    .await;
                return Ok(());
            }

            let keyboard = InlineKeyboardMarkup::new(vec![vec![
                InlineKeyboardButton::callback("Statistics", "admin_stats"),
                InlineKeyboardButton::callback("Settings", "admin_settings"),
            ]]);
            let _ = bot
                .send_message(teloxide::types::ChatId(chat.0), "Admin panel")
                .reply_markup(keyboard)
                .await;
        }

        "ban" | "unban" => {
            if !state.directory.is_admin(user) {
                let _ = state
                    .messenger
                    .send_text(chat, "This command is for admins only.")
                    .await;
                return Ok(());
            }
            let Some(target) = parse_user_arg(&arg) else {
                let _ = state
                    .messenger
                    .send_text(chat, &format!("Usage: /{cmd} <user_id>"))
                    .await;
                return Ok(());
            };

            let (recorded, verb) = if cmd == "ban" {
                (state.directory.record_ban(target, user), "banned")
            } else {
                (state.directory.record_unban(target, user), "unbanned")
            };
            if !recorded {
                let _ = state
                    .messenger
                    .send_text(chat, "Not permitted.")
                    .await;
                return Ok(());
            }

            // Chat-level enforcement is best-effort: the directory entry
            // already drops the user's traffic either way.
            let outcome = if cmd == "ban" {
                state.messenger.ban_chat_member(chat, target).await
            } else {
                state.messenger.unban_chat_member(chat, target).await
            };
            if let Err(e) = outcome {
                tracing::warn!(target = target.0, error = %e, "chat member update failed");
            }

            let _ = state
                .messenger
                .send_text(chat, &format!("User {} {verb}.", target.0))
                .await;
            post_audit_record(&state, &admin_action_record(user, &username, verb, target)).await;
            let _ = state.audit.write(AuditEvent::auth(
                user.0,
                &username,
                &format!("{verb} {}", target.0),
                None,
            ));
        }

        "addadmin" | "deladmin" => {
            if !state.directory.is_owner(user) {
                let _ = state
                    .messenger
                    .send_text(chat, "This command is for the owner only.")
                    .await;
                return Ok(());
            }
            let Some(target) = parse_user_arg(&arg) else {
                let _ = state
                    .messenger
                    .send_text(chat, &format!("Usage: /{cmd} <user_id>"))
                    .await;
                return Ok(());
            };

            let (changed, verb) = if cmd == "addadmin" {
                (state.directory.add_admin(target, user), "promoted to admin")
            } else {
                (state.directory.remove_admin(target, user), "demoted")
            };

            let reply = if changed {
                format!("User {} {verb}.", target.0)
            } else {
                "No change.".to_string()
            };
            let _ = state.messenger.send_text(chat, &reply).await;
            if changed {
                post_audit_record(&state, &admin_action_record(user, &username, verb, target))
                    .await;
                let _ = state.audit.write(AuditEvent::auth(
                    user.0,
                    &username,
                    &format!("{verb}: {}", target.0),
                    None,
                ));
            }
        }

        _ => {
            let _ = state
                .messenger
                .send_text(chat, "Unknown command. Use /help to see what I can do.")
                .await;
        }
    }

    Ok(())
}

fn parse_user_arg(arg: &str) -> Option<UserId> {
    arg.split_whitespace()
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .map(UserId)
}

pub(crate) fn format_stats(state: &AppState) -> String {
    let snap = state.stats.snapshot();
    format!(
        "Bot Statistics\n\n\
Messages processed: {}\n\
Files archived: {}\n\
URLs scanned: {}\n\
Messages blocked: {}\n\
Active users: {}\n\
Admins: {}\n\
Banned users: {}",
        snap.messages,
        snap.files,
        snap.urls_scanned,
        snap.blocked,
        snap.active_users,
        state.directory.admin_count(),
        state.directory.banned_count(),
    )
}
