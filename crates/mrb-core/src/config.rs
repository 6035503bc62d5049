use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::ChannelId, errors::Error, Result};

/// Typed configuration for the bot.
///
/// Everything comes from environment variables (with `.env` support),
/// mirroring the variable names the deployment already uses.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub owner_id: i64,
    pub admin_id: i64,
    pub bot_owner_name: String,

    // External services (optional: missing keys degrade the feature,
    // they never crash the bot)
    pub gemini_api_key: Option<String>,
    pub urlscan_api_key: Option<String>,

    // Storage channels
    pub storage_channel: ChannelId,
    pub audit_channel: ChannelId,

    // Force-subscribe gate (channel @handles; empty disables the gate)
    pub force_sub_channels: Vec<String>,

    // Scanning
    pub scan_settle: Duration,

    // Telegram limits
    pub telegram_safe_limit: usize,

    // Retrieval-loop retry / process-restart budget
    pub connect_max_attempts: u32,
    pub connect_base_delay: Duration,
    pub restart_cap: u32,
    pub restart_window: Duration,

    // Local paths
    pub temp_dir: PathBuf,
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let owner_id = env_i64("OWNER_ID").unwrap_or(0);
        let admin_id = env_i64("ADMIN_ID").unwrap_or(0);
        let bot_owner_name = env_str("BOT_OWNER_NAME").unwrap_or_else(|| "Owner".to_string());

        let gemini_api_key = env_str("GEMINI_API_KEY").and_then(non_empty);
        let urlscan_api_key = env_str("URLSCAN_API_KEY").and_then(non_empty);

        let storage_channel = ChannelId(env_i64("STORAGE_CHANNEL_ID").unwrap_or(0));
        let audit_channel = ChannelId(env_i64("USER_DATA_SAVE_CHANNEL_ID").unwrap_or(0));

        let force_sub_channels = parse_csv(env_str("FORCE_SUB_CHANNELS"));

        let scan_settle = Duration::from_secs(env_u64("SCAN_SETTLE_SECS").unwrap_or(10));

        // A zero ceiling would break reply chunking downstream.
        let telegram_safe_limit = env_usize("TELEGRAM_SAFE_LIMIT").unwrap_or(4000).max(1);

        let connect_max_attempts = env_u32("CONNECT_MAX_ATTEMPTS").unwrap_or(5);
        let connect_base_delay =
            Duration::from_secs(env_u64("CONNECT_BASE_DELAY_SECS").unwrap_or(5));
        let restart_cap = env_u32("MAX_RESTARTS_PER_HOUR").unwrap_or(10);
        let restart_window = Duration::from_secs(env_u64("RESTART_WINDOW_SECS").unwrap_or(3600));

        let temp_dir = PathBuf::from(env_str("TEMP_DIR").unwrap_or("/tmp/mrb-uploads".to_string()));
        fs::create_dir_all(&temp_dir)?;

        let audit_log_path =
            PathBuf::from(env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/mrb-audit.log".to_string()));
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            bot_token,
            owner_id,
            admin_id,
            bot_owner_name,
            gemini_api_key,
            urlscan_api_key,
            storage_channel,
            audit_channel,
            force_sub_channels,
            scan_settle,
            telegram_safe_limit,
            connect_max_attempts,
            connect_base_delay,
            restart_cap,
            restart_window,
            temp_dir,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
