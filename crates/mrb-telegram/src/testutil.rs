//! Test doubles for handler tests: a recording messenger, scripted
//! scan/classifier services, and an `AppState` builder wired with them.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mrb_core::{
    audit::AuditLogger,
    authz::UserDirectory,
    config::Config,
    domain::{ArchiveLocator, ChannelId, ChatId, MessageId, MessageRef, UserId},
    intake::FileIntake,
    messaging::MessagingPort,
    moderation::{ClassifierVerdict, ContentModerator, TextClassifier},
    pipeline::IngestionPipeline,
    responder::Responder,
    scanner::{ScanReport, ScanService, UrlScanner},
    stats::UsageStats,
    Result,
};

use crate::router::{AppState, ChatLocks};

pub const OWNER: i64 = 100;
pub const ADMIN: i64 = 200;
pub const AUDIT_CHANNEL: i64 = -1002;

#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub channel_texts: Mutex<Vec<(i64, String)>>,
    pub documents: Mutex<Vec<(i64, String)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub member: bool,
}

impl RecordingMessenger {
    pub fn new(member: bool) -> Self {
        Self {
            member,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.sent.lock().unwrap().push((chat_id.0, text.to_string()));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(1),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deleted.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_document(
        &self,
        channel: ChannelId,
        _path: &Path,
        caption: &str,
        _filename: &str,
    ) -> Result<ArchiveLocator> {
        self.documents
            .lock()
            .unwrap()
            .push((channel.0, caption.to_string()));
        Ok(ArchiveLocator("42".to_string()))
    }

    async fn send_channel_text(&self, channel: ChannelId, text: &str) -> Result<()> {
        self.channel_texts
            .lock()
            .unwrap()
            .push((channel.0, text.to_string()));
        Ok(())
    }

    async fn download_file(&self, _file_id: &str, dest: &Path) -> Result<()> {
        std::fs::write(dest, b"downloaded")?;
        Ok(())
    }

    async fn is_channel_member(&self, _user: UserId, _handle: &str) -> Result<bool> {
        Ok(self.member)
    }

    async fn ban_chat_member(&self, _chat: ChatId, _user: UserId) -> Result<()> {
        Ok(())
    }

    async fn unban_chat_member(&self, _chat: ChatId, _user: UserId) -> Result<()> {
        Ok(())
    }
}

pub struct ScriptedScanService {
    // url -> score
    pub scores: Vec<(String, i64)>,
    pub submissions: Mutex<Vec<String>>,
}

#[async_trait]
impl ScanService for ScriptedScanService {
    async fn submit(&self, url: &str) -> Result<String> {
        self.submissions.lock().unwrap().push(url.to_string());
        Ok(url.to_string())
    }

    async fn fetch_result(&self, scan_id: &str) -> Result<ScanReport> {
        let score = self
            .scores
            .iter()
            .find(|(u, _)| u == scan_id)
            .map(|(_, s)| *s)
            .unwrap_or(0);
        Ok(ScanReport {
            score: Some(score),
            categories: vec![],
            task_id: None,
        })
    }
}

struct SafeClassifier;

#[async_trait]
impl TextClassifier for SafeClassifier {
    async fn classify(&self, _text: &str) -> ClassifierVerdict {
        ClassifierVerdict::safe("ok")
    }
}

struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, prompt: &str, _context: Option<&str>) -> String {
        format!("echo: {prompt}")
    }
}

pub fn test_config() -> Config {
    Config {
        bot_token: "123456:TEST".to_string(),
        owner_id: OWNER,
        admin_id: ADMIN,
        bot_owner_name: "Owner".to_string(),
        gemini_api_key: None,
        urlscan_api_key: None,
        storage_channel: ChannelId(-1001),
        audit_channel: ChannelId(AUDIT_CHANNEL),
        force_sub_channels: Vec::new(),
        scan_settle: Duration::ZERO,
        telegram_safe_limit: 4000,
        connect_max_attempts: 5,
        connect_base_delay: Duration::from_secs(5),
        restart_cap: 10,
        restart_window: Duration::from_secs(3600),
        temp_dir: std::env::temp_dir(),
        audit_log_path: audit_log_path(),
        audit_log_json: false,
    }
}

fn audit_log_path() -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static N: AtomicUsize = AtomicUsize::new(0);
    std::env::temp_dir().join(format!(
        "mrb-test-audit-{}-{}.log",
        std::process::id(),
        N.fetch_add(1, Ordering::Relaxed)
    ))
}

/// AppState over recording/scripted doubles. `scores` drive the scan
/// verdicts per URL; the settle wait is zero so tests run on a real clock.
pub fn test_state(
    messenger: Arc<RecordingMessenger>,
    scores: Vec<(&str, i64)>,
) -> Arc<AppState> {
    let cfg = Arc::new(test_config());

    let service = Arc::new(ScriptedScanService {
        scores: scores
            .into_iter()
            .map(|(u, s)| (u.to_string(), s))
            .collect(),
        submissions: Mutex::new(Vec::new()),
    });
    let scanner = Arc::new(UrlScanner::new(
        service,
        cfg.scan_settle,
        CancellationToken::new(),
    ));
    let moderator = Arc::new(ContentModerator::new(Arc::new(SafeClassifier)));
    let pipeline = Arc::new(IngestionPipeline::new(scanner.clone(), moderator));
    let intake = Arc::new(FileIntake::new(
        messenger.clone(),
        cfg.storage_channel,
        cfg.audit_channel,
    ));

    Arc::new(AppState {
        cfg: cfg.clone(),
        messenger,
        scanner,
        pipeline,
        intake,
        responder: Arc::new(EchoResponder),
        directory: Arc::new(UserDirectory::new(cfg.owner_id, cfg.admin_id)),
        stats: Arc::new(UsageStats::default()),
        audit: Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
        chat_locks: Arc::new(ChatLocks::default()),
        shutdown: CancellationToken::new(),
    })
}
