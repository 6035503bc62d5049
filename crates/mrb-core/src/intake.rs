//! File intake: fingerprint, archive to the storage channel, record
//! metadata to the audit channel.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use sha2::{Digest, Sha256};

use crate::{
    domain::{ArchiveLocator, ChannelId},
    errors::Error,
    messaging::MessagingPort,
    Result,
};

/// Metadata of a successfully archived file. Immutable once created; the
/// locator is the only handle needed for later retrieval.
#[derive(Clone, Debug)]
pub struct FileRecord {
    pub owner_id: i64,
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub content_hash: String,
    pub archive_locator: ArchiveLocator,
}

pub struct FileIntake {
    messenger: Arc<dyn MessagingPort>,
    storage_channel: ChannelId,
    audit_channel: ChannelId,
}

impl FileIntake {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        storage_channel: ChannelId,
        audit_channel: ChannelId,
    ) -> Self {
        Self {
            messenger,
            storage_channel,
            audit_channel,
        }
    }

    /// Archive a local file: sniff its type, fingerprint it, upload it to
    /// the storage channel and emit a metadata record to the audit channel.
    ///
    /// The caller keeps ownership of the local file and is responsible for
    /// cleanup on every path (see [`TempFile`]). The audit record is
    /// best-effort: losing it is accepted and logged, never rolled back.
    pub async fn archive(
        &self,
        local_path: &Path,
        owner_id: i64,
        declared_name: &str,
    ) -> Result<FileRecord> {
        let bytes = tokio::fs::read(local_path).await?;
        let size_bytes = bytes.len() as u64;

        // Content sniffing, not the filename extension: a spoofed
        // extension must not change how the file is recorded.
        let mime_type = sniff_mime(&bytes).to_string();
        let content_hash = hex_digest(&bytes);

        let caption = format!(
            "File Storage\nName: {declared_name}\nSize: {}\nType: {mime_type}\nHash: {content_hash}",
            format_file_size(size_bytes),
        );

        let archive_locator = self
            .messenger
            .send_document(self.storage_channel, local_path, &caption, declared_name)
            .await
            .map_err(|e| Error::Archive(format!("failed to upload file: {e}")))?;

        let record = FileRecord {
            owner_id,
            original_name: declared_name.to_string(),
            size_bytes,
            mime_type,
            content_hash,
            archive_locator,
        };

        let info = format!(
            "File Info\nUser ID: {}\nFilename: {}\nLocator: {}\nSize: {}\nType: {}\nHash: {}",
            record.owner_id,
            record.original_name,
            record.archive_locator,
            format_file_size(record.size_bytes),
            record.mime_type,
            record.content_hash,
        );
        if let Err(e) = self
            .messenger
            .send_channel_text(self.audit_channel, &info)
            .await
        {
            tracing::warn!(error = %e, "audit record lost for archived file");
        }

        Ok(record)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Sniff a MIME type from leading magic bytes.
fn starts_with_at(bytes: &[u8], offset: usize, sig: &[u8]) -> bool {
    bytes.len() >= offset + sig.len() && &bytes[offset..offset + sig.len()] == sig
}

pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if starts_with_at(bytes, 0, &[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg";
    }
    if starts_with_at(bytes, 0, &[0x89, b'P', b'N', b'G']) {
        return "image/png";
    }
    if starts_with_at(bytes, 0, b"GIF8") {
        return "image/gif";
    }
    if starts_with_at(bytes, 0, b"RIFF") && starts_with_at(bytes, 8, b"WEBP") {
        return "image/webp";
    }
    if starts_with_at(bytes, 0, b"%PDF") {
        return "application/pdf";
    }
    if starts_with_at(bytes, 0, &[0x50, 0x4B, 0x03, 0x04]) {
        return "application/zip";
    }
    if starts_with_at(bytes, 0, &[0x1F, 0x8B]) {
        return "application/gzip";
    }
    if starts_with_at(bytes, 0, b"ID3") || starts_with_at(bytes, 0, &[0xFF, 0xFB]) {
        return "audio/mpeg";
    }
    if starts_with_at(bytes, 0, b"OggS") {
        return "audio/ogg";
    }
    if starts_with_at(bytes, 4, b"ftyp") {
        return "video/mp4";
    }
    if !bytes.is_empty() && std::str::from_utf8(bytes).is_ok() {
        return "text/plain";
    }
    "application/octet-stream"
}

/// Human-readable size: largest unit where the scaled value is < 1024,
/// one decimal place.
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size_bytes as f64;
    let mut i = 0;
    while size >= 1024.0 && i < UNITS.len() - 1 {
        size /= 1024.0;
        i += 1;
    }
    format!("{size:.1} {}", UNITS[i])
}

/// Scoped local file: removed on drop regardless of how the intake path
/// exits.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "temp file cleanup failed");
            }
        }
    }
}
