use crate::domain::{ChatId, MessageRef, UserId};

/// Kind of attachment carried by an inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentKind {
    Document,
    Photo,
    Video,
    Audio,
}

/// Transport-agnostic attachment reference. The file itself stays on the
/// transport side until `MessagingPort::download_file` fetches it.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub file_id: String,
    pub kind: AttachmentKind,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.kind == AttachmentKind::Photo
    }

    /// Best-effort display name; falls back to a file-id-derived name the
    /// way the transport names anonymous media.
    pub fn display_name(&self) -> String {
        match &self.file_name {
            Some(n) if !n.trim().is_empty() => n.clone(),
            _ => format!("file_{}", self.file_id),
        }
    }
}

/// Cross-messenger inbound message event.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub sender: UserId,
    pub chat: ChatId,
    pub message: MessageRef,
    pub username: Option<String>,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    /// Unix seconds, as delivered by the transport.
    pub timestamp: i64,
}
