//! The trust gate in front of every non-text send.
//!
//! ```text
//! Idle -> AttachmentChosen -> AwaitingTrustConfirmation -> Uploading -> Sent
//!                 \                      |
//!                  `----- cancel --------+--> Idle
//! ```
//!
//! Nothing is uploaded or appended until `confirm` runs from
//! `AwaitingTrustConfirmation`. Any rejection or failure lands back in `Idle`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cloak_types::api::GateState;
use cloak_types::events::GatewayEvent;
use cloak_types::models::{Attachment, MediaKind, Message, MessageTarget};

use crate::blob::{BlobStore, Bucket};
use crate::error::{CloakError, Result, ValidationError};
use crate::identity::{Identity, require};
use crate::store::MessageStore;

/// Largest accepted attachment, inclusive.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// A file the user picked, not yet trusted.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

#[derive(Debug)]
struct Staged {
    target: MessageTarget,
    kind: MediaKind,
    extension: &'static str,
    caption: String,
    file: PendingFile,
}

#[derive(Debug)]
enum Stage {
    Idle,
    Chosen(Staged),
    Awaiting(Staged),
    Uploading,
    Sent,
}

/// Map an allowed MIME type to its media kind and file extension.
/// Parameters such as `;codecs=opus` are ignored.
pub fn classify_mime(mime: &str) -> Option<(MediaKind, &'static str)> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    let found = match essence.as_str() {
        "image/jpeg" => (MediaKind::Image, "jpg"),
        "image/png" => (MediaKind::Image, "png"),
        "image/gif" => (MediaKind::Image, "gif"),
        "image/webp" => (MediaKind::Image, "webp"),
        "application/pdf" => (MediaKind::Pdf, "pdf"),
        "video/mp4" => (MediaKind::Video, "mp4"),
        "audio/webm" => (MediaKind::Voice, "webm"),
        "audio/ogg" => (MediaKind::Voice, "ogg"),
        _ => return None,
    };
    Some(found)
}

/// One user's pending attachment send.
pub struct ConsentGate {
    stage: Stage,
    store: MessageStore,
    blobs: Arc<BlobStore>,
}

impl ConsentGate {
    pub fn new(store: MessageStore, blobs: Arc<BlobStore>) -> Self {
        Self {
            stage: Stage::Idle,
            store,
            blobs,
        }
    }

    pub fn state(&self) -> GateState {
        match self.stage {
            Stage::Idle => GateState::Idle,
            Stage::Chosen(_) => GateState::AttachmentChosen,
            Stage::Awaiting(_) => GateState::AwaitingTrustConfirmation,
            Stage::Uploading => GateState::Uploading,
            Stage::Sent => GateState::Sent,
        }
    }

    /// Kind and size of the staged file, if any.
    pub fn staged(&self) -> Option<(MediaKind, usize)> {
        match &self.stage {
            Stage::Chosen(s) | Stage::Awaiting(s) => Some((s.kind, s.file.bytes.len())),
            _ => None,
        }
    }

    /// Validate and hold `file` for `target`. Staging again replaces the
    /// previous file. A rejected file leaves the gate `Idle`.
    pub fn stage_attachment(
        &mut self,
        target: MessageTarget,
        file: PendingFile,
        caption: Option<String>,
    ) -> Result<()> {
        let Some((kind, extension)) = classify_mime(&file.mime) else {
            self.stage = Stage::Idle;
            return Err(reject(format!("type '{}' is not allowed", file.mime)));
        };
        if file.bytes.is_empty() {
            self.stage = Stage::Idle;
            return Err(reject("file is empty".to_string()));
        }
        if file.bytes.len() > MAX_ATTACHMENT_BYTES {
            self.stage = Stage::Idle;
            return Err(reject(format!(
                "{} bytes exceeds the {} byte limit",
                file.bytes.len(),
                MAX_ATTACHMENT_BYTES
            )));
        }

        debug!(%target, kind = kind.as_str(), size = file.bytes.len(), "Attachment staged: {}", file.file_name);
        self.stage = Stage::Chosen(Staged {
            target,
            kind,
            extension,
            caption: caption.unwrap_or_default(),
            file,
        });
        Ok(())
    }

    /// Ask for the trust decision. Requires a staged file.
    pub fn request_confirmation(&mut self) -> Result<()> {
        self.stage = match std::mem::replace(&mut self.stage, Stage::Idle) {
            Stage::Chosen(staged) | Stage::Awaiting(staged) => Stage::Awaiting(staged),
            other => {
                self.stage = other;
                return Err(ValidationError::NothingStaged.into());
            }
        };
        Ok(())
    }

    /// Upload the trusted file and append the message. Outside
    /// `AwaitingTrustConfirmation` this does nothing and returns `None`.
    pub async fn confirm(&mut self, actor: Option<&Identity>) -> Result<Option<Message>> {
        let me = require(actor)?.clone();

        let staged = match std::mem::replace(&mut self.stage, Stage::Uploading) {
            Stage::Awaiting(staged) => staged,
            other => {
                self.stage = other;
                return Ok(None);
            }
        };

        match self.upload_and_append(&me, staged).await {
            Ok(message) => {
                self.stage = Stage::Sent;
                info!(user_id = %me.user_id, message_id = %message.id, "Attachment sent");
                Ok(Some(message))
            }
            Err(e) => {
                self.stage = Stage::Idle;
                warn!(user_id = %me.user_id, "Attachment send failed: {}", e);
                Err(e)
            }
        }
    }

    /// Discard the staged file.
    pub fn cancel(&mut self) {
        if !matches!(self.stage, Stage::Idle) {
            debug!("Attachment cancelled");
        }
        self.stage = Stage::Idle;
    }

    async fn upload_and_append(&self, me: &Identity, staged: Staged) -> Result<Message> {
        let store = self.store.clone();
        let actor = me.clone();
        let target = staged.target;
        tokio::task::spawn_blocking(move || store.check_can_post(Some(&actor), target)).await??;

        let bucket = match staged.kind {
            MediaKind::Voice => Bucket::VoiceNotes,
            _ => Bucket::Media,
        };
        let key = BlobStore::key_for(bucket, &staged.file.bytes, staged.extension);
        let url = self.blobs.put(&key, &staged.file.bytes).await?;

        let store = self.store.clone();
        let me = me.clone();
        let attachment = Attachment {
            url,
            kind: staged.kind,
        };
        tokio::task::spawn_blocking(move || {
            store.append(Some(&me), staged.target, &staged.caption, Some(attachment))
        })
        .await?
    }
}

fn reject(reason: String) -> CloakError {
    ValidationError::AttachmentRejected(reason).into()
}

/// One gate per signed-in user. A gate lives in the map only while it
/// holds a staged file; `release` drops it once it is back to `Idle` or
/// `Sent`, and `forget` drops it outright.
#[derive(Clone)]
pub struct ConsentGates {
    store: MessageStore,
    blobs: Arc<BlobStore>,
    gates: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<ConsentGate>>>>>,
}

impl ConsentGates {
    pub fn new(store: MessageStore, blobs: Arc<BlobStore>) -> Self {
        Self {
            store,
            blobs,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn gate(&self, user_id: Uuid) -> Arc<tokio::sync::Mutex<ConsentGate>> {
        let mut gates = self.lock();
        gates
            .entry(user_id)
            .or_insert_with(|| {
                Arc::new(tokio::sync::Mutex::new(ConsentGate::new(
                    self.store.clone(),
                    self.blobs.clone(),
                )))
            })
            .clone()
    }

    /// Drop the user's gate if nobody else holds it and it has nothing
    /// staged. Callers must release their own handle first.
    pub fn release(&self, user_id: Uuid) {
        let mut gates = self.lock();
        let settled = gates.get(&user_id).is_some_and(|gate| {
            Arc::strong_count(gate) == 1
                && gate
                    .try_lock()
                    .is_ok_and(|g| matches!(g.state(), GateState::Idle | GateState::Sent))
        });
        if settled {
            gates.remove(&user_id);
        }
    }

    /// Drop the user's gate and whatever it has staged.
    pub fn forget(&self, user_id: Uuid) {
        if self.lock().remove(&user_id).is_some() {
            debug!(user_id = %user_id, "Attachment gate dropped");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Arc<tokio::sync::Mutex<ConsentGate>>>> {
        self.gates.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drops the gate of every user whose session is revoked, until
/// `shutdown` is cancelled.
pub async fn run_revocation_listener(
    gates: ConsentGates,
    mut events: broadcast::Receiver<GatewayEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return,
            event = events.recv() => event,
        };
        match event {
            Ok(GatewayEvent::SessionRevoked { user_id }) => gates.forget(user_id),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Gate eviction lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloak_db::Database;
    use cloak_gateway::Dispatcher;

    const HUB: &str = "00000000-0000-0000-0000-000000000101";

    async fn parts() -> (MessageStore, Arc<BlobStore>, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = MessageStore::new(db.clone(), Dispatcher::new());
        let dir = std::env::temp_dir().join(format!("cloak-gate-{}", Uuid::new_v4()));
        let blobs = Arc::new(BlobStore::new(dir, "http://localhost:3000").await.unwrap());
        (store, blobs, db)
    }

    async fn gate() -> (ConsentGate, Arc<BlobStore>) {
        let (store, blobs, _) = parts().await;
        (ConsentGate::new(store, blobs.clone()), blobs)
    }

    fn file(mime: &str, len: usize) -> PendingFile {
        PendingFile {
            file_name: "f".into(),
            mime: mime.into(),
            bytes: Bytes::from(vec![7u8; len]),
        }
    }

    fn hub() -> MessageTarget {
        MessageTarget::Group(HUB.parse().unwrap())
    }

    #[test]
    fn mime_allow_list() {
        assert_eq!(classify_mime("image/PNG").map(|m| m.0), Some(MediaKind::Image));
        assert_eq!(classify_mime("audio/webm;codecs=opus").map(|m| m.0), Some(MediaKind::Voice));
        assert_eq!(classify_mime("application/pdf").map(|m| m.1), Some("pdf"));
        assert!(classify_mime("application/zip").is_none());
        assert!(classify_mime("image/svg+xml").is_none());
    }

    #[tokio::test]
    async fn limit_is_inclusive() {
        let (mut gate, _) = gate().await;
        gate.stage_attachment(hub(), file("image/png", MAX_ATTACHMENT_BYTES), None)
            .unwrap();
        assert_eq!(gate.state(), GateState::AttachmentChosen);

        let err = gate
            .stage_attachment(hub(), file("image/png", MAX_ATTACHMENT_BYTES + 1), None)
            .unwrap_err();
        assert!(matches!(err, CloakError::Validation(ValidationError::AttachmentRejected(_))));
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[tokio::test]
    async fn confirm_without_request_is_a_no_op() {
        let (mut gate, blobs) = gate().await;
        let me = Identity::new(Uuid::new_v4(), "alice");

        assert!(gate.confirm(Some(&me)).await.unwrap().is_none());

        gate.stage_attachment(hub(), file("image/png", 16), None).unwrap();
        assert!(gate.confirm(Some(&me)).await.unwrap().is_none());
        assert_eq!(gate.state(), GateState::AttachmentChosen);
        assert!(!blobs.dir().join("media").exists());
    }

    #[tokio::test]
    async fn cancel_discards_the_file() {
        let (mut gate, _) = gate().await;
        gate.stage_attachment(hub(), file("video/mp4", 16), None).unwrap();
        gate.request_confirmation().unwrap();
        gate.cancel();
        assert_eq!(gate.state(), GateState::Idle);
        assert!(gate.staged().is_none());
        assert!(matches!(
            gate.request_confirmation(),
            Err(CloakError::Validation(ValidationError::NothingStaged))
        ));
    }

    #[tokio::test]
    async fn confirmed_voice_note_is_uploaded_and_appended() {
        let (mut gate, blobs) = gate().await;
        let me = Identity::new(Uuid::new_v4(), "alice");

        gate.stage_attachment(hub(), file("audio/ogg", 32), None).unwrap();
        gate.request_confirmation().unwrap();
        assert_eq!(gate.state(), GateState::AwaitingTrustConfirmation);

        let msg = gate.confirm(Some(&me)).await.unwrap().unwrap();
        assert_eq!(gate.state(), GateState::Sent);
        assert!(msg.is_voice_note);
        assert_eq!(msg.content, "Voice note");
        let url = msg.voice_note_url.unwrap();
        assert!(url.contains("/blobs/voice-notes/"));
        assert!(blobs.dir().join("voice-notes").exists());
        let _ = tokio::fs::remove_dir_all(blobs.dir()).await;
    }

    #[tokio::test]
    async fn failed_append_returns_to_idle() {
        let (mut gate, _) = gate().await;
        let me = Identity::new(Uuid::new_v4(), "alice");
        let missing = MessageTarget::Group(Uuid::new_v4());

        gate.stage_attachment(missing, file("image/gif", 8), None).unwrap();
        gate.request_confirmation().unwrap();
        assert!(matches!(gate.confirm(Some(&me)).await, Err(CloakError::NotFound("group"))));
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[tokio::test]
    async fn outsider_confirm_stores_nothing() {
        let (store, blobs, db) = parts().await;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let conv = Uuid::new_v4();
        db.resolve_conversation(&alice.to_string(), &bob.to_string(), &conv.to_string(), &cloak_db::time::now())
            .unwrap();

        let eve = Identity::new(Uuid::new_v4(), "eve");
        let mut gate = ConsentGate::new(store, blobs.clone());
        gate.stage_attachment(MessageTarget::Conversation(conv), file("image/png", 16), None)
            .unwrap();
        gate.request_confirmation().unwrap();

        assert!(matches!(gate.confirm(Some(&eve)).await, Err(CloakError::Forbidden)));
        assert_eq!(gate.state(), GateState::Idle);
        assert!(!blobs.dir().join("media").exists());
    }

    #[tokio::test]
    async fn settled_gates_leave_the_map() {
        let (store, blobs, _) = parts().await;
        let gates = ConsentGates::new(store, blobs);
        let me = Identity::new(Uuid::new_v4(), "alice");

        {
            let gate = gates.gate(me.user_id);
            let mut gate = gate.lock().await;
            gate.stage_attachment(hub(), file("image/png", 16), None).unwrap();
        }
        gates.release(me.user_id);
        assert_eq!(gates.len(), 1, "a staged file keeps its gate");

        {
            let gate = gates.gate(me.user_id);
            let _held = gate.lock().await;
            gates.release(me.user_id);
            assert_eq!(gates.len(), 1, "a gate in use is kept");
        }

        {
            let gate = gates.gate(me.user_id);
            let mut gate = gate.lock().await;
            gate.request_confirmation().unwrap();
            gate.confirm(Some(&me)).await.unwrap().unwrap();
        }
        gates.release(me.user_id);
        assert!(gates.is_empty());

        let gate = gates.gate(me.user_id);
        gate.lock().await.cancel();
        drop(gate);
        gates.release(me.user_id);
        assert!(gates.is_empty());
    }

    #[tokio::test]
    async fn revoked_session_drops_the_gate() {
        let (store, blobs, _) = parts().await;
        let gates = ConsentGates::new(store, blobs);
        let dispatcher = Dispatcher::new();
        let shutdown = CancellationToken::new();
        let listener = tokio::spawn(run_revocation_listener(
            gates.clone(),
            dispatcher.receiver(),
            shutdown.clone(),
        ));

        let user_id = Uuid::new_v4();
        gates
            .gate(user_id)
            .lock()
            .await
            .stage_attachment(hub(), file("image/png", 16), None)
            .unwrap();
        dispatcher.broadcast(GatewayEvent::SessionRevoked { user_id });

        for _ in 0..50 {
            if gates.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(gates.is_empty());

        shutdown.cancel();
        listener.await.unwrap();
    }
}
