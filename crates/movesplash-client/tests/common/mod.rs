//! Shared fixtures for session tests: an in-process realtime hub plus
//! recording fakes for persistence and voice upload.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use movesplash_client::{
    spawn_session, ClientConfig, SessionDeps, SessionHandle, SessionView, UserDirectory,
};
use movesplash_net::MemoryHub;
use movesplash_shared::{ConversationId, MessageId, Profile, UserId};
use movesplash_store::{
    NewChat, PersistenceApi, Result as StoreResult, StoreError, UploadedVoice, VoiceUpload,
    VoiceUploader,
};

// ---------------------------------------------------------------------------
// Persistence fake
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Recorded {
    messages: HashMap<String, Vec<Value>>,
    chats: Vec<Value>,
    appended: Vec<Value>,
    deleted: Vec<(String, String)>,
    starred: Vec<(String, String, bool)>,
    created: Vec<NewChat>,
    failing_history: HashSet<String>,
    create_response: Option<Value>,
}

/// Records every write and serves canned reads. History reads for a chat can
/// be held back with a gate or made to fail.
#[derive(Default)]
pub struct RecordingPersistence {
    recorded: Mutex<Recorded>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl RecordingPersistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }

    pub fn with_messages(&self, chat: &str, records: Vec<Value>) {
        self.recorded().messages.insert(chat.to_string(), records);
    }

    pub fn with_chats(&self, chats: Vec<Value>) {
        self.recorded().chats = chats;
    }

    pub fn respond_to_create(&self, record: Value) {
        self.recorded().create_response = Some(record);
    }

    pub fn fail_history(&self, chat: &str, fail: bool) {
        let mut recorded = self.recorded();
        if fail {
            recorded.failing_history.insert(chat.to_string());
        } else {
            recorded.failing_history.remove(chat);
        }
    }

    /// Hold the next history read for `chat` until the returned gate is notified.
    pub fn gate(&self, chat: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(chat.to_string(), gate.clone());
        gate
    }

    pub fn appended_ids(&self) -> Vec<String> {
        self.recorded()
            .appended
            .iter()
            .map(|r| r["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn appended(&self) -> Vec<Value> {
        self.recorded().appended.clone()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.recorded().deleted.clone()
    }

    pub fn starred(&self) -> Vec<(String, String, bool)> {
        self.recorded().starred.clone()
    }

    pub fn created(&self) -> Vec<NewChat> {
        self.recorded().created.clone()
    }
}

#[async_trait]
impl PersistenceApi for RecordingPersistence {
    async fn create_chat(&self, chat: &NewChat) -> StoreResult<Value> {
        let mut recorded = self.recorded();
        recorded.created.push(chat.clone());
        Ok(recorded.create_response.clone().unwrap_or_else(|| {
            json!({
                "id": chat.id.as_ref().map(|id| id.as_str().to_string()),
                "name": chat.name,
                "members": chat.members,
                "is_group": chat.is_group
            })
        }))
    }

    async fn list_chats(&self, _user_id: &UserId) -> StoreResult<Vec<Value>> {
        Ok(self.recorded().chats.clone())
    }

    async fn list_messages(&self, chat_id: &ConversationId) -> StoreResult<Vec<Value>> {
        let gate = self.gates.lock().unwrap().remove(chat_id.as_str());
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let recorded = self.recorded();
        if recorded.failing_history.contains(chat_id.as_str()) {
            return Err(StoreError::Api {
                status: 503,
                message: "history unavailable".into(),
            });
        }
        Ok(recorded
            .messages
            .get(chat_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn append_message(&self, record: &Value) -> StoreResult<()> {
        self.recorded().appended.push(record.clone());
        Ok(())
    }

    async fn delete_message(&self, chat_id: &ConversationId, message_id: &MessageId) -> StoreResult<()> {
        self.recorded()
            .deleted
            .push((chat_id.to_string(), message_id.to_string()));
        Ok(())
    }

    async fn star_message(
        &self,
        chat_id: &ConversationId,
        message_id: &MessageId,
        starred: bool,
    ) -> StoreResult<()> {
        self.recorded()
            .starred
            .push((chat_id.to_string(), message_id.to_string(), starred));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Voice upload fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingUploader {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceUploader for RecordingUploader {
    async fn upload(&self, clip: &VoiceUpload) -> StoreResult<UploadedVoice> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(StoreError::Upload("storage unavailable".into()));
        }
        Ok(UploadedVoice {
            id: format!("v{n}"),
            url: format!("https://cdn.test/voice/v{n}.webm"),
            mime_type: Some(clip.mime_type.clone()),
            duration: Some(clip.duration),
        })
    }
}

// ---------------------------------------------------------------------------
// Session harness
// ---------------------------------------------------------------------------

pub fn me() -> Profile {
    Profile {
        id: "me".into(),
        display_name: "Maya".into(),
        avatar_url: Some("https://cdn.test/maya.png".into()),
    }
}

pub fn profile(id: &str, name: &str) -> Profile {
    Profile {
        id: id.into(),
        display_name: name.into(),
        avatar_url: None,
    }
}

pub struct Harness {
    pub hub: MemoryHub,
    pub persistence: Arc<RecordingPersistence>,
    pub uploader: Arc<RecordingUploader>,
    pub session: SessionHandle,
}

pub fn start(hub: MemoryHub, persistence: Arc<RecordingPersistence>) -> Harness {
    start_with_uploader(hub, persistence, RecordingUploader::new())
}

pub fn start_with_uploader(
    hub: MemoryHub,
    persistence: Arc<RecordingPersistence>,
    uploader: Arc<RecordingUploader>,
) -> Harness {
    let deps = SessionDeps {
        realtime: Arc::new(hub.clone()),
        persistence: persistence.clone(),
        voice: uploader.clone(),
    };
    let session = spawn_session(me(), deps, UserDirectory::default(), &ClientConfig::default());
    Harness {
        hub,
        persistence,
        uploader,
        session,
    }
}

/// Wait until the published view satisfies `pred`.
pub async fn wait_for_view(session: &SessionHandle, pred: impl Fn(&SessionView) -> bool) -> SessionView {
    let mut rx = session.view();
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let view = rx.borrow_and_update();
                if pred(&view) {
                    return view.clone();
                }
            }
            if rx.changed().await.is_err() {
                panic!("session ended while waiting for view");
            }
        }
    })
    .await;
    found.expect("view condition not reached in time")
}

/// Poll `cond` until it holds.
pub async fn eventually(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Let spawned tasks run without advancing much time.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
