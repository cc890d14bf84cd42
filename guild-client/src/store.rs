use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use guild_common::{Profile, RecordWrite, UserId, UserRecord, WatchReply};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record for user {0}")]
    NotFound(UserId),
    #[error("record store backend: {0}")]
    Backend(String),
    #[error("record store transport")]
    Transport(#[from] reqwest::Error),
}

/// The seam between the graph service and the hosted record store: one user
/// document per id, field-level writes applied atomically within a single
/// record, and a push channel per record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &UserId) -> Result<UserRecord, StoreError>;
    async fn list_ids(&self) -> Result<Vec<UserId>, StoreError>;
    async fn apply(&self, id: &UserId, writes: Vec<RecordWrite>) -> Result<(), StoreError>;
    /// Subscribes to the record; the subscription ends when the returned
    /// handle is dropped.
    async fn watch(&self, id: &UserId) -> Result<RecordWatch, StoreError>;
}

/// Push subscription to one user record. Holds the latest authoritative
/// snapshot and wakes `changed()` whenever a new one arrives.
pub struct RecordWatch {
    rx: watch::Receiver<UserRecord>,
    poller: Option<JoinHandle<()>>,
}

impl RecordWatch {
    pub fn new(rx: watch::Receiver<UserRecord>) -> Self {
        Self { rx, poller: None }
    }
    pub fn with_poller(rx: watch::Receiver<UserRecord>, poller: JoinHandle<()>) -> Self {
        Self {
            rx,
            poller: Some(poller),
        }
    }
    pub fn latest(&self) -> UserRecord {
        self.rx.borrow().clone()
    }
    /// Waits for the next authoritative snapshot. Returns false once the
    /// publishing side has gone away.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl Drop for RecordWatch {
    fn drop(&mut self) {
        if let Some(poller) = &self.poller {
            poller.abort();
        }
    }
}

/// Record store client speaking to a guild-server over HTTP. `watch` is
/// implemented by long-polling the versioned watch endpoint from a background
/// task.
#[derive(Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base: String,
}

impl HttpStore {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { client, base }
    }

    pub async fn create_user(&self, id: &UserId, profile: &Profile) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!("{}/add-user/{}", self.base, id))
            .json(profile)
            .send()
            .await?;
        check_status(response, id)?;
        Ok(())
    }

    async fn poll_watch(&self, id: &UserId, since: u64) -> Result<WatchReply, StoreError> {
        let response = self
            .client
            .get(format!("{}/records/{}/watch/{}", self.base, id, since))
            .send()
            .await?;
        Ok(check_status(response, id)?.json().await?)
    }
}

fn check_status(response: reqwest::Response, id: &UserId) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        Err(StoreError::NotFound(id.clone()))
    } else if !status.is_success() {
        Err(StoreError::Backend(format!("status {status}")))
    } else {
        Ok(response)
    }
}

#[async_trait]
impl RecordStore for HttpStore {
    async fn get(&self, id: &UserId) -> Result<UserRecord, StoreError> {
        let response = self
            .client
            .get(format!("{}/records/{}", self.base, id))
            .send()
            .await?;
        Ok(check_status(response, id)?.json().await?)
    }

    async fn list_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let response = self
            .client
            .get(format!("{}/records", self.base))
            .send()
            .await?;
        match response.error_for_status() {
            Ok(response) => Ok(response.json().await?),
            Err(err) => Err(StoreError::Transport(err)),
        }
    }

    async fn apply(&self, id: &UserId, writes: Vec<RecordWrite>) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!("{}/records/{}/apply", self.base, id))
            .json(&writes)
            .send()
            .await?;
        check_status(response, id)?;
        Ok(())
    }

    async fn watch(&self, id: &UserId) -> Result<RecordWatch, StoreError> {
        // u64::MAX never matches a stored version, so the first poll returns
        // the current state immediately and seeds the channel.
        let initial = self.poll_watch(id, u64::MAX).await?;
        let (tx, rx) = watch::channel(initial.record);
        let mut version = initial.version;
        let store = self.clone();
        let id = id.clone();
        let poller = tokio::spawn(async move {
            loop {
                match store.poll_watch(&id, version).await {
                    Ok(reply) => {
                        if reply.version != version {
                            version = reply.version;
                            if tx.send(reply.record).is_err() {
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!(user = %id, error = %err, "watch poll failed, backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        Ok(RecordWatch::with_poller(rx, poller))
    }
}

/// In-process record store. Serves two purposes: a standalone embedded mode,
/// and a harness for exercising the graph service's failure surface (tests
/// can make the next write against a chosen record fail).
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
}

#[derive(Default)]
struct MemInner {
    records: HashMap<UserId, UserRecord>,
    watchers: HashMap<UserId, watch::Sender<UserRecord>>,
    fail_apply_for: Vec<UserId>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_user(&self, id: &UserId, profile: Profile) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner
            .records
            .entry(id.clone())
            .or_insert_with(|| UserRecord::new(id.clone(), profile));
    }

    /// Makes the next `apply` against `id` fail, simulating the second leg of
    /// a two-record operation going down.
    pub fn fail_next_apply_for(&self, id: &UserId) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.fail_apply_for.push(id.clone());
    }
}

#[async_trait]
impl RecordStore for MemStore {
    async fn get(&self, id: &UserId) -> Result<UserRecord, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut ids: Vec<UserId> = inner.records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn apply(&self, id: &UserId, writes: Vec<RecordWrite>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if let Some(at) = inner.fail_apply_for.iter().position(|f| f == id) {
            inner.fail_apply_for.remove(at);
            return Err(StoreError::Backend("injected write failure".into()));
        }
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        for write in writes {
            record.apply_write(write);
        }
        let snapshot = record.clone();
        if let Some(tx) = inner.watchers.get(id) {
            tx.send_replace(snapshot);
        }
        Ok(())
    }

    async fn watch(&self, id: &UserId) -> Result<RecordWatch, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let current = inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let tx = inner
            .watchers
            .entry(id.clone())
            .or_insert_with(|| watch::channel(current).0);
        Ok(RecordWatch::new(tx.subscribe()))
    }
}
