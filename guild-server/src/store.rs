use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use sled::{Db, Tree};
use tokio::sync::watch;

use guild_common::{Profile, RecordWrite, UserId, UserRecord, WatchReply};

/// Sled-backed user record collection. Writes to a single record are applied
/// under the collection lock, so each `apply` batch is atomic within that
/// record; nothing is atomic across two records.
#[derive(Clone)]
pub struct Records {
    tree: Tree,
    write_lock: Arc<Mutex<()>>,
    // per-record version channels driving the long-poll watch endpoint
    versions: Arc<Mutex<HashMap<UserId, Arc<watch::Sender<u64>>>>>,
}

impl Records {
    pub fn new(db: &Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("records")?,
            write_lock: Arc::new(Mutex::new(())),
            versions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Creates the record if absent; re-creating an existing user is a no-op.
    pub fn create(&self, id: &UserId, profile: Profile) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().expect("records lock poisoned");
        if self.tree.get(id.0.as_bytes())?.is_some() {
            return Ok(());
        }
        let record = UserRecord::new(id.clone(), profile);
        self.tree
            .insert(id.0.as_bytes(), serde_json::to_vec(&record)?)?;
        drop(_guard);
        self.bump(id);
        Ok(())
    }

    pub fn get(&self, id: &UserId) -> anyhow::Result<Option<UserRecord>> {
        match self.tree.get(id.0.as_bytes())? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).with_context(|| format!("corrupt record {id}"))?,
            )),
            None => Ok(None),
        }
    }

    pub fn ids(&self) -> anyhow::Result<Vec<UserId>> {
        let mut ids = Vec::new();
        for entry in self.tree.iter() {
            let (key, _) = entry?;
            ids.push(UserId(String::from_utf8(key.to_vec())?));
        }
        Ok(ids)
    }

    /// Applies all writes to the record in one read-modify-write step.
    /// Returns `None` when no such record exists.
    pub fn apply(&self, id: &UserId, writes: Vec<RecordWrite>) -> anyhow::Result<Option<()>> {
        let _guard = self.write_lock.lock().expect("records lock poisoned");
        let Some(bytes) = self.tree.get(id.0.as_bytes())? else {
            return Ok(None);
        };
        let mut record: UserRecord =
            serde_json::from_slice(&bytes).with_context(|| format!("corrupt record {id}"))?;
        for write in writes {
            record.apply_write(write);
        }
        self.tree
            .insert(id.0.as_bytes(), serde_json::to_vec(&record)?)?;
        drop(_guard);
        self.bump(id);
        Ok(Some(()))
    }

    /// Parks until the record's version differs from `since`, or until the
    /// wait window elapses; either way replies with the current state.
    pub async fn wait_for_change(
        &self,
        id: &UserId,
        since: u64,
        wait: Duration,
    ) -> anyhow::Result<Option<WatchReply>> {
        let mut rx = self.version_channel(id).subscribe();
        let changed = tokio::time::timeout(wait, rx.wait_for(|v| *v != since))
            .await
            .map(|result| result.map(|version| *version));
        let version = match changed {
            Ok(Ok(version)) => version,
            // park window elapsed; reply with the unchanged state
            _ => *rx.borrow(),
        };
        match self.get(id)? {
            Some(record) => Ok(Some(WatchReply { version, record })),
            None => Ok(None),
        }
    }

    fn bump(&self, id: &UserId) {
        self.version_channel(id).send_modify(|v| *v += 1);
    }

    fn version_channel(&self, id: &UserId) -> Arc<watch::Sender<u64>> {
        let mut versions = self.versions.lock().expect("versions lock poisoned");
        versions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(watch::channel(0).0))
            .clone()
    }
}
