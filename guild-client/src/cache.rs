use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use guild_common::{UserId, UserRecord};

use crate::store::{RecordStore, StoreError};

/// Session-scoped view of the signed-in user's connections. Created at
/// sign-in, torn down (subscription included) when dropped or signed out.
///
/// The record store's push channel is the source of truth. Local mutations
/// are held as a transient overlay on top of the last authoritative snapshot;
/// when an authoritative update confirms an overlay entry the entry is
/// retired, and unconfirmed entries keep applying rather than being wiped by
/// the next push.
pub struct ConnectionCache<S: RecordStore> {
    user: UserId,
    store: S,
    state: Arc<Mutex<CacheState>>,
    subscription: JoinHandle<()>,
}

#[derive(Default)]
struct CacheState {
    record: UserRecord,
    overlay: Overlay,
}

#[derive(Default)]
struct Overlay {
    added: Vec<UserId>,
    removed: Vec<UserId>,
}

impl<S: RecordStore> ConnectionCache<S> {
    pub async fn sign_in(store: S, user: UserId) -> Result<Self, StoreError> {
        let mut watch = store.watch(&user).await?;
        let state = Arc::new(Mutex::new(CacheState {
            record: watch.latest(),
            overlay: Overlay::default(),
        }));
        let subscription = tokio::spawn({
            let state = state.clone();
            async move {
                while watch.changed().await {
                    apply_authoritative(&state, watch.latest());
                }
            }
        });
        Ok(Self {
            user,
            store,
            state,
            subscription,
        })
    }

    /// Pull path: re-reads the record for immediate consistency right after a
    /// local mutation, without waiting on the push channel.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let record = self.store.get(&self.user).await?;
        apply_authoritative(&self.state, record);
        Ok(())
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The connection list as currently displayed: the authoritative snapshot
    /// with the optimistic overlay applied.
    pub fn connections(&self) -> Vec<UserId> {
        let state = self.state.lock().expect("cache lock poisoned");
        let mut connections: Vec<UserId> = state
            .record
            .connections
            .iter()
            .filter(|c| !state.overlay.removed.contains(c))
            .cloned()
            .collect();
        connections.extend(state.overlay.added.iter().cloned());
        connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Last authoritative snapshot, overlay not applied.
    pub fn record(&self) -> UserRecord {
        self.state.lock().expect("cache lock poisoned").record.clone()
    }

    /// Optimistically marks `other` as connected while the remote accept is
    /// in flight.
    pub fn note_connected(&self, other: &UserId) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        state.overlay.removed.retain(|r| r != other);
        if !state.record.is_connected_to(other) && !state.overlay.added.contains(other) {
            state.overlay.added.push(other.clone());
        }
    }

    /// Optimistically hides `other` while the remote removal is in flight.
    pub fn note_disconnected(&self, other: &UserId) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        state.overlay.added.retain(|a| a != other);
        if state.record.is_connected_to(other) && !state.overlay.removed.contains(other) {
            state.overlay.removed.push(other.clone());
        }
    }

    pub fn sign_out(self) {
        // teardown happens in Drop
    }
}

fn apply_authoritative(state: &Arc<Mutex<CacheState>>, record: UserRecord) {
    let mut state = state.lock().expect("cache lock poisoned");
    // retire overlay entries the authoritative record now confirms
    state
        .overlay
        .added
        .retain(|added| !record.is_connected_to(added));
    state
        .overlay
        .removed
        .retain(|removed| record.is_connected_to(removed));
    state.record = record;
}

impl<S: RecordStore> Drop for ConnectionCache<S> {
    fn drop(&mut self) {
        self.subscription.abort();
    }
}
