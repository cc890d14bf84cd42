use std::collections::HashMap;

use thiserror::Error;

use guild_common::{PendingRequest, RecordWrite, UserId, UserRecord};

use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cannot send a connection request to yourself")]
    SelfRequest,
    #[error("a request between {0} and {1} is already pending")]
    DuplicateRequest(UserId, UserId),
    #[error("{0} and {1} are already connected")]
    AlreadyConnected(UserId, UserId),
    #[error("record store failure, no state changed")]
    Store(#[from] StoreError),
    /// The first record was written but the second was not, leaving a
    /// one-sided edge for the reconciliation sweep to repair.
    #[error("partial update: {updated} was written but {failed} was not")]
    Partial {
        updated: UserId,
        failed: UserId,
        #[source]
        source: StoreError,
    },
}

impl GraphError {
    pub fn is_partial(&self) -> bool {
        matches!(self, GraphError::Partial { .. })
    }
}

/// How the reconciliation sweep repairs a one-sided connection edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum RepairPolicy {
    /// Drop the one-sided entry. A connection needs evidence of mutual
    /// consent on both records, so this is the default.
    #[default]
    Prune,
    /// Add the missing side, treating the surviving entry as intent.
    Complete,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub repaired_edges: usize,
    pub dropped_sent_markers: usize,
    pub repaired_requests: usize,
}

/// Connection/request lifecycle over the record store. Every operation is a
/// sequence of per-record writes; nothing spans two records atomically. When
/// the first write lands and the second fails the caller gets
/// `GraphError::Partial` rather than a generic failure.
pub struct GraphService<S> {
    store: S,
}

impl<S: RecordStore> GraphService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Files a pending request on the recipient's record and marks it sent on
    /// the sender's. Rejects self-requests, duplicates in either direction,
    /// and pairs that are already connected.
    pub async fn send_request(&self, from: &UserId, to: &UserId) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::SelfRequest);
        }
        let sender = self.store.get(from).await?;
        let recipient = self.store.get(to).await?;
        if sender.is_connected_to(to) || recipient.is_connected_to(from) {
            return Err(GraphError::AlreadyConnected(from.clone(), to.clone()));
        }
        if sender.has_sent_to(to)
            || recipient.has_pending_from(from)
            || recipient.has_sent_to(from)
            || sender.has_pending_from(to)
        {
            return Err(GraphError::DuplicateRequest(from.clone(), to.clone()));
        }
        let request = PendingRequest {
            from: from.clone(),
            display_name: sender.profile.display_name.clone(),
            headline: sender.profile.headline.clone(),
            profile_image: sender.profile.profile_image.clone(),
            created_at: chrono::Utc::now(),
        };
        self.store
            .apply(to, vec![RecordWrite::PushPendingRequest(request)])
            .await?;
        self.store
            .apply(from, vec![RecordWrite::AddSentRequest(to.clone())])
            .await
            .map_err(|source| GraphError::Partial {
                updated: to.clone(),
                failed: from.clone(),
                source,
            })?;
        tracing::debug!(%from, %to, "connection request sent");
        Ok(())
    }

    /// Withdraws a request the sender no longer wants. Cancelling a request
    /// that does not exist is a no-op.
    pub async fn cancel_request(&self, from: &UserId, to: &UserId) -> Result<(), GraphError> {
        let sender = self.store.get(from).await?;
        let recipient = self.store.get(to).await?;
        if !sender.has_sent_to(to) && !recipient.has_pending_from(from) {
            return Ok(());
        }
        self.store
            .apply(to, vec![RecordWrite::RemovePendingRequestFrom(from.clone())])
            .await?;
        self.store
            .apply(from, vec![RecordWrite::RemoveSentRequest(to.clone())])
            .await
            .map_err(|source| GraphError::Partial {
                updated: to.clone(),
                failed: from.clone(),
                source,
            })?;
        tracing::debug!(%from, %to, "connection request cancelled");
        Ok(())
    }

    /// Promotes a pending request to a symmetric connection edge. The
    /// accepter's record is written first (entry removed, connection added),
    /// then the requester's. Accepting a request that was never received is a
    /// no-op.
    pub async fn accept_request(
        &self,
        requester: &UserId,
        accepter: &UserId,
    ) -> Result<(), GraphError> {
        let received = self.store.get(accepter).await?;
        if !received.has_pending_from(requester) {
            return Ok(());
        }
        self.store
            .apply(
                accepter,
                vec![
                    RecordWrite::RemovePendingRequestFrom(requester.clone()),
                    RecordWrite::AddConnection(requester.clone()),
                ],
            )
            .await?;
        self.store
            .apply(
                requester,
                vec![
                    RecordWrite::AddConnection(accepter.clone()),
                    RecordWrite::RemoveSentRequest(accepter.clone()),
                ],
            )
            .await
            .map_err(|source| GraphError::Partial {
                updated: accepter.clone(),
                failed: requester.clone(),
                source,
            })?;
        tracing::debug!(%requester, %accepter, "connection request accepted");
        Ok(())
    }

    /// Drops a received request without forming a connection. No-op when the
    /// request is absent.
    pub async fn decline_request(
        &self,
        requester: &UserId,
        accepter: &UserId,
    ) -> Result<(), GraphError> {
        let received = self.store.get(accepter).await?;
        let sent = self.store.get(requester).await?;
        if !received.has_pending_from(requester) && !sent.has_sent_to(accepter) {
            return Ok(());
        }
        self.store
            .apply(
                accepter,
                vec![RecordWrite::RemovePendingRequestFrom(requester.clone())],
            )
            .await?;
        self.store
            .apply(
                requester,
                vec![RecordWrite::RemoveSentRequest(accepter.clone())],
            )
            .await
            .map_err(|source| GraphError::Partial {
                updated: accepter.clone(),
                failed: requester.clone(),
                source,
            })?;
        tracing::debug!(%requester, %accepter, "connection request declined");
        Ok(())
    }

    /// Deletes the edge from both records. No-op when neither side lists the
    /// other.
    pub async fn remove_connection(&self, a: &UserId, b: &UserId) -> Result<(), GraphError> {
        let rec_a = self.store.get(a).await?;
        let rec_b = self.store.get(b).await?;
        if !rec_a.is_connected_to(b) && !rec_b.is_connected_to(a) {
            return Ok(());
        }
        self.store
            .apply(a, vec![RecordWrite::RemoveConnection(b.clone())])
            .await?;
        self.store
            .apply(b, vec![RecordWrite::RemoveConnection(a.clone())])
            .await
            .map_err(|source| GraphError::Partial {
                updated: a.clone(),
                failed: b.clone(),
                source,
            })?;
        tracing::debug!(user_a = %a, user_b = %b, "connection removed");
        Ok(())
    }

    /// Scans every record for one-sided state left behind by an interrupted
    /// two-record operation and repairs it: asymmetric connection edges per
    /// the chosen policy, sent-request markers whose pending entry no longer
    /// exists on the recipient, and pending entries whose sender carries no
    /// matching sent marker (the leftovers of an interrupted send, which
    /// would otherwise block the pair on the duplicate check forever).
    pub async fn reconcile(&self, policy: RepairPolicy) -> Result<RepairReport, GraphError> {
        let ids = self.store.list_ids().await?;
        let mut records: HashMap<UserId, UserRecord> = HashMap::new();
        for id in &ids {
            records.insert(id.clone(), self.store.get(id).await?);
        }
        let mut report = RepairReport::default();
        for (id, record) in &records {
            for other in &record.connections {
                let one_sided = match records.get(other) {
                    Some(other_record) => !other_record.is_connected_to(id),
                    // dangling id: nothing to complete, always prune
                    None => true,
                };
                if !one_sided {
                    continue;
                }
                match policy {
                    RepairPolicy::Complete if records.contains_key(other) => {
                        self.store
                            .apply(other, vec![RecordWrite::AddConnection(id.clone())])
                            .await?;
                    }
                    _ => {
                        self.store
                            .apply(id, vec![RecordWrite::RemoveConnection(other.clone())])
                            .await?;
                    }
                }
                tracing::info!(user = %id, other = %other, ?policy, "repaired one-sided edge");
                report.repaired_edges += 1;
            }
            for target in &record.sent_requests {
                let resolved = match records.get(target) {
                    Some(target_record) => !target_record.has_pending_from(id),
                    None => true,
                };
                if resolved {
                    self.store
                        .apply(id, vec![RecordWrite::RemoveSentRequest(target.clone())])
                        .await?;
                    tracing::info!(user = %id, target = %target, "dropped stale sent marker");
                    report.dropped_sent_markers += 1;
                }
            }
            for request in &record.pending_requests {
                let sender = &request.from;
                let unmarked = match records.get(sender) {
                    Some(sender_record) => !sender_record.has_sent_to(id),
                    // dangling sender: nothing to back-fill, always drop
                    None => true,
                };
                if !unmarked {
                    continue;
                }
                match policy {
                    RepairPolicy::Complete if records.contains_key(sender) => {
                        self.store
                            .apply(sender, vec![RecordWrite::AddSentRequest(id.clone())])
                            .await?;
                    }
                    _ => {
                        self.store
                            .apply(
                                id,
                                vec![RecordWrite::RemovePendingRequestFrom(sender.clone())],
                            )
                            .await?;
                    }
                }
                tracing::info!(user = %id, sender = %sender, ?policy, "repaired orphan pending request");
                report.repaired_requests += 1;
            }
        }
        Ok(report)
    }
}
