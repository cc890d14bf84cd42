pub mod jobs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
pub struct UserId(pub String);
impl UserId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().to_string())
    }
}
impl AsRef<UserId> for UserId {
    fn as_ref(&self) -> &UserId {
        self
    }
}
impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Profile {
    pub display_name: String,
    pub headline: String,
    pub profile_image: String,
}

/// One user's document in the record store. `connections` is intended to be
/// symmetric across records; `sent_requests` and `pending_requests` are the
/// sender-side and recipient-side views of the same unresolved edge.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub profile: Profile,
    pub connections: Vec<UserId>,
    pub sent_requests: Vec<UserId>,
    pub pending_requests: Vec<PendingRequest>,
}

/// A received connection request. Keyed by `from`: every entry in
/// `pending_requests` is by definition unresolved, so no status field is
/// stored and removal matches on `from` alone.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PendingRequest {
    pub from: UserId,
    pub display_name: String,
    pub headline: String,
    pub profile_image: String,
    pub created_at: DateTime<Utc>,
}

/// Field-level write primitives the store applies atomically within a single
/// record. The add variants are unions (no duplicates), the remove variants
/// are idempotent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum RecordWrite {
    AddConnection(UserId),
    RemoveConnection(UserId),
    AddSentRequest(UserId),
    RemoveSentRequest(UserId),
    PushPendingRequest(PendingRequest),
    RemovePendingRequestFrom(UserId),
}

impl UserRecord {
    pub fn new(id: UserId, profile: Profile) -> Self {
        Self {
            id,
            profile,
            connections: Vec::new(),
            sent_requests: Vec::new(),
            pending_requests: Vec::new(),
        }
    }
    pub fn apply_write(&mut self, write: RecordWrite) {
        match write {
            RecordWrite::AddConnection(id) => {
                if !self.connections.contains(&id) {
                    self.connections.push(id);
                }
            }
            RecordWrite::RemoveConnection(id) => self.connections.retain(|c| *c != id),
            RecordWrite::AddSentRequest(id) => {
                if !self.sent_requests.contains(&id) {
                    self.sent_requests.push(id);
                }
            }
            RecordWrite::RemoveSentRequest(id) => self.sent_requests.retain(|s| *s != id),
            RecordWrite::PushPendingRequest(request) => {
                if !self.has_pending_from(&request.from) {
                    self.pending_requests.push(request);
                }
            }
            RecordWrite::RemovePendingRequestFrom(id) => {
                self.pending_requests.retain(|p| p.from != id)
            }
        }
    }
    pub fn is_connected_to(&self, other: &UserId) -> bool {
        self.connections.contains(other)
    }
    pub fn has_sent_to(&self, other: &UserId) -> bool {
        self.sent_requests.contains(other)
    }
    pub fn has_pending_from(&self, other: &UserId) -> bool {
        self.pending_requests.iter().any(|p| p.from == *other)
    }
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Reply to a long-poll watch request: the record as of `version`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchReply {
    pub version: u64,
    pub record: UserRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> UserRecord {
        UserRecord::new(UserId::new("ada"), Profile::default())
    }

    #[test]
    fn add_writes_are_unions() {
        let mut rec = record();
        rec.apply_write(RecordWrite::AddConnection(UserId::new("grace")));
        rec.apply_write(RecordWrite::AddConnection(UserId::new("grace")));
        assert_eq!(rec.connections.len(), 1);

        let request = PendingRequest {
            from: UserId::new("grace"),
            display_name: "Grace".into(),
            headline: String::new(),
            profile_image: String::new(),
            created_at: chrono::Utc::now(),
        };
        rec.apply_write(RecordWrite::PushPendingRequest(request.clone()));
        rec.apply_write(RecordWrite::PushPendingRequest(request));
        assert_eq!(rec.pending_requests.len(), 1);
    }

    #[test]
    fn remove_writes_are_idempotent() {
        let mut rec = record();
        rec.apply_write(RecordWrite::RemoveConnection(UserId::new("grace")));
        rec.apply_write(RecordWrite::RemoveSentRequest(UserId::new("grace")));
        rec.apply_write(RecordWrite::RemovePendingRequestFrom(UserId::new("grace")));
        assert_eq!(rec, record());
    }

    #[test]
    fn pending_removal_matches_on_sender_only() {
        let mut rec = record();
        rec.apply_write(RecordWrite::PushPendingRequest(PendingRequest {
            from: UserId::new("grace"),
            display_name: "Grace Hopper".into(),
            headline: "Rear Admiral".into(),
            profile_image: "grace.png".into(),
            created_at: chrono::Utc::now(),
        }));
        // extra profile fields on the stored entry must not defeat removal
        rec.apply_write(RecordWrite::RemovePendingRequestFrom(UserId::new("grace")));
        assert!(rec.pending_requests.is_empty());
    }
}
