use std::collections::HashMap;

use guild_common::{UserId, UserRecord};

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileCard {
    pub id: UserId,
    pub display_name: String,
    pub headline: String,
    pub profile_image: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Suggestion {
    pub card: ProfileCard,
    pub request_sent: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Listing {
    pub connections: Vec<ProfileCard>,
    pub people_you_may_know: Vec<Suggestion>,
}

/// Pure projection of the directory for the network page: the viewer's
/// connections, profile-hydrated in connection order, and everyone else as
/// "people you may know" annotated with whether a request is already out.
/// Connection ids the directory no longer has hydrate to a placeholder card
/// rather than failing.
pub fn assemble(viewer: &UserRecord, directory: &[UserRecord]) -> Listing {
    let by_id: HashMap<&UserId, &UserRecord> =
        directory.iter().map(|record| (&record.id, record)).collect();

    let connections = viewer
        .connections
        .iter()
        .map(|id| match by_id.get(id) {
            Some(record) => card(record),
            None => placeholder(id),
        })
        .collect();

    let people_you_may_know = directory
        .iter()
        .filter(|record| record.id != viewer.id && !viewer.is_connected_to(&record.id))
        .map(|record| Suggestion {
            card: card(record),
            request_sent: viewer.has_sent_to(&record.id),
        })
        .collect();

    Listing {
        connections,
        people_you_may_know,
    }
}

fn card(record: &UserRecord) -> ProfileCard {
    ProfileCard {
        id: record.id.clone(),
        display_name: record.profile.display_name.clone(),
        headline: record.profile.headline.clone(),
        profile_image: record.profile.profile_image.clone(),
    }
}

fn placeholder(id: &UserId) -> ProfileCard {
    ProfileCard {
        id: id.clone(),
        display_name: "Unknown member".to_string(),
        headline: String::new(),
        profile_image: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guild_common::Profile;

    fn user(name: &str) -> UserRecord {
        UserRecord::new(
            UserId::new(name),
            Profile {
                display_name: name.to_string(),
                headline: format!("{name}'s headline"),
                profile_image: format!("{name}.png"),
            },
        )
    }

    #[test]
    fn partitions_connections_from_suggestions() {
        let mut ada = user("ada");
        let grace = user("grace");
        let alan = user("alan");
        ada.connections.push(grace.id.clone());
        ada.sent_requests.push(alan.id.clone());

        let directory = vec![ada.clone(), grace.clone(), alan.clone()];
        let listing = assemble(&ada, &directory);

        assert_eq!(listing.connections.len(), 1);
        assert_eq!(listing.connections[0].id, grace.id);
        assert_eq!(listing.connections[0].display_name, "grace");

        assert_eq!(listing.people_you_may_know.len(), 1);
        let suggestion = &listing.people_you_may_know[0];
        assert_eq!(suggestion.card.id, alan.id);
        assert!(suggestion.request_sent);
    }

    #[test]
    fn viewer_is_never_suggested_to_themselves() {
        let ada = user("ada");
        let listing = assemble(&ada, &[ada.clone()]);
        assert!(listing.connections.is_empty());
        assert!(listing.people_you_may_know.is_empty());
    }

    #[test]
    fn dangling_connection_ids_hydrate_to_placeholders() {
        let mut ada = user("ada");
        ada.connections.push(UserId::new("deleted-user"));

        let listing = assemble(&ada, &[ada.clone()]);
        assert_eq!(listing.connections.len(), 1);
        assert_eq!(listing.connections[0].display_name, "Unknown member");
        assert_eq!(listing.connections[0].id, UserId::new("deleted-user"));
    }

    #[test]
    fn suggestions_without_requests_are_unannotated() {
        let ada = user("ada");
        let grace = user("grace");
        let listing = assemble(&ada, &[ada.clone(), grace.clone()]);
        assert_eq!(listing.people_you_may_know.len(), 1);
        assert!(!listing.people_you_may_know[0].request_sent);
    }
}
