//! Typed view over vote-count update payloads.
//!
//! The client delivers inbound payloads as opaque [`serde_json::Value`]s.
//! Consumers that know they are watching a voting event can lift them into a
//! [`VoteUpdate`] with [`VoteUpdate::from_value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ResourceId;

/// What caused the update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteAction {
    /// A vote was cast.
    VoteAdded,
    /// Event metadata changed.
    EventUpdated,
    /// The event was removed.
    EventDeleted,
    /// Anything the server adds later.
    #[serde(untagged)]
    Other(String),
}

/// Vote-count update broadcast on an event topic.
///
/// Every field is optional: the broker relays whatever the server publishes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdate {
    /// Event the update belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<ResourceId>,
    /// Candidate whose count changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<ResourceId>,
    /// Display name of the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_name: Option<String>,
    /// Votes for the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<u64>,
    /// Votes across the whole event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_votes: Option<u64>,
    /// Cause of the update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<VoteAction>,
}

impl VoteUpdate {
    /// Interpret a decoded payload as a vote update.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// A `VOTE_ADDED` message for one candidate.
    #[must_use]
    pub fn vote_added(event_id: ResourceId, candidate_id: ResourceId) -> Self {
        Self {
            event_id: Some(event_id),
            candidate_id: Some(candidate_id),
            action: Some(VoteAction::VoteAdded),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_server_message() {
        let value = json!({
            "eventId": 42,
            "candidateId": 7,
            "candidateName": "Ada",
            "voteCount": 12,
            "totalVotes": 30,
            "action": "VOTE_ADDED"
        });
        let update = VoteUpdate::from_value(&value).unwrap();
        assert_eq!(update.event_id, Some(ResourceId::from("42")));
        assert_eq!(update.candidate_id, Some(ResourceId::from("7")));
        assert_eq!(update.candidate_name.as_deref(), Some("Ada"));
        assert_eq!(update.vote_count, Some(12));
        assert_eq!(update.total_votes, Some(30));
        assert_eq!(update.action, Some(VoteAction::VoteAdded));
    }

    #[test]
    fn decodes_partial_message_with_string_ids() {
        let value = json!({"candidateId": "c1", "totalVotes": 5});
        let update = VoteUpdate::from_value(&value).unwrap();
        assert_eq!(update.candidate_id, Some(ResourceId::from("c1")));
        assert_eq!(update.total_votes, Some(5));
        assert!(update.event_id.is_none());
        assert!(update.action.is_none());
    }

    #[test]
    fn unknown_action_preserved() {
        let update = VoteUpdate::from_value(&json!({"action": "RESULTS_FROZEN"})).unwrap();
        assert_eq!(update.action, Some(VoteAction::Other("RESULTS_FROZEN".into())));
    }

    #[test]
    fn null_and_padded_ids() {
        let update =
            VoteUpdate::from_value(&json!({"eventId": null, "candidateId": " c1 "})).unwrap();
        assert!(update.event_id.is_none());
        assert_eq!(update.candidate_id, Some(ResourceId::from("c1")));
    }

    #[test]
    fn rejects_object_id() {
        assert!(VoteUpdate::from_value(&json!({"eventId": {"x": 1}})).is_err());
    }

    #[test]
    fn vote_added_serializes_compactly() {
        let msg = VoteUpdate::vote_added(ResourceId::from("42"), ResourceId::from("7"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({"eventId": "42", "candidateId": "7", "action": "VOTE_ADDED"})
        );
    }
}
