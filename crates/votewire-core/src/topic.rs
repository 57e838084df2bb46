//! Topic path derivation.

use crate::constants::TOPIC_PREFIX;
use crate::ids::ResourceId;

/// Topic carrying vote updates for one resource: `/topic/event/{id}`.
#[must_use]
pub fn topic_path(resource_id: &ResourceId) -> String {
    format!("{TOPIC_PREFIX}{resource_id}")
}
